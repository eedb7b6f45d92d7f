//! Cache keying and response deduplication
//!
//! Cache keys are derived from the method, endpoint, target URL, a hash of
//! the output-relevant options and the TTL bucket. Response records are
//! addressed by a hash of their canonical content so identical responses are
//! stored once.

mod key;
mod records;
mod stable;

pub use key::{
    links_content_hash, links_options_hash, links_root_key, options_hash, read_content_hash,
    CacheKey, Endpoint, TtlBucket, IGNORED_OPTION_KEYS,
};
pub use records::{ResponseRecordService, StoreOutcome, LINKS_PATH, READ_PATH};
pub use stable::{sha256_hex, stable_hash, stable_stringify, MAX_STABLE_DEPTH};
