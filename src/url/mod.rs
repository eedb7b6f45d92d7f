//! URL handling module for Sumi-Reader
//!
//! This module provides best-effort URL resolution for rewritten links and
//! metadata, strict validation of request targets, and host extraction.

mod domain;
mod normalize;

pub use domain::{extract_domain, same_host};
pub use normalize::{is_fragment_only, normalize_url, parse_target_url};
