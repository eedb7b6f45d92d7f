//! Content-addressed response records

use super::key::{
    links_content_hash, links_options_hash, links_root_key, options_hash, read_content_hash,
};
use super::stable::stable_stringify;
use crate::clock::Clock;
use crate::storage::{ResponseRecord, ResponseStore, StorageResult};
use serde_json::Value;
use std::sync::Arc;
use url::Url;

/// Record path of read responses
pub const READ_PATH: &str = "/read";

/// Record path of link extraction responses
pub const LINKS_PATH: &str = "/links";

/// Outcome of [`ResponseRecordService::store`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome {
    Inserted { response_hash: String },
    Touched { response_hash: String },
}

impl StoreOutcome {
    pub fn response_hash(&self) -> &str {
        match self {
            Self::Inserted { response_hash } | Self::Touched { response_hash } => response_hash,
        }
    }
}

/// Stores served responses once per distinct content
pub struct ResponseRecordService {
    store: Arc<dyn ResponseStore>,
    clock: Arc<dyn Clock>,
}

impl ResponseRecordService {
    pub fn new(store: Arc<dyn ResponseStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Records a served response
    ///
    /// An existing record with the same content hash keeps its content and
    /// only has `updated_at`/`updated_by` refreshed.
    ///
    /// # Arguments
    ///
    /// * `path` - [`READ_PATH`] or [`LINKS_PATH`]
    /// * `options` - Request options as JSON
    /// * `response` - The response body as served
    /// * `updated_by` - User id, or `anonymous`
    pub fn store(
        &self,
        path: &str,
        options: &Value,
        response: &Value,
        updated_by: &str,
    ) -> StorageResult<StoreOutcome> {
        let (options_hash, response_hash) = Self::hashes(path, options, response);
        let now = self.clock.now();

        if self.store.find_by_hash(&response_hash)?.is_some() {
            self.store.touch(&response_hash, now, updated_by)?;
            tracing::debug!(hash = %response_hash, path, "Response record touched");
            return Ok(StoreOutcome::Touched { response_hash });
        }

        let content = stable_stringify(response);
        let record = ResponseRecord {
            response_hash: response_hash.clone(),
            path: path.to_string(),
            options_hash,
            size: content.len() as i64,
            content,
            updated_at: now,
            updated_by: updated_by.to_string(),
        };
        self.store.insert(&record)?;
        tracing::debug!(hash = %response_hash, path, size = record.size, "Response record inserted");
        Ok(StoreOutcome::Inserted { response_hash })
    }

    /// Options hash and content hash of a response
    ///
    /// Link responses hash with their root key and tree flag, read responses
    /// with their target URL and markdown.
    pub fn hashes(path: &str, options: &Value, response: &Value) -> (String, String) {
        let target = response
            .get("url")
            .and_then(Value::as_str)
            .unwrap_or_default();

        if path == LINKS_PATH {
            let options_hash = links_options_hash(options);
            let root_key = Url::parse(target)
                .map(|url| links_root_key(&url))
                .unwrap_or_else(|_| target.to_string());
            let has_tree = response.get("tree").is_some();
            let hash = links_content_hash(&root_key, &options_hash, has_tree, response);
            (options_hash, hash)
        } else {
            let options_hash = options_hash(options);
            let content = response.get("markdown").unwrap_or(response);
            let hash = read_content_hash(target, &options_hash, content);
            (options_hash, hash)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryResponseStore;
    use serde_json::json;

    fn service() -> (ResponseRecordService, Arc<MemoryResponseStore>, Arc<ManualClock>) {
        let store = Arc::new(MemoryResponseStore::new());
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        (
            ResponseRecordService::new(store.clone(), clock.clone()),
            store,
            clock,
        )
    }

    #[test]
    fn test_repeated_store_keeps_content() {
        let (service, store, clock) = service();
        let response = json!({"url": "https://example.com/", "markdown": "# Hi"});
        let options = json!({"format": "markdown"});

        let first = service.store(READ_PATH, &options, &response, "u1").unwrap();
        assert!(matches!(first, StoreOutcome::Inserted { .. }));
        let stored = store.find_by_hash(first.response_hash()).unwrap().unwrap();

        clock.advance_secs(30);
        let second = service.store(READ_PATH, &options, &response, "u2").unwrap();
        assert!(matches!(second, StoreOutcome::Touched { .. }));
        assert_eq!(first.response_hash(), second.response_hash());

        let touched = store.find_by_hash(first.response_hash()).unwrap().unwrap();
        assert_eq!(touched.content, stored.content);
        assert_eq!(touched.size, stored.size);
        assert_eq!(touched.updated_by, "u2");
        assert!(touched.updated_at > stored.updated_at);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_read_hash_uses_markdown_only() {
        let options = json!({});
        let a = json!({"url": "https://example.com/", "markdown": "x", "cached": false});
        let b = json!({"url": "https://example.com/", "markdown": "x", "cached": true});
        assert_eq!(
            ResponseRecordService::hashes(READ_PATH, &options, &a).1,
            ResponseRecordService::hashes(READ_PATH, &options, &b).1
        );
    }

    #[test]
    fn test_links_hash_depends_on_tree_shape() {
        let options = json!({"tree": true});
        let flat = json!({"url": "https://example.com/docs?x=1", "links": ["https://example.com/a"]});
        let tree = json!({"url": "https://example.com/docs?x=1", "tree": {"children": []}});
        let (_, flat_hash) = ResponseRecordService::hashes(LINKS_PATH, &options, &flat);
        let (_, tree_hash) = ResponseRecordService::hashes(LINKS_PATH, &options, &tree);
        assert_ne!(flat_hash, tree_hash);
        assert_ne!(flat_hash, ResponseRecordService::hashes(READ_PATH, &options, &flat).1);
    }
}
