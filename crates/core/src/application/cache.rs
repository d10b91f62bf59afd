// Response cache for read-only sessions

use crate::application::constants::ERROR_STRING_QUESTION;
use crate::domain::Response;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    question: String,
    opt: Option<String>,
    parsed: bool,
}

impl CacheKey {
    fn new(question: &str, opt: Option<&str>, parsed: bool) -> Self {
        Self {
            question: question.to_string(),
            opt: opt.map(str::to_string),
            parsed,
        }
    }
}

/// Session-owned memo of `(question, opt, parsed) -> reply`
///
/// Disabled caches never store anything. `getErrorString` is never cached
/// since its answer changes after every failing call.
#[derive(Debug, Default)]
pub struct ResponseCache {
    enabled: bool,
    entries: HashMap<CacheKey, Response>,
}

impl ResponseCache {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            entries: HashMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether replies to `question` may be served from the cache
    pub fn is_cacheable(&self, question: &str) -> bool {
        self.enabled && question != ERROR_STRING_QUESTION
    }

    pub fn get(&self, question: &str, opt: Option<&str>, parsed: bool) -> Option<&Response> {
        if !self.is_cacheable(question) {
            return None;
        }
        let hit = self.entries.get(&CacheKey::new(question, opt, parsed));
        if hit.is_some() {
            debug!(question = %question, opt = ?opt, parsed = parsed, "Response cache hit");
        }
        hit
    }

    pub fn insert(&mut self, question: &str, opt: Option<&str>, parsed: bool, response: Response) {
        if self.is_cacheable(question) {
            self.entries
                .insert(CacheKey::new(question, opt, parsed), response);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_disabled_cache_stores_nothing() {
        let mut cache = ResponseCache::new(false);
        cache.insert("getVersion", None, true, Response::Value(json!("v1")));
        assert!(cache.is_empty());
        assert!(cache.get("getVersion", None, true).is_none());
    }

    #[test]
    fn test_key_includes_opt_and_mode() {
        let mut cache = ResponseCache::new(true);
        cache.insert("loadModel", Some("Modelica"), true, Response::Value(json!(true)));

        assert_eq!(
            cache.get("loadModel", Some("Modelica"), true),
            Some(&Response::Value(json!(true)))
        );
        assert!(cache.get("loadModel", Some("Modelica"), false).is_none());
        assert!(cache.get("loadModel", None, true).is_none());
        assert!(cache.get("loadModel", Some("Other"), true).is_none());
    }

    #[test]
    fn test_error_string_never_cached() {
        let mut cache = ResponseCache::new(true);
        cache.insert("getErrorString", None, true, Response::Value(json!("")));
        assert!(cache.is_empty());
        assert!(!cache.is_cacheable("getErrorString"));
    }

    #[test]
    fn test_clear() {
        let mut cache = ResponseCache::new(true);
        cache.insert("getVersion", None, true, Response::Raw("v".into()));
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }
}
