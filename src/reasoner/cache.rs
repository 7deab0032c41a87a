//! The Reasoner Cache: the three disjoint dedup structures from SPEC_FULL
//! §3 — `last_llm_block`, `last_context_hash`, `analyzed_events`. Owned
//! exclusively by the Reasoner; no external mutator.

use std::collections::VecDeque;

pub struct ReasonerCache {
    last_llm_block: Option<u64>,
    last_context_hash: Option<[u8; 16]>,
    analyzed_events: VecDeque<String>,
    analyzed_events_set: std::collections::HashSet<String>,
    capacity: usize,
}

impl ReasonerCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            last_llm_block: None,
            last_context_hash: None,
            analyzed_events: VecDeque::new(),
            analyzed_events_set: std::collections::HashSet::new(),
            capacity,
        }
    }

    pub fn is_same_block(&self, block: u64) -> bool {
        self.last_llm_block == Some(block)
    }

    pub fn is_same_context(&self, digest: &[u8; 16]) -> bool {
        self.last_context_hash.as_ref() == Some(digest)
    }

    pub fn contains_analyzed_event(&self, key: &str) -> bool {
        self.analyzed_events_set.contains(key)
    }

    /// Inserts `key`, evicting the oldest entry once capacity is exceeded.
    pub fn insert_analyzed_event(&mut self, key: String) {
        if self.analyzed_events_set.contains(&key) {
            return;
        }
        self.analyzed_events.push_back(key.clone());
        self.analyzed_events_set.insert(key);
        while self.analyzed_events.len() > self.capacity {
            if let Some(oldest) = self.analyzed_events.pop_front() {
                self.analyzed_events_set.remove(&oldest);
            }
        }
    }

    /// Called once a reply is obtained from the LLM — success or content
    /// failure alike, per SPEC_FULL §4.4 — so that a block is never
    /// re-submitted in a retry storm. NOT called on transport failure
    /// (timeout / network error), which leaves dedup state untouched so the
    /// next cycle may retry.
    pub fn record_llm_reply(&mut self, block: u64, digest: [u8; 16]) {
        self.last_llm_block = Some(block);
        self.last_context_hash = Some(digest);
    }

    #[cfg(test)]
    pub fn analyzed_events_len(&self) -> usize {
        self.analyzed_events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_once_over_capacity() {
        let mut cache = ReasonerCache::new(2);
        cache.insert_analyzed_event("liq:a:1".into());
        cache.insert_analyzed_event("liq:b:2".into());
        cache.insert_analyzed_event("liq:c:3".into());

        assert_eq!(cache.analyzed_events_len(), 2);
        assert!(!cache.contains_analyzed_event("liq:a:1"));
        assert!(cache.contains_analyzed_event("liq:b:2"));
        assert!(cache.contains_analyzed_event("liq:c:3"));
    }

    #[test]
    fn block_dedup_tracks_last_llm_block_only() {
        let mut cache = ReasonerCache::new(10);
        assert!(!cache.is_same_block(100));
        cache.record_llm_reply(100, [0u8; 16]);
        assert!(cache.is_same_block(100));
        assert!(!cache.is_same_block(101));
    }

    #[test]
    fn context_dedup_tracks_last_digest_only() {
        let mut cache = ReasonerCache::new(10);
        let d1 = [1u8; 16];
        let d2 = [2u8; 16];
        assert!(!cache.is_same_context(&d1));
        cache.record_llm_reply(1, d1);
        assert!(cache.is_same_context(&d1));
        assert!(!cache.is_same_context(&d2));
    }
}
