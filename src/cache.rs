use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, trace};

use crate::dns::{DnsMessage, Question};

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct CacheKey {
    name: String,
    qtype: u16,
}

impl CacheKey {
    fn from_question(q: &Question) -> Self {
        Self {
            name: q.name.clone(),
            qtype: q.qtype.to_u16(),
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    message: DnsMessage,
    expiry: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now > self.expiry
    }
}

/// TTL-indexed cache from `(qname, qtype)` to a decoded reply. Lazy expiry,
/// last-write-wins, no singleflight — exactly the semantics the core needs,
/// nothing more: no size bound, no negative-caching distinction, no
/// persistence.
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: DashMap<CacheKey, CacheEntry>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Returns a clone of the stored message iff present and not expired.
    /// The caller is free to overwrite the transaction id and TSIG options
    /// on the clone without corrupting the cached entry.
    pub fn lookup(&self, question: &Question) -> Option<DnsMessage> {
        let key = CacheKey::from_question(question);
        let now = Instant::now();

        match self.entries.get(&key) {
            Some(entry) if !entry.is_expired(now) => {
                trace!(qname = %question.name, "cache hit");
                Some(entry.message.clone())
            }
            Some(_) => {
                trace!(qname = %question.name, "cache entry expired");
                None
            }
            None => None,
        }
    }

    /// Computes the effective TTL per the cache's TTL rule and inserts,
    /// replacing any existing entry unconditionally. A reply with no answer
    /// records (`minAnswerTtl = 0`) is inserted already expired, which is
    /// equivalent to not caching it at all on the next lookup.
    pub fn insert(&self, question: &Question, message: DnsMessage, cache_age: u32) {
        let min_answer_ttl = message.answers.iter().map(|rr| rr.ttl).min().unwrap_or(0);
        let effective_ttl = if cache_age > 0 {
            cache_age.min(min_answer_ttl)
        } else {
            min_answer_ttl
        };

        let key = CacheKey::from_question(question);
        let expiry = Instant::now() + Duration::from_secs(effective_ttl as u64);
        debug!(qname = %question.name, effective_ttl, "caching response");
        self.entries.insert(key, CacheEntry { message, expiry });
    }

    /// Removes all entries; used on rule reload.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Drops expired entries opportunistically. Never required for
    /// correctness (lookup already treats expired entries as misses) but
    /// keeps long-running processes from accumulating dead entries.
    pub fn sweep_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| !entry.is_expired(now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::{RecordClass, RecordType, ResourceRecord};
    use std::net::Ipv4Addr;

    fn question() -> Question {
        Question::new("example.com", RecordType::A, RecordClass::In)
    }

    fn reply_with_ttl(ttl: u32) -> DnsMessage {
        let mut msg = DnsMessage::new_query(1, question());
        msg.answers
            .push(ResourceRecord::new_a("example.com", Ipv4Addr::new(1, 1, 1, 1), ttl));
        msg
    }

    #[test]
    fn fresh_entry_is_a_hit() {
        let cache = ResponseCache::new();
        cache.insert(&question(), reply_with_ttl(3600), 0);
        assert!(cache.lookup(&question()).is_some());
    }

    #[test]
    fn cache_age_caps_the_effective_ttl_below_the_record_ttl() {
        let cache = ResponseCache::new();
        let before = Instant::now();
        // record ttl is 3600s but cacheAge caps the effective ttl to 5s
        cache.insert(&question(), reply_with_ttl(3600), 5);

        let entry = cache
            .entries
            .get(&CacheKey::from_question(&question()))
            .unwrap();
        assert!(entry.expiry <= before + Duration::from_secs(6));
        assert!(entry.expiry >= before + Duration::from_secs(4));
    }

    #[test]
    fn zero_cache_age_uses_the_record_ttl_verbatim() {
        let cache = ResponseCache::new();
        let before = Instant::now();
        cache.insert(&question(), reply_with_ttl(2), 0);

        let entry = cache
            .entries
            .get(&CacheKey::from_question(&question()))
            .unwrap();
        assert!(entry.expiry <= before + Duration::from_secs(3));
        assert!(entry.expiry >= before + Duration::from_secs(1));
    }

    #[test]
    fn cache_age_cannot_extend_past_the_record_ttl() {
        let cache = ResponseCache::new();
        let before = Instant::now();
        // cacheAge of 3600s must not override a record ttl of 1s
        cache.insert(&question(), reply_with_ttl(1), 3600);

        let entry = cache
            .entries
            .get(&CacheKey::from_question(&question()))
            .unwrap();
        assert!(entry.expiry <= before + Duration::from_secs(2));
    }

    #[test]
    fn answerless_reply_is_inserted_already_expired() {
        let cache = ResponseCache::new();
        let msg = DnsMessage::new_query(1, question()).reply(crate::dns::ResponseCode::NameError);
        cache.insert(&question(), msg, 0);
        assert!(cache.lookup(&question()).is_none());
    }

    #[test]
    fn last_write_wins() {
        let cache = ResponseCache::new();
        cache.insert(&question(), reply_with_ttl(3600), 0);
        cache.insert(&question(), reply_with_ttl(3600), 0);
        assert!(cache.lookup(&question()).is_some());
    }

    #[test]
    fn clear_removes_everything() {
        let cache = ResponseCache::new();
        cache.insert(&question(), reply_with_ttl(3600), 0);
        cache.clear();
        assert!(cache.lookup(&question()).is_none());
    }
}
