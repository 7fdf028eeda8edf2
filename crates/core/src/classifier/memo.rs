//! Bounded memo of previous classifications

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};

use scrapeshield_domain::constants::MEMO_EVICTION_FRACTION;
use scrapeshield_domain::ErrorKind;

use super::error::ScrapeError;

/// Identity of a failure for memoization purposes.
///
/// Covers everything classification reads, so a memo hit can never return
/// a different kind than a fresh classification would.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemoKey {
    identity: u64,
    url: Option<String>,
    status: Option<u16>,
}

impl MemoKey {
    pub fn for_error(error: &ScrapeError, url: Option<&str>, status: Option<u16>) -> Self {
        let mut hasher = DefaultHasher::new();
        error.message.hash(&mut hasher);
        error.code.hash(&mut hasher);
        error.kind.hash(&mut hasher);
        error.timed_out.hash(&mut hasher);
        error.context.response_body.hash(&mut hasher);
        Self { identity: hasher.finish(), url: url.map(str::to_string), status }
    }
}

/// Insertion-ordered map that drops its oldest fifth when full.
#[derive(Debug)]
pub struct ClassificationMemo {
    capacity: usize,
    entries: HashMap<MemoKey, ErrorKind>,
    order: VecDeque<MemoKey>,
}

impl ClassificationMemo {
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), entries: HashMap::new(), order: VecDeque::new() }
    }

    pub fn get(&self, key: &MemoKey) -> Option<ErrorKind> {
        self.entries.get(key).copied()
    }

    pub fn insert(&mut self, key: MemoKey, kind: ErrorKind) {
        if self.entries.contains_key(&key) {
            self.entries.insert(key, kind);
            return;
        }
        if self.entries.len() >= self.capacity {
            self.evict_oldest();
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, kind);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    fn evict_oldest(&mut self) {
        let count = ((self.capacity as f64 * MEMO_EVICTION_FRACTION).ceil() as usize).max(1);
        for _ in 0..count {
            match self.order.pop_front() {
                Some(key) => {
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: u16) -> MemoKey {
        MemoKey::for_error(&ScrapeError::new(format!("e{n}")), None, Some(n))
    }

    #[test]
    fn evicts_oldest_fifth_on_overflow() {
        let mut memo = ClassificationMemo::new(10);
        for n in 0..10 {
            memo.insert(key(n), ErrorKind::Unknown);
        }
        memo.insert(key(10), ErrorKind::Timeout);

        assert_eq!(memo.len(), 9);
        assert_eq!(memo.get(&key(0)), None);
        assert_eq!(memo.get(&key(1)), None);
        assert_eq!(memo.get(&key(2)), Some(ErrorKind::Unknown));
        assert_eq!(memo.get(&key(10)), Some(ErrorKind::Timeout));
    }

    #[test]
    fn body_is_part_of_identity() {
        let a = ScrapeError::http(200, "short");
        let b = ScrapeError::http(200, "x".repeat(500));
        assert_ne!(MemoKey::for_error(&a, None, Some(200)), MemoKey::for_error(&b, None, Some(200)));
    }
}
