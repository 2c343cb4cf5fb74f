//! Branch name generation

use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Prefix of every branch the publisher creates
pub const BRANCH_PREFIX: &str = "metamorph-fixes-";

/// Issues `metamorph-fixes-<unix millis>` names
///
/// Names are strictly increasing within one namer: a request landing on an
/// already used millisecond gets the next free value.
#[derive(Debug, Default)]
pub struct BranchNamer {
    last: AtomicI64,
}

impl BranchNamer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next branch name based on the current time
    pub fn next(&self) -> String {
        self.next_at(Utc::now().timestamp_millis())
    }

    fn next_at(&self, now_millis: i64) -> String {
        let mut prev = self.last.load(Ordering::SeqCst);
        loop {
            let candidate = now_millis.max(prev + 1);
            match self
                .last
                .compare_exchange(prev, candidate, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return format!("{}{}", BRANCH_PREFIX, candidate),
                Err(actual) => prev = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_uses_timestamp() {
        let namer = BranchNamer::new();
        assert_eq!(namer.next_at(1_700_000_000_000), "metamorph-fixes-1700000000000");
    }

    #[test]
    fn test_distinct_when_apart() {
        let namer = BranchNamer::new();
        let a = namer.next_at(1_000);
        let b = namer.next_at(1_002);
        assert_eq!(a, "metamorph-fixes-1000");
        assert_eq!(b, "metamorph-fixes-1002");
    }

    #[test]
    fn test_same_millisecond_bumps() {
        let namer = BranchNamer::new();
        assert_eq!(namer.next_at(5_000), "metamorph-fixes-5000");
        assert_eq!(namer.next_at(5_000), "metamorph-fixes-5001");
        // Clock going backwards still yields a fresh name
        assert_eq!(namer.next_at(4_000), "metamorph-fixes-5002");
    }

    #[test]
    fn test_concurrent_names_are_unique() {
        let namer = Arc::new(BranchNamer::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let namer = namer.clone();
                std::thread::spawn(move || (0..50).map(|_| namer.next()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for name in handle.join().unwrap() {
                assert!(name.starts_with(BRANCH_PREFIX));
                assert!(seen.insert(name));
            }
        }
        assert_eq!(seen.len(), 400);
    }
}
