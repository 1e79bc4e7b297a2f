//! Client identifiers.
//!
//! Every model and collection receives a `cid` at construction. Ids come from
//! a [`CidFactory`], a monotonic counter paired with a prefix, so a given
//! factory never hands out the same id twice.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

/// A client-assigned identifier, stable for the lifetime of the object it
/// names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cid(String);

impl Cid {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Cid {
    fn from(value: &str) -> Self {
        Cid(value.to_string())
    }
}

impl PartialEq<str> for Cid {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Cid {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// A monotonic id source.
///
/// Ids are `prefix` followed by the counter value, starting at 1.
#[derive(Debug)]
pub struct CidFactory {
    counter: AtomicU64,
}

impl CidFactory {
    /// Create a factory whose first id uses counter value 1.
    pub const fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    /// Create a factory that continues after `counter`.
    pub const fn with_counter(counter: u64) -> Self {
        Self {
            counter: AtomicU64::new(counter),
        }
    }

    /// The process-wide factory used when no explicit one is supplied.
    pub fn global() -> &'static CidFactory {
        static GLOBAL: OnceLock<CidFactory> = OnceLock::new();
        GLOBAL.get_or_init(CidFactory::new)
    }

    /// Increment the counter and return a new id with the given prefix.
    pub fn next(&self, prefix: &str) -> Cid {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        Cid(format!("{prefix}{n}"))
    }

    /// Last counter value handed out.
    pub fn counter(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }
}

impl Default for CidFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_factory_starts_at_one() {
        let factory = CidFactory::new();
        assert_eq!(factory.counter(), 0);
        assert_eq!(factory.next("model"), "model1");
        assert_eq!(factory.counter(), 1);
    }

    #[test]
    fn ids_increase_across_prefixes() {
        let factory = CidFactory::new();
        assert_eq!(factory.next("model"), "model1");
        assert_eq!(factory.next("collection"), "collection2");
        assert_eq!(factory.next("model"), "model3");
    }

    #[test]
    fn with_counter_continues() {
        let factory = CidFactory::with_counter(41);
        assert_eq!(factory.next("m").as_str(), "m42");
    }

    #[test]
    fn global_factory_is_unique() {
        let a = CidFactory::global().next("model");
        let b = CidFactory::global().next("model");
        assert_ne!(a, b);
    }

    #[test]
    fn serialization_is_transparent() {
        let cid = Cid::from("model7");
        assert_eq!(serde_json::to_string(&cid).unwrap(), "\"model7\"");
    }
}
