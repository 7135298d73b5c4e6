//! Correlation id generator.
//!
//! Ids double as IMAP tags, which is why they follow the `A0000` shape.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::{Error, Result};
use crate::types::CorrelationId;

/// Generates unique sequential correlation ids in the format "A0000", "A0001", etc.
#[derive(Debug)]
pub struct TagGenerator {
    counter: AtomicU32,
    prefix: char,
}

impl TagGenerator {
    /// Creates a new generator with the given prefix.
    #[must_use]
    pub const fn new(prefix: char) -> Self {
        Self {
            counter: AtomicU32::new(0),
            prefix,
        }
    }

    /// Generates the next id.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidState` once the counter space of the connection
    /// is exhausted; ids are never reused within one connection.
    pub fn next(&self) -> Result<CorrelationId> {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        if n == u32::MAX {
            self.counter.store(u32::MAX, Ordering::Relaxed);
            return Err(Error::InvalidState(
                "correlation id space exhausted for this connection".to_string(),
            ));
        }
        Ok(CorrelationId(format!("{}{:04}", self.prefix, n)))
    }

    /// Returns the current counter value without incrementing.
    #[must_use]
    pub fn current(&self) -> u32 {
        self.counter.load(Ordering::Relaxed)
    }
}

impl Default for TagGenerator {
    fn default() -> Self {
        Self::new('A')
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn sequential_ids() {
        let generator = TagGenerator::default();
        assert_eq!(generator.next().unwrap().as_str(), "A0000");
        assert_eq!(generator.next().unwrap().as_str(), "A0001");
        assert_eq!(generator.current(), 2);
    }

    #[test]
    fn padding_grows_past_four_digits() {
        let generator = TagGenerator::new('X');
        generator.counter.store(10_000, Ordering::Relaxed);
        assert_eq!(generator.next().unwrap().as_str(), "X10000");
    }

    #[test]
    fn ids_are_unique() {
        let generator = TagGenerator::default();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..10000 {
            assert!(seen.insert(generator.next().unwrap()), "duplicate id generated");
        }
    }

    #[test]
    fn exhaustion_is_an_error_and_sticks() {
        let generator = TagGenerator::default();
        generator.counter.store(u32::MAX, Ordering::Relaxed);
        assert!(matches!(generator.next(), Err(Error::InvalidState(_))));
        assert!(generator.next().is_err());
    }
}
