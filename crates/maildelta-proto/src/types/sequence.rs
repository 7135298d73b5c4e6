//! Sequence sets for message ranges.

use super::{SeqNum, Uid};

/// Sequence set for specifying message ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceSet {
    /// Single sequence number.
    Single(SeqNum),
    /// Range of sequence numbers (inclusive).
    Range(SeqNum, SeqNum),
    /// Range from start to end of mailbox.
    RangeFrom(SeqNum),
    /// All messages (*).
    All,
}

impl SequenceSet {
    /// Creates a sequence set from a single number.
    #[must_use]
    pub fn single(n: u32) -> Option<Self> {
        SeqNum::new(n).map(Self::Single)
    }

    /// Creates a range sequence set.
    #[must_use]
    pub fn range(start: u32, end: u32) -> Option<Self> {
        Some(Self::Range(SeqNum::new(start)?, SeqNum::new(end)?))
    }
}

impl std::fmt::Display for SequenceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single(n) => write!(f, "{n}"),
            Self::Range(start, end) => write!(f, "{start}:{end}"),
            Self::RangeFrom(start) => write!(f, "{start}:*"),
            Self::All => write!(f, "*"),
        }
    }
}

/// UID-based sequence set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UidSet {
    /// Single UID.
    Single(Uid),
    /// Range of UIDs (inclusive).
    Range(Uid, Uid),
    /// Range from start to highest UID.
    RangeFrom(Uid),
    /// All messages.
    All,
    /// Multiple UID specifications.
    Set(Vec<Self>),
}

impl UidSet {
    /// Creates a UID set from a single UID.
    #[must_use]
    pub const fn single(uid: Uid) -> Self {
        Self::Single(uid)
    }

    /// Creates a UID set from a range.
    #[must_use]
    pub const fn range(start: Uid, end: Uid) -> Self {
        Self::Range(start, end)
    }

    /// Builds the most compact set covering exactly the given UIDs.
    ///
    /// Consecutive values collapse into ranges, so `[100, 101, 102, 105]`
    /// renders as `100:102,105`. Returns `None` when no UIDs are given.
    #[must_use]
    pub fn from_uids(uids: impl IntoIterator<Item = Uid>) -> Option<Self> {
        let mut sorted: Vec<Uid> = uids.into_iter().collect();
        sorted.sort_unstable();
        sorted.dedup();

        let mut runs: Vec<Self> = Vec::new();
        let mut iter = sorted.into_iter();
        let first = iter.next()?;
        let (mut start, mut end) = (first, first);
        for uid in iter {
            if uid.get() == end.get().saturating_add(1) {
                end = uid;
            } else {
                runs.push(Self::run(start, end));
                start = uid;
                end = uid;
            }
        }
        runs.push(Self::run(start, end));

        if runs.len() == 1 {
            runs.pop()
        } else {
            Some(Self::Set(runs))
        }
    }

    fn run(start: Uid, end: Uid) -> Self {
        if start == end {
            Self::Single(start)
        } else {
            Self::Range(start, end)
        }
    }

    /// Returns true if the UID falls inside this set.
    ///
    /// `RangeFrom` and `All` are open-ended and contain every UID above
    /// their start.
    #[must_use]
    pub fn contains(&self, uid: Uid) -> bool {
        match self {
            Self::Single(n) => *n == uid,
            Self::Range(start, end) => *start <= uid && uid <= *end,
            Self::RangeFrom(start) => *start <= uid,
            Self::All => true,
            Self::Set(items) => items.iter().any(|item| item.contains(uid)),
        }
    }
}

impl std::fmt::Display for UidSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single(n) => write!(f, "{n}"),
            Self::Range(start, end) => write!(f, "{start}:{end}"),
            Self::RangeFrom(start) => write!(f, "{start}:*"),
            Self::All => write!(f, "*"),
            Self::Set(items) => {
                let s: Vec<_> = items.iter().map(ToString::to_string).collect();
                write!(f, "{}", s.join(","))
            }
        }
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

    fn uids(values: &[u32]) -> Vec<Uid> {
        values.iter().map(|v| Uid::new(*v).unwrap()).collect()
    }

    #[test]
    fn sequence_set_display() {
        assert_eq!(SequenceSet::single(3).unwrap().to_string(), "3");
        assert_eq!(SequenceSet::range(1, 10).unwrap().to_string(), "1:10");
        assert_eq!(SequenceSet::All.to_string(), "*");
        assert!(SequenceSet::range(0, 10).is_none());
    }

    #[test]
    fn from_uids_collapses_runs() {
        let set = UidSet::from_uids(uids(&[105, 101, 100, 102])).unwrap();
        assert_eq!(set.to_string(), "100:102,105");
    }

    #[test]
    fn from_uids_single_value() {
        let set = UidSet::from_uids(uids(&[42, 42])).unwrap();
        assert_eq!(set, UidSet::Single(Uid::new(42).unwrap()));
        assert_eq!(set.to_string(), "42");
    }

    #[test]
    fn from_uids_empty_is_none() {
        assert!(UidSet::from_uids(Vec::new()).is_none());
    }

    #[test]
    fn from_uids_handles_u32_max() {
        let set = UidSet::from_uids(uids(&[u32::MAX - 1, u32::MAX])).unwrap();
        assert_eq!(set.to_string(), format!("{}:{}", u32::MAX - 1, u32::MAX));
    }

    #[test]
    fn contains_walks_nested_sets() {
        let set = UidSet::from_uids(uids(&[1, 2, 3, 10])).unwrap();
        assert!(set.contains(Uid::new(2).unwrap()));
        assert!(set.contains(Uid::new(10).unwrap()));
        assert!(!set.contains(Uid::new(5).unwrap()));
        assert!(UidSet::RangeFrom(Uid::new(7).unwrap()).contains(Uid::new(900).unwrap()));
    }
}
