//! Timestamp interval used for working zones, cached ranges and pre-buffer segments.
//!
//! A section is a closed range `[start, end]` in the native timestamp unit of
//! the source. Any negative bound makes the section the empty sentinel.
//!
//! # Wrapped sections
//!
//! A non-empty section with `end < start` is wrapped (a cyclic range over the
//! end of the working zone). Wrapped sections contain nothing: both
//! `contains()` and `contains_section()` return false for them.
//!
//! # Subsumption
//!
//! There is no `PartialOrd`. The only ordering question the engine asks is
//! "is the requested zone already covered by the cached zone", answered by
//! `is_subsumed_by()`. Two sections that merely overlap are not subsumed
//! either way.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed timestamp interval `[start, end]`.
///
/// Equality is value equality and is false whenever either side is empty,
/// so `VideoSection::EMPTY != VideoSection::EMPTY`. For that reason the type
/// implements `PartialEq` but not `Eq`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VideoSection {
    pub start: i64,
    pub end: i64,
}

impl VideoSection {
    /// Canonical empty section.
    pub const EMPTY: VideoSection = VideoSection { start: -1, end: -1 };

    pub const fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    pub const fn empty() -> Self {
        Self::EMPTY
    }

    pub fn is_empty(&self) -> bool {
        self.start < 0 || self.end < 0
    }

    /// Non-empty with `end < start`.
    pub fn is_wrapped(&self) -> bool {
        !self.is_empty() && self.end < self.start
    }

    /// Inclusive containment of a timestamp. Empty and wrapped sections contain nothing.
    pub fn contains(&self, timestamp: i64) -> bool {
        if self.is_empty() || self.is_wrapped() {
            return false;
        }
        timestamp >= self.start && timestamp <= self.end
    }

    /// Non-strict enclosure: `other` lies inside `self`, bounds included.
    ///
    /// False when either section is empty or wrapped.
    pub fn contains_section(&self, other: &VideoSection) -> bool {
        if self.is_empty() || other.is_empty() || self.is_wrapped() || other.is_wrapped() {
            return false;
        }
        other.start >= self.start && other.end <= self.end
    }

    /// Strict enclosure: `self` lies inside `other` and is not identical to it.
    pub fn is_subsumed_by(&self, other: &VideoSection) -> bool {
        other.contains_section(self) && self != other
    }

    /// Number of timestamp units covered, 0 for empty or wrapped sections.
    pub fn span(&self) -> i64 {
        if self.is_empty() || self.is_wrapped() {
            0
        } else {
            self.end - self.start
        }
    }
}

impl Default for VideoSection {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl PartialEq for VideoSection {
    fn eq(&self, other: &Self) -> bool {
        !self.is_empty() && !other.is_empty() && self.start == other.start && self.end == other.end
    }
}

impl fmt::Display for VideoSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(f, "[empty]")
        } else {
            write!(f, "[{}..{}]", self.start, self.end)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_negative_bounds_are_not_empty() {
        for (start, end) in [(0, 0), (0, 999), (42, 4200), (7, 7)] {
            let section = VideoSection::new(start, end);
            assert!(!section.is_empty());
            assert!(section.contains(start));
            assert!(section.contains(end));
        }
    }

    #[test]
    fn test_empty_sentinel() {
        let empty = VideoSection::EMPTY;
        assert!(empty.is_empty());
        assert!(VideoSection::new(-1, 10).is_empty());
        assert!(VideoSection::new(10, -5).is_empty());
        assert!(!empty.contains(0));
        assert!(!empty.contains(-1));
        assert!(empty != VideoSection::EMPTY);
        assert!(!empty.contains_section(&VideoSection::new(0, 1)));
        assert!(!VideoSection::new(0, 100).contains_section(&empty));
    }

    #[test]
    fn test_equality_is_value_based() {
        assert!(VideoSection::new(0, 100) == VideoSection::new(0, 100));
        assert!(VideoSection::new(0, 100) != VideoSection::new(0, 101));
    }

    #[test]
    fn test_enclosed_section_is_subsumed() {
        let outer = VideoSection::new(0, 1000);
        let inner = VideoSection::new(100, 900);
        assert!(inner.is_subsumed_by(&outer));
        assert!(outer.contains_section(&inner));
        assert!(!outer.is_subsumed_by(&inner));

        // Shared bound still counts as enclosed.
        let left = VideoSection::new(0, 500);
        assert!(left.is_subsumed_by(&outer));
    }

    #[test]
    fn test_identical_sections_contain_but_are_not_subsumed() {
        let a = VideoSection::new(10, 20);
        let b = VideoSection::new(10, 20);
        assert!(a.contains_section(&b));
        assert!(!a.is_subsumed_by(&b));
    }

    #[test]
    fn test_overlap_is_not_subsumption() {
        let a = VideoSection::new(0, 500);
        let b = VideoSection::new(250, 750);
        assert!(!a.is_subsumed_by(&b));
        assert!(!b.is_subsumed_by(&a));
        assert!(!a.contains_section(&b));
        assert!(!b.contains_section(&a));
    }

    #[test]
    fn test_wrapped_contains_nothing() {
        let wrapped = VideoSection::new(800, 200);
        assert!(wrapped.is_wrapped());
        assert!(!wrapped.is_empty());
        assert!(!wrapped.contains(900));
        assert!(!wrapped.contains(100));
        assert!(!wrapped.contains(500));
        assert_eq!(wrapped.span(), 0);
    }

    #[test]
    fn test_display() {
        assert_eq!(VideoSection::new(0, 99).to_string(), "[0..99]");
        assert_eq!(VideoSection::EMPTY.to_string(), "[empty]");
    }
}
