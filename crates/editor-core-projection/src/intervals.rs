//! Intervals and their adjustment under text edits.
//!
//! Offsets are character offsets (Unicode scalar values), half-open: an interval covers
//! `[offset, offset + length)`.

use std::ops::Range;

/// A plain `(offset, length)` range, used for query results and arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Region {
    /// Start offset.
    pub offset: usize,
    /// Length in characters.
    pub length: usize,
}

impl Region {
    /// Create a region from an offset and a length.
    pub const fn new(offset: usize, length: usize) -> Self {
        Self { offset, length }
    }

    /// Exclusive end offset.
    pub const fn end(&self) -> usize {
        self.offset + self.length
    }

    /// Exclusive end offset, or `None` if it does not fit in `usize`.
    pub const fn checked_end(&self) -> Option<usize> {
        self.offset.checked_add(self.length)
    }

    /// Returns `true` if the region covers no characters.
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// The region as a `Range<usize>`.
    pub const fn range(&self) -> Range<usize> {
        self.offset..self.end()
    }
}

impl From<Range<usize>> for Region {
    fn from(range: Range<usize>) -> Self {
        Self::new(range.start, range.end.saturating_sub(range.start))
    }
}

/// A mutable interval tracked across edits.
///
/// `deleted` is set when an edit swallowed the whole interval; deleted intervals are
/// ignored by the tracker and removed by the owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    /// Start offset.
    pub offset: usize,
    /// Length in characters.
    pub length: usize,
    deleted: bool,
}

impl Interval {
    /// Create a live interval.
    pub const fn new(offset: usize, length: usize) -> Self {
        Self {
            offset,
            length,
            deleted: false,
        }
    }

    /// Exclusive end offset.
    pub const fn end(&self) -> usize {
        self.offset + self.length
    }

    /// The interval as a [`Region`].
    pub const fn region(&self) -> Region {
        Region::new(self.offset, self.length)
    }

    /// Whether the interval was marked deleted.
    pub const fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Mark the interval deleted.
    pub fn mark_deleted(&mut self) {
        self.deleted = true;
    }

    /// Check if the interval contains a specific position.
    pub const fn includes(&self, pos: usize) -> bool {
        self.offset <= pos && pos < self.end()
    }

    /// Check if the interval overlaps `[offset, offset + length)`.
    ///
    /// Empty ranges count as overlapping when they sit inside the interval (or on the start
    /// of an empty interval); an empty interval overlaps a range that contains its offset.
    pub const fn overlaps_with(&self, offset: usize, length: usize) -> bool {
        let end = offset + length;
        if length > 0 {
            if self.length > 0 {
                self.offset < end && offset < self.end()
            } else {
                offset <= self.offset && self.offset < end
            }
        } else if self.length > 0 {
            self.offset <= offset && offset < self.end()
        } else {
            self.offset == offset
        }
    }
}

/// A replace operation: `removed` characters at `offset` replaced by `inserted` characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextEdit {
    /// Edit offset.
    pub offset: usize,
    /// Number of removed characters.
    pub removed: usize,
    /// Number of inserted characters.
    pub inserted: usize,
}

impl TextEdit {
    /// Create an edit description.
    pub const fn new(offset: usize, removed: usize, inserted: usize) -> Self {
        Self {
            offset,
            removed,
            inserted,
        }
    }

    /// Exclusive end of the removed range.
    pub const fn removed_end(&self) -> usize {
        self.offset + self.removed
    }
}

/// How an insertion exactly at the end of an interval is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Trailing {
    /// Text inserted at an interval's end stays outside it.
    #[default]
    Exclusive,
    /// The last interval of the collection absorbs text inserted at its end.
    ExtendLast,
}

/// Adjusts intervals for a single [`TextEdit`].
///
/// Rules per interval:
/// - before the edit: unchanged
/// - after the edit: shifted by `inserted - removed`
/// - strictly enclosed by the removed range: marked deleted
/// - partially removed: truncated to the remainder
/// - an insertion at or after the start and inside the interval grows it
#[derive(Debug, Clone, Copy)]
pub struct IntervalTracker {
    edit: TextEdit,
    trailing: Trailing,
}

impl IntervalTracker {
    /// Create a tracker for `edit`.
    pub const fn new(edit: TextEdit, trailing: Trailing) -> Self {
        Self { edit, trailing }
    }

    /// The edit being applied.
    pub const fn edit(&self) -> TextEdit {
        self.edit
    }

    /// Adjust every interval of an offset-sorted collection.
    pub fn adjust_all<'a, I>(&self, intervals: I)
    where
        I: IntoIterator<Item = &'a mut Interval>,
        I::IntoIter: ExactSizeIterator,
    {
        let iter = intervals.into_iter();
        let count = iter.len();
        for (idx, interval) in iter.enumerate() {
            self.adjust(interval, idx + 1 == count);
        }
    }

    /// Adjust a single interval; `is_last` tells whether it is the last one of its collection.
    pub fn adjust(&self, interval: &mut Interval, is_last: bool) {
        if interval.deleted {
            return;
        }

        let edit = self.edit;
        let removed_end = edit.removed_end();

        if edit.removed > 0 {
            if edit.offset < interval.offset && interval.end() < removed_end {
                interval.mark_deleted();
                return;
            }
            if interval.offset == edit.offset && interval.length == edit.removed {
                interval.length = edit.inserted;
                return;
            }
        }

        let original = *interval;

        if edit.removed > 0 {
            let map = |pos: usize| {
                if pos <= edit.offset {
                    pos
                } else if pos <= removed_end {
                    edit.offset
                } else {
                    pos - edit.removed
                }
            };
            let start = map(interval.offset);
            let end = map(interval.end());
            interval.offset = start;
            interval.length = end - start;
        }

        if edit.inserted == 0 {
            return;
        }

        // A replace that cut into the interval hands it the replacement text.
        let shrunk_by_replace = edit.removed > 0 && interval.length < original.length;
        let stretch_end =
            shrunk_by_replace || (is_last && self.trailing == Trailing::ExtendLast);
        let reach = if stretch_end || interval.length == 0 {
            interval.end()
        } else {
            interval.end() - 1
        };
        if reach < edit.offset {
            return;
        }

        let grows = interval.offset <= edit.offset
            && (edit.removed == 0 || original.offset <= edit.offset);
        if grows {
            interval.length += edit.inserted;
        } else {
            interval.offset += edit.inserted;
        }
    }
}
