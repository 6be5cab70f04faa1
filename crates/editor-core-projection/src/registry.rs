//! Fragment/segment pair registry.
//!
//! A *fragment* is a range of the master document that is visible in the projection; its
//! *segment* is the range the same text occupies inside the projection. Both live in one
//! [`Pair`], and pairs are kept in a single vector sorted by fragment offset, so index `i`
//! names the i-th fragment and the i-th segment at once.

use crate::error::ProjectionError;
use crate::intervals::{Interval, Region};

/// A fragment (master coordinates) linked with its segment (projection coordinates).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pair {
    pub(crate) fragment: Interval,
    pub(crate) segment: Interval,
}

impl Pair {
    /// Master-side interval.
    pub fn fragment(&self) -> Interval {
        self.fragment
    }

    /// Projection-side interval.
    pub fn segment(&self) -> Interval {
        self.segment
    }

    /// Whether the pair is waiting to be dropped by normalization.
    pub fn is_deleted(&self) -> bool {
        self.fragment.is_deleted()
    }
}

/// Offset-sorted collection of fragment/segment pairs.
#[derive(Debug, Default)]
pub struct SegmentRegistry {
    pairs: Vec<Pair>,
}

impl SegmentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pairs (including pairs marked deleted).
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// All pairs in offset order.
    pub fn pairs(&self) -> &[Pair] {
        &self.pairs
    }

    /// Index of the first fragment whose offset is `>= offset`.
    pub fn index_at(&self, offset: usize) -> usize {
        self.pairs
            .partition_point(|pair| pair.fragment.offset < offset)
    }

    /// All live pairs whose fragment intersects `region`, in order.
    pub fn fragments_overlapping(&self, region: Region) -> Vec<&Pair> {
        let first = self.index_at(region.offset).saturating_sub(1);
        self.pairs[first..]
            .iter()
            .take_while(|pair| pair.fragment.offset <= region.end())
            .filter(|pair| {
                !pair.is_deleted() && pair.fragment.overlaps_with(region.offset, region.length)
            })
            .collect()
    }

    /// Total length of the projection described by the live segments.
    pub fn image_length(&self) -> usize {
        self.pairs
            .iter()
            .filter(|pair| !pair.is_deleted())
            .map(|pair| pair.segment.length)
            .sum()
    }

    /// Insert a new pair at `index`.
    ///
    /// The segment starts where the previous segment ends. Later segments are not moved;
    /// call [`relayout`](Self::relayout) once the mutation is complete.
    pub fn create_pair(&mut self, fragment: Interval, index: usize) {
        let segment_offset = index
            .checked_sub(1)
            .and_then(|prev| self.pairs.get(prev))
            .map_or(0, |prev| prev.segment.end());

        self.pairs.insert(
            index,
            Pair {
                fragment,
                segment: Interval::new(segment_offset, fragment.length),
            },
        );
    }

    /// Merge the pair at `index + 1` into the pair at `index`.
    ///
    /// The merged fragment spans from the left start to the right end; segment lengths are
    /// summed.
    pub fn merge(&mut self, index: usize) -> Result<(), ProjectionError> {
        if index + 1 >= self.pairs.len() {
            return Err(ProjectionError::internal(format!(
                "merge of pair {index} without a right neighbor"
            )));
        }
        let right = self.pairs.remove(index + 1);
        let left = &mut self.pairs[index];
        left.fragment.length = right.fragment.end() - left.fragment.offset;
        left.segment.length += right.segment.length;
        Ok(())
    }

    /// Remove and return the pair at `index`.
    pub fn remove(&mut self, index: usize) -> Pair {
        self.pairs.remove(index)
    }

    /// Drop every pair.
    pub fn clear(&mut self) {
        self.pairs.clear();
    }

    /// Mutable access to the pair at `index`.
    pub fn pair_mut(&mut self, index: usize) -> Option<&mut Pair> {
        self.pairs.get_mut(index)
    }

    /// Mutable iterator over all fragments, for the interval tracker.
    pub fn fragments_mut(&mut self) -> impl ExactSizeIterator<Item = &mut Interval> {
        self.pairs.iter_mut().map(|pair| &mut pair.fragment)
    }

    /// Re-derive segment layout from the fragments.
    ///
    /// Segment `i` gets the length of fragment `i` and starts where segment `i - 1` ends;
    /// deleted pairs collapse to an empty, deleted segment.
    pub fn relayout(&mut self) {
        let mut offset = 0;
        for pair in &mut self.pairs {
            if pair.fragment.is_deleted() {
                let mut segment = Interval::new(offset, 0);
                segment.mark_deleted();
                pair.segment = segment;
            } else {
                pair.segment = Interval::new(offset, pair.fragment.length);
                offset += pair.fragment.length;
            }
        }
    }

    /// Verify the well-formed segmentation invariants.
    pub fn check_invariants(&self) -> Result<(), ProjectionError> {
        let mut expected_segment_offset = 0;
        for (idx, pair) in self.pairs.iter().enumerate() {
            if pair.is_deleted() || pair.segment.is_deleted() {
                return Err(ProjectionError::internal(format!(
                    "pair {idx} is still marked deleted"
                )));
            }
            if pair.fragment.length != pair.segment.length {
                return Err(ProjectionError::internal(format!(
                    "pair {idx}: fragment length {} != segment length {}",
                    pair.fragment.length, pair.segment.length
                )));
            }
            if pair.segment.offset != expected_segment_offset {
                return Err(ProjectionError::internal(format!(
                    "segment {idx} starts at {} instead of {expected_segment_offset}",
                    pair.segment.offset
                )));
            }
            expected_segment_offset = pair.segment.end();

            if let Some(next) = self.pairs.get(idx + 1)
                && pair.fragment.end() > next.fragment.offset
            {
                return Err(ProjectionError::internal(format!(
                    "fragments {idx} and {} overlap",
                    idx + 1
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(fragments: &[(usize, usize)]) -> SegmentRegistry {
        let mut registry = SegmentRegistry::new();
        for (idx, (offset, length)) in fragments.iter().enumerate() {
            registry.create_pair(Interval::new(*offset, *length), idx);
        }
        registry.relayout();
        registry
    }

    fn segments(registry: &SegmentRegistry) -> Vec<Region> {
        registry.pairs().iter().map(|p| p.segment.region()).collect()
    }

    #[test]
    fn test_create_pair_keeps_segments_contiguous() {
        let mut registry = registry_with(&[(2, 3), (7, 2)]);
        assert_eq!(segments(&registry), vec![Region::new(0, 3), Region::new(3, 2)]);

        registry.create_pair(Interval::new(12, 4), 2);
        registry.create_pair(Interval::new(0, 1), 0);
        registry.relayout();
        assert_eq!(
            segments(&registry),
            vec![
                Region::new(0, 1),
                Region::new(1, 3),
                Region::new(4, 2),
                Region::new(6, 4)
            ]
        );
        assert_eq!(registry.image_length(), 10);
        registry.check_invariants().unwrap();
    }

    #[test]
    fn test_index_at() {
        let registry = registry_with(&[(2, 3), (7, 2)]);
        assert_eq!(registry.index_at(0), 0);
        assert_eq!(registry.index_at(2), 0);
        assert_eq!(registry.index_at(3), 1);
        assert_eq!(registry.index_at(7), 1);
        assert_eq!(registry.index_at(8), 2);
    }

    #[test]
    fn test_fragments_overlapping() {
        let registry = registry_with(&[(2, 3), (7, 2), (12, 1)]);
        let hits: Vec<Region> = registry
            .fragments_overlapping(Region::new(4, 4))
            .iter()
            .map(|p| p.fragment.region())
            .collect();
        assert_eq!(hits, vec![Region::new(2, 3), Region::new(7, 2)]);

        assert!(registry.fragments_overlapping(Region::new(5, 2)).is_empty());
        assert_eq!(registry.fragments_overlapping(Region::new(12, 0)).len(), 1);
    }

    #[test]
    fn test_merge_spans_gap() {
        let mut registry = registry_with(&[(2, 3), (7, 2)]);
        registry.merge(0).unwrap();
        registry.relayout();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.pairs()[0].fragment.region(), Region::new(2, 7));
        assert!(registry.merge(0).is_err());
    }

    #[test]
    fn test_relayout_collapses_deleted_pairs() {
        let mut registry = registry_with(&[(2, 3), (7, 2)]);
        registry.pair_mut(0).unwrap().fragment.mark_deleted();
        registry.relayout();
        assert_eq!(registry.image_length(), 2);
        assert_eq!(registry.pairs()[1].segment.region(), Region::new(0, 2));
        assert!(registry.check_invariants().is_err());
    }

    #[test]
    fn test_remove_returns_the_pair() {
        let mut registry = registry_with(&[(2, 3), (7, 2)]);
        let removed = registry.remove(0);
        assert_eq!(removed.fragment.region(), Region::new(2, 3));
        registry.relayout();
        assert_eq!(segments(&registry), vec![Region::new(0, 2)]);
        registry.check_invariants().unwrap();
    }

    #[test]
    fn test_overlapping_fragments_are_reported() {
        let registry = registry_with(&[(2, 3), (4, 2)]);
        let err = registry.check_invariants().unwrap_err();
        assert!(err.is_internal());
    }
}
