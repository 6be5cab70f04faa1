//! Coordinate translation between the master document ("origin") and the projection
//! ("image").
//!
//! [`ProjectionMapping`] is a borrowed, read-only view over the pairs of a
//! [`SegmentRegistry`]; it never caches anything, so it is always in sync with the registry
//! it was created from. Queries assume a normalized registry (no pairs marked deleted).

use crate::intervals::Region;
use crate::registry::{Pair, SegmentRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Extension {
    /// Only a fragment containing the offset qualifies.
    None,
    /// Fall back to the closest fragment on the left.
    Left,
    /// Fall back to the closest fragment on the right.
    Right,
}

/// Read-only origin/image translation over a registry.
#[derive(Debug, Clone, Copy)]
pub struct ProjectionMapping<'a> {
    pairs: &'a [Pair],
}

impl<'a> ProjectionMapping<'a> {
    /// Create a mapping view over `registry`.
    pub fn new(registry: &'a SegmentRegistry) -> Self {
        Self {
            pairs: registry.pairs(),
        }
    }

    /// Length of the projection.
    pub fn image_length(&self) -> usize {
        self.pairs.last().map_or(0, |pair| pair.segment.end())
    }

    fn fragment_index(&self, offset: usize, extension: Extension) -> Option<usize> {
        if self.pairs.is_empty() {
            return None;
        }

        let index = self
            .pairs
            .partition_point(|pair| pair.fragment.offset < offset);
        if index < self.pairs.len() && self.pairs[index].fragment.offset == offset {
            return Some(index);
        }
        if index > 0 && self.pairs[index - 1].fragment.includes(offset) {
            return Some(index - 1);
        }

        match extension {
            Extension::None => None,
            Extension::Left => index.checked_sub(1),
            Extension::Right => (index < self.pairs.len()).then_some(index),
        }
    }

    fn segment_index(&self, image_offset: usize) -> Option<usize> {
        let count = self
            .pairs
            .partition_point(|pair| pair.segment.offset <= image_offset);
        let index = count.checked_sub(1)?;
        let segment = self.pairs[index].segment;
        let is_last = index + 1 == self.pairs.len();

        (segment.includes(image_offset)
            || (segment.length == 0 && segment.offset == image_offset)
            || (is_last && segment.end() == image_offset))
            .then_some(index)
    }

    /// Image offset of a master offset.
    ///
    /// Defined for offsets inside a fragment, at the start of a fragment, and at the end of
    /// the last fragment.
    pub fn to_image_offset(&self, origin_offset: usize) -> Option<usize> {
        let pair = match self.fragment_index(origin_offset, Extension::None) {
            Some(index) => &self.pairs[index],
            None => {
                let last = self.pairs.last()?;
                if last.fragment.end() != origin_offset {
                    return None;
                }
                last
            }
        };
        Some(pair.segment.offset + origin_offset - pair.fragment.offset)
    }

    /// Exact image of a master region.
    ///
    /// Returns `None` unless both boundaries map precisely and the region does not straddle
    /// a hidden gap.
    pub fn to_image(&self, origin: Region) -> Option<Region> {
        let origin_end = origin.checked_end()?;
        if origin.is_empty() {
            return self
                .to_image_offset(origin.offset)
                .map(|offset| Region::new(offset, 0));
        }

        let first = self.fragment_index(origin.offset, Extension::None)?;
        let last = self.fragment_index(origin_end - 1, Extension::None)?;
        if first > last {
            return None;
        }
        let contiguous = self.pairs[first..=last]
            .windows(2)
            .all(|w| w[0].fragment.end() == w[1].fragment.offset);
        if !contiguous {
            return None;
        }

        let start = &self.pairs[first];
        let end = &self.pairs[last];
        let image_start = start.segment.offset + origin.offset - start.fragment.offset;
        let image_end = end.segment.offset + origin_end - end.fragment.offset;
        Some(Region::from(image_start..image_end))
    }

    /// Image region covering the projected parts of a master region.
    ///
    /// Boundaries inside hidden gaps are clamped to the nearest projected text. Returns
    /// `None` if no projected text lies inside `origin`.
    pub fn to_closest_image(&self, origin: Region) -> Option<Region> {
        let origin_end = origin.checked_end()?;
        if origin.is_empty() {
            return self.to_image(origin);
        }

        let inclusive_end = origin_end - 1;
        let first = self.fragment_index(origin.offset, Extension::Right)?;
        let last = self.fragment_index(inclusive_end, Extension::Left)?;
        if first > last {
            return None;
        }

        let start = &self.pairs[first];
        let end = &self.pairs[last];
        let image_start = if start.fragment.includes(origin.offset) {
            start.segment.offset + origin.offset - start.fragment.offset
        } else {
            start.segment.offset
        };
        let image_end = if end.fragment.includes(inclusive_end) {
            end.segment.offset + origin_end - end.fragment.offset
        } else {
            end.segment.end()
        };
        Some(Region::from(image_start..image_end))
    }

    /// Master offset of an image offset.
    ///
    /// An offset on a segment boundary maps into the segment that starts there; the end of
    /// the projection maps to the end of the last fragment.
    pub fn to_origin_offset(&self, image_offset: usize) -> Option<usize> {
        let pair = &self.pairs[self.segment_index(image_offset)?];
        Some(pair.fragment.offset + image_offset - pair.segment.offset)
    }

    /// Master regions that, concatenated in order, make up the image region.
    pub fn to_origin(&self, image: Region) -> Option<Vec<Region>> {
        if image.checked_end()? > self.image_length() {
            return None;
        }
        if image.is_empty() {
            let offset = self.to_origin_offset(image.offset)?;
            return Some(vec![Region::new(offset, 0)]);
        }

        let first = self.segment_index(image.offset)?;
        let mut regions = Vec::new();
        for pair in &self.pairs[first..] {
            let segment = pair.segment;
            if segment.offset >= image.end() {
                break;
            }
            let start = image.offset.max(segment.offset);
            let end = image.end().min(segment.end());
            if start < end {
                let delta = pair.fragment.offset;
                regions.push(Region::from(
                    delta + start - segment.offset..delta + end - segment.offset,
                ));
            }
        }
        Some(regions)
    }

    /// The single master region spanning from the first to the last character of `image`,
    /// hidden gaps in between included.
    pub fn to_origin_covering(&self, image: Region) -> Option<Region> {
        if image.checked_end()? > self.image_length() {
            return None;
        }
        let start = self.to_origin_offset(image.offset)?;
        if image.is_empty() {
            return Some(Region::new(start, 0));
        }

        let last = &self.pairs[self.segment_index(image.end() - 1)?];
        let end = last.fragment.offset + image.end() - last.segment.offset;
        Some(Region::from(start..end))
    }

    /// Non-empty sub-regions of `origin` that are currently projected.
    pub fn contained_master_regions(&self, origin: Region) -> Vec<Region> {
        self.to_closest_image(origin)
            .and_then(|image| self.to_origin(image))
            .unwrap_or_default()
            .into_iter()
            .filter(|region| !region.is_empty())
            .collect()
    }

    /// Sub-regions of `origin` that are not projected: the gaps before, between and after
    /// the [contained regions](Self::contained_master_regions).
    pub fn unprojected_master_regions(&self, origin: Region) -> Vec<Region> {
        let Some(origin_end) = origin.checked_end() else {
            return Vec::new();
        };
        if origin.is_empty() {
            return Vec::new();
        }

        let mut gaps = Vec::new();
        let mut cursor = origin.offset;
        for region in self.contained_master_regions(origin) {
            if cursor < region.offset {
                gaps.push(Region::from(cursor..region.offset));
            }
            cursor = region.end();
        }
        if cursor < origin_end {
            gaps.push(Region::from(cursor..origin_end));
        }
        gaps
    }

    /// First unprojected sub-region of `origin`, if any.
    pub fn first_unprojected_master_region(&self, origin: Region) -> Option<Region> {
        self.unprojected_master_regions(origin).into_iter().next()
    }
}
