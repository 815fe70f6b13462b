//! Segments, validated timelines, and active-segment resolution.

use crate::common::SegmentId;
use crate::error::{PulseError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A labeled span `[start_time, end_time)` of the timeline, e.g. one chord.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: SegmentId,
    pub start_time: f64,
    pub end_time: f64,
    pub label: String,
}

impl Segment {
    pub fn new(id: u32, start_time: f64, end_time: f64, label: impl Into<String>) -> Self {
        Self {
            id: SegmentId(id),
            start_time,
            end_time,
            label: label.into(),
        }
    }

    /// Half-open containment: the start is inside, the end is not.
    pub fn contains(&self, time: f64) -> bool {
        self.start_time <= time && time < self.end_time
    }

    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    /// Offset and width of this segment as fractions of `total`, for drawing
    /// a proportional progression bar.
    pub fn span_fraction(&self, total: f64) -> (f64, f64) {
        if total <= 0.0 {
            return (0.0, 0.0);
        }
        (self.start_time / total, self.duration() / total)
    }

    fn check_bounds(&self) -> Result<()> {
        let valid = self.start_time.is_finite()
            && self.end_time.is_finite()
            && self.start_time >= 0.0
            && self.end_time > self.start_time;
        if valid {
            Ok(())
        } else {
            Err(PulseError::InvalidSegment {
                id: self.id,
                start_time: self.start_time,
                end_time: self.end_time,
            })
        }
    }
}

/// Returns the id of the segment covering `cursor`, by linear scan.
///
/// Expects a non-overlapping list (see [`Timeline::new`]); on overlapping input
/// the first match in list order wins. A cursor on a boundary shared by two
/// adjacent segments resolves to the later one.
pub fn resolve(cursor: f64, segments: &[Segment]) -> Option<SegmentId> {
    segments
        .iter()
        .find(|segment| segment.contains(cursor))
        .map(|segment| segment.id)
}

/// The greatest end time in `segments`, scanning all of them since input order
/// need not be time order. `0.0` for an empty list.
pub fn max_end_time(segments: &[Segment]) -> f64 {
    segments
        .iter()
        .map(|segment| segment.end_time)
        .fold(0.0, f64::max)
}

/// A validated, immutable segment list for one playback session.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Timeline {
    segments: Vec<Segment>,
    max_end_time: f64,
}

impl Timeline {
    /// Validates `segments` and builds a timeline.
    ///
    /// Rejects non-finite, negative or zero-length segments, duplicate ids and
    /// overlapping spans. Gaps are allowed, and so is an empty list.
    pub fn new(segments: Vec<Segment>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(segments.len());
        for segment in &segments {
            segment.check_bounds()?;
            if !seen.insert(segment.id) {
                return Err(PulseError::DuplicateSegmentId(segment.id));
            }
        }

        let mut by_start: Vec<&Segment> = segments.iter().collect();
        by_start.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
        for pair in by_start.windows(2) {
            if pair[0].end_time > pair[1].start_time {
                return Err(PulseError::OverlappingSegments {
                    first: pair[0].id,
                    second: pair[1].id,
                });
            }
        }

        let max_end_time = max_end_time(&segments);
        Ok(Self {
            segments,
            max_end_time,
        })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The loop point of the timeline.
    pub fn max_end_time(&self) -> f64 {
        self.max_end_time
    }

    pub fn get(&self, id: SegmentId) -> Option<&Segment> {
        self.segments.iter().find(|segment| segment.id == id)
    }

    /// The segment covering `cursor`, if any.
    pub fn segment_at(&self, cursor: f64) -> Option<&Segment> {
        self.segments.iter().find(|segment| segment.contains(cursor))
    }

    pub fn resolve(&self, cursor: f64) -> Option<SegmentId> {
        resolve(cursor, &self.segments)
    }

    /// Labels in first-seen order without repeats, e.g. the distinct chords of
    /// a progression.
    pub fn unique_labels(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.segments
            .iter()
            .map(|segment| segment.label.as_str())
            .filter(|label| seen.insert(*label))
            .collect()
    }

    /// `cursor` as a fraction of the whole timeline, in `[0, 1]`.
    pub fn progress(&self, cursor: f64) -> f64 {
        if self.max_end_time <= 0.0 {
            return 0.0;
        }
        (cursor / self.max_end_time).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progression() -> Vec<Segment> {
        vec![
            Segment::new(1, 0.0, 5.0, "G"),
            Segment::new(2, 5.0, 10.0, "Em"),
            Segment::new(3, 10.0, 15.0, "C"),
        ]
    }

    fn label_at(timeline: &Timeline, cursor: f64) -> Option<&str> {
        timeline.segment_at(cursor).map(|s| s.label.as_str())
    }

    #[test]
    fn resolves_half_open_intervals() {
        let timeline = Timeline::new(progression()).unwrap();
        assert_eq!(label_at(&timeline, 0.0), Some("G"));
        assert_eq!(label_at(&timeline, 4.999), Some("G"));
        assert_eq!(label_at(&timeline, 5.0), Some("Em"));
        assert_eq!(label_at(&timeline, 14.999), Some("C"));
        assert_eq!(label_at(&timeline, 15.0), None);
        assert_eq!(timeline.resolve(5.0), Some(SegmentId(2)));
    }

    #[test]
    fn gaps_resolve_to_none() {
        let timeline = Timeline::new(vec![
            Segment::new(1, 0.0, 2.0, "A"),
            Segment::new(2, 4.0, 6.0, "D"),
        ])
        .unwrap();
        assert_eq!(timeline.resolve(3.0), None);
        assert_eq!(timeline.resolve(4.0), Some(SegmentId(2)));
    }

    #[test]
    fn empty_list_resolves_to_none_everywhere() {
        let timeline = Timeline::new(Vec::new()).unwrap();
        assert_eq!(timeline.max_end_time(), 0.0);
        for cursor in [0.0, 1.0, 100.0] {
            assert_eq!(timeline.resolve(cursor), None);
        }
        assert_eq!(timeline.progress(3.0), 0.0);
    }

    #[test]
    fn max_end_time_scans_unordered_input() {
        let segments = vec![
            Segment::new(3, 10.0, 15.0, "C"),
            Segment::new(1, 0.0, 5.0, "G"),
            Segment::new(2, 5.0, 10.0, "Em"),
        ];
        assert_eq!(max_end_time(&segments), 15.0);
        let timeline = Timeline::new(segments).unwrap();
        assert_eq!(timeline.max_end_time(), 15.0);
        assert_eq!(timeline.resolve(12.0), Some(SegmentId(3)));
    }

    #[test]
    fn rejects_degenerate_segments() {
        for (start, end) in [(3.0, 3.0), (4.0, 2.0), (-1.0, 2.0), (0.0, f64::INFINITY)] {
            let result = Timeline::new(vec![Segment::new(9, start, end, "X")]);
            assert!(
                matches!(result, Err(PulseError::InvalidSegment { .. })),
                "[{start}, {end}) accepted"
            );
        }
    }

    #[test]
    fn rejects_overlaps_and_duplicate_ids() {
        let overlapping = Timeline::new(vec![
            Segment::new(1, 0.0, 5.5, "G"),
            Segment::new(2, 5.0, 10.0, "Em"),
        ]);
        assert_eq!(
            overlapping,
            Err(PulseError::OverlappingSegments {
                first: SegmentId(1),
                second: SegmentId(2)
            })
        );

        let duplicated = Timeline::new(vec![
            Segment::new(1, 0.0, 5.0, "G"),
            Segment::new(1, 5.0, 10.0, "Em"),
        ]);
        assert_eq!(duplicated, Err(PulseError::DuplicateSegmentId(SegmentId(1))));
    }

    #[test]
    fn unique_labels_keep_first_seen_order() {
        let timeline = Timeline::new(vec![
            Segment::new(1, 0.0, 1.0, "G"),
            Segment::new(2, 1.0, 2.0, "Em"),
            Segment::new(3, 2.0, 3.0, "G"),
            Segment::new(4, 3.0, 4.0, "D7"),
        ])
        .unwrap();
        assert_eq!(timeline.unique_labels(), vec!["G", "Em", "D7"]);
    }

    #[test]
    fn proportions_for_drawing() {
        let timeline = Timeline::new(progression()).unwrap();
        let (offset, width) = timeline.segments()[1].span_fraction(timeline.max_end_time());
        assert!((offset - 1.0 / 3.0).abs() < 1e-12);
        assert!((width - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(timeline.progress(7.5), 0.5);
        assert_eq!(timeline.progress(20.0), 1.0);
    }
}
