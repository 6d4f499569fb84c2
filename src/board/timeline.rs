//! Decoding persisted note blocks back into a playable timeline.
//!
//! The inverse half of the geometry codec: every note-shaped child of the
//! frame is projected back into (note, start, duration) through the pitch
//! layout and the fixed [`PX_PER_MS`] scale, then bucketed by start offset
//! floored to the dispatch granularity. This is the only place quantization
//! error can appear; encoded positions are exact.
//!
//! Decoding always runs against the frame's current children. The canvas is
//! the source of truth and may have been edited between plays, so the result
//! is never cached.

use super::{BoardError, BoardGeometry, DISPATCH_TICK_MS, PX_PER_MS, PitchLayout};
use crate::note::NoteName;
use crate::surface::{ElementId, Shape, Surface};
use std::collections::BTreeMap;

/// One decoded note within a timeline bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineNote {
    /// The pitch recovered from the block's row.
    pub note: NoteName,
    /// Duration recovered from the block's width, in ms.
    pub duration_ms: u64,
    /// The persisted block this entry came from, for highlighting.
    pub source: ElementId,
}

/// A decoded recording: notes bucketed by quantized start offset.
///
/// Bucket keys are multiples of [`DISPATCH_TICK_MS`]. Within a bucket, notes
/// keep the order their blocks were attached in (insertion order, not pitch
/// order).
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    buckets: BTreeMap<u64, Vec<TimelineNote>>,
    /// Note-shaped children whose row matched no known pitch. Reported so
    /// malformed boards degrade visibly instead of silently losing notes.
    skipped: Vec<ElementId>,
}

impl Timeline {
    /// Number of distinct start offsets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Whether the timeline has no playable notes.
    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// The notes starting at a quantized offset, if any.
    pub fn bucket(&self, start_ms: u64) -> Option<&[TimelineNote]> {
        self.buckets.get(&start_ms).map(Vec::as_slice)
    }

    /// Iterates buckets in start-offset order.
    #[allow(dead_code)]
    pub fn iter(&self) -> impl Iterator<Item = (u64, &[TimelineNote])> {
        self.buckets.iter().map(|(k, v)| (*k, v.as_slice()))
    }

    /// Blocks that looked like notes but decoded to no known pitch row.
    pub fn skipped(&self) -> &[ElementId] {
        &self.skipped
    }

    /// Total number of playable notes across all buckets.
    pub fn note_count(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }
}

/// Decodes the frame's note blocks into a [`Timeline`].
///
/// A block's start offset is its left edge relative to the recording origin,
/// divided by the scale and floored to the dispatch granularity. Its duration
/// is its width divided by the scale. Blocks whose row maps to no pitch are
/// collected in [`Timeline::skipped`] and logged, never silently dropped.
pub fn decode<S: Surface>(
    surface: &S,
    geometry: &BoardGeometry,
    layout: &PitchLayout,
) -> Result<Timeline, BoardError> {
    let mut timeline = Timeline::default();
    for child in surface.list_children(geometry.frame)? {
        if child.shape != Shape::RoundRectangle {
            continue;
        }
        let Some(note) = layout.note_at_row(child.y) else {
            tracing::warn!(
                element = child.id.as_u64(),
                y = child.y,
                "note block sits on no known pitch row; skipping"
            );
            timeline.skipped.push(child.id);
            continue;
        };
        // Round to whole milliseconds before flooring to the bucket grid:
        // the inverse scale can land a hair under the encoded value in
        // floating point, and that fuzz must not leak into bucket choice.
        let left_px = child.x - geometry.origin_x - child.width / 2.0;
        let start_ms = (left_px / PX_PER_MS).round().max(0.0) as u64;
        let quantized = start_ms - start_ms % DISPATCH_TICK_MS;
        let duration_ms = (child.width / PX_PER_MS).round() as u64;
        timeline
            .buckets
            .entry(quantized)
            .or_default()
            .push(TimelineNote {
                note,
                duration_ms,
                source: child.id,
            });
    }
    Ok(timeline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{Keyboard, KEY_ROW_HEIGHT, MIN_BLOCK_WIDTH};
    use crate::surface::{ElementSpec, MemorySurface};

    /// Records one note through the real recorder.
    fn record(
        surface: &mut MemorySurface,
        keyboard: &mut Keyboard,
        note: NoteName,
        start_ms: u64,
        finish_ms: u64,
    ) {
        assert!(keyboard.start_note(surface, note, start_ms).unwrap());
        assert!(keyboard.stop_note(surface, note, finish_ms).unwrap());
    }

    fn keyboard_with_recording(
        notes: &[(NoteName, u64, u64)],
    ) -> (MemorySurface, Keyboard) {
        let mut surface = MemorySurface::new();
        let mut keyboard = Keyboard::create(&mut surface).unwrap();
        keyboard.start_recording(&mut surface, 0).unwrap();
        for &(note, start, finish) in notes {
            record(&mut surface, &mut keyboard, note, start, finish);
        }
        keyboard.stop_recording(&mut surface).unwrap();
        (surface, keyboard)
    }

    #[test]
    fn test_round_trip() {
        let (surface, keyboard) =
            keyboard_with_recording(&[(NoteName::FSharp, 1500, 2800)]);
        let timeline = keyboard.decode_timeline(&surface).unwrap();
        assert_eq!(timeline.bucket_count(), 1);
        let bucket = timeline.bucket(1500).unwrap();
        assert_eq!(bucket.len(), 1);
        assert_eq!(bucket[0].note, NoteName::FSharp);
        assert_eq!(bucket[0].duration_ms, 1300);
    }

    #[test]
    fn test_quantization_floors_to_bucket() {
        // 50001 and 50049 share the 50000 bucket; 50050 starts the next.
        let (surface, keyboard) = keyboard_with_recording(&[
            (NoteName::C, 50001, 50501),
            (NoteName::E, 50049, 50549),
            (NoteName::G, 50050, 50550),
        ]);
        let timeline = keyboard.decode_timeline(&surface).unwrap();
        assert_eq!(timeline.bucket_count(), 2);
        assert_eq!(timeline.bucket(50000).unwrap().len(), 2);
        assert_eq!(timeline.bucket(50050).unwrap().len(), 1);
        assert_eq!(timeline.bucket(50050).unwrap()[0].note, NoteName::G);
    }

    #[test]
    fn test_overlap_groups_in_recorded_order() {
        let (surface, keyboard) = keyboard_with_recording(&[
            (NoteName::G, 1000, 1400),
            (NoteName::C, 1000, 1800),
        ]);
        let timeline = keyboard.decode_timeline(&surface).unwrap();
        let bucket = timeline.bucket(1000).unwrap();
        // Insertion order, not pitch order.
        assert_eq!(bucket[0].note, NoteName::G);
        assert_eq!(bucket[1].note, NoteName::C);
    }

    #[test]
    fn test_staggered_notes_land_in_distinct_buckets() {
        // C held 0-500ms, E held 200-700ms: distinct buckets at 0 and 200.
        let (surface, keyboard) = keyboard_with_recording(&[
            (NoteName::C, 0, 500),
            (NoteName::E, 200, 700),
        ]);
        let timeline = keyboard.decode_timeline(&surface).unwrap();
        assert_eq!(timeline.bucket_count(), 2);

        let first = timeline.bucket(0).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].note, NoteName::C);
        assert_eq!(first[0].duration_ms, 500);

        let second = timeline.bucket(200).unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].note, NoteName::E);
        assert_eq!(second[0].duration_ms, 500);
    }

    #[test]
    fn test_unknown_row_is_skipped_and_reported() {
        let (mut surface, keyboard) = keyboard_with_recording(&[(NoteName::C, 0, 500)]);
        // A note-shaped element dragged off every pitch row.
        let stray = surface
            .create_element(ElementSpec {
                shape: Shape::RoundRectangle,
                x: 700.0,
                y: keyboard.layout().row_of(NoteName::B) + KEY_ROW_HEIGHT * 5.0,
                width: MIN_BLOCK_WIDTH,
                height: 10.0,
                content: String::new(),
                fill: "#6881FF".into(),
            })
            .unwrap();
        surface.attach(keyboard.frame(), stray).unwrap();

        let timeline = keyboard.decode_timeline(&surface).unwrap();
        assert_eq!(timeline.note_count(), 1);
        assert_eq!(timeline.skipped(), &[stray]);
    }

    #[test]
    fn test_decode_reflects_canvas_edits() {
        // Decoding re-reads the canvas: removing a block between plays
        // removes it from the next timeline.
        let (mut surface, keyboard) = keyboard_with_recording(&[
            (NoteName::C, 0, 500),
            (NoteName::E, 1000, 1500),
        ]);
        let first = keyboard.decode_timeline(&surface).unwrap();
        assert_eq!(first.note_count(), 2);

        let removed = first.bucket(1000).unwrap()[0].source;
        surface.remove_element(removed).unwrap();

        let second = keyboard.decode_timeline(&surface).unwrap();
        assert_eq!(second.note_count(), 1);
        assert!(second.bucket(1000).is_none());
    }

    #[test]
    fn test_empty_frame_decodes_empty() {
        let mut surface = MemorySurface::new();
        let keyboard = Keyboard::create(&mut surface).unwrap();
        let timeline = keyboard.decode_timeline(&surface).unwrap();
        assert!(timeline.is_empty());
        assert_eq!(timeline.bucket_count(), 0);
    }
}
