//! Keyboard boards on the canvas surface.
//!
//! A keyboard is one frame on the canvas holding twelve key shapes (one row
//! per pitch class) and, to the right of the keys, a recording area where
//! performances persist as geometry: a note block's `x` and `width` encode
//! start offset and duration through the fixed [`PX_PER_MS`] scale, and its
//! `y` is the pitch row. The frame's children are the storage format; there
//! is no record database behind it.
//!
//! [`Keyboard`] is the facade: it owns the frame reference, the pitch layout,
//! and at most one recording and one playback session at a time.

pub mod playback;
pub mod record;
pub mod timeline;

use crate::note::NoteName;
use crate::surface::{Element, ElementId, ElementSpec, Shape, Surface, SurfaceError};
use playback::Player;
use record::Recorder;
use thiserror::Error;
use timeline::Timeline;

/// Horizontal pixels per millisecond of performance time.
///
/// The one scale applied in both directions: encoding multiplies by it,
/// decoding divides by it. Encoded positions are exact; rounding happens
/// only in the decoder.
pub const PX_PER_MS: f64 = 0.1;

/// Interval of the head-marker ticks (recording and playback).
pub const HEAD_TICK_MS: u64 = 500;

/// Interval of the playback dispatch tick, and the quantization step that
/// decoded start offsets are floored to.
pub const DISPATCH_TICK_MS: u64 = 50;

/// Initial (and minimum) width of a note block, in pixels.
pub const MIN_BLOCK_WIDTH: f64 = 8.0;

/// Padding between the frame edge and its contents.
pub const FRAME_BORDER: f64 = 100.0;

/// Width of a white key shape.
pub const KEY_WIDTH: f64 = 430.0;

/// Height of one pitch row.
pub const KEY_ROW_HEIGHT: f64 = 100.0;

/// Milliseconds of performance the recording area is sized for.
pub const RECORD_AREA_MS: u64 = 60_000;

const WHITE_KEY_FILL: &str = "#ffffff";
const BLACK_KEY_FILL: &str = "#1a1a1a";
const BLOCK_FILL: &str = "#6881FF";
const HEAD_FILL: &str = "#1a1a1a";
const HIGHLIGHT_FILL: &str = "#FFD02F";

/// Errors raised while building or operating a keyboard.
#[derive(Debug, Error)]
pub enum BoardError {
    /// A canvas surface operation failed.
    #[error(transparent)]
    Surface(#[from] SurfaceError),

    /// An existing frame is missing one of the twelve expected keys.
    #[error("keyboard frame is missing key {0}")]
    MissingKey(NoteName),
}

/// Fixed frame geometry shared by the recorder, decoder, and player.
///
/// Captured once when a keyboard is created or opened; the frame itself is
/// never moved while a session is active.
#[derive(Debug, Clone, Copy)]
pub struct BoardGeometry {
    /// The keyboard's container frame.
    pub frame: ElementId,
    /// Canvas x where recorded time starts (offset 0 ms).
    pub origin_x: f64,
    /// Vertical center of the frame, where head markers sit.
    pub center_y: f64,
    /// Frame height, sizing the head markers.
    pub height: f64,
}

impl BoardGeometry {
    fn from_frame(frame: &Element) -> Self {
        let left = frame.x - frame.width / 2.0;
        Self {
            frame: frame.id,
            origin_x: left + FRAME_BORDER + KEY_WIDTH + FRAME_BORDER,
            center_y: frame.y,
            height: frame.height,
        }
    }
}

/// Strips the host's text decoration (`<p>...</p>`) from a key label.
fn strip_decoration(content: &str) -> &str {
    let trimmed = content.trim();
    trimmed
        .strip_prefix("<p>")
        .and_then(|rest| rest.strip_suffix("</p>"))
        .unwrap_or(trimmed)
}

/// The fixed mapping between pitch classes and vertical rows on one keyboard.
///
/// Built once when the keys are first laid out, or recovered by scanning an
/// existing frame's children. Both the recorder (note → row) and the decoder
/// (row → note) go through this table.
#[derive(Debug, Clone)]
pub struct PitchLayout {
    /// Key element per pitch class, indexed by chromatic position.
    keys: [ElementId; 12],
    /// Row center y per pitch class, indexed by chromatic position.
    rows: [f64; 12],
}

impl PitchLayout {
    /// Lays out the twelve key shapes inside a freshly created frame.
    ///
    /// Keys are stacked chromatically, C in the top row. Accidentals get the
    /// narrower dark shape. A failed attach leaves the key usable (its row is
    /// still valid), so attach failures are logged and swallowed.
    pub fn build<S: Surface>(surface: &mut S, frame: &Element) -> Result<Self, BoardError> {
        let left = frame.x - frame.width / 2.0;
        let top = frame.y - frame.height / 2.0;

        let mut keys = [ElementId::default(); 12];
        let mut rows = [0.0f64; 12];
        for (index, note) in NoteName::ALL.into_iter().enumerate() {
            let row_y = top + FRAME_BORDER + KEY_ROW_HEIGHT * (index as f64 + 0.5);
            let width = if note.is_accidental() {
                KEY_WIDTH * 2.0 / 3.0
            } else {
                KEY_WIDTH
            };
            let fill = if note.is_accidental() {
                BLACK_KEY_FILL
            } else {
                WHITE_KEY_FILL
            };
            let key = surface.create_element(ElementSpec {
                shape: Shape::Rectangle,
                x: left + FRAME_BORDER + width / 2.0,
                y: row_y,
                width,
                height: KEY_ROW_HEIGHT,
                content: format!("<p>{note}</p>"),
                fill: fill.to_string(),
            })?;
            if let Err(err) = surface.attach(frame.id, key) {
                tracing::warn!(%note, %err, "could not group key into frame");
            }
            keys[index] = key;
            rows[index] = row_y;
        }
        Ok(Self { keys, rows })
    }

    /// Recovers the layout of an existing keyboard by scanning its children.
    ///
    /// Key shapes are rectangles whose label parses as a note name, in raw or
    /// decorated form. Rectangles with unreadable labels are ignored. A
    /// missing key is fatal: the frame is not a usable keyboard without all
    /// twelve rows.
    pub fn discover<S: Surface>(surface: &S, frame: ElementId) -> Result<Self, BoardError> {
        let mut keys = [None; 12];
        let mut rows = [0.0f64; 12];
        for child in surface.list_children(frame)? {
            if child.shape != Shape::Rectangle {
                continue;
            }
            let Ok(note) = strip_decoration(&child.content).parse::<NoteName>() else {
                continue;
            };
            keys[note.pitch_index()] = Some(child.id);
            rows[note.pitch_index()] = child.y;
        }
        let mut resolved = [ElementId::default(); 12];
        for (index, note) in NoteName::ALL.into_iter().enumerate() {
            resolved[index] = keys[index].ok_or(BoardError::MissingKey(note))?;
        }
        Ok(Self {
            keys: resolved,
            rows,
        })
    }

    /// Returns the key element for a pitch class.
    #[allow(dead_code)]
    pub fn key_of(&self, note: NoteName) -> ElementId {
        self.keys[note.pitch_index()]
    }

    /// Returns the row center y for a pitch class.
    pub fn row_of(&self, note: NoteName) -> f64 {
        self.rows[note.pitch_index()]
    }

    /// Maps a vertical position back to its pitch class, if it lands on a
    /// known row. Positions off every row decode to `None`; callers must
    /// treat that as malformed data, not crash.
    pub fn note_at_row(&self, y: f64) -> Option<NoteName> {
        NoteName::ALL
            .into_iter()
            .find(|note| (self.rows[note.pitch_index()] - y).abs() < 0.5)
    }
}

/// One virtual keyboard bound to a frame on a canvas surface.
pub struct Keyboard {
    geometry: BoardGeometry,
    layout: PitchLayout,
    recorder: Recorder,
    player: Player,
}

impl Keyboard {
    /// Creates a new keyboard: a frame sized for [`RECORD_AREA_MS`] of
    /// performance, with the twelve keys laid out inside it.
    pub fn create<S: Surface>(surface: &mut S) -> Result<Self, BoardError> {
        let height = KEY_ROW_HEIGHT * 12.0 + FRAME_BORDER * 2.0;
        let width =
            KEY_WIDTH + FRAME_BORDER * 2.0 + RECORD_AREA_MS as f64 * PX_PER_MS + FRAME_BORDER;
        let frame_id = surface.create_element(ElementSpec {
            shape: Shape::Frame,
            x: width / 2.0,
            y: height / 2.0,
            width,
            height,
            content: String::new(),
            fill: WHITE_KEY_FILL.to_string(),
        })?;
        let frame = surface.element(frame_id)?;
        let layout = PitchLayout::build(surface, &frame)?;
        tracing::debug!(frame = frame_id.as_u64(), "created keyboard");
        Ok(Self {
            geometry: BoardGeometry::from_frame(&frame),
            layout,
            recorder: Recorder::new(),
            player: Player::new(),
        })
    }

    /// Opens an existing keyboard, rediscovering its layout from the frame's
    /// children.
    pub fn open<S: Surface>(surface: &S, frame: ElementId) -> Result<Self, BoardError> {
        let frame = surface.element(frame)?;
        let layout = PitchLayout::discover(surface, frame.id)?;
        Ok(Self {
            geometry: BoardGeometry::from_frame(&frame),
            layout,
            recorder: Recorder::new(),
            player: Player::new(),
        })
    }

    /// The keyboard's container frame.
    #[allow(dead_code)]
    pub fn frame(&self) -> ElementId {
        self.geometry.frame
    }

    /// The keyboard's pitch layout.
    #[allow(dead_code)]
    pub fn layout(&self) -> &PitchLayout {
        &self.layout
    }

    /// Whether a recording session is active.
    #[allow(dead_code)]
    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    /// Whether a playback session is active.
    pub fn is_playing(&self) -> bool {
        self.player.is_playing()
    }

    /// Starts a recording session. Returns `Ok(false)` if one is already
    /// running (the running session keeps its head tick; it is never
    /// duplicated).
    pub fn start_recording<S: Surface>(
        &mut self,
        surface: &mut S,
        now_ms: u64,
    ) -> Result<bool, BoardError> {
        self.recorder.start(surface, &self.geometry, now_ms)
    }

    /// Stops the recording session, if any.
    pub fn stop_recording<S: Surface>(&mut self, surface: &mut S) -> Result<bool, BoardError> {
        self.recorder.stop(surface)
    }

    /// Begins a note block at `start_ms` since the recording started.
    /// Returns `Ok(false)` when not recording or when the note is already
    /// sounding.
    pub fn start_note<S: Surface>(
        &mut self,
        surface: &mut S,
        note: NoteName,
        start_ms: u64,
    ) -> Result<bool, BoardError> {
        self.recorder
            .start_note(surface, &self.geometry, &self.layout, note, start_ms)
    }

    /// Finalizes a note block at `finish_ms` since the recording started.
    /// Returns `Ok(false)` when not recording or when the note was never
    /// started.
    pub fn stop_note<S: Surface>(
        &mut self,
        surface: &mut S,
        note: NoteName,
        finish_ms: u64,
    ) -> Result<bool, BoardError> {
        self.recorder
            .stop_note(surface, &self.geometry, note, finish_ms)
    }

    /// Decodes the frame's current note blocks into a timeline.
    ///
    /// Runs fresh on every call: the canvas is the source of truth and may
    /// have been edited since the recording was made.
    pub fn decode_timeline<S: Surface>(&self, surface: &S) -> Result<Timeline, BoardError> {
        timeline::decode(surface, &self.geometry, &self.layout)
    }

    /// Starts playback of the frame's current note blocks.
    ///
    /// `on_note` fires once per decoded note at its quantized start offset;
    /// `on_stop` fires exactly once when the session ends, whether it runs to
    /// completion or is stopped. A session already playing on this keyboard
    /// is stopped and superseded.
    pub fn play<S, F, G>(
        &mut self,
        surface: &mut S,
        now_ms: u64,
        on_note: F,
        on_stop: G,
    ) -> Result<(), BoardError>
    where
        S: Surface,
        F: FnMut(NoteName, u64) + 'static,
        G: FnOnce() + 'static,
    {
        let timeline = self.decode_timeline(surface)?;
        self.player.play(
            surface,
            &self.geometry,
            timeline,
            now_ms,
            Box::new(on_note),
            Box::new(on_stop),
        )
    }

    /// Stops playback immediately. Safe to call when not playing, and safe
    /// to call twice.
    pub fn stop_playing<S: Surface>(&mut self, surface: &mut S) -> Result<(), BoardError> {
        self.player.stop(surface)
    }

    /// Pumps both session timer wheels up to `now_ms`.
    ///
    /// The host calls this from its event loop; all head motion, note growth,
    /// dispatch, and highlight expiry happens here.
    pub fn advance<S: Surface>(&mut self, surface: &mut S, now_ms: u64) -> Result<(), BoardError> {
        self.recorder.advance(surface, now_ms)?;
        self.player.advance(surface, now_ms)?;
        Ok(())
    }
}
