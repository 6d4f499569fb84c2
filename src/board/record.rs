//! Recording sessions.
//!
//! While recording, NoteOn/NoteOff calls become persisted note blocks in the
//! frame's recording area. A head marker walks right on a fixed tick so the
//! performer can see where they are, and each held note carries its own
//! growth tick that widens the in-progress block until NoteOff finalizes it.
//!
//! Block geometry is written exactly (`x = origin + start_ms * scale`,
//! `width = duration_ms * scale`); no rounding happens on this side of the
//! codec.

use super::{BoardError, BoardGeometry, HEAD_TICK_MS, MIN_BLOCK_WIDTH, PX_PER_MS, PitchLayout};
use crate::clock::{TimerToken, Timers};
use crate::note::NoteName;
use crate::surface::{ElementId, ElementPatch, ElementSpec, Shape, Surface};
use std::collections::HashMap;

/// Transient state for one held note, alive between NoteOn and NoteOff.
#[derive(Debug)]
struct ActiveNote {
    /// Offset of the NoteOn, in ms since the recording started.
    start_ms: u64,
    /// The in-progress block element (not yet attached to the frame).
    block: ElementId,
    /// Cancellation handle for this note's growth tick.
    growth: TimerToken,
}

/// State for one recording session, alive between start and stop.
#[derive(Debug)]
struct RecordingSession {
    /// Absolute time the session started, anchoring note-relative offsets.
    started_at_ms: u64,
    /// The moving head marker element.
    head: ElementId,
    /// Current head center x, tracked locally to avoid read-back each tick.
    head_x: f64,
    /// Cancellation handle for the head tick.
    head_tick: TimerToken,
    /// Held notes, at most one per pitch class.
    active: HashMap<NoteName, ActiveNote>,
}

/// Turns live note events into persisted note blocks.
///
/// State machine: Idle → Recording → Idle. All timers a session starts are
/// cancelled exactly once when the session ends.
#[derive(Debug, Default)]
pub struct Recorder {
    timers: Timers,
    session: Option<RecordingSession>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a session is active.
    pub fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    /// Starts a session: creates the head marker at the recording origin and
    /// schedules its tick.
    ///
    /// Returns `Ok(false)` if already recording. The running session is kept
    /// as-is; a second head tick is never spawned.
    pub fn start<S: Surface>(
        &mut self,
        surface: &mut S,
        geometry: &BoardGeometry,
        now_ms: u64,
    ) -> Result<bool, BoardError> {
        if self.session.is_some() {
            tracing::debug!("start_recording ignored: session already active");
            return Ok(false);
        }
        let head = surface.create_element(ElementSpec {
            shape: Shape::Rectangle,
            x: geometry.origin_x,
            y: geometry.center_y,
            width: MIN_BLOCK_WIDTH,
            height: geometry.height * 2.0,
            content: String::new(),
            fill: super::HEAD_FILL.to_string(),
        })?;
        let head_tick = self.timers.every(now_ms, HEAD_TICK_MS);
        self.session = Some(RecordingSession {
            started_at_ms: now_ms,
            head,
            head_x: geometry.origin_x,
            head_tick,
            active: HashMap::new(),
        });
        tracing::debug!(now_ms, "recording started");
        Ok(true)
    }

    /// Ends the session: cancels every timer it started and removes the head
    /// marker. Notes still held are discarded; their half-formed blocks were
    /// never attached to the frame, so they are removed rather than leaked.
    ///
    /// Returns `Ok(false)` if not recording.
    pub fn stop<S: Surface>(&mut self, surface: &mut S) -> Result<bool, BoardError> {
        let Some(session) = self.session.take() else {
            return Ok(false);
        };
        self.timers.cancel(session.head_tick);
        surface.remove_element(session.head)?;
        if !session.active.is_empty() {
            tracing::warn!(
                held = session.active.len(),
                "recording stopped with notes still held; discarding them"
            );
        }
        for (_, note) in session.active {
            self.timers.cancel(note.growth);
            surface.remove_element(note.block)?;
        }
        tracing::debug!("recording stopped");
        Ok(true)
    }

    /// Opens a note block for `note` at `start_ms` since the recording began.
    ///
    /// Returns `Ok(false)` when not recording, or when the note is already
    /// held. A repeated NoteOn for a sounding key never retriggers; the key
    /// stays held until its NoteOff.
    pub fn start_note<S: Surface>(
        &mut self,
        surface: &mut S,
        geometry: &BoardGeometry,
        layout: &PitchLayout,
        note: NoteName,
        start_ms: u64,
    ) -> Result<bool, BoardError> {
        let Some(session) = self.session.as_mut() else {
            tracing::debug!(%note, "start_note ignored: not recording");
            return Ok(false);
        };
        if session.active.contains_key(&note) {
            tracing::debug!(%note, "start_note ignored: note already held");
            return Ok(false);
        }
        let block = surface.create_element(ElementSpec {
            shape: Shape::RoundRectangle,
            x: geometry.origin_x + start_ms as f64 * PX_PER_MS + MIN_BLOCK_WIDTH / 2.0,
            y: layout.row_of(note),
            width: MIN_BLOCK_WIDTH,
            height: super::KEY_ROW_HEIGHT * 2.0 / 3.0,
            content: format!("<p>{note}</p>"),
            fill: super::BLOCK_FILL.to_string(),
        })?;
        let growth = self
            .timers
            .every(session.started_at_ms + start_ms, HEAD_TICK_MS);
        session.active.insert(
            note,
            ActiveNote {
                start_ms,
                block,
                growth,
            },
        );
        Ok(true)
    }

    /// Finalizes the block for `note` at `finish_ms` since the recording
    /// began: cancels its growth tick, writes the exact duration-scaled
    /// geometry, and attaches the block to the frame.
    ///
    /// Returns `Ok(false)` when not recording or when the note was never
    /// started. A finish before the start yields a minimum-width block, never
    /// a negative duration.
    pub fn stop_note<S: Surface>(
        &mut self,
        surface: &mut S,
        geometry: &BoardGeometry,
        note: NoteName,
        finish_ms: u64,
    ) -> Result<bool, BoardError> {
        let Some(session) = self.session.as_mut() else {
            tracing::debug!(%note, "stop_note ignored: not recording");
            return Ok(false);
        };
        let Some(active) = session.active.remove(&note) else {
            tracing::debug!(%note, "stop_note ignored: note not held");
            return Ok(false);
        };
        self.timers.cancel(active.growth);

        let duration_ms = finish_ms.saturating_sub(active.start_ms);
        let width = (duration_ms as f64 * PX_PER_MS).max(MIN_BLOCK_WIDTH);
        let x = geometry.origin_x + active.start_ms as f64 * PX_PER_MS + width / 2.0;
        surface.update_element(active.block, ElementPatch::resize_x(x, width))?;

        // The block's geometry is already persisted; losing the grouping is
        // survivable, so an attach failure is logged and swallowed.
        if let Err(err) = surface.attach(geometry.frame, active.block) {
            tracing::warn!(%note, %err, "could not group note block into frame");
        }
        Ok(true)
    }

    /// Pumps the session's timers up to `now_ms`: advances the head marker
    /// and widens every held note's block, persisting each change.
    pub fn advance<S: Surface>(&mut self, surface: &mut S, now_ms: u64) -> Result<(), BoardError> {
        let fired = self.timers.poll(now_ms);
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        let walk = PX_PER_MS * HEAD_TICK_MS as f64;
        for token in fired {
            if token == session.head_tick {
                session.head_x += walk;
                surface.update_element(session.head, ElementPatch::move_x(session.head_x))?;
                if let Err(err) = surface.focus(session.head) {
                    tracing::warn!(%err, "could not follow recording head");
                }
            } else if let Some(active) = session.active.values().find(|a| a.growth == token) {
                // Widen while keeping the left edge fixed.
                let block = surface.element(active.block)?;
                surface.update_element(
                    active.block,
                    ElementPatch::resize_x(block.x + walk / 2.0, block.width + walk),
                )?;
            }
            // Stale tokens from sessions that already ended are ignored.
        }
        Ok(())
    }
}
