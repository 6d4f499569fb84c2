//! Playback sessions.
//!
//! A session consumes a freshly decoded [`Timeline`] and walks it in
//! simulated time: an elapsed counter advances by the dispatch granularity on
//! every dispatch tick, and whenever the timeline has a bucket at the new
//! elapsed value every note in it is handed to the caller's trigger callback.
//! A head marker rides its own slower tick, and each triggered note gets a
//! transient highlight overlay over its source block that expires after the
//! note's duration.
//!
//! The session ends when every bucket has been dispatched (completion) or on
//! an explicit stop; either way every timer the session started is cancelled
//! exactly once and the end callback fires exactly once.

use super::timeline::Timeline;
use super::{BoardError, BoardGeometry, DISPATCH_TICK_MS, HEAD_TICK_MS, MIN_BLOCK_WIDTH, PX_PER_MS};
use crate::clock::{TimerToken, Timers};
use crate::note::NoteName;
use crate::surface::{ElementId, ElementPatch, ElementSpec, Shape, Surface};

/// Callback invoked once per note at its quantized start offset.
pub type NoteCallback = Box<dyn FnMut(NoteName, u64)>;

/// Callback invoked exactly once when a session ends.
pub type StopCallback = Box<dyn FnOnce()>;

/// A highlight overlay waiting for its expiry timer.
#[derive(Debug)]
struct Highlight {
    token: TimerToken,
    overlay: ElementId,
}

/// State for one playback session, alive between play and completion/stop.
struct PlaybackSession {
    /// Absolute time playback started, anchoring highlight expiries.
    started_at_ms: u64,
    /// The moving head marker element.
    head: ElementId,
    /// Current head center x, tracked locally to avoid read-back each tick.
    head_x: f64,
    /// Cancellation handle for the head tick.
    head_tick: TimerToken,
    /// Cancellation handle for the dispatch tick.
    dispatch_tick: TimerToken,
    /// Simulated elapsed time, advanced by the dispatch granularity.
    elapsed_ms: u64,
    /// Buckets already fully dispatched.
    dispatched: usize,
    /// Total distinct start offsets; the session completes when
    /// `dispatched` reaches this.
    total: usize,
    timeline: Timeline,
    on_note: NoteCallback,
    on_stop: Option<StopCallback>,
}

/// Replays a decoded timeline against caller-supplied callbacks.
///
/// State machine: Idle → Playing → (Completed | Stopped) → Idle. At most one
/// session per keyboard; a re-entrant play supersedes the running session.
#[derive(Default)]
pub struct Player {
    timers: Timers,
    session: Option<PlaybackSession>,
    /// Outstanding highlight overlays. Kept outside the session so the
    /// overlays of the final notes can drain after natural completion.
    highlights: Vec<Highlight>,
}

impl Player {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a session is active.
    pub fn is_playing(&self) -> bool {
        self.session.is_some()
    }

    /// Starts a session over `timeline`.
    ///
    /// An empty timeline completes immediately: `on_stop` fires and no
    /// session is created. The bucket at offset 0, if any, is dispatched
    /// synchronously so a note recorded at the very start sounds at elapsed
    /// 0 rather than one dispatch interval late.
    pub fn play<S: Surface>(
        &mut self,
        surface: &mut S,
        geometry: &BoardGeometry,
        timeline: Timeline,
        now_ms: u64,
        on_note: NoteCallback,
        on_stop: StopCallback,
    ) -> Result<(), BoardError> {
        if self.session.is_some() {
            tracing::debug!("play superseding the running session");
            self.stop(surface)?;
        }
        let total = timeline.bucket_count();
        if total == 0 {
            tracing::debug!("nothing recorded; playback completes immediately");
            on_stop();
            return Ok(());
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
        let dispatch_tick = self.timers.every(now_ms, DISPATCH_TICK_MS);
        self.session = Some(PlaybackSession {
            started_at_ms: now_ms,
            head,
            head_x: geometry.origin_x,
            head_tick,
            dispatch_tick,
            elapsed_ms: 0,
            dispatched: 0,
            total,
            timeline,
            on_note,
            on_stop: Some(on_stop),
        });
        tracing::debug!(buckets = total, "playback started");

        let mut completed = false;
        if let Some(session) = self.session.as_mut() {
            Self::dispatch_bucket(surface, &mut self.timers, &mut self.highlights, session)?;
            completed = session.dispatched == session.total;
        }
        if completed {
            self.finish(surface)?;
        }
        Ok(())
    }

    /// Stops the session immediately, removing the head marker and every
    /// outstanding highlight overlay. The end callback fires if the session
    /// had not already signaled. Safe to call when idle, and idempotent.
    pub fn stop<S: Surface>(&mut self, surface: &mut S) -> Result<(), BoardError> {
        if let Some(mut session) = self.session.take() {
            self.timers.cancel(session.head_tick);
            self.timers.cancel(session.dispatch_tick);
            surface.remove_element(session.head)?;
            if let Some(on_stop) = session.on_stop.take() {
                on_stop();
            }
            tracing::debug!("playback stopped");
        }
        for highlight in self.highlights.drain(..) {
            self.timers.cancel(highlight.token);
            surface.remove_element(highlight.overlay)?;
        }
        Ok(())
    }

    /// Pumps the session's timers up to `now_ms`: advances the head marker,
    /// runs due dispatch ticks, and expires due highlights.
    pub fn advance<S: Surface>(&mut self, surface: &mut S, now_ms: u64) -> Result<(), BoardError> {
        let fired = self.timers.poll(now_ms);
        let mut completed = false;
        for token in fired {
            if let Some(pos) = self.highlights.iter().position(|h| h.token == token) {
                let highlight = self.highlights.remove(pos);
                surface.remove_element(highlight.overlay)?;
                continue;
            }
            let Some(session) = self.session.as_mut() else {
                // Stale tick from a session that ended earlier in this poll.
                continue;
            };
            if token == session.head_tick {
                session.head_x += PX_PER_MS * HEAD_TICK_MS as f64;
                surface.update_element(session.head, ElementPatch::move_x(session.head_x))?;
                if let Err(err) = surface.focus(session.head) {
                    tracing::warn!(%err, "could not follow playback head");
                }
            } else if token == session.dispatch_tick {
                session.elapsed_ms += DISPATCH_TICK_MS;
                Self::dispatch_bucket(surface, &mut self.timers, &mut self.highlights, session)?;
                completed = session.dispatched == session.total;
            }
        }
        if completed {
            self.finish(surface)?;
        }
        Ok(())
    }

    /// Dispatches the bucket at the session's current elapsed time, if the
    /// timeline has one: triggers every note in recorded order and lays a
    /// highlight overlay over each source block for the note's duration.
    fn dispatch_bucket<S: Surface>(
        surface: &mut S,
        timers: &mut Timers,
        highlights: &mut Vec<Highlight>,
        session: &mut PlaybackSession,
    ) -> Result<(), BoardError> {
        let Some(bucket) = session.timeline.bucket(session.elapsed_ms) else {
            return Ok(());
        };
        // The bucket is cloned so the trigger callback can re-borrow freely.
        let entries: Vec<_> = bucket.to_vec();
        for entry in entries {
            (session.on_note)(entry.note, entry.duration_ms);
            match surface.element(entry.source) {
                Ok(block) => {
                    let overlay = surface.create_element(ElementSpec {
                        shape: Shape::RoundRectangle,
                        x: block.x,
                        y: block.y,
                        width: block.width,
                        height: block.height,
                        content: String::new(),
                        fill: super::HIGHLIGHT_FILL.to_string(),
                    })?;
                    let expiry = session.started_at_ms + session.elapsed_ms;
                    let token = timers.once(expiry, entry.duration_ms.max(DISPATCH_TICK_MS));
                    highlights.push(Highlight { token, overlay });
                }
                Err(err) => {
                    // The block vanished between decode and dispatch; the
                    // note still sounds, only the highlight is lost.
                    tracing::warn!(%err, "source block gone; skipping highlight");
                }
            }
        }
        session.dispatched += 1;
        Ok(())
    }

    /// Natural completion: cancels both ticks, removes the head marker, and
    /// signals the end callback. Outstanding highlights are left to expire on
    /// their own timers.
    fn finish<S: Surface>(&mut self, surface: &mut S) -> Result<(), BoardError> {
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };
        self.timers.cancel(session.head_tick);
        self.timers.cancel(session.dispatch_tick);
        surface.remove_element(session.head)?;
        if let Some(on_stop) = session.on_stop.take() {
            on_stop();
        }
        tracing::debug!(buckets = session.total, "playback completed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Keyboard;
    use crate::surface::MemorySurface;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Shared journal of callback activity for a playback test.
    #[derive(Default)]
    struct Journal {
        notes: Vec<(NoteName, u64)>,
        stops: usize,
    }

    fn start_playback(
        surface: &mut MemorySurface,
        keyboard: &mut Keyboard,
        now_ms: u64,
    ) -> Rc<RefCell<Journal>> {
        let journal = Rc::new(RefCell::new(Journal::default()));
        let notes = Rc::clone(&journal);
        let stops = Rc::clone(&journal);
        keyboard
            .play(
                surface,
                now_ms,
                move |note, duration| notes.borrow_mut().notes.push((note, duration)),
                move || stops.borrow_mut().stops += 1,
            )
            .unwrap();
        journal
    }

    fn keyboard_with_recording(
        notes: &[(NoteName, u64, u64)],
    ) -> (MemorySurface, Keyboard) {
        let mut surface = MemorySurface::new();
        let mut keyboard = Keyboard::create(&mut surface).unwrap();
        keyboard.start_recording(&mut surface, 0).unwrap();
        for &(note, start, finish) in notes {
            keyboard.start_note(&mut surface, note, start).unwrap();
            keyboard.stop_note(&mut surface, note, finish).unwrap();
        }
        keyboard.stop_recording(&mut surface).unwrap();
        (surface, keyboard)
    }

    #[test]
    fn test_empty_timeline_completes_immediately() {
        let mut surface = MemorySurface::new();
        let mut keyboard = Keyboard::create(&mut surface).unwrap();
        let journal = start_playback(&mut surface, &mut keyboard, 0);
        assert!(!keyboard.is_playing());
        assert_eq!(journal.borrow().stops, 1);
        assert!(journal.borrow().notes.is_empty());
    }

    #[test]
    fn test_three_notes_three_triggers_one_stop() {
        let (mut surface, mut keyboard) = keyboard_with_recording(&[
            (NoteName::C, 0, 400),
            (NoteName::E, 1000, 1400),
            (NoteName::G, 2000, 2400),
        ]);
        let journal = start_playback(&mut surface, &mut keyboard, 0);

        // Note at offset 0 sounds before any tick.
        assert_eq!(journal.borrow().notes.len(), 1);
        assert_eq!(journal.borrow().stops, 0);

        // Walk simulated time in dispatch-sized steps well past the end.
        for now in (50..=3000).step_by(50) {
            keyboard.advance(&mut surface, now).unwrap();
        }
        let journal = journal.borrow();
        assert_eq!(
            journal.notes,
            vec![
                (NoteName::C, 400),
                (NoteName::E, 400),
                (NoteName::G, 400)
            ]
        );
        assert_eq!(journal.stops, 1);
        assert!(!keyboard.is_playing());
    }

    #[test]
    fn test_staggered_notes_dispatch_at_their_offsets() {
        // C at 0-500, E at 200-700: E fires only once elapsed reaches 200,
        // and the stop fires right after the second bucket, not before.
        let (mut surface, mut keyboard) = keyboard_with_recording(&[
            (NoteName::C, 0, 500),
            (NoteName::E, 200, 700),
        ]);
        let journal = start_playback(&mut surface, &mut keyboard, 0);
        assert_eq!(journal.borrow().notes, vec![(NoteName::C, 500)]);

        keyboard.advance(&mut surface, 150).unwrap();
        assert_eq!(journal.borrow().notes.len(), 1);
        assert_eq!(journal.borrow().stops, 0);

        keyboard.advance(&mut surface, 200).unwrap();
        let journal = journal.borrow();
        assert_eq!(
            journal.notes,
            vec![(NoteName::C, 500), (NoteName::E, 500)]
        );
        assert_eq!(journal.stops, 1);
        assert!(!keyboard.is_playing());
    }

    #[test]
    fn test_chord_triggers_together_in_recorded_order() {
        let (mut surface, mut keyboard) = keyboard_with_recording(&[
            (NoteName::G, 500, 900),
            (NoteName::C, 500, 1100),
        ]);
        let journal = start_playback(&mut surface, &mut keyboard, 0);
        for now in (50..=600).step_by(50) {
            keyboard.advance(&mut surface, now).unwrap();
        }
        let journal = journal.borrow();
        assert_eq!(
            journal.notes,
            vec![(NoteName::G, 400), (NoteName::C, 600)]
        );
        assert_eq!(journal.stops, 1);
    }

    #[test]
    fn test_stop_playing_twice_is_safe() {
        let (mut surface, mut keyboard) =
            keyboard_with_recording(&[(NoteName::C, 1000, 1500)]);
        let journal = start_playback(&mut surface, &mut keyboard, 0);
        let before = surface.element_count();

        keyboard.stop_playing(&mut surface).unwrap();
        assert!(!keyboard.is_playing());
        // Head marker removed once.
        assert_eq!(surface.element_count(), before - 1);
        assert_eq!(journal.borrow().stops, 1);

        keyboard.stop_playing(&mut surface).unwrap();
        assert_eq!(surface.element_count(), before - 1);
        assert_eq!(journal.borrow().stops, 1);
        assert_eq!(journal.borrow().notes.len(), 0);
    }

    #[test]
    fn test_replay_supersedes_running_session() {
        let (mut surface, mut keyboard) =
            keyboard_with_recording(&[(NoteName::C, 500, 900)]);
        let first = start_playback(&mut surface, &mut keyboard, 0);
        keyboard.advance(&mut surface, 100).unwrap();
        assert!(keyboard.is_playing());

        let second = start_playback(&mut surface, &mut keyboard, 100);
        // The first session signaled its end when superseded.
        assert_eq!(first.borrow().stops, 1);
        assert_eq!(second.borrow().stops, 0);

        // The new session starts its elapsed counter from zero.
        for now in (150..=700).step_by(50) {
            keyboard.advance(&mut surface, now).unwrap();
        }
        assert_eq!(second.borrow().notes, vec![(NoteName::C, 400)]);
        assert_eq!(second.borrow().stops, 1);
    }

    #[test]
    fn test_highlight_overlay_expires_after_duration() {
        let (mut surface, mut keyboard) =
            keyboard_with_recording(&[(NoteName::C, 0, 300)]);
        let baseline = surface.element_count();
        let _journal = start_playback(&mut surface, &mut keyboard, 0);
        // The single bucket sits at offset 0, so the session completes inside
        // play(): the head marker is already gone, but the note's highlight
        // overlay drains on its own timer.
        assert!(!keyboard.is_playing());
        assert_eq!(surface.element_count(), baseline + 1);

        keyboard.advance(&mut surface, 299).unwrap();
        assert_eq!(surface.element_count(), baseline + 1);
        keyboard.advance(&mut surface, 300).unwrap();
        assert_eq!(surface.element_count(), baseline);
    }

    #[test]
    fn test_playback_head_advances_on_its_own_tick() {
        let (mut surface, mut keyboard) =
            keyboard_with_recording(&[(NoteName::C, 2000, 2500)]);
        let _journal = start_playback(&mut surface, &mut keyboard, 0);
        let head = keyboard.player.session.as_ref().unwrap().head;
        let origin = keyboard.geometry.origin_x;

        keyboard.advance(&mut surface, 499).unwrap();
        assert_eq!(surface.element(head).unwrap().x, origin);
        keyboard.advance(&mut surface, 500).unwrap();
        assert_eq!(
            surface.element(head).unwrap().x,
            origin + PX_PER_MS * HEAD_TICK_MS as f64
        );
    }
}
