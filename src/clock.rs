//! Cooperative timer wheel.
//!
//! All board timing (head markers, note growth, playback dispatch, highlight
//! expiry) runs on scheduled callbacks, never on threads or blocking sleeps.
//! Each scheduled action returns a [`TimerToken`]; whichever session started
//! the timer keeps the token and cancels it on the session's terminating
//! transition. The host pumps the wheel with a monotonic millisecond clock.
//!
//! [`Timers::poll`] emits one fire per elapsed interval of a repeating timer,
//! so a host loop that polls coarsely still observes every tick in order and
//! the dispatch counter cannot drift.

/// Cancellation handle for a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken(u64);

#[derive(Debug, Clone, Copy)]
enum Repeat {
    Once,
    Every(u64),
}

#[derive(Debug)]
struct TimerEntry {
    token: TimerToken,
    due_ms: u64,
    repeat: Repeat,
}

/// A single-threaded collection of pending timers.
#[derive(Debug, Default)]
pub struct Timers {
    entries: Vec<TimerEntry>,
    next_token: u64,
}

impl Timers {
    /// Creates an empty wheel.
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self) -> TimerToken {
        self.next_token += 1;
        TimerToken(self.next_token)
    }

    /// Schedules a repeating timer firing every `interval_ms`, first due at
    /// `now_ms + interval_ms`.
    ///
    /// `interval_ms` must be non-zero.
    pub fn every(&mut self, now_ms: u64, interval_ms: u64) -> TimerToken {
        debug_assert!(interval_ms > 0);
        let token = self.allocate();
        self.entries.push(TimerEntry {
            token,
            due_ms: now_ms + interval_ms,
            repeat: Repeat::Every(interval_ms.max(1)),
        });
        token
    }

    /// Schedules a one-shot timer due at `now_ms + delay_ms`.
    pub fn once(&mut self, now_ms: u64, delay_ms: u64) -> TimerToken {
        let token = self.allocate();
        self.entries.push(TimerEntry {
            token,
            due_ms: now_ms + delay_ms,
            repeat: Repeat::Once,
        });
        token
    }

    /// Cancels a timer.
    ///
    /// Returns true if the timer was still pending. Cancelling an unknown or
    /// already-fired token is a no-op; repeated cancels must not fault.
    pub fn cancel(&mut self, token: TimerToken) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.token != token);
        self.entries.len() != before
    }

    /// Returns the number of pending timers.
    #[allow(dead_code)]
    pub fn pending(&self) -> usize {
        self.entries.len()
    }

    /// Fires all timers due at or before `now_ms`, in due-time order.
    ///
    /// Repeating timers that fell multiple intervals behind emit one fire per
    /// missed interval. One-shot timers are removed after firing.
    pub fn poll(&mut self, now_ms: u64) -> Vec<TimerToken> {
        let mut fired = Vec::new();
        loop {
            // Earliest due entry still at or before now. Scanning is fine at
            // the handful of timers a keyboard ever has live.
            let next = self
                .entries
                .iter()
                .enumerate()
                .filter(|(_, e)| e.due_ms <= now_ms)
                .min_by_key(|(_, e)| e.due_ms)
                .map(|(i, _)| i);
            let Some(idx) = next else {
                break;
            };
            let token = self.entries[idx].token;
            match self.entries[idx].repeat {
                Repeat::Once => {
                    self.entries.remove(idx);
                }
                Repeat::Every(interval) => {
                    self.entries[idx].due_ms += interval;
                }
            }
            fired.push(token);
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeating_fires_each_interval() {
        let mut timers = Timers::new();
        let tick = timers.every(0, 50);
        assert!(timers.poll(49).is_empty());
        assert_eq!(timers.poll(50), vec![tick]);
        assert_eq!(timers.poll(100), vec![tick]);
    }

    #[test]
    fn test_catch_up_fires_once_per_missed_interval() {
        let mut timers = Timers::new();
        let tick = timers.every(0, 50);
        // Polling late at 200ms owes four fires.
        assert_eq!(timers.poll(200), vec![tick, tick, tick, tick]);
        assert!(timers.poll(200).is_empty());
    }

    #[test]
    fn test_once_fires_once() {
        let mut timers = Timers::new();
        let token = timers.once(100, 30);
        assert!(timers.poll(129).is_empty());
        assert_eq!(timers.poll(129 + 1), vec![token]);
        assert!(timers.poll(1000).is_empty());
        assert_eq!(timers.pending(), 0);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let mut timers = Timers::new();
        let token = timers.every(0, 50);
        assert!(timers.cancel(token));
        assert!(!timers.cancel(token));
        assert!(timers.poll(500).is_empty());
    }

    #[test]
    fn test_interleaved_fires_in_due_order() {
        let mut timers = Timers::new();
        let slow = timers.every(0, 100);
        let fast = timers.every(0, 50);
        let fired = timers.poll(100);
        assert_eq!(fired, vec![fast, slow, fast]);
    }
}
