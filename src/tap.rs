/// Tap sequence detector for the single user button.
///
/// Raw button levels are polled every few milliseconds and debounced: a level
/// only counts once it has been stable for the debounce time. Each accepted
/// press edge either extends the running sequence (gap strictly less than
/// the tap window) or starts a new one. A sequence is reported when it reaches
/// the configured maximum tap count, or once the window has passed with no
/// further press.
use crate::config::NodeConfig;

/// A classified tap sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapEvent {
    /// Number of presses in the sequence, 1..=max_taps
    pub count: u8,
    /// Milliseconds since boot when the sequence was classified
    pub timestamp_ms: u64,
}

/// Where the detector currently is in a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapPhase {
    /// No sequence in progress
    Idle,
    /// A raw level change is waiting out the debounce time
    Debouncing,
    /// At least one press counted, window still open
    CountingOpen,
    /// A sequence was just reported
    CountingClosed,
}

pub struct TapDetector {
    debounce_ms: u64,
    window_ms: u64,
    max_taps: u8,
    /// Last raw sample and when it last changed
    raw: bool,
    raw_since: u64,
    /// Debounced level
    stable: bool,
    count: u8,
    last_press: u64,
    phase: TapPhase,
}

impl TapDetector {
    pub const fn new(debounce_ms: u32, window_ms: u32, max_taps: u8) -> Self {
        Self {
            debounce_ms: debounce_ms as u64,
            window_ms: window_ms as u64,
            max_taps: if max_taps == 0 { 1 } else { max_taps },
            raw: false,
            raw_since: 0,
            stable: false,
            count: 0,
            last_press: 0,
            phase: TapPhase::Idle,
        }
    }

    pub const fn from_config(config: &NodeConfig) -> Self {
        Self::new(config.debounce_ms, config.tap_window_ms, config.max_taps)
    }

    pub fn phase(&self) -> TapPhase {
        self.phase
    }

    /// Feed one raw sample (`true` = pressed). Returns a tap event when a
    /// sequence is complete.
    pub fn update(&mut self, pressed: bool, now_ms: u64) -> Option<TapEvent> {
        if pressed != self.raw {
            self.raw = pressed;
            self.raw_since = now_ms;
        }

        if self.raw != self.stable {
            if now_ms.saturating_sub(self.raw_since) >= self.debounce_ms {
                self.stable = self.raw;
                if self.stable {
                    return self.on_press(self.raw_since, now_ms);
                }
            } else {
                // A settling press that falls inside the window may still
                // extend the open sequence, so don't close it yet.
                let extends = self.raw
                    && self.count > 0
                    && self.raw_since.saturating_sub(self.last_press) < self.window_ms;
                if !extends {
                    if let Some(event) = self.expire(now_ms) {
                        return Some(event);
                    }
                }
                self.phase = TapPhase::Debouncing;
                return None;
            }
        }

        self.expire(now_ms)
    }

    fn on_press(&mut self, edge_ms: u64, now_ms: u64) -> Option<TapEvent> {
        let elapsed = edge_ms.saturating_sub(self.last_press);
        let mut pending = None;

        if self.count == 0 || elapsed >= self.window_ms {
            if self.count > 0 {
                // Previous sequence was never closed by a poll; report it now.
                pending = Some(TapEvent {
                    count: self.count,
                    timestamp_ms: now_ms,
                });
            }
            self.count = 1;
        } else {
            self.count = self.count.saturating_add(1);
        }
        self.last_press = edge_ms;
        log::debug!("Tap press #{} at {} ms", self.count, edge_ms);

        if self.count >= self.max_taps {
            let event = TapEvent {
                count: self.max_taps,
                timestamp_ms: now_ms,
            };
            self.count = 0;
            self.phase = TapPhase::CountingClosed;
            return Some(event);
        }

        self.phase = TapPhase::CountingOpen;
        pending
    }

    fn expire(&mut self, now_ms: u64) -> Option<TapEvent> {
        if self.count == 0 {
            self.phase = TapPhase::Idle;
            return None;
        }

        if now_ms.saturating_sub(self.last_press) >= self.window_ms {
            let event = TapEvent {
                count: self.count,
                timestamp_ms: now_ms,
            };
            self.count = 0;
            self.phase = TapPhase::CountingClosed;
            Some(event)
        } else {
            self.phase = TapPhase::CountingOpen;
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLL_MS: u64 = 10;

    /// Drive the detector with presses given as (down_ms, up_ms) pairs,
    /// sampling every POLL_MS until `end_ms`.
    fn run(detector: &mut TapDetector, presses: &[(u64, u64)], end_ms: u64) -> Vec<TapEvent> {
        let mut events = Vec::new();
        let mut t = 0;
        while t <= end_ms {
            let pressed = presses.iter().any(|&(down, up)| t >= down && t < up);
            if let Some(event) = detector.update(pressed, t) {
                events.push(event);
            }
            t += POLL_MS;
        }
        events
    }

    fn presses_every(n: usize, gap_ms: u64) -> Vec<(u64, u64)> {
        (0..n as u64).map(|i| (i * gap_ms, i * gap_ms + 80)).collect()
    }

    #[test]
    fn double_press_then_silence_is_one_double_tap() {
        let mut d = TapDetector::new(50, 400, 4);
        let events = run(&mut d, &[(0, 80), (150, 230)], 730);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].count, 2);
    }

    #[test]
    fn single_press_finalizes_after_window() {
        let mut d = TapDetector::new(50, 400, 4);
        let events = run(&mut d, &[(0, 80)], 1000);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].count, 1);
        // Window closes 400 ms after the press edge
        assert_eq!(events[0].timestamp_ms, 400);
    }

    #[test]
    fn each_burst_yields_its_press_count() {
        for n in 1..=3 {
            let mut d = TapDetector::new(50, 400, 4);
            let events = run(&mut d, &presses_every(n, 150), 2000);
            assert_eq!(events.len(), 1, "{n} presses");
            assert_eq!(events[0].count as usize, n);
        }
    }

    #[test]
    fn max_count_fires_early() {
        let mut d = TapDetector::new(50, 400, 3);
        let events = run(&mut d, &presses_every(3, 150), 2000);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].count, 3);
        // Third press edge at 300, accepted after debounce, before the window
        assert_eq!(events[0].timestamp_ms, 350);
    }

    #[test]
    fn presses_beyond_max_start_a_new_sequence() {
        let mut d = TapDetector::new(50, 400, 3);
        let events = run(&mut d, &presses_every(4, 150), 2000);
        assert_eq!(events.iter().map(|e| e.count).collect::<Vec<_>>(), [3, 1]);
    }

    #[test]
    fn long_gap_splits_into_two_events() {
        let mut d = TapDetector::new(50, 400, 4);
        let events = run(&mut d, &[(0, 80), (600, 680)], 1500);
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.count == 1));
    }

    #[test]
    fn gap_equal_to_window_starts_new_sequence() {
        let mut d = TapDetector::new(50, 400, 4);
        let events = run(&mut d, &[(0, 80), (400, 480)], 1500);
        assert_eq!(events.iter().map(|e| e.count).collect::<Vec<_>>(), [1, 1]);
    }

    #[test]
    fn gap_just_inside_window_extends_sequence() {
        let mut d = TapDetector::new(50, 400, 4);
        let events = run(&mut d, &[(0, 80), (390, 470)], 1500);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].count, 2);
    }

    #[test]
    fn short_glitch_is_ignored() {
        let mut d = TapDetector::new(50, 400, 4);
        let events = run(&mut d, &[(100, 130)], 1000);
        assert!(events.is_empty());
        assert_eq!(d.phase(), TapPhase::Idle);
    }

    #[test]
    fn contact_bounce_counts_once() {
        let mut d = TapDetector::new(50, 400, 4);
        // Bouncy press and bouncy release
        let presses = [(0, 10), (20, 30), (40, 150), (160, 170)];
        let events = run(&mut d, &presses, 1000);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].count, 1);
    }

    #[test]
    fn late_poll_closes_sequence_before_next_press() {
        let mut d = TapDetector::new(50, 400, 4);
        assert_eq!(d.update(true, 0), None);
        assert_eq!(d.update(true, 60), None);
        assert_eq!(d.update(false, 100), None);
        assert_eq!(d.update(false, 160), None);
        // No poll in between; next press edge lands after the window
        let event = d.update(true, 900).unwrap();
        assert_eq!(event.count, 1);
        assert_eq!(d.update(true, 960), None);
        assert_eq!(d.phase(), TapPhase::CountingOpen);
    }

    #[test]
    fn undebounced_press_reports_pending_sequence() {
        let mut d = TapDetector::new(0, 400, 4);
        assert_eq!(d.update(true, 0), None);
        assert_eq!(d.update(false, 50), None);
        let event = d.update(true, 900).unwrap();
        assert_eq!(event.count, 1);
        assert_eq!(d.phase(), TapPhase::CountingOpen);
    }

    #[test]
    fn phase_tracks_sequence() {
        let mut d = TapDetector::new(50, 400, 4);
        assert_eq!(d.phase(), TapPhase::Idle);
        d.update(true, 0);
        assert_eq!(d.phase(), TapPhase::Debouncing);
        d.update(true, 50);
        assert_eq!(d.phase(), TapPhase::CountingOpen);
        d.update(false, 100);
        d.update(false, 150);
        assert!(d.update(false, 400).is_some());
        assert_eq!(d.phase(), TapPhase::CountingClosed);
        d.update(false, 410);
        assert_eq!(d.phase(), TapPhase::Idle);
    }
}
