/// User-audible feedback.
///
/// The node emits [`Cue`]s; the firmware turns each into a beep pattern on
/// the buzzer. Patterns are computed here so they can be tested on the host.
use heapless::Vec;

use crate::board;

/// Longest pattern a cue can produce
pub const MAX_BEEPS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cue {
    /// A finalized tap sequence of this many presses
    Taps(u8),
    Delivered,
    Failed,
    NetworkChanged,
    Boot,
}

/// One tone followed by silence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Beep {
    pub freq_hz: u32,
    pub on_ms: u32,
    pub off_ms: u32,
}

const SHORT: Beep = Beep {
    freq_hz: board::BUZZER_FREQ_HZ,
    on_ms: 60,
    off_ms: 90,
};

const LONG: Beep = Beep {
    freq_hz: board::BUZZER_FREQ_HZ,
    on_ms: 400,
    off_ms: 0,
};

const LOW: Beep = Beep {
    freq_hz: board::BUZZER_FREQ_HZ / 3,
    on_ms: 150,
    off_ms: 100,
};

impl Cue {
    pub fn pattern(&self) -> Vec<Beep, MAX_BEEPS> {
        let mut beeps = Vec::new();
        match *self {
            Cue::Taps(n) => {
                for _ in 0..n.min(MAX_BEEPS as u8) {
                    let _ = beeps.push(SHORT);
                }
            }
            Cue::Delivered => {
                let _ = beeps.push(LONG);
            }
            Cue::Failed => {
                for _ in 0..3 {
                    let _ = beeps.push(LOW);
                }
            }
            Cue::NetworkChanged => {
                let _ = beeps.push(SHORT);
                let _ = beeps.push(Beep {
                    freq_hz: board::BUZZER_FREQ_HZ * 3 / 2,
                    ..SHORT
                });
            }
            Cue::Boot => {
                let _ = beeps.push(Beep { on_ms: 200, ..SHORT });
            }
        }
        beeps
    }
}

/// Sink for cues. Implementations must not block for long; the node loop
/// is waiting.
pub trait Feedback {
    fn cue(&mut self, cue: Cue);
}
