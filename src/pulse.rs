//! Pulse timing engine
//!
//! Owns the BPM value and all beat timing state. Evaluated once per
//! control-loop tick against a monotonic millisecond clock; decides whether
//! the strip is lit or blank. The engine never blocks and never allocates,
//! so it is safe to call at arbitrary tick rates.

use crate::config;

/// Uniform full-strip frame produced by one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    /// All pixels off
    Blank,
    /// All pixels white at the configured brightness
    White,
}

/// Pulse state, one value at any instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulseState {
    /// Waiting for the next beat, or for pulsing to be enabled
    Idle,
    /// Pulse in progress, strip lit
    Lit,
}

/// Beat-synchronized pulse engine
///
/// All timestamps are monotonic milliseconds supplied by the caller. The
/// control loop is the only writer of tick state; the HTTP endpoint only
/// calls [`PulseEngine::set_bpm`].
pub struct PulseEngine {
    bpm: i32,
    state: PulseState,
    /// Start of the most recent pulse; `None` until the first beat after
    /// (re-)enabling, so the first tick fires immediately.
    last_beat: Option<u64>,
    pulse_start: u64,
    last_update: u64,
    active: bool,
    pulse_duration: u64,
    /// `None` disables staleness tracking (free-run variant)
    stale_timeout: Option<u64>,
}

impl PulseEngine {
    /// Create an engine with the staleness timeout enabled
    pub fn new() -> Self {
        Self::with_stale_timeout(Some(config::BPM_STALE_TIMEOUT_MS))
    }

    /// Create an engine with an explicit staleness policy
    ///
    /// `stale_timeout = None` keeps the engine free-running forever once a
    /// BPM has been set.
    pub fn with_stale_timeout(stale_timeout: Option<u64>) -> Self {
        Self {
            bpm: config::DEFAULT_BPM,
            state: PulseState::Idle,
            last_beat: None,
            pulse_start: 0,
            last_update: 0,
            active: false,
            pulse_duration: config::PULSE_DURATION_MS,
            stale_timeout,
        }
    }

    /// Accept a new BPM value
    ///
    /// Any integer is accepted; values <= 0 disable pulsing on the next
    /// tick. Refreshes the staleness timer and re-arms the engine. Pixel
    /// state is untouched until the next tick evaluation.
    pub fn set_bpm(&mut self, bpm: i32, now: u64) {
        self.bpm = bpm;
        self.last_update = now;
        self.active = true;
    }

    /// Current BPM value
    pub fn bpm(&self) -> i32 {
        self.bpm
    }

    /// Whether updates have arrived recently enough to pulse
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Current pulse state
    pub fn state(&self) -> PulseState {
        self.state
    }

    /// Milliseconds between successive pulse starts
    ///
    /// Only meaningful for `bpm > 0`; floored at 1 ms so a huge BPM can
    /// never produce a zero interval.
    fn beat_interval(&self) -> u64 {
        let interval = 60_000 / self.bpm as u64;
        interval.max(1)
    }

    /// Evaluate one control-loop tick and return the frame to render
    ///
    /// Transition priority: staleness check, disabled check, beat start,
    /// pulse end. Calling twice with the same `now` yields the same frame.
    pub fn tick(&mut self, now: u64) -> Frame {
        // Staleness has priority over every other transition.
        if let Some(timeout) = self.stale_timeout {
            if self.active && now.saturating_sub(self.last_update) > timeout {
                self.active = false;
                self.state = PulseState::Idle;
                self.last_beat = None;
            }
        }

        // Disabled: no beat timer runs, frame forced blank.
        if !self.active || self.bpm <= 0 {
            self.state = PulseState::Idle;
            return Frame::Blank;
        }

        match self.state {
            PulseState::Idle => {
                // `>=` on the boundary so rounding error never accumulates
                // into cumulative drift over long runtimes.
                let due = match self.last_beat {
                    Some(last) => now.saturating_sub(last) >= self.beat_interval(),
                    None => true,
                };
                if due {
                    self.state = PulseState::Lit;
                    self.last_beat = Some(now);
                    self.pulse_start = now;
                    Frame::White
                } else {
                    Frame::Blank
                }
            }
            PulseState::Lit => {
                // On-time is capped at the pulse duration; a beat interval
                // shorter than it simply overlaps into the next pulse.
                if now.saturating_sub(self.pulse_start) >= self.pulse_duration {
                    self.state = PulseState::Idle;
                    Frame::Blank
                } else {
                    Frame::White
                }
            }
        }
    }
}

impl Default for PulseEngine {
    fn default() -> Self {
        Self::new()
    }
}
