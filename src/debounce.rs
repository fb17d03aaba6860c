use std::time::{Duration, Instant};
use tracing::debug;

/// Strategy used to turn raw per-frame decisions into committed state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebouncePolicy {
    /// Require runs of consecutive agreeing frames before switching
    Hysteresis {
        motion_confirm_frames: u32,
        no_motion_confirm_frames: u32,
    },
    /// Switch on the first disagreeing frame, then ignore decisions for
    /// `cooldown`
    Cooldown { cooldown: Duration },
}

/// Consecutive-frame counters for the hysteresis policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebounceCounters {
    pub motion_run: u32,
    pub no_motion_run: u32,
}

/// Published motion state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionState {
    Off,
    On,
}

impl MotionState {
    pub fn is_on(self) -> bool {
        matches!(self, MotionState::On)
    }
}

impl From<bool> for MotionState {
    fn from(detected: bool) -> Self {
        if detected {
            MotionState::On
        } else {
            MotionState::Off
        }
    }
}

/// Debounces raw classifications into Off/On transitions.
///
/// Starts `Off` and never terminates; the owner just stops feeding it.
#[derive(Debug, Clone)]
pub struct DebounceStateMachine {
    policy: DebouncePolicy,
    state: MotionState,
    counters: DebounceCounters,
    cooldown_until: Option<Instant>,
}

impl DebounceStateMachine {
    pub fn new(policy: DebouncePolicy) -> Self {
        Self {
            policy,
            state: MotionState::Off,
            counters: DebounceCounters::default(),
            cooldown_until: None,
        }
    }

    pub fn policy(&self) -> DebouncePolicy {
        self.policy
    }

    pub fn state(&self) -> MotionState {
        self.state
    }

    pub fn counters(&self) -> DebounceCounters {
        self.counters
    }

    /// Whether decisions at `now` would be ignored
    pub fn in_cooldown(&self, now: Instant) -> bool {
        self.cooldown_until.map_or(false, |until| now < until)
    }

    /// Feed one raw classification observed at `now`.
    ///
    /// Returns the new state when this observation commits a transition.
    pub fn observe(&mut self, has_motion: bool, now: Instant) -> Option<MotionState> {
        match self.policy {
            DebouncePolicy::Hysteresis {
                motion_confirm_frames,
                no_motion_confirm_frames,
            } => self.observe_hysteresis(has_motion, motion_confirm_frames, no_motion_confirm_frames),
            DebouncePolicy::Cooldown { cooldown } => self.observe_cooldown(has_motion, now, cooldown),
        }
    }

    fn observe_hysteresis(
        &mut self,
        has_motion: bool,
        motion_confirm_frames: u32,
        no_motion_confirm_frames: u32,
    ) -> Option<MotionState> {
        let counters = &mut self.counters;
        if has_motion {
            counters.motion_run = counters.motion_run.saturating_add(1);
            counters.no_motion_run = 0;
        } else {
            counters.no_motion_run = counters.no_motion_run.saturating_add(1);
            counters.motion_run = 0;
        }

        match self.state {
            MotionState::Off if counters.motion_run >= motion_confirm_frames => {
                debug!(
                    "Debounce: confirmed motion for {} frames, setting state ON",
                    counters.motion_run
                );
                counters.motion_run = 0;
                self.state = MotionState::On;
                Some(MotionState::On)
            }
            MotionState::On if counters.no_motion_run >= no_motion_confirm_frames => {
                debug!(
                    "Debounce: confirmed no motion for {} frames, setting state OFF",
                    counters.no_motion_run
                );
                counters.no_motion_run = 0;
                self.state = MotionState::Off;
                Some(MotionState::Off)
            }
            _ => None,
        }
    }

    fn observe_cooldown(
        &mut self,
        has_motion: bool,
        now: Instant,
        cooldown: Duration,
    ) -> Option<MotionState> {
        if self.in_cooldown(now) {
            return None;
        }
        self.cooldown_until = None;

        let observed = MotionState::from(has_motion);
        if observed == self.state {
            return None;
        }

        debug!(
            "Debounce: state changed to {:?}, cooling down for {:?}",
            observed, cooldown
        );
        self.state = observed;
        self.cooldown_until = Some(now + cooldown);
        Some(observed)
    }
}
