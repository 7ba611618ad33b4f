//! Scramble-detection state machine (`spec.md` §4.E). One instance per
//! device, active only while a CAM slot is assigned and decrypting.

use std::time::{Duration, Instant};

/// States of the detector. Transitions are monotonic: `Idle` →
/// `Detecting` → `Ok`, or `Detecting` → `Idle` (on a confirmed miss, via
/// [`ScrambleOutcome::MustDetach`] which the caller resolves by detaching
/// and calling [`ScrambleDetector::reset`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Detecting,
    Ok,
}

/// What [`ScrambleDetector::feed`] found out this call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrambleOutcome {
    /// Nothing decided yet; keep detecting.
    Pending,
    /// The CAM has proven unable to decrypt this channel within the
    /// detach-after window. The caller must detach affected receivers and
    /// record the negative result.
    MustDetach,
    /// The feed has run scramble-free for the ok-after window. The caller
    /// should record the positive result; detection is now disabled until
    /// the next [`ScrambleDetector::start`].
    Ok,
}

/// Per-attach scramble detector (`spec.md` §4.E).
#[derive(Debug)]
pub struct ScrambleDetector {
    state: State,
    start: Option<Instant>,
}

impl Default for ScrambleDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl ScrambleDetector {
    /// A detector in the idle state (no CAM slot assigned, or detection
    /// already resolved for this attach).
    pub fn new() -> Self {
        Self { state: State::Idle, start: None }
    }

    /// Enters the `detecting` state with `now` as the monotonic start
    /// timestamp. Called when a CAM slot is assigned and decryption starts.
    pub fn start(&mut self, now: Instant) {
        self.state = State::Detecting;
        self.start = Some(now);
    }

    /// Returns to the idle state (e.g. the CAM slot was released).
    pub fn reset(&mut self) {
        self.state = State::Idle;
        self.start = None;
    }

    /// Whether the detector is actively watching packets right now.
    pub fn is_detecting(&self) -> bool {
        self.state == State::Detecting
    }

    /// Feeds one packet's scrambling bit. `detach_after`/`ok_after` are the
    /// configured thresholds (default 3s/10s, `spec.md` §5).
    pub fn feed(
        &mut self,
        scrambled: bool,
        now: Instant,
        detach_after: Duration,
        ok_after: Duration,
    ) -> ScrambleOutcome {
        if self.state != State::Detecting {
            return ScrambleOutcome::Pending;
        }
        let Some(start) = self.start else {
            return ScrambleOutcome::Pending;
        };
        let elapsed = now.saturating_duration_since(start);
        if scrambled {
            if elapsed > detach_after {
                self.reset();
                return ScrambleOutcome::MustDetach;
            }
        } else if elapsed > ok_after {
            self.state = State::Ok;
            return ScrambleOutcome::Ok;
        }
        ScrambleOutcome::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sustained_scrambled_packets_trigger_must_detach_after_threshold() {
        let mut d = ScrambleDetector::new();
        let t0 = Instant::now();
        d.start(t0);
        assert_eq!(d.feed(true, t0, Duration::from_secs(3), Duration::from_secs(10)), ScrambleOutcome::Pending);
        let t1 = t0 + Duration::from_secs(4);
        assert_eq!(d.feed(true, t1, Duration::from_secs(3), Duration::from_secs(10)), ScrambleOutcome::MustDetach);
        assert!(!d.is_detecting(), "detector returns to idle after a detach decision");
    }

    #[test]
    fn sustained_clear_packets_confirm_ok_after_threshold() {
        let mut d = ScrambleDetector::new();
        let t0 = Instant::now();
        d.start(t0);
        let t1 = t0 + Duration::from_secs(11);
        assert_eq!(d.feed(false, t1, Duration::from_secs(3), Duration::from_secs(10)), ScrambleOutcome::Ok);
        assert!(!d.is_detecting(), "once ok, detection is disabled");
    }

    #[test]
    fn idle_detector_never_fires() {
        let mut d = ScrambleDetector::new();
        let t0 = Instant::now();
        assert_eq!(d.feed(true, t0 + Duration::from_secs(100), Duration::from_secs(3), Duration::from_secs(10)), ScrambleOutcome::Pending);
    }
}
