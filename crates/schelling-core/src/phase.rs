//! Round phases and the countdown derived from round deadlines.

use crate::clock::Clock;
use crate::protocol::{Round, UnixTime, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Game phase of a round. Ordered: a round only ever moves forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Phase {
    Inactive,
    Commit,
    Reveal,
    Complete,
}

impl Phase {
    /// Map the contract's phase code (0=Inactive, 1=Commit, 2=Reveal, 3=Complete)
    pub fn from_code(code: u8) -> Result<Self, ValidationError> {
        match code {
            0 => Ok(Phase::Inactive),
            1 => Ok(Phase::Commit),
            2 => Ok(Phase::Reveal),
            3 => Ok(Phase::Complete),
            other => Err(ValidationError::UnknownPhase(other)),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            Phase::Inactive => 0,
            Phase::Commit => 1,
            Phase::Reveal => 2,
            Phase::Complete => 3,
        }
    }

    /// Commit and Reveal have a running deadline
    pub fn is_active(&self) -> bool {
        matches!(self, Phase::Commit | Phase::Reveal)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phase::Inactive => "Inactive",
            Phase::Commit => "Commit",
            Phase::Reveal => "Reveal",
            Phase::Complete => "Complete",
        };
        write!(f, "{}", label)
    }
}

/// Pure phase derivation from deadlines and wall-clock time. No I/O.
pub struct PhaseClock;

impl PhaseClock {
    /// Phase of `round` at `now`; `Inactive` without a round or for id 0
    pub fn current_phase(round: Option<&Round>, now: UnixTime) -> Phase {
        match round {
            None => Phase::Inactive,
            Some(round) if round.id.is_none() => Phase::Inactive,
            Some(round) if now < round.commit_deadline => Phase::Commit,
            Some(round) if now < round.reveal_deadline => Phase::Reveal,
            Some(_) => Phase::Complete,
        }
    }

    /// Time until the deadline that ends `phase`, floored at zero
    pub fn time_remaining(round: Option<&Round>, phase: Phase, now: UnixTime) -> Duration {
        let deadline = match (round, phase) {
            (Some(round), Phase::Commit) => round.commit_deadline,
            (Some(round), Phase::Reveal) => round.reveal_deadline,
            _ => return Duration::ZERO,
        };
        Duration::from_secs(deadline.saturating_sub(now))
    }
}

/// Live one-second countdown for a fixed (round, phase) context.
///
/// The task stops when the deadline is reached, when `stop` is called, or
/// when the handle is dropped.
pub struct Countdown {
    handle: JoinHandle<()>,
}

impl Countdown {
    pub const TICK: Duration = Duration::from_secs(1);

    /// Spawn the ticking task. Must be called from within a tokio runtime.
    pub fn start<F>(round: Round, phase: Phase, clock: Arc<dyn Clock>, on_tick: F) -> Self
    where
        F: Fn(Duration) + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Self::TICK);
            loop {
                interval.tick().await;
                let remaining = PhaseClock::time_remaining(Some(&round), phase, clock.now());
                on_tick(remaining);
                if remaining.is_zero() {
                    debug!(round = %round.id, %phase, "countdown reached deadline");
                    break;
                }
            }
        });
        Self { handle }
    }

    pub fn stop(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::protocol::{Amount, RoundId};
    use std::sync::Mutex;

    fn round(commit_deadline: UnixTime, reveal_deadline: UnixTime) -> Round {
        Round {
            id: RoundId::new(1),
            theme: "Pick a colour".to_string(),
            entry_fee: Amount::from_wei(1_000),
            commit_deadline,
            reveal_deadline,
            total_pot: Amount::ZERO,
            player_count: 0,
            settled: false,
        }
    }

    #[test]
    fn test_absent_round_is_inactive() {
        assert_eq!(PhaseClock::current_phase(None, 1_000), Phase::Inactive);
        assert_eq!(
            PhaseClock::time_remaining(None, Phase::Inactive, 1_000),
            Duration::ZERO
        );
    }

    #[test]
    fn test_round_zero_is_inactive() {
        let mut r = round(2_000, 3_000);
        r.id = RoundId::NONE;
        assert_eq!(PhaseClock::current_phase(Some(&r), 1_000), Phase::Inactive);
    }

    #[test]
    fn test_commit_phase_with_time_remaining() {
        let now = 1_000;
        let r = round(now + 100, now + 200);

        let phase = PhaseClock::current_phase(Some(&r), now);
        assert_eq!(phase, Phase::Commit);
        assert_eq!(
            PhaseClock::time_remaining(Some(&r), phase, now),
            Duration::from_secs(100)
        );
    }

    #[test]
    fn test_commit_deadline_starts_reveal() {
        let r = round(1_100, 1_200);

        assert_eq!(PhaseClock::current_phase(Some(&r), 1_099), Phase::Commit);
        assert_eq!(PhaseClock::current_phase(Some(&r), 1_100), Phase::Reveal);
        assert_eq!(
            PhaseClock::time_remaining(Some(&r), Phase::Reveal, 1_100),
            Duration::from_secs(100)
        );
    }

    #[test]
    fn test_reveal_deadline_completes() {
        let r = round(1_100, 1_200);

        assert_eq!(PhaseClock::current_phase(Some(&r), 1_199), Phase::Reveal);
        assert_eq!(PhaseClock::current_phase(Some(&r), 1_200), Phase::Complete);
        assert_eq!(
            PhaseClock::time_remaining(Some(&r), Phase::Complete, 1_200),
            Duration::ZERO
        );
    }

    #[test]
    fn test_phase_is_monotonic() {
        let r = round(1_100, 1_200);
        let mut previous = Phase::Inactive;
        for now in 900..1_400 {
            let phase = PhaseClock::current_phase(Some(&r), now);
            assert!(phase >= previous, "phase regressed at {}", now);
            previous = phase;
        }
        assert_eq!(previous, Phase::Complete);
    }

    #[test]
    fn test_remaining_floors_at_zero() {
        let r = round(1_100, 1_200);
        assert_eq!(
            PhaseClock::time_remaining(Some(&r), Phase::Commit, 5_000),
            Duration::ZERO
        );
    }

    #[test]
    fn test_phase_codes() {
        for phase in [Phase::Inactive, Phase::Commit, Phase::Reveal, Phase::Complete] {
            assert_eq!(Phase::from_code(phase.code()), Ok(phase));
        }
        assert_eq!(Phase::from_code(4), Err(ValidationError::UnknownPhase(4)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_ticks_every_second() {
        let clock = ManualClock::new(1_000);
        let ticks = Arc::new(Mutex::new(Vec::new()));

        let sink = ticks.clone();
        let countdown = Countdown::start(
            round(1_003, 1_010),
            Phase::Commit,
            Arc::new(clock.clone()),
            move |remaining| sink.lock().unwrap().push(remaining.as_secs()),
        );

        // First tick fires immediately; advance the clock between ticks
        tokio::time::sleep(Duration::from_millis(500)).await;
        for _ in 0..3 {
            clock.advance(1);
            tokio::time::sleep(Countdown::TICK).await;
        }

        assert_eq!(*ticks.lock().unwrap(), vec![3, 2, 1, 0]);
        assert!(countdown.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_countdown_does_not_tick() {
        let ticks = Arc::new(Mutex::new(0u32));

        let sink = ticks.clone();
        let countdown = Countdown::start(
            round(2_000, 3_000),
            Phase::Commit,
            Arc::new(ManualClock::new(1_000)),
            move |_| *sink.lock().unwrap() += 1,
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
        countdown.stop();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(*ticks.lock().unwrap(), 1);
    }
}
