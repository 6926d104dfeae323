//! Round session: reconciles observed ledger state with the locally saved
//! commitment and drives commit, reveal and claim.
//!
//! The session owns no authoritative game state. Everything is re-derived on
//! each evaluation from the last observation of the ledger, the wall clock,
//! and a fresh read of the commitment store.

use crate::clock::Clock;
use crate::crypto::{CommitDigest, Salt};
use crate::ledger::{LedgerClient, LedgerError, TxHandle};
use crate::phase::{Countdown, Phase, PhaseClock};
use crate::protocol::{Address, Round, RoundId, ValidationError};
use crate::store::{Commitment, CommitmentStore, StoreError};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Capacity of the notification channel
const EVENT_CAPACITY: usize = 64;

/// Participant action that ends in a ledger transaction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Commit,
    Reveal,
    Claim,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Commit => write!(f, "commit"),
            Action::Reveal => write!(f, "reveal"),
            Action::Claim => write!(f, "claim"),
        }
    }
}

/// Reveal form contents restored from the saved commitment
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RevealForm {
    pub answer: String,
    /// `0x`-prefixed hex
    pub salt: String,
}

/// What the participant can do right now
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ActionState {
    /// Some external read needed for a decision has not arrived yet
    Loading,
    NoRound,
    CanCommit,
    /// Committed; waiting for the reveal phase
    AwaitingReveal { answer: String },
    CanReveal { prefill: RevealForm },
    Revealed,
    /// Commit confirmed on the ledger but no local record: the entry is forfeit
    CommitmentLost,
    /// Commit confirmed on the ledger but the local record could not be read
    StorageUnavailable,
    DidNotParticipate,
    AwaitingSettlement,
    CanClaim,
    /// Committed but never revealed; nothing to claim
    NotRevealed,
}

impl ActionState {
    pub fn name(&self) -> &'static str {
        match self {
            ActionState::Loading => "loading",
            ActionState::NoRound => "no_round",
            ActionState::CanCommit => "can_commit",
            ActionState::AwaitingReveal { .. } => "awaiting_reveal",
            ActionState::CanReveal { .. } => "can_reveal",
            ActionState::Revealed => "revealed",
            ActionState::CommitmentLost => "commitment_lost",
            ActionState::StorageUnavailable => "storage_unavailable",
            ActionState::DidNotParticipate => "did_not_participate",
            ActionState::AwaitingSettlement => "awaiting_settlement",
            ActionState::CanClaim => "can_claim",
            ActionState::NotRevealed => "not_revealed",
        }
    }

    /// The single legal action of this state, if any
    pub fn allows(&self, action: Action) -> bool {
        matches!(
            (self, action),
            (ActionState::CanCommit, Action::Commit)
                | (ActionState::CanReveal { .. }, Action::Reveal)
                | (ActionState::CanClaim, Action::Claim)
        )
    }
}

/// Submissions currently in flight
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PendingActions {
    pub commit: bool,
    pub reveal: bool,
    pub claim: bool,
}

impl PendingActions {
    fn flag(&mut self, action: Action) -> &mut bool {
        match action {
            Action::Commit => &mut self.commit,
            Action::Reveal => &mut self.reveal,
            Action::Claim => &mut self.claim,
        }
    }
}

/// Derived, render-ready state of the session
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SessionView {
    pub participant: Address,
    pub round_id: Option<RoundId>,
    pub round: Option<Round>,
    /// Phase derived from deadlines and the wall clock
    pub phase: Option<Phase>,
    /// Phase last reported by the contract
    pub ledger_phase: Option<Phase>,
    pub time_remaining_secs: u64,
    #[serde(flatten)]
    pub state: ActionState,
    /// Salt the next commit will use; shown so it can be written down
    pub draft_salt: Option<String>,
    pub pending: PendingActions,
    /// Commit transaction sent but not yet seen on the ledger
    pub unconfirmed_commit: Option<TxHandle>,
}

impl SessionView {
    /// Equality ignoring the countdown
    fn same_state(&self, other: &SessionView) -> bool {
        SessionView {
            time_remaining_secs: 0,
            ..self.clone()
        } == SessionView {
            time_remaining_secs: 0,
            ..other.clone()
        }
    }
}

/// Notifications for the render layer
#[derive(Clone, Debug)]
pub enum SessionEvent {
    RoundChanged {
        previous: Option<RoundId>,
        current: RoundId,
    },
    StateChanged(SessionView),
    Tick {
        remaining: Duration,
    },
    ReadFailed {
        what: &'static str,
        error: String,
    },
}

/// Errors surfaced to the participant
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Submission failed: {0}")]
    Submission(#[from] LedgerError),

    #[error("Commitment storage failed: {0}")]
    Store(#[from] StoreError),

    #[error("Cannot {action} in state {state}")]
    NotAllowed { action: Action, state: &'static str },

    #[error("A {0} submission is already pending")]
    AlreadyPending(Action),
}

/// Round as far as it has been observed
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum RoundObservation {
    #[default]
    Unknown,
    /// The ledger reported that the round does not exist
    Missing,
    Present(Round),
}

impl RoundObservation {
    pub fn round(&self) -> Option<&Round> {
        match self {
            RoundObservation::Present(round) => Some(round),
            _ => None,
        }
    }
}

/// Last known external state. `None` means not loaded yet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Observation {
    pub round_id: Option<RoundId>,
    pub round: RoundObservation,
    pub ledger_phase: Option<Phase>,
    pub has_committed: Option<bool>,
    pub has_revealed: Option<bool>,
}

impl Observation {
    /// Phase at `now`; `None` while it cannot be known
    pub fn phase(&self, now: u64) -> Option<Phase> {
        let round_id = self.round_id?;
        if round_id.is_none() {
            return Some(Phase::Inactive);
        }
        match &self.round {
            RoundObservation::Unknown => None,
            RoundObservation::Missing => Some(Phase::Inactive),
            RoundObservation::Present(round) => Some(PhaseClock::current_phase(Some(round), now)),
        }
    }
}

/// Derive the participant's state. Pure.
pub fn derive_state(observed: &Observation, saved: Option<&Commitment>, now: u64) -> ActionState {
    let Some(phase) = observed.phase(now) else {
        return ActionState::Loading;
    };
    let settled = observed.round.round().map(|r| r.settled).unwrap_or(false);

    match phase {
        Phase::Inactive => ActionState::NoRound,
        Phase::Commit => match (observed.has_committed, saved) {
            (None, _) => ActionState::Loading,
            (Some(false), _) => ActionState::CanCommit,
            (Some(true), Some(saved)) => ActionState::AwaitingReveal {
                answer: saved.answer.clone(),
            },
            (Some(true), None) => ActionState::CommitmentLost,
        },
        Phase::Reveal => match (observed.has_committed, observed.has_revealed) {
            (None, _) => ActionState::Loading,
            (Some(false), _) => ActionState::DidNotParticipate,
            (Some(true), None) => ActionState::Loading,
            (Some(true), Some(true)) => ActionState::Revealed,
            (Some(true), Some(false)) => match saved {
                Some(saved) => ActionState::CanReveal {
                    prefill: RevealForm {
                        answer: saved.answer.clone(),
                        salt: saved.salt.to_hex(),
                    },
                },
                None => ActionState::CommitmentLost,
            },
        },
        Phase::Complete => match observed.has_committed {
            None => ActionState::Loading,
            Some(false) => ActionState::DidNotParticipate,
            Some(true) if !settled => ActionState::AwaitingSettlement,
            Some(true) => match observed.has_revealed {
                None => ActionState::Loading,
                Some(true) => ActionState::CanClaim,
                Some(false) => ActionState::NotRevealed,
            },
        },
    }
}

/// Countdown together with the context it was started for
struct RunningCountdown {
    round_id: RoundId,
    phase: Phase,
    countdown: Countdown,
}

/// Commit whose confirmation failed without a revert. It may still land, so
/// its answer and salt are held until the ledger says either way.
#[derive(Clone)]
struct UnconfirmedCommit {
    round_id: RoundId,
    answer: String,
    salt: Salt,
    tx: TxHandle,
}

#[derive(Default)]
struct SessionInner {
    observed: Observation,
    /// Salt for the next commit attempt, per round
    draft: Option<(RoundId, Salt)>,
    unconfirmed: Option<UnconfirmedCommit>,
    pending: PendingActions,
    countdown: Option<RunningCountdown>,
    last_view: Option<SessionView>,
}

/// Commit-reveal session of one participant
pub struct RoundSession {
    ledger: Arc<dyn LedgerClient>,
    store: Arc<dyn CommitmentStore>,
    clock: Arc<dyn Clock>,
    participant: Address,
    inner: Mutex<SessionInner>,
    /// Serialises refreshes so observations are applied in order
    refresh_lock: tokio::sync::Mutex<()>,
    events: broadcast::Sender<SessionEvent>,
}

/// Clears the pending flag of an action on every exit path
struct PendingGuard<'a> {
    session: &'a RoundSession,
    action: Action,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        *self.session.inner.lock().unwrap().pending.flag(self.action) = false;
        self.session.notify_if_changed();
    }
}

impl RoundSession {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        store: Arc<dyn CommitmentStore>,
        clock: Arc<dyn Clock>,
        participant: Address,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            ledger,
            store,
            clock,
            participant,
            inner: Mutex::new(SessionInner::default()),
            refresh_lock: tokio::sync::Mutex::new(()),
            events,
        }
    }

    pub fn participant(&self) -> Address {
        self.participant
    }

    /// Subscribe to state notifications
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Snapshot of the last observation
    pub fn observation(&self) -> Observation {
        self.inner.lock().unwrap().observed.clone()
    }

    /// Re-read all external state and re-derive the view.
    ///
    /// Failed reads keep their previous value and are reported as
    /// `SessionEvent::ReadFailed`; they never change the phase.
    pub async fn refresh(&self) -> SessionView {
        let _serial = self.refresh_lock.lock().await;

        let previous_id = self.inner.lock().unwrap().observed.round_id;
        let round_id = match self.ledger.current_round_id().await {
            Ok(id) => Some(id),
            Err(e) => {
                self.read_failed("current_round_id", &e);
                previous_id
            }
        };

        if round_id != previous_id {
            if let Some(current) = round_id {
                self.enter_round(previous_id, current);
            }
        }

        if let Some(id) = round_id.filter(|id| !id.is_none()) {
            let participant = self.participant;
            let (round, ledger_phase, committed, revealed) = tokio::join!(
                self.ledger.get_round(id),
                self.ledger.get_phase(id),
                self.ledger.has_committed(id, &participant),
                self.ledger.has_revealed(id, &participant),
            );

            let round = match round {
                Ok(round) => Some(RoundObservation::Present(round)),
                Err(LedgerError::RoundNotFound(_)) => Some(RoundObservation::Missing),
                Err(e) => {
                    self.read_failed("get_round", &e);
                    None
                }
            };
            let ledger_phase = self.keep_on_failure("get_phase", ledger_phase);
            let committed = self.keep_on_failure("has_committed", committed);
            let revealed = self.keep_on_failure("has_revealed", revealed);

            let mut inner = self.inner.lock().unwrap();
            let observed = &mut inner.observed;
            if let Some(round) = round {
                observed.round = round;
            }
            if ledger_phase.is_some() {
                observed.ledger_phase = ledger_phase;
            }
            if committed.is_some() {
                observed.has_committed = committed;
            }
            if revealed.is_some() {
                observed.has_revealed = revealed;
            }
        }
        self.resolve_unconfirmed().await;

        let now = self.clock.now();
        let observed = self.observation();
        if let (Some(local), Some(remote)) = (observed.phase(now), observed.ledger_phase) {
            if local != remote {
                debug!(%local, %remote, "local phase differs from contract phase");
            }
        }
        self.sync_countdown(&observed, now);
        self.notify_if_changed()
    }

    /// Derive the current view without touching the ledger
    pub fn view(&self) -> SessionView {
        let observed = self.observation();
        let now = self.clock.now();
        let state = match self.load_saved(&observed) {
            Ok(saved) => derive_state(&observed, saved.as_ref(), now),
            Err(e) => {
                error!(round = ?observed.round_id, error = %e, "failed to read saved commitment");
                match derive_state(&observed, None, now) {
                    ActionState::CommitmentLost => ActionState::StorageUnavailable,
                    other => other,
                }
            }
        };
        let phase = observed.phase(now);
        let round = observed.round.round().cloned();
        let time_remaining_secs = phase
            .map(|p| PhaseClock::time_remaining(round.as_ref(), p, now).as_secs())
            .unwrap_or(0);

        let draft_salt = match (&state, &round) {
            (ActionState::CanCommit, Some(round)) => Some(self.draft_salt(round.id).to_hex()),
            _ => None,
        };

        let inner = self.inner.lock().unwrap();
        SessionView {
            participant: self.participant,
            round_id: observed.round_id,
            round,
            phase,
            ledger_phase: observed.ledger_phase,
            time_remaining_secs,
            state,
            draft_salt,
            pending: inner.pending,
            unconfirmed_commit: inner.unconfirmed.as_ref().map(|u| u.tx),
        }
    }

    /// Commit `answer` for the current round.
    ///
    /// The commitment is persisted only after the transaction is confirmed.
    /// When confirmation fails without a revert the outcome is unknown; the
    /// answer and salt are kept and resolved by later refreshes.
    pub async fn commit(&self, answer: &str) -> Result<TxHandle, SessionError> {
        let _pending = self.begin(Action::Commit)?;
        let view = self.view();
        if !view.state.allows(Action::Commit) {
            return Err(SessionError::NotAllowed {
                action: Action::Commit,
                state: view.state.name(),
            });
        }
        if answer.is_empty() {
            return Err(ValidationError::EmptyAnswer.into());
        }
        let round = view.round.ok_or(SessionError::NotAllowed {
            action: Action::Commit,
            state: ActionState::Loading.name(),
        })?;

        let outstanding = self.inner.lock().unwrap().unconfirmed.as_ref().map(|u| u.round_id);
        if outstanding == Some(round.id) {
            return Err(SessionError::AlreadyPending(Action::Commit));
        }

        let salt = self.draft_salt(round.id);
        let digest = CommitDigest::compute(answer, &salt);
        info!(round = %round.id, %digest, fee = %round.entry_fee, "submitting commitment");

        let tx = self.ledger.commit(round.id, &digest, round.entry_fee).await?;
        match self.ledger.confirm(&tx).await {
            Ok(()) => {}
            Err(e @ LedgerError::Reverted(_)) => return Err(e.into()),
            Err(e) => {
                warn!(round = %round.id, %tx, error = %e, "commit outcome unknown; holding its salt");
                self.inner.lock().unwrap().unconfirmed = Some(UnconfirmedCommit {
                    round_id: round.id,
                    answer: answer.to_string(),
                    salt,
                    tx,
                });
                return Err(e.into());
            }
        }

        // The salt exists nowhere else: persist it before anything can fail
        if let Err(e) = self.store.save(round.id, &self.participant, answer, &salt) {
            error!(round = %round.id, %tx, error = %e, "commit confirmed but commitment could not be saved");
            return Err(e.into());
        }
        self.clear_draft(round.id);
        info!(round = %round.id, %tx, "commitment confirmed and saved");

        self.finish(Action::Commit, round.id).await;
        Ok(tx)
    }

    /// Reveal using the (possibly edited) form values.
    ///
    /// The values are checked against the saved commitment first; a mismatch
    /// is reported locally and nothing is submitted.
    pub async fn reveal(&self, answer: &str, salt_hex: &str) -> Result<TxHandle, SessionError> {
        let _pending = self.begin(Action::Reveal)?;
        let view = self.view();
        if !view.state.allows(Action::Reveal) {
            return Err(SessionError::NotAllowed {
                action: Action::Reveal,
                state: view.state.name(),
            });
        }
        if answer.is_empty() {
            return Err(ValidationError::EmptyAnswer.into());
        }
        if salt_hex.trim().is_empty() {
            return Err(ValidationError::EmptySalt.into());
        }
        let salt = Salt::from_hex(salt_hex)?;

        let round_id = view.round_id.unwrap_or_default();
        let saved = self
            .store
            .load(round_id, &self.participant)?
            .or_else(|| self.unconfirmed_commitment(round_id))
            .ok_or(SessionError::NotAllowed {
                action: Action::Reveal,
                state: ActionState::CommitmentLost.name(),
            })?;
        if !saved.digest().verify(answer, &salt) {
            warn!(round = %round_id, "reveal values do not match saved commitment");
            return Err(ValidationError::DigestMismatch.into());
        }

        info!(round = %round_id, "submitting reveal");
        let tx = self.ledger.reveal(round_id, answer, &salt).await?;
        self.ledger.confirm(&tx).await?;
        info!(round = %round_id, %tx, "reveal confirmed");

        self.finish(Action::Reveal, round_id).await;
        Ok(tx)
    }

    /// Claim the payout of a settled round
    pub async fn claim(&self) -> Result<TxHandle, SessionError> {
        let _pending = self.begin(Action::Claim)?;
        let view = self.view();
        if !view.state.allows(Action::Claim) {
            return Err(SessionError::NotAllowed {
                action: Action::Claim,
                state: view.state.name(),
            });
        }
        let round_id = view.round_id.unwrap_or_default();

        info!(round = %round_id, "submitting claim");
        let tx = self.ledger.claim(round_id).await?;
        self.ledger.confirm(&tx).await?;
        info!(round = %round_id, %tx, "claim confirmed");

        self.finish(Action::Claim, round_id).await;
        Ok(tx)
    }

    /// Stop the countdown (e.g. when the participant leaves)
    pub fn stop(&self) {
        if let Some(running) = self.inner.lock().unwrap().countdown.take() {
            running.countdown.stop();
        }
    }

    /// Whether a countdown is ticking
    pub fn countdown_running(&self) -> bool {
        self.inner
            .lock()
            .unwrap()
            .countdown
            .as_ref()
            .map(|running| !running.countdown.is_finished())
            .unwrap_or(false)
    }

    fn begin(&self, action: Action) -> Result<PendingGuard<'_>, SessionError> {
        {
            let mut inner = self.inner.lock().unwrap();
            let flag = inner.pending.flag(action);
            if *flag {
                return Err(SessionError::AlreadyPending(action));
            }
            *flag = true;
        }
        self.notify_if_changed();
        Ok(PendingGuard {
            session: self,
            action,
        })
    }

    /// Reconcile a confirmed result with the round currently shown
    async fn finish(&self, action: Action, round_id: RoundId) {
        let current = self.inner.lock().unwrap().observed.round_id;
        if current != Some(round_id) {
            debug!(%action, round = %round_id, ?current, "ignoring stale result for abandoned round");
            return;
        }
        self.refresh().await;
    }

    fn enter_round(&self, previous: Option<RoundId>, current: RoundId) {
        info!(?previous, %current, "round changed");
        {
            let mut inner = self.inner.lock().unwrap();
            inner.observed = Observation {
                round_id: Some(current),
                ..Observation::default()
            };
            if inner.draft.as_ref().map(|(id, _)| *id) != Some(current) {
                inner.draft = None;
            }
        }
        let _ = self.events.send(SessionEvent::RoundChanged { previous, current });
    }

    fn keep_on_failure<T>(&self, what: &'static str, result: Result<T, LedgerError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.read_failed(what, &e);
                None
            }
        }
    }

    fn read_failed(&self, what: &'static str, error: &LedgerError) {
        warn!(%what, %error, "ledger read failed; keeping last known value");
        let _ = self.events.send(SessionEvent::ReadFailed {
            what,
            error: error.to_string(),
        });
    }

    /// Saved commitment of the observed round, else an unconfirmed one
    fn load_saved(&self, observed: &Observation) -> Result<Option<Commitment>, StoreError> {
        let Some(round_id) = observed.round_id.filter(|id| !id.is_none()) else {
            return Ok(None);
        };
        let saved = self.store.load(round_id, &self.participant)?;
        Ok(saved.or_else(|| self.unconfirmed_commitment(round_id)))
    }

    fn unconfirmed_commitment(&self, round_id: RoundId) -> Option<Commitment> {
        let inner = self.inner.lock().unwrap();
        let unconfirmed = inner.unconfirmed.as_ref().filter(|u| u.round_id == round_id)?;
        Some(Commitment {
            round_id,
            participant: self.participant,
            answer: unconfirmed.answer.clone(),
            salt: unconfirmed.salt.clone(),
        })
    }

    /// Settle an unconfirmed commit once the ledger shows whether it landed.
    ///
    /// Landed: the record is saved under the commit's own round. Not landed:
    /// it is dropped once its commit phase is over. Unreadable: kept.
    async fn resolve_unconfirmed(&self) {
        let (unconfirmed, observed) = {
            let inner = self.inner.lock().unwrap();
            match &inner.unconfirmed {
                Some(unconfirmed) => (unconfirmed.clone(), inner.observed.clone()),
                None => return,
            }
        };
        let round_id = unconfirmed.round_id;
        let current = observed.round_id == Some(round_id);

        let committed = if current {
            observed.has_committed
        } else {
            match self.ledger.has_committed(round_id, &self.participant).await {
                Ok(committed) => Some(committed),
                Err(e) => {
                    self.read_failed("has_committed", &e);
                    None
                }
            }
        };

        let resolved = match committed {
            Some(true) => {
                let saved = self.store.save(
                    round_id,
                    &self.participant,
                    &unconfirmed.answer,
                    &unconfirmed.salt,
                );
                match saved {
                    Ok(()) => {
                        info!(round = %round_id, tx = %unconfirmed.tx, "unconfirmed commit landed; commitment saved");
                        self.clear_draft(round_id);
                        true
                    }
                    Err(e) => {
                        error!(round = %round_id, error = %e, "commit landed but commitment could not be saved");
                        false
                    }
                }
            }
            Some(false) => {
                let open = current && observed.phase(self.clock.now()) == Some(Phase::Commit);
                if !open {
                    warn!(round = %round_id, tx = %unconfirmed.tx, "unconfirmed commit never landed; discarding");
                }
                !open
            }
            None => false,
        };

        if resolved {
            let mut inner = self.inner.lock().unwrap();
            if inner.unconfirmed.as_ref().map(|u| u.tx) == Some(unconfirmed.tx) {
                inner.unconfirmed = None;
            }
        }
    }

    /// Salt of the current entry attempt; generated once per round
    fn draft_salt(&self, round_id: RoundId) -> Salt {
        let mut inner = self.inner.lock().unwrap();
        match &inner.draft {
            Some((id, salt)) if *id == round_id => salt.clone(),
            _ => {
                let salt = Salt::random();
                inner.draft = Some((round_id, salt.clone()));
                salt
            }
        }
    }

    fn clear_draft(&self, round_id: RoundId) {
        let mut inner = self.inner.lock().unwrap();
        if inner.draft.as_ref().map(|(id, _)| *id) == Some(round_id) {
            inner.draft = None;
        }
    }

    /// Restart the countdown whenever the (round, phase) context changes
    fn sync_countdown(&self, observed: &Observation, now: u64) {
        let context = match (observed.round.round(), observed.phase(now)) {
            (Some(round), Some(phase)) if phase.is_active() => Some((round.clone(), phase)),
            _ => None,
        };

        let mut inner = self.inner.lock().unwrap();
        let unchanged = match (&inner.countdown, &context) {
            (Some(running), Some((round, phase))) => {
                running.round_id == round.id && running.phase == *phase
            }
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return;
        }

        if let Some(running) = inner.countdown.take() {
            running.countdown.stop();
        }
        if let Some((round, phase)) = context {
            let events = self.events.clone();
            let round_id = round.id;
            let countdown = Countdown::start(round, phase, self.clock.clone(), move |remaining| {
                let _ = events.send(SessionEvent::Tick { remaining });
            });
            inner.countdown = Some(RunningCountdown {
                round_id,
                phase,
                countdown,
            });
        }
    }

    /// Emit `StateChanged` when the derived state differs from the last one sent
    fn notify_if_changed(&self) -> SessionView {
        let view = self.view();
        let changed = {
            let mut inner = self.inner.lock().unwrap();
            let changed = inner
                .last_view
                .as_ref()
                .map(|last| !last.same_state(&view))
                .unwrap_or(true);
            inner.last_view = Some(view.clone());
            changed
        };
        if changed {
            let _ = self.events.send(SessionEvent::StateChanged(view.clone()));
        }
        view
    }
}
