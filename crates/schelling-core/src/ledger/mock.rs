//! In-memory Schelling Point contract for testing and demo mode.
//!
//! Enforces phases, entry fees, single commitment per participant and reveal
//! digests. Settlement is driven by the test (`settle`); payouts are not
//! computed.

use super::traits::{LedgerClient, LedgerError, TxHandle};
use crate::clock::Clock;
use crate::crypto::{keccak256, CommitDigest, Salt};
use crate::phase::{Phase, PhaseClock};
use crate::protocol::{Address, Amount, Round, RoundId};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Contract-side state of one round
#[derive(Clone, Debug)]
struct MockRoundState {
    round: Round,
    commitments: HashMap<Address, CommitDigest>,
    revealed: HashMap<Address, String>,
    claimed: HashSet<Address>,
}

#[derive(Default)]
struct MockLedgerState {
    rounds: BTreeMap<RoundId, MockRoundState>,
    current_round: RoundId,
    /// Outcome of every submitted transaction
    transactions: HashMap<TxHandle, Result<(), String>>,
    tx_counter: u64,
    failing_reads: u32,
    confirmation_delay: Duration,
}

/// Shared mock contract. Clones share state.
#[derive(Clone)]
pub struct MockLedger {
    state: Arc<Mutex<MockLedgerState>>,
    clock: Arc<dyn Clock>,
}

impl MockLedger {
    /// Create an empty contract that reads time from `clock`
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockLedgerState::default())),
            clock,
        }
    }

    /// Start a new round; deadlines are relative to the current clock time
    pub fn start_round(
        &self,
        theme: impl Into<String>,
        entry_fee: Amount,
        commit_secs: u64,
        reveal_secs: u64,
    ) -> RoundId {
        let now = self.clock.now();
        let mut state = self.state.lock().unwrap();
        let id = RoundId::new(state.current_round.get() + 1);
        let round = Round {
            id,
            theme: theme.into(),
            entry_fee,
            commit_deadline: now + commit_secs,
            reveal_deadline: now + commit_secs + reveal_secs,
            total_pot: Amount::ZERO,
            player_count: 0,
            settled: false,
        };
        state.rounds.insert(
            id,
            MockRoundState {
                round,
                commitments: HashMap::new(),
                revealed: HashMap::new(),
                claimed: HashSet::new(),
            },
        );
        state.current_round = id;
        id
    }

    /// Mark a round as settled (stands in for the contract's settlement)
    pub fn settle(&self, round_id: RoundId) -> Result<(), LedgerError> {
        let mut state = self.state.lock().unwrap();
        let round = state
            .rounds
            .get_mut(&round_id)
            .ok_or(LedgerError::RoundNotFound(round_id))?;
        round.round.settled = true;
        Ok(())
    }

    /// Make the next `count` read calls fail with a network error
    pub fn fail_next_reads(&self, count: u32) {
        self.state.lock().unwrap().failing_reads = count;
    }

    /// Delay before `confirm` returns
    pub fn set_confirmation_delay(&self, delay: Duration) {
        self.state.lock().unwrap().confirmation_delay = delay;
    }

    /// Number of transactions submitted so far (accepted or not)
    pub fn submitted_transactions(&self) -> u64 {
        self.state.lock().unwrap().tx_counter
    }

    /// Answer revealed by a participant, if any
    pub fn revealed_answer(&self, round_id: RoundId, participant: &Address) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .rounds
            .get(&round_id)
            .and_then(|r| r.revealed.get(participant).cloned())
    }

    /// Whether a participant has claimed
    pub fn has_claimed(&self, round_id: RoundId, participant: &Address) -> bool {
        let state = self.state.lock().unwrap();
        state
            .rounds
            .get(&round_id)
            .map(|r| r.claimed.contains(participant))
            .unwrap_or(false)
    }

    /// A client that submits transactions as `participant`
    pub fn client(&self, participant: Address) -> MockLedgerClient {
        MockLedgerClient {
            ledger: self.clone(),
            participant,
        }
    }

    fn phase_of(&self, round: &Round) -> Phase {
        PhaseClock::current_phase(Some(round), self.clock.now())
    }

    fn check_read(&self) -> Result<(), LedgerError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_reads > 0 {
            state.failing_reads -= 1;
            return Err(LedgerError::NetworkError("simulated read failure".to_string()));
        }
        Ok(())
    }

    /// Record a transaction; `apply` mutates the round when the call is valid
    fn submit<F>(&self, round_id: RoundId, apply: F) -> Result<TxHandle, LedgerError>
    where
        F: FnOnce(&mut MockRoundState, Phase) -> Result<(), String>,
    {
        let now = self.clock.now();
        let mut state = self.state.lock().unwrap();
        state.tx_counter += 1;
        let tx = TxHandle::from_bytes(keccak256(&state.tx_counter.to_be_bytes()));

        let outcome = match state.rounds.get_mut(&round_id) {
            Some(round) => {
                let phase = PhaseClock::current_phase(Some(&round.round), now);
                apply(round, phase)
            }
            None => Err("round does not exist".to_string()),
        };
        state.transactions.insert(tx, outcome);
        Ok(tx)
    }
}

/// View of the mock contract bound to one participant
#[derive(Clone)]
pub struct MockLedgerClient {
    ledger: MockLedger,
    participant: Address,
}

impl MockLedgerClient {
    pub fn participant(&self) -> Address {
        self.participant
    }

    pub fn ledger(&self) -> &MockLedger {
        &self.ledger
    }
}

#[async_trait]
impl LedgerClient for MockLedgerClient {
    async fn current_round_id(&self) -> Result<RoundId, LedgerError> {
        self.ledger.check_read()?;
        Ok(self.ledger.state.lock().unwrap().current_round)
    }

    async fn get_phase(&self, round_id: RoundId) -> Result<Phase, LedgerError> {
        self.ledger.check_read()?;
        let state = self.ledger.state.lock().unwrap();
        Ok(state
            .rounds
            .get(&round_id)
            .map(|r| self.ledger.phase_of(&r.round))
            .unwrap_or(Phase::Inactive))
    }

    async fn get_round(&self, round_id: RoundId) -> Result<Round, LedgerError> {
        self.ledger.check_read()?;
        let state = self.ledger.state.lock().unwrap();
        state
            .rounds
            .get(&round_id)
            .map(|r| r.round.clone())
            .ok_or(LedgerError::RoundNotFound(round_id))
    }

    async fn has_committed(
        &self,
        round_id: RoundId,
        participant: &Address,
    ) -> Result<bool, LedgerError> {
        self.ledger.check_read()?;
        let state = self.ledger.state.lock().unwrap();
        Ok(state
            .rounds
            .get(&round_id)
            .map(|r| r.commitments.contains_key(participant))
            .unwrap_or(false))
    }

    async fn has_revealed(
        &self,
        round_id: RoundId,
        participant: &Address,
    ) -> Result<bool, LedgerError> {
        self.ledger.check_read()?;
        let state = self.ledger.state.lock().unwrap();
        Ok(state
            .rounds
            .get(&round_id)
            .map(|r| r.revealed.contains_key(participant))
            .unwrap_or(false))
    }

    async fn commit(
        &self,
        round_id: RoundId,
        digest: &CommitDigest,
        value: Amount,
    ) -> Result<TxHandle, LedgerError> {
        let participant = self.participant;
        let digest = *digest;
        self.ledger.submit(round_id, move |round, phase| {
            if phase != Phase::Commit {
                return Err(format!("not in commit phase ({})", phase));
            }
            if round.commitments.contains_key(&participant) {
                return Err("already committed".to_string());
            }
            if value < round.round.entry_fee {
                return Err("insufficient entry fee".to_string());
            }
            round.commitments.insert(participant, digest);
            round.round.player_count += 1;
            round.round.total_pot = Amount::from_wei(round.round.total_pot.wei() + value.wei());
            Ok(())
        })
    }

    async fn reveal(
        &self,
        round_id: RoundId,
        answer: &str,
        salt: &Salt,
    ) -> Result<TxHandle, LedgerError> {
        let participant = self.participant;
        let answer = answer.to_string();
        let salt = salt.clone();
        self.ledger.submit(round_id, move |round, phase| {
            if phase != Phase::Reveal {
                return Err(format!("not in reveal phase ({})", phase));
            }
            let digest = round
                .commitments
                .get(&participant)
                .ok_or_else(|| "no commitment".to_string())?;
            if round.revealed.contains_key(&participant) {
                return Err("already revealed".to_string());
            }
            if !digest.verify(&answer, &salt) {
                return Err("answer does not match commitment".to_string());
            }
            round.revealed.insert(participant, answer);
            Ok(())
        })
    }

    async fn claim(&self, round_id: RoundId) -> Result<TxHandle, LedgerError> {
        let participant = self.participant;
        self.ledger.submit(round_id, move |round, _phase| {
            if !round.round.settled {
                return Err("round not settled".to_string());
            }
            if !round.revealed.contains_key(&participant) {
                return Err("did not reveal".to_string());
            }
            if !round.claimed.insert(participant) {
                return Err("already claimed".to_string());
            }
            Ok(())
        })
    }

    async fn confirm(&self, tx: &TxHandle) -> Result<(), LedgerError> {
        let delay = self.ledger.state.lock().unwrap().confirmation_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let state = self.ledger.state.lock().unwrap();
        match state.transactions.get(tx) {
            Some(Ok(())) => Ok(()),
            Some(Err(reason)) => Err(LedgerError::Reverted(reason.clone())),
            None => Err(LedgerError::UnknownTransaction(*tx)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const FEE: Amount = Amount::from_wei(1_000);

    fn setup() -> (ManualClock, MockLedger) {
        let clock = ManualClock::new(10_000);
        let ledger = MockLedger::new(Arc::new(clock.clone()));
        (clock, ledger)
    }

    #[tokio::test]
    async fn test_round_lifecycle() {
        let (clock, ledger) = setup();
        let client = ledger.client(Address::random());

        assert_eq!(client.current_round_id().await.unwrap(), RoundId::NONE);

        let id = ledger.start_round("Pick a colour", FEE, 100, 100);
        assert_eq!(client.current_round_id().await.unwrap(), id);
        assert_eq!(client.get_phase(id).await.unwrap(), Phase::Commit);

        clock.advance(100);
        assert_eq!(client.get_phase(id).await.unwrap(), Phase::Reveal);

        clock.advance(100);
        assert_eq!(client.get_phase(id).await.unwrap(), Phase::Complete);
    }

    #[tokio::test]
    async fn test_unknown_round() {
        let (_clock, ledger) = setup();
        let client = ledger.client(Address::random());

        let result = client.get_round(RoundId::new(9)).await;
        assert!(matches!(result, Err(LedgerError::RoundNotFound(_))));
        assert_eq!(client.get_phase(RoundId::new(9)).await.unwrap(), Phase::Inactive);
    }

    #[tokio::test]
    async fn test_commit_reveal_claim() {
        let (clock, ledger) = setup();
        let participant = Address::random();
        let client = ledger.client(participant);
        let id = ledger.start_round("Pick a colour", FEE, 100, 100);

        let salt = Salt::random();
        let tx = client
            .commit(id, &CommitDigest::compute("blue", &salt), FEE)
            .await
            .unwrap();
        client.confirm(&tx).await.unwrap();
        assert!(client.has_committed(id, &participant).await.unwrap());

        let round = client.get_round(id).await.unwrap();
        assert_eq!(round.player_count, 1);
        assert_eq!(round.total_pot, FEE);

        clock.advance(100);
        let tx = client.reveal(id, "blue", &salt).await.unwrap();
        client.confirm(&tx).await.unwrap();
        assert!(client.has_revealed(id, &participant).await.unwrap());
        assert_eq!(ledger.revealed_answer(id, &participant).as_deref(), Some("blue"));

        clock.advance(100);
        ledger.settle(id).unwrap();
        let tx = client.claim(id).await.unwrap();
        client.confirm(&tx).await.unwrap();
        assert!(ledger.has_claimed(id, &participant));

        let tx = client.claim(id).await.unwrap();
        assert!(matches!(client.confirm(&tx).await, Err(LedgerError::Reverted(_))));
    }

    #[tokio::test]
    async fn test_rejected_commits() {
        let (clock, ledger) = setup();
        let client = ledger.client(Address::random());
        let id = ledger.start_round("Pick a colour", FEE, 100, 100);
        let digest = CommitDigest::compute("blue", &Salt::random());

        let tx = client.commit(id, &digest, Amount::from_wei(1)).await.unwrap();
        assert!(matches!(client.confirm(&tx).await, Err(LedgerError::Reverted(_))));

        let tx = client.commit(id, &digest, FEE).await.unwrap();
        client.confirm(&tx).await.unwrap();

        let tx = client.commit(id, &digest, FEE).await.unwrap();
        assert!(matches!(client.confirm(&tx).await, Err(LedgerError::Reverted(_))));

        clock.advance(100);
        let late = ledger.client(Address::random());
        let tx = late.commit(id, &digest, FEE).await.unwrap();
        assert!(matches!(late.confirm(&tx).await, Err(LedgerError::Reverted(_))));

        assert_eq!(ledger.submitted_transactions(), 4);
    }

    #[tokio::test]
    async fn test_reveal_with_wrong_salt_reverts() {
        let (clock, ledger) = setup();
        let client = ledger.client(Address::random());
        let id = ledger.start_round("Pick a colour", FEE, 100, 100);

        let tx = client
            .commit(id, &CommitDigest::compute("blue", &Salt::random()), FEE)
            .await
            .unwrap();
        client.confirm(&tx).await.unwrap();

        clock.advance(100);
        let tx = client.reveal(id, "blue", &Salt::random()).await.unwrap();
        assert!(matches!(client.confirm(&tx).await, Err(LedgerError::Reverted(_))));
    }

    #[tokio::test]
    async fn test_simulated_read_failures() {
        let (_clock, ledger) = setup();
        let client = ledger.client(Address::random());
        ledger.fail_next_reads(2);

        assert!(client.current_round_id().await.is_err());
        assert!(client.current_round_id().await.is_err());
        assert!(client.current_round_id().await.is_ok());
    }
}
