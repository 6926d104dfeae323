//! Schelling Point Player Service
//!
//! HTTP service exposing one participant's round session: the derived view
//! plus commit, reveal and claim.

mod config;
mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use config::{Config, LedgerMode};
use schelling_core::{
    Address, Amount, Clock, FileStore, LedgerClient, LedgerError, MockLedger, RoundSession,
    RpcLedgerClient, SessionEvent, SystemClock,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use handlers::AppState;

const DEMO_THEME: &str = "Name a colour everyone else will name";
const DEMO_ENTRY_FEE: Amount = Amount::from_wei(10_000_000_000_000_000);
const DEMO_PHASE_SECS: u64 = 300;

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/session", get(handlers::get_session))
        .route("/api/refresh", post(handlers::refresh))
        .route("/api/commit", post(handlers::commit))
        .route("/api/reveal", post(handlers::reveal))
        .route("/api/claim", post(handlers::claim))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Ledger client for the configured mode, and the participant it acts as
fn connect(
    config: &Config,
    clock: Arc<dyn Clock>,
) -> Result<(Arc<dyn LedgerClient>, Address), LedgerError> {
    match &config.ledger {
        LedgerMode::Demo => {
            let participant = config.participant.unwrap_or_else(Address::random);
            let ledger = MockLedger::new(clock);
            let round_id =
                ledger.start_round(DEMO_THEME, DEMO_ENTRY_FEE, DEMO_PHASE_SECS, DEMO_PHASE_SECS);
            info!(
                "Demo mode: mock ledger with round {} (set LEDGER_RPC_URL to use a node)",
                round_id
            );
            let client: Arc<dyn LedgerClient> = Arc::new(ledger.client(participant));
            Ok((client, participant))
        }
        LedgerMode::Rpc {
            url,
            contract,
            participant,
        } => {
            let participant = *participant;
            info!("Ledger RPC enabled: {} (contract {})", url, contract);
            let client: Arc<dyn LedgerClient> = Arc::new(
                RpcLedgerClient::new(url, *contract, participant)?
                    .with_confirm_timeout(config.confirm_timeout),
            );
            Ok((client, participant))
        }
    }
}

/// Re-read ledger state on a fixed interval
fn spawn_poller(session: AppState, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            session.refresh().await;
        }
    })
}

/// Log session notifications; stands in for a render layer
fn spawn_event_log(session: &RoundSession) -> tokio::task::JoinHandle<()> {
    let mut events = session.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SessionEvent::RoundChanged { previous, current }) => {
                    info!(?previous, %current, "round changed");
                }
                Ok(SessionEvent::StateChanged(view)) => {
                    info!(
                        state = view.state.name(),
                        phase = ?view.phase,
                        remaining = view.time_remaining_secs,
                        "session state changed"
                    );
                }
                Ok(SessionEvent::Tick { remaining }) => {
                    debug!(remaining = remaining.as_secs(), "tick");
                }
                Ok(SessionEvent::ReadFailed { what, error }) => {
                    warn!(%what, %error, "ledger read failed");
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "event log lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let (ledger, participant) = connect(&config, clock.clone())?;
    let store = Arc::new(FileStore::open(&config.store_dir)?);

    info!("Participant: {}", participant);
    info!("Commitments stored in {}", config.store_dir.display());

    let session: AppState = Arc::new(RoundSession::new(ledger, store, clock, participant));
    let _events = spawn_event_log(&session);
    let _poller = spawn_poller(session.clone(), config.poll_interval);

    let app = create_router(session.clone());

    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("Player service listening on http://0.0.0.0:{}", config.port);

    axum::serve(listener, app).await?;
    session.stop();
    Ok(())
}
