//! HTTP API handlers.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use schelling_core::{RoundSession, SessionError, SessionView, TxHandle};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

pub type AppState = Arc<RoundSession>;

// ============ Errors ============

/// Application error type
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        let status = match &e {
            SessionError::Validation(_) | SessionError::NotAllowed { .. } => StatusCode::BAD_REQUEST,
            SessionError::AlreadyPending(_) => StatusCode::CONFLICT,
            SessionError::Submission(_) => StatusCode::BAD_GATEWAY,
            SessionError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(error = %e, "request failed");
        }
        Self {
            status,
            message: e.to_string(),
        }
    }
}

// ============ Request/Response types ============

#[derive(Deserialize)]
pub struct CommitRequest {
    pub answer: String,
}

#[derive(Deserialize)]
pub struct RevealRequest {
    pub answer: String,
    pub salt: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    #[serde(flatten)]
    pub view: SessionView,
    /// `HH:MM:SS` rendering of `time_remaining_secs`
    pub countdown: String,
}

impl From<SessionView> for SessionResponse {
    fn from(view: SessionView) -> Self {
        Self {
            countdown: format_countdown(view.time_remaining_secs),
            view,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub tx: TxHandle,
    pub session: SessionResponse,
}

/// Render seconds as `HH:MM:SS`; hours are not wrapped
pub fn format_countdown(secs: u64) -> String {
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

// ============ Handlers ============

pub async fn get_session(State(session): State<AppState>) -> Json<SessionResponse> {
    Json(session.view().into())
}

pub async fn refresh(State(session): State<AppState>) -> Json<SessionResponse> {
    Json(session.refresh().await.into())
}

pub async fn commit(
    State(session): State<AppState>,
    Json(req): Json<CommitRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    let tx = session.commit(&req.answer).await?;
    Ok(Json(ActionResponse {
        tx,
        session: session.view().into(),
    }))
}

pub async fn reveal(
    State(session): State<AppState>,
    Json(req): Json<RevealRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    let tx = session.reveal(&req.answer, &req.salt).await?;
    Ok(Json(ActionResponse {
        tx,
        session: session.view().into(),
    }))
}

pub async fn claim(State(session): State<AppState>) -> Result<Json<ActionResponse>, AppError> {
    let tx = session.claim().await?;
    Ok(Json(ActionResponse {
        tx,
        session: session.view().into(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use schelling_core::{
        Action, ActionState, Address, Amount, LedgerError, ManualClock, MemoryStore, MockLedger,
        ValidationError,
    };

    fn demo_session() -> (AppState, ManualClock) {
        let clock = ManualClock::new(1_700_000_000);
        let ledger = MockLedger::new(Arc::new(clock.clone()));
        ledger.start_round("Name a colour", Amount::from_wei(1_000), 60, 60);
        let participant = Address::from_bytes([0x42; 20]);
        let session = RoundSession::new(
            Arc::new(ledger.client(participant)),
            Arc::new(MemoryStore::new()),
            Arc::new(clock.clone()),
            participant,
        );
        (Arc::new(session), clock)
    }

    #[test]
    fn test_format_countdown() {
        assert_eq!(format_countdown(0), "00:00:00");
        assert_eq!(format_countdown(59), "00:00:59");
        assert_eq!(format_countdown(3_661), "01:01:01");
        assert_eq!(format_countdown(100 * 3_600), "100:00:00");
    }

    #[test]
    fn test_error_status_codes() {
        let cases = [
            (
                SessionError::Validation(ValidationError::EmptyAnswer),
                StatusCode::BAD_REQUEST,
            ),
            (
                SessionError::NotAllowed {
                    action: Action::Claim,
                    state: "no_round",
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                SessionError::AlreadyPending(Action::Commit),
                StatusCode::CONFLICT,
            ),
            (
                SessionError::Submission(LedgerError::Reverted("late".to_string())),
                StatusCode::BAD_GATEWAY,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(AppError::from(error).into_response().status(), status);
        }
    }

    #[tokio::test]
    async fn test_commit_then_reveal_over_handlers() {
        let (session, clock) = demo_session();

        let Json(view) = refresh(State(session.clone())).await;
        assert_eq!(view.view.state, ActionState::CanCommit);
        assert_eq!(view.countdown, "00:01:00");

        let Json(committed) = commit(
            State(session.clone()),
            Json(CommitRequest {
                answer: "blue".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(
            committed.session.view.state,
            ActionState::AwaitingReveal {
                answer: "blue".to_string()
            }
        );

        clock.advance(60);
        let Json(view) = refresh(State(session.clone())).await;
        let prefill = match view.view.state {
            ActionState::CanReveal { prefill } => prefill,
            other => panic!("expected reveal form, got {:?}", other),
        };

        let Json(revealed) = reveal(
            State(session.clone()),
            Json(RevealRequest {
                answer: prefill.answer,
                salt: prefill.salt,
            }),
        )
        .await
        .unwrap();
        assert_eq!(revealed.session.view.state, ActionState::Revealed);
    }

    #[tokio::test]
    async fn test_claim_before_settlement_is_bad_request() {
        let (session, _clock) = demo_session();
        refresh(State(session.clone())).await;

        let err = claim(State(session)).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_session_response_is_flat() {
        let (session, _clock) = demo_session();
        let json = serde_json::to_value(SessionResponse::from(session.view())).unwrap();
        assert_eq!(json["state"], "loading");
        assert_eq!(json["countdown"], "00:00:00");
        assert!(json["participant"].as_str().unwrap().starts_with("0x"));
    }
}
