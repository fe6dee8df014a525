//! Pattern session endpoints.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

use sigil_common::{EncodedSecret, Frame, Outcome};
use sigil_engine::{
    EngineConfig, Mode, PointerEvent, RecognizerEvent, SecretSource, Session, SessionSnapshot,
};

use super::{ApiError, ApiResult, api_error, engine_error, internal_error, not_found};
use crate::reset::schedule_reset;
use crate::secrets::{self, SecretSlot};
use crate::sessions::HostedSession;
use crate::state::AppState;

/// Where a session's secret lives
#[derive(Debug, Default, Deserialize)]
pub struct SecretRef {
    /// Redis-backed secret name
    #[serde(default)]
    secret_name: Option<String>,
    /// Wire form of an encoded secret to compare against
    #[serde(default)]
    expected_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    mode: Mode,
    #[serde(flatten)]
    secret: SecretRef,
    /// Overrides the configured captcha length
    #[serde(default)]
    captcha_wired_dots: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SessionCreated {
    session_id: String,
    mode: Mode,
    frame: Frame,
    grid_size: u8,
}

/// Open a create, compare or captcha session
pub async fn create_session(
    State(state): State<AppState>,
    Json(payload): Json<CreateSessionRequest>,
) -> ApiResult<SessionCreated> {
    let engine = with_captcha_override(state.config.engine.clone(), payload.captcha_wired_dots)?;
    let hosted = open_session(&state, engine, payload.mode, &payload.secret, None).await?;
    Ok(Json(register(&state, hosted).await))
}

/// Client-chosen captcha length must fit the configured grid
fn with_captcha_override(
    mut engine: EngineConfig,
    dots: Option<usize>,
) -> Result<EngineConfig, ApiError> {
    let Some(dots) = dots else {
        return Ok(engine);
    };
    let capacity = engine.grid().map_err(engine_error)?.capacity();
    if !(1..=capacity).contains(&dots) {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            format!("captcha_wired_dots must be in 1..={}", capacity),
        ));
    }
    engine.captcha_wired_dots = dots;
    Ok(engine)
}

#[derive(Debug, Deserialize)]
pub struct RestoreSessionRequest {
    snapshot: SessionSnapshot,
    #[serde(flatten)]
    secret: SecretRef,
}

/// Rebuild a session from a snapshot taken before a reload
pub async fn restore_session(
    State(state): State<AppState>,
    Json(payload): Json<RestoreSessionRequest>,
) -> ApiResult<SessionCreated> {
    let mode = payload.snapshot.mode;
    let engine = state.config.engine.clone();
    let hosted = open_session(&state, engine, mode, &payload.secret, Some(payload.snapshot)).await?;
    Ok(Json(register(&state, hosted).await))
}

#[derive(Debug, Deserialize)]
pub struct EventsRequest {
    events: Vec<PointerEvent>,
}

#[derive(Debug, Serialize)]
pub struct EventsResponse {
    frame: Frame,
    outcomes: Vec<Outcome>,
    events: Vec<RecognizerEvent>,
    /// Milliseconds until the displayed pattern resets, if one is pending
    #[serde(skip_serializing_if = "Option::is_none")]
    reset_in_ms: Option<u64>,
    /// Trailing events not applied because the session closed or failed
    #[serde(skip_serializing_if = "is_zero")]
    ignored_events: usize,
    /// Why the batch stopped early, if an event failed
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

/// Feed pointer events to a session
pub async fn post_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<EventsRequest>,
) -> ApiResult<EventsResponse> {
    let hosted = state.sessions.get(&id).await.ok_or_else(|| not_found(&id))?;
    let mut guard = hosted.lock().await;
    let batch = guard.apply(&payload.events).map_err(engine_error)?;

    // Flush before reporting anything so a created secret is never dropped
    if batch.outcomes.iter().any(Outcome::is_success) {
        if let Some(slot) = guard.slot.as_ref() {
            slot.flush(&mut state.redis.clone())
                .await
                .map_err(internal_error)?;
        }
    }
    drop(guard);

    if let Some(ticket) = batch.reset {
        schedule_reset(hosted.clone(), ticket);
    }

    if let Some(err) = batch.rejected.as_ref() {
        tracing::warn!(session_id = %id, error = %err, ignored = batch.ignored, "Batch stopped early");
    }
    tracing::debug!(
        session_id = %id,
        events = payload.events.len(),
        outcomes = batch.outcomes.len(),
        ignored = batch.ignored,
        "Events applied"
    );

    Ok(Json(EventsResponse {
        frame: batch.frame,
        outcomes: batch.outcomes,
        events: batch.events,
        reset_in_ms: batch.reset.map(|t| t.delay.as_millis() as u64),
        ignored_events: batch.ignored,
        error: batch.rejected.map(|err| err.to_string()),
    }))
}

/// Start over; create sessions also forget their first pass
pub async fn restart_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Frame> {
    let hosted = state.sessions.get(&id).await.ok_or_else(|| not_found(&id))?;
    let mut guard = hosted.lock().await;
    guard.touch();
    Ok(Json(guard.session.restart()))
}

pub async fn get_snapshot(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<SessionSnapshot> {
    let hosted = state.sessions.get(&id).await.ok_or_else(|| not_found(&id))?;
    let guard = hosted.lock().await;
    Ok(Json(guard.session.snapshot()))
}

pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> StatusCode {
    if state.sessions.remove(&id).await {
        tracing::debug!(session_id = %id, "Session closed");
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

/// Resolve the secret, then build or restore the engine session
async fn open_session(
    state: &AppState,
    engine: EngineConfig,
    mode: Mode,
    secret: &SecretRef,
    snapshot: Option<SessionSnapshot>,
) -> Result<HostedSession, ApiError> {
    let mut ctx = state.session_context(engine);
    let mut slot = None;
    let mut source = None;

    if let Some(name) = secret.secret_name.as_deref().filter(|_| mode != Mode::Captcha) {
        if !secrets::is_valid_name(name) {
            return Err(api_error(StatusCode::BAD_REQUEST, "Invalid secret_name"));
        }

        let stored = if mode == Mode::Compare {
            let stored = secrets::load_secret(&mut state.redis.clone(), name)
                .await
                .map_err(internal_error)?;
            if stored.is_none() {
                return Err(api_error(
                    StatusCode::NOT_FOUND,
                    format!("No secret stored under {}", name),
                ));
            }
            source = Some(SecretSource::Store);
            stored
        } else {
            None
        };

        let s = SecretSlot::new(name, stored);
        ctx = ctx.with_store(Box::new(s.clone()));
        slot = Some(s);
    }

    if let Some(wire) = secret.expected_secret.as_deref() {
        let expected = EncodedSecret::from_wire(wire).map_err(engine_error)?;
        source = Some(SecretSource::Secret(expected));
    }

    if mode == Mode::Compare && source.is_none() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Compare sessions need secret_name or expected_secret",
        ));
    }

    let session = match (snapshot, source) {
        (Some(snapshot), source) => Session::restore(ctx, snapshot, source),
        (None, Some(source)) if mode == Mode::Compare => Session::compare(ctx, source),
        (None, _) if mode == Mode::Captcha => Session::captcha(ctx),
        (None, _) => Session::create(ctx),
    }
    .map_err(engine_error)?;

    Ok(HostedSession::new(session, slot))
}

async fn register(state: &AppState, hosted: HostedSession) -> SessionCreated {
    let mode = hosted.session.mode();
    let frame = hosted.session.frame();
    let grid_size = hosted.session.grid().size();
    let pending = hosted.session.pending_reset();

    let (session_id, handle) = state.sessions.insert(hosted).await;
    if let Some(ticket) = pending {
        schedule_reset(handle, ticket);
    }

    tracing::info!(session_id = %session_id, mode = ?mode, "Session opened");
    SessionCreated {
        session_id,
        mode,
        frame,
        grid_size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_parses_flattened_secret() {
        let request: CreateSessionRequest = serde_json::from_str(
            r#"{"mode":"compare","secret_name":"alice","captcha_wired_dots":5}"#,
        )
        .unwrap();
        assert_eq!(request.mode, Mode::Compare);
        assert_eq!(request.secret.secret_name.as_deref(), Some("alice"));
        assert!(request.secret.expected_secret.is_none());
        assert_eq!(request.captcha_wired_dots, Some(5));
    }

    #[test]
    fn test_events_request_parses_pointer_stream() {
        let request: EventsRequest = serde_json::from_str(
            r#"{"events":[{"kind":"down","x":0.5,"y":0.5},{"kind":"move","x":1.5,"y":0.5},{"kind":"up"}]}"#,
        )
        .unwrap();
        assert_eq!(request.events.len(), 3);
        assert_eq!(request.events[2], PointerEvent::Up);
    }

    #[test]
    fn test_events_response_omits_absent_reset() {
        let response = EventsResponse {
            frame: Frame::default(),
            outcomes: vec![Outcome::CandidateRecorded],
            events: vec![RecognizerEvent::Started],
            reset_in_ms: None,
            ignored_events: 0,
            error: None,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("reset_in_ms").is_none());
        assert!(json.get("ignored_events").is_none());
        assert!(json.get("error").is_none());
        assert_eq!(json["outcomes"][0]["kind"], "candidate_recorded");
        assert_eq!(json["frame"]["display_mode"], "correct");
    }

    #[test]
    fn test_captcha_override_checked_against_grid() {
        let engine = EngineConfig::default();

        let (status, _) = with_captcha_override(engine.clone(), Some(0)).unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, Json(body)) = with_captcha_override(engine.clone(), Some(10)).unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.error.contains("1..=9"));

        let tuned = with_captcha_override(engine.clone(), Some(9)).unwrap();
        assert_eq!(tuned.captcha_wired_dots, 9);
        assert_eq!(with_captcha_override(engine.clone(), None).unwrap(), engine);
    }
}
