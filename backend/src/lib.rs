use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, HeaderValue};
use axum::response::{AppendHeaders, IntoResponse};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use exchange_core::{Assignment, DrawPhase, PlayerId, Role, Roster, Round, SessionGate};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod config;
pub mod error;

use auth::{clear_session_cookie, current_session, require_admin, session_cookie, session_token};
use config::Config;
use error::ApiError;

/// The round and the RNG that feeds its draws share one lock, so every draw is
/// serialized against other draws, starts and resets.
struct RoundState {
    round: Round,
    rng: ChaCha8Rng,
}

/// Shared state. Lock order when holding more than one guard: roster, round, sessions.
#[derive(Clone)]
pub struct AppState {
    roster: Arc<RwLock<Roster>>,
    round: Arc<RwLock<RoundState>>,
    sessions: Arc<RwLock<SessionGate>>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::with_rng(ChaCha8Rng::from_entropy())
    }
}

impl AppState {
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(ChaCha8Rng::seed_from_u64(seed))
    }

    pub fn from_config(config: &Config) -> Self {
        match config.draw_seed {
            Some(seed) => Self::with_seed(seed),
            None => Self::default(),
        }
    }

    fn with_rng(rng: ChaCha8Rng) -> Self {
        Self {
            roster: Arc::new(RwLock::new(Roster::new())),
            round: Arc::new(RwLock::new(RoundState {
                round: Round::new(),
                rng,
            })),
            sessions: Arc::new(RwLock::new(SessionGate::new())),
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/players", get(list_players))
        .route("/api/bootstrap", post(bootstrap))
        .route("/api/login", post(login))
        .route("/api/logout", post(logout))
        .route("/api/game/status", get(game_status))
        .route("/api/spin", post(spin))
        .route("/api/admin/players", get(admin_players).post(add_player))
        .route("/api/admin/players/:name", delete(delete_player))
        .route("/api/admin/start", post(start_round))
        .route("/api/admin/reset", post(reset_round))
        .route("/api/admin/reset-password", post(reset_password))
        .route("/api/admin/assignments", get(assignments))
        .with_state(state)
}

/// Router with the transport layers the binary serves.
pub fn service(state: AppState, config: &Config) -> Router {
    let cors = match config
        .cors_origin
        .as_deref()
        .and_then(|o| HeaderValue::from_str(o).ok())
    {
        Some(origin) => CorsLayer::new()
            .allow_origin(AllowOrigin::exact(origin))
            .allow_credentials(true),
        None => CorsLayer::permissive(),
    };
    app(state).layer(cors).layer(TraceLayer::new_for_http())
}

#[derive(Serialize)]
struct Success {
    success: bool,
}

const OK: Json<Success> = Json(Success { success: true });

async fn health() -> &'static str {
    "ok"
}

#[derive(Serialize)]
struct PublicPlayer {
    name: PlayerId,
}

#[derive(Serialize)]
struct PublicPlayers {
    players: Vec<PublicPlayer>,
}

async fn list_players(State(state): State<AppState>) -> Json<PublicPlayers> {
    let roster = state.roster.read().await;
    let players = roster
        .list()
        .into_iter()
        .map(|p| PublicPlayer { name: p.id })
        .collect();
    Json(PublicPlayers { players })
}

#[derive(Deserialize)]
struct Credentials {
    #[serde(default)]
    name: String,
    #[serde(default)]
    password: String,
}

#[derive(Serialize)]
struct MessageResponse {
    success: bool,
    message: &'static str,
}

async fn bootstrap(
    State(state): State<AppState>,
    Json(payload): Json<Credentials>,
) -> Result<Json<MessageResponse>, ApiError> {
    let mut roster = state.roster.write().await;
    roster.bootstrap(payload.name.clone(), payload.password)?;
    tracing::info!(admin = %payload.name, "bootstrap admin created");
    Ok(Json(MessageResponse {
        success: true,
        message: "Admin created successfully",
    }))
}

#[derive(Serialize)]
struct LoginResponse {
    success: bool,
    role: Role,
    token: String,
}

async fn login(
    State(state): State<AppState>,
    Json(payload): Json<Credentials>,
) -> Result<impl IntoResponse, ApiError> {
    let session = {
        let roster = state.roster.read().await;
        let mut sessions = state.sessions.write().await;
        sessions
            .login(&roster, &payload.name, &payload.password)
            .map_err(|err| {
                tracing::warn!(player = %payload.name, "login failed: {err}");
                err
            })?
    };
    tracing::info!(player = %session.player_id, role = ?session.role, "logged in");

    Ok((
        AppendHeaders([(SET_COOKIE, session_cookie(&session.token))]),
        Json(LoginResponse {
            success: true,
            role: session.role,
            token: session.token,
        }),
    ))
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Some(token) = session_token(&headers) {
        state.sessions.write().await.logout(&token);
    }
    (AppendHeaders([(SET_COOKIE, clear_session_cookie())]), OK)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    game_started: bool,
    can_spin: bool,
    phase: DrawPhase,
    message: String,
    assignment: Option<Assignment>,
    has_spun: bool,
    is_double_spinner: bool,
}

async fn game_status(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<StatusResponse>, ApiError> {
    let session = current_session(&state, &headers).await?;
    let status = state.round.read().await.round.status(&session.player_id);
    tracing::debug!(player = %session.player_id, phase = ?status.phase, "status polled");

    Ok(Json(StatusResponse {
        game_started: status.started,
        can_spin: status.can_draw,
        phase: status.phase,
        message: status.message,
        assignment: status.assignment,
        has_spun: status.has_drawn,
        is_double_spinner: status.is_double_spinner,
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SpinResponse {
    assigned_to: PlayerId,
}

async fn spin(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SpinResponse>, ApiError> {
    let session = current_session(&state, &headers).await?;
    let mut guard = state.round.write().await;
    let RoundState { round, rng } = &mut *guard;

    let assigned_to = round.draw(&session.player_id, rng).map_err(|err| {
        tracing::warn!(player = %session.player_id, "draw refused: {err}");
        err
    })?;
    tracing::info!(
        player = %session.player_id,
        pool_left = round.pool().len(),
        "draw completed"
    );
    Ok(Json(SpinResponse { assigned_to }))
}

#[derive(Serialize)]
struct AdminPlayer {
    name: PlayerId,
    role: Role,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AdminPlayers {
    players: Vec<AdminPlayer>,
    game_started: bool,
}

async fn admin_players(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<AdminPlayers>, ApiError> {
    require_admin(&state, &headers).await?;
    let roster = state.roster.read().await;
    let game_started = state.round.read().await.round.is_started();
    let players = roster
        .list()
        .into_iter()
        .map(|p| AdminPlayer {
            name: p.id,
            role: p.role,
        })
        .collect();
    Ok(Json(AdminPlayers {
        players,
        game_started,
    }))
}

#[derive(Deserialize)]
struct NewPlayer {
    #[serde(default)]
    name: String,
    #[serde(default)]
    password: String,
    role: Option<Role>,
}

async fn add_player(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<NewPlayer>,
) -> Result<Json<Success>, ApiError> {
    let admin = require_admin(&state, &headers).await?;
    state
        .roster
        .write()
        .await
        .add(payload.name.clone(), payload.password, payload.role)?;
    tracing::info!(by = %admin.player_id, player = %payload.name, "player added");
    Ok(OK)
}

async fn delete_player(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Result<Json<Success>, ApiError> {
    let admin = require_admin(&state, &headers).await?;
    {
        let mut roster = state.roster.write().await;
        let round = state.round.read().await;
        roster.remove(&name, &round.round)?;
    }
    let dropped = state.sessions.write().await.invalidate_all(&name);
    tracing::info!(by = %admin.player_id, player = %name, sessions = dropped, "player removed");
    Ok(OK)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartRequest {
    double_spinner_name: Option<String>,
    #[serde(default)]
    admin_participates: bool,
}

async fn start_round(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<StartRequest>,
) -> Result<Json<Success>, ApiError> {
    let admin = require_admin(&state, &headers).await?;
    let roster = state.roster.read().await;
    let mut guard = state.round.write().await;
    guard
        .round
        .start(
            &roster,
            payload.admin_participates,
            payload.double_spinner_name.as_deref(),
        )
        .map_err(|err| {
            tracing::warn!(by = %admin.player_id, "start refused: {err}");
            err
        })?;
    tracing::info!(
        by = %admin.player_id,
        pool = guard.round.pool().len(),
        double_spinner = ?guard.round.double_spinner(),
        "round started"
    );
    Ok(OK)
}

async fn reset_round(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Success>, ApiError> {
    let admin = require_admin(&state, &headers).await?;
    state.round.write().await.round.reset();
    tracing::info!(by = %admin.player_id, "round reset");
    Ok(OK)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResetPassword {
    #[serde(default)]
    name: String,
    #[serde(default)]
    new_password: String,
}

async fn reset_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ResetPassword>,
) -> Result<Json<Success>, ApiError> {
    let admin = require_admin(&state, &headers).await?;
    if payload.name.is_empty() {
        return Err(exchange_core::ExchangeError::InvalidInput("name required".into()).into());
    }
    let mut roster = state.roster.write().await;
    roster.reset_credential(&payload.name, payload.new_password)?;
    let dropped = state.sessions.write().await.invalidate_all(&payload.name);
    tracing::info!(by = %admin.player_id, player = %payload.name, sessions = dropped, "password reset");
    Ok(OK)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AssignmentsResponse {
    assignments: BTreeMap<PlayerId, Assignment>,
    game_started: bool,
    double_spinner: Option<PlayerId>,
    pool_size: usize,
}

async fn assignments(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<AssignmentsResponse>, ApiError> {
    require_admin(&state, &headers).await?;
    let snapshot = state.round.read().await.round.snapshot();
    Ok(Json(AssignmentsResponse {
        assignments: snapshot.assignments,
        game_started: snapshot.started,
        double_spinner: snapshot.double_spinner,
        pool_size: snapshot.pool_size,
    }))
}
