use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{debug, instrument};

use crate::{
    auth::{
        dto::{LoginRequest, PublicUser, Secret, SignupRequest, TokenResponse},
        extractors::{Admin, AuthUser, Member, RequireRole},
    },
    error::AppError,
    state::AppState,
};

const INVALID_BODY: &str = "invalid JSON body";

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
}

pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_me))
        .route("/admin-only", get(admin_only))
        .route("/user-only", get(user_only))
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(v)| v)
        .map_err(|e| {
            debug!(rejection = %e.body_text(), "request body rejected");
            AppError::Validation(INVALID_BODY.into())
        })
}

#[instrument(skip_all)]
pub async fn signup(
    State(state): State<AppState>,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PublicUser>), AppError> {
    let user = state.auth.signup(body(payload)?).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, AppError> {
    Ok(Json(state.auth.login(body(payload)?).await?))
}

#[instrument(skip_all)]
pub async fn get_me(AuthUser(user): AuthUser) -> Json<PublicUser> {
    Json(user)
}

#[instrument(skip_all)]
pub async fn admin_only(gate: RequireRole<Admin>) -> Json<Secret> {
    debug!(user_id = %gate.into_user().id, "admin area");
    Json(Secret {
        secret: "only admins can see this",
    })
}

#[instrument(skip_all)]
pub async fn user_only(gate: RequireRole<Member>) -> Json<Secret> {
    debug!(user_id = %gate.into_user().id, "user area");
    Json(Secret {
        secret: "only users with role user can see this",
    })
}
