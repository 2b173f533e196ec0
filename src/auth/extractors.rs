use std::marker::PhantomData;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use tracing::warn;

use super::dto::PublicUser;
use crate::{error::AppError, state::AppState, users::Role};

const MISSING_HEADER: &str = "missing or invalid authorization header";

/// Authentication gate: verifies the bearer token and resolves its subject.
///
/// The resolved identity is also stored in the request extensions, so a later
/// extractor on the same request does not verify twice.
pub struct AuthUser(pub PublicUser);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<PublicUser>() {
            return Ok(AuthUser(user.clone()));
        }

        let token = bearer_token(&parts.headers).ok_or(AppError::Unauthorized(MISSING_HEADER))?;
        let user = state.auth.authenticate(token).await?;
        parts.extensions.insert(user.clone());
        Ok(AuthUser(user))
    }
}

// Expect "Bearer <token>"
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let auth = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = auth
        .strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("bearer "))?
        .trim();
    (!token.is_empty()).then_some(token)
}

/// Role a [`RequireRole`] gate demands.
pub trait RequiredRole: Send + Sync + 'static {
    const ROLE: Role;
}

pub struct Admin;
pub struct Member;

impl RequiredRole for Admin {
    const ROLE: Role = Role::Admin;
}

impl RequiredRole for Member {
    const ROLE: Role = Role::User;
}

/// Authorization gate: runs [`AuthUser`] and then demands an exact role match.
pub struct RequireRole<R> {
    user: PublicUser,
    _role: PhantomData<R>,
}

impl<R> RequireRole<R> {
    pub fn into_user(self) -> PublicUser {
        self.user
    }
}

#[async_trait]
impl<R: RequiredRole> FromRequestParts<AppState> for RequireRole<R> {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        let required = R::ROLE;
        if user.role != required {
            warn!(user_id = %user.id, role = %user.role, %required, "role mismatch");
            return Err(AppError::Forbidden);
        }
        Ok(RequireRole {
            user,
            _role: PhantomData,
        })
    }
}
