use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use super::{
    dto::{LoginRequest, PublicUser, SignupRequest, TokenResponse},
    jwt::JwtKeys,
    password::Passwords,
};
use crate::{
    config::AppConfig,
    error::AppError,
    users::{NewUser, Role, UserStore},
};

const MISSING_FIELDS: &str = "email and password are required";
const INVALID_CREDENTIALS: &str = "invalid credentials";
pub(crate) const INVALID_TOKEN: &str = "invalid or expired token";

/// Decides which role a signup request ends up with.
#[derive(Debug, Clone, Copy)]
pub struct SignupPolicy {
    /// When set, a client may self-assign `admin`. This trusts an unauthenticated
    /// request with elevation and is on by default only for compatibility.
    pub allow_admin_signup: bool,
}

impl SignupPolicy {
    pub fn resolve_role(&self, requested: Option<&serde_json::Value>) -> Role {
        match requested.and_then(|v| v.as_str()) {
            Some("admin") if self.allow_admin_signup => Role::Admin,
            _ => Role::User,
        }
    }
}

pub struct AuthService {
    users: Arc<dyn UserStore>,
    keys: JwtKeys,
    passwords: Passwords,
    policy: SignupPolicy,
    expires_in: String,
}

impl AuthService {
    pub fn new(config: &AppConfig, users: Arc<dyn UserStore>) -> anyhow::Result<Self> {
        Ok(Self {
            users,
            keys: JwtKeys::from_config(&config.jwt),
            passwords: Passwords::new(config.password_hash_cost)?,
            policy: SignupPolicy {
                allow_admin_signup: config.allow_admin_signup,
            },
            expires_in: config.jwt.expires_in.clone(),
        })
    }

    pub async fn signup(&self, req: SignupRequest) -> Result<PublicUser, AppError> {
        let (email, password) = required(req.email, req.password)?;
        let role = self.policy.resolve_role(req.role.as_ref());
        if role == Role::Admin {
            warn!(email = %email, "admin role self-assigned at signup");
        }

        // cheap rejection before paying for a hash; the store still has the final word
        if self.users.find_user_by_email(&email).await?.is_some() {
            warn!(email = %email, "email already registered");
            return Err(AppError::Conflict);
        }

        let password_hash = self.passwords.hash_blocking(password).await?;
        let user = self
            .users
            .create_user(NewUser {
                id: Uuid::new_v4(),
                email,
                password_hash,
                role,
            })
            .await
            .inspect_err(|e| warn!(error = %e, "create user failed"))?;

        info!(user_id = %user.id, email = %user.email, role = %user.role, "user registered");
        Ok(PublicUser::from(&user))
    }

    pub async fn login(&self, req: LoginRequest) -> Result<TokenResponse, AppError> {
        let (email, password) = required(req.email, req.password)?;

        let user = self.users.find_user_by_email(&email).await?;
        let stored_hash = user.as_ref().map(|u| u.password_hash.clone());
        let ok = self.passwords.verify_blocking(password, stored_hash).await?;

        let user = match user {
            Some(u) if ok => u,
            Some(u) => {
                warn!(email = %email, user_id = %u.id, "login invalid password");
                return Err(AppError::Unauthorized(INVALID_CREDENTIALS));
            }
            None => {
                warn!(email = %email, "login unknown email");
                return Err(AppError::Unauthorized(INVALID_CREDENTIALS));
            }
        };

        let access_token = self.keys.sign(&user)?;
        info!(user_id = %user.id, "user logged in");
        Ok(TokenResponse {
            access_token,
            token_type: "Bearer",
            expires_in: self.expires_in.clone(),
        })
    }

    /// Verifies a bearer token and re-resolves its subject. Every failure is the
    /// same `Unauthorized` so callers cannot tell expiry from forgery.
    pub async fn authenticate(&self, token: &str) -> Result<PublicUser, AppError> {
        let claims = self.keys.verify(token).map_err(|e| {
            warn!(error = %e, "token rejected");
            AppError::Unauthorized(INVALID_TOKEN)
        })?;

        match self.users.find_user_by_id(claims.sub).await? {
            Some(user) => Ok(PublicUser::from(&user)),
            None => {
                warn!(user_id = %claims.sub, "token subject no longer exists");
                Err(AppError::Unauthorized(INVALID_TOKEN))
            }
        }
    }
}

fn required(email: Option<String>, password: Option<String>) -> Result<(String, String), AppError> {
    match (email, password) {
        (Some(e), Some(p)) if !e.is_empty() && !p.is_empty() => Ok((e, p)),
        _ => Err(AppError::Validation(MISSING_FIELDS.into())),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::state::AppState;

    fn service() -> Arc<AuthService> {
        AppState::fake().auth
    }

    fn signup_req(email: &str, password: &str, role: Option<serde_json::Value>) -> SignupRequest {
        SignupRequest {
            email: Some(email.into()),
            password: Some(password.into()),
            role,
        }
    }

    fn login_req(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: Some(email.into()),
            password: Some(password.into()),
        }
    }

    #[test]
    fn role_resolution() {
        let open = SignupPolicy { allow_admin_signup: true };
        assert_eq!(open.resolve_role(None), Role::User);
        assert_eq!(open.resolve_role(Some(&json!("admin"))), Role::Admin);
        assert_eq!(open.resolve_role(Some(&json!("superuser"))), Role::User);
        assert_eq!(open.resolve_role(Some(&json!("Admin"))), Role::User);
        assert_eq!(open.resolve_role(Some(&json!(["admin"]))), Role::User);

        let closed = SignupPolicy { allow_admin_signup: false };
        assert_eq!(closed.resolve_role(Some(&json!("admin"))), Role::User);
    }

    #[tokio::test]
    async fn signup_then_login_then_authenticate() {
        let auth = service();
        let created = auth
            .signup(signup_req("a@x.com", "secret123", None))
            .await
            .unwrap();
        assert_eq!(created.role, Role::User);

        let token = auth.login(login_req("a@x.com", "secret123")).await.unwrap();
        assert_eq!(token.token_type, "Bearer");
        assert_eq!(token.expires_in, "1h");

        let me = auth.authenticate(&token.access_token).await.unwrap();
        assert_eq!(me, created);
    }

    #[tokio::test]
    async fn signup_requires_both_fields() {
        let auth = service();
        for req in [
            SignupRequest::default(),
            signup_req("", "pw", None),
            signup_req("a@x.com", "", None),
        ] {
            assert!(matches!(auth.signup(req).await, Err(AppError::Validation(_))));
        }
    }

    #[tokio::test]
    async fn duplicate_signup_conflicts_and_keeps_one_record() {
        let auth = service();
        auth.signup(signup_req("a@x.com", "pw1", None)).await.unwrap();
        let err = auth
            .signup(signup_req("a@x.com", "pw2", Some(json!("admin"))))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict));

        // the first password still works, the second one never landed
        assert!(auth.login(login_req("a@x.com", "pw1")).await.is_ok());
        assert!(auth.login(login_req("a@x.com", "pw2")).await.is_err());
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_look_the_same() {
        let auth = service();
        auth.signup(signup_req("a@x.com", "pw", None)).await.unwrap();

        let wrong = auth.login(login_req("a@x.com", "nope")).await.unwrap_err();
        let unknown = auth.login(login_req("b@x.com", "pw")).await.unwrap_err();
        assert_eq!(wrong.status(), unknown.status());
        assert_eq!(wrong.to_string(), unknown.to_string());
    }

    #[tokio::test]
    async fn token_for_deleted_subject_is_rejected() {
        let auth = service();
        auth.signup(signup_req("a@x.com", "pw", None)).await.unwrap();
        let token = auth.login(login_req("a@x.com", "pw")).await.unwrap();

        // a fresh service shares keys but not the store
        let other = service();
        let err = other.authenticate(&token.access_token).await.unwrap_err();
        assert_eq!(err.to_string(), INVALID_TOKEN);
    }

    #[tokio::test]
    async fn emails_are_not_normalised() {
        let auth = service();
        auth.signup(signup_req("a@x.com", "pw", None)).await.unwrap();
        assert!(auth.login(login_req("A@X.com", "pw")).await.is_err());
    }
}
