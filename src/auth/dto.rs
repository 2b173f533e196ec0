use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::users::{Role, User};

/// Request body for signup. Fields are optional so that absence surfaces as a
/// 400 from the service rather than a deserialization rejection.
#[derive(Debug, Default, Deserialize)]
pub struct SignupRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    /// Any JSON value; only the string `"admin"` can elevate.
    pub role: Option<serde_json::Value>,
}

/// Request body for login.
#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Response returned after a successful login.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: String,
}

/// Public part of the user: what signup and `/me` return and what the
/// authentication gate attaches to the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
}

impl From<&User> for PublicUser {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            email: u.email.clone(),
            role: u.role,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Secret {
    pub secret: &'static str,
}
