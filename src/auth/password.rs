use std::sync::Arc;

use anyhow::Context;
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use tracing::error;

/// Argon2id hashing with a time cost fixed at startup.
///
/// Verification reads the parameters from the stored PHC string, so hashes made
/// under an older cost keep verifying after the cost changes.
#[derive(Clone)]
pub struct Passwords {
    argon2: Argon2<'static>,
    // compared against when the account does not exist, so a miss costs as much as a hit
    dummy_hash: Arc<str>,
}

impl Passwords {
    pub fn new(work_factor: u32) -> anyhow::Result<Self> {
        let params = Params::new(
            Params::DEFAULT_M_COST,
            work_factor,
            Params::DEFAULT_P_COST,
            None,
        )
        .map_err(|e| anyhow::anyhow!("invalid argon2 params: {e}"))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let dummy_hash = hash_with(&argon2, "parcelgate-dummy-password")?.into();
        Ok(Self { argon2, dummy_hash })
    }

    pub fn hash(&self, plain: &str) -> anyhow::Result<String> {
        hash_with(&self.argon2, plain)
    }

    pub fn verify(&self, plain: &str, hash: &str) -> anyhow::Result<bool> {
        let parsed = PasswordHash::new(hash).map_err(|e| {
            error!(error = %e, "argon2 parse hash error");
            anyhow::anyhow!(e.to_string())
        })?;
        Ok(self
            .argon2
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok())
    }

    /// Runs [`Passwords::hash`] on the blocking pool.
    pub async fn hash_blocking(&self, plain: String) -> anyhow::Result<String> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.hash(&plain))
            .await
            .context("hash task panicked")?
    }

    /// Runs [`Passwords::verify`] on the blocking pool. With no stored hash the
    /// password is checked against a throwaway hash and the result is always `false`.
    pub async fn verify_blocking(&self, plain: String, hash: Option<String>) -> anyhow::Result<bool> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || match hash {
            Some(hash) => this.verify(&plain, &hash),
            None => {
                let _ = this.verify(&plain, &this.dummy_hash)?;
                Ok(false)
            }
        })
        .await
        .context("verify task panicked")?
    }
}

fn hash_with(argon2: &Argon2<'_>, plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = argon2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}
