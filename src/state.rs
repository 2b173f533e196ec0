use std::sync::Arc;

use crate::{
    auth::AuthService,
    config::AppConfig,
    users::{InMemoryUserStore, PgUserStore, UserStore},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub auth: Arc<AuthService>,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let users: Arc<dyn UserStore> = match &config.database_url {
            Some(url) => {
                tracing::info!("using postgres user store");
                Arc::new(PgUserStore::connect(url).await?)
            }
            None => {
                tracing::warn!("DATABASE_URL not set; users are kept in memory and lost on restart");
                Arc::new(InMemoryUserStore::new())
            }
        };
        Self::from_parts(config, users)
    }

    pub fn from_parts(config: AppConfig, users: Arc<dyn UserStore>) -> anyhow::Result<Self> {
        let auth = Arc::new(AuthService::new(&config, users)?);
        Ok(Self {
            config: Arc::new(config),
            auth,
        })
    }

    /// In-memory store, cheapest hash cost, fixed secret.
    #[cfg(test)]
    pub fn fake() -> Self {
        Self::fake_with(&[])
    }

    /// Like [`AppState::fake`] with extra environment entries layered on top.
    #[cfg(test)]
    pub fn fake_with(overrides: &[(&str, &str)]) -> Self {
        let mut env: std::collections::HashMap<String, String> = [
            ("JWT_SECRET", "test-secret"),
            ("JWT_ISSUER", "test-issuer"),
            ("JWT_AUDIENCE", "test-aud"),
            ("PASSWORD_HASH_COST", "1"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        for (k, v) in overrides {
            env.insert(k.to_string(), v.to_string());
        }

        let config = AppConfig::from_lookup(|k| env.get(k).cloned()).expect("test config");
        Self::from_parts(config, Arc::new(InMemoryUserStore::new())).expect("test state")
    }
}
