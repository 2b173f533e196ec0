use std::{str::FromStr, time::Duration};

use anyhow::{bail, Context};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    /// Lifetime as configured (`"1h"`), echoed back to clients in login responses.
    pub expires_in: String,
    pub ttl: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub max_requests: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub jwt: JwtConfig,
    /// Argon2 time cost applied to every new password hash.
    pub password_hash_cost: u32,
    pub rate_limit: RateLimitConfig,
    pub cors_origins: Vec<String>,
    /// Whether a client may ask for `role: "admin"` at signup.
    pub allow_admin_signup: bool,
    pub database_url: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let secret = var("JWT_SECRET").context("missing env var JWT_SECRET")?;
        let expires_in = var("JWT_EXPIRES_IN").unwrap_or_else(|| "1h".into());
        let ttl = parse_ttl(&expires_in)
            .with_context(|| format!("invalid JWT_EXPIRES_IN {expires_in:?}"))?;

        let jwt = JwtConfig {
            secret,
            issuer: var("JWT_ISSUER").unwrap_or_else(|| "parcelgate".into()),
            audience: var("JWT_AUDIENCE").unwrap_or_else(|| "parcelgate-users".into()),
            expires_in,
            ttl,
        };

        let password_hash_cost: u32 = parse_or(var("PASSWORD_HASH_COST"), 12, "PASSWORD_HASH_COST")?;
        if password_hash_cost == 0 {
            bail!("PASSWORD_HASH_COST must be at least 1");
        }

        let window_ms: u64 = parse_or(var("RATE_LIMIT_WINDOW_MS"), 15 * 60 * 1000, "RATE_LIMIT_WINDOW_MS")?;
        if window_ms == 0 {
            bail!("RATE_LIMIT_WINDOW_MS must be positive");
        }
        let rate_limit = RateLimitConfig {
            window: Duration::from_millis(window_ms),
            max_requests: parse_or(var("RATE_LIMIT_MAX"), 100, "RATE_LIMIT_MAX")?,
        };

        let cors_origins = var("CORS_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let allow_admin_signup = match var("ALLOW_ADMIN_SIGNUP") {
            Some(v) => parse_bool(&v).context("invalid ALLOW_ADMIN_SIGNUP")?,
            None => true,
        };

        Ok(Self {
            host: var("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(var("PORT"), 3000, "PORT")?,
            jwt,
            password_hash_cost,
            rate_limit,
            cors_origins,
            allow_admin_signup,
            database_url: var("DATABASE_URL"),
        })
    }
}

fn parse_or<T>(raw: Option<String>, default: T, key: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(v) => v.trim().parse().with_context(|| format!("invalid {key} {v:?}")),
        None => Ok(default),
    }
}

fn parse_bool(raw: &str) -> anyhow::Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected a boolean, got {other:?}"),
    }
}

/// Longest accepted token lifetime (100 Julian years). Keeps `exp` well inside
/// the range of a timestamp.
pub const MAX_TTL: Duration = Duration::from_secs(100 * 31_557_600);

/// Parses a token lifetime such as `"1h"`, `"15m"`, `"2 days"` or `"90s"`.
///
/// A bare number is read as milliseconds. The result is truncated to whole
/// seconds and must lie between one second and [`MAX_TTL`].
pub fn parse_ttl(raw: &str) -> anyhow::Result<Duration> {
    let s = raw.trim();
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (num, unit) = s.split_at(split);
    let value: f64 = num.parse().with_context(|| format!("no number in {raw:?}"))?;

    let ms_per_unit: f64 = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "ms" | "msec" | "msecs" | "millisecond" | "milliseconds" => 1.0,
        "s" | "sec" | "secs" | "second" | "seconds" => 1_000.0,
        "m" | "min" | "mins" | "minute" | "minutes" => 60_000.0,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3_600_000.0,
        "d" | "day" | "days" => 86_400_000.0,
        "w" | "week" | "weeks" => 604_800_000.0,
        "y" | "yr" | "yrs" | "year" | "years" => 31_557_600_000.0,
        other => bail!("unknown time unit {other:?}"),
    };

    let secs = (value * ms_per_unit / 1000.0).floor();
    if !secs.is_finite() || secs < 1.0 {
        bail!("lifetime must be at least one second");
    }
    if secs > MAX_TTL.as_secs() as f64 {
        bail!("lifetime must not exceed 100 years");
    }
    Ok(Duration::from_secs(secs as u64))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> anyhow::Result<AppConfig> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn defaults_apply_when_only_secret_is_set() {
        let cfg = load(&[("JWT_SECRET", "s3cret")]).unwrap();
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.jwt.expires_in, "1h");
        assert_eq!(cfg.jwt.ttl, Duration::from_secs(3600));
        assert_eq!(cfg.password_hash_cost, 12);
        assert_eq!(cfg.rate_limit.window, Duration::from_secs(900));
        assert_eq!(cfg.rate_limit.max_requests, 100);
        assert!(cfg.cors_origins.is_empty());
        assert!(cfg.allow_admin_signup);
        assert!(cfg.database_url.is_none());
    }

    #[test]
    fn missing_secret_fails() {
        let err = load(&[("PORT", "8080")]).unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));
        assert!(load(&[("JWT_SECRET", "  ")]).is_err());
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = load(&[
            ("JWT_SECRET", "s"),
            ("PORT", "8081"),
            ("JWT_EXPIRES_IN", "15m"),
            ("PASSWORD_HASH_COST", "3"),
            ("RATE_LIMIT_WINDOW_MS", "60000"),
            ("RATE_LIMIT_MAX", "5"),
            ("CORS_ORIGINS", "https://a.example, https://b.example,,"),
            ("ALLOW_ADMIN_SIGNUP", "false"),
        ])
        .unwrap();
        assert_eq!(cfg.port, 8081);
        assert_eq!(cfg.jwt.ttl, Duration::from_secs(900));
        assert_eq!(cfg.password_hash_cost, 3);
        assert_eq!(cfg.rate_limit.window, Duration::from_secs(60));
        assert_eq!(cfg.rate_limit.max_requests, 5);
        assert_eq!(
            cfg.cors_origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        assert!(!cfg.allow_admin_signup);
    }

    #[test]
    fn invalid_numbers_fail() {
        assert!(load(&[("JWT_SECRET", "s"), ("PORT", "http")]).is_err());
        assert!(load(&[("JWT_SECRET", "s"), ("PASSWORD_HASH_COST", "0")]).is_err());
        assert!(load(&[("JWT_SECRET", "s"), ("JWT_EXPIRES_IN", "soon")]).is_err());
    }

    #[test]
    fn ttl_units() {
        assert_eq!(parse_ttl("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_ttl("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_ttl("2 days").unwrap(), Duration::from_secs(172_800));
        assert_eq!(parse_ttl("1.5h").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_ttl("1w").unwrap(), Duration::from_secs(604_800));
        assert_eq!(parse_ttl("120000").unwrap(), Duration::from_secs(120));
    }

    #[test]
    fn ttl_rejects_sub_second_and_garbage() {
        assert!(parse_ttl("500ms").is_err());
        assert!(parse_ttl("0").is_err());
        assert!(parse_ttl("h").is_err());
        assert!(parse_ttl("10 fortnights").is_err());
    }

    #[test]
    fn ttl_has_an_upper_bound() {
        assert_eq!(parse_ttl("100y").unwrap(), MAX_TTL);
        assert!(parse_ttl("101y").is_err());
        assert!(parse_ttl("100000y").is_err());
        assert!(parse_ttl(&"9".repeat(400)).is_err());
        assert!(load(&[("JWT_SECRET", "s"), ("JWT_EXPIRES_IN", "100000y")]).is_err());
    }
}
