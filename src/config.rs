use anyhow::{bail, Context};
use serde::Deserialize;

/// Shortest token the service will mint.
pub const MIN_TOKEN_LENGTH: usize = 60;

/// Longest accepted token lifetime, ten years.
pub const MAX_TOKEN_TTL_MINUTES: i64 = 60 * 24 * 365 * 10;

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub length: usize,
    /// `None` means tokens never expire.
    pub ttl_minutes: Option<i64>,
}

/// Argon2id cost parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct PasswordConfig {
    pub m_cost: u32, // KiB
    pub t_cost: u32,
    pub p_cost: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            m_cost: 19 * 1024,
            t_cost: 2,
            p_cost: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub host: String,
    pub port: u16,
    pub token: TokenConfig,
    pub password: PasswordConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty());
        let host = std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port = parse_var("APP_PORT", 8080)?;

        // 0 disables expiry; anything else is checked in `validate`
        let ttl_minutes: i64 = parse_var("TOKEN_TTL_MINUTES", 60 * 24 * 14)?;
        let token = TokenConfig {
            length: parse_var("TOKEN_LENGTH", MIN_TOKEN_LENGTH)?,
            ttl_minutes: (ttl_minutes != 0).then_some(ttl_minutes),
        };

        let defaults = PasswordConfig::default();
        let password = PasswordConfig {
            m_cost: parse_var("PASSWORD_M_COST", defaults.m_cost)?,
            t_cost: parse_var("PASSWORD_T_COST", defaults.t_cost)?,
            p_cost: parse_var("PASSWORD_P_COST", defaults.p_cost)?,
        };

        let config = Self {
            database_url,
            host,
            port,
            token,
            password,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.token.length < MIN_TOKEN_LENGTH {
            bail!(
                "TOKEN_LENGTH must be at least {}, got {}",
                MIN_TOKEN_LENGTH,
                self.token.length
            );
        }
        if let Some(mins) = self.token.ttl_minutes {
            if !(1..=MAX_TOKEN_TTL_MINUTES).contains(&mins) {
                bail!(
                    "TOKEN_TTL_MINUTES must be between 0 and {}, got {}",
                    MAX_TOKEN_TTL_MINUTES,
                    mins
                );
            }
        }
        argon2::Params::new(
            self.password.m_cost,
            self.password.t_cost,
            self.password.p_cost,
            None,
        )
        .map_err(|e| anyhow::anyhow!("invalid PASSWORD_*_COST: {}", e))?;
        Ok(())
    }
}

fn parse_var<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("invalid value for {}", name)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_length(length: usize) -> AppConfig {
        AppConfig {
            database_url: None,
            host: "127.0.0.1".into(),
            port: 0,
            token: TokenConfig {
                length,
                ttl_minutes: None,
            },
            password: PasswordConfig::default(),
        }
    }

    fn config_with_ttl(ttl_minutes: Option<i64>) -> AppConfig {
        let mut config = config_with_length(MIN_TOKEN_LENGTH);
        config.token.ttl_minutes = ttl_minutes;
        config
    }

    #[test]
    fn rejects_short_tokens() {
        let err = config_with_length(32).validate().unwrap_err();
        assert!(err.to_string().contains("TOKEN_LENGTH"));
    }

    #[test]
    fn accepts_minimum_length() {
        assert!(config_with_length(MIN_TOKEN_LENGTH).validate().is_ok());
    }

    #[test]
    fn ttl_must_be_positive() {
        let err = config_with_ttl(Some(-5)).validate().unwrap_err();
        assert!(err.to_string().contains("TOKEN_TTL_MINUTES"));
    }

    #[test]
    fn ttl_is_capped() {
        assert!(config_with_ttl(Some(MAX_TOKEN_TTL_MINUTES)).validate().is_ok());
        let err = config_with_ttl(Some(i64::MAX)).validate().unwrap_err();
        assert!(err.to_string().contains("TOKEN_TTL_MINUTES"));
    }

    #[test]
    fn no_ttl_is_valid() {
        assert!(config_with_ttl(None).validate().is_ok());
        assert!(config_with_ttl(Some(60)).validate().is_ok());
    }

    #[test]
    fn bad_argon2_costs_fail_validation() {
        let mut config = config_with_length(MIN_TOKEN_LENGTH);
        config.password.m_cost = 1;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("PASSWORD_"));

        let mut config = config_with_length(MIN_TOKEN_LENGTH);
        config.password.t_cost = 0;
        assert!(config.validate().is_err());
    }
}
