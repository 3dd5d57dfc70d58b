use anyhow::{bail, Context};
use tracing::warn;

/// Secret used when `JWT_SECRET` is not set. Only acceptable outside production.
pub const DEV_JWT_SECRET: &str = "your-secret-key-here-change-in-production";

/// Minimum signing secret length, in bytes, for production deployments.
pub const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn parse(raw: &str) -> anyhow::Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => bail!("unknown APP_ENV {other:?}"),
        }
    }

    pub fn is_production(self) -> bool {
        self == Self::Production
    }
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_days: i64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup and validates it.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = match lookup("APP_ENV") {
            Some(raw) => Environment::parse(&raw).context("parse APP_ENV")?,
            None => Environment::Development,
        };
        let database_url = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty());
        let jwt = JwtConfig {
            secret: lookup("JWT_SECRET").unwrap_or_else(|| DEV_JWT_SECRET.into()),
            issuer: lookup("JWT_ISSUER").unwrap_or_else(|| "ikashir".into()),
            audience: lookup("JWT_AUDIENCE").unwrap_or_else(|| "ikashir-users".into()),
            ttl_days: 7,
        };
        let config = Self {
            environment,
            database_url,
            jwt,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let secret = &self.jwt.secret;
        let weak = secret == DEV_JWT_SECRET || secret.len() < MIN_SECRET_LEN;

        if self.environment.is_production() {
            if secret == DEV_JWT_SECRET {
                bail!("JWT_SECRET must be set in production");
            }
            if secret.len() < MIN_SECRET_LEN {
                bail!("JWT_SECRET must be at least {MIN_SECRET_LEN} bytes in production");
            }
            if self.database_url.is_none() {
                bail!("DATABASE_URL must be set in production");
            }
        } else if weak {
            warn!(
                environment = ?self.environment,
                "JWT_SECRET is the development default or shorter than {MIN_SECRET_LEN} bytes; do not deploy this"
            );
        }
        Ok(())
    }

    /// Whether session cookies carry the `Secure` attribute.
    pub fn secure_cookies(&self) -> bool {
        self.environment.is_production()
    }
}
