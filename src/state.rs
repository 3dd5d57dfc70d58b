use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use crate::auth::{
    jwt::JwtKeys,
    memory::MemoryUserStore,
    password::PasswordHasher,
    repo::{PgUserStore, UserStore},
    services::AuthService,
};
use crate::config::AppConfig;
use crate::gate::RoutePolicy;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub auth: AuthService,
    pub routes: Arc<RoutePolicy>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;

        let store: Arc<dyn UserStore> = match &config.database_url {
            Some(url) => {
                let db = PgPoolOptions::new()
                    .max_connections(10)
                    .connect(url)
                    .await
                    .context("connect to database")?;

                sqlx::migrate!("./migrations")
                    .run(&db)
                    .await
                    .context("run migrations")?;

                Arc::new(PgUserStore::new(db))
            }
            None => {
                tracing::warn!("DATABASE_URL not set; users are kept in memory and lost on restart");
                Arc::new(MemoryUserStore::new())
            }
        };

        Ok(Self::from_parts(config, store, PasswordHasher::default()))
    }

    pub fn from_parts(
        config: AppConfig,
        store: Arc<dyn UserStore>,
        hasher: PasswordHasher,
    ) -> Self {
        let keys = JwtKeys::from_config(&config.jwt);
        Self {
            auth: AuthService::new(store, keys, hasher),
            config: Arc::new(config),
            routes: Arc::new(RoutePolicy::default()),
        }
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        let config = AppConfig::from_lookup(|key| match key {
            "APP_ENV" => Some("test".into()),
            "JWT_SECRET" => Some("test-secret-test-secret-test-secret".into()),
            "JWT_ISSUER" => Some("test-issuer".into()),
            "JWT_AUDIENCE" => Some("test-aud".into()),
            _ => None,
        })
        .expect("test config");
        Self::from_parts(
            config,
            Arc::new(MemoryUserStore::new()),
            PasswordHasher::fast(),
        )
    }
}
