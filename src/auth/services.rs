use std::sync::Arc;

use axum::extract::FromRef;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        claims::Session,
        dto::{FieldError, LoginRequest, PublicUser, RegisterRequest},
        jwt::{JwtKeys, TokenError},
        password::PasswordHasher,
        repo::{StoreError, UserStore},
        repo_types::NewUser,
    },
    state::AppState,
};

/// Failures that cross the service boundary. Nothing lower-level leaks past here.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Validation error")]
    Validation(Vec<FieldError>),

    #[error("User with this email already exists")]
    Conflict,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Session expired")]
    SessionExpired,

    #[error("internal error: {0:#}")]
    Internal(anyhow::Error),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => AuthError::Conflict,
            StoreError::Backend(e) => AuthError::Internal(e.context("credential store")),
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => AuthError::SessionExpired,
            TokenError::Invalid => AuthError::Unauthorized,
            TokenError::Encoding(msg) => AuthError::Internal(anyhow::anyhow!(msg)),
        }
    }
}

/// Successful login or registration.
#[derive(Debug)]
pub struct AuthOutcome {
    pub user: PublicUser,
    pub token: String,
}

/// Plaintext behind the decoy hash checked for unknown emails.
const DECOY_PASSWORD: &str = "decoy-password-never-matches";

/// Registration, login and session verification over an injected store.
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn UserStore>,
    keys: JwtKeys,
    hasher: PasswordHasher,
    // hashed on first use with the same work factor as real passwords
    decoy_hash: Arc<OnceCell<String>>,
}

impl FromRef<AppState> for AuthService {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

impl AuthService {
    pub fn new(store: Arc<dyn UserStore>, keys: JwtKeys, hasher: PasswordHasher) -> Self {
        Self {
            store,
            keys,
            hasher,
            decoy_hash: Arc::new(OnceCell::new()),
        }
    }

    pub fn keys(&self) -> &JwtKeys {
        &self.keys
    }

    #[instrument(skip(self, req), fields(email = %req.email))]
    pub async fn register(&self, req: RegisterRequest) -> Result<AuthOutcome, AuthError> {
        if let Err(fields) = req.validate() {
            warn!(invalid = fields.len(), "registration rejected by validation");
            return Err(AuthError::Validation(fields));
        }

        // Advisory only; the store's unique constraint is authoritative.
        if self.store.exists_by_email(&req.email).await? {
            warn!("email already registered");
            return Err(AuthError::Conflict);
        }

        let password_hash = self
            .hasher
            .hash_blocking(req.password)
            .await
            .map_err(|e| {
                error!(error = %e, "hash_password failed");
                AuthError::Internal(e)
            })?;

        let user = match self
            .store
            .create(NewUser {
                email: req.email,
                name: req.name,
                password_hash,
            })
            .await
        {
            Ok(u) => u,
            Err(StoreError::Conflict) => {
                warn!("email already registered (store constraint)");
                return Err(AuthError::Conflict);
            }
            Err(e) => {
                error!(error = %e, "create user failed");
                return Err(e.into());
            }
        };

        let public = PublicUser {
            id: user.id,
            email: user.email,
            name: user.name,
        };
        let token = self.issue(&public)?;

        info!(user_id = %public.id, "user registered");
        Ok(AuthOutcome {
            user: public,
            token,
        })
    }

    #[instrument(skip(self, req), fields(email = %req.email))]
    pub async fn login(&self, req: LoginRequest) -> Result<AuthOutcome, AuthError> {
        if let Err(fields) = req.validate() {
            warn!(invalid = fields.len(), "login rejected by validation");
            return Err(AuthError::Validation(fields));
        }

        let user = match self.store.find_by_email(&req.email).await {
            Ok(Some(u)) => u,
            Ok(None) => {
                // pay the same hashing cost as a wrong password
                self.verify_decoy(req.password).await?;
                warn!("login unknown email");
                return Err(AuthError::InvalidCredentials);
            }
            Err(e) => {
                error!(error = %e, "find_by_email failed");
                return Err(e.into());
            }
        };

        let ok = self
            .hasher
            .verify_blocking(req.password, user.password_hash)
            .await
            .map_err(|e| {
                error!(error = %e, "verify_password failed");
                AuthError::Internal(e)
            })?;

        if !ok {
            warn!(user_id = %user.id, "login invalid password");
            return Err(AuthError::InvalidCredentials);
        }

        let public = PublicUser {
            id: user.id,
            email: user.email,
            name: user.name,
        };
        let token = self.issue(&public)?;

        info!(user_id = %public.id, "user logged in");
        Ok(AuthOutcome {
            user: public,
            token,
        })
    }

    /// Full signature and expiry check of a session token.
    pub fn verify_session(&self, token: &str) -> Result<Session, AuthError> {
        match self.keys.verify(token) {
            Ok(claims) => Ok(claims.session()),
            Err(e) => {
                warn!(reason = %e, "session token rejected");
                Err(e.into())
            }
        }
    }

    async fn verify_decoy(&self, password: String) -> Result<(), AuthError> {
        let decoy = self
            .decoy_hash
            .get_or_try_init(|| self.hasher.hash_blocking(DECOY_PASSWORD.into()))
            .await
            .map_err(|e| {
                error!(error = %e, "decoy hash failed");
                AuthError::Internal(e)
            })?;
        self.hasher
            .verify_blocking(password, decoy.clone())
            .await
            .map_err(|e| {
                error!(error = %e, "verify_password failed");
                AuthError::Internal(e)
            })?;
        Ok(())
    }

    fn issue(&self, user: &PublicUser) -> Result<String, AuthError> {
        self.keys.issue(&user.session_user()).map_err(|e| {
            error!(error = %e, "jwt sign failed");
            e.into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{auth::memory::MemoryUserStore, config::JwtConfig};
    use async_trait::async_trait;

    use crate::auth::{claims::SessionUser, repo_types::User};

    fn keys() -> JwtKeys {
        JwtKeys::from_config(&JwtConfig {
            secret: "0123456789abcdef0123456789abcdef".into(),
            issuer: "test-issuer".into(),
            audience: "test-aud".into(),
            ttl_days: 7,
        })
    }

    fn service() -> AuthService {
        AuthService::new(Arc::new(MemoryUserStore::new()), keys(), PasswordHasher::fast())
    }

    fn jane() -> RegisterRequest {
        RegisterRequest {
            name: "Jane Doe".into(),
            email: "jane@example.com".into(),
            password: "Secret123".into(),
            confirm_password: "Secret123".into(),
        }
    }

    fn login(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.into(),
            password: password.into(),
        }
    }

    #[tokio::test]
    async fn register_returns_user_and_verifiable_token() {
        let svc = service();
        let out = svc.register(jane()).await.expect("register");
        assert_eq!(out.user.email, "jane@example.com");
        assert_eq!(out.user.name, "Jane Doe");

        let session = svc.verify_session(&out.token).expect("token verifies");
        assert_eq!(session.user_id, out.user.id);
        assert_eq!(session.email, out.user.email);
        assert_eq!(session.exp - session.iat, 7 * 24 * 60 * 60);
    }

    #[tokio::test]
    async fn register_twice_conflicts() {
        let svc = service();
        svc.register(jane()).await.expect("first register");
        let err = svc.register(jane()).await.unwrap_err();
        assert!(matches!(err, AuthError::Conflict));
    }

    #[tokio::test]
    async fn register_validation_reports_fields() {
        let svc = service();
        let mut req = jane();
        req.confirm_password = "different1".into();
        match svc.register(req).await.unwrap_err() {
            AuthError::Validation(fields) => {
                assert_eq!(fields.len(), 1);
                assert_eq!(fields[0].field, "confirmPassword");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn login_after_register() {
        let svc = service();
        let registered = svc.register(jane()).await.unwrap();
        let out = svc
            .login(login("jane@example.com", "Secret123"))
            .await
            .expect("login");
        assert_eq!(out.user, registered.user);
        let session = svc.verify_session(&out.token).unwrap();
        assert_eq!(session.user_id, registered.user.id);
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_are_indistinguishable() {
        let svc = service();
        svc.register(jane()).await.unwrap();

        let wrong = svc
            .login(login("jane@example.com", "Wrong1234"))
            .await
            .unwrap_err();
        let unknown = svc
            .login(login("nobody@example.com", "Secret123"))
            .await
            .unwrap_err();

        assert!(matches!(wrong, AuthError::InvalidCredentials));
        assert!(matches!(unknown, AuthError::InvalidCredentials));
        assert_eq!(wrong.to_string(), unknown.to_string());
    }

    #[tokio::test]
    async fn unknown_email_still_runs_a_password_check() {
        let svc = service();
        assert!(svc.decoy_hash.get().is_none());

        let err = svc
            .login(login("nobody@example.com", "Secret123"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));

        let decoy = svc.decoy_hash.get().expect("decoy hashed on first miss");
        assert!(decoy.starts_with("$argon2id$"));
        // a password equal to the decoy plaintext still cannot log in
        assert!(matches!(
            svc.login(login("nobody@example.com", DECOY_PASSWORD)).await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn verify_session_rejects_garbage_and_expired() {
        let svc = service();
        assert!(matches!(
            svc.verify_session("not-a-token"),
            Err(AuthError::Unauthorized)
        ));

        let old = time::OffsetDateTime::now_utc() - time::Duration::days(30);
        let expired = svc
            .keys()
            .issue_at(
                &SessionUser {
                    user_id: uuid::Uuid::new_v4(),
                    email: "jane@example.com".into(),
                    name: "Jane Doe".into(),
                },
                old,
            )
            .unwrap();
        assert!(matches!(
            svc.verify_session(&expired),
            Err(AuthError::SessionExpired)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_registrations_with_same_email_yield_one_success() {
        let svc = service();
        let attempts = 16;
        let handles: Vec<_> = (0..attempts)
            .map(|_| {
                let svc = svc.clone();
                tokio::spawn(async move { svc.register(jane()).await })
            })
            .collect();

        let mut ok = 0;
        let mut conflicts = 0;
        for h in handles {
            match h.await.expect("task joined") {
                Ok(_) => ok += 1,
                Err(AuthError::Conflict) => conflicts += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(conflicts, attempts - 1);
    }

    struct BrokenStore;

    #[async_trait]
    impl UserStore for BrokenStore {
        async fn find_by_email(&self, _email: &str) -> Result<Option<User>, StoreError> {
            Err(StoreError::Backend(anyhow::anyhow!(
                "connection refused: postgres://secret@db"
            )))
        }
        async fn create(&self, _user: NewUser) -> Result<User, StoreError> {
            Err(StoreError::Backend(anyhow::anyhow!("connection refused")))
        }
    }

    #[tokio::test]
    async fn store_failures_become_internal() {
        let svc = AuthService::new(Arc::new(BrokenStore), keys(), PasswordHasher::fast());
        assert!(matches!(
            svc.login(login("jane@example.com", "Secret123")).await,
            Err(AuthError::Internal(_))
        ));
        assert!(matches!(
            svc.register(jane()).await,
            Err(AuthError::Internal(_))
        ));
    }
}
