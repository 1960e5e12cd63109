//! Authentication with local session fallback
//!
//! Accounts live with an identity provider; the local store keeps a copy of
//! each signed-in user (plus an argon2 hash of their password) so the app
//! keeps working when the provider is unreachable.
//!
//! - `IdentityProvider` trait: sign in/up/out and the provider's current session
//! - `IdentityClient` enum: `Http`, `Mock`, or `Offline` (device-only accounts)
//! - `AuthService`: validation, provider calls, and the local fallback

mod http;
mod mock;

pub use http::HttpIdentityProvider;
pub use mock::MockIdentityProvider;

use argon2::password_hash::rand_core::{OsRng, RngCore};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::budget::BudgetService;
use crate::config::IdentityConfig;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{Guardian, Session, User};
use crate::sync::RecordRepository;

/// Minimum password length accepted at registration
pub const MIN_PASSWORD_LEN: usize = 6;

/// An account as the identity provider knows it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: String,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Guardian details collected when registering a minor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardianInput {
    pub name: String,
    pub email: String,
    pub relationship: String,
}

impl GuardianInput {
    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation(
                "Guardian name cannot be empty".to_string(),
            ));
        }
        if !self.email.contains('@') {
            return Err(Error::Validation("Invalid guardian email".to_string()));
        }
        if self.relationship.trim().is_empty() {
            return Err(Error::Validation(
                "Guardian relationship cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    fn into_guardian(self) -> Guardian {
        Guardian {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            relationship: self.relationship.trim().to_string(),
            has_access_to_finances: true,
        }
    }
}

/// Trait defining the interface for identity providers
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Check credentials; rejected credentials are `Error::Auth`
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity>;

    /// Create an account
    async fn sign_up(&self, email: &str, password: &str, display_name: &str) -> Result<Identity>;

    async fn sign_out(&self) -> Result<()>;

    /// The provider's own notion of who is signed in, if it keeps one
    async fn current_session(&self) -> Result<Option<Identity>>;

    /// Short provider name (for logging)
    fn name(&self) -> &'static str;
}

/// Concrete identity client enum
#[derive(Clone)]
pub enum IdentityClient {
    /// JSON account API over HTTP
    Http(HttpIdentityProvider),
    /// In-memory accounts for tests
    Mock(MockIdentityProvider),
    /// No provider: accounts exist only on this device and sign-in always
    /// goes through the local fallback
    Offline,
}

impl IdentityClient {
    /// Build a client from the `[identity]` config section (`None` = offline)
    pub fn from_config(config: Option<&IdentityConfig>) -> Result<Self> {
        match config {
            Some(cfg) if cfg.url.starts_with("mock://") => Ok(Self::mock()),
            Some(cfg) => Ok(Self::Http(HttpIdentityProvider::from_config(cfg)?)),
            None => Ok(Self::Offline),
        }
    }

    pub fn mock() -> Self {
        Self::Mock(MockIdentityProvider::new())
    }

    fn offline() -> Error {
        Error::RemoteUnavailable("No identity provider configured".to_string())
    }
}

#[async_trait]
impl IdentityProvider for IdentityClient {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity> {
        match self {
            Self::Http(p) => p.sign_in(email, password).await,
            Self::Mock(p) => p.sign_in(email, password).await,
            Self::Offline => Err(Self::offline()),
        }
    }

    async fn sign_up(&self, email: &str, password: &str, display_name: &str) -> Result<Identity> {
        match self {
            Self::Http(p) => p.sign_up(email, password, display_name).await,
            Self::Mock(p) => p.sign_up(email, password, display_name).await,
            Self::Offline => Ok(Identity {
                user_id: local_user_id(),
                email: email.to_string(),
                display_name: Some(display_name.to_string()),
            }),
        }
    }

    async fn sign_out(&self) -> Result<()> {
        match self {
            Self::Http(p) => p.sign_out().await,
            Self::Mock(p) => p.sign_out().await,
            Self::Offline => Ok(()),
        }
    }

    async fn current_session(&self) -> Result<Option<Identity>> {
        match self {
            Self::Http(p) => p.current_session().await,
            Self::Mock(p) => p.current_session().await,
            Self::Offline => Ok(None),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Http(p) => p.name(),
            Self::Mock(p) => p.name(),
            Self::Offline => "offline",
        }
    }
}

/// Random id for accounts created without a provider
fn local_user_id() -> String {
    let mut bytes = [0u8; 12];
    OsRng.fill_bytes(&mut bytes);
    format!("local-{}", hex::encode(bytes))
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| Error::Encryption(format!("Failed to hash password: {}", e)))
}

fn verify_password(password: &str, stored: &str) -> bool {
    PasswordHash::new(stored)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

fn validate_email(email: &str) -> Result<()> {
    if email.trim().is_empty() {
        return Err(Error::Validation("Email cannot be empty".to_string()));
    }
    if !email.contains('@') {
        return Err(Error::Validation("Invalid email".to_string()));
    }
    Ok(())
}

/// Sign-in, registration and logout on top of an identity provider
#[derive(Clone)]
pub struct AuthService {
    db: Database,
    identity: IdentityClient,
    /// Services whose open subscriptions are refreshed after a logout purge
    records: Vec<RecordRepository>,
    budgets: Option<BudgetService>,
}

impl AuthService {
    pub fn new(db: Database, identity: IdentityClient) -> Self {
        Self {
            db,
            identity,
            records: Vec::new(),
            budgets: None,
        }
    }

    /// Refresh these services' subscribers when logout purges local data
    pub fn with_local_views(mut self, records: &[RecordRepository], budgets: &BudgetService) -> Self {
        self.records = records.to_vec();
        self.budgets = Some(budgets.clone());
        self
    }

    /// Sign in, falling back to the local account when the provider is unreachable
    pub async fn login(&self, email: &str, password: &str) -> Result<Session> {
        validate_email(email)?;
        if password.is_empty() {
            return Err(Error::Validation("Password cannot be empty".to_string()));
        }
        let email = email.trim();

        match self.identity.sign_in(email, password).await {
            Ok(identity) => {
                let user = self.remember(identity, password)?;
                info!(user_id = %user.id, provider = self.identity.name(), "Signed in");
                Ok(Session::new(user))
            }
            Err(e) if e.is_remote() => {
                debug!(error = %e, "Identity provider unreachable, trying local account");
                self.login_locally(email, password)
            }
            Err(e) => Err(e),
        }
    }

    fn login_locally(&self, email: &str, password: &str) -> Result<Session> {
        let Some(user) = self.db.get_user_by_email(email)? else {
            return Err(Error::Auth(format!(
                "Cannot reach the identity provider and no local account exists for {}",
                email
            )));
        };

        // Users restored from a provider session never typed a password here
        let Some(stored) = self.db.get_password_hash(&user.id)? else {
            return Err(Error::Auth(format!(
                "Cannot reach the identity provider and {} has never signed in on this device",
                email
            )));
        };
        if !verify_password(password, &stored) {
            return Err(Error::Auth("Invalid email or password".to_string()));
        }

        self.db.upsert_user(&user)?;
        warn!(user_id = %user.id, "Signed in with local account (identity provider unreachable)");
        Ok(Session::new(user))
    }

    /// Create an account; providing a guardian marks the user as a minor
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: &str,
        guardian: Option<GuardianInput>,
    ) -> Result<Session> {
        if email.trim().is_empty() || password.is_empty() || name.trim().is_empty() {
            return Err(Error::Validation("All fields are required".to_string()));
        }
        validate_email(email)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(Error::Validation(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        if let Some(g) = &guardian {
            g.validate()?;
        }

        let email = email.trim();
        let name = name.trim();
        let identity = self.identity.sign_up(email, password, name).await?;

        let guardians: Vec<Guardian> = guardian.map(GuardianInput::into_guardian).into_iter().collect();
        let user = User {
            id: identity.user_id,
            email: email.to_string(),
            name: name.to_string(),
            created_at: Utc::now(),
            is_minor: !guardians.is_empty(),
            guardians,
        };
        self.db.upsert_user(&user)?;
        self.db.set_password_hash(&user.id, &hash_password(password)?)?;

        info!(user_id = %user.id, is_minor = user.is_minor, provider = self.identity.name(), "Registered user");
        Ok(Session::new(user))
    }

    /// Sign out and remove the user's local data
    ///
    /// Provider failures are logged, never fatal: the local session is
    /// cleared regardless.
    pub async fn logout(&self, session: &Session) -> Result<()> {
        if let Err(e) = self.identity.sign_out().await {
            warn!(error = %e, "Identity provider sign-out failed");
        }
        let user_id = session.user_id();
        self.db.purge_user(user_id)?;
        // Rows are already gone; this only republishes the empty views
        for repo in &self.records {
            repo.purge_user(user_id)?;
        }
        if let Some(budgets) = &self.budgets {
            budgets.purge_user(user_id)?;
        }
        info!(user_id = %user_id, "Signed out");
        Ok(())
    }

    /// The provider's session if it has one, else the last local sign-in
    pub async fn current_session(&self) -> Result<Option<Session>> {
        match self.identity.current_session().await {
            Ok(Some(identity)) => {
                let user = match self.db.get_user(&identity.user_id)? {
                    Some(user) => user,
                    None => {
                        let user = user_from_identity(identity);
                        self.db.upsert_user(&user)?;
                        user
                    }
                };
                return Ok(Some(Session::new(user)));
            }
            Ok(None) => {}
            Err(e) => debug!(error = %e, "Identity provider session unavailable"),
        }

        Ok(self.db.get_current_user()?.map(Session::new))
    }

    /// Store (or refresh) the local copy of a provider identity
    fn remember(&self, identity: Identity, password: &str) -> Result<User> {
        let user = match self.db.get_user(&identity.user_id)? {
            Some(mut existing) => {
                existing.email = identity.email;
                if let Some(name) = identity.display_name {
                    existing.name = name;
                }
                existing
            }
            None => user_from_identity(identity),
        };
        self.db.upsert_user(&user)?;
        self.db.set_password_hash(&user.id, &hash_password(password)?)?;
        Ok(user)
    }
}

fn user_from_identity(identity: Identity) -> User {
    let name = identity
        .display_name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| {
            identity
                .email
                .split('@')
                .next()
                .unwrap_or_default()
                .to_string()
        });
    User {
        id: identity.user_id,
        email: identity.email,
        name,
        created_at: Utc::now(),
        guardians: Vec::new(),
        is_minor: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewBudget, NewRecord, RecordKind, TimePeriod};

    fn setup() -> (Database, MockIdentityProvider, AuthService) {
        let db = Database::in_memory().unwrap();
        let provider = MockIdentityProvider::new();
        let auth = AuthService::new(db.clone(), IdentityClient::Mock(provider.clone()));
        (db, provider, auth)
    }

    fn guardian() -> GuardianInput {
        GuardianInput {
            name: "Marta".to_string(),
            email: "marta@example.com".to_string(),
            relationship: "Madre".to_string(),
        }
    }

    #[tokio::test]
    async fn test_login_validation() {
        let (_db, _provider, auth) = setup();

        for (email, password) in [("", "secret1"), ("ana@uvg.edu", ""), ("ana.uvg.edu", "secret1")] {
            let err = auth.login(email, password).await.unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "{email} / {password}");
        }
    }

    #[tokio::test]
    async fn test_register_validation() {
        let (_db, _provider, auth) = setup();

        let err = auth.register("ana@uvg.edu", "secret1", " ", None).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = auth.register("ana@uvg.edu", "12345", "Ana", None).await.unwrap_err();
        assert!(matches!(err, Error::Validation(ref m) if m.contains("6")));

        let err = auth.register("ana-uvg.edu", "secret1", "Ana", None).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let mut bad_guardian = guardian();
        bad_guardian.email = "marta".to_string();
        let err = auth
            .register("ana@uvg.edu", "secret1", "Ana", Some(bad_guardian))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_register_with_guardian_marks_minor() {
        let (db, _provider, auth) = setup();

        let session = auth
            .register("luis@uvg.edu", "secret1", "Luis", Some(guardian()))
            .await
            .unwrap();
        assert!(session.user.is_minor);
        assert_eq!(session.user.guardians.len(), 1);
        assert!(session.user.guardians[0].has_access_to_finances);

        let stored = db.get_user(session.user_id()).unwrap().unwrap();
        assert_eq!(stored.guardians[0].relationship, "Madre");

        let adult = auth
            .register("ana@uvg.edu", "secret1", "Ana", None)
            .await
            .unwrap();
        assert!(!adult.user.is_minor);
    }

    #[tokio::test]
    async fn test_login_rejects_wrong_password() {
        let (_db, _provider, auth) = setup();
        auth.register("ana@uvg.edu", "secret1", "Ana", None)
            .await
            .unwrap();

        let err = auth.login("ana@uvg.edu", "wrong!!").await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));

        let session = auth.login("ana@uvg.edu", "secret1").await.unwrap();
        assert_eq!(session.user.name, "Ana");
    }

    #[tokio::test]
    async fn test_login_falls_back_to_local_user() {
        let (_db, provider, auth) = setup();
        let registered = auth
            .register("ana@uvg.edu", "secret1", "Ana", Some(guardian()))
            .await
            .unwrap();

        provider.set_available(false);
        let session = auth.login("ana@uvg.edu", "secret1").await.unwrap();
        assert_eq!(session.user_id(), registered.user_id());
        // Local copy keeps guardian data
        assert!(session.user.is_minor);

        let err = auth.login("ana@uvg.edu", "not-it").await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));

        let err = auth.login("nadie@uvg.edu", "secret1").await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }

    #[tokio::test]
    async fn test_restored_session_needs_online_login_before_offline_fallback() {
        let (db, provider, auth) = setup();
        // Account created elsewhere; this device only sees the provider session
        provider
            .sign_up("ana@uvg.edu", "secret1", "Ana")
            .await
            .unwrap();
        let restored = auth.current_session().await.unwrap().unwrap();
        assert!(db.get_password_hash(restored.user_id()).unwrap().is_none());

        provider.set_available(false);
        let err = auth.login("ana@uvg.edu", "totally-wrong").await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
        let err = auth.login("ana@uvg.edu", "secret1").await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));

        // One online sign-in stores the hash
        provider.set_available(true);
        auth.login("ana@uvg.edu", "secret1").await.unwrap();
        provider.set_available(false);
        let session = auth.login("ana@uvg.edu", "secret1").await.unwrap();
        assert_eq!(session.user_id(), restored.user_id());
        let err = auth.login("ana@uvg.edu", "totally-wrong").await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }

    #[tokio::test]
    async fn test_offline_accounts_are_device_local() {
        let db = Database::in_memory().unwrap();
        let auth = AuthService::new(db.clone(), IdentityClient::Offline);

        let session = auth
            .register("ana@uvg.edu", "secret1", "Ana", None)
            .await
            .unwrap();
        assert!(session.user_id().starts_with("local-"));

        let again = auth.login("ANA@uvg.edu", "secret1").await.unwrap();
        assert_eq!(again.user_id(), session.user_id());

        let current = auth.current_session().await.unwrap().unwrap();
        assert_eq!(current.user_id(), session.user_id());
    }

    #[tokio::test]
    async fn test_logout_purges_local_data() {
        let (db, _provider, auth) = setup();
        let session = auth
            .register("ana@uvg.edu", "secret1", "Ana", None)
            .await
            .unwrap();
        let user_id = session.user_id().to_string();

        let date = chrono::NaiveDate::from_ymd_opt(2025, 11, 3).unwrap();
        db.insert_record(
            RecordKind::Expense,
            &user_id,
            &NewRecord::new("Cafe", 10.0, TimePeriod::Daily, "Comida", date),
        )
        .unwrap();
        db.upsert_budget(&user_id, &NewBudget::general(date, 500.0))
            .unwrap();

        auth.logout(&session).await.unwrap();

        assert!(db.get_user(&user_id).unwrap().is_none());
        assert_eq!(db.count_records(RecordKind::Expense, &user_id).unwrap(), 0);
        assert!(db.list_budgets(&user_id).unwrap().is_empty());
        assert!(auth.current_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_logout_empties_open_subscriptions() {
        let (db, provider, _) = setup();
        let remote = crate::remote::RemoteClient::Offline;
        let expenses = RecordRepository::expenses(db.clone(), remote.clone());
        let incomes = RecordRepository::incomes(db.clone(), remote);
        let budgets = BudgetService::new(db.clone());
        let auth = AuthService::new(db.clone(), IdentityClient::Mock(provider))
            .with_local_views(&[expenses.clone(), incomes], &budgets);

        let session = auth
            .register("ana@uvg.edu", "secret1", "Ana", None)
            .await
            .unwrap();
        let user_id = session.user_id().to_string();
        let date = chrono::NaiveDate::from_ymd_opt(2025, 11, 3).unwrap();
        expenses
            .add_record(
                &user_id,
                NewRecord::new("Cafe", 10.0, TimePeriod::Daily, "Comida", date),
            )
            .await
            .unwrap();
        budgets.set_monthly_limit(&user_id, date, 500.0).unwrap();

        let mut records = expenses.subscribe(&user_id).unwrap();
        let mut budget = budgets.subscribe_current(&user_id, date).unwrap();
        assert_eq!(records.next().await.unwrap().len(), 1);
        assert!(budget.next().await.unwrap().is_some());

        auth.logout(&session).await.unwrap();
        assert_eq!(records.next().await, Some(vec![]));
        assert_eq!(budget.next().await, Some(None));
    }

    #[tokio::test]
    async fn test_logout_survives_provider_failure() {
        let (db, provider, auth) = setup();
        let session = auth
            .register("ana@uvg.edu", "secret1", "Ana", None)
            .await
            .unwrap();

        provider.set_available(false);
        auth.logout(&session).await.unwrap();
        assert!(db.get_user(session.user_id()).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_current_session_prefers_provider() {
        let (_db, provider, auth) = setup();
        let session = auth
            .register("ana@uvg.edu", "secret1", "Ana", None)
            .await
            .unwrap();

        let current = auth.current_session().await.unwrap().unwrap();
        assert_eq!(current.user_id(), session.user_id());

        // Provider down: the local record still answers
        provider.set_available(false);
        let current = auth.current_session().await.unwrap().unwrap();
        assert_eq!(current.user.email, "ana@uvg.edu");
    }

    #[test]
    fn test_password_hash_roundtrip() {
        let hash = hash_password("secret1").unwrap();
        assert!(verify_password("secret1", &hash));
        assert!(!verify_password("secret2", &hash));
        assert!(!verify_password("secret1", "not-a-hash"));
    }
}
