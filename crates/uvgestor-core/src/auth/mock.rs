//! Mock identity provider for testing

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use super::{Identity, IdentityProvider};
use crate::error::{Error, Result};

#[derive(Default)]
struct Accounts {
    /// email (lowercase) -> (password, identity)
    by_email: HashMap<String, (String, Identity)>,
    current: Option<Identity>,
}

/// In-memory identity provider; clones share accounts
#[derive(Clone)]
pub struct MockIdentityProvider {
    accounts: Arc<Mutex<Accounts>>,
    available: Arc<AtomicBool>,
    next_id: Arc<AtomicU64>,
}

impl Default for MockIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockIdentityProvider {
    pub fn new() -> Self {
        Self {
            accounts: Arc::new(Mutex::new(Accounts::default())),
            available: Arc::new(AtomicBool::new(true)),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Simulate the provider going offline (calls fail with `RemoteUnavailable`)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Accounts> {
        self.accounts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::RemoteUnavailable(
                "Mock identity provider is offline".to_string(),
            ))
        }
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity> {
        self.ensure_available()?;
        let mut accounts = self.lock();
        let identity = match accounts.by_email.get(&email.to_lowercase()) {
            Some((stored, identity)) if stored == password => identity.clone(),
            _ => return Err(Error::Auth("Invalid email or password".to_string())),
        };
        accounts.current = Some(identity.clone());
        Ok(identity)
    }

    async fn sign_up(&self, email: &str, password: &str, display_name: &str) -> Result<Identity> {
        self.ensure_available()?;
        let mut accounts = self.lock();
        let key = email.to_lowercase();
        if accounts.by_email.contains_key(&key) {
            return Err(Error::Auth("Email already registered".to_string()));
        }

        let identity = Identity {
            user_id: format!("mock-user-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1),
            email: email.to_string(),
            display_name: Some(display_name.to_string()),
        };
        accounts
            .by_email
            .insert(key, (password.to_string(), identity.clone()));
        accounts.current = Some(identity.clone());
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<()> {
        self.ensure_available()?;
        self.lock().current = None;
        Ok(())
    }

    async fn current_session(&self) -> Result<Option<Identity>> {
        self.ensure_available()?;
        Ok(self.lock().current.clone())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
