//! In-process [`AccountStore`] for tests and single-node development.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use uuid::Uuid;
use warden_core::clock::{Clock, SystemClock};
use warden_core::error::{WardenError, WardenResult};
use warden_core::models::account::{Account, CreateAccount};
use warden_core::store::AccountStore;

#[derive(Clone)]
pub struct MemoryAccountStore {
    accounts: Arc<Mutex<HashMap<Uuid, Account>>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryAccountStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            accounts: Arc::new(Mutex::new(HashMap::new())),
            clock,
        }
    }
}

impl AccountStore for MemoryAccountStore {
    async fn create_account(&self, input: CreateAccount) -> WardenResult<Account> {
        let now = self.clock.now();
        let account = Account {
            id: Uuid::new_v4(),
            email: input.email,
            role: input.role,
            active: true,
            token_version: 0,
            phone: input.phone,
            address: input.address,
            backup_codes: input.backup_codes,
            api_credentials: input.api_credentials,
            created_at: now,
            updated_at: now,
        };
        self.accounts
            .lock()
            .await
            .insert(account.id, account.clone());
        Ok(account)
    }

    async fn find_account_by_id(&self, id: Uuid) -> WardenResult<Account> {
        self.accounts
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| WardenError::not_found("account", id))
    }

    async fn increment_token_version(&self, id: Uuid) -> WardenResult<u64> {
        let now = self.clock.now();
        let mut accounts = self.accounts.lock().await;
        let account = accounts
            .get_mut(&id)
            .ok_or_else(|| WardenError::not_found("account", id))?;
        account.token_version += 1;
        account.updated_at = now;
        Ok(account.token_version)
    }

    async fn set_active(&self, id: Uuid, active: bool) -> WardenResult<()> {
        let now = self.clock.now();
        let mut accounts = self.accounts.lock().await;
        let account = accounts
            .get_mut(&id)
            .ok_or_else(|| WardenError::not_found("account", id))?;
        account.active = active;
        account.updated_at = now;
        Ok(())
    }
}
