//! User accounts: username, salted password hash and the rating user id
//! the account rates as.

use crate::error::{Result, ServiceError};
use crate::kv::{KeyValueStore, get_as, put_as};
use data_loader::UserId;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

/// A registered account as persisted in the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub username: String,
    pub ml_user_id: UserId,
    salt: String,
    password_hash: String,
    #[serde(default)]
    pub initial_ratings_done: bool,
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex(&hasher.finalize())
}

impl Account {
    fn verify(&self, password: &str) -> bool {
        hash_password(&self.salt, password) == self.password_hash
    }
}

/// Accounts keyed by username
pub struct AccountStore {
    store: Box<dyn KeyValueStore>,
}

impl AccountStore {
    pub fn new(store: impl KeyValueStore + 'static) -> Self {
        Self {
            store: Box::new(store),
        }
    }

    pub fn get(&self, username: &str) -> Result<Option<Account>> {
        get_as(self.store.as_ref(), username)
    }

    /// Highest rating user id handed out to an account so far
    pub fn max_assigned_id(&self) -> Result<Option<UserId>> {
        let mut max = None;
        for key in self.store.keys()? {
            if let Some(account) = self.get(&key)? {
                max = max.max(Some(account.ml_user_id));
            }
        }
        Ok(max)
    }

    /// Create an account rating as a fresh user id.
    ///
    /// The id is one past both the largest user id in the ratings and the
    /// largest id already assigned to an account.
    pub fn register(&self, username: &str, password: &str, max_rating_user_id: UserId) -> Result<Account> {
        if username.is_empty() {
            return Err(ServiceError::EmptyField("username"));
        }
        if password.is_empty() {
            return Err(ServiceError::EmptyField("password"));
        }
        if self.get(username)?.is_some() {
            return Err(ServiceError::UsernameTaken(username.to_string()));
        }

        let max_id = self
            .max_assigned_id()?
            .map_or(max_rating_user_id, |assigned| assigned.max(max_rating_user_id));
        let ml_user_id = max_id
            .checked_add(1)
            .ok_or(ServiceError::UserIdsExhausted(max_id))?;
        let salt = hex(&rand::random::<[u8; 16]>());
        let account = Account {
            username: username.to_string(),
            ml_user_id,
            password_hash: hash_password(&salt, password),
            salt,
            initial_ratings_done: false,
        };
        put_as(self.store.as_ref(), username, &account)?;

        info!("Registered '{}' as user {}", username, account.ml_user_id);
        Ok(account)
    }

    pub fn login(&self, username: &str, password: &str) -> Result<Account> {
        match self.get(username)? {
            Some(account) if account.verify(password) => Ok(account),
            _ => Err(ServiceError::InvalidCredentials),
        }
    }

    /// Record that the account finished its seed ratings
    pub fn mark_initial_ratings_done(&self, username: &str) -> Result<Account> {
        let mut account = self
            .get(username)?
            .ok_or_else(|| ServiceError::UnknownAccount(username.to_string()))?;
        account.initial_ratings_done = true;
        put_as(self.store.as_ref(), username, &account)?;
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;

    #[test]
    fn test_register_assigns_next_id() {
        let accounts = AccountStore::new(MemoryStore::new());

        let alice = accounts.register("alice", "pw", 943).unwrap();
        let bob = accounts.register("bob", "pw", 943).unwrap();
        assert_eq!(alice.ml_user_id, 944);
        assert_eq!(bob.ml_user_id, 945);

        // Ratings outgrew the assigned ids
        let carol = accounts.register("carol", "pw", 1000).unwrap();
        assert_eq!(carol.ml_user_id, 1001);
    }

    #[test]
    fn test_register_fails_when_ids_run_out() {
        let accounts = AccountStore::new(MemoryStore::new());

        assert!(matches!(
            accounts.register("alice", "pw", u32::MAX),
            Err(ServiceError::UserIdsExhausted(u32::MAX))
        ));
        assert!(accounts.get("alice").unwrap().is_none());
    }

    #[test]
    fn test_register_rejects_duplicates_and_empty_fields() {
        let accounts = AccountStore::new(MemoryStore::new());
        accounts.register("alice", "pw", 10).unwrap();

        assert!(matches!(
            accounts.register("alice", "other", 10),
            Err(ServiceError::UsernameTaken(_))
        ));
        assert!(matches!(accounts.register("", "pw", 10), Err(ServiceError::EmptyField("username"))));
        assert!(matches!(accounts.register("bob", "", 10), Err(ServiceError::EmptyField("password"))));
    }

    #[test]
    fn test_login() {
        let accounts = AccountStore::new(MemoryStore::new());
        let registered = accounts.register("alice", "secret", 10).unwrap();

        assert_eq!(accounts.login("alice", "secret").unwrap(), registered);
        assert!(matches!(accounts.login("alice", "wrong"), Err(ServiceError::InvalidCredentials)));
        assert!(matches!(accounts.login("nobody", "secret"), Err(ServiceError::InvalidCredentials)));
    }

    #[test]
    fn test_password_is_not_stored_in_clear() {
        let accounts = AccountStore::new(MemoryStore::new());
        let account = accounts.register("alice", "secret", 10).unwrap();
        assert_ne!(account.password_hash, "secret");
        assert_eq!(account.password_hash.len(), 64);
    }

    #[test]
    fn test_mark_initial_ratings_done() {
        let accounts = AccountStore::new(MemoryStore::new());
        accounts.register("alice", "pw", 10).unwrap();

        assert!(accounts.mark_initial_ratings_done("alice").unwrap().initial_ratings_done);
        assert!(accounts.get("alice").unwrap().unwrap().initial_ratings_done);
        assert!(matches!(
            accounts.mark_initial_ratings_done("bob"),
            Err(ServiceError::UnknownAccount(_))
        ));
    }
}
