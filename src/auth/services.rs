use anyhow::Context;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, error};

use crate::auth::{
    password::{hash_password, verify_password},
    repo::{StoreError, UserStore},
    repo_types::{NewUser, User},
};

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    // Verified against when the email is unknown so both login failures do the same work.
    static ref DUMMY_HASH: Option<String> = hash_password("notekeep-dummy-password").ok();
}

/// Builds the dummy hash up front so the first unknown-email login isn't
/// the one paying for it. Fails if Argon2 cannot produce a hash at all.
pub fn prepare_dummy_hash() -> anyhow::Result<()> {
    lazy_static::initialize(&DUMMY_HASH);
    DUMMY_HASH
        .as_deref()
        .map(|_| ())
        .context("could not build the dummy password hash")
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

// Argon2 is CPU-bound; run it on the blocking pool, not a runtime worker.
async fn hash_blocking(password: &str) -> Result<String, StoreError> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| StoreError::Hash(format!("task join error: {e}")))?
        .map_err(|e| {
            error!(error = %e, "hash_password failed");
            StoreError::Hash(e.to_string())
        })
}

async fn verify_blocking(password: &str, hash: &str) -> Result<bool, StoreError> {
    let password = password.to_string();
    let hash = hash.to_string();
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| StoreError::Hash(format!("task join error: {e}")))
}

/// Hashes the password and inserts the user.
pub async fn create_user(
    store: &dyn UserStore,
    name: &str,
    email: &str,
    password: &str,
) -> Result<User, StoreError> {
    let password_hash = hash_blocking(password).await?;
    store
        .insert(NewUser {
            name: name.to_string(),
            email: email.to_string(),
            password_hash,
        })
        .await
}

/// Returns the user when the email exists and the password matches, `None` otherwise.
pub async fn authenticate(
    store: &dyn UserStore,
    email: &str,
    password: &str,
) -> Result<Option<User>, StoreError> {
    let Some(user) = store.find_by_email(email).await? else {
        if let Some(dummy) = DUMMY_HASH.as_deref() {
            let _ = verify_blocking(password, dummy).await?;
        }
        debug!("login for unknown email");
        return Ok(None);
    };
    if verify_blocking(password, &user.password_hash).await? {
        Ok(Some(user))
    } else {
        debug!(user_id = user.id, "login password mismatch");
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };

    use argon2::password_hash::PasswordHash;

    use crate::auth::repo::memory::MemoryUserStore;

    #[test]
    fn dummy_hash_is_a_real_phc_string() {
        prepare_dummy_hash().unwrap();
        let dummy = DUMMY_HASH.as_deref().expect("dummy hash built");
        assert!(PasswordHash::new(dummy).is_ok());
        assert!(!verify_password("anything", dummy));
    }

    #[tokio::test]
    async fn hashing_leaves_the_runtime_thread_free() {
        // Single-threaded runtime: the spawned task can only run if create_user yields.
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        tokio::spawn(async move { flag.store(true, Ordering::SeqCst) });

        let store = MemoryUserStore::default();
        create_user(&store, "Ann", "ann@x.com", "secret1").await.unwrap();
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn email_syntax() {
        assert!(is_valid_email("ann@x.com"));
        assert!(is_valid_email("Ann.Lee+notes@Example.org"));
        assert!(!is_valid_email("ann"));
        assert!(!is_valid_email("ann@x"));
        assert!(!is_valid_email("a n@x.com"));
    }

    #[tokio::test]
    async fn created_user_stores_hash_not_password() {
        let store = MemoryUserStore::default();
        let user = create_user(&store, "Ann", "ann@x.com", "secret1").await.unwrap();
        assert_eq!(user.name, "Ann");
        assert_ne!(user.password_hash, "secret1");
        assert!(verify_password("secret1", &user.password_hash));
    }

    #[tokio::test]
    async fn duplicate_email_creates_no_second_row() {
        let store = MemoryUserStore::default();
        create_user(&store, "Ann", "ann@x.com", "secret1").await.unwrap();
        let err = create_user(&store, "Other Ann", "ann@x.com", "secret2").await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEmail));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn authenticate_outcomes() {
        let store = MemoryUserStore::default();
        let created = create_user(&store, "Ann", "ann@x.com", "secret1").await.unwrap();

        let ok = authenticate(&store, "ann@x.com", "secret1").await.unwrap();
        assert_eq!(ok.map(|u| u.id), Some(created.id));
        assert!(authenticate(&store, "ann@x.com", "wrong").await.unwrap().is_none());
        assert!(authenticate(&store, "bob@x.com", "secret1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn email_lookup_is_case_sensitive() {
        let store = MemoryUserStore::default();
        create_user(&store, "Ann", "ann@x.com", "secret1").await.unwrap();
        assert!(authenticate(&store, "ANN@x.com", "secret1").await.unwrap().is_none());
    }
}
