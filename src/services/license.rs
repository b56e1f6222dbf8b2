//! License service
//!
//! Redeeming a license is a two-step write across separate persistence
//! calls with no transaction around them: first the user row, then the
//! license row. If the second step fails the first is undone by an explicit
//! compensating action. Compensation is best-effort: its own failure is
//! logged and never escalates the original error.

use chrono::{Duration, Utc};
use std::future::Future;
use std::sync::Arc;

use crate::db::repositories::{LicenseRepository, RepoError, UserRepository};
use crate::models::{License, User};
use crate::services::password::hash_password;

/// License service errors.
#[derive(Debug, thiserror::Error)]
pub enum LicenseError {
    /// Missing or malformed request fields
    #[error("{0}")]
    InvalidInput(String),

    /// No license with that key
    #[error("License key not found")]
    NotFound,

    /// License was already redeemed
    #[error("License key has already been activated")]
    AlreadyActivated,

    /// Username is taken
    #[error("Username is already taken")]
    UsernameTaken,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Run the second step of a two-step write; on failure, run the
/// compensating action for the already-committed first step.
///
/// The compensation is best-effort: if it fails too, the failure is logged
/// at `warn` and the original error is still returned unchanged.
pub async fn compensated<T, E, Fut, Undo, UndoFut>(step: Fut, undo: Undo) -> Result<T, E>
where
    Fut: Future<Output = Result<T, E>>,
    Undo: FnOnce() -> UndoFut,
    UndoFut: Future<Output = Result<(), RepoError>>,
{
    match step.await {
        Ok(value) => Ok(value),
        Err(err) => {
            if let Err(undo_err) = undo().await {
                tracing::warn!("Compensating action failed: {:#}", anyhow::Error::from(undo_err));
            }
            Err(err)
        }
    }
}

/// Service for license-gated signup and subscription extension.
pub struct LicenseService {
    users: Arc<dyn UserRepository>,
    licenses: Arc<dyn LicenseRepository>,
}

impl LicenseService {
    pub fn new(users: Arc<dyn UserRepository>, licenses: Arc<dyn LicenseRepository>) -> Self {
        Self { users, licenses }
    }

    /// Create a new account by redeeming a license key.
    ///
    /// Step one inserts the user row with an expiry of today plus the
    /// license's days; step two activates the license. If activation fails
    /// the user row is deleted again so no account without a valid license
    /// is left behind.
    pub async fn signup(
        &self,
        username: &str,
        password: &str,
        license_key: &str,
    ) -> Result<User, LicenseError> {
        let username = username.trim();
        let password = password.trim();
        if username.is_empty() || password.is_empty() || license_key.trim().is_empty() {
            return Err(LicenseError::InvalidInput(
                "Username, password and license key are required".to_string(),
            ));
        }
        if password.len() < 8 {
            return Err(LicenseError::InvalidInput(
                "Password must be at least 8 characters".to_string(),
            ));
        }

        let license = self.redeemable_license(license_key).await?;

        let now = Utc::now();
        let mut user = User::new(
            username.to_string(),
            Some(hash_password(password).map_err(LicenseError::Internal)?),
        );
        user.expires_at = Some(now + Duration::days(license.days));
        user.day = license.days;

        let created = match self.users.create(&user).await {
            Ok(created) => created,
            Err(RepoError::UniqueViolation) => return Err(LicenseError::UsernameTaken),
            Err(RepoError::Other(e)) => return Err(LicenseError::Internal(e)),
        };

        let users = self.users.clone();
        let user_id = created.id;
        compensated(self.licenses.activate(license.id, user_id, now), move || {
            tracing::warn!(user_id, "License activation failed, removing new account");
            async move { users.delete(user_id).await }
        })
        .await
        .map_err(activation_error)?;

        Ok(created)
    }

    /// Extend an existing account by redeeming another license key.
    ///
    /// Step one writes the new expiry (extending from the current expiry
    /// when it is still in the future, else from now); step two activates
    /// the license. If activation fails the prior expiry is restored.
    pub async fn extend(&self, user_id: i64, license_key: &str) -> Result<User, LicenseError> {
        if license_key.trim().is_empty() {
            return Err(LicenseError::InvalidInput(
                "License key is required".to_string(),
            ));
        }

        let license = self.redeemable_license(license_key).await?;

        let user = self
            .users
            .get_by_id(user_id)
            .await
            .map_err(|e| LicenseError::Internal(e.into()))?
            .ok_or(LicenseError::NotFound)?;

        let now = Utc::now();
        let base = match user.expires_at {
            Some(expires_at) if expires_at > now => expires_at,
            _ => now,
        };
        let new_expiry = base + Duration::days(license.days);
        let new_day = user.day + license.days;

        let prior_expiry = user.expires_at;
        let prior_day = user.day;

        self.users
            .set_expiry(user.id, Some(new_expiry), new_day)
            .await
            .map_err(|e| LicenseError::Internal(e.into()))?;

        let users = self.users.clone();
        compensated(self.licenses.activate(license.id, user.id, now), move || {
            tracing::warn!(
                user_id = user.id,
                "License activation failed, restoring previous expiry"
            );
            async move { users.set_expiry(user.id, prior_expiry, prior_day).await }
        })
        .await
        .map_err(activation_error)?;

        Ok(User {
            expires_at: Some(new_expiry),
            day: new_day,
            ..user
        })
    }

    async fn redeemable_license(&self, key: &str) -> Result<License, LicenseError> {
        let license = self
            .licenses
            .get_by_key(key.trim())
            .await
            .map_err(|e| LicenseError::Internal(e.into()))?
            .ok_or(LicenseError::NotFound)?;

        if !license.is_redeemable() {
            return Err(LicenseError::AlreadyActivated);
        }
        Ok(license)
    }
}

fn activation_error(err: RepoError) -> LicenseError {
    match err {
        // Someone else redeemed the key between our read and write
        RepoError::UniqueViolation => LicenseError::AlreadyActivated,
        RepoError::Other(e) => LicenseError::Internal(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        RepoResult, SqlxLicenseRepository, SqlxUserRepository,
    };
    use crate::db::{create_pool, migrations, DbPool};
    use crate::models::LicenseStatus;
    use async_trait::async_trait;
    use chrono::DateTime;

    async fn setup() -> (DbPool, Arc<SqlxUserRepository>, Arc<SqlxLicenseRepository>) {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        (
            pool.clone(),
            Arc::new(SqlxUserRepository::new(pool.clone())),
            Arc::new(SqlxLicenseRepository::new(pool)),
        )
    }

    /// License repository double whose activation always fails.
    struct FailingLicenseRepo {
        inner: Arc<SqlxLicenseRepository>,
    }

    #[async_trait]
    impl LicenseRepository for FailingLicenseRepo {
        async fn create(&self, license: &License) -> RepoResult<License> {
            self.inner.create(license).await
        }

        async fn get_by_key(&self, key: &str) -> RepoResult<Option<License>> {
            self.inner.get_by_key(key).await
        }

        async fn activate(
            &self,
            _id: i64,
            _user_id: i64,
            _activated_at: DateTime<Utc>,
        ) -> RepoResult<()> {
            Err(RepoError::Other(anyhow::anyhow!("storage unavailable")))
        }
    }

    #[tokio::test]
    async fn test_signup_activates_license() {
        let (_, users, licenses) = setup().await;
        licenses
            .create(&License::new("KEY-1".into(), 30))
            .await
            .unwrap();
        let service = LicenseService::new(users.clone(), licenses.clone());

        let user = service.signup("alice", "hunter42!", "KEY-1").await.unwrap();
        assert_eq!(user.day, 30);
        assert!(user.expires_at.unwrap() > Utc::now());

        let license = licenses.get_by_key("KEY-1").await.unwrap().unwrap();
        assert_eq!(license.status, LicenseStatus::Active);
        assert_eq!(license.user_id, Some(user.id));
    }

    #[tokio::test]
    async fn test_signup_rejects_bad_input() {
        let (_, users, licenses) = setup().await;
        let service = LicenseService::new(users, licenses);

        assert!(matches!(
            service.signup(" ", "hunter42!", "K").await.unwrap_err(),
            LicenseError::InvalidInput(_)
        ));
        assert!(matches!(
            service.signup("alice", "short", "K").await.unwrap_err(),
            LicenseError::InvalidInput(_)
        ));
        assert!(matches!(
            service.signup("alice", "hunter42!", "missing").await.unwrap_err(),
            LicenseError::NotFound
        ));
    }

    #[tokio::test]
    async fn test_signup_rejects_redeemed_license() {
        let (_, users, licenses) = setup().await;
        licenses
            .create(&License::new("KEY-1".into(), 30))
            .await
            .unwrap();
        let service = LicenseService::new(users.clone(), licenses.clone());
        service.signup("alice", "hunter42!", "KEY-1").await.unwrap();

        assert!(matches!(
            service.signup("bob", "hunter42!", "KEY-1").await.unwrap_err(),
            LicenseError::AlreadyActivated
        ));
    }

    #[tokio::test]
    async fn test_signup_duplicate_username_conflicts() {
        let (_, users, licenses) = setup().await;
        licenses.create(&License::new("K1".into(), 7)).await.unwrap();
        licenses.create(&License::new("K2".into(), 7)).await.unwrap();
        let service = LicenseService::new(users, licenses);

        service.signup("alice", "hunter42!", "K1").await.unwrap();
        assert!(matches!(
            service.signup("alice", "hunter42!", "K2").await.unwrap_err(),
            LicenseError::UsernameTaken
        ));
    }

    #[tokio::test]
    async fn test_signup_compensation_removes_user() {
        let (_, users, licenses) = setup().await;
        licenses
            .create(&License::new("KEY-1".into(), 30))
            .await
            .unwrap();
        let failing = Arc::new(FailingLicenseRepo { inner: licenses });
        let service = LicenseService::new(users.clone(), failing);

        let err = service
            .signup("alice", "hunter42!", "KEY-1")
            .await
            .unwrap_err();
        assert!(matches!(err, LicenseError::Internal(_)));

        // The half-created account was rolled back
        assert!(users.get_by_username("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_extend_from_future_expiry() {
        let (_, users, licenses) = setup().await;
        let mut user = User::new("alice".into(), None);
        let current_expiry = Utc::now() + Duration::days(10);
        user.expires_at = Some(current_expiry);
        user.day = 10;
        let user = users.create(&user).await.unwrap();

        licenses.create(&License::new("K".into(), 30)).await.unwrap();
        let service = LicenseService::new(users.clone(), licenses.clone());

        let updated = service.extend(user.id, "K").await.unwrap();
        assert_eq!(updated.day, 40);
        // Extended from the existing expiry, not from today
        let expiry = updated.expires_at.unwrap();
        assert!((expiry - (current_expiry + Duration::days(30))).num_seconds().abs() < 2);

        let license = licenses.get_by_key("K").await.unwrap().unwrap();
        assert_eq!(license.user_id, Some(user.id));
    }

    #[tokio::test]
    async fn test_extend_lapsed_account_starts_from_now() {
        let (_, users, licenses) = setup().await;
        let mut user = User::new("alice".into(), None);
        user.expires_at = Some(Utc::now() - Duration::days(100));
        let user = users.create(&user).await.unwrap();

        licenses.create(&License::new("K".into(), 30)).await.unwrap();
        let service = LicenseService::new(users.clone(), licenses);

        let updated = service.extend(user.id, "K").await.unwrap();
        let expiry = updated.expires_at.unwrap();
        assert!((expiry - (Utc::now() + Duration::days(30))).num_seconds().abs() < 2);
    }

    #[tokio::test]
    async fn test_extend_compensation_restores_expiry() {
        let (_, users, licenses) = setup().await;
        let mut user = User::new("alice".into(), None);
        let prior = Utc::now() + Duration::days(3);
        user.expires_at = Some(prior);
        user.day = 3;
        let user = users.create(&user).await.unwrap();

        licenses.create(&License::new("K".into(), 30)).await.unwrap();
        let failing = Arc::new(FailingLicenseRepo { inner: licenses });
        let service = LicenseService::new(users.clone(), failing);

        assert!(matches!(
            service.extend(user.id, "K").await.unwrap_err(),
            LicenseError::Internal(_)
        ));

        let restored = users.get_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(restored.day, 3);
        assert!((restored.expires_at.unwrap() - prior).num_seconds().abs() < 2);
    }

    #[tokio::test]
    async fn test_compensated_passes_success_through() {
        let result: Result<i32, RepoError> =
            compensated(async { Ok(7) }, || async { panic!("must not run") }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_compensated_runs_undo_and_keeps_original_error() {
        use std::sync::atomic::{AtomicBool, Ordering};
        let undone = Arc::new(AtomicBool::new(false));
        let flag = undone.clone();

        let result: Result<(), &str> = compensated(async { Err("boom") }, move || {
            flag.store(true, Ordering::SeqCst);
            async { Ok(()) }
        })
        .await;

        assert_eq!(result.unwrap_err(), "boom");
        assert!(undone.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_compensated_swallows_undo_failure() {
        let result: Result<(), &str> = compensated(async { Err("boom") }, || async {
            Err(RepoError::Other(anyhow::anyhow!("undo failed too")))
        })
        .await;
        // Original error survives even when the rollback fails
        assert_eq!(result.unwrap_err(), "boom");
    }
}
