//! Database layer
//!
//! Connection pool creation, code-based migrations, and repository traits
//! with sqlx implementations. The rest of the application only ever talks
//! to the repository traits.

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{create_pool, DbPool};

/// Check whether a sqlx error is a uniqueness-constraint violation.
///
/// The application reacts to these with bounded retry (API key generation)
/// or a 409 response (duplicate username, duplicate hwid); every other
/// database error propagates as an upstream failure.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            // SQLite reports SQLITE_CONSTRAINT_UNIQUE as extended code 2067
            db_err.code().as_deref() == Some("2067")
                || db_err.message().contains("UNIQUE constraint failed")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unique_violation_detected() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        sqlx::query("CREATE TABLE t (v TEXT UNIQUE)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO t (v) VALUES ('x')")
            .execute(&pool)
            .await
            .unwrap();

        let err = sqlx::query("INSERT INTO t (v) VALUES ('x')")
            .execute(&pool)
            .await
            .unwrap_err();
        assert!(is_unique_violation(&err));
    }

    #[tokio::test]
    async fn test_other_errors_not_flagged() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        let err = sqlx::query("INSERT INTO missing (v) VALUES ('x')")
            .execute(&pool)
            .await
            .unwrap_err();
        assert!(!is_unique_violation(&err));
    }
}
