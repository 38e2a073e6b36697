use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rostergate_core::domain::verification::{CodeSubmission, UserId, VerificationRecord};
use rostergate_core::verification::ports::{StoreError, VerificationStore};
use sqlx::{sqlite::SqliteRow, Row};

use super::RepositoryError;
use crate::DbPool;

const SELECT_COLUMNS: &str = "SELECT
        user_id,
        email,
        verification_code,
        code_expires_at,
        verified,
        created_at,
        updated_at
     FROM verification_record";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VerificationCounts {
    pub total: u64,
    pub verified: u64,
}

#[derive(Clone)]
pub struct SqlVerificationRepository {
    pool: DbPool,
}

impl SqlVerificationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<VerificationRecord>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE user_id = ?"))
            .bind(user_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(record_from_row).transpose()
    }

    /// Inserts the record or overwrites email, code and expiry. `verified` and
    /// `created_at` of an existing row are left alone.
    pub async fn save_submission(
        &self,
        submission: &CodeSubmission,
    ) -> Result<VerificationRecord, RepositoryError> {
        sqlx::query(
            "INSERT INTO verification_record (
                user_id,
                email,
                verification_code,
                code_expires_at,
                verified,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, 0, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                email = excluded.email,
                verification_code = excluded.verification_code,
                code_expires_at = excluded.code_expires_at,
                updated_at = excluded.updated_at",
        )
        .bind(submission.user_id.as_str())
        .bind(&submission.email)
        .bind(&submission.verification_code)
        .bind(submission.code_expires_at.to_rfc3339())
        .bind(submission.submitted_at.to_rfc3339())
        .bind(submission.submitted_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.find_by_user(&submission.user_id).await?.ok_or_else(|| {
            RepositoryError::NotFound(format!(
                "verification record for `{}` vanished after upsert",
                submission.user_id
            ))
        })
    }

    pub async fn set_verified(
        &self,
        user_id: &UserId,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE verification_record SET verified = 1, updated_at = ? WHERE user_id = ?",
        )
        .bind(at.to_rfc3339())
        .bind(user_id.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("no verification record for `{user_id}`")));
        }
        Ok(())
    }

    pub async fn counts(&self) -> Result<VerificationCounts, RepositoryError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, COALESCE(SUM(verified), 0) AS verified
             FROM verification_record",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(VerificationCounts {
            total: parse_count("total", row.try_get("total")?)?,
            verified: parse_count("verified", row.try_get("verified")?)?,
        })
    }
}

#[async_trait]
impl VerificationStore for SqlVerificationRepository {
    async fn get(&self, user_id: &UserId) -> Result<Option<VerificationRecord>, StoreError> {
        Ok(self.find_by_user(user_id).await?)
    }

    async fn upsert_submission(
        &self,
        submission: CodeSubmission,
    ) -> Result<VerificationRecord, StoreError> {
        Ok(self.save_submission(&submission).await?)
    }

    async fn mark_verified(&self, user_id: &UserId, at: DateTime<Utc>) -> Result<(), StoreError> {
        Ok(self.set_verified(user_id, at).await?)
    }
}

fn record_from_row(row: SqliteRow) -> Result<VerificationRecord, RepositoryError> {
    let verified = row.try_get::<i64, _>("verified")?;
    let verified = match verified {
        0 => false,
        1 => true,
        other => {
            return Err(RepositoryError::Decode(format!("invalid value for `verified`: {other}")))
        }
    };

    Ok(VerificationRecord {
        user_id: UserId(row.try_get("user_id")?),
        email: row.try_get("email")?,
        verification_code: row.try_get("verification_code")?,
        code_expires_at: parse_timestamp("code_expires_at", row.try_get("code_expires_at")?)?,
        verified,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn parse_count(column: &str, value: i64) -> Result<u64, RepositoryError> {
    u64::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!("invalid value for `{column}` (expected a count): {value}"))
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}
