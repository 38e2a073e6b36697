use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable chat-platform identity of a participant.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Where a participant stands in the workflow. `EmailSubmitted` only exists
/// while `submit_email` is between roster lookup and persistence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationState {
    Idle,
    EmailSubmitted,
    CodeIssued,
    Verified,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub user_id: UserId,
    pub email: String,
    pub verification_code: String,
    pub code_expires_at: DateTime<Utc>,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VerificationRecord {
    pub fn state(&self) -> VerificationState {
        if self.verified {
            VerificationState::Verified
        } else {
            VerificationState::CodeIssued
        }
    }

    pub fn code_is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.code_expires_at
    }

    /// Exact match against the stored code, strictly before expiry.
    pub fn accepts(&self, submitted_code: &str, now: DateTime<Utc>) -> bool {
        self.verification_code == submitted_code && self.code_is_live(now)
    }
}

/// Write model for an accepted email submission. Code and expiry always move
/// together; an existing `verified` flag is left as it was.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodeSubmission {
    pub user_id: UserId,
    pub email: String,
    pub verification_code: String,
    pub code_expires_at: DateTime<Utc>,
    pub submitted_at: DateTime<Utc>,
}

impl CodeSubmission {
    pub fn apply_to(&self, existing: Option<&VerificationRecord>) -> VerificationRecord {
        VerificationRecord {
            user_id: self.user_id.clone(),
            email: self.email.clone(),
            verification_code: self.verification_code.clone(),
            code_expires_at: self.code_expires_at,
            verified: existing.is_some_and(|record| record.verified),
            created_at: existing.map_or(self.submitted_at, |record| record.created_at),
            updated_at: self.submitted_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{CodeSubmission, UserId, VerificationState};

    fn submission(code: &str) -> CodeSubmission {
        let submitted_at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().unwrap_or_default();
        CodeSubmission {
            user_id: UserId::from("U1"),
            email: "jane@example.com".to_owned(),
            verification_code: code.to_owned(),
            code_expires_at: submitted_at + Duration::hours(24),
            submitted_at,
        }
    }

    #[test]
    fn code_is_rejected_at_exact_expiry_instant() {
        let record = submission("ABC123def456").apply_to(None);

        assert!(record.accepts("ABC123def456", record.code_expires_at - Duration::seconds(1)));
        assert!(!record.accepts("ABC123def456", record.code_expires_at));
        assert!(!record.accepts("abc123def456", record.created_at));
    }

    #[test]
    fn resubmission_keeps_creation_time_and_verified_flag() {
        let mut first = submission("first0000000").apply_to(None);
        first.verified = true;
        assert_eq!(first.state(), VerificationState::Verified);

        let mut later = submission("second000000");
        later.submitted_at = first.created_at + Duration::hours(2);
        let updated = later.apply_to(Some(&first));

        assert_eq!(updated.created_at, first.created_at);
        assert_eq!(updated.updated_at, later.submitted_at);
        assert_eq!(updated.verification_code, "second000000");
        assert_eq!(updated.state(), VerificationState::Verified);
        assert_eq!(submission("x").apply_to(None).state(), VerificationState::CodeIssued);
    }
}
