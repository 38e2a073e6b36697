//! Capabilities the verification workflow consumes. Adapters live in the
//! `db`, `gateway` and `server` crates; in-memory fakes live in
//! [`super::memory`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::roster::RosterSheet;
use crate::domain::verification::{CodeSubmission, UserId, VerificationRecord};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RosterError {
    #[error("roster fetch failed: {0}")]
    Fetch(String),
    #[error("roster payload malformed: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait RosterSource: Send + Sync {
    /// Returns the current sheet. Never cached by callers.
    async fn fetch_roster(&self) -> Result<RosterSheet, RosterError>;
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NotificationError {
    #[error("notification rejected by relay: {0}")]
    Rejected(String),
    #[error("notification transport failed: {0}")]
    Transport(String),
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, address: &str, subject: &str, body: &str)
        -> Result<(), NotificationError>;
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("verification store unavailable: {0}")]
    Unavailable(String),
    #[error("verification record could not be decoded: {0}")]
    Decode(String),
}

#[async_trait]
pub trait VerificationStore: Send + Sync {
    async fn get(&self, user_id: &UserId) -> Result<Option<VerificationRecord>, StoreError>;

    /// Creates the record or overwrites email, code and expiry in place.
    async fn upsert_submission(
        &self,
        submission: CodeSubmission,
    ) -> Result<VerificationRecord, StoreError>;

    async fn mark_verified(&self, user_id: &UserId, at: DateTime<Utc>) -> Result<(), StoreError>;
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RoleId(pub String);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuildRole {
    pub id: RoleId,
    pub name: String,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GuildError {
    #[error("missing permission: {0}")]
    PermissionDenied(String),
    #[error("role `{0}` already exists")]
    DuplicateRole(String),
    #[error("member `{0}` is not in the guild")]
    UnknownMember(UserId),
    #[error("guild request failed: {0}")]
    Request(String),
}

/// Role and nickname management for the single guild the bot serves.
#[async_trait]
pub trait GuildGateway: Send + Sync {
    async fn find_role(&self, name: &str) -> Result<Option<GuildRole>, GuildError>;
    async fn create_role(&self, name: &str) -> Result<GuildRole, GuildError>;
    async fn member_has_role(&self, user_id: &UserId, role: &RoleId) -> Result<bool, GuildError>;
    async fn grant_role(&self, user_id: &UserId, role: &RoleId) -> Result<(), GuildError>;
    async fn set_nickname(&self, user_id: &UserId, nickname: &str) -> Result<(), GuildError>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
