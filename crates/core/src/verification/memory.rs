//! In-memory port implementations for tests and local wiring.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use super::codes::{AlphanumericCodeGenerator, CodeGenerator};
use super::ports::{
    Clock, GuildError, GuildGateway, GuildRole, NotificationError, NotificationSink, RoleId,
    RosterError, RosterSource, StoreError, VerificationStore,
};
use crate::domain::roster::RosterSheet;
use crate::domain::verification::{CodeSubmission, UserId, VerificationRecord};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Clone, Default)]
pub struct InMemoryVerificationStore {
    records: Arc<Mutex<HashMap<UserId, VerificationRecord>>>,
}

impl InMemoryVerificationStore {
    pub fn snapshot(&self, user_id: &UserId) -> Option<VerificationRecord> {
        lock(&self.records).get(user_id).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl VerificationStore for InMemoryVerificationStore {
    async fn get(&self, user_id: &UserId) -> Result<Option<VerificationRecord>, StoreError> {
        Ok(self.snapshot(user_id))
    }

    async fn upsert_submission(
        &self,
        submission: CodeSubmission,
    ) -> Result<VerificationRecord, StoreError> {
        let mut records = lock(&self.records);
        let record = submission.apply_to(records.get(&submission.user_id));
        records.insert(record.user_id.clone(), record.clone());
        Ok(record)
    }

    async fn mark_verified(&self, user_id: &UserId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut records = lock(&self.records);
        let record = records.get_mut(user_id).ok_or_else(|| {
            StoreError::Unavailable(format!("no verification record for `{user_id}`"))
        })?;
        record.verified = true;
        record.updated_at = at;
        Ok(())
    }
}

/// Roster that returns whatever sheet it currently holds.
#[derive(Clone)]
pub struct StaticRosterSource {
    state: Arc<Mutex<Result<RosterSheet, RosterError>>>,
    fetches: Arc<Mutex<usize>>,
}

impl StaticRosterSource {
    pub fn new(sheet: RosterSheet) -> Self {
        Self { state: Arc::new(Mutex::new(Ok(sheet))), fetches: Arc::default() }
    }

    pub fn replace(&self, sheet: RosterSheet) {
        *lock(&self.state) = Ok(sheet);
    }

    pub fn fail_with(&self, error: RosterError) {
        *lock(&self.state) = Err(error);
    }

    pub fn fetch_count(&self) -> usize {
        *lock(&self.fetches)
    }
}

impl Default for StaticRosterSource {
    fn default() -> Self {
        Self::new(RosterSheet::default())
    }
}

#[async_trait]
impl RosterSource for StaticRosterSource {
    async fn fetch_roster(&self) -> Result<RosterSheet, RosterError> {
        *lock(&self.fetches) += 1;
        lock(&self.state).clone()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentNotice {
    pub address: String,
    pub subject: String,
    pub body: String,
}

#[derive(Clone, Default)]
pub struct RecordingNotificationSink {
    sent: Arc<Mutex<Vec<SentNotice>>>,
    failure: Arc<Mutex<Option<NotificationError>>>,
}

impl RecordingNotificationSink {
    pub fn failing(error: NotificationError) -> Self {
        Self { sent: Arc::default(), failure: Arc::new(Mutex::new(Some(error))) }
    }

    pub fn set_failure(&self, error: Option<NotificationError>) {
        *lock(&self.failure) = error;
    }

    pub fn sent(&self) -> Vec<SentNotice> {
        lock(&self.sent).clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingNotificationSink {
    async fn send(
        &self,
        address: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), NotificationError> {
        if let Some(error) = lock(&self.failure).clone() {
            return Err(error);
        }
        lock(&self.sent).push(SentNotice {
            address: address.to_owned(),
            subject: subject.to_owned(),
            body: body.to_owned(),
        });
        Ok(())
    }
}

#[derive(Default)]
struct GuildState {
    roles: BTreeMap<String, GuildRole>,
    members: HashMap<UserId, BTreeSet<RoleId>>,
    nicknames: HashMap<UserId, String>,
    created: Vec<String>,
    create_failures: HashMap<String, GuildError>,
    grant_failures: HashMap<String, GuildError>,
    nickname_failure: Option<GuildError>,
    racing: BTreeSet<String>,
    next_id: u64,
}

impl GuildState {
    fn insert_role(&mut self, name: &str) -> GuildRole {
        self.next_id += 1;
        let role = GuildRole { id: RoleId(format!("R{}", self.next_id)), name: name.to_owned() };
        self.roles.insert(name.to_owned(), role.clone());
        role
    }

    fn role_name(&self, id: &RoleId) -> Option<&str> {
        self.roles.values().find(|role| &role.id == id).map(|role| role.name.as_str())
    }
}

/// Single-guild fake that tracks roles, memberships and nicknames.
#[derive(Clone, Default)]
pub struct InMemoryGuild {
    state: Arc<Mutex<GuildState>>,
}

impl InMemoryGuild {
    pub fn seed_role(&self, name: &str) -> GuildRole {
        lock(&self.state).insert_role(name)
    }

    pub fn seed_member_role(&self, user_id: &UserId, name: &str) {
        let mut state = lock(&self.state);
        let role = match state.roles.get(name) {
            Some(role) => role.clone(),
            None => state.insert_role(name),
        };
        state.members.entry(user_id.clone()).or_default().insert(role.id);
    }

    pub fn fail_role_creation(&self, name: &str, error: GuildError) {
        lock(&self.state).create_failures.insert(name.to_owned(), error);
    }

    pub fn fail_grants(&self, name: &str, error: GuildError) {
        lock(&self.state).grant_failures.insert(name.to_owned(), error);
    }

    pub fn fail_nicknames(&self, error: GuildError) {
        lock(&self.state).nickname_failure = Some(error);
    }

    /// The next `create_role` for `name` loses a race against another creator.
    pub fn simulate_concurrent_creation(&self, name: &str) {
        lock(&self.state).racing.insert(name.to_owned());
    }

    pub fn member_roles(&self, user_id: &UserId) -> Vec<String> {
        let state = lock(&self.state);
        state
            .members
            .get(user_id)
            .map(|ids| ids.iter().filter_map(|id| state.role_name(id)).map(str::to_owned).collect())
            .unwrap_or_default()
    }

    pub fn nickname(&self, user_id: &UserId) -> Option<String> {
        lock(&self.state).nicknames.get(user_id).cloned()
    }

    pub fn created_roles(&self) -> Vec<String> {
        lock(&self.state).created.clone()
    }
}

#[async_trait]
impl GuildGateway for InMemoryGuild {
    async fn find_role(&self, name: &str) -> Result<Option<GuildRole>, GuildError> {
        Ok(lock(&self.state).roles.get(name).cloned())
    }

    async fn create_role(&self, name: &str) -> Result<GuildRole, GuildError> {
        let mut state = lock(&self.state);
        if let Some(error) = state.create_failures.get(name) {
            return Err(error.clone());
        }
        if state.racing.remove(name) {
            state.insert_role(name);
            return Err(GuildError::DuplicateRole(name.to_owned()));
        }
        if state.roles.contains_key(name) {
            return Err(GuildError::DuplicateRole(name.to_owned()));
        }
        state.created.push(name.to_owned());
        Ok(state.insert_role(name))
    }

    async fn member_has_role(&self, user_id: &UserId, role: &RoleId) -> Result<bool, GuildError> {
        Ok(lock(&self.state).members.get(user_id).is_some_and(|ids| ids.contains(role)))
    }

    async fn grant_role(&self, user_id: &UserId, role: &RoleId) -> Result<(), GuildError> {
        let mut state = lock(&self.state);
        let Some(name) = state.role_name(role) else {
            return Err(GuildError::Request(format!("unknown role `{}`", role.0)));
        };
        if let Some(error) = state.grant_failures.get(name) {
            return Err(error.clone());
        }
        state.members.entry(user_id.clone()).or_default().insert(role.clone());
        Ok(())
    }

    async fn set_nickname(&self, user_id: &UserId, nickname: &str) -> Result<(), GuildError> {
        let mut state = lock(&self.state);
        if let Some(error) = state.nickname_failure.clone() {
            return Err(error);
        }
        state.nicknames.insert(user_id.clone(), nickname.to_owned());
        Ok(())
    }
}

/// Hands out scripted codes, then falls back to random ones.
pub struct SequenceCodeGenerator {
    codes: Mutex<VecDeque<String>>,
    fallback: AlphanumericCodeGenerator,
}

impl SequenceCodeGenerator {
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            codes: Mutex::new(codes.into_iter().map(Into::into).collect()),
            fallback: AlphanumericCodeGenerator::default(),
        }
    }
}

impl CodeGenerator for SequenceCodeGenerator {
    fn generate(&self) -> String {
        lock(&self.codes).pop_front().unwrap_or_else(|| self.fallback.generate())
    }
}

/// Clock that only moves when told to.
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Arc::new(Mutex::new(start)) }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = lock(&self.now);
        *now += by;
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *lock(&self.now) = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *lock(&self.now)
    }
}

#[cfg(test)]
mod tests {
    use super::InMemoryGuild;
    use crate::domain::verification::UserId;
    use crate::verification::ports::{GuildError, GuildGateway};

    #[tokio::test]
    async fn member_roles_are_listed_in_creation_order() {
        let guild = InMemoryGuild::default();
        let user = UserId::from("U1");
        let verified = guild.seed_role("Verified");
        let finance = guild.seed_role("Finance");

        assert_eq!(guild.grant_role(&user, &finance.id).await, Ok(()));
        assert_eq!(guild.grant_role(&user, &verified.id).await, Ok(()));
        assert_eq!(guild.grant_role(&user, &verified.id).await, Ok(()));

        assert_eq!(guild.member_roles(&user), vec!["Verified", "Finance"]);
        assert_eq!(guild.member_has_role(&user, &finance.id).await, Ok(true));
    }

    #[tokio::test]
    async fn injected_grant_failure_only_affects_the_named_role() {
        let guild = InMemoryGuild::default();
        let user = UserId::from("U1");
        let marketing = guild.seed_role("Marketing");
        let finance = guild.seed_role("Finance");
        let denied = GuildError::PermissionDenied("role above bot".to_owned());
        guild.fail_grants("Finance", denied.clone());

        assert_eq!(guild.grant_role(&user, &finance.id).await, Err(denied));
        assert_eq!(guild.grant_role(&user, &marketing.id).await, Ok(()));
        assert_eq!(guild.member_roles(&user), vec!["Marketing"]);
    }
}
