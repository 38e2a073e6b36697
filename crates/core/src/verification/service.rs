use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use super::codes::{AlphanumericCodeGenerator, CodeGenerator, CodeIssuer, NoticeTemplate};
use super::ports::{Clock, GuildGateway, NotificationSink, RosterSource, VerificationStore};
use super::provisioning::{ProvisioningReport, Provisioner};
use super::{is_valid_email, normalize_email};
use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crate::config::AppConfig;
use crate::domain::roster::{FixedHeaders, RosterSheet};
use crate::domain::verification::{CodeSubmission, UserId};
use crate::errors::VerificationError;

const ACTOR: &str = "verification-service";
const EMAIL_SUBMISSION: &str = "verification.email_submission";
const CODE_CONFIRMATION: &str = "verification.code_confirmation";

/// Who is asking, and the id that ties their logs and audit events together.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestContext {
    pub user_id: UserId,
    pub correlation_id: String,
}

impl RequestContext {
    pub fn new(user_id: impl Into<UserId>, correlation_id: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), correlation_id: correlation_id.into() }
    }
}

pub struct VerificationPorts {
    pub roster: Arc<dyn RosterSource>,
    pub store: Arc<dyn VerificationStore>,
    pub notifications: Arc<dyn NotificationSink>,
    pub guild: Arc<dyn GuildGateway>,
    pub audit: Arc<dyn AuditSink>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Clone, Debug)]
pub struct VerificationPolicy {
    pub code_ttl: Duration,
    pub verified_role_name: String,
    pub fixed_headers: FixedHeaders,
    pub notice: NoticeTemplate,
}

impl Default for VerificationPolicy {
    fn default() -> Self {
        Self {
            code_ttl: Duration::hours(24),
            verified_role_name: "Verified".to_owned(),
            fixed_headers: FixedHeaders::default(),
            notice: NoticeTemplate::default(),
        }
    }
}

impl VerificationPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        let ttl_secs = i64::try_from(config.verification.code_ttl_secs).unwrap_or(i64::MAX);
        Self {
            code_ttl: Duration::try_seconds(ttl_secs).unwrap_or_else(|| Duration::hours(24)),
            verified_role_name: config.verification.verified_role_name.clone(),
            fixed_headers: FixedHeaders::new(&config.roster.fixed_headers),
            notice: NoticeTemplate::new(&config.mail.subject, &config.mail.body_template),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailSubmission {
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

impl EmailSubmission {
    pub fn message(&self) -> &'static str {
        "Email sent!"
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationOutcome {
    pub email: String,
    pub nickname: Option<String>,
    pub roles: Vec<String>,
    pub newly_verified: bool,
    pub report: ProvisioningReport,
}

impl VerificationOutcome {
    pub fn message(&self) -> String {
        self.report.summary_message()
    }
}

pub struct VerificationService {
    roster: Arc<dyn RosterSource>,
    store: Arc<dyn VerificationStore>,
    notifications: Arc<dyn NotificationSink>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    issuer: CodeIssuer,
    provisioner: Provisioner,
    fixed_headers: FixedHeaders,
}

impl VerificationService {
    pub fn new(ports: VerificationPorts, policy: VerificationPolicy) -> Self {
        Self::with_generator(ports, policy, Arc::new(AlphanumericCodeGenerator::default()))
    }

    pub fn with_generator(
        ports: VerificationPorts,
        policy: VerificationPolicy,
        generator: Arc<dyn CodeGenerator>,
    ) -> Self {
        Self {
            roster: ports.roster,
            store: ports.store,
            notifications: ports.notifications,
            audit: ports.audit,
            clock: ports.clock,
            issuer: CodeIssuer::new(generator, policy.code_ttl, policy.notice),
            provisioner: Provisioner::new(ports.guild, policy.verified_role_name),
            fixed_headers: policy.fixed_headers,
        }
    }

    pub fn verified_role_name(&self) -> &str {
        self.provisioner.verified_role_name()
    }

    /// Validates the address against the roster, stores a fresh code and
    /// emails it. The record is kept even when delivery fails.
    pub async fn submit_email(
        &self,
        ctx: &RequestContext,
        raw_email: &str,
    ) -> Result<EmailSubmission, VerificationError> {
        let email = normalize_email(raw_email);
        if !is_valid_email(&email) {
            return Err(self.rejected(
                ctx,
                EMAIL_SUBMISSION,
                VerificationError::InvalidEmailFormat { email },
            ));
        }

        let roster = match self.load_roster().await {
            Ok(roster) => roster,
            Err(error) => return Err(self.rejected(ctx, EMAIL_SUBMISSION, error)),
        };
        if roster.find_by_email(&email).is_none() {
            return Err(self.rejected(
                ctx,
                EMAIL_SUBMISSION,
                VerificationError::EmailNotFound { email },
            ));
        }

        let now = self.clock.now();
        let issued = match self.issuer.issue_code(&email, now) {
            Ok(issued) => issued,
            Err(error) => {
                let error = VerificationError::Misconfigured(error.to_string());
                return Err(self.rejected(ctx, EMAIL_SUBMISSION, error));
            }
        };
        let submission = CodeSubmission {
            user_id: ctx.user_id.clone(),
            email: email.clone(),
            verification_code: issued.code.clone(),
            code_expires_at: issued.expires_at,
            submitted_at: now,
        };
        if let Err(error) = self.store.upsert_submission(submission).await {
            let error = VerificationError::UpstreamUnavailable(error.to_string());
            return Err(self.rejected(ctx, EMAIL_SUBMISSION, error));
        }

        if let Err(error) = self.issuer.dispatch(self.notifications.as_ref(), &issued).await {
            let error = VerificationError::DeliveryFailed { email, reason: error.to_string() };
            return Err(self.rejected(ctx, EMAIL_SUBMISSION, error));
        }

        info!(
            event_name = "verification.email_submission.accepted",
            correlation_id = %ctx.correlation_id,
            user_id = %ctx.user_id,
            expires_at = %issued.expires_at.to_rfc3339(),
            "verification code issued and sent"
        );
        self.audit.emit(
            AuditEvent::new(
                Some(ctx.user_id.clone()),
                ctx.correlation_id.clone(),
                EMAIL_SUBMISSION,
                AuditCategory::Verification,
                ACTOR,
                AuditOutcome::Success,
            )
            .with_metadata("email", email.clone())
            .with_metadata("expires_at", issued.expires_at.to_rfc3339()),
        );

        Ok(EmailSubmission { email, expires_at: issued.expires_at })
    }

    /// Confirms the pending code, marks the record verified and provisions
    /// roles and nickname from the current roster row.
    pub async fn confirm_code(
        &self,
        ctx: &RequestContext,
        submitted_code: &str,
    ) -> Result<VerificationOutcome, VerificationError> {
        let record = match self.store.get(&ctx.user_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                let error =
                    VerificationError::NoPendingVerification { user_id: ctx.user_id.clone() };
                return Err(self.rejected(ctx, CODE_CONFIRMATION, error));
            }
            Err(error) => {
                let error = VerificationError::UpstreamUnavailable(error.to_string());
                return Err(self.rejected(ctx, CODE_CONFIRMATION, error));
            }
        };

        let now = self.clock.now();
        if !record.accepts(submitted_code.trim(), now) {
            return Err(self.rejected(
                ctx,
                CODE_CONFIRMATION,
                VerificationError::InvalidOrExpiredCode,
            ));
        }

        let roster = match self.load_roster().await {
            Ok(roster) => roster,
            Err(error) => return Err(self.rejected(ctx, CODE_CONFIRMATION, error)),
        };
        let Some(row) = roster.find_by_email(&record.email) else {
            let error = VerificationError::RosterEntryMissing { email: record.email.clone() };
            return Err(self.rejected(ctx, CODE_CONFIRMATION, error));
        };
        let entitlements = roster.entitlements(row, &self.fixed_headers);

        let newly_verified = !record.verified;
        if newly_verified {
            if let Err(error) = self.store.mark_verified(&ctx.user_id, now).await {
                let error = VerificationError::UpstreamUnavailable(error.to_string());
                return Err(self.rejected(ctx, CODE_CONFIRMATION, error));
            }
        }

        let report = self.provisioner.provision(&ctx.user_id, &entitlements).await;
        let failed_steps = report.failures().count();

        info!(
            event_name = "verification.code_confirmation.accepted",
            correlation_id = %ctx.correlation_id,
            user_id = %ctx.user_id,
            newly_verified,
            roles = entitlements.roles.len(),
            failed_steps,
            "participant verified"
        );
        self.audit.emit(
            AuditEvent::new(
                Some(ctx.user_id.clone()),
                ctx.correlation_id.clone(),
                CODE_CONFIRMATION,
                AuditCategory::Verification,
                ACTOR,
                AuditOutcome::Success,
            )
            .with_metadata("email", record.email.clone())
            .with_metadata("newly_verified", newly_verified.to_string())
            .with_metadata("roles", entitlements.roles.join(",")),
        );
        if failed_steps > 0 {
            let failures: Vec<String> = report.failures().map(|(step, _)| step.to_string()).collect();
            self.audit.emit(
                AuditEvent::new(
                    Some(ctx.user_id.clone()),
                    ctx.correlation_id.clone(),
                    "verification.provisioning",
                    AuditCategory::Provisioning,
                    ACTOR,
                    AuditOutcome::Failed,
                )
                .with_metadata("failed_steps", failures.join("; ")),
            );
        }

        Ok(VerificationOutcome {
            email: record.email,
            nickname: entitlements.nickname,
            roles: entitlements.roles,
            newly_verified,
            report,
        })
    }

    async fn load_roster(&self) -> Result<RosterSheet, VerificationError> {
        self.roster
            .fetch_roster()
            .await
            .map_err(|error| VerificationError::UpstreamUnavailable(error.to_string()))
    }

    fn rejected(
        &self,
        ctx: &RequestContext,
        event_type: &str,
        error: VerificationError,
    ) -> VerificationError {
        let category = match error {
            VerificationError::DeliveryFailed { .. } => AuditCategory::Notification,
            _ => AuditCategory::Verification,
        };
        let outcome = match error {
            VerificationError::DeliveryFailed { .. }
            | VerificationError::UpstreamUnavailable(_)
            | VerificationError::Misconfigured(_) => AuditOutcome::Failed,
            _ => AuditOutcome::Rejected,
        };

        warn!(
            event_name = event_type,
            correlation_id = %ctx.correlation_id,
            user_id = %ctx.user_id,
            error_class = error.error_class(),
            error = %error,
            "verification step did not complete"
        );
        self.audit.emit(
            AuditEvent::new(
                Some(ctx.user_id.clone()),
                ctx.correlation_id.clone(),
                event_type,
                category,
                ACTOR,
                outcome,
            )
            .with_metadata("error_class", error.error_class()),
        );

        error
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};

    use super::{RequestContext, VerificationPolicy, VerificationPorts, VerificationService};
    use crate::audit::{AuditCategory, AuditOutcome, InMemoryAuditSink};
    use crate::domain::roster::RosterSheet;
    use crate::domain::verification::{UserId, VerificationState};
    use crate::errors::{VerificationError, UNEXPECTED_ERROR_MESSAGE};
    use crate::verification::memory::{
        InMemoryGuild, InMemoryVerificationStore, ManualClock, RecordingNotificationSink,
        SequenceCodeGenerator, StaticRosterSource,
    };
    use crate::verification::ports::{GuildError, NotificationError, RosterError};
    use crate::verification::provisioning::StepOutcome;

    struct Harness {
        service: VerificationService,
        roster: StaticRosterSource,
        store: InMemoryVerificationStore,
        sink: RecordingNotificationSink,
        guild: InMemoryGuild,
        audit: InMemoryAuditSink,
        clock: ManualClock,
    }

    fn sheet(lines: &[&[&str]]) -> RosterSheet {
        RosterSheet::from_grid(
            lines.iter().map(|line| line.iter().map(|cell| (*cell).to_owned()).collect()).collect(),
        )
    }

    fn club_roster() -> RosterSheet {
        sheet(&[
            &["Timestamp", "Email", "First Name", "Last Name", "Marketing", "Finance"],
            &["2026-01-10", "jane@example.com", "Jane", "Doe", "x", ""],
            &["2026-01-11", "omar@example.com", "Omar", "Haddad", "", "treasurer"],
        ])
    }

    fn harness(codes: &[&str]) -> Harness {
        harness_with_policy(codes, VerificationPolicy::default())
    }

    fn harness_with_policy(codes: &[&str], policy: VerificationPolicy) -> Harness {
        let roster = StaticRosterSource::new(club_roster());
        let store = InMemoryVerificationStore::default();
        let sink = RecordingNotificationSink::default();
        let guild = InMemoryGuild::default();
        let audit = InMemoryAuditSink::default();
        let clock = ManualClock::new(
            Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).single().unwrap_or_default(),
        );

        let service = VerificationService::with_generator(
            VerificationPorts {
                roster: Arc::new(roster.clone()),
                store: Arc::new(store.clone()),
                notifications: Arc::new(sink.clone()),
                guild: Arc::new(guild.clone()),
                audit: Arc::new(audit.clone()),
                clock: Arc::new(clock.clone()),
            },
            policy,
            Arc::new(SequenceCodeGenerator::new(codes.iter().copied())),
        );

        Harness { service, roster, store, sink, guild, audit, clock }
    }

    fn ctx(user: &str) -> RequestContext {
        RequestContext::new(user, format!("req-{user}"))
    }

    #[tokio::test]
    async fn rostered_member_is_verified_end_to_end() {
        let h = harness(&["JaneCode0001"]);
        let jane = ctx("U-jane");

        let submission = h.service.submit_email(&jane, "Jane@Example.com").await;
        assert_eq!(submission.as_ref().map(|s| s.email.as_str()), Ok("jane@example.com"));
        assert_eq!(submission.as_ref().map(|s| s.message()), Ok("Email sent!"));

        let sent = h.sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].address, "jane@example.com");
        assert_eq!(sent[0].subject, "Your Verification Code");
        assert_eq!(sent[0].body, "Your verification code is: JaneCode0001");

        let record = h.store.snapshot(&jane.user_id);
        assert_eq!(record.as_ref().map(|r| r.state()), Some(VerificationState::CodeIssued));
        assert_eq!(
            record.as_ref().map(|r| r.code_expires_at - h.clock_now()),
            Some(Duration::hours(24))
        );

        let outcome = h.service.confirm_code(&jane, "JaneCode0001").await;
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(error) => panic!("confirmation should succeed: {error}"),
        };

        assert!(outcome.newly_verified);
        assert_eq!(outcome.message(), "Verified successfully!");
        assert_eq!(outcome.nickname.as_deref(), Some("Jane Doe"));
        assert_eq!(outcome.roles, vec!["Marketing".to_owned()]);
        assert_eq!(h.guild.member_roles(&jane.user_id), vec!["Verified", "Marketing"]);
        assert_eq!(h.guild.nickname(&jane.user_id).as_deref(), Some("Jane Doe"));
        assert!(h.store.snapshot(&jane.user_id).is_some_and(|r| r.verified));
        assert_eq!(
            h.audit.event_types(),
            vec!["verification.email_submission", "verification.code_confirmation"]
        );
    }

    impl Harness {
        fn clock_now(&self) -> chrono::DateTime<Utc> {
            use crate::verification::ports::Clock;
            self.clock.now()
        }
    }

    #[tokio::test]
    async fn malformed_email_changes_nothing() {
        let h = harness(&[]);

        let result = h.service.submit_email(&ctx("U1"), "not-an-email").await;

        assert!(matches!(result, Err(VerificationError::InvalidEmailFormat { .. })));
        assert_eq!(h.roster.fetch_count(), 0);
        assert!(h.store.is_empty());
        assert!(h.sink.sent().is_empty());
    }

    #[tokio::test]
    async fn unknown_email_has_no_side_effects() {
        let h = harness(&[]);

        let result = h.service.submit_email(&ctx("U1"), "stranger@example.com").await;

        assert!(matches!(
            result,
            Err(VerificationError::EmailNotFound { ref email }) if email == "stranger@example.com"
        ));
        assert!(h.store.is_empty());
        assert!(h.sink.sent().is_empty());
        let events = h.audit.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].outcome, AuditOutcome::Rejected);
        assert_eq!(events[0].metadata.get("error_class").map(String::as_str), Some("email_not_found"));
    }

    #[tokio::test]
    async fn resubmission_replaces_the_previous_code() {
        let h = harness(&["FirstCode001", "SecondCode02"]);
        let user = ctx("U1");

        assert!(h.service.submit_email(&user, "jane@example.com").await.is_ok());
        h.clock.advance(Duration::minutes(5));
        assert!(h.service.submit_email(&user, "omar@example.com").await.is_ok());

        let old = h.service.confirm_code(&user, "FirstCode001").await;
        assert_eq!(old.err(), Some(VerificationError::InvalidOrExpiredCode));

        let record = h.store.snapshot(&user.user_id);
        assert_eq!(record.as_ref().map(|r| r.email.as_str()), Some("omar@example.com"));
        assert_eq!(h.store.len(), 1);

        let fresh = h.service.confirm_code(&user, "SecondCode02").await;
        assert_eq!(fresh.map(|o| o.roles), Ok(vec!["Finance".to_owned()]));
    }

    #[tokio::test]
    async fn code_expires_at_the_boundary_instant() {
        let h = harness(&["Expiring0001"]);
        let user = ctx("U1");
        assert!(h.service.submit_email(&user, "jane@example.com").await.is_ok());

        h.clock.advance(Duration::hours(24));
        let result = h.service.confirm_code(&user, "Expiring0001").await;

        assert_eq!(result.err(), Some(VerificationError::InvalidOrExpiredCode));
        assert!(h.store.snapshot(&user.user_id).is_some_and(|r| !r.verified));
        assert!(h.guild.member_roles(&user.user_id).is_empty());
    }

    #[tokio::test]
    async fn code_one_second_before_expiry_is_accepted() {
        let h = harness(&["LastSecond01"]);
        let user = ctx("U1");
        assert!(h.service.submit_email(&user, "jane@example.com").await.is_ok());

        h.clock.advance(Duration::hours(24) - Duration::seconds(1));

        assert!(h.service.confirm_code(&user, " LastSecond01 ").await.is_ok());
    }

    #[tokio::test]
    async fn confirmation_without_submission_is_rejected() {
        let h = harness(&[]);

        let result = h.service.confirm_code(&ctx("U9"), "whatever").await;

        assert_eq!(
            result.err(),
            Some(VerificationError::NoPendingVerification { user_id: UserId::from("U9") })
        );
    }

    #[tokio::test]
    async fn delivery_failure_still_persists_the_record() {
        let h = harness(&["Undelivered1"]);
        h.sink.set_failure(Some(NotificationError::Transport("relay timeout".to_owned())));
        let user = ctx("U1");

        let result = h.service.submit_email(&user, "jane@example.com").await;

        assert!(matches!(result, Err(VerificationError::DeliveryFailed { .. })));
        let events = h.audit.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].category, AuditCategory::Notification);
        assert_eq!(events[0].outcome, AuditOutcome::Failed);
        let record = h.store.snapshot(&user.user_id);
        assert_eq!(record.map(|r| r.verification_code), Some("Undelivered1".to_owned()));
    }

    #[tokio::test]
    async fn roster_removal_between_steps_leaves_record_unverified() {
        let h = harness(&["Removed00001"]);
        let user = ctx("U1");
        assert!(h.service.submit_email(&user, "jane@example.com").await.is_ok());

        h.roster.replace(sheet(&[&["Email", "First Name", "Last Name"]]));
        let result = h.service.confirm_code(&user, "Removed00001").await;

        assert!(matches!(result, Err(VerificationError::RosterEntryMissing { .. })));
        assert!(h.store.snapshot(&user.user_id).is_some_and(|r| !r.verified));
        assert!(h.guild.member_roles(&user.user_id).is_empty());
    }

    #[tokio::test]
    async fn nickname_failure_is_reported_on_success() {
        let h = harness(&["Partial00001"]);
        h.guild.fail_nicknames(GuildError::PermissionDenied("cannot rename owner".to_owned()));
        let user = ctx("U1");
        assert!(h.service.submit_email(&user, "jane@example.com").await.is_ok());

        let outcome = h.service.confirm_code(&user, "Partial00001").await;

        assert_eq!(
            outcome.as_ref().map(|o| o.message()),
            Ok("Verified successfully! Unable to edit nickname.".to_owned())
        );
        assert!(h.store.snapshot(&user.user_id).is_some_and(|r| r.verified));
        assert!(h.audit.event_types().contains(&"verification.provisioning".to_owned()));
    }

    #[tokio::test]
    async fn refused_role_grant_keeps_the_other_grants_and_the_verification() {
        let h = harness(&["Granted00001"]);
        h.roster.replace(sheet(&[
            &["Email", "First Name", "Last Name", "Marketing", "Finance"],
            &["jane@example.com", "Jane", "Doe", "x", "x"],
        ]));
        h.guild.seed_role("Finance");
        h.guild.fail_grants("Finance", GuildError::PermissionDenied("role above bot".to_owned()));
        let user = ctx("U1");
        assert!(h.service.submit_email(&user, "jane@example.com").await.is_ok());

        let outcome = h.service.confirm_code(&user, "Granted00001").await;

        assert_eq!(
            outcome.as_ref().map(|o| o.message()),
            Ok("Verified successfully! Unable to assign role Finance.".to_owned())
        );
        assert_eq!(h.guild.member_roles(&user.user_id), vec!["Verified", "Marketing"]);
        assert_eq!(h.guild.nickname(&user.user_id).as_deref(), Some("Jane Doe"));
        assert!(h.store.snapshot(&user.user_id).is_some_and(|r| r.verified));
    }

    #[tokio::test]
    async fn repeated_confirmation_is_idempotent() {
        let h = harness(&["Repeat000001"]);
        let user = ctx("U1");
        assert!(h.service.submit_email(&user, "jane@example.com").await.is_ok());
        assert!(h.service.confirm_code(&user, "Repeat000001").await.is_ok());

        let again = h.service.confirm_code(&user, "Repeat000001").await;
        let again = match again {
            Ok(outcome) => outcome,
            Err(error) => panic!("second confirmation should succeed: {error}"),
        };

        assert!(!again.newly_verified);
        assert!(again.report.entries()[..2]
            .iter()
            .all(|(_, outcome)| *outcome == StepOutcome::AlreadyPresent));
        assert_eq!(h.guild.created_roles(), vec!["Verified", "Marketing"]);
    }

    #[tokio::test]
    async fn roster_outage_maps_to_upstream_unavailable() {
        let h = harness(&[]);
        h.roster.fail_with(RosterError::Fetch("503 from sheets".to_owned()));

        let result = h.service.submit_email(&ctx("U1"), "jane@example.com").await;

        assert!(matches!(result, Err(VerificationError::UpstreamUnavailable(_))));
        assert_eq!(h.audit.events().first().map(|e| e.outcome.clone()), Some(AuditOutcome::Failed));
    }

    #[tokio::test]
    async fn unrepresentable_code_expiry_is_refused_without_side_effects() {
        let policy =
            VerificationPolicy { code_ttl: Duration::MAX, ..VerificationPolicy::default() };
        let h = harness_with_policy(&["Overflow0001"], policy);

        let result = h.service.submit_email(&ctx("U1"), "jane@example.com").await;

        let error = match result {
            Ok(_) => panic!("submission should be refused"),
            Err(error) => error,
        };
        assert!(matches!(error, VerificationError::Misconfigured(_)));
        assert_eq!(error.user_message(), UNEXPECTED_ERROR_MESSAGE);
        assert!(h.store.is_empty());
        assert!(h.sink.sent().is_empty());
        assert_eq!(h.audit.events().first().map(|e| e.outcome.clone()), Some(AuditOutcome::Failed));
    }

    #[tokio::test]
    async fn roster_is_fetched_on_every_step() {
        let h = harness(&["Fetched00001"]);
        let user = ctx("U1");

        assert!(h.service.submit_email(&user, "jane@example.com").await.is_ok());
        assert!(h.service.confirm_code(&user, "Fetched00001").await.is_ok());

        assert_eq!(h.roster.fetch_count(), 2);
    }
}
