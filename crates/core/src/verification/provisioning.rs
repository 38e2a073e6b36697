use std::fmt;
use std::sync::Arc;

use tracing::warn;

use super::ports::{GuildError, GuildGateway, GuildRole};
use crate::domain::roster::RosterEntitlements;
use crate::domain::verification::UserId;

pub const VERIFIED_MESSAGE: &str = "Verified successfully!";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProvisioningStep {
    VerifiedRole(String),
    RosterRole(String),
    Nickname(String),
}

impl fmt::Display for ProvisioningStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VerifiedRole(name) => write!(f, "verified role `{name}`"),
            Self::RosterRole(name) => write!(f, "role `{name}`"),
            Self::Nickname(nickname) => write!(f, "nickname `{nickname}`"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    Granted,
    CreatedAndGranted,
    AlreadyPresent,
    Updated,
    Failed(String),
}

impl StepOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Per-step results of one provisioning pass, in execution order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProvisioningReport {
    entries: Vec<(ProvisioningStep, StepOutcome)>,
}

impl ProvisioningReport {
    pub fn record(&mut self, step: ProvisioningStep, outcome: StepOutcome) {
        self.entries.push((step, outcome));
    }

    pub fn entries(&self) -> &[(ProvisioningStep, StepOutcome)] {
        &self.entries
    }

    pub fn failures(&self) -> impl Iterator<Item = &(ProvisioningStep, StepOutcome)> {
        self.entries.iter().filter(|(_, outcome)| outcome.is_failure())
    }

    pub fn is_complete(&self) -> bool {
        self.failures().next().is_none()
    }

    /// Success text with one sentence appended per failed step.
    pub fn summary_message(&self) -> String {
        let mut message = VERIFIED_MESSAGE.to_owned();
        for (step, _) in self.failures() {
            match step {
                ProvisioningStep::VerifiedRole(_) => message.push_str(" Unable to assign role."),
                ProvisioningStep::RosterRole(name) => {
                    message.push_str(&format!(" Unable to assign role {name}."));
                }
                ProvisioningStep::Nickname(_) => message.push_str(" Unable to edit nickname."),
            }
        }
        message
    }
}

/// Applies roster entitlements to a guild member. Every step runs regardless
/// of earlier failures.
pub struct Provisioner {
    guild: Arc<dyn GuildGateway>,
    verified_role_name: String,
}

impl Provisioner {
    pub fn new(guild: Arc<dyn GuildGateway>, verified_role_name: impl Into<String>) -> Self {
        Self { guild, verified_role_name: verified_role_name.into() }
    }

    pub fn verified_role_name(&self) -> &str {
        &self.verified_role_name
    }

    /// Makes sure the verified marker role exists without granting it.
    pub async fn ensure_verified_role(&self) -> Result<GuildRole, GuildError> {
        self.ensure_role(&self.verified_role_name).await.map(|(role, _)| role)
    }

    pub async fn provision(
        &self,
        user_id: &UserId,
        entitlements: &RosterEntitlements,
    ) -> ProvisioningReport {
        let mut report = ProvisioningReport::default();

        let outcome = self.ensure_granted(user_id, &self.verified_role_name).await;
        report.record(ProvisioningStep::VerifiedRole(self.verified_role_name.clone()), outcome);

        for role in &entitlements.roles {
            if role == &self.verified_role_name {
                continue;
            }
            let outcome = self.ensure_granted(user_id, role).await;
            report.record(ProvisioningStep::RosterRole(role.clone()), outcome);
        }

        if let Some(nickname) = &entitlements.nickname {
            let outcome = match self.guild.set_nickname(user_id, nickname).await {
                Ok(()) => StepOutcome::Updated,
                Err(error) => StepOutcome::Failed(error.to_string()),
            };
            report.record(ProvisioningStep::Nickname(nickname.clone()), outcome);
        }

        for (step, outcome) in report.failures() {
            if let StepOutcome::Failed(reason) = outcome {
                warn!(
                    event_name = "verification.provisioning.step_failed",
                    user_id = %user_id,
                    step = %step,
                    reason = %reason,
                    "provisioning step failed"
                );
            }
        }

        report
    }

    async fn ensure_granted(&self, user_id: &UserId, role_name: &str) -> StepOutcome {
        let (role, created) = match self.ensure_role(role_name).await {
            Ok(resolved) => resolved,
            Err(error) => return StepOutcome::Failed(error.to_string()),
        };

        match self.guild.member_has_role(user_id, &role.id).await {
            Ok(true) => return StepOutcome::AlreadyPresent,
            Ok(false) => {}
            Err(error) => return StepOutcome::Failed(error.to_string()),
        }

        match self.guild.grant_role(user_id, &role.id).await {
            Ok(()) if created => StepOutcome::CreatedAndGranted,
            Ok(()) => StepOutcome::Granted,
            Err(error) => StepOutcome::Failed(error.to_string()),
        }
    }

    /// Finds the role by name, creating it when absent. A concurrent creator
    /// surfaces as `DuplicateRole`, which is resolved by looking it up again.
    pub async fn ensure_role(&self, name: &str) -> Result<(GuildRole, bool), GuildError> {
        if let Some(role) = self.guild.find_role(name).await? {
            return Ok((role, false));
        }

        match self.guild.create_role(name).await {
            Ok(role) => Ok((role, true)),
            Err(GuildError::DuplicateRole(_)) => {
                self.guild.find_role(name).await?.map(|role| (role, false)).ok_or_else(|| {
                    GuildError::Request(format!("role `{name}` reported as duplicate but not found"))
                })
            }
            Err(error) => Err(error),
        }
    }
}
