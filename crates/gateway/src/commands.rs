use std::sync::Arc;

use async_trait::async_trait;
use rostergate_core::domain::verification::UserId;
use rostergate_core::errors::VerificationError;
use rostergate_core::verification::{
    EmailSubmission, RequestContext, VerificationOutcome, VerificationService,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::blocks::{self, MessageTemplate};
use crate::cooldown::{CooldownDecision, CooldownGate};
use crate::events::{
    EventContext, EventHandler, EventHandlerError, GatewayEnvelope, GatewayEvent,
    GatewayEventType, HandlerResult, InteractionRef,
};

pub const VERIFY_COMMAND: &str = "verify";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashCommandPayload {
    pub command: String,
    #[serde(default)]
    pub text: String,
    pub channel_id: String,
    pub user_id: String,
    pub interaction: InteractionRef,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandEnvelope {
    pub command: String,
    pub verb: String,
    pub argument: String,
    pub channel_id: String,
    pub user_id: String,
    pub correlation_id: String,
}

impl CommandEnvelope {
    pub fn request_context(&self) -> RequestContext {
        RequestContext::new(self.user_id.as_str(), self.correlation_id.as_str())
    }

    pub fn verify_command(&self) -> VerifyCommand {
        match self.verb.as_str() {
            "email" => VerifyCommand::Email { address: self.argument.clone() },
            "code" => VerifyCommand::Code { code: self.argument.clone() },
            "" | "help" => VerifyCommand::Help,
            verb => VerifyCommand::Unknown { verb: verb.to_owned() },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerifyCommand {
    Email { address: String },
    Code { code: String },
    Help,
    Unknown { verb: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("unsupported slash command: {0}")]
    UnsupportedCommand(String),
}

/// The two workflow entry points, shared by slash commands and the landing surface.
#[async_trait]
pub trait VerificationFlow: Send + Sync {
    async fn submit_email(
        &self,
        ctx: &RequestContext,
        raw_email: &str,
    ) -> Result<EmailSubmission, VerificationError>;

    async fn confirm_code(
        &self,
        ctx: &RequestContext,
        submitted_code: &str,
    ) -> Result<VerificationOutcome, VerificationError>;
}

#[async_trait]
impl VerificationFlow for VerificationService {
    async fn submit_email(
        &self,
        ctx: &RequestContext,
        raw_email: &str,
    ) -> Result<EmailSubmission, VerificationError> {
        VerificationService::submit_email(self, ctx, raw_email).await
    }

    async fn confirm_code(
        &self,
        ctx: &RequestContext,
        submitted_code: &str,
    ) -> Result<VerificationOutcome, VerificationError> {
        VerificationService::confirm_code(self, ctx, submitted_code).await
    }
}

pub fn normalize_verify_command(
    payload: SlashCommandPayload,
    correlation_id: &str,
) -> Result<CommandEnvelope, CommandParseError> {
    let command = payload.command.trim().trim_start_matches('/');
    if !command.eq_ignore_ascii_case(VERIFY_COMMAND) {
        return Err(CommandParseError::UnsupportedCommand(payload.command));
    }

    let text = payload.text.trim();
    let (verb, argument) = match text.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (text, ""),
    };
    let verb = if verb.is_empty() { "help".to_owned() } else { verb.to_ascii_lowercase() };

    Ok(CommandEnvelope {
        command: VERIFY_COMMAND.to_owned(),
        verb,
        argument: argument.to_owned(),
        channel_id: payload.channel_id,
        user_id: payload.user_id,
        correlation_id: correlation_id.to_owned(),
    })
}

/// Chat reply for an email submission.
pub fn email_reply(
    result: Result<EmailSubmission, VerificationError>,
    correlation_id: &str,
) -> MessageTemplate {
    match result {
        Ok(submission) => blocks::notice_message(submission.message()),
        Err(error) => blocks::interface_error_message(&error.into_interface(correlation_id)),
    }
}

/// Chat reply for a code confirmation, including partial provisioning notes.
pub fn code_reply(
    result: Result<VerificationOutcome, VerificationError>,
    correlation_id: &str,
) -> MessageTemplate {
    match result {
        Ok(outcome) => blocks::notice_message(&outcome.message()),
        Err(error) => blocks::interface_error_message(&error.into_interface(correlation_id)),
    }
}

pub struct CommandRouter<F: ?Sized> {
    flow: Arc<F>,
    cooldown: CooldownGate,
}

impl<F> CommandRouter<F>
where
    F: VerificationFlow + ?Sized,
{
    pub fn new(flow: Arc<F>, cooldown: CooldownGate) -> Self {
        Self { flow, cooldown }
    }

    pub async fn route(&self, envelope: CommandEnvelope) -> MessageTemplate {
        let user_id = UserId::from(envelope.user_id.as_str());
        if let CooldownDecision::Wait { remaining_secs } =
            self.cooldown.check(&envelope.command, &user_id)
        {
            info!(
                event_name = "gateway.command.cooldown",
                correlation_id = %envelope.correlation_id,
                user_id = %user_id,
                remaining_secs,
                "command rejected by cooldown"
            );
            return blocks::cooldown_message(remaining_secs);
        }

        let ctx = envelope.request_context();
        match envelope.verify_command() {
            VerifyCommand::Email { address } => {
                email_reply(self.flow.submit_email(&ctx, &address).await, &ctx.correlation_id)
            }
            VerifyCommand::Code { code } => {
                code_reply(self.flow.confirm_code(&ctx, &code).await, &ctx.correlation_id)
            }
            VerifyCommand::Help => blocks::help_message(),
            VerifyCommand::Unknown { verb } => blocks::error_message(
                &format!("Unsupported command `/verify {verb}`. Try `/verify help`."),
                &envelope.correlation_id,
            ),
        }
    }
}

pub struct SlashCommandHandler<F: ?Sized> {
    router: CommandRouter<F>,
}

impl<F> SlashCommandHandler<F>
where
    F: VerificationFlow + ?Sized,
{
    pub fn new(router: CommandRouter<F>) -> Self {
        Self { router }
    }
}

#[async_trait]
impl<F> EventHandler for SlashCommandHandler<F>
where
    F: VerificationFlow + ?Sized + 'static,
{
    fn event_type(&self) -> GatewayEventType {
        GatewayEventType::SlashCommand
    }

    async fn handle(
        &self,
        envelope: &GatewayEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let GatewayEvent::SlashCommand(payload) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let command = normalize_verify_command(payload.clone(), &ctx.correlation_id)?;
        Ok(HandlerResult::Responded(self.router.route(command).await))
    }
}
