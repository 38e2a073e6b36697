//! The landing channel: bootstrap, button-driven prompts and moderation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rostergate_core::domain::verification::UserId;
use rostergate_core::errors::VerificationError;
use rostergate_core::verification::{Provisioner, RequestContext};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::blocks::{self, MessageTemplate};
use crate::commands::{code_reply, email_reply, VerificationFlow};
use crate::events::{
    ButtonPressEvent, ChannelMessageEvent, EventContext, EventHandler, EventHandlerError,
    GatewayEnvelope, GatewayEvent, GatewayEventType, HandlerResult, InteractionRef,
    ModalSubmissionEvent,
};
use crate::prompts::{PromptError, PromptKind, PromptRegistry, PromptResolution, PromptSubmission};
use crate::surface::{ChannelId, ChatSurface, MessageId};

const FOREIGN_PROMPT_MESSAGE: &str = "This prompt belongs to another member.";

fn timed_out_reply(correlation_id: &str) -> MessageTemplate {
    let error = VerificationError::PromptTimedOut.into_interface(correlation_id);
    blocks::interface_error_message(&error)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LandingSettings {
    pub channel_name: String,
    pub prompt_timeout: Duration,
}

impl Default for LandingSettings {
    fn default() -> Self {
        Self { channel_name: "verify-here".to_owned(), prompt_timeout: Duration::from_secs(300) }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LandingBootstrap {
    pub channel: ChannelId,
    pub message: MessageId,
    pub verified_role: String,
}

#[derive(Clone)]
pub struct LandingSurface {
    flow: Arc<dyn VerificationFlow>,
    surface: Arc<dyn ChatSurface>,
    provisioner: Arc<Provisioner>,
    prompts: PromptRegistry,
    settings: LandingSettings,
}

impl LandingSurface {
    pub fn new(
        flow: Arc<dyn VerificationFlow>,
        surface: Arc<dyn ChatSurface>,
        provisioner: Arc<Provisioner>,
        settings: LandingSettings,
    ) -> Self {
        Self { flow, surface, provisioner, prompts: PromptRegistry::default(), settings }
    }

    pub fn prompts(&self) -> &PromptRegistry {
        &self.prompts
    }

    /// Ensures the verified role and landing channel exist, clears earlier
    /// messages, then posts the landing message.
    pub async fn bootstrap(&self) -> Result<LandingBootstrap, EventHandlerError> {
        let role = self.provisioner.ensure_verified_role().await?;
        let channel = self.surface.ensure_landing_channel(&self.settings.channel_name).await?;
        let cleared = self.surface.clear_channel(&channel).await?;
        let message = self.surface.post_message(&channel, &blocks::landing_message()).await?;

        info!(
            event_name = "gateway.landing.bootstrapped",
            channel_id = %channel.0,
            message_id = %message.0,
            verified_role = %role.name,
            cleared,
            "landing channel ready"
        );
        Ok(LandingBootstrap { channel, message, verified_role: role.name })
    }

    /// Opens the modal for a landing button and starts waiting for the
    /// owner's answer. The returned task replies once the prompt resolves.
    pub async fn open_prompt(
        &self,
        event: &ButtonPressEvent,
    ) -> Result<Option<JoinHandle<PromptResolution>>, EventHandlerError> {
        let Some(kind) = PromptKind::from_action_id(&event.action_id) else {
            return Ok(None);
        };

        let user_id = UserId::from(event.user_id.as_str());
        let prompt = self.prompts.open(&user_id, kind);
        let modal = blocks::prompt_modal(kind, &prompt.id);
        if let Err(error) = self.surface.open_modal(&event.interaction, &modal).await {
            prompt.cancel();
            return Err(error.into());
        }

        info!(
            event_name = "gateway.landing.prompt_opened",
            user_id = %user_id,
            prompt_id = %prompt.id,
            action_id = %event.action_id,
            "verification prompt opened"
        );

        let landing = self.clone();
        let interaction = event.interaction.clone();
        let timeout = self.settings.prompt_timeout;
        Ok(Some(tokio::spawn(async move {
            let resolution = prompt.wait(timeout).await;
            landing.resolve(kind, &user_id, &interaction, &resolution).await;
            resolution
        })))
    }

    async fn resolve(
        &self,
        kind: PromptKind,
        user_id: &UserId,
        opened_by: &InteractionRef,
        resolution: &PromptResolution,
    ) {
        let (interaction, reply) = match resolution {
            PromptResolution::Submitted(submission) => {
                let ctx = RequestContext::new(user_id.clone(), submission.correlation_id.as_str());
                let reply = self.run_flow(kind, &ctx, &submission.value).await;
                (&submission.interaction, reply)
            }
            PromptResolution::TimedOut => {
                info!(
                    event_name = "gateway.landing.prompt_timed_out",
                    user_id = %user_id,
                    "verification prompt timed out"
                );
                (opened_by, timed_out_reply(&opened_by.id))
            }
            PromptResolution::Superseded => return,
        };

        if let Err(error) = self.surface.reply_ephemeral(interaction, &reply).await {
            warn!(
                event_name = "gateway.landing.reply_failed",
                user_id = %user_id,
                error = %error,
                "failed to reply to prompt"
            );
        }
    }

    async fn run_flow(&self, kind: PromptKind, ctx: &RequestContext, value: &str) -> MessageTemplate {
        match kind {
            PromptKind::Email => {
                email_reply(self.flow.submit_email(ctx, value).await, &ctx.correlation_id)
            }
            PromptKind::Code => {
                code_reply(self.flow.confirm_code(ctx, value).await, &ctx.correlation_id)
            }
        }
    }

    /// Hands a modal answer to the prompt waiting for it.
    pub fn accept_modal(
        &self,
        event: &ModalSubmissionEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let Some((kind, prompt_id)) = PromptKind::parse_modal_custom_id(&event.custom_id) else {
            return Err(EventHandlerError::MalformedPayload(format!(
                "unknown modal `{}`",
                event.custom_id
            )));
        };
        let Some(value) = event.values.get(kind.input_id()) else {
            return Err(EventHandlerError::MalformedPayload(format!(
                "modal `{}` is missing `{}`",
                event.custom_id,
                kind.input_id()
            )));
        };

        let submission = PromptSubmission {
            value: value.clone(),
            interaction: event.interaction.clone(),
            correlation_id: ctx.correlation_id.clone(),
        };
        match self.prompts.submit(prompt_id, &UserId::from(event.user_id.as_str()), submission) {
            Ok(()) => Ok(HandlerResult::Processed),
            Err(PromptError::ForeignUser { prompt_id }) => {
                warn!(
                    event_name = "gateway.landing.foreign_submission",
                    correlation_id = %ctx.correlation_id,
                    user_id = %event.user_id,
                    prompt_id = %prompt_id,
                    "prompt answered by another member"
                );
                Ok(HandlerResult::Responded(blocks::notice_message(FOREIGN_PROMPT_MESSAGE)))
            }
            Err(PromptError::NotPending(_)) => {
                Ok(HandlerResult::Responded(timed_out_reply(&ctx.correlation_id)))
            }
        }
    }

    /// Deletes member chatter from the landing channel.
    pub async fn moderate(
        &self,
        event: &ChannelMessageEvent,
    ) -> Result<HandlerResult, EventHandlerError> {
        if event.channel_name != self.settings.channel_name
            || event.author_is_admin
            || event.author_is_bot
        {
            return Ok(HandlerResult::Ignored);
        }

        self.surface
            .delete_message(&ChannelId(event.channel_id.clone()), &MessageId(event.message_id.clone()))
            .await?;
        info!(
            event_name = "gateway.landing.message_removed",
            channel_id = %event.channel_id,
            user_id = %event.author_id,
            "removed message from landing channel"
        );
        Ok(HandlerResult::Processed)
    }
}

pub struct ButtonHandler {
    landing: LandingSurface,
}

impl ButtonHandler {
    pub fn new(landing: LandingSurface) -> Self {
        Self { landing }
    }
}

#[async_trait]
impl EventHandler for ButtonHandler {
    fn event_type(&self) -> GatewayEventType {
        GatewayEventType::ButtonPressed
    }

    async fn handle(
        &self,
        envelope: &GatewayEnvelope,
        _ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let GatewayEvent::ButtonPressed(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        match self.landing.open_prompt(event).await? {
            Some(_waiter) => Ok(HandlerResult::Processed),
            None => Ok(HandlerResult::Ignored),
        }
    }
}

pub struct ModalHandler {
    landing: LandingSurface,
}

impl ModalHandler {
    pub fn new(landing: LandingSurface) -> Self {
        Self { landing }
    }
}

#[async_trait]
impl EventHandler for ModalHandler {
    fn event_type(&self) -> GatewayEventType {
        GatewayEventType::ModalSubmitted
    }

    async fn handle(
        &self,
        envelope: &GatewayEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let GatewayEvent::ModalSubmitted(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        self.landing.accept_modal(event, ctx)
    }
}

pub struct ModerationHandler {
    landing: LandingSurface,
}

impl ModerationHandler {
    pub fn new(landing: LandingSurface) -> Self {
        Self { landing }
    }
}

#[async_trait]
impl EventHandler for ModerationHandler {
    fn event_type(&self) -> GatewayEventType {
        GatewayEventType::ChannelMessage
    }

    async fn handle(
        &self,
        envelope: &GatewayEnvelope,
        _ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let GatewayEvent::ChannelMessage(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        self.landing.moderate(event).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use rostergate_core::audit::InMemoryAuditSink;
    use rostergate_core::domain::roster::RosterSheet;
    use rostergate_core::verification::memory::{
        InMemoryGuild, InMemoryVerificationStore, ManualClock, RecordingNotificationSink,
        SequenceCodeGenerator, StaticRosterSource,
    };
    use rostergate_core::verification::{
        Provisioner, VerificationPolicy, VerificationPorts, VerificationService,
    };

    use super::{LandingSettings, LandingSurface};
    use crate::events::{
        ButtonPressEvent, ChannelMessageEvent, EventContext, HandlerResult, InteractionRef,
        ModalSubmissionEvent,
    };
    use crate::prompts::PromptResolution;
    use crate::surface::{ChannelId, MessageId, RecordingChatSurface, SurfaceCall};

    struct Fixture {
        landing: LandingSurface,
        surface: RecordingChatSurface,
        guild: InMemoryGuild,
        sink: RecordingNotificationSink,
    }

    fn fixture() -> Fixture {
        let roster = RosterSheet::from_grid(vec![
            vec!["Email".into(), "First Name".into(), "Last Name".into(), "Marketing".into()],
            vec!["jane@example.com".into(), "Jane".into(), "Doe".into(), "x".into()],
        ]);
        let guild = InMemoryGuild::default();
        let sink = RecordingNotificationSink::default();
        let service = VerificationService::with_generator(
            VerificationPorts {
                roster: Arc::new(StaticRosterSource::new(roster)),
                store: Arc::new(InMemoryVerificationStore::default()),
                notifications: Arc::new(sink.clone()),
                guild: Arc::new(guild.clone()),
                audit: Arc::new(InMemoryAuditSink::default()),
                clock: Arc::new(ManualClock::new(
                    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().unwrap_or_default(),
                )),
            },
            VerificationPolicy::default(),
            Arc::new(SequenceCodeGenerator::new(["JaneCode0001"])),
        );
        let surface = RecordingChatSurface::default();
        let landing = LandingSurface::new(
            Arc::new(service),
            Arc::new(surface.clone()),
            Arc::new(Provisioner::new(Arc::new(guild.clone()), "Verified")),
            LandingSettings::default(),
        );
        Fixture { landing, surface, guild, sink }
    }

    fn press(user: &str, action_id: &str, interaction: &str) -> ButtonPressEvent {
        ButtonPressEvent {
            channel_id: "channel-verify-here".to_owned(),
            message_id: "message-1".to_owned(),
            user_id: user.to_owned(),
            action_id: action_id.to_owned(),
            interaction: InteractionRef::new(interaction, format!("tok-{interaction}")),
        }
    }

    fn answer(user: &str, custom_id: &str, input: &str, value: &str) -> ModalSubmissionEvent {
        ModalSubmissionEvent {
            user_id: user.to_owned(),
            custom_id: custom_id.to_owned(),
            values: BTreeMap::from([(input.to_owned(), value.to_owned())]),
            interaction: InteractionRef::new(format!("m-{user}"), "tok-modal"),
        }
    }

    fn modal_custom_id(surface: &RecordingChatSurface) -> String {
        surface
            .calls()
            .into_iter()
            .rev()
            .find_map(|call| match call {
                SurfaceCall::Modal { custom_id, .. } => Some(custom_id),
                _ => None,
            })
            .unwrap_or_default()
    }

    fn ctx() -> EventContext {
        EventContext { correlation_id: "env-1".to_owned() }
    }

    #[tokio::test]
    async fn bootstrap_creates_role_channel_and_landing_message() {
        let f = fixture();

        let bootstrap = f.landing.bootstrap().await.unwrap();

        assert_eq!(bootstrap.channel, ChannelId("channel-verify-here".to_owned()));
        assert_eq!(bootstrap.verified_role, "Verified");
        assert_eq!(f.guild.created_roles(), vec!["Verified"]);
        let calls = f.surface.calls();
        assert_eq!(calls[0], SurfaceCall::EnsureChannel("verify-here".to_owned()));
        assert_eq!(calls[1], SurfaceCall::Clear { channel: bootstrap.channel.clone(), removed: 0 });
        assert!(matches!(
            &calls[2],
            SurfaceCall::Post { text, .. } if text.contains("Verify Email")
        ));
    }

    #[tokio::test]
    async fn rerunning_bootstrap_leaves_one_landing_message() {
        let f = fixture();

        let first = f.landing.bootstrap().await.unwrap();
        let second = f.landing.bootstrap().await.unwrap();

        assert_eq!(f.surface.live_messages(&second.channel), vec![second.message.clone()]);
        assert!(f
            .surface
            .calls()
            .contains(&SurfaceCall::Clear { channel: first.channel, removed: 1 }));
        assert_eq!(f.guild.created_roles(), vec!["Verified"]);
    }

    #[tokio::test(start_paused = true)]
    async fn button_modal_round_trip_verifies_the_member() {
        let f = fixture();

        let waiter = f.landing.open_prompt(&press("U-jane", "verify-email", "i-1")).await.unwrap();
        let custom_id = modal_custom_id(&f.surface);
        assert!(custom_id.starts_with("email_modal:"));
        let accepted = f.landing.accept_modal(
            &answer("U-jane", &custom_id, "email_input", "jane@example.com"),
            &ctx(),
        );
        assert_eq!(accepted, Ok(HandlerResult::Processed));
        assert!(matches!(waiter.unwrap().await, Ok(PromptResolution::Submitted(_))));
        assert_eq!(f.sink.sent().len(), 1);

        let waiter = f.landing.open_prompt(&press("U-jane", "verify-code", "i-2")).await.unwrap();
        let custom_id = modal_custom_id(&f.surface);
        f.landing
            .accept_modal(&answer("U-jane", &custom_id, "code_input", " JaneCode0001 "), &ctx())
            .unwrap();
        assert!(waiter.unwrap().await.is_ok());

        assert_eq!(f.surface.replies(), vec!["Email sent!", "Verified successfully!"]);
        assert_eq!(f.guild.nickname(&"U-jane".into()).as_deref(), Some("Jane Doe"));
    }

    #[tokio::test(start_paused = true)]
    async fn another_member_cannot_answer_the_prompt() {
        let f = fixture();
        let _waiter = f.landing.open_prompt(&press("U-jane", "verify-email", "i-1")).await.unwrap();
        let custom_id = modal_custom_id(&f.surface);

        let result = f.landing.accept_modal(
            &answer("U-mallory", &custom_id, "email_input", "mallory@example.com"),
            &ctx(),
        );

        assert!(matches!(
            result,
            Ok(HandlerResult::Responded(ref message))
                if message.plain_text() == "This prompt belongs to another member."
        ));
        assert_eq!(f.landing.prompts().pending_count(), 1);
        assert!(f.sink.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_prompt_tells_the_member_it_timed_out() {
        let f = fixture();
        let waiter = f.landing.open_prompt(&press("U-jane", "verify-code", "i-9")).await.unwrap();

        let resolution = waiter.unwrap().await;

        assert!(matches!(resolution, Ok(PromptResolution::TimedOut)));
        assert_eq!(f.surface.replies(), vec!["This request has timed out. Please try again!"]);
        assert!(f.surface.calls().contains(&SurfaceCall::Reply {
            interaction_id: "i-9".to_owned(),
            text: "This request has timed out. Please try again!".to_owned(),
        }));
    }

    #[tokio::test]
    async fn unknown_buttons_and_malformed_modals_are_rejected() {
        let f = fixture();

        let unknown = f.landing.open_prompt(&press("U1", "something-else", "i-1")).await;
        assert!(unknown.unwrap().is_none());
        assert!(f
            .landing
            .accept_modal(&answer("U1", "survey_modal:1", "email_input", "x"), &ctx())
            .is_err());
    }

    #[tokio::test]
    async fn moderation_removes_member_messages_only() {
        let f = fixture();
        let message = |author_is_admin: bool, channel_name: &str| ChannelMessageEvent {
            channel_id: "C-landing".to_owned(),
            channel_name: channel_name.to_owned(),
            message_id: "M-1".to_owned(),
            author_id: "U1".to_owned(),
            author_is_admin,
            author_is_bot: false,
            text: "hello?".to_owned(),
        };

        let removed = f.landing.moderate(&message(false, "verify-here")).await;
        let from_admin = f.landing.moderate(&message(true, "verify-here")).await;
        let elsewhere = f.landing.moderate(&message(false, "general")).await;

        assert_eq!(removed, Ok(HandlerResult::Processed));
        assert_eq!(from_admin, Ok(HandlerResult::Ignored));
        assert_eq!(elsewhere, Ok(HandlerResult::Ignored));
        assert_eq!(
            f.surface.calls(),
            vec![SurfaceCall::Delete {
                channel: ChannelId("C-landing".to_owned()),
                message: MessageId("M-1".to_owned()),
            }]
        );
    }
}
