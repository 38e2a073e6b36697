use std::collections::BTreeMap;
use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use rostergate_core::verification::ports::GuildError;

use crate::{
    blocks::MessageTemplate,
    commands::{CommandParseError, SlashCommandHandler, SlashCommandPayload, VerificationFlow},
    landing::{ButtonHandler, LandingSurface, ModalHandler, ModerationHandler},
    surface::SurfaceError,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayEnvelope {
    pub envelope_id: String,
    pub event: GatewayEvent,
}

/// Handle needed to answer an interaction (reply or open a modal).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionRef {
    pub id: String,
    pub token: String,
    /// Needed for follow-ups once the interaction has been acknowledged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_id: Option<String>,
}

impl InteractionRef {
    pub fn new(id: impl Into<String>, token: impl Into<String>) -> Self {
        Self { id: id.into(), token: token.into(), application_id: None }
    }

    pub fn with_application(mut self, application_id: impl Into<String>) -> Self {
        self.application_id = Some(application_id.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEvent {
    SlashCommand(SlashCommandPayload),
    ButtonPressed(ButtonPressEvent),
    ModalSubmitted(ModalSubmissionEvent),
    ChannelMessage(ChannelMessageEvent),
    Unsupported { event_type: String },
}

impl GatewayEvent {
    pub fn event_type(&self) -> GatewayEventType {
        match self {
            Self::SlashCommand(_) => GatewayEventType::SlashCommand,
            Self::ButtonPressed(_) => GatewayEventType::ButtonPressed,
            Self::ModalSubmitted(_) => GatewayEventType::ModalSubmitted,
            Self::ChannelMessage(_) => GatewayEventType::ChannelMessage,
            Self::Unsupported { .. } => GatewayEventType::Unsupported,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::SlashCommand(payload) => Some(&payload.user_id),
            Self::ButtonPressed(event) => Some(&event.user_id),
            Self::ModalSubmitted(event) => Some(&event.user_id),
            Self::ChannelMessage(event) => Some(&event.author_id),
            Self::Unsupported { .. } => None,
        }
    }

    pub fn interaction(&self) -> Option<&InteractionRef> {
        match self {
            Self::SlashCommand(payload) => Some(&payload.interaction),
            Self::ButtonPressed(event) => Some(&event.interaction),
            Self::ModalSubmitted(event) => Some(&event.interaction),
            Self::ChannelMessage(_) | Self::Unsupported { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum GatewayEventType {
    SlashCommand,
    ButtonPressed,
    ModalSubmitted,
    ChannelMessage,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonPressEvent {
    pub channel_id: String,
    pub message_id: String,
    pub user_id: String,
    pub action_id: String,
    pub interaction: InteractionRef,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModalSubmissionEvent {
    pub user_id: String,
    pub custom_id: String,
    #[serde(default)]
    pub values: BTreeMap<String, String>,
    pub interaction: InteractionRef,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMessageEvent {
    pub channel_id: String,
    pub channel_name: String,
    pub message_id: String,
    pub author_id: String,
    #[serde(default)]
    pub author_is_admin: bool,
    #[serde(default)]
    pub author_is_bot: bool,
    #[serde(default)]
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Responded(MessageTemplate),
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error(transparent)]
    Parse(#[from] CommandParseError),
    #[error(transparent)]
    Surface(#[from] SurfaceError),
    #[error(transparent)]
    Guild(#[from] GuildError),
    #[error("malformed interaction payload: {0}")]
    MalformedPayload(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> GatewayEventType;
    async fn handle(
        &self,
        envelope: &GatewayEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<GatewayEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &GatewayEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// Registers the slash command, landing button, modal and moderation handlers.
pub fn verification_dispatcher<F>(
    commands: SlashCommandHandler<F>,
    landing: &LandingSurface,
) -> EventDispatcher
where
    F: VerificationFlow + ?Sized + 'static,
{
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(commands);
    dispatcher.register(ButtonHandler::new(landing.clone()));
    dispatcher.register(ModalHandler::new(landing.clone()));
    dispatcher.register(ModerationHandler::new(landing.clone()));
    dispatcher
}
