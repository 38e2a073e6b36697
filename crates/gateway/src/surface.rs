//! Outbound chat operations the gateway needs from the platform.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use thiserror::Error;

use crate::blocks::{MessageTemplate, ModalTemplate};
use crate::events::InteractionRef;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChannelId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub String);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    #[error("chat platform rejected the request: {0}")]
    Rejected(String),
    #[error("chat platform request failed: {0}")]
    Transport(String),
    #[error("interaction `{0}` has already been answered or expired")]
    InteractionExpired(String),
}

#[async_trait]
pub trait ChatSurface: Send + Sync {
    /// Returns the landing channel, creating it when the guild lacks one.
    async fn ensure_landing_channel(&self, name: &str) -> Result<ChannelId, SurfaceError>;
    async fn post_message(
        &self,
        channel: &ChannelId,
        message: &MessageTemplate,
    ) -> Result<MessageId, SurfaceError>;
    async fn reply_ephemeral(
        &self,
        interaction: &InteractionRef,
        message: &MessageTemplate,
    ) -> Result<(), SurfaceError>;
    async fn open_modal(
        &self,
        interaction: &InteractionRef,
        modal: &ModalTemplate,
    ) -> Result<(), SurfaceError>;
    async fn delete_message(
        &self,
        channel: &ChannelId,
        message: &MessageId,
    ) -> Result<(), SurfaceError>;
    /// Deletes the channel's existing messages and returns how many went.
    async fn clear_channel(&self, channel: &ChannelId) -> Result<usize, SurfaceError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SurfaceCall {
    EnsureChannel(String),
    Post { channel: ChannelId, text: String },
    Reply { interaction_id: String, text: String },
    Modal { interaction_id: String, custom_id: String },
    Delete { channel: ChannelId, message: MessageId },
    Clear { channel: ChannelId, removed: usize },
}

#[derive(Default)]
struct Recorded {
    calls: Vec<SurfaceCall>,
    live: Vec<(ChannelId, MessageId)>,
}

/// Records every call; used by handler and runner tests.
#[derive(Clone, Default)]
pub struct RecordingChatSurface {
    recorded: Arc<Mutex<Recorded>>,
}

impl RecordingChatSurface {
    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.lock().calls.clone()
    }

    /// Messages posted to `channel` and not deleted since.
    pub fn live_messages(&self, channel: &ChannelId) -> Vec<MessageId> {
        self.lock()
            .live
            .iter()
            .filter(|(posted_in, _)| posted_in == channel)
            .map(|(_, message)| message.clone())
            .collect()
    }

    pub fn replies(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                SurfaceCall::Reply { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Recorded> {
        match self.recorded.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl ChatSurface for RecordingChatSurface {
    async fn ensure_landing_channel(&self, name: &str) -> Result<ChannelId, SurfaceError> {
        self.lock().calls.push(SurfaceCall::EnsureChannel(name.to_owned()));
        Ok(ChannelId(format!("channel-{name}")))
    }

    async fn post_message(
        &self,
        channel: &ChannelId,
        message: &MessageTemplate,
    ) -> Result<MessageId, SurfaceError> {
        let mut recorded = self.lock();
        let text = message.plain_text();
        recorded.calls.push(SurfaceCall::Post { channel: channel.clone(), text });
        let id = MessageId(format!("message-{}", recorded.calls.len()));
        recorded.live.push((channel.clone(), id.clone()));
        Ok(id)
    }

    async fn reply_ephemeral(
        &self,
        interaction: &InteractionRef,
        message: &MessageTemplate,
    ) -> Result<(), SurfaceError> {
        self.lock().calls.push(SurfaceCall::Reply {
            interaction_id: interaction.id.clone(),
            text: message.plain_text(),
        });
        Ok(())
    }

    async fn open_modal(
        &self,
        interaction: &InteractionRef,
        modal: &ModalTemplate,
    ) -> Result<(), SurfaceError> {
        self.lock().calls.push(SurfaceCall::Modal {
            interaction_id: interaction.id.clone(),
            custom_id: modal.custom_id.clone(),
        });
        Ok(())
    }

    async fn delete_message(
        &self,
        channel: &ChannelId,
        message: &MessageId,
    ) -> Result<(), SurfaceError> {
        let mut recorded = self.lock();
        recorded.live.retain(|(posted_in, posted)| !(posted_in == channel && posted == message));
        recorded
            .calls
            .push(SurfaceCall::Delete { channel: channel.clone(), message: message.clone() });
        Ok(())
    }

    async fn clear_channel(&self, channel: &ChannelId) -> Result<usize, SurfaceError> {
        let mut recorded = self.lock();
        let before = recorded.live.len();
        recorded.live.retain(|(posted_in, _)| posted_in != channel);
        let removed = before - recorded.live.len();
        recorded.calls.push(SurfaceCall::Clear { channel: channel.clone(), removed });
        Ok(removed)
    }
}
