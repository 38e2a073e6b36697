//! Discord REST adapter for guild provisioning and chat replies.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use rostergate_core::config::GatewayConfig;
use rostergate_core::domain::verification::UserId;
use rostergate_core::verification::ports::{GuildError, GuildGateway, GuildRole, RoleId};
use rostergate_gateway::blocks::{ButtonStyle, MessageTemplate, ModalTemplate};
use rostergate_gateway::events::InteractionRef;
use rostergate_gateway::surface::{ChannelId, ChatSurface, MessageId, SurfaceError};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

const EPHEMERAL_FLAG: u64 = 1 << 6;
const CHANNEL_MESSAGE_WITH_SOURCE: u8 = 4;
const MODAL: u8 = 9;
const GUILD_TEXT: u8 = 0;
const ROLE_OVERWRITE: u8 = 0;
const SEND_MESSAGES: u64 = 1 << 11;
const MESSAGE_PAGE: usize = 100;

#[derive(Debug, Error)]
pub enum DiscordError {
    #[error("discord returned {status}: {detail}")]
    Status { status: StatusCode, detail: String },
    #[error("discord request failed: {0}")]
    Transport(String),
    #[error("discord response could not be decoded: {0}")]
    Decode(String),
}

impl DiscordError {
    fn into_guild_error(self, user_id: Option<&UserId>) -> GuildError {
        match (&self, user_id) {
            (Self::Status { status, .. }, _) if *status == StatusCode::FORBIDDEN => {
                GuildError::PermissionDenied(self.to_string())
            }
            (Self::Status { status, .. }, Some(user_id)) if *status == StatusCode::NOT_FOUND => {
                GuildError::UnknownMember(user_id.clone())
            }
            _ => GuildError::Request(self.to_string()),
        }
    }

    fn into_surface_error(self) -> SurfaceError {
        match &self {
            Self::Status { status, .. }
                if *status == StatusCode::NOT_FOUND || *status == StatusCode::BAD_REQUEST =>
            {
                SurfaceError::InteractionExpired(self.to_string())
            }
            Self::Status { .. } => SurfaceError::Rejected(self.to_string()),
            Self::Transport(_) | Self::Decode(_) => SurfaceError::Transport(self.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RolePayload {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct MemberPayload {
    #[serde(default)]
    roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ChannelPayload {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type")]
    kind: u8,
}

#[derive(Debug, Deserialize)]
struct CreatedMessage {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ListedMessage {
    id: String,
}

/// Snowflakes grow with creation time; unparsable ids sort last.
fn snowflake_order(id: &str) -> (u64, &str) {
    (id.parse().unwrap_or(u64::MAX), id)
}

fn oldest_named(roles: Vec<RolePayload>, name: &str) -> Option<RolePayload> {
    roles
        .into_iter()
        .filter(|role| role.name == name)
        .min_by(|a, b| snowflake_order(&a.id).cmp(&snowflake_order(&b.id)))
}

pub struct DiscordRest {
    client: Client,
    base_url: String,
    bot_token: SecretString,
    guild_id: String,
}

impl DiscordRest {
    pub fn from_config(config: &GatewayConfig) -> Result<Self, DiscordError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|error| DiscordError::Transport(error.to_string()))?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
            guild_id: config.guild_id.clone(),
        })
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Option<Value>, DiscordError> {
        let url = format!("{}{path}", self.base_url);
        let mut request = self
            .client
            .request(method.clone(), &url)
            .header("Authorization", format!("Bot {}", self.bot_token.expose_secret()));
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response =
            request.send().await.map_err(|error| DiscordError::Transport(error.to_string()))?;
        let status = response.status();
        debug!(event_name = "gateway.discord.request", method = %method, path, status = %status);

        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(DiscordError::Status { status, detail });
        }
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let text = response.text().await.map_err(|error| DiscordError::Decode(error.to_string()))?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&text).map(Some).map_err(|error| DiscordError::Decode(error.to_string()))
    }

    async fn call_json<T>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, DiscordError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let value = self
            .call(method, path, body)
            .await?
            .ok_or_else(|| DiscordError::Decode(format!("empty response from {path}")))?;
        serde_json::from_value(value).map_err(|error| DiscordError::Decode(error.to_string()))
    }

    async fn list_roles(&self) -> Result<Vec<RolePayload>, DiscordError> {
        self.call_json(Method::GET, &format!("/guilds/{}/roles", self.guild_id), None).await
    }
}

#[async_trait]
impl GuildGateway for DiscordRest {
    async fn find_role(&self, name: &str) -> Result<Option<GuildRole>, GuildError> {
        let roles = self.list_roles().await.map_err(|error| error.into_guild_error(None))?;
        Ok(oldest_named(roles, name).map(|role| GuildRole { id: RoleId(role.id), name: role.name }))
    }

    /// Discord accepts duplicate names, so after creating, the oldest role
    /// with this name wins and a younger copy of ours is removed again.
    async fn create_role(&self, name: &str) -> Result<GuildRole, GuildError> {
        let created: RolePayload = self
            .call_json(
                Method::POST,
                &format!("/guilds/{}/roles", self.guild_id),
                Some(json!({ "name": name })),
            )
            .await
            .map_err(|error| error.into_guild_error(None))?;

        let roles = self.list_roles().await.map_err(|error| error.into_guild_error(None))?;
        let oldest = oldest_named(roles, name);
        match oldest {
            Some(oldest) if oldest.id != created.id => {
                let path = format!("/guilds/{}/roles/{}", self.guild_id, created.id);
                if let Err(error) = self.call(Method::DELETE, &path, None).await {
                    warn!(
                        event_name = "gateway.discord.duplicate_role_cleanup_failed",
                        role = name,
                        role_id = %created.id,
                        error = %error,
                        "could not remove duplicate role"
                    );
                }
                Err(GuildError::DuplicateRole(name.to_owned()))
            }
            _ => Ok(GuildRole { id: RoleId(created.id), name: created.name }),
        }
    }

    async fn member_has_role(&self, user_id: &UserId, role: &RoleId) -> Result<bool, GuildError> {
        let member: MemberPayload = self
            .call_json(Method::GET, &format!("/guilds/{}/members/{user_id}", self.guild_id), None)
            .await
            .map_err(|error| error.into_guild_error(Some(user_id)))?;
        Ok(member.roles.iter().any(|id| id == &role.0))
    }

    async fn grant_role(&self, user_id: &UserId, role: &RoleId) -> Result<(), GuildError> {
        self.call(
            Method::PUT,
            &format!("/guilds/{}/members/{user_id}/roles/{}", self.guild_id, role.0),
            None,
        )
        .await
        .map(|_| ())
        .map_err(|error| error.into_guild_error(Some(user_id)))
    }

    async fn set_nickname(&self, user_id: &UserId, nickname: &str) -> Result<(), GuildError> {
        self.call(
            Method::PATCH,
            &format!("/guilds/{}/members/{user_id}", self.guild_id),
            Some(json!({ "nick": nickname })),
        )
        .await
        .map(|_| ())
        .map_err(|error| error.into_guild_error(Some(user_id)))
    }
}

#[async_trait]
impl ChatSurface for DiscordRest {
    async fn ensure_landing_channel(&self, name: &str) -> Result<ChannelId, SurfaceError> {
        let path = format!("/guilds/{}/channels", self.guild_id);
        let channels: Vec<ChannelPayload> = self
            .call_json(Method::GET, &path, None)
            .await
            .map_err(DiscordError::into_surface_error)?;
        if let Some(existing) = channels
            .into_iter()
            .find(|channel| channel.kind == GUILD_TEXT && channel.name.as_deref() == Some(name))
        {
            return Ok(ChannelId(existing.id));
        }

        // The @everyone role shares the guild id.
        let body = json!({
            "name": name,
            "type": GUILD_TEXT,
            "permission_overwrites": [{
                "id": self.guild_id,
                "type": ROLE_OVERWRITE,
                "allow": "0",
                "deny": SEND_MESSAGES.to_string(),
            }],
        });
        let created: ChannelPayload = self
            .call_json(Method::POST, &path, Some(body))
            .await
            .map_err(DiscordError::into_surface_error)?;
        Ok(ChannelId(created.id))
    }

    async fn post_message(
        &self,
        channel: &ChannelId,
        message: &MessageTemplate,
    ) -> Result<MessageId, SurfaceError> {
        let created: CreatedMessage = self
            .call_json(
                Method::POST,
                &format!("/channels/{}/messages", channel.0),
                Some(message_payload(message)),
            )
            .await
            .map_err(DiscordError::into_surface_error)?;
        Ok(MessageId(created.id))
    }

    async fn reply_ephemeral(
        &self,
        interaction: &InteractionRef,
        message: &MessageTemplate,
    ) -> Result<(), SurfaceError> {
        let mut data = message_payload(message);
        data["flags"] = json!(EPHEMERAL_FLAG);
        let callback = self
            .call(
                Method::POST,
                &format!("/interactions/{}/{}/callback", interaction.id, interaction.token),
                Some(json!({ "type": CHANNEL_MESSAGE_WITH_SOURCE, "data": data.clone() })),
            )
            .await;

        match (callback, &interaction.application_id) {
            (Ok(_), _) => Ok(()),
            // Already acknowledged (a modal was opened with it): send a follow-up instead.
            (Err(DiscordError::Status { status, .. }), Some(application_id))
                if status == StatusCode::BAD_REQUEST =>
            {
                self.call(
                    Method::POST,
                    &format!("/webhooks/{application_id}/{}", interaction.token),
                    Some(data),
                )
                .await
                .map(|_| ())
                .map_err(DiscordError::into_surface_error)
            }
            (Err(error), _) => Err(error.into_surface_error()),
        }
    }

    async fn open_modal(
        &self,
        interaction: &InteractionRef,
        modal: &ModalTemplate,
    ) -> Result<(), SurfaceError> {
        self.call(
            Method::POST,
            &format!("/interactions/{}/{}/callback", interaction.id, interaction.token),
            Some(json!({ "type": MODAL, "data": modal_payload(modal) })),
        )
        .await
        .map(|_| ())
        .map_err(DiscordError::into_surface_error)
    }

    async fn delete_message(
        &self,
        channel: &ChannelId,
        message: &MessageId,
    ) -> Result<(), SurfaceError> {
        self.call(Method::DELETE, &format!("/channels/{}/messages/{}", channel.0, message.0), None)
            .await
            .map(|_| ())
            .map_err(DiscordError::into_surface_error)
    }

    async fn clear_channel(&self, channel: &ChannelId) -> Result<usize, SurfaceError> {
        let path = format!("/channels/{}/messages?limit={MESSAGE_PAGE}", channel.0);
        let mut removed = 0;
        loop {
            let page: Vec<ListedMessage> = self
                .call_json(Method::GET, &path, None)
                .await
                .map_err(DiscordError::into_surface_error)?;
            let last_page = page.len() < MESSAGE_PAGE;
            for message in page {
                self.delete_message(channel, &MessageId(message.id)).await?;
                removed += 1;
            }
            if last_page {
                return Ok(removed);
            }
        }
    }
}

/// Text content plus one action row per button block.
pub fn message_payload(message: &MessageTemplate) -> Value {
    let buttons: Vec<Value> = message
        .buttons()
        .map(|button| {
            json!({
                "type": 2,
                "style": button_style(button.style),
                "label": button.text.text(),
                "custom_id": button.action_id,
            })
        })
        .collect();

    let components =
        if buttons.is_empty() { Vec::new() } else { vec![json!({ "type": 1, "components": buttons })] };
    json!({ "content": message.plain_text(), "components": components })
}

pub fn modal_payload(modal: &ModalTemplate) -> Value {
    let rows: Vec<Value> = modal
        .inputs
        .iter()
        .map(|input| {
            let mut field = json!({
                "type": 4,
                "style": 1,
                "custom_id": input.custom_id,
                "label": input.label,
                "required": input.required,
            });
            if let Some(placeholder) = &input.placeholder {
                field["placeholder"] = json!(placeholder);
            }
            if let Some(min_length) = input.min_length {
                field["min_length"] = json!(min_length);
            }
            if let Some(max_length) = input.max_length {
                field["max_length"] = json!(max_length);
            }
            json!({ "type": 1, "components": [field] })
        })
        .collect();

    json!({ "custom_id": modal.custom_id, "title": modal.title, "components": rows })
}

fn button_style(style: Option<ButtonStyle>) -> u8 {
    match style {
        Some(ButtonStyle::Primary) => 1,
        Some(ButtonStyle::Secondary) | None => 2,
        Some(ButtonStyle::Danger) => 4,
    }
}
