use rostergate_core::errors::InterfaceError;
use serde::Serialize;

use crate::prompts::PromptKind;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    Plain { text: String },
    Mrkdwn { text: String },
}

impl TextObject {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::Plain { text: text.into() }
    }

    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self::Mrkdwn { text: text.into() }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Plain { text } | Self::Mrkdwn { text } => text,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStyle {
    Primary,
    Secondary,
    Danger,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ButtonElement {
    pub action_id: String,
    pub text: TextObject,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<ButtonStyle>,
}

impl ButtonElement {
    pub fn new(action_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self { action_id: action_id.into(), text: TextObject::plain(label), style: None }
    }

    pub fn style(mut self, style: ButtonStyle) -> Self {
        self.style = Some(style);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Section { block_id: String, text: TextObject },
    Actions { block_id: String, elements: Vec<ButtonElement> },
    Context { block_id: String, elements: Vec<TextObject> },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    pub fallback_text: String,
    pub blocks: Vec<Block>,
}

impl MessageTemplate {
    /// Plain rendering of every text-bearing block, one per line.
    pub fn plain_text(&self) -> String {
        let lines: Vec<&str> = self
            .blocks
            .iter()
            .flat_map(|block| match block {
                Block::Section { text, .. } => vec![text.text()],
                Block::Context { elements, .. } => elements.iter().map(TextObject::text).collect(),
                Block::Actions { .. } => Vec::new(),
            })
            .collect();

        if lines.is_empty() {
            self.fallback_text.clone()
        } else {
            lines.join("\n")
        }
    }

    pub fn buttons(&self) -> impl Iterator<Item = &ButtonElement> {
        self.blocks.iter().flat_map(|block| match block {
            Block::Actions { elements, .. } => elements.as_slice(),
            _ => &[][..],
        })
    }
}

pub struct MessageBuilder {
    fallback_text: String,
    blocks: Vec<Block>,
}

impl MessageBuilder {
    pub fn new(fallback_text: impl Into<String>) -> Self {
        Self { fallback_text: fallback_text.into(), blocks: Vec::new() }
    }

    pub fn section<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut SectionBuilder),
    {
        let mut builder = SectionBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Section { block_id: block_id.into(), text: builder.build() });
        self
    }

    pub fn actions<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ActionsBuilder),
    {
        let mut builder = ActionsBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Actions { block_id: block_id.into(), elements: builder.build() });
        self
    }

    pub fn context<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ContextBuilder),
    {
        let mut builder = ContextBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Context { block_id: block_id.into(), elements: builder.build() });
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate { fallback_text: self.fallback_text, blocks: self.blocks }
    }
}

#[derive(Default)]
pub struct SectionBuilder {
    text: Option<TextObject>,
}

impl SectionBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> TextObject {
        self.text.unwrap_or_else(|| TextObject::plain(""))
    }
}

#[derive(Default)]
pub struct ActionsBuilder {
    elements: Vec<ButtonElement>,
}

impl ActionsBuilder {
    pub fn button(&mut self, button: ButtonElement) -> &mut Self {
        self.elements.push(button);
        self
    }

    fn build(self) -> Vec<ButtonElement> {
        self.elements
    }
}

#[derive(Default)]
pub struct ContextBuilder {
    elements: Vec<TextObject>,
}

impl ContextBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::plain(text));
        self
    }

    fn build(self) -> Vec<TextObject> {
        self.elements
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TextInput {
    pub custom_id: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u16>,
}

/// A single-page form shown in response to an interaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ModalTemplate {
    pub custom_id: String,
    pub title: String,
    pub inputs: Vec<TextInput>,
}

pub fn landing_message() -> MessageTemplate {
    MessageBuilder::new("Verify your membership to unlock the rest of the server.")
        .section("verification.landing.header.v1", |section| {
            section.mrkdwn("*Welcome!* Verify your membership to unlock the rest of the server.");
        })
        .section("verification.landing.steps.v1", |section| {
            section.plain(
                "1. Press Verify Email and enter the address you registered with.\n\
                 2. Press Verify Code and enter the code we emailed you.",
            );
        })
        .actions("verification.landing.actions.v1", |actions| {
            actions
                .button(
                    ButtonElement::new(PromptKind::Email.action_id(), "Verify Email")
                        .style(ButtonStyle::Primary),
                )
                .button(
                    ButtonElement::new(PromptKind::Code.action_id(), "Verify Code")
                        .style(ButtonStyle::Secondary),
                );
        })
        .build()
}

pub fn prompt_modal(kind: PromptKind, prompt_id: &str) -> ModalTemplate {
    let input = match kind {
        PromptKind::Email => TextInput {
            custom_id: kind.input_id().to_owned(),
            label: "Email address".to_owned(),
            placeholder: Some("you@example.com".to_owned()),
            required: true,
            min_length: Some(3),
            max_length: Some(254),
        },
        PromptKind::Code => TextInput {
            custom_id: kind.input_id().to_owned(),
            label: "Verification code".to_owned(),
            placeholder: Some("Code from your email".to_owned()),
            required: true,
            min_length: Some(1),
            max_length: Some(64),
        },
    };

    ModalTemplate {
        custom_id: kind.modal_custom_id(prompt_id),
        title: kind.title().to_owned(),
        inputs: vec![input],
    }
}

pub fn notice_message(text: &str) -> MessageTemplate {
    MessageBuilder::new(text.to_owned())
        .section("verification.notice.v1", |section| {
            section.plain(text.to_owned());
        })
        .build()
}

pub fn cooldown_message(remaining_secs: u64) -> MessageTemplate {
    notice_message(&format!(
        "You have to wait {remaining_secs} second(s) to use this command again."
    ))
}

pub fn error_message(summary: &str, correlation_id: &str) -> MessageTemplate {
    MessageBuilder::new(summary.to_owned())
        .section("verification.error.summary.v1", |section| {
            section.mrkdwn(format!(":warning: {summary}"));
        })
        .context("verification.error.context.v1", |context| {
            context.plain(format!("Correlation ID: {correlation_id}"));
        })
        .build()
}

/// User-correctable errors read as plain notices; the rest carry a correlation id.
pub fn interface_error_message(error: &InterfaceError) -> MessageTemplate {
    match error {
        InterfaceError::BadRequest { message, .. } => notice_message(message),
        InterfaceError::ServiceUnavailable { .. } | InterfaceError::Internal { .. } => {
            error_message(error.user_message(), error.correlation_id())
        }
    }
}

pub fn help_message() -> MessageTemplate {
    MessageBuilder::new("Verification command help")
        .section("verification.help.summary.v1", |section| {
            section.mrkdwn(
                "*Available commands*\n• `/verify email <address>`\n• `/verify code <code>`\n• `/verify help`",
            );
        })
        .build()
}

#[cfg(test)]
mod tests {
    use rostergate_core::errors::VerificationError;

    use super::{
        cooldown_message, error_message, interface_error_message, landing_message, prompt_modal,
        Block, ButtonStyle,
    };
    use crate::prompts::PromptKind;

    #[test]
    fn landing_message_offers_both_verification_buttons() {
        let message = landing_message();
        let buttons: Vec<(&str, Option<ButtonStyle>)> =
            message.buttons().map(|button| (button.action_id.as_str(), button.style)).collect();

        assert_eq!(
            buttons,
            vec![
                ("verify-email", Some(ButtonStyle::Primary)),
                ("verify-code", Some(ButtonStyle::Secondary))
            ]
        );
        assert!(message.plain_text().contains("Verify Code"));
    }

    #[test]
    fn modal_ids_carry_the_prompt_id() {
        let modal = prompt_modal(PromptKind::Code, "p-123");

        assert_eq!(modal.custom_id, "code_modal:p-123");
        assert_eq!(modal.inputs.len(), 1);
        assert_eq!(modal.inputs[0].custom_id, "code_input");
    }

    #[test]
    fn error_message_includes_correlation_context() {
        let message = error_message("Something failed", "req-7");

        assert!(matches!(
            message.blocks.last(),
            Some(Block::Context { elements, .. }) if elements.len() == 1
        ));
        assert!(message.plain_text().ends_with("Correlation ID: req-7"));
    }

    #[test]
    fn only_upstream_failures_expose_a_correlation_id() {
        let rejected = interface_error_message(
            &VerificationError::InvalidOrExpiredCode.into_interface("req-8"),
        );
        let unavailable = interface_error_message(
            &VerificationError::DeliveryFailed {
                email: "jane@example.com".to_owned(),
                reason: "relay returned 502".to_owned(),
            }
            .into_interface("req-9"),
        );

        assert_eq!(rejected.plain_text(), "Invalid or expired code!");
        assert_eq!(
            unavailable.fallback_text,
            "An error occurred while sending the verification email. Please try again!"
        );
        assert!(unavailable.plain_text().ends_with("Correlation ID: req-9"));
    }

    #[test]
    fn cooldown_message_reports_whole_seconds() {
        assert_eq!(
            cooldown_message(4).fallback_text,
            "You have to wait 4 second(s) to use this command again."
        );
    }

    #[test]
    fn serialized_blocks_use_tagged_shape() {
        let json = serde_json::to_value(landing_message()).unwrap_or_default();

        assert_eq!(json["blocks"][0]["type"], "section");
        assert_eq!(json["blocks"][2]["elements"][0]["action_id"], "verify-email");
    }
}
