use thiserror::Error;

use crate::domain::verification::UserId;

pub const UNEXPECTED_ERROR_MESSAGE: &str = "An unexpected error has occurred. Please try again!";
pub const PROMPT_TIMEOUT_MESSAGE: &str = "This request has timed out. Please try again!";

/// Failures of the email/code workflow. Partial provisioning is not one of
/// them; it travels on the success value as a `ProvisioningReport`.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum VerificationError {
    #[error("`{email}` is not a well-formed email address")]
    InvalidEmailFormat { email: String },
    #[error("`{email}` does not appear on the roster")]
    EmailNotFound { email: String },
    #[error("no pending verification for user `{user_id}`")]
    NoPendingVerification { user_id: UserId },
    #[error("submitted verification code is invalid or expired")]
    InvalidOrExpiredCode,
    #[error("roster entry for `{email}` disappeared before provisioning")]
    RosterEntryMissing { email: String },
    #[error("verification email to `{email}` could not be delivered: {reason}")]
    DeliveryFailed { email: String, reason: String },
    #[error("interactive prompt timed out")]
    PromptTimedOut,
    #[error("upstream dependency unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("verification is misconfigured: {0}")]
    Misconfigured(String),
}

impl VerificationError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidEmailFormat { .. } => "Invalid email format!",
            Self::EmailNotFound { .. } => "Email not found!",
            Self::NoPendingVerification { .. } => {
                "No pending verification found. Submit your email first!"
            }
            Self::InvalidOrExpiredCode => "Invalid or expired code!",
            Self::RosterEntryMissing { .. } => {
                "Your email is no longer on the roster. Please contact an organizer."
            }
            Self::DeliveryFailed { .. } => {
                "An error occurred while sending the verification email. Please try again!"
            }
            Self::PromptTimedOut => PROMPT_TIMEOUT_MESSAGE,
            Self::UpstreamUnavailable(_) => {
                "Verification is temporarily unavailable. Please try again shortly."
            }
            Self::Misconfigured(_) => UNEXPECTED_ERROR_MESSAGE,
        }
    }

    /// Stable label for logs and audit metadata.
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::InvalidEmailFormat { .. } => "invalid_email_format",
            Self::EmailNotFound { .. } => "email_not_found",
            Self::NoPendingVerification { .. } => "no_pending_verification",
            Self::InvalidOrExpiredCode => "invalid_or_expired_code",
            Self::RosterEntryMissing { .. } => "roster_entry_missing",
            Self::DeliveryFailed { .. } => "delivery_failed",
            Self::PromptTimedOut => "prompt_timed_out",
            Self::UpstreamUnavailable(_) => "upstream_unavailable",
            Self::Misconfigured(_) => "misconfigured",
        }
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let message = self.user_message().to_owned();
        match self {
            Self::DeliveryFailed { .. } | Self::UpstreamUnavailable(_) => {
                InterfaceError::ServiceUnavailable { message, correlation_id }
            }
            Self::Misconfigured(_) => InterfaceError::Internal { message, correlation_id },
            _ => InterfaceError::BadRequest { message, correlation_id },
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn internal(message: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), correlation_id: correlation_id.into() }
    }

    /// Text safe to show in chat. Internal details never leave the process.
    pub fn user_message(&self) -> &str {
        match self {
            Self::BadRequest { message, .. } | Self::ServiceUnavailable { message, .. } => message,
            Self::Internal { .. } => UNEXPECTED_ERROR_MESSAGE,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}
