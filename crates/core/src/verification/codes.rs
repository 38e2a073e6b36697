use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use tera::{Context, Tera};
use thiserror::Error;

use super::ports::{NotificationError, NotificationSink};

pub const CODE_LENGTH: usize = 12;
pub const DEFAULT_CODE_TTL_SECS: i64 = 24 * 60 * 60;
pub const DEFAULT_NOTICE_SUBJECT: &str = "Your Verification Code";
pub const DEFAULT_NOTICE_BODY: &str = "Your verification code is: {{ code }}";

pub trait CodeGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Draws `[A-Za-z0-9]` characters from the thread-local CSPRNG.
#[derive(Clone, Copy, Debug)]
pub struct AlphanumericCodeGenerator {
    length: usize,
}

impl AlphanumericCodeGenerator {
    pub fn new(length: usize) -> Self {
        Self { length: length.max(1) }
    }
}

impl Default for AlphanumericCodeGenerator {
    fn default() -> Self {
        Self::new(CODE_LENGTH)
    }
}

impl CodeGenerator for AlphanumericCodeGenerator {
    fn generate(&self) -> String {
        rand::thread_rng().sample_iter(&Alphanumeric).take(self.length).map(char::from).collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssuedCode {
    pub email: String,
    pub code: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Subject and body templates for the code email. Rendered with `email`,
/// `code` and `expires_at` in scope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NoticeTemplate {
    pub subject: String,
    pub body: String,
}

impl Default for NoticeTemplate {
    fn default() -> Self {
        Self { subject: DEFAULT_NOTICE_SUBJECT.to_owned(), body: DEFAULT_NOTICE_BODY.to_owned() }
    }
}

impl NoticeTemplate {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self { subject: subject.into(), body: body.into() }
    }

    pub fn render(&self, issued: &IssuedCode) -> Result<RenderedNotice, tera::Error> {
        let mut context = Context::new();
        context.insert("email", &issued.email);
        context.insert("code", &issued.code);
        context.insert("expires_at", &issued.expires_at.to_rfc3339());

        Ok(RenderedNotice {
            subject: Tera::one_off(&self.subject, &context, false)?,
            body: Tera::one_off(&self.body, &context, false)?,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedNotice {
    pub subject: String,
    pub body: String,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum IssueError {
    #[error("code lifetime of {ttl} from {issued_at} is past the representable range")]
    ExpiryOutOfRange { issued_at: DateTime<Utc>, ttl: Duration },
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("could not render verification notice: {0}")]
    Render(#[from] tera::Error),
    #[error(transparent)]
    Delivery(#[from] NotificationError),
}

pub struct CodeIssuer {
    generator: Arc<dyn CodeGenerator>,
    ttl: Duration,
    template: NoticeTemplate,
}

impl CodeIssuer {
    pub fn new(generator: Arc<dyn CodeGenerator>, ttl: Duration, template: NoticeTemplate) -> Self {
        Self { generator, ttl, template }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh code for `email`, valid for the configured window from `now`.
    pub fn issue_code(&self, email: &str, now: DateTime<Utc>) -> Result<IssuedCode, IssueError> {
        let expires_at = now
            .checked_add_signed(self.ttl)
            .ok_or(IssueError::ExpiryOutOfRange { issued_at: now, ttl: self.ttl })?;

        Ok(IssuedCode {
            email: email.to_owned(),
            code: self.generator.generate(),
            issued_at: now,
            expires_at,
        })
    }

    pub async fn dispatch(
        &self,
        sink: &dyn NotificationSink,
        issued: &IssuedCode,
    ) -> Result<(), DispatchError> {
        let notice = self.template.render(issued)?;
        sink.send(&issued.email, &notice.subject, &notice.body).await?;
        Ok(())
    }
}

impl Default for CodeIssuer {
    fn default() -> Self {
        Self::new(
            Arc::new(AlphanumericCodeGenerator::default()),
            Duration::seconds(DEFAULT_CODE_TTL_SECS),
            NoticeTemplate::default(),
        )
    }
}
