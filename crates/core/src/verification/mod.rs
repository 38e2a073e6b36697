//! Email submission, one-time code confirmation and provisioning.

pub mod codes;
pub mod memory;
pub mod ports;
pub mod provisioning;
pub mod service;

use regex::Regex;

pub use codes::{CodeIssuer, IssuedCode, NoticeTemplate};
pub use ports::{Clock, GuildGateway, NotificationSink, RosterSource, VerificationStore};
pub use provisioning::{ProvisioningReport, ProvisioningStep, Provisioner, StepOutcome};
pub use service::{
    EmailSubmission, RequestContext, VerificationOutcome, VerificationPolicy, VerificationPorts,
    VerificationService,
};

const EMAIL_PATTERN: &str = r"^[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}$";

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Checks an already normalized address.
pub fn is_valid_email(email: &str) -> bool {
    Regex::new(EMAIL_PATTERN).is_ok_and(|pattern| pattern.is_match(email))
}

#[cfg(test)]
mod tests {
    use super::{is_valid_email, normalize_email};

    #[test]
    fn normalization_trims_and_lowercases() {
        assert_eq!(normalize_email("  Jane.Doe@Example.COM \n"), "jane.doe@example.com");
    }

    #[test]
    fn validation_accepts_common_shapes() {
        for email in ["jane@example.com", "j.doe+club@mail.example.org", "a_b%c@x-y.io"] {
            assert!(is_valid_email(email), "{email} should be accepted");
        }
    }

    #[test]
    fn validation_rejects_malformed_addresses() {
        for email in ["", "jane", "jane@", "@example.com", "jane@example", "jane@example.c", "ja ne@x.com"] {
            assert!(!is_valid_email(email), "{email} should be rejected");
        }
    }
}
