pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod verification;

pub use domain::roster::{FixedHeaders, RosterEntitlements, RosterRow, RosterSheet};
pub use domain::verification::{CodeSubmission, UserId, VerificationRecord, VerificationState};
pub use errors::{InterfaceError, VerificationError};
pub use verification::{
    EmailSubmission, RequestContext, VerificationOutcome, VerificationPolicy, VerificationPorts,
    VerificationService,
};
