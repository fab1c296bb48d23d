//! Liveness checks for stored coupons.

pub mod breaker;
pub mod check;
pub mod probe;
pub mod validator;

pub use breaker::{BreakerState, SourceBreaker};
pub use check::{CheckRegistry, ProbeOutcome, ValidityCheck};
pub use probe::{GenericProbe, MentionCheck, StudentPageCheck};
pub use validator::{ValidationReport, Validator, ValidatorConfig};
