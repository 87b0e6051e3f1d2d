//! Public types for the Morpho API.

mod identity;
mod input;
mod kind;
mod outcome;
mod request;

pub use identity::{Requester, Tier};
pub use input::MediaInput;
pub use kind::{MediaClass, TransformationKind};
pub use outcome::{AttemptOutcome, ProviderAttempt, ResultLocation, TransformationOutcome};
pub use request::{TransformParams, TransformationRequest};
