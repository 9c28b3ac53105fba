pub mod error;
pub mod requests;
pub mod responses;

#[cfg(test)]
mod tests;

pub use error::{ErrorCategory, Phase, Result, SendError, SendErrorKind, WaypointError};
pub use requests::{CorrelationId, LookupScope, ResolveQuery};
pub use responses::ResolveReply;
