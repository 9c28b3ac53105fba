use serde::{Deserialize, Serialize};

use crate::address::HostPort;

/// Body of a successful registry lookup.
///
/// # Example
///
/// ```
/// use waypoint_common::protocol::ResolveReply;
///
/// let reply: ResolveReply = serde_json::from_str(r#"{"host":"10.0.0.5","port":9000}"#).unwrap();
/// assert_eq!(reply.address().to_string(), "10.0.0.5:9000");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveReply {
    pub host: String,
    pub port: u16,
}

impl ResolveReply {
    pub fn new(address: &HostPort) -> Self {
        Self {
            host: address.host.clone(),
            port: address.port,
        }
    }

    pub fn address(&self) -> HostPort {
        HostPort::new(self.host.clone(), self.port)
    }
}
