//! Tests for the protocol module
//!
//! These tests verify registry message serialization, correlation id
//! generation, and error classification.

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::address::{HostPort, Location};
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn test_correlation_id_uniqueness() {
        let ids: HashSet<_> = (0..1000).map(|_| CorrelationId::generate()).collect();
        assert_eq!(ids.len(), 1000, "All correlation IDs should be unique");
    }

    #[test]
    fn test_correlation_id_display_is_hex() {
        let id = CorrelationId::from(255);
        assert_eq!(id.to_string(), "00000000000000ff");
    }

    #[test]
    fn test_resolve_query_derives_deployment_id() {
        let logical = HostPort::new("orders-service-7", 8080);
        let query = ResolveQuery::new(&logical, Location::new("cell-1"), CorrelationId::from(1));
        assert_eq!(query.deployment_id, "orders");
        assert_eq!(query.scope, LookupScope::Service);
        assert_eq!(query.logical(), logical);
    }

    #[test]
    fn test_resolve_query_wire_format() {
        let query = ResolveQuery::new(
            &HostPort::new("orders-service", 8080),
            Location::new("cell-1"),
            CorrelationId::from(7),
        )
        .with_scope(LookupScope::Instance);

        let value = serde_json::to_value(&query).unwrap();
        assert_eq!(
            value,
            json!({
                "host": "orders-service",
                "port": 8080,
                "deployment_id": "orders",
                "location": "cell-1",
                "correlation_id": 7
            })
        );
    }

    #[test]
    fn test_lookup_scope_paths() {
        assert_eq!(LookupScope::Service.path(), "/services/resolve");
        assert_eq!(LookupScope::Instance.path(), "/instances/resolve");
    }

    #[test]
    fn test_resolve_reply_address() {
        let reply = ResolveReply::new(&HostPort::new("10.0.0.6", 9000));
        assert_eq!(reply.address(), HostPort::new("10.0.0.6", 9000));
    }

    #[test]
    fn test_send_error_retriable_kinds() {
        assert!(SendError::timeout("10.0.0.5:9000").is_retriable());
        assert!(SendError::unreachable("10.0.0.5:9000", "no route to host").is_retriable());
        assert!(!SendError::new(SendErrorKind::Other, "10.0.0.5:9000", "bad header").is_retriable());
    }

    #[test]
    fn test_error_categories() {
        let retriable = WaypointError::Send(SendError::timeout("a:1"));
        assert_eq!(retriable.category(), ErrorCategory::RetriableNetwork);
        assert!(retriable.is_retriable());

        let other_send = WaypointError::Send(SendError::new(SendErrorKind::Other, "a:1", "x"));
        assert_eq!(other_send.category(), ErrorCategory::Other);

        let status = WaypointError::RegistryStatus {
            status: 500,
            address: HostPort::new("svc", 1),
            correlation_id: CorrelationId::from(1),
            elapsed_ms: 3,
        };
        assert_eq!(status.category(), ErrorCategory::Resolution);

        let duplicate = WaypointError::DuplicateMiddleware {
            id: "audit".to_string(),
            phase: Phase::BeforeResolution,
        };
        assert_eq!(duplicate.category(), ErrorCategory::Usage);

        let config = WaypointError::Configuration("missing fallback".to_string());
        assert_eq!(config.category(), ErrorCategory::Configuration);
    }

    #[test]
    fn test_library_errors_convert_to_their_variants() {
        let json: WaypointError = serde_json::from_str::<ResolveReply>("{").unwrap_err().into();
        assert!(matches!(json, WaypointError::JsonSerialization(_)));
        assert_eq!(json.category(), ErrorCategory::Other);

        let uri: WaypointError = "http://svc 1/".parse::<hyper::Uri>().unwrap_err().into();
        assert!(matches!(uri, WaypointError::MalformedDestination(_)));
        assert_eq!(uri.category(), ErrorCategory::Usage);
    }

    #[test]
    fn test_registry_status_error_message_carries_diagnostics() {
        let err = WaypointError::RegistryStatus {
            status: 502,
            address: HostPort::new("orders-service", 8080),
            correlation_id: CorrelationId::from(16),
            elapsed_ms: 42,
        };
        let msg = err.to_string();
        assert!(msg.contains("502"));
        assert!(msg.contains("orders-service:8080"));
        assert!(msg.contains("0000000000000010"));
        assert!(msg.contains("42ms"));
    }
}
