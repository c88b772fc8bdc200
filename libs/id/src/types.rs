//! Typed id definitions.
//!
//! Each id type has a unique prefix so ids stay distinguishable in logs and
//! on the wire.

use crate::define_id;

define_id!(
    /// A live component instance. Stable while the instance is mounted; never
    /// trusted across process restarts (snapshots match by name instead).
    ComponentId,
    "cmp"
);

define_id!(
    /// An event handler registered in an instance's handler table.
    HandlerId,
    "evh"
);

define_id!(
    /// One client connection (one WebSocket).
    ConnectionId,
    "conn"
);

define_id!(
    /// A persisted CSS collaborator state, referenced by reconnecting clients.
    CssStateId,
    "css"
);

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_component_id_roundtrip() {
        let id = ComponentId::new();
        let parsed: ComponentId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!(id.to_string().starts_with("cmp_"));
    }

    #[test]
    fn test_handler_id_rejects_component_prefix() {
        let id = ComponentId::new().to_string();
        let result: Result<HandlerId, _> = id.parse();
        assert!(matches!(
            result.unwrap_err(),
            crate::IdError::InvalidPrefix { expected: "evh", .. }
        ));
    }

    #[test]
    fn test_missing_separator() {
        let result: Result<ComponentId, _> = "cmp01HV4Z2WQXKJNM8GPQY6VBKC3D".parse();
        assert!(matches!(result.unwrap_err(), crate::IdError::MissingSeparator));
    }

    #[test]
    fn test_empty() {
        let result: Result<ConnectionId, _> = "".parse();
        assert!(result.unwrap_err().is_empty());
    }

    #[test]
    fn test_invalid_ulid() {
        let result: Result<CssStateId, _> = "css_invalid".parse();
        assert!(matches!(result.unwrap_err(), crate::IdError::InvalidUlid(_)));
    }

    #[test]
    fn test_json_is_plain_string() {
        let id = HandlerId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        let parsed: HandlerId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_ids_are_never_reused() {
        let ids: std::collections::HashSet<_> = (0..1000).map(|_| ComponentId::new()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_all_prefixes_unique() {
        let prefixes = [
            ComponentId::PREFIX,
            HandlerId::PREFIX,
            ConnectionId::PREFIX,
            CssStateId::PREFIX,
        ];
        let unique: std::collections::HashSet<_> = prefixes.iter().collect();
        assert_eq!(prefixes.len(), unique.len(), "Duplicate ID prefixes found!");
    }

    proptest! {
        #[test]
        fn prop_garbage_never_parses_as_component_id(s in "[a-z]{0,6}[^_]*") {
            prop_assume!(!s.starts_with("cmp_"));
            prop_assert!(s.parse::<ComponentId>().is_err());
        }
    }
}
