// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the change event model.

#[cfg(test)]
mod tests {
    use crate::event::*;
    use crate::inventory::{AttributeValue, Scalar};

    #[test]
    fn test_parse_event_json() {
        let json = r#"{
            "commit_id": 42,
            "created": [{
                "object_id": 7,
                "servertype": "record",
                "hostname": "www.example.com",
                "attributes": {"domain": "example.com", "ttl": 300, "txt": ["a=1", "b=2"]}
            }],
            "changed": {
                "8": {
                    "intern_ip": {"action": "update", "old": "10.0.0.1", "new": null},
                    "records": {"action": "multi", "add": ["www.example.com"]}
                }
            },
            "deleted": [9]
        }"#;

        let event = ChangeEvent::from_json(json).expect("valid event");
        assert_eq!(event.commit_id, 42);
        assert!(!event.is_empty());

        let created = &event.created[0];
        assert_eq!(created.first_content("domain").as_deref(), Some("example.com"));
        assert_eq!(created.get("ttl"), Some(&AttributeValue::Single(Scalar::Integer(300))));
        assert_eq!(created.contents("txt"), vec!["a=1", "b=2"]);

        let changes = &event.changed[&8];
        assert_eq!(
            changes["intern_ip"],
            AttributeDiff::update(Some(Scalar::from("10.0.0.1")), None)
        );
        assert_eq!(
            changes["records"],
            AttributeDiff::multi(["www.example.com"], Vec::<String>::new())
        );
        assert!(event.deleted.contains(&9));
    }

    #[test]
    fn test_missing_sections_default_to_empty() {
        let event = ChangeEvent::from_json(r#"{"commit_id": 1}"#).unwrap();
        assert!(event.is_empty());
        assert_eq!(event, ChangeEvent::new(1));
    }

    #[test]
    fn test_unknown_action_rejected() {
        let json = r#"{"changed": {"1": {"mx": {"action": "replace"}}}}"#;
        assert!(ChangeEvent::from_json(json).is_err());
    }

    #[test]
    fn test_noop_diffs() {
        assert!(
            AttributeDiff::update(Some(Scalar::from(1_i64)), Some(Scalar::from(1_i64))).is_noop()
        );
        assert!(!AttributeDiff::update(None, Some(Scalar::from("x"))).is_noop());
        assert!(AttributeDiff::multi(Vec::<String>::new(), Vec::<String>::new()).is_noop());
        assert!(!AttributeDiff::multi(["a"], Vec::<String>::new()).is_noop());
    }

    #[test]
    fn test_serialize_diff_tags() {
        let diff = AttributeDiff::multi(["b"], ["a"]);
        let json = serde_json::to_value(&diff).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"action": "multi", "add": ["b"], "remove": ["a"]})
        );
    }
}
