//! Property maps and the export-to-import transform.

use serde_json::Value;

use crate::constants::*;

/// Service and endpoint properties, JSON valued so they travel unchanged.
pub type Properties = serde_json::Map<String, Value>;

/// Reads a property that may hold a single string or a list of strings.
/// Non-string list items are skipped.
pub fn string_list(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::String(s) => Some(vec![s.clone()]),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
        ),
        _ => None,
    }
}

/// Turns the properties of an exported endpoint into the properties seen by
/// the importing side.
///
/// Export-only keys are renamed or dropped, `service.imported` is set and the
/// origin framework is recorded. Applying it twice gives the same map.
pub fn to_import_properties(framework_uid: &str, mut properties: Properties) -> Properties {
    properties.insert(SERVICE_IMPORTED.to_string(), Value::Bool(true));

    if let Some(configs) = properties.remove(SERVICE_EXPORTED_CONFIGS) {
        properties.insert(SERVICE_IMPORTED_CONFIGS.to_string(), configs);
    }

    properties.remove(SERVICE_EXPORTED_INTENTS);
    properties.remove(SERVICE_EXPORTED_INTENTS_EXTRA);
    properties.remove(SERVICE_EXPORTED_INTERFACES);

    properties.insert(
        PROP_FRAMEWORK_UID.to_string(),
        Value::String(framework_uid.to_string()),
    );
    properties
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn exported() -> Properties {
        json!({
            "objectClass": ["Foo"],
            "service.id": 12,
            "service.exported.configs": ["jsonrpc"],
            "service.exported.interfaces": "*",
            "service.exported.intents": ["confidentiality"],
            "service.exported.intents.extra": ["x"],
            "custom": "kept",
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn transform_renames_and_drops() {
        let props = to_import_properties("fw-a", exported());

        assert_eq!(props[SERVICE_IMPORTED], json!(true));
        assert_eq!(props[SERVICE_IMPORTED_CONFIGS], json!(["jsonrpc"]));
        assert_eq!(props[PROP_FRAMEWORK_UID], json!("fw-a"));
        assert_eq!(props["custom"], json!("kept"));
        assert!(!props.contains_key(SERVICE_EXPORTED_CONFIGS));
        assert!(!props.contains_key(SERVICE_EXPORTED_INTERFACES));
        assert!(!props.contains_key(SERVICE_EXPORTED_INTENTS));
        assert!(!props.contains_key(SERVICE_EXPORTED_INTENTS_EXTRA));
    }

    #[test]
    fn transform_is_idempotent() {
        let once = to_import_properties("fw-a", exported());
        let twice = to_import_properties("fw-a", once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn transform_handles_empty_map() {
        let props = to_import_properties("fw-b", Properties::new());
        assert_eq!(props.len(), 2);
        assert!(!props.contains_key(SERVICE_IMPORTED_CONFIGS));
    }

    #[test]
    fn string_list_accepts_single_and_many() {
        assert_eq!(string_list(&json!("a")), Some(vec!["a".to_string()]));
        assert_eq!(
            string_list(&json!(["a", 1, "b"])),
            Some(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(string_list(&json!(3)), None);
    }
}
