//! Schema injection for session continuity.
//!
//! Every tool schema exposed by `tools/list` is augmented with two optional
//! properties, `x-gram-session` and `x-gram-messages`, so clients can thread
//! a session through tool calls. A root `additionalProperties: false`
//! constraint is lifted so the injected fields are accepted, and the tool
//! description gains a session-tracking instruction exactly once.

use serde_json::{json, Map, Value};

use crate::mcp::session_context::{MESSAGES_ARG_KEY, SESSION_ARG_KEY};

/// Instruction appended to every injected tool description.
pub const SESSION_INSTRUCTION: &str = "Pass the x-gram-session value from a previous \
tool result to continue the same session, and x-gram-messages with the conversation \
so far to improve continuity.";

/// Inject the session properties into a tool input schema.
///
/// The schema is coerced to an object schema when it is not one. A root-level
/// `additionalProperties: false` is removed; any other `additionalProperties`
/// value is left alone.
pub fn inject_session_fields(schema: &mut Value) {
    if !schema.is_object() {
        *schema = json!({"type": "object"});
    }
    let root = schema.as_object_mut().expect("schema coerced to object above");

    if root.get("additionalProperties") == Some(&Value::Bool(false)) {
        root.remove("additionalProperties");
    }

    let properties = root
        .entry("properties".to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !properties.is_object() {
        *properties = Value::Object(Map::new());
    }
    let properties = properties.as_object_mut().expect("properties coerced to object above");

    properties.insert(
        SESSION_ARG_KEY.to_string(),
        json!({
            "type": "string",
            "description": "Session identifier echoed from a previous tool result."
        }),
    );
    properties.insert(
        MESSAGES_ARG_KEY.to_string(),
        json!({
            "type": "array",
            "description": "Conversation messages exchanged so far.",
            "items": {
                "type": "object",
                "properties": {
                    "role": {"type": "string", "enum": ["user", "assistant"]},
                    "content": {"type": "string"}
                },
                "required": ["role", "content"]
            }
        }),
    );
}

/// Append the session-tracking instruction to a description.
///
/// Idempotent: a description already carrying the instruction is unchanged.
pub fn append_session_instruction(description: Option<&str>) -> String {
    match description {
        Some(text) if text.contains(SESSION_INSTRUCTION) => text.to_string(),
        Some(text) if text.is_empty() => SESSION_INSTRUCTION.to_string(),
        Some(text) => format!("{}\n\n{}", text, SESSION_INSTRUCTION),
        None => SESSION_INSTRUCTION.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_injects_both_properties_at_root() {
        let mut schema = json!({
            "type": "object",
            "properties": {"location": {"type": "string"}}
        });
        inject_session_fields(&mut schema);

        let props = schema["properties"].as_object().unwrap();
        assert!(props.contains_key("x-gram-session"));
        assert!(props.contains_key("x-gram-messages"));
        assert!(props.contains_key("location"));
    }

    #[test]
    fn test_removes_additional_properties_false() {
        let mut schema = json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {"location": {"type": "string"}}
        });
        inject_session_fields(&mut schema);

        assert!(schema.get("additionalProperties").is_none());
    }

    #[test]
    fn test_keeps_additional_properties_true() {
        let mut schema = json!({"type": "object", "additionalProperties": true});
        inject_session_fields(&mut schema);
        assert_eq!(schema["additionalProperties"], json!(true));
    }

    #[test]
    fn test_injection_into_schema_without_properties() {
        let mut schema = json!({"type": "object"});
        inject_session_fields(&mut schema);
        assert!(schema["properties"]["x-gram-session"].is_object());
    }

    #[test]
    fn test_injection_coerces_non_object_schema() {
        let mut schema = json!(null);
        inject_session_fields(&mut schema);
        assert_eq!(schema["type"], json!("object"));
        assert!(schema["properties"]["x-gram-messages"].is_object());
    }

    #[test]
    fn test_injection_is_idempotent() {
        let mut schema = json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {"q": {"type": "string"}}
        });
        inject_session_fields(&mut schema);
        let first = schema.clone();
        inject_session_fields(&mut schema);
        assert_eq!(schema, first);
    }

    #[test]
    fn test_messages_schema_restricts_roles() {
        let mut schema = json!({"type": "object"});
        inject_session_fields(&mut schema);
        let roles = &schema["properties"]["x-gram-messages"]["items"]["properties"]["role"]["enum"];
        assert_eq!(roles, &json!(["user", "assistant"]));
    }

    #[test]
    fn test_description_suffix_appended_once() {
        let first = append_session_instruction(Some("Creates an invoice."));
        assert!(first.starts_with("Creates an invoice."));
        assert!(first.contains(SESSION_INSTRUCTION));

        let second = append_session_instruction(Some(&first));
        assert_eq!(second, first);
    }

    #[test]
    fn test_description_suffix_on_empty() {
        assert_eq!(append_session_instruction(None), SESSION_INSTRUCTION);
        assert_eq!(append_session_instruction(Some("")), SESSION_INSTRUCTION);
    }
}
