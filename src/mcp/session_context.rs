//! Session context extraction.
//!
//! Tool-call arguments may carry `x-gram-session` and `x-gram-messages`
//! fields (or their underscore normalizations). The extractor pulls them
//! out, validates the session id, generates a fresh one when absent, and
//! strips both fields so backends never see them. The resulting session id
//! is echoed in the `Mcp-Session-Id` response header and in
//! `_meta.x-gram-session` on every content chunk.

use serde_json::Value;
use uuid::Uuid;

use crate::domain::MessageRole;
use crate::mcp::protocol::ToolCallResult;

/// Argument key carrying the session id.
pub const SESSION_ARG_KEY: &str = "x-gram-session";
/// Underscore normalization some clients produce.
pub const SESSION_ARG_KEY_UNDERSCORE: &str = "x_gram_session";
/// Argument key carrying prior conversation messages.
pub const MESSAGES_ARG_KEY: &str = "x-gram-messages";
/// Underscore normalization of the messages key.
pub const MESSAGES_ARG_KEY_UNDERSCORE: &str = "x_gram_messages";
/// `_meta` key used when echoing the session id into content chunks.
pub const SESSION_META_KEY: &str = "x-gram-session";
/// HTTP header used as session fallback and echo.
pub const MCP_SESSION_ID_HEADER: &str = "mcp-session-id";

/// An inline conversation message lifted from tool-call arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    pub role: MessageRole,
    pub content: String,
}

/// Per-call session context.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: Uuid,
    /// True when no usable session id arrived and a fresh one was generated
    pub is_new_session: bool,
    pub messages: Vec<IncomingMessage>,
}

impl SessionContext {
    /// Extract and strip session fields from a tool-call `arguments` payload.
    ///
    /// `header_session` is the `Mcp-Session-Id` request header, used as a
    /// fallback when the arguments carry no session field.
    pub fn extract(arguments: &mut Value, header_session: Option<&str>) -> Self {
        let inline_session = take_string_field(arguments, SESSION_ARG_KEY)
            .or_else(|| take_string_field(arguments, SESSION_ARG_KEY_UNDERSCORE));

        let messages_value = take_field(arguments, MESSAGES_ARG_KEY)
            .or_else(|| take_field(arguments, MESSAGES_ARG_KEY_UNDERSCORE));

        let candidate = inline_session.or_else(|| header_session.map(|s| s.to_string()));

        let (session_id, is_new_session) = match candidate.as_deref().map(Uuid::parse_str) {
            Some(Ok(id)) => (id, false),
            _ => (Uuid::new_v4(), true),
        };

        let messages = messages_value.map(parse_messages).unwrap_or_default();

        Self { session_id, is_new_session, messages }
    }

    /// Inject this session id into `_meta` of every content chunk.
    ///
    /// Idempotent: re-injecting the same id changes nothing.
    pub fn inject_into_result(&self, result: &mut ToolCallResult) {
        let id = Value::String(self.session_id.to_string());
        for block in &mut result.content {
            block.set_meta(SESSION_META_KEY, id.clone());
        }
    }
}

fn take_field(arguments: &mut Value, key: &str) -> Option<Value> {
    arguments.as_object_mut()?.remove(key)
}

fn take_string_field(arguments: &mut Value, key: &str) -> Option<String> {
    match take_field(arguments, key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        _ => None,
    }
}

/// Parse an ordered message sequence, discarding entries missing either
/// field or with a role outside `{user, assistant}`.
fn parse_messages(value: Value) -> Vec<IncomingMessage> {
    let Value::Array(entries) = value else {
        return Vec::new();
    };

    entries
        .into_iter()
        .filter_map(|entry| {
            let obj = entry.as_object()?;
            let role = obj.get("role")?.as_str()?;
            let content = obj.get("content")?.as_str()?;
            let role = match role {
                "user" => MessageRole::User,
                "assistant" => MessageRole::Assistant,
                _ => return None,
            };
            if content.is_empty() {
                return None;
            }
            Some(IncomingMessage { role, content: content.to_string() })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::protocol::ContentBlock;
    use serde_json::json;

    #[test]
    fn test_extract_valid_session_id() {
        let id = Uuid::new_v4();
        let mut args = json!({"location": "SF", "x-gram-session": id.to_string()});

        let ctx = SessionContext::extract(&mut args, None);
        assert_eq!(ctx.session_id, id);
        assert!(!ctx.is_new_session);
    }

    #[test]
    fn test_extract_underscore_variant() {
        let id = Uuid::new_v4();
        let mut args = json!({"x_gram_session": id.to_string()});

        let ctx = SessionContext::extract(&mut args, None);
        assert_eq!(ctx.session_id, id);
        assert!(!ctx.is_new_session);
    }

    #[test]
    fn test_extract_generates_id_when_absent() {
        let mut args = json!({"location": "SF"});
        let ctx = SessionContext::extract(&mut args, None);
        assert!(ctx.is_new_session);
    }

    #[test]
    fn test_extract_invalid_uuid_generates_fresh() {
        let mut args = json!({"x-gram-session": "not-a-uuid"});
        let ctx = SessionContext::extract(&mut args, None);
        assert!(ctx.is_new_session);
    }

    #[test]
    fn test_header_fallback() {
        let id = Uuid::new_v4();
        let mut args = json!({"location": "SF"});
        let ctx = SessionContext::extract(&mut args, Some(&id.to_string()));
        assert_eq!(ctx.session_id, id);
        assert!(!ctx.is_new_session);
    }

    #[test]
    fn test_inline_session_wins_over_header() {
        let inline = Uuid::new_v4();
        let header = Uuid::new_v4();
        let mut args = json!({"x-gram-session": inline.to_string()});
        let ctx = SessionContext::extract(&mut args, Some(&header.to_string()));
        assert_eq!(ctx.session_id, inline);
    }

    #[test]
    fn test_session_fields_are_stripped() {
        let mut args = json!({
            "location": "SF",
            "x-gram-session": Uuid::new_v4().to_string(),
            "x-gram-messages": [{"role": "user", "content": "hi"}]
        });
        let _ = SessionContext::extract(&mut args, None);

        let obj = args.as_object().unwrap();
        assert!(!obj.contains_key(SESSION_ARG_KEY));
        assert!(!obj.contains_key(MESSAGES_ARG_KEY));
        assert!(obj.contains_key("location"));
    }

    #[test]
    fn test_underscore_fields_are_stripped() {
        let mut args = json!({
            "x_gram_session": Uuid::new_v4().to_string(),
            "x_gram_messages": [{"role": "user", "content": "hi"}]
        });
        let ctx = SessionContext::extract(&mut args, None);
        assert_eq!(ctx.messages.len(), 1);
        assert!(args.as_object().unwrap().is_empty());
    }

    #[test]
    fn test_messages_filter_bad_entries() {
        let mut args = json!({
            "x-gram-messages": [
                {"role": "user", "content": "first"},
                {"role": "system", "content": "dropped"},
                {"role": "assistant"},
                {"content": "no role"},
                {"role": "assistant", "content": "second"},
                "not-an-object"
            ]
        });
        let ctx = SessionContext::extract(&mut args, None);
        assert_eq!(
            ctx.messages,
            vec![
                IncomingMessage { role: MessageRole::User, content: "first".to_string() },
                IncomingMessage { role: MessageRole::Assistant, content: "second".to_string() },
            ]
        );
    }

    #[test]
    fn test_inject_into_result_all_chunks() {
        let mut args = json!({});
        let ctx = SessionContext::extract(&mut args, None);

        let mut result = ToolCallResult {
            content: vec![ContentBlock::text("a"), ContentBlock::text("b")],
            is_error: None,
        };
        ctx.inject_into_result(&mut result);

        for block in &result.content {
            let meta = block.meta().unwrap();
            assert_eq!(meta[SESSION_META_KEY], json!(ctx.session_id.to_string()));
        }
    }

    #[test]
    fn test_inject_is_idempotent() {
        let mut args = json!({});
        let ctx = SessionContext::extract(&mut args, None);

        let mut result = ToolCallResult { content: vec![ContentBlock::text("a")], is_error: None };
        ctx.inject_into_result(&mut result);
        let first = serde_json::to_value(&result).unwrap();
        ctx.inject_into_result(&mut result);
        let second = serde_json::to_value(&result).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_non_object_arguments_pass_through() {
        let mut args = json!("just a string");
        let ctx = SessionContext::extract(&mut args, None);
        assert!(ctx.is_new_session);
        assert_eq!(args, json!("just a string"));
    }
}
