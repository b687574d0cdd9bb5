//! Backend response classification.
//!
//! The executor turns captured body bytes into an MCP content chunk based on
//! the backend's content type: textual types become `text` chunks annotated
//! with the original mime type, images and audio become base64 chunks, and
//! anything else is an unsupported-media error. `resources/read` uses the
//! same classification but falls back to a base64 blob for binary types.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use mime::Mime;

use crate::errors::{GatewayError, Result};
use crate::mcp::protocol::ContentBlock;

/// `_meta` key carrying the backend mime type on text chunks.
pub const MIME_META_KEY: &str = "gram-mime-type";

/// Structured syntax suffixes treated as text even under `application/...`.
const TEXT_SUFFIXES: &[&str] = &["json", "xml", "yaml", "yml", "csv", "toml"];

/// Whether a content type carries a textual payload.
pub fn is_textual(mime: &Mime) -> bool {
    if mime.type_() == mime::TEXT {
        return true;
    }
    if mime.subtype() == mime::JSON || mime.subtype() == "yaml" || mime.subtype() == "yml" {
        return true;
    }
    if mime.subtype() == mime::XML {
        return true;
    }
    mime.suffix().map(|s| TEXT_SUFFIXES.contains(&s.as_str())).unwrap_or(false)
}

/// Classify a captured body into an MCP content chunk.
pub fn classify(content_type: &str, body: &Bytes) -> Result<ContentBlock> {
    let mime: Mime = content_type
        .parse()
        .map_err(|_| GatewayError::unsupported_media(content_type))?;

    if is_textual(&mime) {
        let text = String::from_utf8_lossy(body).into_owned();
        let mut block = ContentBlock::text(text);
        block.set_meta(MIME_META_KEY, serde_json::Value::String(essence(&mime)));
        return Ok(block);
    }

    if mime.type_() == mime::IMAGE {
        return Ok(ContentBlock::Image {
            data: BASE64.encode(body),
            mime_type: essence(&mime),
            meta: None,
        });
    }

    if mime.type_() == mime::AUDIO {
        return Ok(ContentBlock::Audio {
            data: BASE64.encode(body),
            mime_type: essence(&mime),
            meta: None,
        });
    }

    Err(GatewayError::unsupported_media(content_type))
}

/// Resource payload split into text or base64 blob.
pub enum ResourcePayload {
    Text(String),
    Blob(String),
}

/// Classify a resource body. Textual types yield text; everything else is
/// carried as a base64 blob rather than rejected.
pub fn classify_resource(content_type: &str, body: &Bytes) -> Result<ResourcePayload> {
    let mime: Mime = content_type
        .parse()
        .map_err(|_| GatewayError::unsupported_media(content_type))?;

    if is_textual(&mime) {
        Ok(ResourcePayload::Text(String::from_utf8_lossy(body).into_owned()))
    } else {
        Ok(ResourcePayload::Blob(BASE64.encode(body)))
    }
}

/// The mime type without parameters (`text/plain; charset=utf-8` → `text/plain`).
fn essence(mime: &Mime) -> String {
    mime.essence_str().to_string()
}
