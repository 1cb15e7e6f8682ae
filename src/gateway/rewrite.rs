//! Body fixups applied before a request is forwarded upstream.
//!
//! Parsing is lenient: a body that is not a JSON object is forwarded exactly as
//! received and routed to the first backend.

use bytes::Bytes;
use serde_json::{Map, Value};

/// Legacy vision model that rejects requests without an explicit token limit.
pub const VISION_PREVIEW_MODEL: &str = "gpt-4-vision-preview";
pub const VISION_PREVIEW_MAX_TOKENS: u64 = 4000;

/// Context-size knob understood by Ollama-style backends; OpenAI rejects it.
const CONTEXT_SIZE_FIELD: &str = "num_ctx";
const MAX_TOKENS_FIELD: &str = "max_tokens";
const MODEL_FIELD: &str = "model";

#[derive(Clone, Debug, PartialEq)]
pub enum RewrittenBody {
    /// Parsed and re-serialized; `model` is the declared model, if any.
    Json { body: Bytes, model: Option<String> },
    /// Not a JSON object; forwarded untouched.
    Raw(Bytes),
}

impl RewrittenBody {
    pub fn into_body(self) -> Bytes {
        match self {
            Self::Json { body, .. } => body,
            Self::Raw(body) => body,
        }
    }
}

/// Chat-completion routing: keep `model`, patch known incompatibilities.
pub fn rewrite_chat_body(body: Bytes) -> RewrittenBody {
    rewrite_object(body, |object| {
        let model = object
            .get(MODEL_FIELD)
            .and_then(Value::as_str)
            .map(str::to_string);
        if model.as_deref() == Some(VISION_PREVIEW_MODEL) && !object.contains_key(MAX_TOKENS_FIELD)
        {
            object.insert(
                MAX_TOKENS_FIELD.to_string(),
                Value::from(VISION_PREVIEW_MAX_TOKENS),
            );
        }
        object.remove(CONTEXT_SIZE_FIELD);
        model
    })
}

/// Assistants routing: strip the chat-completion-only fields.
pub fn rewrite_assistants_body(body: Bytes) -> RewrittenBody {
    rewrite_object(body, |object| {
        object.remove(MODEL_FIELD);
        object.remove(MAX_TOKENS_FIELD);
        None
    })
}

fn rewrite_object(
    body: Bytes,
    patch: impl FnOnce(&mut Map<String, Value>) -> Option<String>,
) -> RewrittenBody {
    let mut object = match serde_json::from_slice::<Value>(&body) {
        Ok(Value::Object(object)) => object,
        Ok(_) => {
            tracing::warn!("request body is not a json object; forwarding unchanged");
            return RewrittenBody::Raw(body);
        }
        Err(err) => {
            if !body.is_empty() {
                tracing::warn!(error = %err, "request body is not json; forwarding unchanged");
            }
            return RewrittenBody::Raw(body);
        }
    };

    let model = patch(&mut object);
    match serde_json::to_vec(&Value::Object(object)) {
        Ok(serialized) => RewrittenBody::Json {
            body: Bytes::from(serialized),
            model,
        },
        Err(err) => {
            tracing::warn!(error = %err, "failed to re-serialize request body; forwarding unchanged");
            RewrittenBody::Raw(body)
        }
    }
}
