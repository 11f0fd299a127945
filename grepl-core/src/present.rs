//! Response presentation.
//!
//! Responses are rendered as pretty-printed JSON. The enriched presenter
//! additionally shows the metadata received around the body: headers up
//! front and, where the transport surfaces them, trailers.

use prost_reflect::DynamicMessage;
use serde_json::json;
use tonic::metadata::{KeyAndValueRef, MetadataMap};

use crate::grpc::UnaryReply;
use crate::session::PresentFormat;

#[derive(Debug, Clone, Copy)]
pub struct Presenter {
    format: PresentFormat,
}

impl Presenter {
    pub fn new(format: PresentFormat) -> Self {
        Self { format }
    }

    /// Renders one response body.
    pub fn message(&self, message: &DynamicMessage) -> String {
        let value = serde_json::to_value(message).unwrap_or(serde_json::Value::Null);
        serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
    }

    /// Renders a unary reply: body only, or body wrapped with the received
    /// headers and trailers when enriched.
    pub fn unary(&self, reply: &UnaryReply) -> String {
        match self.format {
            PresentFormat::Plain => self.message(&reply.message),
            PresentFormat::Enriched => {
                let body =
                    serde_json::to_value(&reply.message).unwrap_or(serde_json::Value::Null);
                let value = json!({
                    "headers": metadata_json(&reply.headers),
                    "message": body,
                    "trailers": metadata_json(&reply.trailers),
                });
                serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
            }
        }
    }

    /// Renders the headers received at the start of a streaming response.
    /// Returns `None` unless enriched.
    pub fn stream_headers(&self, headers: &MetadataMap) -> Option<String> {
        match self.format {
            PresentFormat::Plain => None,
            PresentFormat::Enriched => {
                let value = json!({ "headers": metadata_json(headers) });
                Some(serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string()))
            }
        }
    }
}

fn metadata_json(metadata: &MetadataMap) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for entry in metadata.iter() {
        let (key, value) = match entry {
            KeyAndValueRef::Ascii(k, v) => (
                k.as_str().to_string(),
                v.to_str().unwrap_or("<invalid>").to_string(),
            ),
            KeyAndValueRef::Binary(k, v) => (k.as_str().to_string(), format!("{v:?}")),
        };
        let entry = map
            .entry(key)
            .or_insert_with(|| serde_json::Value::Array(Vec::new()));
        if let Some(list) = entry.as_array_mut() {
            list.push(serde_json::Value::String(value));
        }
    }
    serde_json::Value::Object(map)
}
