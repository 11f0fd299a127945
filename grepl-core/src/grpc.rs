//! # Dynamic gRPC transport
//!
//! The call dispatcher talks to servers through the [`DynamicTransport`]
//! trait: four operations matching the four gRPC streaming modes, all
//! exchanging `prost_reflect::DynamicMessage` values. The shipped
//! implementation is [`GrpcClient`], a thin wrapper over `tonic` with a codec
//! that encodes and decodes dynamic messages directly, so no generated stubs
//! are involved.
//!
//! Keeping the trait small makes the transport swappable: tests drive the
//! dispatcher with an in-memory implementation, and alternative framings
//! (such as gRPC-Web) can slot in without touching the call orchestration.

pub mod client;
pub mod codec;

pub use client::GrpcClient;

use futures_util::stream::BoxStream;
use prost_reflect::{DynamicMessage, MethodDescriptor};
use tonic::metadata::MetadataMap;
use tonic::metadata::errors::{InvalidMetadataKey, InvalidMetadataValue};

use crate::BoxError;

/// Ordered request messages for a client-streaming or bidi call.
pub type RequestStream = BoxStream<'static, DynamicMessage>;

/// Response stream of a server-streaming or bidi call.
pub type ResponseStream = BoxStream<'static, Result<DynamicMessage, tonic::Status>>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport was not ready: '{0}'")]
    NotReady(#[source] BoxError),

    #[error("invalid metadata (header) key '{key}': '{source}'")]
    InvalidMetadataKey {
        key: String,
        source: InvalidMetadataKey,
    },

    #[error("invalid metadata (header) value for key '{key}': '{source}'")]
    InvalidMetadataValue {
        key: String,
        source: InvalidMetadataValue,
    },

    #[error("rpc failed: '{0}'")]
    Status(#[from] tonic::Status),
}

/// A single response together with the metadata received around it.
#[derive(Debug)]
pub struct UnaryReply {
    pub headers: MetadataMap,
    pub message: DynamicMessage,
    pub trailers: MetadataMap,
}

/// A streaming response: headers received up front, then messages in server
/// order.
pub struct ReplyStream {
    pub headers: MetadataMap,
    pub messages: ResponseStream,
}

/// The opaque connection the call dispatcher invokes.
///
/// Headers are passed as flat `(key, value)` pairs; repeated keys become
/// repeated metadata entries.
#[tonic::async_trait]
pub trait DynamicTransport: Send {
    async fn unary(
        &mut self,
        method: &MethodDescriptor,
        request: DynamicMessage,
        headers: Vec<(String, String)>,
    ) -> Result<UnaryReply, TransportError>;

    async fn server_streaming(
        &mut self,
        method: &MethodDescriptor,
        request: DynamicMessage,
        headers: Vec<(String, String)>,
    ) -> Result<ReplyStream, TransportError>;

    async fn client_streaming(
        &mut self,
        method: &MethodDescriptor,
        requests: RequestStream,
        headers: Vec<(String, String)>,
    ) -> Result<UnaryReply, TransportError>;

    async fn bidi_streaming(
        &mut self,
        method: &MethodDescriptor,
        requests: RequestStream,
        headers: Vec<(String, String)>,
    ) -> Result<ReplyStream, TransportError>;
}
