//! The `tonic`-backed implementation of [`DynamicTransport`].
//!
//! ## How it works
//!
//! The client wraps `tonic::client::Grpc` and the
//! [`super::codec::DynamicCodec`]: it constructs the HTTP/2 path
//! (`/package.Service/Method`) from the method descriptor at runtime, turns
//! the header pairs into Tonic metadata, and lets the codec handle
//! serialization. It is generic over any [`tonic::client::GrpcService`], so
//! the same code drives a real `Channel` or an in-process service.

use super::codec::DynamicCodec;
use super::{DynamicTransport, ReplyStream, RequestStream, TransportError, UnaryReply};
use crate::BoxError;
use futures_util::StreamExt;
use http_body::Body as HttpBody;
use prost_reflect::{DynamicMessage, MethodDescriptor};
use std::str::FromStr;
use tonic::{
    client::GrpcService,
    metadata::{MetadataKey, MetadataMap, MetadataValue},
    transport::Channel,
};

/// A dynamic gRPC client for any method a descriptor can name.
pub struct GrpcClient<S = Channel> {
    client: tonic::client::Grpc<S>,
}

impl<S> GrpcClient<S>
where
    S: GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    pub fn new(service: S) -> Self {
        let client = tonic::client::Grpc::new(service);
        Self { client }
    }

    async fn ready(&mut self) -> Result<(), TransportError> {
        self.client
            .ready()
            .await
            .map_err(|e| TransportError::NotReady(e.into()))
    }
}

#[tonic::async_trait]
impl<S> DynamicTransport for GrpcClient<S>
where
    S: GrpcService<tonic::body::Body> + Send,
    S::Error: Into<BoxError>,
    S::Future: Send,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    async fn unary(
        &mut self,
        method: &MethodDescriptor,
        request: DynamicMessage,
        headers: Vec<(String, String)>,
    ) -> Result<UnaryReply, TransportError> {
        self.ready().await?;

        let codec = DynamicCodec::new(method.input(), method.output());
        let path = http_path(method);
        let request = build_request(request, headers)?;

        let response = self.client.unary(request, path, codec).await?;
        let (headers, message, _) = response.into_parts();
        Ok(UnaryReply {
            headers,
            message,
            // Trailers of a successful unary call are consumed by tonic
            // while it resolves the gRPC status.
            trailers: MetadataMap::new(),
        })
    }

    async fn server_streaming(
        &mut self,
        method: &MethodDescriptor,
        request: DynamicMessage,
        headers: Vec<(String, String)>,
    ) -> Result<ReplyStream, TransportError> {
        self.ready().await?;

        let codec = DynamicCodec::new(method.input(), method.output());
        let path = http_path(method);
        let request = build_request(request, headers)?;

        let response = self.client.server_streaming(request, path, codec).await?;
        let (headers, stream, _) = response.into_parts();
        Ok(ReplyStream {
            headers,
            messages: stream.boxed(),
        })
    }

    async fn client_streaming(
        &mut self,
        method: &MethodDescriptor,
        requests: RequestStream,
        headers: Vec<(String, String)>,
    ) -> Result<UnaryReply, TransportError> {
        self.ready().await?;

        let codec = DynamicCodec::new(method.input(), method.output());
        let path = http_path(method);
        let request = build_request(requests, headers)?;

        let response = self.client.client_streaming(request, path, codec).await?;
        let (headers, message, _) = response.into_parts();
        Ok(UnaryReply {
            headers,
            message,
            trailers: MetadataMap::new(),
        })
    }

    async fn bidi_streaming(
        &mut self,
        method: &MethodDescriptor,
        requests: RequestStream,
        headers: Vec<(String, String)>,
    ) -> Result<ReplyStream, TransportError> {
        self.ready().await?;

        let codec = DynamicCodec::new(method.input(), method.output());
        let path = http_path(method);
        let request = build_request(requests, headers)?;

        let response = self.client.streaming(request, path, codec).await?;
        let (headers, stream, _) = response.into_parts();
        Ok(ReplyStream {
            headers,
            messages: stream.boxed(),
        })
    }
}

fn http_path(method: &MethodDescriptor) -> http::uri::PathAndQuery {
    let path = format!("/{}/{}", method.parent_service().full_name(), method.name());
    http::uri::PathAndQuery::from_str(&path).expect("valid gRPC path")
}

fn build_request<T>(
    payload: T,
    headers: Vec<(String, String)>,
) -> Result<tonic::Request<T>, TransportError> {
    let mut request = tonic::Request::new(payload);
    for (k, v) in headers {
        let key =
            MetadataKey::from_str(&k).map_err(|source| TransportError::InvalidMetadataKey {
                key: k.clone(),
                source,
            })?;
        let val = MetadataValue::from_str(&v)
            .map_err(|source| TransportError::InvalidMetadataValue { key: k, source })?;
        request.metadata_mut().append(key, val);
    }
    Ok(request)
}
