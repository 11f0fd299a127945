//! # Reflection Client
//!
//! A client for the gRPC Server Reflection Protocol. It is capable of:
//!
//! 1. **Listing Services**: Querying the server for all exposed service names.
//! 2. **Symbol Resolution**: Fetching the `FileDescriptorProto` containing a
//!    specific symbol, together with its transitive imports.
//!
//! Dependency collection walks the import graph breadth-first over one
//! reflection stream: every `FileDescriptorResponse` is scanned for imports
//! that have not been fetched yet, and a `FileByFilename` request is queued
//! for each. Servers frequently omit files for annotation libraries from
//! their reflection set; with `allow_missing` enabled such failures are
//! recorded instead of aborting, and the caller decides how to patch the
//! holes.
//!
//! ## References
//!
//! * [gRPC Server Reflection Protocol](https://github.com/grpc/grpc/blob/master/doc/server-reflection.md)
use crate::BoxError;
use futures_util::stream::once;
use http_body::Body as HttpBody;
use prost::Message;
use prost_types::FileDescriptorProto;
use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::Channel;
use tonic::{Streaming, client::GrpcService};
use tonic_reflection::pb::v1::{
    ServerReflectionRequest, ServerReflectionResponse,
    server_reflection_client::ServerReflectionClient, server_reflection_request::MessageRequest,
    server_reflection_response::MessageResponse,
};
use tracing::debug;

/// Errors that can occur during reflection requests.
#[derive(Debug, thiserror::Error)]
pub enum ReflectionRpcError {
    #[error(
        "failed to start a stream request with the reflection server, reflection might not be supported: '{0}'"
    )]
    ServerStreamInitFailed(#[source] tonic::Status),

    #[error("the server stream returned an error status: '{0}'")]
    ServerStreamFailure(#[source] tonic::Status),

    #[error("reflection stream closed unexpectedly")]
    StreamClosed,

    #[error("internal error: failed to send request to stream")]
    SendFailed,

    #[error("server returned reflection error code {code}: {message}")]
    ServerError { code: i32, message: String },

    #[error("protocol error: received unexpected response type: {0}")]
    UnexpectedResponseType(String),

    #[error("failed to decode FileDescriptorProto: {0}")]
    DecodeError(#[from] prost::DecodeError),
}

impl ReflectionRpcError {
    /// The status message of the underlying transport failure, if any.
    pub fn status_message(&self) -> Option<&str> {
        match self {
            Self::ServerStreamInitFailed(status) | Self::ServerStreamFailure(status) => {
                Some(status.message())
            }
            _ => None,
        }
    }
}

// The host defined in the reflection requests doesn't seem to be a mandatory
// field and there is no documentation about what it is about, so we don't ask
// the caller for one.
const EMPTY_HOST: &str = "";

/// The result of fetching the file containing a symbol: every file the server
/// delivered, keyed by path, plus the import paths it failed to deliver.
#[derive(Debug, Default)]
pub struct FetchedFiles {
    pub files: HashMap<String, FileDescriptorProto>,
    pub missing: Vec<String>,
}

/// A client for the gRPC Server Reflection service.
pub struct ReflectionClient<S = Channel> {
    client: ServerReflectionClient<S>,
    allow_missing: bool,
}

impl<S> ReflectionClient<S>
where
    S: GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    /// Creates a new `ReflectionClient` over the provided gRPC service (e.g.
    /// a `Channel`). With `allow_missing` set, unresolvable transitive
    /// imports are reported in [`FetchedFiles::missing`] instead of failing
    /// the whole fetch.
    pub fn new(channel: S, allow_missing: bool) -> Self {
        let client = ServerReflectionClient::new(channel);
        Self {
            client,
            allow_missing,
        }
    }

    /// Lists all services exposed by the server.
    pub async fn list_services(&mut self) -> Result<Vec<String>, ReflectionRpcError> {
        let req = ServerReflectionRequest {
            host: EMPTY_HOST.to_string(),
            message_request: Some(MessageRequest::ListServices(String::new())),
        };

        let mut response_stream = self
            .client
            .server_reflection_info(once(async { req }))
            .await
            .map_err(ReflectionRpcError::ServerStreamInitFailed)?
            .into_inner();

        let response = response_stream
            .message()
            .await
            .map_err(ReflectionRpcError::ServerStreamFailure)?
            .ok_or(ReflectionRpcError::StreamClosed)?;

        match response.message_response {
            Some(MessageResponse::ListServicesResponse(resp)) => {
                let services = resp.service.into_iter().map(|s| s.name).collect();
                Ok(services)
            }
            Some(MessageResponse::ErrorResponse(e)) => Err(ReflectionRpcError::ServerError {
                code: e.error_code,
                message: e.error_message,
            }),
            Some(other) => Err(ReflectionRpcError::UnexpectedResponseType(format!(
                "{other:?}",
            ))),
            None => Err(ReflectionRpcError::UnexpectedResponseType(
                "Empty Message".into(),
            )),
        }
    }

    /// Fetches the file containing `symbol` and its transitive imports.
    pub async fn file_containing_symbol(
        &mut self,
        symbol: &str,
    ) -> Result<FetchedFiles, ReflectionRpcError> {
        let (tx, rx) = mpsc::channel(100);

        let mut response_stream = self
            .client
            .server_reflection_info(ReceiverStream::new(rx))
            .await
            .map_err(ReflectionRpcError::ServerStreamInitFailed)?
            .into_inner();

        let req = ServerReflectionRequest {
            host: EMPTY_HOST.to_string(),
            message_request: Some(MessageRequest::FileContainingSymbol(symbol.to_string())),
        };

        tx.send(req)
            .await
            .map_err(|_| ReflectionRpcError::SendFailed)?;

        self.collect_descriptors(&mut response_stream, tx).await
    }

    async fn collect_descriptors(
        &self,
        response_stream: &mut Streaming<ServerReflectionResponse>,
        request_channel: mpsc::Sender<ServerReflectionRequest>,
    ) -> Result<FetchedFiles, ReflectionRpcError> {
        let mut inflight = 1;
        let mut fetched = FetchedFiles::default();
        let mut requested = HashSet::new();

        while inflight > 0 {
            let response = response_stream
                .message()
                .await
                .map_err(ReflectionRpcError::ServerStreamFailure)?
                .ok_or(ReflectionRpcError::StreamClosed)?;

            inflight -= 1;

            match response.message_response {
                Some(MessageResponse::FileDescriptorResponse(res)) => {
                    let sent_count = self
                        .process_descriptor_batch(
                            res.file_descriptor_proto,
                            &mut fetched,
                            &mut requested,
                            &request_channel,
                        )
                        .await?;

                    inflight += sent_count;
                }
                Some(MessageResponse::ErrorResponse(e)) => {
                    // A failed FileByFilename lookup only affects one import;
                    // tolerate it when asked to. A failure on the original
                    // symbol request is fatal either way.
                    let failed_import = response.original_request.and_then(|r| {
                        match r.message_request {
                            Some(MessageRequest::FileByFilename(path)) => Some(path),
                            _ => None,
                        }
                    });
                    match failed_import {
                        Some(path) if self.allow_missing => {
                            debug!(%path, code = e.error_code, "reflection import unavailable");
                            fetched.missing.push(path);
                        }
                        _ => {
                            return Err(ReflectionRpcError::ServerError {
                                message: e.error_message,
                                code: e.error_code,
                            });
                        }
                    }
                }
                Some(other) => {
                    return Err(ReflectionRpcError::UnexpectedResponseType(format!(
                        "{:?}",
                        other
                    )));
                }
                None => {
                    return Err(ReflectionRpcError::UnexpectedResponseType(
                        "Empty Message".into(),
                    ));
                }
            }
        }

        Ok(fetched)
    }

    async fn process_descriptor_batch(
        &self,
        raw_protos: Vec<Vec<u8>>,
        fetched: &mut FetchedFiles,
        requested: &mut HashSet<String>,
        tx: &mpsc::Sender<ServerReflectionRequest>,
    ) -> Result<usize, ReflectionRpcError> {
        let mut sent_count = 0;

        for raw in raw_protos {
            let fd = FileDescriptorProto::decode(raw.as_ref())?;

            if let Some(name) = &fd.name
                && !fetched.files.contains_key(name)
            {
                sent_count += self.queue_dependencies(&fd, fetched, requested, tx).await?;

                fetched.files.insert(name.clone(), fd);
            }
        }

        Ok(sent_count)
    }

    async fn queue_dependencies(
        &self,
        fd: &FileDescriptorProto,
        fetched: &FetchedFiles,
        requested: &mut HashSet<String>,
        tx: &mpsc::Sender<ServerReflectionRequest>,
    ) -> Result<usize, ReflectionRpcError> {
        let mut count = 0;

        for dep in &fd.dependency {
            if !fetched.files.contains_key(dep) && requested.insert(dep.clone()) {
                let req = ServerReflectionRequest {
                    host: EMPTY_HOST.to_string(),
                    message_request: Some(MessageRequest::FileByFilename(dep.clone())),
                };

                tx.send(req)
                    .await
                    .map_err(|_| ReflectionRpcError::SendFailed)?;
                count += 1;
            }
        }

        Ok(count)
    }
}
