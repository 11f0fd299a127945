//! # Grepl Core
//!
//! `grepl-core` is the engine behind the `grepl` REPL. It implements a dynamic
//! gRPC client that needs no compile-time knowledge of the Protobuf schema:
//! descriptors are resolved at runtime, request messages are elicited from the
//! operator field by field, and calls are dispatched through a generic
//! transport.
//!
//! ## Key Components
//!
//! * **[`descriptor::DescriptorSource`]:** A unified view over the two schema
//!   backends: compiled descriptor-set files and live server reflection.
//! * **[`fill::MessageFiller`]:** The recursive prompt engine that turns a
//!   message schema plus operator input into a `DynamicMessage`.
//! * **[`session::Session`]:** The REPL state: selected package and service,
//!   the metadata header bag, and the presenter choice.
//! * **[`repl::Repl`]:** The line-oriented command loop tying everything
//!   together.
//!
//! ## Transport
//!
//! All network calls go through the [`grpc::DynamicTransport`] trait. The
//! shipped implementation, [`grpc::GrpcClient`], drives `tonic` with a codec
//! that moves `DynamicMessage` values directly, so no generated stubs are
//! involved. Tests (and embedders) can substitute their own transport.
//!
//! ## Re-exports
//!
//! This crate re-exports `prost`, `prost-reflect`, and `tonic` to ensure that
//! consumers use compatible versions of these underlying dependencies.

pub mod call;
pub mod descriptor;
pub mod fill;
pub mod format;
pub mod present;
pub mod prompt;
pub mod reflection;
pub mod repl;
pub mod session;
pub mod ui;

pub mod grpc;

// Re-exports
pub use prost;
pub use prost_reflect;
pub use tonic;

/// Type alias for the standard boxed error used in generic bounds.
type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
