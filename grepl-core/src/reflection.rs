//! # Server Reflection
//!
//! This module contains the logic necessary to interact with the gRPC Server
//! Reflection Protocol (`grpc.reflection.v1`), which lets `grepl` work
//! against servers whose schema is only known at runtime.
//!
//! The wire types and the generated stub come from `tonic-reflection`; the
//! [`client::ReflectionClient`] here adds the request/response choreography:
//! listing services and recursively collecting the file descriptors a symbol
//! transitively depends on.
pub mod client;
