//! # Descriptor resolution
//!
//! A [`DescriptorSource`] gives the REPL one schema lookup API over two very
//! different backends: descriptor sets compiled ahead of time
//! ([`file::FileSource`]) and live server reflection
//! ([`reflection::ReflectionSource`]). The REPL picks one at startup; they
//! are never mixed within a session.
//!
//! Reflection lookups suspend on the network, so the whole API is `async`;
//! the file backend answers without awaiting anything.

pub mod file;
pub mod reflection;

pub use file::FileSource;
pub use reflection::ReflectionSource;

use prost_reflect::{EnumDescriptor, MessageDescriptor, MethodDescriptor, ServiceDescriptor};
use std::path::PathBuf;

use crate::reflection::client::ReflectionRpcError;

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("TLS handshake failed; check that the --tls flag matches the server configuration")]
    TlsHandshakeFailed,

    #[error("symbol '{0}' not found")]
    SymbolNotFound(String),

    #[error("symbol '{0}' is known, but its file has unresolvable dependencies")]
    DependencyUnresolvable(String),

    #[error("reflection request failed: '{0}'")]
    Reflection(#[from] ReflectionRpcError),

    #[error("failed to read descriptor set '{path}': {source}")]
    DescriptorSetRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to decode descriptor set: {0}")]
    DescriptorSetDecode(#[from] prost::DecodeError),

    #[error("invalid descriptor set: {0}")]
    InvalidDescriptorSet(#[from] prost_reflect::DescriptorError),
}

/// A generic wrapper for the descriptor kinds a symbol can resolve to.
#[derive(Debug, Clone)]
pub enum Symbol {
    Service(ServiceDescriptor),
    Message(MessageDescriptor),
    Enum(EnumDescriptor),
}

impl Symbol {
    pub fn service(&self) -> Option<&ServiceDescriptor> {
        match self {
            Symbol::Service(d) => Some(d),
            _ => None,
        }
    }

    pub fn message(&self) -> Option<&MessageDescriptor> {
        match self {
            Symbol::Message(d) => Some(d),
            _ => None,
        }
    }
}

/// Uniform schema lookup over the two backends.
pub enum DescriptorSource {
    Files(FileSource),
    Reflection(ReflectionSource),
}

impl DescriptorSource {
    /// Lists the fully-qualified names of every known service.
    pub async fn list_services(&mut self) -> Result<Vec<String>, LookupError> {
        match self {
            Self::Files(f) => Ok(f.list_services()),
            Self::Reflection(r) => r.list_services().await,
        }
    }

    /// Resolves a fully-qualified symbol name to its descriptor.
    pub async fn find_symbol(&mut self, name: &str) -> Result<Symbol, LookupError> {
        match self {
            Self::Files(f) => f
                .find_symbol(name)
                .ok_or_else(|| LookupError::SymbolNotFound(name.to_string())),
            Self::Reflection(r) => r.find_symbol(name).await,
        }
    }

    /// Resolves a method by fully-qualified service name and simple method
    /// name.
    pub async fn find_method(
        &mut self,
        service: &str,
        method: &str,
    ) -> Result<MethodDescriptor, LookupError> {
        let symbol = self.find_symbol(service).await?;
        let Symbol::Service(descriptor) = symbol else {
            return Err(LookupError::SymbolNotFound(service.to_string()));
        };
        descriptor
            .methods()
            .find(|m| m.name() == method)
            .ok_or_else(|| LookupError::SymbolNotFound(fully_qualified(service, method)))
    }

    /// Lists every known message name.
    ///
    /// For the reflection backend this is the tolerant aggregation path:
    /// services whose files cannot be resolved are skipped rather than
    /// failing the listing.
    pub async fn all_messages(&mut self) -> Result<Vec<String>, LookupError> {
        match self {
            Self::Files(f) => Ok(f.all_messages()),
            Self::Reflection(r) => r.all_messages().await,
        }
    }
}

/// Joins a package and a simple name into a fully-qualified dotted name.
/// The empty package is legal and contributes no separator.
pub fn fully_qualified(package: &str, name: &str) -> String {
    if package.is_empty() {
        name.to_string()
    } else {
        format!("{package}.{name}")
    }
}
