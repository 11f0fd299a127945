//! Schema lookup over compiled descriptor sets.
//!
//! The file backend consumes `FileDescriptorSet` binaries produced by a
//! Protobuf compiler (`protoc --descriptor_set_out`, `buf build -o`). After
//! decoding, the full descriptor graph is in memory and every lookup is a
//! pure pool query; nothing here touches the network.

use super::{LookupError, Symbol};
use prost::Message;
use prost_reflect::DescriptorPool;
use prost_types::FileDescriptorSet;
use std::path::PathBuf;

pub struct FileSource {
    pool: DescriptorPool,
}

impl FileSource {
    /// Loads and merges one or more descriptor-set files.
    pub fn from_files(paths: &[PathBuf]) -> Result<Self, LookupError> {
        let mut pool = DescriptorPool::new();
        for path in paths {
            let bytes = std::fs::read(path).map_err(|source| LookupError::DescriptorSetRead {
                path: path.clone(),
                source,
            })?;
            let set = FileDescriptorSet::decode(bytes.as_slice())?;
            pool.add_file_descriptor_set(set)?;
        }
        Ok(Self { pool })
    }

    /// Decodes a descriptor set directly from bytes. Useful for embedded
    /// descriptors (`include_bytes!`) and tests.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LookupError> {
        let pool = DescriptorPool::decode(bytes)?;
        Ok(Self { pool })
    }

    pub fn list_services(&self) -> Vec<String> {
        self.pool
            .services()
            .map(|s| s.full_name().to_string())
            .collect()
    }

    pub fn find_symbol(&self, name: &str) -> Option<Symbol> {
        if let Some(descriptor) = self.pool.get_service_by_name(name) {
            return Some(Symbol::Service(descriptor));
        }

        if let Some(descriptor) = self.pool.get_message_by_name(name) {
            return Some(Symbol::Message(descriptor));
        }

        if let Some(descriptor) = self.pool.get_enum_by_name(name) {
            return Some(Symbol::Enum(descriptor));
        }

        None
    }

    pub fn all_messages(&self) -> Vec<String> {
        self.pool
            .all_messages()
            .filter(|m| !m.is_map_entry())
            .map(|m| m.full_name().to_string())
            .collect()
    }
}
