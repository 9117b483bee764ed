//! OCFL storage layout extension implementations

use core::fmt;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::ocfl::consts::{FLAT_DIRECT_LAYOUT_EXTENSION, HASHED_NTUPLE_LAYOUT_EXTENSION};

/// The storage layout extensions the repository knows how to map object IDs with
#[derive(Debug, Eq, PartialEq, Copy, Clone, Deserialize, Serialize)]
pub enum LayoutExtensionName {
    #[serde(rename = "0002-flat-direct-storage-layout")]
    FlatDirect,
    #[serde(rename = "0004-hashed-n-tuple-storage-layout")]
    HashedNTuple,
}

/// Maps object IDs to object root paths relative the storage root
#[derive(Debug, Clone, Copy)]
pub struct StorageLayout {
    extension: LayoutExtensionName,
}

/// `ocfl_layout.json` serialization object
#[derive(Deserialize, Serialize, Debug)]
pub struct OcflLayout {
    pub extension: LayoutExtensionName,
    pub description: String,
}

impl StorageLayout {
    pub fn new(extension: LayoutExtensionName) -> Self {
        Self { extension }
    }

    pub fn extension_name(&self) -> LayoutExtensionName {
        self.extension
    }

    /// Maps an object ID to its object root path, using `/` separators
    pub fn map_object_id(&self, object_id: &str) -> String {
        match self.extension {
            LayoutExtensionName::FlatDirect => object_id.to_string(),
            LayoutExtensionName::HashedNTuple => {
                // Extension defaults: sha256, 3-character tuples, 3 tuples, full digest leaf
                let digest = hex::encode(Sha256::digest(object_id.as_bytes()));
                format!(
                    "{}/{}/{}/{}",
                    &digest[0..3],
                    &digest[3..6],
                    &digest[6..9],
                    digest
                )
            }
        }
    }

    pub fn description(&self) -> String {
        match self.extension {
            LayoutExtensionName::FlatDirect => {
                "Object IDs map directly onto root-level directories".to_string()
            }
            LayoutExtensionName::HashedNTuple => {
                "Object IDs are hashed and split into n-tuple directory trees".to_string()
            }
        }
    }
}

impl Display for LayoutExtensionName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            LayoutExtensionName::FlatDirect => write!(f, "{}", FLAT_DIRECT_LAYOUT_EXTENSION),
            LayoutExtensionName::HashedNTuple => write!(f, "{}", HASHED_NTUPLE_LAYOUT_EXTENSION),
        }
    }
}
