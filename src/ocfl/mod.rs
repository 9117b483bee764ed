//! This library is a storage agnostic storage engine for [OCFL repositories](https://ocfl.io/).
//!
//! Create a new `OcflRepo` as follows:
//!
//! ```rust,no_run
//! use ocflkit::ocfl::OcflRepo;
//!
//! let repo = OcflRepo::fs_repo("path/to/ocfl/storage/root", "path/to/work/dir");
//! ```

pub use self::digest::{DigestAlgorithm, HexDigest};
pub use self::error::{OcflError, Result};
pub use self::inventory::{Inventory, InventoryBuilder, User, Version};
pub use self::layout::{LayoutExtensionName, StorageLayout};
pub use self::lock::{FileLockGuard, FileLocker, ObjectLockManager, ObjectWriteGuard};
pub use self::mapping::{
    BaselinePathConstraint, ContentPathConstraint, DirectPathMapper, LogicalPathMapper,
};
pub use self::object::ObjectUpdater;
pub use self::repo::{Clock, OcflRepo, OcflRepoBuilder};
pub use self::store::{fs::FsOcflStore, ObjectStreams, OcflStorage};
pub use self::types::*;
pub use self::updater::{AddFileResult, InventoryUpdater};
pub use self::validate::{validate_object_at, ValidationResults};
pub use self::verify::VersionContentVerifier;

mod bimap;
mod consts;
mod digest;
mod error;
mod inventory;
mod layout;
mod lock;
mod mapping;
mod object;
mod paths;
mod repo;
mod stage;
mod store;
mod types;
mod updater;
mod util;
mod validate;
mod verify;
