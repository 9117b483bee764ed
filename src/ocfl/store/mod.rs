use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

use crate::ocfl::error::Result;
use crate::ocfl::inventory::Inventory;
use crate::ocfl::validate::ValidationResults;
use crate::ocfl::{ContentPath, LogicalPath, SpecVersion, VersionNum};

pub mod fs;

/// OCFL storage backend contract. Implementations are responsible for moving bytes in
/// and out of the physical store and must be thread safe; the repository serializes
/// per-object mutations itself.
pub trait OcflStorage: Send + Sync {
    /// Returns the most recent inventory for the object, or `None` if the object does
    /// not exist.
    fn load_inventory(&self, object_id: &str) -> Result<Option<Inventory>>;

    /// Returns true if the object exists in the repository
    fn contains_object(&self, object_id: &str) -> Result<bool>;

    /// Returns the object's root path relative the storage root
    fn object_root_path(&self, object_id: &str) -> Result<String>;

    /// Installs a fully staged version directory. The staging directory must contain the
    /// version's content directory, `inventory.json`, and its sidecar. Creates the
    /// object when the inventory is at v1 and the object does not exist. The currently
    /// installed head is rechecked immediately before the install; a mismatch fails
    /// with `ObjectOutOfSync`. When `upgrade` is provided, the object's namaste file is
    /// rewritten for the new spec version.
    fn store_new_version(
        &self,
        inventory: &mut Inventory,
        staging_dir: &Path,
        upgrade: Option<SpecVersion>,
    ) -> Result<()>;

    /// Removes all versions greater than the specified version and rewrites the
    /// top-level inventory and sidecar to match it.
    fn rollback_to_version(&self, inventory: &Inventory, version_num: VersionNum) -> Result<()>;

    /// Completely removes the object from the repository. Does nothing if the object
    /// does not exist.
    fn purge_object(&self, object_id: &str) -> Result<()>;

    /// Materializes the logical state of a version into the output directory
    fn reconstruct_object_version(
        &self,
        inventory: &Inventory,
        version_num: VersionNum,
        out_dir: &Path,
    ) -> Result<()>;

    /// Opens a content file for reading
    fn open_content(
        &self,
        inventory: &Inventory,
        content_path: &ContentPath,
    ) -> Result<Box<dyn Read + Send>>;

    /// Copies a content file into the sink
    fn read_content(
        &self,
        inventory: &Inventory,
        content_path: &ContentPath,
        sink: &mut dyn Write,
    ) -> Result<()>;

    /// Returns a lazy iterator over the IDs of every object in the repository
    fn list_object_ids<'a>(&'a self) -> Result<Box<dyn Iterator<Item = Result<String>> + 'a>>;

    /// Copies the object's entire directory tree into the output directory
    fn export_object(&self, inventory: &Inventory, out_dir: &Path) -> Result<()>;

    /// Moves a fully formed staged object into place. The object must not already exist.
    fn import_object(&self, inventory: &mut Inventory, staging_dir: &Path) -> Result<()>;

    /// Validates the object's on-disk structure. When `content_fixity_check` is true,
    /// the digest of every content file is verified against the manifest.
    fn validate_object(
        &self,
        object_id: &str,
        content_fixity_check: bool,
    ) -> Result<ValidationResults>;

    /// Drops any cached object locations
    fn invalidate_cache(&self, object_id: Option<&str>);

    /// Instructs the store to stop accepting requests
    fn close(&self);
}

/// Lazily opens readers over the logical state of an object version
pub struct ObjectStreams<'a> {
    store: &'a dyn OcflStorage,
    inventory: Inventory,
    version_num: VersionNum,
}

impl<'a> ObjectStreams<'a> {
    pub(super) fn new(
        store: &'a dyn OcflStorage,
        inventory: Inventory,
        version_num: VersionNum,
    ) -> Self {
        Self {
            store,
            inventory,
            version_num,
        }
    }

    pub fn version_num(&self) -> VersionNum {
        self.version_num
    }

    /// The logical paths that exist in the version
    pub fn logical_paths(&self) -> Vec<Arc<LogicalPath>> {
        // The version is validated to exist when the streams are constructed
        self.inventory
            .get_version(self.version_num)
            .unwrap()
            .state_iter()
            .map(|(path, _)| path.clone())
            .collect()
    }

    /// Opens a reader over the content of the specified logical path
    pub fn open(&self, logical_path: &LogicalPath) -> Result<Box<dyn Read + Send>> {
        let content_path = self
            .inventory
            .content_path_for_logical_path(logical_path, Some(self.version_num))?;

        self.store.open_content(&self.inventory, content_path)
    }
}
