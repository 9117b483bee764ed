use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use log::info;
use parking_lot::Mutex;

use crate::ocfl::consts::MUTABLE_HEAD_EXT_DIR;
use crate::ocfl::error::{not_found, OcflError, Result};
use crate::ocfl::inventory::Inventory;
use crate::ocfl::layout::StorageLayout;
use crate::ocfl::lock::{FileLocker, ObjectLockManager};
use crate::ocfl::mapping::{
    BaselinePathConstraint, ContentPathConstraint, DirectPathMapper, LogicalPathMapper,
};
use crate::ocfl::object::ObjectUpdater;
use crate::ocfl::stage::{self, AddFileProcessor, StagingDir};
use crate::ocfl::store::fs::FsOcflStore;
use crate::ocfl::store::{ObjectStreams, OcflStorage};
use crate::ocfl::updater::InventoryUpdater;
use crate::ocfl::validate::{self, ValidationResults};
use crate::ocfl::verify::VersionContentVerifier;
use crate::ocfl::{
    paths, util, FileChange, FileChangeType, HexDigest, LogicalPath, ObjectDetails,
    ObjectVersion, OcflConfig, OcflOptions, SpecVersion, VersionDetails, VersionInfo, VersionNum,
};

/// Clock abstraction used to stamp version creation times, injectable for tests
pub type Clock = dyn Fn() -> DateTime<Local> + Send + Sync;

const DEFAULT_FILE_LOCK_TIMEOUT: Duration = Duration::from_secs(60);

/// Coordinates all repository operations over a pluggable storage backend. The
/// repository is a value whose lifetime the caller controls; it spawns no threads of
/// its own and every operation is synchronous.
pub struct OcflRepo {
    store: Box<dyn OcflStorage>,
    work_dir: PathBuf,
    object_locks: ObjectLockManager,
    config: OcflConfig,
    verify_staging: bool,
    file_lock_timeout: Duration,
    clock: Box<Clock>,
    mapper: Arc<dyn LogicalPathMapper>,
    constraint: Arc<dyn ContentPathConstraint>,
    closed: AtomicBool,
}

/// Configures and constructs `OcflRepo` instances
pub struct OcflRepoBuilder {
    config: OcflConfig,
    verify_staging: bool,
    file_lock_timeout: Duration,
    clock: Box<Clock>,
    mapper: Arc<dyn LogicalPathMapper>,
    constraint: Arc<dyn ContentPathConstraint>,
}

enum UpdateMode {
    Blank,
    Copy,
}

impl OcflRepoBuilder {
    pub fn new() -> Self {
        Self {
            config: OcflConfig::default(),
            verify_staging: true,
            file_lock_timeout: DEFAULT_FILE_LOCK_TIMEOUT,
            clock: Box::new(Local::now),
            mapper: Arc::new(DirectPathMapper),
            constraint: Arc::new(BaselinePathConstraint),
        }
    }

    pub fn config(mut self, config: OcflConfig) -> Self {
        self.config = config;
        self
    }

    /// Enables or disables the post-stage consistency scan of staged versions
    pub fn verify_staging(mut self, verify_staging: bool) -> Self {
        self.verify_staging = verify_staging;
        self
    }

    /// Sets how long per-logical-path lock acquisition may block. Zero means try once.
    pub fn file_lock_timeout(mut self, timeout: Duration) -> Self {
        self.file_lock_timeout = timeout;
        self
    }

    pub fn clock(mut self, clock: impl Fn() -> DateTime<Local> + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn logical_path_mapper(mut self, mapper: Arc<dyn LogicalPathMapper>) -> Self {
        self.mapper = mapper;
        self
    }

    pub fn content_path_constraint(mut self, constraint: Arc<dyn ContentPathConstraint>) -> Self {
        self.constraint = constraint;
        self
    }

    /// Opens an existing repository on the local filesystem
    pub fn fs_repo(
        self,
        storage_root: impl AsRef<Path>,
        work_dir: impl AsRef<Path>,
    ) -> Result<OcflRepo> {
        let store = Box::new(FsOcflStore::new(storage_root)?);
        self.build(store, work_dir)
    }

    /// Initializes a new repository on the local filesystem
    pub fn init_fs_repo(
        self,
        storage_root: impl AsRef<Path>,
        work_dir: impl AsRef<Path>,
        layout: StorageLayout,
    ) -> Result<OcflRepo> {
        let store = Box::new(FsOcflStore::init(
            storage_root,
            self.config.spec_version,
            layout,
        )?);
        self.build(store, work_dir)
    }

    /// Builds a repository over a caller supplied storage backend
    pub fn store(self, store: Box<dyn OcflStorage>, work_dir: impl AsRef<Path>) -> Result<OcflRepo> {
        self.build(store, work_dir)
    }

    fn build(self, store: Box<dyn OcflStorage>, work_dir: impl AsRef<Path>) -> Result<OcflRepo> {
        self.config.validate()?;

        let work_dir = work_dir.as_ref().to_path_buf();
        fs::create_dir_all(&work_dir)?;

        Ok(OcflRepo {
            store,
            work_dir,
            object_locks: ObjectLockManager::new(),
            config: self.config,
            verify_staging: self.verify_staging,
            file_lock_timeout: self.file_lock_timeout,
            clock: self.clock,
            mapper: self.mapper,
            constraint: self.constraint,
            closed: AtomicBool::new(false),
        })
    }
}

impl Default for OcflRepoBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl OcflRepo {
    /// Returns a builder for configuring a repository
    pub fn builder() -> OcflRepoBuilder {
        OcflRepoBuilder::new()
    }

    /// Opens an existing filesystem repository with default configuration
    pub fn fs_repo(
        storage_root: impl AsRef<Path>,
        work_dir: impl AsRef<Path>,
    ) -> Result<Self> {
        OcflRepoBuilder::new().fs_repo(storage_root, work_dir)
    }

    /// Initializes a new filesystem repository with default configuration
    pub fn init_fs_repo(
        storage_root: impl AsRef<Path>,
        work_dir: impl AsRef<Path>,
        layout: StorageLayout,
    ) -> Result<Self> {
        OcflRepoBuilder::new().init_fs_repo(storage_root, work_dir, layout)
    }

    /// Creates a new version of the object whose state exactly mirrors the files under
    /// the source path, replacing whatever state the previous version had. Creates the
    /// object if it does not exist. When `version` is specified it must equal the
    /// object's current head. Returns the new head version.
    pub fn put_object(
        &self,
        object_id: &str,
        version: Option<VersionNum>,
        source: impl AsRef<Path>,
        version_info: &VersionInfo,
        options: OcflOptions,
    ) -> Result<VersionNum> {
        self.ensure_open()?;
        let object_id = validated_object_id(object_id)?;
        let source = source.as_ref();

        if !source.exists() {
            return Err(OcflError::InvalidInput(format!(
                "Source {} does not exist",
                source.to_string_lossy()
            )));
        }

        let updater = self.begin_update(object_id, version, UpdateMode::Blank)?;

        let staging = StagingDir::new(&self.work_dir)?;
        fs::create_dir_all(staging.content_dir(updater.inventory().defaulted_content_dir()))?;

        let updater = Mutex::new(updater);
        let locker = FileLocker::new(self.file_lock_timeout);
        let processor = AddFileProcessor::new(&updater, &locker, staging.path());

        processor.process_path(source, "", options)?;
        let needs_cleanup = processor.needs_empty_dir_cleanup();

        let mut updater = updater.into_inner();
        let upgraded = updater.upgrade_inventory(&self.config)?;
        let inventory = updater.build((self.clock)(), version_info)?;

        self.write_new_version(inventory, &staging, upgraded, needs_cleanup)
    }

    /// Creates a new version of the object by applying the caller's updates on top of a
    /// copy of the current head state. Creates the object if it does not exist. The
    /// update closure runs outside the object's write lock; concurrent updates of the
    /// same object are resolved optimistically when the version is installed. Returns
    /// the new head version.
    pub fn update_object(
        &self,
        object_id: &str,
        version: Option<VersionNum>,
        version_info: &VersionInfo,
        update_fn: impl FnOnce(&ObjectUpdater) -> Result<()>,
    ) -> Result<VersionNum> {
        self.ensure_open()?;
        let object_id = validated_object_id(object_id)?;

        let updater = self.begin_update(object_id, version, UpdateMode::Copy)?;

        let staging = StagingDir::new(&self.work_dir)?;
        fs::create_dir_all(staging.content_dir(updater.inventory().defaulted_content_dir()))?;

        let object_updater = ObjectUpdater::new(
            updater,
            FileLocker::new(self.file_lock_timeout),
            self.store.as_ref(),
            staging.path(),
        );

        update_fn(&object_updater)?;

        let (mut updater, needs_cleanup) = object_updater.finish();
        let upgraded = updater.upgrade_inventory(&self.config)?;
        let inventory = updater.build((self.clock)(), version_info)?;

        self.write_new_version(inventory, &staging, upgraded, needs_cleanup)
    }

    /// Creates a new head version whose state is a copy of a historical version's state.
    /// No content is staged because every digest already exists in the manifest. The
    /// source version may be the head itself. Returns the new head version.
    pub fn replicate_version_as_head(
        &self,
        object_id: &str,
        src_version: Option<VersionNum>,
        version_info: &VersionInfo,
    ) -> Result<VersionNum> {
        self.ensure_open()?;
        let object_id = validated_object_id(object_id)?;

        let inventory = self.require_inventory(object_id)?;
        reject_mutable_head(&inventory)?;

        let src = src_version.unwrap_or(inventory.head);
        inventory.get_version(src)?;

        info!(
            "Replicating version {} of object {} as the new head",
            src, object_id
        );

        let mut updater = InventoryUpdater::copy_state(
            inventory,
            Some(src),
            self.mapper.clone(),
            self.constraint.clone(),
        )?;

        let staging = StagingDir::new(&self.work_dir)?;
        fs::create_dir_all(staging.content_dir(updater.inventory().defaulted_content_dir()))?;

        let upgraded = updater.upgrade_inventory(&self.config)?;
        let inventory = updater.build((self.clock)(), version_info)?;

        self.write_new_version(inventory, &staging, upgraded, false)
    }

    /// Rolls the object back to the specified version, removing every later version
    /// from storage. Rolling back to the head is a no-op.
    pub fn rollback_to_version(&self, object_id: &str, version: VersionNum) -> Result<()> {
        self.ensure_open()?;
        let object_id = validated_object_id(object_id)?;

        let inventory = self.require_inventory(object_id)?;
        reject_mutable_head(&inventory)?;
        inventory.get_version(version)?;

        if version == inventory.head {
            return Ok(());
        }

        let _lock = self.object_locks.write(object_id);
        self.ensure_open()?;

        self.store.rollback_to_version(&inventory, version)
    }

    /// Completely removes the object from the repository. Does nothing if the object
    /// does not exist. Objects with an active mutable HEAD are refused rather than
    /// silently discarded.
    pub fn purge_object(&self, object_id: &str) -> Result<()> {
        self.ensure_open()?;
        let object_id = validated_object_id(object_id)?;

        if let Some(inventory) = self.store.load_inventory(object_id)? {
            reject_mutable_head(&inventory)?;
        }

        let _lock = self.object_locks.write(object_id);
        self.ensure_open()?;

        self.store.purge_object(object_id)
    }

    /// Imports a fully formed OCFL object rooted at the specified path. The object is
    /// validated, including content fixity, unless `NO_VALIDATION` is set. Returns the
    /// imported object's ID.
    pub fn import_object(&self, path: impl AsRef<Path>, options: OcflOptions) -> Result<String> {
        self.ensure_open()?;
        let path = path.as_ref();

        if !path.is_dir() {
            return Err(OcflError::InvalidInput(format!(
                "Import source {} is not a directory",
                path.to_string_lossy()
            )));
        }

        if path.join(MUTABLE_HEAD_EXT_DIR).exists() {
            return Err(OcflError::InvalidState(
                "Cannot import an object with an active mutable HEAD".to_string(),
            ));
        }

        if !options.is_no_validation() {
            let results = validate::validate_object_at(path, true)?;
            if results.has_errors() {
                return Err(OcflError::Validation {
                    location: path.to_string_lossy().to_string(),
                    results,
                });
            }
        }

        let mut inventory: Inventory =
            serde_json::from_reader(File::open(paths::inventory_path(path))?)?;
        inventory.validate()?;

        if self.store.contains_object(&inventory.id)? {
            return Err(OcflError::AlreadyExists(format!("Object {}", inventory.id)));
        }

        let staging = StagingDir::new(&self.work_dir)?;
        let staged_object = staging.path().join("object");

        if options.is_move_source() {
            fs::rename(path, &staged_object)?;
        } else {
            util::copy_dir_recursive(path, &staged_object)?;
        }

        let _lock = self.object_locks.write(&inventory.id);
        self.ensure_open()?;

        self.store.import_object(&mut inventory, &staged_object)?;

        Ok(inventory.id)
    }

    /// Imports a single version directory produced by another repository. The version
    /// must directly follow the object's current head, or be v1 for an object that does
    /// not exist yet. Content files are checked against the version's manifest, with a
    /// full fixity pass unless `NO_VALIDATION` is set. Returns the object's ID and the
    /// imported version.
    pub fn import_version(
        &self,
        path: impl AsRef<Path>,
        options: OcflOptions,
    ) -> Result<(String, VersionNum)> {
        self.ensure_open()?;
        let path = path.as_ref();

        if !path.is_dir() || !paths::inventory_path(path).is_file() {
            return Err(OcflError::InvalidInput(format!(
                "Import source {} is not a version directory",
                path.to_string_lossy()
            )));
        }

        let mut imported = read_version_inventory(path)?;

        let dir_name = path.file_name().unwrap_or_default().to_string_lossy();
        if dir_name != imported.head.to_string() {
            return Err(OcflError::InvalidInput(format!(
                "Version directory {} does not match the inventory head {}",
                dir_name, imported.head
            )));
        }

        match self.store.load_inventory(&imported.id)? {
            Some(existing) => {
                reject_mutable_head(&existing)?;

                if imported.head != existing.head.next()? {
                    return Err(OcflError::ObjectOutOfSync {
                        object_id: imported.id.clone(),
                        message: format!(
                            "Cannot import version {} because the object's head is {}",
                            imported.head, existing.head
                        ),
                    });
                }
            }
            None => {
                if !imported.is_new() {
                    return Err(OcflError::ObjectOutOfSync {
                        object_id: imported.id.clone(),
                        message: format!(
                            "Cannot import version {} because the object does not exist",
                            imported.head
                        ),
                    });
                }
            }
        }

        imported.validate()?;

        // Every content file must be accounted for by the version's manifest
        VersionContentVerifier::new(&imported).verify(path)?;

        if !options.is_no_validation() {
            self.check_version_fixity(&imported, path)?;
        }

        let staging = StagingDir::new(&self.work_dir)?;
        util::copy_dir_recursive(path, staging.path())?;

        let (id, head) = (imported.id.clone(), imported.head);

        {
            let _lock = self.object_locks.write(&id);
            self.ensure_open()?;
            self.store.store_new_version(&mut imported, staging.path(), None)?;
        }

        if options.is_move_source() {
            util::remove_dir_all_ignore_not_found(path)?;
        }

        Ok((id, head))
    }

    /// Copies the object's entire directory tree into the output directory, validating
    /// the export afterwards unless `NO_VALIDATION` is set.
    pub fn export_object(
        &self,
        object_id: &str,
        out_dir: impl AsRef<Path>,
        options: OcflOptions,
    ) -> Result<()> {
        self.ensure_open()?;
        let object_id = validated_object_id(object_id)?;
        let out_dir = out_dir.as_ref();

        prepare_output_dir(out_dir)?;

        let inventory = self.require_inventory(object_id)?;

        {
            let _lock = self.object_locks.write(object_id);
            self.ensure_open()?;
            self.store.export_object(&inventory, out_dir)?;
        }

        if !options.is_no_validation() {
            let results = validate::validate_object_at(out_dir, true)?;
            if results.has_errors() {
                return Err(OcflError::Validation {
                    location: out_dir.to_string_lossy().to_string(),
                    results,
                });
            }
        }

        Ok(())
    }

    /// Materializes the logical state of a version into the output directory. The
    /// inventory is always loaded so the resolved numeric version can be returned, and
    /// the copied files are fixity checked unless `NO_VALIDATION` is set.
    pub fn export_version(
        &self,
        object_id: &str,
        version: Option<VersionNum>,
        out_dir: impl AsRef<Path>,
        options: OcflOptions,
    ) -> Result<VersionNum> {
        self.ensure_open()?;
        let object_id = validated_object_id(object_id)?;
        let out_dir = out_dir.as_ref();

        prepare_output_dir(out_dir)?;

        let inventory = self.require_inventory(object_id)?;
        let version_num = version.unwrap_or(inventory.head);
        inventory.get_version(version_num)?;

        {
            let _lock = self.object_locks.write(object_id);
            self.ensure_open()?;
            self.store
                .reconstruct_object_version(&inventory, version_num, out_dir)?;
        }

        if !options.is_no_validation() {
            let version = inventory.get_version(version_num)?;

            for (logical_path, digest) in version.state_iter() {
                let exported = out_dir.join(logical_path.as_str());
                let actual = inventory
                    .digest_algorithm
                    .hash_hex(&mut File::open(&exported)?)?;

                if actual != **digest {
                    return Err(OcflError::Fixity {
                        path: logical_path.to_string(),
                        algorithm: inventory.digest_algorithm.to_string(),
                        expected: digest.to_string(),
                        actual: actual.to_string(),
                    });
                }
            }
        }

        Ok(version_num)
    }

    /// Returns metadata about the object and all of its versions
    pub fn describe_object(&self, object_id: &str) -> Result<ObjectDetails> {
        self.ensure_open()?;
        let object_id = validated_object_id(object_id)?;

        ObjectDetails::from_inventory(self.require_inventory(object_id)?)
    }

    /// Returns a view of a version's logical state, defaulting to the head version
    pub fn describe_version(
        &self,
        object_id: &str,
        version: Option<VersionNum>,
    ) -> Result<ObjectVersion> {
        self.ensure_open()?;
        let object_id = validated_object_id(object_id)?;

        ObjectVersion::from_inventory(self.require_inventory(object_id)?, version)
    }

    /// Returns every change made to the logical path across the object's versions.
    /// Fails with `NotFound` if the path never existed.
    pub fn file_change_history(
        &self,
        object_id: &str,
        logical_path: &LogicalPath,
    ) -> Result<Vec<FileChange>> {
        self.ensure_open()?;
        let object_id = validated_object_id(object_id)?;

        let inventory = self.require_inventory(object_id)?;

        let mut changes = Vec::new();
        let mut current: Option<Arc<HexDigest>> = None;

        for (version_num, version) in &inventory.versions {
            match version.lookup_digest(logical_path) {
                Some(digest) => {
                    let changed = match &current {
                        Some(previous) => previous.as_ref() != digest.as_ref(),
                        None => true,
                    };

                    if changed {
                        let content_path = inventory.content_path_for_digest(
                            digest.as_ref(),
                            Some(*version_num),
                            Some(logical_path),
                        )?;

                        changes.push(FileChange {
                            change_type: FileChangeType::Update,
                            version_details: VersionDetails::new(*version_num, version),
                            content_path: Some(content_path.clone()),
                            digest: Some(digest.clone()),
                        });
                        current = Some(digest.clone());
                    }
                }
                None => {
                    if current.is_some() {
                        changes.push(FileChange {
                            change_type: FileChangeType::Remove,
                            version_details: VersionDetails::new(*version_num, version),
                            content_path: None,
                            digest: None,
                        });
                        current = None;
                    }
                }
            }
        }

        if changes.is_empty() {
            return Err(OcflError::NotFound(format!(
                "Path {} not found in object {}",
                logical_path, object_id
            )));
        }

        Ok(changes)
    }

    /// Returns lazily opened readers over the logical state of a version, defaulting to
    /// the head version
    pub fn object_streams(
        &self,
        object_id: &str,
        version: Option<VersionNum>,
    ) -> Result<ObjectStreams> {
        self.ensure_open()?;
        let object_id = validated_object_id(object_id)?;

        let inventory = self.require_inventory(object_id)?;
        let version_num = version.unwrap_or(inventory.head);
        inventory.get_version(version_num)?;

        Ok(ObjectStreams::new(
            self.store.as_ref(),
            inventory,
            version_num,
        ))
    }

    /// Returns a lazy iterator over the IDs of every object in the repository
    pub fn list_object_ids(&self) -> Result<Box<dyn Iterator<Item = Result<String>> + '_>> {
        self.ensure_open()?;
        self.store.list_object_ids()
    }

    /// Validates the object's on-disk structure, optionally checking content fixity
    pub fn validate_object(
        &self,
        object_id: &str,
        content_fixity_check: bool,
    ) -> Result<ValidationResults> {
        self.ensure_open()?;
        let object_id = validated_object_id(object_id)?;

        self.store.validate_object(object_id, content_fixity_check)
    }

    /// Closes the repository. Close is idempotent; a closed repository fails every
    /// operation with `Closed`.
    pub fn close(&self) {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            info!("Closing OCFL repository");
            self.store.close();
        }
    }

    /// Loads the object's inventory, staging the next version according to the mode and
    /// enforcing the mutable-head and out-of-sync preconditions.
    fn begin_update(
        &self,
        object_id: &str,
        expected_version: Option<VersionNum>,
        mode: UpdateMode,
    ) -> Result<InventoryUpdater> {
        match self.store.load_inventory(object_id)? {
            Some(inventory) => {
                reject_mutable_head(&inventory)?;

                if let Some(expected) = expected_version {
                    if expected != inventory.head {
                        return Err(OcflError::ObjectOutOfSync {
                            object_id: object_id.to_string(),
                            message: format!(
                                "Expected the object to be at version {} but found {}",
                                expected, inventory.head
                            ),
                        });
                    }
                }

                match mode {
                    UpdateMode::Blank => InventoryUpdater::blank_state(
                        inventory,
                        self.mapper.clone(),
                        self.constraint.clone(),
                    ),
                    UpdateMode::Copy => InventoryUpdater::copy_state(
                        inventory,
                        None,
                        self.mapper.clone(),
                        self.constraint.clone(),
                    ),
                }
            }
            None => {
                if let Some(expected) = expected_version {
                    return Err(not_found(object_id, Some(expected)));
                }

                let stub = Inventory::builder(object_id, self.config.spec_version)
                    .with_digest_algorithm(self.config.digest_algorithm)
                    .with_content_directory(&self.config.content_directory)
                    .build()?;

                InventoryUpdater::new_object(stub, self.mapper.clone(), self.constraint.clone())
            }
        }
    }

    /// The shared finisher for every staged mutation: sweeps empty directories, prunes
    /// the content directory when no content was staged, runs the consistency scan,
    /// writes the inventory, and installs the version under the object's write lock.
    fn write_new_version(
        &self,
        mut inventory: Inventory,
        staging: &StagingDir,
        upgraded: Option<SpecVersion>,
        check_empty_dirs: bool,
    ) -> Result<VersionNum> {
        let content_dir = staging.content_dir(inventory.defaulted_content_dir());

        if check_empty_dirs {
            util::clean_dirs_down(&content_dir)?;
        }

        if content_dir.exists() && util::dir_is_empty(&content_dir)? {
            fs::remove_dir(&content_dir)?;
        }

        if self.verify_staging {
            VersionContentVerifier::new(&inventory).verify(staging.path())?;
        }

        stage::write_inventory(&mut inventory, staging.path())?;

        let _lock = self.object_locks.write(&inventory.id);
        self.ensure_open()?;

        self.store
            .store_new_version(&mut inventory, staging.path(), upgraded)?;

        Ok(inventory.head)
    }

    /// Fixity checks every content file in an imported version directory, failing with
    /// the offending path on the first mismatch.
    fn check_version_fixity(&self, inventory: &Inventory, version_dir: &Path) -> Result<()> {
        let prefix = format!("{}/", inventory.head);

        for (content_path, digest) in inventory.manifest_iter() {
            if !content_path.as_str().starts_with(&prefix) {
                continue;
            }

            let staged = paths::staged_content_path(version_dir, content_path);
            let actual = inventory
                .digest_algorithm
                .hash_hex(&mut File::open(&staged)?)?;

            if actual != **digest {
                return Err(OcflError::Fixity {
                    path: content_path.to_string(),
                    algorithm: inventory.digest_algorithm.to_string(),
                    expected: digest.to_string(),
                    actual: actual.to_string(),
                });
            }
        }

        Ok(())
    }

    fn require_inventory(&self, object_id: &str) -> Result<Inventory> {
        match self.store.load_inventory(object_id)? {
            Some(inventory) => Ok(inventory),
            None => Err(not_found(object_id, None)),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(OcflError::Closed)
        } else {
            Ok(())
        }
    }
}

fn validated_object_id(object_id: &str) -> Result<&str> {
    let trimmed = object_id.trim();

    if trimmed.is_empty() {
        return Err(OcflError::InvalidInput(
            "Object IDs may not be blank".to_string(),
        ));
    }

    Ok(trimmed)
}

fn reject_mutable_head(inventory: &Inventory) -> Result<()> {
    if inventory.mutable_head {
        return Err(OcflError::InvalidState(format!(
            "Cannot modify object {} because it has an active mutable HEAD",
            inventory.id
        )));
    }
    Ok(())
}

fn prepare_output_dir(out_dir: &Path) -> Result<()> {
    if out_dir.exists() {
        if !out_dir.is_dir() || !util::dir_is_empty(out_dir)? {
            return Err(OcflError::InvalidInput(format!(
                "Output path {} must be an empty directory",
                out_dir.to_string_lossy()
            )));
        }
    } else {
        fs::create_dir_all(out_dir)?;
    }

    Ok(())
}

/// Reads and parses an inventory out of a version directory, verifying it against its
/// sidecar when one is present
fn read_version_inventory(version_dir: &Path) -> Result<Inventory> {
    let bytes = fs::read(paths::inventory_path(version_dir))?;
    let inventory: Inventory = serde_json::from_slice(&bytes)?;

    let sidecar_path = paths::sidecar_path(version_dir, inventory.digest_algorithm);

    if sidecar_path.is_file() {
        let sidecar = fs::read_to_string(&sidecar_path)?;
        let expected = sidecar.split_whitespace().next().unwrap_or("");
        let actual = inventory.digest_algorithm.hash_hex(&mut bytes.as_slice())?;

        if HexDigest::from(expected) != actual {
            return Err(OcflError::CorruptObject {
                object_id: inventory.id.clone(),
                message: format!(
                    "Inventory digest {} does not match its sidecar {}",
                    actual, expected
                ),
            });
        }
    }

    Ok(inventory)
}
