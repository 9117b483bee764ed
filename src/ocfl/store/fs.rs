//! Local filesystem OCFL storage implementation.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use log::{error, info, warn};
use parking_lot::RwLock;
use serde::Deserialize;

use crate::ocfl::consts::*;
use crate::ocfl::digest::HexDigest;
use crate::ocfl::error::{not_found, OcflError, Result};
use crate::ocfl::inventory::Inventory;
use crate::ocfl::layout::{OcflLayout, StorageLayout};
use crate::ocfl::store::OcflStorage;
use crate::ocfl::validate::{self, ValidationResults};
use crate::ocfl::{paths, util, ContentPath, SpecVersion, VersionNum};

/// Local filesystem OCFL repository
pub struct FsOcflStore {
    /// The path to the OCFL storage root
    storage_root: PathBuf,
    /// Maps object IDs to paths within the storage root
    storage_layout: Option<StorageLayout>,
    /// Caches object ID to path mappings
    id_path_cache: RwLock<HashMap<String, String>>,
    closed: AtomicBool,
}

#[derive(Deserialize)]
struct InventoryId {
    id: String,
}

impl FsOcflStore {
    /// Opens an existing OCFL repository rooted at `storage_root`
    pub fn new(storage_root: impl AsRef<Path>) -> Result<Self> {
        let storage_root = storage_root.as_ref().to_path_buf();

        if !storage_root.is_dir() {
            return Err(OcflError::InvalidState(format!(
                "Storage root {} does not exist",
                storage_root.to_string_lossy()
            )));
        }

        if root_spec_version(&storage_root).is_none() {
            return Err(OcflError::InvalidState(format!(
                "Storage root {} is not an OCFL repository",
                storage_root.to_string_lossy()
            )));
        }

        let storage_layout = load_storage_layout(&storage_root);

        Ok(Self {
            storage_root,
            storage_layout,
            id_path_cache: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Initializes a new OCFL repository at `storage_root`. The root must not already
    /// contain a repository.
    pub fn init(
        storage_root: impl AsRef<Path>,
        spec_version: SpecVersion,
        layout: StorageLayout,
    ) -> Result<Self> {
        let storage_root = storage_root.as_ref().to_path_buf();

        fs::create_dir_all(&storage_root)?;

        if !util::dir_is_empty(&storage_root)? {
            return Err(OcflError::InvalidState(format!(
                "Cannot initialize a repository at {} because the directory is not empty",
                storage_root.to_string_lossy()
            )));
        }

        fs::write(
            paths::root_namaste_path(&storage_root, spec_version),
            spec_version.root_namaste_content(),
        )?;

        let layout_meta = OcflLayout {
            extension: layout.extension_name(),
            description: layout.description(),
        };
        serde_json::to_writer_pretty(
            File::create(paths::ocfl_layout_path(&storage_root))?,
            &layout_meta,
        )?;

        info!(
            "Initialized OCFL {} repository at {}",
            spec_version.version_str(),
            storage_root.to_string_lossy()
        );

        Ok(Self {
            storage_root,
            storage_layout: Some(layout),
            id_path_cache: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Locates the object's root path, relative the storage root. The configured layout
    /// is consulted first; without one, the repository is scanned.
    fn locate_object_root(&self, object_id: &str) -> Result<Option<String>> {
        if let Some(object_root) = self.id_path_cache.read().get(object_id) {
            return Ok(Some(object_root.clone()));
        }

        if let Some(layout) = &self.storage_layout {
            let object_root = layout.map_object_id(object_id);
            self.id_path_cache
                .write()
                .insert(object_id.to_string(), object_root.clone());
            return Ok(Some(object_root));
        }

        info!(
            "Storage layout not configured; scanning repository to locate object {}",
            object_id
        );

        for entry in ObjectRootIter::new(&self.storage_root)? {
            let object_root = entry?;
            let id = read_object_id(&self.storage_root.join(&object_root))?;

            self.id_path_cache.write().insert(id.clone(), object_root.clone());

            if id == object_id {
                return Ok(Some(object_root));
            }
        }

        Ok(None)
    }

    /// Resolves the object root that must exist, failing with `NotFound` otherwise
    fn require_object_root(&self, object_id: &str) -> Result<(String, PathBuf)> {
        match self.locate_object_root(object_id)? {
            Some(object_root) => {
                let storage_path = self.storage_root.join(&object_root);
                if object_namaste_version(&storage_path).is_some() {
                    Ok((object_root, storage_path))
                } else {
                    Err(not_found(object_id, None))
                }
            }
            None => Err(not_found(object_id, None)),
        }
    }

    fn parse_inventory(&self, object_root: &str) -> Result<Inventory> {
        let storage_path = self.storage_root.join(object_root);

        let (mut inventory, digest) = read_inventory_checked(&storage_path)?;

        let mutable_head_inv = storage_path
            .join(MUTABLE_HEAD_HEAD_DIR)
            .join(INVENTORY_FILE);

        if mutable_head_inv.is_file() {
            let head_dir = storage_path.join(MUTABLE_HEAD_HEAD_DIR);
            let (head_inventory, head_digest) = read_inventory_checked(&head_dir)?;
            inventory = head_inventory;
            inventory.mutable_head = true;
            inventory.revision_num = parse_revision_num(&inventory);

            return self.finish_inventory(inventory, object_root, storage_path, head_digest);
        }

        self.finish_inventory(inventory, object_root, storage_path, digest)
    }

    fn finish_inventory(
        &self,
        mut inventory: Inventory,
        object_root: &str,
        storage_path: PathBuf,
        digest: HexDigest,
    ) -> Result<Inventory> {
        inventory.object_root = object_root.to_string();
        inventory.storage_path = storage_path.to_string_lossy().to_string();
        inventory.inventory_digest = Some(digest);
        inventory.validate()?;
        Ok(inventory)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(OcflError::Closed)
        } else {
            Ok(())
        }
    }
}

impl OcflStorage for FsOcflStore {
    fn load_inventory(&self, object_id: &str) -> Result<Option<Inventory>> {
        self.ensure_open()?;

        let object_root = match self.locate_object_root(object_id)? {
            Some(object_root) => object_root,
            None => return Ok(None),
        };

        let storage_path = self.storage_root.join(&object_root);
        if object_namaste_version(&storage_path).is_none() {
            return Ok(None);
        }

        let inventory = self.parse_inventory(&object_root)?;

        if inventory.id != object_id {
            return Err(OcflError::CorruptObject {
                object_id: object_id.to_string(),
                message: format!(
                    "Expected object to exist at {} but found object {} instead",
                    object_root, inventory.id
                ),
            });
        }

        Ok(Some(inventory))
    }

    fn contains_object(&self, object_id: &str) -> Result<bool> {
        self.ensure_open()?;

        match self.locate_object_root(object_id)? {
            Some(object_root) => Ok(object_namaste_version(
                &self.storage_root.join(object_root),
            )
            .is_some()),
            None => Ok(false),
        }
    }

    fn object_root_path(&self, object_id: &str) -> Result<String> {
        self.ensure_open()?;

        match self.locate_object_root(object_id)? {
            Some(object_root) => Ok(object_root),
            None => Err(not_found(object_id, None)),
        }
    }

    fn store_new_version(
        &self,
        inventory: &mut Inventory,
        staging_dir: &Path,
        upgrade: Option<SpecVersion>,
    ) -> Result<()> {
        self.ensure_open()?;

        let object_root = match self.locate_object_root(&inventory.id)? {
            Some(object_root) => object_root,
            None => {
                return Err(OcflError::InvalidState(
                    "Cannot write the object because the repository does not have a storage layout"
                        .to_string(),
                ))
            }
        };

        let storage_path = self.storage_root.join(&object_root);
        let exists = object_namaste_version(&storage_path).is_some();

        if inventory.is_new() {
            if exists {
                return Err(OcflError::ObjectOutOfSync {
                    object_id: inventory.id.clone(),
                    message: "Cannot create the object because it already exists".to_string(),
                });
            }
            self.install_new_object(inventory, staging_dir, &object_root, &storage_path)
        } else {
            self.install_new_version(inventory, staging_dir, &object_root, &storage_path, upgrade)
        }
    }

    fn rollback_to_version(&self, inventory: &Inventory, version_num: VersionNum) -> Result<()> {
        self.ensure_open()?;

        let storage_path = PathBuf::from(&inventory.storage_path);
        let version_dir = paths::version_path(&storage_path, version_num);

        let version_inventory: Inventory =
            serde_json::from_reader(File::open(paths::inventory_path(&version_dir))?)?;

        info!(
            "Rolling object {} back to version {}",
            inventory.id, version_num
        );

        // The root inventory is rewritten before higher versions are removed so that a
        // crash between the two steps leaves a readable object
        fs::copy(
            paths::inventory_path(&version_dir),
            paths::inventory_path(&storage_path),
        )?;

        for algorithm in [crate::ocfl::DigestAlgorithm::Sha512, crate::ocfl::DigestAlgorithm::Sha256] {
            if algorithm != version_inventory.digest_algorithm {
                util::remove_file_ignore_not_found(paths::sidecar_path(&storage_path, algorithm))?;
            }
        }

        let version_sidecar =
            paths::sidecar_path(&version_dir, version_inventory.digest_algorithm);
        let root_sidecar =
            paths::sidecar_path(&storage_path, version_inventory.digest_algorithm);

        if version_sidecar.is_file() {
            fs::copy(&version_sidecar, &root_sidecar)?;
        } else {
            let digest = version_inventory
                .digest_algorithm
                .hash_hex(&mut File::open(paths::inventory_path(&version_dir))?)?;
            let mut sidecar = File::create(&root_sidecar)?;
            writeln!(sidecar, "{}  {}", digest, INVENTORY_FILE)?;
        }

        for number in (version_num.number + 1)..=inventory.head.number {
            let dir = paths::version_path(&storage_path, VersionNum::new(number));
            util::remove_dir_all_ignore_not_found(&dir)?;
        }

        Ok(())
    }

    fn purge_object(&self, object_id: &str) -> Result<()> {
        self.ensure_open()?;

        let (object_root, storage_path) = match self.require_object_root(object_id) {
            Ok(found) => found,
            Err(OcflError::NotFound(_)) => return Ok(()),
            Err(e) => return Err(e),
        };

        // Purging an object with an unpublished mutable HEAD would silently discard it
        let inventory = self.parse_inventory(&object_root)?;
        if inventory.mutable_head {
            return Err(OcflError::InvalidState(format!(
                "Cannot purge object {} because it has an active mutable HEAD",
                object_id
            )));
        }

        info!(
            "Purging object {} at {}",
            object_id,
            storage_path.to_string_lossy()
        );

        if let Err(e) = fs::remove_dir_all(&storage_path) {
            return Err(OcflError::CorruptObject {
                object_id: object_id.to_string(),
                message: format!(
                    "Failed to purge object at {}. This object may need to be removed manually. Error: {}",
                    storage_path.to_string_lossy(),
                    e
                ),
            });
        }

        self.invalidate_cache(Some(object_id));

        let parent = storage_path.parent().unwrap();
        if parent.exists() && parent != self.storage_root {
            if let Err(e) = util::clean_dirs_up(parent) {
                error!(
                    "Failed to cleanup dangling directories at {}: {}",
                    parent.to_string_lossy(),
                    e
                );
            }
        }

        Ok(())
    }

    fn reconstruct_object_version(
        &self,
        inventory: &Inventory,
        version_num: VersionNum,
        out_dir: &Path,
    ) -> Result<()> {
        self.ensure_open()?;

        let version = inventory.get_version(version_num)?;
        let storage_path = PathBuf::from(&inventory.storage_path);

        fs::create_dir_all(out_dir)?;

        for (logical_path, digest) in version.state_iter() {
            let content_path = inventory.content_path_for_digest(
                digest.as_ref(),
                Some(version_num),
                Some(logical_path.as_ref()),
            )?;

            let src = storage_path.join(content_path.as_str());
            let dst = out_dir.join(logical_path.as_str());

            if let Some(parent) = dst.parent() {
                fs::create_dir_all(parent)?;
            }

            fs::copy(&src, &dst)?;
        }

        Ok(())
    }

    fn open_content(
        &self,
        inventory: &Inventory,
        content_path: &ContentPath,
    ) -> Result<Box<dyn Read + Send>> {
        self.ensure_open()?;

        let storage_path = PathBuf::from(&inventory.storage_path).join(content_path.as_str());

        match File::open(&storage_path) {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(OcflError::NotFound(format!(
                "Content path {} in object {}",
                content_path, inventory.id
            ))),
            Err(e) => Err(e.into()),
        }
    }

    fn read_content(
        &self,
        inventory: &Inventory,
        content_path: &ContentPath,
        sink: &mut dyn Write,
    ) -> Result<()> {
        let mut reader = self.open_content(inventory, content_path)?;
        io::copy(&mut reader, sink)?;
        Ok(())
    }

    fn list_object_ids<'a>(&'a self) -> Result<Box<dyn Iterator<Item = Result<String>> + 'a>> {
        self.ensure_open()?;

        let iter = ObjectRootIter::new(&self.storage_root)?;
        let storage_root = self.storage_root.clone();

        Ok(Box::new(iter.map(move |entry| {
            entry.and_then(|object_root| read_object_id(&storage_root.join(object_root)))
        })))
    }

    fn export_object(&self, inventory: &Inventory, out_dir: &Path) -> Result<()> {
        self.ensure_open()?;

        util::copy_dir_recursive(PathBuf::from(&inventory.storage_path), out_dir)
    }

    fn import_object(&self, inventory: &mut Inventory, staging_dir: &Path) -> Result<()> {
        self.ensure_open()?;

        let object_root = match self.locate_object_root(&inventory.id)? {
            Some(object_root) => object_root,
            None => {
                return Err(OcflError::InvalidState(
                    "Cannot import the object because the repository does not have a storage layout"
                        .to_string(),
                ))
            }
        };

        let storage_path = self.storage_root.join(&object_root);

        if storage_path.exists() {
            return Err(OcflError::AlreadyExists(format!("Object {}", inventory.id)));
        }

        info!("Importing object {} to {}", inventory.id, object_root);

        fs::create_dir_all(storage_path.parent().unwrap())?;
        fs::rename(staging_dir, &storage_path)?;

        inventory.object_root = object_root.clone();
        inventory.storage_path = storage_path.to_string_lossy().to_string();

        self.id_path_cache
            .write()
            .insert(inventory.id.clone(), object_root);

        Ok(())
    }

    fn validate_object(
        &self,
        object_id: &str,
        content_fixity_check: bool,
    ) -> Result<ValidationResults> {
        self.ensure_open()?;

        let (_, storage_path) = self.require_object_root(object_id)?;

        validate::validate_object_at(&storage_path, content_fixity_check)
    }

    fn invalidate_cache(&self, object_id: Option<&str>) {
        match object_id {
            Some(object_id) => {
                self.id_path_cache.write().remove(object_id);
            }
            None => self.id_path_cache.write().clear(),
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

impl FsOcflStore {
    /// Creates the object root for a brand new object and installs its first version
    fn install_new_object(
        &self,
        inventory: &mut Inventory,
        staging_dir: &Path,
        object_root: &str,
        storage_path: &Path,
    ) -> Result<()> {
        if storage_path.exists() && !util::dir_is_empty(storage_path)? {
            return Err(OcflError::ObjectOutOfSync {
                object_id: inventory.id.clone(),
                message: format!(
                    "Cannot create the object because an object already exists at {}",
                    storage_path.to_string_lossy()
                ),
            });
        }

        let spec_version = inventory.spec_version()?;

        info!("Creating new object {}", inventory.id);

        fs::create_dir_all(storage_path)?;

        let mut namaste = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(paths::object_namaste_path(storage_path, spec_version))?;
        namaste.write_all(spec_version.object_namaste_content().as_bytes())?;

        let version_dir = paths::version_path(storage_path, inventory.head);
        fs::rename(staging_dir, &version_dir)?;

        if let Err(e) = copy_inventory_files(inventory, &version_dir, storage_path) {
            error!(
                "Failed to finalize new object {}; removing partial object root: {}",
                inventory.id, e
            );
            let _ = fs::remove_dir_all(storage_path);
            return Err(e);
        }

        inventory.object_root = object_root.to_string();
        inventory.storage_path = storage_path.to_string_lossy().to_string();

        self.id_path_cache
            .write()
            .insert(inventory.id.clone(), object_root.to_string());

        Ok(())
    }

    /// Installs a staged version into an existing object after rechecking its head
    fn install_new_version(
        &self,
        inventory: &mut Inventory,
        staging_dir: &Path,
        object_root: &str,
        storage_path: &Path,
        upgrade: Option<SpecVersion>,
    ) -> Result<()> {
        let existing = match self.load_inventory(&inventory.id)? {
            Some(existing) => existing,
            None => {
                return Err(OcflError::ObjectOutOfSync {
                    object_id: inventory.id.clone(),
                    message: format!(
                        "Cannot create version {} because the object no longer exists",
                        inventory.head
                    ),
                })
            }
        };

        // Optimistic concurrency: the staged version must directly follow the head that
        // is actually installed
        if existing.head != inventory.head.previous()? {
            return Err(OcflError::ObjectOutOfSync {
                object_id: inventory.id.clone(),
                message: format!(
                    "Cannot create version {} because the current version is {}",
                    inventory.head, existing.head
                ),
            });
        }

        let version_dir = paths::version_path(storage_path, inventory.head);

        if version_dir.exists() {
            return Err(OcflError::ObjectOutOfSync {
                object_id: inventory.id.clone(),
                message: format!(
                    "Cannot create version {} because its directory already exists",
                    inventory.head
                ),
            });
        }

        info!(
            "Creating version {} of object {}",
            inventory.head, inventory.id
        );

        fs::rename(staging_dir, &version_dir)?;

        if let Err(e) = copy_inventory_files(inventory, &version_dir, storage_path) {
            if let Err(rollback) = fs::rename(&version_dir, staging_dir) {
                error!(
                    "Failed to rollback version {} of object {}: {}. Manual intervention may be required.",
                    inventory.head, inventory.id, rollback
                );
            }

            return Err(OcflError::InvalidState(format!(
                "Failed to create version {} of object {}: {}",
                inventory.head, inventory.id, e
            )));
        }

        if let Some(new_version) = upgrade {
            upgrade_namaste(storage_path, new_version)?;
        }

        inventory.object_root = object_root.to_string();
        inventory.storage_path = storage_path.to_string_lossy().to_string();

        Ok(())
    }
}

/// Copies `inventory.json` and its sidecar between directories
fn copy_inventory_files(inventory: &Inventory, from: &Path, to: &Path) -> Result<()> {
    fs::copy(paths::inventory_path(from), paths::inventory_path(to))?;
    fs::copy(
        paths::sidecar_path(from, inventory.digest_algorithm),
        paths::sidecar_path(to, inventory.digest_algorithm),
    )?;
    Ok(())
}

/// Replaces the object's namaste marker when its spec version is upgraded
fn upgrade_namaste(object_root: &Path, new_version: SpecVersion) -> Result<()> {
    for version in [SpecVersion::Ocfl1_0, SpecVersion::Ocfl1_1] {
        if version != new_version {
            util::remove_file_ignore_not_found(paths::object_namaste_path(object_root, version))?;
        }
    }

    fs::write(
        paths::object_namaste_path(object_root, new_version),
        new_version.object_namaste_content(),
    )?;

    Ok(())
}

/// Reads and parses an inventory, verifying it against its sidecar first
fn read_inventory_checked(dir: &Path) -> Result<(Inventory, HexDigest)> {
    let inventory_path = paths::inventory_path(dir);

    let bytes = fs::read(&inventory_path).map_err(|e| {
        OcflError::InvalidState(format!(
            "Failed to read inventory at {}: {}",
            inventory_path.to_string_lossy(),
            e
        ))
    })?;

    let inventory: Inventory = serde_json::from_slice(&bytes)?;

    let sidecar_path = paths::sidecar_path(dir, inventory.digest_algorithm);
    let sidecar = fs::read_to_string(&sidecar_path).map_err(|e| {
        OcflError::CorruptObject {
            object_id: inventory.id.clone(),
            message: format!(
                "Failed to read inventory sidecar at {}: {}",
                sidecar_path.to_string_lossy(),
                e
            ),
        }
    })?;

    let expected = sidecar.split_whitespace().next().unwrap_or("");
    let digest = inventory.digest_algorithm.hash_hex(&mut bytes.as_slice())?;

    if HexDigest::from(expected) != digest {
        return Err(OcflError::CorruptObject {
            object_id: inventory.id.clone(),
            message: format!(
                "Inventory digest {} does not match its sidecar {}",
                digest, expected
            ),
        });
    }

    Ok((inventory, digest))
}

/// Extracts an object's ID by parsing only the `id` field of its inventory
fn read_object_id(object_root: &Path) -> Result<String> {
    let file = File::open(paths::inventory_path(object_root))?;
    let parsed: InventoryId = serde_json::from_reader(file)?;
    Ok(parsed.id)
}

/// Derives the mutable head revision number from the manifest's revision paths
fn parse_revision_num(inventory: &Inventory) -> Option<u32> {
    let prefix = format!(
        "{}/{}/r",
        MUTABLE_HEAD_HEAD_DIR,
        inventory.defaulted_content_dir()
    );

    let mut max = None;

    for (content_path, _) in inventory.manifest_iter() {
        if let Some(rest) = content_path.as_str().strip_prefix(&prefix) {
            let number = rest.split('/').next().unwrap_or("");
            if let Ok(number) = number.parse::<u32>() {
                max = Some(max.map_or(number, |current: u32| current.max(number)));
            }
        }
    }

    max
}

/// Returns the spec version declared by the storage root's namaste file
fn root_spec_version(storage_root: &Path) -> Option<SpecVersion> {
    for version in [SpecVersion::Ocfl1_1, SpecVersion::Ocfl1_0] {
        if paths::root_namaste_path(storage_root, version).is_file() {
            return Some(version);
        }
    }
    None
}

/// Returns the spec version declared by an object root's namaste file
fn object_namaste_version(object_root: &Path) -> Option<SpecVersion> {
    for version in [SpecVersion::Ocfl1_1, SpecVersion::Ocfl1_0] {
        if paths::object_namaste_path(object_root, version).is_file() {
            return Some(version);
        }
    }
    None
}

fn load_storage_layout(storage_root: &Path) -> Option<StorageLayout> {
    let layout_path = paths::ocfl_layout_path(storage_root);

    if !layout_path.is_file() {
        return None;
    }

    match File::open(&layout_path) {
        Ok(file) => match serde_json::from_reader::<_, OcflLayout>(file) {
            Ok(layout) => Some(StorageLayout::new(layout.extension)),
            Err(e) => {
                warn!(
                    "Failed to parse {}; objects will be located by scanning: {}",
                    layout_path.to_string_lossy(),
                    e
                );
                None
            }
        },
        Err(e) => {
            warn!(
                "Failed to read {}; objects will be located by scanning: {}",
                layout_path.to_string_lossy(),
                e
            );
            None
        }
    }
}

/// Walks the storage root depth-first yielding object root paths, relative the storage
/// root. Directories containing an object namaste file are not descended into.
struct ObjectRootIter {
    storage_root: PathBuf,
    stack: Vec<PathBuf>,
}

impl ObjectRootIter {
    fn new(storage_root: &Path) -> Result<Self> {
        let mut stack = Vec::new();

        for entry in fs::read_dir(storage_root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir()
                && entry.file_name().to_string_lossy() != EXTENSIONS_DIR
            {
                stack.push(entry.path());
            }
        }

        Ok(Self {
            storage_root: storage_root.to_path_buf(),
            stack,
        })
    }
}

impl Iterator for ObjectRootIter {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(dir) = self.stack.pop() {
            if object_namaste_version(&dir).is_some() {
                let relative = pathdiff::diff_paths(&dir, &self.storage_root).unwrap();
                let relative =
                    util::convert_backslash_to_forward(&relative.to_string_lossy()).to_string();
                return Some(Ok(relative));
            }

            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) => return Some(Err(e.into())),
            };

            for entry in entries {
                match entry {
                    Ok(entry) => match entry.file_type() {
                        Ok(file_type) => {
                            if file_type.is_dir()
                                && entry.file_name().to_string_lossy() != EXTENSIONS_DIR
                            {
                                self.stack.push(entry.path());
                            }
                        }
                        Err(e) => return Some(Err(e.into())),
                    },
                    Err(e) => return Some(Err(e.into())),
                }
            }
        }

        None
    }
}
