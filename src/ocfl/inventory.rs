use std::collections::hash_map::Iter;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Local};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::ocfl::bimap::PathBiMap;
use crate::ocfl::consts::DEFAULT_CONTENT_DIR;
use crate::ocfl::digest::{DigestAlgorithm, HexDigest};
use crate::ocfl::error::{not_found, OcflError, Result};
use crate::ocfl::{ContentPath, ContentPathVersion, LogicalPath, SpecVersion, VersionInfo, VersionNum};

/// OCFL inventory serialization object. Field order matches the canonical key order:
/// `id, type, digestAlgorithm, head, contentDirectory, fixity, manifest, versions`.
#[derive(Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Inventory {
    pub id: String,
    #[serde(rename = "type")]
    pub type_declaration: String,
    pub digest_algorithm: DigestAlgorithm,
    pub head: VersionNum,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_directory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixity: Option<BTreeMap<String, BTreeMap<String, BTreeSet<ContentPath>>>>,
    manifest: PathBiMap<ContentPath>,
    pub versions: BTreeMap<VersionNum, Version>,

    /// Path to the object's root relative the storage root, using `/` separators
    #[serde(skip)]
    pub object_root: String,
    /// Physical path to the object's root, using the filesystem's separator
    #[serde(skip)]
    pub storage_path: String,
    /// Indicates if the head version is an unpublished mutable head extension version
    #[serde(skip)]
    pub mutable_head: bool,
    /// The mutable head revision number, when a mutable head is active
    #[serde(skip)]
    pub revision_num: Option<u32>,
    /// The digest of this inventory's serialized form, populated after it is written
    #[serde(skip)]
    pub inventory_digest: Option<HexDigest>,
    /// The digest of the previous version's inventory
    #[serde(skip)]
    pub previous_digest: Option<HexDigest>,
}

/// Used to construct inventories for new objects
pub struct InventoryBuilder {
    id: String,
    spec_version: SpecVersion,
    digest_algorithm: DigestAlgorithm,
    head: VersionNum,
    content_directory: String,
}

/// OCFL version serialization object
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Version {
    pub created: DateTime<Local>,
    state: PathBiMap<LogicalPath>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,

    /// All of the logical path parts that should be treated as directories
    #[serde(skip)]
    logical_dirs: OnceCell<HashSet<LogicalPath>>,
}

/// OCFL user serialization object
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct User {
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl Inventory {
    /// Returns a new inventory builder for the specified object
    pub fn builder(object_id: &str, spec_version: SpecVersion) -> InventoryBuilder {
        InventoryBuilder::new(object_id, spec_version)
    }

    /// Appends a new version at `head + 1`. When `copy_from` is provided, the new
    /// version's state starts as a copy of that version's state; otherwise it starts
    /// empty.
    pub(super) fn stage_next_version(&mut self, copy_from: Option<VersionNum>) -> Result<()> {
        let version = match copy_from {
            Some(src) => self.get_version(src)?.clone_staged(),
            None => Version::new_staged(),
        };

        let version_num = self.head.next()?;
        self.versions.insert(version_num, version);
        self.head = version_num;

        Ok(())
    }

    /// Returns true if the HEAD version is version 1
    pub fn is_new(&self) -> bool {
        self.head.number == 1
    }

    /// Returns a reference to the HEAD version
    pub fn head_version(&self) -> &Version {
        // The head version is validated to exist when the inventory is created
        self.versions.get(&self.head).unwrap()
    }

    /// Returns a mutable reference to the HEAD version
    pub(super) fn head_version_mut(&mut self) -> &mut Version {
        self.versions.get_mut(&self.head).unwrap()
    }

    /// Returns a reference to the specified version, or a `NotFound` error
    pub fn get_version(&self, version_num: VersionNum) -> Result<&Version> {
        match self.versions.get(&version_num) {
            Some(v) => Ok(v),
            None => Err(not_found(&self.id, Some(version_num))),
        }
    }

    /// Returns true if the path exists in the manifest
    pub fn contains_content_path(&self, content_path: &ContentPath) -> bool {
        self.manifest.contains_path(content_path)
    }

    /// Returns true if the digest exists in the manifest
    pub fn contains_digest(&self, digest: &HexDigest) -> bool {
        self.manifest.contains_id(digest)
    }

    /// Returns the digest a content path maps to, if the path is in the manifest
    pub fn digest_for_content_path(&self, content_path: &ContentPath) -> Option<&Arc<HexDigest>> {
        self.manifest.get_id(content_path)
    }

    /// Returns the shared reference for the digest if it already exists in the manifest
    pub(super) fn digest_rc(&self, digest: &HexDigest) -> Option<&Arc<HexDigest>> {
        self.manifest.get_id_rc(digest)
    }

    pub(super) fn insert_manifest(&mut self, digest: Arc<HexDigest>, content_path: Arc<ContentPath>) {
        self.manifest.insert_arc(digest, content_path);
    }

    pub(super) fn remove_manifest_path(
        &mut self,
        content_path: &ContentPath,
    ) -> Option<(Arc<ContentPath>, Arc<HexDigest>)> {
        self.manifest.remove_path(content_path)
    }

    /// Iterates over all manifest entries as content-path/digest pairs
    pub fn manifest_iter(&self) -> Iter<Arc<ContentPath>, Arc<HexDigest>> {
        self.manifest.iter()
    }

    /// Returns the paths associated with a digest in the manifest
    pub fn content_paths(&self, digest: &HexDigest) -> Option<&HashSet<Arc<ContentPath>>> {
        self.manifest.get_paths(digest)
    }

    /// Returns the first content path associated with the specified digest, or an error
    /// if it does not exist.
    ///
    /// If `version_num` is specified, then the content path must exist in the specified
    /// version or earlier.
    ///
    /// If `logical_path` is specified and multiple content paths for the digest are
    /// found, then the path that maps directly to the logical path is preferred.
    pub fn content_path_for_digest(
        &self,
        digest: &HexDigest,
        version_num: Option<VersionNum>,
        logical_path: Option<&LogicalPath>,
    ) -> Result<&Arc<ContentPath>> {
        let version_num = version_num.unwrap_or(self.head);

        match self.manifest.get_paths(digest) {
            Some(paths) => {
                let mut matches = Vec::new();

                for path in paths {
                    let version = match path.version {
                        ContentPathVersion::VersionNum(num) => num,
                        // Mutable head paths belong to the head version
                        ContentPathVersion::MutableHead => self.head,
                    };

                    if version <= version_num {
                        matches.push(path);
                    }
                }

                if matches.is_empty() {
                    return Err(OcflError::CorruptObject {
                        object_id: self.id.clone(),
                        message: format!("Digest {} is not mapped to any content paths", digest),
                    });
                } else if matches.len() > 1 {
                    if let Some(logical_path) = logical_path {
                        let suffix =
                            format!("/{}/{}", self.defaulted_content_dir(), logical_path);
                        for path in matches.iter() {
                            if path.as_str().ends_with(&suffix) {
                                return Ok(path);
                            }
                        }
                    }
                }

                Ok(matches.first().unwrap())
            }
            None => Err(OcflError::CorruptObject {
                object_id: self.id.clone(),
                message: format!("Digest {} not found in manifest", digest),
            }),
        }
    }

    /// Returns the content path for the logical path within the specified version, or a
    /// `NotFound` error if the path does not exist.
    pub fn content_path_for_logical_path(
        &self,
        logical_path: &LogicalPath,
        version_num: Option<VersionNum>,
    ) -> Result<&Arc<ContentPath>> {
        let version_num = version_num.unwrap_or(self.head);
        let version = self.get_version(version_num)?;

        let digest = match version.lookup_digest(logical_path) {
            Some(digest) => digest.clone(),
            None => {
                return Err(OcflError::NotFound(format!(
                    "Path {} not found in object {} version {}",
                    logical_path, self.id, version_num
                )))
            }
        };

        self.content_path_for_digest(&digest, Some(version_num), Some(logical_path))
    }

    /// Records an alternate-algorithm digest for the specified content paths
    pub(super) fn add_fixity(
        &mut self,
        algorithm: DigestAlgorithm,
        digest: &HexDigest,
        content_paths: Vec<ContentPath>,
    ) {
        let fixity = self.fixity.get_or_insert_with(BTreeMap::new);
        let entry = fixity
            .entry(algorithm.to_string())
            .or_default()
            .entry(digest.to_string())
            .or_default();

        entry.extend(content_paths);
    }

    /// Returns the configured content directory, or the spec default
    pub fn defaulted_content_dir(&self) -> &str {
        match &self.content_directory {
            Some(dir) => dir.as_str(),
            None => DEFAULT_CONTENT_DIR,
        }
    }

    /// Returns the spec version matching the inventory's `type` field
    pub fn spec_version(&self) -> Result<SpecVersion> {
        SpecVersion::try_from_inventory_type(&self.type_declaration)
    }

    /// Performs a consistency check of the inventory's structural invariants. This is
    /// not a full conformance validation.
    pub fn validate(&self) -> Result<()> {
        if !self.versions.contains_key(&self.head) {
            return Err(self.corrupt(format!("HEAD version {} was not found", self.head)));
        }

        let mut expected = 1;
        for version_num in self.versions.keys() {
            if version_num.number != expected {
                return Err(self.corrupt(format!(
                    "Version numbers are not contiguous: expected v{}; found {}",
                    expected, version_num
                )));
            }
            expected += 1;
        }

        if self.head.number != expected - 1 {
            return Err(self.corrupt(format!(
                "HEAD version {} does not match the highest version v{}",
                self.head,
                expected - 1
            )));
        }

        for (version_num, version) in &self.versions {
            for (logical_path, digest) in version.state_iter() {
                if !self.manifest.contains_id(digest) {
                    return Err(self.corrupt(format!(
                        "Digest {} for logical path {} in version {} is missing from the manifest",
                        digest, logical_path, version_num
                    )));
                }
            }

            if let Some(user) = &version.user {
                if user.address.is_some()
                    && user.name.as_ref().map_or(true, |name| name.is_empty())
                {
                    return Err(self.corrupt(format!(
                        "Version {} has a user address but no user name",
                        version_num
                    )));
                }
            }
        }

        for (content_path, _digest) in self.manifest.iter() {
            if let ContentPathVersion::VersionNum(num) = content_path.version {
                if num > self.head {
                    return Err(self.corrupt(format!(
                        "Manifest entry {} references version {} beyond HEAD {}",
                        content_path, num, self.head
                    )));
                }
            }
        }

        Ok(())
    }

    fn corrupt(&self, message: String) -> OcflError {
        OcflError::CorruptObject {
            object_id: self.id.clone(),
            message,
        }
    }
}

impl InventoryBuilder {
    pub fn new(object_id: &str, spec_version: SpecVersion) -> Self {
        Self {
            id: object_id.to_string(),
            spec_version,
            digest_algorithm: DigestAlgorithm::Sha512,
            head: VersionNum::v1(),
            content_directory: DEFAULT_CONTENT_DIR.to_string(),
        }
    }

    pub fn with_digest_algorithm(mut self, digest_algorithm: DigestAlgorithm) -> Self {
        self.digest_algorithm = digest_algorithm;
        self
    }

    pub fn with_content_directory(mut self, content_directory: &str) -> Self {
        self.content_directory = content_directory.to_string();
        self
    }

    /// Builds an inventory with an empty staged v1
    pub fn build(self) -> Result<Inventory> {
        let mut versions = BTreeMap::new();
        versions.insert(self.head, Version::new_staged());

        let inventory = Inventory {
            id: self.id,
            type_declaration: self.spec_version.inventory_type().to_string(),
            digest_algorithm: self.digest_algorithm,
            head: self.head,
            content_directory: Some(self.content_directory),
            fixity: None,
            manifest: PathBiMap::new(),
            versions,
            object_root: "".to_string(),
            storage_path: "".to_string(),
            mutable_head: false,
            revision_num: None,
            inventory_digest: None,
            previous_digest: None,
        };

        inventory.validate()?;

        Ok(inventory)
    }
}

impl Version {
    /// Create a new Version with an empty state
    pub fn new_staged() -> Self {
        Self::staged_version(PathBiMap::new())
    }

    /// Creates a new Version with a copy of this version's state
    pub fn clone_staged(&self) -> Self {
        Self::staged_version(self.state.clone())
    }

    fn staged_version(state: PathBiMap<LogicalPath>) -> Self {
        Self {
            created: Local::now(),
            message: None,
            user: None,
            state,
            logical_dirs: OnceCell::default(),
        }
    }

    /// Applies caller supplied version metadata
    pub(super) fn update_meta(&mut self, info: &VersionInfo, created: DateTime<Local>) {
        self.message = info.message.clone();
        self.user = info.user_name.clone().map(|name| User {
            name: Some(name),
            address: info.user_address.clone(),
        });
        self.created = info.created.unwrap_or(created);
    }

    /// Returns a non-consuming iterator over the version's state
    pub fn state_iter(&self) -> Iter<Arc<LogicalPath>, Arc<HexDigest>> {
        self.state.iter()
    }

    /// Returns the number of logical paths in the version's state
    pub fn state_len(&self) -> usize {
        self.state.len()
    }

    /// Returns a reference to the digest associated to a logical path, or None if the
    /// logical path does not exist in the version's state.
    pub fn lookup_digest(&self, logical_path: &LogicalPath) -> Option<&Arc<HexDigest>> {
        self.state.get_id(logical_path)
    }

    /// Returns true if the version's state contains an entry for the digest
    pub fn contains_digest(&self, digest: &HexDigest) -> bool {
        self.state.contains_id(digest)
    }

    /// Returns true if the specified path exists and is a logical file
    pub fn is_file(&self, path: &LogicalPath) -> bool {
        self.state.contains_path(path)
    }

    /// Returns true if the specified path exists and is a logical directory
    pub fn is_dir(&self, path: &LogicalPath) -> bool {
        self.get_logical_dirs().contains(path)
    }

    /// Returns an error if the specified path conflicts with the existing state. A path
    /// conflicts if a portion of it is interpreted as both a directory and a file.
    pub fn validate_non_conflicting(&self, path: &LogicalPath) -> Result<()> {
        if self.is_dir(path) {
            return Err(OcflError::InvalidState(format!(
                "Conflicting logical path {}: This path is already in use as a directory",
                path
            )));
        }

        for dir in create_logical_dirs(path) {
            if self.is_file(&dir) {
                return Err(OcflError::InvalidState(format!(
                    "Conflicting logical path {}: The path part {} is an existing logical file",
                    path, dir
                )));
            }
        }

        Ok(())
    }

    /// Adds a new logical path to the version's state. The digest MUST also exist in the
    /// inventory manifest for the inventory to be valid.
    pub(super) fn add_file(
        &mut self,
        digest: Arc<HexDigest>,
        logical_path: LogicalPath,
    ) -> Result<()> {
        self.validate_non_conflicting(&logical_path)?;
        if let Some(dirs) = self.logical_dirs.get_mut() {
            dirs.extend(create_logical_dirs(&logical_path));
        }
        self.state.insert_arc(digest, Arc::new(logical_path));

        Ok(())
    }

    /// Removes a logical path from the version's state
    pub(super) fn remove_file(
        &mut self,
        path: &LogicalPath,
    ) -> Option<(Arc<LogicalPath>, Arc<HexDigest>)> {
        // must invalidate the logical dirs
        if self.logical_dirs.get().is_some() {
            self.logical_dirs = OnceCell::default();
        }
        self.state.remove_path(path)
    }

    /// Replaces the version's state with an empty state
    pub(super) fn clear_state(&mut self) {
        if self.logical_dirs.get().is_some() {
            self.logical_dirs = OnceCell::default();
        }
        self.state = PathBiMap::new();
    }

    /// Initializes a HashSet containing all of the logical directories within the version
    fn get_logical_dirs(&self) -> &HashSet<LogicalPath> {
        self.logical_dirs.get_or_init(|| {
            let mut dirs: HashSet<LogicalPath> = HashSet::with_capacity(self.state.len());

            for (path, _) in self.state.iter() {
                dirs.extend(create_logical_dirs(path));
            }

            dirs
        })
    }
}

impl User {
    pub fn new(name: String, address: Option<String>) -> Self {
        Self {
            name: Some(name),
            address,
        }
    }
}

fn create_logical_dirs(path: &LogicalPath) -> HashSet<LogicalPath> {
    let mut dirs = HashSet::new();

    let mut parent = path.parent();
    while !parent.is_empty() {
        let next = parent.parent();
        dirs.insert(parent);
        parent = next;
    }

    dirs
}
