use std::convert::TryInto;
use std::sync::Arc;

use chrono::{DateTime, Local};

use crate::ocfl::error::{not_found_path, OcflError, Result};
use crate::ocfl::inventory::Inventory;
use crate::ocfl::mapping::{ContentPathConstraint, LogicalPathMapper};
use crate::ocfl::{
    ContentPath, DigestAlgorithm, HexDigest, LogicalPath, OcflConfig, SpecVersion, VersionInfo,
    VersionNum,
};

/// In-memory mutator that builds the next version of an inventory. The updater stages a
/// new version at `head + 1` and records file additions, removals, renames, and
/// reinstatements against it. No file content is touched; callers are responsible for
/// staging content for newly introduced digests and for deleting the staged files the
/// updater reports as orphaned.
pub struct InventoryUpdater {
    inventory: Inventory,
    mapper: Arc<dyn LogicalPathMapper>,
    constraint: Arc<dyn ContentPathConstraint>,
}

/// The outcome of an `add_file` call
#[derive(Debug)]
pub struct AddFileResult {
    /// True if the digest was new to the object and a content path was allocated for it
    pub is_new: bool,
    /// The content path the logical path resolves to
    pub content_path: ContentPath,
    /// A staged content path that was displaced by an overwrite and must be deleted
    pub displaced: Option<ContentPath>,
}

impl InventoryUpdater {
    /// Creates an updater whose working state starts empty. Used for replace-all
    /// semantics against an existing object.
    pub fn blank_state(
        inventory: Inventory,
        mapper: Arc<dyn LogicalPathMapper>,
        constraint: Arc<dyn ContentPathConstraint>,
    ) -> Result<Self> {
        Self::stage(inventory, mapper, constraint, None)
    }

    /// Creates an updater whose working state is a copy of the specified version's state,
    /// defaulting to the head version.
    pub fn copy_state(
        inventory: Inventory,
        src_version: Option<VersionNum>,
        mapper: Arc<dyn LogicalPathMapper>,
        constraint: Arc<dyn ContentPathConstraint>,
    ) -> Result<Self> {
        let src = src_version.unwrap_or(inventory.head);
        Self::stage(inventory, mapper, constraint, Some(src))
    }

    /// Creates an updater for a brand new object. The inventory must be a freshly built
    /// stub whose staged v1 is empty.
    pub fn new_object(
        mut inventory: Inventory,
        mapper: Arc<dyn LogicalPathMapper>,
        constraint: Arc<dyn ContentPathConstraint>,
    ) -> Result<Self> {
        inventory.previous_digest = inventory.inventory_digest.take();
        Ok(Self {
            inventory,
            mapper,
            constraint,
        })
    }

    fn stage(
        mut inventory: Inventory,
        mapper: Arc<dyn LogicalPathMapper>,
        constraint: Arc<dyn ContentPathConstraint>,
        copy_from: Option<VersionNum>,
    ) -> Result<Self> {
        inventory.previous_digest = inventory.inventory_digest.take();
        inventory.stage_next_version(copy_from)?;
        Ok(Self {
            inventory,
            mapper,
            constraint,
        })
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub fn id(&self) -> &str {
        &self.inventory.id
    }

    pub fn head(&self) -> VersionNum {
        self.inventory.head
    }

    pub fn digest_algorithm(&self) -> DigestAlgorithm {
        self.inventory.digest_algorithm
    }

    /// Returns the content path that would be allocated for the logical path. The result
    /// is deterministic: dedup decisions aside, `add_file` allocates exactly this path.
    pub fn content_path_for(&self, logical_path: &LogicalPath) -> Result<ContentPath> {
        let mapped = self.mapper.map(logical_path)?;
        self.constraint.validate(&mapped)?;

        format!(
            "{}/{}/{}",
            self.inventory.head,
            self.inventory.defaulted_content_dir(),
            mapped
        )
        .try_into()
    }

    /// Records a file in the working state. If the digest already exists in the manifest
    /// no content path is allocated and `is_new` is false; the caller must not stage
    /// content for it. Fails with `PathAlreadyExists` when the logical path is occupied
    /// and `overwrite` is false.
    pub fn add_file(
        &mut self,
        digest: HexDigest,
        logical_path: LogicalPath,
        overwrite: bool,
    ) -> Result<AddFileResult> {
        self.inventory
            .head_version()
            .validate_non_conflicting(&logical_path)?;

        let displaced = self.displace(&logical_path, overwrite)?;

        match self.inventory.digest_rc(&digest) {
            Some(existing) => {
                let digest_rc = existing.clone();
                let content_path = self
                    .inventory
                    .content_path_for_digest(&digest, None, Some(&logical_path))?
                    .as_ref()
                    .clone();

                self.inventory
                    .head_version_mut()
                    .add_file(digest_rc, logical_path)?;

                Ok(AddFileResult {
                    is_new: false,
                    content_path,
                    displaced,
                })
            }
            None => {
                let content_path = self.content_path_for(&logical_path)?;
                let digest_rc = Arc::new(digest);

                self.inventory
                    .insert_manifest(digest_rc.clone(), Arc::new(content_path.clone()));
                self.inventory
                    .head_version_mut()
                    .add_file(digest_rc, logical_path)?;

                Ok(AddFileResult {
                    is_new: true,
                    content_path,
                    displaced,
                })
            }
        }
    }

    /// Removes a logical path from the working state. If the path's content was staged
    /// in the in-progress version and is no longer referenced, the manifest entry is
    /// dropped and the staged content path is returned so the caller can delete it.
    pub fn remove_file(&mut self, logical_path: &LogicalPath) -> Option<ContentPath> {
        let removed = self.inventory.head_version_mut().remove_file(logical_path);

        match removed {
            Some((_path, digest)) => self.drop_if_orphaned(&digest),
            None => None,
        }
    }

    /// Moves a logical path within the working state. Fails with `NotFound` if the
    /// source is absent and `PathAlreadyExists` if the destination is occupied and
    /// `overwrite` is false.
    pub fn rename_file(
        &mut self,
        src_path: &LogicalPath,
        dst_path: LogicalPath,
        overwrite: bool,
    ) -> Result<Option<ContentPath>> {
        let digest = match self.inventory.head_version().lookup_digest(src_path) {
            Some(digest) => digest.clone(),
            None => {
                return Err(not_found_path(
                    &self.inventory.id,
                    self.inventory.head,
                    src_path,
                ))
            }
        };

        if dst_path == *src_path {
            return Ok(None);
        }

        let displaced = self.displace(&dst_path, overwrite)?;

        // The destination is added before the source is removed so that a rejected
        // destination leaves the source binding intact
        let head = self.inventory.head_version_mut();
        head.add_file(digest, dst_path)?;
        head.remove_file(src_path);

        Ok(displaced)
    }

    /// Copies a digest binding from a historical version into the working state. Fails
    /// with `NotFound` if the source version does not contain the source path.
    pub fn reinstate_file(
        &mut self,
        src_version: VersionNum,
        src_path: &LogicalPath,
        dst_path: LogicalPath,
        overwrite: bool,
    ) -> Result<Option<ContentPath>> {
        let digest = match self.inventory.get_version(src_version)?.lookup_digest(src_path) {
            Some(digest) => digest.clone(),
            None => return Err(not_found_path(&self.inventory.id, src_version, src_path)),
        };

        let displaced = self.displace(&dst_path, overwrite)?;

        self.inventory
            .head_version_mut()
            .add_file(digest, dst_path)?;

        Ok(displaced)
    }

    /// Empties the working state, returning the staged content paths that are now
    /// orphaned and must be deleted.
    pub fn clear_state(&mut self) -> Vec<ContentPath> {
        self.inventory.head_version_mut().clear_state();

        let prefix = format!("{}/", self.inventory.head);
        let staged: Vec<ContentPath> = self
            .inventory
            .manifest_iter()
            .filter(|(path, _)| path.as_str().starts_with(&prefix))
            .map(|(path, _)| path.as_ref().clone())
            .collect();

        for path in &staged {
            self.inventory.remove_manifest_path(path);
        }

        staged
    }

    /// Records an alternate-algorithm digest for an existing logical path. A digest
    /// supplied for the inventory's own algorithm is checked instead of recorded, and a
    /// mismatch fails with `Fixity`.
    pub fn add_fixity(
        &mut self,
        logical_path: &LogicalPath,
        algorithm: DigestAlgorithm,
        digest: HexDigest,
    ) -> Result<()> {
        let primary = match self.inventory.head_version().lookup_digest(logical_path) {
            Some(primary) => primary.clone(),
            None => {
                return Err(not_found_path(
                    &self.inventory.id,
                    self.inventory.head,
                    logical_path,
                ))
            }
        };

        if algorithm == self.inventory.digest_algorithm {
            if digest != *primary {
                return Err(OcflError::Fixity {
                    path: logical_path.to_string(),
                    algorithm: algorithm.to_string(),
                    expected: primary.to_string(),
                    actual: digest.to_string(),
                });
            }
            return Ok(());
        }

        let content_path = self
            .inventory
            .content_path_for_digest(&primary, None, Some(logical_path))?
            .as_ref()
            .clone();

        self.inventory.add_fixity(algorithm, &digest, vec![content_path]);

        Ok(())
    }

    /// Upgrades the inventory's OCFL spec version if the config requests a newer one.
    /// Returns the new spec version when an upgrade occurred.
    pub fn upgrade_inventory(&mut self, config: &OcflConfig) -> Result<Option<SpecVersion>> {
        if !config.upgrade_objects_on_write {
            return Ok(None);
        }

        let current = self.inventory.spec_version()?;

        if config.spec_version > current {
            self.inventory.type_declaration = config.spec_version.inventory_type().to_string();
            Ok(Some(config.spec_version))
        } else {
            Ok(None)
        }
    }

    /// Finalizes the new version: applies the version metadata, validates the
    /// inventory's invariants, and returns the inventory ready to be written.
    pub fn build(mut self, created: DateTime<Local>, version_info: &VersionInfo) -> Result<Inventory> {
        self.inventory
            .head_version_mut()
            .update_meta(version_info, created);

        self.inventory.validate()?;

        Ok(self.inventory)
    }

    /// Removes an existing binding for the destination path ahead of an add, failing
    /// when the path is occupied and `overwrite` is not set. Overwrites only rebind the
    /// logical path; content staged in this version is dropped when it becomes orphaned.
    fn displace(&mut self, logical_path: &LogicalPath, overwrite: bool) -> Result<Option<ContentPath>> {
        if !self.inventory.head_version().is_file(logical_path) {
            return Ok(None);
        }

        if !overwrite {
            return Err(OcflError::PathAlreadyExists(logical_path.clone()));
        }

        Ok(self.remove_file(logical_path))
    }

    /// Drops the digest's manifest entry if it is no longer referenced by the working
    /// state and all of its content was staged in the in-progress version.
    fn drop_if_orphaned(&mut self, digest: &HexDigest) -> Option<ContentPath> {
        if self.inventory.head_version().contains_digest(digest) {
            return None;
        }

        let prefix = format!("{}/", self.inventory.head);

        let (staged, total) = match self.inventory.content_paths(digest) {
            Some(paths) => {
                let staged: Vec<ContentPath> = paths
                    .iter()
                    .filter(|path| path.as_str().starts_with(&prefix))
                    .map(|path| path.as_ref().clone())
                    .collect();
                (staged, paths.len())
            }
            None => return None,
        };

        // Content referenced by earlier versions must be preserved
        if staged.is_empty() || staged.len() != total {
            return None;
        }

        for path in &staged {
            self.inventory.remove_manifest_path(path);
        }

        staged.into_iter().next()
    }
}

#[cfg(test)]
mod tests {
    use std::convert::TryInto;
    use std::sync::Arc;

    use chrono::Local;

    use crate::ocfl::inventory::Inventory;
    use crate::ocfl::mapping::{BaselinePathConstraint, DirectPathMapper};
    use crate::ocfl::updater::InventoryUpdater;
    use crate::ocfl::{
        DigestAlgorithm, HexDigest, LogicalPath, OcflError, SpecVersion, VersionInfo, VersionNum,
    };

    fn new_updater() -> InventoryUpdater {
        let inventory = Inventory::builder("obj-1", SpecVersion::Ocfl1_1)
            .with_digest_algorithm(DigestAlgorithm::Sha256)
            .build()
            .unwrap();
        InventoryUpdater::new_object(
            inventory,
            Arc::new(DirectPathMapper),
            Arc::new(BaselinePathConstraint),
        )
        .unwrap()
    }

    fn logical(path: &str) -> LogicalPath {
        path.try_into().unwrap()
    }

    fn digest(value: &str) -> HexDigest {
        HexDigest::from(value)
    }

    fn build_and_restage(updater: InventoryUpdater) -> InventoryUpdater {
        let inventory = updater
            .build(Local::now(), &VersionInfo::new())
            .unwrap();
        InventoryUpdater::copy_state(
            inventory,
            None,
            Arc::new(DirectPathMapper),
            Arc::new(BaselinePathConstraint),
        )
        .unwrap()
    }

    #[test]
    fn allocate_content_path_for_new_digest() {
        let mut updater = new_updater();

        let result = updater
            .add_file(digest("aaa"), logical("dir/file.txt"), false)
            .unwrap();

        assert!(result.is_new);
        assert_eq!("v1/content/dir/file.txt", result.content_path.as_str());
        assert!(result.displaced.is_none());
    }

    #[test]
    fn dedup_digest_already_in_manifest() {
        let mut updater = new_updater();

        updater
            .add_file(digest("aaa"), logical("a.txt"), false)
            .unwrap();
        let result = updater
            .add_file(digest("aaa"), logical("copy/a.txt"), false)
            .unwrap();

        assert!(!result.is_new);
        assert_eq!("v1/content/a.txt", result.content_path.as_str());
    }

    #[test]
    fn dedup_across_versions() {
        let mut updater = new_updater();
        updater
            .add_file(digest("aaa"), logical("a.txt"), false)
            .unwrap();

        let mut updater = build_and_restage(updater);
        assert_eq!(VersionNum::new(2), updater.head());

        let result = updater
            .add_file(digest("aaa"), logical("dup/a.txt"), false)
            .unwrap();

        assert!(!result.is_new);
        assert_eq!("v1/content/a.txt", result.content_path.as_str());
    }

    #[test]
    fn reject_occupied_path_without_overwrite() {
        let mut updater = new_updater();
        updater
            .add_file(digest("aaa"), logical("a.txt"), false)
            .unwrap();

        let err = updater
            .add_file(digest("bbb"), logical("a.txt"), false)
            .unwrap_err();

        assert!(matches!(err, OcflError::PathAlreadyExists(_)));
    }

    #[test]
    fn overwrite_drops_orphaned_staged_content() {
        let mut updater = new_updater();
        updater
            .add_file(digest("aaa"), logical("a.txt"), false)
            .unwrap();

        let result = updater
            .add_file(digest("bbb"), logical("a.txt"), true)
            .unwrap();

        assert!(result.is_new);
        assert_eq!(
            "v1/content/a.txt",
            result.displaced.unwrap().as_str()
        );
        assert!(!updater.inventory().contains_digest(&digest("aaa")));
    }

    #[test]
    fn remove_preserves_manifest_for_old_content() {
        let mut updater = new_updater();
        updater
            .add_file(digest("aaa"), logical("a.txt"), false)
            .unwrap();

        let mut updater = build_and_restage(updater);

        assert!(updater.remove_file(&logical("a.txt")).is_none());
        assert!(updater.inventory().contains_digest(&digest("aaa")));
        assert!(!updater.inventory().head_version().is_file(&logical("a.txt")));
    }

    #[test]
    fn remove_drops_staged_content() {
        let mut updater = new_updater();
        updater
            .add_file(digest("aaa"), logical("a.txt"), false)
            .unwrap();

        let removed = updater.remove_file(&logical("a.txt")).unwrap();

        assert_eq!("v1/content/a.txt", removed.as_str());
        assert!(!updater.inventory().contains_digest(&digest("aaa")));
    }

    #[test]
    fn remove_keeps_staged_content_still_referenced() {
        let mut updater = new_updater();
        updater
            .add_file(digest("aaa"), logical("a.txt"), false)
            .unwrap();
        updater
            .add_file(digest("aaa"), logical("b.txt"), false)
            .unwrap();

        assert!(updater.remove_file(&logical("a.txt")).is_none());
        assert!(updater.inventory().contains_digest(&digest("aaa")));
    }

    #[test]
    fn rename_rebinds_digest() {
        let mut updater = new_updater();
        updater
            .add_file(digest("aaa"), logical("a.txt"), false)
            .unwrap();

        updater
            .rename_file(&logical("a.txt"), logical("b.txt"), false)
            .unwrap();

        let head = updater.inventory().head_version();
        assert!(!head.is_file(&logical("a.txt")));
        assert!(head.is_file(&logical("b.txt")));
    }

    #[test]
    fn rename_missing_source_fails() {
        let mut updater = new_updater();

        let err = updater
            .rename_file(&logical("missing.txt"), logical("b.txt"), false)
            .unwrap_err();

        assert!(matches!(err, OcflError::NotFound(_)));
    }

    #[test]
    fn reinstate_from_earlier_version() {
        let mut updater = new_updater();
        updater
            .add_file(digest("aaa"), logical("a.txt"), false)
            .unwrap();

        let mut updater = build_and_restage(updater);
        updater.remove_file(&logical("a.txt"));
        let mut updater = build_and_restage(updater);

        updater
            .reinstate_file(VersionNum::new(1), &logical("a.txt"), logical("a.txt"), false)
            .unwrap();

        let head = updater.inventory().head_version();
        assert_eq!(
            &digest("aaa"),
            head.lookup_digest(&logical("a.txt")).unwrap().as_ref()
        );
    }

    #[test]
    fn reinstate_missing_source_fails() {
        let mut updater = new_updater();
        updater
            .add_file(digest("aaa"), logical("a.txt"), false)
            .unwrap();
        let mut updater = build_and_restage(updater);

        let err = updater
            .reinstate_file(
                VersionNum::new(1),
                &logical("missing.txt"),
                logical("a.txt"),
                true,
            )
            .unwrap_err();

        assert!(matches!(err, OcflError::NotFound(_)));
    }

    #[test]
    fn clear_state_reports_staged_orphans() {
        let mut updater = new_updater();
        updater
            .add_file(digest("aaa"), logical("a.txt"), false)
            .unwrap();
        updater
            .add_file(digest("bbb"), logical("b.txt"), false)
            .unwrap();

        let mut orphans: Vec<String> = updater
            .clear_state()
            .iter()
            .map(|path| path.as_str().to_string())
            .collect();
        orphans.sort();

        assert_eq!(vec!["v1/content/a.txt", "v1/content/b.txt"], orphans);
        assert_eq!(0, updater.inventory().head_version().state_len());
    }

    #[test]
    fn fixity_mismatch_on_primary_algorithm_fails() {
        let mut updater = new_updater();
        updater
            .add_file(digest("aaa"), logical("a.txt"), false)
            .unwrap();

        updater
            .add_fixity(&logical("a.txt"), DigestAlgorithm::Md5, digest("ffff"))
            .unwrap();

        let err = updater
            .add_fixity(&logical("a.txt"), DigestAlgorithm::Sha256, digest("bbb"))
            .unwrap_err();

        assert!(matches!(err, OcflError::Fixity { .. }));
    }

    #[test]
    fn upgrade_inventory_when_configured() {
        let inventory = Inventory::builder("obj-1", SpecVersion::Ocfl1_0)
            .build()
            .unwrap();
        let mut updater = InventoryUpdater::new_object(
            inventory,
            Arc::new(DirectPathMapper),
            Arc::new(BaselinePathConstraint),
        )
        .unwrap();

        let config = crate::ocfl::OcflConfig {
            spec_version: SpecVersion::Ocfl1_1,
            upgrade_objects_on_write: true,
            ..Default::default()
        };

        assert_eq!(
            Some(SpecVersion::Ocfl1_1),
            updater.upgrade_inventory(&config).unwrap()
        );
        // A second call is a no-op
        assert_eq!(None, updater.upgrade_inventory(&config).unwrap());
    }

    #[test]
    fn build_applies_version_meta() {
        let mut updater = new_updater();
        updater
            .add_file(digest("aaa"), logical("a.txt"), false)
            .unwrap();

        let info = VersionInfo::new()
            .with_user(Some("alice".to_string()), None)
            .unwrap()
            .with_message(Some("init".to_string()));

        let inventory = updater.build(Local::now(), &info).unwrap();

        let head = inventory.head_version();
        assert_eq!(Some("init".to_string()), head.message);
        assert_eq!(
            Some("alice".to_string()),
            head.user.as_ref().unwrap().name.clone()
        );
    }
}
