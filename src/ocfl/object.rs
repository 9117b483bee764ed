use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::ocfl::error::Result;
use crate::ocfl::lock::FileLocker;
use crate::ocfl::stage::{stage_stream, AddFileProcessor};
use crate::ocfl::store::OcflStorage;
use crate::ocfl::updater::InventoryUpdater;
use crate::ocfl::{paths, util, ContentPath, DigestAlgorithm, HexDigest, LogicalPath, OcflOptions, VersionNum};

/// The mutation surface handed to `update_object` closures. Every operation delegates to
/// the shared `InventoryUpdater` under the appropriate per-logical-path lock, so the
/// closure may fan work out across threads.
pub struct ObjectUpdater<'a> {
    updater: Mutex<InventoryUpdater>,
    locker: FileLocker,
    store: &'a dyn OcflStorage,
    staging_dir: &'a Path,
    needs_cleanup: AtomicBool,
}

impl<'a> ObjectUpdater<'a> {
    pub(super) fn new(
        updater: InventoryUpdater,
        locker: FileLocker,
        store: &'a dyn OcflStorage,
        staging_dir: &'a Path,
    ) -> Self {
        Self {
            updater: Mutex::new(updater),
            locker,
            store,
            staging_dir,
            needs_cleanup: AtomicBool::new(false),
        }
    }

    /// Recursively adds all regular files beneath the source path at the destination
    /// prefix. An empty prefix addresses the object's root.
    pub fn add_path(
        &self,
        source: impl AsRef<Path>,
        dest_prefix: &str,
        options: OcflOptions,
    ) -> Result<()> {
        let processor = AddFileProcessor::new(&self.updater, &self.locker, self.staging_dir);
        processor.process_path(source.as_ref(), dest_prefix, options)?;

        if processor.needs_empty_dir_cleanup() {
            self.needs_cleanup.store(true, Ordering::Release);
        }

        Ok(())
    }

    /// Adds a single file using a digest the caller asserts is correct
    pub fn add_file_with_digest(
        &self,
        digest: HexDigest,
        source: impl AsRef<Path>,
        logical_path: LogicalPath,
        options: OcflOptions,
    ) -> Result<()> {
        let processor = AddFileProcessor::new(&self.updater, &self.locker, self.staging_dir);
        processor.process_file_with_digest(digest, source.as_ref(), logical_path, options)?;

        if processor.needs_empty_dir_cleanup() {
            self.needs_cleanup.store(true, Ordering::Release);
        }

        Ok(())
    }

    /// Streams bytes into the staged version at the specified logical path
    pub fn write_file(
        &self,
        source: &mut dyn Read,
        logical_path: LogicalPath,
        options: OcflOptions,
    ) -> Result<()> {
        self.locker.with_lock(&logical_path.clone(), || {
            let (digest, target) =
                stage_stream(&self.updater, self.staging_dir, &logical_path, source)?;

            let result = {
                let mut updater = self.updater.lock();
                updater.add_file(digest, logical_path, options.is_overwrite())
            };

            match result {
                Ok(result) => {
                    // When the displaced path is where the new content just landed, the
                    // staged file must survive
                    if let Some(displaced) = &result.displaced {
                        if *displaced != result.content_path {
                            self.delete_staged(displaced)?;
                        }
                    }

                    if !result.is_new {
                        util::remove_file_ignore_not_found(&target)?;
                        self.needs_cleanup.store(true, Ordering::Release);
                    }

                    Ok(())
                }
                Err(e) => {
                    util::remove_file_ignore_not_found(&target)?;
                    self.needs_cleanup.store(true, Ordering::Release);
                    Err(e)
                }
            }
        })
    }

    /// Removes a logical path from the staged version. Content staged in this version
    /// that becomes unreferenced is deleted.
    pub fn remove_file(&self, logical_path: &LogicalPath) -> Result<()> {
        self.locker.with_lock(logical_path, || {
            let removed = self.updater.lock().remove_file(logical_path);

            if let Some(content_path) = removed {
                self.delete_staged(&content_path)?;
            }

            Ok(())
        })
    }

    /// Moves a logical path within the staged version
    pub fn rename_file(
        &self,
        src_path: &LogicalPath,
        dst_path: LogicalPath,
        options: OcflOptions,
    ) -> Result<()> {
        // Both paths are locked in sorted order so concurrent inverse renames cannot
        // deadlock
        let (first, second) = if src_path <= &dst_path {
            (src_path.clone(), dst_path.clone())
        } else {
            (dst_path.clone(), src_path.clone())
        };

        self.locker.with_lock(&first, || {
            let rename = || -> Result<()> {
                let displaced = {
                    let mut updater = self.updater.lock();
                    updater.rename_file(src_path, dst_path.clone(), options.is_overwrite())?
                };

                if let Some(content_path) = displaced {
                    self.delete_staged(&content_path)?;
                }

                Ok(())
            };

            if first == second {
                rename()
            } else {
                self.locker.with_lock(&second, rename)
            }
        })
    }

    /// Copies a digest binding from a historical version into the staged version
    pub fn reinstate_file(
        &self,
        src_version: VersionNum,
        src_path: &LogicalPath,
        dst_path: LogicalPath,
        options: OcflOptions,
    ) -> Result<()> {
        self.locker.with_lock(&dst_path.clone(), || {
            let displaced = {
                let mut updater = self.updater.lock();
                updater.reinstate_file(src_version, src_path, dst_path, options.is_overwrite())?
            };

            if let Some(content_path) = displaced {
                self.delete_staged(&content_path)?;
            }

            Ok(())
        })
    }

    /// Empties the staged version's state, deleting any content staged for it
    pub fn clear_version_state(&self) -> Result<()> {
        let orphaned = self.updater.lock().clear_state();

        for content_path in &orphaned {
            self.delete_staged(content_path)?;
        }

        Ok(())
    }

    /// Opens a reader over the specified logical path in the staged version. Content
    /// introduced by this update is read out of staging; everything else is read from
    /// the backing store.
    pub fn read_file(&self, logical_path: &LogicalPath) -> Result<Box<dyn Read + Send>> {
        let updater = self.updater.lock();
        let inventory = updater.inventory();

        let content_path = inventory.content_path_for_logical_path(logical_path, None)?;
        let staging_prefix = format!("{}/", inventory.head);

        if content_path.as_str().starts_with(&staging_prefix) {
            let staged = paths::staged_content_path(self.staging_dir, content_path);
            Ok(Box::new(File::open(staged)?))
        } else {
            self.store.open_content(inventory, content_path)
        }
    }

    /// Records an alternate-algorithm digest for a logical path in the staged version
    pub fn add_file_fixity(
        &self,
        logical_path: &LogicalPath,
        algorithm: DigestAlgorithm,
        digest: HexDigest,
    ) -> Result<()> {
        self.updater.lock().add_fixity(logical_path, algorithm, digest)
    }

    /// Tears the surface down, returning the inventory updater and whether staged
    /// content was deleted along the way
    pub(super) fn finish(self) -> (InventoryUpdater, bool) {
        (
            self.updater.into_inner(),
            self.needs_cleanup.load(Ordering::Acquire),
        )
    }

    fn delete_staged(&self, content_path: &ContentPath) -> Result<()> {
        let staged = paths::staged_content_path(self.staging_dir, content_path);
        util::remove_file_ignore_not_found(&staged)?;
        self.needs_cleanup.store(true, Ordering::Release);
        Ok(())
    }
}
