use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use log::{error, info};
use parking_lot::Mutex;
use uuid::Uuid;
use walkdir::WalkDir;

use crate::ocfl::error::{OcflError, Result};
use crate::ocfl::inventory::Inventory;
use crate::ocfl::lock::FileLocker;
use crate::ocfl::updater::InventoryUpdater;
use crate::ocfl::{consts, paths, util, ContentPath, HexDigest, LogicalPath, OcflOptions};

/// A uniquely named scratch directory beneath the repository's work directory. The
/// directory is deleted when the value is dropped, which guarantees cleanup on every
/// exit path of a mutation.
pub struct StagingDir {
    path: PathBuf,
}

impl StagingDir {
    pub fn new(work_dir: &Path) -> Result<Self> {
        let path = work_dir.join(Uuid::new_v4().to_string());
        fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the staged location of the version's content directory
    pub fn content_dir(&self, content_dir_name: &str) -> PathBuf {
        self.path.join(content_dir_name)
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if let Err(e) = util::remove_dir_all_ignore_not_found(&self.path) {
            error!(
                "Failed to remove staging directory {}: {}",
                self.path.to_string_lossy(),
                e
            );
        }
    }
}

/// Walks source trees and feeds each regular file into the `InventoryUpdater`, staging
/// content for digests that are new to the object. The updater is shared behind a mutex
/// so that multiple threads may process files concurrently; per-logical-path serialization
/// is provided by the `FileLocker`.
pub struct AddFileProcessor<'a> {
    updater: &'a Mutex<InventoryUpdater>,
    locker: &'a FileLocker,
    staging_dir: &'a Path,
    needs_cleanup: AtomicBool,
}

impl<'a> AddFileProcessor<'a> {
    pub fn new(
        updater: &'a Mutex<InventoryUpdater>,
        locker: &'a FileLocker,
        staging_dir: &'a Path,
    ) -> Self {
        Self {
            updater,
            locker,
            staging_dir,
            needs_cleanup: AtomicBool::new(false),
        }
    }

    /// True if deduplicated files were deleted out of the staged content directory,
    /// meaning empty directories may have been left behind.
    pub fn needs_empty_dir_cleanup(&self) -> bool {
        self.needs_cleanup.load(Ordering::Acquire)
    }

    /// Recursively processes the source path, adding every regular file to the staged
    /// version. Returns a map of the logical paths that introduced new content to the
    /// absolute paths of their staged files; deduplicated files are not included.
    pub fn process_path(
        &self,
        source: &Path,
        dest_prefix: &str,
        options: OcflOptions,
    ) -> Result<HashMap<LogicalPath, PathBuf>> {
        let mut staged = HashMap::new();

        if source.is_file() {
            let logical_path: LogicalPath = if dest_prefix.is_empty() {
                file_name(source)?.try_into()?
            } else {
                dest_prefix.try_into()?
            };

            if let Some(target) = self.process_file(source, logical_path.clone(), options)? {
                staged.insert(logical_path, target);
            }

            return Ok(staged);
        }

        if !source.is_dir() {
            return Err(OcflError::InvalidInput(format!(
                "Source {} is not a file or directory",
                source.to_string_lossy()
            )));
        }

        for entry in WalkDir::new(source).follow_links(true) {
            let entry = entry?;

            if !entry.file_type().is_file() {
                continue;
            }

            let relative = pathdiff::diff_paths(entry.path(), source).unwrap();
            let relative = util::convert_backslash_to_forward(&relative.to_string_lossy())
                .to_string();
            let logical_path: LogicalPath = paths::join(dest_prefix, &relative).try_into()?;

            if let Some(target) = self.process_file(entry.path(), logical_path.clone(), options)? {
                staged.insert(logical_path, target);
            }
        }

        Ok(staged)
    }

    /// Adds a single file using a digest the caller asserts is correct, skipping the
    /// hashing pass. Used by replication flows with trusted digests.
    pub fn process_file_with_digest(
        &self,
        digest: HexDigest,
        source: &Path,
        logical_path: LogicalPath,
        options: OcflOptions,
    ) -> Result<Option<PathBuf>> {
        if !source.is_file() {
            return Err(OcflError::InvalidInput(format!(
                "Source {} is not a regular file",
                source.to_string_lossy()
            )));
        }

        self.locker.with_lock(&logical_path.clone(), || {
            let result = {
                let mut updater = self.updater.lock();
                updater.add_file(digest, logical_path, options.is_overwrite())?
            };

            if let Some(displaced) = &result.displaced {
                self.delete_staged(displaced)?;
            }

            if !result.is_new {
                return Ok(None);
            }

            let target = paths::staged_content_path(self.staging_dir, &result.content_path);
            fs::create_dir_all(target.parent().unwrap())?;

            if options.is_move_source() {
                fs::rename(source, &target).map_err(|e| io_error_with_path(e, source))?;
            } else {
                let mut reader =
                    File::open(source).map_err(|e| io_error_with_path(e, source))?;
                io::copy(&mut reader, &mut File::create(&target)?)
                    .map_err(|e| io_error_with_path(e, source))?;
            }

            Ok(Some(target))
        })
    }

    fn process_file(
        &self,
        source: &Path,
        logical_path: LogicalPath,
        options: OcflOptions,
    ) -> Result<Option<PathBuf>> {
        self.locker.with_lock(&logical_path.clone(), || {
            if options.is_move_source() {
                self.move_file(source, logical_path, options)
            } else {
                self.copy_file(source, logical_path, options)
            }
        })
    }

    /// Streams the source through a digest computing sink into the staged content
    /// location, then records it. If the digest turns out to be a duplicate, the staged
    /// copy is deleted again.
    fn copy_file(
        &self,
        source: &Path,
        logical_path: LogicalPath,
        options: OcflOptions,
    ) -> Result<Option<PathBuf>> {
        let (provisional, algorithm) = {
            let updater = self.updater.lock();
            (
                updater.content_path_for(&logical_path)?,
                updater.digest_algorithm(),
            )
        };

        let target = paths::staged_content_path(self.staging_dir, &provisional);
        fs::create_dir_all(target.parent().unwrap())?;

        let file = File::open(source).map_err(|e| io_error_with_path(e, source))?;
        let mut reader = algorithm.reader(file);
        io::copy(&mut reader, &mut File::create(&target)?)
            .map_err(|e| io_error_with_path(e, source))?;
        let digest = reader.finalize_hex();

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

                if result.is_new {
                    Ok(Some(target))
                } else {
                    info!(
                        "Deleting duplicate staged file: {}",
                        target.to_string_lossy()
                    );
                    util::remove_file_ignore_not_found(&target)?;
                    self.needs_cleanup.store(true, Ordering::Release);
                    Ok(None)
                }
            }
            Err(e) => {
                util::remove_file_ignore_not_found(&target)?;
                self.needs_cleanup.store(true, Ordering::Release);
                Err(e)
            }
        }
    }

    /// Digests the source in place and moves it into staging when its content is new to
    /// the object. Deduplicated sources are left alone for the caller to dispose of.
    fn move_file(
        &self,
        source: &Path,
        logical_path: LogicalPath,
        options: OcflOptions,
    ) -> Result<Option<PathBuf>> {
        let algorithm = self.updater.lock().digest_algorithm();

        let mut file = File::open(source).map_err(|e| io_error_with_path(e, source))?;
        let digest = algorithm.hash_hex(&mut file)?;

        let result = {
            let mut updater = self.updater.lock();
            updater.add_file(digest, logical_path, options.is_overwrite())?
        };

        if let Some(displaced) = &result.displaced {
            if *displaced != result.content_path {
                self.delete_staged(displaced)?;
            }
        }

        if !result.is_new {
            return Ok(None);
        }

        let target = paths::staged_content_path(self.staging_dir, &result.content_path);
        fs::create_dir_all(target.parent().unwrap())?;
        fs::rename(source, &target).map_err(|e| io_error_with_path(e, source))?;

        Ok(Some(target))
    }

    fn delete_staged(&self, content_path: &ContentPath) -> Result<()> {
        let target = paths::staged_content_path(self.staging_dir, content_path);
        info!("Deleting displaced staged file: {}", target.to_string_lossy());
        util::remove_file_ignore_not_found(&target)?;
        self.needs_cleanup.store(true, Ordering::Release);
        Ok(())
    }
}

/// Serializes the inventory to `dir/inventory.json` while computing its digest, writes
/// the `inventory.json.<algorithm>` sidecar, and records the digest on the inventory.
pub fn write_inventory(inventory: &mut Inventory, dir: &Path) -> Result<()> {
    let inventory_path = paths::inventory_path(dir);
    let sidecar_path = paths::sidecar_path(dir, inventory.digest_algorithm);

    let mut writer = inventory
        .digest_algorithm
        .writer(BufWriter::new(File::create(&inventory_path)?));

    serde_json::to_writer(&mut writer, inventory)?;
    writer.flush()?;

    let digest = writer.finalize_hex();

    let mut sidecar = File::create(&sidecar_path)?;
    writeln!(sidecar, "{}  {}", digest, consts::INVENTORY_FILE)?;

    inventory.inventory_digest = Some(digest);

    Ok(())
}

/// Writes a stream into the staged content location for the logical path, computing its
/// digest along the way. Returns the digest and the staged location.
pub fn stage_stream(
    updater: &Mutex<InventoryUpdater>,
    staging_dir: &Path,
    logical_path: &LogicalPath,
    source: &mut dyn Read,
) -> Result<(HexDigest, PathBuf)> {
    let (provisional, algorithm) = {
        let updater = updater.lock();
        (
            updater.content_path_for(logical_path)?,
            updater.digest_algorithm(),
        )
    };

    let target = paths::staged_content_path(staging_dir, &provisional);
    fs::create_dir_all(target.parent().unwrap())?;

    let mut writer = algorithm.writer(BufWriter::new(File::create(&target)?));
    io::copy(source, &mut writer)?;
    writer.flush()?;

    Ok((writer.finalize_hex(), target))
}

fn io_error_with_path(e: io::Error, path: &Path) -> OcflError {
    OcflError::Io(io::Error::new(
        e.kind(),
        format!("{}: {}", path.display(), e),
    ))
}

fn file_name(path: &Path) -> Result<&str> {
    match path.file_name() {
        Some(name) => Ok(name.to_str().ok_or_else(|| {
            OcflError::InvalidInput(format!(
                "Path {} is not valid UTF-8",
                path.to_string_lossy()
            ))
        })?),
        None => Err(OcflError::InvalidInput(format!(
            "Path {} does not name a file",
            path.to_string_lossy()
        ))),
    }
}
