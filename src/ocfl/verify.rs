use std::collections::HashSet;
use std::path::Path;

use walkdir::WalkDir;

use crate::ocfl::consts::MUTABLE_HEAD_HEAD_DIR;
use crate::ocfl::error::{OcflError, Result};
use crate::ocfl::inventory::Inventory;
use crate::ocfl::util;

/// Scans a staged version's content directory and cross-checks it against the newly
/// built manifest and head state. Run after all content has been staged and before the
/// inventory is written.
pub struct VersionContentVerifier<'a> {
    inventory: &'a Inventory,
}

impl<'a> VersionContentVerifier<'a> {
    pub fn new(inventory: &'a Inventory) -> Self {
        Self { inventory }
    }

    /// Verifies that every staged file has a manifest entry whose digest is referenced
    /// by the head version's state, and that every manifest entry belonging to the new
    /// version has a staged file. Any discrepancy fails with the offending paths.
    pub fn verify(&self, staging_dir: &Path) -> Result<()> {
        let content_prefix = self.content_prefix();
        let content_dir = staging_dir.join(self.inventory.defaulted_content_dir());

        let mut problems = Vec::new();
        let mut staged_paths = HashSet::new();

        if content_dir.exists() {
            for entry in WalkDir::new(&content_dir) {
                let entry = entry?;

                if !entry.file_type().is_file() {
                    continue;
                }

                let relative = pathdiff::diff_paths(entry.path(), &content_dir).unwrap();
                let relative = util::convert_backslash_to_forward(&relative.to_string_lossy())
                    .to_string();
                let content_path = format!("{}/{}", content_prefix, relative);

                match content_path.as_str().try_into() {
                    Ok(content_path) => {
                        match self.inventory.digest_for_content_path(&content_path) {
                            Some(digest) => {
                                if !self.inventory.head_version().contains_digest(digest) {
                                    problems.push(format!(
                                        "Staged file {} is not referenced by the version's state",
                                        content_path
                                    ));
                                }
                            }
                            None => problems.push(format!(
                                "Staged file {} has no manifest entry",
                                content_path
                            )),
                        }

                        staged_paths.insert(content_path);
                    }
                    Err(_) => problems.push(format!(
                        "Staged file {} is not a valid content path",
                        content_path
                    )),
                }
            }
        }

        let version_prefix = format!("{}/", content_prefix);
        for (content_path, _digest) in self.inventory.manifest_iter() {
            if content_path.as_str().starts_with(&version_prefix)
                && !staged_paths.contains(content_path.as_ref())
            {
                problems.push(format!(
                    "Manifest entry {} has no staged file",
                    content_path
                ));
            }
        }

        if !problems.is_empty() {
            return Err(OcflError::InvalidState(format!(
                "Staged version {} of object {} failed its consistency check: {}",
                self.inventory.head,
                self.inventory.id,
                problems.join("; ")
            )));
        }

        Ok(())
    }

    /// The content path prefix every file staged for this version must carry
    fn content_prefix(&self) -> String {
        if self.inventory.mutable_head {
            format!(
                "{}/{}/r{}",
                MUTABLE_HEAD_HEAD_DIR,
                self.inventory.defaulted_content_dir(),
                self.inventory.revision_num.unwrap_or(1)
            )
        } else {
            format!(
                "{}/{}",
                self.inventory.head,
                self.inventory.defaulted_content_dir()
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use std::convert::TryInto;
    use std::fs;
    use std::sync::Arc;

    use tempfile::TempDir;

    use crate::ocfl::inventory::Inventory;
    use crate::ocfl::mapping::{BaselinePathConstraint, DirectPathMapper};
    use crate::ocfl::updater::InventoryUpdater;
    use crate::ocfl::verify::VersionContentVerifier;
    use crate::ocfl::{DigestAlgorithm, HexDigest, SpecVersion};

    fn staged_inventory() -> Inventory {
        let inventory = Inventory::builder("obj-1", SpecVersion::Ocfl1_1)
            .with_digest_algorithm(DigestAlgorithm::Sha256)
            .build()
            .unwrap();

        let mut updater = InventoryUpdater::new_object(
            inventory,
            Arc::new(DirectPathMapper),
            Arc::new(BaselinePathConstraint),
        )
        .unwrap();

        updater
            .add_file(
                HexDigest::from("aaa"),
                "dir/file.txt".try_into().unwrap(),
                false,
            )
            .unwrap();

        updater
            .build(chrono::Local::now(), &crate::ocfl::VersionInfo::new())
            .unwrap()
    }

    #[test]
    fn consistent_staging_passes() {
        let staging = TempDir::new().unwrap();
        fs::create_dir_all(staging.path().join("content/dir")).unwrap();
        fs::write(staging.path().join("content/dir/file.txt"), "data").unwrap();

        let inventory = staged_inventory();

        VersionContentVerifier::new(&inventory)
            .verify(staging.path())
            .unwrap();
    }

    #[test]
    fn extra_staged_file_fails() {
        let staging = TempDir::new().unwrap();
        fs::create_dir_all(staging.path().join("content/dir")).unwrap();
        fs::write(staging.path().join("content/dir/file.txt"), "data").unwrap();
        fs::write(staging.path().join("content/stray.txt"), "stray").unwrap();

        let inventory = staged_inventory();

        let err = VersionContentVerifier::new(&inventory)
            .verify(staging.path())
            .unwrap_err();

        assert!(err.to_string().contains("v1/content/stray.txt"));
        assert!(err.to_string().contains("no manifest entry"));
    }

    #[test]
    fn missing_staged_file_fails() {
        let staging = TempDir::new().unwrap();
        fs::create_dir_all(staging.path().join("content")).unwrap();

        let inventory = staged_inventory();

        let err = VersionContentVerifier::new(&inventory)
            .verify(staging.path())
            .unwrap_err();

        assert!(err.to_string().contains("v1/content/dir/file.txt"));
        assert!(err.to_string().contains("no staged file"));
    }
}
