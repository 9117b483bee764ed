use core::fmt;
use std::fmt::{Display, Formatter};
use std::fs::{self, File};
use std::path::Path;

use walkdir::WalkDir;

use crate::ocfl::consts::EXTENSIONS_DIR;
use crate::ocfl::error::Result;
use crate::ocfl::inventory::Inventory;
use crate::ocfl::{paths, util, ContentPath, HexDigest, SpecVersion};

/// The problems found while validating an object. `Err` results are reserved for
/// non-validation failures; validation problems are reported here.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct ValidationResults {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResults {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    fn error(&mut self, message: String) {
        self.errors.push(message);
    }

    fn warn(&mut self, message: String) {
        self.warnings.push(message);
    }
}

impl Display for ValidationResults {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for error in &self.errors {
            writeln!(f, "Error: {}", error)?;
        }
        for warning in &self.warnings {
            writeln!(f, "Warning: {}", warning)?;
        }
        Ok(())
    }
}

/// Validates the structure of the OCFL object rooted at the specified path. This is a
/// spot check of the invariants the repository relies on, not a full conformance
/// validation: namaste, inventory parse, sidecar agreement, version directories, and
/// manifest/content agreement. When `content_fixity_check` is true every content file
/// is additionally digested and compared against the manifest.
pub fn validate_object_at(
    object_root: &Path,
    content_fixity_check: bool,
) -> Result<ValidationResults> {
    let mut results = ValidationResults::default();

    if !object_root.is_dir() {
        results.error(format!(
            "Object root {} does not exist",
            object_root.to_string_lossy()
        ));
        return Ok(results);
    }

    if find_namaste(object_root).is_none() {
        results.error("Object namaste file is missing".to_string());
    }

    let inventory = match load_and_check_inventory(object_root, &mut results)? {
        Some(inventory) => inventory,
        None => return Ok(results),
    };

    if let Err(e) = inventory.validate() {
        results.error(e.to_string());
        return Ok(results);
    }

    for version_num in inventory.versions.keys() {
        let version_dir = paths::version_path(object_root, *version_num);
        if !version_dir.is_dir() {
            results.error(format!("Version directory {} is missing", version_num));
        } else if !paths::inventory_path(&version_dir).is_file() {
            results.warn(format!(
                "Version directory {} is missing its inventory copy",
                version_num
            ));
        }
    }

    check_content(object_root, &inventory, content_fixity_check, &mut results)?;

    Ok(results)
}

fn find_namaste(object_root: &Path) -> Option<SpecVersion> {
    for version in [SpecVersion::Ocfl1_1, SpecVersion::Ocfl1_0] {
        if paths::object_namaste_path(object_root, version).is_file() {
            return Some(version);
        }
    }
    None
}

fn load_and_check_inventory(
    object_root: &Path,
    results: &mut ValidationResults,
) -> Result<Option<Inventory>> {
    let inventory_path = paths::inventory_path(object_root);

    if !inventory_path.is_file() {
        results.error("Inventory file is missing".to_string());
        return Ok(None);
    }

    let bytes = fs::read(&inventory_path)?;

    let inventory: Inventory = match serde_json::from_slice(&bytes) {
        Ok(inventory) => inventory,
        Err(e) => {
            results.error(format!("Inventory failed to parse: {}", e));
            return Ok(None);
        }
    };

    let sidecar_path = paths::sidecar_path(object_root, inventory.digest_algorithm);

    match fs::read_to_string(&sidecar_path) {
        Ok(sidecar) => {
            let expected = sidecar.split_whitespace().next().unwrap_or("");
            let actual = inventory
                .digest_algorithm
                .hash_hex(&mut bytes.as_slice())?;

            if HexDigest::from(expected) != actual {
                results.error(format!(
                    "Inventory digest {} does not match its sidecar {}",
                    actual, expected
                ));
            }
        }
        Err(_) => results.error(format!(
            "Inventory sidecar {} is missing",
            sidecar_path.to_string_lossy()
        )),
    }

    Ok(Some(inventory))
}

/// Verifies that manifest entries and on-disk content files agree, optionally checking
/// content fixity.
fn check_content(
    object_root: &Path,
    inventory: &Inventory,
    content_fixity_check: bool,
    results: &mut ValidationResults,
) -> Result<()> {
    for (content_path, digest) in inventory.manifest_iter() {
        let storage_path = object_root.join(content_path.as_str());

        if !storage_path.is_file() {
            results.error(format!("Content file {} is missing", content_path));
            continue;
        }

        if content_fixity_check {
            let actual = inventory
                .digest_algorithm
                .hash_hex(&mut File::open(&storage_path)?)?;

            if actual != **digest {
                results.error(format!(
                    "Content file {} failed its fixity check: expected {} {}; found {}",
                    content_path, inventory.digest_algorithm, digest, actual
                ));
            }
        }
    }

    // Files on disk that the manifest does not reference
    for entry in fs::read_dir(object_root)? {
        let entry = entry?;

        if !entry.file_type()?.is_dir() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().to_string();
        if name == EXTENSIONS_DIR {
            continue;
        }

        let content_dir = entry.path().join(inventory.defaulted_content_dir());
        if !content_dir.is_dir() {
            continue;
        }

        for file in WalkDir::new(&content_dir) {
            let file = file?;
            if !file.file_type().is_file() {
                continue;
            }

            let relative = pathdiff::diff_paths(file.path(), object_root).unwrap();
            let relative = util::convert_backslash_to_forward(&relative.to_string_lossy())
                .to_string();

            match ContentPath::try_from(relative.as_str()) {
                Ok(content_path) => {
                    if !inventory.contains_content_path(&content_path) {
                        results.error(format!(
                            "Content file {} is not referenced by the manifest",
                            content_path
                        ));
                    }
                }
                Err(_) => results.error(format!(
                    "File {} is not a valid content path",
                    relative
                )),
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use crate::ocfl::validate::validate_object_at;

    const INVENTORY: &str = r#"{
  "id": "obj-1",
  "type": "https://ocfl.io/1.1/spec/#inventory",
  "digestAlgorithm": "sha256",
  "head": "v1",
  "contentDirectory": "content",
  "manifest": {
    "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824": ["v1/content/a.txt"]
  },
  "versions": {
    "v1": {
      "created": "2023-05-01T12:00:00Z",
      "state": {
        "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824": ["a.txt"]
      },
      "message": "init"
    }
  }
}"#;

    fn write_object(root: &std::path::Path) {
        fs::write(root.join("0=ocfl_object_1.1"), "ocfl_object_1.1\n").unwrap();
        fs::write(root.join("inventory.json"), INVENTORY).unwrap();

        let digest = crate::ocfl::DigestAlgorithm::Sha256
            .hash_hex(&mut INVENTORY.as_bytes())
            .unwrap();
        fs::write(
            root.join("inventory.json.sha256"),
            format!("{}  inventory.json\n", digest),
        )
        .unwrap();

        fs::create_dir_all(root.join("v1/content")).unwrap();
        // sha256 of "hello"
        fs::write(root.join("v1/content/a.txt"), "hello").unwrap();
        fs::write(root.join("v1/inventory.json"), INVENTORY).unwrap();
    }

    #[test]
    fn valid_object_passes() {
        let root = TempDir::new().unwrap();
        write_object(root.path());

        let results = validate_object_at(root.path(), true).unwrap();

        assert!(!results.has_errors(), "unexpected errors: {}", results);
    }

    #[test]
    fn corrupt_content_fails_fixity() {
        let root = TempDir::new().unwrap();
        write_object(root.path());
        fs::write(root.path().join("v1/content/a.txt"), "tampered").unwrap();

        let results = validate_object_at(root.path(), true).unwrap();

        assert!(results.has_errors());
        assert!(results.errors[0].contains("fixity"));
    }

    #[test]
    fn missing_sidecar_is_an_error() {
        let root = TempDir::new().unwrap();
        write_object(root.path());
        fs::remove_file(root.path().join("inventory.json.sha256")).unwrap();

        let results = validate_object_at(root.path(), false).unwrap();

        assert!(results.has_errors());
        assert!(results.errors[0].contains("sidecar"));
    }

    #[test]
    fn unreferenced_content_is_an_error() {
        let root = TempDir::new().unwrap();
        write_object(root.path());
        fs::write(root.path().join("v1/content/stray.txt"), "stray").unwrap();

        let results = validate_object_at(root.path(), false).unwrap();

        assert!(results.has_errors());
        assert!(results.errors[0].contains("not referenced"));
    }
}
