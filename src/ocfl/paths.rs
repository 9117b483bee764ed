use std::path::{Path, PathBuf};

use crate::ocfl::consts::*;
use crate::ocfl::{ContentPath, DigestAlgorithm, SpecVersion, VersionNum};

/// Returns the path to `inventory.json` within the specified directory
pub fn inventory_path<P>(dir: P) -> PathBuf
where
    P: AsRef<Path>,
{
    dir.as_ref().join(INVENTORY_FILE)
}

/// Returns the path to `inventory.json.ALGO` within the specified directory
pub fn sidecar_path<P>(dir: P, algorithm: DigestAlgorithm) -> PathBuf
where
    P: AsRef<Path>,
{
    dir.as_ref().join(sidecar_name(algorithm))
}

/// Returns the name of an inventory sidecar for the specified algorithm
pub fn sidecar_name(algorithm: DigestAlgorithm) -> String {
    format!("{}.{}", INVENTORY_FILE, algorithm)
}

/// Returns the path to an object's namaste file
pub fn object_namaste_path<P>(dir: P, version: SpecVersion) -> PathBuf
where
    P: AsRef<Path>,
{
    dir.as_ref().join(version.object_namaste_file())
}

/// Returns the path to the storage root's namaste file
pub fn root_namaste_path<P>(dir: P, version: SpecVersion) -> PathBuf
where
    P: AsRef<Path>,
{
    dir.as_ref().join(version.root_namaste_file())
}

/// Returns the path to the `ocfl_layout.json` file within the storage root
pub fn ocfl_layout_path<P>(storage_root: P) -> PathBuf
where
    P: AsRef<Path>,
{
    storage_root.as_ref().join(OCFL_LAYOUT_FILE)
}

/// Returns the path to the version directory within the object root
pub fn version_path<P>(object_root: P, version_num: VersionNum) -> PathBuf
where
    P: AsRef<Path>,
{
    object_root.as_ref().join(version_num.to_string())
}

/// Returns the location of a content path staged within a version directory. Content
/// paths are relative the object root, so the leading version segment is dropped.
pub fn staged_content_path<P>(version_dir: P, content_path: &ContentPath) -> PathBuf
where
    P: AsRef<Path>,
{
    let relative = match content_path.as_str().find('/') {
        Some(slash) => &content_path.as_str()[slash + 1..],
        None => content_path.as_str(),
    };
    version_dir.as_ref().join(relative)
}

/// Joins two logical path parts, inserting a `/` if needed
pub fn join(part1: &str, part2: &str) -> String {
    let mut joined = match part1.ends_with('/') {
        true => part1[..part1.len() - 1].to_string(),
        false => part1.to_string(),
    };

    if !part2.is_empty() {
        if !joined.is_empty() && !part2.starts_with('/') {
            joined.push('/');
        }
        joined.push_str(part2);
    }

    joined
}

#[cfg(test)]
mod tests {
    use std::convert::TryFrom;

    use crate::ocfl::paths;
    use crate::ocfl::ContentPath;

    #[test]
    fn join_logical_parts() {
        assert_eq!("a/b", paths::join("a", "b"));
        assert_eq!("a/b", paths::join("a/", "b"));
        assert_eq!("b", paths::join("", "b"));
        assert_eq!("a", paths::join("a", ""));
    }

    #[test]
    fn staged_path_drops_version_segment() {
        let content = ContentPath::try_from("v2/content/dir/file.txt").unwrap();
        let staged = paths::staged_content_path("/tmp/staging", &content);
        assert_eq!("/tmp/staging/content/dir/file.txt", staged.to_string_lossy());
    }
}
