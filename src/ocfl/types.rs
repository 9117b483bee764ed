use core::fmt;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::convert::TryFrom;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Local};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::Visitor;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ocfl::consts::MUTABLE_HEAD_EXT_DIR;
use crate::ocfl::digest::HexDigest;
use crate::ocfl::error::{OcflError, Result};
use crate::ocfl::inventory::{Inventory, Version};
use crate::ocfl::DigestAlgorithm;

static VERSION_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r#"^v\d+$"#).unwrap());

/// Represents an [OCFL object version](https://ocfl.io/1.1/spec/#version-directories).
#[derive(Deserialize, Serialize, Debug, Copy, Clone)]
#[serde(try_from = "String")]
#[serde(into = "String")]
pub struct VersionNum {
    pub number: u32,
    pub width: u32,
}

/// The OCFL spec versions this crate is able to read and write
#[derive(Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Copy, Clone)]
pub enum SpecVersion {
    Ocfl1_0,
    Ocfl1_1,
}

/// Represents the logical path to a file within an object version's state
#[derive(Deserialize, Serialize, Debug, Eq, Ord, PartialOrd, PartialEq, Hash, Clone)]
#[serde(try_from = "String")]
pub struct LogicalPath(String);

/// Represents a path to a content file, relative the object root
#[derive(Debug, Eq, Ord, PartialOrd, PartialEq, Hash, Clone)]
pub struct ContentPath {
    path: String,
    /// The version the content path belongs to. Mutable head extension paths do not
    /// contain a version number.
    pub version: ContentPathVersion,
}

#[derive(Debug, Eq, Ord, PartialOrd, PartialEq, Hash, Copy, Clone)]
pub enum ContentPathVersion {
    VersionNum(VersionNum),
    MutableHead,
}

/// Caller supplied metadata describing a new version
#[derive(Debug, Eq, PartialEq, Clone, Default)]
pub struct VersionInfo {
    pub user_name: Option<String>,
    pub user_address: Option<String>,
    pub message: Option<String>,
    pub created: Option<DateTime<Local>>,
}

/// Options that alter the behavior of individual repository operations
#[derive(Debug, Default, Eq, PartialEq, Copy, Clone)]
pub struct OcflOptions {
    overwrite: bool,
    move_source: bool,
    no_validation: bool,
}

/// Repository-wide defaults applied when creating and upgrading objects
#[derive(Debug, Clone)]
pub struct OcflConfig {
    pub digest_algorithm: DigestAlgorithm,
    pub content_directory: String,
    pub spec_version: SpecVersion,
    pub upgrade_objects_on_write: bool,
}

/// Metadata about an object and all of its versions
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct ObjectDetails {
    pub id: String,
    pub object_root: String,
    pub digest_algorithm: DigestAlgorithm,
    pub spec_version: Option<SpecVersion>,
    pub head: VersionNum,
    pub versions: BTreeMap<VersionNum, VersionDetails>,
}

/// A view of a version of an object, mapping its logical paths to file details
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct ObjectVersion {
    pub id: String,
    pub object_root: String,
    pub digest_algorithm: DigestAlgorithm,
    pub version_details: VersionDetails,
    pub state: HashMap<LogicalPath, FileDetails>,
}

/// Details about a file in an OCFL object
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct FileDetails {
    pub digest: Arc<HexDigest>,
    pub digest_algorithm: DigestAlgorithm,
    pub content_path: Arc<ContentPath>,
    pub last_update: Arc<VersionDetails>,
}

/// Metadata about a version
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct VersionDetails {
    pub version_num: VersionNum,
    pub created: DateTime<Local>,
    pub user_name: Option<String>,
    pub user_address: Option<String>,
    pub message: Option<String>,
}

/// A change made to a logical path in a specific version
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct FileChange {
    pub change_type: FileChangeType,
    pub version_details: VersionDetails,
    /// The content path the logical path resolved to; `None` for removes
    pub content_path: Option<Arc<ContentPath>>,
    /// The file's digest; `None` for removes
    pub digest: Option<Arc<HexDigest>>,
}

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum FileChangeType {
    Update,
    Remove,
}

impl VersionNum {
    /// Creates a new VersionNum with width 0
    pub fn new(number: u32) -> Self {
        Self { number, width: 0 }
    }

    /// Returns v1, the first version of any object
    pub fn v1() -> Self {
        Self::new(1)
    }

    /// Returns the previous version, or an Error if the previous version is invalid (less than 1).
    pub fn previous(&self) -> Result<VersionNum> {
        if self.number <= 1 {
            return Err(OcflError::InvalidState(
                "Versions cannot be less than 1".to_string(),
            ));
        }

        Ok(Self {
            number: self.number - 1,
            width: self.width,
        })
    }

    /// Returns the next version, or an Error if the next version is invalid. Version numbers
    /// only have an upper bound when they are zero-padded.
    pub fn next(&self) -> Result<VersionNum> {
        let max = match self.width {
            0 => u32::MAX,
            _ => 10u32.pow(self.width - 1) - 1,
        };

        if self.number + 1 > max {
            return Err(OcflError::InvalidState(format!(
                "Version cannot be greater than {}",
                max
            )));
        }

        Ok(Self {
            number: self.number + 1,
            width: self.width,
        })
    }
}

impl TryFrom<&str> for VersionNum {
    type Error = OcflError;

    /// Parses a string in the format of `v1` or `v0002` into a `VersionNum`. An error is
    /// returned if the version string is invalid.
    fn try_from(version: &str) -> Result<Self, Self::Error> {
        if !VERSION_REGEX.is_match(version) {
            return Err(OcflError::InvalidInput(format!(
                "Invalid version {}",
                version
            )));
        }

        match version[1..].parse::<u32>() {
            Ok(num) => {
                if num < 1 {
                    return Err(OcflError::InvalidInput(format!(
                        "Invalid version {}",
                        version
                    )));
                }

                let width = match version.starts_with("v0") {
                    true => version.len() - 1,
                    false => 0,
                };

                Ok(Self {
                    number: num,
                    width: width as u32,
                })
            }
            Err(_) => Err(OcflError::InvalidInput(format!(
                "Invalid version {}",
                version
            ))),
        }
    }
}

impl TryFrom<String> for VersionNum {
    type Error = OcflError;

    fn try_from(version: String) -> Result<Self, Self::Error> {
        VersionNum::try_from(version.as_str())
    }
}

impl TryFrom<u32> for VersionNum {
    type Error = OcflError;

    fn try_from(version: u32) -> Result<Self, Self::Error> {
        if version < 1 {
            return Err(OcflError::InvalidInput(format!(
                "Invalid version number {}",
                version
            )));
        }

        Ok(Self {
            number: version,
            width: 0,
        })
    }
}

impl FromStr for VersionNum {
    type Err = OcflError;

    /// Interprets a string as a version if it is formatted like any of these examples:
    /// `v3`, `v00009`, or `8`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match VersionNum::try_from(s) {
            Ok(v) => Ok(v),
            Err(_) => match u32::from_str(s) {
                Ok(parsed) => Ok(VersionNum::try_from(parsed)?),
                Err(_) => Err(OcflError::InvalidInput(format!(
                    "Invalid version number {}",
                    s
                ))),
            },
        }
    }
}

impl fmt::Display for VersionNum {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "v{:0width$}", self.number, width = self.width as usize)
    }
}

impl From<VersionNum> for String {
    fn from(version_num: VersionNum) -> Self {
        format!("{}", version_num)
    }
}

impl PartialEq for VersionNum {
    fn eq(&self, other: &Self) -> bool {
        self.number == other.number
    }
}

impl Eq for VersionNum {}

impl Hash for VersionNum {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.number.hash(state)
    }
}

impl PartialOrd for VersionNum {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VersionNum {
    fn cmp(&self, other: &Self) -> Ordering {
        self.number.cmp(&other.number)
    }
}

impl SpecVersion {
    pub fn version_str(&self) -> &'static str {
        match self {
            SpecVersion::Ocfl1_0 => "1.0",
            SpecVersion::Ocfl1_1 => "1.1",
        }
    }

    /// The value of the inventory `type` field for this spec version
    pub fn inventory_type(&self) -> &'static str {
        match self {
            SpecVersion::Ocfl1_0 => "https://ocfl.io/1.0/spec/#inventory",
            SpecVersion::Ocfl1_1 => "https://ocfl.io/1.1/spec/#inventory",
        }
    }

    pub fn object_namaste_file(&self) -> &'static str {
        match self {
            SpecVersion::Ocfl1_0 => "0=ocfl_object_1.0",
            SpecVersion::Ocfl1_1 => "0=ocfl_object_1.1",
        }
    }

    pub fn object_namaste_content(&self) -> &'static str {
        match self {
            SpecVersion::Ocfl1_0 => "ocfl_object_1.0\n",
            SpecVersion::Ocfl1_1 => "ocfl_object_1.1\n",
        }
    }

    pub fn root_namaste_file(&self) -> &'static str {
        match self {
            SpecVersion::Ocfl1_0 => "0=ocfl_1.0",
            SpecVersion::Ocfl1_1 => "0=ocfl_1.1",
        }
    }

    pub fn root_namaste_content(&self) -> &'static str {
        match self {
            SpecVersion::Ocfl1_0 => "ocfl_1.0\n",
            SpecVersion::Ocfl1_1 => "ocfl_1.1\n",
        }
    }

    /// Maps an inventory `type` value to its spec version
    pub fn try_from_inventory_type(inventory_type: &str) -> Result<SpecVersion> {
        if inventory_type == SpecVersion::Ocfl1_0.inventory_type() {
            Ok(SpecVersion::Ocfl1_0)
        } else if inventory_type == SpecVersion::Ocfl1_1.inventory_type() {
            Ok(SpecVersion::Ocfl1_1)
        } else {
            Err(OcflError::InvalidInput(format!(
                "Unsupported inventory type {}",
                inventory_type
            )))
        }
    }
}

impl LogicalPath {
    /// Returns the parent path, or an empty path if there is no parent
    pub fn parent(&self) -> LogicalPath {
        match self.0.rfind('/') {
            Some(last_slash) => LogicalPath(self.0[0..last_slash].to_string()),
            None => LogicalPath("".to_string()),
        }
    }

    /// Returns the part of the path after the final `/`, or the entire path if there is no `/`
    pub fn filename(&self) -> &str {
        match self.0.rfind('/') {
            Some(last_slash) => &self.0[last_slash + 1..],
            None => &self.0,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl ContentPath {
    pub fn as_str(&self) -> &str {
        &self.path
    }

    /// Returns the part of the path after the version and content directory segments.
    /// For example, `v2/content/dir/file.txt` maps to `dir/file.txt`.
    pub fn path_under_content_dir(&self) -> Option<&str> {
        let prefix_parts = match self.version {
            ContentPathVersion::VersionNum(_) => 2,
            ContentPathVersion::MutableHead => 5,
        };

        let mut index = 0;
        for _ in 0..prefix_parts {
            index = match self.path[index..].find('/') {
                Some(slash) => index + slash + 1,
                None => return None,
            };
        }

        Some(&self.path[index..])
    }
}

impl TryFrom<&str> for LogicalPath {
    type Error = OcflError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let trimmed = value.trim_start_matches('/').trim_end_matches('/');

        if !trimmed.is_empty() {
            let has_illegal_part = trimmed
                .split('/')
                .any(|part| part == "." || part == ".." || part.is_empty());

            if has_illegal_part {
                return Err(OcflError::InvalidInput(format!(
                    "Paths may not contain '.', '..', or '' parts. Found: {}",
                    value
                )));
            }
        }

        Ok(LogicalPath(trimmed.to_string()))
    }
}

impl TryFrom<String> for LogicalPath {
    type Error = OcflError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.as_str().try_into()
    }
}

impl TryFrom<&str> for ContentPath {
    type Error = OcflError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let trimmed = value.trim_start_matches('/').trim_end_matches('/');

        let has_illegal_part = trimmed
            .split('/')
            .any(|part| part == "." || part == ".." || part.is_empty());

        if trimmed.is_empty() || has_illegal_part {
            return Err(OcflError::InvalidInput(format!(
                "Content paths may not be empty or contain '.', '..', or '' parts. Found: {}",
                value
            )));
        }

        // Mutable head paths do not lead with a version number
        let version = if trimmed.starts_with(MUTABLE_HEAD_EXT_DIR) {
            ContentPathVersion::MutableHead
        } else {
            match trimmed.find('/') {
                Some(index) => ContentPathVersion::VersionNum(trimmed[0..index].try_into()?),
                None => {
                    return Err(OcflError::InvalidInput(format!(
                        "Content paths must begin with a valid version number. Found: {}",
                        value
                    )));
                }
            }
        };

        Ok(ContentPath {
            path: trimmed.to_string(),
            version,
        })
    }
}

impl TryFrom<String> for ContentPath {
    type Error = OcflError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ContentPath::try_from(value.as_str())
    }
}

impl AsRef<str> for LogicalPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ContentPath {
    fn as_ref(&self) -> &str {
        &self.path
    }
}

impl Display for LogicalPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for ContentPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}

impl Serialize for ContentPath {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ContentPath {
    fn deserialize<D>(deserializer: D) -> Result<ContentPath, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_str(ContentPathVisitor)
    }
}

struct ContentPathVisitor;

impl<'de> Visitor<'de> for ContentPathVisitor {
    type Value = ContentPath;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        formatter.write_str("a path string that is a valid OCFL content path")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        v.try_into()
            .map_err(|e: OcflError| E::custom(e.to_string()))
    }
}

impl VersionInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the user attribution. `name` must be provided if `address` is provided.
    pub fn with_user(mut self, name: Option<String>, address: Option<String>) -> Result<Self> {
        if address.is_some() && name.is_none() {
            return Err(OcflError::InvalidInput(
                "User name must be set when user address is set.".to_string(),
            ));
        }
        self.user_name = name;
        self.user_address = address;
        Ok(self)
    }

    pub fn with_message(mut self, message: Option<String>) -> Self {
        self.message = message;
        self
    }

    pub fn with_created(mut self, created: Option<DateTime<Local>>) -> Self {
        self.created = created;
        self
    }
}

impl OcflOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace existing logical paths instead of failing
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Consume source files by moving them instead of copying
    pub fn move_source(mut self, move_source: bool) -> Self {
        self.move_source = move_source;
        self
    }

    /// Skip post-operation validation on imports and exports
    pub fn no_validation(mut self, no_validation: bool) -> Self {
        self.no_validation = no_validation;
        self
    }

    pub fn is_overwrite(&self) -> bool {
        self.overwrite
    }

    pub fn is_move_source(&self) -> bool {
        self.move_source
    }

    pub fn is_no_validation(&self) -> bool {
        self.no_validation
    }
}

impl Default for OcflConfig {
    fn default() -> Self {
        Self {
            digest_algorithm: DigestAlgorithm::Sha512,
            content_directory: crate::ocfl::consts::DEFAULT_CONTENT_DIR.to_string(),
            spec_version: SpecVersion::Ocfl1_1,
            upgrade_objects_on_write: false,
        }
    }
}

impl OcflConfig {
    /// Validates that the configured values are legal for new objects
    pub fn validate(&self) -> Result<()> {
        if !self.digest_algorithm.is_inventory_algorithm() {
            return Err(OcflError::InvalidInput(format!(
                "The inventory digest algorithm must be sha512 or sha256. Found: {}",
                self.digest_algorithm
            )));
        }

        if self.content_directory.is_empty()
            || self.content_directory == "."
            || self.content_directory == ".."
            || self.content_directory.contains('/')
        {
            return Err(OcflError::InvalidInput(format!(
                "The content directory cannot equal '.' or '..' and cannot contain a '/'. Found: {}",
                self.content_directory
            )));
        }

        Ok(())
    }
}

impl ObjectDetails {
    /// Creates `ObjectDetails` by consuming the `Inventory`
    pub fn from_inventory(inventory: Inventory) -> Result<Self> {
        let spec_version = SpecVersion::try_from_inventory_type(&inventory.type_declaration).ok();

        let mut versions = BTreeMap::new();
        for (num, version) in inventory.versions {
            versions.insert(num, VersionDetails::from_version(num, version));
        }

        Ok(Self {
            id: inventory.id,
            object_root: inventory.object_root,
            digest_algorithm: inventory.digest_algorithm,
            spec_version,
            head: inventory.head,
            versions,
        })
    }
}

impl ObjectVersion {
    /// Creates an `ObjectVersion` view of the specified version by consuming the `Inventory`.
    /// If no version is specified, the head version is used.
    pub fn from_inventory(inventory: Inventory, version_num: Option<VersionNum>) -> Result<Self> {
        let version_num = version_num.unwrap_or(inventory.head);
        let version = inventory.get_version(version_num)?;
        let version_details = VersionDetails::new(version_num, version);

        let state = ObjectVersion::construct_state(&inventory, version_num)?;

        Ok(Self {
            id: inventory.id,
            object_root: inventory.object_root,
            digest_algorithm: inventory.digest_algorithm,
            version_details,
            state,
        })
    }

    fn construct_state(
        inventory: &Inventory,
        target: VersionNum,
    ) -> Result<HashMap<LogicalPath, FileDetails>> {
        let mut state = HashMap::new();
        let mut update_cache: HashMap<VersionNum, Arc<VersionDetails>> = HashMap::new();

        let target_version = inventory.get_version(target)?;

        for (logical_path, digest) in target_version.state_iter() {
            let logical_path: &LogicalPath = logical_path.as_ref();
            let last_update_num =
                last_update_version(inventory, target, logical_path, digest.as_ref())?;
            let last_update = match update_cache.get(&last_update_num) {
                Some(details) => details.clone(),
                None => {
                    let details = Arc::new(VersionDetails::new(
                        last_update_num,
                        inventory.get_version(last_update_num)?,
                    ));
                    update_cache.insert(last_update_num, details.clone());
                    details
                }
            };

            let content_path = inventory.content_path_for_digest(
                digest.as_ref(),
                Some(target),
                Some(logical_path),
            )?;

            state.insert(
                logical_path.clone(),
                FileDetails {
                    digest: digest.clone(),
                    digest_algorithm: inventory.digest_algorithm,
                    content_path: content_path.clone(),
                    last_update,
                },
            );
        }

        Ok(state)
    }
}

/// Finds the version in which the logical path was last assigned its current digest
fn last_update_version(
    inventory: &Inventory,
    target: VersionNum,
    logical_path: &LogicalPath,
    digest: &HexDigest,
) -> Result<VersionNum> {
    let mut last_update = target;
    let mut current = target;

    while current.number > 1 {
        let previous = current.previous()?;
        match inventory.get_version(previous)?.lookup_digest(logical_path) {
            Some(previous_digest) if **previous_digest == *digest => {
                last_update = previous;
                current = previous;
            }
            _ => break,
        }
    }

    Ok(last_update)
}

impl VersionDetails {
    /// Creates `VersionDetails` by cloning the input version's metadata
    pub fn new(version_num: VersionNum, version: &Version) -> Self {
        let (user, address) = match &version.user {
            Some(user) => (user.name.clone(), user.address.clone()),
            None => (None, None),
        };

        Self {
            version_num,
            created: version.created,
            user_name: user,
            user_address: address,
            message: version.message.clone(),
        }
    }

    /// Creates `VersionDetails` by consuming the input version
    pub fn from_version(version_num: VersionNum, version: Version) -> Self {
        let (user, address) = match version.user {
            Some(user) => (user.name, user.address),
            None => (None, None),
        };

        Self {
            version_num,
            created: version.created,
            user_name: user,
            user_address: address,
            message: version.message,
        }
    }
}
