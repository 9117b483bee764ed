use std::collections::hash_map::{IntoIter, Iter};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::fmt::Formatter;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::{DeserializeOwned, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ocfl::digest::HexDigest;

/// A bidirectional map between digests and sets of paths. A digest may have many paths,
/// but a path maps to exactly one digest. Entries are `Arc` shared so that the same
/// digest may be referenced from a manifest and many version states without copying.
#[derive(Debug, Clone)]
pub struct PathBiMap<P>
where
    P: Eq + Hash + Ord + DeserializeOwned + Serialize,
{
    id_to_paths: HashMap<Arc<HexDigest>, HashSet<Arc<P>>>,
    path_to_id: HashMap<Arc<P>, Arc<HexDigest>>,
}

impl<P> PathBiMap<P>
where
    P: Eq + Hash + Ord + DeserializeOwned + Serialize,
{
    pub fn new() -> Self {
        Self {
            id_to_paths: HashMap::new(),
            path_to_id: HashMap::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            id_to_paths: HashMap::with_capacity(capacity),
            path_to_id: HashMap::with_capacity(capacity),
        }
    }

    /// Inserts a new id to path mapping. If the path already has a mapping, then the
    /// existing mapping is removed.
    pub fn insert(&mut self, id: HexDigest, path: P) {
        self.insert_arc(Arc::new(id), Arc::new(path));
    }

    /// Same as `insert`, but it accepts Arc values
    pub fn insert_arc(&mut self, id_ref: Arc<HexDigest>, path_ref: Arc<P>) {
        if self.path_to_id.contains_key(&path_ref) {
            self.remove_path(&path_ref);
        }

        let entry = self.id_to_paths.entry(id_ref);
        let id_ref = entry.key().clone();

        entry.or_default().insert(path_ref.clone());

        self.path_to_id.insert(path_ref, id_ref);
    }

    /// Inserts all of the path mappings for an id. This is used for deserialization.
    fn insert_multiple(&mut self, id: HexDigest, paths: Vec<P>) {
        if paths.is_empty() {
            return;
        }

        let id_ref = Arc::new(id);

        let set = self.id_to_paths.entry(id_ref.clone()).or_default();

        for path in paths {
            let path_ref = Arc::new(path);
            set.insert(path_ref.clone());
            self.path_to_id.insert(path_ref, id_ref.clone());
        }
    }

    /// Gets all of the paths associated with an id
    pub fn get_paths(&self, id: &HexDigest) -> Option<&HashSet<Arc<P>>> {
        self.id_to_paths.get(id)
    }

    /// Gets the id associated with a path
    pub fn get_id(&self, path: &P) -> Option<&Arc<HexDigest>> {
        self.path_to_id.get(path)
    }

    /// Gets the underlying Arc value of the specified id if it exists
    pub fn get_id_rc(&self, id: &HexDigest) -> Option<&Arc<HexDigest>> {
        self.id_to_paths.get_key_value(id).map(|(id, _)| id)
    }

    /// True, if a mapping exists for the path
    pub fn contains_path(&self, path: &P) -> bool {
        self.path_to_id.contains_key(path)
    }

    /// True, if a mapping exists for the id
    pub fn contains_id(&self, id: &HexDigest) -> bool {
        self.id_to_paths.contains_key(id)
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_paths.is_empty()
    }

    /// Removes a path mapping. The digest entry is removed entirely when its last path
    /// is removed.
    pub fn remove_path(&mut self, path: &P) -> Option<(Arc<P>, Arc<HexDigest>)> {
        if let Some((path, id)) = self.path_to_id.remove_entry(path) {
            let mut remove = false;
            if let Some(paths) = self.id_to_paths.get_mut(&id) {
                paths.remove(path.as_ref());
                remove = paths.is_empty();
            }
            if remove {
                self.id_to_paths.remove(&id);
            }
            Some((path, id))
        } else {
            None
        }
    }

    /// Returns an iterator that iterates over references to all path-id pairs
    pub fn iter(&self) -> Iter<Arc<P>, Arc<HexDigest>> {
        self.path_to_id.iter()
    }

    /// Returns an iterator that iterates over id-paths pairs
    pub fn iter_id_paths(&self) -> Iter<Arc<HexDigest>, HashSet<Arc<P>>> {
        self.id_to_paths.iter()
    }

    /// Returns the number of path-id pairs in the map
    pub fn len(&self) -> usize {
        self.path_to_id.len()
    }
}

impl<P> Default for PathBiMap<P>
where
    P: Eq + Hash + Ord + DeserializeOwned + Serialize,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<P> PartialEq for PathBiMap<P>
where
    P: Eq + Hash + Ord + DeserializeOwned + Serialize,
{
    fn eq(&self, other: &Self) -> bool {
        self.path_to_id == other.path_to_id
    }
}

impl<P> Eq for PathBiMap<P> where P: Eq + Hash + Ord + DeserializeOwned + Serialize {}

impl<P> IntoIterator for PathBiMap<P>
where
    P: Eq + Hash + Ord + DeserializeOwned + Serialize,
{
    type Item = (Arc<P>, Arc<HexDigest>);
    type IntoIter = IntoIter<Arc<P>, Arc<HexDigest>>;

    fn into_iter(self) -> Self::IntoIter {
        self.path_to_id.into_iter()
    }
}

struct PathBiMapVisitor<P>
where
    P: Eq + Hash + Ord + DeserializeOwned + Serialize,
{
    brand: PhantomData<P>,
}

impl<'a, P> Visitor<'a> for PathBiMapVisitor<P>
where
    P: Eq + Hash + Ord + DeserializeOwned + Serialize,
{
    type Value = PathBiMap<P>;

    fn expecting(&self, formatter: &mut Formatter) -> fmt::Result {
        formatter.write_str("a map of digests to paths")
    }

    fn visit_map<M: MapAccess<'a>>(self, mut access: M) -> Result<Self::Value, M::Error> {
        let mut map = PathBiMap::with_capacity(access.size_hint().unwrap_or(0));

        while let Some((key, value)) = access.next_entry()? {
            map.insert_multiple(key, value);
        }

        Ok(map)
    }
}

impl<'a, P> Deserialize<'a> for PathBiMap<P>
where
    P: Eq + Hash + Ord + DeserializeOwned + Serialize,
{
    fn deserialize<D: Deserializer<'a>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(PathBiMapVisitor {
            brand: Default::default(),
        })
    }
}

impl<P> Serialize for PathBiMap<P>
where
    P: Eq + Hash + Ord + DeserializeOwned + Serialize,
{
    /// Serializes with digests and paths in sorted order so that output is canonical
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut sorted: BTreeMap<&HexDigest, Vec<&P>> = BTreeMap::new();

        for (id, paths) in &self.id_to_paths {
            let mut paths: Vec<&P> = paths.iter().map(|path| path.as_ref()).collect();
            paths.sort_unstable();
            sorted.insert(id.as_ref(), paths);
        }

        serializer.collect_map(sorted)
    }
}
