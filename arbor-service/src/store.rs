use arbor_hash::Digest;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::TreeRecord;

const RECORD_EXT: &str = "bin";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt record {name}: {reason}")]
    Corrupt { name: String, reason: String },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Worth another attempt after a pause.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Io(e) => matches!(
                e.kind(),
                ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut
            ),
            StoreError::Unavailable(_) => true,
            StoreError::Corrupt { .. } => false,
        }
    }
}

/// Content-addressed persistence for trees. Records are immutable once
/// written, so a second write of the same root is a no-op.
pub trait TreeStore: Send + Sync {
    fn get(&self, root: &Digest) -> Result<Option<TreeRecord>, StoreError>;
    /// Returns whether the record was newly inserted.
    fn put_if_absent(&self, root: &Digest, record: &TreeRecord) -> Result<bool, StoreError>;
    fn roots(&self) -> Result<Vec<Digest>, StoreError>;
}

#[derive(Default)]
pub struct MemoryStore {
    trees: RwLock<HashMap<Digest, TreeRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }
    pub fn len(&self) -> usize { self.trees.read().len() }
    pub fn is_empty(&self) -> bool { self.trees.read().is_empty() }
}

impl TreeStore for MemoryStore {
    fn get(&self, root: &Digest) -> Result<Option<TreeRecord>, StoreError> {
        Ok(self.trees.read().get(root).cloned())
    }

    fn put_if_absent(&self, root: &Digest, record: &TreeRecord) -> Result<bool, StoreError> {
        let mut trees = self.trees.write();
        if trees.contains_key(root) {
            return Ok(false);
        }
        trees.insert(*root, record.clone());
        Ok(true)
    }

    fn roots(&self) -> Result<Vec<Digest>, StoreError> {
        let mut roots: Vec<Digest> = self.trees.read().keys().copied().collect();
        roots.sort();
        Ok(roots)
    }
}

fn corrupt(path: &Path, e: bincode::Error) -> StoreError {
    StoreError::Corrupt { name: path.display().to_string(), reason: e.to_string() }
}

/// One bincode file per tree, named by the hex root.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path { &self.dir }

    fn path_for(&self, root: &Digest) -> PathBuf {
        self.dir.join(format!("{}.{RECORD_EXT}", hex::encode(root.as_bytes())))
    }
}

impl TreeStore for FileStore {
    fn get(&self, root: &Digest) -> Result<Option<TreeRecord>, StoreError> {
        let path = self.path_for(root);
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record = bincode::deserialize(&raw).map_err(|e| corrupt(&path, e))?;
        Ok(Some(record))
    }

    fn put_if_absent(&self, root: &Digest, record: &TreeRecord) -> Result<bool, StoreError> {
        let path = self.path_for(root);
        if path.exists() {
            return Ok(false);
        }
        let raw = bincode::serialize(record).map_err(|e| corrupt(&path, e))?;
        // write aside then rename so readers never see a partial record
        let tmp = path.with_extension(format!("{RECORD_EXT}.{}.tmp", std::process::id()));
        std::fs::write(&tmp, raw)?;
        if let Err(e) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(true)
    }

    fn roots(&self) -> Result<Vec<Digest>, StoreError> {
        let mut roots = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
                continue;
            }
            let stem = path.file_stem().and_then(|s| s.to_str());
            if let Some(root) = stem.and_then(|s| s.parse::<Digest>().ok()) {
                roots.push(root);
            }
        }
        roots.sort();
        Ok(roots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HexBytes;
    use arbor_abi::LeafType;

    fn record(tag: u8) -> TreeRecord {
        TreeRecord {
            leaves: vec![HexBytes(vec![tag; 20]), HexBytes(vec![tag + 1; 20])],
            leaf_types: vec![LeafType::Address],
            packed: Some(true),
        }
    }

    fn exercise(store: &dyn TreeStore) {
        let a = Digest::new([1u8; 32]);
        let b = Digest::new([2u8; 32]);
        assert_eq!(store.get(&a).unwrap(), None);
        assert!(store.put_if_absent(&a, &record(1)).unwrap());
        assert!(!store.put_if_absent(&a, &record(9)).unwrap());
        assert_eq!(store.get(&a).unwrap(), Some(record(1)));
        assert!(store.put_if_absent(&b, &record(3)).unwrap());
        assert_eq!(store.roots().unwrap(), vec![a, b]);
    }

    #[test]
    fn memory_store_semantics() {
        let store = MemoryStore::new();
        exercise(&store);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn file_store_semantics() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("trees")).unwrap();
        exercise(&store);
        // a second handle over the same directory sees the same trees
        let again = FileStore::open(store.dir()).unwrap();
        assert_eq!(again.roots().unwrap().len(), 2);
    }

    #[test]
    fn file_store_ignores_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"hi").unwrap();
        std::fs::write(dir.path().join("zz.bin"), b"hi").unwrap();
        assert!(store.roots().unwrap().is_empty());
    }

    #[test]
    fn file_store_reports_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let root = Digest::new([7u8; 32]);
        std::fs::write(store.path_for(&root), b"\xff\xff\xff\xff\xff\xff\xff\xff\xff").unwrap();
        let err = store.get(&root).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn transient_classification() {
        assert!(StoreError::Unavailable("x".into()).is_transient());
        assert!(StoreError::Io(std::io::Error::from(ErrorKind::TimedOut)).is_transient());
        assert!(!StoreError::Io(std::io::Error::from(ErrorKind::PermissionDenied)).is_transient());
    }
}
