use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::{ChunkStore, RecordFamily, RecordKey, StoreError};

/// A store laid out as one file per record: `<root>/<family>/<key>.bin`.
///
/// Writes go to a sibling `.tmp` file that is renamed over the target, so a
/// crash mid-write leaves either the old record or the new one.
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    /// Opens (and creates, if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| StoreError::Io {
            path: root.clone(),
            source,
        })?;
        tracing::info!("Chunk store opened at {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, family: RecordFamily, key: RecordKey) -> PathBuf {
        self.root
            .join(family.name())
            .join(format!("{}.bin", key.file_stem()))
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl ChunkStore for DirStore {
    fn read(&self, family: RecordFamily, key: RecordKey) -> Result<Option<Vec<u8>>, StoreError> {
        family.check_key(key)?;
        let path = self.record_path(family, key);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path)(e)),
        }
    }

    fn write(&self, family: RecordFamily, key: RecordKey, bytes: &[u8]) -> Result<(), StoreError> {
        family.check_key(key)?;
        let path = self.record_path(family, key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }

        let tmp = path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp).map_err(io_error(&tmp))?;
            file.write_all(bytes).map_err(io_error(&tmp))?;
            file.sync_all().map_err(io_error(&tmp))?;
        }
        fs::rename(&tmp, &path).map_err(io_error(&path))
    }

    fn remove(&self, family: RecordFamily, key: RecordKey) -> Result<(), StoreError> {
        family.check_key(key)?;
        let path = self.record_path(family, key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&path)(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_voxel::{ChunkCoord, ColumnCoord, Tier};

    #[test]
    fn test_write_read_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirStore::open(dir.path().join("world")).unwrap();
        let key = RecordKey::Chunk(ChunkCoord::new(-2, 5, 1));

        assert!(store.read(RecordFamily::Blocks, key).unwrap().is_none());
        store.write(RecordFamily::Blocks, key, &[1, 2, 3]).unwrap();
        assert_eq!(store.read(RecordFamily::Blocks, key).unwrap(), Some(vec![1, 2, 3]));

        store.write(RecordFamily::Blocks, key, &[9]).unwrap();
        assert_eq!(store.read(RecordFamily::Blocks, key).unwrap(), Some(vec![9]));

        store.remove(RecordFamily::Blocks, key).unwrap();
        store.remove(RecordFamily::Blocks, key).unwrap();
        assert!(store.read(RecordFamily::Blocks, key).unwrap().is_none());
    }

    #[test]
    fn test_layout_is_one_file_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirStore::open(dir.path()).unwrap();
        store
            .write(RecordFamily::Tops, RecordKey::Column(ColumnCoord::new(0, -1)), b"t")
            .unwrap();
        store
            .write(
                RecordFamily::Lod(Tier::Lod6),
                RecordKey::Chunk(ChunkCoord::new(0, 0, 0)),
                b"l",
            )
            .unwrap();

        assert!(dir.path().join("tops").join("0_-1.bin").is_file());
        assert!(dir.path().join("lod6").join("0_0_0.bin").is_file());
        assert!(!dir.path().join("tops").join("0_-1.tmp").exists());
    }

    #[test]
    fn test_reopen_sees_previous_writes() {
        let dir = tempfile::tempdir().unwrap();
        let key = RecordKey::Chunk(ChunkCoord::new(1, 1, 1));
        DirStore::open(dir.path())
            .unwrap()
            .write(RecordFamily::Entities, key, b"{}")
            .unwrap();
        let reopened = DirStore::open(dir.path()).unwrap();
        assert_eq!(
            reopened.read(RecordFamily::Entities, key).unwrap(),
            Some(b"{}".to_vec())
        );
    }
}
