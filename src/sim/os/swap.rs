// Durable backing store for evicted pages. One record per dirty page that was
// swapped out, keyed by (page number, virtual address).

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, trace};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SwapError {
    #[error("swap file i/o: {0}")]
    Io(#[from] io::Error),
    #[error("swap record encoding: {0}")]
    Format(#[from] serde_json::Error),
}

type Res<T> = Result<T, SwapError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SwapKey {
    pub page_number: usize,
    pub addr_virtual: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapRecord {
    pub memory: Vec<u8>,
    pub access_count: u32,
    pub last_accessed: u64,
}

pub trait SwapStore {
    fn store(&mut self, key: SwapKey, record: SwapRecord) -> Res<()>;
    /// Load and delete the record for `key`, if there is one.
    fn take(&mut self, key: SwapKey) -> Res<Option<SwapRecord>>;
    fn discard(&mut self, key: SwapKey) -> Res<()>;
    /// Drop every record. Called once when the address space is built.
    fn clear(&mut self) -> Res<()>;
}

#[derive(Default)]
pub struct MemorySwapStore {
    records: HashMap<SwapKey, SwapRecord>,
}

impl MemorySwapStore {
    pub fn new() -> MemorySwapStore {
        MemorySwapStore::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl SwapStore for MemorySwapStore {
    fn store(&mut self, key: SwapKey, record: SwapRecord) -> Res<()> {
        self.records.insert(key, record);
        Ok(())
    }

    fn take(&mut self, key: SwapKey) -> Res<Option<SwapRecord>> {
        Ok(self.records.remove(&key))
    }

    fn discard(&mut self, key: SwapKey) -> Res<()> {
        self.records.remove(&key);
        Ok(())
    }

    fn clear(&mut self) -> Res<()> {
        self.records.clear();
        Ok(())
    }
}

/// Stores each record as `page{number}-{addr}.json` inside `dir`.
pub struct FileSwapStore {
    dir: PathBuf,
}

impl FileSwapStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Res<FileSwapStore> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(FileSwapStore { dir })
    }

    fn path(&self, key: SwapKey) -> PathBuf {
        self.dir
            .join(format!("page{}-{}.json", key.page_number, key.addr_virtual))
    }

    fn is_swap_file(name: &str) -> bool {
        let Some(stem) = name
            .strip_prefix("page")
            .and_then(|s| s.strip_suffix(".json"))
        else {
            return false;
        };
        match stem.split_once('-') {
            Some((n, a)) => n.parse::<usize>().is_ok() && a.parse::<u32>().is_ok(),
            None => false,
        }
    }
}

impl SwapStore for FileSwapStore {
    fn store(&mut self, key: SwapKey, record: SwapRecord) -> Res<()> {
        let path = self.path(key);
        trace!("swap out page {} to {}", key.page_number, path.display());
        let file = fs::File::create(path)?;
        serde_json::to_writer(io::BufWriter::new(file), &record)?;
        Ok(())
    }

    fn take(&mut self, key: SwapKey) -> Res<Option<SwapRecord>> {
        let path = self.path(key);
        let file = match fs::File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record: SwapRecord = serde_json::from_reader(io::BufReader::new(file))?;
        fs::remove_file(&path)?;
        trace!("swap in page {} from {}", key.page_number, path.display());
        Ok(Some(record))
    }

    fn discard(&mut self, key: SwapKey) -> Res<()> {
        match fs::remove_file(self.path(key)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    fn clear(&mut self) -> Res<()> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            if name.to_str().map_or(false, FileSwapStore::is_swap_file) {
                fs::remove_file(entry.path())?;
                removed += 1;
            }
        }
        debug!("removed {} stale swap files from {}", removed, self.dir.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(fill: u8) -> SwapRecord {
        SwapRecord {
            memory: vec![fill; 16],
            access_count: 3,
            last_accessed: 99,
        }
    }

    const KEY: SwapKey = SwapKey {
        page_number: 4,
        addr_virtual: 64,
    };

    #[test]
    fn test_memory_store_take_deletes() {
        let mut store = MemorySwapStore::new();
        store.store(KEY, record(7)).unwrap();
        assert_eq!(1, store.len());
        assert_eq!(Some(record(7)), store.take(KEY).unwrap());
        assert_eq!(None, store.take(KEY).unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn test_file_store_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileSwapStore::new(dir.path()).unwrap();
        store.store(KEY, record(9)).unwrap();
        assert!(dir.path().join("page4-64.json").exists());

        assert_eq!(Some(record(9)), store.take(KEY).unwrap());
        assert!(!dir.path().join("page4-64.json").exists());
        assert_eq!(None, store.take(KEY).unwrap());

        store.store(KEY, record(1)).unwrap();
        store.discard(KEY).unwrap();
        store.discard(KEY).unwrap();
        assert_eq!(None, store.take(KEY).unwrap());
    }

    #[test]
    fn test_file_store_clear_leaves_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notes.json"), "{}").unwrap();
        fs::write(dir.path().join("page1-16.json"), "{}").unwrap();
        let mut store = FileSwapStore::new(dir.path()).unwrap();
        store.clear().unwrap();
        assert!(dir.path().join("notes.json").exists());
        assert!(!dir.path().join("page1-16.json").exists());
    }
}
