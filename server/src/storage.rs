//! Durable bet storage
//!
//! The server only ever appends whole batches and reads the full set back
//! once for the draw. [`BetStore`] captures those two operations;
//! [`StorageHandle`] puts a store behind the storage lock and runs every
//! call on Tokio's blocking pool.

use crate::error::StorageError;
use bincode::Options;
use log::debug;
use shared::Bet;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Append-only store of bets
pub trait BetStore: Send {
    /// Appends all bets, in order
    fn store_bets(&mut self, bets: &[Bet]) -> Result<(), StorageError>;

    /// Returns every stored bet in insertion order
    fn load_bets(&self) -> Result<Vec<Bet>, StorageError>;
}

/// Upper bound on one encoded record; guards reads of a corrupt file
const MAX_RECORD_BYTES: u64 = 1024;

fn record_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_limit(MAX_RECORD_BYTES)
}

fn is_eof(err: &bincode::Error) -> bool {
    matches!(err.as_ref(), bincode::ErrorKind::Io(io) if io.kind() == ErrorKind::UnexpectedEof)
}

/// Stores bets as consecutive bincode records in a single file
pub struct FileBetStore {
    path: PathBuf,
}

impl FileBetStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BetStore for FileBetStore {
    fn store_bets(&mut self, bets: &[Bet]) -> Result<(), StorageError> {
        // Encode the whole batch first so it reaches the file in one write
        let mut encoded = Vec::new();
        for bet in bets {
            record_options().serialize_into(&mut encoded, bet)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&encoded)?;
        file.flush()?;

        debug!("Appended {} bets to {}", bets.len(), self.path.display());
        Ok(())
    }

    fn load_bets(&self) -> Result<Vec<Bet>, StorageError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut reader = BufReader::new(file);
        let mut bets = Vec::new();
        loop {
            match record_options().deserialize_from::<_, Bet>(&mut reader) {
                Ok(bet) => bets.push(bet),
                Err(e) if is_eof(&e) => break,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(bets)
    }
}

/// In-process store, mostly for tests
#[derive(Debug, Default, Clone)]
pub struct MemoryBetStore {
    bets: Vec<Bet>,
}

impl MemoryBetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bets(bets: Vec<Bet>) -> Self {
        Self { bets }
    }
}

impl BetStore for MemoryBetStore {
    fn store_bets(&mut self, bets: &[Bet]) -> Result<(), StorageError> {
        self.bets.extend_from_slice(bets);
        Ok(())
    }

    fn load_bets(&self) -> Result<Vec<Bet>, StorageError> {
        Ok(self.bets.clone())
    }
}

/// A bet store guarded by the storage lock
///
/// Appends and full reads are mutually exclusive. Each call holds the lock
/// inside a blocking task, so a write that has started always runs to the
/// end even if the calling task is aborted.
#[derive(Clone)]
pub struct StorageHandle {
    store: Arc<Mutex<Box<dyn BetStore>>>,
}

impl StorageHandle {
    pub fn new<S>(store: S) -> Self
    where
        S: BetStore + 'static,
    {
        Self {
            store: Arc::new(Mutex::new(Box::new(store))),
        }
    }

    pub async fn store_bets(&self, bets: Vec<Bet>) -> Result<(), StorageError> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || {
            let mut guard = store.lock().map_err(|_| StorageError::Poisoned)?;
            guard.store_bets(&bets)
        })
        .await?
    }

    pub async fn load_bets(&self) -> Result<Vec<Bet>, StorageError> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || {
            let guard = store.lock().map_err(|_| StorageError::Poisoned)?;
            guard.load_bets()
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn bet(agency: u8, document: &str, number: u32) -> Bet {
        Bet::new(
            agency,
            "Lucía",
            "Gómez",
            document,
            NaiveDate::from_ymd_opt(1994, 7, 21).unwrap(),
            number,
        )
    }

    fn temp_path(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!(
            "lottery-{}-{}-{}.bin",
            name,
            std::process::id(),
            nanos
        ))
    }

    #[test]
    fn test_file_store_appends_in_order() {
        let path = temp_path("append");
        let mut store = FileBetStore::new(&path);

        assert!(store.load_bets().unwrap().is_empty());

        store
            .store_bets(&[bet(1, "0001", 10), bet(1, "0002", 20)])
            .unwrap();
        store.store_bets(&[bet(2, "0003", 30)]).unwrap();

        let loaded = store.load_bets().unwrap();
        assert_eq!(
            loaded.iter().map(|b| b.number).collect::<Vec<_>>(),
            vec![10, 20, 30]
        );
        assert_eq!(loaded[0].document, "0001");
        assert_eq!(loaded[2].agency, 2);

        // A fresh handle on the same file sees the same bets
        let reopened = FileBetStore::new(&path);
        assert_eq!(reopened.load_bets().unwrap(), loaded);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_file_store_rejects_corrupt_file() {
        let path = temp_path("corrupt");
        std::fs::write(&path, [0xff; 64]).unwrap();

        let store = FileBetStore::new(&path);
        assert!(store.load_bets().is_err());

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_memory_store() {
        let mut store = MemoryBetStore::with_bets(vec![bet(1, "1", 1)]);
        store.store_bets(&[bet(2, "2", 2)]).unwrap();
        assert_eq!(store.load_bets().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_handle_serializes_access() {
        let handle = StorageHandle::new(MemoryBetStore::new());

        let mut tasks = Vec::new();
        for agency in 1..=8u8 {
            let handle = handle.clone();
            tasks.push(tokio::spawn(async move {
                let batch = (0..50)
                    .map(|i| bet(agency, &i.to_string(), agency as u32 * 1000 + i))
                    .collect();
                handle.store_bets(batch).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let loaded = handle.load_bets().await.unwrap();
        assert_eq!(loaded.len(), 400);

        // Every batch landed contiguously
        for chunk in loaded.chunks(50) {
            let agency = chunk[0].agency;
            assert!(chunk.iter().all(|b| b.agency == agency));
            let numbers: Vec<u32> = chunk.iter().map(|b| b.number).collect();
            let expected: Vec<u32> = (0..50).map(|i| agency as u32 * 1000 + i).collect();
            assert_eq!(numbers, expected);
        }
    }
}
