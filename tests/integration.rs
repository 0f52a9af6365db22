//! Integration tests driving the contract the way an engine does.
//!
//! These tests verify that:
//! 1. Backends resolve through the registry by connection target
//! 2. A page store written through the contract survives close and reopen
//! 3. Short reads are zero-filled by the consuming side
//! 4. Layered backends stay conformant
//! 5. Errors carry context and native result codes

use dbvfs::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tempfile::tempdir;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// =============================================================================
// A Minimal Engine-Side Page Store
// =============================================================================

const PAGE_SIZE: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Row {
    id: u64,
    name: String,
}

/// Stores each row on the page numbered by its id, as a length-prefixed JSON
/// record. Pages that were never written read back as zeros.
struct PageStore {
    file: Box<dyn VfsFile>,
}

impl PageStore {
    fn open(registry: &Registry, target: &str) -> Result<Self, VfsError> {
        let opened = registry.open(target, OpenFlags::main_db())?;
        Ok(Self { file: opened.file })
    }

    fn insert(&self, row: &Row) -> Result<(), VfsError> {
        let json = serde_json::to_vec(row).expect("row serializes");
        assert!(json.len() + 2 <= PAGE_SIZE, "row too large for a page");

        let mut page = vec![0u8; PAGE_SIZE];
        page[..2].copy_from_slice(&(json.len() as u16).to_le_bytes());
        page[2..2 + json.len()].copy_from_slice(&json);

        self.file.lock(LockLevel::Exclusive)?;
        let written = self.file.write_all_at(&page, row.id * PAGE_SIZE as u64);
        let synced = written.and_then(|()| self.file.sync(SyncLevel::Full));
        self.file.unlock(LockLevel::None)?;
        synced
    }

    fn get(&self, id: u64) -> Result<Option<Row>, VfsError> {
        let mut page = vec![0xeeu8; PAGE_SIZE];
        self.file.lock(LockLevel::Shared)?;
        let outcome = self.file.read_exact_at(&mut page, id * PAGE_SIZE as u64);
        self.file.unlock(LockLevel::None)?;
        outcome?;

        let len = u16::from_le_bytes([page[0], page[1]]) as usize;
        if len == 0 {
            return Ok(None);
        }
        let row = serde_json::from_slice(&page[2..2 + len]).expect("row deserializes");
        Ok(Some(row))
    }

    fn close(self) -> Result<(), VfsError> {
        self.file.close()
    }
}

fn sample_rows() -> Vec<Row> {
    [
        (415, "romantic-swell"),
        (610, "ironically-gnarl"),
        (768, "biophysicist-straddled"),
    ]
    .into_iter()
    .map(|(id, name)| Row {
        id,
        name: name.to_owned(),
    })
    .collect()
}

fn exercise_page_store(registry: &Registry, target: &str) {
    let store = PageStore::open(registry, target).unwrap();
    for row in sample_rows() {
        store.insert(&row).unwrap();
    }
    store.close().unwrap();

    let store = PageStore::open(registry, target).unwrap();
    let found: Vec<Row> = [415, 610, 768]
        .into_iter()
        .map(|id| store.get(id).unwrap().unwrap())
        .collect();
    assert_eq!(found, sample_rows());

    // A hole between rows and a page past the end both read as absent.
    assert_eq!(store.get(500).unwrap(), None);
    assert_eq!(store.get(4000).unwrap(), None);
    store.close().unwrap();
}

// =============================================================================
// Registry + Page Store
// =============================================================================

#[test]
fn page_store_on_dir_backend() {
    init_tracing();
    let dir = tempdir().unwrap();
    let registry = Registry::new();
    registry.register("dir", DirVfs::new(dir.path()).unwrap()).unwrap();

    exercise_page_store(&registry, "rows.db?vfs=dir");
    assert!(dir.path().join("rows.db").exists());
}

#[test]
fn page_store_on_memory_backend() {
    init_tracing();
    let registry = Registry::new();
    registry.register("memory", MemoryVfs::new()).unwrap();

    exercise_page_store(&registry, "file:rows.db?vfs=memory");
}

#[test]
fn page_store_on_layered_backends() {
    init_tracing();
    let dir = tempdir().unwrap();
    let registry = Registry::new();
    let dir_vfs = DirVfs::new(dir.path())
        .unwrap()
        .layer(CheckedLayer::new())
        .layer(TracingLayer::new());
    registry.register("layered-dir", dir_vfs).unwrap();
    registry
        .register(
            "layered-memory",
            MemoryVfs::new().layer(TracingLayer::new()).layer(CheckedLayer::new()),
        )
        .unwrap();

    exercise_page_store(&registry, "rows.db?vfs=layered-dir");
    exercise_page_store(&registry, "rows.db?vfs=layered-memory");
}

#[test]
fn shared_backend_registered_by_arc() {
    let registry = Registry::new();
    let shared = Arc::new(MemoryVfs::new());
    registry.register_arc("a", shared.clone()).unwrap();
    registry.register_arc("b", shared).unwrap();

    let opened = registry.open("x.db?vfs=a", OpenFlags::main_db()).unwrap();
    opened.file.write_all_at(b"via a", 0).unwrap();
    opened.file.close().unwrap();

    let opened = registry.open("x.db?vfs=b", OpenFlags::READ_WRITE).unwrap();
    assert_eq!(opened.file.file_size().unwrap(), 5);
}

// =============================================================================
// Duplicate Registration
// =============================================================================

#[test]
fn duplicate_registration_keeps_first_backend() {
    let first = MemoryVfs::new();
    register("integration-duplicate", first.clone()).unwrap();

    let err = register("integration-duplicate", MemoryVfs::new()).unwrap_err();
    assert!(matches!(&err, VfsError::DuplicateName { name } if name == "integration-duplicate"));
    assert_eq!(err.result_code(), 1);

    let (file, _) = first.open(Some("seen.db"), OpenFlags::main_db()).unwrap();
    file.close().unwrap();
    let active = find("integration-duplicate").unwrap();
    assert!(active.access("seen.db", AccessKind::Exists).unwrap());
}

#[test]
fn unknown_backend_is_fatal() {
    let registry = Registry::new();
    let err = registry.open("a.db?vfs=nowhere", OpenFlags::main_db()).unwrap_err();
    assert!(matches!(err, VfsError::UnknownVfs { ref name } if name == "nowhere"));
    assert!(!err.is_retryable());
}

// =============================================================================
// Short Reads and Durability
// =============================================================================

#[test]
fn short_read_is_zero_filled_by_consumer() {
    let dir = tempdir().unwrap();
    let vfs = DirVfs::new(dir.path()).unwrap();
    let (file, _) = vfs.open(Some("short.db"), OpenFlags::main_db()).unwrap();
    file.write_all_at(&[7u8; 100], 0).unwrap();

    let mut raw = [0xffu8; 128];
    assert_eq!(file.read_at(&mut raw, 0).unwrap(), 100);

    let mut page = [0xffu8; 128];
    let outcome = file.read_exact_at(&mut page, 0).unwrap();
    assert_eq!(outcome, ReadOutcome::Short { read: 100 });
    assert!(page[..100].iter().all(|b| *b == 7));
    assert!(page[100..].iter().all(|b| *b == 0));
}

#[test]
fn synced_writes_survive_reopen_by_another_backend_instance() {
    let dir = tempdir().unwrap();
    {
        let vfs = DirVfs::new(dir.path()).unwrap();
        let (file, _) = vfs.open(Some("durable.db"), OpenFlags::main_db()).unwrap();
        file.lock(LockLevel::Exclusive).unwrap();
        file.write_all_at(b"journal header", 0).unwrap();
        file.sync(SyncLevel::Full).unwrap();
        file.write_all_at(b"page one", 4096).unwrap();
        file.sync(SyncLevel::from_raw(0x13).unwrap()).unwrap();
        file.close().unwrap();
    }

    let vfs = DirVfs::new(dir.path()).unwrap();
    let (file, _) = vfs.open(Some("durable.db"), OpenFlags::READ_ONLY).unwrap();
    let mut buf = [0u8; 14];
    file.read_exact_at(&mut buf, 0).unwrap();
    assert_eq!(&buf, b"journal header");
    let mut buf = [0u8; 8];
    file.read_exact_at(&mut buf, 4096).unwrap();
    assert_eq!(&buf, b"page one");
    assert_eq!(file.file_size().unwrap(), 4104);
}

#[test]
fn journal_lifecycle_through_factory() {
    let dir = tempdir().unwrap();
    let vfs = DirVfs::new(dir.path()).unwrap();
    let journal = vfs.full_pathname("app.db-journal").unwrap();

    let flags = OpenFlags::READ_WRITE | OpenFlags::CREATE | OpenFlags::MAIN_JOURNAL;
    let (file, _) = vfs.open(Some(journal.as_str()), flags).unwrap();
    file.write_all_at(b"rollback", 0).unwrap();
    file.sync(SyncLevel::Normal).unwrap();
    file.close().unwrap();
    assert!(vfs.access(&journal, AccessKind::ReadWrite).unwrap());

    vfs.delete(&journal, true).unwrap();
    assert!(!vfs.access(&journal, AccessKind::Exists).unwrap());
}

#[test]
fn temporary_files_vanish_on_close() {
    let vfs = MemoryVfs::new();
    let (file, granted) = vfs.open(None, OpenFlags::TEMP_DB).unwrap();
    assert!(granted.contains(OpenFlags::DELETE_ON_CLOSE | OpenFlags::READ_WRITE));
    file.write_all_at(b"scratch", 0).unwrap();
    assert_eq!(vfs.file_names().len(), 1);
    file.close().unwrap();
    assert!(vfs.file_names().is_empty());
}

// =============================================================================
// Device Properties and Errors
// =============================================================================

#[test]
fn configured_device_properties_reach_handles() {
    let options = BackendOptions::default()
        .with_sector_size(512)
        .with_characteristics(
            DeviceCharacteristics::ATOMIC_4K | DeviceCharacteristics::POWERSAFE_OVERWRITE,
        );
    let registry = Registry::new();
    registry
        .register("tuned", MemoryVfs::with_options(options).unwrap())
        .unwrap();

    let opened = registry.open("t.db?vfs=tuned", OpenFlags::main_db()).unwrap();
    let flags = opened.file.device_characteristics();
    assert_eq!(opened.file.sector_size(), 512);
    assert_eq!(flags.bits(), 0x1010);
    assert!(flags.atomic_write_size(4096));
    assert!(!flags.atomic_write_size(8192));
}

#[test]
fn errors_carry_native_codes() {
    let dir = tempdir().unwrap();
    let vfs = DirVfs::new(dir.path()).unwrap();

    let err = vfs.open(Some("missing.db"), OpenFlags::READ_WRITE).err().unwrap();
    assert!(matches!(err, VfsError::NotFound { .. }));
    assert_eq!(err.result_code(), 14);

    let (file, _) = vfs.open(Some("ro.db"), OpenFlags::main_db()).unwrap();
    file.close().unwrap();
    let (file, _) = vfs.open(Some("ro.db"), OpenFlags::READ_ONLY).unwrap();
    let err = file.write_at(b"x", 0).unwrap_err();
    assert_eq!(err.result_code(), 8);
    assert!(err.to_string().contains("ro.db"));

    let (a, _) = vfs.open(Some("busy.db"), OpenFlags::main_db()).unwrap();
    let (b, _) = vfs.open(Some("busy.db"), OpenFlags::main_db()).unwrap();
    a.lock(LockLevel::Exclusive).unwrap();
    let err = b.lock(LockLevel::Shared).unwrap_err();
    assert_eq!(err.result_code(), 5);
}

#[cfg(feature = "serde")]
#[test]
fn options_load_from_json() {
    let options = BackendOptions::from_json(r#"{"sector_size": 1024, "characteristics": 512}"#)
        .unwrap();
    let vfs = MemoryVfs::with_options(options).unwrap();
    let (file, _) = vfs.open(Some("j.db"), OpenFlags::main_db()).unwrap();
    assert_eq!(file.sector_size(), 1024);
    assert_eq!(
        file.device_characteristics(),
        DeviceCharacteristics::SAFE_APPEND
    );
}
