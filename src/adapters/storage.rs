//! Storage adapters.
//!
//! Implements [`StoragePort`] two ways:
//!
//! - [`FsStorage`] — a flat directory on a `std::fs` volume.  On the
//!   device that is the SD card's FAT volume under
//!   [`SD_MOUNT_POINT`](crate::pins::SD_MOUNT_POINT); mounting goes
//!   through ESP-IDF's VFS.  On the host it is any directory.
//! - [`MemStorage`] — an in-memory volume for host tests and fuzzing.
//!   Clones share the same files, so a test can keep a handle for
//!   inspection after moving one into the service.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Cursor, Write};
use std::path::PathBuf;
use std::rc::Rc;

use log::info;

use crate::app::ports::StoragePort;
use crate::error::StorageError;

// ───────────────────────────────────────────────────────────────
// FsStorage
// ───────────────────────────────────────────────────────────────

pub struct FsStorage {
    root: PathBuf,
    mounted: bool,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            mounted: false,
        }
    }

    fn path(&self, name: &str) -> Result<PathBuf, StorageError> {
        if !self.mounted {
            return Err(StorageError::NotMounted);
        }
        Ok(self.root.join(name))
    }
}

impl StoragePort for FsStorage {
    type Writer = BufWriter<File>;
    type Reader = BufReader<File>;

    fn mount(&mut self) -> Result<(), StorageError> {
        if self.mounted {
            return Ok(());
        }

        #[cfg(target_os = "espidf")]
        crate::drivers::hw_init::mount_sd_card()?;

        #[cfg(not(target_os = "espidf"))]
        std::fs::create_dir_all(&self.root).map_err(|e| {
            log::warn!("FsStorage: cannot create {}: {e}", self.root.display());
            StorageError::MountFailed
        })?;

        self.mounted = true;
        info!("FsStorage: mounted {}", self.root.display());
        Ok(())
    }

    fn unmount(&mut self) {
        if !self.mounted {
            return;
        }

        #[cfg(target_os = "espidf")]
        crate::drivers::hw_init::unmount_sd_card();

        self.mounted = false;
        info!("FsStorage: unmounted");
    }

    fn is_mounted(&self) -> bool {
        self.mounted
    }

    fn list(&self) -> Result<Vec<String>, StorageError> {
        let dir = self.path("")?;
        let mut names = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                if let Ok(name) = entry.file_name().into_string() {
                    names.push(name);
                }
            }
        }
        Ok(names)
    }

    fn create(&mut self, name: &str) -> Result<Self::Writer, StorageError> {
        let file = File::create(self.path(name)?)?;
        Ok(BufWriter::new(file))
    }

    fn open(&mut self, name: &str) -> Result<Self::Reader, StorageError> {
        let file = File::open(self.path(name)?)?;
        Ok(BufReader::new(file))
    }
}

// ───────────────────────────────────────────────────────────────
// MemStorage
// ───────────────────────────────────────────────────────────────

#[derive(Default)]
struct MemVolume {
    files: BTreeMap<String, Vec<u8>>,
    mounted: bool,
    fail_mount: bool,
    fail_writes: bool,
}

/// In-memory volume.
#[derive(Clone, Default)]
pub struct MemStorage {
    volume: Rc<RefCell<MemVolume>>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `bytes` as `name`, replacing any existing file.
    pub fn put(&self, name: &str, bytes: Vec<u8>) {
        self.volume.borrow_mut().files.insert(name.to_owned(), bytes);
    }

    /// Copy of a file's contents.
    pub fn file(&self, name: &str) -> Option<Vec<u8>> {
        self.volume.borrow().files.get(name).cloned()
    }

    /// A file's contents as UTF-8 text.
    pub fn text(&self, name: &str) -> Option<String> {
        self.file(name).and_then(|bytes| String::from_utf8(bytes).ok())
    }

    pub fn names(&self) -> Vec<String> {
        self.volume.borrow().files.keys().cloned().collect()
    }

    /// Make subsequent `mount` calls fail (card missing).
    pub fn fail_mount(&self, fail: bool) {
        self.volume.borrow_mut().fail_mount = fail;
    }

    /// Make writes through existing and new writers fail (card full).
    pub fn fail_writes(&self, fail: bool) {
        self.volume.borrow_mut().fail_writes = fail;
    }

    fn check_mounted(&self) -> Result<(), StorageError> {
        if self.volume.borrow().mounted {
            Ok(())
        } else {
            Err(StorageError::NotMounted)
        }
    }
}

impl StoragePort for MemStorage {
    type Writer = MemWriter;
    type Reader = Cursor<Vec<u8>>;

    fn mount(&mut self) -> Result<(), StorageError> {
        let mut volume = self.volume.borrow_mut();
        if volume.fail_mount {
            return Err(StorageError::MountFailed);
        }
        volume.mounted = true;
        Ok(())
    }

    fn unmount(&mut self) {
        self.volume.borrow_mut().mounted = false;
    }

    fn is_mounted(&self) -> bool {
        self.volume.borrow().mounted
    }

    fn list(&self) -> Result<Vec<String>, StorageError> {
        self.check_mounted()?;
        Ok(self.names())
    }

    fn create(&mut self, name: &str) -> Result<Self::Writer, StorageError> {
        self.check_mounted()?;
        self.put(name, Vec::new());
        Ok(MemWriter {
            volume: Rc::clone(&self.volume),
            name: name.to_owned(),
        })
    }

    fn open(&mut self, name: &str) -> Result<Self::Reader, StorageError> {
        self.check_mounted()?;
        self.file(name).map(Cursor::new).ok_or(StorageError::NotFound)
    }
}

/// Appends to one file of a [`MemStorage`] volume.
pub struct MemWriter {
    volume: Rc<RefCell<MemVolume>>,
    name: String,
}

impl Write for MemWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut volume = self.volume.borrow_mut();
        if volume.fail_writes {
            return Err(io::Error::from(io::ErrorKind::StorageFull));
        }
        volume
            .files
            .entry(self.name.clone())
            .or_default()
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn mem_requires_mount() {
        let mut storage = MemStorage::new();
        assert_eq!(storage.list().unwrap_err(), StorageError::NotMounted);
        assert!(matches!(storage.create("A"), Err(StorageError::NotMounted)));
        storage.mount().unwrap();
        assert!(storage.list().unwrap().is_empty());
    }

    #[test]
    fn mem_writer_appends_and_clones_share() {
        let mut storage = MemStorage::new();
        let view = storage.clone();
        storage.mount().unwrap();

        let mut w = storage.create("DATA1.DAT").unwrap();
        w.write_all(b"ab").unwrap();
        w.write_all(b"cd").unwrap();
        assert_eq!(view.text("DATA1.DAT").as_deref(), Some("abcd"));

        let mut r = storage.open("DATA1.DAT").unwrap();
        let mut out = String::new();
        r.read_to_string(&mut out).unwrap();
        assert_eq!(out, "abcd");
    }

    #[test]
    fn mem_create_truncates() {
        let mut storage = MemStorage::new();
        storage.mount().unwrap();
        storage.put("X", vec![1, 2, 3]);
        drop(storage.create("X").unwrap());
        assert_eq!(storage.file("X"), Some(Vec::new()));
    }

    #[test]
    fn mem_failures_are_reported() {
        let mut storage = MemStorage::new();
        storage.fail_mount(true);
        assert_eq!(storage.mount(), Err(StorageError::MountFailed));
        storage.fail_mount(false);
        storage.mount().unwrap();

        let mut w = storage.create("X").unwrap();
        storage.fail_writes(true);
        let err = w.write_all(b"x").unwrap_err();
        assert_eq!(StorageError::from(err), StorageError::Full);
        assert!(matches!(storage.open("missing"), Err(StorageError::NotFound)));
    }

    #[test]
    fn fs_storage_round_trip() {
        let root = std::env::temp_dir().join(format!("impack-fs-{}", std::process::id()));
        let mut storage = FsStorage::new(&root);
        assert!(matches!(storage.create("A.DAT"), Err(StorageError::NotMounted)));

        storage.mount().unwrap();
        let mut w = storage.create("A.DAT").unwrap();
        w.write_all(&[1, 2, 3]).unwrap();
        w.flush().unwrap();
        drop(w);

        assert!(storage.list().unwrap().contains(&"A.DAT".to_owned()));
        let mut bytes = Vec::new();
        storage.open("A.DAT").unwrap().read_to_end(&mut bytes).unwrap();
        assert_eq!(bytes, [1, 2, 3]);

        storage.unmount();
        assert!(!storage.is_mounted());
        let _ = std::fs::remove_dir_all(root);
    }
}
