// ingest_core/src/store/mod.rs
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};

use time::OffsetDateTime;

use crate::error::Result;

pub mod fs;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Area {
    Staging,
    Archive,
    Error,
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Area::Staging => "staging",
            Area::Archive => "archive",
            Area::Error => "error",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectMeta {
    pub key: String,
    pub size: u64,
    /// Last write time, when the backend knows it.
    pub modified: Option<OffsetDateTime>,
}

#[derive(Clone, Debug)]
pub struct StoreLayout {
    pub staging_root: PathBuf,
    pub error_root: PathBuf,
    pub archive_root: PathBuf,
}

impl StoreLayout {
    /// Staging and error areas share the ingest root (`Upload/`, `Error/`).
    pub fn new(ingest_root: &Path, archive_root: &Path) -> Self {
        Self {
            staging_root: ingest_root.join("Upload"),
            error_root: ingest_root.join("Error"),
            archive_root: archive_root.to_path_buf(),
        }
    }

    pub fn root(&self, area: Area) -> &Path {
        match area {
            Area::Staging => &self.staging_root,
            Area::Archive => &self.archive_root,
            Area::Error => &self.error_root,
        }
    }
}

/// Object storage seam. Keys are `/`-separated and relative to the area root.
pub trait ObjectStore: Send + Sync {
    /// Objects whose key starts with `prefix`, sorted by key. Folder markers are skipped.
    fn list(&self, area: Area, prefix: &str) -> Result<Vec<ObjectMeta>>;

    fn open(&self, area: Area, key: &str) -> Result<Box<dyn Read + Send + '_>>;

    fn get(&self, area: Area, key: &str) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.open(area, key)?.read_to_end(&mut out)?;
        Ok(out)
    }

    /// Write `src` to `key`, replacing any existing object. Returns bytes written.
    fn put(&self, area: Area, key: &str, src: &mut dyn Read) -> Result<u64>;

    /// Size of the object if present.
    fn head(&self, area: Area, key: &str) -> Result<Option<u64>>;

    /// Deleting an absent key is not an error.
    fn delete(&self, area: Area, key: &str) -> Result<()>;
}

pub enum Backend {
    Fs,
}

pub fn open_store(backend: Backend, layout: StoreLayout) -> Result<Box<dyn ObjectStore>> {
    match backend {
        Backend::Fs => Ok(Box::new(fs::FsObjectStore::new(layout)?)),
    }
}
