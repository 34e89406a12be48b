#![allow(dead_code)]

use std::collections::HashSet;
use std::io::Read;
use std::sync::{Arc, Mutex};

use ingest_core::checksum::ChecksumAlgo;
use ingest_core::domain::NewPackage;
use ingest_core::error::{IngestError, Result};
use ingest_core::policy::ValidationPolicy;
use ingest_core::store::fs::FsObjectStore;
use ingest_core::store::{Area, ObjectMeta, ObjectStore, StoreLayout};
use ingest_core::tracking::{MemTrackingStore, TrackingStore};
use ingest_core::{Orchestrator, Package, PackageKey, Status};
use time::macros::datetime;
use time::{Duration, OffsetDateTime};

pub const NOW: OffsetDateTime = datetime!(2026-03-01 12:00 UTC);

pub const TITLE_ROWS: &str = "Title Name,Example Feature\nTitle ID,TTL1\nVersion Name,Theatrical\nVersion ID,V1\nRelease Year,2024\n";

pub struct Harness {
    pub tmp: tempfile::TempDir,
    pub fs: Arc<FsObjectStore>,
    pub tracking: Arc<MemTrackingStore>,
}

impl Harness {
    pub fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(&tmp.path().join("ingest"), &tmp.path().join("repo"));
        let fs = Arc::new(FsObjectStore::new(layout).unwrap());
        Self {
            tmp,
            fs,
            tracking: Arc::new(MemTrackingStore::new()),
        }
    }

    pub fn orchestrator(&self) -> Orchestrator {
        self.orchestrator_with(self.fs.clone())
    }

    pub fn orchestrator_with(&self, store: Arc<dyn ObjectStore>) -> Orchestrator {
        Orchestrator::new(store, self.tracking.clone(), policy())
    }

    pub fn stage(&self, key: &str, body: &[u8]) {
        self.fs.put(Area::Staging, key, &mut &body[..]).unwrap();
    }

    pub fn register(&self, title: &str, asset: &str, age: Duration) -> PackageKey {
        self.register_at(title, asset, NOW - age, None)
    }

    pub fn register_at(
        &self,
        title: &str,
        asset: &str,
        created: OffsetDateTime,
        prefix: Option<&str>,
    ) -> PackageKey {
        let key = PackageKey::new(title, asset);
        self.tracking
            .register(NewPackage {
                key: key.clone(),
                status: Status::ValidStructure,
                created,
                staging_prefix: prefix.map(str::to_string),
                registered_by: "intake".into(),
            })
            .unwrap();
        key
    }

    pub fn package(&self, key: &PackageKey) -> Package {
        self.tracking.get(key).unwrap().unwrap()
    }

    pub fn status(&self, key: &PackageKey) -> Status {
        self.tracking.get(key).unwrap().unwrap().status
    }

    pub fn keys(&self, area: Area, prefix: &str) -> Vec<String> {
        self.fs
            .list(area, prefix)
            .unwrap()
            .into_iter()
            .map(|m| m.key)
            .collect()
    }
}

pub fn policy() -> ValidationPolicy {
    ValidationPolicy {
        checksum: ChecksumAlgo::Sha256,
        ..Default::default()
    }
}

pub fn sha256_hex(body: &[u8]) -> String {
    ChecksumAlgo::Sha256.digest(body).unwrap()
}

/// Manifest with one data row per `(file, checksum)`.
pub fn manifest(rows: &[(&str, Option<&str>)]) -> Vec<u8> {
    let mut s = String::from(TITLE_ROWS);
    s.push_str("Creation Date,Filename,Checksum,Folder Path,Studio Asset ID\n");
    for (file, sum) in rows {
        s.push_str(&format!("2026-02-01,{file},{},,SA-{file}\n", sum.unwrap_or("")));
    }
    s.into_bytes()
}

/// Object store that injects failures into an otherwise working store.
pub struct FailingStore {
    inner: Arc<FsObjectStore>,
    write_area: Option<Area>,
    write_prefix: Option<String>,
    deletes: bool,
    unreadable_once: Mutex<HashSet<String>>,
}

impl FailingStore {
    pub fn new(inner: Arc<FsObjectStore>) -> Self {
        Self {
            inner,
            write_area: None,
            write_prefix: None,
            deletes: false,
            unreadable_once: Mutex::new(HashSet::new()),
        }
    }

    /// Refuse every write into `area`.
    pub fn refuse_writes_to(mut self, area: Area) -> Self {
        self.write_area = Some(area);
        self
    }

    /// Refuse writes outside staging for keys under `prefix`.
    pub fn refuse_writes_under(mut self, prefix: &str) -> Self {
        self.write_prefix = Some(prefix.to_string());
        self
    }

    pub fn refuse_deletes(mut self) -> Self {
        self.deletes = true;
        self
    }

    /// Fail the next open of a staging `key`; later opens succeed.
    pub fn unreadable_once(self, key: &str) -> Self {
        self.unreadable_once.lock().unwrap().insert(key.to_string());
        self
    }

    fn refuses(&self, area: Area, key: &str) -> bool {
        self.write_area == Some(area)
            || self
                .write_prefix
                .as_deref()
                .is_some_and(|p| area != Area::Staging && key.starts_with(p))
    }
}

impl ObjectStore for FailingStore {
    fn list(&self, area: Area, prefix: &str) -> Result<Vec<ObjectMeta>> {
        self.inner.list(area, prefix)
    }

    fn open(&self, area: Area, key: &str) -> Result<Box<dyn Read + Send + '_>> {
        if area == Area::Staging && self.unreadable_once.lock().unwrap().remove(key) {
            return Err(IngestError::Store(format!("injected read failure: {area}/{key}")));
        }
        self.inner.open(area, key)
    }

    fn put(&self, area: Area, key: &str, src: &mut dyn Read) -> Result<u64> {
        if self.refuses(area, key) {
            return Err(IngestError::Store(format!("injected write failure: {area}/{key}")));
        }
        self.inner.put(area, key, src)
    }

    fn head(&self, area: Area, key: &str) -> Result<Option<u64>> {
        self.inner.head(area, key)
    }

    fn delete(&self, area: Area, key: &str) -> Result<()> {
        if self.deletes {
            return Err(IngestError::Store(format!("injected delete failure: {area}/{key}")));
        }
        self.inner.delete(area, key)
    }
}
