// ingest_core/src/tracking/mod.rs
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use time::OffsetDateTime;

use crate::domain::{NewPackage, Package, PackageKey, Status, StatusUpdate};
use crate::error::{IngestError, Result};

pub mod index;
pub mod journal;

use index::TrackingIndex;
use journal::{Journal, TrackRecord};

#[derive(Clone, Debug, Default)]
pub struct PackageFilter {
    pub status: Option<Status>,
    /// Inclusive upper bound on `created`.
    pub created_before: Option<OffsetDateTime>,
    /// Inclusive upper bound on `modified`.
    pub modified_before: Option<OffsetDateTime>,
}

impl PackageFilter {
    pub fn status(status: Status) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn matches(&self, p: &Package) -> bool {
        self.status.is_none_or(|s| p.status == s)
            && self.created_before.is_none_or(|t| p.created <= t)
            && self.modified_before.is_none_or(|t| p.modified <= t)
    }
}

/// Tracking table seam. Writes are conditional on the record revision so two
/// workers racing on one package cannot both win.
pub trait TrackingStore: Send + Sync {
    fn register(&self, new: NewPackage) -> Result<Package>;

    fn get(&self, key: &PackageKey) -> Result<Option<Package>>;

    fn query(&self, filter: &PackageFilter) -> Result<Vec<Package>>;

    fn list(&self) -> Result<Vec<Package>> {
        self.query(&PackageFilter::default())
    }

    /// Apply `update` if the stored revision still equals `expected_revision`.
    /// Returns the updated record, or None when the revision moved on.
    fn compare_and_set(
        &self,
        key: &PackageKey,
        expected_revision: u64,
        update: StatusUpdate,
    ) -> Result<Option<Package>>;

    /// Record an operator note alongside the history. Backends without a
    /// history drop it.
    fn annotate(&self, _text: &str) -> Result<()> {
        Ok(())
    }
}

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    m.lock()
        .map_err(|_| IngestError::Tracking("tracking store lock poisoned".into()))
}

#[derive(Default)]
pub struct MemTrackingStore {
    index: Mutex<TrackingIndex>,
}

impl MemTrackingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TrackingStore for MemTrackingStore {
    fn register(&self, new: NewPackage) -> Result<Package> {
        let mut idx = lock(&self.index)?;
        let rec = idx.plan_register(new)?;
        idx.apply(&rec);
        registered(rec)
    }

    fn get(&self, key: &PackageKey) -> Result<Option<Package>> {
        Ok(lock(&self.index)?.by_key.get(key).cloned())
    }

    fn query(&self, filter: &PackageFilter) -> Result<Vec<Package>> {
        Ok(lock(&self.index)?.query(filter))
    }

    fn compare_and_set(
        &self,
        key: &PackageKey,
        expected_revision: u64,
        update: StatusUpdate,
    ) -> Result<Option<Package>> {
        let mut idx = lock(&self.index)?;
        let Some(rec) = idx.plan_update(key, expected_revision, update)? else {
            return Ok(None);
        };
        idx.apply(&rec);
        Ok(idx.by_key.get(key).cloned())
    }
}

struct JournalState {
    journal: Journal,
    index: TrackingIndex,
}

/// Tracking table persisted as an append-only journal and replayed on open.
pub struct JournalTrackingStore {
    state: Mutex<JournalState>,
}

impl JournalTrackingStore {
    pub fn open(path: &Path) -> Result<Self> {
        let mut journal = Journal::open(path)?;
        let mut index = TrackingIndex::default();
        let records = journal.replay()?;
        for rec in &records {
            index.apply(rec);
        }
        tracing::debug!(
            journal = %path.display(),
            records = records.len(),
            packages = index.by_key.len(),
            "tracking journal replayed"
        );
        Ok(Self {
            state: Mutex::new(JournalState { journal, index }),
        })
    }
}

impl TrackingStore for JournalTrackingStore {
    fn register(&self, new: NewPackage) -> Result<Package> {
        let mut st = lock(&self.state)?;
        let rec = st.index.plan_register(new)?;
        st.journal.append(&rec)?;
        st.index.apply(&rec);
        registered(rec)
    }

    fn get(&self, key: &PackageKey) -> Result<Option<Package>> {
        Ok(lock(&self.state)?.index.by_key.get(key).cloned())
    }

    fn query(&self, filter: &PackageFilter) -> Result<Vec<Package>> {
        Ok(lock(&self.state)?.index.query(filter))
    }

    fn compare_and_set(
        &self,
        key: &PackageKey,
        expected_revision: u64,
        update: StatusUpdate,
    ) -> Result<Option<Package>> {
        let mut st = lock(&self.state)?;
        let Some(rec) = st.index.plan_update(key, expected_revision, update)? else {
            return Ok(None);
        };
        // journal first: a failed append leaves the index untouched
        st.journal.append(&rec)?;
        st.index.apply(&rec);
        Ok(st.index.by_key.get(key).cloned())
    }

    fn annotate(&self, text: &str) -> Result<()> {
        let mut st = lock(&self.state)?;
        st.journal.append(&TrackRecord::Note {
            text: text.to_string(),
        })
    }
}

fn registered(rec: TrackRecord) -> Result<Package> {
    match rec {
        TrackRecord::Register(pkg) => Ok(pkg),
        _ => Err(IngestError::Tracking("unexpected record kind".into())),
    }
}
