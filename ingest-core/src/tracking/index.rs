use std::collections::BTreeMap;

use crate::domain::{NewPackage, Package, PackageKey, StatusUpdate};
use crate::error::{IngestError, Result};
use crate::tracking::PackageFilter;
use crate::tracking::journal::TrackRecord;
use crate::util::sanitize::normalize_prefix;

/// In-memory view of the tracking table, built by applying records in order.
#[derive(Clone, Debug, Default)]
pub struct TrackingIndex {
    pub by_key: BTreeMap<PackageKey, Package>,
}

impl TrackingIndex {
    pub fn apply(&mut self, rec: &TrackRecord) {
        match rec {
            TrackRecord::Register(pkg) => {
                self.by_key.insert(pkg.key.clone(), pkg.clone());
            }
            TrackRecord::Update {
                key,
                revision,
                update,
            } => {
                if let Some(pkg) = self.by_key.get_mut(key) {
                    pkg.status = update.status;
                    pkg.modified = update.modified;
                    pkg.modified_by = update.modified_by.clone();
                    pkg.revision = *revision;
                    if let Some(m) = &update.manifest_key {
                        pkg.manifest_key = Some(m.clone());
                    }
                    if let Some(t) = &update.title {
                        pkg.title = Some(t.clone());
                    }
                    if let Some(a) = &update.assets {
                        pkg.assets = a.clone();
                    }
                    if let Some(d) = &update.discrepancies {
                        pkg.discrepancies = Some(d.clone());
                    }
                    if let Some(c) = &update.pending_cleanup {
                        pkg.pending_cleanup = c.clone();
                    }
                }
            }
            TrackRecord::Note { .. } => {}
        }
    }

    pub fn plan_register(&self, new: NewPackage) -> Result<TrackRecord> {
        if new.key.title_id.is_empty()
            || new.key.asset_id.is_empty()
            || new.key.title_id.contains('/')
            || new.key.asset_id.contains('/')
        {
            return Err(IngestError::Tracking(format!(
                "invalid package key: {}",
                new.key
            )));
        }
        if self.by_key.contains_key(&new.key) {
            return Err(IngestError::Tracking(format!(
                "package {} already registered",
                new.key
            )));
        }
        let staging_prefix = match &new.staging_prefix {
            Some(raw) => normalize_prefix(raw).ok_or_else(|| {
                IngestError::Tracking(format!("invalid staging prefix for {}: {raw:?}", new.key))
            })?,
            None => new.key.default_prefix(),
        };
        Ok(TrackRecord::Register(Package {
            staging_prefix,
            status: new.status,
            created: new.created,
            modified: new.created,
            modified_by: new.registered_by,
            manifest_key: None,
            revision: 1,
            title: None,
            assets: Vec::new(),
            discrepancies: None,
            pending_cleanup: Vec::new(),
            key: new.key,
        }))
    }

    /// None when the stored revision is not `expected` (someone else wrote first).
    pub fn plan_update(
        &self,
        key: &PackageKey,
        expected: u64,
        update: StatusUpdate,
    ) -> Result<Option<TrackRecord>> {
        let pkg = self
            .by_key
            .get(key)
            .ok_or_else(|| IngestError::Tracking(format!("unknown package {key}")))?;
        if pkg.revision != expected {
            return Ok(None);
        }
        Ok(Some(TrackRecord::Update {
            key: key.clone(),
            revision: expected + 1,
            update,
        }))
    }

    pub fn query(&self, filter: &PackageFilter) -> Vec<Package> {
        self.by_key
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect()
    }
}
