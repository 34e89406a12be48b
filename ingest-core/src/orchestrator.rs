// ingest_core/src/orchestrator.rs
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use time::OffsetDateTime;
use uuid::Uuid;

use crate::checksum::{self, ChecksumAlgo};
use crate::classify::{Evidence, Outcome, classify};
use crate::domain::{Package, PackageKey, StagedCopy, Status, StatusUpdate};
use crate::error::{IngestError, Result};
use crate::inventory::{self, Inventory};
use crate::manifest::{self, Manifest, ManifestError};
use crate::policy::ValidationPolicy;
use crate::relocate::{self, Relocation};
use crate::stats::{PassReport, SweepReport};
use crate::store::{Area, ObjectStore};
use crate::tracking::{PackageFilter, TrackingStore};

/// Everything learned about one package in one pass.
#[derive(Clone, Debug)]
pub struct Validation {
    pub key: PackageKey,
    pub manifest_key: Option<String>,
    pub manifest: Option<Manifest>,
    pub inventory: Inventory,
    pub outcome: Outcome,
}

/// Parser, comparator, verifier, classifier, in that order. Read-only.
/// Errors are infrastructure failures; every validation finding ends up in
/// the returned outcome instead.
pub fn validate_package(
    store: &dyn ObjectStore,
    pkg: &Package,
    algo: ChecksumAlgo,
) -> Result<Validation> {
    let objects = store.list(Area::Staging, &pkg.staging_prefix)?;
    let mut inventory = Inventory::from_objects(&pkg.staging_prefix, &objects);
    if inventory.is_empty() {
        tracing::warn!(package = %pkg.key, prefix = %pkg.staging_prefix, "nothing staged under prefix");
    }
    let manifest_key = manifest::locate_manifest(&objects).map(|o| o.key.clone());

    let Some(mkey) = manifest_key.clone() else {
        return Ok(Validation {
            key: pkg.key.clone(),
            manifest_key: None,
            manifest: None,
            inventory,
            outcome: classify(&Evidence::structural(ManifestError::Absent)),
        });
    };

    let bytes = store.get(Area::Staging, &mkey)?;
    let parsed = match manifest::parse_manifest(&bytes) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(package = %pkg.key, manifest = %mkey, error = %e, "manifest rejected");
            return Ok(Validation {
                key: pkg.key.clone(),
                manifest_key,
                manifest: None,
                inventory,
                outcome: classify(&Evidence::structural(e)),
            });
        }
    };

    let diff = inventory::compare(&parsed, &inventory, &mkey);
    let mismatches = checksum::verify(store, &parsed, &mut inventory, &diff, algo);
    let outcome = classify(&Evidence {
        manifest: Ok(()),
        diff: Some(diff),
        mismatches: Some(mismatches),
    });

    Ok(Validation {
        key: pkg.key.clone(),
        manifest_key,
        manifest: Some(parsed),
        inventory,
        outcome,
    })
}

enum Processed {
    Done { status: Status, cleanup_ok: bool },
    ClaimLost,
}

pub struct Orchestrator {
    store: Arc<dyn ObjectStore>,
    tracking: Arc<dyn TrackingStore>,
    policy: ValidationPolicy,
    shutdown: Arc<AtomicBool>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        tracking: Arc<dyn TrackingStore>,
        policy: ValidationPolicy,
    ) -> Self {
        Self {
            store,
            tracking,
            policy,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Setting the flag stops a running pass before its next package.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    /// `VALID_STRUCTURE` packages past the upload cutoff, plus `PROCESSING`
    /// claims abandoned for longer than the claim TTL. Oldest first.
    pub fn eligible(&self, now: OffsetDateTime) -> Result<Vec<Package>> {
        let mut out = self.tracking.query(&PackageFilter {
            status: Some(Status::ValidStructure),
            created_before: Some(now - self.policy.cutoff),
            modified_before: None,
        })?;
        let stale = self.tracking.query(&PackageFilter {
            status: Some(Status::Processing),
            created_before: None,
            modified_before: Some(now - self.policy.claim_ttl),
        })?;
        for p in &stale {
            tracing::warn!(package = %p.key, claimed_at = %p.modified, "re-claiming abandoned package");
        }
        out.extend(stale);
        out.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.key.cmp(&b.key)));
        Ok(out)
    }

    pub fn run_pass(&self, now: OffsetDateTime) -> Result<PassReport> {
        let pass_id = Uuid::new_v4();
        let span = tracing::info_span!("pass", %pass_id);
        let _guard = span.enter();

        let mut report = PassReport::new(pass_id, now);
        let packages = self.eligible(now)?;
        report.eligible = packages.len();
        tracing::info!(eligible = packages.len(), cutoff = %(now - self.policy.cutoff), "validation pass started");

        for pkg in packages {
            if self.shutdown.load(Ordering::SeqCst) {
                tracing::warn!("shutdown requested, ending pass early");
                report.interrupted = true;
                break;
            }
            match self.process(&pkg, pass_id, now) {
                Ok(Processed::Done { status, cleanup_ok }) => {
                    report.record(status);
                    if !cleanup_ok {
                        report.cleanup_failures += 1;
                    }
                }
                Ok(Processed::ClaimLost) => report.skipped += 1,
                Err(e) => {
                    tracing::error!(package = %pkg.key, error = %e, "package skipped");
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            processed = report.processed,
            failed = report.failed,
            skipped = report.skipped,
            "validation pass complete"
        );
        Ok(report)
    }

    fn process(&self, pkg: &Package, pass_id: Uuid, now: OffsetDateTime) -> Result<Processed> {
        let span = tracing::info_span!("package", key = %pkg.key);
        let _guard = span.enter();

        let claim = StatusUpdate::status_only(Status::Processing, now, &self.policy.actor);
        let Some(claimed) = self.tracking.compare_and_set(&pkg.key, pkg.revision, claim)? else {
            tracing::info!("claimed by another worker");
            return Ok(Processed::ClaimLost);
        };

        let (validation, relocation) = match self.validate_and_transfer(&claimed, pass_id, now) {
            Ok(v) => v,
            Err(e) => {
                self.release(&claimed, now);
                return Err(e);
            }
        };
        let status = validation.outcome.status;

        let update = StatusUpdate {
            status,
            modified: now,
            modified_by: self.policy.actor.clone(),
            manifest_key: validation.manifest_key.clone(),
            title: validation.manifest.as_ref().map(|m| m.title.clone()),
            assets: validation.manifest.as_ref().map(Manifest::assets),
            discrepancies: Some(validation.outcome.discrepancies.clone()),
            pending_cleanup: Some(relocation.files.clone()),
        };
        let persisted = match self.tracking.compare_and_set(&pkg.key, claimed.revision, update) {
            Ok(Some(p)) => p,
            Ok(None) => {
                // someone rewrote the record under us; leave staging for them
                return Err(IngestError::Tracking(format!(
                    "claim on {} lost before status write",
                    pkg.key
                )));
            }
            Err(e) => {
                self.release(&claimed, now);
                return Err(e);
            }
        };

        if status == Status::Success {
            tracing::info!(%status, files = relocation.files.len(), "package archived");
        } else {
            tracing::warn!(%status, rule = validation.outcome.rule, files = relocation.files.len(), "package moved to error area");
        }

        let cleanup = relocate::cleanup_staging(self.store.as_ref(), relocation.area, &relocation.files);
        let cleanup_ok = cleanup.kept.is_empty();
        if !cleanup_ok {
            tracing::error!(kept = cleanup.kept.len(), "staging cleanup incomplete, sweep will retry");
        }
        self.record_pending(&persisted, cleanup.kept, now);
        Ok(Processed::Done { status, cleanup_ok })
    }

    /// Narrow the recorded staging copies to those still awaiting deletion.
    /// A failed write only leaves extra entries for sweep to re-check.
    fn record_pending(&self, pkg: &Package, kept: Vec<StagedCopy>, now: OffsetDateTime) {
        if kept == pkg.pending_cleanup {
            return;
        }
        let upd = StatusUpdate {
            pending_cleanup: Some(kept),
            ..StatusUpdate::status_only(pkg.status, now, &self.policy.actor)
        };
        match self.tracking.compare_and_set(&pkg.key, pkg.revision, upd) {
            Ok(Some(_)) => {}
            Ok(None) => tracing::warn!(package = %pkg.key, "record changed before cleanup was noted"),
            Err(e) => tracing::error!(package = %pkg.key, error = %e, "could not record cleanup"),
        }
    }

    fn validate_and_transfer(
        &self,
        pkg: &Package,
        pass_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<(Validation, Relocation)> {
        let validation = validate_package(self.store.as_ref(), pkg, self.policy.checksum)?;
        let relocation = relocate::transfer(
            self.store.as_ref(),
            &pkg.key,
            &validation.inventory,
            &validation.outcome,
            pass_id,
            now,
        )?;
        Ok((validation, relocation))
    }

    /// Put a claimed package back to `VALID_STRUCTURE` so a later pass retries it.
    fn release(&self, claimed: &Package, now: OffsetDateTime) {
        let upd = StatusUpdate::status_only(Status::ValidStructure, now, &self.policy.actor);
        match self.tracking.compare_and_set(&claimed.key, claimed.revision, upd) {
            Ok(Some(_)) => {}
            Ok(None) => tracing::warn!(package = %claimed.key, "claim changed hands before release"),
            Err(e) => {
                tracing::error!(package = %claimed.key, error = %e, "could not release claim; it expires after the claim TTL")
            }
        }
    }

    /// Dry run of the validation stages; nothing is moved or written.
    pub fn validate_only(&self, key: &PackageKey) -> Result<Validation> {
        let pkg = self
            .tracking
            .get(key)?
            .ok_or_else(|| IngestError::Tracking(format!("unknown package {key}")))?;
        validate_package(self.store.as_ref(), &pkg, self.policy.checksum)
    }

    /// Retry staging cleanup for terminal packages. Only copies recorded at
    /// relocation are candidates, and each is deleted only while its staging
    /// content still hashes to what was relocated and the destination holds
    /// the copied size. Packages whose staging prefix was written after they
    /// closed are left for intake.
    pub fn sweep(&self, now: OffsetDateTime) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        for pkg in self.tracking.list()? {
            if !pkg.status.is_terminal() || pkg.pending_cleanup.is_empty() {
                continue;
            }
            report.packages += 1;
            let span = tracing::info_span!("sweep", package = %pkg.key);
            let _guard = span.enter();

            let staged = self.store.list(Area::Staging, &pkg.staging_prefix)?;
            if staged.iter().any(|o| o.modified.is_some_and(|m| m > pkg.modified)) {
                tracing::warn!(closed_at = %pkg.modified, "staging written after the package closed, left alone");
                report.redelivered += 1;
                report.kept += staged.len();
                continue;
            }

            let present: HashMap<&str, u64> = staged.iter().map(|o| (o.key.as_str(), o.size)).collect();
            let mut candidates = Vec::new();
            let mut retry = Vec::new();
            for f in &pkg.pending_cleanup {
                let Some(&size) = present.get(f.staging_key.as_str()) else {
                    continue;
                };
                if size != f.size {
                    tracing::warn!(key = %f.staging_key, "staging object differs from the relocated copy, kept");
                    report.kept += 1;
                    continue;
                }
                match relocate::staged_digest(self.store.as_ref(), &f.staging_key) {
                    Ok(d) if d == f.blake3 => candidates.push(f.clone()),
                    Ok(_) => {
                        tracing::warn!(key = %f.staging_key, "staging object differs from the relocated copy, kept");
                        report.kept += 1;
                    }
                    Err(e) => {
                        tracing::warn!(key = %f.staging_key, error = %e, "could not hash staging object");
                        report.kept += 1;
                        retry.push(f.clone());
                    }
                }
            }

            let area = relocate::destination(pkg.status);
            let cleanup = relocate::cleanup_staging(self.store.as_ref(), area, &candidates);
            report.deleted += cleanup.deleted;
            report.kept += cleanup.kept.len();
            retry.extend(cleanup.kept);
            tracing::info!(deleted = cleanup.deleted, pending = retry.len(), "staging swept");
            self.record_pending(&pkg, retry, now);
        }
        Ok(report)
    }
}
