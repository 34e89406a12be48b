use std::collections::HashSet;

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::checksum::ChecksumAlgo;
use crate::classify::Outcome;
use crate::domain::{Discrepancies, PackageKey, StagedCopy, Status};
use crate::error::{IngestError, Result};
use crate::inventory::Inventory;
use crate::store::{Area, ObjectStore};
use crate::util::hash_forward::HashingReader;

/// Triage sidecar written next to packages in the error area.
pub const TRIAGE_FILE: &str = "_validation.json";

pub fn destination(status: Status) -> Area {
    if status == Status::Success {
        Area::Archive
    } else {
        Area::Error
    }
}

#[derive(Serialize)]
struct TriageNote<'a> {
    package: String,
    status: Status,
    rule: &'a str,
    pass_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    recorded_at: OffsetDateTime,
    files: Vec<&'a str>,
    discrepancies: &'a Discrepancies,
}

/// Result of a confirmed transfer; the input to staging cleanup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Relocation {
    pub area: Area,
    pub files: Vec<StagedCopy>,
    pub triage_key: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cleanup {
    pub deleted: usize,
    /// Copies whose staging object is still there.
    pub kept: Vec<StagedCopy>,
}

fn relocation_err(key: &str, reason: impl ToString) -> IngestError {
    IngestError::Relocation {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

/// First `_validation[.N].json` name not taken by a delivered file.
fn triage_name(inventory: &Inventory) -> String {
    let taken: HashSet<&str> = inventory.entries.iter().map(|e| e.name.as_str()).collect();
    let mut name = TRIAGE_FILE.to_string();
    let mut n = 1;
    while taken.contains(name.as_str()) {
        name = format!("_validation.{n}.json");
        n += 1;
    }
    name
}

/// Copy every staged file to `title/asset/<name>` in the outcome's area and
/// confirm each copy. Nothing in staging is touched; repeating the call
/// overwrites the same keys.
pub fn transfer(
    store: &dyn ObjectStore,
    key: &PackageKey,
    inventory: &Inventory,
    outcome: &Outcome,
    pass_id: Uuid,
    now: OffsetDateTime,
) -> Result<Relocation> {
    let area = destination(outcome.status);
    let dest_prefix = key.default_prefix();

    let mut files = Vec::with_capacity(inventory.entries.len());
    for e in &inventory.entries {
        let dest_key = format!("{dest_prefix}{}", e.name);
        let src = store
            .open(Area::Staging, &e.key)
            .map_err(|err| relocation_err(&e.key, err))?;
        let mut reader = HashingReader::new(src, blake3::Hasher::new());
        store
            .put(area, &dest_key, &mut reader)
            .map_err(|err| relocation_err(&dest_key, err))?;
        let copied = reader.counted;
        let digest = reader.finish().map_err(|err| relocation_err(&e.key, err))?;
        if copied != e.size {
            return Err(relocation_err(
                &e.key,
                format!("changed while copying: read {copied} bytes, listed {}", e.size),
            ));
        }
        files.push(StagedCopy {
            staging_key: e.key.clone(),
            dest_key,
            size: copied,
            blake3: digest,
        });
    }

    let triage_key = if area == Area::Error {
        let note = TriageNote {
            package: key.to_string(),
            status: outcome.status,
            rule: outcome.rule,
            pass_id,
            recorded_at: now,
            files: inventory.entries.iter().map(|e| e.name.as_str()).collect(),
            discrepancies: &outcome.discrepancies,
        };
        let body = serde_json::to_vec_pretty(&note)
            .map_err(|e| IngestError::Format(format!("triage note: {e}")))?;
        let tkey = format!("{dest_prefix}{}", triage_name(inventory));
        store
            .put(Area::Error, &tkey, &mut &body[..])
            .map_err(|err| relocation_err(&tkey, err))?;
        Some(tkey)
    } else {
        None
    };

    for f in &files {
        match store
            .head(area, &f.dest_key)
            .map_err(|err| relocation_err(&f.dest_key, err))?
        {
            Some(size) if size == f.size => {}
            Some(size) => {
                return Err(relocation_err(
                    &f.dest_key,
                    format!("{area} copy has {size} bytes, expected {}", f.size),
                ));
            }
            None => return Err(relocation_err(&f.dest_key, format!("not present in {area}"))),
        }
    }
    if let Some(t) = &triage_key {
        if store.head(Area::Error, t).map_err(|err| relocation_err(t, err))?.is_none() {
            return Err(relocation_err(t, "triage note not present"));
        }
    }

    Ok(Relocation {
        area,
        files,
        triage_key,
    })
}

/// blake3 of a staging object, comparable with `StagedCopy::blake3`.
pub fn staged_digest(store: &dyn ObjectStore, key: &str) -> Result<String> {
    Ok(ChecksumAlgo::Blake3.digest(store.open(Area::Staging, key)?)?)
}

/// Delete staging copies whose destination copy is present with the copied
/// size. Idempotent; store errors keep the copy for a later retry.
pub fn cleanup_staging(store: &dyn ObjectStore, area: Area, files: &[StagedCopy]) -> Cleanup {
    let mut out = Cleanup::default();
    for f in files {
        let confirmed = match store.head(area, &f.dest_key) {
            Ok(size) => size == Some(f.size),
            Err(e) => {
                tracing::warn!(key = %f.dest_key, error = %e, "destination check failed");
                false
            }
        };
        if !confirmed {
            tracing::warn!(key = %f.staging_key, %area, "destination copy not confirmed, staging kept");
            out.kept.push(f.clone());
            continue;
        }
        match store.delete(Area::Staging, &f.staging_key) {
            Ok(()) => out.deleted += 1,
            Err(e) => {
                tracing::warn!(key = %f.staging_key, error = %e, "staging delete failed");
                out.kept.push(f.clone());
            }
        }
    }
    out
}
