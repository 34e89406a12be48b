// ingest_core/src/domain.rs
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::IngestError;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PackageKey {
    pub title_id: String,
    pub asset_id: String,
}

impl PackageKey {
    pub fn new(title_id: impl Into<String>, asset_id: impl Into<String>) -> Self {
        Self {
            title_id: title_id.into(),
            asset_id: asset_id.into(),
        }
    }

    /// Staging prefix used when intake does not record one: `title/asset/`.
    pub fn default_prefix(&self) -> String {
        format!("{}/{}/", self.title_id, self.asset_id)
    }
}

impl fmt::Display for PackageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.title_id, self.asset_id)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Pending,
    ValidStructure,
    Processing,
    Success,
    InvalidCsv,
    MissingFiles,
    ExtraFiles,
    MismatchChecksum,
    Failed,
}

impl Status {
    pub const ALL: [Status; 9] = [
        Status::Pending,
        Status::ValidStructure,
        Status::Processing,
        Status::Success,
        Status::InvalidCsv,
        Status::MissingFiles,
        Status::ExtraFiles,
        Status::MismatchChecksum,
        Status::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "PENDING",
            Status::ValidStructure => "VALID_STRUCTURE",
            Status::Processing => "PROCESSING",
            Status::Success => "SUCCESS",
            Status::InvalidCsv => "INVALID_CSV",
            Status::MissingFiles => "MISSING_FILES",
            Status::ExtraFiles => "EXTRA_FILES",
            Status::MismatchChecksum => "MISMATCH_CHECKSUM",
            Status::Failed => "FAILED",
        }
    }

    /// Outcome statuses; the pipeline never moves a package out of these.
    pub fn is_terminal(self) -> bool {
        !matches!(
            self,
            Status::Pending | Status::ValidStructure | Status::Processing
        )
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace('-', "_").to_ascii_uppercase();
        Status::ALL
            .into_iter()
            .find(|st| st.as_str() == wanted)
            .ok_or_else(|| IngestError::Format(format!("unknown status: {s}")))
    }
}

/// Title-level fields from the key/value rows above the manifest header.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleInfo {
    pub title_id: String,
    pub title_name: String,
    pub version_name: String,
    pub version_id: String,
    pub release_year: String,
    pub title_eidr_id: Option<String>,
    pub version_eidr_id: Option<String>,
    pub uploader: String,
}

/// Per-row asset metadata carried alongside the declared file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetInfo {
    pub file_name: String,
    pub checksum: Option<String>,
    pub creation_date: Option<String>,
    pub revision_notes: Option<String>,
    pub revision_urgency: Option<String>,
    pub studio_asset_id: Option<String>,
    pub studio_system_name: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumMismatch {
    pub file: String,
    pub expected: String,
    /// None when the file could not be read.
    pub actual: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discrepancies {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checksum_mismatches: Vec<ChecksumMismatch>,
}

impl Discrepancies {
    pub fn is_empty(&self) -> bool {
        self.manifest_error.is_none()
            && self.missing.is_empty()
            && self.extra.is_empty()
            && self.checksum_mismatches.is_empty()
    }
}

/// One staged file copied to its destination area. Kept on the record until
/// the staging copy is gone.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedCopy {
    pub staging_key: String,
    pub dest_key: String,
    pub size: u64,
    /// blake3 of the bytes that were copied.
    pub blake3: String,
}

/// Tracking record for one package.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub key: PackageKey,
    pub status: Status,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub modified: OffsetDateTime,
    pub modified_by: String,
    pub staging_prefix: String,
    pub manifest_key: Option<String>,
    /// Bumped on every write; conditional updates compare against it.
    pub revision: u64,
    pub title: Option<TitleInfo>,
    #[serde(default)]
    pub assets: Vec<AssetInfo>,
    pub discrepancies: Option<Discrepancies>,
    /// Relocated files whose staging copy has not been confirmed deleted.
    #[serde(default)]
    pub pending_cleanup: Vec<StagedCopy>,
}

#[derive(Clone, Debug)]
pub struct NewPackage {
    pub key: PackageKey,
    pub status: Status,
    pub created: OffsetDateTime,
    pub staging_prefix: Option<String>,
    pub registered_by: String,
}

/// Fields written by a conditional status update.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: Status,
    #[serde(with = "time::serde::rfc3339")]
    pub modified: OffsetDateTime,
    pub modified_by: String,
    pub manifest_key: Option<String>,
    pub title: Option<TitleInfo>,
    pub assets: Option<Vec<AssetInfo>>,
    pub discrepancies: Option<Discrepancies>,
    #[serde(default)]
    pub pending_cleanup: Option<Vec<StagedCopy>>,
}

impl StatusUpdate {
    pub fn status_only(status: Status, modified: OffsetDateTime, modified_by: &str) -> Self {
        Self {
            status,
            modified,
            modified_by: modified_by.to_string(),
            manifest_key: None,
            title: None,
            assets: None,
            discrepancies: None,
            pending_cleanup: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_loosely() {
        assert_eq!("valid-structure".parse::<Status>().unwrap(), Status::ValidStructure);
        assert_eq!("MISMATCH_CHECKSUM".parse::<Status>().unwrap(), Status::MismatchChecksum);
        assert!("bogus".parse::<Status>().is_err());
    }

    #[test]
    fn terminal_statuses() {
        let terminal: Vec<_> = Status::ALL.into_iter().filter(|s| s.is_terminal()).collect();
        assert_eq!(terminal.len(), 6);
        assert!(!Status::Processing.is_terminal());
    }

    #[test]
    fn status_serializes_screaming_snake() {
        let s = serde_json::to_string(&Status::InvalidCsv).unwrap();
        assert_eq!(s, "\"INVALID_CSV\"");
    }
}
