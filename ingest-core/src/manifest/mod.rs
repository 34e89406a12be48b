//! Delivery manifest: a CSV with a key/value title section, then a header row
//! (the row holding a `Filename` cell), then one row per delivered file.
//!
//! ```text
//! Title Name,Example Feature
//! Title ID,TTL1
//! Version Name,Theatrical
//! Version ID,V1
//! Release Year,2024
//! Creation Date,Filename,Checksum,Folder Path,Studio Revision Notes
//! 2024-05-01,a.mp4,<hex digest>,,
//! 2024-05-01,b.wav,,Audio,
//! ```

use std::collections::{BTreeMap, HashSet};

use thiserror::Error;

use crate::domain::{AssetInfo, TitleInfo};
use crate::store::ObjectMeta;
use crate::util::sanitize::{is_contained, join_name};

pub mod csv;

pub const COL_FILENAME: &str = "Filename";
pub const COL_CHECKSUM: &str = "Checksum";
pub const COL_FOLDER: &str = "Folder Path";

const REQUIRED_COLUMNS: [&str; 3] = [COL_FILENAME, COL_CHECKSUM, COL_FOLDER];
const REQUIRED_TITLE_FIELDS: [&str; 5] = [
    "Title ID",
    "Title Name",
    "Version Name",
    "Version ID",
    "Release Year",
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManifestError {
    #[error("no manifest file in package")]
    Absent,
    #[error("malformed manifest: {0}")]
    Malformed(MalformedReason),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedReason {
    #[error("not valid UTF-8")]
    Encoding,
    #[error("unterminated quoted field")]
    UnterminatedQuote,
    #[error("no header row with a `Filename` column")]
    MissingHeader,
    #[error("header lacks required column `{0}`")]
    MissingColumn(String),
    #[error("title field `{0}` missing or empty")]
    MissingTitleField(String),
    #[error("row {row}: expected {expected} columns, found {found}")]
    ColumnCount {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("row {row}: empty file name")]
    EmptyFilename { row: usize },
    #[error("row {row}: file name `{name}` escapes the package")]
    UnsafePath { row: usize, name: String },
    #[error("file `{0}` declared more than once")]
    DuplicateFile(String),
    #[error("no data rows")]
    NoDataRows,
}

impl From<MalformedReason> for ManifestError {
    fn from(r: MalformedReason) -> Self {
        ManifestError::Malformed(r)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManifestRecord {
    /// Package-relative path: `Folder Path` joined with `Filename`.
    pub file_name: String,
    pub checksum: Option<String>,
    pub asset: AssetInfo,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Manifest {
    pub title: TitleInfo,
    pub records: Vec<ManifestRecord>,
}

impl Manifest {
    pub fn assets(&self) -> Vec<AssetInfo> {
        self.records.iter().map(|r| r.asset.clone()).collect()
    }
}

/// Pick the manifest among a package's objects: the first `.csv` by key.
pub fn locate_manifest(objects: &[ObjectMeta]) -> Option<&ObjectMeta> {
    objects
        .iter()
        .filter(|o| o.key.to_ascii_lowercase().ends_with(".csv"))
        .min_by(|a, b| a.key.cmp(&b.key))
}

pub fn parse_manifest(bytes: &[u8]) -> Result<Manifest, ManifestError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let text = std::str::from_utf8(bytes).map_err(|_| MalformedReason::Encoding)?;
    let rows = csv::split_records(text).ok_or(MalformedReason::UnterminatedQuote)?;

    let header_at = rows
        .iter()
        .position(|r| r.iter().any(|c| c.trim() == COL_FILENAME))
        .ok_or(MalformedReason::MissingHeader)?;
    let title = parse_title(&rows[..header_at])?;

    let header: Vec<String> = rows[header_at].iter().map(|c| c.trim().to_string()).collect();
    for col in REQUIRED_COLUMNS {
        if !header.iter().any(|h| h == col) {
            return Err(MalformedReason::MissingColumn(col.to_string()).into());
        }
    }

    let mut seen = HashSet::new();
    let mut records = Vec::new();
    for (i, row) in rows.iter().enumerate().skip(header_at + 1) {
        // 1-based record number, for operator-facing messages
        let line = i + 1;
        if row.iter().all(|c| c.trim().is_empty()) {
            continue;
        }
        if row.len() != header.len() {
            return Err(MalformedReason::ColumnCount {
                row: line,
                expected: header.len(),
                found: row.len(),
            }
            .into());
        }
        let record = parse_row(&header, row, line)?;
        if !seen.insert(record.file_name.clone()) {
            return Err(MalformedReason::DuplicateFile(record.file_name).into());
        }
        records.push(record);
    }

    if records.is_empty() {
        return Err(MalformedReason::NoDataRows.into());
    }
    Ok(Manifest { title, records })
}

fn parse_title(rows: &[Vec<String>]) -> Result<TitleInfo, ManifestError> {
    let mut kv: BTreeMap<&str, &str> = BTreeMap::new();
    for r in rows {
        if r.len() >= 2 && !r[0].trim().is_empty() {
            kv.insert(r[0].trim(), r[1].trim());
        }
    }
    for field in REQUIRED_TITLE_FIELDS {
        if kv.get(field).is_none_or(|v| v.is_empty()) {
            return Err(MalformedReason::MissingTitleField(field.to_string()).into());
        }
    }
    let get = |k: &str| kv.get(k).map(|v| v.to_string()).unwrap_or_default();
    let opt = |k: &str| kv.get(k).filter(|v| !v.is_empty()).map(|v| v.to_string());
    Ok(TitleInfo {
        title_id: get("Title ID"),
        title_name: get("Title Name"),
        version_name: get("Version Name"),
        version_id: get("Version ID"),
        release_year: get("Release Year"),
        title_eidr_id: opt("Title EIDR ID"),
        version_eidr_id: opt("Version EIDR ID"),
        uploader: opt("Uploader").unwrap_or_else(|| "SYSTEM".to_string()),
    })
}

fn parse_row(header: &[String], row: &[String], line: usize) -> Result<ManifestRecord, ManifestError> {
    let mut cells: BTreeMap<&str, String> = header
        .iter()
        .zip(row)
        .map(|(h, v)| (h.as_str(), v.trim().trim_matches('"').trim().to_string()))
        .collect();
    let mut take = |k: &str| cells.remove(k).filter(|v| !v.is_empty());

    let file = take(COL_FILENAME).ok_or(MalformedReason::EmptyFilename { row: line })?;
    let folder = take(COL_FOLDER).unwrap_or_default();
    let file_name = join_name(&folder, &file);
    if !is_contained(&file_name) {
        return Err(MalformedReason::UnsafePath {
            row: line,
            name: file_name,
        }
        .into());
    }
    let checksum = take(COL_CHECKSUM);

    let asset = AssetInfo {
        file_name: file_name.clone(),
        checksum: checksum.clone(),
        creation_date: take("Creation Date"),
        revision_notes: take("Studio Revision Notes"),
        revision_urgency: take("Studio Revision Urgency"),
        studio_asset_id: take("Studio Asset ID"),
        studio_system_name: take("Studio System Name"),
        extra: cells
            .into_iter()
            .filter(|(k, v)| !k.is_empty() && !v.is_empty())
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
    };
    Ok(ManifestRecord {
        file_name,
        checksum,
        asset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TITLE: &str = "Title Name,Example\nTitle ID,TTL1\nVersion Name,Theatrical\nVersion ID,V1\nRelease Year,2024\n";

    fn manifest(body: &str) -> Vec<u8> {
        format!("{TITLE}Creation Date,Filename,Checksum,Folder Path,Studio Asset ID\n{body}")
            .into_bytes()
    }

    fn malformed(bytes: &[u8]) -> MalformedReason {
        match parse_manifest(bytes) {
            Err(ManifestError::Malformed(r)) => r,
            other => panic!("expected malformed, got {other:?}"),
        }
    }

    #[test]
    fn parses_records_and_title() {
        let m = parse_manifest(&manifest(
            "2024-05-01,a.mp4,ABC123,,S-1\n2024-05-01,b.wav,,Audio\\Stems\\,\n",
        ))
        .unwrap();
        assert_eq!(m.title.title_id, "TTL1");
        assert_eq!(m.title.uploader, "SYSTEM");
        assert_eq!(m.records.len(), 2);
        assert_eq!(m.records[0].file_name, "a.mp4");
        assert_eq!(m.records[0].checksum.as_deref(), Some("ABC123"));
        assert_eq!(m.records[0].asset.studio_asset_id.as_deref(), Some("S-1"));
        assert_eq!(m.records[1].file_name, "Audio/Stems/b.wav");
        assert_eq!(m.records[1].checksum, None);
    }

    #[test]
    fn bom_and_crlf_are_accepted() {
        let mut bytes = b"\xEF\xBB\xBF".to_vec();
        bytes.extend(manifest("d,a.mp4,,,\r\n").iter().copied());
        assert_eq!(parse_manifest(&bytes).unwrap().records.len(), 1);
    }

    #[test]
    fn duplicate_file_names_rejected() {
        let r = malformed(&manifest("d,a.mp4,1,,\nd,a.mp4,2,,\n"));
        assert_eq!(r, MalformedReason::DuplicateFile("a.mp4".into()));
    }

    #[test]
    fn same_name_in_different_folders_is_fine() {
        let m = parse_manifest(&manifest("d,a.mp4,,,\nd,a.mp4,,Alt,\n")).unwrap();
        assert_eq!(m.records.len(), 2);
    }

    #[test]
    fn header_without_rows_is_malformed() {
        assert_eq!(malformed(&manifest("\n,,,,\n")), MalformedReason::NoDataRows);
    }

    #[test]
    fn wrong_column_count() {
        let r = malformed(&manifest("d,a.mp4,abc\n"));
        assert!(matches!(r, MalformedReason::ColumnCount { expected: 5, found: 3, .. }));
    }

    #[test]
    fn missing_header_column() {
        let bytes = format!("{TITLE}Filename,Checksum\na.mp4,x\n").into_bytes();
        assert_eq!(
            malformed(&bytes),
            MalformedReason::MissingColumn("Folder Path".into())
        );
    }

    #[test]
    fn missing_title_field() {
        let bytes = b"Title ID,TTL1\nFilename,Checksum,Folder Path\na.mp4,,\n";
        assert!(matches!(malformed(bytes), MalformedReason::MissingTitleField(_)));
    }

    #[test]
    fn structural_failures() {
        assert_eq!(malformed(b"\xff\xfe,,"), MalformedReason::Encoding);
        assert_eq!(malformed(b"Title ID,\"open"), MalformedReason::UnterminatedQuote);
        assert_eq!(malformed(b"just,some,cells\n"), MalformedReason::MissingHeader);
        assert!(matches!(
            malformed(&manifest("d,x.mp4,,..,\n")),
            MalformedReason::UnsafePath { .. }
        ));
        assert!(matches!(
            malformed(&manifest("d,,abc,,\n")),
            MalformedReason::EmptyFilename { .. }
        ));
    }

    #[test]
    fn locates_first_csv() {
        let objs = vec![
            ObjectMeta { key: "T/A/z.CSV".into(), size: 1, modified: None },
            ObjectMeta { key: "T/A/a.mp4".into(), size: 1, modified: None },
            ObjectMeta { key: "T/A/m.csv".into(), size: 1, modified: None },
        ];
        assert_eq!(locate_manifest(&objs).unwrap().key, "T/A/m.csv");
        assert!(locate_manifest(&objs[1..2]).is_none());
    }
}
