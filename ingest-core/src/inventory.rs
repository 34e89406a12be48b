use std::collections::{BTreeMap, BTreeSet};

use crate::manifest::Manifest;
use crate::store::ObjectMeta;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InventoryEntry {
    /// Relative to the package staging prefix.
    pub name: String,
    /// Full object key in the staging area.
    pub key: String,
    pub size: u64,
    /// Filled in by the checksum verifier, only for files it had to hash.
    pub checksum: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct Inventory {
    pub prefix: String,
    pub entries: Vec<InventoryEntry>,
}

impl Inventory {
    pub fn from_objects(prefix: &str, objects: &[ObjectMeta]) -> Self {
        let entries = objects
            .iter()
            .filter_map(|o| {
                let name = o.key.strip_prefix(prefix)?;
                (!name.is_empty()).then(|| InventoryEntry {
                    name: name.to_string(),
                    key: o.key.clone(),
                    size: o.size,
                    checksum: None,
                })
            })
            .collect();
        Self {
            prefix: prefix.to_string(),
            entries,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A declared file found in staging: index into `Manifest::records` and into
/// `Inventory::entries`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Matched {
    pub record: usize,
    pub entry: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InventoryDiff {
    pub missing: Vec<String>,
    pub extra: Vec<String>,
    pub matched: Vec<Matched>,
}

/// Diff declared names against present names. Exact, case-sensitive; the
/// manifest object itself takes no part.
pub fn compare(manifest: &Manifest, inventory: &Inventory, manifest_key: &str) -> InventoryDiff {
    let present: BTreeMap<&str, usize> = inventory
        .entries
        .iter()
        .enumerate()
        .filter(|(_, e)| e.key != manifest_key)
        .map(|(i, e)| (e.name.as_str(), i))
        .collect();
    let declared: BTreeSet<&str> = manifest
        .records
        .iter()
        .map(|r| r.file_name.as_str())
        .collect();

    let mut diff = InventoryDiff::default();
    for (ri, rec) in manifest.records.iter().enumerate() {
        match present.get(rec.file_name.as_str()) {
            Some(&ei) => diff.matched.push(Matched {
                record: ri,
                entry: ei,
            }),
            None => diff.missing.push(rec.file_name.clone()),
        }
    }
    diff.extra = present
        .keys()
        .filter(|name| !declared.contains(*name))
        .map(|name| name.to_string())
        .collect();
    diff.missing.sort();
    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AssetInfo, TitleInfo};
    use crate::manifest::ManifestRecord;

    fn manifest(names: &[&str]) -> Manifest {
        Manifest {
            title: TitleInfo::default(),
            records: names
                .iter()
                .map(|n| ManifestRecord {
                    file_name: n.to_string(),
                    checksum: None,
                    asset: AssetInfo::default(),
                })
                .collect(),
        }
    }

    fn inventory(names: &[&str]) -> Inventory {
        let objs: Vec<_> = names
            .iter()
            .map(|n| ObjectMeta {
                key: format!("T/A/{n}"),
                size: 1,
                modified: None,
            })
            .collect();
        Inventory::from_objects("T/A/", &objs)
    }

    #[test]
    fn exact_match() {
        let d = compare(
            &manifest(&["a.mp4", "b.mp4"]),
            &inventory(&["a.mp4", "b.mp4", "m.csv"]),
            "T/A/m.csv",
        );
        assert!(d.missing.is_empty());
        assert!(d.extra.is_empty());
        assert_eq!(d.matched.len(), 2);
    }

    #[test]
    fn missing_and_extra_together() {
        let d = compare(
            &manifest(&["b.mp4", "a.mp4"]),
            &inventory(&["a.mp4", "c.mp4", "m.csv"]),
            "T/A/m.csv",
        );
        assert_eq!(d.missing, vec!["b.mp4"]);
        assert_eq!(d.extra, vec!["c.mp4"]);
        assert_eq!(d.matched, vec![Matched { record: 1, entry: 0 }]);
    }

    #[test]
    fn matching_is_case_sensitive() {
        let d = compare(&manifest(&["A.mp4"]), &inventory(&["a.mp4"]), "T/A/m.csv");
        assert_eq!(d.missing, vec!["A.mp4"]);
        assert_eq!(d.extra, vec!["a.mp4"]);
    }

    #[test]
    fn nested_names_and_second_csv() {
        let d = compare(
            &manifest(&["Audio/b.wav"]),
            &inventory(&["Audio/b.wav", "m.csv", "z.csv"]),
            "T/A/m.csv",
        );
        assert!(d.missing.is_empty());
        assert_eq!(d.extra, vec!["z.csv"]);
    }

    #[test]
    fn empty_inventory_misses_everything() {
        let d = compare(&manifest(&["a.mp4"]), &inventory(&[]), "T/A/m.csv");
        assert_eq!(d.missing, vec!["a.mp4"]);
    }
}
