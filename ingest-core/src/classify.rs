use crate::domain::{ChecksumMismatch, Discrepancies, Status};
use crate::inventory::InventoryDiff;
use crate::manifest::ManifestError;

/// Everything the pipeline learned about one package. Stages after a
/// structural manifest failure never run, so their results stay `None`.
#[derive(Clone, Debug)]
pub struct Evidence {
    pub manifest: Result<(), ManifestError>,
    pub diff: Option<InventoryDiff>,
    pub mismatches: Option<Vec<ChecksumMismatch>>,
}

impl Evidence {
    pub fn structural(err: ManifestError) -> Self {
        Self {
            manifest: Err(err),
            diff: None,
            mismatches: None,
        }
    }

    fn missing(&self) -> bool {
        self.diff.as_ref().is_some_and(|d| !d.missing.is_empty())
    }

    fn extra(&self) -> bool {
        self.diff.as_ref().is_some_and(|d| !d.extra.is_empty())
    }

    fn mismatched(&self) -> bool {
        self.mismatches.as_ref().is_some_and(|m| !m.is_empty())
    }
}

pub struct Rule {
    pub name: &'static str,
    pub status: Status,
    pub applies: fn(&Evidence) -> bool,
}

/// Precedence, first match wins. The last rule always applies.
pub const RULES: &[Rule] = &[
    Rule {
        name: "manifest-absent",
        status: Status::Failed,
        applies: |e| matches!(e.manifest, Err(ManifestError::Absent)),
    },
    Rule {
        name: "manifest-malformed",
        status: Status::InvalidCsv,
        applies: |e| matches!(e.manifest, Err(ManifestError::Malformed(_))),
    },
    Rule {
        name: "missing-files",
        status: Status::MissingFiles,
        applies: Evidence::missing,
    },
    Rule {
        name: "extra-files",
        status: Status::ExtraFiles,
        applies: Evidence::extra,
    },
    Rule {
        name: "checksum-mismatch",
        status: Status::MismatchChecksum,
        applies: Evidence::mismatched,
    },
    Rule {
        name: "clean",
        status: Status::Success,
        applies: |_| true,
    },
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outcome {
    pub status: Status,
    pub rule: &'static str,
    pub discrepancies: Discrepancies,
}

pub fn classify(evidence: &Evidence) -> Outcome {
    let rule = RULES
        .iter()
        .find(|r| (r.applies)(evidence))
        .unwrap_or(&RULES[RULES.len() - 1]);

    let mut discrepancies = Discrepancies {
        manifest_error: evidence.manifest.as_ref().err().map(|e| e.to_string()),
        ..Default::default()
    };
    if let Some(d) = &evidence.diff {
        discrepancies.missing = d.missing.clone();
        discrepancies.extra = d.extra.clone();
    }
    if let Some(m) = &evidence.mismatches {
        discrepancies.checksum_mismatches = m.clone();
    }

    Outcome {
        status: rule.status,
        rule: rule.name,
        discrepancies,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::MalformedReason;

    fn evidence(missing: &[&str], extra: &[&str], mismatched: &[&str]) -> Evidence {
        Evidence {
            manifest: Ok(()),
            diff: Some(InventoryDiff {
                missing: missing.iter().map(|s| s.to_string()).collect(),
                extra: extra.iter().map(|s| s.to_string()).collect(),
                matched: Vec::new(),
            }),
            mismatches: Some(
                mismatched
                    .iter()
                    .map(|f| ChecksumMismatch {
                        file: f.to_string(),
                        expected: "abc123".into(),
                        actual: Some("xyz999".into()),
                    })
                    .collect(),
            ),
        }
    }

    #[test]
    fn structural_rules_come_first() {
        let o = classify(&Evidence::structural(ManifestError::Absent));
        assert_eq!(o.status, Status::Failed);
        let o = classify(&Evidence::structural(ManifestError::Malformed(
            MalformedReason::NoDataRows,
        )));
        assert_eq!(o.status, Status::InvalidCsv);
        assert_eq!(o.discrepancies.manifest_error.as_deref(), Some("malformed manifest: no data rows"));
    }

    #[test]
    fn missing_beats_extra_beats_checksum() {
        assert_eq!(classify(&evidence(&["b"], &["c"], &["a"])).status, Status::MissingFiles);
        assert_eq!(classify(&evidence(&[], &["c"], &["a"])).status, Status::ExtraFiles);
        assert_eq!(classify(&evidence(&[], &[], &["a"])).status, Status::MismatchChecksum);
        assert_eq!(classify(&evidence(&[], &[], &[])).status, Status::Success);
    }

    #[test]
    fn discrepancies_carry_every_class_seen() {
        let o = classify(&evidence(&["b"], &["c"], &["a"]));
        assert_eq!(o.rule, "missing-files");
        assert_eq!(o.discrepancies.missing, vec!["b"]);
        assert_eq!(o.discrepancies.extra, vec!["c"]);
        assert_eq!(o.discrepancies.checksum_mismatches.len(), 1);
    }

    #[test]
    fn rule_table_shape() {
        let order: Vec<_> = RULES.iter().map(|r| r.status).collect();
        assert_eq!(
            order,
            vec![
                Status::Failed,
                Status::InvalidCsv,
                Status::MissingFiles,
                Status::ExtraFiles,
                Status::MismatchChecksum,
                Status::Success,
            ]
        );
        assert!(RULES.iter().all(|r| r.status.is_terminal()));
    }
}
