use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain::ChecksumMismatch;
use crate::error::Result;
use crate::inventory::{Inventory, InventoryDiff};
use crate::manifest::Manifest;
use crate::store::{Area, ObjectStore};
use crate::util::hash_forward::HashingReader;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgo {
    /// What delivery manifests carry.
    #[default]
    Md5,
    Sha256,
    Blake3,
}

impl ChecksumAlgo {
    pub fn digest(self, r: impl std::io::Read) -> std::io::Result<String> {
        match self {
            ChecksumAlgo::Md5 => HashingReader::new(r, <md5::Md5 as md5::Digest>::new()).finish(),
            ChecksumAlgo::Sha256 => {
                HashingReader::new(r, <sha2::Sha256 as sha2::Digest>::new()).finish()
            }
            ChecksumAlgo::Blake3 => HashingReader::new(r, blake3::Hasher::new()).finish(),
        }
    }

    fn from_prefix(p: &str) -> Option<Self> {
        [Self::Md5, Self::Sha256, Self::Blake3]
            .into_iter()
            .find(|a| p.eq_ignore_ascii_case(a.name()))
    }

    pub fn name(self) -> &'static str {
        match self {
            ChecksumAlgo::Md5 => "md5",
            ChecksumAlgo::Sha256 => "sha256",
            ChecksumAlgo::Blake3 => "blake3",
        }
    }

    fn hex_len(self) -> usize {
        match self {
            ChecksumAlgo::Md5 => 32,
            ChecksumAlgo::Sha256 | ChecksumAlgo::Blake3 => 64,
        }
    }
}

/// A declared checksum, with an optional `md5:` / `sha256:` / `blake3:` prefix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Expected {
    pub algo: ChecksumAlgo,
    pub hex: String,
}

impl Expected {
    /// Without a prefix the digest length picks the algorithm: 32 hex digits
    /// is md5, 64 is sha256 unless `default` is blake3. Anything else is
    /// checked with `default` and will not match.
    pub fn parse(declared: &str, default: ChecksumAlgo) -> Self {
        let v = declared.trim().trim_matches('"').trim();
        let (algo, hex) = match v.split_once(':') {
            Some((p, rest)) => match ChecksumAlgo::from_prefix(p.trim()) {
                Some(a) => (a, rest),
                None => (default, v),
            },
            None => {
                let algo = match v.len() {
                    n if n == default.hex_len() => default,
                    32 => ChecksumAlgo::Md5,
                    64 => ChecksumAlgo::Sha256,
                    _ => default,
                };
                (algo, v)
            }
        };
        Self {
            algo,
            hex: hex.trim().to_ascii_lowercase(),
        }
    }
}

fn hash_object(store: &dyn ObjectStore, key: &str, algo: ChecksumAlgo) -> Result<String> {
    let r = store.open(Area::Staging, key)?;
    Ok(algo.digest(r)?)
}

/// Hash every matched file that declares a checksum and collect mismatches.
/// Unreadable files count as mismatches; files without a declared checksum
/// pass unchecked.
pub fn verify(
    store: &dyn ObjectStore,
    manifest: &Manifest,
    inventory: &mut Inventory,
    diff: &InventoryDiff,
    default: ChecksumAlgo,
) -> Vec<ChecksumMismatch> {
    let jobs: Vec<(usize, &str, Expected)> = diff
        .matched
        .iter()
        .filter_map(|m| {
            let rec = &manifest.records[m.record];
            let declared = rec.checksum.as_deref()?;
            Some((m.entry, rec.file_name.as_str(), Expected::parse(declared, default)))
        })
        .collect();

    let entries = &inventory.entries;
    let results: Vec<(usize, &str, Expected, Option<String>)> = jobs
        .into_par_iter()
        .map(|(entry, name, expected)| {
            let key = &entries[entry].key;
            let actual = match hash_object(store, key, expected.algo) {
                Ok(h) => Some(h),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "checksum read failed");
                    None
                }
            };
            (entry, name, expected, actual)
        })
        .collect();

    let mut mismatches = Vec::new();
    for (entry, name, expected, actual) in results {
        inventory.entries[entry].checksum = actual.clone();
        if actual.as_deref() != Some(expected.hex.as_str()) {
            mismatches.push(ChecksumMismatch {
                file: name.to_string(),
                expected: expected.hex,
                actual,
            });
        }
    }
    mismatches.sort_by(|a, b| a.file.cmp(&b.file));
    mismatches
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digests() {
        assert_eq!(
            ChecksumAlgo::Md5.digest(&b"abc"[..]).unwrap(),
            "900150983cd24fb0d6963f7d28e17f72"
        );
        assert_eq!(
            ChecksumAlgo::Sha256.digest(&b"abc"[..]).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(
            ChecksumAlgo::Blake3.digest(&b"abc"[..]).unwrap(),
            blake3::hash(b"abc").to_hex().to_string()
        );
    }

    #[test]
    fn digest_length_picks_the_algorithm() {
        let md5 = "900150983CD24FB0D6963F7D28E17F72";
        assert_eq!(Expected::parse(md5, ChecksumAlgo::Sha256).algo, ChecksumAlgo::Md5);
        let sha = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";
        assert_eq!(Expected::parse(sha, ChecksumAlgo::Md5).algo, ChecksumAlgo::Sha256);
        assert_eq!(Expected::parse(sha, ChecksumAlgo::Blake3).algo, ChecksumAlgo::Blake3);
        assert_eq!(Expected::parse("md5:abc", ChecksumAlgo::Blake3).algo, ChecksumAlgo::Md5);
    }

    #[test]
    fn expected_prefix_and_case() {
        let e = Expected::parse(" \"ABC123\" ", ChecksumAlgo::Sha256);
        assert_eq!(e, Expected { algo: ChecksumAlgo::Sha256, hex: "abc123".into() });
        let e = Expected::parse("BLAKE3:FF00", ChecksumAlgo::Sha256);
        assert_eq!(e, Expected { algo: ChecksumAlgo::Blake3, hex: "ff00".into() });
    }
}
