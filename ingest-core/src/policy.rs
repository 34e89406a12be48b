use time::Duration;

use crate::checksum::ChecksumAlgo;

#[derive(Clone, Debug)]
pub struct ValidationPolicy {
    /// Packages younger than this are left alone; they may still be uploading.
    pub cutoff: Duration,
    /// A `PROCESSING` claim older than this is considered abandoned and re-claimed.
    pub claim_ttl: Duration,
    /// Digest used when a declared checksum carries no algorithm prefix.
    pub checksum: ChecksumAlgo,
    /// Recorded as `modified_by` on status writes.
    pub actor: String,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            cutoff: Duration::minutes(1),
            claim_ttl: Duration::minutes(60),
            checksum: ChecksumAlgo::Md5,
            actor: "asset-validation".to_string(),
        }
    }
}
