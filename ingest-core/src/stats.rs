use std::collections::BTreeMap;

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::Status;

/// Tally of one validation pass.
#[derive(Clone, Debug, Serialize)]
pub struct PassReport {
    pub pass_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    pub eligible: usize,
    /// Packages that reached a terminal status this pass.
    pub processed: usize,
    /// Packages skipped on an infrastructure error; their status was restored.
    pub failed: usize,
    /// Claims lost to another worker.
    pub skipped: usize,
    /// Terminal packages whose staging copies could not all be removed.
    pub cleanup_failures: usize,
    /// Shutdown was requested before every eligible package was visited.
    pub interrupted: bool,
    pub outcomes: BTreeMap<Status, usize>,
}

impl PassReport {
    pub fn new(pass_id: Uuid, started_at: OffsetDateTime) -> Self {
        Self {
            pass_id,
            started_at,
            eligible: 0,
            processed: 0,
            failed: 0,
            skipped: 0,
            cleanup_failures: 0,
            interrupted: false,
            outcomes: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, status: Status) {
        self.processed += 1;
        *self.outcomes.entry(status).or_default() += 1;
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct SweepReport {
    /// Terminal packages that still listed staging copies to remove.
    pub packages: usize,
    pub deleted: usize,
    /// Staging objects left in place.
    pub kept: usize,
    /// Packages skipped because their staging prefix was written after they closed.
    pub redelivered: usize,
}
