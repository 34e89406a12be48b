use serde::Deserialize;
use time::OffsetDateTime;

use crate::error::{IngestError, Result};
use crate::orchestrator::Orchestrator;
use crate::stats::PassReport;

/// The only trigger kind that starts a validation pass.
pub const ASSET_VALIDATION_CHECK: &str = "asset_validation_check";

#[derive(Debug, Clone, Deserialize)]
pub struct TriggerMessage {
    #[serde(default)]
    pub trigger: Option<String>,
}

impl TriggerMessage {
    pub fn parse(body: &str) -> Result<Self> {
        serde_json::from_str(body).map_err(|e| IngestError::Format(format!("trigger message: {e}")))
    }

    pub fn is_validation_check(&self) -> bool {
        self.trigger.as_deref() == Some(ASSET_VALIDATION_CHECK)
    }
}

/// Run a pass for a validation-check trigger; other kinds are ignored.
pub fn handle_trigger(
    orch: &Orchestrator,
    body: &str,
    now: OffsetDateTime,
) -> Result<Option<PassReport>> {
    let msg = TriggerMessage::parse(body)?;
    if !msg.is_validation_check() {
        tracing::warn!(trigger = ?msg.trigger, "ignoring unknown trigger");
        return Ok(None);
    }
    orch.run_pass(now).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_only_the_validation_kind() {
        assert!(TriggerMessage::parse(r#"{"trigger":"asset_validation_check"}"#)
            .unwrap()
            .is_validation_check());
        assert!(!TriggerMessage::parse(r#"{"trigger":"nightly_report"}"#)
            .unwrap()
            .is_validation_check());
        assert!(!TriggerMessage::parse(r#"{"other":1}"#).unwrap().is_validation_check());
        assert!(TriggerMessage::parse("not json").is_err());
    }
}
