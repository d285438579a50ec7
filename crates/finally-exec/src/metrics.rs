//! Per-invocation summary events.
//!
//! Nothing is aggregated here. Each invocation emits one `trace` event inside
//! a `finally` span, carrying its summary as JSON; collectors are the
//! subscriber's business.

use serde::Serialize;

use finally_core::budget::ValidBudget;
use finally_core::error::{Error, Result};
use finally_core::id::InvocationId;

#[derive(Debug, Clone, Serialize)]
pub struct InvocationSummary {
    pub invocation: InvocationId,
    pub stack_slots: usize,
    pub call_frames: usize,
    pub calibrate: bool,
    /// Growth requests the calibration override denied.
    pub rejected: u64,
    pub outcome: &'static str,
}

impl InvocationSummary {
    pub fn new<T>(
        invocation: InvocationId,
        budget: &ValidBudget,
        rejected: u64,
        result: &Result<T>,
    ) -> Self {
        Self {
            invocation,
            stack_slots: budget.stack_slots(),
            call_frames: budget.call_frames(),
            calibrate: budget.calibrate(),
            rejected,
            outcome: outcome_label(result),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn emit(&self) {
        emit_span("invocation", &[("summary", self.to_json())]);
    }
}

/// Short label for how an invocation ended.
pub fn outcome_label<T>(result: &Result<T>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(Error::MainAction(_)) => "main_failed",
        Err(Error::CleanupAction(_)) => "cleanup_failed",
        Err(Error::CleanupSuspended) => "cleanup_suspended",
        Err(Error::InvalidArgument { .. }) => "invalid_argument",
        Err(_) => "setup_failed",
    }
}

#[cfg(feature = "tracing")]
pub fn emit_span(event: &str, key_values: &[(&str, String)]) {
    let _span = tracing::trace_span!("finally", event).entered();
    for (k, v) in key_values {
        tracing::trace!(%event, %k, %v, "metric");
    }
}

#[cfg(not(feature = "tracing"))]
pub fn emit_span(_event: &str, _key_values: &[(&str, String)]) {}

#[cfg(test)]
mod tests {
    use super::*;
    use finally_core::budget::ResourceBudget;

    #[test]
    fn test_summary_json() {
        let budget = ResourceBudget::new(8, 2).calibrating(true).validate().unwrap();
        let ok: Result<()> = Ok(());
        let s = InvocationSummary::new(InvocationId::new(7), &budget, 3, &ok);
        let v: serde_json::Value = serde_json::from_str(&s.to_json()).unwrap();
        assert_eq!(v["invocation"], 7);
        assert_eq!(v["stack_slots"], 8);
        assert_eq!(v["call_frames"], 2);
        assert_eq!(v["rejected"], 3);
        assert_eq!(v["outcome"], "ok");
    }

    #[test]
    fn test_outcome_labels() {
        let suspended: Result<()> = Err(Error::CleanupSuspended);
        assert_eq!(outcome_label(&suspended), "cleanup_suspended");
        let main: Result<()> = Err(Error::MainAction("x".into()));
        assert_eq!(outcome_label(&main), "main_failed");
        let setup: Result<()> = Err(Error::Setup("x".into()));
        assert_eq!(outcome_label(&setup), "setup_failed");
    }
}
