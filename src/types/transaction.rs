//! Swap transaction record and its state machine.
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::target::ServiceTarget;

/// States of a swap transaction, in execution order.
///
/// `Committed`, `RolledBack` and `Failed` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxState {
    Idle,
    Validating,
    Snapshotting,
    Stopping,
    Applying,
    Starting,
    Verifying,
    Committed,
    RolledBack,
    Failed,
}

impl TxState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, TxState::Committed | TxState::RolledBack | TxState::Failed)
    }

    /// True once live state (processes, config files, database) may have been touched.
    #[must_use]
    pub const fn mutates_live_state(self) -> bool {
        matches!(
            self,
            TxState::Stopping | TxState::Applying | TxState::Starting | TxState::Verifying
        )
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            TxState::Idle => "idle",
            TxState::Validating => "validating",
            TxState::Snapshotting => "snapshotting",
            TxState::Stopping => "stopping",
            TxState::Applying => "applying",
            TxState::Starting => "starting",
            TxState::Verifying => "verifying",
            TxState::Committed => "committed",
            TxState::RolledBack => "rolled_back",
            TxState::Failed => "failed",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepEntry {
    pub state: TxState,
    pub decision: String,
    pub detail: String,
    pub elapsed_ms: u64,
}

/// One swap request against one site. Owned by the orchestrator until terminal,
/// then archived for audit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SwapTransaction {
    pub id: Uuid,
    pub site_id: String,
    pub from_target: ServiceTarget,
    pub to_target: ServiceTarget,
    pub state: TxState,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub step_log: Vec<StepEntry>,
    pub errors: Vec<String>,
}

impl SwapTransaction {
    #[must_use]
    pub fn new(
        site_id: &str,
        from_target: ServiceTarget,
        to_target: ServiceTarget,
        started_at: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            site_id: site_id.to_string(),
            from_target,
            to_target,
            state: TxState::Idle,
            started_at,
            completed_at: None,
            step_log: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Move to `next`. Forward moves only, and nothing leaves a terminal state.
    pub fn advance(&mut self, next: TxState) {
        debug_assert!(!self.state.is_terminal(), "transaction already terminal");
        debug_assert!(next > self.state, "state machine moves forward only");
        self.state = next;
    }

    pub fn record(&mut self, decision: &str, detail: impl Into<String>, elapsed_ms: u64) {
        self.step_log.push(StepEntry {
            state: self.state,
            decision: decision.to_string(),
            detail: detail.into(),
            elapsed_ms,
        });
    }

    /// Enter a terminal state and stamp the completion time.
    pub fn finish(&mut self, terminal: TxState, completed_at: String) {
        debug_assert!(terminal.is_terminal());
        self.state = terminal;
        self.completed_at = Some(completed_at);
    }
}
