use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Integrity status of a tenant's chain as last observed by this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChainState {
    Unverified,
    Verifying,
    Valid,
    Invalid,
    Rebuilding,
    Rebuilt,
}

impl ChainState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainState::Unverified => "UNVERIFIED",
            ChainState::Verifying => "VERIFYING",
            ChainState::Valid => "VALID",
            ChainState::Invalid => "INVALID",
            ChainState::Rebuilding => "REBUILDING",
            ChainState::Rebuilt => "REBUILT",
        }
    }

    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// Any settled state may start a verification or a rebuild, and a rebuild
    /// may pre-empt a running verification. The in-progress states otherwise
    /// only resolve to their outcomes. A verification aborted by an error falls
    /// back to `Unverified`, a failed rebuild to `Invalid`.
    pub fn can_transition_to(&self, next: ChainState) -> bool {
        use ChainState::*;
        match (self, next) {
            (Verifying, Valid) | (Verifying, Invalid) | (Verifying, Unverified) => true,
            (Verifying, Rebuilding) => true,
            (Rebuilding, Rebuilt) | (Rebuilding, Invalid) => true,
            (Verifying, _) | (Rebuilding, _) => false,
            (_, Verifying) | (_, Rebuilding) => true,
            _ => false,
        }
    }
}

#[derive(Clone, Default)]
pub struct ChainStates {
    states: Arc<RwLock<HashMap<String, ChainState>>>,
}

impl ChainStates {
    pub async fn get(&self, tenant_id: &str) -> ChainState {
        self.states
            .read()
            .await
            .get(tenant_id)
            .copied()
            .unwrap_or(ChainState::Unverified)
    }

    /// Apply a transition, returning false (and leaving the state alone) when it
    /// is not legal from the current state.
    pub async fn transition(&self, tenant_id: &str, next: ChainState) -> bool {
        let mut states = self.states.write().await;
        let current = states
            .get(tenant_id)
            .copied()
            .unwrap_or(ChainState::Unverified);

        if !current.can_transition_to(next) {
            debug!(
                "Chain state of tenant {} stays {}: cannot move to {}",
                tenant_id,
                current.as_str(),
                next.as_str()
            );
            return false;
        }
        states.insert(tenant_id.to_string(), next);
        true
    }

    /// Resolve an in-progress state to its outcome, only if the tenant is
    /// still in `from`. An operation pre-empted by another one leaves the
    /// newer state in place.
    pub async fn settle(&self, tenant_id: &str, from: ChainState, outcome: ChainState) -> bool {
        let mut states = self.states.write().await;
        let current = states
            .get(tenant_id)
            .copied()
            .unwrap_or(ChainState::Unverified);

        if current != from || !from.can_transition_to(outcome) {
            debug!(
                "Chain state of tenant {} stays {}: {} outcome {} discarded",
                tenant_id,
                current.as_str(),
                from.as_str(),
                outcome.as_str()
            );
            return false;
        }
        states.insert(tenant_id.to_string(), outcome);
        true
    }
}
