//! N-of-N approval barrier for deferred tool requests.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::custom::DeferredToolRequest;
use crate::error::ApprovalError;

/// Collects one decision per deferred tool call and releases exactly once.
///
/// The barrier releases synchronously inside the [`record`](Self::record)
/// call that supplies the last missing decision: that call, and only that
/// call, returns the decision snapshot. Decisions recorded after that are
/// rejected with [`ApprovalError::AlreadyReleased`].
///
/// ```
/// use agentwire_core::approval::ApprovalBarrier;
/// use agentwire_core::custom::DeferredToolRequest;
///
/// let requests = ["c1", "c2"].map(|id| DeferredToolRequest {
///     call_id: id.to_string(),
///     tool_name: "calc".to_string(),
///     args: Default::default(),
/// });
/// let mut barrier = ApprovalBarrier::new(requests.to_vec()).unwrap();
///
/// assert_eq!(barrier.record("c2", true), Ok(None));
/// let snapshot = barrier.record("c1", false).unwrap().unwrap();
/// assert_eq!(snapshot["c1"], false);
/// assert!(barrier.is_released());
/// ```
pub struct ApprovalBarrier {
    requests: Vec<DeferredToolRequest>,
    expected: BTreeSet<String>,
    decisions: BTreeMap<String, bool>,
    released: bool,
}

impl ApprovalBarrier {
    /// Create a barrier for the given requests.
    ///
    /// Returns `None` when there is nothing to decide. Repeated call IDs
    /// count once.
    pub fn new(requests: Vec<DeferredToolRequest>) -> Option<Self> {
        let mut expected = BTreeSet::new();
        let requests: Vec<DeferredToolRequest> = requests
            .into_iter()
            .filter(|request| expected.insert(request.call_id.clone()))
            .collect();

        if requests.is_empty() {
            return None;
        }

        Some(Self {
            requests,
            expected,
            decisions: BTreeMap::new(),
            released: false,
        })
    }

    /// Record the decision for one call.
    ///
    /// Returns the snapshot when this decision completes the set. Rejected
    /// decisions are logged and leave the barrier unchanged.
    pub fn record(
        &mut self,
        call_id: &str,
        approved: bool,
    ) -> Result<Option<BTreeMap<String, bool>>, ApprovalError> {
        let rejected = if self.released {
            Some(ApprovalError::AlreadyReleased(call_id.to_string()))
        } else if !self.expected.contains(call_id) {
            Some(ApprovalError::UnknownCall(call_id.to_string()))
        } else if self.decisions.contains_key(call_id) {
            Some(ApprovalError::AlreadyRecorded(call_id.to_string()))
        } else {
            None
        };
        if let Some(err) = rejected {
            log::warn!("Ignoring approval decision: {}", err);
            return Err(err);
        }

        self.decisions.insert(call_id.to_string(), approved);
        log::debug!(
            "Approval for {} recorded ({}/{})",
            call_id,
            self.decisions.len(),
            self.total_expected()
        );

        if self.decisions.len() < self.total_expected() {
            return Ok(None);
        }

        self.released = true;
        Ok(Some(self.decisions.clone()))
    }

    pub fn total_expected(&self) -> usize {
        self.expected.len()
    }

    /// Decisions recorded so far.
    pub fn decisions(&self) -> &BTreeMap<String, bool> {
        &self.decisions
    }

    /// All requests in arrival order.
    pub fn requests(&self) -> &[DeferredToolRequest] {
        &self.requests
    }

    /// Requests that still need a decision, in arrival order.
    pub fn pending(&self) -> Vec<DeferredToolRequest> {
        self.requests
            .iter()
            .filter(|request| !self.decisions.contains_key(&request.call_id))
            .cloned()
            .collect()
    }

    pub fn remaining(&self) -> usize {
        self.total_expected() - self.decisions.len()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl fmt::Debug for ApprovalBarrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApprovalBarrier")
            .field("expected", &self.expected)
            .field("decisions", &self.decisions)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}
