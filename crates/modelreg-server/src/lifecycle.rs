//! Loading status state machine.
//!
//! Every status change of a stored record goes through [`ModelRecord::apply`];
//! an edge that is not listed here is rejected with `FailedPrecondition`.

use modelreg_common::{LoadingStatus, RegistryError};

use crate::record::ModelRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// A worker takes the model.
    Claim,
    /// The worker reports a successful load.
    Succeed,
    /// The worker reports a failed load.
    Fail,
    /// An operator requeues a failed model.
    Retry,
    /// The claim's lease ran out before any report arrived.
    ExpireLease,
}

impl Transition {
    pub fn source(self) -> LoadingStatus {
        match self {
            Transition::Claim => LoadingStatus::Requested,
            Transition::Succeed | Transition::Fail | Transition::ExpireLease => {
                LoadingStatus::Loading
            }
            Transition::Retry => LoadingStatus::Failed,
        }
    }

    pub fn target(self) -> LoadingStatus {
        match self {
            Transition::Claim => LoadingStatus::Loading,
            Transition::Succeed => LoadingStatus::Succeeded,
            Transition::Fail => LoadingStatus::Failed,
            Transition::Retry | Transition::ExpireLease => LoadingStatus::Requested,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Transition::Claim => "claim",
            Transition::Succeed => "succeed",
            Transition::Fail => "fail",
            Transition::Retry => "retry",
            Transition::ExpireLease => "expire lease of",
        }
    }
}

impl ModelRecord {
    /// Moves the record along `transition`. Leaving `loading` drops the claim;
    /// entering `requested` or `loading` clears stale failure details.
    pub fn apply(&mut self, transition: Transition) -> Result<(), RegistryError> {
        if self.loading_status != transition.source() {
            return Err(RegistryError::failed_precondition(format!(
                "cannot {} model {:?} in status {}",
                transition.name(),
                self.id,
                self.loading_status
            )));
        }

        self.loading_status = transition.target();
        match transition {
            Transition::Claim | Transition::Retry => {
                self.loading_failure_reason = None;
                self.status_message = None;
            }
            Transition::Succeed | Transition::Fail | Transition::ExpireLease => {
                self.claim = None;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelreg_common::SourceRepository;

    const ALL_STATUSES: [LoadingStatus; 5] = [
        LoadingStatus::Unspecified,
        LoadingStatus::Requested,
        LoadingStatus::Loading,
        LoadingStatus::Succeeded,
        LoadingStatus::Failed,
    ];

    const ALL_TRANSITIONS: [Transition; 5] = [
        Transition::Claim,
        Transition::Succeed,
        Transition::Fail,
        Transition::Retry,
        Transition::ExpireLease,
    ];

    fn record(status: LoadingStatus) -> ModelRecord {
        ModelRecord::new("t0", "m0", 1, 0, SourceRepository::ObjectStore, status)
    }

    #[test]
    fn test_only_listed_edges_are_legal() {
        for status in ALL_STATUSES {
            for transition in ALL_TRANSITIONS {
                let mut rec = record(status);
                let result = rec.apply(transition);
                if status == transition.source() {
                    assert!(result.is_ok(), "{status} --{transition:?}-> should be legal");
                    assert_eq!(rec.loading_status, transition.target());
                } else {
                    assert!(
                        matches!(result, Err(RegistryError::FailedPrecondition(_))),
                        "{status} --{transition:?}-> should be rejected"
                    );
                    assert_eq!(rec.loading_status, status);
                }
            }
        }
    }

    #[test]
    fn test_retry_clears_failure_reason() {
        let mut rec = record(LoadingStatus::Failed);
        rec.loading_failure_reason = Some("checksum mismatch".to_string());
        rec.apply(Transition::Retry).unwrap();
        assert_eq!(rec.loading_status, LoadingStatus::Requested);
        assert!(rec.loading_failure_reason.is_none());
    }

    #[test]
    fn test_leaving_loading_drops_claim() {
        let mut rec = record(LoadingStatus::Loading);
        rec.claim = Some(crate::record::Claim {
            claim_id: "c0".to_string(),
            worker_id: None,
            claimed_at_ms: 0,
            lease_expires_at_ms: 10,
        });
        rec.apply(Transition::ExpireLease).unwrap();
        assert!(rec.claim.is_none());
    }
}
