//! Concurrent dual-endpoint dispatch.

use std::sync::Arc;

use endpoint_api::EndpointClient;
use race_types::{ConfirmationOutcome, Operation, SideOutcome, SignedOperation};
use tracing::{debug, info, warn};

use crate::config::PollConfig;
use crate::poller::confirm;
use crate::txn::{AppCallSigner, OpSpec};

/// Builds both operations of a race and runs them to resolution on their own
/// endpoints. Holds no per-trial state, so one instance serves a whole run.
#[derive(Debug, Clone)]
pub struct DualSubmitter {
    signer: AppCallSigner,
    poll: PollConfig,
    record_proposer: bool,
}

enum Prepared {
    Ready(SignedOperation),
    Failed(SideOutcome),
}

impl DualSubmitter {
    pub fn new(signer: AppCallSigner, poll: PollConfig) -> Self {
        Self { signer, poll, record_proposer: false }
    }

    /// Also look up the proposer of each confirming block.
    pub fn with_proposer_lookup(mut self, enabled: bool) -> Self {
        self.record_proposer = enabled;
        self
    }

    async fn prepare(&self, spec: &OpSpec, client: &dyn EndpointClient) -> Prepared {
        let params = match client.suggested_params().await {
            Ok(p) => p,
            Err(e) => {
                warn!(target: "race", endpoint = client.label(), kind = %spec.kind, "suggested params unavailable: {e}");
                return Prepared::Failed(SideOutcome::submit_failed(
                    placeholder(spec, client.label()),
                    format!("suggested params: {e}"),
                ));
            }
        };
        match self.signer.build(spec, &params, client.label()) {
            Ok(signed) => Prepared::Ready(signed),
            Err(e) => Prepared::Failed(SideOutcome::submit_failed(
                placeholder(spec, client.label()),
                format!("build: {e}"),
            )),
        }
    }

    /// Sign both sides, then submit and confirm each on its own task. Returns
    /// once both tasks are done; a failure on one side never affects the other.
    pub async fn race(
        &self,
        spec_a: &OpSpec,
        spec_b: &OpSpec,
        client_a: Arc<dyn EndpointClient>,
        client_b: Arc<dyn EndpointClient>,
    ) -> (SideOutcome, SideOutcome) {
        let (prep_a, prep_b) = tokio::join!(
            self.prepare(spec_a, client_a.as_ref()),
            self.prepare(spec_b, client_b.as_ref())
        );
        let (side_a, side_b) = tokio::join!(
            self.dispatch(prep_a, client_a),
            self.dispatch(prep_b, client_b)
        );
        (side_a, side_b)
    }

    async fn dispatch(&self, prepared: Prepared, client: Arc<dyn EndpointClient>) -> SideOutcome {
        let signed = match prepared {
            Prepared::Ready(s) => s,
            Prepared::Failed(outcome) => return outcome,
        };
        let op = signed.op.clone();
        let task = tokio::spawn(run_side(client, signed, self.poll.clone(), self.record_proposer));
        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(target: "race", kind = %op.kind, "side task failed: {e}");
                SideOutcome::submit_failed(op, format!("task failed: {e}"))
            }
        }
    }
}

fn placeholder(spec: &OpSpec, endpoint: &str) -> Operation {
    Operation {
        kind: spec.kind,
        method: spec.method.clone(),
        tag: spec.tag.clone(),
        note: spec.note.clone(),
        fee: 0,
        app_id: spec.app_id,
        endpoint: endpoint.to_string(),
        first_valid: 0,
        last_valid: 0,
    }
}

async fn run_side(
    client: Arc<dyn EndpointClient>,
    signed: SignedOperation,
    poll: PollConfig,
    record_proposer: bool,
) -> SideOutcome {
    let tx_id = match client.submit(&signed).await {
        Ok(id) => id,
        Err(e) => {
            warn!(
                target: "race",
                endpoint = client.label(),
                kind = %signed.op.kind,
                note = %signed.op.note,
                "submission failed: {e}"
            );
            return SideOutcome::submit_failed(signed.op, e.to_string());
        }
    };
    debug!(target: "race", endpoint = client.label(), kind = %signed.op.kind, %tx_id, fee = signed.op.fee, "submitted");

    let confirmation = confirm(client.as_ref(), &tx_id, &poll).await;
    let proposer = match (&confirmation, record_proposer) {
        (ConfirmationOutcome::Confirmed { round, .. }, true) => match client.block_contents(*round).await {
            Ok(block) => block.proposer,
            Err(e) => {
                warn!(target: "race", endpoint = client.label(), round = *round, "proposer lookup failed: {e}");
                None
            }
        },
        _ => None,
    };
    info!(
        target: "race",
        endpoint = client.label(),
        kind = %signed.op.kind,
        %tx_id,
        outcome = ?confirmation,
        proposer = ?proposer,
        "side resolved"
    );
    SideOutcome { op: signed.op, submission: Ok(tx_id), confirmation: Some(confirmation), proposer }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::mock::MockEndpoint;
    use crate::fee::FeePolicy;
    use endpoint_api::{EndpointError, PendingStatus, SubmitError};
    use race_types::{BlockRecord, Note, OpKind};

    fn spec(kind: OpKind, tag: &str) -> OpSpec {
        OpSpec {
            kind,
            method: format!("{tag}()string"),
            tag: tag.as_bytes().to_vec(),
            note: Note::new(format!("{tag}_1_0")),
            fee: FeePolicy::Suggested,
            app_id: 1002,
        }
    }

    fn submitter() -> DualSubmitter {
        DualSubmitter::new(
            AppCallSigner::from_seed([5u8; 32]),
            PollConfig { max_rounds: 3, transient_backoff_ms: 1 },
        )
    }

    #[tokio::test(flavor = "current_thread")]
    async fn one_side_failing_does_not_affect_the_other() {
        let a = Arc::new(MockEndpoint::new("a", 10));
        let b = Arc::new(MockEndpoint::new("b", 10));
        a.push_pending(Ok(PendingStatus::Confirmed { round: 11, fee: 1_000 }));
        b.push_submit(Err(SubmitError::Rejected("overspend".into())));

        let (sa, sb) = submitter()
            .race(&spec(OpKind::A, "increment"), &spec(OpKind::B, "decrement"), a.clone(), b.clone())
            .await;

        assert_eq!(sa.confirmation, Some(ConfirmationOutcome::Confirmed { round: 11, fee: 1_000 }));
        assert_eq!(sa.op.endpoint, "a");
        assert!(sa.was_accepted());
        assert!(!sb.was_accepted());
        assert_eq!(sb.confirmation, None);
        assert!(sb.submission.unwrap_err().reason.contains("overspend"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn both_sides_resolve_independently() {
        let a = Arc::new(MockEndpoint::new("a", 10));
        let b = Arc::new(MockEndpoint::new("b", 10));
        a.push_pending(Err(EndpointError::Transport("flaky".into())));
        a.push_pending(Ok(PendingStatus::Confirmed { round: 12, fee: 1_000 }));

        let (sa, sb) = submitter()
            .race(&spec(OpKind::A, "increment"), &spec(OpKind::B, "decrement"), a, b.clone())
            .await;
        assert!(sa.is_confirmed());
        assert_eq!(sb.confirmation, Some(ConfirmationOutcome::TimedOut { last_round: 13 }));
        assert_eq!(b.wait_calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn proposer_recorded_when_enabled() {
        let a = Arc::new(MockEndpoint::new("a", 10));
        let b = Arc::new(MockEndpoint::new("b", 10));
        a.push_pending(Ok(PendingStatus::Confirmed { round: 11, fee: 1_000 }));
        b.push_pending(Ok(PendingStatus::Confirmed { round: 11, fee: 1_000 }));
        a.push_block(Ok(BlockRecord { round: 11, proposer: Some("relay-1".into()), txns: vec![] }));
        b.push_block(Err(EndpointError::Status { code: 500, message: "boom".into() }));

        let (sa, sb) = submitter()
            .with_proposer_lookup(true)
            .race(&spec(OpKind::A, "increment"), &spec(OpKind::B, "decrement"), a, b)
            .await;
        assert_eq!(sa.proposer.as_deref(), Some("relay-1"));
        assert_eq!(sb.proposer, None);
        assert!(sb.is_confirmed());
    }
}
