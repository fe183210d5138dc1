//! Round-paced confirmation polling.
//!
//! Each iteration checks the pending record once, then waits for the next
//! round. The budget is a window of ledger rounds: polling stops once the node
//! reports `start_round + max_rounds`, however many rounds a single wait
//! skipped. Rejection is final. Transient RPC failures never end the poll
//! early; a failed wait sleeps a short backoff and still counts as one wait,
//! and `max_rounds` waits bound the loop when no round can be observed.

use endpoint_api::{EndpointClient, PendingStatus};
use race_types::{ConfirmationOutcome, Round, TxId};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::PollConfig;

pub async fn confirm<C>(client: &C, id: &TxId, poll: &PollConfig) -> ConfirmationOutcome
where
    C: EndpointClient + ?Sized,
{
    let mut last_round: Option<Round> = match client.current_round().await {
        Ok(r) => Some(r),
        Err(e) => {
            warn!(target: "poller", endpoint = client.label(), tx_id = %id, "start round unavailable: {e}");
            None
        }
    };
    let start_round = last_round;
    let mut deadline: Option<Round> = start_round.map(|r| r.saturating_add(poll.max_rounds));
    let mut spent = 0u64;

    loop {
        match client.pending_info(id).await {
            Ok(PendingStatus::Confirmed { round, fee }) => {
                debug!(
                    target: "poller",
                    endpoint = client.label(),
                    tx_id = %id,
                    round,
                    fee,
                    rounds_waited = spent,
                    "confirmed"
                );
                return ConfirmationOutcome::Confirmed { round, fee };
            }
            Ok(PendingStatus::Rejected(reason)) => {
                warn!(target: "poller", endpoint = client.label(), tx_id = %id, %reason, "dropped from pool");
                return ConfirmationOutcome::Rejected { reason };
            }
            Ok(PendingStatus::Pending) => {}
            Err(e) => {
                // Pruned records (404) land here too; keep polling.
                debug!(
                    target: "poller",
                    endpoint = client.label(),
                    tx_id = %id,
                    round = ?last_round,
                    "pending lookup failed, treating as unresolved: {e}"
                );
            }
        }

        let window_closed = matches!((last_round, deadline), (Some(r), Some(d)) if r >= d);
        if window_closed || spent >= poll.max_rounds {
            let last = last_round.unwrap_or(0);
            warn!(
                target: "poller",
                endpoint = client.label(),
                tx_id = %id,
                start_round = ?start_round,
                last_round = last,
                waits = spent,
                max_rounds = poll.max_rounds,
                "not confirmed within round budget"
            );
            return ConfirmationOutcome::TimedOut { last_round: last };
        }
        spent += 1;

        let advanced = match last_round {
            Some(r) => client.await_next_round(r).await,
            None => match client.current_round().await {
                Ok(r) => {
                    // first observed round opens the window with whatever budget is left
                    let left = poll.max_rounds - (spent - 1);
                    deadline.get_or_insert(r.saturating_add(left));
                    client.await_next_round(r).await
                }
                Err(e) => Err(e),
            },
        };
        match advanced {
            Ok(r) => last_round = Some(r),
            Err(e) => {
                warn!(
                    target: "poller",
                    endpoint = client.label(),
                    tx_id = %id,
                    spent,
                    backoff_ms = poll.transient_backoff_ms,
                    "round wait failed: {e}"
                );
                sleep(poll.transient_backoff()).await;
            }
        }
    }
}
