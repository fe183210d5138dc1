pub mod algod;
#[cfg(test)]
pub mod mock;
pub mod sim;

pub use algod::AlgodClient;
pub use sim::{SimConfig, SimEndpoint, SimLedger};

use anyhow::{Context, Result};
use endpoint_api::EndpointClient;
use race_types::Round;

/// Startup reachability check. Failing here is the only fatal endpoint error
/// of a run.
pub async fn probe(client: &dyn EndpointClient) -> Result<Round> {
    let round = client
        .current_round()
        .await
        .with_context(|| format!("endpoint {} is unreachable", client.label()))?;
    tracing::info!(target: "race", endpoint = client.label(), round, "endpoint reachable");
    Ok(round)
}
