//! In-memory ledger for dry runs and tests.
//!
//! Several `SimEndpoint`s can share one `SimLedger`, standing in for distinct
//! nodes of one network. Blocks are produced on demand: the first caller of
//! `await_next_round` past the current round seals the next block. Pending
//! operations are ordered by fee, highest first, with a seeded random
//! tie-break, so equal-fee races are reproducible for a given seed.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use endpoint_api::{EndpointClient, EndpointError, PendingStatus, StateValue, SubmitError, SuggestedParams};
use race_types::{sha512_256, AppId, BlockRecord, BlockTxn, Fee, Round, SignedOperation, TxId};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::fee::MIN_TXN_FEE;

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub genesis_id: String,
    pub start_round: Round,
    pub min_fee: Fee,
    /// Operations sealed per block; the rest wait for the next one.
    pub block_capacity: usize,
    /// Proposers credited in rotation, one per round.
    pub proposers: Vec<String>,
    /// Key every application call writes its tag into.
    pub state_key: Vec<u8>,
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            genesis_id: "simnet-v1".into(),
            start_round: 1_000,
            min_fee: MIN_TXN_FEE,
            block_capacity: 1_000,
            proposers: vec!["relay-0".into(), "relay-1".into(), "relay-2".into()],
            state_key: b"counter".to_vec(),
            seed: 7,
        }
    }
}

#[derive(Debug, Clone)]
enum TxRecord {
    Pending,
    Confirmed { round: Round, fee: Fee },
    Rejected(String),
}

#[derive(Debug)]
struct LedgerState {
    round: Round,
    pool: Vec<SignedOperation>,
    records: HashMap<TxId, TxRecord>,
    blocks: BTreeMap<Round, BlockRecord>,
    apps: HashMap<AppId, HashMap<Vec<u8>, StateValue>>,
    rng: StdRng,
}

#[derive(Debug)]
pub struct SimLedger {
    cfg: SimConfig,
    genesis_hash: [u8; 32],
    inner: Mutex<LedgerState>,
}

impl SimLedger {
    pub fn new(cfg: SimConfig) -> Self {
        let genesis_hash = sha512_256(cfg.genesis_id.as_bytes());
        let state = LedgerState {
            round: cfg.start_round,
            pool: Vec::new(),
            records: HashMap::new(),
            blocks: BTreeMap::new(),
            apps: HashMap::new(),
            rng: StdRng::seed_from_u64(cfg.seed),
        };
        Self { cfg, genesis_hash, inner: Mutex::new(state) }
    }

    fn lock(&self) -> Result<MutexGuard<'_, LedgerState>, EndpointError> {
        self.inner
            .lock()
            .map_err(|_| EndpointError::Transport("simulated ledger lock poisoned".into()))
    }

    fn proposer_for(&self, round: Round) -> Option<String> {
        if self.cfg.proposers.is_empty() {
            return None;
        }
        let idx = (round % self.cfg.proposers.len() as u64) as usize;
        Some(self.cfg.proposers[idx].clone())
    }

    /// Create (or overwrite) one application state key.
    pub fn set_state(&self, app: AppId, key: &[u8], value: StateValue) -> Result<(), EndpointError> {
        self.lock()?.apps.entry(app).or_default().insert(key.to_vec(), value);
        Ok(())
    }

    pub fn round(&self) -> Result<Round, EndpointError> {
        Ok(self.lock()?.round)
    }

    /// Forget pending-operation records, as a node does after a while. Block
    /// history is kept.
    pub fn prune_records(&self) -> Result<(), EndpointError> {
        self.lock()?.records.clear();
        Ok(())
    }

    fn accept(&self, op: &SignedOperation) -> Result<TxId, SubmitError> {
        let mut st = self.lock()?;
        let next = st.round + 1;
        if op.op.fee < self.cfg.min_fee {
            return Err(SubmitError::Rejected(format!(
                "transaction {}: fee {} below threshold {}",
                op.tx_id, op.op.fee, self.cfg.min_fee
            )));
        }
        if next > op.op.last_valid || next < op.op.first_valid {
            return Err(SubmitError::Rejected(format!(
                "transaction {}: txn dead: round {} outside of {}--{}",
                op.tx_id, next, op.op.first_valid, op.op.last_valid
            )));
        }
        if st.records.contains_key(&op.tx_id) {
            return Err(SubmitError::Rejected(format!(
                "transaction {}: transaction already in ledger",
                op.tx_id
            )));
        }
        st.records.insert(op.tx_id.clone(), TxRecord::Pending);
        st.pool.push(op.clone());
        debug!(target: "sim", tx_id = %op.tx_id, endpoint = %op.op.endpoint, fee = op.op.fee, "accepted into pool");
        Ok(op.tx_id.clone())
    }

    /// Seal the next block and return its round.
    pub fn produce_block(&self) -> Result<Round, EndpointError> {
        let mut guard = self.lock()?;
        let st = &mut *guard;
        st.round += 1;
        let round = st.round;

        let mut live = Vec::with_capacity(st.pool.len());
        for op in st.pool.drain(..) {
            if op.op.last_valid < round {
                let reason = format!(
                    "txn dead: round {round} outside of {}--{}",
                    op.op.first_valid, op.op.last_valid
                );
                st.records.insert(op.tx_id.clone(), TxRecord::Rejected(reason));
            } else {
                live.push(op);
            }
        }

        live.shuffle(&mut st.rng);
        live.sort_by(|a, b| b.op.fee.cmp(&a.op.fee));
        let cap = self.cfg.block_capacity.max(1).min(live.len());
        let rest = live.split_off(cap);
        st.pool = rest;

        let mut txns = Vec::with_capacity(live.len());
        for op in live {
            st.apps
                .entry(op.op.app_id)
                .or_default()
                .insert(self.cfg.state_key.clone(), StateValue::Bytes(op.op.tag.clone()));
            st.records
                .insert(op.tx_id.clone(), TxRecord::Confirmed { round, fee: op.op.fee });
            txns.push(BlockTxn {
                note: Some(op.op.note.as_bytes().to_vec()),
                fee: op.op.fee,
            });
        }

        let proposer = self.proposer_for(round);
        if !txns.is_empty() {
            info!(target: "sim", round, txns = txns.len(), proposer = ?proposer, "sealed block");
        }
        st.blocks.insert(round, BlockRecord { round, proposer, txns });
        Ok(round)
    }

    /// Returns the current round once it exceeds `round`, sealing one block if needed.
    fn advance_past(&self, round: Round) -> Result<Round, EndpointError> {
        let current = self.round()?;
        if current > round {
            return Ok(current);
        }
        self.produce_block()
    }
}

/// One simulated node attached to a shared ledger.
#[derive(Debug)]
pub struct SimEndpoint {
    label: String,
    ledger: Arc<SimLedger>,
    failures: AtomicU32,
}

impl SimEndpoint {
    pub fn new(label: impl Into<String>, ledger: Arc<SimLedger>) -> Self {
        Self { label: label.into(), ledger, failures: AtomicU32::new(0) }
    }

    /// Make the next `n` RPCs fail with a transport error.
    pub fn fail_next(&self, n: u32) {
        self.failures.store(n, Ordering::SeqCst);
    }

    fn check_link(&self) -> Result<(), EndpointError> {
        let took = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if took {
            return Err(EndpointError::Transport(format!("{}: injected failure", self.label)));
        }
        Ok(())
    }
}

#[async_trait]
impl EndpointClient for SimEndpoint {
    fn label(&self) -> &str { &self.label }

    async fn submit(&self, op: &SignedOperation) -> Result<TxId, SubmitError> {
        self.check_link()?;
        self.ledger.accept(op)
    }

    async fn pending_info(&self, id: &TxId) -> Result<PendingStatus, EndpointError> {
        self.check_link()?;
        let st = self.ledger.lock()?;
        match st.records.get(id) {
            None => Err(EndpointError::NotFound(format!("txn {id} not found"))),
            Some(TxRecord::Pending) => Ok(PendingStatus::Pending),
            Some(TxRecord::Confirmed { round, fee }) => {
                Ok(PendingStatus::Confirmed { round: *round, fee: *fee })
            }
            Some(TxRecord::Rejected(reason)) => Ok(PendingStatus::Rejected(reason.clone())),
        }
    }

    async fn current_round(&self) -> Result<Round, EndpointError> {
        self.check_link()?;
        self.ledger.round()
    }

    async fn await_next_round(&self, round: Round) -> Result<Round, EndpointError> {
        self.check_link()?;
        // Let a racing submitter reach the pool before the block is sealed.
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        self.ledger.advance_past(round)
    }

    async fn block_contents(&self, round: Round) -> Result<BlockRecord, EndpointError> {
        self.check_link()?;
        let st = self.ledger.lock()?;
        if round == 0 || round > st.round {
            return Err(EndpointError::NotFound(format!("block {round} not available")));
        }
        Ok(st.blocks.get(&round).cloned().unwrap_or_else(|| BlockRecord {
            round,
            proposer: self.ledger.proposer_for(round),
            txns: Vec::new(),
        }))
    }

    async fn read_state(&self, app: AppId, key: &[u8]) -> Result<Option<StateValue>, EndpointError> {
        self.check_link()?;
        let st = self.ledger.lock()?;
        let kv = st
            .apps
            .get(&app)
            .ok_or_else(|| EndpointError::NotFound(format!("application {app} does not exist")))?;
        Ok(kv.get(key).cloned())
    }

    async fn suggested_params(&self) -> Result<SuggestedParams, EndpointError> {
        self.check_link()?;
        Ok(SuggestedParams {
            fee_per_byte: 0,
            min_fee: self.ledger.cfg.min_fee,
            last_round: self.ledger.round()?,
            genesis_id: self.ledger.cfg.genesis_id.clone(),
            genesis_hash: self.ledger.genesis_hash,
        })
    }
}
