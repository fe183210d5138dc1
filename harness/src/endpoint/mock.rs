use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use endpoint_api::{EndpointClient, EndpointError, PendingStatus, StateValue, SubmitError, SuggestedParams};
use race_types::{AppId, BlockRecord, Round, SignedOperation, TxId};

/// Scripted endpoint. Each queue is drained front to back; an empty queue
/// falls back to a benign default (pending, advance `step` rounds, accept).
pub struct MockEndpoint {
    label: String,
    round: AtomicU64,
    step: AtomicU64,
    round_queue: Mutex<VecDeque<Result<Round, EndpointError>>>,
    submit_queue: Mutex<VecDeque<Result<TxId, SubmitError>>>,
    pending_queue: Mutex<VecDeque<Result<PendingStatus, EndpointError>>>,
    wait_queue: Mutex<VecDeque<Result<(), EndpointError>>>,
    state_queue: Mutex<VecDeque<Result<Option<StateValue>, EndpointError>>>,
    block_queue: Mutex<VecDeque<Result<BlockRecord, EndpointError>>>,
    pub pending_calls: AtomicU64,
    pub wait_calls: AtomicU64,
}

impl MockEndpoint {
    pub fn new(label: &str, round: Round) -> Self {
        Self {
            label: label.to_string(),
            round: AtomicU64::new(round),
            step: AtomicU64::new(1),
            round_queue: Mutex::new(VecDeque::new()),
            submit_queue: Mutex::new(VecDeque::new()),
            pending_queue: Mutex::new(VecDeque::new()),
            wait_queue: Mutex::new(VecDeque::new()),
            state_queue: Mutex::new(VecDeque::new()),
            block_queue: Mutex::new(VecDeque::new()),
            pending_calls: AtomicU64::new(0),
            wait_calls: AtomicU64::new(0),
        }
    }

    /// Rounds a single successful wait advances by.
    pub fn set_round_step(&self, step: u64) {
        self.step.store(step, Ordering::SeqCst);
    }

    pub fn push_round(&self, result: Result<Round, EndpointError>) {
        self.round_queue.lock().unwrap().push_back(result);
    }

    pub fn push_submit(&self, result: Result<TxId, SubmitError>) {
        self.submit_queue.lock().unwrap().push_back(result);
    }

    pub fn push_pending(&self, result: Result<PendingStatus, EndpointError>) {
        self.pending_queue.lock().unwrap().push_back(result);
    }

    pub fn push_wait(&self, result: Result<(), EndpointError>) {
        self.wait_queue.lock().unwrap().push_back(result);
    }

    pub fn push_state(&self, result: Result<Option<StateValue>, EndpointError>) {
        self.state_queue.lock().unwrap().push_back(result);
    }

    pub fn push_block(&self, result: Result<BlockRecord, EndpointError>) {
        self.block_queue.lock().unwrap().push_back(result);
    }
}

#[async_trait]
impl EndpointClient for MockEndpoint {
    fn label(&self) -> &str { &self.label }

    async fn submit(&self, op: &SignedOperation) -> Result<TxId, SubmitError> {
        self.submit_queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(op.tx_id.clone()))
    }

    async fn pending_info(&self, _id: &TxId) -> Result<PendingStatus, EndpointError> {
        self.pending_calls.fetch_add(1, Ordering::SeqCst);
        self.pending_queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(PendingStatus::Pending))
    }

    async fn current_round(&self) -> Result<Round, EndpointError> {
        self.round_queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(self.round.load(Ordering::SeqCst)))
    }

    async fn await_next_round(&self, round: Round) -> Result<Round, EndpointError> {
        self.wait_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.wait_queue.lock().unwrap().pop_front().unwrap_or(Ok(()));
        scripted?;
        let next = self.round.load(Ordering::SeqCst).max(round) + self.step.load(Ordering::SeqCst);
        self.round.store(next, Ordering::SeqCst);
        Ok(next)
    }

    async fn block_contents(&self, round: Round) -> Result<BlockRecord, EndpointError> {
        self.block_queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(BlockRecord { round, proposer: None, txns: Vec::new() }))
    }

    async fn read_state(&self, _app: AppId, _key: &[u8]) -> Result<Option<StateValue>, EndpointError> {
        self.state_queue.lock().unwrap().pop_front().unwrap_or(Ok(None))
    }

    async fn suggested_params(&self) -> Result<SuggestedParams, EndpointError> {
        Ok(SuggestedParams {
            fee_per_byte: 0,
            min_fee: 1_000,
            last_round: self.round.load(Ordering::SeqCst),
            genesis_id: "mocknet-v1".into(),
            genesis_hash: [0u8; 32],
        })
    }
}
