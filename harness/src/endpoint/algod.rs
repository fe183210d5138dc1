//! HTTP `EndpointClient` against the algod v2 REST API.

use std::error::Error as StdError;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use endpoint_api::{EndpointClient, EndpointError, PendingStatus, StateValue, SubmitError, SuggestedParams};
use race_types::{encode_address, AppId, BlockRecord, BlockTxn, Round, SignedOperation, TxId};
use reqwest::{
    header::{HeaderName, HeaderValue},
    Client as HttpClient, StatusCode,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::config::{AuthStyle, EndpointConfig};

const ALGOD_TOKEN_HEADER: &str = "x-algo-api-token";

pub struct AlgodClient {
    label: String,
    base: Url,
    http: HttpClient,
    auth: Option<(HeaderName, HeaderValue)>,
}

impl AlgodClient {
    pub fn new(cfg: &EndpointConfig) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(cfg.http_timeout().max(std::time::Duration::from_millis(100)))
            .connect_timeout(cfg.connect_timeout().max(std::time::Duration::from_millis(100)))
            .build()
            .context("building algod HTTP client")?;
        Self::with_http_client(cfg, http)
    }

    pub fn with_http_client(cfg: &EndpointConfig, http: HttpClient) -> Result<Self> {
        let mut raw = cfg.url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let base = Url::parse(&raw).with_context(|| format!("parsing endpoint url {}", cfg.url))?;
        let auth = match cfg.token.as_deref() {
            None => None,
            Some(token) => {
                let pair = match cfg.auth {
                    AuthStyle::AlgodToken => (
                        HeaderName::from_static(ALGOD_TOKEN_HEADER),
                        HeaderValue::from_str(token),
                    ),
                    AuthStyle::Bearer => (
                        reqwest::header::AUTHORIZATION,
                        HeaderValue::from_str(&format!("Bearer {token}")),
                    ),
                };
                Some((pair.0, pair.1.context("endpoint token header")?))
            }
        };
        Ok(Self { label: cfg.label.clone(), base, http, auth })
    }

    fn url(&self, path: &str) -> Result<Url, EndpointError> {
        self.base
            .join(path)
            .map_err(|e| EndpointError::Transport(format!("building url for {path}: {e}")))
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder.header(reqwest::header::ACCEPT, "application/json");
        match &self.auth {
            Some((name, value)) => builder.header(name.clone(), value.clone()),
            None => builder,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, EndpointError> {
        let url = self.url(path)?;
        debug!(target: "algod", endpoint = %self.label, %url, "GET");
        let resp = self
            .request(self.http.get(url))
            .send()
            .await
            .map_err(transport_error)?;
        let status = resp.status();
        let bytes = resp.bytes().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(status_error(status, &bytes));
        }
        serde_json::from_slice(&bytes).map_err(|e| EndpointError::Decode(format!("{path}: {e}")))
    }
}

fn transport_error(err: reqwest::Error) -> EndpointError {
    let mut chain = vec![err.to_string()];
    let mut current = err.source();
    while let Some(source) = current {
        chain.push(source.to_string());
        current = source.source();
    }
    EndpointError::Transport(chain.join(": "))
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

fn error_message(bytes: &[u8]) -> String {
    match serde_json::from_slice::<ErrorBody>(bytes) {
        Ok(body) => body.message,
        Err(_) => String::from_utf8_lossy(bytes).chars().take(256).collect(),
    }
}

fn status_error(status: StatusCode, bytes: &[u8]) -> EndpointError {
    let message = error_message(bytes);
    if status == StatusCode::NOT_FOUND {
        EndpointError::NotFound(message)
    } else {
        EndpointError::Status { code: status.as_u16(), message }
    }
}

// -------------------- Wire types --------------------

#[derive(Deserialize)]
struct SubmitResponse {
    #[serde(rename = "txId")]
    tx_id: String,
}

#[derive(Deserialize)]
struct StatusResponse {
    #[serde(rename = "last-round")]
    last_round: Round,
}

#[derive(Deserialize, Default)]
struct InnerTxn {
    #[serde(default)]
    fee: u64,
    #[serde(default, with = "race_types::serde::serde_b64_opt")]
    note: Option<Vec<u8>>,
}

#[derive(Deserialize, Default)]
struct SignedTxnJson {
    #[serde(default)]
    txn: InnerTxn,
}

#[derive(Deserialize)]
struct PendingResponse {
    #[serde(rename = "confirmed-round", default)]
    confirmed_round: Option<Round>,
    #[serde(rename = "pool-error", default)]
    pool_error: String,
    #[serde(default)]
    txn: SignedTxnJson,
}

#[derive(Deserialize)]
struct BlockResponse {
    block: BlockJson,
    #[serde(default)]
    cert: Option<CertJson>,
}

#[derive(Deserialize)]
struct BlockJson {
    #[serde(default)]
    rnd: Option<Round>,
    #[serde(default)]
    prp: Option<String>,
    #[serde(default)]
    txns: Vec<SignedTxnJson>,
}

#[derive(Deserialize)]
struct CertJson {
    #[serde(default)]
    prop: Option<ProposalJson>,
}

#[derive(Deserialize)]
struct ProposalJson {
    #[serde(default)]
    oprop: Option<String>,
}

#[derive(Deserialize)]
struct ApplicationResponse {
    params: ApplicationParams,
}

#[derive(Deserialize)]
struct ApplicationParams {
    #[serde(rename = "global-state", default)]
    global_state: Vec<KeyValueJson>,
}

#[derive(Deserialize)]
struct KeyValueJson {
    #[serde(with = "race_types::serde::serde_b64")]
    key: Vec<u8>,
    value: TealValueJson,
}

#[derive(Deserialize)]
struct TealValueJson {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    bytes: String,
    #[serde(default)]
    uint: u64,
}

#[derive(Deserialize)]
struct ParamsResponse {
    fee: u64,
    #[serde(rename = "min-fee")]
    min_fee: u64,
    #[serde(rename = "last-round")]
    last_round: Round,
    #[serde(rename = "genesis-id")]
    genesis_id: String,
    #[serde(rename = "genesis-hash", with = "race_types::serde::serde_b64")]
    genesis_hash: Vec<u8>,
}

/// Addresses arrive either as 58-char base32 or as base64 of the raw key.
fn decode_address(raw: &str) -> Option<String> {
    if raw.len() == 58 {
        return Some(raw.to_string());
    }
    let bytes = BASE64_STANDARD.decode(raw.as_bytes()).ok()?;
    let key: [u8; 32] = bytes.try_into().ok()?;
    Some(encode_address(&key))
}

#[async_trait]
impl EndpointClient for AlgodClient {
    fn label(&self) -> &str { &self.label }

    async fn submit(&self, op: &SignedOperation) -> Result<TxId, SubmitError> {
        let url = self.url("v2/transactions")?;
        let resp = self
            .request(self.http.post(url))
            .header(reqwest::header::CONTENT_TYPE, "application/x-binary")
            .body(op.bytes.clone())
            .send()
            .await
            .map_err(transport_error)?;
        let status = resp.status();
        let bytes = resp.bytes().await.map_err(transport_error)?;
        if status == StatusCode::BAD_REQUEST {
            return Err(SubmitError::Rejected(error_message(&bytes)));
        }
        if !status.is_success() {
            return Err(status_error(status, &bytes).into());
        }
        let body: SubmitResponse = serde_json::from_slice(&bytes)
            .map_err(|e| EndpointError::Decode(format!("submit response: {e}")))?;
        if body.tx_id != op.tx_id.as_str() {
            debug!(
                target: "algod",
                endpoint = %self.label,
                local = %op.tx_id,
                remote = %body.tx_id,
                "node assigned a different identifier"
            );
        }
        Ok(TxId::new(body.tx_id))
    }

    async fn pending_info(&self, id: &TxId) -> Result<PendingStatus, EndpointError> {
        let info: PendingResponse = self
            .get_json(&format!("v2/transactions/pending/{id}?format=json"))
            .await?;
        match info.confirmed_round {
            Some(round) if round > 0 => Ok(PendingStatus::Confirmed { round, fee: info.txn.txn.fee }),
            _ if !info.pool_error.is_empty() => Ok(PendingStatus::Rejected(info.pool_error)),
            _ => Ok(PendingStatus::Pending),
        }
    }

    async fn current_round(&self) -> Result<Round, EndpointError> {
        let status: StatusResponse = self.get_json("v2/status").await?;
        Ok(status.last_round)
    }

    async fn await_next_round(&self, round: Round) -> Result<Round, EndpointError> {
        let status: StatusResponse = self
            .get_json(&format!("v2/status/wait-for-block-after/{round}"))
            .await?;
        Ok(status.last_round)
    }

    async fn block_contents(&self, round: Round) -> Result<BlockRecord, EndpointError> {
        let resp: BlockResponse = self.get_json(&format!("v2/blocks/{round}?format=json")).await?;
        let proposer = resp
            .block
            .prp
            .as_deref()
            .or_else(|| resp.cert.as_ref()?.prop.as_ref()?.oprop.as_deref())
            .and_then(decode_address);
        let txns = resp
            .block
            .txns
            .into_iter()
            .map(|stx| BlockTxn { note: stx.txn.note, fee: stx.txn.fee })
            .collect();
        Ok(BlockRecord { round: resp.block.rnd.unwrap_or(round), proposer, txns })
    }

    async fn read_state(&self, app: AppId, key: &[u8]) -> Result<Option<StateValue>, EndpointError> {
        let resp: ApplicationResponse = self.get_json(&format!("v2/applications/{app}")).await?;
        let Some(entry) = resp.params.global_state.into_iter().find(|kv| kv.key == key) else {
            return Ok(None);
        };
        let value = match entry.value.kind {
            1 => StateValue::Bytes(
                BASE64_STANDARD
                    .decode(entry.value.bytes.as_bytes())
                    .map_err(|e| EndpointError::Decode(format!("state bytes: {e}")))?,
            ),
            _ => StateValue::Uint(entry.value.uint),
        };
        Ok(Some(value))
    }

    async fn suggested_params(&self) -> Result<SuggestedParams, EndpointError> {
        let p: ParamsResponse = self.get_json("v2/transactions/params").await?;
        let genesis_hash: [u8; 32] = p
            .genesis_hash
            .try_into()
            .map_err(|_| EndpointError::Decode("genesis-hash is not 32 bytes".into()))?;
        Ok(SuggestedParams {
            fee_per_byte: p.fee,
            min_fee: p.min_fee,
            last_round: p.last_round,
            genesis_id: p.genesis_id,
            genesis_hash,
        })
    }
}
