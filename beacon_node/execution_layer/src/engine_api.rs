use std::future::Future;
use types::{ExecutionBlockHash, ExecutionPayload, Hash256};

pub type PayloadId = [u8; 8];

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The engine returned a JSON-RPC error.
    EngineError { code: i64, message: String },
    /// The call was cancelled by our side (shutdown or head churn).
    Aborted,
    /// The call was dropped from the engine's request queue.
    QueueAborted,
    /// The engine did not answer within the per-call timeout.
    Timeout,
    InvalidPayloadId(PayloadId),
}

impl Error {
    /// Abort-style failures are expected during shutdown and reorgs and are
    /// logged at debug, not error.
    pub fn is_aborted(&self) -> bool {
        matches!(self, Error::Aborted | Error::QueueAborted)
    }
}

/// `engine_newPayload` verdicts, per the engine API.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadStatus {
    Valid,
    Invalid {
        latest_valid_hash: Option<ExecutionBlockHash>,
    },
    /// The EL is syncing; it cannot judge the payload yet.
    Syncing,
    /// The payload was accepted for later validation (side chain).
    Accepted,
    InvalidBlockHash,
}

impl PayloadStatus {
    /// `SYNCING`/`ACCEPTED` leave the block optimistically imported.
    pub fn is_optimistic(&self) -> bool {
        matches!(self, PayloadStatus::Syncing | PayloadStatus::Accepted)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPayloadRequest {
    pub payload: ExecutionPayload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ForkchoiceState {
    pub head_block_hash: ExecutionBlockHash,
    pub safe_block_hash: ExecutionBlockHash,
    pub finalized_block_hash: ExecutionBlockHash,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PayloadAttributes {
    pub timestamp: u64,
    pub prev_randao: Hash256,
    pub suggested_fee_recipient: types::ExecutionAddress,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForkchoiceUpdatedResponse {
    pub payload_status: PayloadStatus,
    pub payload_id: Option<PayloadId>,
}

/// The engine JSON-RPC contract.
///
/// The HTTP/IPC transport, authentication and version negotiation
/// (`engine_newPayloadV{1..4}` etc.) live behind this trait.
pub trait EngineApi: Send + Sync + 'static {
    fn new_payload(
        &self,
        request: NewPayloadRequest,
    ) -> impl Future<Output = Result<PayloadStatus, Error>> + Send;

    fn forkchoice_updated(
        &self,
        forkchoice_state: ForkchoiceState,
        payload_attributes: Option<PayloadAttributes>,
    ) -> impl Future<Output = Result<ForkchoiceUpdatedResponse, Error>> + Send;

    fn get_payload(
        &self,
        payload_id: PayloadId,
    ) -> impl Future<Output = Result<ExecutionPayload, Error>> + Send;
}
