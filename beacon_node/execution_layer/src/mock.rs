//! A scriptable in-process engine for tests.

use crate::{
    EngineApi, Error, ForkchoiceState, ForkchoiceUpdatedResponse, NewPayloadRequest,
    PayloadAttributes, PayloadId, PayloadStatus,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use types::{ExecutionBlockHash, ExecutionPayload};

/// Records every `engine_*` call and replays configured verdicts.
///
/// By default every payload is `VALID` and every fcU is `VALID` without a
/// payload id.
#[derive(Default)]
pub struct MockEngine {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    /// Per-block-hash overrides for `new_payload`.
    new_payload_statuses: HashMap<ExecutionBlockHash, PayloadStatus>,
    /// Uniform error injected into every call, when set.
    injected_error: Option<Error>,
    payload_id: Option<PayloadId>,
    new_payload_calls: Vec<NewPayloadRequest>,
    forkchoice_updated_calls: Vec<(ForkchoiceState, Option<PayloadAttributes>)>,
    get_payload_calls: Vec<PayloadId>,
}

impl MockEngine {
    pub fn set_new_payload_status(&self, block_hash: ExecutionBlockHash, status: PayloadStatus) {
        self.inner
            .lock()
            .new_payload_statuses
            .insert(block_hash, status);
    }

    pub fn set_injected_error(&self, error: Option<Error>) {
        self.inner.lock().injected_error = error;
    }

    pub fn set_payload_id(&self, payload_id: Option<PayloadId>) {
        self.inner.lock().payload_id = payload_id;
    }

    pub fn new_payload_calls(&self) -> Vec<NewPayloadRequest> {
        self.inner.lock().new_payload_calls.clone()
    }

    pub fn forkchoice_updated_calls(&self) -> Vec<(ForkchoiceState, Option<PayloadAttributes>)> {
        self.inner.lock().forkchoice_updated_calls.clone()
    }

    pub fn forkchoice_updated_call_count(&self) -> usize {
        self.inner.lock().forkchoice_updated_calls.len()
    }

    pub fn get_payload_calls(&self) -> Vec<PayloadId> {
        self.inner.lock().get_payload_calls.clone()
    }
}

impl EngineApi for MockEngine {
    async fn new_payload(&self, request: NewPayloadRequest) -> Result<PayloadStatus, Error> {
        let mut inner = self.inner.lock();
        if let Some(error) = inner.injected_error.clone() {
            return Err(error);
        }
        let status = inner
            .new_payload_statuses
            .get(&request.payload.block_hash)
            .cloned()
            .unwrap_or(PayloadStatus::Valid);
        inner.new_payload_calls.push(request);
        Ok(status)
    }

    async fn forkchoice_updated(
        &self,
        forkchoice_state: ForkchoiceState,
        payload_attributes: Option<PayloadAttributes>,
    ) -> Result<ForkchoiceUpdatedResponse, Error> {
        let mut inner = self.inner.lock();
        if let Some(error) = inner.injected_error.clone() {
            return Err(error);
        }
        inner
            .forkchoice_updated_calls
            .push((forkchoice_state, payload_attributes.clone()));
        Ok(ForkchoiceUpdatedResponse {
            payload_status: PayloadStatus::Valid,
            payload_id: payload_attributes.and(inner.payload_id),
        })
    }

    async fn get_payload(&self, payload_id: PayloadId) -> Result<ExecutionPayload, Error> {
        let mut inner = self.inner.lock();
        if let Some(error) = inner.injected_error.clone() {
            return Err(error);
        }
        if inner.payload_id != Some(payload_id) {
            return Err(Error::InvalidPayloadId(payload_id));
        }
        inner.get_payload_calls.push(payload_id);
        Ok(ExecutionPayload::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::{FixedBytesExtended, Hash256};

    #[tokio::test]
    async fn statuses_are_scriptable_per_block_hash() {
        let engine = MockEngine::default();
        let hash = ExecutionBlockHash::from_root(Hash256::from_low_u64_be(9));
        engine.set_new_payload_status(
            hash,
            PayloadStatus::Invalid {
                latest_valid_hash: None,
            },
        );

        let bad = engine
            .new_payload(NewPayloadRequest {
                payload: ExecutionPayload {
                    block_hash: hash,
                    ..ExecutionPayload::default()
                },
            })
            .await
            .unwrap();
        assert!(matches!(bad, PayloadStatus::Invalid { .. }));

        let default = engine
            .new_payload(NewPayloadRequest {
                payload: ExecutionPayload::default(),
            })
            .await
            .unwrap();
        assert_eq!(default, PayloadStatus::Valid);
        assert_eq!(engine.new_payload_calls().len(), 2);
    }

    #[tokio::test]
    async fn injected_errors_classify_as_aborted() {
        let engine = MockEngine::default();
        engine.set_injected_error(Some(Error::QueueAborted));
        let err = engine
            .new_payload(NewPayloadRequest {
                payload: ExecutionPayload::default(),
            })
            .await
            .unwrap_err();
        assert!(err.is_aborted());
    }
}
