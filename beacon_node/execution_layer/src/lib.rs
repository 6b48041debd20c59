//! The execution-layer dispatcher.
//!
//! Owns the `engine_*` call sequencing the consensus core needs:
//! `newPayload` verdict collection, `forkchoiceUpdated` dispatch with
//! payload-id caching, and the EIP-7685 execution-requests codec. The wire
//! transport is a collaborator behind [`EngineApi`]; [`MockEngine`] records
//! calls and replays scripted verdicts for tests.

mod engine_api;
mod payload_id_cache;

pub mod eip7685;
pub mod mock;

pub use engine_api::{
    EngineApi, Error, ForkchoiceState, ForkchoiceUpdatedResponse, NewPayloadRequest,
    PayloadAttributes, PayloadId, PayloadStatus,
};
pub use mock::MockEngine;
pub use payload_id_cache::PayloadIdCacheKey;

use payload_id_cache::PayloadIdCache;
use parking_lot::Mutex;
use tracing::{debug, warn};
use types::{ExecutionBlockHash, ExecutionPayload};

/// The consensus core's handle on an execution engine.
pub struct ExecutionLayer<T: EngineApi> {
    engine: T,
    payload_id_cache: Mutex<PayloadIdCache>,
}

impl<T: EngineApi> ExecutionLayer<T> {
    pub fn new(engine: T) -> Self {
        Self {
            engine,
            payload_id_cache: Mutex::new(PayloadIdCache::new()),
        }
    }

    pub fn engine(&self) -> &T {
        &self.engine
    }

    /// Forward a block's payload to the EL and return its verdict.
    pub async fn notify_new_payload(
        &self,
        payload: &ExecutionPayload,
    ) -> Result<PayloadStatus, Error> {
        let status = self
            .engine
            .new_payload(NewPayloadRequest {
                payload: payload.clone(),
            })
            .await?;
        debug!(block_hash = ?payload.block_hash, ?status, "newPayload");
        Ok(status)
    }

    /// Send `forkchoiceUpdated`, caching any returned payload id against
    /// `(head_block_hash, attributes)` for later `get_payload` calls.
    pub async fn notify_forkchoice_updated(
        &self,
        head_block_hash: ExecutionBlockHash,
        safe_block_hash: ExecutionBlockHash,
        finalized_block_hash: ExecutionBlockHash,
        payload_attributes: Option<PayloadAttributes>,
    ) -> Result<ForkchoiceUpdatedResponse, Error> {
        let forkchoice_state = ForkchoiceState {
            head_block_hash,
            safe_block_hash,
            finalized_block_hash,
        };

        let response = self
            .engine
            .forkchoice_updated(forkchoice_state, payload_attributes.clone())
            .await;

        let response = match response {
            Ok(response) => response,
            Err(error) if error.is_aborted() => {
                // Aborted calls are expected during shutdown and head churn;
                // they are not engine failures.
                debug!(?error, "forkchoiceUpdated aborted");
                return Err(error);
            }
            Err(error) => {
                warn!(?error, "forkchoiceUpdated failed");
                return Err(error);
            }
        };

        if let (Some(attributes), Some(payload_id)) = (payload_attributes, response.payload_id) {
            self.payload_id_cache.lock().insert(
                PayloadIdCacheKey::new(head_block_hash, &attributes),
                payload_id,
            );
        }

        Ok(response)
    }

    /// A payload id from a previous `forkchoiceUpdated` with attributes.
    pub fn cached_payload_id(
        &self,
        head_block_hash: ExecutionBlockHash,
        attributes: &PayloadAttributes,
    ) -> Option<PayloadId> {
        self.payload_id_cache
            .lock()
            .get(&PayloadIdCacheKey::new(head_block_hash, attributes))
    }

    pub async fn get_payload(&self, payload_id: PayloadId) -> Result<ExecutionPayload, Error> {
        self.engine.get_payload(payload_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::FixedBytesExtended;
    use types::Hash256;

    fn attributes(timestamp: u64) -> PayloadAttributes {
        PayloadAttributes {
            timestamp,
            prev_randao: Hash256::zero(),
            suggested_fee_recipient: Default::default(),
        }
    }

    #[tokio::test]
    async fn payload_id_is_cached_per_head_and_attributes() {
        let engine = MockEngine::default();
        engine.set_payload_id(Some([7; 8]));
        let el = ExecutionLayer::new(engine);

        let head = ExecutionBlockHash::from_root(Hash256::from_low_u64_be(1));
        el.notify_forkchoice_updated(
            head,
            ExecutionBlockHash::zero(),
            ExecutionBlockHash::zero(),
            Some(attributes(1200)),
        )
        .await
        .unwrap();

        assert_eq!(el.cached_payload_id(head, &attributes(1200)), Some([7; 8]));
        assert_eq!(el.cached_payload_id(head, &attributes(1212)), None);
        let other_head = ExecutionBlockHash::from_root(Hash256::from_low_u64_be(2));
        assert_eq!(el.cached_payload_id(other_head, &attributes(1200)), None);
    }

    #[tokio::test]
    async fn fcu_without_attributes_caches_nothing() {
        let engine = MockEngine::default();
        engine.set_payload_id(Some([7; 8]));
        let el = ExecutionLayer::new(engine);

        let head = ExecutionBlockHash::from_root(Hash256::from_low_u64_be(1));
        el.notify_forkchoice_updated(
            head,
            ExecutionBlockHash::zero(),
            ExecutionBlockHash::zero(),
            None,
        )
        .await
        .unwrap();

        assert_eq!(el.cached_payload_id(head, &attributes(1200)), None);
    }
}
