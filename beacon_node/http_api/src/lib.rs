//! The beacon-node REST surface for block publication and retrieval.
//!
//! The transport is `axum`; every handler resolves through [`Context`] to
//! the chain. Publication (`publish_blocks`) is the interesting path: an
//! API-published block fans out to gossip *before* being imported locally,
//! with a caller-selected validation level.

pub mod block_id;
pub mod error;
pub mod publish_blocks;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use beacon_chain::{BeaconChain, BeaconChainTypes};
use block_id::BlockId;
use error::Error;
use parking_lot::RwLock;
use publish_blocks::{
    BroadcastValidation, NetworkMessage, ProducerCache, PublishBlockRequest,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use types::{BlobSidecar, ForkName, Hash256, SignedBeaconBlockHeader};

/// Everything the handlers need.
pub struct Context<T: BeaconChainTypes> {
    pub chain: Arc<BeaconChain<T>>,
    /// Fan-out channel standing in for the gossip publisher.
    pub network_tx: UnboundedSender<NetworkMessage<T::EthSpec>>,
    /// Locally produced block contents for blinded-block reconstruction.
    pub producer_cache: RwLock<ProducerCache<T::EthSpec>>,
    /// The external builder, for blinded blocks we did not produce.
    pub builder: Option<Arc<dyn publish_blocks::BuilderApi<T::EthSpec>>>,
}

pub fn routes<T: BeaconChainTypes>(ctx: Arc<Context<T>>) -> Router {
    Router::new()
        .route("/eth/v1/beacon/blocks", post(publish_block_v1::<T>))
        .route("/eth/v2/beacon/blocks", post(publish_block_v2::<T>))
        .route(
            "/eth/v1/beacon/blinded_blocks",
            post(publish_blinded_block_v1::<T>),
        )
        .route(
            "/eth/v2/beacon/blinded_blocks",
            post(publish_blinded_block_v2::<T>),
        )
        .route("/eth/v2/beacon/blocks/{block_id}", get(get_block_v2::<T>))
        .route(
            "/eth/v1/beacon/blocks/{block_id}/root",
            get(get_block_root::<T>),
        )
        .route(
            "/eth/v1/beacon/blocks/{block_id}/attestations",
            get(get_block_attestations_v1::<T>),
        )
        .route(
            "/eth/v2/beacon/blocks/{block_id}/attestations",
            get(get_block_attestations_v2::<T>),
        )
        .route("/eth/v1/beacon/headers", get(get_headers::<T>))
        .route(
            "/eth/v1/beacon/headers/{block_id}",
            get(get_header::<T>),
        )
        .route(
            "/eth/v1/beacon/blob_sidecars/{block_id}",
            get(get_blob_sidecars::<T>),
        )
        .with_state(ctx)
}

/// Response metadata common to the block reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOptimisticFinalizedResponse<D> {
    pub version: ForkName,
    pub execution_optimistic: bool,
    pub finalized: bool,
    pub data: D,
}

#[derive(Debug, Deserialize)]
pub struct BroadcastValidationQuery {
    #[serde(default)]
    pub broadcast_validation: BroadcastValidation,
}

#[derive(Debug, Deserialize, Default)]
pub struct IndicesQuery {
    pub indices: Option<String>,
}

impl IndicesQuery {
    /// Parse `indices=0,2,5`; duplicate indices are a user error.
    fn parse(&self) -> Result<Option<Vec<u64>>, Error> {
        let Some(raw) = &self.indices else {
            return Ok(None);
        };
        let mut indices = Vec::new();
        for part in raw.split(',') {
            let index = part
                .trim()
                .parse::<u64>()
                .map_err(|_| Error::BadRequest(format!("invalid index: {part}")))?;
            if indices.contains(&index) {
                return Err(Error::BadRequest(format!("duplicate index: {index}")));
            }
            indices.push(index);
        }
        Ok(Some(indices))
    }
}

async fn publish_block_v1<T: BeaconChainTypes>(
    State(ctx): State<Arc<Context<T>>>,
    Json(request): Json<PublishBlockRequest<T::EthSpec>>,
) -> Result<axum::http::StatusCode, Error> {
    publish_blocks::publish_block(&ctx, request, BroadcastValidation::Gossip).await
}

async fn publish_block_v2<T: BeaconChainTypes>(
    State(ctx): State<Arc<Context<T>>>,
    Query(query): Query<BroadcastValidationQuery>,
    Json(request): Json<PublishBlockRequest<T::EthSpec>>,
) -> Result<axum::http::StatusCode, Error> {
    publish_blocks::publish_block(&ctx, request, query.broadcast_validation).await
}

async fn publish_blinded_block_v1<T: BeaconChainTypes>(
    State(ctx): State<Arc<Context<T>>>,
    Json(block): Json<publish_blocks::SignedBlindedBeaconBlock<T::EthSpec>>,
) -> Result<axum::http::StatusCode, Error> {
    publish_blocks::publish_blinded_block(&ctx, block, BroadcastValidation::Gossip).await
}

async fn publish_blinded_block_v2<T: BeaconChainTypes>(
    State(ctx): State<Arc<Context<T>>>,
    Query(query): Query<BroadcastValidationQuery>,
    Json(block): Json<publish_blocks::SignedBlindedBeaconBlock<T::EthSpec>>,
) -> Result<axum::http::StatusCode, Error> {
    publish_blocks::publish_blinded_block(&ctx, block, query.broadcast_validation).await
}

async fn get_block_v2<T: BeaconChainTypes>(
    State(ctx): State<Arc<Context<T>>>,
    Path(block_id): Path<String>,
) -> Result<Json<ExecutionOptimisticFinalizedResponse<Arc<types::SignedBeaconBlock<T::EthSpec>>>>, Error>
{
    let block_id: BlockId = block_id.parse().map_err(Error::BadRequest)?;
    let (root, block) = block_id.resolve_block(&ctx.chain)?;
    Ok(Json(versioned_response(&ctx.chain, root, &block)?))
}

async fn get_block_root<T: BeaconChainTypes>(
    State(ctx): State<Arc<Context<T>>>,
    Path(block_id): Path<String>,
) -> Result<Json<ExecutionOptimisticFinalizedResponse<RootData>>, Error> {
    let block_id: BlockId = block_id.parse().map_err(Error::BadRequest)?;
    let (root, block) = block_id.resolve_block(&ctx.chain)?;
    let response = versioned_response(&ctx.chain, root, &block)?;
    Ok(Json(ExecutionOptimisticFinalizedResponse {
        version: response.version,
        execution_optimistic: response.execution_optimistic,
        finalized: response.finalized,
        data: RootData { root },
    }))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootData {
    pub root: Hash256,
}

async fn get_block_attestations_v1<T: BeaconChainTypes>(
    State(ctx): State<Arc<Context<T>>>,
    Path(block_id): Path<String>,
) -> Result<Json<ExecutionOptimisticFinalizedResponse<Vec<types::Attestation<T::EthSpec>>>>, Error>
{
    let block_id: BlockId = block_id.parse().map_err(Error::BadRequest)?;
    let (root, block) = block_id.resolve_block(&ctx.chain)?;

    // The v1 shape pre-dates Electra's attestation changes; later forks
    // must use v2.
    let fork_name = block.fork_name(&ctx.chain.spec);
    if fork_name.electra_enabled() {
        return Err(Error::BadRequest(format!(
            "the v1 attestations endpoint does not support {fork_name}; use v2"
        )));
    }

    let attestations = block.body().attestations().iter().cloned().collect();
    let response = versioned_response(&ctx.chain, root, &block)?;
    Ok(Json(ExecutionOptimisticFinalizedResponse {
        version: response.version,
        execution_optimistic: response.execution_optimistic,
        finalized: response.finalized,
        data: attestations,
    }))
}

async fn get_block_attestations_v2<T: BeaconChainTypes>(
    State(ctx): State<Arc<Context<T>>>,
    Path(block_id): Path<String>,
) -> Result<Json<ExecutionOptimisticFinalizedResponse<Vec<types::Attestation<T::EthSpec>>>>, Error>
{
    let block_id: BlockId = block_id.parse().map_err(Error::BadRequest)?;
    let (root, block) = block_id.resolve_block(&ctx.chain)?;
    let attestations = block.body().attestations().iter().cloned().collect();
    let response = versioned_response(&ctx.chain, root, &block)?;
    Ok(Json(ExecutionOptimisticFinalizedResponse {
        version: response.version,
        execution_optimistic: response.execution_optimistic,
        finalized: response.finalized,
        data: attestations,
    }))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderData {
    pub root: Hash256,
    pub canonical: bool,
    pub header: SignedBeaconBlockHeader,
}

async fn get_header<T: BeaconChainTypes>(
    State(ctx): State<Arc<Context<T>>>,
    Path(block_id): Path<String>,
) -> Result<Json<ExecutionOptimisticFinalizedResponse<HeaderData>>, Error> {
    let block_id: BlockId = block_id.parse().map_err(Error::BadRequest)?;
    let (root, block) = block_id.resolve_block(&ctx.chain)?;
    let response = versioned_response(&ctx.chain, root, &block)?;
    Ok(Json(ExecutionOptimisticFinalizedResponse {
        version: response.version,
        execution_optimistic: response.execution_optimistic,
        finalized: response.finalized,
        data: HeaderData {
            root,
            canonical: block_id::is_canonical(&ctx.chain, root, block.slot()),
            header: block.signed_block_header(),
        },
    }))
}

async fn get_headers<T: BeaconChainTypes>(
    State(ctx): State<Arc<Context<T>>>,
) -> Result<Json<ExecutionOptimisticFinalizedResponse<Vec<HeaderData>>>, Error> {
    // Without filters this returns the head header, per the API default.
    let (root, block) = BlockId::Head.resolve_block(&ctx.chain)?;
    let response = versioned_response(&ctx.chain, root, &block)?;
    Ok(Json(ExecutionOptimisticFinalizedResponse {
        version: response.version,
        execution_optimistic: response.execution_optimistic,
        finalized: response.finalized,
        data: vec![HeaderData {
            root,
            canonical: true,
            header: block.signed_block_header(),
        }],
    }))
}

async fn get_blob_sidecars<T: BeaconChainTypes>(
    State(ctx): State<Arc<Context<T>>>,
    Path(block_id): Path<String>,
    Query(query): Query<IndicesQuery>,
) -> Result<Json<ExecutionOptimisticFinalizedResponse<Vec<Arc<BlobSidecar<T::EthSpec>>>>>, Error>
{
    let indices = query.parse()?;
    let block_id: BlockId = block_id.parse().map_err(Error::BadRequest)?;
    let (root, block) = block_id.resolve_block(&ctx.chain)?;

    let sidecars = ctx
        .chain
        .store
        .get_blob_sidecars(&root, block.slot())
        .map_err(|e| Error::ServerError(format!("{e:?}")))?;
    let sidecars = match indices {
        Some(indices) => sidecars
            .into_iter()
            .filter(|sidecar| indices.contains(&sidecar.index))
            .collect(),
        None => sidecars,
    };

    let response = versioned_response(&ctx.chain, root, &block)?;
    Ok(Json(ExecutionOptimisticFinalizedResponse {
        version: response.version,
        execution_optimistic: response.execution_optimistic,
        finalized: response.finalized,
        data: sidecars,
    }))
}

fn versioned_response<T: BeaconChainTypes>(
    chain: &BeaconChain<T>,
    root: Hash256,
    block: &Arc<types::SignedBeaconBlock<T::EthSpec>>,
) -> Result<ExecutionOptimisticFinalizedResponse<Arc<types::SignedBeaconBlock<T::EthSpec>>>, Error>
{
    Ok(ExecutionOptimisticFinalizedResponse {
        version: block.fork_name(&chain.spec),
        execution_optimistic: chain.is_optimistic_block(&root),
        finalized: block_id::is_finalized(chain, root, block.slot()),
        data: block.clone(),
    })
}
