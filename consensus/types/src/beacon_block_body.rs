use crate::beacon_state::BeaconStateError as Error;
use crate::{
    Attestation, AttesterSlashing, Deposit, Eth1Data, EthSpec, ExecutionPayload,
    ExecutionRequests, Graffiti, Hash256, ProposerSlashing, SignedBlsToExecutionChange,
    SignedVoluntaryExit, SyncAggregate,
};
use bls::SignatureBytes;
use derivative::Derivative;
use kzg::KzgCommitment;
use merkle_proof::merkle_branch_from_leaves;
use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use ssz_types::{FixedVector, VariableList};
use superstruct::superstruct;
use tree_hash::TreeHash;
use tree_hash_derive::TreeHash;

pub type KzgCommitments<E> =
    VariableList<KzgCommitment, <E as EthSpec>::MaxBlobCommitmentsPerBlock>;

/// Position of `blob_kzg_commitments` among the body's merkle leaves.
///
/// The body root pads its field roots to 16 leaves, so the commitments list
/// sits at generalized index `16 + 11 = 27` and inclusion proofs have depth 4.
pub const BLOB_KZG_COMMITMENTS_INDEX: usize = 11;

/// The number of merkle leaves a body root is computed over.
const BODY_MERKLE_LEAVES: usize = 16;
const BODY_MERKLE_DEPTH: usize = 4;

/// The operations and payload carried by a block.
///
/// `Base` covers every pre-Deneb fork: the ingestion core never inspects the
/// fields that differ among them, so they share a shape. `Deneb` adds
/// `blob_kzg_commitments`, `Electra` adds `execution_requests` and serves all
/// later forks.
#[superstruct(
    variants(Base, Deneb, Electra),
    variant_attributes(
        derive(
            Debug,
            Clone,
            Serialize,
            Deserialize,
            Encode,
            Decode,
            TreeHash,
            Derivative,
        ),
        derivative(PartialEq, Eq, Hash(bound = "E: EthSpec")),
        serde(bound = "E: EthSpec", deny_unknown_fields),
    ),
    ref_attributes(derive(Debug)),
    cast_error(ty = "Error", expr = "Error::IncorrectStateVariant"),
    partial_getter_error(ty = "Error", expr = "Error::IncorrectStateVariant")
)]
#[derive(Debug, Clone, Serialize, Deserialize, Encode, TreeHash, Derivative)]
#[derivative(PartialEq, Eq, Hash(bound = "E: EthSpec"))]
#[serde(bound = "E: EthSpec", untagged)]
#[tree_hash(enum_behaviour = "transparent")]
#[ssz(enum_behaviour = "transparent")]
pub struct BeaconBlockBody<E: EthSpec> {
    pub randao_reveal: SignatureBytes,
    pub eth1_data: Eth1Data,
    pub graffiti: Graffiti,
    pub proposer_slashings: VariableList<ProposerSlashing, E::MaxProposerSlashings>,
    pub attester_slashings: VariableList<AttesterSlashing<E>, E::MaxAttesterSlashings>,
    pub attestations: VariableList<Attestation<E>, E::MaxAttestations>,
    pub deposits: VariableList<Deposit<E>, E::MaxDeposits>,
    pub voluntary_exits: VariableList<SignedVoluntaryExit, E::MaxVoluntaryExits>,
    pub sync_aggregate: SyncAggregate<E>,
    pub execution_payload: ExecutionPayload,
    pub bls_to_execution_changes:
        VariableList<SignedBlsToExecutionChange, E::MaxBlsToExecutionChanges>,
    #[superstruct(only(Deneb, Electra))]
    pub blob_kzg_commitments: KzgCommitments<E>,
    #[superstruct(only(Electra))]
    pub execution_requests: ExecutionRequests<E>,
}

macro_rules! body_merkle_leaves {
    ($body: expr) => {{
        let mut leaves = Vec::with_capacity(BODY_MERKLE_LEAVES);
        leaves.push($body.randao_reveal.tree_hash_root());
        leaves.push($body.eth1_data.tree_hash_root());
        leaves.push($body.graffiti.tree_hash_root());
        leaves.push($body.proposer_slashings.tree_hash_root());
        leaves.push($body.attester_slashings.tree_hash_root());
        leaves.push($body.attestations.tree_hash_root());
        leaves.push($body.deposits.tree_hash_root());
        leaves.push($body.voluntary_exits.tree_hash_root());
        leaves.push($body.sync_aggregate.tree_hash_root());
        leaves.push($body.execution_payload.tree_hash_root());
        leaves.push($body.bls_to_execution_changes.tree_hash_root());
        leaves
    }};
}

impl<E: EthSpec> BeaconBlockBody<E> {
    /// The merkle branch proving `blob_kzg_commitments` against the body root.
    ///
    /// Errors on pre-Deneb bodies, which have no commitments leaf.
    pub fn kzg_commitments_merkle_proof(
        &self,
    ) -> Result<FixedVector<Hash256, E::KzgCommitmentsInclusionProofDepth>, Error> {
        let mut leaves = match self {
            BeaconBlockBody::Base(_) => return Err(Error::IncorrectStateVariant),
            BeaconBlockBody::Deneb(body) => {
                let mut leaves = body_merkle_leaves!(body);
                leaves.push(body.blob_kzg_commitments.tree_hash_root());
                leaves
            }
            BeaconBlockBody::Electra(body) => {
                let mut leaves = body_merkle_leaves!(body);
                leaves.push(body.blob_kzg_commitments.tree_hash_root());
                leaves.push(body.execution_requests.tree_hash_root());
                leaves
            }
        };
        debug_assert!(leaves.len() > BLOB_KZG_COMMITMENTS_INDEX);
        leaves.truncate(BODY_MERKLE_LEAVES);

        let branch =
            merkle_branch_from_leaves(&leaves, BODY_MERKLE_DEPTH, BLOB_KZG_COMMITMENTS_INDEX);
        FixedVector::new(branch).map_err(|_| Error::IncorrectStateVariant)
    }

    pub fn blob_kzg_commitments_opt(&self) -> Option<&KzgCommitments<E>> {
        self.blob_kzg_commitments().ok()
    }

    pub fn execution_requests_opt(&self) -> Option<&ExecutionRequests<E>> {
        self.execution_requests().ok()
    }
}

impl<'a, E: EthSpec> BeaconBlockBodyRef<'a, E> {
    pub fn blob_kzg_commitments_opt(&self) -> Option<&'a KzgCommitments<E>> {
        match self {
            BeaconBlockBodyRef::Base(_) => None,
            BeaconBlockBodyRef::Deneb(body) => Some(&body.blob_kzg_commitments),
            BeaconBlockBodyRef::Electra(body) => Some(&body.blob_kzg_commitments),
        }
    }

    pub fn execution_requests_opt(&self) -> Option<&'a ExecutionRequests<E>> {
        match self {
            BeaconBlockBodyRef::Electra(body) => Some(&body.execution_requests),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MainnetEthSpec;
    use merkle_proof::verify_merkle_proof;

    type E = MainnetEthSpec;

    fn deneb_body_with_commitments(n: usize) -> BeaconBlockBody<E> {
        let commitments = (0..n)
            .map(|i| {
                let mut commitment = KzgCommitment::empty();
                commitment.0[0] = 0xc0;
                commitment.0[1] = i as u8;
                commitment
            })
            .collect::<Vec<_>>();
        BeaconBlockBody::Deneb(BeaconBlockBodyDeneb {
            randao_reveal: SignatureBytes::empty(),
            eth1_data: Eth1Data::default(),
            graffiti: Graffiti::default(),
            proposer_slashings: VariableList::empty(),
            attester_slashings: VariableList::empty(),
            attestations: VariableList::empty(),
            deposits: VariableList::empty(),
            voluntary_exits: VariableList::empty(),
            sync_aggregate: SyncAggregate::empty(),
            execution_payload: ExecutionPayload::default(),
            bls_to_execution_changes: VariableList::empty(),
            blob_kzg_commitments: VariableList::new(commitments).unwrap(),
        })
    }

    #[test]
    fn commitments_inclusion_proof_round_trip() {
        let body = deneb_body_with_commitments(2);
        let proof = body.kzg_commitments_merkle_proof().unwrap();
        let commitments_root = body.blob_kzg_commitments().unwrap().tree_hash_root();

        assert!(verify_merkle_proof(
            commitments_root,
            &proof,
            E::kzg_commitments_inclusion_proof_depth(),
            BLOB_KZG_COMMITMENTS_INDEX,
            body.tree_hash_root(),
        ));
    }

    #[test]
    fn pre_deneb_body_has_no_proof() {
        let body: BeaconBlockBody<E> = BeaconBlockBody::Base(BeaconBlockBodyBase {
            randao_reveal: SignatureBytes::empty(),
            eth1_data: Eth1Data::default(),
            graffiti: Graffiti::default(),
            proposer_slashings: VariableList::empty(),
            attester_slashings: VariableList::empty(),
            attestations: VariableList::empty(),
            deposits: VariableList::empty(),
            voluntary_exits: VariableList::empty(),
            sync_aggregate: SyncAggregate::empty(),
            execution_payload: ExecutionPayload::default(),
            bls_to_execution_changes: VariableList::empty(),
        });
        assert!(body.kzg_commitments_merkle_proof().is_err());
    }
}
