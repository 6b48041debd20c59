//! EIP-7685 execution-requests wire codec.
//!
//! Each request list travels as `concat(type_byte, ssz(list))`. Types must
//! be ascending and unique, empty lists are omitted entirely, and an item
//! with no payload bytes is malformed.

use ssz::{Decode, Encode};
use types::{EthSpec, ExecutionRequests};

pub const DEPOSIT_REQUEST_TYPE: u8 = 0x00;
pub const WITHDRAWAL_REQUEST_TYPE: u8 = 0x01;
pub const CONSOLIDATION_REQUEST_TYPE: u8 = 0x02;

#[derive(Debug, Clone, PartialEq)]
pub enum RequestsError {
    /// A request item carried a type byte but no data.
    EmptyRequestData { request_type: u8 },
    /// Type bytes must be strictly ascending (which also bans duplicates).
    OutOfOrder { previous: u8, current: u8 },
    UnknownRequestType(u8),
    /// An item was completely empty (no type byte).
    MissingTypePrefix,
    SszError(ssz::DecodeError),
}

impl From<ssz::DecodeError> for RequestsError {
    fn from(e: ssz::DecodeError) -> Self {
        RequestsError::SszError(e)
    }
}

/// Encode for the engine API. Empty lists are omitted.
pub fn serialize_execution_requests<E: EthSpec>(
    requests: &ExecutionRequests<E>,
) -> Vec<Vec<u8>> {
    let mut out = Vec::with_capacity(3);

    let mut push = |request_type: u8, ssz_bytes: Vec<u8>, is_empty: bool| {
        if !is_empty {
            let mut item = Vec::with_capacity(1 + ssz_bytes.len());
            item.push(request_type);
            item.extend_from_slice(&ssz_bytes);
            out.push(item);
        }
    };

    push(
        DEPOSIT_REQUEST_TYPE,
        requests.deposits.as_ssz_bytes(),
        requests.deposits.is_empty(),
    );
    push(
        WITHDRAWAL_REQUEST_TYPE,
        requests.withdrawals.as_ssz_bytes(),
        requests.withdrawals.is_empty(),
    );
    push(
        CONSOLIDATION_REQUEST_TYPE,
        requests.consolidations.as_ssz_bytes(),
        requests.consolidations.is_empty(),
    );

    out
}

/// Decode from the engine API, enforcing ordering and non-emptiness.
pub fn deserialize_execution_requests<E: EthSpec>(
    items: &[Vec<u8>],
) -> Result<ExecutionRequests<E>, RequestsError> {
    let mut requests = ExecutionRequests::<E>::default();
    let mut previous_type: Option<u8> = None;

    for item in items {
        let (&request_type, data) = item
            .split_first()
            .ok_or(RequestsError::MissingTypePrefix)?;
        if data.is_empty() {
            return Err(RequestsError::EmptyRequestData { request_type });
        }
        if let Some(previous) = previous_type {
            if request_type <= previous {
                return Err(RequestsError::OutOfOrder {
                    previous,
                    current: request_type,
                });
            }
        }
        previous_type = Some(request_type);

        match request_type {
            DEPOSIT_REQUEST_TYPE => {
                requests.deposits = Decode::from_ssz_bytes(data)?;
            }
            WITHDRAWAL_REQUEST_TYPE => {
                requests.withdrawals = Decode::from_ssz_bytes(data)?;
            }
            CONSOLIDATION_REQUEST_TYPE => {
                requests.consolidations = Decode::from_ssz_bytes(data)?;
            }
            unknown => return Err(RequestsError::UnknownRequestType(unknown)),
        }
    }

    Ok(requests)
}
