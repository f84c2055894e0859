//! ABI encoding for the feedback contract
//!
//! Function names are configurable because deployed revisions disagree on them
//! (`sendFeedback`/`addFeedback`, `getAllFeedback`/`getAllFeedbacks`); selectors are
//! derived from the configured names. The event layout is fixed.

use super::RawFeedback;
use crate::core::Account;
use crate::error::RpcError;
use alloy_primitives::{keccak256, Address, B256, U256};
use alloy_sol_types::{sol, sol_data, SolEvent, SolType};

sol! {
    struct Feedback {
        address user;
        string message;
        uint256 timestamp;
    }

    event NewFeedback(address indexed user, string message, uint256 timestamp);
}

/// First four bytes of `keccak256(signature)`.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// `topic0` of `NewFeedback`.
pub fn event_topic() -> B256 {
    NewFeedback::SIGNATURE_HASH
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractAbi {
    write: [u8; 4],
    read: [u8; 4],
    count: [u8; 4],
}

impl ContractAbi {
    pub fn new(write_method: &str, read_method: &str, count_method: &str) -> Self {
        Self {
            write: selector(&format!("{}(string)", write_method)),
            read: selector(&format!("{}()", read_method)),
            count: selector(&format!("{}()", count_method)),
        }
    }

    pub fn encode_write(&self, message: &str) -> Vec<u8> {
        let mut data = self.write.to_vec();
        data.extend(<(sol_data::String,)>::abi_encode_params(&(message.to_string(),)));
        data
    }

    pub fn encode_read(&self) -> Vec<u8> {
        self.read.to_vec()
    }

    pub fn encode_count(&self) -> Vec<u8> {
        self.count.to_vec()
    }
}

pub fn decode_feedback_list(data: &[u8]) -> Result<Vec<RawFeedback>, RpcError> {
    let (items,) = <(sol_data::Array<Feedback>,)>::abi_decode_params(data, true)
        .map_err(|e| RpcError::Decode(format!("feedback list: {}", e)))?;
    items
        .into_iter()
        .map(|f| {
            Ok(RawFeedback {
                author: account(f.user),
                message: f.message,
                timestamp: seconds(f.timestamp)?,
            })
        })
        .collect()
}

pub fn decode_count(data: &[u8]) -> Result<u64, RpcError> {
    let (count,) = <(sol_data::Uint<256>,)>::abi_decode_params(data, true)
        .map_err(|e| RpcError::Decode(format!("count: {}", e)))?;
    u64::try_from(count).map_err(|_| RpcError::Decode("count exceeds u64".into()))
}

pub fn decode_log(topics: &[B256], data: &[u8]) -> Result<RawFeedback, RpcError> {
    let event = NewFeedback::decode_raw_log(topics.iter().copied(), data, true)
        .map_err(|e| RpcError::Decode(format!("NewFeedback log: {}", e)))?;
    Ok(RawFeedback {
        author: account(event.user),
        message: event.message,
        timestamp: seconds(event.timestamp)?,
    })
}

fn account(address: Address) -> Account {
    Account::new(address.to_string())
}

fn seconds(value: U256) -> Result<u64, RpcError> {
    u64::try_from(value).map_err(|_| RpcError::Decode("timestamp exceeds u64".into()))
}
