use std::fmt;

use alloy::primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// Relayer voting lifecycle of a transfer proposal.
/// Executed is the only terminal success state; everything else is open or
/// failed for audit purposes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProposalStatus {
    #[default]
    Inactive,
    Active,
    Passed,
    Executed,
    Cancelled,
}

impl ProposalStatus {
    /// On-chain numeric encoding of the status.
    pub fn as_u8(self) -> u8 {
        match self {
            ProposalStatus::Inactive => 0,
            ProposalStatus::Active => 1,
            ProposalStatus::Passed => 2,
            ProposalStatus::Executed => 3,
            ProposalStatus::Cancelled => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalStatus::Inactive => "inactive",
            ProposalStatus::Active => "active",
            ProposalStatus::Passed => "passed",
            ProposalStatus::Executed => "executed",
            ProposalStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<u8> for ProposalStatus {
    type Error = TransportError;

    fn try_from(value: u8) -> Result<Self, TransportError> {
        match value {
            0 => Ok(ProposalStatus::Inactive),
            1 => Ok(ProposalStatus::Active),
            2 => Ok(ProposalStatus::Passed),
            3 => Ok(ProposalStatus::Executed),
            4 => Ok(ProposalStatus::Cancelled),
            other => Err(TransportError::Decode(format!(
                "unknown proposal status {other}"
            ))),
        }
    }
}

/// Snapshot of a destination-chain transfer proposal.
///
/// The default value is the zero-value proposal the bridge returns for a key
/// no relayer ever voted on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Proposal {
    pub resource_id: B256,
    pub data_hash: B256,
    pub yes_votes: Vec<Address>,
    pub no_votes: Vec<Address>,
    pub status: ProposalStatus,
    /// Block height at which the proposal was created, as reported by the
    /// destination chain.
    pub proposed_block: U256,
}

impl Proposal {
    /// An all-zero resource id is the sentinel for "no such proposal".
    pub fn exists(&self) -> bool {
        self.resource_id != B256::ZERO
    }
}

/// One Deposit log entry from the origin bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositEvent {
    pub block_number: u64,
    /// None when the log matched the query but its payload would not decode.
    pub fields: Option<DepositFields>,
}

/// Decoded payload of a Deposit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepositFields {
    pub destination_chain_id: u8,
    pub resource_id: B256,
    pub nonce: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for value in 0u8..=4 {
            let status = ProposalStatus::try_from(value).unwrap();
            assert_eq!(status.as_u8(), value);
        }
        assert!(ProposalStatus::try_from(5).is_err());
    }

    #[test]
    fn test_zero_proposal_is_sentinel() {
        let proposal = Proposal::default();
        assert!(!proposal.exists());
        assert_eq!(proposal.status, ProposalStatus::Inactive);

        let proposal = Proposal {
            resource_id: B256::repeat_byte(0x01),
            ..Proposal::default()
        };
        assert!(proposal.exists());
    }
}
