pub mod evm;
pub mod models;

use alloy::primitives::{Bytes, B256};
use async_trait::async_trait;

use crate::error::TransportError;
use models::{DepositEvent, Proposal};

/// Read-only view of one chain's bridge contract.
///
/// Pure data fetch, no interpretation: each call is a single best-effort
/// remote read and failures propagate to the caller.
#[async_trait]
pub trait LedgerReader: Send + Sync {
    /// Total deposit nonces ever minted toward `destination_chain_id`.
    async fn deposit_count(&self, destination_chain_id: u8) -> Result<u64, TransportError>;

    /// Raw deposit payload for one nonce. The bridge returns an empty
    /// payload for a nonce it never minted.
    async fn deposit_record(
        &self,
        nonce: u64,
        destination_chain_id: u8,
    ) -> Result<Bytes, TransportError>;

    /// Proposal stored under the derived key, or the zero-value proposal if
    /// none was ever created. Never fails for a well-formed key.
    async fn proposal(
        &self,
        origin_chain_id: u8,
        nonce: u64,
        key: B256,
    ) -> Result<Proposal, TransportError>;

    /// Deposit events carrying `nonce`, over the full historical log range.
    /// May return 0, 1, or (pathologically) more entries.
    async fn deposit_events(
        &self,
        destination_chain_id: u8,
        nonce: u64,
    ) -> Result<Vec<DepositEvent>, TransportError>;
}
