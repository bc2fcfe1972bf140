use alloy::eips::BlockNumberOrTag;
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::Filter;
use alloy::sol;
use alloy::sol_types::SolEvent;
use async_trait::async_trait;
use url::Url;

use super::models::{DepositEvent, DepositFields, Proposal, ProposalStatus};
use super::LedgerReader;
use crate::error::TransportError;

sol! {
    #[sol(rpc)]
    contract Bridge {
        struct Proposal {
            bytes32 _resourceID;
            bytes32 _dataHash;
            address[] _yesVotes;
            address[] _noVotes;
            uint8 _status;
            uint256 _proposedBlock;
        }

        event Deposit(
            uint8 indexed destinationChainID,
            bytes32 indexed resourceID,
            uint64 indexed depositNonce
        );

        function _depositCounts(uint8 destinationChainID) external view returns (uint64);
        function _depositRecords(uint64 depositNonce, uint8 destinationChainID) external view returns (bytes memory);
        function getProposal(uint8 originChainID, uint64 depositNonce, bytes32 dataHash) external view returns (Proposal memory);
    }
}

/// Ledger reader over an EVM JSON-RPC endpoint.
pub struct EvmLedgerReader {
    bridge: Bridge::BridgeInstance<DynProvider>,
}

impl EvmLedgerReader {
    pub fn new(rpc_url: Url, bridge_address: Address) -> Self {
        let provider = ProviderBuilder::new().connect_http(rpc_url).erased();
        Self {
            bridge: Bridge::new(bridge_address, provider),
        }
    }
}

#[async_trait]
impl LedgerReader for EvmLedgerReader {
    async fn deposit_count(&self, destination_chain_id: u8) -> Result<u64, TransportError> {
        let count = self.bridge._depositCounts(destination_chain_id).call().await?;
        Ok(count)
    }

    async fn deposit_record(
        &self,
        nonce: u64,
        destination_chain_id: u8,
    ) -> Result<Bytes, TransportError> {
        let record = self
            .bridge
            ._depositRecords(nonce, destination_chain_id)
            .call()
            .await?;
        Ok(record)
    }

    async fn proposal(
        &self,
        origin_chain_id: u8,
        nonce: u64,
        key: B256,
    ) -> Result<Proposal, TransportError> {
        let raw = self
            .bridge
            .getProposal(origin_chain_id, nonce, key)
            .call()
            .await?;
        Proposal::try_from(raw)
    }

    async fn deposit_events(
        &self,
        _destination_chain_id: u8,
        nonce: u64,
    ) -> Result<Vec<DepositEvent>, TransportError> {
        // Filter on the nonce topic only; the destination chain id topic is
        // left open so a mis-routed deposit still surfaces for verification.
        let filter = Filter::new()
            .address(*self.bridge.address())
            .event_signature(Bridge::Deposit::SIGNATURE_HASH)
            .topic3(U256::from(nonce))
            .from_block(BlockNumberOrTag::Earliest)
            .to_block(BlockNumberOrTag::Latest);

        let logs = self.bridge.provider().get_logs(&filter).await?;

        let events = logs
            .into_iter()
            .map(|log| {
                let block_number = log.block_number.unwrap_or_default();
                let fields = log
                    .log_decode::<Bridge::Deposit>()
                    .ok()
                    .map(|decoded| DepositFields {
                        destination_chain_id: decoded.inner.data.destinationChainID,
                        resource_id: decoded.inner.data.resourceID,
                        nonce: decoded.inner.data.depositNonce,
                    });
                DepositEvent {
                    block_number,
                    fields,
                }
            })
            .collect();

        Ok(events)
    }
}

impl TryFrom<Bridge::Proposal> for Proposal {
    type Error = TransportError;

    fn try_from(raw: Bridge::Proposal) -> Result<Self, TransportError> {
        Ok(Self {
            resource_id: raw._resourceID,
            data_hash: raw._dataHash,
            yes_votes: raw._yesVotes,
            no_votes: raw._noVotes,
            status: ProposalStatus::try_from(raw._status)?,
            proposed_block: raw._proposedBlock,
        })
    }
}
