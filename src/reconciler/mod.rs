use alloy::primitives::{keccak256, Address, B256};
use futures::{stream, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{AuditError, AuditResult};
use crate::ledger::models::{DepositEvent, Proposal, ProposalStatus};
use crate::ledger::LedgerReader;

/// One audited direction of the bridge pair.
#[derive(Debug, Clone)]
pub struct Direction {
    pub origin_name: String,
    pub destination_name: String,
    pub origin_chain_id: u8,
    pub destination_chain_id: u8,
    /// Handler contract on the destination chain; hash-join input.
    pub destination_handler: Address,
    /// Deposits whose event block is below this floor are out of the audit
    /// window and skipped.
    pub start_block: u64,
    pub verify_deposits: bool,
    /// Simultaneous in-flight nonce audits.
    pub concurrency: usize,
}

/// Report row for one proposal that has not reached the Executed state.
/// Field order here is the serialized key order in both report formats.
#[derive(Debug, Clone, Serialize)]
pub struct DiscrepancyRecord {
    #[serde(skip)]
    pub nonce: u64,
    pub origin: String,
    pub destination: String,
    pub proposal_resource_id: String,
    #[serde(rename = "proposal_dataHash")]
    pub proposal_data_hash: String,
    pub proposal_yes_votes_count: usize,
    pub proposal_no_votes_count: usize,
    pub proposal_yes_votes: String,
    pub proposal_no_votes: String,
    pub proposal_status: u8,
    pub proposal_proposed_block: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_block_number: Option<String>,
}

impl DiscrepancyRecord {
    fn new(
        direction: &Direction,
        nonce: u64,
        proposal: &Proposal,
        origin_block_number: Option<String>,
    ) -> Self {
        Self {
            nonce,
            origin: direction.origin_name.clone(),
            destination: direction.destination_name.clone(),
            proposal_resource_id: proposal.resource_id.to_string(),
            proposal_data_hash: proposal.data_hash.to_string(),
            proposal_yes_votes_count: proposal.yes_votes.len(),
            proposal_no_votes_count: proposal.no_votes.len(),
            proposal_yes_votes: join_addresses(&proposal.yes_votes),
            proposal_no_votes: join_addresses(&proposal.no_votes),
            proposal_status: proposal.status.as_u8(),
            proposal_proposed_block: proposal.proposed_block.to_string(),
            origin_block_number,
        }
    }
}

/// A nonce whose audit could not complete; the sweep continues without it.
#[derive(Debug)]
pub struct NonceFailure {
    pub nonce: u64,
    pub error: AuditError,
}

/// Everything learned about one direction's sweep.
#[derive(Debug)]
pub struct ReconcileOutcome {
    pub records: Vec<DiscrepancyRecord>,
    pub failures: Vec<NonceFailure>,
    pub scanned: u64,
}

/// Verification verdict for one nonce's origin Deposit event log.
/// Exactly one variant applies per nonce with a proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventCheck {
    /// No Deposit event on the origin chain.
    NotFound,
    /// More than one event claims this nonce; cannot disambiguate.
    Ambiguous { nonce: u64, count: usize },
    ResourceMismatch {
        expected: B256,
        actual: B256,
        block_number: u64,
    },
    ChainMismatch {
        expected: u8,
        actual: u8,
        block_number: u64,
    },
    Verified { block_number: u64 },
    /// Event present but its payload would not decode.
    Unverified { block_number: u64 },
}

impl EventCheck {
    /// Block height of the single matching event, when one exists.
    pub fn block_number(&self) -> Option<u64> {
        match self {
            EventCheck::NotFound | EventCheck::Ambiguous { .. } => None,
            EventCheck::ResourceMismatch { block_number, .. }
            | EventCheck::ChainMismatch { block_number, .. }
            | EventCheck::Verified { block_number }
            | EventCheck::Unverified { block_number } => Some(*block_number),
        }
    }

    /// Free-text rendering used by the report's origin-block column.
    pub fn describe(&self) -> String {
        match self {
            EventCheck::NotFound => "Deposit not found on Origin Chain".to_string(),
            EventCheck::Ambiguous { nonce, count } => format!(
                "Multiple Deposit events ({count}) with the nonce {nonce} found on the Origin Chain"
            ),
            EventCheck::ResourceMismatch {
                expected, actual, ..
            } => format!(
                "Resource ID of Deposit event doesn't match Proposal, expected {expected} but got {actual}"
            ),
            EventCheck::ChainMismatch {
                expected, actual, ..
            } => format!(
                "destinationChainID in Deposit event doesn't match, expected {expected} got {actual}"
            ),
            EventCheck::Verified { block_number } => block_number.to_string(),
            EventCheck::Unverified { block_number } => format!("{block_number} (unverified)"),
        }
    }
}

/// Join key correlating an origin deposit to its destination proposal:
/// keccak256 of the packed handler address and raw deposit record, matching
/// the hash the destination bridge itself indexes proposals under.
pub fn derive_proposal_key(handler: Address, record: &[u8]) -> B256 {
    let mut buf = Vec::with_capacity(20 + record.len());
    buf.extend_from_slice(handler.as_slice());
    buf.extend_from_slice(record);
    keccak256(&buf)
}

/// Audits every deposit nonce of one direction under bounded concurrency.
///
/// Transport failures are isolated per nonce: a flaky remote call records a
/// `NonceFailure` and the remaining nonces proceed. Only a missing deposit
/// record inside the enumeration bound aborts the sweep, since it means the
/// enumeration itself cannot be trusted.
pub async fn reconcile(
    direction: &Direction,
    origin: &dyn LedgerReader,
    destination: &dyn LedgerReader,
) -> AuditResult<ReconcileOutcome> {
    let total = origin.deposit_count(direction.destination_chain_id).await?;

    info!(
        origin = %direction.origin_name,
        destination = %direction.destination_name,
        deposits = total,
        "Searching deposits for stalled proposals"
    );

    let width = direction.concurrency.max(1);
    let outcomes: Vec<(u64, AuditResult<Option<DiscrepancyRecord>>)> = stream::iter(0..total)
        .map(|nonce| async move {
            (nonce, audit_nonce(direction, origin, destination, nonce).await)
        })
        .buffer_unordered(width)
        .collect()
        .await;

    let mut records = Vec::new();
    let mut failures = Vec::new();
    for (nonce, outcome) in outcomes {
        match outcome {
            Ok(Some(record)) => records.push(record),
            Ok(None) => {}
            Err(error @ AuditError::DepositNotFound { .. }) => return Err(error),
            Err(error) => {
                warn!(
                    origin = %direction.origin_name,
                    destination = %direction.destination_name,
                    nonce,
                    %error,
                    "Nonce audit failed, continuing sweep"
                );
                failures.push(NonceFailure { nonce, error });
            }
        }
    }

    // Completion order is nondeterministic; reports must not be.
    records.sort_by_key(|record| record.nonce);
    failures.sort_by_key(|failure| failure.nonce);

    info!(
        origin = %direction.origin_name,
        destination = %direction.destination_name,
        scanned = total,
        flagged = records.len(),
        failed = failures.len(),
        "Direction sweep complete"
    );

    Ok(ReconcileOutcome {
        records,
        failures,
        scanned: total,
    })
}

async fn audit_nonce(
    direction: &Direction,
    origin: &dyn LedgerReader,
    destination: &dyn LedgerReader,
    nonce: u64,
) -> AuditResult<Option<DiscrepancyRecord>> {
    let record = origin
        .deposit_record(nonce, direction.destination_chain_id)
        .await?;
    if record.is_empty() {
        return Err(AuditError::DepositNotFound {
            nonce,
            destination_chain_id: direction.destination_chain_id,
        });
    }

    let key = derive_proposal_key(direction.destination_handler, &record);
    debug!(nonce, key = %key, "Fetching proposal");
    let proposal = destination
        .proposal(direction.origin_chain_id, nonce, key)
        .await?;

    if !proposal.exists() {
        debug!(nonce, "No proposal found, skipping");
        return Ok(None);
    }
    if proposal.status == ProposalStatus::Executed {
        debug!(nonce, "Proposal executed, skipping");
        return Ok(None);
    }

    let origin_block = if direction.verify_deposits {
        let events = origin
            .deposit_events(direction.destination_chain_id, nonce)
            .await?;
        let check = classify_events(&events, &proposal, direction.destination_chain_id, nonce);
        debug!(nonce, check = ?check, "Deposit event classified");

        if let Some(block) = check.block_number() {
            if block < direction.start_block {
                debug!(nonce, block, "Deposit predates audit window, skipping");
                return Ok(None);
            }
        }
        Some(check.describe())
    } else {
        None
    };

    info!(
        origin = %direction.origin_name,
        destination = %direction.destination_name,
        nonce,
        status = %proposal.status,
        "Proposal has not executed, recording"
    );

    Ok(Some(DiscrepancyRecord::new(
        direction,
        nonce,
        &proposal,
        origin_block,
    )))
}

/// Classifies one nonce's event log against its proposal. Exhaustive and
/// mutually exclusive over the {0, 1 decoded, 1 undecoded, >1} event shapes.
fn classify_events(
    events: &[DepositEvent],
    proposal: &Proposal,
    expected_chain_id: u8,
    nonce: u64,
) -> EventCheck {
    match events {
        [] => EventCheck::NotFound,
        [event] => {
            let block_number = event.block_number;
            match &event.fields {
                None => EventCheck::Unverified { block_number },
                Some(fields) => {
                    if fields.resource_id != proposal.resource_id {
                        EventCheck::ResourceMismatch {
                            expected: proposal.resource_id,
                            actual: fields.resource_id,
                            block_number,
                        }
                    } else if fields.destination_chain_id != expected_chain_id {
                        EventCheck::ChainMismatch {
                            expected: expected_chain_id,
                            actual: fields.destination_chain_id,
                            block_number,
                        }
                    } else {
                        EventCheck::Verified { block_number }
                    }
                }
            }
        }
        many => EventCheck::Ambiguous {
            nonce,
            count: many.len(),
        },
    }
}

fn join_addresses(addresses: &[Address]) -> String {
    addresses
        .iter()
        .map(|address| address.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::ledger::models::DepositFields;
    use alloy::primitives::{address, b256, Bytes, U256};
    use async_trait::async_trait;
    use std::collections::HashMap;

    const RESOURCE: B256 =
        b256!("00000000000000000000000000000000000000000000000000000000000000aa");
    const DATA_HASH: B256 =
        b256!("00000000000000000000000000000000000000000000000000000000000000bb");

    /// In-memory ledger snapshot; serves either side of a direction.
    #[derive(Default)]
    struct ScriptedLedger {
        deposit_count: u64,
        records: HashMap<u64, Bytes>,
        proposals: HashMap<B256, Proposal>,
        events: HashMap<u64, Vec<DepositEvent>>,
        fail_record_for: Option<u64>,
    }

    #[async_trait]
    impl LedgerReader for ScriptedLedger {
        async fn deposit_count(&self, _destination_chain_id: u8) -> Result<u64, TransportError> {
            Ok(self.deposit_count)
        }

        async fn deposit_record(
            &self,
            nonce: u64,
            _destination_chain_id: u8,
        ) -> Result<Bytes, TransportError> {
            if self.fail_record_for == Some(nonce) {
                return Err(TransportError::Rpc("connection reset".to_string()));
            }
            Ok(self.records.get(&nonce).cloned().unwrap_or_default())
        }

        async fn proposal(
            &self,
            _origin_chain_id: u8,
            _nonce: u64,
            key: B256,
        ) -> Result<Proposal, TransportError> {
            Ok(self.proposals.get(&key).cloned().unwrap_or_default())
        }

        async fn deposit_events(
            &self,
            _destination_chain_id: u8,
            nonce: u64,
        ) -> Result<Vec<DepositEvent>, TransportError> {
            Ok(self.events.get(&nonce).cloned().unwrap_or_default())
        }
    }

    fn direction(verify: bool) -> Direction {
        Direction {
            origin_name: "Ethereum".to_string(),
            destination_name: "Avalanche".to_string(),
            origin_chain_id: 1,
            destination_chain_id: 2,
            destination_handler: address!("6147F5a1a4eEa5C529e2F375Bd86f8F58F8Bc990"),
            start_block: 0,
            verify_deposits: verify,
            concurrency: 4,
        }
    }

    fn proposal(status: ProposalStatus, yes: usize, no: usize) -> Proposal {
        Proposal {
            resource_id: RESOURCE,
            data_hash: DATA_HASH,
            yes_votes: vec![Address::repeat_byte(0x11); yes],
            no_votes: vec![Address::repeat_byte(0x22); no],
            status,
            proposed_block: U256::from(42u64),
        }
    }

    fn record_bytes(nonce: u64) -> Bytes {
        Bytes::from(vec![nonce as u8 + 1; 64])
    }

    fn verified_event(block_number: u64) -> DepositEvent {
        DepositEvent {
            block_number,
            fields: Some(DepositFields {
                destination_chain_id: 2,
                resource_id: RESOURCE,
                nonce: 0,
            }),
        }
    }

    /// Origin with `count` deposits and a destination holding the given
    /// per-nonce proposals under the correctly derived keys.
    fn scripted_pair(
        dir: &Direction,
        count: u64,
        proposals: Vec<(u64, Proposal)>,
    ) -> (ScriptedLedger, ScriptedLedger) {
        let mut origin = ScriptedLedger {
            deposit_count: count,
            ..ScriptedLedger::default()
        };
        for nonce in 0..count {
            origin.records.insert(nonce, record_bytes(nonce));
        }

        let mut destination = ScriptedLedger::default();
        for (nonce, proposal) in proposals {
            let key = derive_proposal_key(dir.destination_handler, &record_bytes(nonce));
            destination.proposals.insert(key, proposal);
        }
        (origin, destination)
    }

    #[test]
    fn test_proposal_key_deterministic() {
        let handler = address!("dAC7Bb7Ce4fF441A235F08408e632FA1D799A147");
        let record = [0xab; 64];

        let key1 = derive_proposal_key(handler, &record);
        let key2 = derive_proposal_key(handler, &record);
        assert_eq!(key1, key2);

        // Different record or handler must produce a different key
        let key3 = derive_proposal_key(handler, &[0xac; 64]);
        assert_ne!(key1, key3);
        let key4 = derive_proposal_key(Address::repeat_byte(0x01), &record);
        assert_ne!(key1, key4);
    }

    #[test]
    fn test_classification_is_exclusive() {
        let active = proposal(ProposalStatus::Active, 1, 0);

        assert_eq!(classify_events(&[], &active, 2, 0), EventCheck::NotFound);

        let two = vec![verified_event(10), verified_event(11)];
        assert_eq!(
            classify_events(&two, &active, 2, 7),
            EventCheck::Ambiguous { nonce: 7, count: 2 }
        );

        let undecoded = DepositEvent {
            block_number: 99,
            fields: None,
        };
        assert_eq!(
            classify_events(std::slice::from_ref(&undecoded), &active, 2, 0),
            EventCheck::Unverified { block_number: 99 }
        );

        let wrong_resource = DepositEvent {
            block_number: 50,
            fields: Some(DepositFields {
                destination_chain_id: 2,
                resource_id: DATA_HASH,
                nonce: 0,
            }),
        };
        assert_eq!(
            classify_events(std::slice::from_ref(&wrong_resource), &active, 2, 0),
            EventCheck::ResourceMismatch {
                expected: RESOURCE,
                actual: DATA_HASH,
                block_number: 50,
            }
        );

        let wrong_chain = DepositEvent {
            block_number: 51,
            fields: Some(DepositFields {
                destination_chain_id: 9,
                resource_id: RESOURCE,
                nonce: 0,
            }),
        };
        assert_eq!(
            classify_events(std::slice::from_ref(&wrong_chain), &active, 2, 0),
            EventCheck::ChainMismatch {
                expected: 2,
                actual: 9,
                block_number: 51,
            }
        );

        assert_eq!(
            classify_events(&[verified_event(123)], &active, 2, 0),
            EventCheck::Verified { block_number: 123 }
        );
    }

    #[test]
    fn test_event_check_rendering() {
        assert_eq!(
            EventCheck::NotFound.describe(),
            "Deposit not found on Origin Chain"
        );
        assert_eq!(EventCheck::Verified { block_number: 1234 }.describe(), "1234");
        assert_eq!(
            EventCheck::Unverified { block_number: 1234 }.describe(),
            "1234 (unverified)"
        );
        assert!(EventCheck::Ambiguous { nonce: 3, count: 2 }
            .describe()
            .contains("Multiple Deposit events"));
    }

    #[tokio::test]
    async fn test_three_deposit_scenario() {
        // Nonce 0 executed, nonce 1 active with 2 yes / 1 no, nonce 2 has no
        // proposal yet: exactly one record, for nonce 1.
        let dir = direction(false);
        let (origin, destination) = scripted_pair(
            &dir,
            3,
            vec![
                (0, proposal(ProposalStatus::Executed, 3, 0)),
                (1, proposal(ProposalStatus::Active, 2, 1)),
            ],
        );

        let outcome = reconcile(&dir, &origin, &destination).await.unwrap();

        assert_eq!(outcome.scanned, 3);
        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.records.len(), 1);

        let record = &outcome.records[0];
        assert_eq!(record.nonce, 1);
        assert_eq!(record.origin, "Ethereum");
        assert_eq!(record.destination, "Avalanche");
        assert_eq!(record.proposal_yes_votes_count, 2);
        assert_eq!(record.proposal_no_votes_count, 1);
        assert_eq!(record.proposal_status, 1);
        assert_eq!(record.proposal_proposed_block, "42");
        assert_eq!(record.origin_block_number, None);
    }

    #[tokio::test]
    async fn test_vote_counts_match_lists() {
        let dir = direction(false);
        let (origin, destination) = scripted_pair(
            &dir,
            1,
            vec![(0, proposal(ProposalStatus::Passed, 3, 2))],
        );

        let outcome = reconcile(&dir, &origin, &destination).await.unwrap();
        let record = &outcome.records[0];

        assert_eq!(record.proposal_status, 2);
        assert_eq!(
            record.proposal_yes_votes.split(',').count(),
            record.proposal_yes_votes_count
        );
        assert_eq!(
            record.proposal_no_votes.split(',').count(),
            record.proposal_no_votes_count
        );
    }

    #[tokio::test]
    async fn test_executed_emits_nothing_in_verify_mode() {
        let dir = direction(true);
        let (mut origin, destination) = scripted_pair(
            &dir,
            1,
            vec![(0, proposal(ProposalStatus::Executed, 3, 0))],
        );
        origin.events.insert(0, vec![verified_event(10)]);

        let outcome = reconcile(&dir, &origin, &destination).await.unwrap();
        assert!(outcome.records.is_empty());
    }

    #[tokio::test]
    async fn test_verify_missing_event() {
        let dir = direction(true);
        let (origin, destination) = scripted_pair(
            &dir,
            1,
            vec![(0, proposal(ProposalStatus::Active, 1, 0))],
        );

        let outcome = reconcile(&dir, &origin, &destination).await.unwrap();
        assert_eq!(
            outcome.records[0].origin_block_number.as_deref(),
            Some("Deposit not found on Origin Chain")
        );
    }

    #[tokio::test]
    async fn test_verify_matching_event() {
        let dir = direction(true);
        let (mut origin, destination) = scripted_pair(
            &dir,
            1,
            vec![(0, proposal(ProposalStatus::Active, 1, 0))],
        );
        origin.events.insert(0, vec![verified_event(1234)]);

        let outcome = reconcile(&dir, &origin, &destination).await.unwrap();
        assert_eq!(
            outcome.records[0].origin_block_number.as_deref(),
            Some("1234")
        );
    }

    #[tokio::test]
    async fn test_start_block_skips_nonce() {
        let mut dir = direction(true);
        dir.start_block = 2000;
        let (mut origin, destination) = scripted_pair(
            &dir,
            1,
            vec![(0, proposal(ProposalStatus::Active, 1, 0))],
        );
        origin.events.insert(0, vec![verified_event(1234)]);

        let outcome = reconcile(&dir, &origin, &destination).await.unwrap();
        assert!(outcome.records.is_empty());
    }

    #[tokio::test]
    async fn test_start_block_ignores_missing_event() {
        // No event means no block height to compare: the floor must not
        // suppress the "deposit not found" finding.
        let mut dir = direction(true);
        dir.start_block = 2000;
        let (origin, destination) = scripted_pair(
            &dir,
            1,
            vec![(0, proposal(ProposalStatus::Active, 1, 0))],
        );

        let outcome = reconcile(&dir, &origin, &destination).await.unwrap();
        assert_eq!(outcome.records.len(), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_is_isolated() {
        let dir = direction(false);
        let (mut origin, destination) = scripted_pair(
            &dir,
            3,
            vec![
                (0, proposal(ProposalStatus::Active, 1, 0)),
                (2, proposal(ProposalStatus::Executed, 1, 0)),
            ],
        );
        origin.fail_record_for = Some(1);

        let outcome = reconcile(&dir, &origin, &destination).await.unwrap();

        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].nonce, 0);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].nonce, 1);
    }

    #[tokio::test]
    async fn test_empty_deposit_record_is_fatal() {
        let dir = direction(false);
        let (mut origin, destination) = scripted_pair(&dir, 2, vec![]);
        origin.records.remove(&1);

        let result = reconcile(&dir, &origin, &destination).await;
        assert!(matches!(
            result,
            Err(AuditError::DepositNotFound { nonce: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let dir = direction(true);
        let (mut origin, destination) = scripted_pair(
            &dir,
            4,
            vec![
                (0, proposal(ProposalStatus::Active, 2, 1)),
                (1, proposal(ProposalStatus::Executed, 3, 0)),
                (2, proposal(ProposalStatus::Cancelled, 0, 2)),
            ],
        );
        origin.events.insert(0, vec![verified_event(100)]);
        origin.events.insert(2, vec![verified_event(200)]);

        let first = reconcile(&dir, &origin, &destination).await.unwrap();
        let second = reconcile(&dir, &origin, &destination).await.unwrap();

        let first_json = serde_json::to_string(&first.records).unwrap();
        let second_json = serde_json::to_string(&second.records).unwrap();
        assert_eq!(first_json, second_json);
    }
}
