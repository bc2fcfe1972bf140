use tracing::info;

use crate::config::AuditConfig;
use crate::error::{AuditResult, ReportError};
use crate::ledger::evm::EvmLedgerReader;
use crate::reconciler::{reconcile, Direction, DiscrepancyRecord, ReconcileOutcome};

const CSV_HEADER: [&str; 10] = [
    "Origin",
    "Destination",
    "Resource ID",
    "Data Hash",
    "Yes Vote Count",
    "No Vote Count",
    "Yes Votes",
    "No Votes",
    "Status",
    "Proposed Block",
];
const CSV_VERIFY_COLUMN: &str = "Deposit Block Number";

/// Runs both directions of the audit concurrently and writes the merged
/// report files. Discrepancies are data, not failure: a completed sweep with
/// findings still returns Ok.
pub async fn run_audit(config: &AuditConfig) -> AuditResult<()> {
    let reader_a = EvmLedgerReader::new(
        config.chain_a.rpc_url.clone(),
        config.chain_a.bridge_address,
    );
    let reader_b = EvmLedgerReader::new(
        config.chain_b.rpc_url.clone(),
        config.chain_b.bridge_address,
    );

    let forward = direction(config, false);
    let backward = direction(config, true);

    let (a_to_b, b_to_a) = tokio::try_join!(
        reconcile(&forward, &reader_a, &reader_b),
        reconcile(&backward, &reader_b, &reader_a),
    )?;

    let failed = a_to_b.failures.len() + b_to_a.failures.len();
    let records = assemble(a_to_b, b_to_a);

    write_json(&records, &config.json_report_path).await?;
    write_csv(&records, config.verify_deposits, &config.csv_report_path).await?;

    info!(
        flagged = records.len(),
        failed,
        json = %config.json_report_path,
        csv = %config.csv_report_path,
        "Reports written"
    );

    Ok(())
}

/// Direction descriptor for one half of the pair; `reverse` swaps the roles.
fn direction(config: &AuditConfig, reverse: bool) -> Direction {
    let (origin, destination) = if reverse {
        (&config.chain_b, &config.chain_a)
    } else {
        (&config.chain_a, &config.chain_b)
    };

    Direction {
        origin_name: origin.name.clone(),
        destination_name: destination.name.clone(),
        origin_chain_id: origin.chain_id,
        destination_chain_id: destination.chain_id,
        destination_handler: destination.handler_address,
        start_block: origin.start_block,
        verify_deposits: config.verify_deposits,
        concurrency: config.concurrency,
    }
}

/// Merges the two directional result sets in fixed order: A->B before B->A.
fn assemble(a_to_b: ReconcileOutcome, b_to_a: ReconcileOutcome) -> Vec<DiscrepancyRecord> {
    let mut records = a_to_b.records;
    records.extend(b_to_a.records);
    records
}

async fn write_json(records: &[DiscrepancyRecord], path: &str) -> Result<(), ReportError> {
    let json = serde_json::to_string(records)?;
    tokio::fs::write(path, json)
        .await
        .map_err(|source| ReportError::Io {
            path: path.to_string(),
            source,
        })
}

async fn write_csv(
    records: &[DiscrepancyRecord],
    verify: bool,
    path: &str,
) -> Result<(), ReportError> {
    let rendered = render_csv(records, verify)?;
    tokio::fs::write(path, rendered)
        .await
        .map_err(|source| ReportError::Io {
            path: path.to_string(),
            source,
        })
}

fn render_csv(records: &[DiscrepancyRecord], verify: bool) -> Result<Vec<u8>, ReportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header: Vec<&str> = CSV_HEADER.to_vec();
    if verify {
        header.push(CSV_VERIFY_COLUMN);
    }
    writer.write_record(&header)?;

    for record in records {
        let mut row = vec![
            record.origin.clone(),
            record.destination.clone(),
            record.proposal_resource_id.clone(),
            record.proposal_data_hash.clone(),
            record.proposal_yes_votes_count.to_string(),
            record.proposal_no_votes_count.to_string(),
            record.proposal_yes_votes.clone(),
            record.proposal_no_votes.clone(),
            record.proposal_status.to_string(),
            record.proposal_proposed_block.clone(),
        ];
        if verify {
            row.push(record.origin_block_number.clone().unwrap_or_default());
        }
        writer.write_record(&row)?;
    }

    writer
        .into_inner()
        .map_err(|error| ReportError::Csv(error.into_error().into()))
}
