use std::fmt;
use std::str::FromStr;

use alloy::primitives::Address;
use config::ConfigError;
use url::Url;

/// One side of the audited bridge pair.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub name: String,
    pub rpc_url: Url,
    pub bridge_address: Address,
    pub chain_id: u8,
    /// Handler contract used as hash-join input when this chain is the
    /// destination of a transfer.
    pub handler_address: Address,
    /// Deposits whose event block is below this height are outside the audit
    /// window when this chain is the origin of a transfer.
    pub start_block: u64,
}

/// Full audit configuration, loaded once at startup and passed down by value.
#[derive(Debug, Clone)]
pub struct AuditConfig {
    pub chain_a: ChainConfig,
    pub chain_b: ChainConfig,
    /// Cross-check each flagged proposal against the origin Deposit event log.
    pub verify_deposits: bool,
    /// Simultaneous in-flight nonce audits per direction.
    pub concurrency: usize,
    pub json_report_path: String,
    pub csv_report_path: String,
}

struct ChainDefaults {
    name: &'static str,
    chain_id: u8,
    bridge_address: &'static str,
    handler_address: &'static str,
}

// The Ethereum <-> Avalanche mainnet bridge deployment.
const CHAIN_A_DEFAULTS: ChainDefaults = ChainDefaults {
    name: "Ethereum",
    chain_id: 1,
    bridge_address: "0x96B845aBE346b49135B865E5CeDD735FC448C3aD",
    handler_address: "0xdAC7Bb7Ce4fF441A235F08408e632FA1D799A147",
};

const CHAIN_B_DEFAULTS: ChainDefaults = ChainDefaults {
    name: "Avalanche",
    chain_id: 2,
    bridge_address: "0x6460777cDa22AD67bBb97536FFC446D65761197E",
    handler_address: "0x6147F5a1a4eEa5C529e2F375Bd86f8F58F8Bc990",
};

impl AuditConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            chain_a: ChainConfig::from_env("CHAIN_A", &CHAIN_A_DEFAULTS)?,
            chain_b: ChainConfig::from_env("CHAIN_B", &CHAIN_B_DEFAULTS)?,
            verify_deposits: bool_var("VERIFY_DEPOSITS", true)?,
            concurrency: parsed_var("AUDIT_CONCURRENCY", 4)?,
            json_report_path: std::env::var("REPORT_JSON_PATH")
                .unwrap_or_else(|_| "results.json".to_string()),
            csv_report_path: std::env::var("REPORT_CSV_PATH")
                .unwrap_or_else(|_| "results.csv".to_string()),
        })
    }
}

impl ChainConfig {
    fn from_env(prefix: &str, defaults: &ChainDefaults) -> Result<Self, ConfigError> {
        let raw_url = std::env::var(format!("{prefix}_RPC_URL"))
            .map_err(|_| ConfigError::Message(format!("{prefix}_RPC_URL must be set")))?;
        let rpc_url = raw_url
            .parse::<Url>()
            .map_err(|e| ConfigError::Message(format!("{prefix}_RPC_URL is not a valid URL: {e}")))?;

        Ok(Self {
            name: std::env::var(format!("{prefix}_NAME"))
                .unwrap_or_else(|_| defaults.name.to_string()),
            rpc_url,
            bridge_address: address_var(&format!("{prefix}_BRIDGE_ADDRESS"), defaults.bridge_address)?,
            chain_id: parsed_var(&format!("{prefix}_CHAIN_ID"), defaults.chain_id)?,
            handler_address: address_var(
                &format!("{prefix}_HANDLER_ADDRESS"),
                defaults.handler_address,
            )?,
            start_block: parsed_var(&format!("{prefix}_START_BLOCK"), 0)?,
        })
    }
}

fn address_var(key: &str, default: &str) -> Result<Address, ConfigError> {
    let raw = std::env::var(key).unwrap_or_else(|_| default.to_string());
    raw.parse()
        .map_err(|e| ConfigError::Message(format!("{key} is not a valid address: {e}")))
}

fn parsed_var<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| ConfigError::Message(format!("{key} is invalid: {e}"))),
        Err(_) => Ok(default),
    }
}

fn bool_var(key: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            other => Err(ConfigError::Message(format!(
                "{key} must be a boolean, got {other}"
            ))),
        },
        Err(_) => Ok(default),
    }
}
