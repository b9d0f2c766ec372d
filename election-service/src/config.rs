//! Runtime configuration from environment variables

use std::time::Duration;

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use anyhow::{anyhow, bail, Context, Result};

use crate::database::constants::DEFAULT_DB_PATH;
use crate::reconciler::{DEFAULT_INTERVAL_MS, MIN_INTERVAL_MS};
use crate::utils::env_parse;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_LEDGER_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_AUTHORIZATION_TTL_SECS: u64 = 300;
pub const MAX_AUTHORIZATION_TTL_SECS: u64 = 3_600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerMode {
    Evm,
    Memory,
}

impl std::str::FromStr for LedgerMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "evm" => Ok(LedgerMode::Evm),
            "memory" => Ok(LedgerMode::Memory),
            other => Err(anyhow!("unknown LEDGER_MODE '{}', expected evm or memory", other)),
        }
    }
}

pub struct Config {
    pub db_path: String,
    pub port: u16,
    pub ledger_mode: LedgerMode,
    pub rpc_url: Option<String>,
    pub contract_address: Address,
    pub signer: Option<PrivateKeySigner>,
    pub ledger_timeout: Duration,
    pub auto_close_enabled: bool,
    pub auto_close_interval: Duration,
    pub admin_token: Option<String>,
    pub authorization_ttl_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let ledger_mode = match std::env::var("LEDGER_MODE") {
            Ok(raw) => raw.parse()?,
            Err(_) => LedgerMode::Evm,
        };

        let contract_address = match non_empty_var("VOTING_CONTRACT_ADDRESS") {
            Some(raw) => raw
                .parse::<Address>()
                .with_context(|| format!("invalid VOTING_CONTRACT_ADDRESS '{}'", raw))?,
            None if ledger_mode == LedgerMode::Memory => Address::ZERO,
            None => bail!("VOTING_CONTRACT_ADDRESS is required when LEDGER_MODE=evm"),
        };

        let rpc_url = non_empty_var("RPC_URL");
        if ledger_mode == LedgerMode::Evm && rpc_url.is_none() {
            bail!("RPC_URL is required when LEDGER_MODE=evm");
        }

        let signer = non_empty_var("SIGNER_PRIVATE_KEY")
            .map(|raw| {
                raw.parse::<PrivateKeySigner>()
                    .map_err(|e| anyhow!("invalid SIGNER_PRIVATE_KEY: {}", e))
            })
            .transpose()?;

        let interval_ms = env_parse("AUTO_CLOSE_INTERVAL_MS", DEFAULT_INTERVAL_MS).max(MIN_INTERVAL_MS);

        let authorization_ttl_secs =
            env_parse("VOTE_AUTHORIZATION_TTL_SECS", DEFAULT_AUTHORIZATION_TTL_SECS);
        if authorization_ttl_secs == 0 || authorization_ttl_secs > MAX_AUTHORIZATION_TTL_SECS {
            bail!(
                "VOTE_AUTHORIZATION_TTL_SECS must be between 1 and {}, got {}",
                MAX_AUTHORIZATION_TTL_SECS,
                authorization_ttl_secs
            );
        }

        Ok(Self {
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string()),
            port: env_parse("PORT", DEFAULT_PORT),
            ledger_mode,
            rpc_url,
            contract_address,
            signer,
            ledger_timeout: Duration::from_millis(env_parse(
                "LEDGER_TIMEOUT_MS",
                DEFAULT_LEDGER_TIMEOUT_MS,
            )),
            auto_close_enabled: env_parse("AUTO_CLOSE_ENABLED", true),
            auto_close_interval: Duration::from_millis(interval_ms),
            admin_token: non_empty_var("ADMIN_API_TOKEN"),
            authorization_ttl_secs,
        })
    }

    /// The reconciler needs a way to send `closeElection`: a signer on a real
    /// chain, or the in-process ledger.
    pub fn auto_close_active(&self) -> bool {
        self.auto_close_enabled
            && (self.signer.is_some() || self.ledger_mode == LedgerMode::Memory)
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const KEYS: &[&str] = &[
        "LEDGER_MODE",
        "VOTING_CONTRACT_ADDRESS",
        "RPC_URL",
        "SIGNER_PRIVATE_KEY",
        "AUTO_CLOSE_INTERVAL_MS",
        "AUTO_CLOSE_ENABLED",
        "ADMIN_API_TOKEN",
        "PORT",
        "VOTE_AUTHORIZATION_TTL_SECS",
    ];

    fn clear_env() {
        for key in KEYS {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn memory_mode_needs_no_chain_settings() {
        clear_env();
        std::env::set_var("LEDGER_MODE", "memory");
        std::env::set_var("AUTO_CLOSE_INTERVAL_MS", "500");

        let config = Config::from_env().unwrap();
        assert_eq!(config.ledger_mode, LedgerMode::Memory);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.auto_close_interval, Duration::from_millis(MIN_INTERVAL_MS));
        assert!(config.auto_close_enabled);
        assert!(config.signer.is_none());
        assert_eq!(config.authorization_ttl_secs, DEFAULT_AUTHORIZATION_TTL_SECS);
        clear_env();
    }

    #[test]
    #[serial]
    fn evm_mode_requires_contract_and_rpc() {
        clear_env();
        assert!(Config::from_env().is_err());

        std::env::set_var("VOTING_CONTRACT_ADDRESS", "0x5fbdb2315678afecb367f032d93f642f64180aa3");
        assert!(Config::from_env().is_err());

        std::env::set_var("RPC_URL", "http://127.0.0.1:8545");
        std::env::set_var(
            "SIGNER_PRIVATE_KEY",
            "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
        );
        let config = Config::from_env().unwrap();
        assert_eq!(config.ledger_mode, LedgerMode::Evm);
        assert!(config.signer.is_some());
        assert!(config.auto_close_active());
        clear_env();
    }

    #[test]
    #[serial]
    fn rejects_unknown_ledger_mode() {
        clear_env();
        std::env::set_var("LEDGER_MODE", "ganache");
        assert!(Config::from_env().is_err());
        clear_env();
    }

    #[test]
    #[serial]
    fn authorization_ttl_must_stay_short() {
        clear_env();
        std::env::set_var("LEDGER_MODE", "memory");

        std::env::set_var("VOTE_AUTHORIZATION_TTL_SECS", "0");
        assert!(Config::from_env().is_err());

        std::env::set_var("VOTE_AUTHORIZATION_TTL_SECS", "18446744073709551615");
        assert!(Config::from_env().is_err());

        std::env::set_var("VOTE_AUTHORIZATION_TTL_SECS", "600");
        assert_eq!(Config::from_env().unwrap().authorization_ttl_secs, 600);
        clear_env();
    }

    #[test]
    #[serial]
    fn auto_close_needs_a_writer_on_chain() {
        clear_env();
        std::env::set_var("VOTING_CONTRACT_ADDRESS", "0x5fbdb2315678afecb367f032d93f642f64180aa3");
        std::env::set_var("RPC_URL", "http://127.0.0.1:8545");
        let config = Config::from_env().unwrap();
        assert!(config.auto_close_enabled);
        assert!(!config.auto_close_active());

        std::env::set_var("LEDGER_MODE", "memory");
        assert!(Config::from_env().unwrap().auto_close_active());

        std::env::set_var("AUTO_CLOSE_ENABLED", "false");
        assert!(!Config::from_env().unwrap().auto_close_active());
        clear_env();
    }
}
