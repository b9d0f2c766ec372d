//! Operator health view: RPC connectivity and the relayer account's funds.
//! Failures are reported in the body, never as an error status.

use std::sync::Arc;
use std::time::Instant;

use alloy::primitives::utils::format_ether;
use alloy::primitives::Address;
use serde::Serialize;
use tracing::warn;

use crate::ledger::LedgerGateway;

#[derive(Debug, Clone, Default, Serialize)]
pub struct RpcHealth {
    pub ok: bool,
    pub chain_id: Option<u64>,
    pub block_number: Option<u64>,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SignerHealth {
    pub configured: bool,
    pub address: Option<Address>,
    /// Wei, as a decimal string
    pub balance: Option<String>,
    pub balance_eth: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitorReport {
    pub rpc: RpcHealth,
    pub signer: SignerHealth,
    pub contract_address: Address,
}

#[derive(Clone)]
pub struct LedgerMonitor {
    ledger: Arc<dyn LedgerGateway>,
    signer: Option<Address>,
}

impl LedgerMonitor {
    pub fn new(ledger: Arc<dyn LedgerGateway>, signer: Option<Address>) -> Self {
        Self { ledger, signer }
    }

    pub async fn report(&self) -> MonitorReport {
        let started = Instant::now();
        let rpc = match self.ledger.chain_status().await {
            Ok(status) => RpcHealth {
                ok: true,
                chain_id: Some(status.chain_id),
                block_number: Some(status.block_number),
                latency_ms: Some(started.elapsed().as_millis() as u64),
                error: None,
            },
            Err(e) => {
                warn!("Monitor: RPC check failed: {}", e);
                RpcHealth {
                    error: Some(e.to_string()),
                    ..RpcHealth::default()
                }
            }
        };

        let mut signer = SignerHealth {
            configured: self.signer.is_some(),
            address: self.signer,
            ..SignerHealth::default()
        };
        if let Some(address) = self.signer {
            match self.ledger.balance(address).await {
                Ok(wei) => {
                    signer.balance = Some(wei.to_string());
                    signer.balance_eth = Some(format_ether(wei));
                }
                Err(e) => signer.error = Some(e.to_string()),
            }
        }

        MonitorReport {
            rpc,
            signer,
            contract_address: self.ledger.contract_address(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::memory::{InMemoryLedger, MEMORY_CHAIN_ID};

    #[tokio::test]
    async fn reports_chain_and_signer() {
        let contract = Address::repeat_byte(0x11);
        let relayer = Address::repeat_byte(0x22);
        let ledger = Arc::new(InMemoryLedger::new(contract, Some(relayer)));
        let report = LedgerMonitor::new(ledger, Some(relayer)).report().await;

        assert!(report.rpc.ok);
        assert_eq!(report.rpc.chain_id, Some(MEMORY_CHAIN_ID));
        assert!(report.signer.configured);
        assert_eq!(report.signer.address, Some(relayer));
        assert_eq!(report.signer.balance.as_deref(), Some("0"));
        assert_eq!(report.contract_address, contract);
    }

    #[tokio::test]
    async fn outages_are_reported_not_raised() {
        let ledger = Arc::new(InMemoryLedger::new(Address::ZERO, None));
        ledger.fail_reads(true);
        let report = LedgerMonitor::new(ledger, None).report().await;

        assert!(!report.rpc.ok);
        assert!(report.rpc.error.is_some());
        assert!(report.rpc.chain_id.is_none());
        assert!(!report.signer.configured);
        assert!(report.signer.balance.is_none());
    }
}
