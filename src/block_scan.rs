//! # Block Ingestion
//!
//! Per-block transaction heuristics. This pass is intentionally cheap
//! and over-inclusive: it flags anything that looks like value movement
//! worth a second look, and leaves confirmation (risk scoring) to the
//! detection handler downstream.
//!
//! A transaction is flagged when any of the following holds:
//!
//! - transferred value exceeds the configured threshold
//! - calldata begins with a known risky method selector
//! - calldata is empty while value is nonzero and the recipient is a
//!   contract

use crate::error::MonitorError;
use crate::gateway::ChainClient;
use crate::types::{AlertKind, DetectionEvent, DetectionSource};
use ethers::types::{Block, Transaction, U256};
use ethers::utils::keccak256;
use once_cell::sync::Lazy;

/// Method selectors that move or approve assets on someone's behalf.
pub static RISKY_SELECTORS: Lazy<Vec<(&'static str, [u8; 4])>> = Lazy::new(|| {
    [
        "transferFrom(address,address,uint256)",
        "safeTransferFrom(address,address,uint256)",
        "setApprovalForAll(address,bool)",
    ]
    .iter()
    .map(|sig| {
        let hash = keccak256(sig.as_bytes());
        let name = sig.split('(').next().unwrap_or(sig);
        (name, [hash[0], hash[1], hash[2], hash[3]])
    })
    .collect()
});

/// Convert a whole-unit threshold into wei for comparison against
/// `tx.value`.
pub fn value_threshold_wei(units: u64) -> U256 {
    U256::from(units) * U256::exp10(18)
}

/// Reasons a single transaction trips the heuristics. Pure; the
/// contract-recipient fact is supplied by the caller.
pub fn classify_transaction(
    tx: &Transaction,
    recipient_is_contract: bool,
    threshold_wei: U256,
) -> Vec<String> {
    let mut reasons = Vec::new();

    if tx.value > threshold_wei {
        reasons.push("Large value transfer detected".to_string());
    }

    if tx.input.len() >= 4 {
        let selector = &tx.input[..4];
        for (name, bytes) in RISKY_SELECTORS.iter() {
            if selector == bytes {
                reasons.push(format!("Risky method call: {}", name));
                break;
            }
        }
    }

    if tx.input.is_empty() && !tx.value.is_zero() && recipient_is_contract {
        reasons.push("Bare value transfer to contract".to_string());
    }

    reasons
}

/// Whether `classify_transaction` would need a `get_code` lookup for
/// this transaction. Keeps the scan from paying an RPC call per
/// transaction when the heuristic cannot fire anyway.
fn needs_code_lookup(tx: &Transaction) -> bool {
    tx.input.is_empty() && !tx.value.is_zero() && tx.to.is_some()
}

/// Scan one fetched block, emitting a detection per flagged transaction.
pub async fn scan_block(
    client: &dyn ChainClient,
    block: &Block<Transaction>,
    threshold_wei: U256,
) -> Result<Vec<DetectionEvent>, MonitorError> {
    let block_number = block.number.map(|n| n.as_u64()).unwrap_or_default();
    let mut detections = Vec::new();

    for tx in &block.transactions {
        let Some(to) = tx.to else {
            // Contract creation; covered by the event-log sources.
            continue;
        };

        let recipient_is_contract = if needs_code_lookup(tx) {
            !client.code_at(to).await?.is_empty()
        } else {
            false
        };

        for reason in classify_transaction(tx, recipient_is_contract, threshold_wei) {
            detections.push(DetectionEvent {
                source: DetectionSource::BlockScan,
                kind: AlertKind::SuspiciousTransaction,
                target_address: to,
                evidence: reason,
                tx_hash: Some(tx.hash),
                block_number,
            });
        }
    }

    Ok(detections)
}
