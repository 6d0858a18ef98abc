use std::collections::BTreeMap;

use ethers::abi::RawLog;
use ethers::contract::EthEvent;
use ethers::types::{Address, Bytes, H256};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

pub use abi::{LegacyProposedFilter, ProposedFilter};
pub use message::{Proposal, ProposalType, Withdraw};

use crate::error::KeeperError;
use crate::keeper::{ErrorReporter, ReportContext, Severity};

mod abi;
mod message;

#[cfg(test)]
mod tests;

/// Block notification delivered by the webhook feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockPayload {
    #[serde(default)]
    pub block_timestamp: Option<u64>,
    #[serde(default)]
    pub logs: Vec<BlockLog>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockLog {
    pub topics: Vec<H256>,
    pub data: Bytes,
    pub contract_address: Address,
}

impl BlockLog {
    fn raw(&self) -> RawLog {
        RawLog {
            topics: self.topics.clone(),
            data: self.data.to_vec(),
        }
    }
}

/// Account events the keeper acts on, one variant per event signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountEvent {
    Proposed(ProposedFilter),
    LegacyProposed(LegacyProposedFilter),
}

impl AccountEvent {
    /// Decodes `log` by its first topic; `None` for unrelated events.
    pub fn decode(log: &BlockLog) -> Option<Result<Self, KeeperError>> {
        let signature = *log.topics.first()?;
        let event = if signature == ProposedFilter::signature() {
            ProposedFilter::decode_log(&log.raw()).map(AccountEvent::Proposed)
        } else if signature == LegacyProposedFilter::signature() {
            LegacyProposedFilter::decode_log(&log.raw()).map(AccountEvent::LegacyProposed)
        } else {
            return None;
        };
        Some(event.map_err(|err| KeeperError::Malformed(format!("{signature:?}: {err}"))))
    }
}

/// Messages decoded from one block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedBlock {
    /// Proposals per account, in ascending nonce order.
    pub proposals: BTreeMap<Address, Vec<Proposal>>,
    pub withdraws: Vec<Withdraw>,
}

impl DecodedBlock {
    pub fn is_empty(&self) -> bool {
        self.proposals.is_empty() && self.withdraws.is_empty()
    }
}

/// Turns a block notification into proposals and legacy withdraws.
///
/// Malformed entries are reported and dropped without failing the batch.
#[instrument(skip_all, fields(logs = payload.logs.len()))]
pub fn decode_block(payload: &BlockPayload, reporter: &dyn ErrorReporter) -> DecodedBlock {
    let mut block = DecodedBlock::default();
    if payload.logs.is_empty() {
        debug!("Ignoring block without logs");
        return block;
    }
    let timestamp = payload
        .block_timestamp
        .unwrap_or_else(|| u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default());

    for log in &payload.logs {
        let decoded = match AccountEvent::decode(log) {
            None => continue,
            Some(event) => event.and_then(|event| match event {
                AccountEvent::Proposed(event) => {
                    proposal(event, timestamp).map(|proposal| {
                        block
                            .proposals
                            .entry(proposal.account)
                            .or_default()
                            .push(proposal)
                    })
                }
                AccountEvent::LegacyProposed(event) => withdraw(event, timestamp)
                    .map(|withdraw| block.withdraws.push(withdraw)),
            }),
        };
        if let Err(err) = decoded {
            reporter.report(
                Severity::Error,
                &err,
                &ReportContext::new("alchemy.block", None)
                    .with("contract", format!("{:?}", log.contract_address)),
            );
        }
    }

    for proposals in block.proposals.values_mut() {
        proposals.sort_by_key(|proposal| proposal.nonce);
    }
    block
}

fn proposal(event: ProposedFilter, timestamp: u64) -> Result<Proposal, KeeperError> {
    let proposal_type =
        ProposalType::try_from(event.proposal_type).map_err(KeeperError::Malformed)?;
    Ok(Proposal::new(
        event.account,
        event.market,
        event.amount,
        event.data,
        to_u64(event.nonce, "nonce")?,
        proposal_type,
        to_u64(event.unlock, "unlock")?,
        timestamp,
    ))
}

fn withdraw(event: LegacyProposedFilter, timestamp: u64) -> Result<Withdraw, KeeperError> {
    Ok(Withdraw::new(
        event.account,
        event.market,
        event.receiver,
        event.amount,
        to_u64(event.unlock, "unlock")?,
        timestamp,
    ))
}

fn to_u64(value: ethers::types::U256, field: &str) -> Result<u64, KeeperError> {
    u64::try_from(value).map_err(|_| KeeperError::Malformed(format!("{field} out of range: {value}")))
}
