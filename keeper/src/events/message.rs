use ethers::types::{Address, Bytes, U256};
use ethers::utils::to_checksum;
use serde::{Deserialize, Serialize};

/// Action of a proposal, as encoded on chain.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::FromRepr,
)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum ProposalType {
    None = 0,
    BorrowAtMaturity = 1,
    CrossRepayAtMaturity = 2,
    Redeem = 3,
    RepayAtMaturity = 4,
    RollDebt = 5,
    Swap = 6,
    Withdraw = 7,
}

impl TryFrom<u8> for ProposalType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_repr(value).ok_or_else(|| format!("unknown proposal type {value}"))
    }
}

impl From<ProposalType> for u8 {
    fn from(value: ProposalType) -> Self {
        value as u8
    }
}

fn message_id(account: Address, market: Address, timestamp: u64) -> String {
    format!(
        "{}:{}:{timestamp}",
        to_checksum(&account, None),
        to_checksum(&market, None)
    )
}

/// A time-locked proposal of an account, executable from `unlock`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    pub id: String,
    pub account: Address,
    pub market: Address,
    pub amount: U256,
    /// ABI encoded arguments of the action, e.g. the receiver of a withdrawal.
    pub data: Bytes,
    pub nonce: u64,
    pub proposal_type: ProposalType,
    pub unlock: u64,
    pub timestamp: u64,
    /// Span of the delivery that scheduled the message. Not persisted, so
    /// redelivered events map to the same store member.
    #[serde(skip)]
    pub trace_parent: Option<tracing::Id>,
}

impl Proposal {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        account: Address,
        market: Address,
        amount: U256,
        data: Bytes,
        nonce: u64,
        proposal_type: ProposalType,
        unlock: u64,
        timestamp: u64,
    ) -> Self {
        Self {
            id: message_id(account, market, timestamp),
            account,
            market,
            amount,
            data,
            nonce,
            proposal_type,
            unlock,
            timestamp,
            trace_parent: None,
        }
    }

    /// Orders proposals by unlock time, then by nonce.
    pub fn score(&self) -> f64 {
        self.unlock.saturating_add(self.nonce) as f64
    }
}

/// A withdrawal proposed through the legacy plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Withdraw {
    pub id: String,
    pub account: Address,
    pub market: Address,
    pub receiver: Address,
    pub amount: U256,
    pub unlock: u64,
    pub timestamp: u64,
    /// Span of the delivery that scheduled the message. Not persisted, so
    /// redelivered events map to the same store member.
    #[serde(skip)]
    pub trace_parent: Option<tracing::Id>,
}

impl Withdraw {
    pub fn new(
        account: Address,
        market: Address,
        receiver: Address,
        amount: U256,
        unlock: u64,
        timestamp: u64,
    ) -> Self {
        Self {
            id: message_id(account, market, timestamp),
            account,
            market,
            receiver,
            amount,
            unlock,
            timestamp,
            trace_parent: None,
        }
    }

    pub fn score(&self) -> f64 {
        self.unlock as f64
    }
}
