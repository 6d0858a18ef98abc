use ethers::contract::EthEvent;
use ethers::types::{Address, Bytes, U256};

/// `Proposed` as emitted by the proposal manager.
#[derive(Clone, Debug, Default, Eq, PartialEq, EthEvent)]
#[ethevent(
    name = "Proposed",
    abi = "Proposed(address,uint256,address,uint8,uint256,bytes,uint256)"
)]
pub struct ProposedFilter {
    #[ethevent(indexed)]
    pub account: Address,
    #[ethevent(indexed)]
    pub nonce: U256,
    #[ethevent(indexed)]
    pub market: Address,
    pub proposal_type: u8,
    pub amount: U256,
    pub data: Bytes,
    pub unlock: U256,
}

/// `Proposed` as emitted by the legacy plugin, which only proposed withdrawals.
#[derive(Clone, Debug, Default, Eq, PartialEq, EthEvent)]
#[ethevent(
    name = "Proposed",
    abi = "Proposed(address,address,address,uint256,uint256)"
)]
pub struct LegacyProposedFilter {
    #[ethevent(indexed)]
    pub account: Address,
    #[ethevent(indexed)]
    pub market: Address,
    #[ethevent(indexed)]
    pub receiver: Address,
    pub amount: U256,
    pub unlock: U256,
}
