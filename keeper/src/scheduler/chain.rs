use std::sync::Arc;

use async_trait::async_trait;
use ethers::abi::{Function, Token};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionRequest, U256};

use crate::contracts;
use crate::error::KeeperError;
use crate::events::{Proposal, ProposalType};
use crate::provider::KeeperProvider;

/// Decimals and symbol of a market's shares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketAsset {
    pub decimals: u8,
    pub symbol: String,
}

/// Contract reads the scheduler depends on.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Proposals of `account` the previewer still considers pending.
    async fn pending_proposals(&self, account: Address) -> Result<Vec<Proposal>, KeeperError>;

    async fn market_asset(&self, market: Address) -> Result<MarketAsset, KeeperError>;
}

/// Reads the previewer and markets through `eth_call`.
pub struct ProviderChainReader {
    provider: Arc<dyn KeeperProvider>,
    previewer: Address,
}

impl ProviderChainReader {
    pub fn new(provider: Arc<dyn KeeperProvider>, previewer: Address) -> Self {
        Self {
            provider,
            previewer,
        }
    }

    async fn read(
        &self,
        address: Address,
        function: &Function,
        args: &[Token],
    ) -> Result<Vec<Token>, KeeperError> {
        let data = function
            .encode_input(args)
            .map_err(|err| KeeperError::Encoding {
                function: function.name.clone(),
                reason: err.to_string(),
            })?;
        let tx: TypedTransaction = TransactionRequest::new()
            .to(address)
            .data(Bytes::from(data))
            .into();
        let output = self.provider.call(&tx).await?;
        function
            .decode_output(&output)
            .map_err(|err| KeeperError::Malformed(format!("{}: {err}", function.name)))
    }
}

#[async_trait]
impl ChainReader for ProviderChainReader {
    async fn pending_proposals(&self, account: Address) -> Result<Vec<Proposal>, KeeperError> {
        let output = self
            .read(
                self.previewer,
                &contracts::pending_proposals(),
                &[Token::Address(account)],
            )
            .await?;
        let Some(Token::Array(pending)) = output.into_iter().next() else {
            return Err(KeeperError::Malformed(
                "pendingProposals: expected an array".to_owned(),
            ));
        };
        pending
            .into_iter()
            .map(|entry| pending_proposal(account, entry))
            .collect()
    }

    async fn market_asset(&self, market: Address) -> Result<MarketAsset, KeeperError> {
        let (decimals_fn, symbol_fn) = (contracts::decimals(), contracts::symbol());
        let (decimals, symbol) = futures::try_join!(
            self.read(market, &decimals_fn, &[]),
            self.read(market, &symbol_fn, &[]),
        )?;
        let decimals = match decimals.as_slice() {
            [Token::Uint(decimals)] => u8::try_from(*decimals)
                .map_err(|_| KeeperError::Malformed(format!("decimals out of range: {decimals}")))?,
            _ => return Err(KeeperError::Malformed("decimals: expected uint8".to_owned())),
        };
        let symbol = match symbol.as_slice() {
            [Token::String(symbol)] => symbol.clone(),
            _ => return Err(KeeperError::Malformed("symbol: expected string".to_owned())),
        };
        Ok(MarketAsset { decimals, symbol })
    }
}

/// Maps a `(nonce, proposal, unlock)` entry of the previewer to a [`Proposal`].
fn pending_proposal(account: Address, entry: Token) -> Result<Proposal, KeeperError> {
    let malformed = |what: &str| KeeperError::Malformed(format!("pendingProposals: {what}"));
    let Token::Tuple(fields) = entry else {
        return Err(malformed("expected a tuple"));
    };
    let [Token::Uint(nonce), Token::Tuple(proposal), Token::Uint(unlock)] = fields.as_slice() else {
        return Err(malformed("unexpected entry layout"));
    };
    let [Token::Uint(amount), Token::Address(market), Token::Bytes(data), Token::Uint(proposal_type), Token::Uint(timestamp)] =
        proposal.as_slice()
    else {
        return Err(malformed("unexpected proposal layout"));
    };
    let to_u64 = |value: &U256, field: &str| {
        u64::try_from(*value).map_err(|_| malformed(&format!("{field} out of range: {value}")))
    };
    let proposal_type = u8::try_from(*proposal_type)
        .map_err(|_| malformed(&format!("proposal type out of range: {proposal_type}")))
        .and_then(|value| ProposalType::try_from(value).map_err(KeeperError::Malformed))?;
    Ok(Proposal::new(
        account,
        *market,
        *amount,
        Bytes::from(data.clone()),
        to_u64(nonce, "nonce")?,
        proposal_type,
        to_u64(unlock, "unlock")?,
        to_u64(timestamp, "timestamp")?,
    ))
}
