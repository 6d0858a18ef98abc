use async_trait::async_trait;
use ethers::types::{Address, U256};
use ethers::utils::format_units;
use tracing::info;

use super::chain::MarketAsset;

/// Push notification addressed to the owner of an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub user_id: Address,
    pub heading: String,
    pub contents: String,
}

impl Notification {
    /// `1.5 USDC sent to 0x1234...abcd`
    pub fn withdraw_completed(
        account: Address,
        amount: U256,
        asset: &MarketAsset,
        receiver: Address,
    ) -> Self {
        // market symbols carry the `exa` prefix of the share token
        let symbol = asset.symbol.get(3..).unwrap_or_default();
        Self {
            user_id: account,
            heading: "Withdraw completed".to_owned(),
            contents: format!(
                "{} {symbol} sent to {}",
                format_amount(amount, asset.decimals),
                shorten(receiver)
            ),
        }
    }
}

/// Delivers notifications to users.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> eyre::Result<()>;
}

/// Logs notifications instead of delivering them.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, notification: Notification) -> eyre::Result<()> {
        info!(
            user_id = ?notification.user_id,
            heading = notification.heading,
            contents = notification.contents,
            "Notification"
        );
        Ok(())
    }
}

fn format_amount(amount: U256, decimals: u8) -> String {
    let Ok(formatted) = format_units(amount, u32::from(decimals)) else {
        return amount.to_string();
    };
    if !formatted.contains('.') {
        return formatted;
    }
    formatted
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_owned()
}

fn shorten(address: Address) -> String {
    let hex = format!("{address:?}");
    format!("{}...{}", &hex[..6], &hex[hex.len() - 4..])
}
