//! Executes the time-locked proposals of exa accounts once they unlock.

#![forbid(unsafe_code)]
#![warn(unused_extern_crates)]

use color_eyre::Result;
use prometheus::Registry;

use keeper::{KeeperService, KeeperSettings};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let settings = KeeperSettings::new()?;
    settings.tracing.start_tracing()?;

    let service = KeeperService::from_settings(&settings, Registry::new()).await?;
    service.run().await?;
    Ok(())
}
