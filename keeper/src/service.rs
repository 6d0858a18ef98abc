use std::sync::Arc;

use eyre::{Context, Result};
use prometheus::Registry;
use tracing::{info, instrument, warn};
use url::Url;

use crate::events::BlockPayload;
use crate::keeper::{ErrorReporter, Keeper, TracingReporter};
use crate::metrics::KeeperMetrics;
use crate::nonce::{NonceManager, ProviderNonceSource};
use crate::provider::{EthersKeeperProvider, KeeperProvider};
use crate::scheduler::{
    MemoryStore, ProposalStore, ProviderChainReader, RedisStore, Scheduler, TracingNotifier,
};
use crate::settings::{KeeperSettings, SigningKeys};

/// The keeper with everything it runs on, built from settings.
pub struct KeeperService {
    keeper: Arc<Keeper>,
    scheduler: Scheduler,
    signing_keys: SigningKeys,
    metrics: KeeperMetrics,
}

impl KeeperService {
    #[instrument(skip_all, fields(chain_id = settings.chain_id))]
    pub async fn from_settings(settings: &KeeperSettings, registry: Registry) -> Result<Self> {
        let url = Url::parse(&settings.rpc_url).context("Invalid rpc url")?;
        let provider: Arc<dyn KeeperProvider> = Arc::new(EthersKeeperProvider::with_private_key(
            url,
            settings.keeper_key.expose(),
            settings.chain_id,
        )?);
        info!(address = ?provider.address(), "Keeper account");

        let metrics = KeeperMetrics::new(registry)?;
        let reporter: Arc<dyn ErrorReporter> = Arc::new(TracingReporter);
        let nonces = NonceManager::new(Arc::new(ProviderNonceSource::new(provider.clone())));
        let keeper = Arc::new(Keeper::new(
            provider.clone(),
            nonces,
            reporter.clone(),
            metrics.clone(),
            settings.keeper_config(),
        ));

        let store: Arc<dyn ProposalStore> = match &settings.redis_url {
            Some(url) => Arc::new(RedisStore::connect(url).await?),
            None => {
                warn!("No redis url configured, scheduled messages will not survive a restart");
                Arc::new(MemoryStore::default())
            }
        };
        let scheduler = Scheduler::new(
            store,
            keeper.clone(),
            Arc::new(ProviderChainReader::new(provider, settings.previewer)),
            Arc::new(TracingNotifier),
            reporter,
            metrics.clone(),
            settings.scheduler_config(),
        );

        let signing_keys = settings.signing_keys();
        if signing_keys.is_empty() {
            warn!("No webhook signing key configured");
        }

        Ok(Self {
            keeper,
            scheduler,
            signing_keys,
            metrics,
        })
    }

    pub fn keeper(&self) -> &Arc<Keeper> {
        &self.keeper
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn signing_keys(&self) -> &SigningKeys {
        &self.signing_keys
    }

    pub fn metrics(&self) -> &KeeperMetrics {
        &self.metrics
    }

    /// Schedules the proposals of a delivered block.
    pub async fn handle_block(&self, payload: &BlockPayload) -> Result<usize> {
        Ok(self.scheduler.ingest(payload).await?)
    }

    /// Arms the persisted messages and runs until interrupted.
    pub async fn run(self) -> Result<()> {
        let armed = self.scheduler.rehydrate().await?;
        info!(armed, "Keeper started");

        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for the shutdown signal")?;
        info!(
            pending = self.scheduler.pending(),
            "Shutting down, scheduled messages resume from the store on restart"
        );
        Ok(())
    }
}
