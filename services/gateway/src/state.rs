//! Shared handler state and the wiring that builds it.

use std::sync::Arc;

use chrono::Utc;
use ledger::FundsLedger;
use market_data::{
    Broadcaster, FeedStatus, SubscriptionRegistry, TickSink, TickSource, UpstreamCommand,
    UpstreamHandle,
};
use matching_engine::{MatchingEngine, OrderDesk, PendingBook, tick_queue};
use persistence::RecordStore;
use scheduler::{HttpQuoteClient, LifecycleJobs, Scheduler};
use tokio::sync::{mpsc, watch};
use tracing::info;
use types::funds::FundsRecord;
use types::tick::Tick;

use crate::config::GatewayConfig;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub ledger: Arc<FundsLedger>,
    pub desk: Arc<OrderDesk>,
    pub engine: Arc<MatchingEngine>,
    pub broadcaster: Arc<Broadcaster>,
    pub feed_status: watch::Receiver<FeedStatus>,
}

/// Long-running parts the binary spawns next to the HTTP server.
pub struct Background {
    pub source: TickSource,
    pub commands: mpsc::UnboundedReceiver<UpstreamCommand>,
    pub ticks: mpsc::Receiver<Tick>,
    pub scheduler: Scheduler,
}

impl AppState {
    /// Connect the components around `store`. Seeds configured funds and
    /// loads pending orders into the matching engine.
    pub async fn build(
        config: &GatewayConfig,
        store: Arc<dyn RecordStore>,
    ) -> anyhow::Result<(Self, Background)> {
        for (user_id, cash) in &config.seed_funds {
            if store.load_funds(*user_id).await?.is_none() {
                store.save_funds(&FundsRecord::new(*user_id, *cash, Utc::now())).await?;
                info!(user_id = %user_id, cash = %cash, "Seeded funds record");
            }
        }

        let ledger = Arc::new(FundsLedger::new(store.clone()));
        let book = Arc::new(PendingBook::new());
        let desk = Arc::new(OrderDesk::new(store.clone(), ledger.clone(), book.clone()));
        let engine = Arc::new(MatchingEngine::new(
            store.clone(),
            ledger.clone(),
            book,
            config.matching.clone(),
        ));
        engine.hydrate().await?;

        let (handle, commands) = UpstreamHandle::channel();
        let registry = Arc::new(SubscriptionRegistry::new(Arc::new(handle)));
        let broadcaster = Arc::new(Broadcaster::new(registry.clone(), config.fanout.clone()));

        let (tick_tx, ticks) = tick_queue(&config.matching);
        let fanout: Arc<dyn TickSink> = broadcaster.clone();
        let matching: Arc<dyn TickSink> = Arc::new(tick_tx);
        let source = TickSource::new(config.feed.clone(), registry, vec![fanout, matching]);
        let feed_status = source.status();

        let mut jobs = LifecycleJobs::new(store.clone(), ledger.clone(), desk.clone())
            .with_live_prices(broadcaster.clone());
        if let Some(url) = &config.quote_api_url {
            jobs = jobs.with_quotes(Arc::new(HttpQuoteClient::new(
                url.clone(),
                config.quote_api_token.clone(),
            )?));
        }
        let scheduler = Scheduler::new(Arc::new(jobs), config.schedule.clone())?;

        let state = Self {
            store,
            ledger,
            desk,
            engine,
            broadcaster,
            feed_status,
        };
        let background = Background {
            source,
            commands,
            ticks,
            scheduler,
        };
        Ok((state, background))
    }
}
