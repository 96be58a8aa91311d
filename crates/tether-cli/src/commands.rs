use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tether_cache::{LocalCache, TtlCache};
use tether_core::TetherConfig;
use tether_net::{ConnectivityMonitor, ReachabilityWatcher, TcpProbe};
use tether_offline::OfflineDataFacade;
use tether_queue::MutationQueue;
use tether_store::DurableStore;
use tether_sync::{HttpRemote, ListQuery, SyncCoordinator, SyncOutcome};
use tokio::sync::watch;
use tracing::info;

pub struct Context {
    pub config: TetherConfig,
    pub store: Arc<dyn DurableStore>,
}

impl Context {
    fn prefix(&self) -> &str {
        &self.config.storage.key_prefix
    }

    async fn cache(&self) -> LocalCache<Value> {
        let cache = LocalCache::new(Arc::clone(&self.store), self.prefix(), &self.config.cache);
        cache.load().await;
        cache
    }

    async fn queue(&self) -> MutationQueue {
        let queue = MutationQueue::new(Arc::clone(&self.store), self.prefix());
        queue.load().await;
        queue
    }

    fn ttl_cache(&self) -> TtlCache {
        TtlCache::new(
            Arc::clone(&self.store),
            self.prefix(),
            Duration::from_secs(self.config.cache.ttl_cache_default_secs),
        )
    }

    fn remote(&self) -> anyhow::Result<Arc<HttpRemote<Value>>> {
        Ok(Arc::new(HttpRemote::new(&self.config.remote)?))
    }
}

#[derive(Serialize)]
struct StatusReport {
    db_path: String,
    cached_items: usize,
    cached_at: Option<DateTime<Utc>>,
    age_secs: Option<i64>,
    stale: bool,
    saved_ids: Vec<String>,
    pending: usize,
    ttl_entries: usize,
}

pub async fn status(ctx: &Context, json: bool) -> anyhow::Result<()> {
    let cache = ctx.cache().await;
    let queue = ctx.queue().await;
    let now = Utc::now();
    let ttl_prefix = format!("{}ttl:", ctx.prefix());

    let report = StatusReport {
        db_path: ctx.config.storage.path.clone(),
        cached_items: cache.len(),
        cached_at: cache.cached_at(),
        age_secs: cache.cached_at().map(|t| (now - t).num_seconds()),
        stale: cache.is_stale(now),
        saved_ids: queue.saved_ids(),
        pending: queue.pending_len(),
        ttl_entries: ctx.store.keys_with_prefix(&ttl_prefix).await?.len(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("store:        {}", report.db_path);
    match report.cached_at {
        Some(at) => println!(
            "snapshot:     {} items, cached {} ({}s ago){}",
            report.cached_items,
            at.to_rfc3339(),
            report.age_secs.unwrap_or_default(),
            if report.stale { ", STALE" } else { "" }
        ),
        None => println!("snapshot:     none"),
    }
    println!("saved:        {} {:?}", report.saved_ids.len(), report.saved_ids);
    println!("pending:      {}", report.pending);
    println!("ttl entries:  {}", report.ttl_entries);
    Ok(())
}

pub async fn pending(ctx: &Context) -> anyhow::Result<()> {
    let queue = ctx.queue().await;
    println!("{}", serde_json::to_string_pretty(&queue.pending())?);
    Ok(())
}

pub async fn clear_cache(ctx: &Context) -> anyhow::Result<()> {
    ctx.cache().await.clear().await?;
    let removed = ctx.ttl_cache().clear().await?;
    println!("cache cleared ({removed} ttl entries removed)");
    Ok(())
}

pub async fn clear_queue(ctx: &Context) -> anyhow::Result<()> {
    let queue = ctx.queue().await;
    let dropped = queue.pending_len();
    queue.clear().await?;
    println!("queue cleared ({dropped} pending mutations dropped)");
    Ok(())
}

pub async fn sync(ctx: &Context) -> anyhow::Result<()> {
    let queue = Arc::new(ctx.queue().await);
    let coordinator = SyncCoordinator::<Value>::new(queue, ctx.remote()?);
    print_outcome(coordinator.drain().await);
    Ok(())
}

pub async fn refresh(ctx: &Context, query: Option<String>, limit: Option<usize>) -> anyhow::Result<()> {
    let facade = OfflineDataFacade::<Value>::open(
        Arc::clone(&ctx.store),
        &ctx.config,
        ConnectivityMonitor::new(),
        ctx.remote()?,
    )
    .await;
    let count = facade
        .refresh(&ListQuery {
            filter: query,
            limit,
        })
        .await?;
    facade.dispose();
    println!("{count} items cached");
    Ok(())
}

pub async fn watch(ctx: &Context) -> anyhow::Result<()> {
    let probe = Arc::new(TcpProbe::from_config(&ctx.config.probe));
    let monitor = ConnectivityMonitor::with_probe(probe.clone());
    let facade = OfflineDataFacade::<Value>::open(
        Arc::clone(&ctx.store),
        &ctx.config,
        Arc::clone(&monitor),
        ctx.remote()?,
    )
    .await;

    let initial = monitor.snapshot_now().await;
    monitor.observe_state(initial);
    print_outcome(facade.sync_now().await);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let watcher = ReachabilityWatcher::new(
        Arc::clone(&monitor),
        probe,
        Duration::from_secs(ctx.config.probe.interval_secs),
    );
    let task = tokio::spawn(watcher.run(shutdown_rx));
    info!(host = %ctx.config.probe.host, "watching connectivity, Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    shutdown_tx.send(true)?;
    task.await?;

    for outcome in facade.wait_for_sync().await {
        print_outcome(outcome);
    }
    facade.dispose();
    Ok(())
}

fn print_outcome(outcome: SyncOutcome) {
    match outcome {
        SyncOutcome::Drained(r) => println!(
            "synced {}, failed {}, {} still pending",
            r.synced, r.failed, r.remaining
        ),
        SyncOutcome::Skipped(reason) => println!("nothing to do ({reason:?})"),
    }
}
