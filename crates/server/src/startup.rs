use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

use axum::Router;
use common::env::ensure_static_dir;
use configs::AppConfig;
use service::{LockBackend, LockStore};
use tokio::{net::TcpListener, task::JoinHandle, time::MissedTickBehavior};
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use crate::routes::{self, ServerState};

fn build_cors() -> CorsLayer {
    CorsLayer::very_permissive()
}

fn load_bind_addr(cfg: &AppConfig) -> anyhow::Result<SocketAddr> {
    Ok(cfg.server.bind_addr().parse()?)
}

/// Periodically drop expired leases so idle tables do not accumulate.
/// Lazy eviction on access stays in effect either way.
pub fn spawn_sweeper(locks: Arc<dyn LockBackend>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let purged = locks.purge_expired();
            if purged > 0 {
                debug!(purged, "swept expired leases");
            }
        }
    })
}

/// Build the full app around an existing lock backend.
pub fn build_app(cfg: &AppConfig, locks: Arc<dyn LockBackend>) -> Router {
    let state = ServerState::new(locks);
    routes::build_router(state, &cfg.server.static_dir, build_cors())
}

/// Serve `app` on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl+C; running until killed");
        std::future::pending::<()>().await;
    }
    info!(event = "shutdown_signal", "received Ctrl+C, shutting down");
}

/// Public entry: build the lock store and app, then run the HTTP server.
pub async fn run(cfg: AppConfig) -> anyhow::Result<()> {
    ensure_static_dir(&cfg.server.static_dir).await;

    let locks: Arc<dyn LockBackend> = Arc::new(LockStore::new());
    let sweeper = cfg
        .locks
        .sweep_interval_secs
        .map(|secs| spawn_sweeper(Arc::clone(&locks), Duration::from_secs(secs)));

    let app = build_app(&cfg, Arc::clone(&locks));

    let addr = load_bind_addr(&cfg)?;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, static_dir = %cfg.server.static_dir, "table lock API listening");
    let res = serve(listener, app, shutdown_signal()).await;

    if let Some(handle) = sweeper {
        handle.abort();
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use service::ManualClock;

    #[tokio::test]
    async fn sweeper_purges_expired_leases() {
        let clock = ManualClock::default();
        let store = Arc::new(LockStore::with_clock(Arc::new(clock.clone())));
        store.acquire("t1", "alice", service::LeaseDuration::from_secs_f64(1.0).unwrap()).unwrap();
        clock.advance(Duration::from_secs(2));
        assert_eq!(store.active_leases(), 0);

        let handle = spawn_sweeper(store.clone(), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();

        assert_eq!(store.purge_expired(), 0, "sweeper already removed the stale entry");
    }

    #[test]
    fn bind_addr_comes_from_config() -> anyhow::Result<()> {
        let mut cfg = AppConfig::default();
        cfg.server.port = 4321;
        assert_eq!(load_bind_addr(&cfg)?, "127.0.0.1:4321".parse::<SocketAddr>()?);
        Ok(())
    }
}
