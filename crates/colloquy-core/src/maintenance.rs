//! Background sweeps on independent timers.
//!
//! Each sweep runs on its own `tokio::time::interval` and stops when the
//! shared cancellation token fires. Sweeps only reclaim memory: the store,
//! cache and limiter stay correct without them.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use colloquy_types::config::GlobalConfig;

use crate::cache::response::ResponseCache;
use crate::conversation::store::ConversationStore;
use crate::rate_limit::RateLimiter;

fn spawn_sweep<F, Fut>(
    name: &'static str,
    period: Duration,
    cancel: CancellationToken,
    mut sweep: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period.max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!(sweep = name, "Sweep stopped");
                    break;
                }
                _ = interval.tick() => sweep().await,
            }
        }
    })
}

/// Start the conversation, cache and cooldown sweeps.
pub fn spawn_maintenance(
    config: &GlobalConfig,
    store: Arc<ConversationStore>,
    cache: Arc<ResponseCache>,
    limiter: Arc<RateLimiter>,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>> {
    vec![
        spawn_sweep(
            "conversations",
            Duration::from_secs(config.conversation.sweep_interval_secs),
            cancel.clone(),
            move || {
                let store = Arc::clone(&store);
                async move {
                    store.sweep_idle(Utc::now());
                }
            },
        ),
        spawn_sweep(
            "cache",
            Duration::from_secs(config.cache.cleanup_interval_secs),
            cancel.clone(),
            move || {
                let cache = Arc::clone(&cache);
                async move {
                    cache.sweep_expired();
                }
            },
        ),
        spawn_sweep(
            "cooldowns",
            Duration::from_secs(config.rate_limit.prune_interval_secs),
            cancel,
            move || {
                let limiter = Arc::clone(&limiter);
                async move {
                    let removed = limiter.prune();
                    if removed > 0 {
                        tracing::debug!(removed, "Pruned cooldown records");
                    }
                }
            },
        ),
    ]
}
