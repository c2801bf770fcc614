//! Polling sync loop and optimistic writes.

use crate::backend::ParkingApi;
use crate::cache::ClientCache;
use crate::session::{Action, Outcome};
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use storage::{Config, StatusEntry};
use tokio::sync::{Mutex, broadcast};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, warn};

/// Default period between sync ticks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Something the UI should react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// A server snapshot replaced the cached config and status.
    Applied { stamp: u64 },
    /// The session was revoked; show `notice` and return to the default view.
    Revoked { notice: String },
}

/// How a single tick ended.
#[derive(Debug, PartialEq, Eq)]
pub enum Tick {
    /// No key is installed; nothing was sent.
    Skipped,
    /// Both results were applied.
    Applied,
    /// Both calls succeeded but a newer update had already been applied.
    Stale,
    /// The server refused the key; nothing was applied.
    Rejected,
    /// A call failed for another reason; nothing was applied.
    Failed,
}

/// Client session: a cache kept in sync with a parking API.
pub struct Client<A> {
    api: Arc<A>,
    cache: Arc<Mutex<ClientCache>>,
    events: broadcast::Sender<SyncEvent>,
}

impl<A> Clone for Client<A> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            cache: self.cache.clone(),
            events: self.events.clone(),
        }
    }
}

impl<A: ParkingApi + 'static> Client<A> {
    pub fn new(api: A, cache: ClientCache) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            api: Arc::new(api),
            cache: Arc::new(Mutex::new(cache)),
            events,
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn cache(&self) -> &Arc<Mutex<ClientCache>> {
        &self.cache
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Fetch config and status together and apply them as one unit.
    pub async fn tick(&self) -> Result<Tick> {
        let (stamp, key) = {
            let mut cache = self.cache.lock().await;
            let Some(key) = cache.token().map(str::to_owned) else {
                debug!("no key installed; skipping sync");
                return Ok(Tick::Skipped);
            };
            (cache.next_stamp(), key)
        };

        let (config, status) = tokio::join!(self.api.get_config(&key), self.api.get_status(&key));

        let mut cache = self.cache.lock().await;
        if !cache.is_current(stamp) {
            return Ok(Tick::Stale);
        }
        match (config, status) {
            (Ok(config), Ok(status)) => {
                cache.observe(Outcome::Success)?;
                if cache.apply_snapshot(stamp, config, status)? {
                    let _ = self.events.send(SyncEvent::Applied { stamp });
                    Ok(Tick::Applied)
                } else {
                    Ok(Tick::Stale)
                }
            }
            (config, status) => {
                // One outcome per tick: an unauthorized answer on either call wins.
                let err = [config.err(), status.err()]
                    .into_iter()
                    .flatten()
                    .max_by_key(Error::is_unauthorized);
                let Some(err) = err else {
                    return Ok(Tick::Failed);
                };
                error!(error = %err, "failed to load data");
                self.observe(&mut cache, Outcome::from(&err))?;
                if err.is_unauthorized() {
                    Ok(Tick::Rejected)
                } else {
                    Ok(Tick::Failed)
                }
            }
        }
    }

    /// Install `token` once the server has accepted it.
    ///
    /// A refused token is not installed, and the stored key and session are
    /// left as they were.
    pub async fn install_verified(&self, token: &str) -> Result<()> {
        self.api.get_config(token).await?;
        self.cache.lock().await.install_token(token)
    }

    /// Replace the shared config, applying it locally first.
    ///
    /// The local change is kept even if the server call fails; the next
    /// successful tick reconciles.
    pub async fn save_config(&self, config: Config) -> Result<Config> {
        let key = {
            let mut cache = self.cache.lock().await;
            cache.stage_config(config.clone())?;
            cache.token().map(str::to_owned)
        };
        let key = key.ok_or(Error::MissingToken)?;

        let result = self.api.set_config(&key, &config).await;
        self.settle(&result).await?;
        result
    }

    /// Report a park, applying it locally first.
    pub async fn park(&self, car_id: &str, location: &str) -> Result<StatusEntry> {
        let (park, key) = {
            let mut cache = self.cache.lock().await;
            let park = cache.stage_park(car_id, location)?;
            (park, cache.token().map(str::to_owned))
        };
        let key = key.ok_or(Error::MissingToken)?;

        let result = self.api.record_park(&key, &park).await;
        self.settle(&result).await?;
        result
    }

    /// Start polling: one tick now, then one every `period` until the handle is shut down.
    ///
    /// Ticks run on a fixed timer, not chained, so a hung call delays only its own tick.
    pub fn spawn_sync(&self, period: Duration) -> SyncHandle {
        let client = self.clone();
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut ticks = JoinSet::new();
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let client = client.clone();
                        ticks.spawn(async move { client.tick().await });
                    }
                    Some(done) = ticks.join_next(), if !ticks.is_empty() => {
                        match done {
                            Ok(Err(e)) => error!(error = %e, "sync tick failed"),
                            Err(e) if e.is_panic() => error!(error = %e, "sync tick panicked"),
                            _ => {}
                        }
                    }
                }
            }
        });
        SyncHandle { task }
    }

    async fn settle<T>(&self, result: &Result<T>) -> Result<()> {
        if let Err(e) = result {
            warn!(error = %e, "write not confirmed");
        }
        let mut cache = self.cache.lock().await;
        self.observe(&mut cache, Outcome::of(result))
    }

    fn observe(&self, cache: &mut ClientCache, outcome: Outcome) -> Result<()> {
        // Notices stay queued in the cache for callers that are not subscribed.
        if cache.observe(outcome)? == Action::Revoke {
            if let Some(notice) = cache.notices().last() {
                let _ = self.events.send(SyncEvent::Revoked {
                    notice: notice.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Running sync loop. Dropping or shutting down the handle stops all ticks.
#[derive(Debug)]
pub struct SyncHandle {
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Stop the loop, cancelling ticks still in flight.
    pub async fn shutdown(mut self) {
        self.task.abort();
        let _ = (&mut self.task).await;
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
