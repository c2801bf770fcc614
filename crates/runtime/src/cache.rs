//! Client-resident mirror of the shared config and status.

use crate::backend::Park;
use crate::link::LaunchContext;
use crate::local::{LocalState, LocalStore};
use crate::session::{Action, Outcome, SessionState};
use crate::Result;
use storage::{Config, StatusEntry, StatusMap, now_millis};
use tracing::{info, warn};

/// Display identity used when none has been installed.
pub const DEFAULT_IDENTITY: &str = "Driver";

/// Grid columns used when neither a local preference nor the config sets one.
pub const DEFAULT_GRID_COLUMNS: u32 = 2;

/// Notice shown when the session is revoked.
pub const REVOKED_NOTICE: &str = "Session Expired: Access Revoked";

/// Last known good config and status, plus the local credentials.
///
/// Every update is stamped. A server snapshot is applied only if its stamp is
/// newer than the last applied one, so a slow tick that completes after a
/// newer tick or a local write cannot roll the cache back.
pub struct ClientCache {
    store: Box<dyn LocalStore>,
    local: LocalState,
    config: Config,
    status: StatusMap,
    session: SessionState,
    next_stamp: u64,
    last_applied: u64,
    /// Stamps below this belong to a revoked or replaced session.
    floor: u64,
    notices: Vec<String>,
}

impl ClientCache {
    /// Load local state and install whatever the launch context carries.
    ///
    /// A launch token always replaces the stored one.
    pub fn start(store: Box<dyn LocalStore>, launch: LaunchContext) -> Result<Self> {
        let mut local = store.load()?;
        let mut dirty = false;
        if let Some(token) = launch.token {
            local.token = Some(token);
            local.failures = 0;
            dirty = true;
        }
        if let Some(user) = launch.user {
            local.user = Some(user);
            dirty = true;
        }
        if dirty {
            store.save(&local)?;
        }

        let config = local.config.clone().unwrap_or_default();
        let status = local.status.clone().unwrap_or_default();
        let session = SessionState::resume(local.failures);
        Ok(Self {
            store,
            local,
            config,
            status,
            session,
            next_stamp: 1,
            last_applied: 0,
            floor: 0,
            notices: Vec::new(),
        })
    }

    pub fn token(&self) -> Option<&str> {
        self.local.token.as_deref()
    }

    pub fn has_token(&self) -> bool {
        self.local.token.is_some()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn status(&self) -> &StatusMap {
        &self.status
    }

    pub fn session(&self) -> SessionState {
        self.session
    }

    pub fn display_name(&self) -> &str {
        self.local.user.as_deref().unwrap_or(DEFAULT_IDENTITY)
    }

    /// Effective grid columns: this identity's preference, else the config's.
    pub fn grid_columns(&self) -> u32 {
        self.local
            .grid_columns
            .get(self.display_name())
            .copied()
            .or(self.config.grid_columns)
            .unwrap_or(DEFAULT_GRID_COLUMNS)
    }

    pub fn set_grid_columns(&mut self, columns: u32) -> Result<()> {
        let name = self.display_name().to_string();
        self.local.grid_columns.insert(name, columns);
        self.store.save(&self.local)
    }

    pub fn set_identity(&mut self, name: impl Into<String>) -> Result<()> {
        self.local.user = Some(name.into());
        self.store.save(&self.local)
    }

    /// Install a new key, starting a fresh session.
    pub fn install_token(&mut self, token: impl Into<String>) -> Result<()> {
        self.local.token = Some(token.into());
        self.local.failures = 0;
        self.session = self.session.on_token_installed();
        self.floor = self.next_stamp;
        self.store.save(&self.local)
    }

    /// Stamp for a tick or local write about to start.
    pub fn next_stamp(&mut self) -> u64 {
        let stamp = self.next_stamp;
        self.next_stamp += 1;
        stamp
    }

    /// Whether work stamped `stamp` still belongs to the current session.
    pub fn is_current(&self, stamp: u64) -> bool {
        stamp >= self.floor
    }

    /// Replace config and status with a server snapshot taken at `stamp`.
    ///
    /// Returns `false` if a newer snapshot or local write was already applied.
    pub fn apply_snapshot(&mut self, stamp: u64, config: Config, status: StatusMap) -> Result<bool> {
        if stamp <= self.last_applied || !self.is_current(stamp) {
            return Ok(false);
        }
        self.last_applied = stamp;
        self.config = config;
        self.status = status;
        self.persist_caches()?;
        Ok(true)
    }

    /// Apply a config change locally before the server confirms it.
    pub fn stage_config(&mut self, config: Config) -> Result<u64> {
        let stamp = self.next_stamp();
        self.last_applied = stamp;
        self.config = config;
        self.persist_caches()?;
        Ok(stamp)
    }

    /// Apply a park locally before the server confirms it, returning the report to send.
    pub fn stage_park(&mut self, car_id: &str, location: &str) -> Result<Park> {
        let stamp = self.next_stamp();
        self.last_applied = stamp;
        let entry = StatusEntry {
            location: location.to_string(),
            timestamp: now_millis(),
            user: self.display_name().to_string(),
        };
        let park = Park {
            car_id: car_id.to_string(),
            location: entry.location.clone(),
            timestamp: Some(entry.timestamp),
            user: Some(entry.user.clone()),
        };
        self.status.insert(car_id.to_string(), entry);
        self.persist_caches()?;
        Ok(park)
    }

    /// Feed a server outcome to the session state machine, revoking if it says so.
    pub fn observe(&mut self, outcome: Outcome) -> Result<Action> {
        let (next, action) = self.session.on_outcome(outcome);
        if let SessionState::Degraded { failures } = next {
            warn!(failures, "authorization failure");
        }
        self.session = next;
        if action == Action::Revoke {
            self.revoke()?;
        } else if self.local.failures != next.fail_count() {
            self.local.failures = next.fail_count();
            self.store.save(&self.local)?;
        }
        Ok(action)
    }

    /// Notices not yet taken by the user interface, oldest first.
    pub fn notices(&self) -> &[String] {
        &self.notices
    }

    /// Drain notices for the user.
    pub fn take_notices(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notices)
    }

    fn revoke(&mut self) -> Result<()> {
        warn!("access revoked: clearing session");
        self.local.token = None;
        self.local.config = None;
        self.local.status = None;
        self.local.user = None;
        self.local.failures = 0;
        self.config = Config::default();
        self.status = StatusMap::new();
        self.floor = self.next_stamp;
        self.notices.push(REVOKED_NOTICE.to_string());
        self.store.save(&self.local)
    }

    fn persist_caches(&mut self) -> Result<()> {
        self.local.config = Some(self.config.clone());
        self.local.status = Some(self.status.clone());
        self.store.save(&self.local)?;
        info!(cars = self.config.cars.len(), parked = self.status.len(), "cache updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::MemoryLocalStore;
    use std::sync::Arc;

    fn cache_with(state: LocalState, launch: LaunchContext) -> (Arc<MemoryLocalStore>, ClientCache) {
        let store = Arc::new(MemoryLocalStore::new(state));
        let cache = ClientCache::start(Box::new(store.clone()), launch).unwrap();
        (store, cache)
    }

    fn stored_session() -> LocalState {
        LocalState {
            token: Some("old".into()),
            user: Some("Mum".into()),
            config: Some(Config {
                floors: vec!["P1".into()],
                ..Config::default()
            }),
            ..Default::default()
        }
    }

    fn entry(location: &str) -> StatusEntry {
        StatusEntry {
            location: location.into(),
            timestamp: 1,
            user: "Dad".into(),
        }
    }

    #[test]
    fn launch_token_overwrites_stored_token() {
        let launch = LaunchContext {
            token: Some("new".into()),
            user: Some("Dad".into()),
            car: None,
        };
        let (store, cache) = cache_with(stored_session(), launch);

        assert_eq!(cache.token(), Some("new"));
        assert_eq!(cache.display_name(), "Dad");
        assert_eq!(store.snapshot().token.as_deref(), Some("new"));
    }

    #[test]
    fn stored_session_is_reused() {
        let (_, cache) = cache_with(stored_session(), LaunchContext::default());
        assert_eq!(cache.token(), Some("old"));
        assert_eq!(cache.display_name(), "Mum");
        assert_eq!(cache.config().floors, ["P1"]);
    }

    #[test]
    fn fresh_client_has_defaults() {
        let (_, cache) = cache_with(LocalState::default(), LaunchContext::default());
        assert!(!cache.has_token());
        assert_eq!(cache.display_name(), DEFAULT_IDENTITY);
        assert_eq!(cache.config(), &Config::default());
        assert_eq!(cache.grid_columns(), 2);
    }

    #[test]
    fn older_snapshots_are_discarded() {
        let (_, mut cache) = cache_with(stored_session(), LaunchContext::default());
        let first = cache.next_stamp();
        let second = cache.next_stamp();

        let newer = StatusMap::from([("c1".to_string(), entry("2B"))]);
        assert!(cache.apply_snapshot(second, Config::default(), newer.clone()).unwrap());

        let older = StatusMap::from([("c1".to_string(), entry("1A"))]);
        assert!(!cache.apply_snapshot(first, Config::default(), older).unwrap());
        assert_eq!(cache.status(), &newer);
    }

    #[test]
    fn local_write_beats_in_flight_tick() {
        let (store, mut cache) = cache_with(stored_session(), LaunchContext::default());
        let tick = cache.next_stamp();
        let park = cache.stage_park("c1", "3C").unwrap();
        assert_eq!(park.user.as_deref(), Some("Mum"));

        assert!(!cache.apply_snapshot(tick, Config::default(), StatusMap::new()).unwrap());
        assert_eq!(cache.status()["c1"].location, "3C");
        assert_eq!(store.snapshot().status.unwrap()["c1"].location, "3C");
    }

    #[test]
    fn revocation_purges_credentials_and_caches() {
        let mut state = stored_session();
        state.grid_columns.insert("Mum".into(), 4);
        let (store, mut cache) = cache_with(state, LaunchContext::default());
        let stamp = cache.next_stamp();
        let status = StatusMap::from([("c1".to_string(), entry("2B"))]);
        cache.apply_snapshot(stamp, Config::default(), status).unwrap();

        let actions: Vec<_> = (0..4)
            .map(|_| cache.observe(Outcome::Unauthorized).unwrap())
            .collect();
        assert_eq!(actions.iter().filter(|a| **a == Action::Revoke).count(), 1);

        assert!(!cache.has_token());
        assert!(cache.status().is_empty());
        assert_eq!(cache.config(), &Config::default());
        assert_eq!(cache.display_name(), DEFAULT_IDENTITY);
        assert_eq!(cache.take_notices(), [REVOKED_NOTICE]);
        assert!(cache.take_notices().is_empty());

        let saved = store.snapshot();
        assert_eq!(saved.token, None);
        assert_eq!(saved.config, None);
        assert_eq!(saved.status, None);
        // Layout preferences are not credentials and survive.
        assert_eq!(saved.grid_columns.get("Mum"), Some(&4));
    }

    #[test]
    fn stale_work_is_ignored_after_revocation() {
        let (_, mut cache) = cache_with(stored_session(), LaunchContext::default());
        let in_flight = cache.next_stamp();
        for _ in 0..3 {
            cache.observe(Outcome::Unauthorized).unwrap();
        }
        assert!(!cache.is_current(in_flight));

        cache.install_token("fresh").unwrap();
        assert_eq!(cache.session(), SessionState::Active);
        let stamp = cache.next_stamp();
        assert!(cache.is_current(stamp));
        assert!(!cache.apply_snapshot(in_flight, Config::default(), StatusMap::new()).unwrap());
    }

    #[test]
    fn failures_carry_over_between_runs() {
        let store = Arc::new(MemoryLocalStore::new(stored_session()));
        let mut first = ClientCache::start(Box::new(store.clone()), LaunchContext::default()).unwrap();
        first.observe(Outcome::Unauthorized).unwrap();
        first.observe(Outcome::Unauthorized).unwrap();
        assert_eq!(store.snapshot().failures, 2);

        let mut second = ClientCache::start(Box::new(store.clone()), LaunchContext::default()).unwrap();
        assert_eq!(second.session(), SessionState::Degraded { failures: 2 });
        assert_eq!(second.observe(Outcome::Unauthorized).unwrap(), Action::Revoke);
        assert_eq!(second.notices(), [REVOKED_NOTICE]);
        assert_eq!(store.snapshot().failures, 0);
        assert_eq!(store.snapshot().token, None);
    }

    #[test]
    fn success_clears_stored_failures() {
        let mut state = stored_session();
        state.failures = 1;
        let (store, mut cache) = cache_with(state, LaunchContext::default());
        cache.observe(Outcome::Success).unwrap();
        assert_eq!(cache.session(), SessionState::Active);
        assert_eq!(store.snapshot().failures, 0);
    }

    #[test]
    fn grid_preference_is_per_identity() {
        let (_, mut cache) = cache_with(stored_session(), LaunchContext::default());
        cache.set_grid_columns(3).unwrap();
        assert_eq!(cache.grid_columns(), 3);

        cache.set_identity("Dad").unwrap();
        assert_eq!(cache.grid_columns(), 2);
    }
}
