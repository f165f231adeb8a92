//! Identity cache with double-checked, single-flight refresh.

use std::{
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

use mccontrol_core::{ControlError, ControllerConfig, Identity, Platform, Result};
use tokio::{sync::Mutex, time::Instant};
use tokio_util::sync::CancellationToken;

use crate::select::{external_address_for, select_instance};

/// Refresh interval used when a non-positive one is configured.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Default)]
struct CacheState {
    identity: Option<Identity>,
    last_refresh: Option<Instant>,
    /// Completed refresh attempts, successful or not.
    generation: u64,
    last_error: Option<String>,
    interval: Duration,
}

/// Resolves the configured selector to one concrete instance.
///
/// Readers take a short read lock; a physical refresh runs under
/// `refresh_lock`, so at most one is ever in flight. Callers that queued
/// behind an in-flight refresh adopt its outcome instead of repeating it.
pub struct DiscoveryCache {
    platform: Arc<dyn Platform>,
    namespace: String,
    instance_selector: String,
    endpoint_selector: String,
    game_port: u16,
    state: RwLock<CacheState>,
    refresh_lock: Mutex<()>,
    cancel: CancellationToken,
}

impl DiscoveryCache {
    /// Create an empty cache. Nothing is discovered until the first refresh.
    #[must_use]
    pub fn new(
        platform: Arc<dyn Platform>,
        config: &ControllerConfig,
        cancel: CancellationToken,
    ) -> Self {
        let interval = non_zero_interval(config.identity_refresh_interval());
        Self {
            platform,
            namespace: config.namespace.clone(),
            instance_selector: config.instance_selector.clone(),
            endpoint_selector: config.endpoint_selector().to_string(),
            game_port: config.game_port,
            state: RwLock::new(CacheState {
                interval,
                ..CacheState::default()
            }),
            refresh_lock: Mutex::new(()),
            cancel,
        }
    }

    fn read<T>(&self, f: impl FnOnce(&CacheState) -> T) -> T {
        f(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn write<T>(&self, f: impl FnOnce(&mut CacheState) -> T) -> T {
        f(&mut self.state.write().unwrap_or_else(PoisonError::into_inner))
    }

    fn is_fresh(&self) -> bool {
        self.read(|s| {
            s.identity.is_some()
                && s.last_refresh
                    .is_some_and(|at| at.elapsed() < s.interval)
        })
    }

    /// Refresh the identity if it is stale, or unconditionally when `force`.
    ///
    /// Returns whether this call observed a new discovery result.
    ///
    /// # Errors
    /// Returns `Discovery` if no instance matches or the platform fails, and
    /// `Cancelled` once the lifecycle is cancelled.
    pub async fn refresh(&self, force: bool) -> Result<bool> {
        if !force && self.is_fresh() {
            return Ok(false);
        }

        let observed = self.read(|s| s.generation);
        let _guard = self.refresh_lock.lock().await;

        // Someone refreshed while we waited for the lock.
        if let Some(outcome) = self.read(|s| {
            (s.generation != observed).then(|| match &s.last_error {
                Some(message) => Err(ControlError::Discovery(message.clone())),
                None => Ok(true),
            })
        }) {
            return outcome;
        }
        if !force && self.is_fresh() {
            return Ok(false);
        }
        if self.cancel.is_cancelled() {
            return Err(ControlError::Cancelled);
        }

        let outcome = self.discover().await;
        self.write(|s| {
            s.generation += 1;
            match &outcome {
                Ok(identity) => {
                    s.identity = Some(identity.clone());
                    s.last_refresh = Some(Instant::now());
                    s.last_error = None;
                }
                Err(err) => s.last_error = Some(discovery_message(err)),
            }
        });

        match outcome {
            Ok(identity) => {
                tracing::debug!(
                    instance = %identity.instance_name,
                    address = %identity.address,
                    phase = %identity.phase,
                    "Identity refreshed"
                );
                Ok(true)
            }
            Err(err) => {
                tracing::warn!(selector = %self.instance_selector, error = %err, "Identity refresh failed");
                Err(err)
            }
        }
    }

    async fn discover(&self) -> Result<Identity> {
        let candidates = self
            .platform
            .list_instances(&self.namespace, &self.instance_selector)
            .await
            .map_err(|e| ControlError::Discovery(format!("listing instances failed: {e}")))?;

        let selected = select_instance(&candidates).ok_or_else(|| {
            ControlError::Discovery(format!(
                "no instance matches selector '{}'",
                self.instance_selector
            ))
        })?;

        let external_address = match self
            .platform
            .list_endpoints(&self.namespace, &self.endpoint_selector)
            .await
        {
            Ok(endpoints) => external_address_for(&endpoints, self.game_port),
            Err(e) => {
                tracing::debug!(error = %e, "Endpoint lookup failed, keeping no external address");
                None
            }
        };

        Ok(Identity::from_instance(selected, external_address))
    }

    /// Refresh if stale and return the current identity.
    ///
    /// # Errors
    /// Propagates refresh failures.
    pub async fn current(&self) -> Result<Identity> {
        self.refresh(false).await?;
        self.identity()
            .ok_or_else(|| ControlError::Discovery("identity not yet discovered".into()))
    }

    /// Force a refresh and return the resulting identity.
    ///
    /// # Errors
    /// Propagates refresh failures.
    pub async fn force_refresh(&self) -> Result<Identity> {
        self.refresh(true).await?;
        self.identity()
            .ok_or_else(|| ControlError::Discovery("identity not yet discovered".into()))
    }

    /// Last discovered identity, without refreshing.
    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        self.read(|s| s.identity.clone())
    }

    /// Number of completed refresh attempts.
    #[must_use]
    pub fn refresh_count(&self) -> u64 {
        self.read(|s| s.generation)
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.read(|s| s.interval)
    }

    /// Change the minimum time between unforced refreshes.
    pub fn set_interval(&self, interval: Duration) {
        let interval = non_zero_interval(interval);
        self.write(|s| s.interval = interval);
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

fn non_zero_interval(interval: Duration) -> Duration {
    if interval.is_zero() {
        DEFAULT_REFRESH_INTERVAL
    } else {
        interval
    }
}

fn discovery_message(err: &ControlError) -> String {
    match err {
        ControlError::Discovery(message) => message.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use mccontrol_core::{EndpointInfo, EndpointKind, EndpointPort, Phase};
    use mccontrol_test_utils::{FakePlatform, instance};

    use super::*;

    fn cache_for(platform: &FakePlatform) -> DiscoveryCache {
        let config = ControllerConfig {
            namespace: "games".into(),
            identity_refresh_interval_secs: 60,
            ..ControllerConfig::default()
        };
        DiscoveryCache::new(Arc::new(platform.clone()), &config, CancellationToken::new())
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_is_rate_limited() {
        let platform = FakePlatform::with_running("mc-0", "10.0.0.5");
        let cache = cache_for(&platform);

        assert!(cache.refresh(false).await.unwrap());
        assert!(!cache.refresh(false).await.unwrap());
        assert_eq!(platform.list_calls(), 1);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(cache.refresh(false).await.unwrap());
        assert_eq!(platform.list_calls(), 2);
    }

    #[tokio::test]
    async fn test_forced_refresh_follows_rescheduling() {
        let platform = FakePlatform::with_running("mc-0", "10.0.0.5");
        let cache = cache_for(&platform);
        assert_eq!(cache.current().await.unwrap().instance_name, "mc-0");

        platform.set_instances(vec![
            instance("mc-0", "10.0.0.5", Phase::Failed),
            instance("mc-1", "10.0.0.9", Phase::Running),
        ]);
        assert_eq!(cache.current().await.unwrap().instance_name, "mc-0");
        let identity = cache.force_refresh().await.unwrap();
        assert_eq!(identity.instance_name, "mc-1");
        assert_eq!(identity.address, "10.0.0.9");
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_are_single_flight() {
        let platform = FakePlatform::with_running("mc-0", "10.0.0.5");
        platform.set_list_delay(Duration::from_millis(50));
        let cache = Arc::new(cache_for(&platform));

        let calls = (0..16).map(|_| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.refresh(false).await })
        });
        for result in futures::future::join_all(calls).await {
            assert!(result.unwrap().is_ok());
        }
        assert_eq!(platform.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_selector_is_discovery_error() {
        let platform = FakePlatform::new();
        platform.set_instances(vec![]);
        let cache = cache_for(&platform);

        let err = cache.refresh(false).await.unwrap_err();
        assert!(matches!(err, ControlError::Discovery(_)));
        assert!(cache.identity().is_none());
        assert!(cache.current().await.is_err());
    }

    #[tokio::test]
    async fn test_endpoint_failure_is_best_effort() {
        let platform = FakePlatform::with_running("mc-0", "10.0.0.5");
        platform.fail_endpoints("forbidden");
        let cache = cache_for(&platform);
        let identity = cache.current().await.unwrap();
        assert_eq!(identity.external_address, None);
    }

    #[tokio::test]
    async fn test_external_address_is_resolved() {
        let platform = FakePlatform::with_running("mc-0", "10.0.0.5");
        platform.set_endpoints(vec![EndpointInfo {
            name: "mc".into(),
            kind: EndpointKind::NodePort,
            ports: vec![EndpointPort { port: 30565, target_port: Some(25565) }],
            ingress_addresses: vec![],
            external_addresses: vec!["203.0.113.10".into()],
        }]);
        let cache = cache_for(&platform);
        let identity = cache.current().await.unwrap();
        assert_eq!(identity.external_address.as_deref(), Some("203.0.113.10"));
    }

    #[tokio::test]
    async fn test_cancelled_lifecycle_stops_refresh() {
        let platform = FakePlatform::with_running("mc-0", "10.0.0.5");
        let cancel = CancellationToken::new();
        let cache = DiscoveryCache::new(
            Arc::new(platform.clone()),
            &ControllerConfig::default(),
            cancel.clone(),
        );
        cancel.cancel();
        assert!(matches!(cache.refresh(true).await, Err(ControlError::Cancelled)));
        assert_eq!(platform.list_calls(), 0);
    }

    #[test]
    fn test_zero_interval_uses_default() {
        let cache = cache_for(&FakePlatform::new());
        cache.set_interval(Duration::ZERO);
        assert_eq!(cache.interval(), DEFAULT_REFRESH_INTERVAL);
    }
}
