use crate::config::TrackingConfig;
use crate::error::{TrackerError, TrackerResult};
use crate::platform::{
    LocationFeed, PermissionProvider, PermissionState, SettingsClient, SettingsOutcome,
    SubscriptionHandle,
};
use crate::sample::{LocationBatch, LocationSample};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Capacity of the feed → session channel
const FEED_CHANNEL_CAPACITY: usize = 16;

/// Session state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// Created, not tracking
    Idle,
    /// First settings check in flight
    AwaitingSettingsCheck,
    /// Feed subscribed, samples delivered to the observer
    Tracking,
    /// Tracking ended by the user or by a pause
    Stopped,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "IDLE",
            SessionState::AwaitingSettingsCheck => "AWAITING_SETTINGS_CHECK",
            SessionState::Tracking => "TRACKING",
            SessionState::Stopped => "STOPPED",
        }
    }
}

/// What the last settings check concluded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettingsReadiness {
    Unchecked,
    Ready,
    ResolutionRequired,
    Unresolvable,
}

/// Tracking config that passed a device settings check
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    config: TrackingConfig,
}

impl ResolvedConfig {
    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }
}

/// Receives one sample per delivered batch.
///
/// Called with the session's state lock held; implementations must not call
/// back into the session.
pub trait LocationObserver: Send + Sync {
    fn on_location(&self, sample: LocationSample);
}

impl<F> LocationObserver for F
where
    F: Fn(LocationSample) + Send + Sync,
{
    fn on_location(&self, sample: LocationSample) {
        self(sample)
    }
}

struct SessionInner {
    state: SessionState,
    readiness: SettingsReadiness,
    resolved: Option<ResolvedConfig>,
    subscription: Option<SubscriptionHandle>,
    forwarder: Option<JoinHandle<()>>,
    observer: Option<Arc<dyn LocationObserver>>,
    // Bumped on every start and stop; a forwarder only delivers for its own
    generation: u64,
    delivered: u64,
    resume_tracking: bool,
}

/// Location tracking session
pub struct LocationSession {
    config: TrackingConfig,
    permissions: Arc<dyn PermissionProvider>,
    settings: Arc<dyn SettingsClient>,
    feed: Arc<dyn LocationFeed>,
    inner: Arc<Mutex<SessionInner>>,
    transition: tokio::sync::Mutex<()>,
}

fn lock_inner(inner: &Mutex<SessionInner>) -> TrackerResult<MutexGuard<'_, SessionInner>> {
    inner
        .lock()
        .map_err(|_| TrackerError::lock_poisoned("session state"))
}

impl LocationSession {
    /// Create new session in Idle state
    pub fn new(
        config: TrackingConfig,
        permissions: Arc<dyn PermissionProvider>,
        settings: Arc<dyn SettingsClient>,
        feed: Arc<dyn LocationFeed>,
    ) -> TrackerResult<Self> {
        config.validate()?;

        Ok(LocationSession {
            config,
            permissions,
            settings,
            feed,
            inner: Arc::new(Mutex::new(SessionInner {
                state: SessionState::Idle,
                readiness: SettingsReadiness::Unchecked,
                resolved: None,
                subscription: None,
                forwarder: None,
                observer: None,
                generation: 0,
                delivered: 0,
                resume_tracking: false,
            })),
            transition: tokio::sync::Mutex::new(()),
        })
    }

    /// Build a session over one object implementing every collaborator
    pub fn with_platform<P>(config: TrackingConfig, platform: Arc<P>) -> TrackerResult<Self>
    where
        P: PermissionProvider + SettingsClient + LocationFeed + 'static,
    {
        Self::new(config, platform.clone(), platform.clone(), platform)
    }

    pub fn set_observer(&self, observer: Arc<dyn LocationObserver>) -> TrackerResult<()> {
        lock_inner(&self.inner)?.observer = Some(observer);
        Ok(())
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    pub fn permission_state(&self) -> PermissionState {
        self.permissions.permission_state()
    }

    /// Get current state
    pub fn state(&self) -> TrackerResult<SessionState> {
        Ok(lock_inner(&self.inner)?.state)
    }

    pub fn readiness(&self) -> TrackerResult<SettingsReadiness> {
        Ok(lock_inner(&self.inner)?.readiness)
    }

    pub fn is_tracking(&self) -> TrackerResult<bool> {
        Ok(self.state()? == SessionState::Tracking)
    }

    /// Samples handed to the observer since the session was created
    pub fn delivered_count(&self) -> TrackerResult<u64> {
        Ok(lock_inner(&self.inner)?.delivered)
    }

    /// Ask the platform whether device settings satisfy the tracking config.
    ///
    /// Failures are surfaced, never retried here; the caller re-invokes after
    /// the user acts on a resolution handle.
    pub async fn check_settings(&self) -> TrackerResult<ResolvedConfig> {
        {
            let mut inner = lock_inner(&self.inner)?;
            if inner.state == SessionState::Idle {
                inner.state = SessionState::AwaitingSettingsCheck;
            }
        }

        let outcome = self.settings.check_location_settings(&self.config).await;

        let mut inner = lock_inner(&self.inner)?;
        if inner.state == SessionState::AwaitingSettingsCheck {
            inner.state = SessionState::Idle;
        }

        match outcome {
            SettingsOutcome::Ready => {
                let resolved = ResolvedConfig {
                    config: self.config.clone(),
                };
                inner.readiness = SettingsReadiness::Ready;
                inner.resolved = Some(resolved.clone());
                log::debug!("Location settings satisfied");
                Ok(resolved)
            }
            SettingsOutcome::ResolutionRequired(handle) => {
                inner.readiness = SettingsReadiness::ResolutionRequired;
                inner.resolved = None;
                log::info!("Location settings need resolution (handle {})", handle.id());
                Err(TrackerError::SettingsResolutionRequired(handle))
            }
            SettingsOutcome::Unresolvable(reason) => {
                inner.readiness = SettingsReadiness::Unresolvable;
                inner.resolved = None;
                log::warn!("Location settings unresolvable: {}", reason);
                Err(TrackerError::SettingsUnresolvable(reason))
            }
        }
    }

    /// Transition to Tracking (Idle/Stopped → Tracking)
    pub async fn start(&self) -> TrackerResult<()> {
        let _transition = self.transition.lock().await;
        self.start_locked()
    }

    /// Transition to Stopped (Tracking → Stopped).
    ///
    /// Delivery stops before the unsubscribe is issued. An unsubscribe
    /// failure is returned but the session stays Stopped.
    pub async fn stop(&self) -> TrackerResult<()> {
        let _transition = self.transition.lock().await;
        self.stop_locked().await
    }

    /// Stop for a host pause, remembering whether tracking should come back
    pub async fn suspend(&self) -> TrackerResult<()> {
        let _transition = self.transition.lock().await;
        {
            let mut inner = lock_inner(&self.inner)?;
            inner.resume_tracking = inner.state == SessionState::Tracking;
        }
        self.stop_locked().await
    }

    /// Restart tracking if it was running at suspend; settings are not re-checked
    pub async fn resume(&self) -> TrackerResult<()> {
        let _transition = self.transition.lock().await;
        let resume = std::mem::take(&mut lock_inner(&self.inner)?.resume_tracking);
        if !resume {
            return Ok(());
        }
        log::debug!("Resuming location updates");
        self.start_locked()
    }

    /// One-shot cached fix, independent of the tracking state
    pub async fn last_known_location(&self) -> TrackerResult<Option<LocationSample>> {
        if !self.permissions.permission_state().is_granted() {
            return Err(TrackerError::PermissionDenied);
        }
        self.feed
            .last_known()
            .await
            .map_err(|e| TrackerError::QueryFailed(e.to_string()))
    }

    fn start_locked(&self) -> TrackerResult<()> {
        let resolved = {
            let inner = lock_inner(&self.inner)?;
            if inner.state == SessionState::Tracking {
                return Ok(());
            }
            if !self.permissions.permission_state().is_granted() {
                log::warn!("Start refused: location permission not granted");
                return Err(TrackerError::PermissionDenied);
            }
            match inner.resolved.clone() {
                Some(resolved) => resolved,
                None => return Err(TrackerError::SettingsNotReady),
            }
        };

        let (tx, rx) = mpsc::channel::<LocationBatch>(FEED_CHANNEL_CAPACITY);
        let handle = self
            .feed
            .subscribe(resolved.config(), tx)
            .map_err(|e| TrackerError::FeedSubscriptionFailed(e.to_string()))?;

        let mut inner = lock_inner(&self.inner)?;
        inner.generation += 1;
        let forwarder = tokio::spawn(forward_batches(rx, self.inner.clone(), inner.generation));
        inner.forwarder = Some(forwarder);
        inner.subscription = Some(handle);
        inner.state = SessionState::Tracking;

        log::debug!("Request Location Updates");
        Ok(())
    }

    async fn stop_locked(&self) -> TrackerResult<()> {
        let handle = {
            let mut inner = lock_inner(&self.inner)?;
            if inner.state != SessionState::Tracking {
                return Ok(());
            }
            inner.state = SessionState::Stopped;
            inner.generation += 1;
            if let Some(forwarder) = inner.forwarder.take() {
                forwarder.abort();
            }
            inner.subscription.take()
        };

        let Some(handle) = handle else {
            return Ok(());
        };

        match self.feed.unsubscribe(handle).await {
            Ok(()) => {
                log::debug!("Location Callback removed.");
                Ok(())
            }
            Err(e) => {
                log::warn!("Failed to remove Location Callback: {}", e);
                Err(TrackerError::UnsubscribeFailed(e.to_string()))
            }
        }
    }
}

/// Dropping a tracking session removes its subscription on a best-effort basis
impl Drop for LocationSession {
    fn drop(&mut self) {
        let handle = {
            let mut inner = self
                .inner
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            inner.generation += 1;
            if let Some(forwarder) = inner.forwarder.take() {
                forwarder.abort();
            }
            inner.subscription.take()
        };

        let Some(handle) = handle else {
            return;
        };
        log::warn!(
            "Session dropped while tracking, removing subscription {}",
            handle.0
        );

        let pending = self.feed.unsubscribe(handle);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = pending.await {
                        log::warn!("Failed to remove Location Callback on drop: {}", e);
                    }
                });
            }
            Err(_) => log::debug!("No runtime to complete unsubscribe {}", handle.0),
        }
    }
}

async fn forward_batches(
    mut rx: mpsc::Receiver<LocationBatch>,
    inner: Arc<Mutex<SessionInner>>,
    generation: u64,
) {
    while let Some(batch) = rx.recv().await {
        let discarded = batch.len().saturating_sub(1);
        let Some(sample) = batch.into_latest() else {
            continue;
        };

        let Ok(mut guard) = inner.lock() else {
            log::error!("Session state lock poisoned, dropping location feed");
            break;
        };
        if guard.state != SessionState::Tracking || guard.generation != generation {
            break;
        }
        if discarded > 0 {
            log::debug!("Discarded {} older fixes from batch", discarded);
        }
        guard.delivered += 1;
        if let Some(observer) = guard.observer.as_ref() {
            observer.on_location(sample);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::fake::FakePlatform;
    use crate::platform::host::HostPlatform;
    use crate::platform::ResolutionHandle;
    use std::time::Duration;

    fn collecting_session(
        platform: &FakePlatform,
    ) -> (LocationSession, Arc<Mutex<Vec<LocationSample>>>) {
        let session =
            LocationSession::with_platform(TrackingConfig::default(), Arc::new(platform.clone()))
                .unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        session
            .set_observer(Arc::new(move |sample: LocationSample| {
                sink.lock().unwrap().push(sample)
            }))
            .unwrap();
        (session, received)
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_session_state_transitions() {
        let platform = FakePlatform::ready(PermissionState::Fine);
        let (session, _) = collecting_session(&platform);

        // Initial state is Idle
        assert_eq!(session.state().unwrap(), SessionState::Idle);
        assert_eq!(session.readiness().unwrap(), SettingsReadiness::Unchecked);

        session.check_settings().await.unwrap();
        assert_eq!(session.state().unwrap(), SessionState::Idle);
        assert_eq!(session.readiness().unwrap(), SettingsReadiness::Ready);

        // Idle → Tracking
        session.start().await.unwrap();
        assert!(session.is_tracking().unwrap());
        assert!(platform.is_subscribed());

        // Tracking → Stopped
        session.stop().await.unwrap();
        assert_eq!(session.state().unwrap(), SessionState::Stopped);
        assert_eq!(platform.unsubscribes(), 1);

        // Stopped → Tracking
        session.start().await.unwrap();
        assert_eq!(session.state().unwrap(), SessionState::Tracking);
        assert_eq!(platform.subscribes(), 2);
    }

    #[tokio::test]
    async fn test_awaiting_state_while_check_in_flight() {
        let host = HostPlatform::new(PermissionState::Fine);
        let session = Arc::new(
            LocationSession::with_platform(TrackingConfig::default(), Arc::new(host.clone()))
                .unwrap(),
        );

        let checking = session.clone();
        let check = tokio::spawn(async move { checking.check_settings().await });
        while !host.has_pending_settings_check() {
            tokio::task::yield_now().await;
        }
        assert_eq!(session.state().unwrap(), SessionState::AwaitingSettingsCheck);

        host.report_settings_ready();
        check.await.unwrap().unwrap();
        assert_eq!(session.state().unwrap(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_repeated_start_and_stop_are_idempotent() {
        let platform = FakePlatform::ready(PermissionState::Coarse);
        let (session, _) = collecting_session(&platform);
        session.check_settings().await.unwrap();

        // stop before any start is a no-op
        session.stop().await.unwrap();
        assert_eq!(session.state().unwrap(), SessionState::Idle);
        assert_eq!(platform.unsubscribes(), 0);

        session.start().await.unwrap();
        session.start().await.unwrap();
        assert_eq!(platform.subscribes(), 1);
        assert!(session.is_tracking().unwrap());

        session.stop().await.unwrap();
        session.stop().await.unwrap();
        assert_eq!(platform.unsubscribes(), 1);
        assert_eq!(session.state().unwrap(), SessionState::Stopped);
    }

    #[tokio::test]
    async fn test_alternating_runs_end_in_expected_state() {
        let platform = FakePlatform::ready(PermissionState::Fine);
        let (session, _) = collecting_session(&platform);
        session.check_settings().await.unwrap();

        for run in 1..=7 {
            if run % 2 == 1 {
                session.start().await.unwrap();
                assert_eq!(session.state().unwrap(), SessionState::Tracking);
            } else {
                session.stop().await.unwrap();
                assert_eq!(session.state().unwrap(), SessionState::Stopped);
            }
        }
    }

    #[tokio::test]
    async fn test_start_without_permission_is_denied() {
        let platform = FakePlatform::ready(PermissionState::None);
        let (session, _) = collecting_session(&platform);
        session.check_settings().await.unwrap();

        assert!(matches!(
            session.start().await,
            Err(TrackerError::PermissionDenied)
        ));
        assert_eq!(session.state().unwrap(), SessionState::Idle);
        assert_eq!(platform.subscribes(), 0);
    }

    #[tokio::test]
    async fn test_permission_rechecked_on_every_start() {
        let platform = FakePlatform::ready(PermissionState::Fine);
        let (session, _) = collecting_session(&platform);
        session.check_settings().await.unwrap();

        session.start().await.unwrap();
        session.stop().await.unwrap();

        platform.set_permission(PermissionState::None);
        assert!(matches!(
            session.start().await,
            Err(TrackerError::PermissionDenied)
        ));
        assert_eq!(session.state().unwrap(), SessionState::Stopped);
    }

    #[tokio::test]
    async fn test_start_before_settings_check() {
        let platform = FakePlatform::ready(PermissionState::Fine);
        let (session, _) = collecting_session(&platform);

        assert!(matches!(
            session.start().await,
            Err(TrackerError::SettingsNotReady)
        ));
        assert_eq!(session.state().unwrap(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_resolution_required_then_fresh_check() {
        let platform = FakePlatform::new(
            PermissionState::Fine,
            SettingsOutcome::ResolutionRequired(ResolutionHandle::new(100)),
        );
        let (session, _) = collecting_session(&platform);

        match session.check_settings().await {
            Err(TrackerError::SettingsResolutionRequired(handle)) => assert_eq!(handle.id(), 100),
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(
            session.readiness().unwrap(),
            SettingsReadiness::ResolutionRequired
        );
        assert!(matches!(
            session.start().await,
            Err(TrackerError::SettingsNotReady)
        ));

        // Exactly one check so far: the session never retries by itself
        assert_eq!(platform.settings_checks(), 1);

        platform.set_settings(SettingsOutcome::Ready);
        session.check_settings().await.unwrap();
        session.start().await.unwrap();
        assert!(session.is_tracking().unwrap());
    }

    #[tokio::test]
    async fn test_unresolvable_settings_block_start() {
        let platform = FakePlatform::new(
            PermissionState::Fine,
            SettingsOutcome::Unresolvable("location services disabled".into()),
        );
        let (session, _) = collecting_session(&platform);

        let err = session.check_settings().await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(session.readiness().unwrap(), SettingsReadiness::Unresolvable);
        assert!(matches!(
            session.start().await,
            Err(TrackerError::SettingsNotReady)
        ));
    }

    #[tokio::test]
    async fn test_subscription_failure_keeps_state() {
        let platform = FakePlatform::ready(PermissionState::Fine);
        let (session, _) = collecting_session(&platform);
        session.check_settings().await.unwrap();

        platform.fail_subscribe(true);
        assert!(matches!(
            session.start().await,
            Err(TrackerError::FeedSubscriptionFailed(_))
        ));
        assert_eq!(session.state().unwrap(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_batch_delivers_only_last_fix() {
        let platform = FakePlatform::ready(PermissionState::Fine);
        let (session, received) = collecting_session(&platform);
        session.check_settings().await.unwrap();
        session.start().await.unwrap();

        assert!(platform.push(&[(1.0, 1.0), (2.0, 2.0), (3.0, 3.0)]));
        assert!(platform.push(&[(4.0, 4.0)]));
        settle().await;

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].latitude, 3.0);
        assert_eq!(received[1].latitude, 4.0);
        assert_eq!(session.delivered_count().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_no_delivery_after_logical_stop() {
        let platform = FakePlatform::ready(PermissionState::Fine);
        let (session, received) = collecting_session(&platform);
        let session = Arc::new(session);
        session.check_settings().await.unwrap();
        session.start().await.unwrap();

        platform.push(&[(1.0, 1.0)]);
        settle().await;
        assert_eq!(received.lock().unwrap().len(), 1);

        // Unsubscribe confirmation is held back while the platform keeps pushing
        let gate = platform.gate_unsubscribe();
        let stopping = session.clone();
        let stop = tokio::spawn(async move { stopping.stop().await });
        settle().await;

        assert_eq!(session.state().unwrap(), SessionState::Stopped);
        assert!(platform.is_subscribed());
        platform.push(&[(2.0, 2.0)]);
        settle().await;

        gate.notify_one();
        stop.await.unwrap().unwrap();
        assert!(!platform.is_subscribed());
        assert_eq!(received.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_failure_still_stops() {
        let platform = FakePlatform::ready(PermissionState::Fine);
        let (session, received) = collecting_session(&platform);
        session.check_settings().await.unwrap();
        session.start().await.unwrap();

        platform.fail_unsubscribe(true);
        assert!(matches!(
            session.stop().await,
            Err(TrackerError::UnsubscribeFailed(_))
        ));
        assert_eq!(session.state().unwrap(), SessionState::Stopped);

        platform.push(&[(9.0, 9.0)]);
        settle().await;
        assert!(received.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_last_known_location() {
        let platform = FakePlatform::ready(PermissionState::Coarse);
        let (session, _) = collecting_session(&platform);

        assert_eq!(session.last_known_location().await.unwrap(), None);
        assert_eq!(session.state().unwrap(), SessionState::Idle);

        platform.set_last_known(Some(LocationSample::new(10.5, -3.25)));
        let fix = session.last_known_location().await.unwrap().unwrap();
        assert_eq!(fix.to_string(), "10.5, -3.25");

        platform.fail_query(true);
        assert!(matches!(
            session.last_known_location().await,
            Err(TrackerError::QueryFailed(_))
        ));

        platform.set_permission(PermissionState::None);
        assert!(matches!(
            session.last_known_location().await,
            Err(TrackerError::PermissionDenied)
        ));
        assert_eq!(session.state().unwrap(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_last_known_while_tracking_leaves_feed_alone() {
        let platform = FakePlatform::ready(PermissionState::Fine);
        let (session, received) = collecting_session(&platform);
        session.check_settings().await.unwrap();
        session.start().await.unwrap();

        platform.set_last_known(Some(LocationSample::new(1.25, 2.5)));
        let fix = session.last_known_location().await.unwrap().unwrap();
        assert_eq!(fix.to_string(), "1.25, 2.5");

        assert_eq!(session.state().unwrap(), SessionState::Tracking);
        assert!(platform.is_subscribed());
        assert_eq!(platform.subscribes(), 1);
        assert_eq!(platform.unsubscribes(), 0);

        // the cached fix is not routed to the observer, live fixes still are
        assert!(received.lock().unwrap().is_empty());
        assert!(platform.push(&[(3.0, 4.0)]));
        settle().await;
        assert_eq!(received.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_drop_while_tracking_unsubscribes() {
        let platform = FakePlatform::ready(PermissionState::Fine);
        let (session, received) = collecting_session(&platform);
        session.check_settings().await.unwrap();
        session.start().await.unwrap();

        drop(session);
        settle().await;
        assert_eq!(platform.unsubscribes(), 1);
        assert!(!platform.is_subscribed());
        assert!(received.lock().unwrap().is_empty());

        // an idle session has nothing to remove
        let (idle, _) = collecting_session(&platform);
        drop(idle);
        settle().await;
        assert_eq!(platform.unsubscribes(), 1);
    }

    #[tokio::test]
    async fn test_dropped_session_frees_host_subscription() {
        let host = HostPlatform::new(PermissionState::Fine);
        let open_session = || {
            LocationSession::with_platform(TrackingConfig::default(), Arc::new(host.clone()))
                .unwrap()
        };
        let ready = || async {
            while !host.has_pending_settings_check() {
                tokio::task::yield_now().await;
            }
            host.report_settings_ready();
        };

        let first = open_session();
        let (checked, _) = tokio::join!(first.check_settings(), ready());
        checked.unwrap();
        first.start().await.unwrap();
        assert!(host.is_subscribed());

        drop(first);
        assert!(!host.is_subscribed());
        assert!(!host.push_locations(&[(1.0, 1.0)]));

        let second = open_session();
        let (checked, _) = tokio::join!(second.check_settings(), ready());
        checked.unwrap();
        second.start().await.unwrap();
        assert!(second.is_tracking().unwrap());
        assert!(host.is_subscribed());
    }

    #[tokio::test]
    async fn test_suspend_and_resume_skip_settings_check() {
        let platform = FakePlatform::ready(PermissionState::Fine);
        let (session, received) = collecting_session(&platform);
        session.check_settings().await.unwrap();
        session.start().await.unwrap();

        session.suspend().await.unwrap();
        assert_eq!(session.state().unwrap(), SessionState::Stopped);
        assert!(!platform.is_subscribed());

        session.resume().await.unwrap();
        assert!(session.is_tracking().unwrap());
        assert_eq!(platform.settings_checks(), 1);

        platform.push(&[(5.0, 5.0)]);
        settle().await;
        assert_eq!(received.lock().unwrap().len(), 1);

        // A second resume without a suspend does nothing
        session.stop().await.unwrap();
        session.resume().await.unwrap();
        assert_eq!(session.state().unwrap(), SessionState::Stopped);
    }

    #[tokio::test]
    async fn test_suspend_while_idle_does_not_resume() {
        let platform = FakePlatform::ready(PermissionState::Fine);
        let (session, _) = collecting_session(&platform);
        session.check_settings().await.unwrap();

        session.suspend().await.unwrap();
        session.resume().await.unwrap();
        assert_eq!(session.state().unwrap(), SessionState::Idle);
        assert_eq!(platform.subscribes(), 0);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let platform = Arc::new(FakePlatform::ready(PermissionState::Fine));
        let config = TrackingConfig {
            min_interval_ms: 0,
            ..TrackingConfig::default()
        };
        assert!(matches!(
            LocationSession::with_platform(config, platform),
            Err(TrackerError::InvalidConfig(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_toggles_serialize() {
        let platform = FakePlatform::ready(PermissionState::Fine);
        let session = Arc::new(
            LocationSession::with_platform(TrackingConfig::default(), Arc::new(platform.clone()))
                .unwrap(),
        );
        session.check_settings().await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..20 {
            let s = session.clone();
            tasks.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    s.start().await
                } else {
                    s.stop().await
                }
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(session.is_tracking().unwrap(), platform.is_subscribed());
    }
}
