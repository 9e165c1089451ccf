//! Platform bridge driven by the embedding host.
//!
//! The host (the Android activity over JNI) owns the real permission,
//! settings and fused-location clients. It pushes their results in here, and
//! the session consumes them through the collaborator traits.

use super::{
    FeedError, LocationFeed, PermissionProvider, PermissionState, ResolutionHandle,
    SettingsClient, SettingsOutcome, SubscriptionHandle,
};
use crate::config::TrackingConfig;
use crate::sample::{LocationBatch, LocationSample};
use futures::future::{self, BoxFuture, FutureExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, oneshot};

struct HostInner {
    permission: Mutex<PermissionState>,
    pending_check: Mutex<Option<oneshot::Sender<SettingsOutcome>>>,
    subscription: Mutex<Option<(SubscriptionHandle, mpsc::Sender<LocationBatch>)>>,
    last_known: Mutex<Option<LocationSample>>,
    next_handle: AtomicU64,
    dropped_batches: AtomicU64,
}

#[derive(Clone)]
pub struct HostPlatform {
    inner: Arc<HostInner>,
}

// Plain values only; a poisoned lock still holds consistent data
fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl HostPlatform {
    pub fn new(permission: PermissionState) -> Self {
        HostPlatform {
            inner: Arc::new(HostInner {
                permission: Mutex::new(permission),
                pending_check: Mutex::new(None),
                subscription: Mutex::new(None),
                last_known: Mutex::new(None),
                next_handle: AtomicU64::new(1),
                dropped_batches: AtomicU64::new(0),
            }),
        }
    }

    pub fn set_permission(&self, permission: PermissionState) {
        log::debug!("Host reported permission {:?}", permission);
        *guard(&self.inner.permission) = permission;
    }

    pub fn has_pending_settings_check(&self) -> bool {
        guard(&self.inner.pending_check).is_some()
    }

    /// Answer the outstanding settings check; false if none was waiting
    pub fn report_settings(&self, outcome: SettingsOutcome) -> bool {
        let pending = guard(&self.inner.pending_check).take();
        match pending {
            Some(tx) => tx.send(outcome).is_ok(),
            None => {
                log::warn!("Settings result {:?} with no pending check", outcome);
                false
            }
        }
    }

    pub fn report_settings_ready(&self) -> bool {
        self.report_settings(SettingsOutcome::Ready)
    }

    pub fn report_settings_resolvable(&self, request_code: u64) -> bool {
        self.report_settings(SettingsOutcome::ResolutionRequired(ResolutionHandle::new(
            request_code,
        )))
    }

    pub fn report_settings_unresolvable(&self, reason: impl Into<String>) -> bool {
        self.report_settings(SettingsOutcome::Unresolvable(reason.into()))
    }

    pub fn set_last_known(&self, fix: Option<(f64, f64)>) {
        *guard(&self.inner.last_known) = fix.map(|(lat, lon)| LocationSample::new(lat, lon));
    }

    pub fn is_subscribed(&self) -> bool {
        guard(&self.inner.subscription).is_some()
    }

    /// Forward one platform callback into the active subscription.
    ///
    /// Returns false when nothing is subscribed, the session has gone away,
    /// or the channel is full (the batch is dropped).
    pub fn push_locations(&self, coords: &[(f64, f64)]) -> bool {
        if coords.is_empty() {
            return false;
        }
        let sub = guard(&self.inner.subscription);
        let Some((handle, tx)) = sub.as_ref() else {
            log::debug!("Dropping {} fixes, no active subscription", coords.len());
            return false;
        };

        match tx.try_send(LocationBatch::from_coords(coords)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Closed(_)) => {
                log::debug!("Subscription {} closed by session", handle.0);
                false
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                let dropped = self.inner.dropped_batches.fetch_add(1, Ordering::Relaxed) + 1;
                log::warn!("Location channel full, dropped batch ({} total)", dropped);
                false
            }
        }
    }

    pub fn dropped_batches(&self) -> u64 {
        self.inner.dropped_batches.load(Ordering::Relaxed)
    }
}

impl PermissionProvider for HostPlatform {
    fn permission_state(&self) -> PermissionState {
        *guard(&self.inner.permission)
    }
}

impl SettingsClient for HostPlatform {
    fn check_location_settings(
        &self,
        requirements: &TrackingConfig,
    ) -> BoxFuture<'static, SettingsOutcome> {
        let (tx, rx) = oneshot::channel();
        if guard(&self.inner.pending_check).replace(tx).is_some() {
            log::debug!("Superseding previous settings check");
        }
        log::debug!(
            "Awaiting host settings check for {} at {} ms",
            requirements.accuracy_tier,
            requirements.min_interval_ms
        );

        async move {
            rx.await.unwrap_or_else(|_| {
                SettingsOutcome::Unresolvable("settings check abandoned by host".to_string())
            })
        }
        .boxed()
    }
}

impl LocationFeed for HostPlatform {
    fn subscribe(
        &self,
        _config: &TrackingConfig,
        sink: mpsc::Sender<LocationBatch>,
    ) -> Result<SubscriptionHandle, FeedError> {
        let mut sub = guard(&self.inner.subscription);
        if sub.is_some() {
            return Err(FeedError::AlreadySubscribed);
        }
        let handle = SubscriptionHandle(self.inner.next_handle.fetch_add(1, Ordering::Relaxed));
        *sub = Some((handle, sink));
        Ok(handle)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) -> BoxFuture<'static, Result<(), FeedError>> {
        let mut sub = guard(&self.inner.subscription);
        let result = if matches!(sub.as_ref(), Some((active, _)) if *active == handle) {
            *sub = None;
            Ok(())
        } else {
            Err(FeedError::UnknownSubscription(handle.0))
        };
        future::ready(result).boxed()
    }

    fn last_known(&self) -> BoxFuture<'static, Result<Option<LocationSample>, FeedError>> {
        let cached = guard(&self.inner.last_known).clone();
        future::ready(Ok(cached)).boxed()
    }
}
