//! Scripted platform double for session and screen tests.

use super::{
    FeedError, LocationFeed, PermissionProvider, PermissionState, SettingsClient,
    SettingsOutcome, SubscriptionHandle,
};
use crate::config::TrackingConfig;
use crate::sample::{LocationBatch, LocationSample};
use futures::future::{BoxFuture, FutureExt};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};

struct FakeInner {
    permission: Mutex<PermissionState>,
    settings: Mutex<SettingsOutcome>,
    sink: Mutex<Option<mpsc::Sender<LocationBatch>>>,
    last_known: Mutex<Option<LocationSample>>,
    unsubscribe_gate: Mutex<Option<Arc<Notify>>>,
    fail_subscribe: AtomicBool,
    fail_unsubscribe: AtomicBool,
    fail_query: AtomicBool,
    settings_checks: AtomicUsize,
    subscribes: AtomicUsize,
    unsubscribes: AtomicUsize,
}

#[derive(Clone)]
pub(crate) struct FakePlatform {
    inner: Arc<FakeInner>,
}

impl FakePlatform {
    pub fn new(permission: PermissionState, settings: SettingsOutcome) -> Self {
        FakePlatform {
            inner: Arc::new(FakeInner {
                permission: Mutex::new(permission),
                settings: Mutex::new(settings),
                sink: Mutex::new(None),
                last_known: Mutex::new(None),
                unsubscribe_gate: Mutex::new(None),
                fail_subscribe: AtomicBool::new(false),
                fail_unsubscribe: AtomicBool::new(false),
                fail_query: AtomicBool::new(false),
                settings_checks: AtomicUsize::new(0),
                subscribes: AtomicUsize::new(0),
                unsubscribes: AtomicUsize::new(0),
            }),
        }
    }

    pub fn ready(permission: PermissionState) -> Self {
        Self::new(permission, SettingsOutcome::Ready)
    }

    pub fn set_permission(&self, permission: PermissionState) {
        *self.inner.permission.lock().unwrap() = permission;
    }

    pub fn set_settings(&self, outcome: SettingsOutcome) {
        *self.inner.settings.lock().unwrap() = outcome;
    }

    pub fn set_last_known(&self, sample: Option<LocationSample>) {
        *self.inner.last_known.lock().unwrap() = sample;
    }

    pub fn fail_subscribe(&self, fail: bool) {
        self.inner.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    pub fn fail_unsubscribe(&self, fail: bool) {
        self.inner.fail_unsubscribe.store(fail, Ordering::SeqCst);
    }

    pub fn fail_query(&self, fail: bool) {
        self.inner.fail_query.store(fail, Ordering::SeqCst);
    }

    /// Hold unsubscribe completion until the returned notify fires
    pub fn gate_unsubscribe(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.inner.unsubscribe_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Deliver one platform callback; false if nothing accepted it
    pub fn push(&self, coords: &[(f64, f64)]) -> bool {
        let sink = self.inner.sink.lock().unwrap();
        match sink.as_ref() {
            Some(tx) => tx.try_send(LocationBatch::from_coords(coords)).is_ok(),
            None => false,
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.inner.sink.lock().unwrap().is_some()
    }

    pub fn settings_checks(&self) -> usize {
        self.inner.settings_checks.load(Ordering::SeqCst)
    }

    pub fn subscribes(&self) -> usize {
        self.inner.subscribes.load(Ordering::SeqCst)
    }

    pub fn unsubscribes(&self) -> usize {
        self.inner.unsubscribes.load(Ordering::SeqCst)
    }
}

impl PermissionProvider for FakePlatform {
    fn permission_state(&self) -> PermissionState {
        *self.inner.permission.lock().unwrap()
    }
}

impl SettingsClient for FakePlatform {
    fn check_location_settings(
        &self,
        _requirements: &TrackingConfig,
    ) -> BoxFuture<'static, SettingsOutcome> {
        self.inner.settings_checks.fetch_add(1, Ordering::SeqCst);
        let outcome = self.inner.settings.lock().unwrap().clone();
        async move {
            tokio::task::yield_now().await;
            outcome
        }
        .boxed()
    }
}

impl LocationFeed for FakePlatform {
    fn subscribe(
        &self,
        _config: &TrackingConfig,
        sink: mpsc::Sender<LocationBatch>,
    ) -> Result<SubscriptionHandle, FeedError> {
        if self.inner.fail_subscribe.load(Ordering::SeqCst) {
            return Err(FeedError::Unavailable("no location provider".to_string()));
        }
        let mut current = self.inner.sink.lock().unwrap();
        if current.is_some() {
            return Err(FeedError::AlreadySubscribed);
        }
        *current = Some(sink);
        let n = self.inner.subscribes.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SubscriptionHandle(n as u64))
    }

    fn unsubscribe(&self, _handle: SubscriptionHandle) -> BoxFuture<'static, Result<(), FeedError>> {
        self.inner.unsubscribes.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.clone();
        let gate = inner.unsubscribe_gate.lock().unwrap().take();
        async move {
            if let Some(gate) = gate {
                gate.notified().await;
            }
            *inner.sink.lock().unwrap() = None;
            if inner.fail_unsubscribe.load(Ordering::SeqCst) {
                Err(FeedError::Platform("remove task failed".to_string()))
            } else {
                Ok(())
            }
        }
        .boxed()
    }

    fn last_known(&self) -> BoxFuture<'static, Result<Option<LocationSample>, FeedError>> {
        let result = if self.inner.fail_query.load(Ordering::SeqCst) {
            Err(FeedError::Unavailable("location services down".to_string()))
        } else {
            Ok(self.inner.last_known.lock().unwrap().clone())
        };
        async move { result }.boxed()
    }
}
