use super::{
    FeedError, LocationFeed, PermissionProvider, PermissionState, SettingsClient,
    SettingsOutcome, SubscriptionHandle,
};
use crate::config::TrackingConfig;
use crate::sample::{LocationBatch, LocationSample};
use futures::future::{self, BoxFuture, FutureExt};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc::{self, error::TrySendError, Sender};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};

/// Jakarta, the default drift origin
pub const DEFAULT_ORIGIN: (f64, f64) = (-6.2, 106.816666);

/// Mock platform producing synthetic fixes on a timer
#[derive(Clone)]
pub struct SimulatedPlatform {
    permission: Arc<Mutex<PermissionState>>,
    settings: Arc<Mutex<SettingsOutcome>>,
    last_known: Arc<Mutex<Option<LocationSample>>>,
    task: Arc<Mutex<Option<(SubscriptionHandle, JoinHandle<()>)>>>,
    origin: (f64, f64),
    batch_size: usize,
    fail_unsubscribe: Arc<AtomicBool>,
    next_handle: Arc<AtomicU64>,
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SimulatedPlatform {
    pub fn new(permission: PermissionState) -> Self {
        Self {
            permission: Arc::new(Mutex::new(permission)),
            settings: Arc::new(Mutex::new(SettingsOutcome::Ready)),
            last_known: Arc::new(Mutex::new(None)),
            task: Arc::new(Mutex::new(None)),
            origin: DEFAULT_ORIGIN,
            batch_size: 1,
            fail_unsubscribe: Arc::new(AtomicBool::new(false)),
            next_handle: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn with_origin(mut self, latitude: f64, longitude: f64) -> Self {
        self.origin = (latitude, longitude);
        self
    }

    /// Fixes per delivered batch (at least one)
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn set_permission(&self, permission: PermissionState) {
        *guard(&self.permission) = permission;
    }

    pub fn set_settings_outcome(&self, outcome: SettingsOutcome) {
        *guard(&self.settings) = outcome;
    }

    pub fn set_last_known(&self, fix: Option<(f64, f64)>) {
        *guard(&self.last_known) = fix.map(|(lat, lon)| LocationSample::new(lat, lon));
    }

    pub fn set_fail_unsubscribe(&self, fail: bool) {
        self.fail_unsubscribe.store(fail, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        guard(&self.task)
            .as_ref()
            .map_or(false, |(_, task)| !task.is_finished())
    }
}

impl PermissionProvider for SimulatedPlatform {
    fn permission_state(&self) -> PermissionState {
        *guard(&self.permission)
    }
}

impl SettingsClient for SimulatedPlatform {
    fn check_location_settings(
        &self,
        _requirements: &TrackingConfig,
    ) -> BoxFuture<'static, SettingsOutcome> {
        future::ready(guard(&self.settings).clone()).boxed()
    }
}

impl LocationFeed for SimulatedPlatform {
    fn subscribe(
        &self,
        config: &TrackingConfig,
        sink: Sender<LocationBatch>,
    ) -> Result<SubscriptionHandle, FeedError> {
        let mut task = guard(&self.task);
        if task.as_ref().map_or(false, |(_, t)| !t.is_finished()) {
            return Err(FeedError::AlreadySubscribed);
        }

        let handle = SubscriptionHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let period = Duration::from_millis(config.fastest_interval_ms.max(1));
        let batch_size = self.batch_size.min(config.max_fixes_per_batch());
        let join = tokio::spawn(fix_loop(sink, period, batch_size, self.origin));
        *task = Some((handle, join));
        Ok(handle)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) -> BoxFuture<'static, Result<(), FeedError>> {
        let fail = self.fail_unsubscribe.load(Ordering::Relaxed);
        let mut task = guard(&self.task);
        let result = match task.take() {
            Some((active, join)) if active == handle => {
                join.abort();
                if fail {
                    Err(FeedError::Platform("removeLocationUpdates failed".to_string()))
                } else {
                    Ok(())
                }
            }
            other => {
                *task = other;
                Err(FeedError::UnknownSubscription(handle.0))
            }
        };
        future::ready(result).boxed()
    }

    fn last_known(&self) -> BoxFuture<'static, Result<Option<LocationSample>, FeedError>> {
        future::ready(Ok(guard(&self.last_known).clone())).boxed()
    }
}

async fn fix_loop(
    tx: Sender<LocationBatch>,
    period: Duration,
    batch_size: usize,
    origin: (f64, f64),
) {
    let mut interval = interval(period);
    let mut seq = 0u64;
    let mut batch_count = 0u64;

    loop {
        interval.tick().await;

        let fixes = (0..batch_size)
            .map(|_| {
                let fix = mock_fix(origin, seq);
                seq += 1;
                fix
            })
            .collect();

        match tx.try_send(LocationBatch::new(fixes)) {
            Ok(_) => {
                batch_count += 1;
                log::debug!("[sim] {} batches", batch_count);
            }
            Err(TrySendError::Closed(_)) => {
                log::debug!("[sim] Channel closed after {} batches", batch_count);
                break;
            }
            Err(TrySendError::Full(_)) => {
                // Session is behind, drop this batch
            }
        }
    }
}

fn mock_fix(origin: (f64, f64), seq: u64) -> LocationSample {
    let t = seq as f64;
    LocationSample::new(
        origin.0 + t * 0.00001,
        origin.1 + t * 0.00001 + (t * 0.5).sin() * 0.000005,
    )
}
