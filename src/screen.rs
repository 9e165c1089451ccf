//! Headless presenter for the single tracking screen.
//!
//! Holds what the activity used to keep on its views: the toggle label
//! (derived from the session state), whether the toggle is enabled, the
//! pending settings-resolution handle, and the newest-first location log.

use crate::config::TrackingConfig;
use crate::error::{TrackerError, TrackerResult};
use crate::platform::ResolutionHandle;
use crate::sample::LocationSample;
use crate::session::{LocationObserver, LocationSession, SessionState, SettingsReadiness};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub const START_LABEL: &str = "start tracking";
pub const STOP_LABEL: &str = "stop tracking";
/// Logged when the platform has no cached fix
pub const NO_FIX_LINE: &str = "null, null";

/// Append-only text log, newest line first
#[derive(Debug, Default, Clone)]
pub struct LocationLog {
    text: String,
}

impl LocationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prepend(&mut self, line: &str) {
        self.text = format!("{}\n{}", line, self.text);
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn lines(&self) -> Vec<String> {
        self.text.lines().map(str::to_string).collect()
    }

    pub fn len(&self) -> usize {
        self.text.lines().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

struct LogObserver {
    log: Arc<Mutex<LocationLog>>,
}

impl LocationObserver for LogObserver {
    fn on_location(&self, sample: LocationSample) {
        match self.log.lock() {
            Ok(mut log) => log.prepend(&sample.to_string()),
            Err(_) => log::error!("Location log lock poisoned, dropping {}", sample),
        }
    }
}

/// Snapshot of a run, written by the CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub state: SessionState,
    pub readiness: SettingsReadiness,
    pub config: TrackingConfig,
    pub delivered_samples: u64,
    pub log_lines: Vec<String>,
}

impl SessionSummary {
    pub fn to_json(&self) -> TrackerResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| TrackerError::Internal(format!("JSON serialization failed: {}", e)))
    }
}

pub struct TrackerScreen {
    session: Arc<LocationSession>,
    log: Arc<Mutex<LocationLog>>,
    button_enabled: AtomicBool,
    pending_resolution: Mutex<Option<ResolutionHandle>>,
}

impl TrackerScreen {
    /// Bind a screen to the session and register its log as the observer
    pub fn new(session: Arc<LocationSession>) -> TrackerResult<Self> {
        let log = Arc::new(Mutex::new(LocationLog::new()));
        session.set_observer(Arc::new(LogObserver { log: log.clone() }))?;

        Ok(TrackerScreen {
            session,
            log,
            button_enabled: AtomicBool::new(true),
            pending_resolution: Mutex::new(None),
        })
    }

    pub fn session(&self) -> &Arc<LocationSession> {
        &self.session
    }

    /// Startup: settings check and last-known fetch run independently
    pub async fn on_create(&self) -> TrackerResult<()> {
        let (settings, last_known) =
            futures::join!(self.refresh_settings(), self.load_last_known());

        if let Err(e) = settings {
            log::info!("Tracking not ready after startup check: {}", e);
        }
        last_known
    }

    pub async fn on_toggle(&self) -> TrackerResult<SessionState> {
        if !self.button_enabled() {
            log::debug!("Toggle ignored, tracking disabled");
            return self.session.state();
        }

        let result = if self.session.is_tracking()? {
            self.session.stop().await
        } else {
            self.session.start().await
        };

        if let Err(e) = &result {
            log::warn!("Toggle failed: {}", e);
        }
        result?;
        self.session.state()
    }

    /// Outcome of the settings dialog shown for a pending resolution
    pub async fn on_resolution_result(&self, accepted: bool) -> TrackerResult<()> {
        let pending = self.lock_pending()?.take();
        if pending.is_none() {
            log::debug!("Resolution result with no pending resolution");
        }
        if !accepted {
            log::info!("Location settings resolution declined");
            return Ok(());
        }
        self.refresh_settings().await.map(|_| ())
    }

    pub async fn on_pause(&self) -> TrackerResult<()> {
        self.session.suspend().await
    }

    pub async fn on_resume(&self) -> TrackerResult<()> {
        self.session.resume().await
    }

    pub fn button_label(&self) -> &'static str {
        match self.session.state() {
            Ok(SessionState::Tracking) => STOP_LABEL,
            _ => START_LABEL,
        }
    }

    pub fn button_enabled(&self) -> bool {
        self.button_enabled.load(Ordering::Relaxed)
    }

    pub fn pending_resolution(&self) -> TrackerResult<Option<ResolutionHandle>> {
        Ok(self.lock_pending()?.clone())
    }

    pub fn log_text(&self) -> TrackerResult<String> {
        Ok(self.lock_log()?.text().to_string())
    }

    pub fn log_lines(&self) -> TrackerResult<Vec<String>> {
        Ok(self.lock_log()?.lines())
    }

    pub fn summary(&self) -> TrackerResult<SessionSummary> {
        Ok(SessionSummary {
            state: self.session.state()?,
            readiness: self.session.readiness()?,
            config: self.session.config().clone(),
            delivered_samples: self.session.delivered_count()?,
            log_lines: self.log_lines()?,
        })
    }

    async fn refresh_settings(&self) -> TrackerResult<()> {
        match self.session.check_settings().await {
            Ok(_) => Ok(()),
            Err(TrackerError::SettingsResolutionRequired(handle)) => {
                *self.lock_pending()? = Some(handle.clone());
                Err(TrackerError::SettingsResolutionRequired(handle))
            }
            Err(e) => Err(e),
        }
    }

    async fn load_last_known(&self) -> TrackerResult<()> {
        if !self.session.permission_state().is_granted() {
            log::info!("Location permission not granted, tracking disabled");
            self.button_enabled.store(false, Ordering::Relaxed);
            return Ok(());
        }
        self.button_enabled.store(true, Ordering::Relaxed);

        let line = match self.session.last_known_location().await? {
            Some(sample) => sample.to_string(),
            None => NO_FIX_LINE.to_string(),
        };
        self.lock_log()?.prepend(&line);
        Ok(())
    }

    fn lock_log(&self) -> TrackerResult<std::sync::MutexGuard<'_, LocationLog>> {
        self.log
            .lock()
            .map_err(|_| TrackerError::lock_poisoned("location log"))
    }

    fn lock_pending(&self) -> TrackerResult<std::sync::MutexGuard<'_, Option<ResolutionHandle>>> {
        self.pending_resolution
            .lock()
            .map_err(|_| TrackerError::lock_poisoned("pending resolution"))
    }
}
