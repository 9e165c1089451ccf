//! Platform collaborators the session talks to.
//!
//! Permission, settings resolution and the location feed all belong to the
//! host OS. The session only sees them through these traits, so the same core
//! runs against the Android bridge, the simulated feed, or a test double.

pub mod host;
pub mod simulated;

#[cfg(test)]
pub(crate) mod fake;

use crate::config::TrackingConfig;
use crate::error::TrackerError;
use crate::sample::{LocationBatch, LocationSample};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Location grant as reported by the OS permission subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermissionState {
    None,
    /// Approximate location only
    Coarse,
    /// Precise location
    Fine,
}

impl PermissionState {
    pub fn is_granted(self) -> bool {
        self != PermissionState::None
    }

    /// Decode the integer code used by the JNI binding (0 none, 1 coarse, 2 fine)
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(PermissionState::None),
            1 => Some(PermissionState::Coarse),
            2 => Some(PermissionState::Fine),
            _ => None,
        }
    }
}

impl FromStr for PermissionState {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(PermissionState::None),
            "coarse" => Ok(PermissionState::Coarse),
            "fine" => Ok(PermissionState::Fine),
            other => Err(TrackerError::Config(format!(
                "unknown permission state '{}'",
                other
            ))),
        }
    }
}

/// Opaque token the UI can use to show the platform's settings dialog
#[derive(Clone)]
pub struct ResolutionHandle {
    id: u64,
    payload: Option<Arc<dyn Any + Send + Sync>>,
}

impl ResolutionHandle {
    pub fn new(id: u64) -> Self {
        Self { id, payload: None }
    }

    /// Attach a platform object (for example an intent wrapper) to the handle
    pub fn with_payload<T: Any + Send + Sync>(id: u64, payload: T) -> Self {
        Self {
            id,
            payload: Some(Arc::new(payload)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn payload<T: Any>(&self) -> Option<&T> {
        self.payload.as_ref().and_then(|p| p.downcast_ref::<T>())
    }
}

impl fmt::Debug for ResolutionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolutionHandle")
            .field("id", &self.id)
            .field("has_payload", &self.payload.is_some())
            .finish()
    }
}

impl PartialEq for ResolutionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// Result of asking the platform whether its settings satisfy a request
#[derive(Debug, Clone, PartialEq)]
pub enum SettingsOutcome {
    Ready,
    /// The user can fix the settings through a system dialog
    ResolutionRequired(ResolutionHandle),
    Unresolvable(String),
}

/// Identifies one active feed subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub u64);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeedError {
    #[error("feed already has an active subscription")]
    AlreadySubscribed,

    #[error("unknown subscription {0}")]
    UnknownSubscription(u64),

    #[error("location feed unavailable: {0}")]
    Unavailable(String),

    #[error("platform error: {0}")]
    Platform(String),
}

pub trait PermissionProvider: Send + Sync {
    /// Current grant; read fresh on every call
    fn permission_state(&self) -> PermissionState;
}

pub trait SettingsClient: Send + Sync {
    fn check_location_settings(
        &self,
        requirements: &TrackingConfig,
    ) -> BoxFuture<'static, SettingsOutcome>;
}

pub trait LocationFeed: Send + Sync {
    /// Start delivering batches into `sink` at the configured cadence
    fn subscribe(
        &self,
        config: &TrackingConfig,
        sink: mpsc::Sender<LocationBatch>,
    ) -> Result<SubscriptionHandle, FeedError>;

    fn unsubscribe(&self, handle: SubscriptionHandle) -> BoxFuture<'static, Result<(), FeedError>>;

    /// One-shot cached fix, `None` when the platform has none
    fn last_known(&self) -> BoxFuture<'static, Result<Option<LocationSample>, FeedError>>;
}
