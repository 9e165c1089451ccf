// GPS Tracker core library
// Location session state machine shared by the Android binding and the CLI

#[cfg(feature = "android")]
pub mod android_jni;
pub mod config;
pub mod error;
pub mod platform;
pub mod sample;
pub mod screen;
pub mod session;

pub use config::{AccuracyTier, TrackingConfig};
pub use error::{TrackerError, TrackerResult};
pub use platform::{
    FeedError, LocationFeed, PermissionProvider, PermissionState, ResolutionHandle,
    SettingsClient, SettingsOutcome, SubscriptionHandle,
};
pub use sample::{LocationBatch, LocationSample};
pub use screen::{LocationLog, SessionSummary, TrackerScreen};
pub use session::{
    LocationObserver, LocationSession, ResolvedConfig, SessionState, SettingsReadiness,
};
