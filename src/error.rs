use crate::platform::ResolutionHandle;
use thiserror::Error;

/// GPS tracker error types
#[derive(Error, Debug, Clone)]
pub enum TrackerError {
    #[error("Location permission not granted")]
    PermissionDenied,

    #[error("Location settings have not been checked successfully")]
    SettingsNotReady,

    #[error("Location settings cannot be satisfied: {0}")]
    SettingsUnresolvable(String),

    #[error("Location settings need user resolution (handle {})", .0.id())]
    SettingsResolutionRequired(ResolutionHandle),

    #[error("Feed subscription failed: {0}")]
    FeedSubscriptionFailed(String),

    #[error("Unsubscribe failed: {0}")]
    UnsubscribeFailed(String),

    #[error("Last known location query failed: {0}")]
    QueryFailed(String),

    #[error("Invalid tracking config: {0}")]
    InvalidConfig(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("JNI error: {0}")]
    JniError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TrackerError {
    /// Unresolvable settings disable tracking until a fresh check is issued
    pub fn is_fatal(&self) -> bool {
        matches!(self, TrackerError::SettingsUnresolvable(_))
    }

    pub(crate) fn lock_poisoned(what: &str) -> Self {
        TrackerError::Internal(format!("Failed to acquire {} lock", what))
    }
}

/// Result type for tracker operations
pub type TrackerResult<T> = Result<T, TrackerError>;

/// Throw Java exception from Rust error
#[cfg(feature = "android")]
pub fn throw_java_exception(env: &mut jni::JNIEnv, error: &TrackerError) -> TrackerResult<()> {
    let exception_class = match error {
        TrackerError::PermissionDenied => "java/lang/SecurityException",
        TrackerError::SettingsNotReady
        | TrackerError::SettingsUnresolvable(_)
        | TrackerError::SettingsResolutionRequired(_) => "java/lang/IllegalStateException",
        TrackerError::InvalidConfig(_) | TrackerError::Config(_) => {
            "java/lang/IllegalArgumentException"
        }
        TrackerError::FeedSubscriptionFailed(_)
        | TrackerError::UnsubscribeFailed(_)
        | TrackerError::QueryFailed(_) => "java/io/IOException",
        TrackerError::JniError(_) | TrackerError::Internal(_) => "java/lang/RuntimeException",
    };

    let message = error.to_string();
    env.throw_new(exception_class, message)
        .map_err(|_| TrackerError::JniError("Failed to throw exception".to_string()))?;

    Ok(())
}
