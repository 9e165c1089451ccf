use crate::config::TrackingConfig;
use crate::error::{throw_java_exception, TrackerError, TrackerResult};
use crate::platform::host::HostPlatform;
use crate::platform::PermissionState;
use crate::screen::TrackerScreen;
use crate::session::LocationSession;
use jni::objects::{JClass, JDoubleArray, JString};
use jni::sys::{jboolean, jdouble, jint, jstring, JNI_FALSE, JNI_TRUE};
use jni::JNIEnv;
use std::sync::{Arc, Mutex};
use tokio::runtime::Runtime;

const LOG_TAG: &str = "GpsTracker";

/// Everything the activity talks to, created on first JNI call
struct AndroidApp {
    runtime: Runtime,
    platform: HostPlatform,
    screen: Arc<TrackerScreen>,
}

// Global app state - stored as static to persist across JNI calls
lazy_static::lazy_static! {
    static ref GLOBAL_APP: Arc<Mutex<Option<Arc<AndroidApp>>>> = Arc::new(Mutex::new(None));
}

fn init_logging() {
    #[cfg(target_os = "android")]
    {
        let _ = android_log::init(LOG_TAG);
    }
}

/// Get or create the app state
fn get_app() -> TrackerResult<Arc<AndroidApp>> {
    let mut app_guard = GLOBAL_APP
        .lock()
        .map_err(|_| TrackerError::Internal("Failed to acquire global app lock".to_string()))?;

    if let Some(app) = app_guard.as_ref() {
        return Ok(Arc::clone(app));
    }

    init_logging();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .map_err(|e| TrackerError::Internal(format!("Failed to build runtime: {}", e)))?;

    let platform = HostPlatform::new(PermissionState::None);
    let session = Arc::new(LocationSession::with_platform(
        TrackingConfig::default(),
        Arc::new(platform.clone()),
    )?);
    let screen = Arc::new(TrackerScreen::new(session)?);

    let app = Arc::new(AndroidApp {
        runtime,
        platform,
        screen,
    });
    *app_guard = Some(Arc::clone(&app));
    log::info!("[{}] Tracker initialised", LOG_TAG);
    Ok(app)
}

fn status_code(env: &mut JNIEnv, result: TrackerResult<()>) -> jint {
    match result {
        Ok(_) => 0,
        Err(e) => {
            let _ = throw_java_exception(env, &e);
            -1
        }
    }
}

fn to_jboolean(value: bool) -> jboolean {
    if value {
        JNI_TRUE
    } else {
        JNI_FALSE
    }
}

fn new_java_string(env: &mut JNIEnv, value: &str) -> jstring {
    match env.new_string(value) {
        Ok(jstr) => jstr.into_raw(),
        Err(_) => {
            let _ = throw_java_exception(
                env,
                &TrackerError::JniError("Failed to create Java string".to_string()),
            );
            std::ptr::null_mut()
        }
    }
}

/// JNI: Start the settings check and last-known fetch.
/// Does not block; the host answers the check through reportSettings*.
/// Returns: 0 on success, -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_example_gpsexample_JniBinding_onCreate(
    mut env: JNIEnv,
    _class: JClass,
) -> jint {
    let result = get_app().map(|app| {
        let screen = Arc::clone(&app.screen);
        app.runtime.spawn(async move {
            if let Err(e) = screen.on_create().await {
                log::warn!("[{}] Startup failed: {}", LOG_TAG, e);
            }
        });
    });
    status_code(&mut env, result)
}

/// JNI: Report permission grant (0 = none, 1 = coarse, 2 = fine)
#[no_mangle]
pub extern "C" fn Java_com_example_gpsexample_JniBinding_setPermission(
    mut env: JNIEnv,
    _class: JClass,
    code: jint,
) -> jint {
    let result = get_app().and_then(|app| {
        let permission = PermissionState::from_code(code).ok_or_else(|| {
            TrackerError::InvalidConfig(format!("unknown permission code {}", code))
        })?;
        app.platform.set_permission(permission);
        Ok(())
    });
    status_code(&mut env, result)
}

/// JNI: Device settings satisfy the location request
#[no_mangle]
pub extern "C" fn Java_com_example_gpsexample_JniBinding_reportSettingsReady(
    mut env: JNIEnv,
    _class: JClass,
) -> jboolean {
    match get_app() {
        Ok(app) => to_jboolean(app.platform.report_settings_ready()),
        Err(e) => {
            let _ = throw_java_exception(&mut env, &e);
            JNI_FALSE
        }
    }
}

/// JNI: Settings can be fixed through the system dialog for `requestCode`
#[no_mangle]
pub extern "C" fn Java_com_example_gpsexample_JniBinding_reportSettingsResolvable(
    mut env: JNIEnv,
    _class: JClass,
    request_code: jint,
) -> jboolean {
    match get_app() {
        Ok(app) => to_jboolean(
            app.platform
                .report_settings_resolvable(request_code.max(0) as u64),
        ),
        Err(e) => {
            let _ = throw_java_exception(&mut env, &e);
            JNI_FALSE
        }
    }
}

/// JNI: Settings check failed without a resolution
#[no_mangle]
pub extern "C" fn Java_com_example_gpsexample_JniBinding_reportSettingsUnresolvable(
    mut env: JNIEnv,
    _class: JClass,
    reason: JString,
) -> jboolean {
    let result = get_app().and_then(|app| {
        let reason: String = env
            .get_string(&reason)
            .map_err(|e| TrackerError::JniError(format!("Failed to read reason: {}", e)))?
            .into();
        Ok(app.platform.report_settings_unresolvable(reason))
    });
    match result {
        Ok(answered) => to_jboolean(answered),
        Err(e) => {
            let _ = throw_java_exception(&mut env, &e);
            JNI_FALSE
        }
    }
}

/// JNI: Outcome of the settings resolution dialog
#[no_mangle]
pub extern "C" fn Java_com_example_gpsexample_JniBinding_onResolutionResult(
    mut env: JNIEnv,
    _class: JClass,
    accepted: jboolean,
) -> jint {
    let result = get_app().map(|app| {
        let screen = Arc::clone(&app.screen);
        app.runtime.spawn(async move {
            if let Err(e) = screen.on_resolution_result(accepted != JNI_FALSE).await {
                log::warn!("[{}] Settings re-check failed: {}", LOG_TAG, e);
            }
        });
    });
    status_code(&mut env, result)
}

/// JNI: Toggle button clicked
/// Returns: 0 on success, -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_example_gpsexample_JniBinding_toggle(
    mut env: JNIEnv,
    _class: JClass,
) -> jint {
    let result = get_app().and_then(|app| {
        let state = app.runtime.block_on(app.screen.on_toggle())?;
        log::info!("[{}] Toggled to {}", LOG_TAG, state.as_str());
        Ok(())
    });
    status_code(&mut env, result)
}

/// JNI: One LocationResult callback
/// Parameters: parallel latitude/longitude arrays, oldest fix first
/// Returns: 1 if the batch was accepted, 0 otherwise
#[no_mangle]
pub extern "C" fn Java_com_example_gpsexample_JniBinding_pushLocations(
    mut env: JNIEnv,
    _class: JClass,
    latitudes: JDoubleArray,
    longitudes: JDoubleArray,
) -> jint {
    match push_locations_impl(&mut env, &latitudes, &longitudes) {
        Ok(accepted) => accepted as jint,
        Err(e) => {
            let _ = throw_java_exception(&mut env, &e);
            -1
        }
    }
}

fn push_locations_impl(
    env: &mut JNIEnv,
    latitudes: &JDoubleArray,
    longitudes: &JDoubleArray,
) -> TrackerResult<bool> {
    let app = get_app()?;
    let jni_err = |e: jni::errors::Error| TrackerError::JniError(e.to_string());

    let len = env.get_array_length(latitudes).map_err(jni_err)?;
    if env.get_array_length(longitudes).map_err(jni_err)? != len {
        return Err(TrackerError::InvalidConfig(
            "latitude and longitude arrays differ in length".to_string(),
        ));
    }

    let mut lats = vec![0.0 as jdouble; len as usize];
    let mut lons = vec![0.0 as jdouble; len as usize];
    env.get_double_array_region(latitudes, 0, &mut lats)
        .map_err(jni_err)?;
    env.get_double_array_region(longitudes, 0, &mut lons)
        .map_err(jni_err)?;

    let coords: Vec<(f64, f64)> = lats.into_iter().zip(lons).collect();
    Ok(app.platform.push_locations(&coords))
}

/// JNI: Cached fix from the fused client, or none
#[no_mangle]
pub extern "C" fn Java_com_example_gpsexample_JniBinding_setLastKnown(
    mut env: JNIEnv,
    _class: JClass,
    latitude: jdouble,
    longitude: jdouble,
    present: jboolean,
) -> jint {
    let result = get_app().map(|app| {
        let fix = (present != JNI_FALSE).then_some((latitude, longitude));
        app.platform.set_last_known(fix);
    });
    status_code(&mut env, result)
}

/// JNI: Activity paused
#[no_mangle]
pub extern "C" fn Java_com_example_gpsexample_JniBinding_onPause(
    mut env: JNIEnv,
    _class: JClass,
) -> jint {
    let result = get_app().and_then(|app| app.runtime.block_on(app.screen.on_pause()));
    status_code(&mut env, result)
}

/// JNI: Activity resumed
#[no_mangle]
pub extern "C" fn Java_com_example_gpsexample_JniBinding_onResume(
    mut env: JNIEnv,
    _class: JClass,
) -> jint {
    let result = get_app().and_then(|app| app.runtime.block_on(app.screen.on_resume()));
    status_code(&mut env, result)
}

#[no_mangle]
pub extern "C" fn Java_com_example_gpsexample_JniBinding_getButtonLabel(
    mut env: JNIEnv,
    _class: JClass,
) -> jstring {
    match get_app() {
        Ok(app) => new_java_string(&mut env, app.screen.button_label()),
        Err(e) => {
            let _ = throw_java_exception(&mut env, &e);
            std::ptr::null_mut()
        }
    }
}

#[no_mangle]
pub extern "C" fn Java_com_example_gpsexample_JniBinding_isButtonEnabled(
    mut env: JNIEnv,
    _class: JClass,
) -> jboolean {
    match get_app() {
        Ok(app) => to_jboolean(app.screen.button_enabled()),
        Err(e) => {
            let _ = throw_java_exception(&mut env, &e);
            JNI_FALSE
        }
    }
}

/// JNI: Location log text, newest line first
#[no_mangle]
pub extern "C" fn Java_com_example_gpsexample_JniBinding_getLogText(
    mut env: JNIEnv,
    _class: JClass,
) -> jstring {
    match get_app().and_then(|app| app.screen.log_text()) {
        Ok(text) => new_java_string(&mut env, &text),
        Err(e) => {
            let _ = throw_java_exception(&mut env, &e);
            std::ptr::null_mut()
        }
    }
}

/// JNI: Get current session state as string
/// Returns: "IDLE", "AWAITING_SETTINGS_CHECK", "TRACKING" or "STOPPED"
#[no_mangle]
pub extern "C" fn Java_com_example_gpsexample_JniBinding_getSessionState(
    mut env: JNIEnv,
    _class: JClass,
) -> jstring {
    match get_app().and_then(|app| app.screen.session().state()) {
        Ok(state) => new_java_string(&mut env, state.as_str()),
        Err(e) => {
            let _ = throw_java_exception(&mut env, &e);
            std::ptr::null_mut()
        }
    }
}
