//! FFI bindings for the risk engine
//!
//! This module provides C-compatible functions for driving the engine from a
//! mobile host. Sensor updates may arrive on the platform's sensor thread
//! while ticks run on a background worker; the handle keeps the sensor buffer
//! outside the engine lock so sensor writes never wait on inference.
//!
//! Strings returned by these functions must be freed with `drisk_free_string`.

use parking_lot::Mutex;
use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;
use std::sync::Arc;

use chrono::Utc;

use crate::config::ScoringConfig;
use crate::error::{ScoringError, ScoringResult};
use crate::pipeline::RiskEngine;
use crate::sensor::SensorBuffer;

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

fn timestamp_or_now(timestamp_ms: i64) -> i64 {
    if timestamp_ms > 0 {
        timestamp_ms
    } else {
        Utc::now().timestamp_millis()
    }
}

// ============================================================================
// Engine lifecycle
// ============================================================================

/// Opaque handle to a RiskEngine
pub struct RiskEngineHandle {
    engine: Mutex<RiskEngine>,
    sensors: Arc<SensorBuffer>,
}

fn build_engine(model_path: Option<String>, config_json: Option<String>) -> ScoringResult<RiskEngine> {
    let config = match config_json {
        Some(json) => ScoringConfig::from_json(&json)?,
        None => ScoringConfig::default(),
    };
    match model_path {
        Some(path) => RiskEngine::from_model_file(config, path),
        None => RiskEngine::degraded(config, "no model provided"),
    }
}

/// Create a new engine.
///
/// # Safety
/// - `model_path` may be NULL (engine starts degraded) or a valid C string.
/// - `config_json` may be NULL (defaults) or a valid C string holding a JSON config.
/// - A model that fails to load yields a degraded engine, not NULL.
/// - Returns NULL on invalid configuration; call `drisk_last_error` for details.
/// - Must be freed with `drisk_engine_free`.
#[no_mangle]
pub unsafe extern "C" fn drisk_engine_new(
    model_path: *const c_char,
    config_json: *const c_char,
) -> *mut RiskEngineHandle {
    clear_last_error();

    let model_path = cstr_to_string(model_path);
    let config_json = cstr_to_string(config_json);

    match build_engine(model_path, config_json) {
        Ok(engine) => {
            let sensors = engine.sensors();
            Box::into_raw(Box::new(RiskEngineHandle {
                engine: Mutex::new(engine),
                sensors,
            }))
        }
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free an engine and release its model session.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `drisk_engine_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn drisk_engine_free(handle: *mut RiskEngineHandle) {
    if !handle.is_null() {
        let handle = *Box::from_raw(handle);
        handle.engine.into_inner().shutdown();
    }
}

// ============================================================================
// Sensor input
// ============================================================================

/// Record an accelerometer reading.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `drisk_engine_new`.
/// - `timestamp_ms <= 0` stamps the reading with the current wall clock.
/// - Returns 0 on success, -1 on a NULL handle.
#[no_mangle]
pub unsafe extern "C" fn drisk_update_accelerometer(
    handle: *const RiskEngineHandle,
    x: f32,
    y: f32,
    z: f32,
    timestamp_ms: i64,
) -> i32 {
    if handle.is_null() {
        set_last_error("Null engine pointer");
        return -1;
    }
    (*handle)
        .sensors
        .update_accelerometer_at(x, y, z, timestamp_or_now(timestamp_ms));
    0
}

/// Record a gyroscope reading.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `drisk_engine_new`.
/// - `timestamp_ms <= 0` stamps the reading with the current wall clock.
/// - Returns 0 on success, -1 on a NULL handle.
#[no_mangle]
pub unsafe extern "C" fn drisk_update_gyroscope(
    handle: *const RiskEngineHandle,
    x: f32,
    y: f32,
    z: f32,
    timestamp_ms: i64,
) -> i32 {
    if handle.is_null() {
        set_last_error("Null engine pointer");
        return -1;
    }
    (*handle)
        .sensors
        .update_gyroscope_at(x, y, z, timestamp_or_now(timestamp_ms));
    0
}

// ============================================================================
// Scoring
// ============================================================================

/// Score the current sensor buffer and return the tick outcome as JSON.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `drisk_engine_new`.
/// - Returns a newly allocated string that must be freed with `drisk_free_string`.
/// - Returns NULL on error; call `drisk_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn drisk_engine_tick(handle: *const RiskEngineHandle) -> *mut c_char {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }

    let outcome = (*handle).engine.lock().tick();
    match serde_json::to_string(&outcome) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&ScoringError::from(e).to_string());
            ptr::null_mut()
        }
    }
}

/// Current published score, or the neutral score for a NULL handle.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `drisk_engine_new`, or NULL.
#[no_mangle]
pub unsafe extern "C" fn drisk_engine_published(handle: *const RiskEngineHandle) -> f32 {
    if handle.is_null() {
        set_last_error("Null engine pointer");
        return crate::config::NEUTRAL_RISK;
    }
    (*handle).engine.lock().published()
}

/// Engine status (`ready` / `degraded`) as JSON.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `drisk_engine_new`.
/// - Returns a newly allocated string that must be freed with `drisk_free_string`.
/// - Returns NULL on error; call `drisk_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn drisk_engine_status(handle: *const RiskEngineHandle) -> *mut c_char {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }

    let status = (*handle).engine.lock().status().clone();
    match serde_json::to_string(&status) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&ScoringError::from(e).to_string());
            ptr::null_mut()
        }
    }
}

/// Start a new session on the same model.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `drisk_engine_new`.
/// - Returns 0 on success, -1 on a NULL handle.
#[no_mangle]
pub unsafe extern "C" fn drisk_engine_reset(handle: *const RiskEngineHandle) -> i32 {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null engine pointer");
        return -1;
    }
    (*handle).engine.lock().reset();
    0
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by engine functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by an engine function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn drisk_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next engine call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn drisk_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn drisk_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    unsafe fn take_string(ptr: *mut c_char) -> String {
        assert!(!ptr.is_null());
        let s = CStr::from_ptr(ptr).to_str().unwrap().to_string();
        drisk_free_string(ptr);
        s
    }

    #[test]
    fn test_ffi_engine_lifecycle_without_model() {
        unsafe {
            let handle = drisk_engine_new(ptr::null(), ptr::null());
            assert!(!handle.is_null());

            let status: serde_json::Value =
                serde_json::from_str(&take_string(drisk_engine_status(handle))).unwrap();
            assert_eq!(status["status"], "degraded");

            // Empty buffer: tick is skipped
            let tick: serde_json::Value =
                serde_json::from_str(&take_string(drisk_engine_tick(handle))).unwrap();
            assert_eq!(tick["outcome"], "skipped");
            assert_eq!(tick["reason"], "no_data");

            assert_eq!(drisk_update_accelerometer(handle, 0.2, 9.8, 0.1, 1_000), 0);
            assert_eq!(drisk_update_gyroscope(handle, 0.0, 0.3, 0.0, 0), 0);

            let tick: serde_json::Value =
                serde_json::from_str(&take_string(drisk_engine_tick(handle))).unwrap();
            assert_eq!(tick["outcome"], "fallback");
            assert_eq!(tick["reason"], "model_unavailable");
            assert_eq!(drisk_engine_published(handle), 50.0);

            assert_eq!(drisk_engine_reset(handle), 0);
            drisk_engine_free(handle);
        }
    }

    #[test]
    fn test_ffi_missing_model_file_degrades() {
        unsafe {
            let path = CString::new("/nonexistent/driving_model.onnx").unwrap();
            let handle = drisk_engine_new(path.as_ptr(), ptr::null());
            assert!(!handle.is_null());

            let status = take_string(drisk_engine_status(handle));
            assert!(status.contains("degraded"));
            drisk_engine_free(handle);
        }
    }

    #[test]
    fn test_ffi_invalid_config() {
        unsafe {
            let config = CString::new(r#"{"history_capacity": 0}"#).unwrap();
            let handle = drisk_engine_new(ptr::null(), config.as_ptr());
            assert!(handle.is_null());

            let error = drisk_last_error();
            assert!(!error.is_null());
            let error_str = CStr::from_ptr(error).to_str().unwrap();
            assert!(error_str.contains("history_capacity"));
        }
    }

    #[test]
    fn test_ffi_oversized_history_returns_null() {
        unsafe {
            let config = CString::new(r#"{"history_capacity": 18446744073709551615}"#).unwrap();
            let handle = drisk_engine_new(ptr::null(), config.as_ptr());
            assert!(handle.is_null());
            let error_str = CStr::from_ptr(drisk_last_error()).to_str().unwrap();
            assert!(error_str.contains("at most"));
        }
    }

    #[test]
    fn test_ffi_null_handle() {
        unsafe {
            assert!(drisk_engine_tick(ptr::null()).is_null());
            assert!(!drisk_last_error().is_null());
            assert_eq!(drisk_update_gyroscope(ptr::null(), 0.0, 0.0, 0.0, 0), -1);
            assert_eq!(drisk_engine_published(ptr::null()), 50.0);
            drisk_engine_free(ptr::null_mut());
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = drisk_version();
            assert!(!version.is_null());

            let version_str = CStr::from_ptr(version).to_str().unwrap();
            assert!(!version_str.is_empty());
        }
    }
}
