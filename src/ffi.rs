//! FFI bindings for the export pipeline
//!
//! C-compatible functions so a native host can reuse the wire formatters and
//! the metric cache. All functions take null-terminated C strings; strings
//! they return are allocated here and must be freed with `hke_free_string`.
//!
//! Metric batches cross the boundary as a JSON array:
//! `[{"name":"x_total","value":5,"kind":"counter","labels":{"instance":"a"},"unit":"count"}]`
//! (`labels` and `unit` are optional).

use chrono::Utc;
use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;
use std::sync::Arc;

use crate::cache::{FileBlobStore, MetricCache};
use crate::error::TelemetryError;
use crate::exposition::ExpositionFormatter;
use crate::line_protocol::LineProtocolFormatter;
use crate::types::{is_valid_metric_name, Metric};

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

unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Parse a JSON batch, rejecting names outside `[a-z_][a-z0-9_]*`
fn parse_batch(json: &str) -> Result<Vec<Metric>, TelemetryError> {
    let batch: Vec<Metric> = serde_json::from_str(json)?;
    if let Some(bad) = batch.iter().find(|m| !is_valid_metric_name(&m.name)) {
        return Err(TelemetryError::InvalidMetricName(bad.name.clone()));
    }
    Ok(batch)
}

fn finish(result: Result<String, TelemetryError>) -> *mut c_char {
    match result {
        Ok(s) => string_to_cstr(&s),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Formatters
// ============================================================================

/// Format a JSON metric batch as Prometheus exposition text.
///
/// # Safety
/// - `metrics_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `hke_free_string`.
/// - Returns NULL on error; call `hke_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn hke_format_exposition(metrics_json: *const c_char) -> *mut c_char {
    clear_last_error();

    let Some(json) = cstr_to_string(metrics_json) else {
        set_last_error("Invalid metrics JSON pointer");
        return ptr::null_mut();
    };

    finish(parse_batch(&json).map(|batch| ExpositionFormatter::format(&batch)))
}

/// Format a JSON metric batch as InfluxDB line protocol with a shared timestamp.
///
/// # Safety
/// - `metrics_json`, `device` and `job` must be valid null-terminated C strings.
/// - Returns a newly allocated string that must be freed with `hke_free_string`.
/// - Returns NULL on error; call `hke_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn hke_format_line_protocol(
    metrics_json: *const c_char,
    device: *const c_char,
    job: *const c_char,
    timestamp_ms: i64,
) -> *mut c_char {
    clear_last_error();

    let Some(json) = cstr_to_string(metrics_json) else {
        set_last_error("Invalid metrics JSON pointer");
        return ptr::null_mut();
    };
    let Some(device) = cstr_to_string(device) else {
        set_last_error("Invalid device string pointer");
        return ptr::null_mut();
    };
    let Some(job) = cstr_to_string(job) else {
        set_last_error("Invalid job string pointer");
        return ptr::null_mut();
    };

    let formatter = LineProtocolFormatter::new(&device, &job);
    finish(parse_batch(&json).map(|batch| formatter.format(&batch, timestamp_ms)))
}

// ============================================================================
// Metric cache
// ============================================================================

/// Opaque handle to a file-backed metric cache
pub struct CacheHandle {
    cache: MetricCache,
}

/// Open (or create) a metric cache in `dir`.
///
/// # Safety
/// - `dir` must be a valid null-terminated C string.
/// - Must be freed with `hke_cache_free`.
/// - Returns NULL on error.
#[no_mangle]
pub unsafe extern "C" fn hke_cache_open(dir: *const c_char) -> *mut CacheHandle {
    clear_last_error();

    let Some(dir) = cstr_to_string(dir) else {
        set_last_error("Invalid directory string pointer");
        return ptr::null_mut();
    };

    match FileBlobStore::new(dir) {
        Ok(store) => Box::into_raw(Box::new(CacheHandle {
            cache: MetricCache::new(Arc::new(store)),
        })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a cache handle.
///
/// # Safety
/// - `cache` must be a pointer returned by `hke_cache_open`, or NULL.
#[no_mangle]
pub unsafe extern "C" fn hke_cache_free(cache: *mut CacheHandle) {
    if !cache.is_null() {
        drop(Box::from_raw(cache));
    }
}

/// Replace the cached snapshot with a JSON batch observed now.
///
/// # Safety
/// - `cache` must be a valid pointer returned by `hke_cache_open`.
/// - `metrics_json` must be a valid null-terminated C string.
/// - Returns 0 on success, -1 on error (see `hke_last_error`).
#[no_mangle]
pub unsafe extern "C" fn hke_cache_save(
    cache: *mut CacheHandle,
    metrics_json: *const c_char,
) -> i32 {
    clear_last_error();

    if cache.is_null() {
        set_last_error("Null cache pointer");
        return -1;
    }
    let handle = &*cache;

    let Some(json) = cstr_to_string(metrics_json) else {
        set_last_error("Invalid metrics JSON pointer");
        return -1;
    };

    match parse_batch(&json).and_then(|batch| handle.cache.save(&batch, Utc::now())) {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Unexpired cached metrics as a JSON batch, tagged with `cached` and
/// `data_age_minutes`. An empty or expired cache yields `[]`.
///
/// # Safety
/// - `cache` must be a valid pointer returned by `hke_cache_open`.
/// - Returns a newly allocated string that must be freed with `hke_free_string`.
#[no_mangle]
pub unsafe extern "C" fn hke_cache_load_valid(cache: *mut CacheHandle) -> *mut c_char {
    clear_last_error();

    if cache.is_null() {
        set_last_error("Null cache pointer");
        return ptr::null_mut();
    }
    let handle = &*cache;

    let now = Utc::now();
    let fallback: Vec<Metric> = handle
        .cache
        .load_valid(now)
        .iter()
        .map(|entry| entry.to_fallback_metric(now))
        .collect();

    finish(serde_json::to_string(&fallback).map_err(TelemetryError::from))
}

/// Drop the cached snapshot.
///
/// # Safety
/// - `cache` must be a valid pointer returned by `hke_cache_open`.
/// - Returns 0 on success, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn hke_cache_clear(cache: *mut CacheHandle) -> i32 {
    clear_last_error();

    if cache.is_null() {
        set_last_error("Null cache pointer");
        return -1;
    }

    match (*cache).cache.clear() {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by this library.
///
/// # Safety
/// - `ptr` must be a pointer returned by an `hke_*` function, or NULL.
#[no_mangle]
pub unsafe extern "C" fn hke_free_string(ptr: *mut c_char) {
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
/// - Returns a pointer to a thread-local string, valid until the next `hke_*`
///   call on this thread. Do NOT free it.
/// - Returns NULL if the last call succeeded.
#[no_mangle]
pub unsafe extern "C" fn hke_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn hke_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
