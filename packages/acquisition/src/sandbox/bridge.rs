//! Host side of the sandbox boundary.
//!
//! Native functions registered into the boa context read the active
//! [`HostBridge`] from a thread-local slot. The sandbox always executes
//! on a dedicated blocking thread, so the slot is set for exactly the
//! duration of one render and every request context is explicit.

use boa_engine::{js_string, Context, JsArgs, JsNativeError, JsResult, JsString, JsValue, NativeFunction};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::http::{HttpFetch, RequestOptions};

/// Everything a sandboxed script may reach on the host.
pub struct HostBridge {
    pub http: Arc<dyn HttpFetch>,
    pub runtime: tokio::runtime::Handle,
    pub base_url: url::Url,
    /// Per-request fetch timeout for script-initiated requests, ms
    pub script_fetch_timeout_ms: u64,
    /// Console output collected during the render
    pub console: RefCell<Vec<String>>,
}

thread_local! {
    static ACTIVE_BRIDGE: RefCell<Option<HostBridge>> = const { RefCell::new(None) };
}

/// Install a bridge for the current thread, run `f`, then clear it.
pub fn with_bridge<T>(bridge: HostBridge, f: impl FnOnce() -> T) -> (T, Vec<String>) {
    ACTIVE_BRIDGE.with(|slot| *slot.borrow_mut() = Some(bridge));
    let result = f();
    let console = ACTIVE_BRIDGE.with(|slot| {
        slot.borrow_mut()
            .take()
            .map(|b| b.console.into_inner())
            .unwrap_or_default()
    });
    (result, console)
}

/// Register the host-native functions on a fresh context.
pub fn register_host_functions(context: &mut Context) -> Result<(), String> {
    context
        .register_global_builtin_callable(
            js_string!("__host_fetch"),
            2,
            NativeFunction::from_fn_ptr(host_fetch),
        )
        .map_err(|e| e.to_string())?;
    context
        .register_global_builtin_callable(
            js_string!("__host_log"),
            2,
            NativeFunction::from_fn_ptr(host_log),
        )
        .map_err(|e| e.to_string())?;
    Ok(())
}

#[derive(serde::Deserialize, Default)]
struct ScriptFetchInit {
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    headers: Option<HashMap<String, String>>,
    #[serde(default)]
    body: Option<String>,
}

/// `__host_fetch(url, initJson) -> responseJson`
///
/// Synchronous from the script's point of view; the JS prelude wraps
/// the result in an already-resolved promise. Errors are reported in
/// the JSON payload so the prelude can reject without unwinding.
fn host_fetch(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let url = args
        .get_or_undefined(0)
        .to_string(context)?
        .to_std_string_escaped();
    let init_json = args
        .get_or_undefined(1)
        .to_string(context)?
        .to_std_string_escaped();

    let payload = ACTIVE_BRIDGE.with(|slot| {
        let slot = slot.borrow();
        let Some(bridge) = slot.as_ref() else {
            return error_payload("sandbox bridge not active");
        };

        let init: ScriptFetchInit = serde_json::from_str(&init_json).unwrap_or_default();

        // Resolve relative URLs against the page
        let resolved = match bridge.base_url.join(&url) {
            Ok(resolved) => resolved,
            Err(_) => return error_payload(&format!("invalid URL: {url}")),
        };

        let mut options = RequestOptions::new().with_timeout_ms(bridge.script_fetch_timeout_ms);
        if let Some(method) = init.method {
            options = options.with_method(method);
        }
        for (name, value) in init.headers.unwrap_or_default() {
            options = options.with_header(name, value);
        }
        if let Some(body) = init.body {
            options = options.with_body(body);
        }

        debug!(url = %resolved, "sandbox script fetch");
        let http = Arc::clone(&bridge.http);
        let result = bridge
            .runtime
            .block_on(async move { http.fetch(resolved.as_str(), &options).await });

        match result {
            Ok(response) => serde_json::json!({
                "status": response.status,
                "headers": response.headers,
                "body": response.body_text,
                "finalUrl": response.final_url,
            })
            .to_string(),
            Err(e) => error_payload(&e.to_string()),
        }
    });

    Ok(JsString::from(payload).into())
}

/// `__host_log(level, message)`
fn host_log(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let level = args
        .get_or_undefined(0)
        .to_string(context)?
        .to_std_string_escaped();
    let message = args
        .get_or_undefined(1)
        .to_string(context)?
        .to_std_string_escaped();

    ACTIVE_BRIDGE.with(|slot| {
        if let Some(bridge) = slot.borrow().as_ref() {
            bridge.console.borrow_mut().push(format!("[{level}] {message}"));
            Ok(())
        } else {
            Err(JsNativeError::typ().with_message("sandbox bridge not active"))
        }
    })?;

    Ok(JsValue::undefined())
}

fn error_payload(message: &str) -> String {
    serde_json::json!({ "error": message }).to_string()
}
