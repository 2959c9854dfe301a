//! The declared host surface visible to sandboxed scripts.
//!
//! Everything a page script can touch is listed here and installed at
//! sandbox instantiation; nothing else from the host runtime leaks into
//! the context.

use boa_engine::{Context, Source};

use crate::sandbox::bridge;
use crate::sandbox::prelude::{PRELUDE_DOM, PRELUDE_ENV, PRELUDE_NET};

/// Which capability groups a sandbox exposes.
///
/// The default grants the full §4.5 whitelist. Individual groups can be
/// switched off for stricter runs (e.g. no network for untrusted
/// re-renders).
#[derive(Debug, Clone)]
pub struct SandboxCapabilities {
    /// document/window/location DOM surface
    pub dom: bool,
    /// window environment stubs, storages, observers, timers
    pub environment: bool,
    /// fetch + XMLHttpRequest bridged to the host HTTP client
    pub network: bool,
}

impl Default for SandboxCapabilities {
    fn default() -> Self {
        Self {
            dom: true,
            environment: true,
            network: true,
        }
    }
}

impl SandboxCapabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn without_network(mut self) -> Self {
        self.network = false;
        self
    }

    /// Install the selected capability groups into a fresh context.
    ///
    /// Host-native functions are registered first; the JS preludes
    /// build the rest of the surface inside the engine.
    pub fn install(&self, context: &mut Context) -> Result<(), String> {
        bridge::register_host_functions(context)?;

        if self.dom {
            context
                .eval(Source::from_bytes(PRELUDE_DOM))
                .map_err(|e| format!("DOM prelude failed: {e}"))?;
        }
        if self.environment {
            context
                .eval(Source::from_bytes(PRELUDE_ENV))
                .map_err(|e| format!("environment prelude failed: {e}"))?;
        }
        if self.network {
            context
                .eval(Source::from_bytes(PRELUDE_NET))
                .map_err(|e| format!("network prelude failed: {e}"))?;
        }
        Ok(())
    }
}
