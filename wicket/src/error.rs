//! Bridge error taxonomy
//!
//! Every failure path in the bridge funnels into [`BridgeError`] and from
//! there through the lifecycle controller's fail-once gate. There are no
//! retries anywhere: partial or garbled module state is worse than stopping.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    /// A resource fetch or decode failed (network error, bad PNG, bad OGG).
    #[error("failed to load resource '{target}': {reason}")]
    ResourceLoad { target: String, reason: String },

    /// Module-supplied shader source failed validation.
    #[error("shader compile error: {0}")]
    ShaderCompile(String),

    /// Pipeline creation from validated shaders failed.
    #[error("shader link error: {0}")]
    ShaderLink(String),

    /// The module does not satisfy the bridge ABI (missing export, failed
    /// to register itself, bad memory).
    #[error("module contract violation: {0}")]
    ModuleContract(String),

    /// Any failure during frame or event processing (wasm trap, surface
    /// loss, I/O error in a callback path).
    #[error("runtime failure: {0}")]
    Runtime(#[from] anyhow::Error),
}
