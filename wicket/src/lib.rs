//! Wicket - WASM app module runtime bridge
//!
//! Exposes internal modules for testing and integration.

pub mod app;
pub mod audio;
pub mod config;
pub mod cookie;
pub mod error;
pub mod ffi;
pub mod graphics;
pub mod input;
pub mod lifecycle;
pub mod loader;
pub mod surface;
pub mod wasm;

// Re-export commonly used types for embedding hosts
pub use app::{BridgeHandle, HostCallbacks};
pub use error::BridgeError;
