//! WASM runtime wrapper
//!
//! Abstractions over wasmtime for loading and executing app modules.
//!
//! # Key Types
//!
//! - [`BridgeEngine`] - Shared WASM engine (one per application)
//! - [`AppInstance`] - Loaded and instantiated app module
//! - [`BridgeContext`] - Store data holding everything host functions touch

pub mod context;
pub mod engine;
pub mod instance;

pub use context::{
    AudioCommand, BridgeContext, DrawCommand, read_bytes_from_memory, read_cstr_from_memory,
    write_bytes_to_memory,
};
pub use engine::BridgeEngine;
pub use instance::AppInstance;
