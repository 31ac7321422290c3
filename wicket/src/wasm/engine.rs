//! WASM engine wrapper for loading and compiling modules

use anyhow::{Context, Result};
use wasmtime::{Engine, Module};

/// Shared WASM engine (one per application)
pub struct BridgeEngine {
    engine: Engine,
}

impl BridgeEngine {
    /// Create a new WASM engine with default configuration
    pub fn new() -> Result<Self> {
        let engine = Engine::default();
        Ok(Self { engine })
    }

    /// Get a reference to the underlying wasmtime engine
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Compile a WASM module from bytes
    pub fn load_module(&self, bytes: &[u8]) -> Result<Module> {
        Module::new(&self.engine, bytes).context("Failed to compile WASM module")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_creation() {
        assert!(BridgeEngine::new().is_ok());
    }

    #[test]
    fn load_invalid_module_fails() {
        let engine = BridgeEngine::new().unwrap();
        assert!(engine.load_module(b"not valid wasm").is_err());
    }

    #[test]
    fn load_valid_module() {
        let engine = BridgeEngine::new().unwrap();
        let wasm = wat::parse_str("(module)").unwrap();
        assert!(engine.load_module(&wasm).is_ok());
    }
}
