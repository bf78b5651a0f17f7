//! Node.js FFI bindings via napi-rs
//!
//! This module provides the JavaScript API for program handles

#[cfg(feature = "napi")]
pub mod napi_bindings;

#[cfg(feature = "napi")]
pub use napi_bindings::*;
