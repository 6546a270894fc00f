//! # bindrpc-bridge
//!
//! Method bridge for bindrpc.
//!
//! This crate provides:
//! - Backend classes with explicit method and constant allow-lists
//! - Constructor argument splitting and the `<Class>.ctorArgs` member
//! - Dispatch of `Class.member` names with backend error mapping
//! - The built-in backend and, behind `test-support`, a programmable fake

pub mod builtin;
pub mod error;
pub mod registry;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use error::{BackendError, BridgeError};
pub use registry::{ApiObject, Bridge, ClassBuilder, CtorArgs, RegistryBuilder, CTOR_ARGS_MEMBER};
