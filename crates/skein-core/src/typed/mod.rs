//! Typed endpoint API.
//!
//! Endpoint names are bound to argument types at compile time, and every
//! handler exposes the signature result injection needs.
//!
//! # Two layers
//! - **Typed**: `Endpoint` trait, `Handler<T>` trait
//! - **Dyn**: `DynHandler` trait, object-safe, stored in the registry

pub mod endpoint;
pub mod handler;
pub mod registry;

pub use self::endpoint::{Endpoint, Param, Signature};
pub use self::handler::{DynHandler, FnHandler, Handler, TypedHandler};
pub use self::registry::{RegistryError, TaskRegistry};
