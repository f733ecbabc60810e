//! Transport-free core of the inference runtime.
//!
//! Everything here is synchronous: no tokio, no axum, no native engine
//! bindings. [`hardware`] only ever reads the local machine; [`artifact`]
//! may additionally touch the filesystem and, for remote sources, the
//! network. Recipe resolution, offload planning and the retrieval math are
//! pure functions of their inputs and can be unit tested without spinning up
//! a server or loading a model.

pub mod artifact;
pub mod error;
pub mod hardware;
pub mod engine_probe;
pub mod model;
pub mod offload;
pub mod pipeline;
pub mod recipe;
pub mod retrieval;

pub use error::{ErrorKind, RuntimeError};
pub use model::*;
