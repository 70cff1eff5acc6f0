//! Phantom token hooks: opaque token in, JWT upstream.
//!
//! The gateway calls the agent twice per request. The auth check exchanges
//! the opaque bearer token for a JWT and stashes it in the request metadata;
//! the post key-auth hook then rewrites the upstream `Authorization` header.

pub mod handler;
pub mod types;

pub use handler::{Dispatcher, PhantomAgent};
pub use types::{HookName, HookObject};
