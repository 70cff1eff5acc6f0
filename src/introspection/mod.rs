//! Token introspection against the identity provider.

pub mod client;

pub use client::{
    IntrospectionClient, IntrospectionError, IntrospectionOutcome, Introspector, PhantomJwt,
};
