//! # Middleware
//!
//! Ready-made [`Layer`](crate::Layer)s for any backend.
//!
//! | Layer | Wrapper | Adds |
//! |-------|---------|------|
//! | [`TracingLayer`] | [`TracedVfs`] / [`TracedFile`] | `tracing` events for every call |
//! | [`CheckedLayer`] | [`CheckedVfs`] / [`CheckedFile`] | contract enforcement on the inner backend |
//!
//! Both wrap every file their backend opens, so the added behaviour follows
//! the handle into the engine.

mod checked;
mod traced;

pub use checked::{CheckedFile, CheckedLayer, CheckedVfs};
pub use traced::{TracedFile, TracedVfs, TracingLayer};
