//! # Layer Trait
//!
//! Tower-style middleware composition for storage backends.
//!
//! ## Overview
//!
//! The [`Layer`] trait wraps a [`Vfs`] in another `Vfs` that adds behaviour
//! (tracing, contract checks) and delegates the rest. A wrapping backend
//! usually wraps each file it opens as well.
//!
//! ```text
//! Vfs ──▶ Layer::layer() ──▶ Wrapped Vfs ──open()──▶ Wrapped VfsFile
//! ```
//!
//! ## Fluent Composition
//!
//! ```rust
//! use dbvfs::{CheckedLayer, LayerExt, MemoryVfs, TracingLayer};
//!
//! let vfs = MemoryVfs::new()
//!     .layer(CheckedLayer::new())
//!     .layer(TracingLayer::new());
//! # let _ = vfs;
//! ```

use crate::Vfs;

/// A layer that wraps a backend to add functionality.
///
/// `layer(self, backend)` consumes both the layer and the backend. The
/// resulting `Backend` should implement [`Vfs`] so layers can be stacked and
/// the result registered.
///
/// # Example
///
/// ```rust
/// use dbvfs::Layer;
///
/// struct CountingVfs<V> {
///     inner: V,
///     label: String,
/// }
///
/// struct CountingLayer {
///     label: String,
/// }
///
/// impl<V> Layer<V> for CountingLayer {
///     type Backend = CountingVfs<V>;
///
///     fn layer(self, backend: V) -> Self::Backend {
///         CountingVfs {
///             inner: backend,
///             label: self.label,
///         }
///     }
/// }
/// ```
pub trait Layer<V> {
    /// The resulting backend type after applying this layer.
    type Backend;

    /// Wrap `backend` with this layer's functionality.
    fn layer(self, backend: V) -> Self::Backend;
}

/// Extension trait for fluent layer composition.
///
/// Provides `.layer()` on any [`Vfs`].
pub trait LayerExt: Vfs + Sized {
    /// Apply a layer to this backend.
    fn layer<L: Layer<Self>>(self, layer: L) -> L::Backend {
        layer.layer(self)
    }
}

impl<V: Vfs> LayerExt for V {}
