// SPDX-License-Identifier: MIT

//! # gpu-array-bridge
//!
//! Python bindings for a GPU-resident differentiable array library, built
//! on [candle](https://github.com/huggingface/candle), with a strided
//! tensor bridge to externally owned PyTorch and NumPy buffers.
//!
//! The interesting part is the [`bridge`] module: it copies between
//! library-order Logical Arrays and flat foreign memory whose dimension
//! order is reversed and whose strides are arbitrary, via a recursive
//! dimension walk with one bulk transfer per innermost run. Everything
//! else is the surface that feeds it: typed vectors ([`array`]),
//! reverse-mode gradients ([`diff`]), element-type tags ([`dtype`]),
//! host-visible staging buffers ([`memory`]) and the PyO3 layer
//! ([`python`], behind the `python` feature).
//!
//! ## Quick start
//!
//! ```no_run
//! use gpu_array_bridge::{export_array, gather_array, Vector};
//!
//! # fn main() -> gpu_array_bridge::Result<()> {
//! let v = Vector::<f32>::linspace(0.0, 1.0, 100)?;
//! let host = export_array(&v)?;                 // dense, reversed order
//! let back: Vector<f32> = unsafe { gather_array(&host.descriptor()?)? };
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - `cuda`: build the array library with its CUDA backend.
//! - `python`: build the PyO3 extension module and NumPy interop.

#![warn(missing_docs)]

pub mod array;
pub mod bridge;
pub mod device;
pub mod diff;
pub mod dtype;
pub mod error;
pub mod logging;
pub mod memory;

#[cfg(feature = "python")]
pub mod python;

pub use array::{FloatElement, VecN, Vector, Vector2f, Vector3f, Vector4f};
pub use bridge::{
    contiguous_strides, export_array, gather_array, scatter_array, BridgeArray,
    ExternalDescriptor, HostTensor,
};
pub use device::{cuda_available, default_device, get_device, warn_if_cpu, DeviceConfig};
pub use diff::{backward, DiffVector};
pub use dtype::{ElemType, Element};
pub use error::{BridgeError, Result};
pub use logging::{init_logging, LogConfig, LogLevel};
pub use memory::{ManagedBuffer, MappedSlice, MappedSliceMut, MemoryTracker};

/// Crate version, as recorded in the package manifest.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
