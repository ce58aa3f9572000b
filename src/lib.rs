//! Vulkan-accelerated dense matrix operations.
//!
//! [`Matrix`] is a host-resident row-major `f32` grid; [`MatrixMill`] owns a
//! compute device, a queue and three precompiled kernels (multiply, Hadamard
//! product, transpose) and turns input matrices into fresh result matrices,
//! one synchronous dispatch at a time. Operand and result staging goes
//! through a grow-only scratch-buffer cache so repeated calls of similar
//! size do not reallocate device memory.

mod engine;
mod error;
mod hadamard;
mod matrix;
mod matrix_multiply;
mod pipeline;
mod staging;
mod transpose;
#[cfg(test)]
mod tests;

pub use engine::{EngineOptions, MatrixMill, DEFAULT_TILE_CAP};
pub use error::{Error, Result};
pub use matrix::Matrix;
pub use staging::BufferPolicy;
