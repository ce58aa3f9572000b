use crate::engine::{SharedCore, TileSize};
use crate::error::{Error, Result};
use crate::matrix::Matrix;
use crate::pipeline::KernelPipeline;
use erupt::{vk1_0 as vk, DeviceLoader};
use std::path::Path;

const SHADER_FILE: &str = "matrix_multiply.comp.spv";

/// Dense matrix product, one output cell per invocation.
pub(crate) struct MatrixMultiply {
    kernel: KernelPipeline,
}

/// A validated multiply: push constants plus the output geometry.
pub(crate) struct Invocation {
    dims: MultiplyDims,
    pub out_rows: usize,
    pub out_cols: usize,
    pub grid_cols: usize,
    pub grid_rows: usize,
}

/// The three scalar dimensions the kernel needs; the remaining ones are
/// implied (`b_rows == a_cols`, `out == a_rows x b_cols`).
#[repr(C)]
#[derive(Default, Copy, Clone)]
struct MultiplyDims {
    a_cols: u32,
    a_rows: u32,
    b_cols: u32,
}

unsafe impl bytemuck::Zeroable for MultiplyDims {}
unsafe impl bytemuck::Pod for MultiplyDims {}

impl MatrixMultiply {
    pub fn new(core: SharedCore, shader_dir: &Path, tile: TileSize) -> Result<Self> {
        let kernel = KernelPipeline::new(
            core,
            &shader_dir.join(SHADER_FILE),
            tile,
            3,
            std::mem::size_of::<MultiplyDims>() as u32,
        )?;
        Ok(Self { kernel })
    }

    /// Checks multiply conformability (`a.cols == b.rows`) and lays out the
    /// dispatch over the output grid.
    pub fn invoke(&self, a: &Matrix, b: &Matrix) -> Result<Invocation> {
        if a.cols() != b.rows() {
            return Err(Error::MultiplyShape {
                a_rows: a.rows(),
                a_cols: a.cols(),
                b_rows: b.rows(),
                b_cols: b.cols(),
            });
        }
        Ok(Invocation {
            dims: MultiplyDims {
                a_cols: a.cols() as u32,
                a_rows: a.rows() as u32,
                b_cols: b.cols() as u32,
            },
            out_rows: a.rows(),
            out_cols: b.cols(),
            grid_cols: b.cols(),
            grid_rows: a.rows(),
        })
    }

    pub fn bind(&self, a: vk::Buffer, b: vk::Buffer, out: vk::Buffer) {
        self.kernel.bind(&[a, b, out]);
    }

    pub fn record(
        &self,
        device: &DeviceLoader,
        command_buffer: vk::CommandBuffer,
        invocation: &Invocation,
        groups: (u32, u32),
    ) {
        self.kernel.record(
            device,
            command_buffer,
            bytemuck::bytes_of(&invocation.dims),
            groups,
        );
    }
}
