use crate::engine::{SharedCore, TileSize};
use crate::error::{Error, Result};
use crate::matrix::Matrix;
use crate::pipeline::KernelPipeline;
use erupt::{vk1_0 as vk, DeviceLoader};
use std::path::Path;

const SHADER_FILE: &str = "hadamard.comp.spv";

/// Element-wise (Hadamard) product of two same-shape matrices.
pub(crate) struct Hadamard {
    kernel: KernelPipeline,
}

pub(crate) struct Invocation {
    dims: GridDims,
    pub out_rows: usize,
    pub out_cols: usize,
    pub grid_cols: usize,
    pub grid_rows: usize,
}

#[repr(C)]
#[derive(Default, Copy, Clone)]
struct GridDims {
    cols: u32,
    rows: u32,
}

unsafe impl bytemuck::Zeroable for GridDims {}
unsafe impl bytemuck::Pod for GridDims {}

impl Hadamard {
    pub fn new(core: SharedCore, shader_dir: &Path, tile: TileSize) -> Result<Self> {
        let kernel = KernelPipeline::new(
            core,
            &shader_dir.join(SHADER_FILE),
            tile,
            3,
            std::mem::size_of::<GridDims>() as u32,
        )?;
        Ok(Self { kernel })
    }

    /// Both dimensions must match, not just one; a matching height with a
    /// differing width is still a shape error.
    pub fn invoke(&self, a: &Matrix, b: &Matrix) -> Result<Invocation> {
        if a.rows() != b.rows() || a.cols() != b.cols() {
            return Err(Error::HadamardShape {
                a_rows: a.rows(),
                a_cols: a.cols(),
                b_rows: b.rows(),
                b_cols: b.cols(),
            });
        }
        Ok(Invocation {
            dims: GridDims {
                cols: a.cols() as u32,
                rows: a.rows() as u32,
            },
            out_rows: a.rows(),
            out_cols: a.cols(),
            grid_cols: a.cols(),
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
