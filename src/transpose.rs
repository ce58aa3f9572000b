use crate::engine::{SharedCore, TileSize};
use crate::error::Result;
use crate::matrix::Matrix;
use crate::pipeline::KernelPipeline;
use erupt::{vk1_0 as vk, DeviceLoader};
use std::path::Path;

const SHADER_FILE: &str = "transpose.comp.spv";

/// Out-of-place transpose; the single-operand kernel.
pub(crate) struct Transpose {
    kernel: KernelPipeline,
}

pub(crate) struct Invocation {
    dims: GridDims,
    pub out_rows: usize,
    pub out_cols: usize,
    pub grid_cols: usize,
    pub grid_rows: usize,
}

/// Input-matrix dimensions; the kernel scatters each cell to its mirrored
/// position in the output.
#[repr(C)]
#[derive(Default, Copy, Clone)]
struct GridDims {
    cols: u32,
    rows: u32,
}

unsafe impl bytemuck::Zeroable for GridDims {}
unsafe impl bytemuck::Pod for GridDims {}

impl Transpose {
    pub fn new(core: SharedCore, shader_dir: &Path, tile: TileSize) -> Result<Self> {
        let kernel = KernelPipeline::new(
            core,
            &shader_dir.join(SHADER_FILE),
            tile,
            2,
            std::mem::size_of::<GridDims>() as u32,
        )?;
        Ok(Self { kernel })
    }

    /// No shape precondition; the dispatch walks the input grid.
    pub fn invoke(&self, a: &Matrix) -> Invocation {
        Invocation {
            dims: GridDims {
                cols: a.cols() as u32,
                rows: a.rows() as u32,
            },
            out_rows: a.cols(),
            out_cols: a.rows(),
            grid_cols: a.cols(),
            grid_rows: a.rows(),
        }
    }

    pub fn bind(&self, input: vk::Buffer, out: vk::Buffer) {
        self.kernel.bind(&[input, out]);
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
