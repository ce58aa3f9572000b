use erupt::vk1_0 as vk;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong constructing the engine or running an
/// operation. Startup variants (`Loader`, `NoDevice`, `KernelModule`)
/// describe an unsupported environment and are not worth retrying;
/// shape variants are per-call and recoverable.
#[derive(Debug, Error)]
pub enum Error {
    #[error("vulkan runtime unavailable: {0}")]
    Loader(String),

    #[error("no compute-capable device found")]
    NoDevice,

    #[error("kernel module '{path}' failed to load")]
    KernelModule {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    #[error("vulkan call failed: {0:?}")]
    Vulkan(vk::Result),

    #[error("allocator mutex poisoned")]
    AllocatorPoisoned,

    #[error(
        "cannot multiply {a_rows}x{a_cols} by {b_rows}x{b_cols}: \
         left width must equal right height"
    )]
    MultiplyShape {
        a_rows: usize,
        a_cols: usize,
        b_rows: usize,
        b_cols: usize,
    },

    #[error("element-wise operands must have identical shapes: {a_rows}x{a_cols} vs {b_rows}x{b_cols}")]
    HadamardShape {
        a_rows: usize,
        a_cols: usize,
        b_rows: usize,
        b_cols: usize,
    },

    #[error("flat element count {len} is not a multiple of {rows} rows")]
    FlatLength { len: usize, rows: usize },

    #[error("matrix literal must contain at least one row")]
    EmptyRows,

    #[error("row {row} has {got} elements, expected {expected}")]
    RaggedRows {
        row: usize,
        got: usize,
        expected: usize,
    },

    #[error("replacement holds {got} elements, matrix holds {expected}")]
    ResetLength { got: usize, expected: usize },

    #[error("replacement shape {got_rows}x{got_cols} does not match {rows}x{cols}")]
    ResetShape {
        got_rows: usize,
        got_cols: usize,
        rows: usize,
        cols: usize,
    },
}

impl From<vk::Result> for Error {
    fn from(result: vk::Result) -> Self {
        Error::Vulkan(result)
    }
}
