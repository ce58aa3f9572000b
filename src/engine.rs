use crate::error::{Error, Result};
use crate::hadamard::Hadamard;
use crate::matrix::Matrix;
use crate::matrix_multiply::MatrixMultiply;
use crate::staging::{BufferPolicy, Role, StagingBuffers};
use crate::transpose::Transpose;
use erupt::{
    cstr,
    utils::{
        allocator::{Allocator, AllocatorCreateInfo},
        loading::DefaultEntryLoader,
    },
    vk1_0 as vk, DeviceLoader, EntryLoader, InstanceLoader,
};
use log::{info, trace};
use std::ffi::CStr;
use std::path::PathBuf;
use std::sync::MutexGuard;
use std::sync::{Arc, Mutex};

const LAYER_KHRONOS_VALIDATION: &[u8] = b"VK_LAYER_KHRONOS_validation";

/// Per-axis cap on compute thread-group size; overridable through
/// [`EngineOptions::tile_cap`] and clamped to the device limits at
/// construction.
pub const DEFAULT_TILE_CAP: u32 = 32;

/// Construction-time knobs for [`MatrixMill`].
#[derive(Clone, Debug)]
pub struct EngineOptions {
    /// Upper bound on the thread-group edge length, per axis.
    pub tile_cap: u32,
    /// Scratch-buffer management strategy.
    pub buffer_policy: BufferPolicy,
    /// Directory holding the precompiled `.comp.spv` kernel modules.
    pub shader_dir: PathBuf,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            tile_cap: DEFAULT_TILE_CAP,
            buffer_policy: BufferPolicy::default(),
            shader_dir: PathBuf::from("shaders"),
        }
    }
}

/// The compute engine: one device, one queue, three kernels, three cached
/// scratch buffers.
///
/// Every operation takes `&mut self`, runs synchronously and returns a
/// fresh [`Matrix`]. The scratch-buffer cache is unsynchronized shared
/// state, so an engine has a single owner; wrap it in your own lock or use
/// [`BufferPolicy::PerCall`] if several threads need it.
pub struct MatrixMill {
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    multiply: MatrixMultiply,
    hadamard: Hadamard,
    transpose: Transpose,
    staging: StagingBuffers,
    tile: TileSize,
    queue: vk::Queue,
    core: SharedCore,
}

pub struct Core {
    pub allocator: Mutex<Allocator>,
    pub device: DeviceLoader,
    pub instance: InstanceLoader,
    _entry: DefaultEntryLoader,
}

pub type SharedCore = Arc<Core>;

impl MatrixMill {
    /// Connects to the first compute-capable device with default options.
    pub fn new() -> Result<Self> {
        Self::with_options(EngineOptions::default())
    }

    /// Connects to the first compute-capable Vulkan device, builds the three
    /// kernel pipelines and prepares the scratch-buffer cache. Fails when no
    /// Vulkan runtime or compute device is present, or when a kernel module
    /// cannot be loaded; all of these describe an unsupported environment.
    pub fn with_options(options: EngineOptions) -> Result<Self> {
        let entry = EntryLoader::new().map_err(|err| Error::Loader(err.to_string()))?;

        let name = c"matrixmill";
        let app_info = vk::ApplicationInfoBuilder::new()
            .application_name(name)
            .application_version(vk::make_version(0, 1, 0))
            .engine_name(name)
            .engine_version(vk::make_version(0, 1, 0))
            .api_version(vk::make_version(1, 0, 0));

        // Validation only in debug builds, and only when the layer is
        // actually installed.
        let mut instance_layers = Vec::new();
        let mut device_layers = Vec::new();
        if cfg!(debug_assertions) && validation_layer_available(&entry) {
            instance_layers.push(cstr!("VK_LAYER_KHRONOS_validation"));
            device_layers.push(cstr!("VK_LAYER_KHRONOS_validation"));
        }

        let create_info = vk::InstanceCreateInfoBuilder::new()
            .application_info(&app_info)
            .enabled_layer_names(&instance_layers);

        let instance = InstanceLoader::new(&entry, &create_info, None)
            .map_err(|err| Error::Loader(err.to_string()))?;

        let (queue_family_index, physical_device) = select_device(&instance)?;
        let properties =
            unsafe { instance.get_physical_device_properties(physical_device, None) };
        let tile = clamp_tile(
            options.tile_cap,
            properties.limits.max_compute_work_group_size,
            properties.limits.max_compute_work_group_invocations,
        );
        let device_name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) };
        info!(
            "using compute device {:?} with {}x{} thread groups",
            device_name, tile.x, tile.y
        );

        let queue_create_infos = [vk::DeviceQueueCreateInfoBuilder::new()
            .queue_family_index(queue_family_index)
            .queue_priorities(&[1.0])];
        let features = vk::PhysicalDeviceFeaturesBuilder::new();
        let create_info = vk::DeviceCreateInfoBuilder::new()
            .queue_create_infos(&queue_create_infos)
            .enabled_features(&features)
            .enabled_layer_names(&device_layers);
        let device = DeviceLoader::new(&instance, physical_device, &create_info, None)
            .map_err(|err| Error::Loader(err.to_string()))?;
        let queue = unsafe { device.get_device_queue(queue_family_index, 0, None) };

        let allocator =
            Allocator::new(&instance, physical_device, AllocatorCreateInfo::default())
                .result()?;

        let create_info = vk::CommandPoolCreateInfoBuilder::new()
            .queue_family_index(queue_family_index)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool =
            unsafe { device.create_command_pool(&create_info, None, None) }.result()?;

        let core = Arc::new(Core {
            allocator: Mutex::new(allocator),
            device,
            instance,
            _entry: entry,
        });

        let allocate_info = vk::CommandBufferAllocateInfoBuilder::new()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let command_buffer =
            unsafe { core.device.allocate_command_buffers(&allocate_info) }.result()?[0];

        let multiply = MatrixMultiply::new(core.clone(), &options.shader_dir, tile)?;
        let hadamard = Hadamard::new(core.clone(), &options.shader_dir, tile)?;
        let transpose = Transpose::new(core.clone(), &options.shader_dir, tile)?;
        let staging = StagingBuffers::new(core.clone(), options.buffer_policy);

        Ok(Self {
            command_pool,
            command_buffer,
            multiply,
            hadamard,
            transpose,
            staging,
            tile,
            queue,
            core,
        })
    }

    /// Dense matrix product `a * b`. Requires `a.cols() == b.rows()`;
    /// the result is `a.rows() x b.cols()`.
    pub fn multiply(&mut self, a: &Matrix, b: &Matrix) -> Result<Matrix> {
        let invocation = self.multiply.invoke(a, b)?;
        let a_buf = self.staging.upload(Role::OperandA, a.as_slice())?;
        let b_buf = self.staging.upload(Role::OperandB, b.as_slice())?;
        let out_len = invocation.out_rows * invocation.out_cols;
        let out_buf = self.staging.prepare_output(out_len)?;
        self.multiply.bind(a_buf, b_buf, out_buf);
        let groups = self.tile.groups(invocation.grid_cols, invocation.grid_rows);
        trace!("multiply dispatch over {:?} groups", groups);
        self.run(|device, command_buffer| {
            self.multiply.record(device, command_buffer, &invocation, groups)
        })?;
        let elems = self.staging.read_output(out_len)?;
        self.staging.finish_pass()?;
        Ok(Matrix::from_parts(
            invocation.out_rows,
            invocation.out_cols,
            elems,
        ))
    }

    /// Element-wise (Hadamard) product. Both matrices must have the same
    /// height and the same width.
    pub fn hadamard(&mut self, a: &Matrix, b: &Matrix) -> Result<Matrix> {
        let invocation = self.hadamard.invoke(a, b)?;
        let a_buf = self.staging.upload(Role::OperandA, a.as_slice())?;
        let b_buf = self.staging.upload(Role::OperandB, b.as_slice())?;
        let out_len = invocation.out_rows * invocation.out_cols;
        let out_buf = self.staging.prepare_output(out_len)?;
        self.hadamard.bind(a_buf, b_buf, out_buf);
        let groups = self.tile.groups(invocation.grid_cols, invocation.grid_rows);
        trace!("hadamard dispatch over {:?} groups", groups);
        self.run(|device, command_buffer| {
            self.hadamard.record(device, command_buffer, &invocation, groups)
        })?;
        let elems = self.staging.read_output(out_len)?;
        self.staging.finish_pass()?;
        Ok(Matrix::from_parts(
            invocation.out_rows,
            invocation.out_cols,
            elems,
        ))
    }

    /// Transpose of `a`; the result is `a.cols() x a.rows()`.
    pub fn transpose(&mut self, a: &Matrix) -> Result<Matrix> {
        let invocation = self.transpose.invoke(a);
        let in_buf = self.staging.upload(Role::OperandA, a.as_slice())?;
        let out_len = invocation.out_rows * invocation.out_cols;
        let out_buf = self.staging.prepare_output(out_len)?;
        self.transpose.bind(in_buf, out_buf);
        let groups = self.tile.groups(invocation.grid_cols, invocation.grid_rows);
        trace!("transpose dispatch over {:?} groups", groups);
        self.run(|device, command_buffer| {
            self.transpose.record(device, command_buffer, &invocation, groups)
        })?;
        let elems = self.staging.read_output(out_len)?;
        self.staging.finish_pass()?;
        Ok(Matrix::from_parts(
            invocation.out_rows,
            invocation.out_cols,
            elems,
        ))
    }

    /// Records one kernel invocation into the command buffer, submits it and
    /// blocks until the queue drains. Each operation is a complete unit of
    /// work; nothing stays in flight between calls.
    fn run(&self, record: impl FnOnce(&DeviceLoader, vk::CommandBuffer)) -> Result<()> {
        let device = &self.core.device;
        unsafe {
            device
                .reset_command_buffer(self.command_buffer, None)
                .result()?;
            let begin_info = vk::CommandBufferBeginInfoBuilder::new();
            device
                .begin_command_buffer(self.command_buffer, &begin_info)
                .result()?;
            record(device, self.command_buffer);
            device.end_command_buffer(self.command_buffer).result()?;

            let command_buffers = [self.command_buffer];
            let submit_info = vk::SubmitInfoBuilder::new().command_buffers(&command_buffers);
            device
                .queue_submit(self.queue, &[submit_info], None)
                .result()?;
            device.queue_wait_idle(self.queue).result()?;
        }
        Ok(())
    }
}

/// Edge lengths of one compute thread group.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct TileSize {
    pub x: u32,
    pub y: u32,
}

impl TileSize {
    /// Thread-group counts covering a `cols` x `rows` grid, by ceiling
    /// division; partial edge tiles are cut off inside the kernels.
    pub fn groups(&self, cols: usize, rows: usize) -> (u32, u32) {
        (ceil_div(cols as u32, self.x), ceil_div(rows as u32, self.y))
    }
}

pub(crate) fn ceil_div(n: u32, d: u32) -> u32 {
    (n + d - 1) / d
}

/// Clamps the configured tile cap to what the device can schedule, halving
/// the edge until the square tile fits the invocation limit.
pub(crate) fn clamp_tile(cap: u32, max_group_size: [u32; 3], max_invocations: u32) -> TileSize {
    let mut side = cap.max(1).min(max_group_size[0]).min(max_group_size[1]);
    while side > 1 && side * side > max_invocations {
        side /= 2;
    }
    TileSize { x: side, y: side }
}

fn validation_layer_available(entry: &DefaultEntryLoader) -> bool {
    let layers = match unsafe { entry.enumerate_instance_layer_properties(None) }.result() {
        Ok(layers) => layers,
        Err(_) => return false,
    };
    layers.iter().any(|props| {
        let name = unsafe { CStr::from_ptr(props.layer_name.as_ptr()) };
        name.to_bytes() == LAYER_KHRONOS_VALIDATION
    })
}

fn select_device(instance: &InstanceLoader) -> Result<(u32, vk::PhysicalDevice)> {
    let physical_devices =
        unsafe { instance.enumerate_physical_devices(None) }.result()?;
    for device in physical_devices {
        let families =
            unsafe { instance.get_physical_device_queue_family_properties(device, None) };
        for (family, properties) in families.iter().enumerate() {
            if properties.queue_flags.contains(vk::QueueFlags::COMPUTE) {
                return Ok((family as u32, device));
            }
        }
    }
    Err(Error::NoDevice)
}

impl Core {
    pub fn allocator(&self) -> Result<MutexGuard<Allocator>> {
        self.allocator.lock().map_err(|_| Error::AllocatorPoisoned)
    }
}

impl Drop for MatrixMill {
    fn drop(&mut self) {
        unsafe {
            self.core
                .device
                .destroy_command_pool(Some(self.command_pool), None);
        }
    }
}

impl Drop for Core {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}
