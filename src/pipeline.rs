use crate::engine::{SharedCore, TileSize};
use crate::error::{Error, Result};
use erupt::{utils::decode_spv, vk1_0 as vk, DeviceLoader};
use log::debug;
use std::os::raw::c_void;
use std::path::Path;

/// One precompiled compute kernel: pipeline, layouts and a single
/// descriptor set. The set is rebound before each dispatch; reusing it is
/// safe because the engine runs operations strictly one at a time.
pub(crate) struct KernelPipeline {
    pipeline: vk::Pipeline,
    pipeline_layout: vk::PipelineLayout,
    descriptor_set_layout: vk::DescriptorSetLayout,
    descriptor_pool: vk::DescriptorPool,
    descriptor_set: vk::DescriptorSet,
    core: SharedCore,
}

impl KernelPipeline {
    /// Loads the SPIR-V module at `path` and builds a compute pipeline with
    /// `storage_buffers` storage-buffer bindings and `push_bytes` bytes of
    /// push constants. The work-group size is injected through
    /// specialization constants 0 and 1, which keeps the tile cap a host
    /// configuration value instead of a shader-source constant.
    pub fn new(
        core: SharedCore,
        path: &Path,
        tile: TileSize,
        storage_buffers: u32,
        push_bytes: u32,
    ) -> Result<Self> {
        let bindings = (0..storage_buffers)
            .map(|binding| {
                vk::DescriptorSetLayoutBindingBuilder::new()
                    .binding(binding)
                    .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                    .descriptor_count(1)
                    .stage_flags(vk::ShaderStageFlags::COMPUTE)
            })
            .collect::<Vec<_>>();
        let create_info = vk::DescriptorSetLayoutCreateInfoBuilder::new().bindings(&bindings);
        let descriptor_set_layout = unsafe {
            core.device
                .create_descriptor_set_layout(&create_info, None, None)
        }
        .result()?;

        let spirv = std::fs::read(path).map_err(|source| Error::KernelModule {
            source,
            path: path.to_owned(),
        })?;
        let decoded = decode_spv(&spirv).map_err(|source| Error::KernelModule {
            source,
            path: path.to_owned(),
        })?;
        let create_info = vk::ShaderModuleCreateInfoBuilder::new().code(&decoded);
        let shader_module =
            unsafe { core.device.create_shader_module(&create_info, None, None) }.result()?;

        let push_constant_ranges = [vk::PushConstantRangeBuilder::new()
            .stage_flags(vk::ShaderStageFlags::COMPUTE)
            .offset(0)
            .size(push_bytes)];
        let descriptor_set_layouts = [descriptor_set_layout];
        let create_info = vk::PipelineLayoutCreateInfoBuilder::new()
            .set_layouts(&descriptor_set_layouts)
            .push_constant_ranges(&push_constant_ranges);
        let pipeline_layout =
            unsafe { core.device.create_pipeline_layout(&create_info, None, None) }.result()?;

        let spec_entries = [
            vk::SpecializationMapEntry {
                constant_id: 0,
                offset: 0,
                size: 4,
            },
            vk::SpecializationMapEntry {
                constant_id: 1,
                offset: 4,
                size: 4,
            },
        ];
        let spec_data = [tile.x, tile.y];
        let spec_info = vk::SpecializationInfo {
            map_entry_count: spec_entries.len() as u32,
            p_map_entries: spec_entries.as_ptr(),
            data_size: std::mem::size_of_val(&spec_data),
            p_data: spec_data.as_ptr() as *const c_void,
        };

        let entry_point = c"main";
        let stage = vk::PipelineShaderStageCreateInfoBuilder::new()
            .stage(vk::ShaderStageFlagBits::COMPUTE)
            .module(shader_module)
            .name(entry_point)
            .specialization_info(&spec_info)
            .build();
        let create_info = vk::ComputePipelineCreateInfoBuilder::new()
            .stage(stage)
            .layout(pipeline_layout);
        let pipeline = unsafe {
            core.device
                .create_compute_pipelines(None, &[create_info], None)
        }
        .result()?[0];

        unsafe {
            core.device.destroy_shader_module(Some(shader_module), None);
        }

        let pool_sizes = [vk::DescriptorPoolSizeBuilder::new()
            ._type(vk::DescriptorType::STORAGE_BUFFER)
            .descriptor_count(storage_buffers)];
        let create_info = vk::DescriptorPoolCreateInfoBuilder::new()
            .pool_sizes(&pool_sizes)
            .max_sets(1);
        let descriptor_pool =
            unsafe { core.device.create_descriptor_pool(&create_info, None, None) }.result()?;
        let set_layouts = [descriptor_set_layout];
        let allocate_info = vk::DescriptorSetAllocateInfoBuilder::new()
            .descriptor_pool(descriptor_pool)
            .set_layouts(&set_layouts);
        let descriptor_set =
            unsafe { core.device.allocate_descriptor_sets(&allocate_info) }.result()?[0];

        debug!(
            "compiled kernel {:?} ({} bindings, {}x{} tile)",
            path, storage_buffers, tile.x, tile.y
        );

        Ok(Self {
            pipeline,
            pipeline_layout,
            descriptor_set_layout,
            descriptor_pool,
            descriptor_set,
            core,
        })
    }

    /// Points the descriptor set at the current staging buffers, one per
    /// binding in order.
    pub fn bind(&self, buffers: &[vk::Buffer]) {
        let infos = buffers
            .iter()
            .map(|&buffer| {
                [vk::DescriptorBufferInfoBuilder::new()
                    .buffer(buffer)
                    .offset(0)
                    .range(vk::WHOLE_SIZE)]
            })
            .collect::<Vec<_>>();
        let writes = infos
            .iter()
            .enumerate()
            .map(|(binding, info)| {
                vk::WriteDescriptorSetBuilder::new()
                    .dst_set(self.descriptor_set)
                    .dst_binding(binding as u32)
                    .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                    .buffer_info(info)
            })
            .collect::<Vec<_>>();
        unsafe { self.core.device.update_descriptor_sets(&writes, &[]) };
    }

    /// Records bind + push constants + dispatch into `command_buffer`.
    pub fn record(
        &self,
        device: &DeviceLoader,
        command_buffer: vk::CommandBuffer,
        push: &[u8],
        groups: (u32, u32),
    ) {
        unsafe {
            device.cmd_bind_pipeline(
                command_buffer,
                vk::PipelineBindPoint::COMPUTE,
                self.pipeline,
            );
            device.cmd_bind_descriptor_sets(
                command_buffer,
                vk::PipelineBindPoint::COMPUTE,
                self.pipeline_layout,
                0,
                &[self.descriptor_set],
                &[],
            );
            device.cmd_push_constants(
                command_buffer,
                self.pipeline_layout,
                vk::ShaderStageFlags::COMPUTE,
                0,
                push.len() as u32,
                push.as_ptr() as _,
            );
            device.cmd_dispatch(command_buffer, groups.0, groups.1, 1);
        }
    }
}

impl Drop for KernelPipeline {
    fn drop(&mut self) {
        unsafe {
            self.core.device.destroy_pipeline(Some(self.pipeline), None);
            self.core
                .device
                .destroy_pipeline_layout(Some(self.pipeline_layout), None);
            self.core
                .device
                .destroy_descriptor_pool(Some(self.descriptor_pool), None);
            self.core
                .device
                .destroy_descriptor_set_layout(Some(self.descriptor_set_layout), None);
        }
    }
}
