use crate::engine::SharedCore;
use crate::error::Result;
use erupt::{
    utils::allocator::{Allocation, MemoryTypeFinder},
    vk1_0 as vk,
};
use log::debug;

/// How the engine manages its device-resident scratch buffers.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum BufferPolicy {
    /// Keep the three scratch buffers alive between operations and only
    /// grow them, never shrink. Amortizes allocation cost across repeated
    /// calls of similar size.
    #[default]
    Cached,
    /// Allocate fresh buffers for every operation and free them afterwards.
    PerCall,
}

/// Which slot of the scratch-buffer cache an upload targets.
#[derive(Copy, Clone, Debug)]
pub(crate) enum Role {
    OperandA = 0,
    OperandB = 1,
    Output = 2,
}

struct ScratchBuffer {
    allocation: Option<Allocation<vk::Buffer>>,
    capacity: usize,
}

/// The cache of device-visible staging buffers shared by all three kernels.
/// Not synchronized; the engine serializes access by taking `&mut self` on
/// every operation.
pub(crate) struct StagingBuffers {
    slots: [ScratchBuffer; 3],
    policy: BufferPolicy,
    core: SharedCore,
}

impl StagingBuffers {
    pub fn new(core: SharedCore, policy: BufferPolicy) -> Self {
        let empty = || ScratchBuffer {
            allocation: None,
            capacity: 0,
        };
        Self {
            slots: [empty(), empty(), empty()],
            policy,
            core,
        }
    }

    /// Makes sure the slot holds at least `byte_len` bytes, reallocating
    /// only on growth.
    fn ensure(&mut self, role: Role, byte_len: usize) -> Result<vk::Buffer> {
        // Vulkan forbids zero-sized buffers.
        let byte_len = byte_len.max(std::mem::size_of::<f32>());
        let slot = &mut self.slots[role as usize];
        if let Some(allocation) = slot.allocation.as_ref() {
            if byte_len <= slot.capacity {
                return Ok(*allocation.object());
            }
        }
        if let Some(old) = slot.allocation.take() {
            self.core.allocator()?.free(&self.core.device, old);
        }
        debug!("growing {:?} scratch buffer to {} bytes", role, byte_len);
        let create_info = vk::BufferCreateInfoBuilder::new()
            .usage(vk::BufferUsageFlags::STORAGE_BUFFER)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .size(byte_len as u64);
        let buffer =
            unsafe { self.core.device.create_buffer(&create_info, None, None) }.result()?;
        let allocation = self
            .core
            .allocator()?
            .allocate(&self.core.device, buffer, MemoryTypeFinder::dynamic())
            .result()?;
        let handle = *allocation.object();
        slot.allocation = Some(allocation);
        slot.capacity = byte_len;
        Ok(handle)
    }

    /// Stages host data into the slot's buffer and returns the handle.
    pub fn upload(&mut self, role: Role, data: &[f32]) -> Result<vk::Buffer> {
        let byte_len = std::mem::size_of_val(data);
        let buffer = self.ensure(role, byte_len)?;
        if data.is_empty() {
            return Ok(buffer);
        }
        let slot = &self.slots[role as usize];
        let mut mapping = slot
            .allocation
            .as_ref()
            .unwrap()
            .map(&self.core.device, 0..byte_len as u64)
            .result()?;
        mapping.import(bytemuck::cast_slice(data));
        mapping.unmap(&self.core.device).result()?;
        Ok(buffer)
    }

    /// Reserves room for `count` result elements without uploading anything.
    pub fn prepare_output(&mut self, count: usize) -> Result<vk::Buffer> {
        self.ensure(Role::Output, count * std::mem::size_of::<f32>())
    }

    /// Copies `count` elements back out of the output buffer.
    pub fn read_output(&mut self, count: usize) -> Result<Vec<f32>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let byte_len = count * std::mem::size_of::<f32>();
        let slot = &self.slots[Role::Output as usize];
        let mapping = slot
            .allocation
            .as_ref()
            .unwrap()
            .map(&self.core.device, 0..byte_len as u64)
            .result()?;
        let mut out = vec![0.0f32; count];
        out.copy_from_slice(bytemuck::cast_slice(mapping.read()));
        mapping.unmap(&self.core.device).result()?;
        Ok(out)
    }

    /// Called after every completed operation; under `PerCall` the buffers
    /// are released again.
    pub fn finish_pass(&mut self) -> Result<()> {
        if self.policy == BufferPolicy::PerCall {
            self.release_all()?;
        }
        Ok(())
    }

    fn release_all(&mut self) -> Result<()> {
        for slot in &mut self.slots {
            if let Some(allocation) = slot.allocation.take() {
                self.core.allocator()?.free(&self.core.device, allocation);
            }
            slot.capacity = 0;
        }
        Ok(())
    }
}

impl Drop for StagingBuffers {
    fn drop(&mut self) {
        let _ = self.release_all();
    }
}
