//! Command list recycling.
//!
//! A command list is in exactly one of three places: the available list,
//! the hands of the caller recording into it, or the executing list. While
//! recorded and executing it accumulates the transient resources it
//! consumed; the sweep returns those to their pools once the list's fence
//! value is reached.

use windows::{
    core::ComInterface,
    Win32::Graphics::Direct3D12::{
        ID3D12CommandAllocator, ID3D12CommandList, ID3D12Device, ID3D12GraphicsCommandList,
        ID3D12Resource, ID3D12RootSignature, D3D12_COMMAND_LIST_TYPE,
        D3D12_COMMAND_LIST_TYPE_COPY, D3D12_COMMAND_LIST_TYPE_DIRECT,
    },
};

use super::{
    constants::{ConstantBuffer, ConstantBufferPool},
    descriptors::DescriptorHeap,
    queue::CommandQueue,
    upload::{UploadPool, UploadPools},
    writable::{ArgumentBuffer, WritableMesh, WritablePools},
};

pub struct CommandList {
    kind: D3D12_COMMAND_LIST_TYPE,
    fence_value: u64,
    allocator: ID3D12CommandAllocator,
    pub list: ID3D12GraphicsCommandList,

    // In-flight resources, returned to their pools on fence-reach.
    pub upload_pools: Vec<UploadPool>,
    pub constant_buffers: Vec<ConstantBuffer>,
    pub writable_meshes: Vec<WritableMesh>,
    pub argument_buffers: Vec<ArgumentBuffer>,
    pub releasables: Vec<ID3D12Resource>,
}

pub struct CommandListPool {
    available: Vec<CommandList>,
    executing: Vec<CommandList>,
}

impl CommandListPool {
    pub fn new() -> Self {
        Self {
            available: Vec::new(),
            executing: Vec::new(),
        }
    }

    /// Moves executing lists whose fence has been reached back to the
    /// available list, returning their in-flight resources.
    pub fn sweep(
        &mut self,
        direct_queue: &CommandQueue,
        copy_queue: &CommandQueue,
        uploads: &mut UploadPools,
        constants: &mut ConstantBufferPool,
        writables: &mut WritablePools,
    ) {
        let mut i = 0;
        while i < self.executing.len() {
            let queue = if self.executing[i].kind == D3D12_COMMAND_LIST_TYPE_COPY {
                copy_queue
            } else {
                direct_queue
            };

            if !queue.reached(self.executing[i].fence_value) {
                i += 1;
                continue;
            }

            let mut cmd = self.executing.swap_remove(i);

            for pool in cmd.upload_pools.drain(..) {
                uploads.recycle(pool);
            }
            constants.recycle(&mut cmd.constant_buffers);
            writables.recycle_meshes(&mut cmd.writable_meshes);
            writables.recycle_argument_buffers(&mut cmd.argument_buffers);

            // Dropping the references releases each resource exactly once;
            // the vec keeps its capacity for the next submission.
            cmd.releasables.clear();

            self.available.push(cmd);
        }
    }

    /// Opens a command list of the requested type, creating one if none is
    /// available. Direct lists come back with the root signature bound for
    /// graphics and compute and the bindless heap set.
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        &mut self,
        device: &ID3D12Device,
        kind: D3D12_COMMAND_LIST_TYPE,
        root_signature: &ID3D12RootSignature,
        bindless: &DescriptorHeap,
        direct_queue: &CommandQueue,
        copy_queue: &CommandQueue,
        uploads: &mut UploadPools,
        constants: &mut ConstantBufferPool,
        writables: &mut WritablePools,
    ) -> CommandList {
        self.sweep(direct_queue, copy_queue, uploads, constants, writables);

        let position = self.available.iter().position(|cmd| cmd.kind == kind);
        let cmd = match position {
            Some(index) => self.available.swap_remove(index),
            None => {
                let allocator: ID3D12CommandAllocator =
                    unsafe { device.CreateCommandAllocator(kind) }.unwrap();
                let list: ID3D12GraphicsCommandList =
                    unsafe { device.CreateCommandList(0, kind, &allocator, None) }.unwrap();
                // Lists are created open; close so the reset below is
                // uniform for new and recycled lists.
                unsafe { list.Close() }.unwrap();

                log::debug!("allocated a command list (type {})", kind.0);

                CommandList {
                    kind,
                    fence_value: 0,
                    allocator,
                    list,
                    upload_pools: Vec::new(),
                    constant_buffers: Vec::new(),
                    writable_meshes: Vec::new(),
                    argument_buffers: Vec::new(),
                    releasables: Vec::new(),
                }
            }
        };

        unsafe {
            cmd.allocator.Reset().unwrap();
            cmd.list.Reset(&cmd.allocator, None).unwrap();
        }

        if kind == D3D12_COMMAND_LIST_TYPE_DIRECT {
            unsafe {
                cmd.list.SetGraphicsRootSignature(root_signature);
                cmd.list.SetComputeRootSignature(root_signature);
                cmd.list.SetDescriptorHeaps(&[Some(bindless.heap.clone())]);
            }
        }

        cmd
    }

    /// Closes and executes `cmd` on `queue`, signals, and parks the list
    /// on the executing side until the signaled value is reached.
    pub fn submit(&mut self, mut cmd: CommandList, queue: &mut CommandQueue) -> u64 {
        unsafe {
            cmd.list.Close().unwrap();

            let list: ID3D12CommandList = cmd.list.cast().unwrap();
            queue.queue.ExecuteCommandLists(&[Some(list)]);
        }

        let fence_value = queue.signal();
        cmd.fence_value = fence_value;
        self.executing.push(cmd);

        fence_value
    }

    #[must_use]
    pub fn executing_is_empty(&self) -> bool {
        self.executing.is_empty()
    }
}
