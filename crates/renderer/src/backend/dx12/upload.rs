//! Staging memory for the copy queue.
//!
//! Uploads are carved out of large persistently-mapped pools with a bump
//! cursor. Pools attach to the command list that consumes them and come
//! back through the recycler, rewound, once the submission's fence is
//! reached. Requests bigger than a whole pool get a dedicated staging
//! buffer that rides the command list as a releasable instead.

use windows::Win32::Graphics::Direct3D12::{
    ID3D12Device, ID3D12Resource, D3D12_HEAP_TYPE_UPLOAD, D3D12_RESOURCE_FLAG_NONE,
    D3D12_RESOURCE_STATE_GENERIC_READ,
};

use crate::backend::next_multiple_of;

use super::{commands::CommandList, resources};

pub const UPLOAD_POOL_SIZE: u64 = 32 * 1024 * 1024;

/// One staging pool: a mapped upload buffer and a bump cursor.
pub struct UploadPool {
    resource: ID3D12Resource,
    ptr: *mut u8,
    cursor: u64,
}

impl UploadPool {
    fn new(device: &ID3D12Device) -> Self {
        let resource = resources::create_buffer(
            device,
            D3D12_HEAP_TYPE_UPLOAD,
            UPLOAD_POOL_SIZE,
            D3D12_RESOURCE_STATE_GENERIC_READ,
            D3D12_RESOURCE_FLAG_NONE,
        )
        .unwrap();

        let ptr = resources::map_entire(&resource);

        log::debug!("created a {} MiB upload pool", UPLOAD_POOL_SIZE >> 20);

        Self {
            resource,
            ptr,
            cursor: 0,
        }
    }

    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    pub fn resource(&self) -> &ID3D12Resource {
        &self.resource
    }

    fn try_reserve(&mut self, size: u64, align: u64) -> Option<(u64, *mut u8)> {
        let offset = next_multiple_of(self.cursor, align);

        if offset + size > UPLOAD_POOL_SIZE {
            return None;
        }

        self.cursor = offset + size;
        Some((offset, unsafe { self.ptr.add(offset as usize) }))
    }
}

/// The renderer-wide free list of staging pools.
pub struct UploadPools {
    free: Vec<UploadPool>,
}

impl UploadPools {
    pub fn new() -> Self {
        Self { free: Vec::new() }
    }

    fn acquire(&mut self, device: &ID3D12Device) -> UploadPool {
        self.free.pop().unwrap_or_else(|| UploadPool::new(device))
    }

    /// Returns a pool whose submission has completed. Rewinding here keeps
    /// the free list invariant: every pooled pool has cursor 0.
    pub fn recycle(&mut self, mut pool: UploadPool) {
        pool.rewind();
        self.free.push(pool);
    }
}

/// A reserved region of staging memory, already attached to a command
/// list. `ptr` is the CPU write destination; `resource` + `offset` are the
/// copy source.
pub struct UploadChunk {
    pub resource: ID3D12Resource,
    pub offset: u64,
    pub ptr: *mut u8,
}

/// Reserves `size` bytes of staging memory on `cmd` without writing them.
pub fn reserve_upload_chunk(
    device: &ID3D12Device,
    pools: &mut UploadPools,
    cmd: &mut CommandList,
    size: u64,
    align: u64,
) -> UploadChunk {
    if size > UPLOAD_POOL_SIZE {
        // Dedicated staging buffer; released once the submission's fence
        // is reached.
        let resource = resources::create_buffer(
            device,
            D3D12_HEAP_TYPE_UPLOAD,
            size,
            D3D12_RESOURCE_STATE_GENERIC_READ,
            D3D12_RESOURCE_FLAG_NONE,
        )
        .unwrap();

        let ptr = resources::map_entire(&resource);
        cmd.releasables.push(resource.clone());

        return UploadChunk {
            resource,
            offset: 0,
            ptr,
        };
    }

    // First pool already attached to this command list with room.
    for pool in &mut cmd.upload_pools {
        if let Some((offset, ptr)) = pool.try_reserve(size, align) {
            return UploadChunk {
                resource: pool.resource().clone(),
                offset,
                ptr,
            };
        }
    }

    let mut pool = pools.acquire(device);
    let (offset, ptr) = pool
        .try_reserve(size, align)
        .expect("a rewound upload pool always fits a request this size");

    let chunk = UploadChunk {
        resource: pool.resource().clone(),
        offset,
        ptr,
    };

    cmd.upload_pools.push(pool);
    chunk
}

/// Copies `data` into staging memory attached to `cmd`.
pub fn get_upload_chunk(
    device: &ID3D12Device,
    pools: &mut UploadPools,
    cmd: &mut CommandList,
    data: &[u8],
    align: u64,
) -> UploadChunk {
    let chunk = reserve_upload_chunk(device, pools, cmd, data.len() as u64, align);

    unsafe { std::ptr::copy_nonoverlapping(data.as_ptr(), chunk.ptr, data.len()) };

    chunk
}

/// Stages `data` and records a copy of it into `dst` at `dst_offset`.
pub fn write_buffer(
    device: &ID3D12Device,
    pools: &mut UploadPools,
    cmd: &mut CommandList,
    dst: &ID3D12Resource,
    dst_offset: u64,
    data: &[u8],
) {
    let chunk = get_upload_chunk(device, pools, cmd, data, 4);

    unsafe {
        cmd.list.CopyBufferRegion(
            dst,
            dst_offset,
            &chunk.resource,
            chunk.offset,
            data.len() as u64,
        )
    };
}
