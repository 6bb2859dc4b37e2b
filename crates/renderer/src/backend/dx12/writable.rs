//! Host-visible geometry and argument buffers written fresh every frame.

use glam::Vec4;
use windows::Win32::Graphics::Direct3D12::{
    ID3D12Device, ID3D12Resource, D3D12_HEAP_TYPE_UPLOAD, D3D12_RESOURCE_FLAG_NONE,
    D3D12_RESOURCE_STATE_GENERIC_READ,
};

use crate::{CullRecord, MAX_INSTANCE_COUNT};

use super::{
    descriptors::{Descriptor, DescriptorHeap},
    resources,
};

pub const LINE_VERTEX_CAPACITY: usize = 64 * 1024;
pub const LINE_INDEX_CAPACITY: usize = 64 * 1024;

/// A mapped vertex+index buffer pair for the line overlay, with bindless
/// SRVs so the line vertex shader can pull from both.
pub struct WritableMesh {
    vbuffer: ID3D12Resource,
    ibuffer: ID3D12Resource,
    vbuffer_ptr: *mut u8,
    ibuffer_ptr: *mut u8,
    vbuffer_srv: Descriptor,
    ibuffer_srv: Descriptor,
}

impl WritableMesh {
    fn new(device: &ID3D12Device, bindless: &mut DescriptorHeap) -> Self {
        let vbuffer = resources::create_buffer(
            device,
            D3D12_HEAP_TYPE_UPLOAD,
            (LINE_VERTEX_CAPACITY * std::mem::size_of::<Vec4>()) as u64,
            D3D12_RESOURCE_STATE_GENERIC_READ,
            D3D12_RESOURCE_FLAG_NONE,
        )
        .unwrap();

        let ibuffer = resources::create_buffer(
            device,
            D3D12_HEAP_TYPE_UPLOAD,
            (LINE_INDEX_CAPACITY * std::mem::size_of::<u32>()) as u64,
            D3D12_RESOURCE_STATE_GENERIC_READ,
            D3D12_RESOURCE_FLAG_NONE,
        )
        .unwrap();

        let vbuffer_ptr = resources::map_entire(&vbuffer);
        let ibuffer_ptr = resources::map_entire(&ibuffer);

        let vbuffer_srv = resources::create_structured_srv(
            device,
            bindless,
            &vbuffer,
            LINE_VERTEX_CAPACITY as u32,
            std::mem::size_of::<Vec4>() as u32,
        );
        let ibuffer_srv = resources::create_structured_srv(
            device,
            bindless,
            &ibuffer,
            LINE_INDEX_CAPACITY as u32,
            std::mem::size_of::<u32>() as u32,
        );

        log::debug!("created a writable mesh");

        Self {
            vbuffer,
            ibuffer,
            vbuffer_ptr,
            ibuffer_ptr,
            vbuffer_srv,
            ibuffer_srv,
        }
    }

    pub fn write(&mut self, vertices: &[Vec4], indices: &[u32]) {
        assert!(vertices.len() <= LINE_VERTEX_CAPACITY);
        assert!(indices.len() <= LINE_INDEX_CAPACITY);

        let vertex_bytes: &[u8] = bytemuck::cast_slice(vertices);
        let index_bytes: &[u8] = bytemuck::cast_slice(indices);

        unsafe {
            std::ptr::copy_nonoverlapping(
                vertex_bytes.as_ptr(),
                self.vbuffer_ptr,
                vertex_bytes.len(),
            );
            std::ptr::copy_nonoverlapping(index_bytes.as_ptr(), self.ibuffer_ptr, index_bytes.len());
        }
    }

    #[must_use]
    pub fn vbuffer_srv(&self) -> Descriptor {
        self.vbuffer_srv
    }

    #[must_use]
    pub fn ibuffer_srv(&self) -> Descriptor {
        self.ibuffer_srv
    }
}

/// The culling pass input: a mapped buffer of [`CullRecord`]s with a
/// structured SRV for the compute shader.
pub struct ArgumentBuffer {
    resource: ID3D12Resource,
    ptr: *mut u8,
    srv: Descriptor,
}

impl ArgumentBuffer {
    fn new(device: &ID3D12Device, bindless: &mut DescriptorHeap) -> Self {
        let resource = resources::create_buffer(
            device,
            D3D12_HEAP_TYPE_UPLOAD,
            (MAX_INSTANCE_COUNT * std::mem::size_of::<CullRecord>()) as u64,
            D3D12_RESOURCE_STATE_GENERIC_READ,
            D3D12_RESOURCE_FLAG_NONE,
        )
        .unwrap();

        let ptr = resources::map_entire(&resource);

        let srv = resources::create_structured_srv(
            device,
            bindless,
            &resource,
            MAX_INSTANCE_COUNT as u32,
            std::mem::size_of::<CullRecord>() as u32,
        );

        log::debug!("created an argument buffer");

        Self { resource, ptr, srv }
    }

    pub fn write(&mut self, records: &[CullRecord]) {
        assert!(records.len() <= MAX_INSTANCE_COUNT);

        let bytes: &[u8] = bytemuck::cast_slice(records);
        unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.ptr, bytes.len()) };
    }

    #[must_use]
    pub fn srv(&self) -> Descriptor {
        self.srv
    }
}

/// Free lists for the per-frame writable resources. Consumed entries ride
/// their command list and return here once its fence is reached.
pub struct WritablePools {
    meshes: Vec<WritableMesh>,
    argument_buffers: Vec<ArgumentBuffer>,
}

impl WritablePools {
    pub fn new() -> Self {
        Self {
            meshes: Vec::new(),
            argument_buffers: Vec::new(),
        }
    }

    pub fn acquire_mesh(
        &mut self,
        device: &ID3D12Device,
        bindless: &mut DescriptorHeap,
    ) -> WritableMesh {
        self.meshes
            .pop()
            .unwrap_or_else(|| WritableMesh::new(device, bindless))
    }

    pub fn acquire_argument_buffer(
        &mut self,
        device: &ID3D12Device,
        bindless: &mut DescriptorHeap,
    ) -> ArgumentBuffer {
        self.argument_buffers
            .pop()
            .unwrap_or_else(|| ArgumentBuffer::new(device, bindless))
    }

    pub fn recycle_meshes(&mut self, meshes: &mut Vec<WritableMesh>) {
        self.meshes.append(meshes);
    }

    pub fn recycle_argument_buffers(&mut self, buffers: &mut Vec<ArgumentBuffer>) {
        self.argument_buffers.append(buffers);
    }
}
