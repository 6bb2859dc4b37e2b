use windows::Win32::Graphics::Direct3D12::{
    ID3D12Device, ID3D12Resource, D3D12_CONSTANT_BUFFER_VIEW_DESC, D3D12_HEAP_TYPE_UPLOAD,
    D3D12_RESOURCE_FLAG_NONE, D3D12_RESOURCE_STATE_GENERIC_READ,
};

use super::{
    descriptors::{Descriptor, DescriptorHeap},
    resources,
};

pub const CONSTANT_BUFFER_SIZE: u64 = 256;
pub const CONSTANT_BUFFER_BLOCK: u32 = 256;

/// A 256-byte slice of a block resource, permanently paired with a
/// bindless CBV pointing at it.
pub struct ConstantBuffer {
    ptr: *mut u8,
    view: Descriptor,
}

impl ConstantBuffer {
    #[must_use]
    pub fn view(&self) -> Descriptor {
        self.view
    }
}

/// Free list of constant buffers, grown lazily a block at a time.
///
/// Blocks are single mapped upload resources carved into
/// [`CONSTANT_BUFFER_BLOCK`] buffers; they live for the renderer's
/// lifetime. Individual buffers circulate between this free list and the
/// command lists that consumed them.
pub struct ConstantBufferPool {
    free: Vec<ConstantBuffer>,
    blocks: Vec<ID3D12Resource>,
}

impl ConstantBufferPool {
    pub fn new() -> Self {
        Self {
            free: Vec::new(),
            blocks: Vec::new(),
        }
    }

    /// Pops a constant buffer and copies `data` (at most 256 bytes) into
    /// it. Hand the buffer to the consuming command list when done.
    pub fn get(
        &mut self,
        device: &ID3D12Device,
        bindless: &mut DescriptorHeap,
        data: &[u8],
    ) -> ConstantBuffer {
        assert!(data.len() as u64 <= CONSTANT_BUFFER_SIZE);

        if self.free.is_empty() {
            self.grow(device, bindless);
        }

        let buffer = self.free.pop().unwrap();
        unsafe { std::ptr::copy_nonoverlapping(data.as_ptr(), buffer.ptr, data.len()) };
        buffer
    }

    pub fn recycle(&mut self, buffers: &mut Vec<ConstantBuffer>) {
        self.free.append(buffers);
    }

    fn grow(&mut self, device: &ID3D12Device, bindless: &mut DescriptorHeap) {
        log::debug!(
            "creating a constant buffer block ({} buffers)",
            CONSTANT_BUFFER_BLOCK
        );

        let resource = resources::create_buffer(
            device,
            D3D12_HEAP_TYPE_UPLOAD,
            CONSTANT_BUFFER_SIZE * u64::from(CONSTANT_BUFFER_BLOCK),
            D3D12_RESOURCE_STATE_GENERIC_READ,
            D3D12_RESOURCE_FLAG_NONE,
        )
        .unwrap();

        let base = resources::map_entire(&resource);
        let base_gpu = unsafe { resource.GetGPUVirtualAddress() };

        for i in 0..CONSTANT_BUFFER_BLOCK {
            let offset = u64::from(i) * CONSTANT_BUFFER_SIZE;
            let view = bindless.alloc();

            unsafe {
                device.CreateConstantBufferView(
                    Some(&D3D12_CONSTANT_BUFFER_VIEW_DESC {
                        BufferLocation: base_gpu + offset,
                        SizeInBytes: CONSTANT_BUFFER_SIZE as u32,
                    }),
                    bindless.cpu_handle(view),
                )
            };

            self.free.push(ConstantBuffer {
                ptr: unsafe { base.add(offset as usize) },
                view,
            });
        }

        self.blocks.push(resource);
    }
}
