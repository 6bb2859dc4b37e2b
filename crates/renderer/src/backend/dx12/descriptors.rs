use windows::Win32::Graphics::Direct3D12::{
    ID3D12DescriptorHeap, ID3D12Device, D3D12_CPU_DESCRIPTOR_HANDLE, D3D12_DESCRIPTOR_HEAP_DESC,
    D3D12_DESCRIPTOR_HEAP_FLAG_NONE, D3D12_DESCRIPTOR_HEAP_FLAG_SHADER_VISIBLE,
    D3D12_DESCRIPTOR_HEAP_TYPE, D3D12_GPU_DESCRIPTOR_HANDLE,
};

/// An index into one [`DescriptorHeap`].
///
/// Debug builds carry the owning heap's id and the slot's generation so
/// stale or cross-heap use trips an assertion instead of binding garbage.
#[derive(Clone, Copy, Debug)]
pub struct Descriptor {
    index: u32,
    #[cfg(debug_assertions)]
    meta: u32,
}

impl Descriptor {
    /// The slot index, as shaders see it through root constants.
    #[must_use]
    pub fn index(&self) -> u32 {
        self.index
    }
}

/// A fixed-capacity free-list allocator over a `ID3D12DescriptorHeap`.
pub struct DescriptorHeap {
    pub heap: ID3D12DescriptorHeap,
    stride: u32,
    base_cpu: usize,
    base_gpu: u64,
    shader_visible: bool,
    free_list: Vec<u32>,
    #[cfg(debug_assertions)]
    id: u16,
    #[cfg(debug_assertions)]
    generations: Vec<u16>,
}

impl DescriptorHeap {
    #[cfg_attr(not(debug_assertions), allow(unused_variables))]
    pub fn new(
        device: &ID3D12Device,
        kind: D3D12_DESCRIPTOR_HEAP_TYPE,
        capacity: u32,
        shader_visible: bool,
        id: u16,
    ) -> windows::core::Result<Self> {
        let heap: ID3D12DescriptorHeap = unsafe {
            device.CreateDescriptorHeap(&D3D12_DESCRIPTOR_HEAP_DESC {
                Type: kind,
                NumDescriptors: capacity,
                Flags: if shader_visible {
                    D3D12_DESCRIPTOR_HEAP_FLAG_SHADER_VISIBLE
                } else {
                    D3D12_DESCRIPTOR_HEAP_FLAG_NONE
                },
                NodeMask: 0,
            })
        }?;

        let stride = unsafe { device.GetDescriptorHandleIncrementSize(kind) };
        let base_cpu = unsafe { heap.GetCPUDescriptorHandleForHeapStart() }.ptr;
        let base_gpu = if shader_visible {
            unsafe { heap.GetGPUDescriptorHandleForHeapStart() }.ptr
        } else {
            0
        };

        Ok(Self {
            heap,
            stride,
            base_cpu,
            base_gpu,
            shader_visible,
            // Reversed so index 0 is handed out first.
            free_list: (0..capacity).rev().collect(),
            #[cfg(debug_assertions)]
            id,
            #[cfg(debug_assertions)]
            generations: vec![1; capacity as usize],
        })
    }

    pub fn alloc(&mut self) -> Descriptor {
        let index = self.free_list.pop().expect("descriptor heap exhausted");

        Descriptor {
            index,
            #[cfg(debug_assertions)]
            meta: u32::from(self.id) << 16 | u32::from(self.generations[index as usize]),
        }
    }

    pub fn free(&mut self, descriptor: Descriptor) {
        self.validate(descriptor);

        #[cfg(debug_assertions)]
        {
            let generation = &mut self.generations[descriptor.index as usize];
            *generation = generation.wrapping_add(1);
        }

        self.free_list.push(descriptor.index);
    }

    #[must_use]
    pub fn cpu_handle(&self, descriptor: Descriptor) -> D3D12_CPU_DESCRIPTOR_HANDLE {
        self.validate(descriptor);

        D3D12_CPU_DESCRIPTOR_HANDLE {
            ptr: self.base_cpu + self.stride as usize * descriptor.index as usize,
        }
    }

    /// Only valid on shader-visible heaps.
    #[allow(dead_code)]
    #[must_use]
    pub fn gpu_handle(&self, descriptor: Descriptor) -> D3D12_GPU_DESCRIPTOR_HANDLE {
        self.validate(descriptor);
        assert!(self.shader_visible);

        D3D12_GPU_DESCRIPTOR_HANDLE {
            ptr: self.base_gpu + u64::from(self.stride) * u64::from(descriptor.index),
        }
    }

    #[cfg(debug_assertions)]
    fn validate(&self, descriptor: Descriptor) {
        assert!((descriptor.index as usize) < self.generations.len());
        assert!(
            descriptor.meta >> 16 == u32::from(self.id),
            "descriptor used with a heap other than its allocator"
        );
        assert!(
            descriptor.meta & 0xFFFF == u32::from(self.generations[descriptor.index as usize]),
            "stale descriptor"
        );
    }

    #[cfg(not(debug_assertions))]
    fn validate(&self, _descriptor: Descriptor) {}
}
