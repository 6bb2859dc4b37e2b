use windows::{
    core::ComInterface,
    Win32::{
        Foundation::HWND,
        Graphics::{
            Direct3D12::{
                ID3D12Device, ID3D12Resource, D3D12_CLEAR_VALUE, D3D12_CLEAR_VALUE_0,
                D3D12_DEPTH_STENCIL_VALUE, D3D12_DEPTH_STENCIL_VIEW_DESC,
                D3D12_DEPTH_STENCIL_VIEW_DESC_0, D3D12_DSV_DIMENSION_TEXTURE2D,
                D3D12_RESOURCE_FLAG_ALLOW_DEPTH_STENCIL, D3D12_RESOURCE_STATE_DEPTH_WRITE,
                D3D12_TEX2D_DSV,
            },
            Dxgi::{
                Common::{DXGI_ALPHA_MODE_IGNORE, DXGI_FORMAT_R32_TYPELESS, DXGI_FORMAT_UNKNOWN, DXGI_SAMPLE_DESC},
                IDXGISwapChain3, DXGI_MWA_NO_ALT_ENTER, DXGI_SCALING_NONE, DXGI_SWAP_CHAIN_DESC1,
                DXGI_SWAP_EFFECT_FLIP_DISCARD, DXGI_USAGE_RENDER_TARGET_OUTPUT,
            },
        },
    },
};

use super::{
    descriptors::{Descriptor, DescriptorHeap},
    device::Interfaces,
    queue::CommandQueue,
    resources, DEPTH_FORMAT, RENDER_TARGET_FORMAT,
};

pub const BUFFER_COUNT: u32 = 2;

/// The swapchain, its back buffers, and the fence values serializing
/// their reuse.
///
/// RTV descriptors are allocated once and keep their slots across
/// resizes; only the views are rewritten.
pub struct Swapchain {
    swapchain: IDXGISwapChain3,
    buffers: Vec<ID3D12Resource>,
    rtvs: [Descriptor; BUFFER_COUNT as usize],
    fences: [u64; BUFFER_COUNT as usize],
    width: u32,
    height: u32,
}

impl Swapchain {
    pub fn new(
        dx: &Interfaces,
        queue: &CommandQueue,
        window: HWND,
        rtv_heap: &mut DescriptorHeap,
    ) -> windows::core::Result<Self> {
        let swapchain: IDXGISwapChain3 = unsafe {
            dx.gi.CreateSwapChainForHwnd(
                &queue.queue,
                window,
                &DXGI_SWAP_CHAIN_DESC1 {
                    // Zero width/height match the window's client area.
                    Width: 0,
                    Height: 0,
                    Format: RENDER_TARGET_FORMAT,
                    Stereo: false.into(),
                    SampleDesc: DXGI_SAMPLE_DESC {
                        Count: 1,
                        Quality: 0,
                    },
                    BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
                    BufferCount: BUFFER_COUNT,
                    Scaling: DXGI_SCALING_NONE,
                    SwapEffect: DXGI_SWAP_EFFECT_FLIP_DISCARD,
                    AlphaMode: DXGI_ALPHA_MODE_IGNORE,
                    Flags: 0,
                },
                None,
                None,
            )
        }?
        .cast()?;

        // Disable fullscreen transitions.
        unsafe { dx.gi.MakeWindowAssociation(window, DXGI_MWA_NO_ALT_ENTER) }?;

        let rtvs = [rtv_heap.alloc(), rtv_heap.alloc()];

        let mut this = Self {
            swapchain,
            buffers: Vec::new(),
            rtvs,
            fences: [0; BUFFER_COUNT as usize],
            width: 0,
            height: 0,
        };
        this.acquire_buffers(&dx.device, rtv_heap)?;

        Ok(this)
    }

    fn acquire_buffers(
        &mut self,
        device: &ID3D12Device,
        rtv_heap: &DescriptorHeap,
    ) -> windows::core::Result<()> {
        let mut desc = DXGI_SWAP_CHAIN_DESC1::default();
        unsafe { self.swapchain.GetDesc1(&mut desc) }?;
        self.width = desc.Width;
        self.height = desc.Height;

        for i in 0..BUFFER_COUNT {
            let buffer: ID3D12Resource = unsafe { self.swapchain.GetBuffer(i) }?;
            unsafe {
                device.CreateRenderTargetView(
                    &buffer,
                    None,
                    rtv_heap.cpu_handle(self.rtvs[i as usize]),
                )
            };
            self.buffers.push(buffer);
        }

        Ok(())
    }

    /// Recreates the back buffers at the new size. The caller must have
    /// flushed the queue the swapchain presents on.
    pub fn resize(
        &mut self,
        device: &ID3D12Device,
        rtv_heap: &DescriptorHeap,
        width: u32,
        height: u32,
    ) -> windows::core::Result<()> {
        // Every reference must be dropped before ResizeBuffers.
        self.buffers.clear();

        unsafe {
            self.swapchain
                .ResizeBuffers(0, width, height, DXGI_FORMAT_UNKNOWN, 0)
        }?;

        self.acquire_buffers(device, rtv_heap)
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        unsafe { self.swapchain.GetCurrentBackBufferIndex() } as usize
    }

    #[must_use]
    pub fn buffer(&self, index: usize) -> &ID3D12Resource {
        &self.buffers[index]
    }

    #[must_use]
    pub fn rtv(&self, index: usize) -> Descriptor {
        self.rtvs[index]
    }

    #[must_use]
    pub fn fence(&self, index: usize) -> u64 {
        self.fences[index]
    }

    pub fn set_fence(&mut self, index: usize, value: u64) {
        self.fences[index] = value;
    }

    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn present(&self) {
        // Sync interval 1: rendering is throttled to the display.
        unsafe { self.swapchain.Present(1, 0) }.ok().unwrap();
    }
}

/// Creates the depth target and rewrites the depth view at `view`.
///
/// The resource is typeless so the same memory could be viewed as a
/// shader resource later; the DSV picks the D32 interpretation.
pub fn create_depth_buffer(
    device: &ID3D12Device,
    dsv_heap: &DescriptorHeap,
    view: Descriptor,
    width: u32,
    height: u32,
) -> windows::core::Result<ID3D12Resource> {
    let clear_value = D3D12_CLEAR_VALUE {
        Format: DEPTH_FORMAT,
        Anonymous: D3D12_CLEAR_VALUE_0 {
            // Reverse-Z: the far plane is 0.
            DepthStencil: D3D12_DEPTH_STENCIL_VALUE {
                Depth: 0.0,
                Stencil: 0,
            },
        },
    };

    let depth_buffer = resources::create_texture2d(
        device,
        width,
        height,
        DXGI_FORMAT_R32_TYPELESS,
        D3D12_RESOURCE_STATE_DEPTH_WRITE,
        D3D12_RESOURCE_FLAG_ALLOW_DEPTH_STENCIL,
        Some(&clear_value),
    )?;

    let dsv_desc = D3D12_DEPTH_STENCIL_VIEW_DESC {
        Format: DEPTH_FORMAT,
        ViewDimension: D3D12_DSV_DIMENSION_TEXTURE2D,
        Anonymous: D3D12_DEPTH_STENCIL_VIEW_DESC_0 {
            Texture2D: D3D12_TEX2D_DSV { MipSlice: 0 },
        },
        ..Default::default()
    };

    unsafe { device.CreateDepthStencilView(&depth_buffer, Some(&dsv_desc), dsv_heap.cpu_handle(view)) };

    Ok(depth_buffer)
}
