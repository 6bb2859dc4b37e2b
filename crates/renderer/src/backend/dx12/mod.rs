//! The Direct3D 12 backend.
//!
//! One DIRECT queue renders and presents; one COPY queue feeds uploads.
//! Everything shader-visible lives in a single bindless descriptor heap
//! indexed through root constants.

mod commands;
mod constants;
mod descriptors;
mod device;
mod frame;
mod mesh;
mod pipeline;
mod queue;
mod resources;
mod swapchain;
mod upload;
mod writable;

use raw_window_handle::{HasRawWindowHandle, RawWindowHandle};
use windows::Win32::{
    Foundation::HWND,
    Graphics::{
        Direct3D12::{
            ID3D12Device, ID3D12Resource, D3D12_BUFFER_UAV, D3D12_BUFFER_UAV_FLAG_NONE,
            D3D12_COMMAND_LIST_TYPE, D3D12_COMMAND_LIST_TYPE_COPY, D3D12_COMMAND_LIST_TYPE_DIRECT,
            D3D12_DESCRIPTOR_HEAP_TYPE_CBV_SRV_UAV, D3D12_DESCRIPTOR_HEAP_TYPE_DSV,
            D3D12_DESCRIPTOR_HEAP_TYPE_RTV, D3D12_HEAP_TYPE_DEFAULT,
            D3D12_RESOURCE_FLAG_ALLOW_UNORDERED_ACCESS, D3D12_RESOURCE_STATE_UNORDERED_ACCESS,
            D3D12_UAV_DIMENSION_BUFFER, D3D12_UNORDERED_ACCESS_VIEW_DESC,
            D3D12_UNORDERED_ACCESS_VIEW_DESC_0,
        },
        Dxgi::Common::{DXGI_FORMAT, DXGI_FORMAT_D32_FLOAT, DXGI_FORMAT_R32_UINT, DXGI_FORMAT_R8G8B8A8_UNORM, DXGI_FORMAT_UNKNOWN},
    },
};

use structures::{Pool, ScratchPool};

use crate::{
    Config, CullRecord, IndirectCommand, Material, RendererError, Result, ShaderSet, UploadTicket,
    MAX_INSTANCE_COUNT,
};

use self::{
    commands::{CommandList, CommandListPool},
    constants::ConstantBufferPool,
    descriptors::{Descriptor, DescriptorHeap},
    mesh::{MaterialData, MeshData},
    pipeline::Pipelines,
    queue::CommandQueue,
    swapchain::Swapchain,
    upload::UploadPools,
    writable::WritablePools,
};

pub(crate) const RENDER_TARGET_FORMAT: DXGI_FORMAT = DXGI_FORMAT_R8G8B8A8_UNORM;
pub(crate) const DEPTH_FORMAT: DXGI_FORMAT = DXGI_FORMAT_D32_FLOAT;

const MAX_RTV_COUNT: u32 = 1024;
const MAX_DSV_COUNT: u32 = 1024;
const BINDLESS_HEAP_CAPACITY: u32 = 1_000_000;

const MESH_POOL_CAPACITY: u32 = 8 * 1024;
const MATERIAL_POOL_CAPACITY: u32 = 8 * 1024;

const SCRATCH_ARENA_SIZE: usize = MAX_INSTANCE_COUNT * std::mem::size_of::<CullRecord>();

/// GPU-side destination of the culling pass: the surviving commands and
/// their count, consumed by `ExecuteIndirect`.
struct CullBuffers {
    output_args: ID3D12Resource,
    output_args_uav: Descriptor,
    output_count: ID3D12Resource,
    output_count_uav: Descriptor,
}

impl CullBuffers {
    fn new(device: &ID3D12Device, bindless: &mut DescriptorHeap) -> windows::core::Result<Self> {
        let output_args = resources::create_buffer(
            device,
            D3D12_HEAP_TYPE_DEFAULT,
            (MAX_INSTANCE_COUNT * std::mem::size_of::<IndirectCommand>()) as u64,
            D3D12_RESOURCE_STATE_UNORDERED_ACCESS,
            D3D12_RESOURCE_FLAG_ALLOW_UNORDERED_ACCESS,
        )?;

        let output_args_uav = bindless.alloc();
        unsafe {
            device.CreateUnorderedAccessView(
                &output_args,
                None,
                Some(&D3D12_UNORDERED_ACCESS_VIEW_DESC {
                    Format: DXGI_FORMAT_UNKNOWN,
                    ViewDimension: D3D12_UAV_DIMENSION_BUFFER,
                    Anonymous: D3D12_UNORDERED_ACCESS_VIEW_DESC_0 {
                        Buffer: D3D12_BUFFER_UAV {
                            FirstElement: 0,
                            NumElements: MAX_INSTANCE_COUNT as u32,
                            StructureByteStride: std::mem::size_of::<IndirectCommand>() as u32,
                            CounterOffsetInBytes: 0,
                            Flags: D3D12_BUFFER_UAV_FLAG_NONE,
                        },
                    },
                }),
                bindless.cpu_handle(output_args_uav),
            )
        };

        let output_count = resources::create_buffer(
            device,
            D3D12_HEAP_TYPE_DEFAULT,
            16,
            D3D12_RESOURCE_STATE_UNORDERED_ACCESS,
            D3D12_RESOURCE_FLAG_ALLOW_UNORDERED_ACCESS,
        )?;

        let output_count_uav = bindless.alloc();
        unsafe {
            device.CreateUnorderedAccessView(
                &output_count,
                None,
                Some(&D3D12_UNORDERED_ACCESS_VIEW_DESC {
                    Format: DXGI_FORMAT_R32_UINT,
                    ViewDimension: D3D12_UAV_DIMENSION_BUFFER,
                    Anonymous: D3D12_UNORDERED_ACCESS_VIEW_DESC_0 {
                        Buffer: D3D12_BUFFER_UAV {
                            FirstElement: 0,
                            NumElements: 1,
                            StructureByteStride: 0,
                            CounterOffsetInBytes: 0,
                            Flags: D3D12_BUFFER_UAV_FLAG_NONE,
                        },
                    },
                }),
                bindless.cpu_handle(output_count_uav),
            )
        };

        Ok(Self {
            output_args,
            output_args_uav,
            output_count,
            output_count_uav,
        })
    }
}

/// An open COPY command list recording uploads. Submit it to get a ticket;
/// the staging memory it consumed recycles once the ticket's fence is
/// reached.
pub struct UploadContext {
    pub(crate) cmd: CommandList,
}

pub struct Renderer {
    dx: device::Interfaces,

    direct_queue: CommandQueue,
    copy_queue: CommandQueue,

    rtv_heap: DescriptorHeap,
    dsv_heap: DescriptorHeap,
    bindless_heap: DescriptorHeap,

    pipelines: Pipelines,

    swapchain: Swapchain,
    depth_buffer: ID3D12Resource,
    depth_view: Descriptor,

    lists: CommandListPool,
    uploads: UploadPools,
    constants: ConstantBufferPool,
    writables: WritablePools,
    cull: CullBuffers,

    meshes: Pool<MeshData>,
    materials: Pool<MaterialData>,
    default_material: Material,

    scratch: ScratchPool,
}

impl Renderer {
    pub fn new(
        window: &impl HasRawWindowHandle,
        shaders: ShaderSet,
        config: &Config,
    ) -> Result<Self> {
        let init_err = |error: windows::core::Error| RendererError::DeviceInitFailed(error.to_string());

        let dx = device::Interfaces::new(config).map_err(init_err)?;

        let direct_queue =
            CommandQueue::new(&dx.device, D3D12_COMMAND_LIST_TYPE_DIRECT).map_err(init_err)?;
        let copy_queue =
            CommandQueue::new(&dx.device, D3D12_COMMAND_LIST_TYPE_COPY).map_err(init_err)?;

        let mut rtv_heap =
            DescriptorHeap::new(&dx.device, D3D12_DESCRIPTOR_HEAP_TYPE_RTV, MAX_RTV_COUNT, false, 1)
                .map_err(init_err)?;
        let mut dsv_heap =
            DescriptorHeap::new(&dx.device, D3D12_DESCRIPTOR_HEAP_TYPE_DSV, MAX_DSV_COUNT, false, 2)
                .map_err(init_err)?;
        let mut bindless_heap = DescriptorHeap::new(
            &dx.device,
            D3D12_DESCRIPTOR_HEAP_TYPE_CBV_SRV_UAV,
            BINDLESS_HEAP_CAPACITY,
            true,
            3,
        )
        .map_err(init_err)?;

        let pipelines = Pipelines::new(&dx.device, &shaders)?;

        let hwnd = match window.raw_window_handle() {
            RawWindowHandle::Win32(handle) => HWND(handle.hwnd as _),
            _ => return Err(RendererError::UnsupportedWindowHandle),
        };

        let swapchain = Swapchain::new(&dx, &direct_queue, hwnd, &mut rtv_heap)
            .map_err(|error| RendererError::SwapchainCreationFailed(error.to_string()))?;

        let depth_view = dsv_heap.alloc();
        let (width, height) = swapchain.size();
        let depth_buffer =
            swapchain::create_depth_buffer(&dx.device, &dsv_heap, depth_view, width, height)
                .map_err(init_err)?;

        let cull = CullBuffers::new(&dx.device, &mut bindless_heap).map_err(init_err)?;

        let mut renderer = Self {
            dx,
            direct_queue,
            copy_queue,
            rtv_heap,
            dsv_heap,
            bindless_heap,
            pipelines,
            swapchain,
            depth_buffer,
            depth_view,
            lists: CommandListPool::new(),
            uploads: UploadPools::new(),
            constants: ConstantBufferPool::new(),
            writables: WritablePools::new(),
            cull,
            meshes: Pool::with_capacity(MESH_POOL_CAPACITY),
            materials: Pool::with_capacity(MATERIAL_POOL_CAPACITY),
            default_material: Material(0),
            scratch: ScratchPool::new(SCRATCH_ARENA_SIZE),
        };

        // The built-in fallback material: one gray texel, uploaded and
        // waited on before the renderer is handed out.
        let mut context = renderer.open_upload_context();
        let default_material = renderer.create_material(&mut context, 1, 1, &[128, 128, 128, 255]);
        let ticket = renderer.submit_upload_context(context);
        renderer.flush_upload(ticket);
        renderer.default_material = default_material;

        log::info!("renderer initialized ({}x{})", width, height);

        Ok(renderer)
    }

    /// Recreates the swapchain buffers and depth target. Zero-sized
    /// requests (minimized windows) are ignored.
    pub fn handle_resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }

        self.direct_queue.flush();

        self.swapchain
            .resize(&self.dx.device, &self.rtv_heap, width, height)
            .unwrap();

        self.depth_buffer = swapchain::create_depth_buffer(
            &self.dx.device,
            &self.dsv_heap,
            self.depth_view,
            width,
            height,
        )
        .unwrap();

        log::info!("resized swapchain ({}x{})", width, height);
    }

    /// Opens a COPY command list for recording resource uploads.
    pub fn open_upload_context(&mut self) -> UploadContext {
        UploadContext {
            cmd: self.open_list(D3D12_COMMAND_LIST_TYPE_COPY),
        }
    }

    /// Submits the recorded uploads on the copy queue. The returned ticket
    /// must be finished (or flushed) before anything it uploaded is
    /// referenced on the direct queue.
    pub fn submit_upload_context(&mut self, context: UploadContext) -> UploadTicket {
        let fence_value = self.lists.submit(context.cmd, &mut self.copy_queue);
        UploadTicket { fence_value }
    }

    #[must_use]
    pub fn upload_finished(&self, ticket: UploadTicket) -> bool {
        self.copy_queue.reached(ticket.fence_value)
    }

    pub fn flush_upload(&self, ticket: UploadTicket) {
        self.copy_queue.wait(ticket.fence_value);
    }

    fn open_list(&mut self, kind: D3D12_COMMAND_LIST_TYPE) -> CommandList {
        self.lists.open(
            &self.dx.device,
            kind,
            &self.pipelines.root_signature,
            &self.bindless_heap,
            &self.direct_queue,
            &self.copy_queue,
            &mut self.uploads,
            &mut self.constants,
            &mut self.writables,
        )
    }

    /// Blocks until both queues are idle.
    fn wait_device_idle(&mut self) {
        self.direct_queue.flush();
        self.copy_queue.flush();
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.wait_device_idle();

        self.lists.sweep(
            &self.direct_queue,
            &self.copy_queue,
            &mut self.uploads,
            &mut self.constants,
            &mut self.writables,
        );
        debug_assert!(self.lists.executing_is_empty());
    }
}
