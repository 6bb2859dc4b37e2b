//! Mesh and material lifecycle.
//!
//! Geometry and texel data are staged through the upload pools on an open
//! COPY list; the default-heap resources are created in COMMON and rely on
//! copy-queue state promotion and decay, so no barriers are recorded here.

use geometry::Aabb;
use structures::Handle;
use windows::Win32::Graphics::{
    Direct3D12::{
        ID3D12Resource, D3D12_HEAP_TYPE_DEFAULT, D3D12_PLACED_SUBRESOURCE_FOOTPRINT,
        D3D12_RESOURCE_FLAG_NONE, D3D12_RESOURCE_STATE_COMMON, D3D12_SHADER_RESOURCE_VIEW_DESC,
        D3D12_SHADER_RESOURCE_VIEW_DESC_0, D3D12_SRV_DIMENSION_TEXTURE2D,
        D3D12_SUBRESOURCE_FOOTPRINT, D3D12_TEX2D_SRV, D3D12_TEXTURE_COPY_LOCATION,
        D3D12_TEXTURE_COPY_LOCATION_0, D3D12_TEXTURE_COPY_TYPE_PLACED_FOOTPRINT,
        D3D12_TEXTURE_COPY_TYPE_SUBRESOURCE_INDEX, D3D12_TEXTURE_DATA_PITCH_ALIGNMENT,
        D3D12_TEXTURE_DATA_PLACEMENT_ALIGNMENT, D3D12_DEFAULT_SHADER_4_COMPONENT_MAPPING,
    },
    Dxgi::Common::DXGI_FORMAT_R8G8B8A8_UNORM,
};

use crate::{backend::next_multiple_of, Material, Mesh, MeshCreateInfo, Vertex};

use super::{descriptors::Descriptor, resources, upload, Renderer, UploadContext};

pub struct MeshData {
    pub vbuffer: ID3D12Resource,
    pub ibuffer: ID3D12Resource,
    pub vbuffer_srv: Descriptor,
    pub ibuffer_srv: Descriptor,
    pub index_count: u32,
    pub bounds: Aabb,
}

pub struct MaterialData {
    pub texture: ID3D12Resource,
    pub texture_srv: Descriptor,
}

impl Renderer {
    /// Creates a mesh, recording its vertex and index uploads into
    /// `context`. The mesh must not be drawn until the context's ticket
    /// has finished.
    pub fn create_mesh(&mut self, context: &mut UploadContext, info: &MeshCreateInfo) -> Mesh {
        let vertex_bytes: &[u8] = bytemuck::cast_slice(info.vertices);
        let index_bytes: &[u8] = bytemuck::cast_slice(info.indices);

        let vbuffer = resources::create_buffer(
            &self.dx.device,
            D3D12_HEAP_TYPE_DEFAULT,
            vertex_bytes.len() as u64,
            D3D12_RESOURCE_STATE_COMMON,
            D3D12_RESOURCE_FLAG_NONE,
        )
        .unwrap();
        let ibuffer = resources::create_buffer(
            &self.dx.device,
            D3D12_HEAP_TYPE_DEFAULT,
            index_bytes.len() as u64,
            D3D12_RESOURCE_STATE_COMMON,
            D3D12_RESOURCE_FLAG_NONE,
        )
        .unwrap();

        upload::write_buffer(
            &self.dx.device,
            &mut self.uploads,
            &mut context.cmd,
            &vbuffer,
            0,
            vertex_bytes,
        );
        upload::write_buffer(
            &self.dx.device,
            &mut self.uploads,
            &mut context.cmd,
            &ibuffer,
            0,
            index_bytes,
        );

        let vbuffer_srv = resources::create_structured_srv(
            &self.dx.device,
            &mut self.bindless_heap,
            &vbuffer,
            info.vertices.len() as u32,
            std::mem::size_of::<Vertex>() as u32,
        );
        let ibuffer_srv = resources::create_structured_srv(
            &self.dx.device,
            &mut self.bindless_heap,
            &ibuffer,
            info.indices.len() as u32,
            std::mem::size_of::<u32>() as u32,
        );

        let handle = self
            .meshes
            .insert(MeshData {
                vbuffer,
                ibuffer,
                vbuffer_srv,
                ibuffer_srv,
                index_count: info.indices.len() as u32,
                bounds: info.aabb,
            })
            .expect("mesh pool exhausted");

        Mesh(handle.to_raw())
    }

    /// Frees a mesh immediately. This flushes the device, which is coarse
    /// but keeps freeing trivially correct; it is a tooling path, not a
    /// per-frame one.
    pub fn free_mesh(&mut self, mesh: Mesh) {
        self.wait_device_idle();

        let removed = Handle::from_raw(mesh.0).and_then(|handle| self.meshes.remove(handle));
        let Some(data) = removed else {
            debug_assert!(false, "freed a stale mesh handle");
            return;
        };

        self.bindless_heap.free(data.vbuffer_srv);
        self.bindless_heap.free(data.ibuffer_srv);
        // The buffers release as `data` drops.
    }

    #[must_use]
    pub fn mesh_alive(&self, mesh: Mesh) -> bool {
        self.mesh_data(mesh).is_some()
    }

    /// Creates a material from tightly packed RGBA8 texels, recording the
    /// texture upload into `context`.
    pub fn create_material(
        &mut self,
        context: &mut UploadContext,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> Material {
        let src_pitch = width as usize * 4;
        assert_eq!(rgba.len(), src_pitch * height as usize);

        let texture = resources::create_texture2d(
            &self.dx.device,
            width,
            height,
            DXGI_FORMAT_R8G8B8A8_UNORM,
            D3D12_RESOURCE_STATE_COMMON,
            D3D12_RESOURCE_FLAG_NONE,
            None,
        )
        .unwrap();

        // Placed-footprint source: rows padded out to the 256-byte pitch
        // requirement, the whole footprint 512-aligned.
        let row_pitch = next_multiple_of(
            src_pitch as u64,
            u64::from(D3D12_TEXTURE_DATA_PITCH_ALIGNMENT),
        );
        let chunk = upload::reserve_upload_chunk(
            &self.dx.device,
            &mut self.uploads,
            &mut context.cmd,
            row_pitch * u64::from(height),
            u64::from(D3D12_TEXTURE_DATA_PLACEMENT_ALIGNMENT),
        );

        for row in 0..height as usize {
            unsafe {
                std::ptr::copy_nonoverlapping(
                    rgba.as_ptr().add(row * src_pitch),
                    chunk.ptr.add(row * row_pitch as usize),
                    src_pitch,
                );
            }
        }

        let dst_location = D3D12_TEXTURE_COPY_LOCATION {
            pResource: std::mem::ManuallyDrop::new(Some(unsafe {
                std::mem::transmute_copy(&texture)
            })),
            Type: D3D12_TEXTURE_COPY_TYPE_SUBRESOURCE_INDEX,
            Anonymous: D3D12_TEXTURE_COPY_LOCATION_0 {
                SubresourceIndex: 0,
            },
        };

        let src_location = D3D12_TEXTURE_COPY_LOCATION {
            pResource: std::mem::ManuallyDrop::new(Some(unsafe {
                std::mem::transmute_copy(&chunk.resource)
            })),
            Type: D3D12_TEXTURE_COPY_TYPE_PLACED_FOOTPRINT,
            Anonymous: D3D12_TEXTURE_COPY_LOCATION_0 {
                PlacedFootprint: D3D12_PLACED_SUBRESOURCE_FOOTPRINT {
                    Offset: chunk.offset,
                    Footprint: D3D12_SUBRESOURCE_FOOTPRINT {
                        Format: DXGI_FORMAT_R8G8B8A8_UNORM,
                        Width: width,
                        Height: height,
                        Depth: 1,
                        RowPitch: row_pitch as u32,
                    },
                },
            },
        };

        unsafe {
            context
                .cmd
                .list
                .CopyTextureRegion(&dst_location, 0, 0, 0, &src_location, None)
        };

        let texture_srv = self.bindless_heap.alloc();
        let srv_desc = D3D12_SHADER_RESOURCE_VIEW_DESC {
            Format: DXGI_FORMAT_R8G8B8A8_UNORM,
            ViewDimension: D3D12_SRV_DIMENSION_TEXTURE2D,
            Shader4ComponentMapping: D3D12_DEFAULT_SHADER_4_COMPONENT_MAPPING,
            Anonymous: D3D12_SHADER_RESOURCE_VIEW_DESC_0 {
                Texture2D: D3D12_TEX2D_SRV {
                    MostDetailedMip: 0,
                    MipLevels: u32::MAX,
                    PlaneSlice: 0,
                    ResourceMinLODClamp: 0.0,
                },
            },
        };
        unsafe {
            self.dx.device.CreateShaderResourceView(
                &texture,
                Some(&srv_desc),
                self.bindless_heap.cpu_handle(texture_srv),
            )
        };

        let handle = self
            .materials
            .insert(MaterialData {
                texture,
                texture_srv,
            })
            .expect("material pool exhausted");

        Material(handle.to_raw())
    }

    /// Frees a material immediately, flushing the device first.
    pub fn free_material(&mut self, material: Material) {
        debug_assert!(
            material != self.default_material,
            "freed the built-in default material"
        );

        self.wait_device_idle();

        let removed = Handle::from_raw(material.0).and_then(|handle| self.materials.remove(handle));
        let Some(data) = removed else {
            debug_assert!(false, "freed a stale material handle");
            return;
        };

        self.bindless_heap.free(data.texture_srv);
    }

    #[must_use]
    pub fn material_alive(&self, material: Material) -> bool {
        self.material_data(material).is_some()
    }

    /// The built-in 1x1 gray material used when an instance has none.
    #[must_use]
    pub fn default_material(&self) -> Material {
        self.default_material
    }

    pub(super) fn mesh_data(&self, mesh: Mesh) -> Option<&MeshData> {
        Handle::from_raw(mesh.0).and_then(|handle| self.meshes.get(handle))
    }

    pub(super) fn material_data(&self, material: Material) -> Option<&MaterialData> {
        Handle::from_raw(material.0).and_then(|handle| self.materials.get(handle))
    }
}
