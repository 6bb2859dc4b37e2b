//! The frame pipeline: clear, build cull records, dispatch the culling
//! pass, draw the survivors indirectly, overlay lines, present.

use bytemuck::bytes_of;
use structures::Handle;
use windows::Win32::{
    Foundation::RECT,
    Graphics::{
        Direct3D::{D3D_PRIMITIVE_TOPOLOGY_LINELIST, D3D_PRIMITIVE_TOPOLOGY_TRIANGLELIST},
        Direct3D12::{
            D3D12_CLEAR_FLAG_DEPTH, D3D12_COMMAND_LIST_TYPE_DIRECT,
            D3D12_RESOURCE_STATE_COPY_DEST, D3D12_RESOURCE_STATE_INDIRECT_ARGUMENT,
            D3D12_RESOURCE_STATE_PRESENT, D3D12_RESOURCE_STATE_RENDER_TARGET,
            D3D12_RESOURCE_STATE_UNORDERED_ACCESS, D3D12_VIEWPORT,
        },
    },
};

use crate::{CullRecord, FrameData, IndirectCommand, CULL_GROUP_SIZE, MAX_INSTANCE_COUNT};

use super::{
    resources::{transition_barrier, uav_barrier},
    upload, Renderer,
};

const CLEAR_COLOR: [f32; 4] = [0.1, 0.1, 0.1, 1.0];

impl Renderer {
    pub fn render_frame(&mut self, frame: &FrameData) {
        let (width, height) = self.swapchain.size();
        let index = self.swapchain.current_index();

        // Reuse of image `index` is serialized on the fence value recorded
        // the last time it was presented.
        self.direct_queue.wait(self.swapchain.fence(index));

        let mut cmd = self.open_list(D3D12_COMMAND_LIST_TYPE_DIRECT);

        unsafe {
            cmd.list.ResourceBarrier(&[transition_barrier(
                self.swapchain.buffer(index),
                D3D12_RESOURCE_STATE_PRESENT,
                D3D12_RESOURCE_STATE_RENDER_TARGET,
            )]);
        }

        let rtv = self.rtv_heap.cpu_handle(self.swapchain.rtv(index));
        let dsv = self.dsv_heap.cpu_handle(self.depth_view);

        unsafe {
            cmd.list.ClearRenderTargetView(rtv, CLEAR_COLOR.as_ptr(), None);
            // Reverse-Z: clear to the far-plane value, 0.
            cmd.list
                .ClearDepthStencilView(dsv, D3D12_CLEAR_FLAG_DEPTH, 0.0, 0, None);
            cmd.list.OMSetRenderTargets(1, Some(&rtv), false, Some(&dsv));

            cmd.list.RSSetViewports(&[D3D12_VIEWPORT {
                TopLeftX: 0.0,
                TopLeftY: 0.0,
                Width: width as f32,
                Height: height as f32,
                MinDepth: 0.0,
                MaxDepth: 1.0,
            }]);
            cmd.list.RSSetScissorRects(&[RECT {
                left: 0,
                top: 0,
                right: width as i32,
                bottom: height as i32,
            }]);
        }

        let aspect = width as f32 / height as f32;
        let view_projection = frame.camera.view_projection(aspect);
        let camera_cb = self.constants.get(
            &self.dx.device,
            &mut self.bindless_heap,
            bytes_of(&view_projection),
        );

        // One cull record per live instance, staged in scratch memory.
        debug_assert!(frame.instances.len() <= MAX_INSTANCE_COUNT);
        let submitted_count = frame.instances.len().min(MAX_INSTANCE_COUNT);

        let lease = self.scratch.lease(&[]).unwrap();
        let mut arena = lease.arena();
        let records = arena.push_array::<CullRecord>(submitted_count).unwrap();
        let mut record_count = 0;

        for instance in &frame.instances[..submitted_count] {
            let mesh = Handle::from_raw(instance.mesh.0).and_then(|handle| self.meshes.get(handle));
            let Some(mesh) = mesh else {
                debug_assert!(false, "drew a stale mesh handle");
                continue;
            };

            let material = instance.material.unwrap_or(self.default_material);
            let material =
                Handle::from_raw(material.0).and_then(|handle| self.materials.get(handle));
            let Some(material) = material else {
                debug_assert!(false, "drew a stale material handle");
                continue;
            };

            let transform_cb = self.constants.get(
                &self.dx.device,
                &mut self.bindless_heap,
                bytes_of(&instance.transform),
            );

            records[record_count] = CullRecord::new(
                IndirectCommand {
                    vbuffer_srv: mesh.vbuffer_srv.index(),
                    ibuffer_srv: mesh.ibuffer_srv.index(),
                    transform_cbv: transform_cb.view().index(),
                    texture_srv: material.texture_srv.index(),
                    vertex_count: mesh.index_count,
                    instance_count: 1,
                    start_vertex: 0,
                    start_instance: 0,
                },
                mesh.bounds.transformed(&instance.transform),
            );
            record_count += 1;

            cmd.constant_buffers.push(transform_cb);
        }

        let arguments = if record_count > 0 {
            let mut arguments = self
                .writables
                .acquire_argument_buffer(&self.dx.device, &mut self.bindless_heap);
            arguments.write(&records[..record_count]);
            Some(arguments)
        } else {
            None
        };

        drop(arena);
        drop(lease);

        if let Some(arguments) = arguments {
            // Zero the survivor count, then let the culling dispatch
            // append every record whose bound intersects the frustum.
            unsafe {
                cmd.list.ResourceBarrier(&[transition_barrier(
                    &self.cull.output_count,
                    D3D12_RESOURCE_STATE_UNORDERED_ACCESS,
                    D3D12_RESOURCE_STATE_COPY_DEST,
                )]);
            }

            upload::write_buffer(
                &self.dx.device,
                &mut self.uploads,
                &mut cmd,
                &self.cull.output_count,
                0,
                &0u32.to_le_bytes(),
            );

            unsafe {
                cmd.list.ResourceBarrier(&[transition_barrier(
                    &self.cull.output_count,
                    D3D12_RESOURCE_STATE_COPY_DEST,
                    D3D12_RESOURCE_STATE_UNORDERED_ACCESS,
                )]);

                cmd.list.SetPipelineState(&self.pipelines.culling);
                cmd.list
                    .SetComputeRoot32BitConstant(0, arguments.srv().index(), 0);
                cmd.list
                    .SetComputeRoot32BitConstant(0, record_count as u32, 1);
                cmd.list
                    .SetComputeRoot32BitConstant(0, self.cull.output_args_uav.index(), 2);
                cmd.list
                    .SetComputeRoot32BitConstant(0, self.cull.output_count_uav.index(), 3);
                cmd.list
                    .SetComputeRoot32BitConstant(0, camera_cb.view().index(), 4);

                cmd.list
                    .Dispatch((record_count as u32).div_ceil(CULL_GROUP_SIZE), 1, 1);

                // The indirect draw may not read the outputs until the
                // dispatch's writes are visible.
                cmd.list.ResourceBarrier(&[
                    uav_barrier(&self.cull.output_args),
                    uav_barrier(&self.cull.output_count),
                    transition_barrier(
                        &self.cull.output_args,
                        D3D12_RESOURCE_STATE_UNORDERED_ACCESS,
                        D3D12_RESOURCE_STATE_INDIRECT_ARGUMENT,
                    ),
                    transition_barrier(
                        &self.cull.output_count,
                        D3D12_RESOURCE_STATE_UNORDERED_ACCESS,
                        D3D12_RESOURCE_STATE_INDIRECT_ARGUMENT,
                    ),
                ]);

                cmd.list.SetPipelineState(&self.pipelines.lighting);
                cmd.list
                    .IASetPrimitiveTopology(D3D_PRIMITIVE_TOPOLOGY_TRIANGLELIST);
                cmd.list
                    .SetGraphicsRoot32BitConstant(0, camera_cb.view().index(), 0);

                cmd.list.ExecuteIndirect(
                    &self.pipelines.command_signature,
                    record_count as u32,
                    &self.cull.output_args,
                    0,
                    &self.cull.output_count,
                    0,
                );

                cmd.list.ResourceBarrier(&[
                    transition_barrier(
                        &self.cull.output_args,
                        D3D12_RESOURCE_STATE_INDIRECT_ARGUMENT,
                        D3D12_RESOURCE_STATE_UNORDERED_ACCESS,
                    ),
                    transition_barrier(
                        &self.cull.output_count,
                        D3D12_RESOURCE_STATE_INDIRECT_ARGUMENT,
                        D3D12_RESOURCE_STATE_UNORDERED_ACCESS,
                    ),
                ]);
            }

            cmd.argument_buffers.push(arguments);
        }

        if !frame.line_indices.is_empty() {
            let mut line_mesh = self
                .writables
                .acquire_mesh(&self.dx.device, &mut self.bindless_heap);
            line_mesh.write(frame.line_vertices, frame.line_indices);

            unsafe {
                cmd.list.SetPipelineState(&self.pipelines.line);
                cmd.list
                    .IASetPrimitiveTopology(D3D_PRIMITIVE_TOPOLOGY_LINELIST);
                cmd.list
                    .SetGraphicsRoot32BitConstant(0, camera_cb.view().index(), 0);
                cmd.list
                    .SetGraphicsRoot32BitConstant(0, line_mesh.vbuffer_srv().index(), 1);
                cmd.list
                    .SetGraphicsRoot32BitConstant(0, line_mesh.ibuffer_srv().index(), 2);

                cmd.list
                    .DrawInstanced(frame.line_indices.len() as u32, 1, 0, 0);
            }

            cmd.writable_meshes.push(line_mesh);
        }

        cmd.constant_buffers.push(camera_cb);

        unsafe {
            cmd.list.ResourceBarrier(&[transition_barrier(
                self.swapchain.buffer(index),
                D3D12_RESOURCE_STATE_RENDER_TARGET,
                D3D12_RESOURCE_STATE_PRESENT,
            )]);
        }

        self.lists.submit(cmd, &mut self.direct_queue);
        self.swapchain.present();

        let fence_value = self.direct_queue.signal();
        self.swapchain.set_fence(index, fence_value);
    }
}
