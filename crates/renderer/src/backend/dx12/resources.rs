//! Committed-resource creation helpers and barrier constructors.

use std::mem::ManuallyDrop;

use windows::Win32::Graphics::{
    Direct3D12::{
        ID3D12Device, ID3D12Resource, D3D12_BUFFER_SRV, D3D12_BUFFER_SRV_FLAG_NONE,
        D3D12_CLEAR_VALUE, D3D12_DEFAULT_SHADER_4_COMPONENT_MAPPING, D3D12_HEAP_FLAG_NONE,
        D3D12_HEAP_PROPERTIES, D3D12_HEAP_TYPE, D3D12_HEAP_TYPE_DEFAULT, D3D12_RESOURCE_BARRIER,
        D3D12_RESOURCE_BARRIER_0,
        D3D12_RESOURCE_BARRIER_ALL_SUBRESOURCES, D3D12_RESOURCE_BARRIER_FLAG_NONE,
        D3D12_RESOURCE_BARRIER_TYPE_TRANSITION, D3D12_RESOURCE_BARRIER_TYPE_UAV,
        D3D12_RESOURCE_DESC, D3D12_RESOURCE_DIMENSION_BUFFER, D3D12_RESOURCE_DIMENSION_TEXTURE2D,
        D3D12_RESOURCE_FLAGS, D3D12_RESOURCE_STATES, D3D12_RESOURCE_TRANSITION_BARRIER,
        D3D12_RESOURCE_UAV_BARRIER, D3D12_SHADER_RESOURCE_VIEW_DESC,
        D3D12_SHADER_RESOURCE_VIEW_DESC_0, D3D12_SRV_DIMENSION_BUFFER,
        D3D12_TEXTURE_LAYOUT_ROW_MAJOR, D3D12_TEXTURE_LAYOUT_UNKNOWN,
    },
    Dxgi::Common::{DXGI_FORMAT, DXGI_FORMAT_UNKNOWN, DXGI_SAMPLE_DESC},
};

use super::descriptors::{Descriptor, DescriptorHeap};

pub fn create_buffer(
    device: &ID3D12Device,
    heap_type: D3D12_HEAP_TYPE,
    size: u64,
    state: D3D12_RESOURCE_STATES,
    flags: D3D12_RESOURCE_FLAGS,
) -> windows::core::Result<ID3D12Resource> {
    let mut buffer: Option<ID3D12Resource> = None;

    unsafe {
        device.CreateCommittedResource(
            &D3D12_HEAP_PROPERTIES {
                Type: heap_type,
                ..Default::default()
            },
            D3D12_HEAP_FLAG_NONE,
            &D3D12_RESOURCE_DESC {
                Dimension: D3D12_RESOURCE_DIMENSION_BUFFER,
                Alignment: 0,
                Width: size,
                Height: 1,
                DepthOrArraySize: 1,
                MipLevels: 1,
                Format: DXGI_FORMAT_UNKNOWN,
                SampleDesc: DXGI_SAMPLE_DESC {
                    Count: 1,
                    Quality: 0,
                },
                Layout: D3D12_TEXTURE_LAYOUT_ROW_MAJOR,
                Flags: flags,
            },
            state,
            None,
            &mut buffer,
        )
    }?;

    Ok(buffer.unwrap())
}

pub fn create_texture2d(
    device: &ID3D12Device,
    width: u32,
    height: u32,
    format: DXGI_FORMAT,
    state: D3D12_RESOURCE_STATES,
    flags: D3D12_RESOURCE_FLAGS,
    clear_value: Option<*const D3D12_CLEAR_VALUE>,
) -> windows::core::Result<ID3D12Resource> {
    let mut texture: Option<ID3D12Resource> = None;

    unsafe {
        device.CreateCommittedResource(
            &D3D12_HEAP_PROPERTIES {
                Type: D3D12_HEAP_TYPE_DEFAULT,
                ..Default::default()
            },
            D3D12_HEAP_FLAG_NONE,
            &D3D12_RESOURCE_DESC {
                Dimension: D3D12_RESOURCE_DIMENSION_TEXTURE2D,
                Alignment: 0,
                Width: u64::from(width),
                Height: height,
                DepthOrArraySize: 1,
                MipLevels: 1,
                Format: format,
                SampleDesc: DXGI_SAMPLE_DESC {
                    Count: 1,
                    Quality: 0,
                },
                Layout: D3D12_TEXTURE_LAYOUT_UNKNOWN,
                Flags: flags,
            },
            state,
            clear_value,
            &mut texture,
        )
    }?;

    Ok(texture.unwrap())
}

/// Maps the whole resource and leaves it mapped; upload-heap resources
/// stay persistently mapped for their entire lifetime.
pub fn map_entire(resource: &ID3D12Resource) -> *mut u8 {
    let mut ptr = std::ptr::null_mut();
    unsafe { resource.Map(0, None, Some(&mut ptr)) }.unwrap();
    ptr.cast()
}

/// Allocates a bindless slot and creates a structured-buffer SRV in it.
pub fn create_structured_srv(
    device: &ID3D12Device,
    bindless: &mut DescriptorHeap,
    resource: &ID3D12Resource,
    num_elements: u32,
    stride: u32,
) -> Descriptor {
    let descriptor = bindless.alloc();

    let desc = D3D12_SHADER_RESOURCE_VIEW_DESC {
        Format: DXGI_FORMAT_UNKNOWN,
        ViewDimension: D3D12_SRV_DIMENSION_BUFFER,
        Shader4ComponentMapping: D3D12_DEFAULT_SHADER_4_COMPONENT_MAPPING,
        Anonymous: D3D12_SHADER_RESOURCE_VIEW_DESC_0 {
            Buffer: D3D12_BUFFER_SRV {
                FirstElement: 0,
                NumElements: num_elements,
                StructureByteStride: stride,
                Flags: D3D12_BUFFER_SRV_FLAG_NONE,
            },
        },
    };

    unsafe {
        device.CreateShaderResourceView(resource, Some(&desc), bindless.cpu_handle(descriptor))
    };

    descriptor
}

pub fn transition_barrier(
    resource: &ID3D12Resource,
    state_before: D3D12_RESOURCE_STATES,
    state_after: D3D12_RESOURCE_STATES,
) -> D3D12_RESOURCE_BARRIER {
    D3D12_RESOURCE_BARRIER {
        Type: D3D12_RESOURCE_BARRIER_TYPE_TRANSITION,
        Flags: D3D12_RESOURCE_BARRIER_FLAG_NONE,
        Anonymous: D3D12_RESOURCE_BARRIER_0 {
            Transition: ManuallyDrop::new(D3D12_RESOURCE_TRANSITION_BARRIER {
                // Aliased without AddRef; ManuallyDrop keeps it that way.
                pResource: ManuallyDrop::new(Some(unsafe { std::mem::transmute_copy(resource) })),
                StateBefore: state_before,
                StateAfter: state_after,
                Subresource: D3D12_RESOURCE_BARRIER_ALL_SUBRESOURCES,
            }),
        },
    }
}

pub fn uav_barrier(resource: &ID3D12Resource) -> D3D12_RESOURCE_BARRIER {
    D3D12_RESOURCE_BARRIER {
        Type: D3D12_RESOURCE_BARRIER_TYPE_UAV,
        Flags: D3D12_RESOURCE_BARRIER_FLAG_NONE,
        Anonymous: D3D12_RESOURCE_BARRIER_0 {
            UAV: ManuallyDrop::new(D3D12_RESOURCE_UAV_BARRIER {
                pResource: ManuallyDrop::new(Some(unsafe { std::mem::transmute_copy(resource) })),
            }),
        },
    }
}
