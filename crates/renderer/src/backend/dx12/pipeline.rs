//! Root signature, pipeline states, and the indirect command signature.
//!
//! There is a single root signature shared by every pipeline: one
//! parameter of 16 root constants, with the shader-visible heap directly
//! indexed. Draws use constants `[0]` camera CBV, `[1]` vertex SRV, `[2]`
//! index SRV, `[3]` transform CBV, `[4]` material SRV; the culling
//! dispatch uses `[0]` input SRV, `[1]` input count, `[2]` output UAV,
//! `[3]` count UAV, `[4]` camera CBV.

use std::mem::ManuallyDrop;

use windows::Win32::Graphics::{
    Direct3D::ID3DBlob,
    Direct3D12::{
        D3D12SerializeRootSignature, ID3D12CommandSignature, ID3D12Device, ID3D12PipelineState,
        ID3D12RootSignature, D3D12_BLEND_DESC, D3D12_BLEND_ONE, D3D12_BLEND_OP_ADD,
        D3D12_BLEND_ZERO, D3D12_COLOR_WRITE_ENABLE_ALL, D3D12_COMMAND_SIGNATURE_DESC,
        D3D12_COMPARISON_FUNC_GREATER, D3D12_COMPUTE_PIPELINE_STATE_DESC, D3D12_CULL_MODE,
        D3D12_CULL_MODE_BACK, D3D12_CULL_MODE_NONE, D3D12_DEPTH_STENCIL_DESC,
        D3D12_DEPTH_WRITE_MASK_ALL, D3D12_FILL_MODE_SOLID, D3D12_GRAPHICS_PIPELINE_STATE_DESC,
        D3D12_INDIRECT_ARGUMENT_DESC, D3D12_INDIRECT_ARGUMENT_DESC_0,
        D3D12_INDIRECT_ARGUMENT_DESC_0_1, D3D12_INDIRECT_ARGUMENT_TYPE_CONSTANT,
        D3D12_INDIRECT_ARGUMENT_TYPE_DRAW, D3D12_LOGIC_OP_NOOP, D3D12_PIPELINE_STATE_FLAG_NONE,
        D3D12_PRIMITIVE_TOPOLOGY_TYPE, D3D12_PRIMITIVE_TOPOLOGY_TYPE_LINE,
        D3D12_PRIMITIVE_TOPOLOGY_TYPE_TRIANGLE, D3D12_RASTERIZER_DESC,
        D3D12_RENDER_TARGET_BLEND_DESC, D3D12_ROOT_CONSTANTS, D3D12_ROOT_PARAMETER,
        D3D12_ROOT_PARAMETER_0, D3D12_ROOT_PARAMETER_TYPE_32BIT_CONSTANTS,
        D3D12_ROOT_SIGNATURE_DESC, D3D12_ROOT_SIGNATURE_FLAG_CBV_SRV_UAV_HEAP_DIRECTLY_INDEXED,
        D3D12_SHADER_BYTECODE, D3D12_SHADER_VISIBILITY_ALL, D3D_ROOT_SIGNATURE_VERSION_1_0,
    },
    Dxgi::Common::{DXGI_FORMAT_UNKNOWN, DXGI_SAMPLE_DESC},
};

use crate::{IndirectCommand, RendererError, Result, ShaderSet};

use super::{DEPTH_FORMAT, RENDER_TARGET_FORMAT};

const NUM_ROOT_CONSTANTS: u32 = 16;

pub struct Pipelines {
    pub root_signature: ID3D12RootSignature,
    pub lighting: ID3D12PipelineState,
    pub line: ID3D12PipelineState,
    pub culling: ID3D12PipelineState,
    pub command_signature: ID3D12CommandSignature,
}

impl Pipelines {
    pub fn new(device: &ID3D12Device, shaders: &ShaderSet) -> Result<Self> {
        check_blob(&shaders.lighting_vs, "lighting.vs_main")?;
        check_blob(&shaders.lighting_ps, "lighting.ps_main")?;
        check_blob(&shaders.line_vs, "line.vs_main")?;
        check_blob(&shaders.line_ps, "line.ps_main")?;
        check_blob(&shaders.culling_cs, "culling.cs_main")?;

        let root_signature = create_root_signature(device).map_err(device_err)?;

        let lighting = create_graphics_pipeline(
            device,
            &root_signature,
            &shaders.lighting_vs,
            &shaders.lighting_ps,
            D3D12_PRIMITIVE_TOPOLOGY_TYPE_TRIANGLE,
            D3D12_CULL_MODE_BACK,
        )
        .map_err(device_err)?;

        let line = create_graphics_pipeline(
            device,
            &root_signature,
            &shaders.line_vs,
            &shaders.line_ps,
            D3D12_PRIMITIVE_TOPOLOGY_TYPE_LINE,
            D3D12_CULL_MODE_NONE,
        )
        .map_err(device_err)?;

        let culling =
            create_compute_pipeline(device, &root_signature, &shaders.culling_cs).map_err(device_err)?;

        let command_signature = create_command_signature(device, &root_signature).map_err(device_err)?;

        Ok(Self {
            root_signature,
            lighting,
            line,
            culling,
            command_signature,
        })
    }
}

fn check_blob(blob: &[u8], entry: &'static str) -> Result<()> {
    if blob.is_empty() {
        return Err(RendererError::ShaderLoadFailed(entry));
    }
    Ok(())
}

fn device_err(error: windows::core::Error) -> RendererError {
    RendererError::DeviceInitFailed(error.to_string())
}

fn shader_bytecode(blob: &[u8]) -> D3D12_SHADER_BYTECODE {
    D3D12_SHADER_BYTECODE {
        pShaderBytecode: blob.as_ptr().cast(),
        BytecodeLength: blob.len(),
    }
}

fn create_root_signature(device: &ID3D12Device) -> windows::core::Result<ID3D12RootSignature> {
    let root_param = D3D12_ROOT_PARAMETER {
        ParameterType: D3D12_ROOT_PARAMETER_TYPE_32BIT_CONSTANTS,
        Anonymous: D3D12_ROOT_PARAMETER_0 {
            Constants: D3D12_ROOT_CONSTANTS {
                ShaderRegister: 0,
                RegisterSpace: 0,
                Num32BitValues: NUM_ROOT_CONSTANTS,
            },
        },
        ShaderVisibility: D3D12_SHADER_VISIBILITY_ALL,
    };

    let desc = D3D12_ROOT_SIGNATURE_DESC {
        NumParameters: 1,
        pParameters: &root_param,
        NumStaticSamplers: 0,
        pStaticSamplers: std::ptr::null(),
        Flags: D3D12_ROOT_SIGNATURE_FLAG_CBV_SRV_UAV_HEAP_DIRECTLY_INDEXED,
    };

    let mut blob: Option<ID3DBlob> = None;
    let mut error_blob: Option<ID3DBlob> = None;
    unsafe {
        D3D12SerializeRootSignature(
            &desc,
            D3D_ROOT_SIGNATURE_VERSION_1_0,
            &mut blob,
            Some(&mut error_blob),
        )
    }?;

    let blob = blob.unwrap();
    let bytes = unsafe {
        std::slice::from_raw_parts(blob.GetBufferPointer() as *const u8, blob.GetBufferSize())
    };

    unsafe { device.CreateRootSignature(0, bytes) }
}

fn create_graphics_pipeline(
    device: &ID3D12Device,
    root_signature: &ID3D12RootSignature,
    vs: &[u8],
    ps: &[u8],
    topology: D3D12_PRIMITIVE_TOPOLOGY_TYPE,
    cull_mode: D3D12_CULL_MODE,
) -> windows::core::Result<ID3D12PipelineState> {
    let mut blend_targets = [D3D12_RENDER_TARGET_BLEND_DESC::default(); 8];
    blend_targets[0] = D3D12_RENDER_TARGET_BLEND_DESC {
        BlendEnable: false.into(),
        LogicOpEnable: false.into(),
        SrcBlend: D3D12_BLEND_ONE,
        DestBlend: D3D12_BLEND_ZERO,
        BlendOp: D3D12_BLEND_OP_ADD,
        SrcBlendAlpha: D3D12_BLEND_ONE,
        DestBlendAlpha: D3D12_BLEND_ZERO,
        BlendOpAlpha: D3D12_BLEND_OP_ADD,
        LogicOp: D3D12_LOGIC_OP_NOOP,
        RenderTargetWriteMask: D3D12_COLOR_WRITE_ENABLE_ALL.0 as u8,
    };

    let mut render_target_formats = [DXGI_FORMAT_UNKNOWN; 8];
    render_target_formats[0] = RENDER_TARGET_FORMAT;

    let desc = D3D12_GRAPHICS_PIPELINE_STATE_DESC {
        pRootSignature: ManuallyDrop::new(Some(unsafe {
            std::mem::transmute_copy(root_signature)
        })),
        VS: shader_bytecode(vs),
        PS: shader_bytecode(ps),
        BlendState: D3D12_BLEND_DESC {
            AlphaToCoverageEnable: false.into(),
            IndependentBlendEnable: false.into(),
            RenderTarget: blend_targets,
        },
        SampleMask: u32::MAX,
        RasterizerState: D3D12_RASTERIZER_DESC {
            FillMode: D3D12_FILL_MODE_SOLID,
            CullMode: cull_mode,
            FrontCounterClockwise: true.into(),
            DepthClipEnable: true.into(),
            ..Default::default()
        },
        DepthStencilState: D3D12_DEPTH_STENCIL_DESC {
            DepthEnable: true.into(),
            DepthWriteMask: D3D12_DEPTH_WRITE_MASK_ALL,
            DepthFunc: D3D12_COMPARISON_FUNC_GREATER,
            StencilEnable: false.into(),
            ..Default::default()
        },
        // No input layout: vertices are pulled from bindless buffers.
        PrimitiveTopologyType: topology,
        NumRenderTargets: 1,
        RTVFormats: render_target_formats,
        DSVFormat: DEPTH_FORMAT,
        SampleDesc: DXGI_SAMPLE_DESC {
            Count: 1,
            Quality: 0,
        },
        NodeMask: 0,
        Flags: D3D12_PIPELINE_STATE_FLAG_NONE,
        ..Default::default()
    };

    unsafe { device.CreateGraphicsPipelineState(&desc) }
}

fn create_compute_pipeline(
    device: &ID3D12Device,
    root_signature: &ID3D12RootSignature,
    cs: &[u8],
) -> windows::core::Result<ID3D12PipelineState> {
    let desc = D3D12_COMPUTE_PIPELINE_STATE_DESC {
        pRootSignature: ManuallyDrop::new(Some(unsafe {
            std::mem::transmute_copy(root_signature)
        })),
        CS: shader_bytecode(cs),
        NodeMask: 0,
        Flags: D3D12_PIPELINE_STATE_FLAG_NONE,
        ..Default::default()
    };

    unsafe { device.CreateComputePipelineState(&desc) }
}

/// Binds an [`IndirectCommand`] record to four root constants (written at
/// destination offset 1, leaving the camera constant at offset 0 intact)
/// followed by a draw.
fn create_command_signature(
    device: &ID3D12Device,
    root_signature: &ID3D12RootSignature,
) -> windows::core::Result<ID3D12CommandSignature> {
    let arguments = [
        D3D12_INDIRECT_ARGUMENT_DESC {
            Type: D3D12_INDIRECT_ARGUMENT_TYPE_CONSTANT,
            Anonymous: D3D12_INDIRECT_ARGUMENT_DESC_0 {
                Constant: D3D12_INDIRECT_ARGUMENT_DESC_0_1 {
                    RootParameterIndex: 0,
                    DestOffsetIn32BitValues: 1,
                    Num32BitValuesToSet: 4,
                },
            },
        },
        D3D12_INDIRECT_ARGUMENT_DESC {
            Type: D3D12_INDIRECT_ARGUMENT_TYPE_DRAW,
            ..Default::default()
        },
    ];

    let desc = D3D12_COMMAND_SIGNATURE_DESC {
        ByteStride: std::mem::size_of::<IndirectCommand>() as u32,
        NumArgumentDescs: arguments.len() as u32,
        pArgumentDescs: arguments.as_ptr(),
        NodeMask: 0,
    };

    let mut signature: Option<ID3D12CommandSignature> = None;
    unsafe { device.CreateCommandSignature(&desc, root_signature, &mut signature) }?;

    Ok(signature.unwrap())
}
