use windows::{
    core::{ComInterface, PCSTR},
    Win32::Graphics::{
        Direct3D::D3D_FEATURE_LEVEL_12_0,
        Direct3D12::{
            D3D12CreateDevice, D3D12GetDebugInterface, ID3D12Debug, ID3D12Device,
            ID3D12InfoQueue1, D3D12_MESSAGE_CALLBACK_IGNORE_FILTERS, D3D12_MESSAGE_CATEGORY,
            D3D12_MESSAGE_ID, D3D12_MESSAGE_SEVERITY, D3D12_MESSAGE_SEVERITY_CORRUPTION,
            D3D12_MESSAGE_SEVERITY_ERROR, D3D12_MESSAGE_SEVERITY_WARNING,
        },
        Dxgi::{
            CreateDXGIFactory2, DXGIGetDebugInterface1, IDXGIAdapter, IDXGIDebug1, IDXGIFactory6,
            DXGI_CREATE_FACTORY_DEBUG, DXGI_DEBUG_ALL, DXGI_DEBUG_RLO_IGNORE_INTERNAL,
            DXGI_DEBUG_RLO_SUMMARY, DXGI_GPU_PREFERENCE_HIGH_PERFORMANCE,
            DXGI_GPU_PREFERENCE_MINIMUM_POWER,
        },
    },
};

use crate::{Config, PowerPreference};

/// The device-level interfaces everything else is created from.
pub struct Interfaces {
    pub is_debug: bool,
    pub gi: IDXGIFactory6,
    pub device: ID3D12Device,
}

impl Interfaces {
    pub fn new(config: &Config) -> windows::core::Result<Self> {
        let is_debug = config.debug_mode.unwrap_or(cfg!(debug_assertions));

        // IDXGIFactory6 for power preference selection.
        let gi: IDXGIFactory6 = {
            let flags = if is_debug { DXGI_CREATE_FACTORY_DEBUG } else { 0 };
            unsafe { CreateDXGIFactory2(flags) }?
        };

        let power_preference = match config.power_preference {
            PowerPreference::LowPower => DXGI_GPU_PREFERENCE_MINIMUM_POWER,
            PowerPreference::HighPerformance => DXGI_GPU_PREFERENCE_HIGH_PERFORMANCE,
        };

        let adapter: IDXGIAdapter = unsafe { gi.EnumAdapterByGpuPreference(0, power_preference) }
            .or_else(|_| unsafe { gi.EnumWarpAdapter() })?;

        if is_debug {
            // Must happen before device creation to take effect.
            let mut dx_debug: Option<ID3D12Debug> = None;
            unsafe { D3D12GetDebugInterface(&mut dx_debug) }?;
            unsafe { dx_debug.unwrap().EnableDebugLayer() };
        }

        let device = {
            let mut device: Option<ID3D12Device> = None;
            unsafe { D3D12CreateDevice(&adapter, D3D_FEATURE_LEVEL_12_0, &mut device) }?;
            device.unwrap()
        };

        if is_debug {
            if let Ok(queue) = device.cast::<ID3D12InfoQueue1>() {
                let mut cookie = 0;
                unsafe {
                    queue.RegisterMessageCallback(
                        Some(Self::d3d12_debug_callback),
                        D3D12_MESSAGE_CALLBACK_IGNORE_FILTERS,
                        std::ptr::null(),
                        &mut cookie,
                    )
                }?;
            }
        }

        Ok(Self {
            is_debug,
            gi,
            device,
        })
    }

    extern "system" fn d3d12_debug_callback(
        _category: D3D12_MESSAGE_CATEGORY,
        severity: D3D12_MESSAGE_SEVERITY,
        id: D3D12_MESSAGE_ID,
        description: PCSTR,
        _context: *mut std::ffi::c_void,
    ) {
        let message = unsafe { description.display() };

        match severity {
            D3D12_MESSAGE_SEVERITY_CORRUPTION | D3D12_MESSAGE_SEVERITY_ERROR => {
                log::error!("D3D12 {:?}: {}", id, message);
            }
            D3D12_MESSAGE_SEVERITY_WARNING => log::warn!("D3D12 {:?}: {}", id, message),
            _ => log::debug!("D3D12 {:?}: {}", id, message),
        }
    }
}

impl Drop for Interfaces {
    fn drop(&mut self) {
        if self.is_debug {
            if let Ok(dxgi_debug) = unsafe { DXGIGetDebugInterface1::<IDXGIDebug1>(0) } {
                let _ = unsafe {
                    dxgi_debug.ReportLiveObjects(
                        DXGI_DEBUG_ALL,
                        DXGI_DEBUG_RLO_SUMMARY | DXGI_DEBUG_RLO_IGNORE_INTERNAL,
                    )
                };
            }
        }
    }
}
