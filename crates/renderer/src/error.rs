use thiserror::Error;

/// Errors surfaced during renderer initialization.
///
/// The frame pipeline itself never returns errors: handle misuse and pool
/// exhaustion are programming errors caught by debug assertions, and a GPU
/// fault cannot be recovered without recreating the device anyway.
#[derive(Debug, Error)]
pub enum RendererError {
    #[error("failed to initialize the graphics device: {0}")]
    DeviceInitFailed(String),

    #[error("failed to create the swapchain: {0}")]
    SwapchainCreationFailed(String),

    #[error("shader bytecode for `{0}` is missing or empty")]
    ShaderLoadFailed(&'static str),

    #[error("the window handle is not a supported native handle")]
    UnsupportedWindowHandle,
}

pub type Result<T, E = RendererError> = std::result::Result<T, E>;
