use std::cell::Cell;

use windows::Win32::{
    Foundation::{CloseHandle, HANDLE},
    Graphics::Direct3D12::{
        ID3D12CommandQueue, ID3D12Device, ID3D12Fence, D3D12_COMMAND_LIST_TYPE,
        D3D12_COMMAND_QUEUE_DESC, D3D12_FENCE_FLAG_NONE,
    },
    System::Threading::{CreateEventW, WaitForSingleObject},
};

/// A command queue paired with a monotonic fence.
///
/// Fence values start at 0 (already reached) and every [`signal`] bumps
/// the counter by one, so a value returned by `signal` uniquely identifies
/// everything submitted before it.
///
/// [`signal`]: CommandQueue::signal
pub struct CommandQueue {
    pub queue: ID3D12CommandQueue,
    fence: ID3D12Fence,
    event: HANDLE,
    last_signaled: u64,
    // Cached completed value so polling doesn't hit the fence every call.
    completed: Cell<u64>,
}

impl CommandQueue {
    pub fn new(device: &ID3D12Device, kind: D3D12_COMMAND_LIST_TYPE) -> windows::core::Result<Self> {
        let queue: ID3D12CommandQueue = unsafe {
            device.CreateCommandQueue(&D3D12_COMMAND_QUEUE_DESC {
                Type: kind,
                ..Default::default()
            })
        }?;

        let fence: ID3D12Fence = unsafe { device.CreateFence(0, D3D12_FENCE_FLAG_NONE) }?;

        let event = unsafe { CreateEventW(None, false, false, None) }?;
        assert!(!event.is_invalid());

        Ok(Self {
            queue,
            fence,
            event,
            last_signaled: 0,
            completed: Cell::new(0),
        })
    }

    /// Signals the fence with the next value and returns it.
    pub fn signal(&mut self) -> u64 {
        self.last_signaled += 1;
        unsafe { self.queue.Signal(&self.fence, self.last_signaled) }.unwrap();
        self.last_signaled
    }

    /// Whether the GPU has passed fence value `value`.
    #[must_use]
    pub fn reached(&self, value: u64) -> bool {
        if value > self.completed.get() {
            let current = unsafe { self.fence.GetCompletedValue() };
            self.completed.set(self.completed.get().max(current));
        }

        value <= self.completed.get()
    }

    /// Blocks the calling thread until the GPU passes `value`.
    pub fn wait(&self, value: u64) {
        if !self.reached(value) {
            unsafe {
                self.fence.SetEventOnCompletion(value, self.event).unwrap();
                WaitForSingleObject(self.event, u32::MAX);
            }
            self.completed.set(self.completed.get().max(value));
        }
    }

    /// Blocks until everything submitted so far has completed.
    pub fn flush(&mut self) {
        let value = self.signal();
        self.wait(value);
    }
}

impl Drop for CommandQueue {
    fn drop(&mut self) {
        let _ = unsafe { CloseHandle(self.event) };
    }
}
