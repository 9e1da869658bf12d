//! The five offscreen targets and the history ping-pong between two of them.

use crate::device::{DeviceError, RenderDevice};
use crate::types::{TargetDescriptor, TargetId, TargetSize, Viewport};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResizeOutcome {
    /// Requested size matches the current allocation; contents are kept.
    Unchanged,
    /// All five targets were replaced; accumulated history is gone.
    Reallocated(TargetSize),
    /// The drawable has zero area; nothing was allocated.
    Skipped,
}

#[derive(Clone, Copy, Debug)]
struct Allocation {
    size: TargetSize,
    history: [TargetId; 2],
    read: usize,
    bloom: TargetId,
    blur_horizontal: TargetId,
    blur_vertical: TargetId,
}

impl Allocation {
    fn ids(&self) -> [TargetId; 5] {
        [
            self.history[0],
            self.history[1],
            self.bloom,
            self.blur_horizontal,
            self.blur_vertical,
        ]
    }
}

const LABELS: [&str; 5] = ["history-a", "history-b", "bloom", "blur-horizontal", "blur-vertical"];

#[derive(Debug, Default)]
pub struct RenderTargetPool {
    allocation: Option<Allocation>,
}

impl RenderTargetPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sizes the pool for `viewport` at `render_scale`. A failed allocation
    /// leaves the previous targets in place.
    pub fn resize<D: RenderDevice>(
        &mut self,
        device: &mut D,
        viewport: Viewport,
        render_scale: f32,
    ) -> Result<ResizeOutcome, DeviceError> {
        let Some(size) = viewport.target_size(render_scale) else {
            return Ok(ResizeOutcome::Skipped);
        };
        if self.size() == Some(size) {
            return Ok(ResizeOutcome::Unchanged);
        }

        let mut created = Vec::with_capacity(LABELS.len());
        for label in LABELS {
            match device.create_target(&TargetDescriptor::new(label, size)) {
                Ok(id) => created.push(id),
                Err(error) => {
                    for id in created {
                        device.release_target(id);
                    }
                    return Err(error);
                }
            }
        }

        if let Some(previous) = self.allocation.take() {
            for id in previous.ids() {
                device.release_target(id);
            }
        }
        self.allocation = Some(Allocation {
            size,
            history: [created[0], created[1]],
            read: 0,
            bloom: created[2],
            blur_horizontal: created[3],
            blur_vertical: created[4],
        });
        tracing::debug!(%size, "allocated render targets");
        Ok(ResizeOutcome::Reallocated(size))
    }

    pub fn is_allocated(&self) -> bool {
        self.allocation.is_some()
    }

    pub fn size(&self) -> Option<TargetSize> {
        self.allocation.map(|allocation| allocation.size)
    }

    /// Holds the previous completed frame.
    pub fn history_read(&self) -> Option<TargetId> {
        self.allocation
            .map(|allocation| allocation.history[allocation.read])
    }

    /// Destination of the frame in progress.
    pub fn history_write(&self) -> Option<TargetId> {
        self.allocation
            .map(|allocation| allocation.history[1 - allocation.read])
    }

    pub fn bloom(&self) -> Option<TargetId> {
        self.allocation.map(|allocation| allocation.bloom)
    }

    pub fn blur_horizontal(&self) -> Option<TargetId> {
        self.allocation.map(|allocation| allocation.blur_horizontal)
    }

    pub fn blur_vertical(&self) -> Option<TargetId> {
        self.allocation.map(|allocation| allocation.blur_vertical)
    }

    /// Exchanges the history roles.
    pub fn swap(&mut self) {
        if let Some(allocation) = self.allocation.as_mut() {
            allocation.read = 1 - allocation.read;
        }
    }

    pub fn ids(&self) -> Vec<TargetId> {
        self.allocation
            .map(|allocation| allocation.ids().to_vec())
            .unwrap_or_default()
    }

    pub fn release_all<D: RenderDevice>(&mut self, device: &mut D) {
        if let Some(allocation) = self.allocation.take() {
            for id in allocation.ids() {
                device.release_target(id);
            }
            tracing::debug!(size = %allocation.size, "released render targets");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::software::SoftwareDevice;

    #[test]
    fn allocates_five_distinct_targets() {
        let mut device = SoftwareDevice::new();
        let mut pool = RenderTargetPool::new();
        let outcome = pool
            .resize(&mut device, Viewport::new(20, 10, 1.0), 1.0)
            .unwrap();
        assert_eq!(outcome, ResizeOutcome::Reallocated(TargetSize::new(20, 10)));
        let mut ids = pool.ids();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 5);
        assert_eq!(device.live_resources().targets, 5);
    }

    #[test]
    fn swap_flips_history_roles() {
        let mut device = SoftwareDevice::new();
        let mut pool = RenderTargetPool::new();
        pool.resize(&mut device, Viewport::new(4, 4, 1.0), 1.0).unwrap();
        let read = pool.history_read();
        let write = pool.history_write();
        assert_ne!(read, write);
        pool.swap();
        assert_eq!(pool.history_read(), write);
        assert_eq!(pool.history_write(), read);
        pool.swap();
        assert_eq!(pool.history_read(), read);
    }

    #[test]
    fn same_size_keeps_targets_and_new_size_replaces_them() {
        let mut device = SoftwareDevice::new();
        let mut pool = RenderTargetPool::new();
        pool.resize(&mut device, Viewport::new(8, 8, 1.0), 1.0).unwrap();
        let before = pool.ids();
        let outcome = pool.resize(&mut device, Viewport::new(16, 16, 0.5), 1.0).unwrap();
        assert_eq!(outcome, ResizeOutcome::Unchanged);
        assert_eq!(pool.ids(), before);

        let outcome = pool.resize(&mut device, Viewport::new(8, 8, 2.0), 1.0).unwrap();
        assert_eq!(outcome, ResizeOutcome::Reallocated(TargetSize::new(16, 16)));
        assert!(pool.ids().iter().all(|id| !before.contains(id)));
        assert_eq!(device.live_resources().targets, 5);
    }

    #[test]
    fn zero_area_is_skipped_without_touching_targets() {
        let mut device = SoftwareDevice::new();
        let mut pool = RenderTargetPool::new();
        assert_eq!(
            pool.resize(&mut device, Viewport::new(0, 10, 1.0), 1.0).unwrap(),
            ResizeOutcome::Skipped
        );
        assert!(!pool.is_allocated());
        pool.resize(&mut device, Viewport::new(6, 6, 1.0), 1.0).unwrap();
        assert_eq!(
            pool.resize(&mut device, Viewport::new(6, 0, 1.0), 1.0).unwrap(),
            ResizeOutcome::Skipped
        );
        assert_eq!(pool.size(), Some(TargetSize::new(6, 6)));
    }

    #[test]
    fn release_all_frees_everything() {
        let mut device = SoftwareDevice::new();
        let mut pool = RenderTargetPool::new();
        pool.resize(&mut device, Viewport::new(3, 3, 1.0), 1.0).unwrap();
        pool.release_all(&mut device);
        assert!(!pool.is_allocated());
        assert_eq!(device.live_resources().targets, 0);
        assert_eq!(pool.history_read(), None);
    }
}
