//! Frame pacing state machine.
//!
//! [`FramePacer`] is the GPU-free core of the frame loop. It owns every
//! decision that does not require a device:
//!
//! - which frame-in-flight slot the next frame uses
//! - whether a frame runs at all (minimized windows skip frames)
//! - when the swapchain must be rebuilt (resize, out-of-date, suboptimal)
//! - which earlier slot must be waited on before a swapchain image is
//!   reused (images can be handed back out of order)
//!
//! The Vulkan backend feeds it classified acquire/present outcomes and
//! performs the waits and rebuilds it asks for. Keeping the policy here
//! means the whole resize/recovery protocol is testable without a GPU.

use ash::vk;

use cinder_rhi::RhiError;

/// What the frame loop should do before recording the next frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameAdmission {
    /// Record and submit using this slot.
    Render { slot: usize },
    /// Window has no visible area; do nothing this frame.
    Skip,
    /// Rebuild the swapchain at this size, then continue into the frame.
    Rebuild { width: u32, height: u32 },
}

/// Classified result of a swapchain image acquire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired { image_index: u32, suboptimal: bool },
    OutOfDate,
}

impl AcquireOutcome {
    /// Classifies a raw acquire result. Out-of-date is recovery, not
    /// failure; everything else propagates as an error.
    pub fn from_vk(result: Result<(u32, bool), vk::Result>) -> Result<Self, RhiError> {
        match result {
            Ok((image_index, suboptimal)) => Ok(Self::Acquired {
                image_index,
                suboptimal,
            }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Self::OutOfDate),
            Err(e) => Err(e.into()),
        }
    }
}

/// Classified result of a queue present.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Suboptimal,
    OutOfDate,
}

impl PresentOutcome {
    pub fn from_vk(result: Result<bool, vk::Result>) -> Result<Self, RhiError> {
        match result {
            Ok(false) => Ok(Self::Presented),
            Ok(true) => Ok(Self::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Self::OutOfDate),
            Err(e) => Err(e.into()),
        }
    }
}

/// Pure frame pacing state. See the module docs for the protocol.
pub struct FramePacer {
    frames_in_flight: usize,
    current_slot: usize,
    frame_counter: u64,
    /// Swapchain image index -> slot that last rendered to it.
    images_in_flight: Vec<Option<usize>>,
    extent: (u32, u32),
    pending_resize: Option<(u32, u32)>,
    minimized: bool,
    needs_rebuild: bool,
    /// Bumped on every swapchain rebuild.
    generation: u64,
}

impl FramePacer {
    pub fn new(frames_in_flight: usize, image_count: usize, extent: (u32, u32)) -> Self {
        Self {
            frames_in_flight,
            current_slot: 0,
            frame_counter: 0,
            images_in_flight: vec![None; image_count],
            extent,
            pending_resize: None,
            minimized: false,
            needs_rebuild: false,
            generation: 0,
        }
    }

    /// Records a window resize. Zero area pauses rendering instead of
    /// scheduling a rebuild; repeated identical sizes coalesce into at
    /// most one rebuild; a later notification overwrites an earlier one.
    pub fn notify_resized(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            self.minimized = true;
            self.pending_resize = None;
            return;
        }

        self.minimized = false;
        if (width, height) != self.extent {
            self.pending_resize = Some((width, height));
        } else {
            // Back to the size the swapchain already has.
            self.pending_resize = None;
        }
    }

    /// Decides what the next frame does. Rebuilds are only ever admitted
    /// here, at the top of a frame, never mid-frame.
    pub fn admit(&self) -> FrameAdmission {
        if self.minimized {
            return FrameAdmission::Skip;
        }

        if let Some((width, height)) = self.pending_resize {
            return FrameAdmission::Rebuild { width, height };
        }
        if self.needs_rebuild {
            let (width, height) = self.extent;
            return FrameAdmission::Rebuild { width, height };
        }

        FrameAdmission::Render {
            slot: self.current_slot,
        }
    }

    /// Applies an acquire outcome. Returns the image index to render to,
    /// or `None` when the frame must be abandoned (out of date; a rebuild
    /// is now scheduled). A suboptimal acquire finishes the frame first
    /// and rebuilds before the next one.
    pub fn on_acquire(&mut self, outcome: AcquireOutcome) -> Option<u32> {
        match outcome {
            AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            } => {
                if suboptimal {
                    self.needs_rebuild = true;
                }
                Some(image_index)
            }
            AcquireOutcome::OutOfDate => {
                self.needs_rebuild = true;
                None
            }
        }
    }

    /// Claims `image_index` for `slot`. Returns the slot whose fence must
    /// complete first when the image is still owned by a different slot.
    pub fn image_acquired(&mut self, image_index: usize, slot: usize) -> Option<usize> {
        let previous = self.images_in_flight[image_index];
        self.images_in_flight[image_index] = Some(slot);
        previous.filter(|&p| p != slot)
    }

    /// Applies a present outcome; suboptimal and out-of-date schedule a
    /// rebuild for the top of the next frame.
    pub fn on_present(&mut self, outcome: PresentOutcome) {
        match outcome {
            PresentOutcome::Presented => {}
            PresentOutcome::Suboptimal | PresentOutcome::OutOfDate => {
                self.needs_rebuild = true;
            }
        }
    }

    /// Called after the swapchain (and everything hanging off it) has been
    /// rebuilt. Old image claims are meaningless for the new images.
    pub fn swapchain_rebuilt(&mut self, image_count: usize, extent: (u32, u32)) {
        self.images_in_flight = vec![None; image_count];
        self.extent = extent;
        self.pending_resize = None;
        self.needs_rebuild = false;
        self.generation += 1;
    }

    /// Advances to the next slot after a submitted frame.
    pub fn advance(&mut self) {
        self.current_slot = (self.current_slot + 1) % self.frames_in_flight;
        self.frame_counter += 1;
    }

    #[inline]
    pub fn current_slot(&self) -> usize {
        self.current_slot
    }

    #[inline]
    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    #[inline]
    pub fn extent(&self) -> (u32, u32) {
        self.extent
    }

    #[inline]
    pub fn is_minimized(&self) -> bool {
        self.minimized
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pacer() -> FramePacer {
        FramePacer::new(2, 3, (800, 600))
    }

    #[test]
    fn renders_by_default() {
        assert_eq!(pacer().admit(), FrameAdmission::Render { slot: 0 });
    }

    #[test]
    fn advance_cycles_slots() {
        let mut p = pacer();
        p.advance();
        assert_eq!(p.current_slot(), 1);
        p.advance();
        assert_eq!(p.current_slot(), 0);
        assert_eq!(p.frame_counter(), 2);
    }

    #[test]
    fn resize_schedules_one_rebuild() {
        let mut p = pacer();
        p.notify_resized(1024, 768);
        assert_eq!(
            p.admit(),
            FrameAdmission::Rebuild {
                width: 1024,
                height: 768
            }
        );

        p.swapchain_rebuilt(3, (1024, 768));
        assert_eq!(p.admit(), FrameAdmission::Render { slot: 0 });
        assert_eq!(p.extent(), (1024, 768));
    }

    #[test]
    fn repeated_identical_resizes_coalesce() {
        let mut p = pacer();
        for _ in 0..5 {
            p.notify_resized(1024, 768);
        }
        assert_eq!(
            p.admit(),
            FrameAdmission::Rebuild {
                width: 1024,
                height: 768
            }
        );
        p.swapchain_rebuilt(3, (1024, 768));

        // The same size again after the rebuild is a no-op.
        p.notify_resized(1024, 768);
        assert_eq!(p.admit(), FrameAdmission::Render { slot: 0 });
    }

    #[test]
    fn later_resize_overwrites_earlier() {
        let mut p = pacer();
        p.notify_resized(1024, 768);
        p.notify_resized(640, 480);
        assert_eq!(
            p.admit(),
            FrameAdmission::Rebuild {
                width: 640,
                height: 480
            }
        );
    }

    #[test]
    fn resize_back_to_current_extent_cancels_rebuild() {
        let mut p = pacer();
        p.notify_resized(1024, 768);
        p.notify_resized(800, 600);
        assert_eq!(p.admit(), FrameAdmission::Render { slot: 0 });
    }

    #[test]
    fn zero_area_skips_without_rebuild() {
        let mut p = pacer();
        p.notify_resized(0, 0);
        assert!(p.is_minimized());
        assert_eq!(p.admit(), FrameAdmission::Skip);

        // Still skipping; no rebuild was scheduled.
        assert_eq!(p.admit(), FrameAdmission::Skip);
        assert_eq!(p.generation(), 0);
    }

    #[test]
    fn zero_area_discards_pending_resize() {
        let mut p = pacer();
        p.notify_resized(1024, 768);
        p.notify_resized(0, 0);
        assert_eq!(p.admit(), FrameAdmission::Skip);

        p.notify_resized(640, 480);
        assert_eq!(
            p.admit(),
            FrameAdmission::Rebuild {
                width: 640,
                height: 480
            }
        );
    }

    #[test]
    fn restore_to_same_size_resumes_without_rebuild() {
        let mut p = pacer();
        p.notify_resized(0, 0);
        p.notify_resized(800, 600);
        assert_eq!(p.admit(), FrameAdmission::Render { slot: 0 });
    }

    #[test]
    fn out_of_date_acquire_abandons_frame_and_schedules_rebuild() {
        let mut p = pacer();
        assert_eq!(p.on_acquire(AcquireOutcome::OutOfDate), None);
        assert_eq!(
            p.admit(),
            FrameAdmission::Rebuild {
                width: 800,
                height: 600
            }
        );
    }

    #[test]
    fn suboptimal_acquire_finishes_frame_then_rebuilds() {
        let mut p = pacer();
        let image = p.on_acquire(AcquireOutcome::Acquired {
            image_index: 1,
            suboptimal: true,
        });
        assert_eq!(image, Some(1));
        // The current frame proceeded; the rebuild lands before the next.
        assert_eq!(
            p.admit(),
            FrameAdmission::Rebuild {
                width: 800,
                height: 600
            }
        );
    }

    #[test]
    fn suboptimal_present_schedules_rebuild() {
        let mut p = pacer();
        p.on_present(PresentOutcome::Suboptimal);
        assert!(matches!(p.admit(), FrameAdmission::Rebuild { .. }));

        let mut p = pacer();
        p.on_present(PresentOutcome::OutOfDate);
        assert!(matches!(p.admit(), FrameAdmission::Rebuild { .. }));

        let mut p = pacer();
        p.on_present(PresentOutcome::Presented);
        assert!(matches!(p.admit(), FrameAdmission::Render { .. }));
    }

    #[test]
    fn image_reuse_requires_wait_on_prior_slot() {
        let mut p = pacer();

        // Slot 0 takes image 2; nobody held it before.
        assert_eq!(p.image_acquired(2, 0), None);
        p.advance();

        // Slot 1 gets the same image back; it must wait on slot 0.
        assert_eq!(p.image_acquired(2, 1), Some(0));
        p.advance();

        // Slot 0 re-acquires an image it already owns; no wait needed.
        assert_eq!(p.image_acquired(2, 0), Some(1));
        assert_eq!(p.image_acquired(2, 0), None);
    }

    #[test]
    fn rebuild_clears_image_claims() {
        let mut p = pacer();
        p.image_acquired(0, 0);
        p.image_acquired(1, 1);

        p.swapchain_rebuilt(4, (800, 600));
        for image in 0..4 {
            assert_eq!(p.image_acquired(image, 0), None);
        }
        assert_eq!(p.generation(), 1);
    }

    #[test]
    fn acquire_classification() {
        assert_eq!(
            AcquireOutcome::from_vk(Ok((3, false))).unwrap(),
            AcquireOutcome::Acquired {
                image_index: 3,
                suboptimal: false
            }
        );
        assert_eq!(
            AcquireOutcome::from_vk(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            AcquireOutcome::OutOfDate
        );
        assert!(AcquireOutcome::from_vk(Err(vk::Result::ERROR_DEVICE_LOST)).is_err());
    }

    #[test]
    fn present_classification() {
        assert_eq!(
            PresentOutcome::from_vk(Ok(false)).unwrap(),
            PresentOutcome::Presented
        );
        assert_eq!(
            PresentOutcome::from_vk(Ok(true)).unwrap(),
            PresentOutcome::Suboptimal
        );
        assert_eq!(
            PresentOutcome::from_vk(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            PresentOutcome::OutOfDate
        );
        assert!(PresentOutcome::from_vk(Err(vk::Result::ERROR_DEVICE_LOST)).is_err());
    }
}
