//! Scripted frame-loop tests.
//!
//! Drives [`FramePacer`] through the same control flow the Vulkan backend
//! uses, with fences, submissions and swapchain rebuilds replaced by
//! bookkeeping. Acquire and present outcomes are scripted per frame, so
//! the whole resize and out-of-date recovery protocol can be exercised
//! without a GPU.

use cinder_renderer::{
    AcquireOutcome, FrameAdmission, FramePacer, PresentOutcome, MAX_FRAMES_IN_FLIGHT,
};

struct SimLoop {
    pacer: FramePacer,
    image_count: usize,
    next_image: u32,
    /// Per-slot: fence signaled, safe to reuse the slot's resources.
    slot_signaled: Vec<bool>,
    /// Per-image: slot that last rendered to it, if any.
    image_busy: Vec<Option<usize>>,
    outstanding: usize,
    max_outstanding: usize,
    rebuilds: usize,
    frames_rendered: usize,
}

impl SimLoop {
    fn new(image_count: usize, width: u32, height: u32) -> Self {
        Self {
            pacer: FramePacer::new(MAX_FRAMES_IN_FLIGHT, image_count, (width, height)),
            image_count,
            next_image: 0,
            slot_signaled: vec![true; MAX_FRAMES_IN_FLIGHT],
            image_busy: vec![None; image_count],
            outstanding: 0,
            max_outstanding: 0,
            rebuilds: 0,
            frames_rendered: 0,
        }
    }

    fn wait_fence(&mut self, slot: usize) {
        if !self.slot_signaled[slot] {
            self.slot_signaled[slot] = true;
            self.outstanding -= 1;
        }
    }

    fn rebuild(&mut self, width: u32, height: u32) {
        // The backend idles the device first, which completes every fence.
        for slot in 0..MAX_FRAMES_IN_FLIGHT {
            self.wait_fence(slot);
        }
        self.image_busy = vec![None; self.image_count];
        self.rebuilds += 1;
        self.pacer
            .swapchain_rebuilt(self.image_count, (width, height));
    }

    /// Runs one frame with scripted acquire/present outcomes. Returns
    /// whether the frame actually rendered.
    fn frame_with(&mut self, acquire: AcquireOutcome, present: PresentOutcome) -> bool {
        match self.pacer.admit() {
            FrameAdmission::Skip => return false,
            FrameAdmission::Rebuild { width, height } => self.rebuild(width, height),
            FrameAdmission::Render { .. } => {}
        }

        let slot = self.pacer.current_slot();
        self.wait_fence(slot);

        let image_index = match self.pacer.on_acquire(acquire) {
            Some(index) => index,
            None => return false,
        };

        if let Some(prior_slot) = self.pacer.image_acquired(image_index as usize, slot) {
            self.wait_fence(prior_slot);
        }

        // The pacer must have directed every wait needed to make both the
        // slot and the image safe to reuse.
        assert!(
            self.slot_signaled[slot],
            "slot {} reused before its fence completed",
            slot
        );
        if let Some(owner) = self.image_busy[image_index as usize] {
            assert!(
                owner == slot || self.slot_signaled[owner],
                "image {} reused while slot {} still owns it",
                image_index,
                owner
            );
        }

        // Submit.
        self.slot_signaled[slot] = false;
        self.image_busy[image_index as usize] = Some(slot);
        self.outstanding += 1;
        self.max_outstanding = self.max_outstanding.max(self.outstanding);
        assert!(
            self.outstanding <= MAX_FRAMES_IN_FLIGHT,
            "more than {} frames in flight",
            MAX_FRAMES_IN_FLIGHT
        );

        self.pacer.on_present(present);
        self.pacer.advance();
        self.frames_rendered += 1;
        true
    }

    /// Runs one well-behaved frame, acquiring images round-robin.
    fn frame(&mut self) -> bool {
        let image_index = self.next_image;
        self.next_image = (self.next_image + 1) % self.image_count as u32;
        self.frame_with(
            AcquireOutcome::Acquired {
                image_index,
                suboptimal: false,
            },
            PresentOutcome::Presented,
        )
    }

    fn run(&mut self, frames: usize) {
        for _ in 0..frames {
            self.frame();
        }
    }
}

#[test]
fn steady_state_respects_frames_in_flight_bound() {
    let mut sim = SimLoop::new(3, 800, 600);
    sim.run(100);

    assert_eq!(sim.frames_rendered, 100);
    assert_eq!(sim.rebuilds, 0);
    assert!(sim.max_outstanding <= MAX_FRAMES_IN_FLIGHT);
}

#[test]
fn image_reuse_is_safe_with_few_images() {
    // As many images as frame slots forces constant image reuse; the
    // harness asserts every reuse was preceded by the right fence wait.
    let mut sim = SimLoop::new(MAX_FRAMES_IN_FLIGHT, 800, 600);
    sim.run(50);
    assert_eq!(sim.frames_rendered, 50);
}

#[test]
fn out_of_order_image_delivery_is_safe() {
    // The driver is free to hand images back in any order.
    let mut sim = SimLoop::new(3, 800, 600);
    for image_index in [0u32, 2, 0, 1, 1, 2, 0, 2, 1, 0] {
        sim.frame_with(
            AcquireOutcome::Acquired {
                image_index,
                suboptimal: false,
            },
            PresentOutcome::Presented,
        );
    }
    assert_eq!(sim.frames_rendered, 10);
}

#[test]
fn resize_storm_triggers_single_rebuild() {
    let mut sim = SimLoop::new(3, 800, 600);
    sim.run(5);

    // A drag-resize delivers a burst of identical notifications.
    for _ in 0..8 {
        sim.pacer.notify_resized(1024, 768);
    }
    sim.run(5);

    assert_eq!(sim.rebuilds, 1);
    assert_eq!(sim.pacer.extent(), (1024, 768));
    assert_eq!(sim.frames_rendered, 10);
}

#[test]
fn latest_resize_wins() {
    let mut sim = SimLoop::new(3, 800, 600);
    sim.pacer.notify_resized(900, 700);
    sim.pacer.notify_resized(1024, 768);
    sim.run(3);

    assert_eq!(sim.rebuilds, 1);
    assert_eq!(sim.pacer.extent(), (1024, 768));
}

#[test]
fn out_of_date_acquire_skips_then_recovers() {
    let mut sim = SimLoop::new(3, 800, 600);
    sim.run(3);

    // Acquire reports out of date: frame abandoned, no mid-frame rebuild.
    let rendered = sim.frame_with(AcquireOutcome::OutOfDate, PresentOutcome::Presented);
    assert!(!rendered);
    assert_eq!(sim.rebuilds, 0);

    // The rebuild happens at the top of the next frame, which renders.
    assert!(sim.frame());
    assert_eq!(sim.rebuilds, 1);
}

#[test]
fn suboptimal_acquire_completes_frame_then_rebuilds() {
    let mut sim = SimLoop::new(3, 800, 600);

    let rendered = sim.frame_with(
        AcquireOutcome::Acquired {
            image_index: 0,
            suboptimal: true,
        },
        PresentOutcome::Presented,
    );
    assert!(rendered, "suboptimal still presents the acquired image");
    assert_eq!(sim.rebuilds, 0);

    assert!(sim.frame());
    assert_eq!(sim.rebuilds, 1);
}

#[test]
fn suboptimal_present_rebuilds_before_next_frame() {
    let mut sim = SimLoop::new(3, 800, 600);

    sim.frame_with(
        AcquireOutcome::Acquired {
            image_index: 0,
            suboptimal: false,
        },
        PresentOutcome::Suboptimal,
    );
    assert_eq!(sim.rebuilds, 0);

    assert!(sim.frame());
    assert_eq!(sim.rebuilds, 1);
}

#[test]
fn minimized_window_skips_without_rebuilding() {
    let mut sim = SimLoop::new(3, 800, 600);
    sim.run(3);

    sim.pacer.notify_resized(0, 0);
    for _ in 0..10 {
        assert!(!sim.frame());
    }

    assert_eq!(sim.rebuilds, 0);
    assert_eq!(sim.frames_rendered, 3);
}

#[test]
fn window_lifecycle_round_trip() {
    // Create at 800x600, resize to 1024x768, minimize, restore at 640x480.
    let mut sim = SimLoop::new(3, 800, 600);
    sim.run(10);
    assert_eq!(sim.rebuilds, 0);

    sim.pacer.notify_resized(1024, 768);
    sim.run(10);
    assert_eq!(sim.rebuilds, 1);
    assert_eq!(sim.pacer.extent(), (1024, 768));

    sim.pacer.notify_resized(0, 0);
    sim.run(10);
    assert_eq!(sim.rebuilds, 1, "minimized frames must not rebuild");
    assert_eq!(sim.frames_rendered, 20);

    sim.pacer.notify_resized(640, 480);
    sim.run(10);
    assert_eq!(sim.rebuilds, 2);
    assert_eq!(sim.pacer.extent(), (640, 480));
    assert_eq!(sim.frames_rendered, 30);
    assert!(sim.max_outstanding <= MAX_FRAMES_IN_FLIGHT);
}

#[test]
fn resize_while_minimized_applies_on_restore() {
    let mut sim = SimLoop::new(3, 800, 600);

    sim.pacer.notify_resized(0, 0);
    assert!(!sim.frame());
    // A nonzero size means the window is visible again.
    sim.pacer.notify_resized(1024, 768);
    assert!(sim.frame());

    assert_eq!(sim.rebuilds, 1);
    assert_eq!(sim.pacer.extent(), (1024, 768));
}
