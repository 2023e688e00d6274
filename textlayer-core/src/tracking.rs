use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Handle to one render pass. Clones share cancellation state, so a worker
/// holding a clone can stop early.
#[derive(Debug, Clone)]
pub struct RenderToken {
    generation: u64,
    cancelled: Arc<AtomicBool>,
}

impl RenderToken {
    fn new(generation: u64) -> Self {
        Self {
            generation,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Identity check: same pass, not just an equal generation number.
    pub fn same_as(&self, other: &RenderToken) -> bool {
        self.generation == other.generation && Arc::ptr_eq(&self.cancelled, &other.cancelled)
    }
}

#[derive(Debug, Default)]
pub struct RenderTracker {
    current: Option<RenderToken>,
    next_generation: u64,
}

impl RenderTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self) -> RenderToken {
        if let Some(previous) = self.current.take() {
            previous.cancel();
        }
        self.next_generation += 1;
        let token = RenderToken::new(self.next_generation);
        self.current = Some(token.clone());
        token
    }

    pub fn is_current(&self, token: &RenderToken) -> bool {
        !token.is_cancelled()
            && self
                .current
                .as_ref()
                .is_some_and(|current| current.same_as(token))
    }

    /// Retires `token` if it is still current. Returns whether it was.
    pub fn finish(&mut self, token: &RenderToken) -> bool {
        if self.is_current(token) {
            self.current = None;
            true
        } else {
            false
        }
    }

    pub fn cancel(&mut self) {
        if let Some(current) = self.current.take() {
            current.cancel();
        }
    }

    pub fn in_flight(&self) -> bool {
        self.current.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct RenderTicket {
    pub page_number: usize,
    pub scale: f32,
    pub rotation: i32,
    pub token: RenderToken,
}
