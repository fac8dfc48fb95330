use crossbeam::utils::CachePadded;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cheaply clonable liveness flag, padded to its own cache line.
#[derive(Clone)]
#[repr(transparent)]
pub struct HealthFlag(Arc<CachePadded<AtomicBool>>);

impl HealthFlag {
    #[inline]
    pub fn new(initial: bool) -> Self {
        Self(Arc::new(CachePadded::new(AtomicBool::new(initial))))
    }

    #[inline(always)]
    pub fn get(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    #[inline(always)]
    pub fn up(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[inline(always)]
    pub fn down(&self) {
        self.0.store(false, Ordering::Release);
    }

    /// Lowers the flag and reports whether it was up. Only one caller wins.
    #[inline]
    pub fn take_down(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

impl fmt::Debug for HealthFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealthFlag")
            .field("value", &self.get())
            .finish()
    }
}
