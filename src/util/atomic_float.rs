use std::sync::atomic::{AtomicU32, Ordering};

/// f32 accumulator that can be shared between threads.
/// Stored as raw bits in an AtomicU32, additions use a compare and swap loop so that
/// no concurrent update is lost.
#[derive(Default)]
#[repr(transparent)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        AtomicF32(AtomicU32::new(value.to_bits()))
    }

    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Release);
    }

    /// Atomically adds to the value, returns the previous value.
    pub fn fetch_add(&self, value: f32) -> f32 {
        let previous = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                Some((f32::from_bits(bits) + value).to_bits())
            })
            .unwrap_or_else(|_| unreachable!("The update closure never fails"));
        f32::from_bits(previous)
    }

    /// Non-atomic access through an exclusive reference.
    pub fn get_mut(&mut self) -> f32 {
        f32::from_bits(*self.0.get_mut())
    }
}

impl Clone for AtomicF32 {
    fn clone(&self) -> Self {
        AtomicF32::new(self.load())
    }
}

impl std::fmt::Debug for AtomicF32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.load().fmt(f)
    }
}

impl From<f32> for AtomicF32 {
    fn from(value: f32) -> Self {
        AtomicF32::new(value)
    }
}
