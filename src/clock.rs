/// Monotonic millisecond tick source.
///
/// The counter may wrap; elapsed time is always computed with wrapping
/// subtraction, so only intervals shorter than `u32::MAX` ms are meaningful.
pub trait Clock {
    fn now_ms(&self) -> u32;

    fn elapsed_ms(&self, since: u32) -> u32 {
        self.now_ms().wrapping_sub(since)
    }
}

impl<F: Fn() -> u32> Clock for F {
    fn now_ms(&self) -> u32 {
        self()
    }
}
