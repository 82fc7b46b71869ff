//! External timing source contract.

/// A clock that paces emulation, typically driven by audio playback.
///
/// Counts are in the source's own units (milliseconds for a wall clock,
/// samples for a sound device); the harness only compares them with each
/// other.
pub trait TimerSource: Send {
    /// Monotonic tick count.
    fn count(&self) -> u64;

    /// Count units represented by one emulated frame.
    fn updates(&self) -> u64;

    /// Allowed jitter before the harness treats emulation as running ahead.
    fn deviation(&self) -> u64;

    /// Count units per second.
    fn rate(&self) -> u64;

    /// Hard re-anchor after emulation fell too far behind.
    fn resync(&mut self);
}
