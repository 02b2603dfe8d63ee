/// Step count that keeps the motor running until [`Motor::stop`]
pub const CONTINUOUS: u32 = u32::MAX;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Towards the minimum reading
    Up,
    /// Towards the maximum reading
    Down,
}

/// Open-loop motor primitives
///
/// Implementations must tolerate `set_direction` only being called between moves.
pub trait Motor {
    fn set_direction(&mut self, direction: Direction);
    fn set_speed(&mut self, steps_per_second: u32);
    /// Queue `count` steps in the current direction, [`CONTINUOUS`] runs until stopped
    fn step(&mut self, count: u32);
    fn stop(&mut self);
    fn is_moving(&mut self) -> bool;
}
