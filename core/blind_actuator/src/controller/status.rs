use crate::controller::ControllerState;
use crate::sensor::CalibrationBounds;
use core::sync::atomic::Ordering;
use portable_atomic::{AtomicU16, AtomicU64, AtomicU8};

/// What the controller last published, readable from any task without locking
pub struct Status {
    state: AtomicU8,
    bounds: AtomicU64,
    position: AtomicU16,
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatusSnapshot {
    pub state: ControllerState,
    pub bounds: CalibrationBounds,
    pub position: u16,
}

impl StatusSnapshot {
    pub fn percentage(&self) -> f32 {
        self.bounds.percentage_of(self.position)
    }
}

impl Status {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(ControllerState::Idle as u8),
            bounds: AtomicU64::new(CalibrationBounds::UNCALIBRATED.pack()),
            position: AtomicU16::new(0),
        }
    }

    pub(crate) fn publish_state(&self, state: ControllerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn publish_bounds(&self, bounds: &CalibrationBounds) {
        self.bounds.store(bounds.pack(), Ordering::Release);
    }

    pub(crate) fn publish_position(&self, position: u16) {
        self.position.store(position, Ordering::Release);
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            state: ControllerState::from(self.state.load(Ordering::Acquire)),
            bounds: CalibrationBounds::unpack(self.bounds.load(Ordering::Acquire)),
            position: self.position.load(Ordering::Acquire),
        }
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::new()
    }
}
