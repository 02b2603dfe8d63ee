use embassy_time::Duration;

/// Stepping rate for every commanded move, in steps per second
pub const MOTOR_SPEED: u32 = 1000;
/// Time the position sensor needs after power-up before a sample is meaningful
pub const SENSOR_SETTLE_MS: u64 = 10;
/// Boundary supervision cadence while the blind is moving
pub const BOUNDARY_POLL_MS: u64 = 100;

/// What to do at boot when no stored calibration could be restored
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootCalibration {
    /// Stay uncalibrated until the user starts calibration
    Disabled,
    /// Enter the button-driven step-wise calibration
    Stepwise,
    /// Run the timed two-point calibration
    TwoPoint,
}

#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ButtonTiming {
    pub debounce: Duration,
    pub long_press: Duration,
    pub double_click: Duration,
    /// Sampling cadence of the simultaneous-press watcher
    pub simultaneous_poll: Duration,
    /// A press of both buttons counts when it ends within this window
    pub simultaneous_window: Duration,
    /// Native events stamped within this window after a simultaneous press are ignored
    pub simultaneous_suppress: Duration,
}

#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TwoPointTiming {
    /// Time given to the user to move the blind to each end
    pub settle: Duration,
    pub samples: u32,
    pub interval: Duration,
}

#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    pub motor_speed: u32,
    pub sensor_settle: Duration,
    pub boundary_poll: Duration,
    pub zebra_support: bool,
    pub boot_calibration: BootCalibration,
    pub buttons: ButtonTiming,
    pub two_point: TwoPointTiming,
}

impl Config {
    pub const fn new() -> Self {
        Self {
            motor_speed: MOTOR_SPEED,
            sensor_settle: Duration::from_millis(SENSOR_SETTLE_MS),
            boundary_poll: Duration::from_millis(BOUNDARY_POLL_MS),
            zebra_support: cfg!(feature = "zebra"),
            boot_calibration: BootCalibration::Disabled,
            buttons: ButtonTiming {
                debounce: Duration::from_millis(50),
                long_press: Duration::from_millis(1000),
                double_click: Duration::from_millis(300),
                simultaneous_poll: Duration::from_millis(10),
                simultaneous_window: Duration::from_millis(100),
                simultaneous_suppress: Duration::from_millis(500),
            },
            two_point: TwoPointTiming {
                settle: Duration::from_secs(5),
                samples: 10,
                interval: Duration::from_millis(100),
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
