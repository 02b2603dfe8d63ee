use crate::board::rp::utils::counted_sqr_wav_pio::CountedSqrWav;
use crate::buttons::{dispatch, watch_button, watch_simultaneous, ButtonId, EventQueue, PressedLevels};
use crate::config::Config;
use crate::controller::{MotionController, Status};
use crate::motor::{Direction, Motor};
use crate::sensor::{PositionProbe, PositionSensor};
use crate::storage::{PageIo, PagedStore};
use embassy_executor::Spawner;
use embassy_rp::adc::{self, Adc};
use embassy_rp::flash::{self, Blocking, Flash, ERASE_SIZE};
use embassy_rp::gpio::{Input, Output};
use embassy_rp::peripherals::{FLASH, PIO0};
use embassy_rp::pio::Instance;
use embassy_rp::watchdog::Watchdog;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::{Delay, Duration, Timer};

#[cfg(feature = "uart_configurable_driver")]
use crate::board::ConfigurableBoard;
#[cfg(feature = "uart_configurable_driver")]
use embedded_io::{Read, Write};

pub mod utils;

pub const FLASH_SIZE: usize = 2 * 1024 * 1024;
/// Calibration page, clear of the firmware image
pub const STORAGE_OFFSET: u32 = 0x100000;
pub const PAGE_SIZE: usize = 512;

static EVENTS: EventQueue<CriticalSectionRawMutex> = EventQueue::new();
static LEVELS: PressedLevels = PressedLevels::new();
pub static STATUS: Status = Status::new();
static CONFIG: Config = Config::new();

pub struct DriverPins<'a> {
    pub enable: Output<'a>,
    pub dir: Output<'a>,
}

/// STEP/DIR stepper driver fed by a PIO counted square wave
pub struct StepperMotor<'a, PIO: Instance, const SM: usize> {
    pins: DriverPins<'a>,
    wave: CountedSqrWav<'a, PIO, SM>,
    /// Swap the DIR level when the motor is mounted the other way around
    invert: bool,
}

impl<'a, PIO: Instance, const SM: usize> StepperMotor<'a, PIO, SM> {
    pub fn new(pins: DriverPins<'a>, wave: CountedSqrWav<'a, PIO, SM>, invert: bool) -> Self {
        Self { pins, wave, invert }
    }
}

impl<PIO: Instance, const SM: usize> Motor for StepperMotor<'_, PIO, SM> {
    fn set_direction(&mut self, direction: Direction) {
        // Direction changes may only occur when the channel is no longer producing phases
        if !self.wave.is_idle() {
            warn!("Direction change while stepping, halting the wave");
            self.wave.halt();
        }

        if (direction == Direction::Down) ^ self.invert {
            self.pins.dir.set_high()
        } else {
            self.pins.dir.set_low()
        }
    }

    fn set_speed(&mut self, steps_per_second: u32) {
        self.wave.set_rate(steps_per_second);
    }

    fn step(&mut self, count: u32) {
        if count == 0 {
            return;
        }

        self.pins.enable.set_low();
        if let Err(dropped) = self.wave.queue(count) {
            warn!("Step queue full, dropped {} steps", dropped);
        }
    }

    fn stop(&mut self) {
        self.wave.halt();
        self.pins.enable.set_high();
    }

    fn is_moving(&mut self) -> bool {
        !self.wave.is_idle()
    }
}

/// Potentiometer on an ADC channel, only powered while it is sampled
pub struct AdcProbe<'a> {
    adc: Adc<'a, adc::Async>,
    channel: adc::Channel<'a>,
    power: Output<'a>,
}

impl<'a> AdcProbe<'a> {
    pub fn new(adc: Adc<'a, adc::Async>, channel: adc::Channel<'a>, power: Output<'a>) -> Self {
        Self {
            adc,
            channel,
            power,
        }
    }
}

impl PositionProbe for AdcProbe<'_> {
    type Error = adc::Error;

    fn power_on(&mut self) {
        self.power.set_high();
    }

    fn power_off(&mut self) {
        self.power.set_low();
    }

    async fn sample(&mut self) -> Result<u16, Self::Error> {
        self.adc.read(&mut self.channel).await
    }
}

/// One erase block of the on-board QSPI flash
pub struct FlashPage<'a> {
    flash: Flash<'a, FLASH, Blocking, FLASH_SIZE>,
    offset: u32,
}

impl<'a> FlashPage<'a> {
    pub fn new(flash: Flash<'a, FLASH, Blocking, FLASH_SIZE>, offset: u32) -> Self {
        Self { flash, offset }
    }
}

impl PageIo for FlashPage<'_> {
    type Error = flash::Error;

    fn read_page(&mut self, buf: &mut [u8]) -> Result<(), Self::Error> {
        self.flash.blocking_read(self.offset, buf)
    }

    fn write_page(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        self.flash
            .blocking_erase(self.offset, self.offset + ERASE_SIZE as u32)?;
        self.flash.blocking_write(self.offset, data)
    }
}

pub type BoardMotor<'a> = StepperMotor<'a, PIO0, 0>;

pub struct Board<'a, D> {
    pub motor: BoardMotor<'a>,
    pub probe: AdcProbe<'a>,
    pub page: FlashPage<'a>,
    pub up: Input<'a>,
    pub down: Input<'a>,
    pub watchdog: Watchdog,
    pub driver_serial: D,
}

#[cfg(feature = "uart_configurable_driver")]
impl<'a, D> ConfigurableBoard for Board<'a, D>
where
    D: Read + Write,
{
    type DriverSerial = D;

    fn driver_serial(&mut self) -> &mut Self::DriverSerial {
        &mut self.driver_serial
    }
}

/// Spawn the input and housekeeping tasks, then run the controller on the calling task
pub async fn run<D>(spawner: Spawner, board: Board<'static, D>) -> ! {
    let Board {
        motor,
        probe,
        page,
        up,
        down,
        watchdog,
        ..
    } = board;

    if let Err(e) = spawner.spawn(feed_watchdog(watchdog)) {
        error!("Failed to spawn the watchdog feeder: {:?}", e);
    }
    if let Err(e) = spawner.spawn(button_task(ButtonId::Up, up)) {
        error!("Failed to spawn the up button: {:?}", e);
    }
    if let Err(e) = spawner.spawn(button_task(ButtonId::Down, down)) {
        error!("Failed to spawn the down button: {:?}", e);
    }
    if let Err(e) = spawner.spawn(simultaneous_press_task()) {
        error!("Failed to spawn the simultaneous press watcher: {:?}", e);
    }

    let storage = PagedStore::<_, PAGE_SIZE>::new(page);
    let sensor = PositionSensor::new(probe, Delay, storage, &CONFIG);
    let mut controller = MotionController::new(motor, sensor, CONFIG, &STATUS);
    controller.start().await;

    dispatch(EVENTS.receiver(), &mut controller).await
}

#[embassy_executor::task(pool_size = 2)]
async fn button_task(button: ButtonId, pin: Input<'static>) {
    watch_button(button, pin, &LEVELS, EVENTS.sender(), &CONFIG.buttons).await
}

#[embassy_executor::task]
async fn simultaneous_press_task() {
    watch_simultaneous(&LEVELS, EVENTS.sender(), &CONFIG.buttons).await
}

#[embassy_executor::task]
async fn feed_watchdog(mut watchdog: Watchdog) {
    watchdog.start(Duration::from_millis(1_050));
    loop {
        watchdog.feed();
        Timer::after_millis(750).await;
        trace!("{}", STATUS.snapshot());
    }
}
