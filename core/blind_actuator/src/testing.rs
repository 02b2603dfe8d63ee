//! Doubles for the hardware seams.

use crate::config::Config;
use crate::motor::{Direction, Motor};
use crate::sensor::{PositionProbe, PositionSensor};
use crate::storage::{PageIo, PagedStore};
use core::convert::Infallible;
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::signal::Signal;
use embedded_hal::digital::{ErrorType, InputPin};
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::digital::Wait;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

pub type TestStore = PagedStore<RamPage, 512>;
pub type TestSensor = PositionSensor<ScriptedProbe, NoDelay, TestStore>;

pub fn test_sensor(probe: ScriptedProbe) -> TestSensor {
    test_sensor_on(probe, &RamPage::erased(512), false)
}

pub fn test_sensor_on(probe: ScriptedProbe, page: &RamPage, zebra_support: bool) -> TestSensor {
    let config = Config {
        zebra_support,
        ..Config::new()
    };
    PositionSensor::new(probe, NoDelay, PagedStore::new(page.clone()), &config)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MotorCommand {
    Direction(Direction),
    Speed(u32),
    Step(u32),
    Stop,
}

#[derive(Default)]
pub struct FakeMotor {
    pub commands: Vec<MotorCommand>,
    pub moving: bool,
}

impl Motor for FakeMotor {
    fn set_direction(&mut self, direction: Direction) {
        self.commands.push(MotorCommand::Direction(direction));
    }

    fn set_speed(&mut self, steps_per_second: u32) {
        self.commands.push(MotorCommand::Speed(steps_per_second));
    }

    fn step(&mut self, count: u32) {
        self.commands.push(MotorCommand::Step(count));
        self.moving = count > 0;
    }

    fn stop(&mut self) {
        self.commands.push(MotorCommand::Stop);
        self.moving = false;
    }

    fn is_moving(&mut self) -> bool {
        self.moving
    }
}

#[derive(Debug)]
pub struct ProbeFault;

/// Plays back queued samples, then repeats `fallback`
pub struct ScriptedProbe {
    pub samples: VecDeque<Result<u16, ProbeFault>>,
    pub fallback: u16,
    pub powered: bool,
    pub power_cycles: usize,
}

impl ScriptedProbe {
    pub fn steady(value: u16) -> Self {
        Self {
            samples: VecDeque::new(),
            fallback: value,
            powered: false,
            power_cycles: 0,
        }
    }

    pub fn push(&mut self, value: u16) {
        self.samples.push_back(Ok(value));
    }

    pub fn fail_next(&mut self) {
        self.samples.push_back(Err(ProbeFault));
    }
}

impl PositionProbe for ScriptedProbe {
    type Error = ProbeFault;

    fn power_on(&mut self) {
        self.powered = true;
    }

    fn power_off(&mut self) {
        self.powered = false;
        self.power_cycles += 1;
    }

    async fn sample(&mut self) -> Result<u16, Self::Error> {
        assert!(self.powered, "sampled an unpowered probe");
        self.samples.pop_front().unwrap_or(Ok(self.fallback))
    }
}

pub struct NoDelay;

impl DelayNs for NoDelay {
    async fn delay_ns(&mut self, _ns: u32) {}
}

#[derive(Debug)]
pub struct RamPageFault;

#[derive(Default)]
struct RamPageState {
    data: Vec<u8>,
    writes: usize,
    fail_writes: bool,
}

/// In-memory page; clones share the same contents
#[derive(Clone)]
pub struct RamPage(Rc<RefCell<RamPageState>>);

impl RamPage {
    pub fn erased(size: usize) -> Self {
        Self(Rc::new(RefCell::new(RamPageState {
            data: vec![0xFF; size],
            ..Default::default()
        })))
    }

    pub fn writes(&self) -> usize {
        self.0.borrow().writes
    }

    pub fn fail_writes(&self, fail: bool) {
        self.0.borrow_mut().fail_writes = fail;
    }

    pub fn overwrite(&self, bytes: &[u8]) {
        self.0.borrow_mut().data[..bytes.len()].copy_from_slice(bytes);
    }
}

impl PageIo for RamPage {
    type Error = RamPageFault;

    fn read_page(&mut self, buf: &mut [u8]) -> Result<(), Self::Error> {
        let state = self.0.borrow();
        let len = buf.len().min(state.data.len());
        buf[..len].copy_from_slice(&state.data[..len]);
        Ok(())
    }

    fn write_page(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        let mut state = self.0.borrow_mut();
        if state.fail_writes {
            return Err(RamPageFault);
        }
        state.data.fill(0xFF);
        state.data[..data.len()].copy_from_slice(data);
        state.writes += 1;
        Ok(())
    }
}

/// Shared level of a fake active-low button; starts released (high)
pub struct ButtonLine {
    high: Cell<bool>,
    edge: Signal<NoopRawMutex, ()>,
}

impl ButtonLine {
    pub fn new() -> Self {
        Self {
            high: Cell::new(true),
            edge: Signal::new(),
        }
    }

    pub fn press(&self) {
        self.high.set(false);
        self.edge.signal(());
    }

    pub fn release(&self) {
        self.high.set(true);
        self.edge.signal(());
    }

    pub fn pin(&self) -> FakeButton<'_> {
        FakeButton { line: self }
    }
}

pub struct FakeButton<'a> {
    line: &'a ButtonLine,
}

impl FakeButton<'_> {
    async fn wait_for_level(&mut self, high: bool) {
        while self.line.high.get() != high {
            self.line.edge.wait().await;
        }
    }
}

impl ErrorType for FakeButton<'_> {
    type Error = Infallible;
}

impl InputPin for FakeButton<'_> {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.line.high.get())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.line.high.get())
    }
}

impl Wait for FakeButton<'_> {
    async fn wait_for_high(&mut self) -> Result<(), Self::Error> {
        self.wait_for_level(true).await;
        Ok(())
    }

    async fn wait_for_low(&mut self) -> Result<(), Self::Error> {
        self.wait_for_level(false).await;
        Ok(())
    }

    async fn wait_for_rising_edge(&mut self) -> Result<(), Self::Error> {
        self.wait_for_level(false).await;
        self.wait_for_level(true).await;
        Ok(())
    }

    async fn wait_for_falling_edge(&mut self) -> Result<(), Self::Error> {
        self.wait_for_level(true).await;
        self.wait_for_level(false).await;
        Ok(())
    }

    async fn wait_for_any_edge(&mut self) -> Result<(), Self::Error> {
        self.line.edge.wait().await;
        Ok(())
    }
}
