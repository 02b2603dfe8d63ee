//! The blind's state machine: button events in, motor commands out.

pub mod status;

pub use status::{Status, StatusSnapshot};

use crate::buttons::{ButtonEvent, ButtonEventHandler, ButtonId, EventKind};
use crate::config::{BootCalibration, Config};
use crate::motor::{Direction, Motor, CONTINUOUS};
use crate::sensor::{CalibrationStep, PositionProbe, PositionSensor};
use crate::storage::Storage;
use embassy_time::{Duration, Instant};
use embedded_hal_async::delay::DelayNs;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ControllerState {
    Idle = 0,
    MovingUp = 1,
    MovingDown = 2,
    Calibrating = 3,
}

impl ControllerState {
    pub fn is_moving(self) -> bool {
        matches!(self, ControllerState::MovingUp | ControllerState::MovingDown)
    }
}

impl From<Direction> for ControllerState {
    fn from(value: Direction) -> Self {
        match value {
            Direction::Up => ControllerState::MovingUp,
            Direction::Down => ControllerState::MovingDown,
        }
    }
}

impl From<u8> for ControllerState {
    fn from(value: u8) -> Self {
        match value {
            1 => ControllerState::MovingUp,
            2 => ControllerState::MovingDown,
            3 => ControllerState::Calibrating,
            _ => ControllerState::Idle,
        }
    }
}

/// Why a move was refused
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MoveError {
    Calibrating,
    NotCalibrated,
}

/// Boundary supervision for a button-held continuous move
#[derive(Clone, Copy, Debug)]
struct BoundaryWatch {
    button: ButtonId,
    polls: u32,
}

pub struct MotionController<'s, M, P, D, S> {
    motor: M,
    sensor: PositionSensor<P, D, S>,
    config: Config,
    status: &'s Status,
    state: ControllerState,
    held: Option<ButtonId>,
    watch: Option<BoundaryWatch>,
    suppress_until: Option<Instant>,
    zebra_up_next: bool,
}

impl<'s, M, P, D, S> MotionController<'s, M, P, D, S>
where
    M: Motor,
    P: PositionProbe,
    D: DelayNs,
    S: Storage,
{
    pub fn new(motor: M, sensor: PositionSensor<P, D, S>, config: Config, status: &'s Status) -> Self {
        status.publish_state(ControllerState::Idle);
        status.publish_bounds(&sensor.bounds());

        Self {
            motor,
            sensor,
            config,
            status,
            state: ControllerState::Idle,
            held: None,
            watch: None,
            suppress_until: None,
            zebra_up_next: false,
        }
    }

    /// Restore the stored calibration and apply the boot policy if there is none
    pub async fn start(&mut self) {
        self.sensor.restore();

        if !self.sensor.is_calibrated() {
            match self.config.boot_calibration {
                BootCalibration::Disabled => info!("Not calibrated, waiting for the user"),
                BootCalibration::Stepwise => self.calibrate(),
                BootCalibration::TwoPoint => {
                    let _ = self.sensor.calibrate_two_point(&self.config.two_point).await;
                }
            }
        }

        self.publish_bounds();
        let position = self.sensor.read().await;
        self.status.publish_position(position);
        info!(
            "Controller started at {} (calibrated: {})",
            position,
            self.sensor.is_calibrated()
        );
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn is_moving(&mut self) -> bool {
        self.motor.is_moving()
    }

    pub fn sensor(&self) -> &PositionSensor<P, D, S> {
        &self.sensor
    }

    pub fn sensor_mut(&mut self) -> &mut PositionSensor<P, D, S> {
        &mut self.sensor
    }

    pub fn motor_mut(&mut self) -> &mut M {
        &mut self.motor
    }

    fn set_state(&mut self, state: ControllerState) {
        if self.state != state {
            debug!("State {:?} -> {:?}", self.state, state);
        }
        self.state = state;
        self.status.publish_state(state);
    }

    fn publish_bounds(&self) {
        self.status.publish_bounds(&self.sensor.bounds());
    }

    /// Drive to a raw position; the ADC distance is used as the step count
    pub async fn move_to_position(&mut self, target: u16) -> Result<(), MoveError> {
        if self.state == ControllerState::Calibrating {
            warn!("Refusing to move to {} while calibrating", target);
            return Err(MoveError::Calibrating);
        }

        let current = self.sensor.read().await;
        self.status.publish_position(current);
        if current == target {
            debug!("Already at {}", target);
            return Ok(());
        }

        let direction = if target > current {
            Direction::Down
        } else {
            Direction::Up
        };
        let distance = target.abs_diff(current) as u32;
        info!("Moving {:?} from {} to {}", direction, current, target);

        self.release_motor();
        self.drive(direction, distance);
        self.check_boundaries_and_stop().await;

        Ok(())
    }

    pub async fn move_to_percentage(&mut self, percentage: f32) -> Result<(), MoveError> {
        self.require_calibration()?;
        let target = self.sensor.bounds().position_at(percentage);
        self.move_to_position(target).await
    }

    pub async fn goto_top(&mut self) -> Result<(), MoveError> {
        self.require_calibration()?;
        self.move_to_position(self.sensor.min_position()).await
    }

    pub async fn goto_bottom(&mut self) -> Result<(), MoveError> {
        self.require_calibration()?;
        self.move_to_position(self.sensor.max_position()).await
    }

    /// Run until stopped or until the boundary watch finds a bound
    pub fn move_continuous(&mut self, direction: Direction) -> Result<(), MoveError> {
        if self.state == ControllerState::Calibrating {
            warn!("Refusing to move {:?} while calibrating", direction);
            return Err(MoveError::Calibrating);
        }

        info!("Moving {:?} continuously", direction);
        self.release_motor();
        self.drive(direction, CONTINUOUS);

        Ok(())
    }

    pub fn move_up(&mut self) -> Result<(), MoveError> {
        self.move_continuous(Direction::Up)
    }

    pub fn move_down(&mut self) -> Result<(), MoveError> {
        self.move_continuous(Direction::Down)
    }

    pub fn stop(&mut self) {
        if self.motor.is_moving() {
            self.motor.stop();
            info!("Motor stopped");
        }
        self.held = None;
        self.watch = None;
        self.set_state(ControllerState::Idle);
    }

    /// Stop the motor and begin the step-wise calibration
    pub fn calibrate(&mut self) {
        self.stop();
        let step = self.sensor.start_calibration();
        self.set_state(ControllerState::Calibrating);
        info!("{}", step.prompt());
    }

    pub fn abort_calibration(&mut self) {
        self.sensor.abort_calibration();
        self.stop();
        info!("Left calibration");
    }

    fn require_calibration(&self) -> Result<(), MoveError> {
        if self.state == ControllerState::Calibrating {
            warn!("Refusing to move while calibrating");
            return Err(MoveError::Calibrating);
        }
        if !self.sensor.is_calibrated() {
            warn!("Refusing to move before calibration");
            return Err(MoveError::NotCalibrated);
        }
        Ok(())
    }

    fn release_motor(&mut self) {
        if self.motor.is_moving() {
            self.motor.stop();
        }
        self.watch = None;
    }

    fn drive(&mut self, direction: Direction, steps: u32) {
        self.motor.set_direction(direction);
        self.motor.set_speed(self.config.motor_speed);
        self.motor.step(steps);
        self.set_state(direction.into());
    }

    /// Stop if the reading has reached the bound in the direction of travel
    async fn check_boundaries_and_stop(&mut self) -> bool {
        if !self.sensor.is_calibrated() {
            return false;
        }

        let position = self.sensor.read().await;
        self.status.publish_position(position);
        let reached = match self.state {
            ControllerState::MovingUp => position <= self.sensor.min_position(),
            ControllerState::MovingDown => position >= self.sensor.max_position(),
            _ => false,
        };

        if reached {
            info!("Boundary reached at {}", position);
            self.stop();
        }

        reached
    }

    async fn zebra_move(&mut self) -> Result<(), MoveError> {
        let offset = self.sensor.zebra_offset();
        let current = self.sensor.read().await;
        let bounds = self.sensor.bounds();

        let up = if current <= bounds.min().saturating_add(offset) {
            false
        } else if current >= bounds.max().saturating_sub(offset) {
            true
        } else {
            let up = self.zebra_up_next;
            self.zebra_up_next = !up;
            up
        };

        let target = if up {
            current.saturating_sub(offset)
        } else {
            current.saturating_add(offset)
        };
        self.move_to_position(bounds.clamp(target)).await
    }

    async fn double_click(&mut self) {
        if self.config.zebra_support && self.sensor.is_calibrated() && self.sensor.zebra_offset() > 0
        {
            let _ = self.zebra_move().await;
        } else {
            let _ = self.move_to_percentage(50.0).await;
        }
    }

    async fn record_calibration_step(&mut self) {
        if self.motor.is_moving() {
            self.motor.stop();
        }
        self.held = None;

        let position = self.sensor.read().await;
        self.sensor.record_step_value(position);
        let step = self.sensor.advance_step();
        self.publish_bounds();

        if step == CalibrationStep::Complete {
            self.sensor.record_step_value(position);
            info!("{}", step.prompt());
            self.set_state(ControllerState::Idle);
        } else {
            info!("{}", step.prompt());
        }
    }

    /// Run the motor while a button is held during calibration, there are no bounds to watch yet
    fn jog(&mut self, button: ButtonId) {
        if self.motor.is_moving() {
            self.motor.stop();
        }
        debug!("Jogging {:?}", button);
        self.held = Some(button);
        self.motor.set_direction(button.into());
        self.motor.set_speed(self.config.motor_speed);
        self.motor.step(CONTINUOUS);
    }

    fn is_suppressed(&self, event: &ButtonEvent) -> bool {
        match (event.kind, self.suppress_until) {
            (EventKind::SimultaneousPress, _) => false,
            (_, Some(until)) => event.at <= until,
            (_, None) => false,
        }
    }

    pub async fn handle_event(&mut self, event: ButtonEvent) {
        if self.is_suppressed(&event) {
            debug!("Ignoring {:?}, part of a simultaneous press", event.kind);
            return;
        }

        match (self.state, event.kind) {
            (state, EventKind::SimultaneousPress) => {
                self.suppress_until = Some(event.at + self.config.buttons.simultaneous_suppress);
                if state == ControllerState::Calibrating {
                    self.abort_calibration();
                } else {
                    self.calibrate();
                }
            }
            (ControllerState::Calibrating, EventKind::SingleClick(_)) => {
                self.record_calibration_step().await
            }
            (ControllerState::Calibrating, EventKind::LongPressStart(button)) => self.jog(button),
            (ControllerState::Calibrating, EventKind::Release(button)) => {
                if self.held == Some(button) {
                    self.motor.stop();
                    self.held = None;
                }
            }
            (ControllerState::Calibrating, kind) => debug!("Ignoring {:?} while calibrating", kind),
            (_, EventKind::SingleClick(ButtonId::Up)) => {
                let _ = self.goto_top().await;
            }
            (_, EventKind::SingleClick(ButtonId::Down)) => {
                let _ = self.goto_bottom().await;
            }
            (_, EventKind::DoubleClick(_)) => self.double_click().await,
            (_, EventKind::LongPressStart(button)) => {
                if self.move_continuous(button.into()).is_ok() {
                    self.held = Some(button);
                    self.watch = Some(BoundaryWatch { button, polls: 0 });
                    self.check_boundaries_and_stop().await;
                }
            }
            (ControllerState::MovingUp | ControllerState::MovingDown, EventKind::Release(button))
                if self.held == Some(button) =>
            {
                self.stop()
            }
            (_, EventKind::Release(_)) => {}
        }
    }

    /// Periodic supervision while moving
    pub async fn supervise(&mut self) {
        if let Some(mut watch) = self.watch {
            if self.held.is_some() && self.motor.is_moving() {
                watch.polls += 1;
                self.watch = Some(watch);
                if self.check_boundaries_and_stop().await {
                    debug!("Boundary watch for {:?} ended after {} polls", watch.button, watch.polls);
                }
            } else {
                debug!("Boundary watch for {:?} ended after {} polls", watch.button, watch.polls);
                self.watch = None;
            }
        }

        if self.state.is_moving() && !self.motor.is_moving() {
            debug!("Motor finished its move");
            self.held = None;
            self.watch = None;
            self.set_state(ControllerState::Idle);
        }

        self.status.publish_position(self.sensor.position());
    }

    pub fn poll_interval(&self) -> Option<Duration> {
        if self.state.is_moving() || self.watch.is_some() {
            Some(self.config.boundary_poll)
        } else {
            None
        }
    }
}

impl<M, P, D, S> ButtonEventHandler for MotionController<'_, M, P, D, S>
where
    M: Motor,
    P: PositionProbe,
    D: DelayNs,
    S: Storage,
{
    async fn on_button_event(&mut self, event: ButtonEvent) {
        self.handle_event(event).await
    }

    fn poll_interval(&self) -> Option<Duration> {
        MotionController::poll_interval(self)
    }

    async fn on_poll(&mut self) {
        self.supervise().await
    }
}
