//! Filtered blind position and its calibration.

pub mod calibration;
pub mod filter;

pub use calibration::{
    CalibrationBounds, CalibrationRecord, CalibrationStep, InvalidBounds, UNCALIBRATED_MAX,
    UNCALIBRATED_MIN,
};
pub use filter::{MovingAverage, WINDOW};

use crate::config::{Config, TwoPointTiming};
use crate::storage::Storage;
use crate::Loggable;
use embassy_time::Duration;
use embedded_hal_async::delay::DelayNs;

/// The analog position source, e.g. a potentiometer on an ADC channel with a switched supply
#[allow(async_fn_in_trait)]
pub trait PositionProbe {
    type Error: Loggable;

    fn power_on(&mut self);
    fn power_off(&mut self);
    async fn sample(&mut self) -> Result<u16, Self::Error>;
}

struct CalibrationSession {
    step: CalibrationStep,
    record: CalibrationRecord,
}

pub struct PositionSensor<P, D, S> {
    probe: P,
    delay: D,
    storage: S,
    settle: Duration,
    zebra_support: bool,
    filter: MovingAverage<WINDOW>,
    bounds: CalibrationBounds,
    position: u16,
    session: CalibrationSession,
}

impl<P, D, S> PositionSensor<P, D, S>
where
    P: PositionProbe,
    D: DelayNs,
    S: Storage,
{
    pub fn new(probe: P, delay: D, storage: S, config: &Config) -> Self {
        Self {
            probe,
            delay,
            storage,
            settle: config.sensor_settle,
            zebra_support: config.zebra_support,
            filter: MovingAverage::new(),
            bounds: CalibrationBounds::UNCALIBRATED,
            position: 0,
            session: CalibrationSession {
                step: CalibrationStep::Complete,
                record: CalibrationRecord::DEFAULT,
            },
        }
    }

    /// Power the probe, take one sample and return the filtered, clamped position
    ///
    /// A failed sample leaves the filter alone and yields the last known position.
    pub async fn read(&mut self) -> u16 {
        self.probe.power_on();
        self.delay.delay_us(self.settle.as_micros() as u32).await;
        let sample = self.probe.sample().await;
        self.probe.power_off();

        match sample {
            Ok(raw) => {
                let average = self.filter.push(raw);
                self.position = self.bounds.clamp(average);
                trace!("Position raw={} filtered={}", raw, self.position);
            }
            Err(e) => error!("Failed to sample position: {:?}", e),
        }

        self.position
    }

    /// Last position returned by [`PositionSensor::read`]
    pub fn position(&self) -> u16 {
        self.position
    }

    pub fn set_calibration(&mut self, min: u16, max: u16) -> Result<(), InvalidBounds> {
        match CalibrationBounds::calibrated(min, max, self.bounds.zebra_offset()) {
            Ok(bounds) => {
                self.bounds = bounds;
                info!("Calibration set: min={} max={}", min, max);
                Ok(())
            }
            Err(e) => {
                error!("Invalid calibration: {:?}", e);
                Err(e)
            }
        }
    }

    pub fn is_calibrated(&self) -> bool {
        self.bounds.is_calibrated()
    }

    pub fn bounds(&self) -> CalibrationBounds {
        self.bounds
    }

    pub fn min_position(&self) -> u16 {
        self.bounds.min()
    }

    pub fn max_position(&self) -> u16 {
        self.bounds.max()
    }

    pub fn zebra_offset(&self) -> u16 {
        self.bounds.zebra_offset()
    }

    /// Fresh reading as a share of the calibrated travel
    pub async fn percentage(&mut self) -> f32 {
        if !self.is_calibrated() {
            warn!("Percentage requested before calibration");
            return 0.0;
        }

        let position = self.read().await;
        self.bounds.percentage_of(position)
    }

    /// Apply the stored calibration, if there is a usable one
    pub fn restore(&mut self) -> bool {
        let record = match CalibrationRecord::load(&mut self.storage) {
            Ok(record) => record,
            Err(e) => {
                info!("No stored calibration: {:?}", e);
                return false;
            }
        };

        match record.bounds() {
            Ok(bounds) => {
                self.bounds = bounds;
                info!(
                    "Restored calibration: min={} max={} zebra_offset={}",
                    bounds.min(),
                    bounds.max(),
                    bounds.zebra_offset()
                );
                true
            }
            Err(e) => {
                warn!("Stored calibration is unusable: {:?}", e);
                false
            }
        }
    }

    pub fn calibration_step(&self) -> CalibrationStep {
        self.session.step
    }

    /// Values collected by the current (or last) calibration session
    pub fn pending_record(&self) -> CalibrationRecord {
        self.session.record
    }

    pub fn start_calibration(&mut self) -> CalibrationStep {
        let mut record = CalibrationRecord::load(&mut self.storage).unwrap_or_else(|e| {
            debug!("Starting calibration from defaults: {:?}", e);
            CalibrationRecord::DEFAULT
        });
        record.zebra_enabled = self.zebra_support;

        self.session = CalibrationSession {
            step: CalibrationStep::Upper,
            record,
        };
        info!("Calibration started");

        self.session.step
    }

    pub fn advance_step(&mut self) -> CalibrationStep {
        let step = self.session.step.next(self.session.record.zebra_enabled);
        if step != self.session.step {
            debug!("Calibration step {:?} -> {:?}", self.session.step, step);
        }
        self.session.step = step;

        step
    }

    /// Store `position` against the current step
    pub fn record_step_value(&mut self, position: u16) {
        let record = &mut self.session.record;
        match self.session.step {
            CalibrationStep::Upper => {
                record.upper = position;
                info!("Upper position: {}", position);
            }
            CalibrationStep::Lower => {
                record.lower = position;
                info!("Lower position: {}", position);
                let (upper, lower) = (record.upper, record.lower);
                if upper < lower {
                    let _ = self.set_calibration(upper, lower);
                } else {
                    warn!("Upper position {} must read below lower position {}", upper, lower);
                }
            }
            CalibrationStep::ZebraOffset => {
                record.zebra_offset = position;
                self.bounds = self.bounds.with_zebra_offset(position);
                info!("Zebra offset: {}", position);
            }
            CalibrationStep::Complete => self.commit_calibration(),
        }
    }

    /// Persist the session's record in one commit
    pub fn commit_calibration(&mut self) {
        match self.session.record.store(&mut self.storage) {
            Ok(()) => info!("Calibration saved"),
            Err(e) => error!("Failed to save calibration: {:?}", e),
        }
    }

    /// Drop the session without persisting
    pub fn abort_calibration(&mut self) {
        self.session.step = CalibrationStep::Complete;
        info!("Calibration aborted");
    }

    /// Timed calibration: closed end first, then the open end, each averaged over several reads
    pub async fn calibrate_two_point(&mut self, timing: &TwoPointTiming) -> Result<(), InvalidBounds> {
        info!("Move the blind to the fully closed position");
        let min = self.settle_and_average(timing).await;
        info!("Closed position: {}", min);

        info!("Move the blind to the fully open position");
        let max = self.settle_and_average(timing).await;
        info!("Open position: {}", max);

        self.set_calibration(min, max)
    }

    async fn settle_and_average(&mut self, timing: &TwoPointTiming) -> u16 {
        self.delay.delay_ms(timing.settle.as_millis() as u32).await;

        let samples = timing.samples.max(1);
        let mut sum = 0u32;
        for _ in 0..samples {
            sum += self.read().await as u32;
            self.delay.delay_ms(timing.interval.as_millis() as u32).await;
        }

        (sum / samples) as u16
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn probe_mut(&mut self) -> &mut P {
        &mut self.probe
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{keys, Access, Namespace, NAMESPACE};
    use crate::testing::{test_sensor, test_sensor_on, RamPage, ScriptedProbe};
    use embassy_futures::block_on;

    #[test]
    fn read_is_filtered_and_clamped_to_defaults() {
        let mut sensor = test_sensor(ScriptedProbe::steady(1000));

        assert_eq!(block_on(sensor.read()), 1000);
        sensor.probe_mut().push(1200);
        assert_eq!(block_on(sensor.read()), 1040);

        let mut sensor = test_sensor(ScriptedProbe::steady(4095));
        assert_eq!(block_on(sensor.read()), UNCALIBRATED_MAX);
    }

    #[test]
    fn readings_stay_within_calibrated_bounds() {
        let mut sensor = test_sensor(ScriptedProbe::steady(0));
        sensor.set_calibration(500, 3500).unwrap();

        for raw in [0, 17, 499, 500, 2000, 3500, 3501, 4095, 0, 4095] {
            sensor.probe_mut().push(raw);
            let position = block_on(sensor.read());
            assert!((500..=3500).contains(&position), "{} escaped at {}", position, raw);
        }
    }

    #[test]
    fn probe_is_powered_only_while_sampling() {
        let mut sensor = test_sensor(ScriptedProbe::steady(1000));
        block_on(sensor.read());
        block_on(sensor.read());

        assert!(!sensor.probe_mut().powered);
        assert_eq!(sensor.probe_mut().power_cycles, 2);
    }

    #[test]
    fn failed_sample_keeps_last_position_and_filter() {
        let mut sensor = test_sensor(ScriptedProbe::steady(1000));
        assert_eq!(block_on(sensor.read()), 1000);

        sensor.probe_mut().fail_next();
        assert_eq!(block_on(sensor.read()), 1000);

        sensor.probe_mut().push(2000);
        assert_eq!(block_on(sensor.read()), 1200);
    }

    #[test]
    fn invalid_calibration_keeps_prior_bounds() {
        let mut sensor = test_sensor(ScriptedProbe::steady(1000));
        sensor.set_calibration(500, 3500).unwrap();

        assert!(sensor.set_calibration(3500, 3500).is_err());
        assert!(sensor.set_calibration(3600, 400).is_err());
        assert!(sensor.is_calibrated());
        assert_eq!((sensor.min_position(), sensor.max_position()), (500, 3500));
    }

    #[test]
    fn uncalibrated_percentage_is_zero() {
        let mut sensor = test_sensor(ScriptedProbe::steady(3000));

        assert_eq!(block_on(sensor.percentage()), 0.0);
    }

    #[test]
    fn stepwise_calibration_commits_on_lower() {
        let mut sensor = test_sensor(ScriptedProbe::steady(1000));

        assert_eq!(sensor.start_calibration(), CalibrationStep::Upper);
        sensor.record_step_value(500);
        assert!(!sensor.is_calibrated());
        assert_eq!(sensor.advance_step(), CalibrationStep::Lower);
        sensor.record_step_value(3500);

        assert!(sensor.is_calibrated());
        assert_eq!(sensor.bounds().percentage_of(2000), 50.0);
        assert_eq!(sensor.advance_step(), CalibrationStep::Complete);
        assert_eq!(sensor.advance_step(), CalibrationStep::Complete);
    }

    #[test]
    fn inverted_lower_step_does_not_calibrate() {
        let mut sensor = test_sensor(ScriptedProbe::steady(1000));
        sensor.start_calibration();
        sensor.record_step_value(3000);
        sensor.advance_step();
        sensor.record_step_value(1000);

        assert!(!sensor.is_calibrated());
    }

    #[test]
    fn calibration_starts_from_defaults_on_blank_storage() {
        let mut sensor = test_sensor(ScriptedProbe::steady(1000));
        sensor.start_calibration();

        assert_eq!(sensor.pending_record(), CalibrationRecord::DEFAULT);
    }

    #[test]
    fn calibration_starts_from_stored_record() {
        let page = RamPage::erased(512);
        let mut sensor = test_sensor_on(ScriptedProbe::steady(1000), &page, true);
        {
            let storage = sensor.storage_mut();
            let mut ns = storage.open(NAMESPACE, Access::ReadWrite).unwrap();
            ns.set_u32(keys::UPPER_POSITION, 640).unwrap();
            ns.set_u32(keys::ZEBRA_OFFSET, 250).unwrap();
            ns.commit().unwrap();
        }

        sensor.start_calibration();
        assert_eq!(
            sensor.pending_record(),
            CalibrationRecord {
                upper: 640,
                lower: 4095,
                zebra_offset: 250,
                zebra_enabled: true,
            }
        );
    }

    #[test]
    fn zebra_step_is_visited_only_when_supported() {
        let page = RamPage::erased(512);
        let mut sensor = test_sensor_on(ScriptedProbe::steady(1000), &page, true);
        sensor.start_calibration();

        assert_eq!(sensor.advance_step(), CalibrationStep::Lower);
        assert_eq!(sensor.advance_step(), CalibrationStep::ZebraOffset);
        sensor.record_step_value(300);
        assert_eq!(sensor.zebra_offset(), 300);
        assert_eq!(sensor.advance_step(), CalibrationStep::Complete);
    }

    #[test]
    fn complete_step_persists_the_record() {
        let page = RamPage::erased(512);
        let mut sensor = test_sensor_on(ScriptedProbe::steady(1000), &page, true);
        sensor.start_calibration();
        sensor.record_step_value(450);
        sensor.advance_step();
        sensor.record_step_value(3650);
        sensor.advance_step();
        sensor.record_step_value(200);
        assert_eq!(page.writes(), 0);

        sensor.advance_step();
        sensor.record_step_value(sensor.position());
        assert_eq!(page.writes(), 1);

        let stored = CalibrationRecord::load(sensor.storage_mut()).unwrap();
        assert_eq!(
            stored,
            CalibrationRecord {
                upper: 450,
                lower: 3650,
                zebra_offset: 200,
                zebra_enabled: true,
            }
        );
    }

    #[test]
    fn aborted_calibration_is_not_persisted() {
        let page = RamPage::erased(512);
        let mut sensor = test_sensor_on(ScriptedProbe::steady(1000), &page, false);
        sensor.start_calibration();
        sensor.record_step_value(450);
        sensor.abort_calibration();

        assert_eq!(sensor.calibration_step(), CalibrationStep::Complete);
        assert_eq!(page.writes(), 0);
    }

    #[test]
    fn restore_applies_a_usable_record() {
        let page = RamPage::erased(512);
        let record = CalibrationRecord {
            upper: 700,
            lower: 3300,
            zebra_offset: 150,
            zebra_enabled: false,
        };
        {
            let mut sensor = test_sensor_on(ScriptedProbe::steady(1000), &page, false);
            assert!(!sensor.restore());
            record.store(sensor.storage_mut()).unwrap();
        }

        let mut sensor = test_sensor_on(ScriptedProbe::steady(1000), &page, false);
        assert!(sensor.restore());
        assert_eq!(
            sensor.bounds(),
            CalibrationBounds::calibrated(700, 3300, 150).unwrap()
        );
    }

    #[test]
    fn restore_ignores_an_inverted_record() {
        let page = RamPage::erased(512);
        let mut sensor = test_sensor_on(ScriptedProbe::steady(1000), &page, false);
        CalibrationRecord {
            upper: 3300,
            lower: 700,
            zebra_offset: 0,
            zebra_enabled: false,
        }
        .store(sensor.storage_mut())
        .unwrap();

        assert!(!sensor.restore());
        assert!(!sensor.is_calibrated());
    }

    #[test]
    fn two_point_calibration_averages_each_end() {
        let mut probe = ScriptedProbe::steady(800);
        for _ in 0..10 {
            probe.push(800);
        }
        probe.fallback = 3200;
        let mut sensor = test_sensor(probe);
        let timing = Config::new().two_point;

        block_on(sensor.calibrate_two_point(&timing)).unwrap();

        assert!(sensor.is_calibrated());
        assert_eq!(sensor.min_position(), 800);
        assert_eq!(sensor.max_position(), 2720);
    }
}
