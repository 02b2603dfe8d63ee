use crate::storage::{keys, Access, Namespace, Storage, NAMESPACE};

/// Clamp range used until the blind has been calibrated
pub const UNCALIBRATED_MIN: u16 = 100;
pub const UNCALIBRATED_MAX: u16 = 3900;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InvalidBounds {
    pub min: u16,
    pub max: u16,
}

/// Mapping between raw readings and the blind's travel
///
/// `min < max` holds whenever the bounds are calibrated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CalibrationBounds {
    min: u16,
    max: u16,
    zebra_offset: u16,
    calibrated: bool,
}

impl CalibrationBounds {
    pub const UNCALIBRATED: Self = Self {
        min: UNCALIBRATED_MIN,
        max: UNCALIBRATED_MAX,
        zebra_offset: CalibrationRecord::DEFAULT.zebra_offset,
        calibrated: false,
    };

    pub fn calibrated(min: u16, max: u16, zebra_offset: u16) -> Result<Self, InvalidBounds> {
        if min >= max {
            return Err(InvalidBounds { min, max });
        }

        Ok(Self {
            min,
            max,
            zebra_offset,
            calibrated: true,
        })
    }

    pub fn min(&self) -> u16 {
        self.min
    }

    pub fn max(&self) -> u16 {
        self.max
    }

    pub fn zebra_offset(&self) -> u16 {
        self.zebra_offset
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrated
    }

    pub fn with_zebra_offset(self, zebra_offset: u16) -> Self {
        Self {
            zebra_offset,
            ..self
        }
    }

    pub fn clamp(&self, raw: u16) -> u16 {
        raw.clamp(self.min, self.max)
    }

    /// Share of the travel covered at `raw`, 0.0 at the top and 100.0 at the bottom
    pub fn percentage_of(&self, raw: u16) -> f32 {
        if !self.calibrated || raw <= self.min {
            return 0.0;
        }
        if raw >= self.max {
            return 100.0;
        }

        (raw - self.min) as f32 / (self.max - self.min) as f32 * 100.0
    }

    /// Raw reading at `percentage` of the travel, clamped to 0..=100
    pub fn position_at(&self, percentage: f32) -> u16 {
        let percentage = percentage.clamp(0.0, 100.0);
        let range = (self.max - self.min) as f32;
        self.min + (range * percentage / 100.0) as u16
    }

    /// `[calibrated:8][zebra_offset:16][max:16][min:16]` for lock-free publication
    pub(crate) const fn pack(&self) -> u64 {
        (self.calibrated as u64) << 48
            | (self.zebra_offset as u64) << 32
            | (self.max as u64) << 16
            | self.min as u64
    }

    pub(crate) const fn unpack(word: u64) -> Self {
        Self {
            min: word as u16,
            max: (word >> 16) as u16,
            zebra_offset: (word >> 32) as u16,
            calibrated: (word >> 48) & 1 == 1,
        }
    }
}

impl Default for CalibrationBounds {
    fn default() -> Self {
        Self::UNCALIBRATED
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CalibrationStep {
    Upper,
    Lower,
    ZebraOffset,
    /// Also the resting value when no calibration is in progress
    Complete,
}

impl CalibrationStep {
    pub fn next(self, zebra_enabled: bool) -> Self {
        match self {
            CalibrationStep::Upper => CalibrationStep::Lower,
            CalibrationStep::Lower if zebra_enabled => CalibrationStep::ZebraOffset,
            CalibrationStep::Lower => CalibrationStep::Complete,
            CalibrationStep::ZebraOffset => CalibrationStep::Complete,
            CalibrationStep::Complete => CalibrationStep::Complete,
        }
    }

    /// Instruction for the user at this step
    pub fn prompt(self) -> &'static str {
        match self {
            CalibrationStep::Upper => "Move the blind to the upper position and press a button",
            CalibrationStep::Lower => "Move the blind to the lower position and press a button",
            CalibrationStep::ZebraOffset => "Move the blind to the zebra offset and press a button",
            CalibrationStep::Complete => "Calibration complete",
        }
    }
}

/// Calibration as it is kept in non-volatile storage
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CalibrationRecord {
    pub upper: u16,
    pub lower: u16,
    pub zebra_offset: u16,
    pub zebra_enabled: bool,
}

impl CalibrationRecord {
    pub const DEFAULT: Self = Self {
        upper: 0,
        lower: 4095,
        zebra_offset: 100,
        zebra_enabled: false,
    };

    /// Missing or unreadable keys fall back to [`CalibrationRecord::DEFAULT`] one by one
    pub fn load<S: Storage>(storage: &mut S) -> Result<Self, S::Error> {
        let ns = storage.open(NAMESPACE, Access::ReadOnly)?;

        Ok(Self {
            upper: read_position(&ns, keys::UPPER_POSITION).unwrap_or(Self::DEFAULT.upper),
            lower: read_position(&ns, keys::LOWER_POSITION).unwrap_or(Self::DEFAULT.lower),
            zebra_offset: read_position(&ns, keys::ZEBRA_OFFSET)
                .unwrap_or(Self::DEFAULT.zebra_offset),
            zebra_enabled: ns
                .get_u8(keys::ZEBRA_ENABLED)
                .map(|v| v != 0)
                .unwrap_or(Self::DEFAULT.zebra_enabled),
        })
    }

    /// Fields are written one at a time; a failed field is logged and the rest still go out
    pub fn store<S: Storage>(&self, storage: &mut S) -> Result<(), S::Error> {
        let mut ns = storage.open(NAMESPACE, Access::ReadWrite)?;

        if let Err(e) = ns.set_u32(keys::UPPER_POSITION, self.upper as u32) {
            error!("Failed to save upper position: {:?}", e);
        }
        if let Err(e) = ns.set_u32(keys::LOWER_POSITION, self.lower as u32) {
            error!("Failed to save lower position: {:?}", e);
        }
        if let Err(e) = ns.set_u32(keys::ZEBRA_OFFSET, self.zebra_offset as u32) {
            error!("Failed to save zebra offset: {:?}", e);
        }
        if let Err(e) = ns.set_u8(keys::ZEBRA_ENABLED, self.zebra_enabled as u8) {
            error!("Failed to save zebra flag: {:?}", e);
        }

        ns.commit()
    }

    /// Bounds described by this record, if it describes a usable travel
    pub fn bounds(&self) -> Result<CalibrationBounds, InvalidBounds> {
        CalibrationBounds::calibrated(self.upper, self.lower, self.zebra_offset)
    }
}

impl Default for CalibrationRecord {
    fn default() -> Self {
        Self::DEFAULT
    }
}

fn read_position<N: Namespace>(ns: &N, key: &str) -> Option<u16> {
    ns.get_u32(key)
        .ok()
        .and_then(|v| u16::try_from(v).ok())
}
