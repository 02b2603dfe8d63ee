//! Namespaced key-value persistence.

mod page;

pub use page::{PageError, PageIo, PageNamespace, PagedStore, HEADER_LEN, PAGE_ENTRIES};

use crate::Loggable;

/// Namespace that holds the calibration record
pub const NAMESPACE: &str = "position_sensor";

pub mod keys {
    pub const UPPER_POSITION: &str = "upper_position";
    pub const LOWER_POSITION: &str = "lower_position";
    pub const ZEBRA_OFFSET: &str = "zebra_offset";
    pub const ZEBRA_ENABLED: &str = "zebra_enabled";
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

pub trait Storage {
    type Error: Loggable;
    type Namespace<'a>: Namespace<Error = Self::Error>
    where
        Self: 'a;

    /// Opening a namespace that was never written fails when `access` is [`Access::ReadOnly`]
    fn open(
        &mut self,
        namespace: &'static str,
        access: Access,
    ) -> Result<Self::Namespace<'_>, Self::Error>;
}

/// Handle on one namespace, writes stay pending until [`Namespace::commit`]
pub trait Namespace {
    type Error: Loggable;

    fn get_u32(&self, key: &str) -> Result<u32, Self::Error>;
    fn get_u8(&self, key: &str) -> Result<u8, Self::Error>;
    fn set_u32(&mut self, key: &str, value: u32) -> Result<(), Self::Error>;
    fn set_u8(&mut self, key: &str, value: u8) -> Result<(), Self::Error>;
    fn commit(&mut self) -> Result<(), Self::Error>;
}
