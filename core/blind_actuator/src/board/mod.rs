#[cfg(feature = "rp")]
pub mod rp;
#[cfg(feature = "tmc2209_uart")]
pub mod tmc2209_uart;

#[cfg(feature = "uart_configurable_driver")]
use embedded_io::{Read, Write};

#[doc(hidden)]
pub use static_cell;

#[macro_export]
macro_rules! static_buffer {
    ($name:tt: $size:literal) => {
        static $name: $crate::board::static_cell::ConstStaticCell<[u8; $size]> =
            $crate::board::static_cell::ConstStaticCell::new([0; $size]);
    };
}

#[cfg(feature = "uart_configurable_driver")]
pub trait ConfigurableBoard {
    type DriverSerial: Read + Write;

    fn driver_serial(&mut self) -> &mut Self::DriverSerial;
}

#[cfg(feature = "uart_configurable_driver")]
#[allow(async_fn_in_trait)]
pub trait ConfigurableDriver {
    async fn configure_driver(&mut self);
}
