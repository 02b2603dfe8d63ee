use crate::board::{ConfigurableBoard, ConfigurableDriver};
use defmt::Format;
use embassy_time::Timer;
use embedded_io::{ErrorType, Read, Write};
use tmc2209::reg::{CHOPCONF, COOLCONF, GCONF, IHOLD_IRUN, TPWMTHRS};
use tmc2209::send_write_request;

/// MS1/MS2 strapping of the driver slot the blind's motor is wired to
const DRIVER_ADDR: u8 = 0;
#[cfg(feature = "uart_soft_half_duplex")]
const DATAGRAM_SIZE_WRITE_REQ: usize = 8;

/// Write each register in order, logging the ones that fail; evaluates to the number of datagrams sent
macro_rules! program_registers {
    ($ser:ident, $addr:expr, $($reg:ident),+ $(,)?) => {{
        let mut sent = 0usize;
        $(
            sent += 1;
            if let Err(e) = send_write_request($addr, $reg, &mut *$ser) {
                warn!("Failed to program {} on addr {}: {:?}", stringify!($reg), $addr, e);
            }
        )+
        sent
    }};
}

impl<B, S> ConfigurableDriver for B
where
    B: ConfigurableBoard<DriverSerial = S>,
    S: Read + Write,
    <S as ErrorType>::Error: Format,
{
    async fn configure_driver(&mut self) {
        let mut gconf = GCONF::default();
        gconf.set_pdn_disable(true); // UART owns PDN_UART, standstill current comes from IHOLD
        gconf.set_mstep_reg_select(true); // Must be written prior to setting MRES in CHOPCONF
        let mut chopconf = CHOPCONF::default();
        chopconf.set_vsense(false); // 0R11 external sense resistors on the board
        chopconf.set_mres(0b1000); // Full-step, the square wave has no microstep interpolation
        let tpwmthrs = TPWMTHRS(0); // StealthChop at every speed
        let coolconf = COOLCONF(0); // No CoolStep
        let mut ihold_irun = IHOLD_IRUN::default();
        ihold_irun.set_ihold(8); // Hold the blind against gravity at a quarter of run current
        ihold_irun.set_irun(31);
        ihold_irun.set_ihold_delay(4);

        let ser = self.driver_serial();
        let sent = program_registers!(
            ser,
            DRIVER_ADDR,
            gconf,
            chopconf,
            tpwmthrs,
            coolconf,
            ihold_irun,
        );

        #[cfg(feature = "uart_soft_half_duplex")]
        drain_echo(ser, sent).await;
        #[cfg(not(feature = "uart_soft_half_duplex"))]
        let _ = sent;

        Timer::after_millis(50).await;
        info!("Configured driver on addr {}", DRIVER_ADDR);
    }
}

/// The RP2040 UART hears its own transmission on a single-wire bus, discard one echo per datagram
#[cfg(feature = "uart_soft_half_duplex")]
async fn drain_echo<S>(ser: &mut S, datagrams: usize)
where
    S: Read + Write,
    <S as ErrorType>::Error: Format,
{
    if let Err(e) = ser.flush() {
        warn!("Failed to flush the driver UART: {:?}", e);
    }
    Timer::after_millis(50).await;

    let mut echo = [0u8; DATAGRAM_SIZE_WRITE_REQ];
    for n in 0..datagrams {
        if let Err(e) = ser.read_exact(&mut echo) {
            warn!("Echo drain stopped after {} of {} datagrams: {:?}", n, datagrams, e);
            break;
        }
    }
}
