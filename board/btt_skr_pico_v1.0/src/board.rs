use blind_actuator::board::rp::utils::counted_sqr_wav_pio::{CountedSqrWav, CountedSqrWavProgram};
use blind_actuator::board::rp::{AdcProbe, Board, DriverPins, FlashPage, StepperMotor, STORAGE_OFFSET};
use blind_actuator::config::MOTOR_SPEED;
use blind_actuator::static_buffer;
use embassy_rp::adc::{self, Adc};
use embassy_rp::bind_interrupts;
use embassy_rp::flash::Flash;
use embassy_rp::gpio::{Input, Level, Output, Pull};
use embassy_rp::peripherals::{PIO0, UART1};
use embassy_rp::pio::{InterruptHandler, Pio};
use embassy_rp::uart::{BufferedInterruptHandler, BufferedUart, Config, Uart};
use embassy_rp::watchdog::Watchdog;
use embassy_rp::Peripherals;
use static_cell::StaticCell;

bind_interrupts!(struct Irqs {
    PIO0_IRQ_0 => InterruptHandler<PIO0>;
    UART1_IRQ => BufferedInterruptHandler<UART1>;
    ADC_IRQ_FIFO => adc::InterruptHandler;
});

static_buffer!(DRIVER_BUFFER_TX: 32);
static_buffer!(DRIVER_BUFFER_RX: 32);

static PERIPHERALS: StaticCell<Peripherals> = StaticCell::new();
static PIO0: StaticCell<Pio<PIO0>> = StaticCell::new();
static PROG: StaticCell<CountedSqrWavProgram<PIO0>> = StaticCell::new();

pub trait BoardInitialize {
    fn init() -> Self;
}

impl BoardInitialize for Board<'static, BufferedUart<'static, UART1>> {
    fn init() -> Self {
        let p = PERIPHERALS.init(embassy_rp::init(Default::default()));
        let pio = PIO0.init(Pio::new(&mut p.PIO0, Irqs));
        let prog = PROG.init(CountedSqrWavProgram::new(&mut pio.common));

        // E0 motor slot
        let step = CountedSqrWav::new(
            &mut pio.common,
            &mut pio.sm0,
            &mut p.PIN_11,
            prog,
            MOTOR_SPEED,
        );
        let pins = DriverPins {
            enable: Output::new(&mut p.PIN_12, Level::High),
            dir: Output::new(&mut p.PIN_10, Level::Low),
        };

        let mut uart_cfg = Config::default();
        uart_cfg.baudrate = 115200;

        let driver_serial = Uart::new_blocking(&mut p.UART1, &mut p.PIN_8, &mut p.PIN_9, uart_cfg)
            .into_buffered(Irqs, DRIVER_BUFFER_TX.take(), DRIVER_BUFFER_RX.take());

        // Potentiometer wiper on the THB header, powered from the fan output
        let adc = Adc::new(&mut p.ADC, Irqs, adc::Config::default());
        let channel = adc::Channel::new_pin(&mut p.PIN_27, Pull::None);
        let power = Output::new(&mut p.PIN_17, Level::Low);

        let flash = Flash::new_blocking(&mut p.FLASH);

        Self {
            motor: StepperMotor::new(pins, step, false),
            probe: AdcProbe::new(adc, channel, power),
            page: FlashPage::new(flash, STORAGE_OFFSET),
            up: Input::new(&mut p.PIN_4, Pull::Up),
            down: Input::new(&mut p.PIN_3, Pull::Up),
            watchdog: Watchdog::new(&mut p.WATCHDOG),
            driver_serial,
        }
    }
}
