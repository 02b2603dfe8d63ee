use embassy_rp::clocks::clk_sys_freq;
use embassy_rp::gpio::Level;
use embassy_rp::pio::{
    Common, Config, Direction, Instance, LoadedProgram, Pin, PioPin, StateMachine,
};
use fixed::traits::ToFixed;
use fixed::types::U24F8;

/// PIO cycles spent on each output cycle
const CYCLES_PER_STEP: u32 = 10;

/// Counted square wave on a STEP pin: push a count, get that many pulses
///
/// $$
///     \text{Step Rate} = \frac{
///         \text{System Frequency}
///     }{
///         \text{Divider} \times 10
///     }
/// $$
pub struct CountedSqrWavProgram<'a, PIO: Instance> {
    prg: LoadedProgram<'a, PIO>,
}

impl<'a, PIO: Instance> CountedSqrWavProgram<'a, PIO> {
    pub fn new(common: &mut Common<'a, PIO>) -> Self {
        let prg = pio_proc::pio_asm!(
            ".side_set 1 opt"
            ".wrap_target"

            "reset:"
                "pull block" // Wait for the next count
                "mov x, osr side 0" // Load the count, STEP goes low
                "jmp enter" // Skip the extra delay of a low half-cycle

            "pull_low:"
                "jmp enter [1] side 0"
            "enter:" // Reset + Enter is 6 cycles whereas Pull-Low + Enter is 5 cycles
                "jmp x-- pull_high [2]" // Only jmp can decrement the counter

            "pull_high:" // Normatively 5 cycles, resetting is 4 cycles
                "jmp !x reset [3] side 1" // STEP goes high, back to waiting once the count runs out
                "jmp pull_low"
            ".wrap"
        );

        let prg = common.load_program(&prg.program);

        Self { prg }
    }
}

/// One state machine running [`CountedSqrWavProgram`] on a STEP pin
pub struct CountedSqrWav<'a, PIO: Instance, const SM: usize> {
    sm: &'a mut StateMachine<'a, PIO, SM>,
    cfg: Config<'a, PIO>,
    step_pin: Pin<'a, PIO>,
    /// Address of `pull block`, where the program waits for its next count
    origin: u8,
}

impl<'a, PIO: Instance, const SM: usize> CountedSqrWav<'a, PIO, SM> {
    pub fn new(
        common: &mut Common<'a, PIO>,
        sm: &'a mut StateMachine<'a, PIO, SM>,
        step_pin: &'a mut impl PioPin,
        program: &'a CountedSqrWavProgram<'a, PIO>,
        steps_per_second: u32,
    ) -> Self {
        let step_pin = common.make_pio_pin(step_pin);
        sm.set_pins(Level::Low, &[&step_pin]);
        sm.set_pin_dirs(Direction::Out, &[&step_pin]);

        let mut cfg = Config::default();
        cfg.use_program(&program.prg, &[&step_pin]);
        cfg.clock_divider = divider(steps_per_second);
        sm.set_config(&cfg);

        Self {
            sm,
            cfg,
            step_pin,
            origin: program.prg.origin,
        }
    }

    /// Retune the divider, a wave already in flight picks it up on its next cycle
    pub fn set_rate(&mut self, steps_per_second: u32) {
        self.cfg.clock_divider = divider(steps_per_second);
        self.sm.set_clock_divider(self.cfg.clock_divider);
    }

    /// Start (or extend) a run of `steps` pulses; hands the count back when the FIFO is full
    pub fn queue(&mut self, steps: u32) -> Result<(), u32> {
        if !self.sm.is_enabled() {
            self.sm.set_enable(true);
        }

        if self.sm.tx().try_push(steps) {
            Ok(())
        } else {
            Err(steps)
        }
    }

    /// Cut the wave short and drop any queued counts, STEP is left low
    pub fn halt(&mut self) {
        self.sm.set_enable(false);
        self.sm.clear_fifos();
        // SM_RESTART keeps PC, OSR and X; re-applying the config jumps back to `pull block`
        self.sm.restart();
        self.sm.set_config(&self.cfg);
        self.sm.set_pins(Level::Low, &[&self.step_pin]);
    }

    /// The program is parked on `pull block` with nothing left to pull, or the machine is off
    pub fn is_idle(&mut self) -> bool {
        if !self.sm.is_enabled() {
            return true;
        }

        // Only this driver pushes, so an empty FIFO stays empty until the PC is read
        self.sm.tx().empty() && self.sm.get_addr() == self.origin
    }
}

fn divider(steps_per_second: u32) -> U24F8 {
    let cycles_per_second = steps_per_second.max(1) * CYCLES_PER_STEP;
    (clk_sys_freq() / cycles_per_second).max(1).to_fixed()
}
