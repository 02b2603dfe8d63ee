use crate::buttons::{post, ButtonEvent, ButtonId, EventKind, PressedLevels};
use crate::config::ButtonTiming;
use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Sender;
use embassy_time::{Duration, Instant, Timer};
use embedded_hal::digital::InputPin;
use embedded_hal_async::digital::Wait;

/// Events produced by a single level change or timeout
pub type Gestures = heapless::Vec<EventKind, 2>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    Pressed { since: Instant, clicks: u8 },
    Held,
    Released { at: Instant, clicks: u8 },
}

/// Turns debounced levels of one button into clicks, double clicks and long presses
pub struct GestureDecoder {
    button: ButtonId,
    long_press: Duration,
    double_click: Duration,
    phase: Phase,
}

impl GestureDecoder {
    pub fn new(button: ButtonId, timing: &ButtonTiming) -> Self {
        Self {
            button,
            long_press: timing.long_press,
            double_click: timing.double_click,
            phase: Phase::Idle,
        }
    }

    pub fn on_level(&mut self, pressed: bool, now: Instant) -> Gestures {
        let mut out = Gestures::new();

        self.phase = match (self.phase, pressed) {
            (Phase::Idle, true) => Phase::Pressed {
                since: now,
                clicks: 0,
            },
            (Phase::Released { clicks, .. }, true) => Phase::Pressed { since: now, clicks },
            (Phase::Pressed { clicks, .. }, false) => {
                let _ = out.push(EventKind::Release(self.button));
                if clicks + 1 >= 2 {
                    let _ = out.push(EventKind::DoubleClick(self.button));
                    Phase::Idle
                } else {
                    Phase::Released {
                        at: now,
                        clicks: clicks + 1,
                    }
                }
            }
            (Phase::Held, false) => {
                let _ = out.push(EventKind::Release(self.button));
                Phase::Idle
            }
            (phase, _) => phase,
        };

        out
    }

    /// When [`GestureDecoder::on_timeout`] next has something to decide
    pub fn deadline(&self) -> Option<Instant> {
        match self.phase {
            Phase::Pressed { since, .. } => Some(since + self.long_press),
            Phase::Released { at, .. } => Some(at + self.double_click),
            Phase::Idle | Phase::Held => None,
        }
    }

    pub fn on_timeout(&mut self, now: Instant) -> Gestures {
        let mut out = Gestures::new();

        match self.phase {
            Phase::Pressed { since, .. } if now >= since + self.long_press => {
                let _ = out.push(EventKind::LongPressStart(self.button));
                self.phase = Phase::Held;
            }
            Phase::Released { at, .. } if now >= at + self.double_click => {
                let _ = out.push(EventKind::SingleClick(self.button));
                self.phase = Phase::Idle;
            }
            _ => {}
        }

        out
    }
}

/// Debounce an active-low button and feed its gestures to the queue
pub async fn watch_button<M, B, const N: usize>(
    button: ButtonId,
    mut pin: B,
    levels: &PressedLevels,
    events: Sender<'_, M, ButtonEvent, N>,
    timing: &ButtonTiming,
) -> !
where
    M: RawMutex,
    B: InputPin + Wait,
{
    let mut decoder = GestureDecoder::new(button, timing);
    let mut stable = false;

    loop {
        let edge = match decoder.deadline() {
            Some(deadline) => match select(pin.wait_for_any_edge(), Timer::at(deadline)).await {
                Either::First(edge) => Some(edge),
                Either::Second(()) => None,
            },
            None => Some(pin.wait_for_any_edge().await),
        };

        let gestures = match edge {
            None => decoder.on_timeout(Instant::now()),
            Some(Err(_)) => {
                warn!("Edge wait failed on {:?}", button);
                Timer::after(timing.debounce).await;
                continue;
            }
            Some(Ok(())) => {
                Timer::after(timing.debounce).await;
                let pressed = match pin.is_low() {
                    Ok(pressed) => pressed,
                    Err(_) => {
                        warn!("Failed to read {:?}", button);
                        continue;
                    }
                };
                if pressed == stable {
                    continue;
                }
                stable = pressed;
                levels.set(button, pressed);
                decoder.on_level(pressed, Instant::now())
            }
        };

        for kind in gestures {
            debug!("{:?}", kind);
            post(&events, ButtonEvent::new(kind, Instant::now()));
        }
    }
}
