use crate::buttons::{post, ButtonEvent, ButtonId, EventKind, PressedLevels};
use crate::config::ButtonTiming;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Sender;
use embassy_time::{Duration, Instant, Ticker};

/// Recognises a short press of both buttons from periodic level samples
///
/// The press starts when both buttons read pressed and ends at the first sample where either
/// is released. It counts only if it ended within the window.
pub struct SimultaneousPressDetector {
    window: Duration,
    both_since: Option<Instant>,
}

impl SimultaneousPressDetector {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            both_since: None,
        }
    }

    pub fn sample(&mut self, up: bool, down: bool, now: Instant) -> Option<ButtonEvent> {
        match self.both_since {
            None if up && down => {
                self.both_since = Some(now);
                None
            }
            Some(since) if !(up && down) => {
                self.both_since = None;
                let held = now.saturating_duration_since(since);
                if held < self.window {
                    Some(ButtonEvent::new(EventKind::SimultaneousPress, now))
                } else {
                    trace!("Both buttons held for {}ms, too long", held.as_millis());
                    None
                }
            }
            _ => None,
        }
    }
}

pub async fn watch_simultaneous<M: RawMutex, const N: usize>(
    levels: &PressedLevels,
    events: Sender<'_, M, ButtonEvent, N>,
    timing: &ButtonTiming,
) -> ! {
    let mut detector = SimultaneousPressDetector::new(timing.simultaneous_window);
    let mut ticker = Ticker::every(timing.simultaneous_poll);

    loop {
        let up = levels.is_pressed(ButtonId::Up);
        let down = levels.is_pressed(ButtonId::Down);
        if let Some(event) = detector.sample(up, down, Instant::now()) {
            info!("Simultaneous press");
            post(&events, event);
        }
        ticker.next().await;
    }
}
