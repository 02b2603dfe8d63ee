//! Button gestures, their queue and delivery.

pub mod gesture;
pub mod simultaneous;

pub use gesture::{watch_button, GestureDecoder, Gestures};
pub use simultaneous::{watch_simultaneous, SimultaneousPressDetector};

use crate::motor::Direction;
use core::sync::atomic::Ordering;
use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender, TrySendError};
use embassy_time::{Duration, Instant, Ticker};
use portable_atomic::AtomicU8;

pub const EVENT_QUEUE_DEPTH: usize = 10;

pub type EventQueue<M> = Channel<M, ButtonEvent, EVENT_QUEUE_DEPTH>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ButtonId {
    Up,
    Down,
}

impl ButtonId {
    fn bit(self) -> u32 {
        match self {
            ButtonId::Up => 0,
            ButtonId::Down => 1,
        }
    }
}

impl From<ButtonId> for Direction {
    fn from(value: ButtonId) -> Self {
        match value {
            ButtonId::Up => Direction::Up,
            ButtonId::Down => Direction::Down,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EventKind {
    SingleClick(ButtonId),
    DoubleClick(ButtonId),
    LongPressStart(ButtonId),
    Release(ButtonId),
    /// Both buttons pressed and let go together
    SimultaneousPress,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ButtonEvent {
    pub kind: EventKind,
    /// When the producer observed the gesture
    pub at: Instant,
}

impl ButtonEvent {
    pub fn new(kind: EventKind, at: Instant) -> Self {
        Self { kind, at }
    }
}

/// Enqueue without waiting; the event is dropped if the queue is full
pub fn post<M: RawMutex, const N: usize>(
    events: &Sender<'_, M, ButtonEvent, N>,
    event: ButtonEvent,
) -> bool {
    match events.try_send(event) {
        Ok(()) => true,
        Err(TrySendError::Full(event)) => {
            warn!("Event queue full, dropping {:?}", event.kind);
            false
        }
    }
}

/// Debounced button levels, written by the gesture tasks and sampled by the simultaneous watcher
pub struct PressedLevels(AtomicU8);

impl PressedLevels {
    pub const fn new() -> Self {
        Self(AtomicU8::new(0))
    }

    pub fn set(&self, button: ButtonId, pressed: bool) {
        if pressed {
            self.0.bit_set(button.bit(), Ordering::Release);
        } else {
            self.0.bit_clear(button.bit(), Ordering::Release);
        }
    }

    pub fn is_pressed(&self, button: ButtonId) -> bool {
        self.0.load(Ordering::Acquire) & (1 << button.bit()) != 0
    }
}

impl Default for PressedLevels {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumer side of the event queue
#[allow(async_fn_in_trait)]
pub trait ButtonEventHandler {
    async fn on_button_event(&mut self, event: ButtonEvent);

    /// While `Some`, [`ButtonEventHandler::on_poll`] runs at this cadence between events
    fn poll_interval(&self) -> Option<Duration> {
        None
    }

    async fn on_poll(&mut self) {}
}

/// Deliver every queued event to `handler`, once each and in order
pub async fn dispatch<M, H, const N: usize>(
    events: Receiver<'_, M, ButtonEvent, N>,
    handler: &mut H,
) -> !
where
    M: RawMutex,
    H: ButtonEventHandler,
{
    info!("Button event dispatch started");
    let mut ticker: Option<Ticker> = None;

    loop {
        match handler.poll_interval() {
            Some(interval) => {
                let ticker = ticker.get_or_insert_with(|| Ticker::every(interval));
                match select(events.receive(), ticker.next()).await {
                    Either::First(event) => handler.on_button_event(event).await,
                    Either::Second(()) => handler.on_poll().await,
                }
            }
            None => {
                ticker = None;
                let event = events.receive().await;
                handler.on_button_event(event).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
    use embassy_time::Timer;
    use std::vec::Vec;

    /// Polls three times after each event, then goes quiet
    #[derive(Default)]
    struct Recorder {
        events: Vec<(EventKind, Instant)>,
        polls: Vec<Instant>,
        remaining: u32,
    }

    impl ButtonEventHandler for Recorder {
        async fn on_button_event(&mut self, event: ButtonEvent) {
            self.events.push((event.kind, Instant::now()));
            self.remaining = 3;
        }

        fn poll_interval(&self) -> Option<Duration> {
            (self.remaining > 0).then(|| Duration::from_millis(100))
        }

        async fn on_poll(&mut self) {
            self.polls.push(Instant::now());
            self.remaining -= 1;
        }
    }

    fn click(button: ButtonId, ms: u64) -> ButtonEvent {
        ButtonEvent::new(EventKind::SingleClick(button), Instant::from_millis(ms))
    }

    #[test]
    fn full_queue_drops_new_events() {
        let queue = EventQueue::<CriticalSectionRawMutex>::new();
        let sender = queue.sender();

        for i in 0..EVENT_QUEUE_DEPTH as u64 {
            assert!(post(&sender, click(ButtonId::Up, i)));
        }
        assert!(!post(&sender, click(ButtonId::Down, 100)));
        assert!(!post(&sender, click(ButtonId::Down, 101)));

        for i in 0..EVENT_QUEUE_DEPTH as u64 {
            assert_eq!(queue.try_receive().unwrap(), click(ButtonId::Up, i));
        }
        assert!(queue.try_receive().is_err());
    }

    #[test]
    fn events_are_delivered_in_order() {
        let queue = EventQueue::<CriticalSectionRawMutex>::new();
        let sender = queue.sender();
        post(&sender, click(ButtonId::Up, 1000));
        post(&sender, click(ButtonId::Up, 1005));

        assert_eq!(queue.try_receive().unwrap(), click(ButtonId::Up, 1000));
        assert_eq!(queue.try_receive().unwrap(), click(ButtonId::Up, 1005));
        assert!(queue.try_receive().is_err());
    }

    #[test]
    fn levels_track_each_button() {
        let levels = PressedLevels::new();
        levels.set(ButtonId::Down, true);

        assert!(levels.is_pressed(ButtonId::Down));
        assert!(!levels.is_pressed(ButtonId::Up));

        levels.set(ButtonId::Up, true);
        levels.set(ButtonId::Down, false);
        assert!(levels.is_pressed(ButtonId::Up));
        assert!(!levels.is_pressed(ButtonId::Down));
    }

    #[test]
    fn dispatch_polls_on_the_handler_cadence_only_while_asked() {
        let queue = EventQueue::<CriticalSectionRawMutex>::new();
        let mut recorder = Recorder::default();

        let script = async {
            Timer::after_millis(20).await;
            post(&queue.sender(), click(ButtonId::Up, 20));
            Timer::after_millis(600).await;
        };
        match block_on(select(dispatch(queue.receiver(), &mut recorder), script)) {
            Either::First(_) => unreachable!(),
            Either::Second(()) => {}
        }

        assert_eq!(recorder.events.len(), 1);
        assert_eq!(recorder.events[0].0, EventKind::SingleClick(ButtonId::Up));
        assert_eq!(recorder.polls.len(), 3);

        let mut last = recorder.events[0].1;
        for poll in &recorder.polls {
            let gap = poll.saturating_duration_since(last).as_millis();
            assert!((90..=150).contains(&gap), "poll {}ms after the previous one", gap);
            last = *poll;
        }
    }
}
