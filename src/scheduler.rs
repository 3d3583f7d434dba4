use core::cell::Cell;

use critical_section::Mutex;

/// Deferred work items. Each maps to one fixed bit of the pending set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Event {
    TimerUnderflow,
    TemperatureReady,
    HumidityReady,
    BootUp,
    SerialTxDone,
}

impl Event {
    pub const ALL: [Event; 5] = [
        Event::TimerUnderflow,
        Event::TemperatureReady,
        Event::HumidityReady,
        Event::BootUp,
        Event::SerialTxDone,
    ];

    pub const fn mask(self) -> u32 {
        1 << (self as u8)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EventSet(u32);

impl EventSet {
    pub const EMPTY: EventSet = EventSet(0);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, event: Event) -> bool {
        self.0 & event.mask() != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn with(self, event: Event) -> Self {
        EventSet(self.0 | event.mask())
    }

    pub const fn without(self, event: Event) -> Self {
        EventSet(self.0 & !event.mask())
    }

    pub fn iter(self) -> impl Iterator<Item = Event> {
        Event::ALL.into_iter().filter(move |e| self.contains(*e))
    }
}

impl FromIterator<Event> for EventSet {
    fn from_iter<I: IntoIterator<Item = Event>>(iter: I) -> Self {
        iter.into_iter().fold(EventSet::EMPTY, EventSet::with)
    }
}

/// Pending-event set shared between interrupt producers and the main loop.
pub struct Scheduler {
    pending: Mutex<Cell<EventSet>>,
}

impl Scheduler {
    pub const fn new() -> Self {
        Self {
            pending: Mutex::new(Cell::new(EventSet::EMPTY)),
        }
    }

    pub fn initialize(&self) {
        critical_section::with(|cs| self.pending.borrow(cs).set(EventSet::EMPTY));
    }

    /// Safe to call from interrupt context.
    pub fn raise(&self, event: Event) {
        critical_section::with(|cs| {
            let cell = self.pending.borrow(cs);
            cell.set(cell.get().with(event));
        });
    }

    pub fn acknowledge(&self, event: Event) {
        critical_section::with(|cs| {
            let cell = self.pending.borrow(cs);
            cell.set(cell.get().without(event));
        });
    }

    pub fn pending(&self) -> EventSet {
        critical_section::with(|cs| self.pending.borrow(cs).get())
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
