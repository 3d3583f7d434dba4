#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

mod app;
mod bus;
mod config;
mod ring_buffer;
mod scheduler;
mod send_buffer;
mod serial;
mod si7021;
mod sleep;
mod state_holder;

#[cfg(test)]
mod test_support;

pub use app::{timer_interrupt, Node, PeriodicTimer};
pub use bus::{
    BusEngine, BusEvent, BusInterrupts, BusPeripheral, BusRequest, BusState, RawCell, Transfer,
    BUS_SLEEP_BLOCK,
};
pub use config::{NodeConfig, MAX_MESSAGE_LEN, RING_CAPACITY, TIMER_SLEEP_BLOCK};
pub use ring_buffer::{RingBuffer, RingError};
pub use scheduler::{Event, EventSet, Scheduler};
pub use serial::{
    DrainOutcome, SerialEngine, SerialEvent, SerialInterrupt, SerialInterrupts, SerialPeripheral,
    SerialState, SERIAL_SLEEP_BLOCK,
};
pub use si7021::{relative_humidity, temperature_fahrenheit, Resolution, Si7021};
pub use sleep::{EnergyMode, EnergyModeGate, SleepControl};

#[cfg(feature = "dump")]
pub use state_holder::deque_into_array;

pub const STATES_HISTORY_SIZE: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    Bus { state: BusState, event: BusEvent },
    Serial { state: SerialState, event: SerialEvent },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Reason {
    Protocol(ProtocolError),
    BusBusy,
    InvalidByteCount,
    SerialBusy,
    RingBufferFull,
    MessageTooLong,
    BlockOverflow,
}

/// Halts on an unrecoverable sequencing defect.
///
/// The panic handler decides what halting means on target; host builds
/// unwind so tests can observe the message.
#[cold]
#[track_caller]
pub(crate) fn halt(reason: Reason) -> ! {
    error!("fatal fault: {}", reason);
    panic!("fatal fault: {:?}", reason)
}
