//! Host doubles for driving a whole node from the outside.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::convert::Infallible;

use lowpower_sensor_node::{
    BusInterrupts, BusPeripheral, EnergyMode, PeriodicTimer, SerialInterrupt, SerialInterrupts,
    SerialPeripheral, SleepControl,
};

#[derive(Default)]
pub struct SimBus {
    pub written: RefCell<Vec<u8>>,
    rx: RefCell<VecDeque<u8>>,
    pending: Cell<BusInterrupts>,
    pub stops: Cell<usize>,
}

impl SimBus {
    pub fn queue_rx(&self, bytes: &[u8]) {
        self.rx.borrow_mut().extend(bytes.iter().copied());
    }

    pub fn raise(&self, irq: BusInterrupts) {
        self.pending.set(irq);
    }
}

impl BusPeripheral for SimBus {
    fn is_idle(&self) -> bool {
        true
    }

    fn send_start(&self) {}

    fn send_stop(&self) {
        self.stops.set(self.stops.get() + 1);
    }

    fn send_ack(&self) {}

    fn send_nack(&self) {}

    fn write_byte(&self, byte: u8) {
        self.written.borrow_mut().push(byte);
    }

    fn read_byte(&self) -> u8 {
        self.rx.borrow_mut().pop_front().unwrap_or(0)
    }

    fn take_interrupts(&self) -> BusInterrupts {
        self.pending.take()
    }
}

#[derive(Default)]
pub struct SimSerial {
    pub line: RefCell<Vec<u8>>,
    tx_buffer_level: Cell<bool>,
    tx_complete: Cell<bool>,
    pending: Cell<SerialInterrupts>,
}

impl SimSerial {
    pub fn text(&self) -> String {
        String::from_utf8(self.line.borrow().clone()).unwrap()
    }

    pub fn raise(&self, irq: SerialInterrupts) {
        self.pending.set(irq);
    }

    pub fn take_pending(&self) -> SerialInterrupts {
        self.pending.take()
    }

    /// Raises whichever transmit interrupt is currently enabled.
    pub fn raise_enabled(&self) -> bool {
        let irq = SerialInterrupts {
            tx_buffer_level: self.tx_buffer_level.get(),
            tx_complete: self.tx_complete.get(),
        };
        self.pending.set(irq);
        irq.tx_buffer_level || irq.tx_complete
    }
}

impl SerialPeripheral for SimSerial {
    fn is_tx_idle(&self) -> bool {
        true
    }

    fn write_byte(&self, byte: u8) {
        self.line.borrow_mut().push(byte);
    }

    fn enable_interrupt(&self, irq: SerialInterrupt) {
        match irq {
            SerialInterrupt::TxBufferLevel => self.tx_buffer_level.set(true),
            SerialInterrupt::TxComplete => self.tx_complete.set(true),
        }
    }

    fn disable_interrupt(&self, irq: SerialInterrupt) {
        match irq {
            SerialInterrupt::TxBufferLevel => self.tx_buffer_level.set(false),
            SerialInterrupt::TxComplete => self.tx_complete.set(false),
        }
    }

    fn take_interrupts(&self) -> SerialInterrupts {
        self.pending.take()
    }
}

#[derive(Default)]
pub struct SimCpu {
    pub sleeps: RefCell<Vec<EnergyMode>>,
}

impl SleepControl for SimCpu {
    fn enter(&self, mode: EnergyMode) {
        self.sleeps.borrow_mut().push(mode);
    }
}

#[derive(Default)]
pub struct SimTimer {
    pub running: bool,
}

impl PeriodicTimer for SimTimer {
    fn start(&mut self) {
        self.running = true;
    }
}

#[derive(Default)]
pub struct SimLed {
    pub on: bool,
}

impl embedded_hal::digital::ErrorType for SimLed {
    type Error = Infallible;
}

impl embedded_hal::digital::OutputPin for SimLed {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.on = false;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.on = true;
        Ok(())
    }
}
