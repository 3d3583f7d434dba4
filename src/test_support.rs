//! Recording peripheral doubles - only compiled in test builds.

use core::cell::{Cell, RefCell};
use core::convert::Infallible;
use std::collections::VecDeque;
use std::vec::Vec;

use crate::{
    BusInterrupts, BusPeripheral, EnergyMode, PeriodicTimer, SerialInterrupt, SerialInterrupts,
    SerialPeripheral, SleepControl,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusOp {
    Start,
    Stop,
    Ack,
    Nack,
    Write(u8),
    Read(u8),
}

#[derive(Default)]
pub struct MockBus {
    ops: RefCell<Vec<BusOp>>,
    rx: RefCell<VecDeque<u8>>,
    pending: Cell<BusInterrupts>,
}

impl MockBus {
    pub fn ops(&self) -> Vec<BusOp> {
        self.ops.borrow().clone()
    }

    pub fn queue_rx(&self, bytes: &[u8]) {
        self.rx.borrow_mut().extend(bytes.iter().copied());
    }

    pub fn raise(&self, irq: BusInterrupts) {
        self.pending.set(irq);
    }
}

impl BusPeripheral for MockBus {
    fn is_idle(&self) -> bool {
        true
    }

    fn send_start(&self) {
        self.ops.borrow_mut().push(BusOp::Start);
    }

    fn send_stop(&self) {
        self.ops.borrow_mut().push(BusOp::Stop);
    }

    fn send_ack(&self) {
        self.ops.borrow_mut().push(BusOp::Ack);
    }

    fn send_nack(&self) {
        self.ops.borrow_mut().push(BusOp::Nack);
    }

    fn write_byte(&self, byte: u8) {
        self.ops.borrow_mut().push(BusOp::Write(byte));
    }

    fn read_byte(&self) -> u8 {
        let byte = self.rx.borrow_mut().pop_front().unwrap_or(0);
        self.ops.borrow_mut().push(BusOp::Read(byte));
        byte
    }

    fn take_interrupts(&self) -> BusInterrupts {
        self.pending.take()
    }
}

#[derive(Default)]
pub struct MockSerial {
    written: RefCell<Vec<u8>>,
    tx_buffer_level: Cell<bool>,
    tx_complete: Cell<bool>,
    pending: Cell<SerialInterrupts>,
}

impl MockSerial {
    pub fn written(&self) -> Vec<u8> {
        self.written.borrow().clone()
    }

    pub fn enabled(&self, irq: SerialInterrupt) -> bool {
        match irq {
            SerialInterrupt::TxBufferLevel => self.tx_buffer_level.get(),
            SerialInterrupt::TxComplete => self.tx_complete.get(),
        }
    }

    pub fn raise(&self, irq: SerialInterrupts) {
        self.pending.set(irq);
    }
}

impl SerialPeripheral for MockSerial {
    fn is_tx_idle(&self) -> bool {
        true
    }

    fn write_byte(&self, byte: u8) {
        self.written.borrow_mut().push(byte);
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
pub struct MockCpu {
    entered: RefCell<Vec<EnergyMode>>,
}

impl MockCpu {
    pub fn entered(&self) -> Vec<EnergyMode> {
        self.entered.borrow().clone()
    }
}

impl SleepControl for MockCpu {
    fn enter(&self, mode: EnergyMode) {
        self.entered.borrow_mut().push(mode);
    }
}

#[derive(Default)]
pub struct MockTimer {
    pub starts: usize,
}

impl PeriodicTimer for MockTimer {
    fn start(&mut self) {
        self.starts += 1;
    }
}

#[derive(Default)]
pub struct MockPin {
    pub high: bool,
}

impl embedded_hal::digital::ErrorType for MockPin {
    type Error = Infallible;
}

impl embedded_hal::digital::OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.high = false;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.high = true;
        Ok(())
    }
}
