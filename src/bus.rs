use core::cell::{Cell, RefCell};

use atomic::{Atomic, Ordering};
use critical_section::Mutex;

use crate::{
    halt, scheduler::Event, sleep::EnergyMode, state_holder::StateHolder, EnergyModeGate,
    ProtocolError, Reason, Scheduler, STATES_HISTORY_SIZE,
};

/// Deepest mode the bus clock survives in is EM1.
pub const BUS_SLEEP_BLOCK: EnergyMode = EnergyMode::Em2;

const WRITE: u8 = 0;
const READ: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, bytemuck::NoUninit)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum BusState {
    Idle,
    Address,
    Register,
    WaitConversion,
    ReadData,
    WriteData,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusEvent {
    Ack,
    Nack,
    DataValid,
    StopComplete,
}

/// Pending interrupt sources, already cleared in the peripheral.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusInterrupts {
    pub ack: bool,
    pub nack: bool,
    pub data_valid: bool,
    pub stop: bool,
}

/// Two-wire master peripheral primitives.
pub trait BusPeripheral {
    fn is_idle(&self) -> bool;

    fn send_start(&self);

    fn send_stop(&self);

    fn send_ack(&self);

    fn send_nack(&self);

    fn write_byte(&self, byte: u8);

    fn read_byte(&self) -> u8;

    /// Reads and clears the enabled, pending interrupt flags.
    fn take_interrupts(&self) -> BusInterrupts;
}

/// Receive cell owned by the requester of a read.
#[derive(Debug)]
pub struct RawCell(Mutex<Cell<u32>>);

impl RawCell {
    pub const fn new() -> Self {
        Self(Mutex::new(Cell::new(0)))
    }

    pub fn get(&self) -> u32 {
        critical_section::with(|cs| self.0.borrow(cs).get())
    }

    pub fn set(&self, value: u32) {
        critical_section::with(|cs| self.0.borrow(cs).set(value));
    }

    /// Replaces byte `position` (0 = least significant).
    fn put_byte(&self, position: u8, byte: u8) {
        let shift = 8 * position as u32;
        critical_section::with(|cs| {
            let cell = self.0.borrow(cs);
            let cleared = cell.get() & !(0xff << shift);
            cell.set(cleared | (byte as u32) << shift);
        });
    }
}

impl Default for RawCell {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Transfer<'a> {
    Read(&'a RawCell),
    Write(u32),
}

#[derive(Debug, Clone, Copy)]
pub struct BusRequest<'a> {
    pub device_address: u8,
    pub command: u8,
    pub transfer: Transfer<'a>,
    pub byte_count: u8,
    pub done: Option<Event>,
}

#[derive(Clone, Copy)]
struct Transaction<'a> {
    device_address: u8,
    command: u8,
    transfer: Option<Transfer<'a>>,
    byte_count: u8,
    remaining: u8,
    done: Option<Event>,
}

impl Transaction<'_> {
    const IDLE: Self = Self {
        device_address: 0,
        command: 0,
        transfer: None,
        byte_count: 0,
        remaining: 0,
        done: None,
    };
}

/// Single-slot interrupt-driven two-wire transaction engine.
///
/// `start` returns immediately; progress happens in [`BusEngine::on_interrupt`]
/// (or [`BusEngine::handle_event`]) and completion raises the request's event.
pub struct BusEngine<'a, B: BusPeripheral> {
    bus: B,
    gate: &'a EnergyModeGate,
    scheduler: &'a Scheduler,
    state_holder: StateHolder<BusState, STATES_HISTORY_SIZE>,
    busy: Atomic<bool>,
    transaction: Mutex<RefCell<Transaction<'a>>>,
}

impl<'a, B: BusPeripheral> BusEngine<'a, B> {
    pub const fn new(bus: B, gate: &'a EnergyModeGate, scheduler: &'a Scheduler) -> Self {
        Self {
            bus,
            gate,
            scheduler,
            state_holder: StateHolder::new(BusState::Idle),
            busy: Atomic::new(false),
            transaction: Mutex::new(RefCell::new(Transaction::IDLE)),
        }
    }

    pub fn peripheral(&self) -> &B {
        &self.bus
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> BusState {
        self.state_holder.get_state()
    }

    pub fn start(&self, request: BusRequest<'a>) {
        if self.is_busy() || !self.bus.is_idle() {
            self.fail(Reason::BusBusy);
        }
        if !(1..=4).contains(&request.byte_count) {
            self.fail(Reason::InvalidByteCount);
        }

        trace!(
            "bus start addr={=u8:#x} cmd={=u8:#x} len={=u8}",
            request.device_address,
            request.command,
            request.byte_count
        );

        critical_section::with(|cs| {
            self.busy.store(true, Ordering::SeqCst);
            self.gate.block(BUS_SLEEP_BLOCK);

            *self.transaction.borrow_ref_mut(cs) = Transaction {
                device_address: request.device_address,
                command: request.command,
                transfer: Some(request.transfer),
                byte_count: request.byte_count,
                remaining: request.byte_count,
                done: request.done,
            };
            self.state_holder.set_state(BusState::Address);

            self.bus.send_start();
            self.bus.write_byte(request.device_address << 1 | WRITE);
        });
    }

    /// Interrupt service entry: dispatches every pending source in order.
    pub fn on_interrupt(&self) {
        critical_section::with(|_| {
            let irq = self.bus.take_interrupts();

            if irq.ack {
                self.handle_event(BusEvent::Ack);
            }
            if irq.nack {
                self.handle_event(BusEvent::Nack);
            }
            if irq.data_valid {
                self.handle_event(BusEvent::DataValid);
            }
            if irq.stop {
                self.handle_event(BusEvent::StopComplete);
            }
        });
    }

    pub fn handle_event(&self, event: BusEvent) {
        critical_section::with(|cs| {
            let mut t = self.transaction.borrow_ref_mut(cs);
            let state = self.state_holder.get_state();

            match (state, event) {
                (BusState::Address, BusEvent::Ack) => {
                    self.bus.write_byte(t.command);
                    self.state_holder.set_state(BusState::Register);
                }
                (BusState::Register, BusEvent::Ack) => match t.transfer {
                    Some(Transfer::Read(_)) => {
                        self.state_holder.set_state(BusState::WaitConversion);
                        self.address_for_read(t.device_address);
                    }
                    Some(Transfer::Write(data)) => {
                        // The counter drops before each byte goes out.
                        t.remaining -= 1;
                        self.bus.write_byte(byte_at(data, t.remaining));
                        self.state_holder.set_state(BusState::WriteData);
                    }
                    None => self.fail_protocol(state, event),
                },
                (BusState::WaitConversion, BusEvent::Ack) => {
                    self.state_holder.set_state(BusState::ReadData);
                }
                (BusState::WaitConversion, BusEvent::Nack) => {
                    // Still converting; address it again until it answers.
                    self.address_for_read(t.device_address);
                }
                (BusState::WriteData, BusEvent::Ack) => match t.transfer {
                    Some(Transfer::Write(_)) if t.remaining == 0 => {
                        self.state_holder.set_state(BusState::Stop);
                        self.bus.send_stop();
                    }
                    Some(Transfer::Write(data)) => {
                        t.remaining -= 1;
                        self.bus.write_byte(byte_at(data, t.remaining));
                    }
                    _ => self.fail_protocol(state, event),
                },
                (BusState::ReadData, BusEvent::DataValid) => {
                    let Some(Transfer::Read(cell)) = t.transfer else {
                        self.fail_protocol(state, event);
                    };

                    // The cell keeps its last value until new data arrives.
                    if t.remaining == t.byte_count {
                        cell.set(0);
                    }
                    t.remaining -= 1;
                    cell.put_byte(t.remaining, self.bus.read_byte());

                    if t.remaining > 0 {
                        self.bus.send_ack();
                    } else {
                        self.bus.send_nack();
                        self.bus.send_stop();
                        self.state_holder.set_state(BusState::Stop);
                    }
                }
                (BusState::Stop, BusEvent::StopComplete) => {
                    let done = t.done;
                    *t = Transaction::IDLE;
                    self.state_holder.set_state(BusState::Idle);
                    self.busy.store(false, Ordering::SeqCst);
                    self.gate.unblock(BUS_SLEEP_BLOCK);

                    if let Some(event) = done {
                        self.scheduler.raise(event);
                    }
                    trace!("bus transaction complete");
                }
                _ => self.fail_protocol(state, event),
            }
        });
    }

    fn address_for_read(&self, device_address: u8) {
        self.bus.send_start();
        self.bus.write_byte(device_address << 1 | READ);
    }

    fn fail_protocol(&self, state: BusState, event: BusEvent) -> ! {
        self.fail(Reason::Protocol(ProtocolError::Bus { state, event }))
    }

    fn fail(&self, reason: Reason) -> ! {
        #[cfg(feature = "dump")]
        {
            let dump = self.dump_state();
            error!("bus history: {}", dump);
        }
        halt(reason)
    }

    #[cfg(feature = "dump")]
    pub fn dump_state(&self) -> BusStateDump {
        let mut state_history = [BusState::Idle; STATES_HISTORY_SIZE];
        critical_section::with(|cs| {
            let states = self.state_holder.get_history(cs);
            crate::deque_into_array(&states, &mut state_history);
        });

        BusStateDump {
            state_history,
            current_state: self.state(),
        }
    }
}

#[cfg(feature = "dump")]
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusStateDump {
    pub state_history: [BusState; STATES_HISTORY_SIZE],
    pub current_state: BusState,
}

fn byte_at(data: u32, position: u8) -> u8 {
    (data >> (8 * position as u32)) as u8
}
