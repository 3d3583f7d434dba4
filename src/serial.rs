use core::cell::RefCell;

use atomic::{Atomic, Ordering};
use critical_section::Mutex;
use heapless::Vec;

use crate::{
    halt,
    ring_buffer::{RingBuffer, RingError},
    scheduler::Event,
    send_buffer::SendBuffer,
    sleep::EnergyMode,
    state_holder::StateHolder,
    EnergyModeGate, ProtocolError, Reason, Scheduler, STATES_HISTORY_SIZE,
};

/// The low-energy UART keeps running down to EM2.
pub const SERIAL_SLEEP_BLOCK: EnergyMode = EnergyMode::Em3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, bytemuck::NoUninit)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum SerialState {
    Idle,
    Transmitting,
    Completing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SerialEvent {
    TxBufferLevel,
    TxComplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SerialInterrupt {
    /// Transmit buffer can take another byte.
    TxBufferLevel,
    /// Shift register emptied after the last byte.
    TxComplete,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SerialInterrupts {
    pub tx_buffer_level: bool,
    pub tx_complete: bool,
}

pub trait SerialPeripheral {
    fn is_tx_idle(&self) -> bool;

    fn write_byte(&self, byte: u8);

    fn enable_interrupt(&self, irq: SerialInterrupt);

    fn disable_interrupt(&self, irq: SerialInterrupt);

    /// Reads and clears the enabled, pending interrupt flags.
    fn take_interrupts(&self) -> SerialInterrupts;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DrainOutcome {
    Empty,
    Busy,
    StartedTest,
    StartedTransmit,
}

/// Queued, interrupt-driven serial transmitter.
///
/// Messages go into a ring buffer of capacity `RING`; the head message is
/// copied into a scratch buffer of `MSG` bytes and drained one byte per
/// buffer-level interrupt. Only one message is on the wire at a time.
pub struct SerialEngine<'a, S: SerialPeripheral, const RING: usize, const MSG: usize> {
    serial: S,
    gate: &'a EnergyModeGate,
    scheduler: &'a Scheduler,
    tx_done: Event,
    state_holder: StateHolder<SerialState, STATES_HISTORY_SIZE>,
    busy: Atomic<bool>,
    ring: Mutex<RefCell<RingBuffer<RING>>>,
    send_buffer: Mutex<RefCell<SendBuffer<MSG>>>,
    captured: Mutex<RefCell<Vec<u8, MSG>>>,
}

impl<'a, S: SerialPeripheral, const RING: usize, const MSG: usize> SerialEngine<'a, S, RING, MSG> {
    pub const fn new(
        serial: S,
        gate: &'a EnergyModeGate,
        scheduler: &'a Scheduler,
        tx_done: Event,
    ) -> Self {
        Self {
            serial,
            gate,
            scheduler,
            tx_done,
            state_holder: StateHolder::new(SerialState::Idle),
            busy: Atomic::new(false),
            ring: Mutex::new(RefCell::new(RingBuffer::new())),
            send_buffer: Mutex::new(RefCell::new(SendBuffer::new())),
            captured: Mutex::new(RefCell::new(Vec::new())),
        }
    }

    pub fn peripheral(&self) -> &S {
        &self.serial
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> SerialState {
        self.state_holder.get_state()
    }

    pub fn free_space(&self) -> usize {
        critical_section::with(|cs| self.ring.borrow_ref(cs).free_space())
    }

    /// Queues a message and starts it right away if the line is idle.
    pub fn enqueue(&self, message: &[u8]) {
        if message.len() > MSG {
            self.fail(Reason::MessageTooLong);
        }

        let pushed = critical_section::with(|cs| self.ring.borrow_ref_mut(cs).push(message));
        match pushed {
            Ok(()) => {}
            Err(RingError::TooLong) => self.fail(Reason::MessageTooLong),
            Err(_) => self.fail(Reason::RingBufferFull),
        }

        self.try_drain_head(false);
    }

    /// Pops the head message and either transmits it or, in test mode,
    /// copies it into the capture area.
    pub fn try_drain_head(&self, test_mode: bool) -> DrainOutcome {
        let mut scratch: Vec<u8, MSG> = Vec::new();

        let popped = critical_section::with(|cs| {
            let mut ring = self.ring.borrow_ref_mut(cs);
            if ring.is_empty() {
                return Ok(DrainOutcome::Empty);
            }
            if self.is_busy() {
                return Ok(DrainOutcome::Busy);
            }
            ring.pop_into(&mut scratch).map(|_| DrainOutcome::StartedTransmit)
        });

        match popped {
            Ok(DrainOutcome::StartedTransmit) if test_mode => {
                critical_section::with(|cs| *self.captured.borrow_ref_mut(cs) = scratch);
                DrainOutcome::StartedTest
            }
            Ok(DrainOutcome::StartedTransmit) => {
                self.start(&scratch);
                DrainOutcome::StartedTransmit
            }
            Ok(outcome) => outcome,
            Err(_) => self.fail(Reason::MessageTooLong),
        }
    }

    /// Takes the last message popped in test mode.
    pub fn take_captured(&self) -> Vec<u8, MSG> {
        critical_section::with(|cs| core::mem::take(&mut *self.captured.borrow_ref_mut(cs)))
    }

    /// Loads `payload` and arms the buffer-level interrupt.
    ///
    /// Waits for the peripheral to report idle first, so it must not be
    /// called from interrupt context.
    pub fn start(&self, payload: &[u8]) {
        while !self.serial.is_tx_idle() {
            core::hint::spin_loop();
        }

        critical_section::with(|cs| {
            if self.is_busy() {
                self.fail(Reason::SerialBusy);
            }

            self.gate.block(SERIAL_SLEEP_BLOCK);
            self.send_buffer.borrow_ref_mut(cs).load(payload);
            self.busy.store(true, Ordering::SeqCst);
            self.state_holder.set_state(SerialState::Transmitting);
            self.serial.enable_interrupt(SerialInterrupt::TxBufferLevel);
        });
    }

    pub fn on_interrupt(&self) {
        critical_section::with(|_| {
            let irq = self.serial.take_interrupts();

            if irq.tx_buffer_level {
                self.handle_event(SerialEvent::TxBufferLevel);
            }
            if irq.tx_complete {
                self.handle_event(SerialEvent::TxComplete);
            }
        });
    }

    pub fn handle_event(&self, event: SerialEvent) {
        critical_section::with(|cs| {
            let state = self.state_holder.get_state();

            match (state, event) {
                (SerialState::Transmitting, SerialEvent::TxBufferLevel) => {
                    let mut sb = self.send_buffer.borrow_ref_mut(cs);
                    if let Some(byte) = sb.next() {
                        self.serial.write_byte(byte);
                    }

                    if sb.is_empty() {
                        self.serial.disable_interrupt(SerialInterrupt::TxBufferLevel);
                        self.serial.enable_interrupt(SerialInterrupt::TxComplete);
                        self.state_holder.set_state(SerialState::Completing);
                    }
                }
                (SerialState::Completing, SerialEvent::TxComplete) => {
                    self.serial.disable_interrupt(SerialInterrupt::TxComplete);
                    self.serial.disable_interrupt(SerialInterrupt::TxBufferLevel);

                    let sent = self.send_buffer.borrow_ref(cs).bytes_sent();
                    trace!("serial sent {=usize} bytes", sent);

                    self.busy.store(false, Ordering::SeqCst);
                    self.scheduler.raise(self.tx_done);
                    self.gate.unblock(SERIAL_SLEEP_BLOCK);
                    self.state_holder.set_state(SerialState::Idle);
                }
                _ => self.fail(Reason::Protocol(ProtocolError::Serial { state, event })),
            }
        });
    }

    fn fail(&self, reason: Reason) -> ! {
        #[cfg(feature = "dump")]
        {
            let dump = self.dump_state();
            error!("serial history: {}", dump);
        }
        halt(reason)
    }

    #[cfg(feature = "dump")]
    pub fn dump_state(&self) -> SerialStateDump {
        let mut state_history = [SerialState::Idle; STATES_HISTORY_SIZE];
        critical_section::with(|cs| {
            let states = self.state_holder.get_history(cs);
            crate::deque_into_array(&states, &mut state_history);
        });

        SerialStateDump {
            state_history,
            current_state: self.state(),
        }
    }
}

#[cfg(feature = "dump")]
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SerialStateDump {
    pub state_history: [SerialState; STATES_HISTORY_SIZE],
    pub current_state: SerialState,
}
