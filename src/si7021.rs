//! Si7021 humidity/temperature sensor over the interrupt-driven bus engine.

use atomic::{Atomic, Ordering};

use crate::{BusEngine, BusPeripheral, BusRequest, Event, RawCell, Transfer};

pub const SI7021_ADDRESS: u8 = 0x40;

/// Power-on value of user register 1.
const USER_REGISTER_DEFAULT: u8 = 0x3A;
const RESOLUTION_MASK: u8 = 0x81;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
enum Command {
    MeasureTemperature = 0xF3,
    MeasureHumidity = 0xF5,
    ReadUserRegister = 0xE7,
    WriteUserRegister = 0xE6,
}

/// Measurement resolution bits (D7, D0) of user register 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Resolution {
    Rh12Temp14 = 0x00,
    Rh8Temp12 = 0x01,
    Rh10Temp13 = 0x80,
    Rh11Temp11 = 0x81,
}

impl Resolution {
    /// Applies the resolution bits, keeping the reserved bits of `register`.
    pub const fn apply(self, register: u8) -> u8 {
        (register & !RESOLUTION_MASK) | self as u8
    }
}

pub struct Si7021<'a, B: BusPeripheral> {
    bus: &'a BusEngine<'a, B>,
    address: u8,
    temperature: RawCell,
    humidity: RawCell,
    user_register: RawCell,
    user_register_known: Atomic<bool>,
}

impl<'a, B: BusPeripheral> Si7021<'a, B> {
    pub const fn new(bus: &'a BusEngine<'a, B>, address: u8) -> Self {
        Self {
            bus,
            address,
            temperature: RawCell::new(),
            humidity: RawCell::new(),
            user_register: RawCell::new(),
            user_register_known: Atomic::new(false),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.bus.is_busy()
    }

    /// Starts a no-hold temperature conversion; `done` fires once both
    /// result bytes are in.
    pub fn measure_temperature(&'a self, done: Event) {
        self.read(Command::MeasureTemperature, &self.temperature, 2, Some(done));
    }

    pub fn measure_humidity(&'a self, done: Event) {
        self.read(Command::MeasureHumidity, &self.humidity, 2, Some(done));
    }

    pub fn read_user_register(&'a self, done: Option<Event>) {
        self.read(Command::ReadUserRegister, &self.user_register, 1, done);
        self.user_register_known.store(true, Ordering::SeqCst);
    }

    pub fn write_user_register(&self, value: u8, done: Option<Event>) {
        self.bus.start(BusRequest {
            device_address: self.address,
            command: Command::WriteUserRegister as u8,
            transfer: Transfer::Write(value as u32),
            byte_count: 1,
            done,
        });
        self.user_register.set(value as u32);
        self.user_register_known.store(true, Ordering::SeqCst);
    }

    /// Writes the resolution bits on top of the last known register value.
    pub fn configure(&self, resolution: Resolution, done: Option<Event>) {
        let current = self.user_register().unwrap_or(USER_REGISTER_DEFAULT);
        self.write_user_register(resolution.apply(current), done);
    }

    /// Last value read from or written to user register 1, if any.
    pub fn user_register(&self) -> Option<u8> {
        self.user_register_known
            .load(Ordering::SeqCst)
            .then(|| self.user_register.get() as u8)
    }

    pub fn temperature_raw(&self) -> u16 {
        self.temperature.get() as u16
    }

    pub fn humidity_raw(&self) -> u16 {
        self.humidity.get() as u16
    }

    pub fn temperature_f(&self) -> f32 {
        temperature_fahrenheit(self.temperature_raw())
    }

    pub fn relative_humidity(&self) -> f32 {
        relative_humidity(self.humidity_raw())
    }

    fn read(&'a self, command: Command, cell: &'a RawCell, byte_count: u8, done: Option<Event>) {
        self.bus.start(BusRequest {
            device_address: self.address,
            command: command as u8,
            transfer: Transfer::Read(cell),
            byte_count,
            done,
        });
    }
}

/// Truncates toward zero at one decimal place.
fn truncate_tenths(value: f32) -> f32 {
    (value * 10.0) as i32 as f32 / 10.0
}

pub fn temperature_fahrenheit(raw: u16) -> f32 {
    let celsius = (175.72 * raw as f32) / 65536.0 - 46.85;
    truncate_tenths(celsius * (9.0 / 5.0) + 32.0)
}

pub fn relative_humidity(raw: u16) -> f32 {
    truncate_tenths((125.0 * raw as f32) / 65536.0 - 6.0)
}
