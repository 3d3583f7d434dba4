use core::convert::Infallible;
use core::fmt::Write;

use embedded_hal::digital::{OutputPin, PinState};
use heapless::String;

use crate::{
    config::TIMER_SLEEP_BLOCK, BusPeripheral, EnergyMode, EnergyModeGate, Event, NodeConfig,
    Scheduler, SerialEngine, SerialPeripheral, Si7021, SleepControl,
};

/// The timer whose underflow paces sampling.
pub trait PeriodicTimer {
    fn start(&mut self);
}

/// Underflow interrupt body of the sample timer.
pub fn timer_interrupt(scheduler: &Scheduler) {
    scheduler.raise(Event::TimerUnderflow);
}

/// Main-loop side of the node: owns the deferred-work handlers.
pub struct Node<'a, B, S, T, L, const RING: usize, const MSG: usize>
where
    B: BusPeripheral,
    S: SerialPeripheral,
    T: PeriodicTimer,
    L: OutputPin<Error = Infallible>,
{
    scheduler: &'a Scheduler,
    gate: &'a EnergyModeGate,
    sensor: &'a Si7021<'a, B>,
    serial: &'a SerialEngine<'a, S, RING, MSG>,
    timer: T,
    alert_led: L,
    config: NodeConfig,
}

impl<'a, B, S, T, L, const RING: usize, const MSG: usize> Node<'a, B, S, T, L, RING, MSG>
where
    B: BusPeripheral,
    S: SerialPeripheral,
    T: PeriodicTimer,
    L: OutputPin<Error = Infallible>,
{
    pub fn new(
        scheduler: &'a Scheduler,
        gate: &'a EnergyModeGate,
        sensor: &'a Si7021<'a, B>,
        serial: &'a SerialEngine<'a, S, RING, MSG>,
        timer: T,
        alert_led: L,
        config: NodeConfig,
    ) -> Self {
        Self {
            scheduler,
            gate,
            sensor,
            serial,
            timer,
            alert_led,
            config,
        }
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    pub fn alert_led(&self) -> &L {
        &self.alert_led
    }

    /// Resets the shared state and schedules the boot handler.
    pub fn setup(&mut self) {
        self.scheduler.initialize();
        self.gate.initialize();
        self.gate.block(TIMER_SLEEP_BLOCK);
        self.scheduler.raise(Event::BootUp);
    }

    /// Runs every pending handler, then sleeps as deep as the gate allows.
    ///
    /// Returns the mode entered; `Em0` when the core stayed awake.
    pub fn run_once<C: SleepControl>(&mut self, cpu: &C) -> EnergyMode {
        loop {
            let pending = self.scheduler.pending();
            if pending.is_empty() {
                break;
            }

            for event in pending.iter() {
                assert!(
                    self.scheduler.pending().contains(event),
                    "event {:?} handled twice",
                    event
                );
                self.scheduler.acknowledge(event);
                self.dispatch(event);
            }
        }

        // An interrupt may have raised work after the drain above.
        critical_section::with(|_| {
            if self.scheduler.pending().is_empty() {
                self.gate.enter_sleep(cpu)
            } else {
                EnergyMode::Em0
            }
        })
    }

    pub fn run<C: SleepControl>(&mut self, cpu: &C) -> ! {
        loop {
            self.run_once(cpu);
        }
    }

    fn dispatch(&mut self, event: Event) {
        match event {
            Event::BootUp => self.on_boot(),
            Event::TimerUnderflow => self.on_timer(),
            Event::TemperatureReady => self.on_temperature(),
            Event::HumidityReady => self.on_humidity(),
            Event::SerialTxDone => {
                self.serial.try_drain_head(false);
            }
        }
    }

    fn on_boot(&mut self) {
        info!("node boot");

        for line in self.config.banner {
            self.serial.enqueue(line.as_bytes());
        }
        if let Some(resolution) = self.config.resolution {
            self.sensor.configure(resolution, None);
        }
        self.timer.start();
    }

    fn on_timer(&mut self) {
        if self.sensor.is_busy() {
            warn!("bus still busy, sample skipped");
            return;
        }
        // A finished reading has not been handled yet.
        let pending = self.scheduler.pending();
        if pending.contains(Event::TemperatureReady) || pending.contains(Event::HumidityReady) {
            warn!("previous sample not reported yet, sample skipped");
            return;
        }
        self.sensor.measure_temperature(Event::TemperatureReady);
    }

    fn on_temperature(&mut self) {
        let fahrenheit = self.sensor.temperature_f();
        debug!("temperature {} F", fahrenheit);

        let alert = fahrenheit > self.config.temperature_alert_f;
        let _ = self.alert_led.set_state(PinState::from(alert));

        self.send_line(format_args!("Temp = {:.1} F\n", fahrenheit));

        if self.sensor.is_busy() {
            warn!("bus busy, humidity skipped");
            return;
        }
        self.sensor.measure_humidity(Event::HumidityReady);
    }

    fn on_humidity(&mut self) {
        let rh = self.sensor.relative_humidity();
        debug!("humidity {} %", rh);

        self.send_line(format_args!("RH = {:.1} Percent\n", rh));
    }

    fn send_line(&self, args: core::fmt::Arguments<'_>) {
        let mut line: String<MSG> = String::new();
        if line.write_fmt(args).is_err() {
            warn!("line truncated");
        }
        self.serial.enqueue(line.as_bytes());
    }
}
