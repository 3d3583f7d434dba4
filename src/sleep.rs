use core::cell::RefCell;

use critical_section::Mutex;

use crate::{halt, Reason};

/// Processor energy modes, shallowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, bytemuck::NoUninit)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum EnergyMode {
    Em0,
    Em1,
    Em2,
    Em3,
    Em4,
}

impl EnergyMode {
    pub const COUNT: usize = 5;

    pub const ALL: [EnergyMode; Self::COUNT] = [
        EnergyMode::Em0,
        EnergyMode::Em1,
        EnergyMode::Em2,
        EnergyMode::Em3,
        EnergyMode::Em4,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Sleep-entry primitive. Called with interrupts masked; a pending interrupt
/// must still wake the core.
pub trait SleepControl {
    fn enter(&self, mode: EnergyMode);
}

/// Tracks which energy modes are currently forbidden.
///
/// Blocking `EmN` means the core may sleep no deeper than `Em(N-1)`. Every
/// `block` must be paired with exactly one `unblock` of the same mode.
pub struct EnergyModeGate {
    blocks: Mutex<RefCell<[u8; EnergyMode::COUNT]>>,
}

impl EnergyModeGate {
    pub const fn new() -> Self {
        Self {
            blocks: Mutex::new(RefCell::new([0; EnergyMode::COUNT])),
        }
    }

    pub fn initialize(&self) {
        critical_section::with(|cs| *self.blocks.borrow_ref_mut(cs) = [0; EnergyMode::COUNT]);
    }

    pub fn block(&self, mode: EnergyMode) {
        critical_section::with(|cs| {
            let mut blocks = self.blocks.borrow_ref_mut(cs);
            let count = &mut blocks[mode.index()];
            if *count == u8::MAX {
                halt(Reason::BlockOverflow);
            }
            *count += 1;
        });
    }

    pub fn unblock(&self, mode: EnergyMode) {
        critical_section::with(|cs| {
            let mut blocks = self.blocks.borrow_ref_mut(cs);
            let count = &mut blocks[mode.index()];
            debug_assert!(*count > 0, "unbalanced unblock of {:?}", mode);
            *count = count.saturating_sub(1);
        });
    }

    pub fn block_count(&self, mode: EnergyMode) -> u8 {
        critical_section::with(|cs| self.blocks.borrow_ref(cs)[mode.index()])
    }

    /// Shallowest mode with an outstanding block, or the deepest mode when
    /// nothing is blocked.
    pub fn current_blocked_level(&self) -> EnergyMode {
        critical_section::with(|cs| {
            let blocks = self.blocks.borrow_ref(cs);
            EnergyMode::ALL
                .iter()
                .copied()
                .find(|mode| blocks[mode.index()] != 0)
                .unwrap_or(EnergyMode::Em4)
        })
    }

    /// Deepest mode the core may enter right now. Never selects EM4.
    pub fn deepest_allowed(&self) -> EnergyMode {
        match self.current_blocked_level() {
            EnergyMode::Em0 | EnergyMode::Em1 => EnergyMode::Em0,
            EnergyMode::Em2 => EnergyMode::Em1,
            EnergyMode::Em3 => EnergyMode::Em2,
            EnergyMode::Em4 => EnergyMode::Em3,
        }
    }

    /// Picks and enters the deepest permitted mode with interrupts masked so
    /// no block can change between selection and entry.
    pub fn enter_sleep<C: SleepControl>(&self, cpu: &C) -> EnergyMode {
        critical_section::with(|_| {
            let mode = self.deepest_allowed();
            trace!("entering {}", mode);
            if mode != EnergyMode::Em0 {
                cpu.enter(mode);
            }
            mode
        })
    }
}

impl Default for EnergyModeGate {
    fn default() -> Self {
        Self::new()
    }
}
