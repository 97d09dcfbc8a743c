use anyhow::{Context, Result};
use std::fs;
use std::rc::Rc;

pub mod fields;
pub mod memory;
pub mod timers;
pub mod interrupts;
pub mod cpu;
pub mod mmu;
mod decode;
mod opcodes;
mod fpopcodes;
pub mod dbdma;
pub mod adb;
pub mod nvram;
pub mod viacuda;
pub mod escc;
pub mod swim3;
pub mod scsi;
pub mod ethernet;
pub mod awacs;
pub mod video;
pub mod amic;
pub mod macio;
pub mod memctrl;
pub mod machine;
pub mod machines;
pub mod debugger;

use cpu::{Cpu, NS_PER_STEP};
use debugger::{Debugger, DbgSignal};
use machine::Machine;
use timers::run_due;

// Host events and Cuda autopolling piggyback on one 10 ms tick.
const EVENT_PUMP_NS: u64 = 10_000_000;

pub struct Emulator {
    pub cpu: Cpu,
    pub machine: Machine,
}

impl Emulator {
    pub fn new(machine: Machine) -> Emulator {
        let mut cpu = Cpu::new(Rc::clone(&machine.map), machine.int_pin.clone());
        cpu.reset(machine.pvr);
        let event_mgr = Rc::clone(&machine.event_mgr);
        machine.timers.borrow_mut().add_cyclic_timer(
            EVENT_PUMP_NS,
            Rc::new(move || event_mgr.borrow().run_post_handlers()),
        );
        Emulator { cpu, machine }
    }

    pub fn set_deterministic(&mut self, value: bool) {
        self.machine.timers.borrow_mut().set_deterministic(value);
    }

    /// Copy a ROM file into the boot ROM region, top aligned so that the
    /// reset vector lands at the end of the address space regardless of
    /// the image size (Old World 4 MiB, New World 1 MiB).
    pub fn load_rom(&mut self, path: &str) -> Result<()> {
        let image = fs::read(path).with_context(|| format!("cannot read ROM file '{}'", path))?;
        let rom = self.machine.rom.as_ref().context("machine has no ROM region")?;
        let mut rom = rom.borrow_mut();
        if image.len() > rom.len() {
            anyhow::bail!("ROM file '{}' is larger than the ROM region", path);
        }
        let offset = rom.len() - image.len();
        rom[offset..].copy_from_slice(&image);
        Ok(())
    }

    /// One interpreter step plus everything that is due between
    /// instructions: virtual time, timers, device callbacks.
    pub fn step(&mut self) {
        self.cpu.step();
        self.machine.timers.borrow_mut().advance(NS_PER_STEP);
        run_due(&self.machine.timers);
    }

    pub fn run(&mut self, debug: bool) {
        let mut debugger = Debugger::new();
        loop {
            self.step();
            if !self.machine.power.is_on() {
                log::info!("Machine powered off ({:?})", self.machine.power.off_reason());
                return;
            }
            if debug {
                match debugger.update(&mut self.cpu) {
                    DbgSignal::Quit => return,
                    _ => {}
                }
            }
        }
    }
}
