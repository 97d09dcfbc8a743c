// Interactive debugger. Single step, continue, breakpoints and memory
// watches over stdin, with a termion-drawn register pane and a coarse
// one-line disassembly of the next instruction.

use crate::cpu::Cpu;
use crate::fields::*;
use std::collections::HashSet;
use std::io;
use std::io::prelude::*;
use termion::{clear, color, cursor};

pub enum DbgSignal {
    Ok,
    NoOp,
    Quit,
}

#[derive(PartialEq, Clone)]
enum DebugCommand {
    Quit,
    Step,
    Continue,
    SetBreakpoint(Option<String>),
    DeleteBreakpoint(Option<String>),
    ShowMemory(Option<String>),
}

pub struct Debugger {
    code_running: bool,
    breakpoints: HashSet<u32>,
    last_cmd: DebugCommand,
}

impl Debugger {
    pub fn new() -> Box<Self> {
        Box::new(Debugger {
            code_running: false,
            breakpoints: HashSet::new(),
            last_cmd: DebugCommand::Step,
        })
    }

    pub fn update(&mut self, cpu: &mut Cpu) -> DbgSignal {
        if self.code_running && !self.breakpoints.contains(&cpu.nia) {
            return DbgSignal::Ok;
        }
        self.code_running = false;
        self.draw_user_interface(cpu);
        match self.get_command() {
            DebugCommand::Quit => DbgSignal::Quit,
            DebugCommand::Continue => {
                self.code_running = true;
                DbgSignal::Ok
            }
            DebugCommand::Step => {
                self.last_cmd = DebugCommand::Step;
                DbgSignal::Ok
            }
            DebugCommand::SetBreakpoint(addr) => {
                self.edit_breakpoint(&addr, false);
                DbgSignal::NoOp
            }
            DebugCommand::DeleteBreakpoint(addr) => {
                self.edit_breakpoint(&addr, true);
                DbgSignal::NoOp
            }
            DebugCommand::ShowMemory(addr) => {
                if let Some(address) = parse_address(&addr) {
                    let value = cpu.map.borrow().read(address, Size::Word);
                    println!("{:08x}: {:08x}", address, value);
                }
                DbgSignal::NoOp
            }
        }
    }

    fn edit_breakpoint(&mut self, address: &Option<String>, delete: bool) {
        if let Some(address) = parse_address(address) {
            if delete {
                self.breakpoints.remove(&address);
                println!("Breakpoint deleted.");
            } else {
                self.breakpoints.insert(address);
                println!("Breakpoint created.");
            }
        } else {
            println!("Invalid address!");
        }
    }

    fn get_command(&mut self) -> DebugCommand {
        let mut input = String::new();
        io::stdin().read_line(&mut input).unwrap();
        let mut cmd = input.split_whitespace();
        match cmd.next() {
            Some("q") => DebugCommand::Quit,
            Some("s") | Some("n") => DebugCommand::Step,
            Some("c") => DebugCommand::Continue,
            Some("b") => DebugCommand::SetBreakpoint(cmd.next().map(String::from)),
            Some("d") => DebugCommand::DeleteBreakpoint(cmd.next().map(String::from)),
            Some("m") => DebugCommand::ShowMemory(cmd.next().map(String::from)),
            _ => self.last_cmd.clone(),
        }
    }

    fn draw_user_interface(&mut self, cpu: &mut Cpu) {
        print!("{c}{tl}", c = clear::All, tl = cursor::Goto(1, 1));
        println!("{}", cpu);
        let next = match cpu.translate_ifetch(cpu.nia) {
            Ok(pa) => cpu.map.borrow().read(pa, Size::Word),
            Err(_) => 0,
        };
        println!(
            "{g}Next: {a:08x}  {w:08x}  {m}{n}",
            a = cpu.nia,
            w = next,
            m = mnemonic(next),
            g = color::Fg(color::Green),
            n = color::Fg(color::Reset),
        );
        println!("Enter n to single step, c to continue, b/d <addr> to set/delete a breakpoint, m <addr> to dump memory, q to quit.");
        print!("> ");
        io::stdout().flush().expect("");
    }
}

fn parse_address(address: &Option<String>) -> Option<u32> {
    match address {
        Some(addr) => u32::from_str_radix(addr.trim_start_matches("0x"), 16).ok(),
        None => None,
    }
}

/// Coarse disassembly, enough to follow boot code in the step view.
pub fn mnemonic(iw: u32) -> String {
    match opcd(iw) {
        3 => format!("twi {},r{},{}", to(iw), ra(iw), simm(iw)),
        7 => format!("mulli r{},r{},{}", rd(iw), ra(iw), simm(iw)),
        8 => format!("subfic r{},r{},{}", rd(iw), ra(iw), simm(iw)),
        10 => format!("cmpli cr{},r{},0x{:x}", crfd(iw), ra(iw), uimm(iw)),
        11 => format!("cmpi cr{},r{},{}", crfd(iw), ra(iw), simm(iw)),
        12 => format!("addic r{},r{},{}", rd(iw), ra(iw), simm(iw)),
        13 => format!("addic. r{},r{},{}", rd(iw), ra(iw), simm(iw)),
        14 => format!("addi r{},r{},{}", rd(iw), ra(iw), simm(iw)),
        15 => format!("addis r{},r{},0x{:x}", rd(iw), ra(iw), uimm(iw)),
        16 => format!("bc {},{},0x{:x}", bo(iw), bi(iw), bd(iw)),
        17 => "sc".to_string(),
        18 => format!("b{} 0x{:x}", if lk(iw) { "l" } else { "" }, li(iw)),
        19 => match xo10(iw) {
            16 => "bclr".to_string(),
            50 => "rfi".to_string(),
            150 => "isync".to_string(),
            528 => "bcctr".to_string(),
            _ => format!("cr-op({})", xo10(iw)),
        },
        20 => format!("rlwimi r{},r{},{},{},{}", ra(iw), rs(iw), sh(iw), mb(iw), me(iw)),
        21 => format!("rlwinm r{},r{},{},{},{}", ra(iw), rs(iw), sh(iw), mb(iw), me(iw)),
        23 => format!("rlwnm r{},r{},r{},{},{}", ra(iw), rs(iw), rb(iw), mb(iw), me(iw)),
        24 => format!("ori r{},r{},0x{:x}", ra(iw), rs(iw), uimm(iw)),
        25 => format!("oris r{},r{},0x{:x}", ra(iw), rs(iw), uimm(iw)),
        26 => format!("xori r{},r{},0x{:x}", ra(iw), rs(iw), uimm(iw)),
        27 => format!("xoris r{},r{},0x{:x}", ra(iw), rs(iw), uimm(iw)),
        28 => format!("andi. r{},r{},0x{:x}", ra(iw), rs(iw), uimm(iw)),
        29 => format!("andis. r{},r{},0x{:x}", ra(iw), rs(iw), uimm(iw)),
        31 => match xo10(iw) {
            0 => format!("cmp cr{},r{},r{}", crfd(iw), ra(iw), rb(iw)),
            20 => format!("lwarx r{},r{},r{}", rd(iw), ra(iw), rb(iw)),
            23 => format!("lwzx r{},r{},r{}", rd(iw), ra(iw), rb(iw)),
            28 => format!("and r{},r{},r{}", ra(iw), rs(iw), rb(iw)),
            32 => format!("cmpl cr{},r{},r{}", crfd(iw), ra(iw), rb(iw)),
            83 => format!("mfmsr r{}", rd(iw)),
            146 => format!("mtmsr r{}", rs(iw)),
            150 => format!("stwcx. r{},r{},r{}", rs(iw), ra(iw), rb(iw)),
            266 => format!("add r{},r{},r{}", rd(iw), ra(iw), rb(iw)),
            339 => format!("mfspr r{},{}", rd(iw), spr_num(iw)),
            444 => format!("or r{},r{},r{}", ra(iw), rs(iw), rb(iw)),
            467 => format!("mtspr {},r{}", spr_num(iw), rs(iw)),
            _ => format!("x-op({})", xo10(iw)),
        },
        32 => format!("lwz r{},{}(r{})", rd(iw), simm(iw), ra(iw)),
        33 => format!("lwzu r{},{}(r{})", rd(iw), simm(iw), ra(iw)),
        34 => format!("lbz r{},{}(r{})", rd(iw), simm(iw), ra(iw)),
        35 => format!("lbzu r{},{}(r{})", rd(iw), simm(iw), ra(iw)),
        36 => format!("stw r{},{}(r{})", rs(iw), simm(iw), ra(iw)),
        37 => format!("stwu r{},{}(r{})", rs(iw), simm(iw), ra(iw)),
        38 => format!("stb r{},{}(r{})", rs(iw), simm(iw), ra(iw)),
        40 => format!("lhz r{},{}(r{})", rd(iw), simm(iw), ra(iw)),
        42 => format!("lha r{},{}(r{})", rd(iw), simm(iw), ra(iw)),
        44 => format!("sth r{},{}(r{})", rs(iw), simm(iw), ra(iw)),
        46 => format!("lmw r{},{}(r{})", rd(iw), simm(iw), ra(iw)),
        47 => format!("stmw r{},{}(r{})", rs(iw), simm(iw), ra(iw)),
        48 => format!("lfs f{},{}(r{})", rd(iw), simm(iw), ra(iw)),
        50 => format!("lfd f{},{}(r{})", rd(iw), simm(iw), ra(iw)),
        52 => format!("stfs f{},{}(r{})", rs(iw), simm(iw), ra(iw)),
        54 => format!("stfd f{},{}(r{})", rs(iw), simm(iw), ra(iw)),
        59 => format!("fp-s-op({})", xo5(iw)),
        63 => format!("fp-d-op({})", xo10(iw)),
        other => format!("op({})", other),
    }
}
