// VIA 6522 cell with the Cuda MCU wired to port B. The VIA half is plain
// register emulation with virtual-time counters; the Cuda half speaks the
// TIP/BYTEACK/TREQ packet protocol and fronts ADB, PRAM and the real-time
// clock for the host system.

use crate::adb::AdbBusPtr;
use crate::interrupts::IntCtrlPtr;
use crate::machine::{PowerCtl, PowerOffReason};
use crate::memory::{read_be_u16, read_be_u32};
use crate::nvram::NVram;
use crate::timers::{usecs_to_nsecs, TimersPtr, NS_PER_SEC};
use chrono::{TimeZone, Utc};
use log::{debug, error, info, warn};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

// VIA register indices.
pub const VIA_B: u32 = 0x00;
pub const VIA_A: u32 = 0x01;
pub const VIA_DIRB: u32 = 0x02;
pub const VIA_DIRA: u32 = 0x03;
pub const VIA_T1CL: u32 = 0x04;
pub const VIA_T1CH: u32 = 0x05;
pub const VIA_T1LL: u32 = 0x06;
pub const VIA_T1LH: u32 = 0x07;
pub const VIA_T2CL: u32 = 0x08;
pub const VIA_T2CH: u32 = 0x09;
pub const VIA_SR: u32 = 0x0A;
pub const VIA_ACR: u32 = 0x0B;
pub const VIA_PCR: u32 = 0x0C;
pub const VIA_IFR: u32 = 0x0D;
pub const VIA_IER: u32 = 0x0E;
pub const VIA_ANH: u32 = 0x0F;

// IFR/IER bits.
pub const VIA_IF_CA2: u8 = 0x01;
pub const VIA_IF_CA1: u8 = 0x02;
pub const VIA_IF_SR: u8 = 0x04;
pub const VIA_IF_CB2: u8 = 0x08;
pub const VIA_IF_CB1: u8 = 0x10;
pub const VIA_IF_T2: u8 = 0x20;
pub const VIA_IF_T1: u8 = 0x40;

// Port B handshake lines.
pub const CUDA_TIP: u8 = 0x20;
pub const CUDA_BYTEACK: u8 = 0x10;
pub const CUDA_TREQ: u8 = 0x08;

// Packet types.
pub const CUDA_PKT_ADB: u8 = 0x00;
pub const CUDA_PKT_PSEUDO: u8 = 0x01;
pub const CUDA_PKT_ERROR: u8 = 0x05;
pub const CUDA_PKT_TICK: u8 = 0x06;

// Pseudo command set.
pub const CUDA_WARM_START: u8 = 0x00;
pub const CUDA_START_STOP_AUTOPOLL: u8 = 0x01;
pub const CUDA_READ_MCU_MEM: u8 = 0x02;
pub const CUDA_GET_REAL_TIME: u8 = 0x03;
pub const CUDA_READ_PRAM: u8 = 0x07;
pub const CUDA_WRITE_MCU_MEM: u8 = 0x08;
pub const CUDA_SET_REAL_TIME: u8 = 0x09;
pub const CUDA_POWER_DOWN: u8 = 0x0A;
pub const CUDA_WRITE_PRAM: u8 = 0x0C;
pub const CUDA_MONO_STABLE_RESET: u8 = 0x0D;
pub const CUDA_RESTART_SYSTEM: u8 = 0x11;
pub const CUDA_FILE_SERVER_FLAG: u8 = 0x13;
pub const CUDA_SET_AUTOPOLL_RATE: u8 = 0x14;
pub const CUDA_GET_AUTOPOLL_RATE: u8 = 0x16;
pub const CUDA_SET_DEVICE_BITMAP: u8 = 0x19;
pub const CUDA_GET_DEVICE_BITMAP: u8 = 0x1A;
pub const CUDA_ONE_SECOND_MODE: u8 = 0x1B;
pub const CUDA_SET_POWER_MESSAGES: u8 = 0x21;
pub const CUDA_READ_WRITE_I2C: u8 = 0x22;
pub const CUDA_TIMER_TICKLE: u8 = 0x24;
pub const CUDA_COMB_FMT_I2C: u8 = 0x25;
pub const CUDA_OUT_PB0: u8 = 0x26;

// Error codes carried in ERROR packets.
pub const CUDA_ERR_BAD_PKT: u8 = 1;
pub const CUDA_ERR_BAD_CMD: u8 = 2;
pub const CUDA_ERR_BAD_SIZE: u8 = 3;
pub const CUDA_ERR_BAD_PAR: u8 = 4;
pub const CUDA_ERR_I2C: u8 = 5;

// MCU memory map windows.
pub const CUDA_PRAM_START: u16 = 0x100;
pub const CUDA_PRAM_END: u16 = 0x1FF;
pub const CUDA_ROM_START: u16 = 0xF000;

const CUDA_FW_VERSION_MAJOR: u16 = 0x0002;
const CUDA_FW_VERSION_MINOR: u16 = 0x0021;

pub const VIA_CLOCK_HZ: u64 = 783_360;

#[derive(Copy, Clone, PartialEq)]
enum OutHandler {
    Null,
    OutBuf,
    Pram,
}

#[derive(Copy, Clone, PartialEq)]
pub enum ViaLine {
    Ca1,
    Ca2,
    Cb1,
    Cb2,
}

pub type ViaCudaPtr = Rc<RefCell<ViaCuda>>;

pub struct ViaCuda {
    me: Weak<RefCell<ViaCuda>>,
    timers: TimersPtr,
    adb_bus: AdbBusPtr,
    power: PowerCtl,
    pram: NVram,
    int_ctrl: Option<IntCtrlPtr>,
    irq_id: u64,

    // VIA cell registers.
    porta: u8,
    portb: u8,
    ddra: u8,
    ddrb: u8,
    acr: u8,
    pcr: u8,
    ifr: u8,
    ier: u8,
    sr: u8,
    last_orb: u8,
    t1ll: u8,
    t1lh: u8,
    t2ll: u8,
    t1_counter: u16,
    t2_counter: u16,
    t1_start_time: u64,
    t2_start_time: u64,
    t1_timer_id: u32,
    t2_timer_id: u32,
    sr_timer_id: u32,
    treq_timer_id: u32,

    // Cuda MCU transaction state.
    old_tip: bool,
    old_byteack: bool,
    treq: bool,
    is_sync_state: bool,
    in_buf: [u8; 16],
    in_count: usize,
    out_buf: [u8; 256],
    out_count: usize,
    out_pos: usize,
    is_open_ended: bool,
    out_handler: OutHandler,
    next_out_handler: OutHandler,
    cur_pram_addr: u8,

    autopoll_enabled: bool,
    poll_rate: u8,
    device_mask: u16,
    file_server: bool,
    one_sec_mode: u8,
    last_time: u32,
    time_offset: u32,
}

impl ViaCuda {
    pub fn new(timers: TimersPtr, adb_bus: AdbBusPtr, power: PowerCtl) -> ViaCudaPtr {
        let dev = Rc::new(RefCell::new(ViaCuda {
            me: Weak::new(),
            timers,
            adb_bus,
            power,
            pram: NVram::new(256),
            int_ctrl: None,
            irq_id: 0,
            porta: 0,
            portb: 0,
            ddra: 0,
            ddrb: 0,
            acr: 0,
            pcr: 0,
            ifr: 0,
            ier: 0,
            sr: 0,
            last_orb: 0,
            t1ll: 0xFF,
            t1lh: 0xFF,
            t2ll: 0,
            t1_counter: 0xFFFF,
            t2_counter: 0xFFFF,
            t1_start_time: 0,
            t2_start_time: 0,
            t1_timer_id: 0,
            t2_timer_id: 0,
            sr_timer_id: 0,
            treq_timer_id: 0,
            old_tip: true,
            old_byteack: true,
            treq: true,
            is_sync_state: false,
            in_buf: [0; 16],
            in_count: 0,
            out_buf: [0; 256],
            out_count: 0,
            out_pos: 0,
            is_open_ended: false,
            out_handler: OutHandler::Null,
            next_out_handler: OutHandler::Null,
            cur_pram_addr: 0,
            autopoll_enabled: false,
            poll_rate: 11,
            device_mask: 0,
            file_server: false,
            one_sec_mode: 0,
            last_time: 0,
            time_offset: 0,
        }));
        dev.borrow_mut().me = Rc::downgrade(&dev);
        dev
    }

    /// Post-init: resolve the interrupt controller cross-reference.
    pub fn connect_int_ctrl(&mut self, ctrl: IntCtrlPtr, irq_id: u64) {
        self.int_ctrl = Some(ctrl);
        self.irq_id = irq_id;
    }

    pub fn pram(&mut self) -> &mut NVram {
        &mut self.pram
    }

    pub fn read(&mut self, reg: u32) -> u8 {
        match reg & 0xF {
            VIA_B => self.portb,
            VIA_A | VIA_ANH => {
                warn!("Attempted read from VIA port A!");
                self.porta
            }
            VIA_DIRB => self.ddrb,
            VIA_DIRA => self.ddra,
            VIA_T1CL => {
                self.ifr &= !VIA_IF_T1;
                self.update_irq();
                (self.calc_counter(self.t1_counter, self.t1_start_time) & 0xFF) as u8
            }
            VIA_T1CH => (self.calc_counter(self.t1_counter, self.t1_start_time) >> 8) as u8,
            VIA_T1LL => self.t1ll,
            VIA_T1LH => self.t1lh,
            VIA_T2CL => {
                self.ifr &= !VIA_IF_T2;
                self.update_irq();
                (self.calc_counter(self.t2_counter, self.t2_start_time) & 0xFF) as u8
            }
            VIA_T2CH => (self.calc_counter(self.t2_counter, self.t2_start_time) >> 8) as u8,
            VIA_SR => {
                let value = self.sr;
                self.ifr &= !VIA_IF_SR;
                self.update_irq();
                value
            }
            VIA_ACR => self.acr,
            VIA_PCR => self.pcr,
            VIA_IFR => self.ifr,
            VIA_IER => self.ier | 0x80, // bit 7 always reads as "1"
            _ => 0,
        }
    }

    pub fn write(&mut self, reg: u32, value: u8) {
        match reg & 0xF {
            VIA_B => {
                self.last_orb = value & self.ddrb;
                self.portb = (self.portb & !self.ddrb) | self.last_orb;
                // only call Cuda with the handshake lines configured as outputs
                if self.ddrb & 0x38 == 0x30 {
                    let portb = self.portb;
                    self.cuda_state_change(portb);
                }
            }
            VIA_A | VIA_ANH => {
                self.porta = value;
                warn!("Attempted write to VIA port A!");
            }
            VIA_DIRB => {
                self.ddrb = value;
                debug!("VIA_DIRB = 0x{:X}", value);
            }
            VIA_DIRA => {
                self.ddra = value;
                debug!("VIA_DIRA = 0x{:X}", value);
            }
            VIA_T1CL => self.t1ll = value, // redirected to the latch
            VIA_T1CH => {
                if self.t1_timer_id != 0 {
                    self.timers.borrow_mut().cancel_timer(self.t1_timer_id);
                    self.t1_timer_id = 0;
                }
                self.ifr &= !VIA_IF_T1;
                self.update_irq();
                self.t1lh = value;
                self.t1_counter = ((self.t1lh as u16) << 8) | self.t1ll as u16;
                self.activate_t1();
            }
            VIA_T1LL => self.t1ll = value,
            VIA_T1LH => {
                self.t1lh = value;
                // writes to T1LH clear the T1 interrupt in the Apple VIA cell
                self.ifr &= !VIA_IF_T1;
                self.update_irq();
            }
            VIA_T2CL => self.t2ll = value,
            VIA_T2CH => {
                if self.t2_timer_id != 0 {
                    self.timers.borrow_mut().cancel_timer(self.t2_timer_id);
                    self.t2_timer_id = 0;
                }
                self.ifr &= !VIA_IF_T2;
                self.update_irq();
                self.t2_counter = ((value as u16) << 8) | self.t2ll as u16;
                self.t2_start_time = self.timers.borrow().current_time_ns();
                let me = self.me.clone();
                let delay = counter_duration_ns(self.t2_counter);
                self.t2_timer_id = self.timers.borrow_mut().add_oneshot_timer(
                    delay,
                    Rc::new(move || {
                        if let Some(dev) = me.upgrade() {
                            let mut dev = dev.borrow_mut();
                            dev.t2_timer_id = 0;
                            dev.ifr |= VIA_IF_T2;
                            dev.update_irq();
                        }
                    }),
                );
            }
            VIA_SR => {
                self.sr = value;
                self.ifr &= !VIA_IF_SR;
                self.update_irq();
            }
            VIA_ACR => {
                self.acr = value;
                debug!("VIA_ACR = 0x{:X}", value);
            }
            VIA_PCR => {
                self.pcr = value;
                debug!("VIA_PCR = 0x{:X}", value);
            }
            VIA_IFR => {
                // each "1" clears the corresponding flag; bit 7 is ignored
                self.ifr &= !(value & 0x7F);
                self.update_irq();
            }
            VIA_IER => {
                if value & 0x80 != 0 {
                    self.ier |= value & 0x7F;
                } else {
                    self.ier &= !value;
                }
                self.update_irq();
            }
            _ => {}
        }
    }

    fn calc_counter(&self, last_val: u16, start_time: u64) -> u16 {
        let elapsed = self.timers.borrow().current_time_ns() - start_time;
        let ticks = (elapsed as u128 * VIA_CLOCK_HZ as u128 / NS_PER_SEC as u128) as u16;
        last_val.wrapping_sub(ticks)
    }

    fn activate_t1(&mut self) {
        self.t1_start_time = self.timers.borrow().current_time_ns();
        let me = self.me.clone();
        let delay = counter_duration_ns(self.t1_counter);
        self.t1_timer_id = self.timers.borrow_mut().add_oneshot_timer(
            delay,
            Rc::new(move || {
                if let Some(dev) = me.upgrade() {
                    let mut dev = dev.borrow_mut();
                    dev.t1_counter = ((dev.t1lh as u16) << 8) | dev.t1ll as u16;
                    dev.t1_timer_id = 0;
                    dev.ifr |= VIA_IF_T1;
                    dev.update_irq();
                    // free-run mode reloads from the latches
                    if dev.acr & 0x40 != 0 {
                        dev.activate_t1();
                    }
                }
            }),
        );
    }

    fn update_irq(&mut self) {
        let active = self.ifr & self.ier & 0x7F;
        let irq_state = active != 0;
        if irq_state || irq_state != (self.ifr >> 7 != 0) {
            self.ifr = ((irq_state as u8) << 7) | (self.ifr & 0x7F);
            if let Some(ctrl) = &self.int_ctrl {
                ctrl.borrow_mut().ack_int(self.irq_id, irq_state as u8);
            }
        }
    }

    fn assert_sr_int(&mut self) {
        self.ifr |= VIA_IF_SR;
        self.update_irq();
    }

    /// External control line edges (AMIC drives CA1 for its 60.15 Hz tick).
    pub fn assert_ctrl_line(&mut self, line: ViaLine) {
        self.ifr |= match line {
            ViaLine::Ca1 => VIA_IF_CA1,
            ViaLine::Ca2 => VIA_IF_CA2,
            ViaLine::Cb1 => VIA_IF_CB1,
            ViaLine::Cb2 => VIA_IF_CB2,
        };
        self.update_irq();
    }

    fn schedule_sr_int(&mut self, timeout_ns: u64) {
        if self.sr_timer_id != 0 {
            self.timers.borrow_mut().cancel_timer(self.sr_timer_id);
            self.sr_timer_id = 0;
        }
        let me = self.me.clone();
        self.sr_timer_id = self.timers.borrow_mut().add_oneshot_timer(
            timeout_ns,
            Rc::new(move || {
                if let Some(dev) = me.upgrade() {
                    let mut dev = dev.borrow_mut();
                    dev.sr_timer_id = 0;
                    dev.assert_sr_int();
                }
            }),
        );
    }

    // ----------------------------------------------------- Cuda handshake

    fn cuda_state_change(&mut self, new_state: u8) {
        let new_tip = new_state & CUDA_TIP != 0;
        let new_byteack = new_state & CUDA_BYTEACK != 0;

        if new_tip == self.old_tip && new_byteack == self.old_byteack {
            return;
        }
        self.old_tip = new_tip;
        self.old_byteack = new_byteack;

        if new_tip {
            if new_byteack {
                self.portb |= CUDA_TREQ; // negate TREQ
                self.treq = true;

                if self.is_sync_state {
                    self.disable_async_packets();
                    self.is_sync_state = false;
                }
                if self.in_count > 0 {
                    self.process_packet();
                    // delay TREQ assertion for the response transaction
                    let me = self.me.clone();
                    self.treq_timer_id = self.timers.borrow_mut().add_oneshot_timer(
                        usecs_to_nsecs(13),
                        Rc::new(move || {
                            if let Some(dev) = me.upgrade() {
                                let mut dev = dev.borrow_mut();
                                dev.portb &= !CUDA_TREQ;
                                dev.treq = false;
                                dev.treq_timer_id = 0;
                            }
                        }),
                    );
                }
                self.in_count = 0;
            } else {
                debug!("Cuda: enter sync state");
                self.portb &= !CUDA_TREQ; // assert TREQ
                self.treq = false;
                self.in_count = 0;
                self.out_count = 0;
                self.is_sync_state = true;
            }
            // dummy byte as idle acknowledge or attention
            self.schedule_sr_int(usecs_to_nsecs(61));
        } else if self.acr & 0x10 != 0 {
            // data transfer: host --> Cuda
            if self.in_count < self.in_buf.len() {
                self.in_buf[self.in_count] = self.sr;
                self.in_count += 1;
                self.schedule_sr_int(usecs_to_nsecs(71));
            } else {
                warn!("Cuda input buffer too small. Truncating data!");
            }
        } else {
            // data transfer: Cuda --> host
            self.run_out_handler();
            self.schedule_sr_int(usecs_to_nsecs(88));
        }
    }

    fn run_out_handler(&mut self) {
        match self.out_handler {
            OutHandler::Null => self.sr = 0,
            OutHandler::Pram => {
                self.sr = self.pram.read_byte(self.cur_pram_addr as u32);
                self.cur_pram_addr = self.cur_pram_addr.wrapping_add(1);
            }
            OutHandler::OutBuf => {
                if self.out_pos < self.out_count {
                    self.sr = self.out_buf[self.out_pos];
                    self.out_pos += 1;
                    if !self.is_open_ended && self.out_pos >= self.out_count {
                        // tell the host this will be the last byte
                        self.portb |= CUDA_TREQ;
                        self.treq = true;
                    }
                } else if self.is_open_ended {
                    self.out_handler = self.next_out_handler;
                    self.next_out_handler = OutHandler::Null;
                    self.run_out_handler();
                } else {
                    self.out_count = 0;
                    self.portb |= CUDA_TREQ;
                    self.treq = true;
                }
            }
        }
    }

    fn response_header(&mut self, pkt_type: u8, pkt_flag: u8) {
        self.out_buf[0] = pkt_type;
        self.out_buf[1] = pkt_flag;
        self.out_buf[2] = self.in_buf[1]; // copy original cmd
        self.out_count = 3;
        self.out_pos = 0;
        self.out_handler = OutHandler::OutBuf;
        self.next_out_handler = OutHandler::Null;
        self.is_open_ended = false;
    }

    fn error_response(&mut self, error: u8) {
        self.out_buf[0] = CUDA_PKT_ERROR;
        self.out_buf[1] = error;
        self.out_buf[2] = self.in_buf[0];
        self.out_buf[3] = self.in_buf[1];
        self.out_count = 4;
        self.out_pos = 0;
        self.out_handler = OutHandler::OutBuf;
        self.next_out_handler = OutHandler::Null;
        self.is_open_ended = false;
    }

    fn one_byte_header(&mut self, pkt_type: u8) {
        self.out_buf[0] = pkt_type;
        self.out_count = 1;
        self.out_pos = 0;
        self.out_handler = OutHandler::OutBuf;
        self.next_out_handler = OutHandler::Null;
        self.is_open_ended = false;
    }

    fn append_byte(&mut self, value: u8) {
        self.out_buf[self.out_count] = value;
        self.out_count += 1;
    }

    fn append_word(&mut self, value: u16) {
        self.out_buf[self.out_count..self.out_count + 2].copy_from_slice(&value.to_be_bytes());
        self.out_count += 2;
    }

    fn append_dword(&mut self, value: u32) {
        self.out_buf[self.out_count..self.out_count + 4].copy_from_slice(&value.to_be_bytes());
        self.out_count += 4;
    }

    fn process_packet(&mut self) {
        if self.in_count < 2 {
            error!("Cuda: invalid packet (too few data)!");
            self.error_response(CUDA_ERR_BAD_SIZE);
            return;
        }
        match self.in_buf[0] {
            CUDA_PKT_ADB => {
                debug!("Cuda: ADB packet received");
                self.process_adb_command();
            }
            CUDA_PKT_PSEUDO => {
                debug!("Cuda: pseudo command packet received, cmd=0x{:X}", self.in_buf[1]);
                self.pseudo_command();
            }
            other => {
                error!("Cuda: unsupported packet type = {}", other);
                self.error_response(CUDA_ERR_BAD_PKT);
            }
        }
    }

    fn process_adb_command(&mut self) {
        let cmd = self.in_buf[1..self.in_count].to_vec();
        let adb = Rc::clone(&self.adb_bus);
        let status = adb.borrow_mut().process_command(&cmd);
        self.response_header(CUDA_PKT_ADB, status);
        let output = adb.borrow().output_buf().to_vec();
        for b in output {
            self.append_byte(b);
        }
    }

    fn pseudo_command(&mut self) {
        let cmd = self.in_buf[1];
        match cmd {
            CUDA_START_STOP_AUTOPOLL => {
                if self.in_buf[2] != 0 {
                    info!("Cuda: autopoll started, rate: {} ms", self.poll_rate);
                    self.autopoll_enabled = true;
                } else {
                    info!("Cuda: autopoll stopped");
                    self.autopoll_enabled = false;
                }
                self.response_header(CUDA_PKT_PSEUDO, 0);
            }
            CUDA_READ_MCU_MEM => {
                let addr = read_be_u16(&self.in_buf, 2);
                self.response_header(CUDA_PKT_PSEUDO, 0);
                if addr >= CUDA_PRAM_START && addr <= CUDA_PRAM_END {
                    self.cur_pram_addr = (addr - CUDA_PRAM_START) as u8;
                    self.next_out_handler = OutHandler::Pram;
                } else if addr >= CUDA_ROM_START {
                    // Cuda ROM dump requested; fake the version block.
                    self.append_byte(0); // empty copyright string
                    self.append_word(0x0019);
                    self.append_word(CUDA_FW_VERSION_MAJOR);
                    self.append_word(CUDA_FW_VERSION_MINOR);
                }
                self.is_open_ended = true;
            }
            CUDA_GET_REAL_TIME => {
                self.response_header(CUDA_PKT_PSEUDO, 0);
                let now = self.calc_real_time().wrapping_add(self.time_offset);
                self.append_dword(now);
            }
            CUDA_WRITE_MCU_MEM => {
                let addr = read_be_u16(&self.in_buf, 2);
                if addr >= CUDA_PRAM_START && addr <= CUDA_PRAM_END {
                    for i in 0..self.in_count.saturating_sub(4) {
                        let dst = ((addr - CUDA_PRAM_START) as u32 + i as u32) & 0xFF;
                        self.pram.write_byte(dst, self.in_buf[4 + i]);
                    }
                }
                self.response_header(CUDA_PKT_PSEUDO, 0);
            }
            CUDA_READ_PRAM => {
                let addr = read_be_u16(&self.in_buf, 2);
                if addr <= 0xFF {
                    self.response_header(CUDA_PKT_PSEUDO, 0);
                    self.cur_pram_addr = addr as u8;
                    self.next_out_handler = OutHandler::Pram;
                    self.is_open_ended = true;
                } else {
                    self.error_response(CUDA_ERR_BAD_PAR);
                }
            }
            CUDA_SET_REAL_TIME => {
                self.response_header(CUDA_PKT_PSEUDO, 0);
                let real_time = self.calc_real_time();
                let new_time = read_be_u32(&self.in_buf, 2);
                self.time_offset = new_time.wrapping_sub(real_time);
            }
            CUDA_WRITE_PRAM => {
                let addr = read_be_u16(&self.in_buf, 2);
                if addr <= 0xFF {
                    for i in 0..self.in_count.saturating_sub(4) {
                        self.pram.write_byte((addr as u32 + i as u32) & 0xFF, self.in_buf[4 + i]);
                    }
                    self.response_header(CUDA_PKT_PSEUDO, 0);
                } else {
                    self.error_response(CUDA_ERR_BAD_PAR);
                }
            }
            CUDA_FILE_SERVER_FLAG => {
                self.response_header(CUDA_PKT_PSEUDO, 0);
                self.file_server = self.in_buf[2] != 0;
                info!("Cuda: file server flag {}", if self.file_server { "on" } else { "off" });
            }
            CUDA_SET_AUTOPOLL_RATE => {
                self.poll_rate = self.in_buf[2];
                info!("Cuda: autopoll rate set to {} ms", self.poll_rate);
                self.response_header(CUDA_PKT_PSEUDO, 0);
            }
            CUDA_GET_AUTOPOLL_RATE => {
                self.response_header(CUDA_PKT_PSEUDO, 0);
                let rate = self.poll_rate;
                self.append_byte(rate);
            }
            CUDA_SET_DEVICE_BITMAP => {
                self.device_mask = read_be_u16(&self.in_buf, 2);
                self.response_header(CUDA_PKT_PSEUDO, 0);
            }
            CUDA_GET_DEVICE_BITMAP => {
                self.response_header(CUDA_PKT_PSEUDO, 0);
                let mask = self.device_mask;
                self.append_word(mask);
            }
            CUDA_ONE_SECOND_MODE => {
                info!("Cuda: one second interrupt mode {}", self.in_buf[2]);
                self.one_sec_mode = self.in_buf[2];
                self.response_header(CUDA_PKT_PSEUDO, 0);
            }
            CUDA_READ_WRITE_I2C | CUDA_COMB_FMT_I2C => {
                // No I2C devices exist behind this Cuda.
                self.error_response(CUDA_ERR_I2C);
            }
            CUDA_TIMER_TICKLE | CUDA_SET_POWER_MESSAGES | CUDA_OUT_PB0 => {
                // No documented effect; answer with an empty OK packet.
                self.response_header(CUDA_PKT_PSEUDO, 0);
            }
            CUDA_RESTART_SYSTEM => {
                info!("Cuda: system restart");
                self.power.request_off(PowerOffReason::Restart);
            }
            CUDA_POWER_DOWN => {
                info!("Cuda: system shutdown");
                self.power.request_off(PowerOffReason::ShutDown);
            }
            CUDA_WARM_START | CUDA_MONO_STABLE_RESET => {
                info!("Cuda: restart/shutdown signal sent with command 0x{:X}!", cmd);
            }
            other => {
                error!("Cuda: unsupported pseudo command 0x{:X}", other);
                self.error_response(CUDA_ERR_BAD_CMD);
            }
        }
    }

    fn disable_async_packets(&mut self) {
        self.autopoll_enabled = false;
        self.one_sec_mode = 0;
    }

    /// Post-event hook: poll the ADB bus and deliver autopoll packets or
    /// one-second-mode time packets while the host link is idle.
    pub fn autopoll_handler(&mut self) {
        let poll_command = if self.autopoll_enabled {
            self.adb_bus.borrow_mut().poll()
        } else {
            0
        };
        if poll_command != 0 {
            if !self.old_tip || !self.treq {
                warn!("Cuda transaction probably in progress");
            }
            self.response_header(CUDA_PKT_ADB, crate::adb::ADB_STAT_OK | crate::adb::ADB_STAT_AUTOPOLL);
            self.out_buf[2] = poll_command;
            let output = self.adb_bus.borrow().output_buf().to_vec();
            for b in output {
                self.append_byte(b);
            }
            self.portb &= !CUDA_TREQ;
            self.treq = false;
            self.schedule_sr_int(usecs_to_nsecs(30));
        } else if self.one_sec_mode != 0 {
            let this_time = self.calc_real_time();
            if this_time != self.last_time {
                // send a full time packet every 4 seconds to stay in sync
                let send_time = self.last_time & 3 == 0;
                if send_time || self.one_sec_mode < 3 {
                    self.response_header(CUDA_PKT_PSEUDO, 0);
                    self.out_buf[2] = CUDA_GET_REAL_TIME;
                    if send_time || self.one_sec_mode == 1 {
                        let real_time = this_time.wrapping_add(self.time_offset);
                        self.append_dword(real_time);
                    }
                } else if self.one_sec_mode == 3 {
                    self.one_byte_header(CUDA_PKT_TICK);
                }
                self.last_time = this_time;
                self.portb &= !CUDA_TREQ;
                self.treq = false;
                self.schedule_sr_int(usecs_to_nsecs(30));
            }
        }
    }

    /// Seconds since the Macintosh epoch (1904-01-01). In deterministic
    /// mode "now" pins to the Mac OS X release date.
    fn calc_real_time(&self) -> u32 {
        let epoch = Utc.with_ymd_and_hms(1904, 1, 1, 0, 0, 0).unwrap();
        let now = if self.timers.borrow().is_deterministic() {
            Utc.with_ymd_and_hms(2001, 3, 24, 12, 0, 0).unwrap()
        } else {
            Utc::now()
        };
        (now - epoch).num_seconds() as u32
    }
}

impl Drop for ViaCuda {
    fn drop(&mut self) {
        let mut timers = self.timers.borrow_mut();
        for id in [self.sr_timer_id, self.t1_timer_id, self.t2_timer_id, self.treq_timer_id].iter() {
            if *id != 0 {
                timers.cancel_timer(*id);
            }
        }
    }
}

// A counter load of n expires after n + 3 VIA clocks.
fn counter_duration_ns(counter: u16) -> u64 {
    (counter as u64 + 3) * NS_PER_SEC / VIA_CLOCK_HZ
}
