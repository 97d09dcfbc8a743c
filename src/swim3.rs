// SWIM3 floppy controller cell. Without a mounted disk image (image
// handling belongs to the host frontend) the drive answers status queries
// as an empty, write-protected mechanism; the byte-count machinery and the
// zero-count interrupt behave the same either way.

use crate::dbdma::DmaChannelPtr;
use crate::interrupts::IntCtrlPtr;
use crate::timers::TimersPtr;
use log::debug;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

// Register indices, one per 16-byte stride.
const R_DATA: u32 = 0x0;
const R_TIMER: u32 = 0x1;
const R_ERROR: u32 = 0x2;
const R_PARAM: u32 = 0x3;
const R_PHASE: u32 = 0x4;
const R_SETUP: u32 = 0x5;
const R_MODE_ZEROES: u32 = 0x6;
const R_MODE_ONES: u32 = 0x7;
const R_HANDSHAKE: u32 = 0x8;
const R_INT_FLAGS: u32 = 0x9;
const R_STEP: u32 = 0xA;
const R_CUR_TRACK: u32 = 0xB;
const R_BYTE_COUNT_HI: u32 = 0xC;
const R_BYTE_COUNT_LO: u32 = 0xD;
const R_INT_MASK: u32 = 0xE;
const R_GOT_BYTES: u32 = 0xF;

// Interrupt flag bits.
const INT_STEP_DONE: u8 = 0x02;
const INT_ID_READ: u8 = 0x04;
const INT_SECT_DONE: u8 = 0x08;

// Mode bits.
const MODE_INT_ENA: u8 = 0x01;
const MODE_DRIVE1_ENA: u8 = 0x02;
const MODE_GO: u8 = 0x08;
const MODE_GO_STEP: u8 = 0x80;

// Handshake bits.
const HS_DATA_AVAIL: u8 = 0x04;
const HS_SENSE: u8 = 0x08;

pub type Swim3Ptr = Rc<RefCell<Swim3Ctrl>>;

pub struct Swim3Ctrl {
    me: Weak<RefCell<Swim3Ctrl>>,
    timers: TimersPtr,
    int_ctrl: Option<IntCtrlPtr>,
    irq_id: u64,
    dma_ch: Option<DmaChannelPtr>,

    setup: u8,
    mode: u8,
    phase: u8,
    error: u8,
    param_idx: u8,
    params: [u8; 16],
    step_count: u8,
    cur_track: u8,
    byte_count: u16,
    int_flags: u8,
    int_mask: u8,
    step_timer_id: u32,
}

impl Swim3Ctrl {
    pub fn new(timers: TimersPtr) -> Swim3Ptr {
        let dev = Rc::new(RefCell::new(Swim3Ctrl {
            me: Weak::new(),
            timers,
            int_ctrl: None,
            irq_id: 0,
            dma_ch: None,
            setup: 0,
            mode: 0,
            phase: 0,
            error: 0,
            param_idx: 0,
            params: [0; 16],
            step_count: 0,
            cur_track: 0,
            byte_count: 0,
            int_flags: 0,
            int_mask: 0,
            step_timer_id: 0,
        }));
        dev.borrow_mut().me = Rc::downgrade(&dev);
        dev
    }

    pub fn connect_int_ctrl(&mut self, ctrl: IntCtrlPtr, irq_id: u64) {
        self.int_ctrl = Some(ctrl);
        self.irq_id = irq_id;
    }

    pub fn connect_dma(&mut self, ch: DmaChannelPtr) {
        self.dma_ch = Some(ch);
    }

    fn update_irq(&mut self) {
        let active = self.int_flags & self.int_mask != 0 && self.mode & MODE_INT_ENA != 0;
        if let Some(ctrl) = &self.int_ctrl {
            ctrl.borrow_mut().ack_int(self.irq_id, active as u8);
        }
    }

    fn raise_int(&mut self, flag: u8) {
        self.int_flags |= flag;
        self.update_irq();
    }

    pub fn read(&mut self, reg: u32) -> u8 {
        match reg {
            R_DATA => 0,
            R_TIMER => 0,
            R_ERROR => {
                let value = self.error;
                self.error = 0;
                value
            }
            R_PARAM => {
                let value = self.params[self.param_idx as usize];
                self.param_idx = (self.param_idx + 1) & 0xF;
                value
            }
            R_PHASE => self.phase,
            R_SETUP => self.setup,
            R_MODE_ZEROES | R_MODE_ONES => self.mode,
            R_HANDSHAKE => {
                // no media: sense line high, no data pending
                HS_SENSE | if self.byte_count > 0 { 0 } else { HS_DATA_AVAIL }
            }
            R_INT_FLAGS => {
                let value = self.int_flags;
                self.int_flags = 0;
                self.update_irq();
                value
            }
            R_STEP => self.step_count,
            R_CUR_TRACK => self.cur_track,
            R_BYTE_COUNT_HI => (self.byte_count >> 8) as u8,
            R_BYTE_COUNT_LO => self.byte_count as u8,
            R_INT_MASK => self.int_mask,
            R_GOT_BYTES => 0,
            _ => 0,
        }
    }

    pub fn write(&mut self, reg: u32, value: u8) {
        match reg {
            R_PARAM => {
                self.params[self.param_idx as usize] = value;
                self.param_idx = (self.param_idx + 1) & 0xF;
            }
            R_PHASE => self.phase = value,
            R_SETUP => self.setup = value,
            R_MODE_ZEROES => {
                self.mode &= !value;
                self.update_irq();
            }
            R_MODE_ONES => {
                self.mode |= value;
                if value & MODE_GO_STEP != 0 {
                    self.start_stepping();
                }
                if value & MODE_GO != 0 {
                    self.start_transfer();
                }
                self.update_irq();
            }
            R_STEP => self.step_count = value,
            R_BYTE_COUNT_HI => self.byte_count = (self.byte_count & 0xFF) | ((value as u16) << 8),
            R_BYTE_COUNT_LO => self.byte_count = (self.byte_count & 0xFF00) | value as u16,
            R_INT_MASK => {
                self.int_mask = value;
                self.update_irq();
            }
            _ => debug!("SWIM3: write 0x{:02X} to register {}", value, reg),
        }
    }

    // Head stepping completes after a short virtual delay; each step
    // moves one track in the direction latched in the setup register.
    fn start_stepping(&mut self) {
        let steps = self.step_count;
        let inward = self.setup & 0x01 == 0;
        if inward {
            self.cur_track = self.cur_track.saturating_add(steps);
        } else {
            self.cur_track = self.cur_track.saturating_sub(steps);
        }
        self.step_count = 0;
        let me = self.me.clone();
        self.step_timer_id = self.timers.borrow_mut().add_oneshot_timer(
            500_000, // 0.5 ms per seek burst
            Rc::new(move || {
                if let Some(dev) = me.upgrade() {
                    let mut dev = dev.borrow_mut();
                    dev.step_timer_id = 0;
                    dev.mode &= !MODE_GO_STEP;
                    dev.raise_int(INT_STEP_DONE);
                }
            }),
        );
    }

    // A transfer against an empty drive: the byte count runs down to
    // zero immediately and the controller posts its interrupt.
    fn start_transfer(&mut self) {
        self.byte_count = 0;
        self.mode &= !MODE_GO;
        self.raise_int(INT_ID_READ | INT_SECT_DONE);
    }
}

impl Drop for Swim3Ctrl {
    fn drop(&mut self) {
        if self.step_timer_id != 0 {
            self.timers.borrow_mut().cancel_timer(self.step_timer_id);
        }
    }
}
