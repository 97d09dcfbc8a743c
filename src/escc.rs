// Z85C30 Enhanced Serial Communications Controller cell. Both channels
// share the WR/RR register layout; host access goes through the usual
// two-step pointer protocol on the command register. Character I/O runs
// through a pluggable serial backend, and each channel doubles as a pair
// of DBDMA endpoints (transmit sink, receive source).

use crate::dbdma::DmaDevice;
use crate::interrupts::{IntCtrlPtr, IntSrc};
use log::debug;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

// MacRISC register cells, one per 16-byte stride.
pub const ESCC_PORT_B_CMD: u32 = 0;
pub const ESCC_PORT_B_DATA: u32 = 1;
pub const ESCC_PORT_A_CMD: u32 = 2;
pub const ESCC_PORT_A_DATA: u32 = 3;
pub const ESCC_ENH_REG_B: u32 = 4;
pub const ESCC_ENH_REG_A: u32 = 5;

// Legacy 68k-compatible addressing translated to the MacRISC cells.
pub const COMPAT_TO_MACRISC: [u32; 6] = [
    ESCC_PORT_B_CMD,
    ESCC_PORT_A_CMD,
    ESCC_PORT_B_DATA,
    ESCC_PORT_A_DATA,
    ESCC_ENH_REG_B,
    ESCC_ENH_REG_A,
];

// RR0 status bits.
const RR0_RX_AVAIL: u8 = 0x01;
const RR0_TX_EMPTY: u8 = 0x04;
const RR0_DCD: u8 = 0x08;
const RR0_CTS: u8 = 0x20;

/// Character transport behind a channel.
pub trait SerialBackend {
    fn name(&self) -> &str;
    fn send_byte(&mut self, value: u8);
    fn poll_rx(&mut self) -> Option<u8>;
}

/// Discards output, never receives.
pub struct VoidBackend;

impl SerialBackend for VoidBackend {
    fn name(&self) -> &str {
        "void"
    }
    fn send_byte(&mut self, _value: u8) {}
    fn poll_rx(&mut self) -> Option<u8> {
        None
    }
}

/// Echoes transmitted bytes straight back to the receiver.
pub struct LoopbackBackend {
    queue: VecDeque<u8>,
}

impl LoopbackBackend {
    pub fn new() -> Self {
        LoopbackBackend { queue: VecDeque::new() }
    }
}

impl SerialBackend for LoopbackBackend {
    fn name(&self) -> &str {
        "loopback"
    }
    fn send_byte(&mut self, value: u8) {
        self.queue.push_back(value);
    }
    fn poll_rx(&mut self) -> Option<u8> {
        self.queue.pop_front()
    }
}

pub fn backend_for_tag(tag: &str) -> Box<dyn SerialBackend> {
    match tag {
        "loopback" => Box::new(LoopbackBackend::new()),
        _ => Box::new(VoidBackend),
    }
}

pub struct EsccChannel {
    name: &'static str,
    wr: [u8; 16],
    rr: [u8; 16],
    rx_fifo: VecDeque<u8>,
    backend: Box<dyn SerialBackend>,
    int_ctrl: Option<IntCtrlPtr>,
    irq_id: u64,
}

impl EsccChannel {
    fn new(name: &'static str, backend: Box<dyn SerialBackend>) -> Self {
        let mut ch = EsccChannel {
            name,
            wr: [0; 16],
            rr: [0; 16],
            rx_fifo: VecDeque::new(),
            backend,
            int_ctrl: None,
            irq_id: 0,
        };
        ch.soft_reset();
        ch
    }

    fn soft_reset(&mut self) {
        self.wr = [0; 16];
        self.wr[4] = 0x04;
        self.wr[5] = 0x60;
        self.rr = [0; 16];
        self.rr[0] = RR0_TX_EMPTY | RR0_DCD | RR0_CTS;
        self.rr[1] = 0x07; // all sent, residue codes
        self.rx_fifo.clear();
    }

    pub fn connect_int_ctrl(&mut self, ctrl: IntCtrlPtr, irq_id: u64) {
        self.int_ctrl = Some(ctrl);
        self.irq_id = irq_id;
    }

    fn rx_enabled(&self) -> bool {
        self.wr[3] & 0x01 != 0
    }

    fn tx_enabled(&self) -> bool {
        self.wr[5] & 0x08 != 0
    }

    fn write_reg(&mut self, reg: u8, value: u8) {
        debug!("{}: WR{} = 0x{:02X}", self.name, reg, value);
        self.wr[reg as usize] = value;
        match reg {
            0 => match value >> 3 {
                0b010 => self.rr[0] &= !0x80, // reset ext/status interrupts
                0b110 => self.rr[1] &= !0x70, // error reset
                _ => {}
            },
            3 => {
                if !self.rx_enabled() {
                    self.rx_fifo.clear();
                    self.rr[0] &= !RR0_RX_AVAIL;
                }
            }
            9 => {
                // WR9 reset commands live in the top bits.
                match value >> 6 {
                    0b01 | 0b10 => self.soft_reset(),
                    0b11 => self.soft_reset(), // force hardware reset
                    _ => {}
                }
            }
            _ => {}
        }
    }

    fn read_reg(&mut self, reg: u8) -> u8 {
        match reg {
            0 => self.rr[0],
            1 => self.rr[1],
            2 => self.rr[2],
            3 => self.rr[3],
            8 => self.receive_byte(),
            12 => self.wr[12],
            13 => self.wr[13],
            15 => self.wr[15],
            _ => self.rr[reg as usize & 0xF],
        }
    }

    fn send_byte(&mut self, value: u8) {
        if self.tx_enabled() {
            self.backend.send_byte(value);
        }
        // transmit buffer drains instantly
        self.rr[0] |= RR0_TX_EMPTY;
    }

    fn receive_byte(&mut self) -> u8 {
        let value = self.rx_fifo.pop_front().unwrap_or(0);
        if self.rx_fifo.is_empty() {
            self.rr[0] &= !RR0_RX_AVAIL;
        }
        value
    }

    /// Move backend input into the receive FIFO and raise the channel
    /// interrupt on fresh data.
    pub fn poll_backend(&mut self) {
        if !self.rx_enabled() {
            return;
        }
        let mut fresh = false;
        while let Some(b) = self.backend.poll_rx() {
            self.rx_fifo.push_back(b);
            fresh = true;
        }
        if fresh {
            self.rr[0] |= RR0_RX_AVAIL;
            // rx interrupt modes other than "disabled"
            if self.wr[1] & 0x18 != 0 {
                if let Some(ctrl) = &self.int_ctrl {
                    ctrl.borrow_mut().ack_int(self.irq_id, 1);
                    ctrl.borrow_mut().ack_int(self.irq_id, 0);
                }
            }
        }
    }
}

// DBDMA endpoints: OUTPUT pushes land in the transmitter, INPUT pulls
// drain the receive FIFO.
impl DmaDevice for EsccChannel {
    fn push_data(&mut self, data: &[u8]) -> u8 {
        for &b in data {
            self.send_byte(b);
        }
        self.rr[0]
    }

    fn pull_data(&mut self, req_len: usize, out: &mut Vec<u8>) -> u8 {
        for _ in 0..req_len {
            match self.rx_fifo.pop_front() {
                Some(b) => out.push(b),
                None => break,
            }
        }
        if self.rx_fifo.is_empty() {
            self.rr[0] &= !RR0_RX_AVAIL;
        }
        self.rr[0]
    }
}

pub type EsccPtr = Rc<RefCell<EsccController>>;

pub struct EsccController {
    pub ch_a: Rc<RefCell<EsccChannel>>,
    pub ch_b: Rc<RefCell<EsccChannel>>,
    reg_ptr_a: u8,
    reg_ptr_b: u8,
}

impl EsccController {
    pub fn new(backend_a: Box<dyn SerialBackend>, backend_b: Box<dyn SerialBackend>) -> EsccPtr {
        Rc::new(RefCell::new(EsccController {
            ch_a: Rc::new(RefCell::new(EsccChannel::new("ESCC_A", backend_a))),
            ch_b: Rc::new(RefCell::new(EsccChannel::new("ESCC_B", backend_b))),
            reg_ptr_a: 0,
            reg_ptr_b: 0,
        }))
    }

    pub fn connect_int_ctrl(&mut self, ctrl: IntCtrlPtr) {
        let irq_a = ctrl.borrow_mut().register_dev_int(IntSrc::Scca);
        let irq_b = ctrl.borrow_mut().register_dev_int(IntSrc::Sccb);
        self.ch_a.borrow_mut().connect_int_ctrl(Rc::clone(&ctrl), irq_a);
        self.ch_b.borrow_mut().connect_int_ctrl(ctrl, irq_b);
    }

    pub fn read(&mut self, reg: u32) -> u8 {
        match reg {
            ESCC_PORT_B_CMD => {
                let ptr = self.reg_ptr_b;
                self.reg_ptr_b = 0;
                self.ch_b.borrow_mut().read_reg(ptr)
            }
            ESCC_PORT_A_CMD => {
                let ptr = self.reg_ptr_a;
                self.reg_ptr_a = 0;
                self.ch_a.borrow_mut().read_reg(ptr)
            }
            ESCC_PORT_B_DATA => self.ch_b.borrow_mut().read_reg(8),
            ESCC_PORT_A_DATA => self.ch_a.borrow_mut().read_reg(8),
            ESCC_ENH_REG_B | ESCC_ENH_REG_A => 0,
            _ => 0,
        }
    }

    pub fn write(&mut self, reg: u32, value: u8) {
        match reg {
            ESCC_PORT_B_CMD => {
                if self.reg_ptr_b == 0 {
                    // the pointer write: low register number plus point-high
                    self.reg_ptr_b = (value & 7) | if value >> 3 == 1 { 8 } else { 0 };
                    if value >> 3 > 1 {
                        self.ch_b.borrow_mut().write_reg(0, value);
                    }
                } else {
                    let ptr = self.reg_ptr_b;
                    self.reg_ptr_b = 0;
                    self.ch_b.borrow_mut().write_reg(ptr, value);
                }
            }
            ESCC_PORT_A_CMD => {
                if self.reg_ptr_a == 0 {
                    self.reg_ptr_a = (value & 7) | if value >> 3 == 1 { 8 } else { 0 };
                    if value >> 3 > 1 {
                        self.ch_a.borrow_mut().write_reg(0, value);
                    }
                } else {
                    let ptr = self.reg_ptr_a;
                    self.reg_ptr_a = 0;
                    self.ch_a.borrow_mut().write_reg(ptr, value);
                }
            }
            ESCC_PORT_B_DATA => self.ch_b.borrow_mut().send_byte(value),
            ESCC_PORT_A_DATA => self.ch_a.borrow_mut().send_byte(value),
            ESCC_ENH_REG_B | ESCC_ENH_REG_A => {}
            _ => {}
        }
    }

    pub fn poll_backends(&mut self) {
        self.ch_a.borrow_mut().poll_backend();
        self.ch_b.borrow_mut().poll_backend();
    }
}
