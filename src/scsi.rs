// SCSI controller cells: MESH (fast internal bus) and the 53C94 half of
// Curio (slow external bus). Both are modeled at the register/sequencer
// level: commands run, phase and interrupt bits latch, and data moves
// through the DBDMA endpoints. Target devices hang off a tiny bus; with
// no targets configured every selection times out, which is exactly what
// a bare machine reports.

use crate::dbdma::DmaDevice;
use crate::interrupts::IntCtrlPtr;
use log::{debug, warn};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// A target that answers selection and executes command descriptor
/// blocks. Disk images are the frontend's business; this trait is the
/// transport seam.
pub trait ScsiTarget {
    fn id(&self) -> u8;
    /// Execute a CDB; returns (data-in bytes, status byte).
    fn execute(&mut self, cdb: &[u8], data_out: &[u8]) -> (Vec<u8>, u8);
}

pub struct ScsiBus {
    targets: Vec<Rc<RefCell<dyn ScsiTarget>>>,
}

pub type ScsiBusPtr = Rc<RefCell<ScsiBus>>;

impl ScsiBus {
    pub fn new() -> ScsiBusPtr {
        Rc::new(RefCell::new(ScsiBus { targets: Vec::new() }))
    }

    pub fn attach(&mut self, target: Rc<RefCell<dyn ScsiTarget>>) {
        self.targets.push(target);
    }

    pub fn target_at(&self, id: u8) -> Option<Rc<RefCell<dyn ScsiTarget>>> {
        self.targets.iter().find(|t| t.borrow().id() == id).cloned()
    }
}

// ------------------------------------------------------------------ MESH

// Register indices, one per 16-byte stride.
const MESH_XFER_COUNT0: u32 = 0x0;
const MESH_XFER_COUNT1: u32 = 0x1;
const MESH_FIFO: u32 = 0x2;
const MESH_SEQUENCE: u32 = 0x3;
const MESH_BUS_STATUS0: u32 = 0x4;
const MESH_BUS_STATUS1: u32 = 0x5;
const MESH_FIFO_COUNT: u32 = 0x6;
const MESH_EXCEPTION: u32 = 0x7;
const MESH_ERROR: u32 = 0x8;
const MESH_INT_MASK: u32 = 0x9;
const MESH_INTERRUPT: u32 = 0xA;
const MESH_SOURCE_ID: u32 = 0xB;
const MESH_DEST_ID: u32 = 0xC;
const MESH_SYNC_PARAMS: u32 = 0xD;
const MESH_MESH_ID: u32 = 0xE;
const MESH_SEL_TIMEOUT: u32 = 0xF;

// Sequencer commands.
const SEQ_CMD_ARBITRATE: u8 = 1;
const SEQ_CMD_SELECT: u8 = 2;
const SEQ_CMD_COMMAND: u8 = 3;
const SEQ_CMD_STATUS: u8 = 4;
const SEQ_CMD_DATA_OUT: u8 = 5;
const SEQ_CMD_DATA_IN: u8 = 6;
const SEQ_CMD_MSG_OUT: u8 = 7;
const SEQ_CMD_MSG_IN: u8 = 8;
const SEQ_CMD_BUS_FREE: u8 = 9;
const SEQ_CMD_ENA_RESEL: u8 = 0xC;
const SEQ_CMD_DIS_RESEL: u8 = 0xD;
const SEQ_CMD_RESET_MESH: u8 = 0xE;
const SEQ_CMD_FLUSH_FIFO: u8 = 0xF;

// Interrupt bits.
const INT_CMD_DONE: u8 = 0x01;
const INT_EXCEPTION: u8 = 0x02;
const INT_ERROR: u8 = 0x04;

// Exception bits.
const EXC_SEL_TIMEOUT: u8 = 0x01;

const MESH_ID_VALUE: u8 = 0xE2; // MESH ASIC revision id

pub type MeshPtr = Rc<RefCell<MeshController>>;

pub struct MeshController {
    bus: ScsiBusPtr,
    int_ctrl: Option<IntCtrlPtr>,
    irq_id: u64,

    xfer_count: u16,
    fifo: VecDeque<u8>,
    sequence: u8,
    bus_status0: u8,
    bus_status1: u8,
    exception: u8,
    error: u8,
    int_mask: u8,
    int_flags: u8,
    source_id: u8,
    dest_id: u8,
    sync_params: u8,
    sel_timeout: u8,

    selected: Option<Rc<RefCell<dyn ScsiTarget>>>,
    data_in: VecDeque<u8>,
    data_out: Vec<u8>,
    status_byte: u8,
}

impl MeshController {
    pub fn new(bus: ScsiBusPtr) -> MeshPtr {
        Rc::new(RefCell::new(MeshController {
            bus,
            int_ctrl: None,
            irq_id: 0,
            xfer_count: 0,
            fifo: VecDeque::new(),
            sequence: 0,
            bus_status0: 0,
            bus_status1: 0,
            exception: 0,
            error: 0,
            int_mask: 0,
            int_flags: 0,
            source_id: 7,
            dest_id: 0,
            sync_params: 2,
            sel_timeout: 0,
            selected: None,
            data_in: VecDeque::new(),
            data_out: Vec::new(),
            status_byte: 0,
        }))
    }

    pub fn connect_int_ctrl(&mut self, ctrl: IntCtrlPtr, irq_id: u64) {
        self.int_ctrl = Some(ctrl);
        self.irq_id = irq_id;
    }

    fn update_irq(&mut self) {
        let active = self.int_flags & self.int_mask != 0;
        if let Some(ctrl) = &self.int_ctrl {
            ctrl.borrow_mut().ack_int(self.irq_id, active as u8);
        }
    }

    fn finish_cmd(&mut self, int_bits: u8) {
        self.int_flags |= int_bits;
        self.update_irq();
    }

    pub fn read(&mut self, reg: u32) -> u8 {
        match reg {
            MESH_XFER_COUNT0 => self.xfer_count as u8,
            MESH_XFER_COUNT1 => (self.xfer_count >> 8) as u8,
            MESH_FIFO => {
                let v = self.fifo.pop_front().unwrap_or(0);
                v
            }
            MESH_SEQUENCE => self.sequence,
            MESH_BUS_STATUS0 => self.bus_status0,
            MESH_BUS_STATUS1 => self.bus_status1,
            MESH_FIFO_COUNT => self.fifo.len().min(16) as u8,
            MESH_EXCEPTION => self.exception,
            MESH_ERROR => self.error,
            MESH_INT_MASK => self.int_mask,
            MESH_INTERRUPT => self.int_flags,
            MESH_SOURCE_ID => self.source_id,
            MESH_DEST_ID => self.dest_id,
            MESH_SYNC_PARAMS => self.sync_params,
            MESH_MESH_ID => MESH_ID_VALUE,
            MESH_SEL_TIMEOUT => self.sel_timeout,
            _ => 0,
        }
    }

    pub fn write(&mut self, reg: u32, value: u8) {
        match reg {
            MESH_XFER_COUNT0 => self.xfer_count = (self.xfer_count & 0xFF00) | value as u16,
            MESH_XFER_COUNT1 => self.xfer_count = (self.xfer_count & 0xFF) | ((value as u16) << 8),
            MESH_FIFO => self.fifo.push_back(value),
            MESH_SEQUENCE => {
                self.sequence = value;
                self.run_sequence(value & 0xF);
            }
            MESH_INT_MASK => {
                self.int_mask = value;
                self.update_irq();
            }
            MESH_INTERRUPT => {
                // write-one-to-clear
                self.int_flags &= !value;
                self.update_irq();
            }
            MESH_SOURCE_ID => self.source_id = value & 7,
            MESH_DEST_ID => self.dest_id = value & 7,
            MESH_SYNC_PARAMS => self.sync_params = value,
            MESH_SEL_TIMEOUT => self.sel_timeout = value,
            _ => debug!("MESH: write 0x{:02X} to register {}", value, reg),
        }
    }

    fn run_sequence(&mut self, cmd: u8) {
        match cmd {
            SEQ_CMD_ARBITRATE => {
                self.bus_status0 = 0x40; // won arbitration (BSY)
                self.finish_cmd(INT_CMD_DONE);
            }
            SEQ_CMD_SELECT => {
                let target = self.bus.borrow().target_at(self.dest_id);
                match target {
                    Some(t) => {
                        self.selected = Some(t);
                        self.exception = 0;
                        self.finish_cmd(INT_CMD_DONE);
                    }
                    None => {
                        self.selected = None;
                        self.exception |= EXC_SEL_TIMEOUT;
                        self.finish_cmd(INT_CMD_DONE | INT_EXCEPTION);
                    }
                }
            }
            SEQ_CMD_COMMAND => {
                let cdb: Vec<u8> = self.fifo.drain(..).collect();
                if let Some(target) = self.selected.clone() {
                    let data_out = std::mem::replace(&mut self.data_out, Vec::new());
                    let (data, status) = target.borrow_mut().execute(&cdb, &data_out);
                    self.data_in = data.into();
                    self.status_byte = status;
                } else {
                    warn!("MESH: command issued with no selected target");
                }
                self.finish_cmd(INT_CMD_DONE);
            }
            SEQ_CMD_STATUS => {
                self.fifo.push_back(self.status_byte);
                self.finish_cmd(INT_CMD_DONE);
            }
            SEQ_CMD_DATA_OUT | SEQ_CMD_DATA_IN => {
                // actual byte movement happens through the DMA endpoint
                self.finish_cmd(INT_CMD_DONE);
            }
            SEQ_CMD_MSG_OUT => {
                self.fifo.clear();
                self.finish_cmd(INT_CMD_DONE);
            }
            SEQ_CMD_MSG_IN => {
                self.fifo.push_back(0); // COMMAND COMPLETE
                self.finish_cmd(INT_CMD_DONE);
            }
            SEQ_CMD_BUS_FREE => {
                self.selected = None;
                self.bus_status0 = 0;
                self.finish_cmd(INT_CMD_DONE);
            }
            SEQ_CMD_ENA_RESEL | SEQ_CMD_DIS_RESEL => {
                self.finish_cmd(INT_CMD_DONE);
            }
            SEQ_CMD_RESET_MESH => {
                self.fifo.clear();
                self.exception = 0;
                self.error = 0;
                self.int_flags = 0;
                self.bus_status0 = 0;
                self.update_irq();
                self.finish_cmd(INT_CMD_DONE);
            }
            SEQ_CMD_FLUSH_FIFO => {
                self.fifo.clear();
                self.finish_cmd(INT_CMD_DONE);
            }
            other => {
                warn!("MESH: unsupported sequencer command {}", other);
                self.error |= 0x80;
                self.finish_cmd(INT_ERROR);
            }
        }
    }
}

// DBDMA endpoint: xfer_from_device / xfer_to_device in register terms.
impl DmaDevice for MeshController {
    fn push_data(&mut self, data: &[u8]) -> u8 {
        self.data_out.extend_from_slice(data);
        self.xfer_count = self.xfer_count.wrapping_sub(data.len() as u16);
        self.status_byte
    }

    fn pull_data(&mut self, req_len: usize, out: &mut Vec<u8>) -> u8 {
        for _ in 0..req_len {
            match self.data_in.pop_front() {
                Some(b) => out.push(b),
                None => break,
            }
        }
        self.xfer_count = self.xfer_count.wrapping_sub(out.len() as u16);
        if self.data_in.is_empty() {
            self.finish_cmd(INT_CMD_DONE);
        }
        self.status_byte
    }
}

// ------------------------------------------------------------- 53C94 cell

// Register indices.
const C94_XFER_CNT_LO: u32 = 0x0;
const C94_XFER_CNT_HI: u32 = 0x1;
const C94_FIFO: u32 = 0x2;
const C94_COMMAND: u32 = 0x3;
const C94_STATUS: u32 = 0x4; // read; write = dest bus id
const C94_INT_STATUS: u32 = 0x5; // read; write = sel timeout
const C94_SEQ_STEP: u32 = 0x6; // read; write = sync period
const C94_FIFO_FLAGS: u32 = 0x7; // read; write = sync offset
const C94_CONFIG1: u32 = 0x8;
const C94_CLOCK_FACTOR: u32 = 0x9;
const C94_CONFIG2: u32 = 0xB;
const C94_CONFIG3: u32 = 0xC;

// Commands (mode bits stripped).
const C94_CMD_NOP: u8 = 0x00;
const C94_CMD_CLEAR_FIFO: u8 = 0x01;
const C94_CMD_RESET_DEVICE: u8 = 0x02;
const C94_CMD_RESET_BUS: u8 = 0x03;
const C94_CMD_XFER: u8 = 0x10;
const C94_CMD_ICCS: u8 = 0x11;
const C94_CMD_MSG_ACCEPTED: u8 = 0x12;
const C94_CMD_SELECT_NO_ATN: u8 = 0x41;
const C94_CMD_SELECT_WITH_ATN: u8 = 0x42;
const C94_CMD_ENA_SEL_RESEL: u8 = 0x44;

// Interrupt status bits.
const C94_INT_SEL: u8 = 0x01;
const C94_INT_SEL_ATN: u8 = 0x02;
const C94_INT_RESEL: u8 = 0x04;
const C94_INT_FUNC_DONE: u8 = 0x08;
const C94_INT_BUS_SERVICE: u8 = 0x10;
const C94_INT_DISCONNECT: u8 = 0x20;
const C94_INT_SCSI_RST: u8 = 0x80;

pub type Sc53C94Ptr = Rc<RefCell<Sc53C94>>;

pub struct Sc53C94 {
    bus: ScsiBusPtr,
    int_ctrl: Option<IntCtrlPtr>,
    irq_id: u64,

    xfer_count: u16,
    fifo: VecDeque<u8>,
    command: u8,
    status: u8,
    int_status: u8,
    seq_step: u8,
    config: [u8; 4],
    clock_factor: u8,
    dest_id: u8,
    sel_timeout: u8,

    selected: Option<Rc<RefCell<dyn ScsiTarget>>>,
    data_in: VecDeque<u8>,
    data_out: Vec<u8>,
    status_byte: u8,
}

impl Sc53C94 {
    pub fn new(bus: ScsiBusPtr) -> Sc53C94Ptr {
        Rc::new(RefCell::new(Sc53C94 {
            bus,
            int_ctrl: None,
            irq_id: 0,
            xfer_count: 0,
            fifo: VecDeque::new(),
            command: 0,
            status: 0,
            int_status: 0,
            seq_step: 0,
            config: [0; 4],
            clock_factor: 0,
            dest_id: 0,
            sel_timeout: 0,
            selected: None,
            data_in: VecDeque::new(),
            data_out: Vec::new(),
            status_byte: 0,
        }))
    }

    pub fn connect_int_ctrl(&mut self, ctrl: IntCtrlPtr, irq_id: u64) {
        self.int_ctrl = Some(ctrl);
        self.irq_id = irq_id;
    }

    fn raise_int(&mut self, bits: u8) {
        self.int_status |= bits;
        self.status |= 0x80; // INT pin reflected in the status register
        if let Some(ctrl) = &self.int_ctrl {
            ctrl.borrow_mut().ack_int(self.irq_id, 1);
        }
    }

    fn clear_int(&mut self) {
        self.int_status = 0;
        self.status &= !0x80;
        if let Some(ctrl) = &self.int_ctrl {
            ctrl.borrow_mut().ack_int(self.irq_id, 0);
        }
    }

    pub fn read(&mut self, reg: u32) -> u8 {
        match reg {
            C94_XFER_CNT_LO => self.xfer_count as u8,
            C94_XFER_CNT_HI => (self.xfer_count >> 8) as u8,
            C94_FIFO => self.fifo.pop_front().unwrap_or(0),
            C94_COMMAND => self.command,
            C94_STATUS => self.status,
            C94_INT_STATUS => {
                // reading interrupt status releases the interrupt
                let value = self.int_status;
                self.clear_int();
                value
            }
            C94_SEQ_STEP => self.seq_step,
            C94_FIFO_FLAGS => self.fifo.len().min(16) as u8,
            C94_CONFIG1 => self.config[0],
            C94_CONFIG2 => self.config[1],
            C94_CONFIG3 => self.config[2],
            _ => 0,
        }
    }

    pub fn write(&mut self, reg: u32, value: u8) {
        match reg {
            C94_XFER_CNT_LO => self.xfer_count = (self.xfer_count & 0xFF00) | value as u16,
            C94_XFER_CNT_HI => self.xfer_count = (self.xfer_count & 0xFF) | ((value as u16) << 8),
            C94_FIFO => self.fifo.push_back(value),
            C94_COMMAND => {
                self.command = value;
                self.run_command(value & 0x7F);
            }
            C94_STATUS => self.dest_id = value & 7,
            C94_INT_STATUS => self.sel_timeout = value,
            C94_SEQ_STEP => {} // sync period
            C94_FIFO_FLAGS => {} // sync offset
            C94_CONFIG1 => self.config[0] = value,
            C94_CLOCK_FACTOR => self.clock_factor = value,
            C94_CONFIG2 => self.config[1] = value,
            C94_CONFIG3 => self.config[2] = value,
            _ => debug!("Sc53C94: write 0x{:02X} to register {}", value, reg),
        }
    }

    /// Pseudo-DMA window used by AMIC: byte-wide data phase access
    /// without programmed FIFO reads.
    pub fn pseudo_dma_read(&mut self) -> u8 {
        let value = self.data_in.pop_front().unwrap_or(0);
        if self.data_in.is_empty() {
            self.raise_int(C94_INT_BUS_SERVICE);
        }
        value
    }

    pub fn pseudo_dma_write(&mut self, value: u8) {
        self.data_out.push(value);
    }

    fn run_command(&mut self, cmd: u8) {
        match cmd {
            C94_CMD_NOP => {}
            C94_CMD_CLEAR_FIFO => self.fifo.clear(),
            C94_CMD_RESET_DEVICE => {
                self.fifo.clear();
                self.xfer_count = 0;
                self.clear_int();
            }
            C94_CMD_RESET_BUS => {
                self.selected = None;
                if self.config[0] & 0x40 == 0 {
                    self.raise_int(C94_INT_SCSI_RST);
                }
            }
            C94_CMD_SELECT_NO_ATN | C94_CMD_SELECT_WITH_ATN => {
                self.seq_step = 0;
                let target = self.bus.borrow().target_at(self.dest_id);
                match target {
                    Some(t) => {
                        self.selected = Some(t);
                        let cdb: Vec<u8> = self.fifo.drain(..).collect();
                        let data_out = std::mem::replace(&mut self.data_out, Vec::new());
                        if let Some(target) = self.selected.clone() {
                            let (data, status) = target.borrow_mut().execute(&cdb, &data_out);
                            self.data_in = data.into();
                            self.status_byte = status;
                        }
                        self.seq_step = 4; // went all the way to command phase
                        self.raise_int(C94_INT_FUNC_DONE | C94_INT_BUS_SERVICE);
                    }
                    None => {
                        // selection timeout: disconnected interrupt
                        self.raise_int(C94_INT_DISCONNECT);
                    }
                }
            }
            C94_CMD_XFER => {
                self.raise_int(C94_INT_FUNC_DONE);
            }
            C94_CMD_ICCS => {
                // initiator command complete: status + message bytes
                self.fifo.push_back(self.status_byte);
                self.fifo.push_back(0); // COMMAND COMPLETE message
                self.raise_int(C94_INT_FUNC_DONE);
            }
            C94_CMD_MSG_ACCEPTED => {
                self.selected = None;
                self.raise_int(C94_INT_DISCONNECT);
            }
            C94_CMD_ENA_SEL_RESEL => {}
            other => {
                warn!("Sc53C94: unsupported command 0x{:02X}", other);
            }
        }
    }
}

impl DmaDevice for Sc53C94 {
    fn push_data(&mut self, data: &[u8]) -> u8 {
        self.data_out.extend_from_slice(data);
        self.xfer_count = self.xfer_count.wrapping_sub(data.len() as u16);
        self.status_byte
    }

    fn pull_data(&mut self, req_len: usize, out: &mut Vec<u8>) -> u8 {
        for _ in 0..req_len {
            match self.data_in.pop_front() {
                Some(b) => out.push(b),
                None => break,
            }
        }
        self.xfer_count = self.xfer_count.wrapping_sub(out.len() as u16);
        if self.data_in.is_empty() {
            self.raise_int(C94_INT_BUS_SERVICE);
        }
        self.status_byte
    }
}
