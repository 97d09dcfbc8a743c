// Descriptor-based DMA. Each channel owns a 256-byte register bank and
// walks a chain of 16-byte descriptors in guest memory, moving bytes
// between memory and a device endpoint. Devices either receive pushes as
// the chain executes (demand sinks/sources) or drive the cursor themselves
// through pull_data/push_data (paced endpoints like sound and serial).

use crate::fields::Size;
use crate::interrupts::IntCtrlPtr;
use crate::memory::{read_le_u16, read_le_u32, write_le_u16, MapPtr};
use log::{debug, warn};
use std::cell::RefCell;
use std::rc::Rc;

// ChannelStatus bits.
pub const CH_STAT_RUN: u16 = 0x8000;
pub const CH_STAT_PAUSE: u16 = 0x4000;
pub const CH_STAT_FLUSH: u16 = 0x2000;
pub const CH_STAT_WAKE: u16 = 0x1000;
pub const CH_STAT_DEAD: u16 = 0x0800;
pub const CH_STAT_ACTIVE: u16 = 0x0400;
pub const CH_STAT_BT: u16 = 0x0100;

// Descriptor commands.
pub const CMD_OUTPUT_MORE: u8 = 0;
pub const CMD_OUTPUT_LAST: u8 = 1;
pub const CMD_INPUT_MORE: u8 = 2;
pub const CMD_INPUT_LAST: u8 = 3;
pub const CMD_STORE_QUAD: u8 = 4;
pub const CMD_LOAD_QUAD: u8 = 5;
pub const CMD_NOP: u8 = 6;
pub const CMD_STOP: u8 = 7;

// Register offsets within the 256-byte bank.
const REG_CONTROL: u32 = 0x00;
const REG_STATUS: u32 = 0x04;
const REG_CMD_PTR_HI: u32 = 0x08;
const REG_CMD_PTR_LO: u32 = 0x0C;
const REG_INT_SELECT: u32 = 0x10;
const REG_BRANCH_SELECT: u32 = 0x14;
const REG_WAIT_SELECT: u32 = 0x18;

/// Endpoint contract. A sink consumes OUTPUT data and answers with its
/// status byte; a source fills INPUT requests.
pub trait DmaDevice {
    fn push_data(&mut self, data: &[u8]) -> u8 {
        let _ = data;
        0
    }
    fn pull_data(&mut self, req_len: usize, out: &mut Vec<u8>) -> u8 {
        let _ = (req_len, out);
        0
    }
}

pub type DmaDevicePtr = Rc<RefCell<dyn DmaDevice>>;
pub type DmaChannelPtr = Rc<RefCell<DmaChannel>>;

struct Descriptor {
    req_count: u16,
    cmd: u8,
    _key: u8,
    int_sel: u8,
    branch_sel: u8,
    wait_sel: u8,
    address: u32,
    cmd_dep: u32,
    desc_addr: u32,
    moved: u16, // bytes transferred so far
    status: u8, // device status byte for xfer_status
}

pub struct DmaChannel {
    name: &'static str,
    ch_stat: u16,
    cmd_ptr: u32,
    int_select: u32,
    branch_select: u32,
    wait_select: u32,
    map: MapPtr,
    device: Option<DmaDevicePtr>,
    demand_driven: bool, // sink/source consumes data as the chain executes
    int_ctrl: Option<IntCtrlPtr>,
    irq_id: u64,
    cur: Option<Descriptor>,
}

impl DmaChannel {
    pub fn new(name: &'static str, map: MapPtr) -> DmaChannelPtr {
        Rc::new(RefCell::new(DmaChannel {
            name,
            ch_stat: 0,
            cmd_ptr: 0,
            int_select: 0,
            branch_select: 0,
            wait_select: 0,
            map,
            device: None,
            demand_driven: false,
            int_ctrl: None,
            irq_id: 0,
            cur: None,
        }))
    }

    /// Attach the device endpoint. A demand-driven endpoint is fed/drained
    /// synchronously while the chain executes; a paced endpoint calls
    /// pull_data/push_data itself.
    pub fn connect_device(&mut self, dev: DmaDevicePtr, demand_driven: bool) {
        self.device = Some(dev);
        self.demand_driven = demand_driven;
    }

    /// Post-init wiring to the interrupt controller.
    pub fn register_dma_int(&mut self, int_ctrl: IntCtrlPtr, irq_id: u64) {
        self.int_ctrl = Some(int_ctrl);
        self.irq_id = irq_id;
    }

    pub fn is_running(&self) -> bool {
        self.ch_stat & CH_STAT_RUN != 0 && self.ch_stat & CH_STAT_DEAD == 0
    }

    pub fn is_active(&self) -> bool {
        self.ch_stat & CH_STAT_ACTIVE != 0
    }

    // DBDMA registers are little-endian on the bus.
    pub fn reg_read(&mut self, offset: u32, size: Size) -> u32 {
        let value = match offset & !3 {
            REG_CONTROL | REG_STATUS => self.ch_stat as u32,
            REG_CMD_PTR_HI => 0,
            REG_CMD_PTR_LO => self.cmd_ptr,
            REG_INT_SELECT => self.int_select,
            REG_BRANCH_SELECT => self.branch_select,
            REG_WAIT_SELECT => self.wait_select,
            _ => {
                warn!("{}: read from unimplemented DMA register 0x{:X}", self.name, offset);
                0
            }
        };
        match size {
            Size::Word => value.swap_bytes(),
            Size::Half => (value as u16).swap_bytes() as u32,
            Size::Byte => (value >> ((offset & 3) * 8)) & 0xFF,
        }
    }

    pub fn reg_write(&mut self, offset: u32, value: u32, size: Size) {
        let value = match size {
            Size::Word => value.swap_bytes(),
            Size::Half => (value as u16).swap_bytes() as u32,
            Size::Byte => value & 0xFF,
        };
        match offset & !3 {
            REG_CONTROL => self.control_write(value),
            REG_STATUS => {}
            REG_CMD_PTR_HI => {}
            REG_CMD_PTR_LO => {
                if !self.is_active() {
                    self.cmd_ptr = value & !0xF;
                }
            }
            REG_INT_SELECT => self.int_select = value & 0x00FF_00FF,
            REG_BRANCH_SELECT => self.branch_select = value & 0x00FF_00FF,
            REG_WAIT_SELECT => self.wait_select = value & 0x00FF_00FF,
            _ => {
                warn!("{}: write to unimplemented DMA register 0x{:X}", self.name, offset);
            }
        }
    }

    // ChannelControl: the upper halfword selects which status bits the
    // lower halfword overwrites.
    fn control_write(&mut self, value: u32) {
        let mask = (value >> 16) as u16;
        let new_bits = value as u16;
        let old_stat = self.ch_stat;
        let writable = CH_STAT_RUN | CH_STAT_PAUSE | CH_STAT_FLUSH | CH_STAT_WAKE | 0x00FF;
        let mask = mask & writable;
        self.ch_stat = (self.ch_stat & !mask) | (new_bits & mask);

        if self.ch_stat & CH_STAT_FLUSH != 0 {
            self.flush();
            self.ch_stat &= !CH_STAT_FLUSH;
        }
        if old_stat & CH_STAT_RUN == 0 && self.ch_stat & CH_STAT_RUN != 0 {
            self.start();
        } else if old_stat & CH_STAT_RUN != 0 && self.ch_stat & CH_STAT_RUN == 0 {
            self.abort();
        } else if self.ch_stat & CH_STAT_WAKE != 0 || old_stat & CH_STAT_PAUSE != self.ch_stat & CH_STAT_PAUSE {
            self.ch_stat &= !CH_STAT_WAKE;
            self.execute();
        }
    }

    fn start(&mut self) {
        debug!("{}: DMA start, cmd_ptr=0x{:08X}", self.name, self.cmd_ptr);
        self.ch_stat |= CH_STAT_ACTIVE;
        self.ch_stat &= !CH_STAT_DEAD;
        self.execute();
    }

    fn abort(&mut self) {
        debug!("{}: DMA abort", self.name);
        self.ch_stat &= !(CH_STAT_ACTIVE | CH_STAT_DEAD | CH_STAT_BT);
        self.cur = None;
    }

    fn flush(&mut self) {
        if let Some(desc) = self.cur.take() {
            self.retire(desc);
        }
    }

    /// A device signalled readiness on its request line; resume a chain
    /// that paused waiting for it.
    pub fn req_edge(&mut self) {
        if self.is_running() {
            self.ch_stat &= !CH_STAT_PAUSE;
            self.execute();
        }
    }

    fn fetch_descriptor(&mut self) -> Descriptor {
        let mut buf = [0u8; 16];
        self.map.borrow().read_bytes(self.cmd_ptr, &mut buf);
        Descriptor {
            req_count: read_le_u16(&buf, 0),
            int_sel: (buf[2] >> 4) & 3,
            branch_sel: (buf[2] >> 2) & 3,
            wait_sel: buf[2] & 3,
            cmd: buf[3] >> 4,
            _key: buf[3] & 7,
            address: read_le_u32(&buf, 4),
            cmd_dep: read_le_u32(&buf, 8),
            desc_addr: self.cmd_ptr,
            moved: 0,
            status: 0,
        }
    }

    /// Run the chain as far as it can go without device pacing.
    fn execute(&mut self) {
        while self.is_running() && self.is_active() && self.ch_stat & CH_STAT_PAUSE == 0 {
            let mut desc = match self.cur.take() {
                Some(d) => d,
                None => self.fetch_descriptor(),
            };
            match desc.cmd {
                CMD_STOP => {
                    self.ch_stat &= !CH_STAT_ACTIVE;
                    return;
                }
                CMD_NOP => {
                    self.retire(desc);
                }
                CMD_STORE_QUAD => {
                    let size = quad_size(desc.req_count);
                    self.map.borrow().write(desc.address, desc.cmd_dep, size);
                    desc.moved = desc.req_count;
                    self.retire(desc);
                }
                CMD_LOAD_QUAD => {
                    let size = quad_size(desc.req_count);
                    let value = self.map.borrow().read(desc.address, size);
                    desc.cmd_dep = value;
                    // Loaded quads land back in the descriptor's cmd_dep slot.
                    let mut quad = [0u8; 4];
                    quad.copy_from_slice(&value.to_le_bytes());
                    self.map.borrow().write_bytes(desc.desc_addr + 8, &quad);
                    desc.moved = desc.req_count;
                    self.retire(desc);
                }
                CMD_OUTPUT_MORE | CMD_OUTPUT_LAST => {
                    if self.demand_driven {
                        let len = desc.req_count as usize;
                        let mut data = vec![0u8; len];
                        self.map.borrow().read_bytes(desc.address, &mut data);
                        let dev = self.device.clone();
                        let status = match dev {
                            Some(dev) => dev.borrow_mut().push_data(&data),
                            None => {
                                warn!("{}: OUTPUT command with no device attached", self.name);
                                0
                            }
                        };
                        desc.moved = desc.req_count;
                        desc.status = status;
                        self.retire(desc);
                    } else {
                        // Paced endpoint: hold the descriptor for pull_data.
                        self.cur = Some(desc);
                        return;
                    }
                }
                CMD_INPUT_MORE | CMD_INPUT_LAST => {
                    if self.demand_driven {
                        let len = desc.req_count as usize;
                        let mut data = Vec::with_capacity(len);
                        let dev = self.device.clone();
                        let status = match dev {
                            Some(dev) => dev.borrow_mut().pull_data(len, &mut data),
                            None => {
                                warn!("{}: INPUT command with no device attached", self.name);
                                0
                            }
                        };
                        self.map.borrow().write_bytes(desc.address, &data);
                        desc.moved = data.len() as u16;
                        desc.status = status;
                        self.retire(desc);
                    } else {
                        self.cur = Some(desc);
                        return;
                    }
                }
                other => {
                    warn!("{}: unsupported DMA command {}", self.name, other);
                    self.ch_stat |= CH_STAT_DEAD;
                    self.ch_stat &= !CH_STAT_ACTIVE;
                    return;
                }
            }
        }
    }

    /// Device-side cursor for OUTPUT chains: drain up to req_len bytes of
    /// guest memory, retiring descriptors as they empty.
    pub fn pull_data(&mut self, req_len: usize, out: &mut Vec<u8>) -> bool {
        while out.len() < req_len && self.is_running() && self.is_active() {
            let mut desc = match self.cur.take() {
                Some(d) => d,
                None => {
                    self.execute();
                    match self.cur.take() {
                        Some(d) => d,
                        None => return false,
                    }
                }
            };
            if desc.cmd != CMD_OUTPUT_MORE && desc.cmd != CMD_OUTPUT_LAST {
                self.cur = Some(desc);
                return false;
            }
            let remaining = (desc.req_count - desc.moved) as usize;
            let take = remaining.min(req_len - out.len());
            let mut chunk = vec![0u8; take];
            self.map.borrow().read_bytes(desc.address + desc.moved as u32, &mut chunk);
            out.extend_from_slice(&chunk);
            desc.moved += take as u16;
            if desc.moved == desc.req_count {
                self.retire(desc);
            } else {
                self.cur = Some(desc);
            }
        }
        self.cur.is_some() || (self.is_running() && self.is_active())
    }

    /// Device-side cursor for INPUT chains: store incoming bytes through
    /// the descriptors. Returns the number of bytes accepted.
    pub fn push_data(&mut self, data: &[u8], dev_status: u8) -> usize {
        let mut consumed = 0;
        while consumed < data.len() && self.is_running() && self.is_active() {
            let mut desc = match self.cur.take() {
                Some(d) => d,
                None => {
                    self.execute();
                    match self.cur.take() {
                        Some(d) => d,
                        None => break,
                    }
                }
            };
            if desc.cmd != CMD_INPUT_MORE && desc.cmd != CMD_INPUT_LAST {
                self.cur = Some(desc);
                break;
            }
            let remaining = (desc.req_count - desc.moved) as usize;
            let take = remaining.min(data.len() - consumed);
            self.map
                .borrow()
                .write_bytes(desc.address + desc.moved as u32, &data[consumed..consumed + take]);
            desc.moved += take as u16;
            desc.status = dev_status;
            consumed += take;
            if desc.moved == desc.req_count {
                self.retire(desc);
            } else {
                self.cur = Some(desc);
            }
        }
        consumed
    }

    // Write back res_count/xfer_status, evaluate the condition selects and
    // advance (or branch) the command pointer.
    fn retire(&mut self, desc: Descriptor) {
        // Device status lines mirror into s0..s7.
        self.ch_stat = (self.ch_stat & 0xFF00) | desc.status as u16;
        let res_count = desc.req_count - desc.moved;
        let xfer_status = self.ch_stat | CH_STAT_ACTIVE;

        let mut tail = [0u8; 4];
        write_le_u16(&mut tail, 0, res_count);
        write_le_u16(&mut tail, 2, xfer_status);
        self.map.borrow().write_bytes(desc.desc_addr + 12, &tail);

        let branched = self.eval_cond(desc.branch_sel, self.branch_select);
        if branched {
            self.ch_stat |= CH_STAT_BT;
            self.cmd_ptr = desc.cmd_dep & !0xF;
        } else {
            self.ch_stat &= !CH_STAT_BT;
            self.cmd_ptr = desc.desc_addr.wrapping_add(16);
        }

        if self.eval_cond(desc.int_sel, self.int_select) {
            self.raise_irq();
        }
        if self.eval_cond(desc.wait_sel, self.wait_select) {
            self.ch_stat |= CH_STAT_PAUSE;
        }
    }

    // Condition field: 0 = never, 1 = if condition true, 2 = if condition
    // false, 3 = always. The condition compares masked s-bits against the
    // select register's value byte.
    fn eval_cond(&self, field: u8, select: u32) -> bool {
        match field {
            0 => false,
            3 => true,
            _ => {
                let mask = ((select >> 16) & 0xFF) as u16;
                let value = (select & 0xFF) as u16;
                let cond = (self.ch_stat & mask) == (value & mask);
                if field == 1 {
                    cond
                } else {
                    !cond
                }
            }
        }
    }

    fn raise_irq(&mut self) {
        if let Some(ctrl) = &self.int_ctrl {
            ctrl.borrow_mut().ack_dma_int(self.irq_id, 1);
            ctrl.borrow_mut().ack_dma_int(self.irq_id, 0);
        }
    }
}

fn quad_size(req_count: u16) -> Size {
    match req_count & 7 {
        1 => Size::Byte,
        2 => Size::Half,
        _ => Size::Word,
    }
}

/// Build one in-memory descriptor image the way a guest driver would.
pub fn make_descriptor(cmd: u8, req_count: u16, address: u32, cmd_dep: u32, int_sel: u8, branch_sel: u8, wait_sel: u8) -> [u8; 16] {
    let mut buf = [0u8; 16];
    buf[0] = req_count as u8;
    buf[1] = (req_count >> 8) as u8;
    buf[2] = ((int_sel & 3) << 4) | ((branch_sel & 3) << 2) | (wait_sel & 3);
    buf[3] = cmd << 4;
    buf[4..8].copy_from_slice(&address.to_le_bytes());
    buf[8..12].copy_from_slice(&cmd_dep.to_le_bytes());
    buf
}
