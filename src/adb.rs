// Apple Desktop Bus host and the two stock input devices. The bus decodes
// Talk/Listen/Flush/SendReset command bytes on behalf of Cuda and collects
// device register data into an output buffer; autopolling asks every
// device whether it has fresh input pending.

use log::{debug, info};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

pub const ADB_STAT_OK: u8 = 0x00;
pub const ADB_STAT_TIMEOUT: u8 = 0x02;
pub const ADB_STAT_AUTOPOLL: u8 = 0x40;

pub type AdbBusPtr = Rc<RefCell<AdbBus>>;
pub type AdbDevicePtr = Rc<RefCell<dyn AdbDevice>>;

pub trait AdbDevice {
    fn address(&self) -> u8;
    fn set_address(&mut self, addr: u8);
    /// Register contents for a Talk, or None for no response (bus timeout).
    fn talk(&mut self, reg: u8) -> Option<Vec<u8>>;
    fn listen(&mut self, reg: u8, data: &[u8]);
    fn reset(&mut self);
    /// True when a Talk 0 would return fresh input.
    fn has_data(&self) -> bool;
}

pub struct AdbBus {
    devices: Vec<AdbDevicePtr>,
    output: Vec<u8>,
}

impl AdbBus {
    pub fn new() -> AdbBusPtr {
        Rc::new(RefCell::new(AdbBus { devices: Vec::new(), output: Vec::new() }))
    }

    pub fn attach(&mut self, dev: AdbDevicePtr) {
        self.devices.push(dev);
    }

    pub fn output_buf(&self) -> &[u8] {
        &self.output
    }

    fn device_at(&self, addr: u8) -> Option<AdbDevicePtr> {
        self.devices.iter().find(|d| d.borrow().address() == addr).cloned()
    }

    /// Execute one ADB command byte (plus Listen payload) and fill the
    /// output buffer. Returns the status for the Cuda response header.
    pub fn process_command(&mut self, cmd: &[u8]) -> u8 {
        self.output.clear();
        if cmd.is_empty() {
            return ADB_STAT_TIMEOUT;
        }
        let byte = cmd[0];
        let addr = byte >> 4;
        match byte & 0x0C {
            0x00 => {
                // SendReset (low bits 00) or Flush (low bits 01).
                if byte & 3 == 0 {
                    debug!("ADB bus reset");
                    for dev in &self.devices {
                        dev.borrow_mut().reset();
                    }
                } else {
                    debug!("ADB flush, device {}", addr);
                }
                ADB_STAT_OK
            }
            0x08 => {
                // Listen.
                let reg = byte & 3;
                match self.device_at(addr) {
                    Some(dev) => {
                        dev.borrow_mut().listen(reg, &cmd[1..]);
                        ADB_STAT_OK
                    }
                    None => ADB_STAT_TIMEOUT,
                }
            }
            0x0C => {
                // Talk.
                let reg = byte & 3;
                match self.device_at(addr) {
                    Some(dev) => match dev.borrow_mut().talk(reg) {
                        Some(data) => {
                            self.output = data;
                            ADB_STAT_OK
                        }
                        None => ADB_STAT_TIMEOUT,
                    },
                    None => ADB_STAT_TIMEOUT,
                }
            }
            _ => ADB_STAT_TIMEOUT,
        }
    }

    /// Autopoll: Talk 0 the first device with pending input; returns the
    /// equivalent command byte, or 0 when the bus is idle.
    pub fn poll(&mut self) -> u8 {
        let pending = self.devices.iter().find(|d| d.borrow().has_data()).cloned();
        if let Some(dev) = pending {
            let addr = dev.borrow().address();
            if let Some(data) = dev.borrow_mut().talk(0) {
                self.output = data;
                return (addr << 4) | 0x0C;
            }
        }
        0
    }
}

// --------------------------------------------------------------- keyboard

pub type AdbKeyboardPtr = Rc<RefCell<AdbKeyboard>>;

pub struct AdbKeyboard {
    addr: u8,
    handler_id: u8,
    events: VecDeque<u8>, // transition codes, bit 7 = release
    modifiers: u16,
}

impl AdbKeyboard {
    pub fn new() -> AdbKeyboardPtr {
        Rc::new(RefCell::new(AdbKeyboard {
            addr: 2,
            handler_id: 2, // Apple extended keyboard
            events: VecDeque::new(),
            modifiers: 0xFFFF,
        }))
    }

    pub fn key_event(&mut self, code: u8, pressed: bool) {
        let transition = if pressed { code & 0x7F } else { code | 0x80 };
        self.events.push_back(transition);
    }
}

impl AdbDevice for AdbKeyboard {
    fn address(&self) -> u8 {
        self.addr
    }

    fn set_address(&mut self, addr: u8) {
        self.addr = addr;
    }

    fn talk(&mut self, reg: u8) -> Option<Vec<u8>> {
        match reg {
            0 => {
                let first = self.events.pop_front()?;
                let second = self.events.pop_front().unwrap_or(0xFF);
                Some(vec![first, second])
            }
            2 => Some(self.modifiers.to_be_bytes().to_vec()),
            3 => Some(vec![0x60 | (self.addr & 0xF), self.handler_id]),
            _ => None,
        }
    }

    fn listen(&mut self, reg: u8, data: &[u8]) {
        if reg == 3 && data.len() >= 2 {
            match data[1] {
                0xFE => {
                    info!("ADB keyboard moved to address {}", data[0] & 0xF);
                    self.addr = data[0] & 0xF;
                }
                0x00 => self.addr = data[0] & 0xF,
                id => self.handler_id = id,
            }
        }
    }

    fn reset(&mut self) {
        self.addr = 2;
        self.handler_id = 2;
        self.events.clear();
        self.modifiers = 0xFFFF;
    }

    fn has_data(&self) -> bool {
        !self.events.is_empty()
    }
}

// ------------------------------------------------------------------ mouse

pub type AdbMousePtr = Rc<RefCell<AdbMouse>>;

pub struct AdbMouse {
    addr: u8,
    handler_id: u8,
    events: VecDeque<(i8, i8, bool)>, // (dx, dy, button down)
}

impl AdbMouse {
    pub fn new() -> AdbMousePtr {
        Rc::new(RefCell::new(AdbMouse { addr: 3, handler_id: 1, events: VecDeque::new() }))
    }

    pub fn mouse_event(&mut self, dx: i8, dy: i8, button: bool) {
        self.events.push_back((dx, dy, button));
    }
}

impl AdbDevice for AdbMouse {
    fn address(&self) -> u8 {
        self.addr
    }

    fn set_address(&mut self, addr: u8) {
        self.addr = addr;
    }

    fn talk(&mut self, reg: u8) -> Option<Vec<u8>> {
        match reg {
            0 => {
                let (dx, dy, button) = self.events.pop_front()?;
                let byte0 = (if button { 0 } else { 0x80 }) | (dy as u8 & 0x7F);
                let byte1 = 0x80 | (dx as u8 & 0x7F);
                Some(vec![byte0, byte1])
            }
            3 => Some(vec![0x60 | (self.addr & 0xF), self.handler_id]),
            _ => None,
        }
    }

    fn listen(&mut self, reg: u8, data: &[u8]) {
        if reg == 3 && data.len() >= 2 {
            match data[1] {
                0xFE => self.addr = data[0] & 0xF,
                0x00 => self.addr = data[0] & 0xF,
                id => self.handler_id = id,
            }
        }
    }

    fn reset(&mut self) {
        self.addr = 3;
        self.handler_id = 1;
        self.events.clear();
    }

    fn has_data(&self) -> bool {
        !self.events.is_empty()
    }
}
