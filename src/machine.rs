// The machine: a named registry owning the device graph, the shared
// plumbing every device hangs off (address map, timer queue, interrupt
// pin), the configuration property model, and the host event fan-out.
// Construction runs leaves-first; cross-references resolve in a post-init
// pass against the registry instead of devices owning each other.

use crate::adb::{AdbBus, AdbBusPtr};
use crate::dbdma::DmaChannelPtr;
use crate::interrupts::{IntCtrlPtr, IntPin};
use crate::memory::{AddressMap, BytesPtr, MapPtr, MmioPtr};
use crate::nvram::NVramPtr;
use crate::timers::{TimerManager, TimersPtr};
use crate::viacuda::ViaCudaPtr;
use anyhow::{anyhow, bail, Result};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum PowerOffReason {
    Restart,
    ShutDown,
    Quit,
}

/// Machine power flag, observed by the run loop between steps. Shutdown
/// is a normal return from the loop, not a process exit.
#[derive(Clone)]
pub struct PowerCtl {
    on: Rc<Cell<bool>>,
    reason: Rc<Cell<PowerOffReason>>,
}

impl PowerCtl {
    pub fn new() -> Self {
        PowerCtl { on: Rc::new(Cell::new(true)), reason: Rc::new(Cell::new(PowerOffReason::Quit)) }
    }

    pub fn is_on(&self) -> bool {
        self.on.get()
    }

    pub fn request_off(&self, reason: PowerOffReason) {
        self.reason.set(reason);
        self.on.set(false);
    }

    pub fn power_on(&self) {
        self.on.set(true);
    }

    pub fn off_reason(&self) -> PowerOffReason {
        self.reason.get()
    }
}

// ------------------------------------------------------------- properties

#[derive(Clone, Debug)]
pub enum Property {
    Str { value: String, allowed: &'static [&'static str] },
    Int { value: u32, min: u32, max: u32 },
    Bin { value: bool },
}

pub struct MachineSettings {
    props: HashMap<String, Property>,
}

impl MachineSettings {
    pub fn new() -> Self {
        MachineSettings { props: HashMap::new() }
    }

    pub fn define(&mut self, name: &str, prop: Property) {
        self.props.insert(name.to_string(), prop);
    }

    pub fn define_int(&mut self, name: &str, value: u32, min: u32, max: u32) {
        self.define(name, Property::Int { value, min, max });
    }

    pub fn define_str(&mut self, name: &str, value: &str, allowed: &'static [&'static str]) {
        self.define(name, Property::Str { value: value.to_string(), allowed });
    }

    pub fn define_bin(&mut self, name: &str, value: bool) {
        self.define(name, Property::Bin { value });
    }

    /// Apply one key=value override from the command line.
    pub fn set(&mut self, name: &str, text: &str) -> Result<()> {
        let prop = self
            .props
            .get_mut(name)
            .ok_or_else(|| anyhow!("unknown machine property '{}'", name))?;
        match prop {
            Property::Str { value, allowed } => {
                if !allowed.is_empty() && !allowed.iter().any(|a| *a == text) {
                    bail!("property '{}' does not accept '{}' (allowed: {:?})", name, text, allowed);
                }
                *value = text.to_string();
            }
            Property::Int { value, min, max } => {
                let n = parse_u32(text).ok_or_else(|| anyhow!("property '{}': bad integer '{}'", name, text))?;
                if n < *min || n > *max {
                    bail!("property '{}' out of range {}..{}", name, min, max);
                }
                *value = n;
            }
            Property::Bin { value } => {
                *value = match text {
                    "1" | "on" | "true" => true,
                    "0" | "off" | "false" => false,
                    _ => bail!("property '{}': bad switch '{}'", name, text),
                };
            }
        }
        Ok(())
    }

    pub fn get_str(&self, name: &str) -> String {
        match self.props.get(name) {
            Some(Property::Str { value, .. }) => value.clone(),
            _ => panic!("Undefined string property '{}'!", name),
        }
    }

    pub fn get_int(&self, name: &str) -> u32 {
        match self.props.get(name) {
            Some(Property::Int { value, .. }) => *value,
            _ => panic!("Undefined integer property '{}'!", name),
        }
    }

    pub fn get_bin(&self, name: &str) -> bool {
        match self.props.get(name) {
            Some(Property::Bin { value }) => *value,
            _ => panic!("Undefined binary property '{}'!", name),
        }
    }
}

fn parse_u32(text: &str) -> Option<u32> {
    if let Some(hex) = text.strip_prefix("0x") {
        u32::from_str_radix(hex, 16).ok()
    } else {
        text.parse().ok()
    }
}

// ------------------------------------------------------------ host events

pub struct KeyEvent {
    pub code: u8,
    pub pressed: bool,
}

pub struct MouseEvent {
    pub dx: i8,
    pub dy: i8,
    pub button: bool,
}

/// Listener lists for host input plus the post-processing hooks that run
/// once the event queue drains (Cuda autopoll lives there). Emission is a
/// synchronous walk in registration order.
pub struct EventManager {
    kbd_listeners: Vec<Rc<dyn Fn(&KeyEvent)>>,
    mouse_listeners: Vec<Rc<dyn Fn(&MouseEvent)>>,
    post_handlers: Vec<Rc<dyn Fn()>>,
}

impl EventManager {
    pub fn new() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(EventManager {
            kbd_listeners: Vec::new(),
            mouse_listeners: Vec::new(),
            post_handlers: Vec::new(),
        }))
    }

    pub fn add_kbd_listener(&mut self, listener: Rc<dyn Fn(&KeyEvent)>) {
        self.kbd_listeners.push(listener);
    }

    pub fn add_mouse_listener(&mut self, listener: Rc<dyn Fn(&MouseEvent)>) {
        self.mouse_listeners.push(listener);
    }

    pub fn add_post_handler(&mut self, handler: Rc<dyn Fn()>) {
        self.post_handlers.push(handler);
    }

    pub fn post_key(&self, event: KeyEvent) {
        for l in &self.kbd_listeners {
            l(&event);
        }
    }

    pub fn post_mouse(&self, event: MouseEvent) {
        for l in &self.mouse_listeners {
            l(&event);
        }
    }

    pub fn run_post_handlers(&self) {
        for h in &self.post_handlers {
            h();
        }
    }
}

pub type EventMgrPtr = Rc<RefCell<EventManager>>;

// -------------------------------------------------------------- registry

/// Closed set of device categories the registry can hand back. Borrowed
/// references come out of here during post-init instead of devices
/// holding owning pointers at each other.
#[derive(Clone)]
pub enum DeviceObj {
    Mmio(MmioPtr),
    Dma(DmaChannelPtr),
    IntCtrl(IntCtrlPtr),
    Via(ViaCudaPtr),
}

pub struct Machine {
    pub name: &'static str,
    pub map: MapPtr,
    pub timers: TimersPtr,
    pub int_pin: IntPin,
    pub power: PowerCtl,
    pub event_mgr: EventMgrPtr,
    pub adb_bus: AdbBusPtr,
    pub int_ctrl: Option<IntCtrlPtr>,
    pub nvram: Option<NVramPtr>,
    pub rom: Option<BytesPtr>,
    pub pvr: u32,
    devices: Vec<(String, DeviceObj)>,
}

impl Machine {
    pub fn new(name: &'static str) -> Self {
        Machine {
            name,
            map: Rc::new(RefCell::new(AddressMap::new())),
            timers: Rc::new(RefCell::new(TimerManager::new())),
            int_pin: IntPin::new(),
            power: PowerCtl::new(),
            event_mgr: EventManager::new(),
            adb_bus: AdbBus::new(),
            int_ctrl: None,
            nvram: None,
            rom: None,
            pvr: 0x0008_0200, // MPC750
            devices: Vec::new(),
        }
    }

    pub fn add_device(&mut self, name: &str, obj: DeviceObj) {
        if self.devices.iter().any(|d| d.0 == name) {
            panic!("Duplicate device name '{}'!", name);
        }
        self.devices.push((name.to_string(), obj));
    }

    pub fn lookup(&self, name: &str) -> Option<DeviceObj> {
        self.devices.iter().find(|d| d.0 == name).map(|d| d.1.clone())
    }

    pub fn dma_channel(&self, name: &str) -> Option<DmaChannelPtr> {
        match self.lookup(name) {
            Some(DeviceObj::Dma(ch)) => Some(ch),
            _ => None,
        }
    }

    pub fn via_cuda(&self) -> Option<ViaCudaPtr> {
        self.devices.iter().find_map(|d| match &d.1 {
            DeviceObj::Via(v) => Some(Rc::clone(v)),
            _ => None,
        })
    }

    pub fn int_ctrl(&self) -> IntCtrlPtr {
        self.int_ctrl.clone().expect("Machine has no interrupt controller!")
    }

    /// Drain host events and give the post handlers (autopoll and
    /// friends) a chance to run. Called on a cyclic timer by the run
    /// loop, never inside an instruction.
    pub fn pump_events(&self) {
        self.event_mgr.borrow().run_post_handlers();
    }
}
