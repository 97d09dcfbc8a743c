// Interrupt plumbing shared by every I/O controller flavor: the closed set
// of source ids, the controller contract, and the wire that ends at the
// CPU's external interrupt input.

use std::cell::Cell;
use std::cell::RefCell;
use std::rc::Rc;

/// Closed set of interrupt sources. Each controller maps these to its own
/// bit positions; the mapping is local to the controller.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum IntSrc {
    ViaCuda,
    Via2,
    Scca,
    Sccb,
    Ethernet,
    ScsiMesh,
    ScsiCurio,
    Davbus,
    Swim3,
    Nmi,
    Ide0,
    Ide1,
    Vbl,
    ControlVideo,
    Slot0,
    Slot1,
    Slot2,
    Slot3,
    Slot4,
    Slot5,
    Bandit1,
    PciA,
    PciB,
    PciC,
    PciD,
    PciE,
    PciF,
    DmaScsiCurio,
    DmaScsiMesh,
    DmaSwim3,
    DmaIde0,
    DmaIde1,
    DmaEthernetTx,
    DmaEthernetRx,
    DmaSccaTx,
    DmaSccaRx,
    DmaSccbTx,
    DmaSccbRx,
    DmaDavbusTx,
    DmaDavbusRx,
}

/// Contract between devices and an interrupt controller. Registration
/// returns an opaque irq id (a bitmask local to the controller); ack calls
/// report level changes on the device's interrupt line.
pub trait InterruptCtrl {
    fn register_dev_int(&mut self, src: IntSrc) -> u64;
    fn register_dma_int(&mut self, src: IntSrc) -> u64;
    fn ack_int(&mut self, irq_id: u64, level: u8);
    fn ack_dma_int(&mut self, irq_id: u64, level: u8);
}

pub type IntCtrlPtr = Rc<RefCell<dyn InterruptCtrl>>;

/// The CPU's external interrupt input. Controllers hold a clone and drive
/// it; the interpreter samples it between instructions.
#[derive(Clone)]
pub struct IntPin {
    line: Rc<Cell<bool>>,
}

impl IntPin {
    pub fn new() -> Self {
        IntPin { line: Rc::new(Cell::new(false)) }
    }

    pub fn set(&self, level: bool) {
        self.line.set(level);
    }

    pub fn is_asserted(&self) -> bool {
        self.line.get()
    }
}
