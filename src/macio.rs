// MacIO ASIC family: Grand Central (7500-class) and the O'Hare/Heathrow
// pair (Beige G3 class). Each chip is one MMIO region decoding subdevice
// cells by offset, a DBDMA register window, and an interrupt controller.
// The controllers share one latching core; they differ in register width
// (32 vs 64 bits) and in how sources map onto bit positions.

use crate::dbdma::DmaChannelPtr;
use crate::escc::{EsccPtr, COMPAT_TO_MACRISC};
use crate::ethernet::{BigMacPtr, MacePtr};
use crate::fields::Size;
use crate::awacs::AwacsPtr;
use crate::interrupts::{IntCtrlPtr, IntPin, IntSrc, InterruptCtrl};
use crate::memory::MmioDevice;
use crate::nvram::NVramPtr;
use crate::scsi::{MeshPtr, Sc53C94Ptr};
use crate::swim3::Swim3Ptr;
use crate::viacuda::ViaCudaPtr;
use log::warn;
use std::cell::RefCell;
use std::rc::Rc;

pub const MACIO_INT_CLR: u32 = 0x8000_0000; // in register byte order
pub const MACIO_INT_MODE: u64 = 0x8000_0000; // 68k emulation mode bit in mask1

// Common MacIO interrupt register offsets.
pub const MIO_INT_EVENTS2: u32 = 0x10;
pub const MIO_INT_MASK2: u32 = 0x14;
pub const MIO_INT_CLEAR2: u32 = 0x18;
pub const MIO_INT_LEVELS2: u32 = 0x1C;
pub const MIO_INT_EVENTS1: u32 = 0x20;
pub const MIO_INT_MASK1: u32 = 0x24;
pub const MIO_INT_CLEAR1: u32 = 0x28;
pub const MIO_INT_LEVELS1: u32 = 0x2C;

// O'Hare/Heathrow specific registers.
pub const MIO_OHARE_ID: u32 = 0x34;
pub const MIO_OHARE_FEAT_CTRL: u32 = 0x38;
pub const MIO_AUX_CTRL: u32 = 0x3C;

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum MacIoKind {
    GrandCentral,
    OHare,
    Heathrow,
}

fn int_to_irq_id(bit: u32) -> u64 {
    1u64 << bit
}

/// The latching interrupt core shared by every MacIO flavor. Native mode
/// latches rising edges into the events register; 68k emulation mode makes
/// the events register follow the line levels.
pub struct MacIoIntCtrl {
    kind: MacIoKind,
    int_pin: IntPin,
    events: u64,
    mask: u64,
    levels: u64,
    cpu_int_latch: bool,
}

pub type MacIoIntCtrlPtr = Rc<RefCell<MacIoIntCtrl>>;

impl MacIoIntCtrl {
    pub fn new(kind: MacIoKind, int_pin: IntPin) -> MacIoIntCtrlPtr {
        Rc::new(RefCell::new(MacIoIntCtrl {
            kind,
            int_pin,
            events: 0,
            mask: 0,
            levels: 0,
            cpu_int_latch: false,
        }))
    }

    fn mode_68k(&self) -> bool {
        self.mask & MACIO_INT_MODE != 0
    }

    fn update_cpu_int(&mut self) {
        let active = self.events & self.mask != 0;
        if active && !self.cpu_int_latch {
            self.cpu_int_latch = true;
            self.int_pin.set(true);
        } else if !active && self.cpu_int_latch {
            self.cpu_int_latch = false;
            self.int_pin.set(false);
        }
    }

    fn ack_int_common(&mut self, irq_id: u64, level: u8) {
        if self.mode_68k() {
            // level-follow
            if level != 0 {
                self.events |= irq_id;
            } else {
                self.events &= !irq_id;
            }
        } else if level != 0 && self.levels & irq_id == 0 {
            // rising edge latches
            self.events |= irq_id;
        }
        if level != 0 {
            self.levels |= irq_id;
        } else {
            self.levels &= !irq_id;
        }
        self.update_cpu_int();
    }

    pub fn events1(&self) -> u32 {
        self.events as u32
    }

    pub fn events2(&self) -> u32 {
        (self.events >> 32) as u32
    }

    pub fn levels1(&self) -> u32 {
        self.levels as u32
    }

    pub fn levels2(&self) -> u32 {
        (self.levels >> 32) as u32
    }

    pub fn mask1(&self) -> u32 {
        self.mask as u32
    }

    pub fn mask2(&self) -> u32 {
        (self.mask >> 32) as u32
    }

    pub fn write_mask1(&mut self, value: u32) {
        self.mask = (self.mask & !0xFFFF_FFFF) | value as u64;
        self.update_cpu_int();
    }

    pub fn write_mask2(&mut self, value: u32) {
        self.mask = (self.mask & 0xFFFF_FFFF) | ((value as u64) << 32);
        self.update_cpu_int();
    }

    /// Writing INT_CLR with the mode bit set clears the whole window.
    pub fn write_clear1(&mut self, value: u32) {
        if self.mode_68k() && value & MACIO_INT_CLR != 0 {
            self.events &= !0xFFFF_FFFFu64;
        } else {
            self.events &= !((value & 0x7FFF_FFFF) as u64);
        }
        self.update_cpu_int();
    }

    pub fn write_clear2(&mut self, value: u32) {
        if self.mode_68k() && value & MACIO_INT_CLR != 0 {
            self.events &= 0xFFFF_FFFFu64;
        } else {
            self.events &= !(((value & 0x7FFF_FFFF) as u64) << 32);
        }
        self.update_cpu_int();
    }
}

impl InterruptCtrl for MacIoIntCtrl {
    fn register_dev_int(&mut self, src: IntSrc) -> u64 {
        let bit = match self.kind {
            MacIoKind::GrandCentral => match src {
                IntSrc::ScsiCurio => 0x0C,
                IntSrc::ScsiMesh => 0x0D,
                IntSrc::Ethernet => 0x0E,
                IntSrc::Scca => 0x0F,
                IntSrc::Sccb => 0x10,
                IntSrc::Davbus => 0x11,
                IntSrc::ViaCuda => 0x12,
                IntSrc::Swim3 => 0x13,
                IntSrc::Nmi => 0x14,
                IntSrc::Bandit1 => 0x16,
                IntSrc::PciA => 0x17,
                IntSrc::PciB => 0x18,
                IntSrc::PciC => 0x19,
                IntSrc::ControlVideo => 0x1A,
                IntSrc::Vbl => 0x1A,
                IntSrc::PciD => 0x1B,
                IntSrc::PciE => 0x1C,
                IntSrc::PciF => 0x1D,
                _ => panic!("GrandCentral: unknown interrupt source {:?}!", src),
            },
            MacIoKind::OHare | MacIoKind::Heathrow => match src {
                IntSrc::ScsiMesh => 0x0C,
                IntSrc::Ide0 => 0x0D,
                IntSrc::Ide1 => 0x0E,
                IntSrc::Scca => 0x0F,
                IntSrc::Sccb => 0x10,
                IntSrc::Davbus => 0x11,
                IntSrc::ViaCuda => 0x12,
                IntSrc::Swim3 => 0x13,
                IntSrc::Nmi => 0x14,
                IntSrc::Bandit1 => 0x16,
                IntSrc::PciA => 0x17,
                IntSrc::PciB => 0x18,
                IntSrc::PciC => 0x19,
                IntSrc::PciD => 0x1A,
                IntSrc::PciE => 0x1B,
                IntSrc::PciF => 0x1C,
                IntSrc::Ethernet => 0x2A,
                _ => panic!("{:?}: unknown interrupt source {:?}!", self.kind, src),
            },
        };
        int_to_irq_id(bit)
    }

    fn register_dma_int(&mut self, src: IntSrc) -> u64 {
        let bit = match self.kind {
            MacIoKind::GrandCentral => match src {
                IntSrc::DmaScsiCurio => 0x00,
                IntSrc::DmaSwim3 => 0x01,
                IntSrc::DmaEthernetTx => 0x02,
                IntSrc::DmaEthernetRx => 0x03,
                IntSrc::DmaSccaTx => 0x04,
                IntSrc::DmaSccaRx => 0x05,
                IntSrc::DmaSccbTx => 0x06,
                IntSrc::DmaSccbRx => 0x07,
                IntSrc::DmaDavbusTx => 0x08,
                IntSrc::DmaDavbusRx => 0x09,
                IntSrc::DmaScsiMesh => 0x0A,
                _ => panic!("GrandCentral: unknown DMA interrupt source {:?}!", src),
            },
            MacIoKind::OHare | MacIoKind::Heathrow => match src {
                IntSrc::DmaScsiMesh => 0x00,
                IntSrc::DmaSwim3 => 0x01,
                IntSrc::DmaIde0 => 0x02,
                IntSrc::DmaIde1 => 0x03,
                IntSrc::DmaSccaTx => 0x04,
                IntSrc::DmaSccaRx => 0x05,
                IntSrc::DmaSccbTx => 0x06,
                IntSrc::DmaSccbRx => 0x07,
                IntSrc::DmaDavbusTx => 0x08,
                IntSrc::DmaDavbusRx => 0x09,
                IntSrc::DmaEthernetTx => 0x20,
                IntSrc::DmaEthernetRx => 0x21,
                _ => panic!("{:?}: unknown DMA interrupt source {:?}!", self.kind, src),
            },
        };
        int_to_irq_id(bit)
    }

    fn ack_int(&mut self, irq_id: u64, level: u8) {
        self.ack_int_common(irq_id, level);
    }

    fn ack_dma_int(&mut self, irq_id: u64, level: u8) {
        self.ack_int_common(irq_id, level);
    }
}

// ------------------------------------------------------------- IOBus pins

/// 16-bit peripheral bus hanging off Grand Central (board register,
/// RaDACal, NVRAM latches on the 7500 board).
pub trait IobusDevice {
    fn iodev_read(&mut self, address: u32) -> u16;
    fn iodev_write(&mut self, address: u32, value: u16);
}

pub type IobusDevicePtr = Rc<RefCell<dyn IobusDevice>>;

pub struct BoardRegister {
    value: u16,
}

impl BoardRegister {
    pub fn new(value: u16) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(BoardRegister { value }))
    }
}

impl IobusDevice for BoardRegister {
    fn iodev_read(&mut self, _address: u32) -> u16 {
        self.value
    }
    fn iodev_write(&mut self, _address: u32, _value: u16) {}
}

pub struct NvramAddrHiDev {
    addr_hi: u16,
}

pub type NvramAddrHiPtr = Rc<RefCell<NvramAddrHiDev>>;

impl NvramAddrHiDev {
    pub fn new() -> NvramAddrHiPtr {
        Rc::new(RefCell::new(NvramAddrHiDev { addr_hi: 0 }))
    }
}

impl IobusDevice for NvramAddrHiDev {
    fn iodev_read(&mut self, _address: u32) -> u16 {
        self.addr_hi
    }
    fn iodev_write(&mut self, _address: u32, value: u16) {
        self.addr_hi = value;
    }
}

pub struct NvramDev {
    nvram: NVramPtr,
    addr_hi: NvramAddrHiPtr,
}

impl NvramDev {
    pub fn new(nvram: NVramPtr, addr_hi: NvramAddrHiPtr) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(NvramDev { nvram, addr_hi }))
    }

    fn nvram_addr(&self, address: u32) -> u32 {
        ((self.addr_hi.borrow().addr_hi as u32) << 5) | (address & 0x1F)
    }
}

impl IobusDevice for NvramDev {
    fn iodev_read(&mut self, address: u32) -> u16 {
        let addr = self.nvram_addr(address);
        self.nvram.borrow().read_byte(addr) as u16
    }
    fn iodev_write(&mut self, address: u32, value: u16) {
        let addr = self.nvram_addr(address);
        self.nvram.borrow_mut().write_byte(addr, value as u8);
    }
}

// ---------------------------------------------------------- Grand Central

// DBDMA channel numbers.
pub const GC_DMA_SCSI_CURIO: u32 = 0x0;
pub const GC_DMA_FLOPPY: u32 = 0x1;
pub const GC_DMA_ETH_XMIT: u32 = 0x2;
pub const GC_DMA_ETH_RCV: u32 = 0x3;
pub const GC_DMA_ESCC_A_XMIT: u32 = 0x4;
pub const GC_DMA_ESCC_A_RCV: u32 = 0x5;
pub const GC_DMA_ESCC_B_XMIT: u32 = 0x6;
pub const GC_DMA_ESCC_B_RCV: u32 = 0x7;
pub const GC_DMA_AUDIO_OUT: u32 = 0x8;
pub const GC_DMA_AUDIO_IN: u32 = 0x9;
pub const GC_DMA_SCSI_MESH: u32 = 0xA;

pub struct GrandCentral {
    pub int_ctrl: MacIoIntCtrlPtr,
    curio: Sc53C94Ptr,
    mesh: Option<MeshPtr>,
    mace: MacePtr,
    escc: EsccPtr,
    awacs: AwacsPtr,
    swim3: Swim3Ptr,
    viacuda: ViaCudaPtr,
    dma_channels: Vec<Option<DmaChannelPtr>>,
    iobus_devs: Vec<Option<IobusDevicePtr>>,
    mac_address: [u8; 8],
}

pub type GrandCentralPtr = Rc<RefCell<GrandCentral>>;

impl GrandCentral {
    pub fn new(
        int_ctrl: MacIoIntCtrlPtr,
        curio: Sc53C94Ptr,
        mesh: Option<MeshPtr>,
        mace: MacePtr,
        escc: EsccPtr,
        awacs: AwacsPtr,
        swim3: Swim3Ptr,
        viacuda: ViaCudaPtr,
        mac_address: [u8; 6],
    ) -> GrandCentralPtr {
        let mut mac = [0u8; 8];
        mac[..6].copy_from_slice(&mac_address);
        Rc::new(RefCell::new(GrandCentral {
            int_ctrl,
            curio,
            mesh,
            mace,
            escc,
            awacs,
            swim3,
            viacuda,
            dma_channels: vec![None; 16],
            iobus_devs: vec![None; 6],
            mac_address: mac,
        }))
    }

    pub fn set_dma_channel(&mut self, number: u32, ch: DmaChannelPtr) {
        self.dma_channels[number as usize] = Some(ch);
    }

    pub fn attach_iodevice(&mut self, dev_num: usize, dev: IobusDevicePtr) {
        self.iobus_devs[dev_num] = Some(dev);
    }

    fn dma_read(&mut self, offset: u32, size: Size) -> u32 {
        let channel = (offset >> 8) & 0xF;
        match &self.dma_channels[channel as usize] {
            Some(ch) => ch.borrow_mut().reg_read(offset & 0xFF, size),
            None => {
                warn!("GrandCentral: read from unsupported DMA channel {}", channel);
                0
            }
        }
    }

    fn dma_write(&mut self, offset: u32, value: u32, size: Size) {
        let channel = (offset >> 8) & 0xF;
        match &self.dma_channels[channel as usize] {
            Some(ch) => ch.borrow_mut().reg_write(offset & 0xFF, value, size),
            None => warn!("GrandCentral: write to unsupported DMA channel {}", channel),
        }
    }

    fn iobus_read(&mut self, dev_num: usize, offset: u32, size: Size) -> u32 {
        match &self.iobus_devs[dev_num] {
            Some(dev) => {
                let value = dev.borrow_mut().iodev_read((offset >> 4) & 0x1F) as u32;
                match size {
                    Size::Byte => value & 0xFF,
                    Size::Half => (value as u16).swap_bytes() as u32,
                    Size::Word => (value | (value << 16)).swap_bytes(),
                }
            }
            None => {
                warn!("GrandCentral: read from absent IOBus device #{}", dev_num + 1);
                0
            }
        }
    }

    fn iobus_write(&mut self, dev_num: usize, offset: u32, value: u32, size: Size) {
        match &self.iobus_devs[dev_num] {
            Some(dev) => {
                let value = match size {
                    Size::Byte => value as u16,
                    Size::Half => (value as u16).swap_bytes(),
                    Size::Word => (value.swap_bytes() & 0xFFFF) as u16,
                };
                dev.borrow_mut().iodev_write((offset >> 4) & 0x1F, value);
            }
            None => warn!("GrandCentral: write to absent IOBus device #{}", dev_num + 1),
        }
    }
}

impl MmioDevice for GrandCentral {
    fn read(&mut self, _rgn_start: u32, offset: u32, size: Size) -> u32 {
        if offset & 0x10000 != 0 {
            // device register space
            let subdev = (offset >> 12) & 0xF;
            match subdev {
                0x0 => self.curio.borrow_mut().read((offset >> 4) & 0xF) as u32,
                0x1 => self.mace.borrow_mut().read((offset >> 4) & 0x1F) as u32,
                0x2 => {
                    if offset & 0xFF < 0x0C {
                        let reg = COMPAT_TO_MACRISC[((offset >> 1) & 0xF) as usize % 6];
                        self.escc.borrow_mut().read(reg) as u32
                    } else {
                        self.escc.borrow_mut().read((offset >> 4) & 0xF) as u32
                    }
                }
                0x3 => self.escc.borrow_mut().read((offset >> 4) & 0xF) as u32,
                0x4 => self.awacs.borrow_mut().snd_ctrl_read(offset & 0xFF, size),
                0x5 => self.swim3.borrow_mut().read((offset >> 4) & 0xF) as u32,
                0x6 | 0x7 => self.viacuda.borrow_mut().read((offset >> 9) & 0xF) as u32,
                0x8 => match &self.mesh {
                    Some(mesh) => mesh.borrow_mut().read((offset >> 4) & 0xF) as u32,
                    None => 0xFF,
                },
                0x9 => self.mac_address[((offset >> 4) & 0x7) as usize] as u32,
                0xA..=0xF => self.iobus_read((subdev - 0xA) as usize, offset, size),
                _ => unreachable!(),
            }
        } else if offset & 0x8000 != 0 {
            self.dma_read(offset & 0x7FFF, size)
        } else {
            match offset {
                MIO_INT_EVENTS1 => self.int_ctrl.borrow().events1().swap_bytes(),
                MIO_INT_MASK1 => self.int_ctrl.borrow().mask1().swap_bytes(),
                MIO_INT_CLEAR1 => 0, // write-only, reads as zero like real HW
                MIO_INT_LEVELS1 => self.int_ctrl.borrow().levels1().swap_bytes(),
                _ => {
                    warn!("GrandCentral: read from unmapped I/O memory 0x{:X}", offset);
                    0
                }
            }
        }
    }

    fn write(&mut self, _rgn_start: u32, offset: u32, value: u32, size: Size) {
        if offset & 0x10000 != 0 {
            let subdev = (offset >> 12) & 0xF;
            match subdev {
                0x0 => self.curio.borrow_mut().write((offset >> 4) & 0xF, value as u8),
                0x1 => self.mace.borrow_mut().write((offset >> 4) & 0x1F, value as u8),
                0x2 => {
                    if offset & 0xFF < 0x0C {
                        let reg = COMPAT_TO_MACRISC[((offset >> 1) & 0xF) as usize % 6];
                        self.escc.borrow_mut().write(reg, value as u8);
                    } else {
                        self.escc.borrow_mut().write((offset >> 4) & 0xF, value as u8);
                    }
                }
                0x3 => self.escc.borrow_mut().write((offset >> 4) & 0xF, value as u8),
                0x4 => self.awacs.borrow_mut().snd_ctrl_write(offset & 0xFF, value, size),
                0x5 => self.swim3.borrow_mut().write((offset >> 4) & 0xF, value as u8),
                0x6 | 0x7 => self.viacuda.borrow_mut().write((offset >> 9) & 0xF, value as u8),
                0x8 => {
                    if let Some(mesh) = &self.mesh {
                        mesh.borrow_mut().write((offset >> 4) & 0xF, value as u8);
                    }
                }
                0x9 => warn!("GrandCentral: write to ENET-ROM ignored"),
                0xA..=0xF => self.iobus_write((subdev - 0xA) as usize, offset, value, size),
                _ => unreachable!(),
            }
        } else if offset & 0x8000 != 0 {
            self.dma_write(offset & 0x7FFF, value, size);
        } else {
            match offset {
                MIO_INT_MASK1 => self.int_ctrl.borrow_mut().write_mask1(value.swap_bytes()),
                MIO_INT_CLEAR1 => self.int_ctrl.borrow_mut().write_clear1(value.swap_bytes()),
                MIO_INT_EVENTS1 | MIO_INT_LEVELS1 => {}
                _ => warn!("GrandCentral: write to unmapped I/O memory 0x{:X}", offset),
            }
        }
    }
}

// -------------------------------------------------- O'Hare and Heathrow

// DBDMA channel numbers.
pub const MIO2_DMA_MESH: u32 = 0x0;
pub const MIO2_DMA_FLOPPY: u32 = 0x1;
pub const MIO2_DMA_ETH_XMIT: u32 = 0x2;
pub const MIO2_DMA_ETH_RCV: u32 = 0x3;
pub const MIO2_DMA_ESCC_A_XMIT: u32 = 0x4;
pub const MIO2_DMA_ESCC_A_RCV: u32 = 0x5;
pub const MIO2_DMA_ESCC_B_XMIT: u32 = 0x6;
pub const MIO2_DMA_ESCC_B_RCV: u32 = 0x7;
pub const MIO2_DMA_AUDIO_OUT: u32 = 0x8;
pub const MIO2_DMA_AUDIO_IN: u32 = 0x9;
pub const MIO2_DMA_IDE0: u32 = 0xB;
pub const MIO2_DMA_IDE1: u32 = 0xC;

pub struct MacIoTwo {
    kind: MacIoKind,
    pub int_ctrl: MacIoIntCtrlPtr,
    mesh: Option<MeshPtr>,
    bmac: Option<BigMacPtr>,
    escc: EsccPtr,
    awacs: AwacsPtr,
    swim3: Swim3Ptr,
    viacuda: ViaCudaPtr,
    nvram: NVramPtr,
    dma_channels: Vec<Option<DmaChannelPtr>>,

    feat_ctrl: u32,
    aux_ctrl: u32,
    cpu_id: u8,
    mb_id: u8,
    mon_id: u8,
    fp_id: u8,
    emmo: bool,
}

pub type MacIoTwoPtr = Rc<RefCell<MacIoTwo>>;

impl MacIoTwo {
    pub fn new(
        kind: MacIoKind,
        int_ctrl: MacIoIntCtrlPtr,
        mesh: Option<MeshPtr>,
        bmac: Option<BigMacPtr>,
        escc: EsccPtr,
        awacs: AwacsPtr,
        swim3: Swim3Ptr,
        viacuda: ViaCudaPtr,
        nvram: NVramPtr,
        emmo: bool,
    ) -> MacIoTwoPtr {
        Rc::new(RefCell::new(MacIoTwo {
            kind,
            int_ctrl,
            mesh,
            bmac,
            escc,
            awacs,
            swim3,
            viacuda,
            nvram,
            dma_channels: vec![None; 16],
            feat_ctrl: 0,
            aux_ctrl: 0,
            cpu_id: 0xE0,
            mb_id: 0x70,
            mon_id: 0x10,
            fp_id: 0x70,
            emmo,
        }))
    }

    pub fn set_dma_channel(&mut self, number: u32, ch: DmaChannelPtr) {
        self.dma_channels[number as usize] = Some(ch);
    }

    fn dma_read(&mut self, offset: u32, size: Size) -> u32 {
        let channel = (offset >> 8) & 0xF;
        match &self.dma_channels[channel as usize] {
            Some(ch) => ch.borrow_mut().reg_read(offset & 0xFF, size),
            None => {
                warn!("{:?}: read from unsupported DMA channel {}", self.kind, channel);
                0
            }
        }
    }

    fn dma_write(&mut self, offset: u32, value: u32, size: Size) {
        let channel = (offset >> 8) & 0xF;
        match &self.dma_channels[channel as usize] {
            Some(ch) => ch.borrow_mut().reg_write(offset & 0xFF, value, size),
            None => warn!("{:?}: write to unsupported DMA channel {}", self.kind, channel),
        }
    }

    fn id_register(&self) -> u32 {
        ((self.fp_id as u32) << 24)
            | ((self.mon_id as u32) << 16)
            | ((self.mb_id as u32) << 8)
            | self.cpu_id as u32
            | if self.emmo { 0 } else { 0x10 } // factory-test pin, active low
    }

    fn mio_ctrl_read(&mut self, offset: u32, _size: Size) -> u32 {
        match offset & 0x3C {
            MIO_INT_EVENTS2 => self.int_ctrl.borrow().events2().swap_bytes(),
            MIO_INT_MASK2 => self.int_ctrl.borrow().mask2().swap_bytes(),
            MIO_INT_CLEAR2 => 0,
            MIO_INT_LEVELS2 => self.int_ctrl.borrow().levels2().swap_bytes(),
            MIO_INT_EVENTS1 => self.int_ctrl.borrow().events1().swap_bytes(),
            MIO_INT_MASK1 => self.int_ctrl.borrow().mask1().swap_bytes(),
            MIO_INT_CLEAR1 => 0,
            MIO_INT_LEVELS1 => self.int_ctrl.borrow().levels1().swap_bytes(),
            MIO_OHARE_ID => self.id_register(),
            MIO_OHARE_FEAT_CTRL => self.feat_ctrl,
            MIO_AUX_CTRL => self.aux_ctrl,
            _ => {
                warn!("{:?}: read from unknown control register 0x{:X}", self.kind, offset);
                0
            }
        }
    }

    fn mio_ctrl_write(&mut self, offset: u32, value: u32, _size: Size) {
        match offset & 0x3C {
            MIO_INT_MASK2 => self.int_ctrl.borrow_mut().write_mask2(value.swap_bytes()),
            MIO_INT_CLEAR2 => self.int_ctrl.borrow_mut().write_clear2(value.swap_bytes()),
            MIO_INT_MASK1 => self.int_ctrl.borrow_mut().write_mask1(value.swap_bytes()),
            MIO_INT_CLEAR1 => self.int_ctrl.borrow_mut().write_clear1(value.swap_bytes()),
            MIO_INT_EVENTS1 | MIO_INT_EVENTS2 | MIO_INT_LEVELS1 | MIO_INT_LEVELS2 => {}
            MIO_OHARE_ID => warn!("{:?}: write to the ID register ignored", self.kind),
            MIO_OHARE_FEAT_CTRL => {
                log::debug!("{:?}: feature control = 0x{:08X}", self.kind, value);
                self.feat_ctrl = value;
            }
            MIO_AUX_CTRL => self.aux_ctrl = value,
            _ => warn!("{:?}: write to unknown control register 0x{:X}", self.kind, offset),
        }
    }
}

impl MmioDevice for MacIoTwo {
    fn read(&mut self, _rgn_start: u32, offset: u32, size: Size) -> u32 {
        let sub_addr = (offset >> 12) & 0x7F;
        match sub_addr {
            0 => self.mio_ctrl_read(offset & 0xFF, size),
            8 => self.dma_read(offset & 0x7FFF, size),
            0x10 => match &self.mesh {
                Some(mesh) => mesh.borrow_mut().read((offset >> 4) & 0xF) as u32,
                None => 0xFF,
            },
            0x11 => match &self.bmac {
                Some(bmac) => {
                    let value = bmac.borrow_mut().read((offset & 0xFFF) as u16) as u32;
                    match size {
                        Size::Half => (value as u16).swap_bytes() as u32,
                        _ => value,
                    }
                }
                None => 0,
            },
            0x12 => {
                if offset & 0xFF < 0x0C {
                    let reg = COMPAT_TO_MACRISC[((offset >> 1) & 0xF) as usize % 6];
                    self.escc.borrow_mut().read(reg) as u32
                } else {
                    self.escc.borrow_mut().read((offset >> 4) & 0xF) as u32
                }
            }
            0x13 => self.escc.borrow_mut().read((offset >> 4) & 0xF) as u32,
            0x14 => self.awacs.borrow_mut().snd_ctrl_read(offset & 0xFF, size),
            0x15 => self.swim3.borrow_mut().read((offset >> 4) & 0xF) as u32,
            0x16 | 0x17 => self.viacuda.borrow_mut().read((offset >> 9) & 0xF) as u32,
            0x20 | 0x21 => {
                warn!("{:?}: read from absent IDE channel {}", self.kind, sub_addr - 0x20);
                0xFFFF_FFFF
            }
            s if s >= 0x60 => self.nvram.borrow().read_byte((offset >> 4) & 0x1FFF) as u32,
            _ => {
                warn!("{:?}: read from unmapped I/O memory 0x{:X}", self.kind, offset);
                0
            }
        }
    }

    fn write(&mut self, _rgn_start: u32, offset: u32, value: u32, size: Size) {
        let sub_addr = (offset >> 12) & 0x7F;
        match sub_addr {
            0 => self.mio_ctrl_write(offset & 0xFF, value, size),
            8 => self.dma_write(offset & 0x7FFF, value, size),
            0x10 => {
                if let Some(mesh) = &self.mesh {
                    mesh.borrow_mut().write((offset >> 4) & 0xF, value as u8);
                }
            }
            0x11 => {
                if let Some(bmac) = &self.bmac {
                    let value = match size {
                        Size::Half => (value as u16).swap_bytes(),
                        _ => value as u16,
                    };
                    bmac.borrow_mut().write((offset & 0xFFF) as u16, value);
                }
            }
            0x12 => {
                if offset & 0xFF < 0x0C {
                    let reg = COMPAT_TO_MACRISC[((offset >> 1) & 0xF) as usize % 6];
                    self.escc.borrow_mut().write(reg, value as u8);
                } else {
                    self.escc.borrow_mut().write((offset >> 4) & 0xF, value as u8);
                }
            }
            0x13 => self.escc.borrow_mut().write((offset >> 4) & 0xF, value as u8),
            0x14 => self.awacs.borrow_mut().snd_ctrl_write(offset & 0xFF, value, size),
            0x15 => self.swim3.borrow_mut().write((offset >> 4) & 0xF, value as u8),
            0x16 | 0x17 => self.viacuda.borrow_mut().write((offset >> 9) & 0xF, value as u8),
            0x20 | 0x21 => {
                warn!("{:?}: write to absent IDE channel {}", self.kind, sub_addr - 0x20);
            }
            s if s >= 0x60 => {
                self.nvram.borrow_mut().write_byte((offset - 0x60000) >> 4, value as u8);
            }
            _ => warn!("{:?}: write to unmapped I/O memory 0x{:X}", self.kind, offset),
        }
    }
}
