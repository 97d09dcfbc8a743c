// AMIC, the Apple Memory-mapped I/O Controller of the PDM (6100-class)
// machines. One 256 KiB register block fronts VIA1/Cuda, SCC, MACE, the
// 53C94 SCSI cell, SWIM3, the immediate sound registers and the built-in
// video control. Interrupts cascade: slot sources fold into the VIA2
// slot register, VIA2 folds into a CPU interrupt line, and the per-channel
// DMA flags gather into one ALL_DMA CPU-level source. The irq id encodes
// the layer in its shift region. The cascade state lives in its own
// shared object so devices can ack interrupts while an AMIC register
// access is still in flight.

use crate::awacs::AwacsPtr;
use crate::escc::{EsccPtr, COMPAT_TO_MACRISC};
use crate::ethernet::MacePtr;
use crate::fields::Size;
use crate::interrupts::{IntPin, IntSrc, InterruptCtrl};
use crate::memory::MmioDevice;
use crate::scsi::Sc53C94Ptr;
use crate::swim3::Swim3Ptr;
use crate::timers::{TimersPtr, NS_PER_SEC};
use crate::viacuda::{ViaCudaPtr, ViaLine};
use crate::video::MonitorInfo;
use log::{debug, info, warn};
use std::cell::RefCell;
use std::rc::Rc;

// Register offsets within the AMIC block.
const AMIC_SND_CTRL_0: u32 = 0x14000;
const AMIC_SND_CTRL_1: u32 = 0x14001;
const AMIC_SND_CTRL_2: u32 = 0x14002;
const AMIC_SND_STAT_0: u32 = 0x14004;
const AMIC_SND_STAT_1: u32 = 0x14005;
const AMIC_SND_STAT_2: u32 = 0x14006;
const AMIC_SND_BUF_SIZE_HI: u32 = 0x14008;
const AMIC_SND_BUF_SIZE_LO: u32 = 0x14009;
const AMIC_SND_PHASE0: u32 = 0x1400C;
const AMIC_SND_PHASE1: u32 = 0x1400D;
const AMIC_SND_PHASE2: u32 = 0x1400E;
const AMIC_SND_OUT_CTRL: u32 = 0x14010;
const AMIC_SND_IN_CTRL: u32 = 0x14011;
const AMIC_SND_OUT_DMA: u32 = 0x14018;
const AMIC_SND_IN_DMA: u32 = 0x14019;

const AMIC_ARIEL_CLUT_INDEX: u32 = 0x24000;
const AMIC_ARIEL_CLUT_COLOR: u32 = 0x24001;
const AMIC_ARIEL_CONFIG: u32 = 0x24002;

const AMIC_VIA2_SLOT_IFR: u32 = 0x26002;
const AMIC_VIA2_IFR: u32 = 0x26003;
const AMIC_VIA2_SLOT_IER: u32 = 0x26012;
const AMIC_VIA2_IER: u32 = 0x26013;
const AMIC_VIA2_IFR_RBV: u32 = 0x27002;
const AMIC_VIA2_IER_RBV: u32 = 0x27012;

const AMIC_VIDEO_MODE: u32 = 0x28000;
const AMIC_PIXEL_DEPTH: u32 = 0x28001;
const AMIC_MONITOR_ID: u32 = 0x28002;

const AMIC_INT_CTRL: u32 = 0x2A000;
const AMIC_DMA_IFR_0: u32 = 0x2A008;
const AMIC_DMA_IFR_1: u32 = 0x2A009;
const AMIC_DIAG_REG: u32 = 0x2A00E;

const AMIC_DMA_BASE_ADDR_0: u32 = 0x31000;
const AMIC_DMA_BASE_ADDR_3: u32 = 0x31003;
const AMIC_ENET_DMA_XMT_CTRL: u32 = 0x31C20;
const AMIC_SCSI_DMA_BASE_0: u32 = 0x32000;
const AMIC_SCSI_DMA_BASE_3: u32 = 0x32003;
const AMIC_SCSI_DMA_CTRL: u32 = 0x32008;
const AMIC_ENET_DMA_RCV_CTRL: u32 = 0x32C20;
const AMIC_FLOPPY_ADDR_PTR_0: u32 = 0x36010;
const AMIC_FLOPPY_ADDR_PTR_3: u32 = 0x36013;
const AMIC_FLOPPY_BYTE_CNT_HI: u32 = 0x36014;
const AMIC_FLOPPY_BYTE_CNT_LO: u32 = 0x36015;
const AMIC_FLOPPY_DMA_CTRL: u32 = 0x36018;
const AMIC_SCC_DMA_XMT_A_CTRL: u32 = 0x32088;
const AMIC_SCC_RXA_BYTE_CNT_HI: u32 = 0x32089;
const AMIC_SCC_RXA_BYTE_CNT_LO: u32 = 0x3208A;
const AMIC_SCC_DMA_RCV_A_CTRL: u32 = 0x3208B;
const AMIC_SCC_DMA_XMT_B_CTRL: u32 = 0x32098;
const AMIC_SCC_DMA_RCV_B_CTRL: u32 = 0x3209B;

// Int_Ctrl bits.
const CPU_INT_FLAG: u8 = 0x80;
const CPU_INT_CLEAR: u8 = 0x80;
const CPU_INT_MODE: u8 = 0x40;

// CPU-level interrupt lines (bits 0..5 of Int_Ctrl reads).
const CPU_INT_VIA1: u8 = 0x01;
const CPU_INT_VIA2: u8 = 0x02;
const CPU_INT_SCC: u8 = 0x04;
const CPU_INT_ETHERNET: u8 = 0x08;
const CPU_INT_ALL_DMA: u8 = 0x10;
const CPU_INT_NMI: u8 = 0x20;

// VIA2 IFR bits.
const VIA2_INT_SCSI_DRQ: u8 = 0x01;
const VIA2_INT_SLOT: u8 = 0x02;
const VIA2_INT_SCSI: u8 = 0x08;
const VIA2_INT_SOUND: u8 = 0x10;
const VIA2_INT_SWIM3: u8 = 0x20;

// Slot interrupt bits.
const SLOT_INT_VBL: u8 = 0x40;

// DMA flag bits (IFR0 in the low byte, IFR1 in the high byte).
const DMA_INT_SND_OUT: u16 = 0x0001;
const DMA_INT_SND_IN: u16 = 0x0002;
const DMA_INT_SCSI: u16 = 0x0010;
const DMA_INT_FLOPPY: u16 = 0x0100;
const DMA_INT_SCC_A_TX: u16 = 0x0400;
const DMA_INT_SCC_A_RX: u16 = 0x0800;
const DMA_INT_SCC_B_TX: u16 = 0x1000;
const DMA_INT_SCC_B_RX: u16 = 0x2000;

// irq_id layer encoding.
const LAYER_VIA2: u64 = 8;
const LAYER_SLOT: u64 = 16;
const LAYER_DMA: u64 = 24;

const PDM_SND_CTRL_VALID: u8 = 0x40;

/// The cascaded interrupt state, shared between the AMIC register block
/// and every device that registered a source with it.
pub struct AmicIntCtrl {
    int_pin: IntPin,
    int_ctrl: u8,
    dev_irq_lines: u8,
    via2_ifr: u8,
    via2_ier: u8,
    via2_slot_ifr: u8,
    via2_slot_ier: u8,
    dma_ifr: u16,
}

pub type AmicIntCtrlPtr = Rc<RefCell<AmicIntCtrl>>;

impl AmicIntCtrl {
    pub fn new(int_pin: IntPin) -> AmicIntCtrlPtr {
        Rc::new(RefCell::new(AmicIntCtrl {
            int_pin,
            int_ctrl: 0,
            dev_irq_lines: 0,
            via2_ifr: 0,
            via2_ier: 0,
            via2_slot_ifr: 0,
            via2_slot_ier: 0,
            dma_ifr: 0,
        }))
    }

    fn update_cpu_int(&mut self) {
        // the latch only clears through the Int_Ctrl register
        if self.dev_irq_lines != 0 && self.int_ctrl & CPU_INT_FLAG == 0 {
            self.int_ctrl |= CPU_INT_FLAG;
            self.int_pin.set(true);
        }
    }

    fn set_cpu_line(&mut self, line: u8, level: u8) {
        if level != 0 {
            self.dev_irq_lines |= line;
            self.update_cpu_int();
        } else {
            self.dev_irq_lines &= !line;
        }
    }

    fn update_via2_irq(&mut self) {
        let active = self.via2_ifr & self.via2_ier & 0x7F;
        self.set_cpu_line(CPU_INT_VIA2, (active != 0) as u8);
    }

    fn ack_slot_int(&mut self, slot_bit: u8, level: u8) {
        if level != 0 {
            self.via2_slot_ifr |= slot_bit;
        } else {
            self.via2_slot_ifr &= !slot_bit;
        }
        let active = self.via2_slot_ifr & self.via2_slot_ier & 0x7F;
        if active != 0 {
            self.via2_ifr |= VIA2_INT_SLOT;
        } else {
            self.via2_ifr &= !VIA2_INT_SLOT;
        }
        self.update_via2_irq();
    }

    fn ack_via2_int(&mut self, bit: u8, level: u8) {
        if level != 0 {
            self.via2_ifr |= bit;
        } else {
            self.via2_ifr &= !bit;
        }
        self.update_via2_irq();
    }

    fn ack_dma_flags(&mut self, bits: u16, level: u8) {
        if level != 0 {
            self.dma_ifr |= bits;
        } else {
            self.dma_ifr &= !bits;
        }
        let any = self.dma_ifr != 0;
        self.set_cpu_line(CPU_INT_ALL_DMA, any as u8);
    }

    fn int_ctrl_read(&self) -> u8 {
        (self.int_ctrl & 0xC0) | (self.dev_irq_lines & 0x3F)
    }

    fn int_ctrl_write(&mut self, value: u8) {
        if value & CPU_INT_CLEAR != 0 && self.int_ctrl & CPU_INT_FLAG != 0 {
            self.int_ctrl &= !CPU_INT_FLAG;
            self.int_pin.set(false);
            debug!("AMIC: CPU INT latch cleared");
            self.update_cpu_int(); // re-latch if lines are still active
        }
        self.int_ctrl |= value & CPU_INT_MODE;
    }
}

impl InterruptCtrl for AmicIntCtrl {
    fn register_dev_int(&mut self, src: IntSrc) -> u64 {
        match src {
            IntSrc::ViaCuda => CPU_INT_VIA1 as u64,
            IntSrc::Scca | IntSrc::Sccb => CPU_INT_SCC as u64,
            IntSrc::Ethernet => CPU_INT_ETHERNET as u64,
            IntSrc::Nmi => CPU_INT_NMI as u64,
            IntSrc::Via2 => CPU_INT_VIA2 as u64,
            IntSrc::ScsiCurio => (VIA2_INT_SCSI as u64) << LAYER_VIA2,
            IntSrc::Davbus => (VIA2_INT_SOUND as u64) << LAYER_VIA2,
            IntSrc::Swim3 => (VIA2_INT_SWIM3 as u64) << LAYER_VIA2,
            IntSrc::Vbl => (SLOT_INT_VBL as u64) << LAYER_SLOT,
            IntSrc::Slot0 => 0x01u64 << LAYER_SLOT,
            IntSrc::Slot1 => 0x02u64 << LAYER_SLOT,
            IntSrc::Slot2 => 0x04u64 << LAYER_SLOT,
            IntSrc::Slot3 => 0x08u64 << LAYER_SLOT,
            IntSrc::Slot4 => 0x10u64 << LAYER_SLOT,
            IntSrc::Slot5 => 0x20u64 << LAYER_SLOT,
            _ => panic!("AMIC: unknown interrupt source {:?}!", src),
        }
    }

    fn register_dma_int(&mut self, src: IntSrc) -> u64 {
        let bits = match src {
            IntSrc::DmaDavbusTx => DMA_INT_SND_OUT,
            IntSrc::DmaDavbusRx => DMA_INT_SND_IN,
            IntSrc::DmaScsiCurio => DMA_INT_SCSI,
            IntSrc::DmaSwim3 => DMA_INT_FLOPPY,
            IntSrc::DmaSccaTx => DMA_INT_SCC_A_TX,
            IntSrc::DmaSccaRx => DMA_INT_SCC_A_RX,
            IntSrc::DmaSccbTx => DMA_INT_SCC_B_TX,
            IntSrc::DmaSccbRx => DMA_INT_SCC_B_RX,
            _ => panic!("AMIC: unknown DMA interrupt source {:?}!", src),
        };
        (bits as u64) << LAYER_DMA
    }

    // The shift region of the irq id selects the cascade layer.
    fn ack_int(&mut self, irq_id: u64, level: u8) {
        if irq_id >> LAYER_DMA != 0 {
            self.ack_dma_flags((irq_id >> LAYER_DMA) as u16, level);
        } else if irq_id >> LAYER_SLOT != 0 {
            self.ack_slot_int((irq_id >> LAYER_SLOT) as u8, level);
        } else if irq_id >> LAYER_VIA2 != 0 {
            self.ack_via2_int((irq_id >> LAYER_VIA2) as u8, level);
        } else {
            self.set_cpu_line(irq_id as u8, level);
        }
    }

    fn ack_dma_int(&mut self, irq_id: u64, level: u8) {
        self.ack_int(irq_id, level);
    }
}

pub type AmicPtr = Rc<RefCell<Amic>>;

pub struct Amic {
    timers: TimersPtr,
    pub int_ctrl: AmicIntCtrlPtr,
    viacuda: ViaCudaPtr,
    escc: EsccPtr,
    mace: MacePtr,
    scsi: Sc53C94Ptr,
    swim3: Swim3Ptr,
    awacs: AwacsPtr,
    monitor: &'static MonitorInfo,

    // immediate sound registers
    imm_snd_regs: [u8; 4],
    snd_buf_size: u16,
    snd_out_ctrl: u8,
    snd_in_ctrl: u8,

    // built-in video control
    clut_index: u8,
    clut_comp: u8,
    clut_color: [u8; 3],
    pub palette: [u32; 256],
    vdac_config: u8,
    video_mode: u8,
    pixel_depth: u8,
    mon_id_reg: u8,

    // PDM-style DMA plumbing
    dma_base: u32,
    scsi_dma_base: u32,
    scsi_dma_ctrl: u8,
    floppy_addr_ptr: u32,
    floppy_byte_cnt: u16,
    floppy_dma_ctrl: u8,

    emmo_pin: u8,
    pseudo_vbl_tid: u32,
}

impl Amic {
    pub fn new(
        timers: TimersPtr,
        int_pin: IntPin,
        viacuda: ViaCudaPtr,
        escc: EsccPtr,
        mace: MacePtr,
        scsi: Sc53C94Ptr,
        swim3: Swim3Ptr,
        awacs: AwacsPtr,
        monitor: &'static MonitorInfo,
        emmo: bool,
    ) -> AmicPtr {
        Rc::new(RefCell::new(Amic {
            timers,
            int_ctrl: AmicIntCtrl::new(int_pin),
            viacuda,
            escc,
            mace,
            scsi,
            swim3,
            awacs,
            monitor,
            imm_snd_regs: [0; 4],
            snd_buf_size: 0,
            snd_out_ctrl: 0,
            snd_in_ctrl: 0,
            clut_index: 0,
            clut_comp: 0,
            clut_color: [0; 3],
            palette: [0xFF00_0000; 256],
            vdac_config: 0,
            video_mode: 0,
            pixel_depth: 0,
            mon_id_reg: 0,
            dma_base: 0,
            scsi_dma_base: 0,
            scsi_dma_ctrl: 0,
            floppy_addr_ptr: 0,
            floppy_byte_cnt: 0,
            floppy_dma_ctrl: 0,
            emmo_pin: !emmo as u8 & 1, // active low
            pseudo_vbl_tid: 0,
        }))
    }

    /// Post-init: AMIC drives VIA1 CA1 internally at 60.15 Hz.
    pub fn start_pseudo_vbl(&mut self) {
        let via = Rc::clone(&self.viacuda);
        let period = (NS_PER_SEC as f64 / 60.15 + 0.5) as u64;
        self.pseudo_vbl_tid = self.timers.borrow_mut().add_cyclic_timer(
            period,
            Rc::new(move || {
                via.borrow_mut().assert_ctrl_line(ViaLine::Ca1);
            }),
        );
    }

    pub fn assert_scsi_drq(&mut self, level: u8) {
        self.int_ctrl.borrow_mut().ack_via2_int(VIA2_INT_SCSI_DRQ, level);
    }
}

impl MmioDevice for Amic {
    fn read(&mut self, _rgn_start: u32, offset: u32, size: Size) -> u32 {
        // subdevice windows first
        match offset >> 12 {
            0 | 1 => return self.viacuda.borrow_mut().read(offset >> 9) as u32,
            4 => {
                if offset & 0xF < 0x0C {
                    let reg = COMPAT_TO_MACRISC[((offset >> 1) & 0xF) as usize % 6];
                    return self.escc.borrow_mut().read(reg) as u32;
                }
                warn!("AMIC: SCC read at 0x{:X}.{}", offset, size);
                return 0;
            }
            8 | 9 => {
                debug!("AMIC: Ethernet ID ROM read at 0x{:X}", offset);
                return 0;
            }
            0xA => return self.mace.borrow_mut().read((offset >> 4) & 0x1F) as u32,
            0x10 => {
                if offset & 0x100 != 0 {
                    return self.scsi.borrow_mut().pseudo_dma_read() as u32;
                }
                return self.scsi.borrow_mut().read((offset >> 4) & 0xF) as u32;
            }
            0x14 => {
                return match offset {
                    AMIC_SND_CTRL_0 | AMIC_SND_CTRL_1 | AMIC_SND_CTRL_2 => {
                        self.imm_snd_regs[(offset & 3) as usize] as u32
                    }
                    AMIC_SND_STAT_0 | AMIC_SND_STAT_1 | AMIC_SND_STAT_2 => {
                        (self.awacs.borrow().read_stat() >> ((offset & 3) * 8)) & 0xFF
                    }
                    AMIC_SND_BUF_SIZE_HI => (self.snd_buf_size >> 8) as u32,
                    AMIC_SND_BUF_SIZE_LO => (self.snd_buf_size & 0xFF) as u32,
                    // 12-bit buffer offset plus an undocumented prescale
                    AMIC_SND_PHASE0 | AMIC_SND_PHASE1 | AMIC_SND_PHASE2 => 0,
                    AMIC_SND_OUT_CTRL => self.snd_out_ctrl as u32,
                    AMIC_SND_IN_CTRL => self.snd_in_ctrl as u32,
                    AMIC_SND_OUT_DMA | AMIC_SND_IN_DMA => 0,
                    _ => 0,
                };
            }
            0x16 | 0x17 => return self.swim3.borrow_mut().read((offset >> 9) & 0xF) as u32,
            _ => {}
        }
        match offset {
            AMIC_ARIEL_CONFIG => self.vdac_config as u32,
            AMIC_VIA2_SLOT_IFR => self.int_ctrl.borrow().via2_slot_ifr as u32,
            AMIC_VIA2_IFR | AMIC_VIA2_IFR_RBV => self.int_ctrl.borrow().via2_ifr as u32,
            AMIC_VIA2_SLOT_IER => self.int_ctrl.borrow().via2_slot_ier as u32,
            AMIC_VIA2_IER | AMIC_VIA2_IER_RBV => self.int_ctrl.borrow().via2_ier as u32,
            AMIC_VIDEO_MODE => self.video_mode as u32,
            AMIC_PIXEL_DEPTH => self.pixel_depth as u32,
            AMIC_MONITOR_ID => self.mon_id_reg as u32,
            AMIC_INT_CTRL => self.int_ctrl.borrow().int_ctrl_read() as u32,
            AMIC_DMA_IFR_0 => (self.int_ctrl.borrow().dma_ifr & 0xFF) as u32,
            AMIC_DMA_IFR_1 => (self.int_ctrl.borrow().dma_ifr >> 8) as u32,
            AMIC_DIAG_REG => (0xFE | self.emmo_pin) as u32,
            AMIC_DMA_BASE_ADDR_0..=AMIC_DMA_BASE_ADDR_3 => {
                (self.dma_base >> ((3 - (offset & 3)) * 8)) & 0xFF
            }
            AMIC_SCSI_DMA_BASE_0..=AMIC_SCSI_DMA_BASE_3 => {
                (self.scsi_dma_base >> ((3 - (offset & 3)) * 8)) & 0xFF
            }
            AMIC_SCSI_DMA_CTRL => self.scsi_dma_ctrl as u32,
            AMIC_FLOPPY_ADDR_PTR_0..=AMIC_FLOPPY_ADDR_PTR_3 => {
                (self.floppy_addr_ptr >> ((3 - (offset & 3)) * 8)) & 0xFF
            }
            AMIC_FLOPPY_DMA_CTRL => self.floppy_dma_ctrl as u32,
            AMIC_SCC_DMA_XMT_A_CTRL | AMIC_SCC_DMA_XMT_B_CTRL => 0,
            AMIC_SCC_RXA_BYTE_CNT_HI | AMIC_SCC_RXA_BYTE_CNT_LO => 0,
            AMIC_SCC_DMA_RCV_A_CTRL | AMIC_SCC_DMA_RCV_B_CTRL => 0,
            _ => {
                warn!("AMIC: unknown register read, offset=0x{:X}", offset);
                0
            }
        }
    }

    fn write(&mut self, _rgn_start: u32, offset: u32, value: u32, size: Size) {
        match offset >> 12 {
            0 | 1 => {
                self.viacuda.borrow_mut().write(offset >> 9, value as u8);
                return;
            }
            4 => {
                if offset & 0xF < 0x0C {
                    let reg = COMPAT_TO_MACRISC[((offset >> 1) & 0xF) as usize % 6];
                    self.escc.borrow_mut().write(reg, value as u8);
                } else {
                    warn!("AMIC: SCC write at 0x{:X}.{}", offset, size);
                }
                return;
            }
            0xA => {
                self.mace.borrow_mut().write((offset >> 4) & 0x1F, value as u8);
                return;
            }
            0x10 => {
                if offset & 0x100 != 0 {
                    self.scsi.borrow_mut().pseudo_dma_write(value as u8);
                } else {
                    self.scsi.borrow_mut().write((offset >> 4) & 0xF, value as u8);
                }
                return;
            }
            0x14 => {
                match offset {
                    AMIC_SND_CTRL_0 | AMIC_SND_CTRL_1 | AMIC_SND_CTRL_2 => {
                        self.imm_snd_regs[(offset & 3) as usize] = value as u8;
                        // forward a complete control word to the codec
                        if self.imm_snd_regs[0] & 0xC0 == PDM_SND_CTRL_VALID {
                            let addr = (self.imm_snd_regs[1] >> 4) | (self.imm_snd_regs[0] & 0x3F);
                            let data =
                                (((self.imm_snd_regs[1] & 0xF) as u16) << 8) | self.imm_snd_regs[2] as u16;
                            self.awacs.borrow_mut().write_codec_reg(addr, data);
                        }
                    }
                    AMIC_SND_BUF_SIZE_HI => {
                        self.snd_buf_size = (self.snd_buf_size & 0xFF) | ((value as u16) << 8);
                        self.snd_buf_size &= !3;
                    }
                    AMIC_SND_BUF_SIZE_LO => {
                        self.snd_buf_size = (self.snd_buf_size & 0xFF00) | value as u16;
                        self.snd_buf_size &= !3;
                    }
                    AMIC_SND_OUT_CTRL => {
                        if (value ^ self.snd_out_ctrl as u32) & 1 != 0 {
                            if value & 1 != 0 {
                                info!("AMIC: sound output enabled");
                                self.awacs.borrow_mut().set_rate_index((value >> 1) & 3);
                            } else {
                                info!("AMIC: sound output disabled");
                            }
                        }
                        self.snd_out_ctrl = value as u8;
                    }
                    AMIC_SND_IN_CTRL => self.snd_in_ctrl = value as u8,
                    AMIC_SND_OUT_DMA => {
                        // writing resets the channel flag
                        self.int_ctrl.borrow_mut().ack_dma_flags(DMA_INT_SND_OUT, 0);
                    }
                    AMIC_SND_IN_DMA => {
                        self.int_ctrl.borrow_mut().ack_dma_flags(DMA_INT_SND_IN, 0);
                    }
                    _ => debug!("AMIC: sound register write 0x{:X} = 0x{:X}", offset, value),
                }
                return;
            }
            0x16 | 0x17 => {
                self.swim3.borrow_mut().write((offset >> 9) & 0xF, value as u8);
                return;
            }
            _ => {}
        }
        match offset {
            AMIC_VIA2_SLOT_IFR => {
                if value as u8 & SLOT_INT_VBL != 0 {
                    self.int_ctrl.borrow_mut().ack_slot_int(SLOT_INT_VBL, 0);
                }
            }
            AMIC_VIA2_IFR => {
                // bit 7 set: clear the flagged bits; otherwise no effect
                if value & 0x80 != 0 {
                    let mut ic = self.int_ctrl.borrow_mut();
                    ic.via2_ifr &= !(value as u8 & 0x7F);
                    ic.update_via2_irq();
                }
            }
            AMIC_VIA2_SLOT_IER => {
                let mut ic = self.int_ctrl.borrow_mut();
                if value & 0x80 != 0 {
                    ic.via2_slot_ier |= value as u8 & 0x7F;
                } else {
                    ic.via2_slot_ier &= !(value as u8);
                }
            }
            AMIC_VIA2_IER | AMIC_VIA2_IER_RBV => {
                let mut ic = self.int_ctrl.borrow_mut();
                if value & 0x80 != 0 {
                    ic.via2_ier |= value as u8 & 0x7F;
                } else {
                    ic.via2_ier &= !(value as u8);
                }
                ic.update_via2_irq();
            }
            AMIC_ARIEL_CLUT_INDEX => {
                self.clut_index = value as u8;
                self.clut_comp = 0;
            }
            AMIC_ARIEL_CLUT_COLOR => {
                self.clut_color[self.clut_comp as usize] = value as u8;
                self.clut_comp += 1;
                if self.clut_comp == 3 {
                    self.palette[self.clut_index as usize] = 0xFF00_0000
                        | ((self.clut_color[0] as u32) << 16)
                        | ((self.clut_color[1] as u32) << 8)
                        | self.clut_color[2] as u32;
                    self.clut_index = self.clut_index.wrapping_add(1);
                    self.clut_comp = 0;
                }
            }
            AMIC_ARIEL_CONFIG => self.vdac_config = value as u8,
            AMIC_VIDEO_MODE => self.video_mode = value as u8,
            AMIC_PIXEL_DEPTH => self.pixel_depth = value as u8,
            AMIC_MONITOR_ID => {
                // pin directions: 0 input, 1 output, then propagate bit 3
                let dirs = !(value as u8) & 7;
                let levels = (7 ^ dirs) | (if value & 8 != 0 { 7 } else { 0 } & dirs);
                self.mon_id_reg =
                    (self.mon_id_reg & 0xF) | (self.monitor.read_sense(levels, dirs) << 4);
            }
            AMIC_INT_CTRL => self.int_ctrl.borrow_mut().int_ctrl_write(value as u8),
            AMIC_DMA_BASE_ADDR_0..=AMIC_DMA_BASE_ADDR_3 => {
                let shift = (3 - (offset & 3)) * 8;
                self.dma_base = (self.dma_base & !(0xFF << shift)) | ((value & 0xFF) << shift);
                self.dma_base &= 0xFFFC_0000;
            }
            AMIC_SCSI_DMA_BASE_0..=AMIC_SCSI_DMA_BASE_3 => {
                let shift = (3 - (offset & 3)) * 8;
                self.scsi_dma_base = (self.scsi_dma_base & !(0xFF << shift)) | ((value & 0xFF) << shift);
                self.scsi_dma_base &= 0xFFFF_FFF8;
            }
            AMIC_SCSI_DMA_CTRL => self.scsi_dma_ctrl = value as u8,
            AMIC_ENET_DMA_XMT_CTRL => info!("AMIC: Ethernet transmit DMA ctrl = 0x{:X}", value),
            AMIC_ENET_DMA_RCV_CTRL => info!("AMIC: Ethernet receive DMA ctrl = 0x{:X}", value),
            AMIC_FLOPPY_ADDR_PTR_0..=AMIC_FLOPPY_ADDR_PTR_3 => {
                let shift = (3 - (offset & 3)) * 8;
                self.floppy_addr_ptr =
                    (self.floppy_addr_ptr & !(0xFF << shift)) | ((value & 0xFF) << shift);
            }
            AMIC_FLOPPY_BYTE_CNT_HI => {
                self.floppy_byte_cnt = (self.floppy_byte_cnt & 0xFF) | ((value as u16) << 8);
            }
            AMIC_FLOPPY_BYTE_CNT_LO => {
                self.floppy_byte_cnt = (self.floppy_byte_cnt & 0xFF00) | value as u16;
            }
            AMIC_FLOPPY_DMA_CTRL => {
                if value & 1 != 0 {
                    self.floppy_addr_ptr = self.dma_base + 0x15000;
                }
                self.floppy_dma_ctrl = value as u8;
            }
            AMIC_SCC_DMA_XMT_A_CTRL | AMIC_SCC_DMA_XMT_B_CTRL | AMIC_SCC_DMA_RCV_A_CTRL
            | AMIC_SCC_DMA_RCV_B_CTRL => {
                debug!("AMIC: SCC DMA ctrl write 0x{:X} = 0x{:X}", offset, value);
            }
            _ => warn!("AMIC: unknown register write, offset=0x{:X}, value=0x{:X}", offset, value),
        }
    }
}

impl Drop for Amic {
    fn drop(&mut self) {
        if self.pseudo_vbl_tid != 0 {
            self.timers.borrow_mut().cancel_timer(self.pseudo_vbl_tid);
        }
    }
}
