// Ethernet cells. BigMac (Heathrow machines) is modeled down to the two
// serial-bit state machines the firmware actually exercises: the MII
// management interface bit-banged through MIF_CSR against an emulated
// PHY, and the 93C46-style serial EEPROM behind SROM_CSR. MACE (Grand
// Central machines) is a register file with the reset/identity behavior
// drivers probe for. Frame traffic stays out of scope beyond the maps.

use log::{debug, info, warn};
use std::cell::RefCell;
use std::rc::Rc;

// BigMac register offsets (halfword registers, 16-byte stride).
pub mod bmac {
    pub const XIFC: u16 = 0x000;
    pub const TX_FIFO_CSR: u16 = 0x100;
    pub const TX_FIFO_TH: u16 = 0x110;
    pub const RX_FIFO_CSR: u16 = 0x120;
    pub const MEM_ADD: u16 = 0x130;
    pub const MEM_DATA_HI: u16 = 0x140;
    pub const MEM_DATA_LO: u16 = 0x150;
    pub const XCVR_IF: u16 = 0x160;
    pub const CHIP_ID: u16 = 0x170;
    pub const MIF_CSR: u16 = 0x180;
    pub const SROM_CSR: u16 = 0x190;
    pub const TX_PNTR: u16 = 0x1A0;
    pub const RX_PNTR: u16 = 0x1B0;
    pub const GLOB_STAT: u16 = 0x200;
    pub const EVENT_MASK: u16 = 0x210;
    pub const TX_SW_RST: u16 = 0x420;
    pub const TX_CONFIG: u16 = 0x430;
    pub const IPG_1: u16 = 0x440;
    pub const IPG_2: u16 = 0x450;
    pub const A_LIMIT: u16 = 0x460;
    pub const SLOT: u16 = 0x470;
    pub const PA_LEN: u16 = 0x480;
    pub const PA_PAT: u16 = 0x490;
    pub const TX_SFD: u16 = 0x4A0;
    pub const JAM_SIZE: u16 = 0x4B0;
    pub const TX_MAX: u16 = 0x4C0;
    pub const TX_MIN: u16 = 0x4D0;
    pub const PEAK_ATT: u16 = 0x4E0;
    pub const DEFER_TMR: u16 = 0x4F0;
    pub const NC_CNT: u16 = 0x500;
    pub const NT_CNT: u16 = 0x510;
    pub const EX_CNT: u16 = 0x520;
    pub const LT_CNT: u16 = 0x530;
    pub const RNG_SEED: u16 = 0x540;
    pub const TX_SM: u16 = 0x550;
    pub const RX_SW_RST: u16 = 0x620;
    pub const RX_CONFIG: u16 = 0x630;
    pub const RX_MAX: u16 = 0x640;
    pub const RX_MIN: u16 = 0x650;
    pub const MAC_ADDR_2: u16 = 0x660;
    pub const MAC_ADDR_1: u16 = 0x670;
    pub const MAC_ADDR_0: u16 = 0x680;
    pub const RX_FRM_CNT: u16 = 0x690;
    pub const RX_LE_CNT: u16 = 0x6A0;
    pub const RX_AE_CNT: u16 = 0x6B0;
    pub const RX_FE_CNT: u16 = 0x6C0;
    pub const RX_ST_MCHN: u16 = 0x6D0;
    pub const RX_CVE_CNT: u16 = 0x6E0;
    pub const HASH_TAB_3: u16 = 0x700;
    pub const HASH_TAB_2: u16 = 0x710;
    pub const HASH_TAB_1: u16 = 0x720;
    pub const HASH_TAB_0: u16 = 0x730;
    pub const AFR_2: u16 = 0x740;
    pub const AFR_1: u16 = 0x750;
    pub const AFR_0: u16 = 0x760;
    pub const AFC_R: u16 = 0x770;
}

// MIF_CSR bits.
const MIF_CLOCK: u16 = 0x01;
const MIF_DATA_OUT: u16 = 0x02;
const MIF_DATA_OUT_EN: u16 = 0x04;
const MIF_DATA_IN: u16 = 0x08;

// SROM_CSR bits.
const SROM_CHIP_SELECT: u16 = 0x01;
const SROM_CLOCK: u16 = 0x02;
const SROM_DATA_IN: u16 = 0x04;
const SROM_DATA_OUT: u16 = 0x08;

const BMAC_CHIP_ID: u16 = 0x334; // BigMac cell in Heathrow

// MII frame walk states.
#[derive(Debug, Copy, Clone, PartialEq)]
enum MiiFrameSm {
    Preamble,
    Start,
    Opcode,
    PhyAddr,
    RegAddr,
    Turnaround,
    ReadData,
    WriteData,
    Stop,
}

// Emulated PHY: enough of a DP83843 for link probing.
struct MiiPhy {
    regs: [u16; 32],
}

impl MiiPhy {
    fn new() -> Self {
        let mut phy = MiiPhy { regs: [0; 32] };
        phy.reset();
        phy
    }

    fn reset(&mut self) {
        self.regs = [0; 32];
        self.regs[0] = 0x3000; // autoneg enabled, full speed
        self.regs[1] = 0x7869; // extended caps, autoneg complete, link up
        self.regs[2] = 0x2000; // OUI / model (DP83843 style)
        self.regs[3] = 0x5C01;
        self.regs[4] = 0x01E1; // advertise 10/100 full/half
    }

    fn read(&self, reg: u8) -> u16 {
        self.regs[(reg & 31) as usize]
    }

    fn write(&mut self, reg: u8, value: u16) {
        let reg = reg & 31;
        debug!("PHY register {} = 0x{:04X}", reg, value);
        if reg == 0 && value & 0x8000 != 0 {
            self.reset(); // the reset bit self-clears
        } else {
            self.regs[reg as usize] = value;
        }
    }
}

pub type BigMacPtr = Rc<RefCell<BigMac>>;

pub struct BigMac {
    chip_id: u16,
    tx_if_ctrl: u16,
    xcvr_if_ctrl: u16,
    tx_fifo_tresh: u16,
    tx_ptr: u16,
    rx_ptr: u16,
    mem_add: u16,
    stat: u16,
    event_mask: u16,
    tx_config: u16,
    rx_config: u16,
    tx_max: u16,
    tx_min: u16,
    rx_max: u16,
    rx_min: u16,
    rng_seed: u16,
    counters: [u16; 8],
    mac_addr_flt: [u16; 3],
    hash_table: [u16; 4],
    addr_filters: [u16; 3],
    addr_filt_mask: u16,
    misc: [u16; 10],

    // MII management interface state.
    mif_csr_old: u16,
    mii_sm: MiiFrameSm,
    mii_bit_count: u8,
    mii_shift: u32,
    mii_opcode: u8,
    mii_phy_addr: u8,
    mii_reg_addr: u8,
    mii_in_bit: u16,
    phy: MiiPhy,

    // Serial EEPROM state.
    srom_csr_old: u16,
    srom_bit_count: u8,
    srom_shift: u32,
    srom_addr: u8,
    srom_in_bit: u16,
    srom_data: [u16; 64],
}

impl BigMac {
    pub fn new(mac_address: [u8; 6]) -> BigMacPtr {
        let mut srom_data = [0u16; 64];
        // the first words carry the station address
        for i in 0..3 {
            srom_data[i] = ((mac_address[i * 2] as u16) << 8) | mac_address[i * 2 + 1] as u16;
        }
        let mut bm = BigMac {
            chip_id: BMAC_CHIP_ID,
            tx_if_ctrl: 0,
            xcvr_if_ctrl: 0,
            tx_fifo_tresh: 0,
            tx_ptr: 0,
            rx_ptr: 0,
            mem_add: 0,
            stat: 0,
            event_mask: 0xFFFF,
            tx_config: 0,
            rx_config: 0,
            tx_max: 0,
            tx_min: 0,
            rx_max: 0,
            rx_min: 0,
            rng_seed: 0,
            counters: [0; 8],
            mac_addr_flt: [0; 3],
            hash_table: [0; 4],
            addr_filters: [0; 3],
            addr_filt_mask: 0,
            misc: [0; 10],
            mif_csr_old: 0,
            mii_sm: MiiFrameSm::Preamble,
            mii_bit_count: 0,
            mii_shift: 0,
            mii_opcode: 0,
            mii_phy_addr: 0,
            mii_reg_addr: 0,
            mii_in_bit: 0,
            phy: MiiPhy::new(),
            srom_csr_old: 0,
            srom_bit_count: 0,
            srom_shift: 0,
            srom_addr: 0,
            srom_in_bit: 1,
            srom_data,
        };
        bm.chip_reset();
        Rc::new(RefCell::new(bm))
    }

    pub fn chip_reset(&mut self) {
        self.event_mask = 0xFFFF; // mask all on-chip event interrupts
        self.stat = 0;
        self.rng_seed = 0x1F2E; // free-running counter snapshot on real HW
        self.phy.reset();
        self.mii_reset();
        self.srom_reset();
    }

    pub fn read(&mut self, reg_offset: u16) -> u16 {
        match reg_offset {
            bmac::XIFC => self.tx_if_ctrl,
            bmac::XCVR_IF => self.xcvr_if_ctrl,
            bmac::CHIP_ID => self.chip_id,
            bmac::TX_FIFO_TH => self.tx_fifo_tresh,
            bmac::TX_PNTR => self.tx_ptr,
            bmac::RX_PNTR => self.rx_ptr,
            bmac::MIF_CSR => (self.mif_csr_old & !MIF_DATA_IN) | (self.mii_in_bit << 3),
            bmac::GLOB_STAT => {
                let old = self.stat;
                self.stat = 0; // clear-on-read
                old
            }
            bmac::EVENT_MASK => self.event_mask,
            bmac::SROM_CSR => (self.srom_csr_old & !SROM_DATA_IN) | (self.srom_in_bit << 2),
            bmac::TX_SW_RST | bmac::RX_SW_RST => 0, // resets have completed
            bmac::TX_CONFIG => self.tx_config,
            bmac::RX_CONFIG => self.rx_config,
            bmac::TX_MAX => self.tx_max,
            bmac::TX_MIN => self.tx_min,
            bmac::RX_MAX => self.rx_max,
            bmac::RX_MIN => self.rx_min,
            bmac::RNG_SEED => self.rng_seed,
            bmac::NC_CNT => self.counters[0],
            bmac::EX_CNT => self.counters[1],
            bmac::LT_CNT => self.counters[2],
            bmac::RX_FRM_CNT => self.counters[3],
            bmac::RX_LE_CNT => self.counters[4],
            bmac::RX_AE_CNT => self.counters[5],
            bmac::RX_FE_CNT => self.counters[6],
            bmac::RX_CVE_CNT => self.counters[7],
            bmac::MEM_ADD => self.mem_add,
            bmac::MEM_DATA_HI => self.misc[2],
            bmac::MEM_DATA_LO => self.misc[3],
            bmac::MAC_ADDR_0 | bmac::MAC_ADDR_1 | bmac::MAC_ADDR_2 => {
                self.mac_addr_flt[(8 - ((reg_offset >> 4) & 0xF)) as usize]
            }
            bmac::HASH_TAB_0 | bmac::HASH_TAB_1 | bmac::HASH_TAB_2 | bmac::HASH_TAB_3 => {
                self.hash_table[((reg_offset >> 4) & 3) as usize]
            }
            bmac::AFR_0 | bmac::AFR_1 | bmac::AFR_2 => {
                self.addr_filters[(((reg_offset >> 4) & 0xF) - 4) as usize]
            }
            bmac::AFC_R => self.addr_filt_mask,
            bmac::TX_SM | bmac::RX_ST_MCHN => 0,
            _ => {
                warn!("BigMac: unimplemented register at 0x{:X}", reg_offset);
                0
            }
        }
    }

    pub fn write(&mut self, reg_offset: u16, value: u16) {
        match reg_offset {
            bmac::XIFC => self.tx_if_ctrl = value,
            bmac::XCVR_IF => self.xcvr_if_ctrl = value,
            bmac::TX_FIFO_CSR => self.misc[0] = value,
            bmac::RX_FIFO_CSR => self.misc[1] = value,
            bmac::TX_FIFO_TH => self.tx_fifo_tresh = value,
            bmac::MEM_DATA_HI => self.misc[2] = value,
            bmac::MEM_DATA_LO => self.misc[3] = value,
            bmac::TX_PNTR => self.tx_ptr = value,
            bmac::RX_PNTR => self.rx_ptr = value,
            bmac::MEM_ADD => self.mem_add = value,
            bmac::EVENT_MASK => self.event_mask = value,
            bmac::MIF_CSR => {
                let rising = (self.mif_csr_old ^ value) & MIF_CLOCK != 0 && value & MIF_CLOCK != 0;
                if rising {
                    if value & MIF_DATA_OUT_EN != 0 {
                        self.mii_xmit_bit(value & MIF_DATA_OUT != 0);
                    } else {
                        self.mii_rcv_bit();
                    }
                }
                self.mif_csr_old = value;
            }
            bmac::SROM_CSR => {
                if value & SROM_CHIP_SELECT != 0 {
                    let rising = (self.srom_csr_old ^ value) & SROM_CLOCK != 0 && value & SROM_CLOCK != 0;
                    if rising {
                        self.srom_xmit_bit(value & SROM_DATA_OUT != 0);
                    }
                } else {
                    self.srom_reset();
                }
                self.srom_csr_old = value;
            }
            bmac::TX_SW_RST => {
                if value == 1 {
                    info!("BigMac: transmitter soft reset asserted");
                }
            }
            bmac::RX_SW_RST => {
                if value == 0 {
                    info!("BigMac: receiver soft reset asserted");
                }
            }
            bmac::TX_CONFIG => self.tx_config = value,
            bmac::RX_CONFIG => self.rx_config = value,
            bmac::TX_MAX => self.tx_max = value,
            bmac::TX_MIN => self.tx_min = value,
            bmac::RX_MAX => self.rx_max = value,
            bmac::RX_MIN => self.rx_min = value,
            bmac::RNG_SEED => self.rng_seed = value,
            bmac::NC_CNT => self.counters[0] = value,
            bmac::NT_CNT => {}
            bmac::EX_CNT => self.counters[1] = value,
            bmac::LT_CNT => self.counters[2] = value,
            bmac::RX_FRM_CNT => self.counters[3] = value,
            bmac::RX_LE_CNT => self.counters[4] = value,
            bmac::RX_AE_CNT => self.counters[5] = value,
            bmac::RX_FE_CNT => self.counters[6] = value,
            bmac::RX_CVE_CNT => self.counters[7] = value,
            bmac::IPG_1 | bmac::IPG_2 | bmac::A_LIMIT | bmac::SLOT | bmac::PA_LEN | bmac::PA_PAT
            | bmac::TX_SFD | bmac::JAM_SIZE | bmac::PEAK_ATT | bmac::DEFER_TMR => {}
            bmac::MAC_ADDR_0 | bmac::MAC_ADDR_1 | bmac::MAC_ADDR_2 => {
                self.mac_addr_flt[(8 - ((reg_offset >> 4) & 0xF)) as usize] = value;
            }
            bmac::HASH_TAB_0 | bmac::HASH_TAB_1 | bmac::HASH_TAB_2 | bmac::HASH_TAB_3 => {
                self.hash_table[((reg_offset >> 4) & 3) as usize] = value;
            }
            bmac::AFR_0 | bmac::AFR_1 | bmac::AFR_2 => {
                self.addr_filters[(((reg_offset >> 4) & 0xF) - 4) as usize] = value;
            }
            bmac::AFC_R => self.addr_filt_mask = value,
            bmac::CHIP_ID | bmac::TX_SM | bmac::RX_ST_MCHN => {
                warn!("BigMac: attempted write to read-only register at 0x{:X}", reg_offset);
            }
            _ => warn!("BigMac: unimplemented register at 0x{:X} written with 0x{:X}", reg_offset, value),
        }
    }

    // --- MII management frame: 32 preamble ones, start 01, opcode,
    // --- PHY address, register address, turnaround, 16 data bits.

    fn mii_reset(&mut self) {
        self.mii_sm = MiiFrameSm::Preamble;
        self.mii_bit_count = 0;
        self.mii_shift = 0;
        self.mii_in_bit = 1;
    }

    fn mii_xmit_bit(&mut self, bit: bool) {
        let bit = bit as u32;
        match self.mii_sm {
            MiiFrameSm::Preamble => {
                if bit == 0 {
                    // first zero of the start delimiter
                    self.mii_sm = MiiFrameSm::Start;
                    self.mii_bit_count = 1;
                }
            }
            MiiFrameSm::Start => {
                if bit != 1 {
                    warn!("BigMac: malformed MII start delimiter");
                    self.mii_reset();
                    return;
                }
                self.mii_sm = MiiFrameSm::Opcode;
                self.mii_bit_count = 0;
                self.mii_shift = 0;
            }
            MiiFrameSm::Opcode => {
                self.mii_shift = (self.mii_shift << 1) | bit;
                self.mii_bit_count += 1;
                if self.mii_bit_count == 2 {
                    self.mii_opcode = self.mii_shift as u8;
                    self.mii_sm = MiiFrameSm::PhyAddr;
                    self.mii_bit_count = 0;
                    self.mii_shift = 0;
                }
            }
            MiiFrameSm::PhyAddr => {
                self.mii_shift = (self.mii_shift << 1) | bit;
                self.mii_bit_count += 1;
                if self.mii_bit_count == 5 {
                    self.mii_phy_addr = self.mii_shift as u8;
                    self.mii_sm = MiiFrameSm::RegAddr;
                    self.mii_bit_count = 0;
                    self.mii_shift = 0;
                }
            }
            MiiFrameSm::RegAddr => {
                self.mii_shift = (self.mii_shift << 1) | bit;
                self.mii_bit_count += 1;
                if self.mii_bit_count == 5 {
                    self.mii_reg_addr = self.mii_shift as u8;
                    self.mii_bit_count = 0;
                    self.mii_shift = 0;
                    if self.mii_opcode == 0b10 {
                        // read: we drive the turnaround and the data
                        self.mii_sm = MiiFrameSm::Turnaround;
                        self.mii_shift = self.phy.read(self.mii_reg_addr) as u32;
                    } else {
                        self.mii_sm = MiiFrameSm::WriteData;
                    }
                }
            }
            MiiFrameSm::Turnaround | MiiFrameSm::ReadData => {
                // the station keeps clocking write bits during a read
                // turnaround; ignore them
            }
            MiiFrameSm::WriteData => {
                self.mii_shift = (self.mii_shift << 1) | bit;
                self.mii_bit_count += 1;
                if self.mii_bit_count == 16 {
                    let value = self.mii_shift as u16;
                    if self.mii_phy_addr == 0 {
                        self.phy.write(self.mii_reg_addr, value);
                    } else {
                        debug!("BigMac: MII write to absent PHY {}", self.mii_phy_addr);
                    }
                    self.mii_reset();
                }
            }
            MiiFrameSm::Stop => self.mii_reset(),
        }
    }

    fn mii_rcv_bit(&mut self) {
        match self.mii_sm {
            MiiFrameSm::Turnaround => {
                self.mii_in_bit = 0; // PHY drives zero during turnaround
                self.mii_sm = MiiFrameSm::ReadData;
                self.mii_bit_count = 0;
            }
            MiiFrameSm::ReadData => {
                if self.mii_phy_addr == 0 {
                    self.mii_in_bit = ((self.mii_shift >> (15 - self.mii_bit_count)) & 1) as u16;
                } else {
                    self.mii_in_bit = 1; // absent PHYs float high
                }
                self.mii_bit_count += 1;
                if self.mii_bit_count == 16 {
                    self.mii_reset();
                }
            }
            _ => {
                self.mii_in_bit = 1;
            }
        }
    }

    // --- 93C46-style serial EEPROM: start bit, 2-bit opcode, 6-bit
    // --- address, then 16 data bits clocked out.

    fn srom_reset(&mut self) {
        self.srom_bit_count = 0;
        self.srom_shift = 0;
        self.srom_in_bit = 1;
    }

    fn srom_xmit_bit(&mut self, bit: bool) {
        self.srom_shift = (self.srom_shift << 1) | bit as u32;
        self.srom_bit_count += 1;
        if self.srom_bit_count == 9 {
            // start(1) + opcode(2) + address(6)
            let opcode = (self.srom_shift >> 6) & 7;
            if opcode == 0b110 {
                self.srom_addr = (self.srom_shift & 0x3F) as u8;
            } else {
                debug!("BigMac: unsupported SROM opcode 0x{:X}", opcode);
            }
        } else if self.srom_bit_count > 9 {
            // reads clock data out MSB first
            let data = self.srom_data[(self.srom_addr & 0x3F) as usize];
            let bit_idx = self.srom_bit_count - 10;
            self.srom_in_bit = ((data >> (15 - bit_idx.min(15))) & 1) as u16;
            if bit_idx == 15 {
                self.srom_addr = (self.srom_addr + 1) & 0x3F;
                self.srom_bit_count = 9;
            }
        }
    }
}

// ------------------------------------------------------------------- MACE

// Register indices (one per 16-byte stride in Grand Central).
pub mod mace {
    pub const RCV_FIFO: u32 = 0;
    pub const XMIT_FIFO: u32 = 1;
    pub const XMIT_FC: u32 = 2;
    pub const XMIT_FS: u32 = 3;
    pub const XMIT_RC: u32 = 4;
    pub const RCV_FC: u32 = 5;
    pub const RCV_FS: u32 = 6;
    pub const FIFO_FC: u32 = 7;
    pub const IR: u32 = 8;
    pub const IMR: u32 = 9;
    pub const PR: u32 = 10;
    pub const BIU_CC: u32 = 11;
    pub const FIFO_CC: u32 = 12;
    pub const MAC_CC: u32 = 13;
    pub const PLS_CC: u32 = 14;
    pub const PHY_CC: u32 = 15;
    pub const CHIP_ID_LO: u32 = 16;
    pub const CHIP_ID_HI: u32 = 17;
    pub const IAC: u32 = 18;
    pub const LADRF: u32 = 20;
    pub const PADR: u32 = 21;
    pub const MPC: u32 = 24;
    pub const RNTPC: u32 = 26;
    pub const RCV_CC: u32 = 27;
    pub const UTR: u32 = 29;
    pub const RTR1: u32 = 30;
    pub const RTR2: u32 = 31;
}

const MACE_CHIP_ID: u16 = 0x0940; // Am79C940 revision B

// BIU_CC bits.
const BIU_SWRST: u8 = 0x01;

// IAC bits.
const IAC_ADDRCHG: u8 = 0x80;
const IAC_PHYADDR: u8 = 0x04;
const IAC_LOGADDR: u8 = 0x02;

pub type MacePtr = Rc<RefCell<Mace>>;

pub struct Mace {
    regs: [u8; 32],
    mac_address: [u8; 6],
    addr_ptr: usize,
    ladrf_ptr: usize,
}

impl Mace {
    pub fn new(mac_address: [u8; 6]) -> MacePtr {
        Rc::new(RefCell::new(Mace {
            regs: [0; 32],
            mac_address,
            addr_ptr: 0,
            ladrf_ptr: 0,
        }))
    }

    pub fn read(&mut self, reg: u32) -> u8 {
        match reg {
            mace::CHIP_ID_LO => MACE_CHIP_ID as u8,
            mace::CHIP_ID_HI => (MACE_CHIP_ID >> 8) as u8,
            mace::IR => {
                let value = self.regs[mace::IR as usize];
                self.regs[mace::IR as usize] = 0; // clear-on-read
                value
            }
            mace::PADR => {
                let value = self.mac_address[self.addr_ptr % 6];
                self.addr_ptr += 1;
                value
            }
            mace::MPC | mace::RNTPC | mace::RCV_CC => 0, // counters idle
            r if (r as usize) < 32 => self.regs[r as usize],
            _ => 0,
        }
    }

    pub fn write(&mut self, reg: u32, value: u8) {
        match reg {
            mace::BIU_CC => {
                if value & BIU_SWRST != 0 {
                    info!("MACE: software reset");
                    self.regs = [0; 32];
                    self.addr_ptr = 0;
                    self.ladrf_ptr = 0;
                    // the reset bit self-clears
                    self.regs[mace::BIU_CC as usize] = value & !BIU_SWRST;
                } else {
                    self.regs[mace::BIU_CC as usize] = value;
                }
            }
            mace::IAC => {
                if value & IAC_ADDRCHG != 0 {
                    self.addr_ptr = 0;
                    self.ladrf_ptr = 0;
                    // address change completes instantly
                    self.regs[mace::IAC as usize] = value & !(IAC_ADDRCHG);
                } else {
                    self.regs[mace::IAC as usize] = value & (IAC_PHYADDR | IAC_LOGADDR);
                }
            }
            mace::PADR => {
                self.mac_address[self.addr_ptr % 6] = value;
                self.addr_ptr += 1;
            }
            mace::LADRF => {
                self.ladrf_ptr = (self.ladrf_ptr + 1) % 8;
            }
            mace::CHIP_ID_LO | mace::CHIP_ID_HI => {
                warn!("MACE: attempted write to read-only register {}", reg);
            }
            r if (r as usize) < 32 => self.regs[r as usize] = value,
            _ => {}
        }
    }
}
