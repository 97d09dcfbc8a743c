// Effective-to-physical translation: real-mode passthrough, the four-entry
// BAT arrays, and the hashed page table. There is no TLB cache; every
// translation walks the current BATs and, failing that, the page table, so
// tlbie/tlbia have nothing to flush beyond the contract.

use crate::cpu::{spr, Cpu, Exception, MSR_DR, MSR_IR, MSR_PR};
use crate::cpu::{DSISR_DIRECT_STORE, DSISR_NO_TRANS, DSISR_PROT, DSISR_STORE};
use crate::fields::Size;

// Page table entry word 0 bits.
const PTE_VALID: u32 = 0x8000_0000;
const PTE_HASH_ID: u32 = 0x0000_0040;

// Word 1 reference/change bits.
const PTE_REF: u32 = 0x0000_0100;
const PTE_CHANGE: u32 = 0x0000_0080;

#[derive(Debug, Copy, Clone)]
pub struct BatEntry {
    valid_sup: bool,
    valid_usr: bool,
    start: u32,
    end: u32,
    phys: u32,
    block_mask: u32,
    prot: u8,
}

impl BatEntry {
    fn empty() -> Self {
        BatEntry {
            valid_sup: false,
            valid_usr: false,
            start: 0,
            end: 0,
            phys: 0,
            block_mask: 0,
            prot: 0,
        }
    }
}

pub struct MmuState {
    pub ibat: [BatEntry; 4],
    pub dbat: [BatEntry; 4],
}

impl MmuState {
    pub fn new() -> Self {
        MmuState { ibat: [BatEntry::empty(); 4], dbat: [BatEntry::empty(); 4] }
    }
}

fn derive_bat(upper: u32, lower: u32) -> BatEntry {
    let bl = (upper >> 2) & 0x7FF;
    let block_mask = (bl << 17) | 0x1FFFF;
    let start = upper & 0xFFFE_0000;
    BatEntry {
        valid_sup: upper & 2 != 0,
        valid_usr: upper & 1 != 0,
        start,
        end: start | block_mask,
        phys: lower & 0xFFFE_0000,
        block_mask,
        prot: (lower & 3) as u8,
    }
}

impl Cpu {
    /// Re-derive the cached block for the BAT pair owning this SPR.
    /// Called on every store to SPRs 528..543.
    pub fn bat_update(&mut self, spr_num: usize) {
        let pair = (spr_num - spr::IBAT0U) / 2;
        if pair < 4 {
            let upper = self.spr[spr::IBAT0U + pair * 2];
            let lower = self.spr[spr::IBAT0U + pair * 2 + 1];
            self.mmu.ibat[pair] = derive_bat(upper, lower);
        } else {
            let pair = pair - 4;
            let upper = self.spr[spr::DBAT0U + pair * 2];
            let lower = self.spr[spr::DBAT0U + pair * 2 + 1];
            self.mmu.dbat[pair] = derive_bat(upper, lower);
        }
    }

    /// There is no translation cache to shoot down; the contract point
    /// exists so tlbie/tlbia have a seam and tests can observe re-walks.
    pub fn tlb_invalidate(&mut self, _ea: u32) {}

    pub fn translate_ifetch(&mut self, ea: u32) -> Result<u32, Exception> {
        if self.msr & MSR_IR == 0 {
            return Ok(ea);
        }
        match self.bat_lookup(ea, true, false) {
            Some(result) => result,
            None => self.page_translate(ea, true, false),
        }
    }

    pub fn translate_data(&mut self, ea: u32, write: bool) -> Result<u32, Exception> {
        if self.msr & MSR_DR == 0 {
            return Ok(ea);
        }
        match self.bat_lookup(ea, false, write) {
            Some(result) => result,
            None => self.page_translate(ea, false, write),
        }
    }

    // First matching BAT wins; a match with insufficient protection faults
    // rather than falling through to the page table.
    fn bat_lookup(&self, ea: u32, instr: bool, write: bool) -> Option<Result<u32, Exception>> {
        let bats = if instr { &self.mmu.ibat } else { &self.mmu.dbat };
        let supervisor = self.msr & MSR_PR == 0;
        for bat in bats.iter() {
            let valid = if supervisor { bat.valid_sup } else { bat.valid_usr };
            if !valid || ea < bat.start || ea > bat.end {
                continue;
            }
            // PP: 00 no access, 10 read/write, x1 read only.
            let allowed = match bat.prot {
                0 => false,
                2 => true,
                _ => !write,
            };
            if !allowed {
                return Some(Err(self.access_fault(ea, instr, write)));
            }
            return Some(Ok(bat.phys | (ea & bat.block_mask)));
        }
        None
    }

    fn access_fault(&self, ea: u32, instr: bool, write: bool) -> Exception {
        if instr {
            Exception::InstStorage { srr1: DSISR_PROT }
        } else {
            let mut dsisr = DSISR_PROT;
            if write {
                dsisr |= DSISR_STORE;
            }
            Exception::DataStorage { dar: ea, dsisr }
        }
    }

    fn miss_fault(&self, ea: u32, instr: bool, write: bool) -> Exception {
        if instr {
            Exception::InstStorage { srr1: DSISR_NO_TRANS }
        } else {
            let mut dsisr = DSISR_NO_TRANS;
            if write {
                dsisr |= DSISR_STORE;
            }
            Exception::DataStorage { dar: ea, dsisr }
        }
    }

    fn page_translate(&mut self, ea: u32, instr: bool, write: bool) -> Result<u32, Exception> {
        let seg = self.sr[(ea >> 28) as usize];
        if seg & 0x8000_0000 != 0 {
            // Direct-store segments are not implemented on this machine class.
            if instr {
                return Err(Exception::InstStorage { srr1: DSISR_DIRECT_STORE });
            }
            let mut dsisr = DSISR_DIRECT_STORE;
            if write {
                dsisr |= DSISR_STORE;
            }
            return Err(Exception::DataStorage { dar: ea, dsisr });
        }
        let key = if self.msr & MSR_PR != 0 {
            seg & 0x2000_0000 != 0 // Kp
        } else {
            seg & 0x4000_0000 != 0 // Ks
        };
        let vsid = seg & 0x00FF_FFFF;
        let page_index = (ea >> 12) & 0xFFFF;
        let api = (ea >> 22) & 0x3F;
        let hash1 = (vsid & 0x7_FFFF) ^ page_index;

        for (hash_id, hash) in [(0u32, hash1), (1u32, !hash1 & 0x7_FFFF)].iter() {
            let pteg = self.pteg_addr(*hash);
            for slot in 0..8 {
                let pte_pa = pteg + slot * 8;
                let w0 = self.map.borrow().read(pte_pa, Size::Word);
                if w0 & PTE_VALID == 0 {
                    continue;
                }
                if ((w0 & PTE_HASH_ID) != 0) != (*hash_id != 0) {
                    continue;
                }
                if (w0 >> 7) & 0xFF_FFFF != vsid || w0 & 0x3F != api {
                    continue;
                }
                let w1 = self.map.borrow().read(pte_pa + 4, Size::Word);
                let pp = w1 & 3;
                let allowed = if key {
                    match pp {
                        0 => false,
                        2 => true,
                        _ => !write, // 01 and 11 are read only
                    }
                } else {
                    pp != 3 || !write
                };
                if !allowed {
                    return Err(self.access_fault(ea, instr, write));
                }
                let mut new_w1 = w1 | PTE_REF;
                if write {
                    new_w1 |= PTE_CHANGE;
                }
                if new_w1 != w1 {
                    self.map.borrow().write(pte_pa + 4, new_w1, Size::Word);
                }
                return Ok((new_w1 & 0xFFFF_F000) | (ea & 0xFFF));
            }
        }
        Err(self.miss_fault(ea, instr, write))
    }

    // PTEG address generation per the PEM: HTABORG high bits pass through,
    // the middle bits are OR-merged with the masked high hash bits, the low
    // ten hash bits select the group.
    fn pteg_addr(&self, hash: u32) -> u32 {
        let sdr1 = self.spr[spr::SDR1];
        let htaborg = sdr1 & 0xFFFF_0000;
        let htabmask = sdr1 & 0x1FF;
        let hash_hi = (hash >> 10) & 0x1FF;
        let hash_lo = hash & 0x3FF;
        (htaborg & 0xFE00_0000)
            | (htaborg & 0x01FF_0000)
            | ((hash_hi & htabmask) << 16)
            | (hash_lo << 6)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bat_block_mask_scales_with_bl() {
        // BL = 0x7FF selects a 256 MiB block.
        let bat = derive_bat(0x0000_1FFE, 0x1000_0002);
        assert!(bat.valid_sup);
        assert!(!bat.valid_usr);
        assert_eq!(bat.start, 0);
        assert_eq!(bat.end, 0x0FFF_FFFF);
        assert_eq!(bat.phys, 0x1000_0000);
        assert_eq!(bat.prot, 2);
    }
}
