// Translation tests: real-mode passthrough, BAT hits and protection,
// the hashed page-table walk with R/C updates, and fault signaling.

use emppc::cpu::{spr, Cpu, Exception, MSR_DR, MSR_IR, MSR_PR};
use emppc::cpu::{DSISR_NO_TRANS, DSISR_PROT, DSISR_STORE};
use emppc::fields::Size;
use emppc::interrupts::IntPin;
use emppc::memory::AddressMap;
use std::cell::RefCell;
use std::rc::Rc;

fn test_cpu() -> Cpu {
    let mut map = AddressMap::new();
    map.add_ram_region(0, 0x10_0000);
    map.add_ram_region(0x1000_0000, 0x1_0000);
    let map = Rc::new(RefCell::new(map));
    let mut cpu = Cpu::new(map, IntPin::new());
    cpu.msr = 0;
    cpu
}

#[test]
fn real_mode_passes_addresses_through() {
    let mut cpu = test_cpu();
    assert_eq!(cpu.translate_ifetch(0x1234).unwrap(), 0x1234);
    assert_eq!(cpu.translate_data(0xDEAD_BEEF, true).unwrap(), 0xDEAD_BEEF);
}

#[test]
fn ibat_translates_the_boot_window() {
    let mut cpu = test_cpu();
    // BEPI=0, BL=0x7FF (256 MiB), Vs=1, Vp=0; BRPN=0x10000000, PP=read/write
    cpu.spr[spr::IBAT0U] = 0x0000_1FFE;
    cpu.spr[spr::IBAT0L] = 0x1000_0002;
    cpu.bat_update(spr::IBAT0U);
    cpu.msr = MSR_IR;
    assert_eq!(cpu.translate_ifetch(0x0000_1000).unwrap(), 0x1000_1000);
}

#[test]
fn bat_validity_respects_problem_state() {
    let mut cpu = test_cpu();
    cpu.spr[spr::DBAT0U] = 0x0000_0003; // BL=0, Vs=1, Vp=1
    cpu.spr[spr::DBAT0L] = 0x1000_0002;
    cpu.bat_update(spr::DBAT0U);
    cpu.msr = MSR_DR;
    assert_eq!(cpu.translate_data(0x100, false).unwrap(), 0x1000_0100);
    // user-valid too, so PR=1 still hits
    cpu.msr = MSR_DR | MSR_PR;
    assert_eq!(cpu.translate_data(0x100, false).unwrap(), 0x1000_0100);

    // supervisor-only BAT stops matching in problem state and the access
    // falls through to the (empty) page table
    cpu.spr[spr::DBAT0U] = 0x0000_0002;
    cpu.bat_update(spr::DBAT0U);
    match cpu.translate_data(0x100, false) {
        Err(Exception::DataStorage { dsisr, .. }) => {
            assert_eq!(dsisr & DSISR_NO_TRANS, DSISR_NO_TRANS);
        }
        other => panic!("expected a data storage fault, got {:?}", other),
    }
}

#[test]
fn read_only_bat_faults_on_store() {
    let mut cpu = test_cpu();
    cpu.spr[spr::DBAT0U] = 0x0000_0002;
    cpu.spr[spr::DBAT0L] = 0x1000_0001; // PP=01, read only
    cpu.bat_update(spr::DBAT0U);
    cpu.msr = MSR_DR;
    assert!(cpu.translate_data(0x40, false).is_ok());
    match cpu.translate_data(0x40, true) {
        Err(Exception::DataStorage { dar, dsisr }) => {
            assert_eq!(dar, 0x40);
            assert_eq!(dsisr & (DSISR_PROT | DSISR_STORE), DSISR_PROT | DSISR_STORE);
        }
        other => panic!("expected a protection fault, got {:?}", other),
    }
}

// One valid PTE mapping EA page `page_index` of VSID `vsid` to RPN `rpn`.
fn plant_pte(cpu: &Cpu, pteg: u32, slot: u32, vsid: u32, api: u32, rpn: u32, pp: u32) {
    let w0 = 0x8000_0000 | (vsid << 7) | api;
    let w1 = (rpn & 0xFFFF_F000) | pp;
    let map = cpu.map.borrow();
    map.write(pteg + slot * 8, w0, Size::Word);
    map.write(pteg + slot * 8 + 4, w1, Size::Word);
}

fn page_table_cpu(vsid: u32) -> Cpu {
    let mut cpu = test_cpu();
    cpu.spr[spr::SDR1] = 0x000F_0000; // HTABORG=0xF0000, HTABMASK=0
    cpu.sr[0] = vsid;
    cpu.msr = MSR_DR;
    cpu
}

#[test]
fn page_table_walk_translates_and_sets_rc_bits() {
    let vsid = 0x123;
    let mut cpu = page_table_cpu(vsid);
    let ea = 0x0000_5000u32;
    let page_index = (ea >> 12) & 0xFFFF;
    let hash = (vsid & 0x7_FFFF) ^ page_index;
    let pteg = 0x000F_0000 | ((hash & 0x3FF) << 6);
    plant_pte(&cpu, pteg, 3, vsid, (ea >> 22) & 0x3F, 0x0006_6000, 2);

    assert_eq!(cpu.translate_data(ea, false).unwrap(), 0x0006_6000);
    let w1 = cpu.map.borrow().read(pteg + 3 * 8 + 4, Size::Word);
    assert_eq!(w1 & 0x100, 0x100); // R set
    assert_eq!(w1 & 0x80, 0); // C not yet

    assert_eq!(cpu.translate_data(ea + 0x10, true).unwrap(), 0x0006_6010);
    let w1 = cpu.map.borrow().read(pteg + 3 * 8 + 4, Size::Word);
    assert_eq!(w1 & 0x80, 0x80); // C set by the store
}

#[test]
fn secondary_hash_is_searched_on_primary_miss() {
    let vsid = 0x456;
    let mut cpu = page_table_cpu(vsid);
    let ea = 0x0000_3000u32;
    let page_index = (ea >> 12) & 0xFFFF;
    let hash2 = !((vsid & 0x7_FFFF) ^ page_index) & 0x7_FFFF;
    let pteg = 0x000F_0000 | ((hash2 & 0x3FF) << 6);
    // H bit set marks a secondary-hash entry
    let w0 = 0x8000_0000 | (vsid << 7) | 0x40 | ((ea >> 22) & 0x3F);
    let map = Rc::clone(&cpu.map);
    map.borrow().write(pteg, w0, Size::Word);
    map.borrow().write(pteg + 4, 0x0007_7000 | 2, Size::Word);

    assert_eq!(cpu.translate_data(ea, false).unwrap(), 0x0007_7000);
}

#[test]
fn page_miss_signals_data_storage() {
    let mut cpu = page_table_cpu(0x789);
    match cpu.translate_data(0x9000, true) {
        Err(Exception::DataStorage { dar, dsisr }) => {
            assert_eq!(dar, 0x9000);
            assert_eq!(dsisr & DSISR_NO_TRANS, DSISR_NO_TRANS);
            assert_eq!(dsisr & DSISR_STORE, DSISR_STORE);
        }
        other => panic!("expected a miss fault, got {:?}", other),
    }
}

#[test]
fn page_protection_key_enforced_in_user_mode() {
    let vsid = 0x2000_0000 | 0x321; // Kp set
    let mut cpu = page_table_cpu(vsid);
    let ea = 0x0000_2000u32;
    let page_index = (ea >> 12) & 0xFFFF;
    let hash = (0x321u32 & 0x7_FFFF) ^ page_index;
    let pteg = 0x000F_0000 | ((hash & 0x3FF) << 6);
    plant_pte(&cpu, pteg, 0, 0x321, (ea >> 22) & 0x3F, 0x0005_5000, 1); // PP=01

    // supervisor (key 0): read-write
    assert!(cpu.translate_data(ea, true).is_ok());
    // user (key 1): read only
    cpu.msr |= MSR_PR;
    assert!(cpu.translate_data(ea, false).is_ok());
    match cpu.translate_data(ea, true) {
        Err(Exception::DataStorage { dsisr, .. }) => {
            assert_eq!(dsisr & DSISR_PROT, DSISR_PROT);
        }
        other => panic!("expected a protection fault, got {:?}", other),
    }
}

#[test]
fn translation_rewalks_after_pte_change() {
    let vsid = 0x111;
    let mut cpu = page_table_cpu(vsid);
    let ea = 0x0000_4000u32;
    let page_index = (ea >> 12) & 0xFFFF;
    let hash = (vsid & 0x7_FFFF) ^ page_index;
    let pteg = 0x000F_0000 | ((hash & 0x3FF) << 6);
    plant_pte(&cpu, pteg, 0, vsid, (ea >> 22) & 0x3F, 0x0004_4000, 2);

    assert_eq!(cpu.translate_data(ea, false).unwrap(), 0x0004_4000);
    // retarget the PTE; after tlbie the next walk must see the new RPN
    plant_pte(&cpu, pteg, 0, vsid, (ea >> 22) & 0x3F, 0x0008_8000, 2);
    cpu.tlb_invalidate(ea);
    assert_eq!(cpu.translate_data(ea, false).unwrap(), 0x0008_8000);
}

#[test]
fn bat_store_triggers_immediate_rederive() {
    let mut cpu = test_cpu();
    cpu.msr = MSR_DR;
    cpu.spr[spr::DBAT0U] = 0x0000_0002;
    cpu.spr[spr::DBAT0L] = 0x1000_0002;
    cpu.bat_update(spr::DBAT0U);
    assert_eq!(cpu.translate_data(0x30, false).unwrap(), 0x1000_0030);
    // repoint the BAT pair; translation must follow at once
    cpu.spr[spr::DBAT0L] = 0x1001_0002;
    cpu.bat_update(spr::DBAT0L);
    assert_eq!(cpu.translate_data(0x30, false).unwrap(), 0x1001_0030);
}
