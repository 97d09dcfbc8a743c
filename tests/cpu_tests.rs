// Interpreter tests: the literal boot scenarios plus the architectural
// properties of CR0/XER updates, carries, rotates and reservations.

use emppc::cpu::{spr, Cpu, MSR_DR, MSR_IP};
use emppc::fields::{Size, XER_CA, XER_OV, XER_SO};
use emppc::interrupts::IntPin;
use emppc::memory::AddressMap;
use std::cell::RefCell;
use std::rc::Rc;

const RAM_BASE: u32 = 0;
const RAM_SIZE: u32 = 0x10_0000;

fn test_cpu() -> Cpu {
    let mut map = AddressMap::new();
    map.add_ram_region(RAM_BASE, RAM_SIZE);
    let map = Rc::new(RefCell::new(map));
    let mut cpu = Cpu::new(map, IntPin::new());
    // run straight out of low RAM in real mode
    cpu.msr = 0;
    cpu.nia = 0x1000;
    cpu
}

fn put_code(cpu: &Cpu, addr: u32, code: &[u32]) {
    let map = cpu.map.borrow();
    for (i, &iw) in code.iter().enumerate() {
        map.write(addr + 4 * i as u32, iw, Size::Word);
    }
}

fn d_form(op: u32, rd: u32, ra: u32, imm: u32) -> u32 {
    (op << 26) | (rd << 21) | (ra << 16) | (imm & 0xFFFF)
}

fn x_form(rd: u32, ra: u32, rb: u32, xo: u32, rc: u32) -> u32 {
    (31 << 26) | (rd << 21) | (ra << 16) | (rb << 11) | (xo << 1) | rc
}

#[test]
fn addi_cmpwi_beq_sequence() {
    let mut cpu = test_cpu();
    cpu.gpr[3] = 5;
    put_code(
        &cpu,
        0x1000,
        &[
            0x3883_FFFB, // addi r4,r3,-5
            0x2C04_0000, // cmpwi cr0,r4,0
            0x4182_0008, // beq .+8
        ],
    );
    cpu.step();
    cpu.step();
    cpu.step();
    assert_eq!(cpu.gpr[4], 0);
    assert_eq!(cpu.cr_field(0) & 0b0010, 0b0010); // EQ
    assert_eq!(cpu.nia, 0x1010); // 4 + 4 + 8 bytes of progress
}

#[test]
fn lwarx_stwcx_success_then_failure() {
    let mut cpu = test_cpu();
    cpu.map.borrow().write(0x1000 + 0x7000, 0, Size::Word); // touch RAM
    cpu.map.borrow().write(0x8000, 0xDEAD_BEEF, Size::Word);
    cpu.gpr[3] = 0x8000;
    cpu.gpr[6] = 0x0102_0304;
    put_code(
        &cpu,
        0x1000,
        &[
            x_form(5, 0, 3, 20, 0),  // lwarx r5,0,r3
            x_form(6, 0, 3, 150, 1), // stwcx. r6,0,r3
            x_form(6, 0, 3, 150, 1), // stwcx. r6,0,r3 (no reservation now)
        ],
    );
    cpu.step();
    assert_eq!(cpu.gpr[5], 0xDEAD_BEEF);
    cpu.step();
    assert_eq!(cpu.map.borrow().read(0x8000, Size::Word), 0x0102_0304);
    assert_eq!(cpu.cr_field(0) & 0b0010, 0b0010); // EQ = store happened
    cpu.step();
    assert_eq!(cpu.cr_field(0) & 0b0010, 0); // second stwcx. fails
}

#[test]
fn reset_state_fetches_the_high_vector() {
    let mut map = AddressMap::new();
    let rom = map.add_rom_region(0xFFC0_0000, 0x40_0000);
    {
        let mut rom = rom.borrow_mut();
        let off = (0xFFF0_0100u32 - 0xFFC0_0000) as usize;
        rom[off..off + 4].copy_from_slice(&0x4800_0000u32.to_be_bytes()); // b .
    }
    let map = Rc::new(RefCell::new(map));
    let mut cpu = Cpu::new(map, IntPin::new());
    assert_eq!(cpu.msr, MSR_IP); // MSR = 0x40 out of reset
    cpu.step();
    assert_eq!(cpu.pc, 0xFFF0_0100);
    assert_eq!(cpu.cur_instr, 0x4800_0000);
    assert_eq!(cpu.nia, 0xFFF0_0100); // branch to self
}

#[test]
fn rc_forms_mirror_signed_compare_in_cr0() {
    let mut cpu = test_cpu();
    cpu.gpr[1] = 0xFFFF_FFFF;
    cpu.gpr[2] = 1;
    put_code(
        &cpu,
        0x1000,
        &[
            x_form(3, 1, 2, 266, 1), // add. r3,r1,r2 -> 0, EQ
            x_form(4, 1, 1, 266, 1), // add. r4,r1,r1 -> negative, LT
            x_form(5, 2, 2, 266, 1), // add. r5,r2,r2 -> positive, GT
        ],
    );
    cpu.step();
    assert_eq!(cpu.cr_field(0), 0b0010);
    cpu.step();
    assert_eq!(cpu.cr_field(0), 0b1000);
    cpu.step();
    assert_eq!(cpu.cr_field(0), 0b0100);
}

#[test]
fn overflow_sets_ov_and_sticky_so() {
    let mut cpu = test_cpu();
    cpu.gpr[1] = 0x7FFF_FFFF;
    cpu.gpr[2] = 1;
    put_code(
        &cpu,
        0x1000,
        &[
            x_form(3, 1, 2, 266 + 512, 0), // addo r3,r1,r2 -> overflow
            x_form(4, 2, 2, 266 + 512, 0), // addo r4,r2,r2 -> clean
        ],
    );
    cpu.step();
    assert_eq!(cpu.xer() & (XER_OV | XER_SO), XER_OV | XER_SO);
    cpu.step();
    // OV reflects the last operation, SO stays sticky
    assert_eq!(cpu.xer() & XER_OV, 0);
    assert_eq!(cpu.xer() & XER_SO, XER_SO);
}

#[test]
fn carry_rules_for_add_and_subtract() {
    let mut cpu = test_cpu();
    cpu.gpr[1] = 0xFFFF_FFFF;
    cpu.gpr[2] = 1;
    cpu.gpr[3] = 5;
    cpu.gpr[4] = 3;
    put_code(
        &cpu,
        0x1000,
        &[
            x_form(5, 1, 2, 10, 0),  // addc r5,r1,r2 -> carry out
            x_form(6, 1, 2, 138, 0), // adde r6,r1,r2 -> 0x00000001, keeps carry
            x_form(7, 4, 3, 8, 0),   // subfc r7,r4,r3 = 5-3, no borrow -> CA
            x_form(8, 3, 4, 8, 0),   // subfc r8,r3,r4 = 3-5, borrow -> no CA
        ],
    );
    cpu.step();
    assert_eq!(cpu.gpr[5], 0);
    assert_eq!(cpu.xer() & XER_CA, XER_CA);
    cpu.step();
    assert_eq!(cpu.gpr[6], 1); // 0xFFFFFFFF + 1 + carry
    assert_eq!(cpu.xer() & XER_CA, XER_CA);
    cpu.step();
    assert_eq!(cpu.gpr[7], 2);
    assert_eq!(cpu.xer() & XER_CA, XER_CA);
    cpu.step();
    assert_eq!(cpu.gpr[8], 0xFFFF_FFFE);
    assert_eq!(cpu.xer() & XER_CA, 0);
}

#[test]
fn multiply_and_divide_corners() {
    let mut cpu = test_cpu();
    cpu.gpr[1] = 0x8000_0000;
    cpu.gpr[2] = 0xFFFF_FFFF; // -1
    cpu.gpr[3] = 0x1234_5678;
    cpu.gpr[4] = 0;
    put_code(
        &cpu,
        0x1000,
        &[
            x_form(5, 1, 1, 75, 0),        // mulhw r5,r1,r1
            x_form(6, 3, 3, 11, 0),        // mulhwu r6,r3,r3
            x_form(7, 1, 2, 491 + 512, 0), // divwo r7,r1,r2 -> overflow
            x_form(8, 3, 4, 459 + 512, 0), // divwuo r8,r3,r4 -> div by zero
        ],
    );
    cpu.step();
    assert_eq!(cpu.gpr[5], 0x4000_0000); // (-2^31)^2 >> 32
    cpu.step();
    assert_eq!(cpu.gpr[6], ((0x1234_5678u64 * 0x1234_5678u64) >> 32) as u32);
    cpu.step();
    assert_eq!(cpu.gpr[7], 0);
    assert_eq!(cpu.xer() & XER_OV, XER_OV);
    cpu.step();
    assert_eq!(cpu.gpr[8], 0);
    assert_eq!(cpu.xer() & XER_OV, XER_OV);
}

fn m_form(op: u32, rs: u32, ra: u32, sh: u32, mb: u32, me: u32) -> u32 {
    (op << 26) | (rs << 21) | (ra << 16) | (sh << 11) | (mb << 6) | (me << 1)
}

#[test]
fn rlwinm_composes_by_mask_intersection() {
    let mut cpu = test_cpu();
    cpu.gpr[1] = 0xDEAD_BEEF;
    put_code(
        &cpu,
        0x1000,
        &[
            m_form(21, 1, 2, 8, 8, 31),  // rlwinm r2,r1,8,8,31
            m_form(21, 2, 3, 0, 16, 23), // rlwinm r3,r2,0,16,23
            m_form(21, 1, 4, 8, 16, 23), // the composed single rotate
        ],
    );
    cpu.step();
    cpu.step();
    cpu.step();
    assert_eq!(cpu.gpr[3], cpu.gpr[4]);
}

#[test]
fn big_endian_round_trip_through_byte_loads() {
    let mut cpu = test_cpu();
    let value = 0xA1B2_C3D4u32;
    cpu.map.borrow().write(0x4000, value, Size::Word);
    let map = cpu.map.borrow();
    let assembled = (map.read(0x4000, Size::Byte) << 24)
        | (map.read(0x4001, Size::Byte) << 16)
        | (map.read(0x4002, Size::Byte) << 8)
        | map.read(0x4003, Size::Byte);
    assert_eq!(assembled, value);
}

#[test]
fn branch_with_ctr_decrement_loops() {
    let mut cpu = test_cpu();
    cpu.spr[spr::CTR] = 3;
    // bdnz .+0 encoded as bc 16,0,.-0? Use bdnz back to itself: bc 16,0,0
    let bdnz_self = (16u32 << 26) | (16 << 21) | 0; // bd = 0 -> branch to itself
    put_code(&cpu, 0x1000, &[bdnz_self]);
    cpu.step();
    assert_eq!(cpu.spr[spr::CTR], 2);
    assert_eq!(cpu.nia, 0x1000); // taken
    cpu.step();
    cpu.step();
    assert_eq!(cpu.spr[spr::CTR], 0);
    assert_eq!(cpu.nia, 0x1004); // fell through on zero
}

#[test]
fn external_interrupt_honors_msr_ee() {
    let mut cpu = test_cpu();
    put_code(&cpu, 0x1000, &[d_form(14, 1, 0, 1), d_form(14, 2, 0, 2)]);
    put_code(&cpu, 0x500, &[d_form(14, 9, 0, 7)]); // handler body
    cpu.int_pin.set(true);
    cpu.step(); // EE=0: instruction executes normally
    assert_eq!(cpu.gpr[1], 1);
    cpu.msr |= emppc::cpu::MSR_EE;
    cpu.step();
    // the interrupt preempted the second addi; the handler ran instead
    assert_eq!(cpu.gpr[2], 0);
    assert_eq!(cpu.gpr[9], 7);
    assert_eq!(cpu.pc, 0x500);
    assert_eq!(cpu.spr[spr::SRR0], 0x1004);
    assert_eq!(cpu.msr & emppc::cpu::MSR_EE, 0);
}

#[test]
fn syscall_vectors_and_rfi_returns() {
    let mut cpu = test_cpu();
    cpu.msr |= MSR_DR; // something to observe being cleared
    put_code(&cpu, 0x1000, &[(17 << 26) | 2]); // sc
    let rfi = (19u32 << 26) | (50 << 1);
    put_code(&cpu, 0xC00, &[rfi]);
    cpu.step();
    assert_eq!(cpu.nia, 0xC00);
    assert_eq!(cpu.spr[spr::SRR0], 0x1004);
    assert_eq!(cpu.msr & MSR_DR, 0);
    cpu.step(); // rfi
    assert_eq!(cpu.pc, 0xC00);
    assert_eq!(cpu.nia, 0x1004);
    assert_eq!(cpu.msr & MSR_DR, MSR_DR);
}

#[test]
fn illegal_opcode_takes_program_exception() {
    let mut cpu = test_cpu();
    put_code(&cpu, 0x1000, &[0x0000_0000]);
    cpu.step();
    assert_eq!(cpu.nia, 0x700);
    assert_eq!(cpu.spr[spr::SRR1] & 0x0008_0000, 0x0008_0000);
    assert_eq!(cpu.spr[spr::SRR0], 0x1000);
}

#[test]
fn privileged_op_in_user_mode_is_rejected() {
    let mut cpu = test_cpu();
    cpu.msr |= emppc::cpu::MSR_PR;
    put_code(&cpu, 0x1000, &[x_form(1, 0, 0, 83, 0)]); // mfmsr r1
    cpu.step();
    assert_eq!(cpu.nia, 0x700);
    assert_eq!(cpu.spr[spr::SRR1] & 0x0004_0000, 0x0004_0000);
}

#[test]
fn decrementer_fires_on_sign_flip() {
    let mut cpu = test_cpu();
    cpu.msr |= emppc::cpu::MSR_EE;
    cpu.spr[spr::DEC] = 1;
    put_code(&cpu, 0x1000, &[d_form(14, 1, 0, 1), d_form(14, 2, 0, 2), d_form(14, 3, 0, 3)]);
    put_code(&cpu, 0x900, &[d_form(14, 9, 0, 9)]); // handler body
    cpu.step(); // DEC 1 -> 0
    cpu.step(); // DEC 0 -> 0xFFFFFFFF, pends
    cpu.step(); // interrupt taken before the third addi
    assert_eq!(cpu.pc, 0x900);
    assert_eq!(cpu.gpr[9], 9);
    assert_eq!(cpu.gpr[3], 0);
}

#[test]
fn dcbz_clears_a_32_byte_line() {
    let mut cpu = test_cpu();
    for i in 0..10 {
        cpu.map.borrow().write(0x5000 + i * 4, 0xFFFF_FFFF, Size::Word);
    }
    cpu.gpr[3] = 0x5008; // inside the line
    put_code(&cpu, 0x1000, &[x_form(0, 0, 3, 1014, 0)]);
    cpu.step();
    for i in 0..8 {
        assert_eq!(cpu.map.borrow().read(0x5000 + i * 4, Size::Word), 0);
    }
    assert_eq!(cpu.map.borrow().read(0x5020, Size::Word), 0xFFFF_FFFF);
}

#[test]
fn load_store_update_forms_write_back_ea() {
    let mut cpu = test_cpu();
    cpu.map.borrow().write(0x6004, 0xCAFE_F00D, Size::Word);
    cpu.gpr[1] = 0x6000;
    put_code(
        &cpu,
        0x1000,
        &[
            d_form(33, 2, 1, 4),      // lwzu r2,4(r1)
            d_form(37, 2, 1, 0x10),   // stwu r2,16(r1)
        ],
    );
    cpu.step();
    assert_eq!(cpu.gpr[2], 0xCAFE_F00D);
    assert_eq!(cpu.gpr[1], 0x6004);
    cpu.step();
    assert_eq!(cpu.gpr[1], 0x6014);
    assert_eq!(cpu.map.borrow().read(0x6014, Size::Word), 0xCAFE_F00D);
}
