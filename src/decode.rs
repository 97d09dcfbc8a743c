// Table-driven decode. The primary table has 64 slots indexed by bits 0..5
// of the instruction; opcodes 19 and 31 fan out through dense 1024-entry
// tables keyed by the 10-bit extended opcode, while the floating-point
// families (59, 63) split on the 5-bit A-form opcode first.

use crate::cpu::Cpu;
use crate::fields::xo10;
use crate::fpopcodes;
use crate::opcodes;

pub type OpcodeFn = fn(&mut Cpu, u32);

#[inline]
pub fn dispatch(cpu: &mut Cpu, iw: u32) {
    PRIMARY[(iw >> 26) as usize](cpu, iw);
}

fn op19(cpu: &mut Cpu, iw: u32) {
    TABLE19[xo10(iw)](cpu, iw);
}

fn op31(cpu: &mut Cpu, iw: u32) {
    TABLE31[xo10(iw)](cpu, iw);
}

pub static PRIMARY: [OpcodeFn; 64] = [
    opcodes::illegal,   // 0
    opcodes::illegal,   // 1
    opcodes::illegal,   // 2
    opcodes::twi,       // 3
    opcodes::illegal,   // 4 (AltiVec, not implemented)
    opcodes::illegal,   // 5
    opcodes::illegal,   // 6
    opcodes::mulli,     // 7
    opcodes::subfic,    // 8
    opcodes::illegal,   // 9
    opcodes::cmpli,     // 10
    opcodes::cmpi,      // 11
    opcodes::addic,     // 12
    opcodes::addic_rc,  // 13
    opcodes::addi,      // 14
    opcodes::addis,     // 15
    opcodes::bcx,       // 16
    opcodes::sc,        // 17
    opcodes::bx,        // 18
    op19,               // 19
    opcodes::rlwimi,    // 20
    opcodes::rlwinm,    // 21
    opcodes::illegal,   // 22
    opcodes::rlwnm,     // 23
    opcodes::ori,       // 24
    opcodes::oris,      // 25
    opcodes::xori,      // 26
    opcodes::xoris,     // 27
    opcodes::andi_rc,   // 28
    opcodes::andis_rc,  // 29
    opcodes::illegal,   // 30
    op31,               // 31
    opcodes::lwz,       // 32
    opcodes::lwzu,      // 33
    opcodes::lbz,       // 34
    opcodes::lbzu,      // 35
    opcodes::stw,       // 36
    opcodes::stwu,      // 37
    opcodes::stb,       // 38
    opcodes::stbu,      // 39
    opcodes::lhz,       // 40
    opcodes::lhzu,      // 41
    opcodes::lha,       // 42
    opcodes::lhau,      // 43
    opcodes::sth,       // 44
    opcodes::sthu,      // 45
    opcodes::lmw,       // 46
    opcodes::stmw,      // 47
    fpopcodes::lfs,     // 48
    fpopcodes::lfsu,    // 49
    fpopcodes::lfd,     // 50
    fpopcodes::lfdu,    // 51
    fpopcodes::stfs,    // 52
    fpopcodes::stfsu,   // 53
    fpopcodes::stfd,    // 54
    fpopcodes::stfdu,   // 55
    opcodes::illegal,   // 56
    opcodes::illegal,   // 57
    opcodes::illegal,   // 58
    fpopcodes::op59,    // 59
    opcodes::illegal,   // 60
    opcodes::illegal,   // 61
    opcodes::illegal,   // 62
    fpopcodes::op63,    // 63
];

const fn build_table19() -> [OpcodeFn; 1024] {
    let mut t: [OpcodeFn; 1024] = [opcodes::illegal; 1024];
    t[0] = opcodes::mcrf;
    t[16] = opcodes::bclrx;
    t[33] = opcodes::crnor;
    t[50] = opcodes::rfi;
    t[129] = opcodes::crandc;
    t[150] = opcodes::isync;
    t[193] = opcodes::crxor;
    t[225] = opcodes::crnand;
    t[257] = opcodes::crand;
    t[289] = opcodes::creqv;
    t[417] = opcodes::crorc;
    t[449] = opcodes::cror;
    t[528] = opcodes::bcctrx;
    t
}

const fn build_table31() -> [OpcodeFn; 1024] {
    let mut t: [OpcodeFn; 1024] = [opcodes::illegal; 1024];
    t[0] = opcodes::cmp;
    t[4] = opcodes::tw;
    t[8] = opcodes::subfc;
    t[520] = opcodes::subfc; // OE form
    t[10] = opcodes::addc;
    t[522] = opcodes::addc;
    t[11] = opcodes::mulhwu;
    t[19] = opcodes::mfcr;
    t[20] = opcodes::lwarx;
    t[23] = opcodes::lwzx;
    t[24] = opcodes::slw;
    t[26] = opcodes::cntlzw;
    t[28] = opcodes::and;
    t[32] = opcodes::cmpl;
    t[40] = opcodes::subf;
    t[552] = opcodes::subf;
    t[54] = opcodes::dcbst;
    t[55] = opcodes::lwzux;
    t[60] = opcodes::andc;
    t[75] = opcodes::mulhw;
    t[83] = opcodes::mfmsr;
    t[86] = opcodes::dcbf;
    t[87] = opcodes::lbzx;
    t[104] = opcodes::neg;
    t[616] = opcodes::neg;
    t[119] = opcodes::lbzux;
    t[124] = opcodes::nor;
    t[136] = opcodes::subfe;
    t[648] = opcodes::subfe;
    t[138] = opcodes::adde;
    t[650] = opcodes::adde;
    t[144] = opcodes::mtcrf;
    t[146] = opcodes::mtmsr;
    t[150] = opcodes::stwcx_rc;
    t[151] = opcodes::stwx;
    t[183] = opcodes::stwux;
    t[200] = opcodes::subfze;
    t[712] = opcodes::subfze;
    t[202] = opcodes::addze;
    t[714] = opcodes::addze;
    t[210] = opcodes::mtsr;
    t[215] = opcodes::stbx;
    t[232] = opcodes::subfme;
    t[744] = opcodes::subfme;
    t[234] = opcodes::addme;
    t[746] = opcodes::addme;
    t[235] = opcodes::mullw;
    t[747] = opcodes::mullw;
    t[242] = opcodes::mtsrin;
    t[246] = opcodes::dcbtst;
    t[247] = opcodes::stbux;
    t[266] = opcodes::add;
    t[778] = opcodes::add;
    t[278] = opcodes::dcbt;
    t[279] = opcodes::lhzx;
    t[284] = opcodes::eqv;
    t[306] = opcodes::tlbie;
    t[311] = opcodes::lhzux;
    t[316] = opcodes::xor;
    t[339] = opcodes::mfspr;
    t[343] = opcodes::lhax;
    t[370] = opcodes::tlbia;
    t[371] = opcodes::mftb;
    t[375] = opcodes::lhaux;
    t[407] = opcodes::sthx;
    t[412] = opcodes::orc;
    t[439] = opcodes::sthux;
    t[444] = opcodes::or;
    t[459] = opcodes::divwu;
    t[971] = opcodes::divwu;
    t[467] = opcodes::mtspr;
    t[470] = opcodes::dcbi;
    t[476] = opcodes::nand;
    t[491] = opcodes::divw;
    t[1003] = opcodes::divw;
    t[512] = opcodes::mcrxr;
    t[533] = opcodes::lswx;
    t[534] = opcodes::lwbrx;
    t[535] = fpopcodes::lfsx;
    t[536] = opcodes::srw;
    t[566] = opcodes::tlbsync;
    t[567] = fpopcodes::lfsux;
    t[595] = opcodes::mfsr;
    t[597] = opcodes::lswi;
    t[598] = opcodes::sync;
    t[599] = fpopcodes::lfdx;
    t[631] = fpopcodes::lfdux;
    t[659] = opcodes::mfsrin;
    t[661] = opcodes::stswx;
    t[662] = opcodes::stwbrx;
    t[663] = fpopcodes::stfsx;
    t[695] = fpopcodes::stfsux;
    t[725] = opcodes::stswi;
    t[727] = fpopcodes::stfdx;
    t[759] = fpopcodes::stfdux;
    t[790] = opcodes::lhbrx;
    t[792] = opcodes::sraw;
    t[824] = opcodes::srawi;
    t[854] = opcodes::eieio;
    t[918] = opcodes::sthbrx;
    t[922] = opcodes::extsh;
    t[954] = opcodes::extsb;
    t[982] = opcodes::icbi;
    t[983] = fpopcodes::stfiwx;
    t[1014] = opcodes::dcbz;
    t
}

static TABLE19: [OpcodeFn; 1024] = build_table19();
static TABLE31: [OpcodeFn; 1024] = build_table31();
