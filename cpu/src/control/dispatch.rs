//! Instruction dispatch tables.
//!
//! Each mode has a table indexed by the f field.  Function codes
//! which select their instruction by j (and then possibly by a) point
//! at sub-tables.  Empty slots are invalid instructions.
use super::{Engine, Handler};
use crate::instruction::InstructionWord;

#[derive(Clone, Copy)]
enum Entry {
    Op(Handler),
    ByJ(&'static [Option<Entry>; 16]),
    ByA(&'static [Option<Entry>; 16]),
}

const fn table<const S: usize, const N: usize>(entries: [(u64, Entry); N]) -> [Option<Entry>; S] {
    let mut result = [None; S];
    let mut n = 0;
    while n < N {
        result[entries[n].0 as usize] = Some(entries[n].1);
        n += 1;
    }
    result
}

const fn op(handler: Handler) -> Entry {
    Entry::Op(handler)
}

/// Returns the handler for `iw`, or `None` for an invalid function
/// code.
pub(crate) fn lookup(iw: InstructionWord, basic_mode: bool) -> Option<Handler> {
    let mut entry = if basic_mode {
        BASIC[iw.f() as usize]
    } else {
        EXTENDED[iw.f() as usize]
    }?;
    loop {
        entry = match entry {
            Entry::Op(handler) => return Some(handler),
            Entry::ByJ(sub) => sub[iw.j() as usize]?,
            Entry::ByA(sub) => sub[iw.a() as usize]?,
        };
    }
}

// Tables shared by both modes.

static F005_BY_A: [Option<Entry>; 16] = table([
    (0o0, op(Engine::op_sz)),
    (0o1, op(Engine::op_snz)),
    (0o2, op(Engine::op_sp1)),
    (0o3, op(Engine::op_sn1)),
    (0o4, op(Engine::op_sfs)),
    (0o5, op(Engine::op_sfz)),
    (0o6, op(Engine::op_sas)),
    (0o7, op(Engine::op_saz)),
]);

static F075_BY_J: [Option<Entry>; 16] = table([
    (0o13, op(Engine::op_lxlm)),
    (0o15, op(Engine::op_cr)),
    (0o17, op(Engine::op_rmd)),
]);

// Basic mode.

static BASIC_F007_BY_J: [Option<Entry>; 16] = table([
    (0o04, op(Engine::op_laqw)),
    (0o05, op(Engine::op_saqw)),
    (0o14, op(Engine::op_lpd)),
    (0o15, op(Engine::op_spd)),
]);

static BASIC_F071_BY_J: [Option<Entry>; 16] = table([
    (0o10, op(Engine::op_da)),
    (0o11, op(Engine::op_dan)),
    (0o12, op(Engine::op_ds)),
    (0o13, op(Engine::op_dl)),
    (0o14, op(Engine::op_dln)),
    (0o15, op(Engine::op_dlm)),
    (0o16, op(Engine::op_djz)),
    (0o17, op(Engine::op_dte)),
]);

static BASIC_F072_BY_J: [Option<Entry>; 16] = table([
    (0o01, op(Engine::op_slj)),
    (0o02, op(Engine::op_jps)),
    (0o03, op(Engine::op_jns)),
    (0o04, op(Engine::op_ah)),
    (0o05, op(Engine::op_anh)),
    (0o06, op(Engine::op_at)),
    (0o07, op(Engine::op_ant)),
    (0o10, op(Engine::op_ex)),
    (0o11, op(Engine::op_er)),
]);

static BASIC_F073_J15_BY_A: [Option<Entry>; 16] = table([
    (0o03, op(Engine::op_acel)),
    (0o04, op(Engine::op_dcel)),
    (0o14, op(Engine::op_ld)),
    (0o15, op(Engine::op_sd)),
]);

static BASIC_F073_J17_BY_A: [Option<Entry>; 16] = table([
    (0o00, op(Engine::op_ts)),
    (0o01, op(Engine::op_tss)),
    (0o02, op(Engine::op_tcs)),
    (0o06, op(Engine::op_iar)),
]);

static BASIC_F073_BY_J: [Option<Entry>; 16] = table([
    (0o00, op(Engine::op_ssc)),
    (0o01, op(Engine::op_dsc)),
    (0o02, op(Engine::op_ssl)),
    (0o03, op(Engine::op_dsl)),
    (0o04, op(Engine::op_ssa)),
    (0o05, op(Engine::op_dsa)),
    (0o06, op(Engine::op_lsc)),
    (0o07, op(Engine::op_dlsc)),
    (0o10, op(Engine::op_lssc)),
    (0o11, op(Engine::op_ldsc)),
    (0o12, op(Engine::op_lssl)),
    (0o13, op(Engine::op_ldsl)),
    (0o15, Entry::ByA(&BASIC_F073_J15_BY_A)),
    (0o17, Entry::ByA(&BASIC_F073_J17_BY_A)),
]);

static BASIC_F074_J04_BY_A: [Option<Entry>; 16] = table([
    (0o00, op(Engine::op_j)),
    (0o01, op(Engine::op_jk)),
    (0o02, op(Engine::op_jk)),
    (0o03, op(Engine::op_jk)),
    (0o04, op(Engine::op_jk)),
    (0o05, op(Engine::op_jk)),
    (0o06, op(Engine::op_jk)),
    (0o07, op(Engine::op_jk)),
    (0o10, op(Engine::op_jk)),
    (0o11, op(Engine::op_jk)),
    (0o12, op(Engine::op_jk)),
    (0o13, op(Engine::op_jk)),
    (0o14, op(Engine::op_jk)),
    (0o15, op(Engine::op_jk)),
    (0o16, op(Engine::op_jk)),
    (0o17, op(Engine::op_jk)),
]);

static BASIC_F074_J14_BY_A: [Option<Entry>; 16] = table([
    (0o00, op(Engine::op_jo)),
    (0o01, op(Engine::op_jfu)),
    (0o02, op(Engine::op_jfo)),
    (0o03, op(Engine::op_jdf)),
    (0o07, op(Engine::op_paij)),
]);

static BASIC_F074_J15_BY_A: [Option<Entry>; 16] = table([
    (0o00, op(Engine::op_jno)),
    (0o01, op(Engine::op_jnfu)),
    (0o02, op(Engine::op_jnfo)),
    (0o03, op(Engine::op_jndf)),
    (0o05, op(Engine::op_hltj)),
]);

static BASIC_F074_BY_J: [Option<Entry>; 16] = table([
    (0o00, op(Engine::op_jz)),
    (0o01, op(Engine::op_jnz)),
    (0o02, op(Engine::op_jp)),
    (0o03, op(Engine::op_jn)),
    (0o04, Entry::ByA(&BASIC_F074_J04_BY_A)),
    (0o05, op(Engine::op_hkj)),
    (0o06, op(Engine::op_nop)),
    (0o07, op(Engine::op_aaij)),
    (0o10, op(Engine::op_jnb)),
    (0o11, op(Engine::op_jb)),
    (0o12, op(Engine::op_jmgi)),
    (0o13, op(Engine::op_lmj)),
    (0o14, Entry::ByA(&BASIC_F074_J14_BY_A)),
    (0o15, Entry::ByA(&BASIC_F074_J15_BY_A)),
    (0o16, op(Engine::op_jc)),
    (0o17, op(Engine::op_jnc)),
]);

static BASIC: [Option<Entry>; 64] = table([
    (0o01, op(Engine::op_sa)),
    (0o02, op(Engine::op_sna)),
    (0o03, op(Engine::op_sma)),
    (0o04, op(Engine::op_sr)),
    (0o05, Entry::ByA(&F005_BY_A)),
    (0o06, op(Engine::op_sx)),
    (0o07, Entry::ByJ(&BASIC_F007_BY_J)),
    (0o10, op(Engine::op_la)),
    (0o11, op(Engine::op_lna)),
    (0o12, op(Engine::op_lma)),
    (0o13, op(Engine::op_lnma)),
    (0o14, op(Engine::op_aa)),
    (0o15, op(Engine::op_ana)),
    (0o16, op(Engine::op_ama)),
    (0o17, op(Engine::op_anma)),
    (0o20, op(Engine::op_au)),
    (0o21, op(Engine::op_anu)),
    (0o23, op(Engine::op_lr)),
    (0o24, op(Engine::op_ax)),
    (0o25, op(Engine::op_anx)),
    (0o26, op(Engine::op_lxm)),
    (0o27, op(Engine::op_lx)),
    (0o30, op(Engine::op_mi)),
    (0o31, op(Engine::op_msi)),
    (0o32, op(Engine::op_mf)),
    (0o34, op(Engine::op_di)),
    (0o35, op(Engine::op_dsf)),
    (0o36, op(Engine::op_df)),
    (0o40, op(Engine::op_or)),
    (0o41, op(Engine::op_xor)),
    (0o42, op(Engine::op_and)),
    (0o43, op(Engine::op_mlu)),
    (0o44, op(Engine::op_tep)),
    (0o45, op(Engine::op_top)),
    (0o46, op(Engine::op_lxi)),
    (0o47, op(Engine::op_tlem)),
    (0o50, op(Engine::op_tz)),
    (0o51, op(Engine::op_tnz)),
    (0o52, op(Engine::op_te)),
    (0o53, op(Engine::op_tne)),
    (0o54, op(Engine::op_tle)),
    (0o55, op(Engine::op_tg)),
    (0o56, op(Engine::op_tw)),
    (0o57, op(Engine::op_tnw)),
    (0o60, op(Engine::op_tp)),
    (0o61, op(Engine::op_tn)),
    (0o70, op(Engine::op_jgd)),
    (0o71, Entry::ByJ(&BASIC_F071_BY_J)),
    (0o72, Entry::ByJ(&BASIC_F072_BY_J)),
    (0o73, Entry::ByJ(&BASIC_F073_BY_J)),
    (0o74, Entry::ByJ(&BASIC_F074_BY_J)),
    (0o75, Entry::ByJ(&F075_BY_J)),
]);

// Extended mode.

static EXTENDED_F007_BY_J: [Option<Entry>; 16] = table([
    (0o04, op(Engine::op_laqw)),
    (0o05, op(Engine::op_saqw)),
]);

static EXTENDED_F033_BY_J: [Option<Entry>; 16] = table([
    (0o13, op(Engine::op_tgm)),
    (0o14, op(Engine::op_dtgm)),
    (0o15, op(Engine::op_dcb)),
]);

static EXTENDED_F050_BY_A: [Option<Entry>; 16] = table([
    (0o00, op(Engine::op_tnop)),
    (0o01, op(Engine::op_tgz)),
    (0o02, op(Engine::op_tpz)),
    (0o03, op(Engine::op_tp)),
    (0o04, op(Engine::op_tmz)),
    (0o05, op(Engine::op_tmzg)),
    (0o06, op(Engine::op_tz)),
    (0o07, op(Engine::op_tnlz)),
    (0o10, op(Engine::op_tlz)),
    (0o11, op(Engine::op_tnz)),
    (0o12, op(Engine::op_tpzl)),
    (0o13, op(Engine::op_tnmz)),
    (0o14, op(Engine::op_tn)),
    (0o15, op(Engine::op_tnpz)),
    (0o16, op(Engine::op_tngz)),
    (0o17, op(Engine::op_tskp)),
]);

static EXTENDED_F071_BY_J: [Option<Entry>; 16] = table([
    (0o00, op(Engine::op_mte)),
    (0o01, op(Engine::op_mtne)),
    (0o02, op(Engine::op_mtle)),
    (0o03, op(Engine::op_mtg)),
    (0o04, op(Engine::op_mtw)),
    (0o05, op(Engine::op_mtnw)),
    (0o06, op(Engine::op_matl)),
    (0o07, op(Engine::op_matg)),
    (0o10, op(Engine::op_da)),
    (0o11, op(Engine::op_dan)),
    (0o12, op(Engine::op_ds)),
    (0o13, op(Engine::op_dl)),
    (0o14, op(Engine::op_dln)),
    (0o15, op(Engine::op_dlm)),
    (0o16, op(Engine::op_djz)),
    (0o17, op(Engine::op_dte)),
]);

static EXTENDED_F072_BY_J: [Option<Entry>; 16] = table([
    (0o02, op(Engine::op_jps)),
    (0o03, op(Engine::op_jns)),
    (0o04, op(Engine::op_ah)),
    (0o05, op(Engine::op_anh)),
    (0o06, op(Engine::op_at)),
    (0o07, op(Engine::op_ant)),
]);

static EXTENDED_F073_J14_BY_A: [Option<Entry>; 16] = table([
    (0o00, op(Engine::op_nop)),
    (0o04, op(Engine::op_unlk)),
    (0o05, op(Engine::op_ex)),
    (0o06, op(Engine::op_exr)),
]);

static EXTENDED_F073_J15_BY_A: [Option<Entry>; 16] = table([
    (0o03, op(Engine::op_acel)),
    (0o04, op(Engine::op_dcel)),
    (0o14, op(Engine::op_ld)),
    (0o15, op(Engine::op_sd)),
    (0o17, op(Engine::op_sgnl)),
]);

static EXTENDED_F073_J17_BY_A: [Option<Entry>; 16] = table([
    (0o00, op(Engine::op_ts)),
    (0o01, op(Engine::op_tss)),
    (0o02, op(Engine::op_tcs)),
    (0o04, op(Engine::op_lud)),
    (0o05, op(Engine::op_sud)),
    (0o06, op(Engine::op_iar)),
]);

static EXTENDED_F073_BY_J: [Option<Entry>; 16] = table([
    (0o00, op(Engine::op_ssc)),
    (0o01, op(Engine::op_dsc)),
    (0o02, op(Engine::op_ssl)),
    (0o03, op(Engine::op_dsl)),
    (0o04, op(Engine::op_ssa)),
    (0o05, op(Engine::op_dsa)),
    (0o06, op(Engine::op_lsc)),
    (0o07, op(Engine::op_dlsc)),
    (0o10, op(Engine::op_lssc)),
    (0o11, op(Engine::op_ldsc)),
    (0o12, op(Engine::op_lssl)),
    (0o13, op(Engine::op_ldsl)),
    (0o14, Entry::ByA(&EXTENDED_F073_J14_BY_A)),
    (0o15, Entry::ByA(&EXTENDED_F073_J15_BY_A)),
    (0o17, Entry::ByA(&EXTENDED_F073_J17_BY_A)),
]);

static EXTENDED_F074_J14_BY_A: [Option<Entry>; 16] = table([
    (0o00, op(Engine::op_jo)),
    (0o01, op(Engine::op_jfu)),
    (0o02, op(Engine::op_jfo)),
    (0o03, op(Engine::op_jdf)),
    (0o04, op(Engine::op_jc)),
    (0o05, op(Engine::op_jnc)),
    (0o06, op(Engine::op_aaij)),
    (0o07, op(Engine::op_paij)),
]);

static EXTENDED_F074_J15_BY_A: [Option<Entry>; 16] = table([
    (0o00, op(Engine::op_jno)),
    (0o01, op(Engine::op_jnfu)),
    (0o02, op(Engine::op_jnfo)),
    (0o03, op(Engine::op_jndf)),
    (0o04, op(Engine::op_j)),
    (0o05, op(Engine::op_hltj)),
]);

static EXTENDED_F074_BY_J: [Option<Entry>; 16] = table([
    (0o00, op(Engine::op_jz)),
    (0o01, op(Engine::op_jnz)),
    (0o02, op(Engine::op_jp)),
    (0o03, op(Engine::op_jn)),
    (0o10, op(Engine::op_jnb)),
    (0o11, op(Engine::op_jb)),
    (0o12, op(Engine::op_jmgi)),
    (0o13, op(Engine::op_lmj)),
    (0o14, Entry::ByA(&EXTENDED_F074_J14_BY_A)),
    (0o15, Entry::ByA(&EXTENDED_F074_J15_BY_A)),
]);

static EXTENDED: [Option<Entry>; 64] = table([
    (0o01, op(Engine::op_sa)),
    (0o02, op(Engine::op_sna)),
    (0o03, op(Engine::op_sma)),
    (0o04, op(Engine::op_sr)),
    (0o05, Entry::ByA(&F005_BY_A)),
    (0o06, op(Engine::op_sx)),
    (0o07, Entry::ByJ(&EXTENDED_F007_BY_J)),
    (0o10, op(Engine::op_la)),
    (0o11, op(Engine::op_lna)),
    (0o12, op(Engine::op_lma)),
    (0o13, op(Engine::op_lnma)),
    (0o14, op(Engine::op_aa)),
    (0o15, op(Engine::op_ana)),
    (0o16, op(Engine::op_ama)),
    (0o17, op(Engine::op_anma)),
    (0o20, op(Engine::op_au)),
    (0o21, op(Engine::op_anu)),
    (0o23, op(Engine::op_lr)),
    (0o24, op(Engine::op_ax)),
    (0o25, op(Engine::op_anx)),
    (0o26, op(Engine::op_lxm)),
    (0o27, op(Engine::op_lx)),
    (0o30, op(Engine::op_mi)),
    (0o31, op(Engine::op_msi)),
    (0o32, op(Engine::op_mf)),
    (0o33, Entry::ByJ(&EXTENDED_F033_BY_J)),
    (0o34, op(Engine::op_di)),
    (0o35, op(Engine::op_dsf)),
    (0o36, op(Engine::op_df)),
    (0o40, op(Engine::op_or)),
    (0o41, op(Engine::op_xor)),
    (0o42, op(Engine::op_and)),
    (0o43, op(Engine::op_mlu)),
    (0o44, op(Engine::op_tep)),
    (0o45, op(Engine::op_top)),
    (0o46, op(Engine::op_lxi)),
    (0o47, op(Engine::op_tlem)),
    (0o50, Entry::ByA(&EXTENDED_F050_BY_A)),
    (0o51, op(Engine::op_lxsi)),
    (0o52, op(Engine::op_te)),
    (0o53, op(Engine::op_tne)),
    (0o54, op(Engine::op_tle)),
    (0o55, op(Engine::op_tg)),
    (0o56, op(Engine::op_tw)),
    (0o57, op(Engine::op_tnw)),
    (0o70, op(Engine::op_jgd)),
    (0o71, Entry::ByJ(&EXTENDED_F071_BY_J)),
    (0o72, Entry::ByJ(&EXTENDED_F072_BY_J)),
    (0o73, Entry::ByJ(&EXTENDED_F073_BY_J)),
    (0o74, Entry::ByJ(&EXTENDED_F074_BY_J)),
    (0o75, Entry::ByJ(&F075_BY_J)),
]);

#[cfg(test)]
mod tests {
    use super::*;

    fn found(iw: InstructionWord, basic_mode: bool) -> bool {
        lookup(iw, basic_mode).is_some()
    }

    #[test]
    fn test_unassigned_codes_are_rejected() {
        assert!(!found(InstructionWord::new(0o00, 0, 0, 0, 0, 0, 0), true));
        assert!(!found(InstructionWord::new(0o22, 0, 0, 0, 0, 0, 0), false));
        assert!(!found(InstructionWord::new(0o77, 0, 0, 0, 0, 0, 0), true));
        // LSC's neighbour j=014 exists only in extended mode.
        assert!(!found(InstructionWord::new(0o73, 0o14, 0, 0, 0, 0, 0), true));
        assert!(found(InstructionWord::new(0o73, 0o14, 0, 0, 0, 0, 0), false));
    }

    #[test]
    fn test_mode_specific_codes() {
        // ER and SLJ are basic mode only, SGNL extended only.
        assert!(found(InstructionWord::new(0o72, 0o11, 0, 0, 0, 0, 0), true));
        assert!(!found(InstructionWord::new(0o72, 0o11, 0, 0, 0, 0, 0), false));
        assert!(found(InstructionWord::new(0o72, 0o01, 0, 0, 0, 0, 0), true));
        assert!(!found(InstructionWord::new(0o72, 0o01, 0, 0, 0, 0, 0), false));
        assert!(found(InstructionWord::new(0o73, 0o15, 0o17, 0, 0, 0, 0), false));
        assert!(!found(InstructionWord::new(0o73, 0o15, 0o17, 0, 0, 0, 0), true));
        // LXSI shares f=051 with basic mode TNZ.
        assert!(found(InstructionWord::new(0o51, 0, 0, 0, 0, 0, 0), true));
        assert!(found(InstructionWord::new(0o51, 0, 0, 0, 0, 0, 0), false));
    }

    #[test]
    fn test_sub_tables_by_a() {
        assert!(found(InstructionWord::new(0o05, 0, 0o7, 0, 0, 0, 0), true));
        assert!(!found(InstructionWord::new(0o05, 0, 0o10, 0, 0, 0, 0), true));
        assert!(found(InstructionWord::new(0o74, 0o15, 0o05, 0, 0, 0, 0), true));
        assert!(!found(InstructionWord::new(0o74, 0o15, 0o04, 0, 0, 0, 0), true));
        assert!(found(InstructionWord::new(0o74, 0o15, 0o04, 0, 0, 0, 0), false));
    }
}
