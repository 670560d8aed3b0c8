//! Built-in device library.
//!
//! Gates are truth tables. Packages are library entries: instantiating
//! `TTL_7400_DIP(IC1)` includes the block `TTL_7400_DIP` under the
//! namespace `IC1`, so pin 3 is `IC1.3` and the first gate is `IC1.A`.
//! Supply pins are `POWER_PINS` and carry no load.

/// Library source, loaded by every [`Setup`](super::Setup).
pub const LIBRARY: &str = r#"
// ---------------------------------------------------------------------
// 74xx TTL gates
// ---------------------------------------------------------------------

TRUTHTABLE_START(TTL_7400_NAND, 2, 1, "+A,+B")
    TT_HEAD("A,B|Q")
    TT_LINE("0,X|1|22")
    TT_LINE("X,0|1|22")
    TT_LINE("1,1|0|15")
    TT_FAMILY("74XX")
TRUTHTABLE_END()

TRUTHTABLE_START(TTL_7402_NOR, 2, 1, "+A,+B")
    TT_HEAD("A,B|Q")
    TT_LINE("0,0|1|22")
    TT_LINE("X,1|0|15")
    TT_LINE("1,X|0|15")
    TT_FAMILY("74XX")
TRUTHTABLE_END()

TRUTHTABLE_START(TTL_7404_INVERT, 1, 1, "+A")
    TT_HEAD("A|Q")
    TT_LINE("0|1|22")
    TT_LINE("1|0|15")
    TT_FAMILY("74XX")
TRUTHTABLE_END()

TRUTHTABLE_START(TTL_7408_AND, 2, 1, "+A,+B")
    TT_HEAD("A,B|Q")
    TT_LINE("0,X|0|15")
    TT_LINE("X,0|0|15")
    TT_LINE("1,1|1|22")
    TT_FAMILY("74XX")
TRUTHTABLE_END()

TRUTHTABLE_START(TTL_7432_OR, 2, 1, "+A,+B")
    TT_HEAD("A,B|Q")
    TT_LINE("1,X|1|22")
    TT_LINE("X,1|1|22")
    TT_LINE("0,0|0|15")
    TT_FAMILY("74XX")
TRUTHTABLE_END()

TRUTHTABLE_START(TTL_7486_XOR, 2, 1, "+A,+B")
    TT_HEAD("A,B|Q")
    TT_LINE("0,0|0|15")
    TT_LINE("0,1|1|22")
    TT_LINE("1,0|1|22")
    TT_LINE("1,1|0|15")
    TT_FAMILY("74XX")
TRUTHTABLE_END()

// ---------------------------------------------------------------------
// CD4xxx CMOS gates
// ---------------------------------------------------------------------

TRUTHTABLE_START(CD4001_NOR, 2, 1, "+A,+B")
    TT_HEAD("A,B|Q")
    TT_LINE("0,0|1|85")
    TT_LINE("X,1|0|120")
    TT_LINE("1,X|0|120")
    TT_FAMILY("CD4XXX")
TRUTHTABLE_END()

TRUTHTABLE_START(CD4011_NAND, 2, 1, "+A,+B")
    TT_HEAD("A,B|Q")
    TT_LINE("0,X|1|85")
    TT_LINE("X,0|1|85")
    TT_LINE("1,1|0|120")
    TT_FAMILY("CD4XXX")
TRUTHTABLE_END()

TRUTHTABLE_START(CD4069_INVERT, 1, 1, "+A")
    TT_HEAD("A|Q")
    TT_LINE("0|1|55")
    TT_LINE("1|0|55")
    TT_FAMILY("CD4XXX")
TRUTHTABLE_END()

TRUTHTABLE_START(CD4070_XOR, 2, 1, "+A,+B")
    TT_HEAD("A,B|Q")
    TT_LINE("0,0|0|100")
    TT_LINE("0,1|1|100")
    TT_LINE("1,0|1|100")
    TT_LINE("1,1|0|100")
    TT_FAMILY("CD4XXX")
TRUTHTABLE_END()

TRUTHTABLE_START(CD4071_OR, 2, 1, "+A,+B")
    TT_HEAD("A,B|Q")
    TT_LINE("0,0|0|120")
    TT_LINE("X,1|1|85")
    TT_LINE("1,X|1|85")
    TT_FAMILY("CD4XXX")
TRUTHTABLE_END()

TRUTHTABLE_START(CD4081_AND, 2, 1, "+A,+B")
    TT_HEAD("A,B|Q")
    TT_LINE("1,1|1|85")
    TT_LINE("0,X|0|120")
    TT_LINE("X,0|0|120")
    TT_FAMILY("CD4XXX")
TRUTHTABLE_END()

// ---------------------------------------------------------------------
// Packages
// ---------------------------------------------------------------------

LOCAL_LIB_ENTRY(TTL_7400_DIP)
LOCAL_LIB_ENTRY(TTL_7402_DIP)
LOCAL_LIB_ENTRY(TTL_7404_DIP)
LOCAL_LIB_ENTRY(TTL_7408_DIP)
LOCAL_LIB_ENTRY(TTL_7432_DIP)
LOCAL_LIB_ENTRY(TTL_7486_DIP)
LOCAL_LIB_ENTRY(CD4001_DIP)
LOCAL_LIB_ENTRY(CD4011_DIP)
LOCAL_LIB_ENTRY(CD4069_DIP)
LOCAL_LIB_ENTRY(CD4070_DIP)
LOCAL_LIB_ENTRY(CD4071_DIP)
LOCAL_LIB_ENTRY(CD4081_DIP)
LOCAL_LIB_ENTRY(CD4066_DIP)
LOCAL_LIB_ENTRY(CD4016_DIP)
LOCAL_LIB_ENTRY(CD4020_DIP)
LOCAL_LIB_ENTRY(TTL_7490_DIP)
LOCAL_LIB_ENTRY(TTL_7492_DIP)
LOCAL_LIB_ENTRY(TTL_7483_DIP)
LOCAL_LIB_ENTRY(TTL_74174_DIP)
LOCAL_LIB_ENTRY(PROM_82S126_DIP)
LOCAL_LIB_ENTRY(PROM_74S287_DIP)
LOCAL_LIB_ENTRY(PROM_82S123_DIP)

NETLIST_START(TTL_7400_DIP)
    TTL_7400_NAND(A)
    TTL_7400_NAND(B)
    TTL_7400_NAND(C)
    TTL_7400_NAND(D)
    POWER_PINS(P)
    DIPPINS(A.A, P.VCC, A.B, D.B, A.Q, D.A, B.A, D.Q, B.B, C.B, B.Q, C.A, P.GND, C.Q)
NETLIST_END()

NETLIST_START(TTL_7402_DIP)
    TTL_7402_NOR(A)
    TTL_7402_NOR(B)
    TTL_7402_NOR(C)
    TTL_7402_NOR(D)
    POWER_PINS(P)
    DIPPINS(A.Q, P.VCC, A.A, D.Q, A.B, D.B, B.Q, D.A, B.A, C.Q, B.B, C.B, P.GND, C.A)
NETLIST_END()

NETLIST_START(TTL_7404_DIP)
    TTL_7404_INVERT(A)
    TTL_7404_INVERT(B)
    TTL_7404_INVERT(C)
    TTL_7404_INVERT(D)
    TTL_7404_INVERT(E)
    TTL_7404_INVERT(F)
    POWER_PINS(P)
    DIPPINS(A.A, P.VCC, A.Q, F.A, B.A, F.Q, B.Q, E.A, C.A, E.Q, C.Q, D.A, P.GND, D.Q)
NETLIST_END()

NETLIST_START(TTL_7408_DIP)
    TTL_7408_AND(A)
    TTL_7408_AND(B)
    TTL_7408_AND(C)
    TTL_7408_AND(D)
    POWER_PINS(P)
    DIPPINS(A.A, P.VCC, A.B, D.B, A.Q, D.A, B.A, D.Q, B.B, C.B, B.Q, C.A, P.GND, C.Q)
NETLIST_END()

NETLIST_START(TTL_7432_DIP)
    TTL_7432_OR(A)
    TTL_7432_OR(B)
    TTL_7432_OR(C)
    TTL_7432_OR(D)
    POWER_PINS(P)
    DIPPINS(A.A, P.VCC, A.B, D.B, A.Q, D.A, B.A, D.Q, B.B, C.B, B.Q, C.A, P.GND, C.Q)
NETLIST_END()

NETLIST_START(TTL_7486_DIP)
    TTL_7486_XOR(A)
    TTL_7486_XOR(B)
    TTL_7486_XOR(C)
    TTL_7486_XOR(D)
    POWER_PINS(P)
    DIPPINS(A.A, P.VCC, A.B, D.B, A.Q, D.A, B.A, D.Q, B.B, C.B, B.Q, C.A, P.GND, C.Q)
NETLIST_END()

NETLIST_START(CD4001_DIP)
    CD4001_NOR(A)
    CD4001_NOR(B)
    CD4001_NOR(C)
    CD4001_NOR(D)
    POWER_PINS(P)
    DIPPINS(A.A, P.VDD, A.B, D.B, A.Q, D.A, B.Q, D.Q, B.A, C.Q, B.B, C.B, P.VSS, C.A)
NETLIST_END()

NETLIST_START(CD4011_DIP)
    CD4011_NAND(A)
    CD4011_NAND(B)
    CD4011_NAND(C)
    CD4011_NAND(D)
    POWER_PINS(P)
    DIPPINS(A.A, P.VDD, A.B, D.B, A.Q, D.A, B.Q, D.Q, B.A, C.Q, B.B, C.B, P.VSS, C.A)
NETLIST_END()

NETLIST_START(CD4069_DIP)
    CD4069_INVERT(A)
    CD4069_INVERT(B)
    CD4069_INVERT(C)
    CD4069_INVERT(D)
    CD4069_INVERT(E)
    CD4069_INVERT(F)
    POWER_PINS(P)
    DIPPINS(A.A, P.VDD, A.Q, F.A, B.A, F.Q, B.Q, E.A, C.A, E.Q, C.Q, D.A, P.VSS, D.Q)
NETLIST_END()

NETLIST_START(CD4070_DIP)
    CD4070_XOR(A)
    CD4070_XOR(B)
    CD4070_XOR(C)
    CD4070_XOR(D)
    POWER_PINS(P)
    DIPPINS(A.A, P.VDD, A.B, D.B, A.Q, D.A, B.Q, D.Q, B.A, C.Q, B.B, C.B, P.VSS, C.A)
NETLIST_END()

NETLIST_START(CD4071_DIP)
    CD4071_OR(A)
    CD4071_OR(B)
    CD4071_OR(C)
    CD4071_OR(D)
    POWER_PINS(P)
    DIPPINS(A.A, P.VDD, A.B, D.B, A.Q, D.A, B.Q, D.Q, B.A, C.Q, B.B, C.B, P.VSS, C.A)
NETLIST_END()

NETLIST_START(CD4081_DIP)
    CD4081_AND(A)
    CD4081_AND(B)
    CD4081_AND(C)
    CD4081_AND(D)
    POWER_PINS(P)
    DIPPINS(A.A, P.VDD, A.B, D.B, A.Q, D.A, B.Q, D.Q, B.A, C.Q, B.B, C.B, P.VSS, C.A)
NETLIST_END()

NETLIST_START(CD4066_DIP)
    CD4066_GATE(A)
    CD4066_GATE(B)
    CD4066_GATE(C)
    CD4066_GATE(D)
    NET_C(A.VDD, B.VDD, C.VDD, D.VDD)
    NET_C(A.VSS, B.VSS, C.VSS, D.VSS)
    DIPPINS(A.1, A.VDD, A.2, A.CTL, B.2, D.CTL, B.1, D.1, B.CTL, D.2, C.CTL, C.2, A.VSS, C.1)
NETLIST_END()

NETLIST_START(CD4016_DIP)
    CD4066_GATE(A)
    CD4066_GATE(B)
    CD4066_GATE(C)
    CD4066_GATE(D)
    PARAM(A.BASER, 1000)
    PARAM(B.BASER, 1000)
    PARAM(C.BASER, 1000)
    PARAM(D.BASER, 1000)
    NET_C(A.VDD, B.VDD, C.VDD, D.VDD)
    NET_C(A.VSS, B.VSS, C.VSS, D.VSS)
    DIPPINS(A.1, A.VDD, A.2, A.CTL, B.2, D.CTL, B.1, D.1, B.CTL, D.2, C.CTL, C.2, A.VSS, C.1)
NETLIST_END()

// 16 pin package, Q2 and Q3 are not bonded out
NETLIST_START(CD4020_DIP)
    CD4020(A)
    DIPPINS(A.Q12, A.VDD, A.Q13, A.Q11, A.Q14, A.Q10, A.Q6, A.Q8, A.Q5, A.Q9, A.Q7, A.RESET, A.Q4, A.IP, A.VSS, A.Q1)
NETLIST_END()

// pins 4 and 13 are not connected
NETLIST_START(TTL_7490_DIP)
    TTL_7490(A)
    NC_PIN(NC4)
    NC_PIN(NC13)
    DIPPINS(A.B, A.A, A.R1, NC13.I, A.R2, A.QA, NC4.I, A.QD, A.VCC, A.GND, A.R91, A.QB, A.R92, A.QC)
NETLIST_END()

// pins 2, 3, 4 and 13 are not connected
NETLIST_START(TTL_7492_DIP)
    TTL_7492(A)
    NC_PIN(NC2)
    NC_PIN(NC3)
    NC_PIN(NC4)
    NC_PIN(NC13)
    DIPPINS(A.B, A.A, NC2.I, NC13.I, NC3.I, A.QA, NC4.I, A.QD, A.VCC, A.GND, A.R1, A.QB, A.R2, A.QC)
NETLIST_END()

NETLIST_START(TTL_7483_DIP)
    TTL_7483(A)
    DIPPINS(A.A4, A.B4, A.S3, A.S4, A.A3, A.C4, A.B3, A.C0, A.VCC, A.GND, A.S2, A.B1, A.B2, A.A1, A.A2, A.S1)
NETLIST_END()

NETLIST_START(TTL_74174_DIP)
    TTL_74174(A)
    DIPPINS(A.CLRQ, A.VCC, A.Q1, A.Q6, A.D1, A.D6, A.D2, A.D5, A.Q2, A.Q5, A.D3, A.D4, A.Q3, A.Q4, A.GND, A.CLK)
NETLIST_END()

NETLIST_START(PROM_82S126_DIP)
    PROM_82S126(A)
    DEFPARAM(ROM, "unknown")
    DEFPARAM(FORCE_TRISTATE_LOGIC, 0)
    PARAM(A.ROM, "$(@.ROM)")
    PARAM(A.FORCE_TRISTATE_LOGIC, "$(@.FORCE_TRISTATE_LOGIC)")
    DIPPINS(A.A6, A.VCC, A.A5, A.A7, A.A4, A.CE2Q, A.A3, A.CE1Q, A.A0, A.O1, A.A1, A.O2, A.A2, A.O3, A.GND, A.O4)
NETLIST_END()

NETLIST_START(PROM_74S287_DIP)
    PROM_74S287(A)
    DEFPARAM(ROM, "unknown")
    DEFPARAM(FORCE_TRISTATE_LOGIC, 0)
    PARAM(A.ROM, "$(@.ROM)")
    PARAM(A.FORCE_TRISTATE_LOGIC, "$(@.FORCE_TRISTATE_LOGIC)")
    DIPPINS(A.A6, A.VCC, A.A5, A.A7, A.A4, A.CE2Q, A.A3, A.CE1Q, A.A0, A.O0, A.A1, A.O1, A.A2, A.O2, A.GND, A.O3)
NETLIST_END()

NETLIST_START(PROM_82S123_DIP)
    PROM_82S123(A)
    DEFPARAM(ROM, "unknown")
    DEFPARAM(FORCE_TRISTATE_LOGIC, 0)
    PARAM(A.ROM, "$(@.ROM)")
    PARAM(A.FORCE_TRISTATE_LOGIC, "$(@.FORCE_TRISTATE_LOGIC)")
    DIPPINS(A.O1, A.VCC, A.O2, A.CEQ, A.O3, A.A4, A.O4, A.A3, A.O5, A.A2, A.O6, A.A1, A.O7, A.A0, A.GND, A.O8)
NETLIST_END()
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::{parse, Statement};

    #[test]
    fn test_library_parses() {
        let doc = parse(LIBRARY).unwrap();
        let mut tables = 0;
        let mut entries = Vec::new();
        for stmt in &doc.top_level {
            match stmt {
                Statement::TruthTable(desc) => {
                    desc.compile().unwrap();
                    tables += 1;
                }
                Statement::LocalLibEntry { name, .. } => entries.push(name.clone()),
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(tables, 12);
        for name in &entries {
            assert!(doc.find(name).is_some(), "{}", name);
        }
    }

    #[test]
    fn test_packages_have_even_pin_lists() {
        let doc = parse(LIBRARY).unwrap();
        for def in &doc.netlists {
            let pins = def.statements.iter().find_map(|s| match s {
                Statement::DipPins(p) => Some(p.len()),
                _ => None,
            });
            let pins = pins.unwrap_or(0);
            assert!(pins == 14 || pins == 16, "{}: {}", def.name, pins);
        }
    }
}
