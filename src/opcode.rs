//! The opcode catalogue: mnemonic, numeric id, argument arity, and the
//! verbosity threshold a successful result needs to clear to be kept in a
//! [`crate::result_log::ResultLog`].

/// A single entry in the opcode catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeInfo {
    pub id: u8,
    pub mnemonic: &'static str,
    pub arity: usize,
    pub verbosity: u8,
}

const fn op(id: u8, mnemonic: &'static str, arity: usize, verbosity: u8) -> OpcodeInfo {
    OpcodeInfo { id, mnemonic, arity, verbosity }
}

/// `opcode_id` 0 is reserved for blank/comment lines and is not listed here.
pub const OPCODES: &[OpcodeInfo] = &[
    op(1, "STB", 2, 1),
    op(2, "STA", 2, 1),
    op(3, "STS", 2, 1),
    op(4, "FIL", 3, 1),
    op(5, "CPY", 3, 1),
    op(6, "BIN", 2, 1),
    op(7, "SAV", 3, 1),
    op(8, "RDB", 1, 2),
    op(9, "RDA", 1, 2),
    op(10, "RDS", 1, 2),
    op(11, "JMP", 1, 1),
    op(12, "JEQ", 3, 1),
    op(13, "JNE", 3, 1),
    op(14, "JGT", 3, 1),
    op(15, "JLT", 3, 1),
    op(16, "JGE", 3, 1),
    op(17, "JLE", 3, 1),
    op(18, "HLT", 0, 0),
    op(19, "CAL", 1, 1),
    op(20, "ADB", 3, 1),
    op(21, "SBB", 3, 1),
    op(22, "MLB", 3, 1),
    op(23, "DVB", 3, 1),
    op(24, "MDB", 3, 1),
    op(25, "ADA", 3, 1),
    op(26, "SBA", 3, 1),
    op(27, "MLA", 3, 1),
    op(28, "DVA", 3, 1),
    op(29, "MDA", 3, 1),
    op(30, "INB", 1, 1),
    op(31, "INA", 1, 1),
    op(32, "DCB", 1, 1),
    op(33, "DCA", 1, 1),
    op(34, "BLS", 3, 1),
    op(35, "BRS", 3, 1),
    op(36, "ROL", 3, 1),
    op(37, "ROR", 3, 1),
    op(38, "AND", 3, 1),
    op(39, "BOR", 3, 1),
    op(40, "XOR", 3, 1),
    op(41, "NOT", 2, 1),
    op(42, "PUB", 1, 1),
    op(43, "PUA", 1, 1),
    op(44, "PUS", 1, 1),
    op(45, "POB", 1, 1),
    op(46, "POA", 1, 1),
    op(47, "POS", 1, 1),
];

pub fn lookup(mnemonic: &str) -> Option<&'static OpcodeInfo> {
    OPCODES.iter().find(|o| o.mnemonic == mnemonic)
}

pub fn by_id(id: u8) -> Option<&'static OpcodeInfo> {
    OPCODES.iter().find(|o| o.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_unique_and_nonzero() {
        let mut seen = HashSet::new();
        for entry in OPCODES {
            assert_ne!(entry.id, 0);
            assert!(seen.insert(entry.id), "duplicate id {}", entry.id);
        }
    }

    #[test]
    fn mda_and_mdb_are_distinct_mnemonics() {
        assert_eq!(lookup("MDB").unwrap().mnemonic, "MDB");
        assert_eq!(lookup("MDA").unwrap().mnemonic, "MDA");
    }

    #[test]
    fn lookup_is_case_sensitive_on_already_uppercased_input() {
        assert!(lookup("stb").is_none());
        assert!(lookup("STB").is_some());
    }
}
