use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    BoolInput,
    BoolOutput,
    Compare,
    EdgeContact,
    StackOp,
    Timer,
    Counter,
    DataMove,
    DataPack,
    Math,
    Search,
    Control,
    Special,
    NoOp,
}

impl Category {
    /// Instructions of this category sit on the right rail of a ladder rung.
    pub fn is_output(self) -> bool {
        matches!(
            self,
            Category::BoolOutput
                | Category::Timer
                | Category::Counter
                | Category::DataMove
                | Category::DataPack
                | Category::Math
                | Category::Search
                | Category::Control
                | Category::Special
        )
    }

    pub fn is_input(self) -> bool {
        matches!(
            self,
            Category::BoolInput | Category::Compare | Category::EdgeContact | Category::StackOp
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    BitAddr,
    WordAddr,
    FloatAddr,
    TextAddr,
    AnyAddr,
    WordOrConst,
    BitOrConst,
    AnyOrConst,
    Flags,
    Expression,
    TimeUnit,
    SubrName,
    NetworkNumber,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    Bit,
    Word,
    Float,
    Any,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorKind {
    Bool,
    Word,
    Timer,
    Counter,
    None,
}

#[derive(Debug, Clone, Copy)]
pub struct OpcodeInfo {
    pub mnemonic: &'static str,
    pub description: &'static str,
    pub data: DataKind,
    pub category: Category,
    pub min_params: usize,
    pub max_params: usize,
    pub params: &'static [ParamKind],
    pub symbol: &'static str,
    pub monitor: MonitorKind,
}

impl OpcodeInfo {
    /// Expected kind of the parameter at `index`. Variadic opcodes repeat
    /// their final declared kind.
    pub fn param_kind(&self, index: usize) -> Option<ParamKind> {
        if index >= self.max_params {
            return None;
        }
        self.params
            .get(index)
            .or_else(|| self.params.last())
            .copied()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("{mnemonic} expects {min}..={max} parameters, got {got}")]
pub struct ArityError {
    pub mnemonic: &'static str,
    pub min: usize,
    pub max: usize,
    pub got: usize,
}

macro_rules! op {
    ($mnemonic:literal, $desc:literal, $data:ident, $cat:ident, $min:literal..$max:literal,
     [$($param:ident),*], $symbol:literal, $monitor:ident) => {
        OpcodeInfo {
            mnemonic: $mnemonic,
            description: $desc,
            data: DataKind::$data,
            category: Category::$cat,
            min_params: $min,
            max_params: $max,
            params: &[$(ParamKind::$param),*],
            symbol: $symbol,
            monitor: MonitorKind::$monitor,
        }
    };
}

pub static CATALOG: [OpcodeInfo; 73] = [
    // contacts
    op!("STR", "store contact", Bit, BoolInput, 1..1, [BitAddr], "noc", Bool),
    op!("STRN", "store negated contact", Bit, BoolInput, 1..1, [BitAddr], "ncc", Bool),
    op!("AND", "and contact", Bit, BoolInput, 1..1, [BitAddr], "noc", Bool),
    op!("ANDN", "and negated contact", Bit, BoolInput, 1..1, [BitAddr], "ncc", Bool),
    op!("OR", "or contact", Bit, BoolInput, 1..1, [BitAddr], "noc", Bool),
    op!("ORN", "or negated contact", Bit, BoolInput, 1..1, [BitAddr], "ncc", Bool),
    // stack combinators
    op!("ANDSTR", "and stacked blocks", Bit, StackOp, 0..0, [], "", None),
    op!("ORSTR", "or stacked blocks", Bit, StackOp, 0..0, [], "", None),
    // edge contacts
    op!("STRPD", "store rising edge", Bit, EdgeContact, 1..1, [BitAddr], "nocpd", Bool),
    op!("STRND", "store falling edge", Bit, EdgeContact, 1..1, [BitAddr], "nocnd", Bool),
    op!("ANDPD", "and rising edge", Bit, EdgeContact, 1..1, [BitAddr], "nocpd", Bool),
    op!("ANDND", "and falling edge", Bit, EdgeContact, 1..1, [BitAddr], "nocnd", Bool),
    op!("ORPD", "or rising edge", Bit, EdgeContact, 1..1, [BitAddr], "nocpd", Bool),
    op!("ORND", "or falling edge", Bit, EdgeContact, 1..1, [BitAddr], "nocnd", Bool),
    // coils
    op!("OUT", "output coil", Bit, BoolOutput, 1..16, [BitAddr], "out", Bool),
    op!("SET", "latch coil", Bit, BoolOutput, 1..16, [BitAddr], "set", Bool),
    op!("RST", "unlatch coil", Bit, BoolOutput, 1..16, [BitAddr], "rst", Bool),
    op!("PD", "one-shot coil", Bit, BoolOutput, 1..16, [BitAddr], "pd", Bool),
    // comparisons
    op!("STRE", "store equal", Word, Compare, 2..2, [WordOrConst, WordOrConst], "compeq", Word),
    op!("STRNE", "store not equal", Word, Compare, 2..2, [WordOrConst, WordOrConst], "compneq", Word),
    op!("STRGT", "store greater", Word, Compare, 2..2, [WordOrConst, WordOrConst], "compgt", Word),
    op!("STRLT", "store less", Word, Compare, 2..2, [WordOrConst, WordOrConst], "complt", Word),
    op!("STRGE", "store greater or equal", Word, Compare, 2..2, [WordOrConst, WordOrConst], "compge", Word),
    op!("STRLE", "store less or equal", Word, Compare, 2..2, [WordOrConst, WordOrConst], "comple", Word),
    op!("ANDE", "and equal", Word, Compare, 2..2, [WordOrConst, WordOrConst], "compeq", Word),
    op!("ANDNE", "and not equal", Word, Compare, 2..2, [WordOrConst, WordOrConst], "compneq", Word),
    op!("ANDGT", "and greater", Word, Compare, 2..2, [WordOrConst, WordOrConst], "compgt", Word),
    op!("ANDLT", "and less", Word, Compare, 2..2, [WordOrConst, WordOrConst], "complt", Word),
    op!("ANDGE", "and greater or equal", Word, Compare, 2..2, [WordOrConst, WordOrConst], "compge", Word),
    op!("ANDLE", "and less or equal", Word, Compare, 2..2, [WordOrConst, WordOrConst], "comple", Word),
    op!("ORE", "or equal", Word, Compare, 2..2, [WordOrConst, WordOrConst], "compeq", Word),
    op!("ORNE", "or not equal", Word, Compare, 2..2, [WordOrConst, WordOrConst], "compneq", Word),
    op!("ORGT", "or greater", Word, Compare, 2..2, [WordOrConst, WordOrConst], "compgt", Word),
    op!("ORLT", "or less", Word, Compare, 2..2, [WordOrConst, WordOrConst], "complt", Word),
    op!("ORGE", "or greater or equal", Word, Compare, 2..2, [WordOrConst, WordOrConst], "compge", Word),
    op!("ORLE", "or less or equal", Word, Compare, 2..2, [WordOrConst, WordOrConst], "comple", Word),
    // timers
    op!("TMR", "on-delay timer", Word, Timer, 2..3, [BitAddr, WordOrConst, TimeUnit], "tmr", Timer),
    op!("TMRA", "retentive on-delay timer", Word, Timer, 2..3, [BitAddr, WordOrConst, TimeUnit], "tmra", Timer),
    op!("TMROFF", "off-delay timer", Word, Timer, 2..3, [BitAddr, WordOrConst, TimeUnit], "tmroff", Timer),
    // counters
    op!("CNTU", "up counter", Word, Counter, 2..2, [BitAddr, WordOrConst], "cntu", Counter),
    op!("CNTD", "down counter", Word, Counter, 2..2, [BitAddr, WordOrConst], "cntd", Counter),
    op!("UDC", "up-down counter", Word, Counter, 2..2, [BitAddr, WordOrConst], "udc", Counter),
    // data movement
    op!("COPY", "copy value", Any, DataMove, 2..2, [AnyOrConst, AnyAddr], "copy", Word),
    op!("CPYBLK", "copy block", Any, DataMove, 3..3, [AnyAddr, AnyAddr, WordOrConst], "cpyblk", Word),
    op!("FILL", "fill range", Any, DataMove, 3..3, [AnyAddr, WordOrConst, AnyOrConst], "fill", Word),
    op!("SUM", "sum range", Any, DataMove, 3..3, [AnyAddr, AnyAddr, AnyAddr], "sum", Word),
    // bit packing
    op!("PACK", "pack 16 bits into a word", Word, DataPack, 2..2, [BitAddr, WordAddr], "pack", Word),
    op!("UNPACK", "unpack a word into 16 bits", Word, DataPack, 2..2, [WordAddr, BitAddr], "unpack", Word),
    // math
    op!("MATHDEC", "decimal math expression", Float, Math, 3..3, [AnyAddr, Flags, Expression], "mathdec", Word),
    op!("MATHHEX", "hex/bitwise math expression", Word, Math, 3..3, [AnyAddr, Flags, Expression], "mathhex", Word),
    // table search
    op!("FINDEQ", "find equal", Word, Search, 4..4, [WordAddr, WordOrConst, WordOrConst, WordAddr], "findeq", Word),
    op!("FINDNE", "find not equal", Word, Search, 4..4, [WordAddr, WordOrConst, WordOrConst, WordAddr], "findne", Word),
    op!("FINDGT", "find greater", Word, Search, 4..4, [WordAddr, WordOrConst, WordOrConst, WordAddr], "findgt", Word),
    op!("FINDLT", "find less", Word, Search, 4..4, [WordAddr, WordOrConst, WordOrConst, WordAddr], "findlt", Word),
    op!("FINDGE", "find greater or equal", Word, Search, 4..4, [WordAddr, WordOrConst, WordOrConst, WordAddr], "findge", Word),
    op!("FINDLE", "find less or equal", Word, Search, 4..4, [WordAddr, WordOrConst, WordOrConst, WordAddr], "findle", Word),
    op!("FINDIEQ", "find equal, resumable", Word, Search, 5..5, [WordAddr, WordOrConst, WordOrConst, WordAddr, WordAddr], "findeq", Word),
    op!("FINDINE", "find not equal, resumable", Word, Search, 5..5, [WordAddr, WordOrConst, WordOrConst, WordAddr, WordAddr], "findne", Word),
    op!("FINDIGT", "find greater, resumable", Word, Search, 5..5, [WordAddr, WordOrConst, WordOrConst, WordAddr, WordAddr], "findgt", Word),
    op!("FINDILT", "find less, resumable", Word, Search, 5..5, [WordAddr, WordOrConst, WordOrConst, WordAddr, WordAddr], "findlt", Word),
    op!("FINDIGE", "find greater or equal, resumable", Word, Search, 5..5, [WordAddr, WordOrConst, WordOrConst, WordAddr, WordAddr], "findge", Word),
    op!("FINDILE", "find less or equal, resumable", Word, Search, 5..5, [WordAddr, WordOrConst, WordOrConst, WordAddr, WordAddr], "findle", Word),
    // control flow
    op!("CALL", "call subroutine", None, Control, 1..1, [SubrName], "call", None),
    op!("RT", "return", None, Control, 0..0, [], "rt", None),
    op!("RTC", "conditional return", None, Control, 0..0, [], "rtc", None),
    op!("END", "end program", None, Control, 0..0, [], "end", None),
    op!("ENDC", "conditional end", None, Control, 0..0, [], "endc", None),
    op!("FOR", "repeat block", None, Control, 1..1, [WordOrConst], "for", None),
    op!("NEXT", "close repeat block", None, Control, 0..0, [], "next", None),
    // structure and padding
    op!("NETWORK", "start a network", None, Special, 1..1, [NetworkNumber], "", None),
    op!("SBR", "start a subroutine", None, Special, 1..1, [SubrName], "", None),
    op!("SHFRG", "shift register", Bit, Special, 2..2, [BitAddr, BitAddr], "shfrg", Bool),
    op!("NOP", "no operation", None, NoOp, 0..0, [], "", None),
];

/// Case-insensitive catalog lookup.
pub fn lookup(mnemonic: &str) -> Option<&'static OpcodeInfo> {
    CATALOG
        .iter()
        .find(|entry| entry.mnemonic.eq_ignore_ascii_case(mnemonic))
}

/// Arity check against the catalog entry. Everything beyond arity is left
/// to the compiler; a failing check is a warning, not an error.
pub fn validate_arity(info: &OpcodeInfo, got: usize) -> Result<(), ArityError> {
    if got < info.min_params || got > info.max_params {
        return Err(ArityError {
            mnemonic: info.mnemonic,
            min: info.min_params,
            max: info.max_params,
            got,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_covers_all_opcodes() {
        assert_eq!(CATALOG.len(), 73);
        assert!(CATALOG.iter().all(|entry| !entry.mnemonic.is_empty()));
        assert!(CATALOG.iter().all(|entry| entry.min_params <= entry.max_params));
    }

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!(lookup("str").map(|i| i.mnemonic), Some("STR"));
        assert_eq!(lookup("TmRa").map(|i| i.mnemonic), Some("TMRA"));
        assert!(lookup("BOGUS").is_none());
    }

    #[test]
    fn arity_violations_are_reported() {
        let out = lookup("OUT").expect("OUT");
        assert!(validate_arity(out, 1).is_ok());
        assert!(validate_arity(out, 16).is_ok());
        let err = validate_arity(out, 0).expect_err("arity");
        assert_eq!(err.got, 0);
        assert_eq!(err.min, 1);
    }

    #[test]
    fn variadic_params_repeat_the_last_kind() {
        let out = lookup("OUT").expect("OUT");
        assert_eq!(out.param_kind(0), Some(ParamKind::BitAddr));
        assert_eq!(out.param_kind(7), Some(ParamKind::BitAddr));
        assert_eq!(out.param_kind(16), None);

        let tmr = lookup("TMR").expect("TMR");
        assert_eq!(tmr.param_kind(2), Some(ParamKind::TimeUnit));
    }

    #[test]
    fn contacts_and_coils_carry_ladder_symbols() {
        assert_eq!(lookup("STRN").expect("STRN").symbol, "ncc");
        assert_eq!(lookup("ORPD").expect("ORPD").symbol, "nocpd");
        assert_eq!(lookup("SET").expect("SET").symbol, "set");
        assert_eq!(lookup("FINDILE").expect("FINDILE").symbol, "findle");
    }
}
