use serde::Serialize;

/// Wire and branch glyphs. The identifiers are stable: a renderer maps
/// them straight to sprites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connector {
    /// Horizontal wire.
    HBar,
    /// Vertical rail segment on the closing (left-facing) side.
    VBarL,
    /// Vertical rail segment on the opening (right-facing) side.
    VBarR,
    /// Closing corner at the top of a branch.
    BranchTl,
    /// Closing tee in the middle of a branch.
    BranchTtl,
    /// Closing corner at the bottom of a branch.
    BranchL,
    /// Opening corner at the top of a branch.
    BranchTr,
    /// Opening tee in the middle of a branch.
    BranchTtr,
    /// Opening corner at the bottom of a branch.
    BranchR,
}

impl Connector {
    pub fn symbol(self) -> &'static str {
        match self {
            Connector::HBar => "hbar",
            Connector::VBarL => "vbarl",
            Connector::VBarR => "vbarr",
            Connector::BranchTl => "branchtl",
            Connector::BranchTtl => "branchttl",
            Connector::BranchL => "branchl",
            Connector::BranchTr => "branchtr",
            Connector::BranchTtr => "branchttr",
            Connector::BranchR => "branchr",
        }
    }

    pub fn is_wire(self) -> bool {
        self == Connector::HBar
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CellKind {
    Contact,
    Coil,
    Block,
    Branch,
    Empty,
}

/// An instruction cell before placement: everything but coordinates.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct InstrCell {
    pub kind: CellKind,
    pub symbol: &'static str,
    pub addrs: Vec<String>,
    pub opcode: String,
    pub params: Vec<String>,
    pub monitor: Option<&'static str>,
}
