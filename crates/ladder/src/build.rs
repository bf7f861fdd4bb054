//! Network-by-network construction of the ladder document.

use serde::Serialize;

use ilc_core::addr::Address;
use ilc_core::parser::{ParsedInstruction, ParsedNetwork, ParsedProgram};
use ilc_isa::{Category, MonitorKind};

use crate::cell::{CellKind, Connector, InstrCell};
use crate::matrix::{close_branch_block, merge_below, merge_right, Matrix, Slot};

/// A placed cell, ready for a renderer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LadderCell {
    #[serde(rename = "type")]
    pub kind: CellKind,
    pub symbol: String,
    pub addr: Option<String>,
    pub addrs: Vec<String>,
    pub opcode: Option<String>,
    pub params: Option<Vec<String>>,
    pub row: usize,
    pub col: usize,
    pub monitor: Option<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LadderRung {
    #[serde(rename = "rungnum")]
    pub number: u32,
    pub rows: usize,
    pub cols: usize,
    pub comment: Option<String>,
    pub addrs: Vec<String>,
    pub cells: Vec<LadderCell>,
    /// Raw IL of the network, kept when the rung shape could not be
    /// recovered so the front end can at least show the text.
    #[serde(rename = "ilfallback", skip_serializing_if = "Option::is_none")]
    pub il_fallback: Option<String>,
}

/// One ladder view: the main program or one subroutine.
#[derive(Debug, Clone, Serialize)]
pub struct LadderProgram {
    pub subrname: String,
    pub addresses: Vec<String>,
    pub subrdata: Vec<LadderRung>,
}

/// Everything the visualization layer needs, with builder warnings on the
/// side.
#[derive(Debug, Clone)]
pub struct LadderDocument {
    pub programs: Vec<LadderProgram>,
    pub warnings: Vec<String>,
}

pub fn build(program: &ParsedProgram) -> LadderDocument {
    let mut warnings = Vec::new();
    let mut programs = Vec::new();

    programs.push(build_program("main", &program.main, &mut warnings));
    for (name, subr) in &program.subroutines {
        programs.push(build_program(name, &subr.networks, &mut warnings));
    }

    LadderDocument { programs, warnings }
}

fn build_program(
    name: &str,
    networks: &[ParsedNetwork],
    warnings: &mut Vec<String>,
) -> LadderProgram {
    let subrdata: Vec<LadderRung> = networks
        .iter()
        .map(|network| build_rung(name, network, warnings))
        .collect();

    let mut addresses: Vec<Address> = subrdata
        .iter()
        .flat_map(|rung| rung.addrs.iter())
        .filter_map(|addr| addr.parse().ok())
        .collect();
    addresses.sort();
    addresses.dedup();

    LadderProgram {
        subrname: name.to_string(),
        addresses: addresses.iter().map(Address::to_string).collect(),
        subrdata,
    }
}

fn build_rung(
    program_name: &str,
    network: &ParsedNetwork,
    warnings: &mut Vec<String>,
) -> LadderRung {
    let mut inputs = Vec::new();
    let mut outputs = Vec::new();
    for instr in &network.instructions {
        let Some(info) = ilc_isa::lookup(&instr.opcode) else {
            continue;
        };
        if info.category == Category::NoOp {
            continue;
        }
        if info.category.is_input() {
            inputs.push((instr, info));
        } else {
            outputs.push((instr, info));
        }
    }

    let matrix = match build_input_matrix(&inputs) {
        Ok(matrix) => matrix,
        Err(depth) => {
            warnings.push(format!(
                "{program_name} network {}: cannot recover a rung shape from {depth} parallel groups; emitting IL text",
                network.number
            ));
            return LadderRung {
                number: network.number,
                rows: 0,
                cols: 0,
                comment: network.comment.clone(),
                addrs: Vec::new(),
                cells: Vec::new(),
                il_fallback: Some(network_il(network)),
            };
        }
    };

    let mut cells = flatten(&matrix);
    let input_rows = if matrix.is_empty() { 0 } else { matrix.height() };
    let input_cols = matrix.width();

    let out_col = input_cols;
    let mut out_row = 0usize;
    for (instr, info) in &outputs {
        match info.category {
            Category::BoolOutput => {
                for addr in &instr.params {
                    cells.push(LadderCell {
                        kind: CellKind::Coil,
                        symbol: info.symbol.to_string(),
                        addr: Some(addr.clone()),
                        addrs: vec![addr.clone()],
                        opcode: Some(instr.opcode.clone()),
                        params: Some(instr.params.clone()),
                        row: out_row,
                        col: out_col,
                        monitor: monitor_tag(info.monitor),
                    });
                    out_row += 1;
                }
            }
            Category::Control if instr.params.is_empty() => {
                // END, ENDC, RT, RTC, NEXT sit on the rail by themselves.
                cells.push(LadderCell {
                    kind: CellKind::Coil,
                    symbol: info.symbol.to_string(),
                    addr: None,
                    addrs: Vec::new(),
                    opcode: Some(instr.opcode.clone()),
                    params: None,
                    row: out_row,
                    col: out_col,
                    monitor: None,
                });
                out_row += 1;
            }
            _ => {
                let addrs: Vec<String> = instr
                    .params
                    .iter()
                    .filter_map(|param| param.parse::<Address>().ok())
                    .map(|addr| addr.to_string())
                    .collect();
                cells.push(LadderCell {
                    kind: CellKind::Block,
                    symbol: info.symbol.to_string(),
                    addr: addrs.first().cloned(),
                    addrs,
                    opcode: Some(instr.opcode.clone()),
                    params: Some(instr.params.clone()),
                    row: out_row,
                    col: out_col,
                    monitor: monitor_tag(info.monitor),
                });
                out_row += 1;
            }
        }
    }

    let rows = input_rows.max(out_row).max(1);
    let cols = input_cols + 1;

    let mut addrs: Vec<String> = Vec::new();
    for cell in &cells {
        for addr in &cell.addrs {
            if !addrs.contains(addr) {
                addrs.push(addr.clone());
            }
        }
    }

    LadderRung {
        number: network.number,
        rows,
        cols,
        comment: network.comment.clone(),
        addrs,
        cells,
        il_fallback: None,
    }
}

/// The stack-driven core of the builder, mirroring the IL logic stack.
fn build_input_matrix(
    inputs: &[(&ParsedInstruction, &'static ilc_isa::OpcodeInfo)],
) -> Result<Matrix, usize> {
    let mut current = Matrix::empty();
    let mut stack: Vec<Matrix> = Vec::new();

    for &(instr, info) in inputs {
        match info.category {
            Category::StackOp => {
                let Some(prev) = stack.pop() else {
                    continue;
                };
                current = if instr.opcode == "ORSTR" {
                    close_branch_block(merge_below(prev, current))
                } else {
                    merge_right(prev, current)
                };
            }
            _ => {
                let cell = input_cell(instr, info);
                if instr.opcode.starts_with("STR") {
                    stack.push(std::mem::replace(
                        &mut current,
                        Matrix::from_cell(cell),
                    ));
                } else if instr.opcode.starts_with("AND") {
                    current.append_cell(cell);
                } else {
                    current = close_branch_block(merge_below(current, Matrix::from_cell(cell)));
                }
            }
        }
    }

    let mut groups: Vec<Matrix> = stack
        .into_iter()
        .filter(|matrix| !matrix.is_empty())
        .collect();
    match groups.len() {
        0 => Ok(current),
        // Multi-input blocks stack their groups top to bottom, no
        // connectors: each row feeds its own block input.
        1 => Ok(merge_below(groups.remove(0), current)),
        2 => {
            let upper = groups.remove(0);
            let middle = groups.remove(0);
            Ok(merge_below(merge_below(upper, middle), current))
        }
        depth => Err(depth + 1),
    }
}

fn input_cell(instr: &ParsedInstruction, info: &'static ilc_isa::OpcodeInfo) -> InstrCell {
    let addrs: Vec<String> = instr
        .params
        .iter()
        .filter_map(|param| param.parse::<Address>().ok())
        .map(|addr| addr.to_string())
        .collect();
    InstrCell {
        kind: CellKind::Contact,
        symbol: info.symbol,
        addrs,
        opcode: instr.opcode.clone(),
        params: instr.params.clone(),
        monitor: monitor_tag(info.monitor),
    }
}

/// Row-major emission with wire-through: a nil on row 0, or one with live
/// cells further right, becomes a horizontal bar; trailing nils vanish.
fn flatten(matrix: &Matrix) -> Vec<LadderCell> {
    let mut cells = Vec::new();
    for (row_index, row) in matrix.rows.iter().enumerate() {
        let last_live = row
            .iter()
            .rposition(|slot| !matches!(slot, Slot::Nil));
        for (col_index, slot) in row.iter().enumerate() {
            match slot {
                Slot::Instr(cell) => cells.push(LadderCell {
                    kind: cell.kind,
                    symbol: cell.symbol.to_string(),
                    addr: cell.addrs.first().cloned(),
                    addrs: cell.addrs.clone(),
                    opcode: Some(cell.opcode.clone()),
                    params: if cell.params.is_empty() {
                        None
                    } else {
                        Some(cell.params.clone())
                    },
                    row: row_index,
                    col: col_index,
                    monitor: cell.monitor,
                }),
                Slot::Conn(conn) => cells.push(branch_cell(*conn, row_index, col_index)),
                Slot::Nil => {
                    let wired = row_index == 0
                        || last_live.is_some_and(|last| last > col_index);
                    if wired {
                        cells.push(branch_cell(Connector::HBar, row_index, col_index));
                    }
                }
            }
        }
    }
    cells
}

fn branch_cell(conn: Connector, row: usize, col: usize) -> LadderCell {
    LadderCell {
        kind: CellKind::Branch,
        symbol: conn.symbol().to_string(),
        addr: None,
        addrs: Vec::new(),
        opcode: None,
        params: None,
        row,
        col,
        monitor: None,
    }
}

fn monitor_tag(monitor: MonitorKind) -> Option<&'static str> {
    match monitor {
        MonitorKind::Bool => Some("bool"),
        MonitorKind::Word => Some("word"),
        MonitorKind::Timer => Some("timer"),
        MonitorKind::Counter => Some("counter"),
        MonitorKind::None => None,
    }
}

fn network_il(network: &ParsedNetwork) -> String {
    let mut text = format!("NETWORK {}\n", network.number);
    for instr in &network.instructions {
        text.push_str(&instr.opcode);
        for param in &instr.params {
            text.push(' ');
            text.push_str(param);
        }
        text.push('\n');
    }
    text
}
