//! The 2-D working surface of the ladder builder. A matrix is a grid of
//! slots mirroring the IL logic stack: Store-family instructions open a
//! fresh matrix, AND extends row 0, OR stacks below, and the stack
//! combinators splice whole matrices together.

use crate::cell::{Connector, InstrCell};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Slot {
    Nil,
    Conn(Connector),
    Instr(InstrCell),
}

impl Slot {
    fn is_nil(&self) -> bool {
        matches!(self, Slot::Nil)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Matrix {
    pub rows: Vec<Vec<Slot>>,
}

impl Matrix {
    /// The builder starts every group from a single empty row.
    pub fn empty() -> Self {
        Self { rows: vec![Vec::new()] }
    }

    pub fn from_cell(cell: InstrCell) -> Self {
        Self {
            rows: vec![vec![Slot::Instr(cell)]],
        }
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(Vec::is_empty)
    }

    /// AND-family append: the cell lands on row 0, every other row gets a
    /// nil placeholder to stay rectangular.
    pub fn append_cell(&mut self, cell: InstrCell) {
        for (index, row) in self.rows.iter_mut().enumerate() {
            if index == 0 {
                row.push(Slot::Instr(cell.clone()));
            } else {
                row.push(Slot::Nil);
            }
        }
    }

    /// Pads every row to `width` with the per-row fill rule: row 0 takes
    /// horizontal wire, a row whose edge is nil or a vertical connector
    /// stays nil, anything else extends its wire.
    fn pad_to(&mut self, width: usize) {
        for (index, row) in self.rows.iter_mut().enumerate() {
            while row.len() < width {
                row.push(row_fill(index, row.last()));
            }
        }
    }

    fn make_rect(&mut self) {
        let width = self.width();
        self.pad_to(width);
    }
}

fn row_fill(row_index: usize, edge: Option<&Slot>) -> Slot {
    if row_index == 0 {
        return Slot::Conn(Connector::HBar);
    }
    match edge {
        None | Some(Slot::Nil) => Slot::Nil,
        Some(Slot::Conn(conn)) if !conn.is_wire() => Slot::Nil,
        _ => Slot::Conn(Connector::HBar),
    }
}

/// OR-family and ORSTR stacking: equalize widths, then concatenate rows.
pub(crate) fn merge_below(mut upper: Matrix, mut lower: Matrix) -> Matrix {
    let width = upper.width().max(lower.width());
    upper.pad_to(width);
    lower.pad_to(width);
    upper.rows.extend(lower.rows);
    upper
}

/// ANDSTR splicing: `right` is appended column-wise after `left`. A
/// multi-row right-hand block gets an opening connector column first, so
/// the branch visibly forks off the wire.
pub(crate) fn merge_right(mut left: Matrix, mut right: Matrix) -> Matrix {
    if right.height() > 1 {
        let last = right.height() - 1;
        for (index, row) in right.rows.iter_mut().enumerate() {
            let connector = if index == 0 {
                Connector::BranchTr
            } else if index == last {
                Connector::BranchR
            } else {
                Connector::BranchTtr
            };
            row.insert(0, Slot::Conn(connector));
        }
    }

    left.make_rect();
    right.make_rect();
    let left_width = left.width();
    let right_width = right.width();
    let height = left.height().max(right.height());
    while left.height() < height {
        left.rows.push(vec![Slot::Nil; left_width]);
    }
    while right.height() < height {
        right.rows.push(vec![Slot::Nil; right_width]);
    }

    for (row, extra) in left.rows.iter_mut().zip(right.rows) {
        row.extend(extra);
    }
    left
}

/// Adds the closing connectors of a parallel block along its right edge:
/// a corner on the top row, a corner on the lowest populated row, tees and
/// rail segments in between. When some row still ends in a real
/// instruction the connectors go into a fresh column; otherwise they
/// overwrite the existing edge.
pub(crate) fn close_branch_block(mut matrix: Matrix) -> Matrix {
    if matrix.width() == 0 || matrix.height() < 2 {
        return matrix;
    }
    matrix.make_rect();

    let wide_instr = matrix
        .rows
        .iter()
        .any(|row| matches!(row.last(), Some(Slot::Instr(_))));
    let Some(last_row) = matrix
        .rows
        .iter()
        .rposition(|row| row.last().is_some_and(|slot| !slot.is_nil()))
    else {
        return matrix;
    };

    for (index, row) in matrix.rows.iter_mut().enumerate() {
        if index > last_row {
            if wide_instr {
                row.push(Slot::Nil);
            }
            continue;
        }
        let connector = match row.last() {
            None | Some(Slot::Nil) => Connector::VBarL,
            Some(Slot::Instr(_)) => Connector::BranchTtl,
            Some(Slot::Conn(conn)) if conn.is_wire() => Connector::BranchTtl,
            Some(Slot::Conn(_)) => {
                if wide_instr {
                    row.push(Slot::Conn(Connector::VBarL));
                }
                continue;
            }
        };
        if wide_instr {
            row.push(Slot::Conn(connector));
        } else if let Some(last) = row.last_mut() {
            *last = Slot::Conn(connector);
        }
    }

    let edge = matrix.width() - 1;
    matrix.rows[0][edge] = Slot::Conn(Connector::BranchTl);
    matrix.rows[last_row][edge] = Slot::Conn(Connector::BranchL);
    matrix
}
