//! Ladder-diagram materialization.
//!
//! Converts the linear instruction list of each network into a 2-D cell
//! matrix with explicit branch connectors, the shape a presentation layer
//! renders as a two-rail ladder rung.

mod build;
mod cell;
mod matrix;


pub use build::{build, LadderCell, LadderDocument, LadderProgram, LadderRung};
pub use cell::{CellKind, Connector};
