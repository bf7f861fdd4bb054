//! Scan-cycle execution: the boolean stack machine, timer/counter state,
//! and the interpreter driving it all.

mod context;
mod counter;
mod interp;
mod ops;
mod timer;

#[cfg(test)]
mod tests;

use thiserror::Error;

use crate::addr::{Address, AddrError};

pub use context::ExecutionContext;
pub use interp::{
    ErrorHook, ExitCode, Interpreter, InterpreterOptions, RunOptions, ScanError, ScanStats,
    StopHandle, MAX_CALL_DEPTH,
};

/// Control signal returned by an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Return,
    End,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeError {
    #[error(transparent)]
    Addr(#[from] AddrError),
    #[error(transparent)]
    Eval(#[from] ilc_eval::EvalError),
    #[error("address {addr} does not hold a numeric value")]
    NotNumeric { addr: Address },
    #[error("unknown subroutine '{name}'")]
    UnknownSubroutine { name: String },
    #[error("subroutine call depth exceeded {max}")]
    CallDepth { max: u32 },
    #[error("repeat count {count} is outside 0..={max}")]
    CountRange { count: i64, max: i64 },
}
