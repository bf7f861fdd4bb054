pub mod addr;
pub mod compile;
pub mod diag;
pub mod driver;
pub mod exec;
pub mod parser;
pub mod table;

pub use addr::{Address, AddrError, Domain, Prefix};
pub use compile::{compile, CompileError, CompiledProgram, Op};
pub use diag::{render_diagnostics, Diagnostic, Severity};
pub use driver::{load_source, load_source_with, LoadError};
pub use exec::{
    ExitCode, Interpreter, InterpreterOptions, RunOptions, RuntimeError, ScanError, ScanStats,
    StopHandle,
};
pub use parser::{parse, ParsedInstruction, ParsedNetwork, ParsedProgram, ParsedSubroutine};
pub use table::{DataSnapshot, DataTable, TableError, Value};
