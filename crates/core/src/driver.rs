//! One-call pipeline from IL source to a ready interpreter.

use thiserror::Error;
use tracing::info;

use crate::compile::{compile, CompiledProgram};
use crate::diag::{render_diagnostics, Diagnostic};
use crate::exec::{Interpreter, InterpreterOptions};
use crate::parser::parse;

#[derive(Debug, Error)]
#[error("program failed to load")]
pub struct LoadError {
    pub diagnostics: Vec<Diagnostic>,
    pub rendered: String,
}

pub fn load_source(source_name: &str, source_text: &str) -> Result<Interpreter, LoadError> {
    load_source_with(source_name, source_text, InterpreterOptions::default())
}

pub fn load_source_with(
    source_name: &str,
    source_text: &str,
    options: InterpreterOptions,
) -> Result<Interpreter, LoadError> {
    let parsed = parse(source_text);
    if !parsed.is_clean() {
        return Err(fail_with_rendered(source_name, source_text, parsed.errors));
    }

    let compiled: CompiledProgram = compile(&parsed)
        .map_err(|err| fail_with_rendered(source_name, source_text, err.diagnostics))?;
    info!(
        networks = compiled.main.len(),
        subroutines = compiled.subroutines.len(),
        diagnostics = compiled.diagnostics.len(),
        "program loaded"
    );
    Ok(Interpreter::new(compiled, options))
}

fn fail_with_rendered(
    source_name: &str,
    source_text: &str,
    diagnostics: Vec<Diagnostic>,
) -> LoadError {
    let rendered = render_diagnostics(source_name, source_text, &diagnostics);
    LoadError {
        diagnostics,
        rendered,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_a_clean_program() {
        let mut interp =
            load_source("demo.il", "NETWORK 1\nSTR X1\nOUT Y1\n").expect("load");
        interp.run_scan();
        assert_eq!(interp.scan_count(), 1);
    }

    #[test]
    fn load_fails_with_rendered_diagnostics() {
        let err = load_source("demo.il", "NETWORK 1\nZAP X1\n").expect_err("load must fail");
        assert_eq!(err.diagnostics.len(), 1);
        assert!(err.rendered.contains("ZAP"));
    }
}
