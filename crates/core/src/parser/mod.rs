mod tokens;


use indexmap::IndexMap;
use rustc_hash::FxHashSet;

use crate::diag::Diagnostic;
use tokens::tokenize_line;

/// One IL instruction as written: uppercase opcode, raw parameter tokens,
/// 1-based source line, and any comment block that preceded it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedInstruction {
    pub opcode: String,
    pub params: Vec<String>,
    pub line: u32,
    pub span: std::ops::Range<usize>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedNetwork {
    pub number: u32,
    pub instructions: Vec<ParsedInstruction>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSubroutine {
    pub name: String,
    pub networks: Vec<ParsedNetwork>,
}

/// Result of parsing a source file. Parsing is total: diagnostics are
/// collected on the side and the model is always returned.
#[derive(Debug, Clone, Default)]
pub struct ParsedProgram {
    pub main: Vec<ParsedNetwork>,
    pub subroutines: IndexMap<String, ParsedSubroutine>,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
}

impl ParsedProgram {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Networks of the main program and of every subroutine, in
    /// declaration order.
    pub fn all_networks(&self) -> impl Iterator<Item = &ParsedNetwork> {
        self.main.iter().chain(
            self.subroutines
                .values()
                .flat_map(|subr| subr.networks.iter()),
        )
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Scope {
    Main,
    Subroutine(String),
}

struct Parser {
    program: ParsedProgram,
    scope: Scope,
    current: Option<ParsedNetwork>,
    pending_comments: Vec<String>,
    seen_numbers: FxHashSet<(String, u32)>,
}

pub fn parse(source: &str) -> ParsedProgram {
    let mut parser = Parser {
        program: ParsedProgram::default(),
        scope: Scope::Main,
        current: None,
        pending_comments: Vec::new(),
        seen_numbers: FxHashSet::default(),
    };

    let mut offset = 0usize;
    for (index, raw_line) in source.split('\n').enumerate() {
        let line_no = (index + 1) as u32;
        let line = raw_line.strip_suffix('\r').unwrap_or(raw_line);
        let span = offset..offset + line.len();
        parser.take_line(line, line_no, span);
        offset += raw_line.len() + 1;
    }
    parser.finish()
}

impl Parser {
    fn take_line(&mut self, line: &str, line_no: u32, span: std::ops::Range<usize>) {
        let tokenized = tokenize_line(line);
        if let Some(comment) = tokenized.comment {
            if tokenized.tokens.is_empty() {
                if !comment.is_empty() {
                    self.pending_comments.push(comment);
                }
                return;
            }
            // An inline comment trails its instruction.
            self.pending_comments.push(comment);
        }
        if tokenized.tokens.is_empty() {
            return;
        }

        let head = tokenized.tokens[0].to_ascii_uppercase();
        match head.as_str() {
            "NETWORK" => self.start_network(&tokenized.tokens, line_no, span),
            "SBR" => self.start_subroutine(&tokenized.tokens, line_no, span),
            _ => self.take_instruction(tokenized.tokens, line_no, span),
        }
    }

    fn start_network(&mut self, tokens: &[String], line_no: u32, span: std::ops::Range<usize>) {
        let number = tokens.get(1).and_then(|token| token.parse::<u32>().ok());
        let Some(number) = number.filter(|n| *n > 0) else {
            self.program.warnings.push(Diagnostic::warning(
                line_no,
                span,
                "NETWORK requires a positive network number; line ignored",
            ));
            return;
        };

        let scope_key = match &self.scope {
            Scope::Main => String::new(),
            Scope::Subroutine(name) => name.clone(),
        };
        if !self.seen_numbers.insert((scope_key, number)) {
            self.program.warnings.push(Diagnostic::warning(
                line_no,
                span,
                format!("duplicate network number {number}"),
            ));
        }

        self.flush_network();
        let comment = self.drain_comments();
        self.current = Some(ParsedNetwork {
            number,
            instructions: Vec::new(),
            comment,
        });
    }

    fn start_subroutine(&mut self, tokens: &[String], line_no: u32, span: std::ops::Range<usize>) {
        let Some(name) = tokens.get(1).cloned() else {
            self.program.warnings.push(Diagnostic::warning(
                line_no,
                span,
                "SBR requires a subroutine name; line ignored",
            ));
            return;
        };

        self.flush_network();
        self.pending_comments.clear();
        if self.program.subroutines.contains_key(&name) {
            self.program.warnings.push(Diagnostic::warning(
                line_no,
                span.clone(),
                format!("duplicate subroutine '{name}'; the later definition wins"),
            ));
        }
        self.program.subroutines.insert(
            name.clone(),
            ParsedSubroutine {
                name: name.clone(),
                networks: Vec::new(),
            },
        );
        self.scope = Scope::Subroutine(name);
        self.current = None;
    }

    fn take_instruction(
        &mut self,
        mut tokens: Vec<String>,
        line_no: u32,
        span: std::ops::Range<usize>,
    ) {
        let Some(info) = ilc_isa::lookup(&tokens[0]) else {
            self.program.errors.push(Diagnostic::error(
                line_no,
                span,
                format!("unknown instruction '{}'", tokens[0]),
            ));
            return;
        };

        if self.current.is_none() {
            let place = match &self.scope {
                Scope::Main => "the program".to_string(),
                Scope::Subroutine(name) => format!("subroutine '{name}'"),
            };
            self.program.warnings.push(Diagnostic::warning(
                line_no,
                span,
                format!("instruction before the first NETWORK of {place}; line ignored"),
            ));
            return;
        }

        let mut params = tokens.split_off(1);
        if matches!(info.mnemonic, "MATHDEC" | "MATHHEX") && params.len() > 3 {
            // Destination and flags, then the expression re-joined whole.
            let expr = params.split_off(2).join(" ");
            params.push(expr);
        }

        if let Err(err) = ilc_isa::validate_arity(info, params.len()) {
            self.program
                .warnings
                .push(Diagnostic::warning(line_no, span.clone(), err.to_string()));
        }

        let comment = self.drain_comments();
        let network = self.current.as_mut().expect("network is present");
        network.instructions.push(ParsedInstruction {
            opcode: info.mnemonic.to_string(),
            params,
            line: line_no,
            span,
            comment,
        });
    }

    fn drain_comments(&mut self) -> Option<String> {
        if self.pending_comments.is_empty() {
            return None;
        }
        Some(self.pending_comments.drain(..).collect::<Vec<_>>().join("\n"))
    }

    fn flush_network(&mut self) {
        let Some(network) = self.current.take() else {
            return;
        };
        match &self.scope {
            Scope::Main => self.program.main.push(network),
            Scope::Subroutine(name) => {
                if let Some(subr) = self.program.subroutines.get_mut(name) {
                    subr.networks.push(network);
                }
            }
        }
    }

    fn finish(mut self) -> ParsedProgram {
        self.flush_network();
        self.program
    }
}
