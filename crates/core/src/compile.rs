//! Lowering from the parsed instruction model to executable operations.
//!
//! One parsed instruction becomes one [`Op`]. Structural problems (an
//! unknown `CALL` target, a `NEXT` without `FOR`) are fatal for the
//! offending instruction only: it is dropped, a diagnostic is recorded,
//! and the rest of the plan is kept.

use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use thiserror::Error;

pub use ilc_eval::Comparison;

use crate::addr::{Address, Domain, Prefix};
use crate::diag::{Diagnostic, Severity};
use crate::parser::{ParsedInstruction, ParsedNetwork, ParsedProgram};
use crate::table::Value;

/// Upper bound on a constant `FOR` count; keeps a bad program from
/// freezing the scan loop.
pub const MAX_FOR_COUNT: i64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Join {
    Str,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    Rising,
    Falling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    OnDelay,
    Retentive,
    OffDelay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterKind {
    Up,
    Down,
    UpDown,
}

/// A scan-time numeric operand: a literal, or an address fetched when the
/// operation runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    Int(i64),
    Float(f64),
    Addr(Address),
}

/// A scan-time value source for data moves.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Lit(Value),
    Addr(Address),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Str { addr: Address, negate: bool },
    And { addr: Address, negate: bool },
    Or { addr: Address, negate: bool },
    AndStr,
    OrStr,
    Out { addrs: Vec<Address> },
    Set { addrs: Vec<Address> },
    Rst { addrs: Vec<Address> },
    Pulse { addrs: Vec<Address> },
    Cmp { join: Join, cmp: Comparison, lhs: Operand, rhs: Operand },
    Edge { join: Join, edge: EdgeKind, addr: Address },
    Timer { kind: TimerKind, bit: Address, preset: Operand, scale: u32 },
    Counter { kind: CounterKind, bit: Address, preset: Operand },
    ShiftReg { first: Address, last: Address },
    Copy { src: Source, dst: Address },
    CopyBlock { src: Address, dst: Address, count: Operand },
    Fill { start: Address, count: Operand, value: Source },
    Pack { first: Address, dst: Address },
    Unpack { src: Address, first: Address },
    Sum { first: Address, last: Address, dst: Address },
    Find {
        cmp: Comparison,
        start: Address,
        count: Operand,
        value: Operand,
        index: Option<Address>,
        result: Address,
    },
    Math { hex: bool, dst: Address, expr: String },
    Call { name: String },
    Return,
    ReturnIf,
    EndScan,
    EndScanIf,
    For { count: Operand, body: Vec<Op> },
    Nop,
}

#[derive(Debug, Clone)]
pub struct CompiledNetwork {
    pub number: u32,
    pub ops: Vec<Op>,
}

#[derive(Debug, Clone, Default)]
pub struct CompiledProgram {
    pub main: Vec<CompiledNetwork>,
    pub subroutines: IndexMap<String, Vec<CompiledNetwork>>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Error)]
#[error("program has parse errors and cannot be compiled")]
pub struct CompileError {
    pub diagnostics: Vec<Diagnostic>,
}

pub fn compile(program: &ParsedProgram) -> Result<CompiledProgram, CompileError> {
    if !program.is_clean() {
        return Err(CompileError {
            diagnostics: program.errors.clone(),
        });
    }

    let subr_names: FxHashSet<&str> = program.subroutines.keys().map(String::as_str).collect();
    let mut diagnostics = Vec::new();

    let main = program
        .main
        .iter()
        .map(|network| lower_network(network, &subr_names, &mut diagnostics))
        .collect();
    let subroutines = program
        .subroutines
        .iter()
        .map(|(name, subr)| {
            let networks = subr
                .networks
                .iter()
                .map(|network| lower_network(network, &subr_names, &mut diagnostics))
                .collect();
            (name.clone(), networks)
        })
        .collect();

    Ok(CompiledProgram {
        main,
        subroutines,
        diagnostics,
    })
}

enum Lowered {
    Plain(Op),
    ForOpen(Operand),
    ForClose,
}

fn lower_network(
    network: &ParsedNetwork,
    subr_names: &FxHashSet<&str>,
    diagnostics: &mut Vec<Diagnostic>,
) -> CompiledNetwork {
    let mut ops: Vec<Op> = Vec::new();
    let mut frames: Vec<(Operand, Vec<Op>)> = Vec::new();

    for instr in &network.instructions {
        let lowered = match lower_instruction(instr, subr_names) {
            Ok(lowered) => lowered,
            Err(message) => {
                diagnostics.push(Diagnostic {
                    severity: Severity::Error,
                    message: format!("{}: {message}; instruction dropped", instr.opcode),
                    line: instr.line,
                    span: instr.span.clone(),
                });
                continue;
            }
        };
        match lowered {
            Lowered::Plain(op) => sink(&mut ops, &mut frames).push(op),
            Lowered::ForOpen(count) => frames.push((count, Vec::new())),
            Lowered::ForClose => match frames.pop() {
                Some((count, body)) => sink(&mut ops, &mut frames).push(Op::For { count, body }),
                None => diagnostics.push(Diagnostic {
                    severity: Severity::Error,
                    message: "NEXT without a matching FOR; instruction dropped".to_string(),
                    line: instr.line,
                    span: instr.span.clone(),
                }),
            },
        }
    }

    // Unclosed FOR frames: keep the body, lose the loop.
    while let Some((_, body)) = frames.pop() {
        diagnostics.push(Diagnostic {
            severity: Severity::Error,
            message: format!(
                "FOR without a matching NEXT in network {}; body runs once",
                network.number
            ),
            line: network
                .instructions
                .last()
                .map(|instr| instr.line)
                .unwrap_or(0),
            span: 0..0,
        });
        sink(&mut ops, &mut frames).extend(body);
    }

    CompiledNetwork {
        number: network.number,
        ops,
    }
}

fn sink<'a>(ops: &'a mut Vec<Op>, frames: &'a mut [(Operand, Vec<Op>)]) -> &'a mut Vec<Op> {
    match frames.last_mut() {
        Some((_, body)) => body,
        None => ops,
    }
}

fn lower_instruction(
    instr: &ParsedInstruction,
    subr_names: &FxHashSet<&str>,
) -> Result<Lowered, String> {
    let op = match instr.opcode.as_str() {
        "STR" => Op::Str { addr: bit_addr(param(instr, 0)?)?, negate: false },
        "STRN" => Op::Str { addr: bit_addr(param(instr, 0)?)?, negate: true },
        "AND" => Op::And { addr: bit_addr(param(instr, 0)?)?, negate: false },
        "ANDN" => Op::And { addr: bit_addr(param(instr, 0)?)?, negate: true },
        "OR" => Op::Or { addr: bit_addr(param(instr, 0)?)?, negate: false },
        "ORN" => Op::Or { addr: bit_addr(param(instr, 0)?)?, negate: true },
        "ANDSTR" => Op::AndStr,
        "ORSTR" => Op::OrStr,
        "OUT" => Op::Out { addrs: bit_addr_list(instr)? },
        "SET" => Op::Set { addrs: bit_addr_list(instr)? },
        "RST" => Op::Rst { addrs: bit_addr_list(instr)? },
        "PD" => Op::Pulse { addrs: bit_addr_list(instr)? },
        "TMR" | "TMRA" | "TMROFF" => {
            let bit = prefixed_bit(param(instr, 0)?, Prefix::T)?;
            let preset = operand(param(instr, 1)?)?;
            let scale = time_scale(instr.params.get(2).map(String::as_str))?;
            let kind = match instr.opcode.as_str() {
                "TMR" => TimerKind::OnDelay,
                "TMRA" => TimerKind::Retentive,
                _ => TimerKind::OffDelay,
            };
            Op::Timer { kind, bit, preset, scale }
        }
        "CNTU" | "CNTD" | "UDC" => {
            let bit = prefixed_bit(param(instr, 0)?, Prefix::Ct)?;
            let preset = operand(param(instr, 1)?)?;
            let kind = match instr.opcode.as_str() {
                "CNTU" => CounterKind::Up,
                "CNTD" => CounterKind::Down,
                _ => CounterKind::UpDown,
            };
            Op::Counter { kind, bit, preset }
        }
        "SHFRG" => {
            let first = bit_addr(param(instr, 0)?)?;
            let last = bit_addr(param(instr, 1)?)?;
            if first.prefix() != last.prefix() || first.index() > last.index() {
                return Err(format!(
                    "range {first}..{last} must stay within one prefix, low to high"
                ));
            }
            Op::ShiftReg { first, last }
        }
        "COPY" => Op::Copy {
            src: source(param(instr, 0)?)?,
            dst: any_addr(param(instr, 1)?)?,
        },
        "CPYBLK" => Op::CopyBlock {
            src: any_addr(param(instr, 0)?)?,
            dst: any_addr(param(instr, 1)?)?,
            count: operand(param(instr, 2)?)?,
        },
        "FILL" => Op::Fill {
            start: any_addr(param(instr, 0)?)?,
            count: operand(param(instr, 1)?)?,
            value: source(param(instr, 2)?)?,
        },
        "PACK" => {
            let first = bit_addr(param(instr, 0)?)?;
            first
                .offset(15)
                .map_err(|err| err.to_string())?;
            Op::Pack { first, dst: word_addr(param(instr, 1)?)? }
        }
        "UNPACK" => {
            let first = bit_addr(param(instr, 1)?)?;
            first
                .offset(15)
                .map_err(|err| err.to_string())?;
            Op::Unpack { src: word_addr(param(instr, 0)?)?, first }
        }
        "SUM" => {
            let first = numeric_addr(param(instr, 0)?)?;
            let last = numeric_addr(param(instr, 1)?)?;
            if first.prefix() != last.prefix() || first.index() > last.index() {
                return Err(format!(
                    "range {first}..{last} must stay within one prefix, low to high"
                ));
            }
            Op::Sum { first, last, dst: numeric_addr(param(instr, 2)?)? }
        }
        "MATHDEC" | "MATHHEX" => Op::Math {
            hex: instr.opcode == "MATHHEX",
            dst: numeric_addr(param(instr, 0)?)?,
            expr: param(instr, 2)?.to_string(),
        },
        "CALL" => {
            let name = param(instr, 0)?;
            if !subr_names.contains(name) {
                return Err(format!("unknown subroutine '{name}'"));
            }
            Op::Call { name: name.to_string() }
        }
        "RT" => Op::Return,
        "RTC" => Op::ReturnIf,
        "END" => Op::EndScan,
        "ENDC" => Op::EndScanIf,
        "FOR" => {
            let count = operand(param(instr, 0)?)?;
            if let Operand::Int(n) = count {
                if !(1..=MAX_FOR_COUNT).contains(&n) {
                    return Err(format!("FOR count {n} is outside 1..={MAX_FOR_COUNT}"));
                }
            }
            if let Operand::Float(_) = count {
                return Err("FOR count must be an integer or a word address".to_string());
            }
            return Ok(Lowered::ForOpen(count));
        }
        "NEXT" => return Ok(Lowered::ForClose),
        "NOP" => Op::Nop,
        mnemonic => {
            if let Some((join, cmp)) = compare_parts(mnemonic) {
                Op::Cmp {
                    join,
                    cmp,
                    lhs: operand(param(instr, 0)?)?,
                    rhs: operand(param(instr, 1)?)?,
                }
            } else if let Some((join, edge)) = edge_parts(mnemonic) {
                Op::Edge { join, edge, addr: bit_addr(param(instr, 0)?)? }
            } else if let Some((cmp, incremental)) = find_parts(mnemonic) {
                let start = word_addr(param(instr, 0)?)?;
                let count = operand(param(instr, 1)?)?;
                let value = operand(param(instr, 2)?)?;
                let (index, result) = if incremental {
                    (
                        Some(word_addr(param(instr, 3)?)?),
                        word_addr(param(instr, 4)?)?,
                    )
                } else {
                    (None, word_addr(param(instr, 3)?)?)
                };
                Op::Find { cmp, start, count, value, index, result }
            } else {
                // NETWORK/SBR never reach lowering; anything else is a
                // catalog entry without a lowering rule.
                return Err("no lowering rule for this instruction".to_string());
            }
        }
    };
    Ok(Lowered::Plain(op))
}

fn param<'a>(instr: &'a ParsedInstruction, index: usize) -> Result<&'a str, String> {
    instr
        .params
        .get(index)
        .map(String::as_str)
        .ok_or_else(|| format!("missing parameter {}", index + 1))
}

fn bit_addr(token: &str) -> Result<Address, String> {
    let addr: Address = token.parse().map_err(|err| format!("{err}"))?;
    if addr.domain() != Domain::Bit {
        return Err(format!("{addr} is not a boolean address"));
    }
    Ok(addr)
}

fn word_addr(token: &str) -> Result<Address, String> {
    let addr: Address = token.parse().map_err(|err| format!("{err}"))?;
    if addr.domain() != Domain::Word {
        return Err(format!("{addr} is not a word address"));
    }
    Ok(addr)
}

fn numeric_addr(token: &str) -> Result<Address, String> {
    let addr: Address = token.parse().map_err(|err| format!("{err}"))?;
    if !matches!(addr.domain(), Domain::Word | Domain::Float) {
        return Err(format!("{addr} is not a numeric address"));
    }
    Ok(addr)
}

fn any_addr(token: &str) -> Result<Address, String> {
    token.parse().map_err(|err| format!("{err}"))
}

fn bit_addr_list(instr: &ParsedInstruction) -> Result<Vec<Address>, String> {
    if instr.params.is_empty() {
        return Err("expects at least one boolean address".to_string());
    }
    instr.params.iter().map(|token| bit_addr(token)).collect()
}

fn prefixed_bit(token: &str, prefix: Prefix) -> Result<Address, String> {
    let addr = bit_addr(token)?;
    if addr.prefix() != prefix {
        return Err(format!(
            "{addr} must be a {}-prefix address",
            prefix.as_str()
        ));
    }
    Ok(addr)
}

/// A literal (`42`, `1.5`, `1Ah`, `0x1A`) or an address to fetch at scan
/// time.
fn operand(token: &str) -> Result<Operand, String> {
    if let Some(hex) = token
        .strip_suffix('h')
        .or_else(|| token.strip_suffix('H'))
    {
        if !hex.is_empty() && hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            let value = i64::from_str_radix(hex, 16).map_err(|err| err.to_string())?;
            return Ok(Operand::Int(value));
        }
    }
    if let Some(hex) = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        let value = i64::from_str_radix(hex, 16).map_err(|err| err.to_string())?;
        return Ok(Operand::Int(value));
    }
    if let Ok(value) = token.parse::<i64>() {
        return Ok(Operand::Int(value));
    }
    if let Ok(value) = token.parse::<f64>() {
        return Ok(Operand::Float(value));
    }
    let addr: Address = token.parse().map_err(|err| format!("{err}"))?;
    Ok(Operand::Addr(addr))
}

/// A quoted string, a numeric literal, or an address.
fn source(token: &str) -> Result<Source, String> {
    if let Some(inner) = token.strip_prefix('"') {
        let inner = inner.strip_suffix('"').unwrap_or(inner);
        return Ok(Source::Lit(Value::Text(inner.to_string())));
    }
    match operand(token)? {
        Operand::Int(value) => {
            let word = i32::try_from(value).map_err(|_| format!("literal {value} overflows a word"))?;
            Ok(Source::Lit(Value::Word(word)))
        }
        Operand::Float(value) => Ok(Source::Lit(Value::Float(value))),
        Operand::Addr(addr) => Ok(Source::Addr(addr)),
    }
}

fn time_scale(unit: Option<&str>) -> Result<u32, String> {
    match unit {
        None => Ok(1),
        Some(unit) if unit.eq_ignore_ascii_case("ms") => Ok(1),
        Some(unit) if unit.eq_ignore_ascii_case("s") => Ok(1000),
        Some(unit) => Err(format!("unknown time unit '{unit}'")),
    }
}

fn compare_parts(mnemonic: &str) -> Option<(Join, Comparison)> {
    let (head, tail) = if let Some(tail) = mnemonic.strip_prefix("STR") {
        (Join::Str, tail)
    } else if let Some(tail) = mnemonic.strip_prefix("AND") {
        (Join::And, tail)
    } else if let Some(tail) = mnemonic.strip_prefix("OR") {
        (Join::Or, tail)
    } else {
        return None;
    };
    let cmp = match tail {
        "E" => Comparison::Eq,
        "NE" => Comparison::Ne,
        "GT" => Comparison::Gt,
        "LT" => Comparison::Lt,
        "GE" => Comparison::Ge,
        "LE" => Comparison::Le,
        _ => return None,
    };
    Some((head, cmp))
}

fn edge_parts(mnemonic: &str) -> Option<(Join, EdgeKind)> {
    match mnemonic {
        "STRPD" => Some((Join::Str, EdgeKind::Rising)),
        "STRND" => Some((Join::Str, EdgeKind::Falling)),
        "ANDPD" => Some((Join::And, EdgeKind::Rising)),
        "ANDND" => Some((Join::And, EdgeKind::Falling)),
        "ORPD" => Some((Join::Or, EdgeKind::Rising)),
        "ORND" => Some((Join::Or, EdgeKind::Falling)),
        _ => None,
    }
}

fn find_parts(mnemonic: &str) -> Option<(Comparison, bool)> {
    let tail = mnemonic.strip_prefix("FIND")?;
    let (tail, incremental) = match tail.strip_prefix('I') {
        Some(tail) => (tail, true),
        None => (tail, false),
    };
    let cmp = match tail {
        "EQ" => Comparison::Eq,
        "NE" => Comparison::Ne,
        "GT" => Comparison::Gt,
        "LT" => Comparison::Lt,
        "GE" => Comparison::Ge,
        "LE" => Comparison::Le,
        _ => return None,
    };
    Some((cmp, incremental))
}
