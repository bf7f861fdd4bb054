//! Operation dispatch: one scan-time behavior per [`Op`] variant.

use ilc_eval::{eval_dec, eval_hex, Number};

use crate::addr::{Address, Domain};
use crate::compile::{
    CompiledNetwork, CompiledProgram, CounterKind, EdgeKind, Join, Op, Operand, Source, TimerKind,
    MAX_FOR_COUNT,
};
use crate::table::Value;

use super::context::{ExecutionContext, StateSlot};
use super::{counter, timer, Flow, RuntimeError};
use super::interp::MAX_CALL_DEPTH;

pub(crate) fn run_network(
    network: &CompiledNetwork,
    ctx: &mut ExecutionContext,
    program: &CompiledProgram,
) -> Result<Flow, RuntimeError> {
    ctx.reset_logic();
    run_ops(&network.ops, ctx, program)
}

pub(crate) fn run_ops(
    ops: &[Op],
    ctx: &mut ExecutionContext,
    program: &CompiledProgram,
) -> Result<Flow, RuntimeError> {
    for op in ops {
        match run_op(op, ctx, program)? {
            Flow::Continue => {}
            flow => return Ok(flow),
        }
    }
    Ok(Flow::Continue)
}

fn run_op(
    op: &Op,
    ctx: &mut ExecutionContext,
    program: &CompiledProgram,
) -> Result<Flow, RuntimeError> {
    match op {
        Op::Str { addr, negate } => {
            let value = ctx.table.bit(*addr) ^ negate;
            ctx.push(value);
        }
        Op::And { addr, negate } => {
            let value = ctx.table.bit(*addr) ^ negate;
            let top = ctx.top;
            ctx.replace_top(top && value);
        }
        Op::Or { addr, negate } => {
            let value = ctx.table.bit(*addr) ^ negate;
            let top = ctx.top;
            ctx.replace_top(top || value);
        }
        Op::AndStr => {
            let b = ctx.pop();
            let a = ctx.pop();
            ctx.push(a && b);
        }
        Op::OrStr => {
            let b = ctx.pop();
            let a = ctx.pop();
            ctx.push(a || b);
        }
        Op::Out { addrs } => {
            let top = ctx.top;
            for addr in addrs {
                ctx.table.set_bit(*addr, top);
            }
        }
        Op::Set { addrs } => {
            if ctx.top {
                for addr in addrs {
                    ctx.table.set_bit(*addr, true);
                }
            }
        }
        Op::Rst { addrs } => {
            if ctx.top {
                for addr in addrs {
                    ctx.table.set_bit(*addr, false);
                }
            }
        }
        Op::Pulse { addrs } => {
            let top = ctx.top;
            for addr in addrs {
                let (rising, falling) = ctx.transition(StateSlot::PulseCoil, *addr, top);
                if rising {
                    ctx.table.set_bit(*addr, true);
                } else if falling {
                    ctx.table.set_bit(*addr, false);
                }
            }
        }
        Op::Cmp { join, cmp, lhs, rhs } => {
            let lhs = operand_number(ctx, lhs)?;
            let rhs = operand_number(ctx, rhs)?;
            let holds = lhs.compare(rhs, *cmp) != Number::Int(0);
            apply_join(ctx, *join, holds);
        }
        Op::Edge { join, edge, addr } => {
            let current = ctx.table.bit(*addr);
            let slot = edge_slot(*join, *edge);
            let (rising, falling) = ctx.transition(slot, *addr, current);
            let fired = match edge {
                EdgeKind::Rising => rising,
                EdgeKind::Falling => falling,
            };
            apply_join(ctx, *join, fired);
        }
        Op::Timer { kind, bit, preset, scale } => {
            let preset_ms = operand_number(ctx, preset)?.as_f64() * f64::from(*scale);
            let dt = ctx.scan_time_ms;
            let (done, inputs) = match kind {
                TimerKind::OnDelay => {
                    let enabled = ctx.top;
                    (timer::on_delay(ctx.timer_state(*bit), enabled, preset_ms, dt), 1)
                }
                TimerKind::Retentive => {
                    let enabled = ctx.input(1);
                    let reset = ctx.input(0);
                    (
                        timer::retentive(ctx.timer_state(*bit), enabled, reset, preset_ms, dt),
                        2,
                    )
                }
                TimerKind::OffDelay => {
                    let enabled = ctx.top;
                    (timer::off_delay(ctx.timer_state(*bit), enabled, preset_ms, dt), 1)
                }
            };
            let acc = ctx.timers[bit].acc_ms;
            ctx.table.set_bit(*bit, done);
            if let Some(shadow) = bit.word_shadow() {
                ctx.table
                    .set_word(shadow, acc.min(f64::from(i32::MAX)) as i32);
            }
            replace_inputs(ctx, inputs, done);
        }
        Op::Counter { kind, bit, preset } => {
            let preset = clamp_i32(operand_number(ctx, preset)?.trunc_i64());
            let shadow = bit.word_shadow();
            let count = shadow.map(|addr| ctx.table.word(addr)).unwrap_or(0);
            let (count, done, inputs) = match kind {
                CounterKind::Up | CounterKind::Down => {
                    // A lone stacked input is the enable; reset is the
                    // optional second input on top of it.
                    let has_reset = ctx.stack.len() >= 2;
                    let enable = if has_reset { ctx.input(1) } else { ctx.top };
                    let reset = has_reset && ctx.top;
                    let slot = match kind {
                        CounterKind::Up => StateSlot::CountUp,
                        _ => StateSlot::CountDown,
                    };
                    let (rising, _) = ctx.transition(slot, *bit, enable);
                    let (count, done) = match kind {
                        CounterKind::Up => counter::count_up(count, rising, reset, preset),
                        _ => counter::count_down(count, rising, reset, preset),
                    };
                    (count, done, if has_reset { 2 } else { 1 })
                }
                CounterKind::UpDown => {
                    let up = ctx.input(2);
                    let down = ctx.input(1);
                    let reset = ctx.top;
                    let (up_edge, _) = ctx.transition(StateSlot::UdcUp, *bit, up);
                    let (down_edge, _) = ctx.transition(StateSlot::UdcDown, *bit, down);
                    let (count, done) = counter::up_down(count, up_edge, down_edge, reset, preset);
                    (count, done, 3)
                }
            };
            ctx.table.set_bit(*bit, done);
            if let Some(shadow) = shadow {
                ctx.table.set_word(shadow, count);
            }
            replace_inputs(ctx, inputs, done);
        }
        Op::ShiftReg { first, last } => {
            let data = ctx.input(2);
            let clock = ctx.input(1);
            let reset = ctx.input(0);
            let (clock_rising, _) = ctx.transition(StateSlot::ShiftClock, *first, clock);
            if reset {
                for index in first.index()..=last.index() {
                    let addr = first.offset(i64::from(index) - i64::from(first.index()))?;
                    ctx.table.set_bit(addr, false);
                }
            } else if clock_rising {
                for index in (first.index() + 1..=last.index()).rev() {
                    let to = first.offset(i64::from(index) - i64::from(first.index()))?;
                    let from = to.offset(-1)?;
                    let bit = ctx.table.bit(from);
                    ctx.table.set_bit(to, bit);
                }
                ctx.table.set_bit(*first, data);
            }
            let shifted_out = ctx.table.bit(*last);
            replace_inputs(ctx, 3, shifted_out);
        }
        Op::Copy { src, dst } => {
            if ctx.top {
                let value = resolve_source(ctx, src);
                ctx.table.set_value(*dst, &value);
            }
        }
        Op::CopyBlock { src, dst, count } => {
            if ctx.top {
                let count = block_count(operand_number(ctx, count)?.trunc_i64())?;
                // Read the whole block first so overlapping ranges copy
                // correctly.
                let mut staged = Vec::with_capacity(count as usize);
                for offset in 0..count {
                    staged.push(ctx.table.value(src.offset(offset)?));
                }
                for (offset, value) in staged.iter().enumerate() {
                    ctx.table.set_value(dst.offset(offset as i64)?, value);
                }
            }
        }
        Op::Fill { start, count, value } => {
            if ctx.top {
                let count = block_count(operand_number(ctx, count)?.trunc_i64())?;
                let value = resolve_source(ctx, value);
                for offset in 0..count {
                    ctx.table.set_value(start.offset(offset)?, &value);
                }
            }
        }
        Op::Pack { first, dst } => {
            if ctx.top {
                let mut word = 0i32;
                for bit in 0..16 {
                    if ctx.table.bit(first.offset(bit)?) {
                        word |= 1 << bit;
                    }
                }
                ctx.table.set_word(*dst, word);
            }
        }
        Op::Unpack { src, first } => {
            if ctx.top {
                let word = ctx.table.word(*src);
                for bit in 0..16 {
                    ctx.table.set_bit(first.offset(bit)?, word & (1 << bit) != 0);
                }
            }
        }
        Op::Sum { first, last, dst } => {
            if ctx.top {
                let mut total = Number::Int(0);
                for index in first.index()..=last.index() {
                    let addr = first.offset(i64::from(index) - i64::from(first.index()))?;
                    let value = ctx
                        .table
                        .number(addr)
                        .ok_or(RuntimeError::NotNumeric { addr })?;
                    total = total.add(value);
                }
                write_number(ctx, *dst, total);
            }
        }
        Op::Find { cmp, start, count, value, index, result } => {
            if ctx.top {
                let count = operand_number(ctx, count)?.trunc_i64();
                let needle = operand_number(ctx, value)?;
                let from = match index {
                    Some(index) => i64::from(ctx.table.word(*index)).max(0),
                    None => 0,
                };
                let mut found = -1i32;
                if count > 0 {
                    // Validate the whole range up front.
                    start.offset(count - 1)?;
                    for offset in from..count {
                        let addr = start.offset(offset)?;
                        let value = ctx
                            .table
                            .number(addr)
                            .ok_or(RuntimeError::NotNumeric { addr })?;
                        if value.compare(needle, *cmp) != Number::Int(0) {
                            found = clamp_i32(offset);
                            break;
                        }
                    }
                }
                if let Some(index) = index {
                    let next = if found < 0 { 0 } else { found + 1 };
                    ctx.table.set_word(*index, next);
                }
                ctx.table.set_word(*result, found);
            }
        }
        Op::Math { hex, dst, expr } => {
            if ctx.top {
                let value = if *hex {
                    eval_hex(expr, &ctx.table)?
                } else {
                    eval_dec(expr, &ctx.table)?
                };
                write_number(ctx, *dst, value);
            }
        }
        Op::Call { name } => {
            if ctx.top {
                return call_subroutine(name, ctx, program);
            }
        }
        Op::Return => return Ok(Flow::Return),
        Op::ReturnIf => {
            if ctx.top {
                return Ok(Flow::Return);
            }
        }
        Op::EndScan => return Ok(Flow::End),
        Op::EndScanIf => {
            if ctx.top {
                return Ok(Flow::End);
            }
        }
        Op::For { count, body } => {
            if ctx.top {
                let count = operand_number(ctx, count)?.trunc_i64();
                if !(0..=MAX_FOR_COUNT).contains(&count) {
                    return Err(RuntimeError::CountRange {
                        count,
                        max: MAX_FOR_COUNT,
                    });
                }
                for _ in 0..count {
                    match run_ops(body, ctx, program)? {
                        Flow::Continue => {}
                        flow => return Ok(flow),
                    }
                }
            }
        }
        Op::Nop => {}
    }
    Ok(Flow::Continue)
}

fn call_subroutine(
    name: &str,
    ctx: &mut ExecutionContext,
    program: &CompiledProgram,
) -> Result<Flow, RuntimeError> {
    let networks = program
        .subroutines
        .get(name)
        .ok_or_else(|| RuntimeError::UnknownSubroutine {
            name: name.to_string(),
        })?;
    if ctx.call_depth >= MAX_CALL_DEPTH {
        return Err(RuntimeError::CallDepth {
            max: MAX_CALL_DEPTH,
        });
    }

    let saved_stack = std::mem::take(&mut ctx.stack);
    let saved_top = ctx.top;
    ctx.top = false;
    ctx.call_depth += 1;

    let mut flow = Flow::Continue;
    for network in networks {
        match run_network(network, ctx, program) {
            Ok(Flow::Continue) => {}
            Ok(Flow::Return) => break,
            Ok(Flow::End) => {
                flow = Flow::End;
                break;
            }
            Err(err) => {
                ctx.call_depth -= 1;
                ctx.stack = saved_stack;
                ctx.top = saved_top;
                return Err(err);
            }
        }
    }

    ctx.call_depth -= 1;
    ctx.stack = saved_stack;
    ctx.top = saved_top;
    Ok(flow)
}

/// A timer/counter block consumes its stacked inputs and leaves its result
/// bit as the new rung condition, so a following coil follows the block.
fn replace_inputs(ctx: &mut ExecutionContext, inputs: usize, result: bool) {
    for _ in 0..inputs {
        ctx.pop();
    }
    ctx.push(result);
}

fn apply_join(ctx: &mut ExecutionContext, join: Join, value: bool) {
    match join {
        Join::Str => ctx.push(value),
        Join::And => {
            let top = ctx.top;
            ctx.replace_top(top && value);
        }
        Join::Or => {
            let top = ctx.top;
            ctx.replace_top(top || value);
        }
    }
}

fn edge_slot(join: Join, edge: EdgeKind) -> StateSlot {
    match (join, edge) {
        (Join::Str, EdgeKind::Rising) => StateSlot::StrRising,
        (Join::Str, EdgeKind::Falling) => StateSlot::StrFalling,
        (Join::And, EdgeKind::Rising) => StateSlot::AndRising,
        (Join::And, EdgeKind::Falling) => StateSlot::AndFalling,
        (Join::Or, EdgeKind::Rising) => StateSlot::OrRising,
        (Join::Or, EdgeKind::Falling) => StateSlot::OrFalling,
    }
}

fn operand_number(ctx: &ExecutionContext, operand: &Operand) -> Result<Number, RuntimeError> {
    match operand {
        Operand::Int(value) => Ok(Number::Int(*value)),
        Operand::Float(value) => Ok(Number::Float(*value)),
        Operand::Addr(addr) => ctx
            .table
            .number(*addr)
            .ok_or(RuntimeError::NotNumeric { addr: *addr }),
    }
}

fn resolve_source(ctx: &ExecutionContext, source: &Source) -> Value {
    match source {
        Source::Lit(value) => value.clone(),
        Source::Addr(addr) => ctx.table.value(*addr),
    }
}

fn write_number(ctx: &mut ExecutionContext, dst: Address, value: Number) {
    match dst.domain() {
        Domain::Word => ctx.table.set_word(dst, clamp_i32(value.trunc_i64())),
        Domain::Float => ctx.table.set_float(dst, value.as_f64()),
        Domain::Bit => ctx.table.set_bit(dst, value != Number::Int(0)),
        Domain::Text => ctx.table.set_text(dst, &value.to_string()),
    }
}

fn clamp_i32(value: i64) -> i32 {
    value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

fn block_count(count: i64) -> Result<i64, RuntimeError> {
    if !(0..=MAX_FOR_COUNT).contains(&count) {
        return Err(RuntimeError::CountRange {
            count,
            max: MAX_FOR_COUNT,
        });
    }
    Ok(count)
}
