use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::addr::{Address, Prefix};
use crate::compile::CompiledProgram;
use crate::table::{DataSnapshot, DataTable};

use super::context::ExecutionContext;
use super::ops::run_network;
use super::{Flow, RuntimeError};

/// Bound on nested `CALL`s; a cyclic subroutine graph trips this instead
/// of blowing the thread stack.
pub const MAX_CALL_DEPTH: u32 = 32;

const PULSE_PERIOD: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExitCode {
    End,
    MaxScansReached,
    Stopped,
}

/// A runtime failure inside one network of one scan.
#[derive(Debug, Clone)]
pub struct ScanError {
    pub scan: u64,
    pub network: u32,
    pub cause: RuntimeError,
}

pub type ErrorHook = Box<dyn FnMut(&ScanError) + Send>;

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ScanStats {
    pub scans: u64,
    pub total_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub last_ms: f64,
    pub errors: u64,
}

impl ScanStats {
    pub fn average_ms(&self) -> f64 {
        if self.scans == 0 {
            0.0
        } else {
            self.total_ms / self.scans as f64
        }
    }

    fn record(&mut self, scan_ms: f64) {
        if self.scans == 0 || scan_ms < self.min_ms {
            self.min_ms = scan_ms;
        }
        if scan_ms > self.max_ms {
            self.max_ms = scan_ms;
        }
        self.last_ms = scan_ms;
        self.total_ms += scan_ms;
        self.scans += 1;
    }
}

#[derive(Default)]
pub struct InterpreterOptions {
    /// Carry over an existing data table instead of starting from zeroes.
    pub data_table: Option<DataTable>,
    /// Called for every runtime error; must not panic.
    pub error_hook: Option<ErrorHook>,
    /// Fixed timer time base in milliseconds. When unset, timers advance
    /// by the measured duration of the previous scan.
    pub fixed_scan_time_ms: Option<f64>,
}

#[derive(Default)]
pub struct RunOptions {
    pub max_scans: Option<u64>,
    pub target_scan_time_ms: Option<f64>,
}

/// Cloneable handle for stopping a running interpreter from another
/// thread. Stopping is cooperative: it is observed between scans.
#[derive(Debug, Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct Interpreter {
    program: CompiledProgram,
    ctx: ExecutionContext,
    scan_count: u64,
    running: Arc<AtomicBool>,
    exit: Option<ExitCode>,
    stats: ScanStats,
    first_scan: bool,
    pulse_at: Instant,
    fixed_scan_time_ms: Option<f64>,
    error_hook: Option<ErrorHook>,
}

impl std::fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("program", &self.program)
            .field("ctx", &self.ctx)
            .field("scan_count", &self.scan_count)
            .field("running", &self.running)
            .field("exit", &self.exit)
            .field("stats", &self.stats)
            .field("first_scan", &self.first_scan)
            .field("pulse_at", &self.pulse_at)
            .field("fixed_scan_time_ms", &self.fixed_scan_time_ms)
            .field("error_hook", &self.error_hook.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl Interpreter {
    pub fn new(program: CompiledProgram, options: InterpreterOptions) -> Self {
        let table = options.data_table.unwrap_or_default();
        Self {
            program,
            ctx: ExecutionContext::new(table),
            scan_count: 0,
            running: Arc::new(AtomicBool::new(true)),
            exit: None,
            stats: ScanStats::default(),
            first_scan: true,
            pulse_at: Instant::now(),
            fixed_scan_time_ms: options.fixed_scan_time_ms,
            error_hook: options.error_hook,
        }
    }

    /// One pass over every main-program network. Returns the measured scan
    /// time in milliseconds.
    pub fn run_scan(&mut self) -> f64 {
        let t0 = Instant::now();
        self.update_system_bits();
        self.ctx.scan_time_ms = self
            .fixed_scan_time_ms
            .unwrap_or(self.stats.last_ms);

        let scan_number = self.scan_count + 1;
        for network in &self.program.main {
            match run_network(network, &mut self.ctx, &self.program) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Return) => break,
                Ok(Flow::End) => {
                    self.exit = Some(ExitCode::End);
                    break;
                }
                Err(cause) => {
                    self.stats.errors += 1;
                    let error = ScanError {
                        scan: scan_number,
                        network: network.number,
                        cause,
                    };
                    warn!(
                        scan = error.scan,
                        network = error.network,
                        cause = %error.cause,
                        "scan error; continuing with the next network"
                    );
                    if let Some(hook) = self.error_hook.as_mut() {
                        hook(&error);
                    }
                }
            }
        }

        let scan_ms = t0.elapsed().as_secs_f64() * 1000.0;
        self.stats.record(scan_ms);
        self.scan_count += 1;
        self.set_bit(Prefix::Sc, 7, true);
        debug!(scan = self.scan_count, ms = scan_ms, "scan complete");
        scan_ms
    }

    /// Scan repeatedly until stopped, an `END` fires, or `max_scans` is
    /// reached. With a target scan time, fast scans sleep the remainder.
    pub fn run_continuous(&mut self, options: RunOptions) -> ExitCode {
        self.running.store(true, Ordering::SeqCst);
        info!(
            max_scans = options.max_scans,
            target_ms = options.target_scan_time_ms,
            "continuous scan started"
        );
        let code = loop {
            if !self.running.load(Ordering::SeqCst) {
                break ExitCode::Stopped;
            }
            let scan_ms = self.run_scan();
            if let Some(code) = self.exit.take() {
                break code;
            }
            if let Some(max) = options.max_scans {
                if self.scan_count >= max {
                    break ExitCode::MaxScansReached;
                }
            }
            if let Some(target) = options.target_scan_time_ms {
                let remainder = target - scan_ms;
                if remainder > 0.0 {
                    std::thread::sleep(Duration::from_secs_f64(remainder / 1000.0));
                }
            }
        };
        self.running.store(false, Ordering::SeqCst);
        self.exit = Some(code);
        info!(scans = self.scan_count, code = ?code, "continuous scan finished");
        code
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(Arc::clone(&self.running))
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn exit_code(&self) -> Option<ExitCode> {
        self.exit
    }

    pub fn scan_count(&self) -> u64 {
        self.scan_count
    }

    pub fn stats(&self) -> &ScanStats {
        &self.stats
    }

    pub fn snapshot(&self) -> DataSnapshot {
        self.ctx.table.snapshot()
    }

    pub fn data_table(&mut self) -> &mut DataTable {
        &mut self.ctx.table
    }

    /// System bits and words, written before the logic runs:
    ///
    /// * `SC1` always on, `SC2` always off (wired-true / wired-false)
    /// * `SC3` alternates every scan
    /// * `SC4` running flag, `SC5` first scan, `SC6` one-second pulse
    /// * `SC7` off during the scan, on after it
    /// * `SD1` scan counter (mod 65536), `SD2` last scan ms, `SD3`
    ///   average scan ms
    fn update_system_bits(&mut self) {
        let scan_number = self.scan_count + 1;
        self.set_bit(Prefix::Sc, 1, true);
        self.set_bit(Prefix::Sc, 2, false);
        self.set_bit(Prefix::Sc, 3, scan_number % 2 == 1);
        self.set_bit(Prefix::Sc, 4, self.is_running());
        self.set_bit(Prefix::Sc, 5, self.first_scan);
        let pulse = self.pulse_at.elapsed() >= PULSE_PERIOD;
        if pulse {
            self.pulse_at = Instant::now();
        }
        self.set_bit(Prefix::Sc, 6, pulse);
        self.set_bit(Prefix::Sc, 7, false);
        self.set_word(Prefix::Sd, 1, (scan_number % 65_536) as i32);
        self.set_word(Prefix::Sd, 2, self.stats.last_ms as i32);
        self.set_word(Prefix::Sd, 3, self.stats.average_ms() as i32);
        self.first_scan = false;
    }

    fn set_bit(&mut self, prefix: Prefix, index: u32, value: bool) {
        if let Ok(addr) = Address::new(prefix, index) {
            self.ctx.table.set_bit(addr, value);
        }
    }

    fn set_word(&mut self, prefix: Prefix, index: u32, value: i32) {
        if let Ok(addr) = Address::new(prefix, index) {
            self.ctx.table.set_word(addr, value);
        }
    }
}
