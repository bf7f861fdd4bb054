use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::*;
use crate::compile::compile;
use crate::parser::parse;
use crate::table::Value;

fn load(source: &str) -> Interpreter {
    load_with(source, InterpreterOptions::default())
}

fn load_with(source: &str, options: InterpreterOptions) -> Interpreter {
    let parsed = parse(source);
    assert!(parsed.is_clean(), "parse errors: {:?}", parsed.errors);
    let compiled = compile(&parsed).expect("compile");
    assert!(
        compiled.diagnostics.is_empty(),
        "compile diagnostics: {:?}",
        compiled.diagnostics
    );
    Interpreter::new(compiled, options)
}

fn timed(source: &str, scan_ms: f64) -> Interpreter {
    load_with(
        source,
        InterpreterOptions {
            fixed_scan_time_ms: Some(scan_ms),
            ..Default::default()
        },
    )
}

fn get(interp: &Interpreter, addr: &str) -> Value {
    interp.snapshot().get(addr).expect("valid address")
}

fn get_bit(interp: &Interpreter, addr: &str) -> bool {
    matches!(get(interp, addr), Value::Bit(true))
}

fn get_word(interp: &Interpreter, addr: &str) -> i32 {
    match get(interp, addr) {
        Value::Word(value) => value,
        other => panic!("{addr} is not a word: {other:?}"),
    }
}

fn set_bit(interp: &mut Interpreter, addr: &str, value: bool) {
    interp
        .data_table()
        .set(addr, Value::Bit(value))
        .expect("valid address");
}

#[test]
fn and_or_logic_over_one_scan() {
    // S1
    let mut interp = load("NETWORK 1\nSTR X1\nAND X2\nOUT Y1\nNETWORK 2\nSTR X3\nOR X4\nOUT Y2\n");
    set_bit(&mut interp, "X1", true);
    set_bit(&mut interp, "X2", true);
    set_bit(&mut interp, "X3", true);
    set_bit(&mut interp, "X4", false);
    interp.run_scan();
    assert!(get_bit(&interp, "Y1"));
    assert!(get_bit(&interp, "Y2"));
}

#[test]
fn negated_contacts_and_stack_combinators() {
    // (X1 OR X2) AND (X3 OR NOT X4)
    let mut interp = load("NETWORK 1\nSTR X1\nOR X2\nSTR X3\nORN X4\nANDSTR\nOUT Y1\n");
    set_bit(&mut interp, "X2", true);
    interp.run_scan();
    assert!(get_bit(&interp, "Y1")); // X4 false -> ORN true
    set_bit(&mut interp, "X4", true);
    interp.run_scan();
    assert!(!get_bit(&interp, "Y1"));
    set_bit(&mut interp, "X3", true);
    interp.run_scan();
    assert!(get_bit(&interp, "Y1"));
}

#[test]
fn set_and_rst_latch_only_when_energized() {
    let mut interp = load("NETWORK 1\nSTR X1\nSET C1 C2\nNETWORK 2\nSTR X2\nRST C1\n");
    interp.run_scan();
    assert!(!get_bit(&interp, "C1"));
    set_bit(&mut interp, "X1", true);
    interp.run_scan();
    assert!(get_bit(&interp, "C1"));
    assert!(get_bit(&interp, "C2"));
    set_bit(&mut interp, "X1", false);
    interp.run_scan();
    assert!(get_bit(&interp, "C1")); // latched
    set_bit(&mut interp, "X2", true);
    interp.run_scan();
    assert!(!get_bit(&interp, "C1"));
    assert!(get_bit(&interp, "C2"));
}

#[test]
fn pulse_coil_fires_on_both_edges_of_the_rung() {
    let mut interp = load("NETWORK 1\nSTR X1\nPD C1\n");
    set_bit(&mut interp, "X1", true);
    interp.run_scan();
    assert!(get_bit(&interp, "C1")); // rising edge
    interp.run_scan();
    assert!(get_bit(&interp, "C1")); // no edge, holds
    set_bit(&mut interp, "X1", false);
    interp.run_scan();
    assert!(!get_bit(&interp, "C1")); // falling edge clears
}

#[test]
fn edge_contacts_fire_for_exactly_one_scan() {
    let mut interp = load("NETWORK 1\nSTRPD X1\nOUT Y1\nNETWORK 2\nSTRND X1\nOUT Y2\n");
    set_bit(&mut interp, "X1", true);
    interp.run_scan();
    assert!(get_bit(&interp, "Y1"));
    assert!(!get_bit(&interp, "Y2"));
    interp.run_scan();
    assert!(!get_bit(&interp, "Y1"));
    set_bit(&mut interp, "X1", false);
    interp.run_scan();
    assert!(!get_bit(&interp, "Y1"));
    assert!(get_bit(&interp, "Y2"));
    interp.run_scan();
    assert!(!get_bit(&interp, "Y2"));
}

#[test]
fn comparisons_widen_and_join_like_contacts() {
    let mut interp = load(
        "NETWORK 1\nSTRGT DS1 10\nOUT Y1\nNETWORK 2\nSTRE DF1 1.5\nOUT Y2\nNETWORK 3\nSTRLE DS1 0Ah\nOUT Y3\n",
    );
    interp
        .data_table()
        .set("DS1", Value::Word(11))
        .expect("set");
    interp
        .data_table()
        .set("DF1", Value::Float(1.5))
        .expect("set");
    interp.run_scan();
    assert!(get_bit(&interp, "Y1"));
    assert!(get_bit(&interp, "Y2"));
    assert!(!get_bit(&interp, "Y3")); // 11 > 0x0A
}

#[test]
fn on_delay_timer_matches_the_scan_timeline() {
    // S2: preset 50 ms at 10 ms per scan
    let mut interp = timed("NETWORK 1\nSTR X1\nTMR T1 50\nOUT Y1\n", 10.0);
    set_bit(&mut interp, "X1", true);
    for scan in 1..=4 {
        interp.run_scan();
        assert!(!get_bit(&interp, "T1"), "scan {scan}");
        assert!(!get_bit(&interp, "Y1"), "scan {scan}");
    }
    interp.run_scan();
    assert!(get_bit(&interp, "T1"));
    assert!(get_bit(&interp, "Y1"));
    assert_eq!(get_word(&interp, "TD1"), 50);

    set_bit(&mut interp, "X1", false);
    interp.run_scan();
    assert!(!get_bit(&interp, "T1"));
    assert_eq!(get_word(&interp, "TD1"), 0);
}

#[test]
fn retentive_timer_pauses_and_resets_through_its_input() {
    let mut interp = timed("NETWORK 1\nSTR X1\nSTR X2\nTMRA T2 100\nOUT Y1\n", 30.0);
    set_bit(&mut interp, "X1", true);
    interp.run_scan();
    interp.run_scan();
    assert_eq!(get_word(&interp, "TD2"), 60);
    set_bit(&mut interp, "X1", false); // pause, accumulator retained
    interp.run_scan();
    assert_eq!(get_word(&interp, "TD2"), 60);
    set_bit(&mut interp, "X1", true);
    interp.run_scan();
    interp.run_scan();
    assert!(get_bit(&interp, "T2"));
    assert_eq!(get_word(&interp, "TD2"), 100);
    set_bit(&mut interp, "X2", true); // reset input clears regardless
    interp.run_scan();
    assert!(!get_bit(&interp, "T2"));
    assert_eq!(get_word(&interp, "TD2"), 0);
}

#[test]
fn off_delay_timer_holds_after_the_enable_drops() {
    let mut interp = timed("NETWORK 1\nSTR X1\nTMROFF T3 40\nOUT Y1\n", 20.0);
    set_bit(&mut interp, "X1", true);
    interp.run_scan();
    assert!(get_bit(&interp, "Y1"));
    set_bit(&mut interp, "X1", false);
    interp.run_scan();
    assert!(get_bit(&interp, "Y1")); // 20 of 40 ms
    interp.run_scan();
    assert!(!get_bit(&interp, "Y1")); // reached 40 ms
    interp.run_scan();
    assert!(!get_bit(&interp, "Y1"));
}

#[test]
fn up_counter_counts_rising_edges_only() {
    // S3
    let mut interp = load("NETWORK 1\nSTR X1\nCNTU CT1 3\nOUT Y1\n");
    for _ in 0..3 {
        set_bit(&mut interp, "X1", true);
        interp.run_scan();
        set_bit(&mut interp, "X1", false);
        interp.run_scan();
    }
    assert_eq!(get_word(&interp, "CTD1"), 3);
    assert!(get_bit(&interp, "CT1"));
    assert!(get_bit(&interp, "Y1"));

    // a held-high enable adds nothing
    set_bit(&mut interp, "X1", true);
    interp.run_scan();
    interp.run_scan();
    assert_eq!(get_word(&interp, "CTD1"), 3);
}

#[test]
fn up_counter_reset_input_clears_count_and_bit() {
    let mut interp = load("NETWORK 1\nSTR X1\nSTR X2\nCNTU CT1 3\n");
    for _ in 0..3 {
        set_bit(&mut interp, "X1", true);
        interp.run_scan();
        set_bit(&mut interp, "X1", false);
        interp.run_scan();
    }
    assert_eq!(get_word(&interp, "CTD1"), 3);
    assert!(get_bit(&interp, "CT1"));

    set_bit(&mut interp, "X2", true);
    interp.run_scan();
    assert_eq!(get_word(&interp, "CTD1"), 0);
    assert!(!get_bit(&interp, "CT1"));
}

#[test]
fn down_counter_reloads_preset_on_reset() {
    let mut interp = load("NETWORK 1\nSTR X1\nSTR X2\nCNTD CT2 2\n");
    set_bit(&mut interp, "X2", true);
    interp.run_scan();
    assert_eq!(get_word(&interp, "CTD2"), 2);
    set_bit(&mut interp, "X2", false);
    for _ in 0..2 {
        set_bit(&mut interp, "X1", true);
        interp.run_scan();
        set_bit(&mut interp, "X1", false);
        interp.run_scan();
    }
    assert_eq!(get_word(&interp, "CTD2"), 0);
    assert!(get_bit(&interp, "CT2"));
}

#[test]
fn down_counter_with_a_single_input_decrements_on_edges() {
    let mut interp = load("NETWORK 1\nSTR X1\nCNTD CT3 2\nOUT Y1\n");
    interp
        .data_table()
        .set("CTD3", Value::Word(2))
        .expect("set");
    interp.run_scan();
    assert!(!get_bit(&interp, "CT3"));
    for expected in [1, 0] {
        set_bit(&mut interp, "X1", true);
        interp.run_scan();
        assert_eq!(get_word(&interp, "CTD3"), expected);
        set_bit(&mut interp, "X1", false);
        interp.run_scan();
    }
    assert!(get_bit(&interp, "CT3"));
    assert!(get_bit(&interp, "Y1"));

    // further edges floor at zero
    set_bit(&mut interp, "X1", true);
    interp.run_scan();
    assert_eq!(get_word(&interp, "CTD3"), 0);
    assert!(get_bit(&interp, "CT3"));
}

#[test]
fn up_down_counter_tracks_both_edges() {
    let mut interp = load("NETWORK 1\nSTR X1\nSTR X2\nSTR X3\nUDC CT3 2\n");
    for _ in 0..2 {
        set_bit(&mut interp, "X1", true);
        interp.run_scan();
        set_bit(&mut interp, "X1", false);
        interp.run_scan();
    }
    assert_eq!(get_word(&interp, "CTD3"), 2);
    assert!(get_bit(&interp, "CT3"));
    set_bit(&mut interp, "X2", true);
    interp.run_scan();
    assert_eq!(get_word(&interp, "CTD3"), 1);
    assert!(!get_bit(&interp, "CT3"));
}

#[test]
fn first_scan_bit_is_true_exactly_once() {
    // S4
    let mut interp = load("NETWORK 1\nSTR SC5\nOUT Y1\n");
    interp.run_scan();
    assert!(get_bit(&interp, "Y1"));
    interp.run_scan();
    assert!(!get_bit(&interp, "Y1"));
}

#[test]
fn system_bits_follow_the_scan_protocol() {
    let mut interp = load("NETWORK 1\nSTR SC1\nOUT Y1\n");
    interp.run_scan();
    assert!(get_bit(&interp, "SC1"));
    assert!(!get_bit(&interp, "SC2"));
    assert!(get_bit(&interp, "SC3"));
    assert!(get_bit(&interp, "SC7"));
    assert_eq!(get_word(&interp, "SD1"), 1);
    interp.run_scan();
    assert!(!get_bit(&interp, "SC3"));
    assert_eq!(get_word(&interp, "SD1"), 2);
    interp.run_scan();
    assert!(get_bit(&interp, "SC3"));
    assert_eq!(get_word(&interp, "SD1"), 3);
}

#[test]
fn math_follows_precedence_and_truncates_into_words() {
    // S5
    let mut interp = load("NETWORK 1\nSTR SC1\nMATHDEC DS1 0 DS2 + DS3 * 2\n");
    interp.data_table().set("DS2", Value::Word(3)).expect("set");
    interp.data_table().set("DS3", Value::Word(4)).expect("set");
    interp.run_scan();
    assert_eq!(get_word(&interp, "DS1"), 11);
}

#[test]
fn mathhex_is_bitwise_over_the_table() {
    let mut interp = load("NETWORK 1\nSTR SC1\nMATHHEX DH1 0 (DH2 | 0xF0) & 0xFF\n");
    interp
        .data_table()
        .set("DH2", Value::Word(0x0A))
        .expect("set");
    interp.run_scan();
    assert_eq!(get_word(&interp, "DH1"), 0xFA);
}

#[test]
fn copy_and_block_operations_move_values() {
    let mut interp = load(
        "NETWORK 1\nSTR SC1\nCOPY 5 DS1\nCPYBLK DS1 DS10 3\nFILL DS20 4 9\nCOPY DS1 DF1\nCOPY \"run\" TXT1\n",
    );
    interp.data_table().set("DS2", Value::Word(6)).expect("set");
    interp.data_table().set("DS3", Value::Word(7)).expect("set");
    interp.run_scan();
    assert_eq!(get_word(&interp, "DS10"), 5);
    assert_eq!(get_word(&interp, "DS11"), 6);
    assert_eq!(get_word(&interp, "DS12"), 7);
    for index in 20..24 {
        assert_eq!(get_word(&interp, &format!("DS{index}")), 9);
    }
    assert_eq!(get(&interp, "DF1"), Value::Float(5.0));
    assert_eq!(get(&interp, "TXT1"), Value::Text("run".to_string()));
}

#[test]
fn pack_unpack_round_trips_sixteen_bits() {
    let mut interp = load("NETWORK 1\nSTR SC1\nPACK C1 DS1\nUNPACK DS1 C101\n");
    set_bit(&mut interp, "C1", true);
    set_bit(&mut interp, "C3", true);
    set_bit(&mut interp, "C16", true);
    interp.run_scan();
    assert_eq!(get_word(&interp, "DS1"), 0b1000_0000_0000_0101);
    assert!(get_bit(&interp, "C101"));
    assert!(!get_bit(&interp, "C102"));
    assert!(get_bit(&interp, "C103"));
    assert!(get_bit(&interp, "C116"));
}

#[test]
fn sum_adds_a_range_into_the_destination() {
    let mut interp = load("NETWORK 1\nSTR SC1\nSUM DS1 DS4 DD1\n");
    for (index, value) in [(1, 10), (2, 20), (3, 30), (4, 40)] {
        interp
            .data_table()
            .set(&format!("DS{index}"), Value::Word(value))
            .expect("set");
    }
    interp.run_scan();
    assert_eq!(get_word(&interp, "DD1"), 100);
}

#[test]
fn find_reports_the_first_matching_offset_or_minus_one() {
    let mut interp = load("NETWORK 1\nSTR SC1\nFINDEQ DS1 5 7 DS100\nFINDGT DS1 5 99 DS101\n");
    interp.data_table().set("DS3", Value::Word(7)).expect("set");
    interp.run_scan();
    assert_eq!(get_word(&interp, "DS100"), 2);
    assert_eq!(get_word(&interp, "DS101"), -1);
}

#[test]
fn incremental_find_resumes_and_wraps() {
    let mut interp = load("NETWORK 1\nSTR SC1\nFINDIEQ DS1 6 7 DS90 DS100\n");
    interp.data_table().set("DS2", Value::Word(7)).expect("set");
    interp.data_table().set("DS5", Value::Word(7)).expect("set");
    interp.run_scan();
    assert_eq!(get_word(&interp, "DS100"), 1);
    assert_eq!(get_word(&interp, "DS90"), 2);
    interp.run_scan();
    assert_eq!(get_word(&interp, "DS100"), 4);
    assert_eq!(get_word(&interp, "DS90"), 5);
    interp.run_scan();
    assert_eq!(get_word(&interp, "DS100"), -1);
    assert_eq!(get_word(&interp, "DS90"), 0);
}

#[test]
fn shift_register_shifts_on_clock_edges_and_clears_on_reset() {
    let mut interp = load("NETWORK 1\nSTR X1\nSTR X2\nSTR X3\nSHFRG C1 C4\n");
    // clock in a 1 then a 0 then a 1
    for data in [true, false, true] {
        set_bit(&mut interp, "X1", data);
        set_bit(&mut interp, "X2", true);
        interp.run_scan();
        set_bit(&mut interp, "X2", false);
        interp.run_scan();
    }
    assert!(get_bit(&interp, "C1")); // latest
    assert!(!get_bit(&interp, "C2"));
    assert!(get_bit(&interp, "C3")); // first
    assert!(!get_bit(&interp, "C4"));

    set_bit(&mut interp, "X3", true);
    interp.run_scan();
    for index in 1..=4 {
        assert!(!get_bit(&interp, &format!("C{index}")), "C{index}");
    }
}

#[test]
fn for_loops_repeat_their_body() {
    let mut interp = load("NETWORK 1\nSTR SC1\nFOR 4\nMATHDEC DS1 0 DS1 + 1\nNEXT\n");
    interp.run_scan();
    assert_eq!(get_word(&interp, "DS1"), 4);
    interp.run_scan();
    assert_eq!(get_word(&interp, "DS1"), 8);
}

#[test]
fn subroutines_run_inline_with_their_own_stack() {
    let source = "NETWORK 1\nSTR X1\nCALL pump\nNETWORK 2\nSTR X1\nOUT Y9\nSBR pump\nNETWORK 1\nSTR X2\nOUT Y1\nNETWORK 2\nSTRN X2\nOUT Y2\n";
    let mut interp = load(source);
    set_bit(&mut interp, "X1", true);
    interp.run_scan();
    assert!(!get_bit(&interp, "Y1"));
    assert!(get_bit(&interp, "Y2"));
    assert!(get_bit(&interp, "Y9")); // caller's stack was restored
    set_bit(&mut interp, "X2", true);
    interp.run_scan();
    assert!(get_bit(&interp, "Y1"));
    assert!(!get_bit(&interp, "Y2"));
}

#[test]
fn rtc_returns_from_the_subroutine_only() {
    let source = "NETWORK 1\nSTR X1\nCALL guard\nNETWORK 2\nSTR SC1\nOUT Y3\nSBR guard\nNETWORK 1\nSTR X2\nRTC\nNETWORK 2\nSTR SC1\nOUT Y1\n";
    let mut interp = load(source);
    set_bit(&mut interp, "X1", true);
    set_bit(&mut interp, "X2", true);
    interp.run_scan();
    assert!(!get_bit(&interp, "Y1")); // skipped by the return
    assert!(get_bit(&interp, "Y3")); // main continued

    set_bit(&mut interp, "X2", false);
    interp.run_scan();
    assert!(get_bit(&interp, "Y1"));
}

#[test]
fn endc_terminates_continuous_execution_even_inside_a_subroutine() {
    let source = "NETWORK 1\nSTR SC1\nCALL finisher\nNETWORK 2\nSTR SC1\nOUT Y1\nSBR finisher\nNETWORK 1\nSTR X1\nENDC\n";
    let mut interp = load(source);
    let code = interp.run_continuous(RunOptions {
        max_scans: Some(3),
        ..Default::default()
    });
    assert_eq!(code, ExitCode::MaxScansReached);
    assert!(get_bit(&interp, "Y1"));

    let mut interp = load(source);
    set_bit(&mut interp, "X1", true);
    let code = interp.run_continuous(RunOptions {
        max_scans: Some(3),
        ..Default::default()
    });
    assert_eq!(code, ExitCode::End);
    assert_eq!(interp.scan_count(), 1);
    // END aborts the rest of the scan
    assert!(!get_bit(&interp, "Y1"));
}

#[test]
fn stop_handle_halts_a_continuous_run_between_scans() {
    let mut interp = load("NETWORK 1\nSTR SC1\nOUT Y1\n");
    let handle = interp.stop_handle();
    let worker = std::thread::spawn(move || {
        interp.run_continuous(RunOptions {
            target_scan_time_ms: Some(1.0),
            ..Default::default()
        })
    });
    std::thread::sleep(std::time::Duration::from_millis(50));
    handle.stop();
    let code = worker.join().expect("worker thread");
    assert_eq!(code, ExitCode::Stopped);
}

#[test]
fn runtime_errors_are_counted_hooked_and_scoped_to_their_network() {
    // network 1 faults on a runtime FOR bound; network 2 still runs
    let source = "NETWORK 1\nSTR SC1\nFOR DS1\nCOPY 1 DS2\nNEXT\nNETWORK 2\nSTR SC1\nOUT Y1\n";
    let hook_hits = Arc::new(AtomicU64::new(0));
    let hits = Arc::clone(&hook_hits);
    let mut interp = load_with(
        source,
        InterpreterOptions {
            error_hook: Some(Box::new(move |error| {
                assert_eq!(error.network, 1);
                hits.fetch_add(1, Ordering::SeqCst);
            })),
            ..Default::default()
        },
    );
    interp
        .data_table()
        .set("DS1", Value::Word(-5))
        .expect("set");
    interp.run_scan();
    assert_eq!(hook_hits.load(Ordering::SeqCst), 1);
    assert_eq!(interp.stats().errors, 1);
    assert!(get_bit(&interp, "Y1"));
    assert_eq!(get_word(&interp, "DS2"), 0);

    // scans keep going after an error
    interp.run_scan();
    assert_eq!(interp.stats().errors, 2);
    assert_eq!(interp.scan_count(), 2);
}

#[test]
fn cyclic_calls_trip_the_depth_bound_instead_of_overflowing() {
    let source = "NETWORK 1\nSTR SC1\nCALL a\nSBR a\nNETWORK 1\nSTR SC1\nCALL b\nSBR b\nNETWORK 1\nSTR SC1\nCALL a\n";
    let parsed = parse(source);
    assert!(parsed.is_clean());
    let compiled = compile(&parsed).expect("compile");
    let mut interp = Interpreter::new(compiled, InterpreterOptions::default());
    interp.run_scan();
    assert_eq!(interp.stats().errors, 1);
}

#[test]
fn scan_statistics_accumulate() {
    let mut interp = load("NETWORK 1\nSTR SC1\nOUT Y1\n");
    for _ in 0..5 {
        interp.run_scan();
    }
    let stats = interp.stats();
    assert_eq!(stats.scans, 5);
    assert!(stats.total_ms >= 0.0);
    assert!(stats.min_ms <= stats.max_ms);
    assert_eq!(interp.scan_count(), 5);
}

#[test]
fn data_table_can_be_carried_across_programs() {
    let mut first = load("NETWORK 1\nSTR SC1\nCOPY 42 DS1\n");
    first.run_scan();
    let parsed = parse("NETWORK 1\nSTRE DS1 42\nOUT Y1\n");
    let compiled = compile(&parsed).expect("compile");
    let mut second = Interpreter::new(
        compiled,
        InterpreterOptions {
            data_table: Some(first.data_table().clone()),
            ..Default::default()
        },
    );
    second.run_scan();
    assert!(get_bit(&second, "Y1"));
}
