//! Timer state machines. Accumulators are milliseconds advanced by the
//! previous scan's duration; the caller mirrors them into the shadow word
//! address after every tick.

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct TimerState {
    pub acc_ms: f64,
}

/// `TMR`: accumulate while enabled, done at preset, full reset on disable.
/// The accumulator never exceeds the preset.
pub(crate) fn on_delay(state: &mut TimerState, enabled: bool, preset_ms: f64, dt_ms: f64) -> bool {
    if !enabled {
        state.acc_ms = 0.0;
        return false;
    }
    state.acc_ms += dt_ms;
    if state.acc_ms >= preset_ms {
        state.acc_ms = preset_ms;
        true
    } else {
        false
    }
}

/// `TMRA`: like `TMR` but the accumulator survives disable; only the reset
/// input clears it, and reset wins over enable.
pub(crate) fn retentive(
    state: &mut TimerState,
    enabled: bool,
    reset: bool,
    preset_ms: f64,
    dt_ms: f64,
) -> bool {
    if reset {
        state.acc_ms = 0.0;
        return false;
    }
    if enabled {
        state.acc_ms += dt_ms;
        if state.acc_ms > preset_ms {
            state.acc_ms = preset_ms;
        }
    }
    state.acc_ms >= preset_ms
}

/// `TMROFF`: the bit holds while enabled and for `preset_ms` after the
/// enable drops.
pub(crate) fn off_delay(state: &mut TimerState, enabled: bool, preset_ms: f64, dt_ms: f64) -> bool {
    if enabled {
        state.acc_ms = 0.0;
        return true;
    }
    if state.acc_ms >= preset_ms {
        return false;
    }
    state.acc_ms += dt_ms;
    if state.acc_ms >= preset_ms {
        state.acc_ms = preset_ms;
        false
    } else {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn on_delay_times_out_and_caps() {
        let mut state = TimerState::default();
        assert!(!on_delay(&mut state, true, 50.0, 10.0));
        assert!(!on_delay(&mut state, true, 50.0, 10.0));
        assert!(!on_delay(&mut state, true, 50.0, 10.0));
        assert!(!on_delay(&mut state, true, 50.0, 10.0));
        assert!(on_delay(&mut state, true, 50.0, 10.0));
        assert_eq!(state.acc_ms, 50.0);
        assert!(on_delay(&mut state, true, 50.0, 10.0));
        assert_eq!(state.acc_ms, 50.0);
    }

    #[test]
    fn on_delay_resets_on_disable() {
        let mut state = TimerState::default();
        on_delay(&mut state, true, 50.0, 30.0);
        assert!(!on_delay(&mut state, false, 50.0, 30.0));
        assert_eq!(state.acc_ms, 0.0);
    }

    #[test]
    fn retentive_keeps_its_accumulator_across_disable() {
        let mut state = TimerState::default();
        retentive(&mut state, true, false, 100.0, 40.0);
        retentive(&mut state, false, false, 100.0, 40.0);
        assert_eq!(state.acc_ms, 40.0);
        assert!(!retentive(&mut state, true, false, 100.0, 40.0));
        assert!(retentive(&mut state, true, false, 100.0, 40.0));
    }

    #[test]
    fn retentive_reset_wins_over_enable() {
        let mut state = TimerState { acc_ms: 90.0 };
        assert!(!retentive(&mut state, true, true, 100.0, 40.0));
        assert_eq!(state.acc_ms, 0.0);
    }

    #[test]
    fn off_delay_holds_through_the_preset_window() {
        let mut state = TimerState::default();
        assert!(off_delay(&mut state, true, 50.0, 10.0));
        assert_eq!(state.acc_ms, 0.0);
        // enable drops; bit holds while the window runs down
        assert!(off_delay(&mut state, false, 50.0, 20.0));
        assert!(off_delay(&mut state, false, 50.0, 20.0));
        assert!(!off_delay(&mut state, false, 50.0, 20.0));
        assert!(!off_delay(&mut state, false, 50.0, 20.0));
        assert_eq!(state.acc_ms, 50.0);
    }
}
