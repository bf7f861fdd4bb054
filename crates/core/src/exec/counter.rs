//! Counter arithmetic. Counts live in the shadow word address; these
//! functions take the stored count plus the detected edges and return the
//! new count and bit.

/// `CNTU`: rising edges count up to the preset, where the bit latches and
/// the count caps.
pub(crate) fn count_up(count: i32, rising: bool, reset: bool, preset: i32) -> (i32, bool) {
    if reset {
        return (0, false);
    }
    let mut count = count;
    if rising {
        count = count.saturating_add(1);
    }
    if count >= preset {
        count = preset;
    }
    (count, count >= preset)
}

/// `CNTD`: rising edges count down toward zero, where the bit asserts;
/// reset reloads the preset.
pub(crate) fn count_down(count: i32, rising: bool, reset: bool, preset: i32) -> (i32, bool) {
    if reset {
        return (preset, preset <= 0);
    }
    let mut count = count;
    if rising {
        count = count.saturating_sub(1);
    }
    if count < 0 {
        count = 0;
    }
    (count, count <= 0)
}

/// `UDC`: independent up/down edges, up winning when both fire in the same
/// scan; the count is clamped to a 16-bit range and the bit holds only at
/// exactly the preset.
pub(crate) fn up_down(
    count: i32,
    up: bool,
    down: bool,
    reset: bool,
    preset: i32,
) -> (i32, bool) {
    if reset {
        return (0, preset == 0);
    }
    let mut count = count;
    if up {
        count += 1;
    } else if down {
        count -= 1;
    }
    count = count.clamp(0, 65_535);
    (count, count == preset)
}
