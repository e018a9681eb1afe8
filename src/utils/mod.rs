#[cfg(test)]
pub mod test_utils;

/// Sign of `v` as -1, 0 or 1. NaN maps to 0.
pub fn sgn(v: f64) -> i32 {
    if v > 0.0 {
        1
    } else if v < 0.0 {
        -1
    } else {
        0
    }
}
