use std::cmp::Ordering;
use std::fmt::Display;

/// Assert two float values are the same up to `eps`.
#[allow(dead_code)]
pub fn assert_float_eq(left: f64, right: f64, eps: f64) {
    if left.is_nan() {
        assert!(right.is_nan(), "left is NaN, but right is not");
    } else {
        let diff = (left - right).abs();
        assert!(
            diff < eps,
            "values |{} - {}| ≥ {} (diff: {})",
            left,
            right,
            eps,
            diff
        );
    }
}

/// Assert two float slices are the same up to `eps`.
#[allow(dead_code)]
pub fn assert_floats_eq<T: Into<f64> + Copy + Display>(left: &[T], right: &[T], eps: f64) {
    assert_eq!(left.len(), right.len());
    for (l, r) in left.iter().zip(right.iter()) {
        assert_float_eq((*l).into(), (*r).into(), eps)
    }
}

/// Index of the first element of the sorted `vec` that is greater than
/// `value`, i.e. the number of elements `<= value`.
///
/// Runs of equal elements are skipped entirely, so a cumulative probability
/// table never selects a zero-mass entry.
pub fn bisect_right<T: PartialOrd>(vec: &[T], value: &T) -> usize {
    let mut left = 0;
    let mut right = vec.len();
    while left < right {
        let mid = left + (right - left) / 2;
        match vec[mid].partial_cmp(value) {
            Some(Ordering::Less) | Some(Ordering::Equal) => left = mid + 1,
            _ => right = mid,
        }
    }
    left
}

/// Running sums of `values`.
pub fn cumulative_sum(values: &[f64]) -> Vec<f64> {
    values
        .iter()
        .scan(0.0, |state, &x| {
            *state += x;
            Some(*state)
        })
        .collect()
}
