//! Pure statistics over an observation's intensity matrix. Nothing here
//! mutates or caches; every call computes fresh from the view it is given.

use ndarray::{Array1, Array2, ArrayView2, Axis};

/// The median across the time axis of each frequency row. Even-length rows
/// take the mean of the middle pair, then the result is truncated toward
/// zero (matching integer-typed median pipelines).
pub fn per_frequency_median(data: ArrayView2<u8>) -> Array1<i16> {
    Array1::from_iter(data.outer_iter().map(|row| {
        let mut sorted = row.to_vec();
        sorted.sort_unstable();
        let n = sorted.len();
        if n == 0 {
            return 0;
        }
        let median = if n % 2 == 1 {
            f64::from(sorted[n / 2])
        } else {
            (f64::from(sorted[n / 2 - 1]) + f64::from(sorted[n / 2])) / 2.0
        };
        median as i16
    }))
}

/// `data[f, t] - median[f]`, the per-row baseline removed.
pub fn median_subtracted(data: ArrayView2<u8>) -> Array2<i16> {
    let median = per_frequency_median(data);
    Array2::from_shape_fn(data.dim(), |(f, t)| i16::from(data[(f, t)]) - median[f])
}

/// `(data[f, t] - median[f]) / median[f]`: baseline removed, then scaled by
/// the baseline itself. Rows whose median is zero produce NaN/±inf values;
/// these propagate to the caller, which must tolerate non-finite pixels.
pub fn median_relative(data: ArrayView2<u8>) -> Array2<f32> {
    let median = per_frequency_median(data);
    Array2::from_shape_fn(data.dim(), |(f, t)| {
        let m = f32::from(median[f]);
        (f32::from(data[(f, t)]) - m) / m
    })
}

/// Collapse the frequency axis: the total flux at each time sample.
pub fn flatten_frequency(data: ArrayView2<u8>) -> Array1<f64> {
    data.fold_axis(Axis(0), 0.0, |&acc, &v| acc + f64::from(v))
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    use super::*;

    #[test]
    fn median_of_even_length_row_truncates_toward_zero() {
        let data = array![[1_u8, 2, 3, 4]];
        // Mean of the middle pair is 2.5; integer result truncates to 2.
        assert_eq!(per_frequency_median(data.view()), array![2_i16]);
    }

    #[test]
    fn median_of_odd_length_row_is_exact() {
        let data = array![[9_u8, 1, 5], [7, 7, 7]];
        assert_eq!(per_frequency_median(data.view()), array![5_i16, 7]);
    }

    #[test]
    fn median_subtracted_rows_have_zero_median() {
        // Odd number of samples, so every per-row median is well defined.
        let data = array![
            [10_u8, 50, 30, 20, 40],
            [200, 0, 100, 150, 50],
            [7, 7, 7, 7, 7]
        ];
        let sub = median_subtracted(data.view());
        for row in sub.outer_iter() {
            let mut sorted = row.to_vec();
            sorted.sort_unstable();
            assert_eq!(sorted[sorted.len() / 2], 0);
        }
    }

    #[test]
    fn median_relative_is_scale_invariant_per_row() {
        let base = array![[10_u8, 20, 30, 40, 50]];
        let doubled = array![[20_u8, 40, 60, 80, 100]];
        let a = median_relative(base.view());
        let b = median_relative(doubled.view());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_abs_diff_eq!(x, y, epsilon = 1e-6);
        }
    }

    #[test]
    fn median_relative_zero_median_row_is_non_finite() {
        let data = array![[0_u8, 0, 5]];
        let rel = median_relative(data.view());
        // (0-0)/0 is NaN, (5-0)/0 is +inf; both flow through unguarded.
        assert!(rel.iter().all(|v| !v.is_finite()));
    }

    #[test]
    fn flatten_frequency_sums_each_time_sample() {
        let data = array![[1_u8, 2, 3], [4, 5, 6]];
        let flux = flatten_frequency(data.view());
        assert_eq!(flux, array![5.0, 7.0, 9.0]);
    }

    #[test]
    fn flatten_frequency_does_not_overflow_u8() {
        let data = ndarray::Array2::from_elem((100, 3), 255_u8);
        let flux = flatten_frequency(data.view());
        assert_eq!(flux, array![25500.0, 25500.0, 25500.0]);
    }
}
