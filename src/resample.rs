//! Signal resampling
//!
//! Maps an arbitrary-length segment onto a fixed-length phase grid by linear
//! interpolation. The `L` original samples are spread evenly over the target
//! index domain `[1, N]` and the target grid is evaluated against them, with
//! linear extrapolation past either end.

/// Resample `signal` to exactly `n` samples
///
/// An empty input yields `n` zeros; a single sample is held constant.
pub fn resample(signal: &[f64], n: usize) -> Vec<f64> {
    match signal.len() {
        0 => {
            tracing::debug!(target_len = n, "empty segment resampled to zeros");
            vec![0.0; n]
        }
        1 => vec![signal[0]; n],
        len => {
            let original_index = linspace(1.0, n as f64, len);
            let grid: Vec<f64> = (1..=n).map(|k| k as f64).collect();
            interp_extrapolate(&grid, &original_index, signal)
        }
    }
}

/// `num` evenly spaced values over `[start, end]`
pub fn linspace(start: f64, end: f64, num: usize) -> Vec<f64> {
    match num {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (num - 1) as f64;
            (0..num)
                .map(|i| if i == num - 1 { end } else { start + step * i as f64 })
                .collect()
        }
    }
}

/// Piecewise-linear interpolation of `(xp, fp)` at `x`, extrapolating linearly
/// from the first and last segments
///
/// `xp` must be strictly increasing and at least two points long.
pub fn interp_extrapolate(x: &[f64], xp: &[f64], fp: &[f64]) -> Vec<f64> {
    debug_assert_eq!(xp.len(), fp.len());
    debug_assert!(xp.len() >= 2);
    let last = xp.len() - 2;
    let mut segment = 0;

    x.iter()
        .map(|&xi| {
            // Targets are usually sorted, so restart the scan only when needed
            if xi < xp[segment] {
                segment = 0;
            }
            while segment < last && xi > xp[segment + 1] {
                segment += 1;
            }
            let (x0, x1) = (xp[segment], xp[segment + 1]);
            let (y0, y1) = (fp[segment], fp[segment + 1]);
            y0 + (y1 - y0) * (xi - x0) / (x1 - x0)
        })
        .collect()
}
