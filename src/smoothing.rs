//! Two-stage smoothing filter: a nonlinear median filter followed by a
//! Savitzky-Golay polynomial filter.
//!
//! The chain is fixed by an offline grid search over `SSR + lambda *
//! Roughness` and must be applied in this order, as a unit — neither stage
//! is a substitute for the other. See [`smooth`].

use crate::config::PipelineConfig;

/// Applies the median filter, then the Savitzky-Golay filter, in that order.
///
/// Returns `data` unchanged (a copy) if `data.len() < max(median_kernel,
/// savgol_window)` — the segment is too short to smooth meaningfully.
pub fn smooth(data: &[f64], cfg: &PipelineConfig) -> Vec<f64> {
    if data.len() < cfg.min_smoothable_len() {
        return data.to_vec();
    }
    let median_stage = median_filter(data, cfg.median_kernel);
    savgol_filter(&median_stage, cfg.savgol_window, cfg.savgol_order)
}

/// Median filter with an odd kernel width and symmetric edge reflection.
pub fn median_filter(data: &[f64], kernel: usize) -> Vec<f64> {
    assert!(kernel % 2 == 1, "median_kernel must be odd, got {kernel}");
    if data.is_empty() {
        return Vec::new();
    }
    let half = kernel / 2;
    let n = data.len();
    let mut out = Vec::with_capacity(n);
    let mut window = Vec::with_capacity(kernel);
    for i in 0..n {
        window.clear();
        for offset in -(half as isize)..=(half as isize) {
            let idx = reflect_index(i as isize + offset, n);
            window.push(data[idx]);
        }
        window.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        out.push(window[half]);
    }
    out
}

/// Reflects an out-of-range index back into `[0, n)` (symmetric reflection,
/// no repeated edge sample): `-1 -> 0`, `-2 -> 1`, `n -> n-1`, `n+1 -> n-2`.
fn reflect_index(i: isize, n: usize) -> usize {
    let n = n as isize;
    let mut i = i;
    while i < 0 || i >= n {
        if i < 0 {
            i = -i - 1;
        } else if i >= n {
            i = 2 * n - i - 1;
        }
    }
    i as usize
}

/// Savitzky-Golay filter: local least-squares polynomial fit per window,
/// evaluated at the window center. Endpoints reuse the nearest fully
/// interior window's fitted polynomial, extrapolated beyond its own domain.
pub fn savgol_filter(data: &[f64], window: usize, order: usize) -> Vec<f64> {
    assert!(window % 2 == 1, "savgol_window must be odd, got {window}");
    let n = data.len();
    if n == 0 {
        return Vec::new();
    }
    if n < window {
        return data.to_vec();
    }
    let half = (window / 2) as isize;
    let mut out = vec![0.0_f64; n];

    // Interior centers: fit + evaluate at x = 0 (the center itself).
    for center in (half as usize)..(n - half as usize) {
        let coeffs = fit_local_polynomial(data, center, half, order);
        out[center] = eval_polynomial(&coeffs, 0.0);
    }

    // Left endpoints extrapolate from the first interior window.
    let first_center = half as usize;
    let first_coeffs = fit_local_polynomial(data, first_center, half, order);
    for i in 0..first_center {
        let x = i as f64 - first_center as f64;
        out[i] = eval_polynomial(&first_coeffs, x);
    }

    // Right endpoints extrapolate from the last interior window.
    let last_center = n - 1 - half as usize;
    let last_coeffs = fit_local_polynomial(data, last_center, half, order);
    for i in (last_center + 1)..n {
        let x = i as f64 - last_center as f64;
        out[i] = eval_polynomial(&last_coeffs, x);
    }

    out
}

/// Fits a degree-`order` polynomial (in local offset `x = j - center`) to the
/// window `[center - half, center + half]` via ordinary least squares,
/// returning coefficients `[c0, c1, ..., c_order]`.
fn fit_local_polynomial(data: &[f64], center: usize, half: isize, order: usize) -> Vec<f64> {
    let dims = order + 1;
    let mut ata = vec![vec![0.0_f64; dims]; dims];
    let mut aty = vec![0.0_f64; dims];

    for offset in -half..=half {
        let idx = (center as isize + offset) as usize;
        let y = data[idx];
        let x = offset as f64;
        let mut powers = vec![1.0_f64; dims];
        for p in 1..dims {
            powers[p] = powers[p - 1] * x;
        }
        for r in 0..dims {
            aty[r] += powers[r] * y;
            for c in 0..dims {
                ata[r][c] += powers[r] * powers[c];
            }
        }
    }

    solve_linear_system(ata, aty)
}

fn eval_polynomial(coeffs: &[f64], x: f64) -> f64 {
    let mut acc = 0.0;
    let mut xp = 1.0;
    for c in coeffs {
        acc += c * xp;
        xp *= x;
    }
    acc
}

/// Solves `a * x = b` via Gaussian elimination with partial pivoting.
/// `a` is small (at most a few rows, one per polynomial coefficient).
fn solve_linear_system(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Vec<f64> {
    let n = b.len();
    for col in 0..n {
        let mut pivot = col;
        for row in (col + 1)..n {
            if a[row][col].abs() > a[pivot][col].abs() {
                pivot = row;
            }
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        let diag = a[col][col];
        if diag.abs() < 1e-15 {
            continue;
        }
        for row in (col + 1)..n {
            let factor = a[row][col] / diag;
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0_f64; n];
    for row in (0..n).rev() {
        let mut sum = b[row];
        for k in (row + 1)..n {
            sum -= a[row][k] * x[k];
        }
        x[row] = if a[row][row].abs() < 1e-15 { 0.0 } else { sum / a[row][row] };
    }
    x
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_filter_removes_single_spike() {
        let mut data = vec![1.0; 21];
        data[10] = 100.0;
        let out = median_filter(&data, 5);
        assert!((out[10] - 1.0).abs() < 1e-9, "spike should be removed, got {}", out[10]);
    }

    #[test]
    fn median_filter_preserves_flat_signal() {
        let data = vec![3.5; 15];
        let out = median_filter(&data, 5);
        for v in out {
            assert!((v - 3.5).abs() < 1e-9);
        }
    }

    #[test]
    fn savgol_smooths_noisy_line_near_exactly() {
        // A perfectly linear ramp should be reproduced almost exactly by a
        // quadratic-order fit, including at the endpoints.
        let data: Vec<f64> = (0..40).map(|i| 2.0 * i as f64 + 1.0).collect();
        let out = savgol_filter(&data, 9, 2);
        for (i, (&orig, &smoothed)) in data.iter().zip(out.iter()).enumerate() {
            assert!((orig - smoothed).abs() < 1e-6, "index {i}: {orig} vs {smoothed}");
        }
    }

    #[test]
    fn smooth_returns_input_unchanged_when_too_short() {
        let cfg = PipelineConfig::default();
        let data = vec![1.0, 2.0, 3.0];
        let out = smooth(&data, &cfg);
        assert_eq!(out, data);
    }

    #[test]
    fn smooth_preserves_triangular_peak_amplitude_within_5_percent() {
        let cfg = PipelineConfig::default();
        // Triangular peak of amplitude 0.3 over 300 samples.
        let mut data = vec![0.0_f64; 300];
        for i in 100..250 {
            let frac = (i - 100) as f64 / 150.0;
            data[i] = if frac <= 1.0 / 3.0 {
                0.3 * (frac / (1.0 / 3.0))
            } else {
                0.3 * (1.0 - (frac - 1.0 / 3.0) / (2.0 / 3.0))
            };
        }
        let out = smooth(&data, &cfg);
        let peak_in = data.iter().cloned().fold(f64::MIN, f64::max);
        let peak_out = out.iter().cloned().fold(f64::MIN, f64::max);
        assert!(
            (peak_out - peak_in).abs() / peak_in < 0.05,
            "peak {peak_in} vs smoothed {peak_out}"
        );
    }

    #[test]
    fn double_application_bound_is_well_behaved() {
        let cfg = PipelineConfig::default();
        let mut data = vec![0.0_f64; 200];
        for (i, v) in data.iter_mut().enumerate() {
            *v = (i as f64 * 0.05).sin() + if i == 100 { 2.0 } else { 0.0 };
        }
        let once = smooth(&data, &cfg);
        let twice = smooth(&once, &cfg);
        for i in 0..data.len() {
            let delta_once = (once[i] - data[i]).abs();
            let delta_twice = (twice[i] - data[i]).abs();
            assert!(
                delta_twice <= delta_once * 1.5 + 1e-9,
                "index {i}: single-pass delta {delta_once}, double-pass delta {delta_twice}"
            );
        }
    }
}
