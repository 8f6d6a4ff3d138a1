//! FFT helpers built on `rustfft`.

use rustfft::FftPlanner;

use crate::domain::Complex64;

/// Real signal of length `n` whose spectrum is `half` (bins `0..=n/2`),
/// completed by Hermitian symmetry.
pub fn irfft(half: &[Complex64], n: usize) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    let mut buf = vec![Complex64::new(0.0, 0.0); n];
    for (k, v) in half.iter().enumerate().take(n / 2 + 1) {
        buf[k] = *v;
        if k > 0 && k < n - k {
            buf[n - k] = v.conj();
        }
    }
    // Bin 0 and the Nyquist bin of a real signal are real.
    buf[0].im = 0.0;
    if n % 2 == 0 {
        buf[n / 2].im = 0.0;
    }

    let mut planner = FftPlanner::<f64>::new();
    planner.plan_fft_inverse(n).process(&mut buf);
    let scale = 1.0 / n as f64;
    buf.iter().map(|c| c.re * scale).collect()
}

/// Linear convolution of `a` and `b`, truncated to `n_out` samples.
pub fn fft_convolve(a: &[f64], b: &[f64], n_out: usize) -> Vec<f64> {
    if a.is_empty() || b.is_empty() {
        return vec![0.0; n_out];
    }
    let n = (a.len() + b.len() - 1).next_power_of_two();
    let mut fa: Vec<Complex64> = a.iter().map(|&v| Complex64::new(v, 0.0)).collect();
    let mut fb: Vec<Complex64> = b.iter().map(|&v| Complex64::new(v, 0.0)).collect();
    fa.resize(n, Complex64::new(0.0, 0.0));
    fb.resize(n, Complex64::new(0.0, 0.0));

    let mut planner = FftPlanner::<f64>::new();
    let forward = planner.plan_fft_forward(n);
    forward.process(&mut fa);
    forward.process(&mut fb);
    for (x, y) in fa.iter_mut().zip(&fb) {
        *x *= *y;
    }
    planner.plan_fft_inverse(n).process(&mut fa);

    let scale = 1.0 / n as f64;
    let mut out: Vec<f64> = fa.iter().take(n_out).map(|c| c.re * scale).collect();
    out.resize(n_out, 0.0);
    out
}

/// Autocorrelation `r[τ] = Σ x[j]·x[j+τ]` for `τ` in `0..x.len()`.
pub fn autocorrelation(x: &[f64]) -> Vec<f64> {
    let n = x.len();
    if n == 0 {
        return Vec::new();
    }
    let m = (2 * n).next_power_of_two();
    let mut buf: Vec<Complex64> = x.iter().map(|&v| Complex64::new(v, 0.0)).collect();
    buf.resize(m, Complex64::new(0.0, 0.0));

    let mut planner = FftPlanner::<f64>::new();
    planner.plan_fft_forward(m).process(&mut buf);
    for c in buf.iter_mut() {
        *c = Complex64::new(c.norm_sqr(), 0.0);
    }
    planner.plan_fft_inverse(m).process(&mut buf);
    let scale = 1.0 / m as f64;
    buf.iter().take(n).map(|c| c.re * scale).collect()
}

/// Periodic Hann window, `w[i] = 0.5·(1 − cos(2πi/n))`.
pub fn hann_window(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / n as f64).cos()))
        .collect()
}

/// `|X_k|²` for bins `0..=n_fft/2` of `frame`, zero-padded to `n_fft`.
pub fn power_spectrum(frame: &[f64], n_fft: usize) -> Vec<f64> {
    if n_fft == 0 {
        return Vec::new();
    }
    let mut buf: Vec<Complex64> = frame.iter().take(n_fft).map(|&v| Complex64::new(v, 0.0)).collect();
    buf.resize(n_fft, Complex64::new(0.0, 0.0));
    FftPlanner::<f64>::new().plan_fft_forward(n_fft).process(&mut buf);
    buf.iter().take(n_fft / 2 + 1).map(|c| c.norm_sqr()).collect()
}
