//! Grids and interpolation helpers.

/// `n` evenly spaced points from `start` to `end` (both included).
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n as f64 - 1.0);
            let mut out: Vec<f64> = (0..n).map(|i| start + step * i as f64).collect();
            out[n - 1] = end;
            out
        }
    }
}

/// Frequencies `start, start+step, ...` up to and including `end` (within half a step).
pub fn arange(start: f64, end: f64, step: f64) -> Vec<f64> {
    if !(step > 0.0) || end < start {
        return Vec::new();
    }
    let n = ((end - start) / step + 0.5).floor() as usize + 1;
    (0..n).map(|i| start + step * i as f64).collect()
}

/// Natural cubic spline through strictly increasing abscissae.
///
/// With two points the spline degenerates to a straight line.
#[derive(Debug, Clone, PartialEq)]
pub struct NaturalSpline {
    x: Vec<f64>,
    y: Vec<f64>,
    /// Second derivatives at the knots (zero at both ends).
    m: Vec<f64>,
}

impl NaturalSpline {
    /// Returns `None` when fewer than two points are given or `x` is not
    /// strictly increasing.
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> Option<Self> {
        let n = x.len();
        if n < 2 || y.len() != n || x.windows(2).any(|w| !(w[1] > w[0])) {
            return None;
        }
        let mut m = vec![0.0; n];
        if n > 2 {
            // Thomas algorithm on the interior equations.
            let k = n - 2;
            let mut diag = vec![0.0; k];
            let mut upper = vec![0.0; k];
            let mut rhs = vec![0.0; k];
            for j in 0..k {
                let i = j + 1;
                let h0 = x[i] - x[i - 1];
                let h1 = x[i + 1] - x[i];
                diag[j] = 2.0 * (h0 + h1);
                upper[j] = h1;
                rhs[j] = 6.0 * ((y[i + 1] - y[i]) / h1 - (y[i] - y[i - 1]) / h0);
            }
            for j in 1..k {
                let lower = x[j + 1] - x[j];
                let w = lower / diag[j - 1];
                diag[j] -= w * upper[j - 1];
                rhs[j] -= w * rhs[j - 1];
            }
            m[k] = rhs[k - 1] / diag[k - 1];
            for j in (0..k - 1).rev() {
                m[j + 1] = (rhs[j] - upper[j] * m[j + 2]) / diag[j];
            }
        }
        Some(Self { x, y, m })
    }

    pub fn eval(&self, t: f64) -> f64 {
        let n = self.x.len();
        let i = self.x.partition_point(|&v| v <= t).clamp(1, n - 1) - 1;
        let h = self.x[i + 1] - self.x[i];
        let a = (self.x[i + 1] - t) / h;
        let b = (t - self.x[i]) / h;
        a * self.y[i]
            + b * self.y[i + 1]
            + ((a * a * a - a) * self.m[i] + (b * b * b - b) * self.m[i + 1]) * h * h / 6.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linspace_includes_endpoints() {
        let v = linspace(0.0, 1.4, 8);
        assert_eq!(v.len(), 8);
        assert_eq!(v[0], 0.0);
        assert_eq!(v[7], 1.4);
        assert!((v[1] - 0.2).abs() < 1e-15);
    }

    #[test]
    fn arange_is_inclusive() {
        let f = arange(30.0, 3000.0, 1.0);
        assert_eq!(f.len(), 2971);
        assert_eq!(*f.last().unwrap(), 3000.0);
    }

    #[test]
    fn spline_interpolates_knots_and_reproduces_lines() {
        let s = NaturalSpline::new(vec![0.0, 1.0, 3.0, 4.0], vec![1.0, 2.0, 0.5, 1.0]).unwrap();
        for (&x, &y) in [0.0, 1.0, 3.0, 4.0].iter().zip(&[1.0, 2.0, 0.5, 1.0]) {
            assert!((s.eval(x) - y).abs() < 1e-12);
        }

        let line = NaturalSpline::new(vec![0.0, 0.5, 2.0], vec![1.0, 2.0, 5.0]).unwrap();
        assert!((line.eval(1.2) - 3.4).abs() < 1e-12);
    }

    #[test]
    fn spline_rejects_unordered_knots() {
        assert!(NaturalSpline::new(vec![0.0, 0.0], vec![1.0, 1.0]).is_none());
        assert!(NaturalSpline::new(vec![0.0], vec![1.0]).is_none());
    }
}
