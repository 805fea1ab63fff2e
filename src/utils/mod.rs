//! Utility functions shared by the estimator, kernel and cross-validation code

/// Statistical helpers
pub mod stats {
    use std::f64::consts::PI;

    /// Natural log of the gamma function via the Lanczos approximation (g=7)
    pub fn ln_gamma(x: f64) -> f64 {
        const COEFFS: [f64; 8] = [
            676.5203681218851,
            -1259.1392167224028,
            771.32342877765313,
            -176.61502916214059,
            12.507343278686905,
            -0.13857109526572012,
            9.9843695780195716e-6,
            1.5056327351493116e-7,
        ];

        if x < 0.5 {
            // Reflection: Gamma(x) Gamma(1-x) = pi / sin(pi x)
            (PI / (PI * x).sin()).ln() - ln_gamma(1.0 - x)
        } else {
            let x = x - 1.0;
            let mut ag = 0.99999999999980993_f64;
            for (i, &c) in COEFFS.iter().enumerate() {
                ag += c / (x + i as f64 + 1.0);
            }
            let t = x + 7.5;
            0.5 * (2.0 * PI).ln() + (x + 0.5) * t.ln() - t + ag.ln()
        }
    }

    /// Median of a slice, ignoring NaN entries
    ///
    /// Returns `None` when no finite value remains.
    pub fn median(values: &[f64]) -> Option<f64> {
        let mut kept: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        if kept.is_empty() {
            return None;
        }
        kept.sort_by(|a, b| a.total_cmp(b));
        let mid = kept.len() / 2;
        if kept.len() % 2 == 0 {
            Some(0.5 * (kept[mid - 1] + kept[mid]))
        } else {
            Some(kept[mid])
        }
    }

    /// Mean of the non-NaN entries, or NaN if there are none
    pub fn nan_mean(values: &[f64]) -> f64 {
        let (sum, count) = values
            .iter()
            .filter(|v| !v.is_nan())
            .fold((0.0, 0usize), |(s, c), &v| (s + v, c + 1));
        if count == 0 {
            f64::NAN
        } else {
            sum / count as f64
        }
    }

    /// Sample standard deviation of the non-NaN entries
    pub fn nan_std(values: &[f64]) -> f64 {
        let kept: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        if kept.len() < 2 {
            return 0.0;
        }
        let mean = kept.iter().sum::<f64>() / kept.len() as f64;
        let var = kept.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (kept.len() - 1) as f64;
        var.sqrt()
    }

    /// Largest finite value, if any
    pub fn max_finite(values: &[f64]) -> Option<f64> {
        values
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))))
    }
}

/// Progress reporting for long batches of independent work items
pub mod progress {
    use log::info;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Thread-safe counter that reports every `every` completed items
    #[derive(Debug)]
    pub struct ProgressCounter {
        done: AtomicUsize,
        total: usize,
        every: usize,
        print: bool,
        what: &'static str,
    }

    impl ProgressCounter {
        /// `every == 0` disables reporting; `print` sends reports to stderr
        pub fn new(what: &'static str, total: usize, every: usize, print: bool) -> Self {
            Self {
                done: AtomicUsize::new(0),
                total,
                every,
                print,
                what,
            }
        }

        /// Record one finished item, reporting if a step boundary is crossed
        pub fn tick(&self) {
            let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
            if self.every > 0 && (done % self.every == 0 || done == self.total) {
                self.report(done);
            }
        }

        /// Items finished so far
        pub fn done(&self) -> usize {
            self.done.load(Ordering::Relaxed)
        }

        fn report(&self, done: usize) {
            if self.print {
                eprintln!("{}: {}/{}", self.what, done, self.total);
            } else {
                info!("{}: {}/{}", self.what, done, self.total);
            }
        }
    }
}

/// Memory estimates for solver caches
pub mod memory {
    /// Bytes used by one cached Q column of `n` entries, including key overhead
    pub fn column_bytes(n: usize) -> usize {
        n * std::mem::size_of::<f64>() + 2 * std::mem::size_of::<usize>()
    }

    /// Number of Q columns that fit in `bytes`, never fewer than two
    pub fn columns_for_budget(bytes: usize, n: usize) -> usize {
        (bytes / column_bytes(n.max(1))).max(2)
    }
}
