/// Linear warmup from 0 to `base_lr`, then linear decay to 0 at `total_steps`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearWarmup {
    pub base_lr: f64,
    pub warmup_steps: usize,
    pub total_steps: usize,
}

impl LinearWarmup {
    pub fn new(base_lr: f64, warmup_steps: usize, total_steps: usize) -> Self {
        Self {
            base_lr,
            warmup_steps,
            total_steps,
        }
    }

    /// Learning rate for the optimizer step taken after `step` completed steps.
    pub fn lr_at(&self, step: usize) -> f64 {
        if step < self.warmup_steps {
            return self.base_lr * step as f64 / self.warmup_steps.max(1) as f64;
        }
        let remaining = self.total_steps.saturating_sub(step) as f64;
        let span = self.total_steps.saturating_sub(self.warmup_steps).max(1) as f64;
        self.base_lr * (remaining / span).max(0.0)
    }
}

/// Optimizer steps the schedule is stretched over: `floor(n_train / batch_size * epochs)`.
pub fn num_train_steps(n_train: usize, batch_size: usize, epochs: usize) -> usize {
    (n_train as f64 / batch_size.max(1) as f64 * epochs as f64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn no_warmup_decays_linearly_to_zero() {
        let s = LinearWarmup::new(3e-5, 0, 100);
        assert!(close(s.lr_at(0), 3e-5));
        assert!(close(s.lr_at(50), 1.5e-5));
        assert!(close(s.lr_at(100), 0.0));
        assert!(close(s.lr_at(150), 0.0));
    }

    #[test]
    fn warmup_ramps_up_then_decays() {
        let s = LinearWarmup::new(1.0, 10, 110);
        assert!(close(s.lr_at(0), 0.0));
        assert!(close(s.lr_at(5), 0.5));
        assert!(close(s.lr_at(10), 1.0));
        assert!(close(s.lr_at(60), 0.5));
    }

    #[test]
    fn zero_total_steps_does_not_divide_by_zero() {
        let s = LinearWarmup::new(1.0, 0, 0);
        assert!(close(s.lr_at(0), 0.0));
    }

    #[test]
    fn train_steps_floor_the_fractional_count() {
        assert_eq!(num_train_steps(100, 8, 5), 62);
        assert_eq!(num_train_steps(16, 8, 5), 10);
        assert_eq!(num_train_steps(0, 8, 5), 0);
    }
}
