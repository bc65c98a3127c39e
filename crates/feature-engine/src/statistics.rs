//! Statistics helpers shared by calibration and reporting

/// Arithmetic mean, `None` for an empty slice
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Running mean without keeping the samples
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanAccumulator {
    sum: f64,
    count: usize,
}

impl MeanAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_mean_computation() {
        assert_eq!(mean(&[1.0, 2.0, 3.0, 4.0, 5.0]), Some(3.0));
    }

    #[test]
    fn test_empty_values() {
        assert_eq!(mean(&[]), None);
        assert_eq!(MeanAccumulator::new().mean(), None);
    }

    proptest! {
        #[test]
        fn accumulator_matches_slice_mean(values in proptest::collection::vec(-10.0f64..10.0, 1..64)) {
            let mut acc = MeanAccumulator::new();
            for v in &values {
                acc.push(*v);
            }
            let expected = mean(&values).unwrap();
            prop_assert!((acc.mean().unwrap() - expected).abs() < 1e-9);
            prop_assert_eq!(acc.count(), values.len());
        }
    }
}
