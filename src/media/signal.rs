/// Last value emitted for a composite signal (a product of independent inputs).
///
/// [`Composite::update`] reports whether the emitted value actually changed, so callers only
/// touch the host pipeline on real changes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Composite {
    emitted: f64,
}

impl Composite {
    /// Start from an already emitted value.
    pub fn new(initial: f64) -> Self {
        Self { emitted: initial }
    }

    /// Currently emitted value.
    pub fn get(self) -> f64 {
        self.emitted
    }

    /// Recompute from `inputs`; returns `true` if the product differs from the emitted value.
    pub fn update(&mut self, inputs: &[f64]) -> bool {
        let next = inputs.iter().product::<f64>();
        if next == self.emitted {
            return false;
        }
        self.emitted = next;
        true
    }
}

impl Default for Composite {
    fn default() -> Self {
        Self::new(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unchanged_product_is_not_reported() {
        let mut c = Composite::default();
        assert!(!c.update(&[1.0, 1.0]));
        assert!(c.update(&[0.5, 1.0]));
        assert!(!c.update(&[1.0, 0.5]));
        assert_eq!(c.get(), 0.5);
    }
}
