/// Progress of a run measured against a fixed target
///
/// The percentage is always derived from the two fields and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProgressCounter {
    numerator: f64,
    denominator: u64,
}

impl ProgressCounter {
    /// Creates a counter at zero measured against `denominator`
    pub fn new(denominator: u64) -> Self {
        Self {
            numerator: 0.0,
            denominator,
        }
    }

    pub fn numerator(&self) -> f64 {
        self.numerator
    }

    pub fn denominator(&self) -> u64 {
        self.denominator
    }

    /// Advances the counter; negative or NaN amounts are ignored
    pub fn advance(&mut self, amount: f64) {
        if amount > 0.0 {
            self.numerator += amount;
        }
    }

    /// Moves the numerator up to the denominator
    pub fn fill(&mut self) {
        let target = self.denominator as f64;
        if self.numerator < target {
            self.numerator = target;
        }
    }

    /// Percentage done, in `[0, 100]`, rounded to two decimals
    ///
    /// # Examples
    ///
    /// ```
    /// use site_harvest::stats::ProgressCounter;
    ///
    /// let mut counter = ProgressCounter::new(3);
    /// counter.advance(1.0);
    /// assert_eq!(counter.percentage(), 33.33);
    /// ```
    pub fn percentage(&self) -> f64 {
        if self.denominator == 0 {
            return 0.0;
        }
        let raw = (self.numerator / self.denominator as f64 * 100.0).min(100.0);
        (raw * 100.0).round() / 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_denominator() {
        let mut counter = ProgressCounter::new(0);
        counter.advance(5.0);
        assert_eq!(counter.percentage(), 0.0);
    }

    #[test]
    fn test_rounding() {
        let mut counter = ProgressCounter::new(7);
        counter.advance(1.0);
        assert_eq!(counter.percentage(), 14.29);
    }

    #[test]
    fn test_capped_at_hundred() {
        let mut counter = ProgressCounter::new(5);
        counter.advance(12.0);
        assert_eq!(counter.percentage(), 100.0);
    }

    #[test]
    fn test_negative_advance_ignored() {
        let mut counter = ProgressCounter::new(10);
        counter.advance(2.0);
        counter.advance(-1.0);
        counter.advance(f64::NAN);
        assert_eq!(counter.numerator(), 2.0);
    }

    #[test]
    fn test_fill_never_lowers() {
        let mut counter = ProgressCounter::new(4);
        counter.advance(6.0);
        counter.fill();
        assert_eq!(counter.numerator(), 6.0);

        let mut counter = ProgressCounter::new(4);
        counter.advance(1.0);
        counter.fill();
        assert_eq!(counter.percentage(), 100.0);
    }
}
