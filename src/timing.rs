use std::fmt;

use tracing::debug;

use crate::config::TimingConfig;
use crate::error::{Error, Result};

/// Patterns are kept in a `u32`, so no ratio can go past this.
pub const MAX_RATIO: usize = 32;

const NS_PER_SEC: f64 = 1_000_000_000.0;

/// Output bits sent for one protocol bit, most significant bit first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitPattern {
    bits: u32,
    len: u32,
}

impl BitPattern {
    /// `bits` holds the pattern right aligned, `len` is its width.
    pub fn new(bits: u32, len: u32) -> Result<Self> {
        if len == 0 || len as usize > MAX_RATIO {
            return Err(Error::invalid_config(format!(
                "bit pattern width {} not in 1..={}",
                len, MAX_RATIO
            )));
        }
        if len < 32 && bits >> len != 0 {
            return Err(Error::invalid_config(format!(
                "bit pattern {:#b} wider than {} bits",
                bits, len
            )));
        }
        Ok(BitPattern { bits, len })
    }

    /// `high` ones followed by `len - high` zeros
    fn pulse(len: u32, high: u32) -> Self {
        let ones = (1u64 << high) - 1;
        BitPattern {
            bits: (ones << (len - high)) as u32,
            len,
        }
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn high_count(&self) -> u32 {
        self.bits.count_ones()
    }

    pub fn low_count(&self) -> u32 {
        self.len - self.high_count()
    }
}

impl fmt::Display for BitPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:0width$b}", self.bits, width = self.len as usize)
    }
}

/// Serial framing that reproduces the protocol timing at one clock rate.
///
/// Built once from a [`TimingConfig`]. If the clock cannot hit the timing
/// within tolerance the build fails, so nothing downstream ever sees an
/// unusable configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct TimingModel {
    clock_hz: u32,
    zero: BitPattern,
    one: BitPattern,
    reset_padding_len: usize,
}

impl TimingModel {
    pub fn build(config: &TimingConfig) -> Result<Self> {
        if config.clock_hz == 0 {
            return Err(Error::invalid_config("clock rate must be above 0 Hz"));
        }
        let durations = [
            ("t0h", config.t0h_ns),
            ("t0l", config.t0l_ns),
            ("t1h", config.t1h_ns),
            ("t1l", config.t1l_ns),
            ("reset", config.reset_ns),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, ns)| *ns == 0) {
            return Err(Error::invalid_config(format!("{} duration must be above 0", name)));
        }
        if config.max_ratio < 2 || config.max_ratio > MAX_RATIO {
            return Err(Error::invalid_config(format!(
                "max_ratio {} not in 2..={}",
                config.max_ratio, MAX_RATIO
            )));
        }

        let period_ns = NS_PER_SEC / f64::from(config.clock_hz);
        let tolerance = f64::from(config.tolerance_ns);

        for ratio in 2..=config.max_ratio as u32 {
            let zero = fit_pulse(ratio, period_ns, config.t0h_ns, config.t0l_ns, tolerance);
            let one = fit_pulse(ratio, period_ns, config.t1h_ns, config.t1l_ns, tolerance);

            if let (Some(zero), Some(one)) = (zero, one) {
                // a wide tolerance can put both bits on the same high count
                if zero == one {
                    continue;
                }

                let reset_padding_len = reset_padding_len(config.reset_ns, config.clock_hz);
                debug!(
                    clock_hz = config.clock_hz,
                    ratio,
                    %zero,
                    %one,
                    reset_padding_len,
                    "timing model built"
                );
                return Ok(TimingModel {
                    clock_hz: config.clock_hz,
                    zero,
                    one,
                    reset_padding_len,
                });
            }
        }

        Err(Error::invalid_config(format!(
            "no oversampling ratio up to {} reaches t0h={}ns t0l={}ns t1h={}ns t1l={}ns \
             within {}ns at {} Hz",
            config.max_ratio,
            config.t0h_ns,
            config.t0l_ns,
            config.t1h_ns,
            config.t1l_ns,
            config.tolerance_ns,
            config.clock_hz
        )))
    }

    /// Output bits per protocol bit
    pub fn ratio(&self) -> usize {
        self.zero.len()
    }

    pub fn zero(&self) -> BitPattern {
        self.zero
    }

    pub fn one(&self) -> BitPattern {
        self.one
    }

    /// Zero bytes needed after a frame to exceed the reset time
    pub fn reset_padding_len(&self) -> usize {
        self.reset_padding_len
    }

    pub fn clock_hz(&self) -> u32 {
        self.clock_hz
    }

    /// Duration of a single output bit
    pub fn bit_period_ns(&self) -> f64 {
        NS_PER_SEC / f64::from(self.clock_hz)
    }

    pub fn high_ns(&self, pattern: BitPattern) -> f64 {
        f64::from(pattern.high_count()) * self.bit_period_ns()
    }

    pub fn low_ns(&self, pattern: BitPattern) -> f64 {
        f64::from(pattern.low_count()) * self.bit_period_ns()
    }
}

/// Best high count for one protocol bit at `ratio`, if any is within tolerance
fn fit_pulse(ratio: u32, period_ns: f64, high_ns: u32, low_ns: u32, tolerance: f64) -> Option<BitPattern> {
    (1..ratio)
        .filter_map(|high| {
            let high_err = (f64::from(high) * period_ns - f64::from(high_ns)).abs();
            let low_err = (f64::from(ratio - high) * period_ns - f64::from(low_ns)).abs();
            (high_err <= tolerance && low_err <= tolerance).then_some((high, high_err + low_err))
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(high, _)| BitPattern::pulse(ratio, high))
}

/// Whole zero bytes whose low time is strictly longer than `reset_ns`
fn reset_padding_len(reset_ns: u32, clock_hz: u32) -> usize {
    let bit_ns = u64::from(reset_ns) * u64::from(clock_hz);
    (bit_ns / (8 * NS_PER_SEC as u64) + 1) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_three_at_2400khz() {
        let model = TimingModel::build(&TimingConfig::ws2812b(2_400_000)).unwrap();
        assert_eq!(model.ratio(), 3);
        assert_eq!(model.zero().to_string(), "100");
        assert_eq!(model.one().to_string(), "110");
        // 50us at 2.4MHz is exactly 120 bits, one more byte to get past it
        assert_eq!(model.reset_padding_len(), 16);
    }

    #[test]
    fn test_smallest_ratio_at_6500khz() {
        let model = TimingModel::build(&TimingConfig::ws2812b(6_500_000)).unwrap();
        assert_eq!(model.ratio(), 7);
        assert_eq!(model.zero().to_string(), "1100000");
        assert_eq!(model.one().to_string(), "1111100");
        assert_eq!(model.reset_padding_len(), 41);
        assert!((model.high_ns(model.zero()) - 307.69).abs() < 0.01);
    }

    #[test]
    fn test_reset_padding_exceeds_minimum() {
        for clock_hz in [2_400_000, 3_200_000, 6_500_000] {
            let config = TimingConfig::ws2812b(clock_hz);
            let model = TimingModel::build(&config).unwrap();
            let low_ns = model.reset_padding_len() as f64 * 8.0 * model.bit_period_ns();
            assert!(low_ns > f64::from(config.reset_ns), "{} Hz: {} ns", clock_hz, low_ns);
            // and no more than one byte past it
            assert!(low_ns - 8.0 * model.bit_period_ns() <= f64::from(config.reset_ns) + 1e-6);
        }
    }

    #[test]
    fn test_unreachable_t1h() {
        let mut config = TimingConfig::ws2812b(2_400_000);
        config.t1h_ns = 5_000;
        let err = TimingModel::build(&config).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_tolerance_is_honoured() {
        // ratio 3 misses t0h=400 by 17ns
        let mut config = TimingConfig::ws2812b(2_400_000);
        config.tolerance_ns = 10;
        config.max_ratio = 3;
        assert!(TimingModel::build(&config).is_err());
    }

    #[test]
    fn test_bad_config() {
        let mut config = TimingConfig::ws2812b(0);
        assert!(TimingModel::build(&config).is_err());

        config.clock_hz = 2_400_000;
        config.max_ratio = 1;
        assert!(TimingModel::build(&config).is_err());

        config.max_ratio = MAX_RATIO + 1;
        assert!(TimingModel::build(&config).is_err());

        config.max_ratio = 8;
        config.reset_ns = 0;
        assert!(TimingModel::build(&config).is_err());
    }

    #[test]
    fn test_custom_pattern() {
        let pattern = BitPattern::new(0b1100_0000, 8).unwrap();
        assert_eq!(pattern.high_count(), 2);
        assert_eq!(pattern.low_count(), 6);
        assert!(BitPattern::new(0b1_0000, 4).is_err());
        assert!(BitPattern::new(0, 0).is_err());
    }
}
