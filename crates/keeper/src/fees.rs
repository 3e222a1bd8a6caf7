//! Split of the collected fee balance into its four streams

use tracing::info;

use crate::config::FeesConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeeSplit {
    pub dao: u64,
    pub dev: u64,
    pub burn: u64,
    pub reflect: u64,
    /// Left in the source account by flooring and unallocated share
    pub dust: u64,
}

impl FeeSplit {
    /// Each stream gets `floor(balance * pct / total_pct)`
    pub fn compute(balance: u64, fees: &FeesConfig) -> Self {
        let share = |pct: f64| -> u64 {
            let value = balance as f64 * pct / fees.total_pct;
            if value.is_finite() && value > 0.0 {
                (value.floor() as u64).min(balance)
            } else {
                0
            }
        };

        let dao = share(fees.dao_pct);
        let dev = share(fees.dev_pct);
        let burn = share(fees.burn_pct);
        let reflect = share(fees.reflect_pct);
        let allocated = dao.saturating_add(dev).saturating_add(burn).saturating_add(reflect);

        let split = Self {
            dao,
            dev,
            burn,
            reflect,
            dust: balance.saturating_sub(allocated),
        };
        info!(
            "Fee split of {}: dao {} dev {} burn {} reflect {} dust {}",
            balance, split.dao, split.dev, split.burn, split.reflect, split.dust
        );
        split
    }

    pub fn total(&self) -> u64 {
        self.dao + self.dev + self.burn + self.reflect + self.dust
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_split() {
        let split = FeeSplit::compute(69_001, &FeesConfig::default());
        assert_eq!(split.dao, 1_000);
        assert_eq!(split.dev, 3_000);
        assert_eq!(split.burn, 15_000);
        assert_eq!(split.reflect, 50_000);
        assert_eq!(split.dust, 1);
        assert_eq!(split.total(), 69_001);
    }

    #[test]
    fn test_flooring_goes_to_dust() {
        let split = FeeSplit::compute(100, &FeesConfig::default());
        // 1.449.. / 4.347.. / 21.739.. / 72.463..
        assert_eq!((split.dao, split.dev, split.burn, split.reflect), (1, 4, 21, 72));
        assert_eq!(split.dust, 2);
        assert_eq!(split.total(), 100);
    }

    #[test]
    fn test_unallocated_share_stays_as_dust() {
        let fees = FeesConfig {
            total_pct: 10.0,
            dao_pct: 1.0,
            dev_pct: 0.0,
            burn_pct: 0.0,
            reflect_pct: 4.0,
        };
        let split = FeeSplit::compute(1_000, &fees);
        assert_eq!(split.dao, 100);
        assert_eq!(split.reflect, 400);
        assert_eq!(split.dust, 500);
    }

    #[test]
    fn test_zero_balance() {
        assert_eq!(FeeSplit::compute(0, &FeesConfig::default()), FeeSplit::default());
    }
}
