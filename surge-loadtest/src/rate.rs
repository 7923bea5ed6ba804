//! Per-user rate selection

use crate::error::LoadTestError;
use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use surge_config::UserControllerConfiguration;

/// Pick the pacing rate for a new user.
///
/// Without a distribution every user runs at 1.0. Otherwise a rate is drawn
/// with the configured percentages as weights.
pub fn pick_rate(config: &UserControllerConfiguration) -> Result<f64, LoadTestError> {
    let dist = &config.rates_distribution;
    if dist.is_empty() {
        return Ok(1.0);
    }

    let index = WeightedIndex::new(dist.iter().map(|d| d.percentage))
        .map_err(|e| LoadTestError::RateSelection(e.to_string()))?;

    Ok(dist[index.sample(&mut rand::rng())].rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use surge_config::RatesDistribution;

    #[test]
    fn test_default_rate() {
        let config = UserControllerConfiguration::default();
        assert_eq!(pick_rate(&config).unwrap(), 1.0);
    }

    #[test]
    fn test_weighted_rate() {
        let mut config = UserControllerConfiguration::default();
        config.rates_distribution = vec![
            RatesDistribution { rate: 0.5, percentage: 0.0 },
            RatesDistribution { rate: 2.0, percentage: 1.0 },
        ];
        for _ in 0..50 {
            assert_eq!(pick_rate(&config).unwrap(), 2.0);
        }

        config.rates_distribution[1].percentage = 0.3;
        config.rates_distribution[0].percentage = 0.7;
        for _ in 0..50 {
            let rate = pick_rate(&config).unwrap();
            assert!(rate == 0.5 || rate == 2.0);
        }
    }

    #[test]
    fn test_zero_weights_fail() {
        let mut config = UserControllerConfiguration::default();
        config.rates_distribution = vec![RatesDistribution { rate: 1.0, percentage: 0.0 }];
        assert!(matches!(pick_rate(&config), Err(LoadTestError::RateSelection(_))));
    }
}
