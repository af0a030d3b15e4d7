//! Fundamental screens applied once a ticker is tagged

use crate::types::{Fundamentals, GrowthLabel};

/// Year-over-year growth fraction that counts as strong
const STRONG_GROWTH: f64 = 0.25;

/// Market-cap band in USD, lower bound exclusive so a zeroed cap never passes.
#[derive(Debug, Clone, Copy)]
pub struct CapBand {
    pub min: f64,
    pub max: f64,
}

impl Default for CapBand {
    fn default() -> Self {
        Self {
            min: 0.0,
            max: 100e9,
        }
    }
}

impl CapBand {
    pub fn contains(&self, market_cap: Option<f64>) -> bool {
        market_cap.is_some_and(|cap| cap > self.min && cap <= self.max)
    }
}

/// Classify year-over-year growth. EBITDA growth stands in when earnings
/// growth is unknown; when either side is still unknown the label is
/// unconfirmed rather than a failure.
pub fn classify_growth(fundamentals: &Fundamentals) -> GrowthLabel {
    let earnings = fundamentals.earnings_growth.or(fundamentals.ebitda_growth);
    let (Some(revenue), Some(earnings)) = (fundamentals.revenue_growth, earnings) else {
        return GrowthLabel::Unconfirmed;
    };

    if revenue >= STRONG_GROWTH && earnings >= STRONG_GROWTH {
        GrowthLabel::Excellent
    } else if revenue >= STRONG_GROWTH || earnings >= STRONG_GROWTH {
        GrowthLabel::Good
    } else {
        GrowthLabel::Insufficient
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fundamentals(
        revenue: Option<f64>,
        earnings: Option<f64>,
        ebitda: Option<f64>,
    ) -> Fundamentals {
        Fundamentals {
            market_cap: Some(5e9),
            revenue_growth: revenue,
            earnings_growth: earnings,
            ebitda_growth: ebitda,
            operating_cashflow: None,
        }
    }

    #[test]
    fn test_growth_label_tiers() {
        assert_eq!(
            classify_growth(&fundamentals(Some(0.30), Some(0.28), None)),
            GrowthLabel::Excellent
        );
        assert_eq!(
            classify_growth(&fundamentals(Some(0.55), Some(0.05), None)),
            GrowthLabel::Good
        );
        assert_eq!(
            classify_growth(&fundamentals(Some(0.05), Some(0.40), None)),
            GrowthLabel::Good
        );
        assert_eq!(
            classify_growth(&fundamentals(Some(0.05), Some(0.05), None)),
            GrowthLabel::Insufficient
        );
    }

    #[test]
    fn test_ebitda_substitutes_for_missing_earnings() {
        assert_eq!(
            classify_growth(&fundamentals(Some(0.30), None, Some(0.26))),
            GrowthLabel::Excellent
        );
        assert_eq!(
            classify_growth(&fundamentals(Some(0.30), None, None)),
            GrowthLabel::Unconfirmed
        );
        assert_eq!(
            classify_growth(&fundamentals(None, Some(0.30), None)),
            GrowthLabel::Unconfirmed
        );
    }

    #[test]
    fn test_cap_band_bounds() {
        let band = CapBand::default();
        assert!(!band.contains(None));
        assert!(!band.contains(Some(0.0)));
        assert!(band.contains(Some(50e9)));
        assert!(band.contains(Some(100e9)));
        assert!(!band.contains(Some(100.5e9)));
    }
}
