use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl DailyBar {
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn upper_shadow(&self) -> f64 {
        self.high - self.open.max(self.close)
    }

    pub fn lower_shadow(&self) -> f64 {
        self.open.min(self.close) - self.low
    }
}

/// Fundamentals snapshot for one ticker. Absent fields mean "unknown",
/// never zero.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Fundamentals {
    pub market_cap: Option<f64>,
    pub revenue_growth: Option<f64>,
    pub earnings_growth: Option<f64>,
    pub ebitda_growth: Option<f64>,
    pub operating_cashflow: Option<f64>,
}

/// Pattern tag attached to a ticker. A ticker may carry several in the
/// same evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tag {
    #[serde(rename = "VCP_3Steps_Validated")]
    VcpThreeSteps,
    #[serde(rename = "High-Base")]
    HighBase,
    #[serde(rename = "High-Base(Strict)")]
    HighBaseStrict,
    #[serde(rename = "PowerPlay(70%+)")]
    PowerPlay,
}

impl Tag {
    pub fn is_high_base(&self) -> bool {
        matches!(self, Tag::HighBase | Tag::HighBaseStrict)
    }

    pub fn parse(s: &str) -> Option<Tag> {
        match s.trim() {
            "VCP_3Steps_Validated" => Some(Tag::VcpThreeSteps),
            "High-Base" => Some(Tag::HighBase),
            "High-Base(Strict)" => Some(Tag::HighBaseStrict),
            "PowerPlay(70%+)" => Some(Tag::PowerPlay),
            _ => None,
        }
    }

    /// Parse a comma-joined tag cell back into tags, ignoring unknowns.
    pub fn parse_list(s: &str) -> Vec<Tag> {
        s.split(',').filter_map(Tag::parse).collect()
    }

    pub fn join(tags: &[Tag]) -> String {
        tags.iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Tag::VcpThreeSteps => "VCP_3Steps_Validated",
            Tag::HighBase => "High-Base",
            Tag::HighBaseStrict => "High-Base(Strict)",
            Tag::PowerPlay => "PowerPlay(70%+)",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrowthLabel {
    Excellent,
    Good,
    Insufficient,
    Unconfirmed,
}

impl fmt::Display for GrowthLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GrowthLabel::Excellent => "excellent",
            GrowthLabel::Good => "good",
            GrowthLabel::Insufficient => "insufficient",
            GrowthLabel::Unconfirmed => "unconfirmed",
        };
        write!(f, "{}", s)
    }
}

impl GrowthLabel {
    pub fn parse(s: &str) -> Option<GrowthLabel> {
        match s.trim() {
            "excellent" => Some(GrowthLabel::Excellent),
            "good" => Some(GrowthLabel::Good),
            "insufficient" => Some(GrowthLabel::Insufficient),
            "unconfirmed" => Some(GrowthLabel::Unconfirmed),
            _ => None,
        }
    }
}

/// One qualifying ticker's output row for a single run. Immutable once
/// created; a new day produces a new row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenResult {
    pub ticker: String,
    pub price: f64,
    pub tags: Vec<Tag>,
    pub growth_label: GrowthLabel,
    pub revenue_growth_pct: Option<f64>,
    pub earnings_growth_pct: Option<f64>,
    pub ebitda_growth_pct: Option<f64>,
    pub operating_cf_millions: Option<f64>,
    pub market_cap_billions: Option<f64>,
    pub launchpad_score: u8,
    pub ema10: f64,
    pub sma20: f64,
    pub sma50: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_roundtrip() {
        let tags = vec![Tag::VcpThreeSteps, Tag::HighBaseStrict, Tag::PowerPlay];
        let joined = Tag::join(&tags);
        assert_eq!(
            joined,
            "VCP_3Steps_Validated, High-Base(Strict), PowerPlay(70%+)"
        );
        assert_eq!(Tag::parse_list(&joined), tags);
    }

    #[test]
    fn test_bar_shadows() {
        let bar = DailyBar {
            date: NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
            open: 10.0,
            high: 12.0,
            low: 9.0,
            close: 11.0,
            volume: 1000,
        };
        assert_eq!(bar.range(), 3.0);
        assert_eq!(bar.body(), 1.0);
        assert_eq!(bar.upper_shadow(), 1.0);
        assert_eq!(bar.lower_shadow(), 1.0);
    }
}
