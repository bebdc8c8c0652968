//! Price facts derived from upstream variants

use chrono::{DateTime, Utc};

use crate::client::VariantDto;

/// Per-condition price summary of a card
///
/// Recomputed wholesale from the variant list on every fetch; prices that are absent from
/// the latest fetch become `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceSummary {
    pub low: Option<f64>,
    pub high: Option<f64>,
    pub market: Option<f64>,
    pub near_mint: Option<f64>,
    pub lightly_played: Option<f64>,
    pub moderately_played: Option<f64>,
    pub heavily_played: Option<f64>,
    pub damaged: Option<f64>,
    pub foil_near_mint: Option<f64>,
    pub foil: Option<f64>,
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Condition {
    NearMint,
    LightlyPlayed,
    ModeratelyPlayed,
    HeavilyPlayed,
    Damaged,
}

impl Condition {
    fn parse(raw: &str) -> Option<Self> {
        let lower = raw.trim().to_lowercase();
        if lower.contains("near mint") || lower == "nm" {
            Some(Self::NearMint)
        } else if lower.contains("lightly") || lower == "lp" {
            Some(Self::LightlyPlayed)
        } else if lower.contains("moderately") || lower == "mp" {
            Some(Self::ModeratelyPlayed)
        } else if lower.contains("heavily") || lower == "hp" {
            Some(Self::HeavilyPlayed)
        } else if lower.contains("damaged") || lower == "dmg" {
            Some(Self::Damaged)
        } else {
            None
        }
    }
}

fn is_foil_printing(printing: &str) -> bool {
    let lower = printing.to_lowercase();
    lower.contains("foil") || lower.contains("holo")
}

impl PriceSummary {
    /// Builds a summary from a card's variants
    ///
    /// Returns `None` when no variant carries a price, so the caller can keep whatever
    /// summary it already has.
    pub fn from_variants(variants: &[VariantDto], now: DateTime<Utc>) -> Option<Self> {
        let mut summary = Self::default();
        let mut priced = 0usize;

        for variant in variants {
            let Some(price) = variant.price else {
                continue;
            };
            priced += 1;

            let foil = variant.printing.as_deref().map_or(false, is_foil_printing);

            summary.low = Some(summary.low.map_or(price, |low| low.min(price)));
            summary.high = Some(summary.high.map_or(price, |high| high.max(price)));

            match variant.condition.as_deref().and_then(Condition::parse) {
                Some(Condition::NearMint) if foil => summary.foil_near_mint = Some(price),
                Some(Condition::NearMint) => {
                    summary.near_mint = Some(price);
                    summary.market = Some(price);
                }
                Some(Condition::LightlyPlayed) => summary.lightly_played = Some(price),
                Some(Condition::ModeratelyPlayed) => summary.moderately_played = Some(price),
                Some(Condition::HeavilyPlayed) => summary.heavily_played = Some(price),
                Some(Condition::Damaged) => summary.damaged = Some(price),
                None => {}
            }

            if foil && summary.foil.is_none() {
                summary.foil = Some(price);
            }
        }

        if priced == 0 {
            return None;
        }

        // Without a non-foil near-mint offer the cheapest offer stands in as market price.
        if summary.market.is_none() {
            summary.market = summary.low;
        }
        summary.last_updated = Some(now);

        Some(summary)
    }

    /// True when no price field is set
    pub fn is_empty(&self) -> bool {
        [
            self.low,
            self.high,
            self.market,
            self.near_mint,
            self.lightly_played,
            self.moderately_played,
            self.heavily_played,
            self.damaged,
            self.foil_near_mint,
            self.foil,
        ]
        .iter()
        .all(Option::is_none)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variant(printing: &str, condition: &str, price: Option<f64>) -> VariantDto {
        VariantDto {
            id: None,
            printing: Some(printing.to_string()),
            condition: Some(condition.to_string()),
            price,
            last_updated: None,
        }
    }

    #[test]
    fn test_conditions_and_range() {
        let variants = vec![
            variant("Normal", "Near Mint", Some(10.0)),
            variant("Normal", "Lightly Played", Some(8.0)),
            variant("Normal", "MP", Some(6.0)),
            variant("Normal", "Heavily Played", Some(4.0)),
            variant("Normal", "Damaged", Some(2.0)),
            variant("Foil", "Near Mint", Some(30.0)),
        ];
        let now = Utc::now();
        let summary = PriceSummary::from_variants(&variants, now).unwrap();

        assert_eq!(summary.low, Some(2.0));
        assert_eq!(summary.high, Some(30.0));
        assert_eq!(summary.near_mint, Some(10.0));
        assert_eq!(summary.market, Some(10.0));
        assert_eq!(summary.lightly_played, Some(8.0));
        assert_eq!(summary.moderately_played, Some(6.0));
        assert_eq!(summary.heavily_played, Some(4.0));
        assert_eq!(summary.damaged, Some(2.0));
        assert_eq!(summary.foil_near_mint, Some(30.0));
        assert_eq!(summary.foil, Some(30.0));
        assert_eq!(summary.last_updated, Some(now));
    }

    #[test]
    fn test_market_falls_back_to_low() {
        let variants = vec![
            variant("Holofoil", "Near Mint", Some(12.0)),
            variant("Normal", "Lightly Played", Some(3.5)),
        ];
        let summary = PriceSummary::from_variants(&variants, Utc::now()).unwrap();
        assert_eq!(summary.near_mint, None);
        assert_eq!(summary.market, Some(3.5));
    }

    #[test]
    fn test_condition_matching_is_case_insensitive() {
        let variants = vec![variant("normal", "NEAR MINT", Some(1.0)), variant("normal", "Nm", Some(1.0))];
        let summary = PriceSummary::from_variants(&variants, Utc::now()).unwrap();
        assert_eq!(summary.near_mint, Some(1.0));
    }

    #[test]
    fn test_first_foil_variant_wins_foil_price() {
        let variants = vec![
            variant("Reverse Holofoil", "Lightly Played", Some(5.0)),
            variant("Foil", "Near Mint", Some(9.0)),
        ];
        let summary = PriceSummary::from_variants(&variants, Utc::now()).unwrap();
        assert_eq!(summary.foil, Some(5.0));
        assert_eq!(summary.foil_near_mint, Some(9.0));
    }

    #[test]
    fn test_null_prices_skipped() {
        let variants = vec![
            variant("Normal", "Near Mint", None),
            variant("Normal", "Damaged", Some(0.5)),
        ];
        let summary = PriceSummary::from_variants(&variants, Utc::now()).unwrap();
        assert_eq!(summary.near_mint, None);
        assert_eq!(summary.low, Some(0.5));
        assert_eq!(summary.market, Some(0.5));
    }

    #[test]
    fn test_no_priced_variant_yields_none() {
        assert!(PriceSummary::from_variants(&[], Utc::now()).is_none());
        let variants = vec![variant("Normal", "Near Mint", None)];
        assert!(PriceSummary::from_variants(&variants, Utc::now()).is_none());
    }

    #[test]
    fn test_unknown_condition_still_counts_for_range() {
        let variants = vec![variant("Normal", "Sealed", Some(99.0))];
        let summary = PriceSummary::from_variants(&variants, Utc::now()).unwrap();
        assert_eq!(summary.high, Some(99.0));
        assert_eq!(summary.market, Some(99.0));
        assert!(!summary.is_empty());
        assert!(PriceSummary::default().is_empty());
    }
}
