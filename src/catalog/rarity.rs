use std::fmt;

/// Normalized card rarity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Rarity {
    #[default]
    Common,
    Uncommon,
    Rare,
    Holographic,
    Promo,
    SpecialArtRare,
    HyperRare,
    SuperRare,
    UltraRare,
    SecretRare,
    MythicRare,
}

impl Rarity {
    /// Maps a free-form upstream rarity label
    ///
    /// More specific keywords are checked first, so "Secret Rare" is not read as "Rare".
    pub fn from_upstream(label: Option<&str>) -> Self {
        let Some(label) = label else {
            return Self::Common;
        };
        let lower = label.to_lowercase();

        const RULES: [(&str, Rarity); 10] = [
            ("mythic", Rarity::MythicRare),
            ("secret", Rarity::SecretRare),
            ("ultra", Rarity::UltraRare),
            ("super", Rarity::SuperRare),
            ("hyper", Rarity::HyperRare),
            ("rare", Rarity::Rare),
            ("uncommon", Rarity::Uncommon),
            ("promo", Rarity::Promo),
            ("special", Rarity::SpecialArtRare),
            ("holo", Rarity::Holographic),
        ];

        RULES
            .iter()
            .find(|(keyword, _)| lower.contains(keyword))
            .map(|(_, rarity)| *rarity)
            .unwrap_or(Self::Common)
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Common => "common",
            Self::Uncommon => "uncommon",
            Self::Rare => "rare",
            Self::Holographic => "holographic",
            Self::Promo => "promo",
            Self::SpecialArtRare => "special_art_rare",
            Self::HyperRare => "hyper_rare",
            Self::SuperRare => "super_rare",
            Self::UltraRare => "ultra_rare",
            Self::SecretRare => "secret_rare",
            Self::MythicRare => "mythic_rare",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "common" => Some(Self::Common),
            "uncommon" => Some(Self::Uncommon),
            "rare" => Some(Self::Rare),
            "holographic" => Some(Self::Holographic),
            "promo" => Some(Self::Promo),
            "special_art_rare" => Some(Self::SpecialArtRare),
            "hyper_rare" => Some(Self::HyperRare),
            "super_rare" => Some(Self::SuperRare),
            "ultra_rare" => Some(Self::UltraRare),
            "secret_rare" => Some(Self::SecretRare),
            "mythic_rare" => Some(Self::MythicRare),
            _ => None,
        }
    }
}

impl fmt::Display for Rarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_specific_keywords_win() {
        assert_eq!(Rarity::from_upstream(Some("Secret Rare")), Rarity::SecretRare);
        assert_eq!(Rarity::from_upstream(Some("Mythic Rare")), Rarity::MythicRare);
        assert_eq!(Rarity::from_upstream(Some("Ultra Rare")), Rarity::UltraRare);
        assert_eq!(Rarity::from_upstream(Some("Holo Rare")), Rarity::Rare);
        assert_eq!(Rarity::from_upstream(Some("Uncommon")), Rarity::Uncommon);
        assert_eq!(Rarity::from_upstream(Some("Special Illustration")), Rarity::SpecialArtRare);
        assert_eq!(Rarity::from_upstream(Some("Holofoil")), Rarity::Holographic);
    }

    #[test]
    fn test_unknown_and_missing_are_common() {
        assert_eq!(Rarity::from_upstream(None), Rarity::Common);
        assert_eq!(Rarity::from_upstream(Some("Fixed")), Rarity::Common);
        assert_eq!(Rarity::from_upstream(Some("COMMON")), Rarity::Common);
    }

    #[test]
    fn test_db_string_roundtrip() {
        for label in ["Promo", "Hyper Rare", "Super Rare", "Rare"] {
            let rarity = Rarity::from_upstream(Some(label));
            assert_eq!(Rarity::from_db_string(rarity.to_db_string()), Some(rarity));
        }
    }
}
