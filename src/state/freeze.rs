use std::fmt;

/// Whether an Expansion or Set may still be overwritten from upstream data
///
/// Rows start `NeverTouched` when they are created from a bare card reference, become
/// `AutoManaged` once upstream metadata has been applied, and stay `Frozen` forever once an
/// operator edits them by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FreezeState {
    #[default]
    NeverTouched,
    AutoManaged,
    Frozen,
}

impl FreezeState {
    /// Returns true if upstream data may overwrite fields
    pub fn accepts_upstream(&self) -> bool {
        !matches!(self, Self::Frozen)
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::NeverTouched => "never_touched",
            Self::AutoManaged => "auto_managed",
            Self::Frozen => "frozen",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "never_touched" => Some(Self::NeverTouched),
            "auto_managed" => Some(Self::AutoManaged),
            "frozen" => Some(Self::Frozen),
            _ => None,
        }
    }
}

impl fmt::Display for FreezeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
