use crate::error::SelectorError;

/// Id filter used by search and bulk cancel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Prefix(String),
    Contains(String),
}

impl Selector {
    /// Build a selector from the two optional filters a caller may send.
    ///
    /// Empty strings count as absent. When both filters are present the
    /// prefix wins and `contains` is ignored.
    pub fn from_filters(
        prefix: Option<String>,
        contains: Option<String>,
    ) -> Result<Self, SelectorError> {
        let prefix = prefix.filter(|p| !p.is_empty());
        let contains = contains.filter(|c| !c.is_empty());
        match (prefix, contains) {
            (Some(p), _) => Ok(Selector::Prefix(p)),
            (None, Some(c)) => Ok(Selector::Contains(c)),
            (None, None) => Err(SelectorError::InvalidSelector),
        }
    }

    pub fn matches(&self, id: &str) -> bool {
        match self {
            Selector::Prefix(p) => id.starts_with(p.as_str()),
            Selector::Contains(c) => id.contains(c.as_str()),
        }
    }

    /// Key prefix the store can seek to. Substring matches need a full scan.
    pub fn scan_prefix(&self) -> &str {
        match self {
            Selector::Prefix(p) => p,
            Selector::Contains(_) => "",
        }
    }
}
