use std::collections::BTreeSet;

/// Flags supplied with `-D`. Membership is the only thing that matters:
/// a present flag is on, anything else is off.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagSet(BTreeSet<String>);

impl FlagSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self, flag: &str) -> bool {
        self.0.contains(flag)
    }
}

impl<S: Into<String>> FromIterator<S> for FlagSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}
