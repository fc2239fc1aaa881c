use std::fmt;

/// Location of a setting inside the store hierarchy: the identifiers of every
/// declaration from the root store down to the setting.
///
/// Displayed dot-joined, which is also the persisted key.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct KeyPath(pub Vec<String>);

impl KeyPath {
    /// Returns a new path with `part` appended.
    pub fn child(&self, part: impl Into<String>) -> Self {
        let mut parts = self.0.clone();
        parts.push(part.into());
        KeyPath(parts)
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}
