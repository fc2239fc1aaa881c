use std::cell::OnceCell;

/// Shown for names that were never resolved.
pub const UNAVAILABLE_NAME: &str = "<name unavailable>";

/// Display name of a declaration or store.
///
/// Either given explicitly, or derived once from the declaration identifier when
/// the owning store is prepared. Never changes after it has been resolved.
#[derive(Debug, Default)]
pub struct Name {
    explicit: Option<String>,
    derived: OnceCell<String>,
}

impl Name {
    pub fn new(explicit: Option<String>) -> Self {
        Self {
            explicit,
            derived: OnceCell::new(),
        }
    }

    pub fn explicit(name: impl Into<String>) -> Self {
        Self::new(Some(name.into()))
    }

    /// Derive the name from `identifier` unless it is explicit or already resolved.
    pub fn resolve(&self, identifier: &str) {
        if self.explicit.is_none() {
            self.derived
                .get_or_init(|| camel_case_to_natural_text(strip_backing_prefix(identifier)));
        }
    }

    /// Use `text` verbatim as the derived name.
    pub(crate) fn resolve_verbatim(&self, text: &str) {
        if self.explicit.is_none() {
            self.derived.get_or_init(|| text.to_owned());
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.explicit.is_some() || self.derived.get().is_some()
    }

    pub fn as_str(&self) -> &str {
        self.explicit
            .as_deref()
            .or_else(|| self.derived.get().map(String::as_str))
            .unwrap_or(UNAVAILABLE_NAME)
    }
}

/// Drops the leading underscore of a backing-field style identifier.
pub fn strip_backing_prefix(identifier: &str) -> &str {
    identifier.strip_prefix('_').unwrap_or(identifier)
}

/// Turns `ignoreNextHTTPRequest` into `Ignore Next HTTP Request`.
///
/// Runs of capitals stay together as one word. The last capital of a run starts
/// a new word when a lowercase letter follows it. Underscores separate words.
pub fn camel_case_to_natural_text(identifier: &str) -> String {
    let chars: Vec<char> = identifier.chars().collect();
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if c == '_' || c.is_whitespace() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }
        if c.is_uppercase() && !current.is_empty() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if !prev.is_uppercase() || next_is_lower {
                words.push(std::mem::take(&mut current));
            }
        }
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }

    words
        .iter()
        .map(|word| capitalize_first(word))
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize_first(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
