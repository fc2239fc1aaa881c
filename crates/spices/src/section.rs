/// Groups declarations when a store is rendered as sections.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpiceSection {
    pub id: String,
    pub header: Option<String>,
    pub footer: Option<String>,
}

impl SpiceSection {
    pub const DEFAULT_ID: &'static str = "default";

    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            header: None,
            footer: None,
        }
    }

    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = Some(header.into());
        self
    }

    pub fn with_footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }
}

impl Default for SpiceSection {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ID)
    }
}

/// How a nested store is shown by the menu.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ChildPresentation {
    #[default]
    Push,
    Modal,
    /// Items of the child are listed in place, optionally framed.
    Inline {
        header: Option<String>,
        footer: Option<String>,
    },
}

/// How an embedded view is shown by the menu.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ViewPresentation {
    Push,
    Modal,
    #[default]
    Inline,
}
