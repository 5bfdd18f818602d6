use serde::{Deserialize, Serialize};

/// Button sets beyond this size are demoted to selectable lists; both
/// limits are the real caps of the richer transport and the text transport
/// renders everything as numbered lines anyway.
pub const MAX_BUTTONS: usize = 3;
pub const MAX_LIST_ROWS: usize = 10;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuOption {
    pub id: String,
    pub label: String,
}

impl MenuOption {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self { id: id.into(), label: label.into() }
    }
}

/// One transport-independent reply. The dispatcher translates it into
/// whatever the turn's transport natively supports; a plan never mixes
/// message shapes for a single turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutboundPlan {
    Text { body: String },
    Buttons { body: String, options: Vec<MenuOption> },
    List { body: String, button: String, options: Vec<MenuOption> },
    Document { caption: String, link: String, filename: String },
}

impl OutboundPlan {
    pub fn text(body: impl Into<String>) -> Self {
        Self::Text { body: body.into() }
    }

    /// Build the right interactive shape for a set of options: a button set
    /// when it fits, a list otherwise. Options beyond the list limit are
    /// dropped; callers presenting open-ended data cap and say so
    /// themselves.
    pub fn menu(body: impl Into<String>, mut options: Vec<MenuOption>) -> Self {
        let body = body.into();
        if options.len() <= MAX_BUTTONS {
            Self::Buttons { body, options }
        } else {
            options.truncate(MAX_LIST_ROWS);
            Self::List { body, button: "Choose an option".to_owned(), options }
        }
    }

    pub fn document(
        caption: impl Into<String>,
        link: impl Into<String>,
        filename: impl Into<String>,
    ) -> Self {
        Self::Document { caption: caption.into(), link: link.into(), filename: filename.into() }
    }

    pub fn body(&self) -> &str {
        match self {
            Self::Text { body }
            | Self::Buttons { body, .. }
            | Self::List { body, .. }
            | Self::Document { caption: body, .. } => body,
        }
    }

    /// Ids of the options this plan presents, in display order. The engine
    /// records them on the session so a numbered text reply can be resolved
    /// by position on the next turn.
    pub fn option_ids(&self) -> Vec<String> {
        match self {
            Self::Buttons { options, .. } | Self::List { options, .. } => {
                options.iter().map(|option| option.id.clone()).collect()
            }
            Self::Text { .. } | Self::Document { .. } => Vec::new(),
        }
    }
}
