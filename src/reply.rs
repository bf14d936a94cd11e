/// Keyboard payload attached to an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Markup {
    /// One-time keyboard offering exactly these options, one per row.
    Choices(Vec<String>),
    /// Hide any keyboard the client is currently showing.
    Remove,
}

/// A rendered response, ready to hand to a `Channel`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub markup: Option<Markup>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            markup: None,
        }
    }

    /// Offer `items` as a single-choice keyboard, or remove the keyboard
    /// when there is nothing left to choose from.
    pub fn with_choices(text: impl Into<String>, items: Vec<String>) -> Self {
        let markup = if items.is_empty() {
            Markup::Remove
        } else {
            Markup::Choices(items)
        };
        Self {
            text: text.into(),
            markup: Some(markup),
        }
    }

    pub fn remove_keyboard(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            markup: Some(Markup::Remove),
        }
    }
}
