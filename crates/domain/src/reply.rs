use serde::{Deserialize, Serialize};

/// One suggested follow-up control attached to a reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionItem {
    pub label: String,
    pub action_token: String,
}

/// A model reply split into what the user sees and the controls to offer.
///
/// `display_text` never contains action-block delimiters. `actions` is
/// empty whenever no well-formed block was present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedReply {
    pub display_text: String,
    pub actions: Vec<ActionItem>,
}
