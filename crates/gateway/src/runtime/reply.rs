//! Reply parsing: pull the action block out of a raw model reply and
//! produce the text the end user sees.
//!
//! Two phases. First a single first-match scan locates the delimited
//! block; its body is then decoded against a strict schema. Any schema
//! violation means "no actions", never a partial list.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use cb_domain::reply::{ActionItem, ParsedReply};
use cb_domain::trace::TraceEvent;

pub const BLOCK_OPEN: &str = "[BUTTONS_JSON]";
pub const BLOCK_CLOSE: &str = "[/BUTTONS_JSON]";

static ACTION_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\[BUTTONS_JSON\](.*?)\[/BUTTONS_JSON\]").unwrap());
static DOUBLE_EMPHASIS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\*\*(.*?)\*\*").unwrap());

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ActionPayload {
    buttons: Vec<ActionSpec>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ActionSpec {
    text: String,
    callback: String,
}

pub fn parse(raw: &str) -> ParsedReply {
    let (actions, block_found) = match ACTION_BLOCK.captures(raw) {
        Some(caps) => (decode_actions(&caps[1]), true),
        None => (Vec::new(), false),
    };

    let display_text = normalize_markup(&strip_blocks(raw));

    TraceEvent::ReplyParsed {
        display_chars: display_text.chars().count(),
        actions: actions.len(),
        block_found,
    }
    .emit();

    ParsedReply { display_text, actions }
}

/// Decode the block body. Anything but a well-formed, non-empty list
/// yields no actions.
fn decode_actions(body: &str) -> Vec<ActionItem> {
    let payload: ActionPayload = match serde_json::from_str(body.trim()) {
        Ok(p) => p,
        Err(e) => {
            tracing::debug!(error = %e, "action block did not decode");
            return Vec::new();
        }
    };

    let valid = payload
        .buttons
        .iter()
        .all(|b| !b.text.trim().is_empty() && !b.callback.trim().is_empty());
    if !valid {
        tracing::debug!("action block has an empty label or token");
        return Vec::new();
    }

    payload
        .buttons
        .into_iter()
        .map(|b| ActionItem { label: b.text, action_token: b.callback })
        .collect()
}

/// Remove every delimited block, then any unpaired delimiter. Text is
/// only trimmed at the end when something was actually removed.
fn strip_blocks(raw: &str) -> String {
    if !raw.contains(BLOCK_OPEN) && !raw.contains(BLOCK_CLOSE) {
        return raw.to_owned();
    }
    ACTION_BLOCK
        .replace_all(raw, "")
        .replace(BLOCK_OPEN, "")
        .replace(BLOCK_CLOSE, "")
        .trim_end()
        .to_owned()
}

/// `**text**` becomes `*text*`.
fn normalize_markup(text: &str) -> String {
    DOUBLE_EMPHASIS.replace_all(text, "*$1*").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(label: &str, token: &str) -> ActionItem {
        ActionItem { label: label.into(), action_token: token.into() }
    }

    #[test]
    fn plain_text_passes_through() {
        let p = parse("Hello there.\nSecond line  ");
        assert_eq!(p.display_text, "Hello there.\nSecond line  ");
        assert!(p.actions.is_empty());
    }

    #[test]
    fn parsing_is_idempotent_on_clean_text() {
        let first = parse("Rooms: **two** left");
        let second = parse(&first.display_text);
        assert_eq!(first, second);
    }

    #[test]
    fn emphasis_is_normalised() {
        assert_eq!(parse("**bold**").display_text, "*bold*");
        assert_eq!(parse("**a** and **b**").display_text, "*a* and *b*");
        assert_eq!(parse("**multi\nline**").display_text, "*multi\nline*");
    }

    #[test]
    fn extracts_actions_and_strips_block() {
        let raw = "Pick one:\n[BUTTONS_JSON]{\"buttons\":[{\"text\":\"Spa\",\"callback\":\"spa\"},\
                   {\"text\":\"Dinner\",\"callback\":\"dinner\"}]}[/BUTTONS_JSON]";
        let p = parse(raw);
        assert_eq!(p.display_text, "Pick one:");
        assert_eq!(p.actions, vec![action("Spa", "spa"), action("Dinner", "dinner")]);
    }

    #[test]
    fn block_spanning_lines_is_found() {
        let raw = "Hi\n[BUTTONS_JSON]\n{\n  \"buttons\": [\n    {\"text\": \"A\", \"callback\": \"a\"}\n  ]\n}\n[/BUTTONS_JSON]\n";
        let p = parse(raw);
        assert_eq!(p.actions, vec![action("A", "a")]);
        assert_eq!(p.display_text, "Hi");
    }

    #[test]
    fn malformed_block_is_stripped_without_actions() {
        let p = parse("Text [BUTTONS_JSON]{not json}[/BUTTONS_JSON] more");
        assert!(p.actions.is_empty());
        assert_eq!(p.display_text, "Text  more");
        assert!(!p.display_text.contains(BLOCK_OPEN));
    }

    #[test]
    fn schema_violations_yield_no_actions() {
        for body in [
            r#"{"buttons":[{"text":"A","callback":"a"},{"text":"B"}]}"#,
            r#"{"buttons":[{"text":"","callback":"a"}]}"#,
            r#"{"buttons":[{"text":"A","callback":"a","extra":1}]}"#,
            r#"{"items":[]}"#,
            r#"[{"text":"A","callback":"a"}]"#,
        ] {
            let p = parse(&format!("x{BLOCK_OPEN}{body}{BLOCK_CLOSE}"));
            assert!(p.actions.is_empty(), "accepted {body}");
            assert_eq!(p.display_text, "x");
        }
    }

    #[test]
    fn only_first_block_is_decoded_but_all_are_stripped() {
        let raw = format!(
            "a{BLOCK_OPEN}{{\"buttons\":[{{\"text\":\"One\",\"callback\":\"1\"}}]}}{BLOCK_CLOSE}\
             b{BLOCK_OPEN}{{\"buttons\":[{{\"text\":\"Two\",\"callback\":\"2\"}}]}}{BLOCK_CLOSE}c"
        );
        let p = parse(&raw);
        assert_eq!(p.actions, vec![action("One", "1")]);
        assert_eq!(p.display_text, "abc");
    }

    #[test]
    fn unterminated_block_loses_its_marker() {
        let p = parse("see [BUTTONS_JSON]{\"buttons\":[]}");
        assert!(p.actions.is_empty());
        assert_eq!(p.display_text, "see {\"buttons\":[]}");
    }

    #[test]
    fn emphasis_inside_stripped_block_does_not_leak() {
        let p = parse("**Hi**[BUTTONS_JSON]**x**[/BUTTONS_JSON]");
        assert_eq!(p.display_text, "*Hi*");
    }
}
