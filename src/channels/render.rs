//! Markdown rendering for email bodies and subject derivation.

use crate::core::Message;
use comrak::{markdown_to_html, Options};
use regex::Regex;
use std::sync::LazyLock;

/// Maximum subject length, following the 78 character header line convention
/// of RFC 5322 section 2.1.1.
pub const SUBJECT_MAX_LEN: usize = 78;

/// Mail clients drop external stylesheets, so table borders are inlined.
const TABLE_CSS: &str = "<style>table,th,td{border: 1px solid black;} tr:nth-child(even){background-color: grey;}</style>";

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag pattern is a valid regex"));

/// A message rendered for an email transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: String,
    pub plain: String,
    pub html: String,
}

impl RenderedMessage {
    pub fn from_message(message: &Message) -> Self {
        let fragment = markdown_fragment(&message.text);
        let subject = match message.explicit_subject() {
            Some(subject) => subject.to_string(),
            None => subject_from_html(&fragment),
        };
        Self {
            subject,
            plain: message.text.clone(),
            html: html_document(&fragment),
        }
    }
}

/// Converts Markdown to an HTML fragment.
///
/// Tables, strikethrough and bare-URL autolinks are enabled, and inline HTML
/// written by the sender is passed through untouched.
pub fn markdown_fragment(text: &str) -> String {
    let mut options = Options::default();
    options.extension.table = true;
    options.extension.strikethrough = true;
    options.extension.autolink = true;
    options.render.unsafe_ = true;
    markdown_to_html(text, &options)
}

fn html_document(fragment: &str) -> String {
    format!(
        r#"<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.0 Transitional//EN" "http://www.w3.org/TR/xhtml1/DTD/xhtml1-transitional.dtd">
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:o="urn:schemas-microsoft-com:office:office">
	<head>
		<title>Message</title>{TABLE_CSS}</head>
	<body>{fragment}</body>
</html>
"#
    )
}

/// Derives a subject: markup stripped, first non-empty line, at most
/// [`SUBJECT_MAX_LEN`] characters.
pub fn subject_from_html(fragment: &str) -> String {
    let plain = decode_entities(&TAG_RE.replace_all(fragment, ""));
    plain
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.chars().take(SUBJECT_MAX_LEN).collect())
        .unwrap_or_default()
}

/// Decodes the entities the Markdown renderer emits when escaping text.
fn decode_entities(text: &str) -> String {
    // `&amp;` goes last so `&amp;lt;` stays a literal `&lt;`.
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
