// src/notify/render.rs
//! Digest → Telegram HTML.

use crate::summarize::Digest;

pub const RELEVANCE_LABEL: &str = "Why it matters:";
pub const LINK_MARKER: &str = "🔗";

/// Percent-encode the few characters that would break out of a quoted attribute.
/// Everything else, `&` included, is left as-is so the href is byte-identical to
/// the item link for ordinary URLs.
fn href_value(link: &str) -> String {
    let mut out = String::with_capacity(link.len());
    for ch in link.chars() {
        match ch {
            '"' => out.push_str("%22"),
            '<' => out.push_str("%3C"),
            '>' => out.push_str("%3E"),
            c => out.push(c),
        }
    }
    out
}

fn text(s: &str) -> String {
    html_escape::encode_text(s).into_owned()
}

/// Bold title, bullet lines, italic relevance label and an anchor that carries
/// the original link both as href and as visible text.
pub fn render_message(digest: &Digest, link: &str) -> String {
    let mut msg = format!("<b>{}</b>\n\n", text(&digest.title));
    for bullet in &digest.bullets {
        msg.push_str("• ");
        msg.push_str(&text(bullet));
        msg.push('\n');
    }
    msg.push_str(&format!(
        "\n<i>{}</i> {}\n\n",
        RELEVANCE_LABEL,
        text(&digest.relevance)
    ));
    msg.push_str(&format!(
        "{} <a href=\"{}\">{}</a>",
        LINK_MARKER,
        href_value(link),
        text(link)
    ));
    msg
}
