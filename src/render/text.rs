//! Plain-text digest body.

use std::fmt::Write;

use super::Digest;

/// Renders the plain-text alternative of the digest email.
pub fn render_plain_text(digest: &Digest) -> String {
    let mut out = format!(
        "AlertDev | {}\n\nFound {} event(s) matching criteria.\n",
        digest.run_time.format("%Y-%m-%d %H:%M %Z"),
        digest.events.len(),
    );

    if digest.events.is_empty() {
        let _ = write!(
            out,
            "\nNo results found.\n\n---\nAutomated report from {}.",
            digest.company_name
        );
        return out;
    }

    out.push_str("\nEvents:\n");
    for (idx, event) in digest.events.iter().enumerate() {
        let _ = write!(out, "\n{}.", idx + 1);
        if let Some(url) = digest.event_url(event) {
            let _ = write!(out, "\n   Link: {url}");
        }
        let _ = write!(out, "\n   Name: {}", event.name);
        let _ = write!(
            out,
            "\n   Created: {}",
            event.created_at.format("%Y-%m-%d %H:%M:%S")
        );
        for (key, value) in &event.extra {
            let _ = write!(out, "\n   {key}: {value}");
        }
        out.push('\n');
    }

    let _ = write!(
        out,
        "\n---\nThis is an automated message from {}.",
        digest.company_name
    );
    out
}
