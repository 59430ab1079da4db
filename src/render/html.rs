//! HTML digest body.
//!
//! Inline-styled for email clients. The `with_logos` flag controls whether
//! `cid:` image tags are emitted in the header; the logo-free variant is
//! sent to channels that cannot resolve inline attachments.

use std::fmt::Write;

use super::Digest;

const HEADER_COLOR: &str = "#0B4877";
const ACCENT_COLOR: &str = "#2EA9DE";

/// Renders the HTML alternative of the digest email.
pub fn render_html(digest: &Digest, with_logos: bool) -> String {
    let mut out = String::with_capacity(4096);

    let logos = if with_logos {
        format!(
            "<img src=\"cid:company_logo\" alt=\"{} logo\" \
             style=\"max-height:50px; margin-right:15px; vertical-align:middle;\">",
            escape(&digest.company_name)
        )
    } else {
        String::new()
    };

    let _ = write!(
        out,
        r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="UTF-8"></head>
<body style="font-family:-apple-system,'Segoe UI',Roboto,Arial,sans-serif; background-color:#f9fafc; color:#333; line-height:1.6; margin:0; padding:0;">
<div style="max-width:900px; margin:30px auto; background:#ffffff; border-radius:12px; padding:20px 40px;">
  <div style="background-color:{HEADER_COLOR}; color:white; padding:15px 25px; border-radius:12px 12px 0 0;">
    <div>{logos}</div>
    <div style="text-align:right;">
      <h1 style="margin:0; font-size:22px; font-weight:600;">{label} Alerts</h1>
      <p style="margin:0; font-size:14px; color:#d7e7f5;">{run_time}</p>
    </div>
  </div>
"#,
        label = escape(&digest.event_label),
        run_time = digest.run_time.format("%A, %d %B %Y %H:%M %Z"),
    );

    if digest.events.is_empty() {
        out.push_str(
            "  <p style=\"margin-top:25px; font-size:15px;\">\
             <strong>No events found for the current query.</strong></p>\n",
        );
    } else {
        let _ = write!(
            out,
            r#"  <div style="background-color:#f5f5f5; padding:12px; border-radius:5px; margin:20px 0; font-size:14px;">
    <strong>Report Generated:</strong> {generated}<br>
    <strong>Query Criteria:</strong> Last {lookback} days<br>
    <strong>Frequency:</strong> {frequency} hours<br>
    <strong>Results Found:</strong> <span style="background-color:{ACCENT_COLOR}; color:white; padding:4px 10px; border-radius:12px; font-weight:600;">{count}</span>
  </div>
  <table style="width:100%; border-collapse:collapse; margin:20px 0; font-size:14px;">
    <thead><tr>
      <th style="background-color:{HEADER_COLOR}; color:white; text-align:left; padding:10px;">Event Name</th>
      <th style="background-color:{HEADER_COLOR}; color:white; text-align:left; padding:10px;">Created At</th>
    </tr></thead>
    <tbody>
"#,
            generated = digest.run_time.format("%A, %B %d, %Y at %H:%M %Z"),
            lookback = digest.lookback_days,
            frequency = digest.frequency_hours,
            count = digest.events.len(),
        );

        for event in &digest.events {
            let name_cell = match digest.event_url(event) {
                Some(url) => format!(
                    "<strong><a href=\"{url}\" style=\"color:{ACCENT_COLOR}; \
                     text-decoration:none;\" target=\"_blank\">{}</a></strong>",
                    escape(&event.name)
                ),
                None => escape(&event.name),
            };
            let _ = write!(
                out,
                "      <tr>\
                 <td style=\"padding:8px 10px; border-bottom:1px solid #e0e6ed;\">{name_cell}</td>\
                 <td style=\"padding:8px 10px; border-bottom:1px solid #e0e6ed;\">{}</td>\
                 </tr>\n",
                event.created_at.format("%Y-%m-%d %H:%M:%S"),
            );
        }

        out.push_str("    </tbody>\n  </table>\n");
    }

    let _ = write!(
        out,
        r#"  <div style="font-size:12px; color:#888; text-align:center; padding:10px; border-top:1px solid #eee; margin-top:20px;">
    This is an automated report generated by {company}.
  </div>
</div>
</body>
</html>
"#,
        company = escape(&digest.company_name),
    );

    out
}

/// Minimal HTML escaping for text interpolated into markup.
fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
