//! Teams incoming-webhook delivery.

use serde::Serialize;
use std::fmt::Write;

use super::{Notifier, NotifyError, Result};
use crate::render::Digest;

/// Teams shows at most this many events in the details section; the rest
/// collapse into an overflow line.
const MAX_LISTED_EVENTS: usize = 10;

const COLOR_RESULTS: &str = "2EA9DE";
const COLOR_EMPTY: &str = "FFC107";

/// Teams webhook channel: posts the digest as a MessageCard.
#[derive(Debug)]
pub struct TeamsNotifier {
    client: reqwest::Client,
    webhook_url: String,
}

#[derive(Debug, Serialize)]
struct MessageCard {
    #[serde(rename = "@type")]
    card_type: &'static str,
    #[serde(rename = "@context")]
    context: &'static str,
    #[serde(rename = "themeColor")]
    theme_color: &'static str,
    summary: String,
    sections: Vec<CardSection>,
}

#[derive(Debug, Serialize)]
struct CardSection {
    #[serde(rename = "activityTitle", skip_serializing_if = "Option::is_none")]
    activity_title: Option<String>,
    #[serde(rename = "activitySubtitle", skip_serializing_if = "Option::is_none")]
    activity_subtitle: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    facts: Vec<CardFact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
struct CardFact {
    name: &'static str,
    value: String,
}

impl TeamsNotifier {
    pub fn new(webhook_url: String) -> Self {
        TeamsNotifier {
            client: reqwest::Client::new(),
            webhook_url,
        }
    }

    fn build_card(digest: &Digest) -> MessageCard {
        let count = digest.events.len();
        let title = format!(
            "AlertDev: {count} {} Event{} Found",
            digest.event_label,
            crate::render::plural(count),
        );

        let summary_section = CardSection {
            activity_title: Some(title.clone()),
            activity_subtitle: Some(
                digest
                    .run_time
                    .format("%A, %B %d, %Y at %H:%M %Z")
                    .to_string(),
            ),
            facts: vec![
                CardFact {
                    name: "Event Type",
                    value: digest.event_label.clone(),
                },
                CardFact {
                    name: "Query Period",
                    value: format!("Last {} days", digest.lookback_days),
                },
                CardFact {
                    name: "Frequency",
                    value: format!("Every {} hours", digest.frequency_hours),
                },
                CardFact {
                    name: "Results",
                    value: count.to_string(),
                },
            ],
            text: None,
        };

        let mut sections = vec![summary_section];

        if !digest.events.is_empty() {
            let mut details = String::new();
            for event in digest.events.iter().take(MAX_LISTED_EVENTS) {
                match digest.event_url(event) {
                    Some(url) => {
                        let _ = write!(details, "- [{}]({url})", event.name);
                    }
                    None => {
                        let _ = write!(details, "- {}", event.name);
                    }
                }
                let _ = writeln!(
                    details,
                    " — {}",
                    event.created_at.format("%Y-%m-%d %H:%M")
                );
            }
            if count > MAX_LISTED_EVENTS {
                let _ = writeln!(
                    details,
                    "\n*...and {} more in the email digest.*",
                    count - MAX_LISTED_EVENTS
                );
            }
            sections.push(CardSection {
                activity_title: Some("Events".to_string()),
                activity_subtitle: None,
                facts: Vec::new(),
                text: Some(details),
            });
        }

        sections.push(CardSection {
            activity_title: None,
            activity_subtitle: None,
            facts: Vec::new(),
            text: Some(format!("Automated report from {}.", digest.company_name)),
        });

        MessageCard {
            card_type: "MessageCard",
            context: "https://schema.org/extensions",
            theme_color: if count > 0 { COLOR_RESULTS } else { COLOR_EMPTY },
            summary: title,
            sections,
        }
    }
}

impl Notifier for TeamsNotifier {
    fn name(&self) -> &str {
        "teams"
    }

    async fn deliver(&self, digest: &Digest) -> Result<()> {
        let card = Self::build_card(digest);
        self.client
            .post(&self.webhook_url)
            .json(&card)
            .send()
            .await
            .map_err(|e| NotifyError::Webhook(e.to_string()))?
            .error_for_status()
            .map_err(|e| NotifyError::Webhook(e.to_string()))?;
        Ok(())
    }
}
