//! Past conversations, as hydrated for evaluator context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub overview: String,
}

impl Conversation {
    /// Render conversations as numbered blocks for prompt context.
    pub fn conversations_to_string(conversations: &[Conversation]) -> String {
        conversations
            .iter()
            .enumerate()
            .map(|(i, c)| c.render(i + 1))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn render(&self, number: usize) -> String {
        let mut out = format!(
            "Conversation #{number}\n{} ({})\n",
            format_utc(&self.created_at),
            capitalize(&self.category)
        );
        if let Some(started) = &self.started_at {
            out.push_str(&format!("Started: {}\n", format_utc(started)));
        }
        if let Some(finished) = &self.finished_at {
            out.push_str(&format!("Finished: {}\n", format_utc(finished)));
        }
        out.push_str(&capitalize(&self.title));
        out.push('\n');
        out.push_str(&capitalize(&self.overview));
        out.push('\n');
        out
    }
}

fn format_utc(ts: &DateTime<Utc>) -> String {
    format!("{} UTC", ts.format("%d %b %Y at %H:%M"))
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
