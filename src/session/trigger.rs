//! Trigger detection: does a transcript start a recording, and with what?

/// Decides whether transcript text starts a recording.
///
/// Returns the payload following the trigger (possibly empty) when the
/// text triggers, `None` otherwise.
pub trait TriggerDetector: Send + Sync {
    fn detect(&self, text: &str) -> Option<String>;
}

/// Case-insensitive substring match against a fixed phrase list.
///
/// The earliest occurrence of any phrase wins; the rest of the text after
/// it becomes the payload.
#[derive(Debug, Clone)]
pub struct PhraseTrigger {
    phrases: Vec<String>,
}

impl PhraseTrigger {
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            phrases: phrases
                .into_iter()
                .map(|p| p.as_ref().trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }
}

impl TriggerDetector for PhraseTrigger {
    fn detect(&self, text: &str) -> Option<String> {
        for (start, _) in text.char_indices() {
            let rest = &text[start..];
            if let Some(len) = self.phrases.iter().find_map(|p| match_len(rest, p)) {
                let payload = rest[len..]
                    .trim_start_matches(|c: char| c.is_whitespace() || matches!(c, ',' | ':' | '.'))
                    .trim_end();
                return Some(payload.to_string());
            }
        }
        None
    }
}

/// Byte length of the prefix of `hay` that matches lowercase `needle`
/// ignoring case.
fn match_len(hay: &str, needle: &str) -> Option<usize> {
    let mut needle = needle.chars().peekable();
    for (i, c) in hay.char_indices() {
        if needle.peek().is_none() {
            return Some(i);
        }
        for lower in c.to_lowercase() {
            if needle.next() != Some(lower) {
                return None;
            }
        }
    }
    needle.peek().is_none().then_some(hay.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slack() -> PhraseTrigger {
        PhraseTrigger::new(["send slack message", "post in slack"])
    }

    #[test]
    fn extracts_payload_after_phrase() {
        assert_eq!(
            slack().detect("send slack message to team good morning everyone").as_deref(),
            Some("to team good morning everyone")
        );
    }

    #[test]
    fn matches_case_insensitively_mid_text() {
        assert_eq!(
            slack().detect("Okay, POST IN SLACK: lunch is at noon").as_deref(),
            Some("lunch is at noon")
        );
    }

    #[test]
    fn phrase_alone_yields_empty_payload() {
        assert_eq!(slack().detect("send slack message").as_deref(), Some(""));
    }

    #[test]
    fn no_phrase_no_trigger() {
        assert!(slack().detect("just chatting about slack").is_none());
        assert!(PhraseTrigger::new(Vec::<String>::new()).detect("anything").is_none());
    }

    #[test]
    fn handles_multibyte_text() {
        assert_eq!(
            slack().detect("Ünïcode first, send Slack message café").as_deref(),
            Some("café")
        );
    }
}
