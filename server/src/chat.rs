//! Chat filtering and the outbound relay collaborator

use log::info;

use crate::store::{ChatChannel, ChatRecord};

/// Masks configured words, case-insensitively, with asterisks
#[derive(Debug, Clone, Default)]
pub struct ProfanityFilter {
    words: Vec<Vec<char>>,
}

impl ProfanityFilter {
    pub fn new(words: &[String]) -> Self {
        Self {
            words: words
                .iter()
                .filter(|w| !w.is_empty())
                .map(|w| w.chars().map(|c| c.to_ascii_lowercase()).collect())
                .collect(),
        }
    }

    pub fn mask(&self, text: &str) -> String {
        if self.words.is_empty() {
            return text.to_string();
        }

        let chars: Vec<char> = text.chars().collect();
        let lowered: Vec<char> = chars.iter().map(|c| c.to_ascii_lowercase()).collect();
        let mut masked = vec![false; chars.len()];

        for word in &self.words {
            if word.len() > lowered.len() {
                continue;
            }
            for start in 0..=lowered.len() - word.len() {
                if lowered[start..start + word.len()] == word[..] {
                    masked[start..start + word.len()].fill(true);
                }
            }
        }

        chars
            .iter()
            .zip(masked)
            .map(|(c, hide)| if hide { '*' } else { *c })
            .collect()
    }
}

/// Best-effort forwarding of global chat to an external sink
pub trait ChatRelay: Send + Sync {
    fn relay(&self, record: &ChatRecord);
}

/// Relay that only writes to the log
pub struct LogRelay;

impl ChatRelay for LogRelay {
    fn relay(&self, record: &ChatRecord) {
        if record.channel == ChatChannel::Global {
            info!("[chat] {} ({}): {}", record.name, record.uuid, record.text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_is_case_insensitive() {
        let filter = ProfanityFilter::new(&["darn".to_string()]);
        assert_eq!(filter.mask("oh DARN it"), "oh **** it");
        assert_eq!(filter.mask("darndarn"), "********");
        assert_eq!(filter.mask("fine"), "fine");
    }

    #[test]
    fn test_mask_keeps_non_ascii() {
        let filter = ProfanityFilter::new(&["bad".to_string()]);
        assert_eq!(filter.mask("ümlaut bad"), "ümlaut ***");
    }

    #[test]
    fn test_empty_filter_passes_through() {
        let filter = ProfanityFilter::new(&[]);
        assert_eq!(filter.mask("anything"), "anything");
        assert_eq!(ProfanityFilter::new(&["x".to_string()]).mask(""), "");
    }
}
