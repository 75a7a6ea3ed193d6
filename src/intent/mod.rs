//! Control-phrase detection on final answers.
//!
//! The system prompt asks the model to reply with fixed tokens when the user
//! confirms ending the conversation or asks for a human. The classifier only
//! looks for those tokens (and a few plain phrases) in the answer text; it
//! never rewrites the text.

use serde::{Deserialize, Serialize};

use crate::config::IntentConfig;

pub const END_CONVERSATION_MARKERS: &[&str] = &[
    "end_current_conversation",
    "bye",
    "goodbye",
    "结束通话",
    "再见",
];

pub const LIVE_AGENT_MARKERS: &[&str] = &[
    "connect_live_agent",
    "live agent",
    "human agent",
    "连接客服",
    "人工客服",
    "转人工",
];

/// Flags derived from a final answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub raw_text: String,
    pub end_conversation: bool,
    pub connect_live_agent: bool,
}

#[derive(Debug, Clone)]
pub struct IntentClassifier {
    end_markers: Vec<String>,
    live_agent_markers: Vec<String>,
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new(
            END_CONVERSATION_MARKERS.iter().map(|m| m.to_string()).collect(),
            LIVE_AGENT_MARKERS.iter().map(|m| m.to_string()).collect(),
        )
    }
}

impl From<&IntentConfig> for IntentClassifier {
    fn from(config: &IntentConfig) -> Self {
        let defaults = Self::default();
        Self::new(
            config.end_markers.clone().unwrap_or(defaults.end_markers),
            config
                .live_agent_markers
                .clone()
                .unwrap_or(defaults.live_agent_markers),
        )
    }
}

impl IntentClassifier {
    pub fn new(end_markers: Vec<String>, live_agent_markers: Vec<String>) -> Self {
        Self {
            end_markers: normalize(end_markers),
            live_agent_markers: normalize(live_agent_markers),
        }
    }

    /// Case-insensitive substring match; the two flags are independent.
    pub fn classify(&self, text: &str) -> Intent {
        let haystack = text.to_lowercase();
        Intent {
            raw_text: text.to_string(),
            end_conversation: contains_any(&haystack, &self.end_markers),
            connect_live_agent: contains_any(&haystack, &self.live_agent_markers),
        }
    }
}

fn normalize(markers: Vec<String>) -> Vec<String> {
    markers
        .into_iter()
        .map(|m| m.trim().to_lowercase())
        .filter(|m| !m.is_empty())
        .collect()
}

fn contains_any(haystack: &str, markers: &[String]) -> bool {
    markers.iter().any(|m| haystack.contains(m.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_answer_sets_no_flags() {
        let intent = IntentClassifier::default().classify("It's midnight.");
        assert!(!intent.end_conversation);
        assert!(!intent.connect_live_agent);
        assert_eq!(intent.raw_text, "It's midnight.");
    }

    #[test]
    fn control_tokens_are_detected() {
        let classifier = IntentClassifier::default();
        assert!(classifier.classify("end_current_conversation").end_conversation);
        assert!(classifier.classify("connect_live_agent").connect_live_agent);
        assert!(classifier.classify("Connecting you to a Live Agent now").connect_live_agent);
    }

    #[test]
    fn both_flags_can_fire_together() {
        let intent = IntentClassifier::default().classify("Bye! 正在为您连接客服");
        assert!(intent.end_conversation);
        assert!(intent.connect_live_agent);
    }

    #[test]
    fn classify_is_idempotent() {
        let classifier = IntentClassifier::default();
        let first = classifier.classify("Goodbye, 再见");
        let second = classifier.classify(&first.raw_text);
        assert_eq!(first, second);
    }

    #[test]
    fn config_overrides_replace_one_set_only() {
        let classifier = IntentClassifier::from(&IntentConfig {
            end_markers: Some(vec!["  Hang Up ".into(), "".into()]),
            live_agent_markers: None,
        });
        assert!(classifier.classify("please HANG UP").end_conversation);
        assert!(!classifier.classify("bye").end_conversation);
        assert!(classifier.classify("转人工").connect_live_agent);
    }
}
