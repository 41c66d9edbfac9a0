//! System prompts for every agent in the pipeline.
//!
//! Each prompt can be overridden by a text file named in `[prompts]`; a file
//! that cannot be read falls back to the built-in default with a warning.

use crate::config::PromptsConfig;
use std::path::Path;
use tracing::{info, warn};

/// The five system instructions used by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSet {
    pub coordinator: String,
    pub sentiment: String,
    pub topic: String,
    pub summarizer_sentiment: String,
    pub summarizer_topic: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            coordinator: COORDINATOR_PROMPT.to_string(),
            sentiment: SENTIMENT_PROMPT.to_string(),
            topic: TOPIC_PROMPT.to_string(),
            summarizer_sentiment: SUMMARIZER_SENTIMENT_PROMPT.to_string(),
            summarizer_topic: SUMMARIZER_TOPIC_PROMPT.to_string(),
        }
    }
}

impl PromptSet {
    /// Built-in prompts with any configured override files applied.
    pub fn load(config: &PromptsConfig) -> Self {
        let defaults = Self::default();
        Self {
            coordinator: load_or(config.coordinator.as_deref(), defaults.coordinator),
            sentiment: load_or(config.sentiment.as_deref(), defaults.sentiment),
            topic: load_or(config.topic.as_deref(), defaults.topic),
            summarizer_sentiment: load_or(
                config.summarizer_sentiment.as_deref(),
                defaults.summarizer_sentiment,
            ),
            summarizer_topic: load_or(config.summarizer_topic.as_deref(), defaults.summarizer_topic),
        }
    }
}

fn load_or(path: Option<&Path>, default: String) -> String {
    let Some(path) = path else {
        return default;
    };

    match std::fs::read_to_string(path) {
        Ok(content) if !content.trim().is_empty() => {
            info!("Loaded prompt from {}", path.display());
            content
        }
        Ok(_) => {
            warn!("Prompt file {} is empty, using built-in prompt", path.display());
            default
        }
        Err(e) => {
            warn!(
                "Failed to load prompt {}: {}. Using built-in prompt",
                path.display(),
                e
            );
            default
        }
    }
}

/// Intake dialogue: extract the collection request as JSON.
const COORDINATOR_PROMPT: &str = r##"You are the intake coordinator of a public-opinion monitoring service for Chinese social media.
Talk with the operator until you know:
- event_keywords: a list of search keywords or hashtags for the event (e.g. ["#金价上涨#"])
- start_year, start_month, start_day: the day to collect, as integers
- event_release_platform: the platform the event was published on (e.g. "微博")

Ask short follow-up questions while anything is missing.
Once every field is known, reply with ONLY this JSON object and nothing else:
{"event_keywords": [...], "start_year": 2025, "start_month": 3, "start_day": 1, "event_release_platform": "微博"}"##;

/// Sentiment batch analysis.
const SENTIMENT_PROMPT: &str = r#"You are a sentiment analyst for Weibo posts.
You receive numbered posts, one per line, in the form "<number>: <text>".
Classify each post as exactly one of: positive, neutral, negative.
Reply with ONLY a JSON object:
{"analyses": [{"id": 1, "sentiment": "negative"}, ...],
 "summary": {"positive": 0, "neutral": 0, "negative": 0}}
Return one entry per post, in input order. The summary counts the labels you assigned."#;

/// Topic batch analysis.
const TOPIC_PROMPT: &str = r#"You are a topic modelling analyst for citizen opinions posted on Weibo.
You receive numbered opinions, one per line, and the current topic list.
Assign each opinion one or more short topics. Reuse a topic from the current list
whenever it fits; only create a new topic when none applies.
Reply with ONLY a JSON object:
{"analyses": [{"id": 1, "topics": ["topic a", "topic b"]}, ...]}
Return one entry per opinion, in input order."#;

/// Summary from sentiment totals.
const SUMMARIZER_SENTIMENT_PROMPT: &str = r#"You are a public-opinion analyst.
Given an event and the accumulated sentiment statistics of posts about it,
write a concise summary of the public mood and what it suggests. Answer in Chinese prose."#;

/// Summary from topic statistics, also used for the final combined summary.
const SUMMARIZER_TOPIC_PROMPT: &str = r#"You are a public-opinion analyst.
Given an event and statistics about the topics people discuss (optionally with
sentiment per topic and earlier partial summaries), write a structured summary
of the main concerns, how opinion is split, and notable trends. Answer in Chinese prose."#;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_overrides() {
        let prompts = PromptSet::load(&PromptsConfig::default());
        assert_eq!(prompts, PromptSet::default());
        assert!(prompts.sentiment.contains("\"analyses\""));
        assert!(prompts.coordinator.contains("event_release_platform"));
        assert!(prompts.coordinator.contains("[\"#金价上涨#\"]"));
        assert!(prompts.coordinator.ends_with(r#""event_release_platform": "微博"}"#));
    }

    #[test]
    fn test_override_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("topic.txt");
        std::fs::write(&path, "自定义主题提示").unwrap();

        let config = PromptsConfig {
            topic: Some(path),
            ..PromptsConfig::default()
        };
        let prompts = PromptSet::load(&config);
        assert_eq!(prompts.topic, "自定义主题提示");
        assert_eq!(prompts.sentiment, SENTIMENT_PROMPT);
    }

    #[test]
    fn test_missing_file_falls_back() {
        let config = PromptsConfig {
            sentiment: Some(PathBuf::from("/nonexistent/prompt.txt")),
            ..PromptsConfig::default()
        };
        assert_eq!(PromptSet::load(&config).sentiment, SENTIMENT_PROMPT);
    }
}
