//! Conversational intake.
//!
//! The operator describes the event in free text; the coordinator model keeps
//! asking until it can answer with a JSON request. Each model reply drives an
//! explicit state machine:
//!
//! ```text
//! CollectingFields --all fields--> ValidatingPlatform --weibo, valid date--> Complete
//!        ^                                  |
//!        +----- unsupported platform -------+
//!        +----- invalid date ---------------+
//! ```
//!
//! A reply that is not (yet) the JSON request simply keeps the machine in
//! `CollectingFields`. The transcript is never reset.

use crate::agent::{strip_code_fence, ChatModel, Conversation, ModelError};
use crate::models::{Platform, QuerySpec};
use anyhow::Result;
use chrono::NaiveDate;
use serde::Deserialize;
use std::io::{BufRead, Write};
use tracing::{debug, info, warn};

/// Where the intake dialogue currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeState {
    CollectingFields,
    ValidatingPlatform,
    Complete(QuerySpec),
}

/// What one model reply did to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Not a complete request yet; keep talking.
    Incomplete,
    /// All fields present but the platform cannot be searched.
    UnsupportedPlatform(String),
    /// All fields present but year/month/day is not a calendar date.
    InvalidDate(String),
    /// A validated request.
    Complete(QuerySpec),
}

/// A numeric field the model may send as a number or a string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum DateField {
    Number(i64),
    Text(String),
}

impl DateField {
    fn value(&self) -> Option<i64> {
        match self {
            DateField::Number(n) => Some(*n),
            DateField::Text(s) => s.trim().parse().ok(),
        }
    }

    fn display(&self) -> String {
        match self {
            DateField::Number(n) => n.to_string(),
            DateField::Text(s) => s.clone(),
        }
    }
}

/// The JSON object the coordinator answers with once it has everything.
#[derive(Debug, Clone, Deserialize)]
struct IntakeReply {
    event_keywords: Option<Vec<String>>,
    start_year: Option<DateField>,
    start_month: Option<DateField>,
    start_day: Option<DateField>,
    event_release_platform: Option<String>,
}

/// Fields of a complete reply, before validation.
#[derive(Debug, Clone)]
struct RequestFields {
    keywords: Vec<String>,
    year: DateField,
    month: DateField,
    day: DateField,
    platform: String,
}

/// Parse a cleaned reply. `None` means "not a complete request".
fn parse_request(cleaned: &str) -> Option<RequestFields> {
    let reply: IntakeReply = serde_json::from_str(cleaned).ok()?;

    let keywords: Vec<String> = reply
        .event_keywords?
        .into_iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.trim_matches('#').trim().is_empty())
        .collect();
    if keywords.is_empty() {
        return None;
    }

    let platform = reply.event_release_platform?;
    if platform.trim().is_empty() {
        return None;
    }

    Some(RequestFields {
        keywords,
        year: reply.start_year?,
        month: reply.start_month?,
        day: reply.start_day?,
        platform,
    })
}

fn to_date(fields: &RequestFields) -> Option<NaiveDate> {
    let year = i32::try_from(fields.year.value()?).ok()?;
    let month = u32::try_from(fields.month.value()?).ok()?;
    let day = u32::try_from(fields.day.value()?).ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Intake state machine over a persistent coordinator conversation.
pub struct IntakeSession<'a, M: ChatModel + ?Sized> {
    conversation: Conversation<'a, M>,
    state: IntakeState,
}

impl<'a, M: ChatModel + ?Sized> IntakeSession<'a, M> {
    pub fn new(model: &'a M, coordinator_prompt: &str) -> Self {
        Self {
            conversation: Conversation::new(model, coordinator_prompt),
            state: IntakeState::CollectingFields,
        }
    }

    pub fn state(&self) -> &IntakeState {
        &self.state
    }

    /// Send one operator line and advance on the reply.
    ///
    /// Returns the cleaned reply text and the outcome. A failed model call
    /// leaves the state unchanged.
    pub async fn submit(&mut self, input: &str) -> Result<(String, TurnOutcome), ModelError> {
        let reply = self.conversation.send(input).await?;
        let cleaned = strip_code_fence(&reply);
        let outcome = self.advance(&cleaned);
        Ok((cleaned, outcome))
    }

    /// Feed a cleaned model reply through the state machine.
    pub fn advance(&mut self, cleaned: &str) -> TurnOutcome {
        let Some(fields) = parse_request(cleaned) else {
            debug!("reply is not a complete request yet");
            self.state = IntakeState::CollectingFields;
            return TurnOutcome::Incomplete;
        };

        self.state = IntakeState::ValidatingPlatform;

        let platform = Platform::from_name(&fields.platform);
        if !platform.is_supported() {
            warn!(platform = %fields.platform, "unsupported platform requested");
            self.state = IntakeState::CollectingFields;
            return TurnOutcome::UnsupportedPlatform(fields.platform.trim().to_string());
        }

        let Some(start_date) = to_date(&fields) else {
            let shown = format!(
                "{}-{}-{}",
                fields.year.display(),
                fields.month.display(),
                fields.day.display()
            );
            warn!(date = %shown, "invalid start date");
            self.state = IntakeState::CollectingFields;
            return TurnOutcome::InvalidDate(shown);
        };

        let spec = QuerySpec {
            keywords: fields.keywords,
            start_date,
            platform,
        };
        info!(keyword = %spec.primary_keyword(), date = %spec.start_date, "intake complete");
        self.state = IntakeState::Complete(spec.clone());
        TurnOutcome::Complete(spec)
    }
}

/// Drive the intake dialogue over line-based I/O.
///
/// Returns `None` when the operator quits or input ends before a request is
/// complete.
pub async fn run_intake<M, R, W>(
    model: &M,
    coordinator_prompt: &str,
    mut input: R,
    output: &mut W,
) -> Result<Option<QuerySpec>>
where
    M: ChatModel + ?Sized,
    R: BufRead,
    W: Write,
{
    let mut session = IntakeSession::new(model, coordinator_prompt);

    writeln!(
        output,
        "💬 Describe the event to monitor (keywords, day, platform). Type 'exit' to quit."
    )?;

    loop {
        write!(output, "> ")?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(None);
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            return Ok(None);
        }

        let (reply, outcome) = match session.submit(line).await {
            Ok(turn) => turn,
            Err(e) => {
                writeln!(output, "❌ Model call failed: {}", e)?;
                continue;
            }
        };

        writeln!(output, "🤖 {}", reply)?;
        debug!(state = ?session.state(), "intake turn done");

        match outcome {
            TurnOutcome::Incomplete => {}
            TurnOutcome::UnsupportedPlatform(name) => {
                writeln!(
                    output,
                    "⚠️  Only Weibo (微博) can be searched, not \"{}\". Please choose Weibo as the platform.",
                    name
                )?;
            }
            TurnOutcome::InvalidDate(shown) => {
                writeln!(
                    output,
                    "⚠️  {} is not a valid date. Please check the year, month and day.",
                    shown
                )?;
            }
            TurnOutcome::Complete(spec) => return Ok(Some(spec)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::conversation::testing::ScriptedModel;
    use std::io::Cursor;

    const FULL_WEIBO: &str = r##"{"event_keywords": ["#金价上涨#"], "start_year": 2025, "start_month": 3, "start_day": 1, "event_release_platform": "微博"}"##;

    fn session_advance(reply: &str) -> TurnOutcome {
        let model = ScriptedModel::default();
        let mut session = IntakeSession::new(&model, "sys");
        session.advance(reply)
    }

    #[test]
    fn test_complete_reply() {
        match session_advance(FULL_WEIBO) {
            TurnOutcome::Complete(spec) => {
                assert_eq!(spec.primary_keyword(), "金价上涨");
                assert_eq!(spec.start_date, NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
                assert_eq!(spec.platform, Platform::Weibo);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_string_date_fields() {
        let reply = r#"{"event_keywords": ["油价"], "start_year": "2024", "start_month": "12", "start_day": " 31 ", "event_release_platform": "Weibo"}"#;
        assert!(matches!(session_advance(reply), TurnOutcome::Complete(_)));
    }

    #[test]
    fn test_incomplete_replies() {
        assert_eq!(session_advance("请问是哪一天？"), TurnOutcome::Incomplete);
        assert_eq!(
            session_advance(r#"{"event_keywords": ["油价"], "start_year": 2025, "start_month": 3, "event_release_platform": "微博"}"#),
            TurnOutcome::Incomplete
        );
        assert_eq!(
            session_advance(r#"{"event_keywords": [], "start_year": 2025, "start_month": 3, "start_day": 1, "event_release_platform": "微博"}"#),
            TurnOutcome::Incomplete
        );
        assert_eq!(
            session_advance(r#"{"event_keywords": "油价", "start_year": 2025, "start_month": 3, "start_day": 1, "event_release_platform": "微博"}"#),
            TurnOutcome::Incomplete
        );
    }

    #[test]
    fn test_bare_hash_keyword_is_incomplete() {
        let reply = FULL_WEIBO.replace("#金价上涨#", "#");
        assert_eq!(session_advance(&reply), TurnOutcome::Incomplete);

        let reply = FULL_WEIBO.replace("#金价上涨#", " ## ");
        assert_eq!(session_advance(&reply), TurnOutcome::Incomplete);

        // Blank entries are dropped; the usable keyword becomes primary.
        let reply = FULL_WEIBO.replace(r##"["#金价上涨#"]"##, r##"["#", "油价"]"##);
        match session_advance(&reply) {
            TurnOutcome::Complete(spec) => assert_eq!(spec.keywords, vec!["油价"]),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_date() {
        let reply = r#"{"event_keywords": ["油价"], "start_year": 2025, "start_month": 2, "start_day": 30, "event_release_platform": "微博"}"#;
        assert_eq!(
            session_advance(reply),
            TurnOutcome::InvalidDate("2025-2-30".to_string())
        );
    }

    #[test]
    fn test_unsupported_platform_returns_to_collecting() {
        let model = ScriptedModel::default();
        let mut session = IntakeSession::new(&model, "sys");
        let reply = FULL_WEIBO.replace("微博", "抖音");

        assert_eq!(
            session.advance(&reply),
            TurnOutcome::UnsupportedPlatform("抖音".to_string())
        );
        assert_eq!(session.state(), &IntakeState::CollectingFields);

        session.advance(FULL_WEIBO);
        assert!(matches!(session.state(), IntakeState::Complete(_)));
    }

    #[tokio::test]
    async fn test_dialogue_until_weibo() {
        let missing_day = r##"{"event_keywords": ["#金价上涨#"], "start_year": 2025, "start_month": 3, "event_release_platform": "微博"}"##;
        let douyin = format!("```json\n{}\n```", FULL_WEIBO.replace("微博", "抖音"));
        let model = ScriptedModel::new([missing_day.to_string(), douyin, FULL_WEIBO.to_string()]);

        let input = Cursor::new("金价上涨\n3月1日，抖音\n那就微博\n不会被读取\n");
        let mut output = Vec::new();

        let spec = run_intake(&model, "sys", input, &mut output)
            .await
            .unwrap()
            .expect("intake should complete");

        assert_eq!(spec.primary_keyword(), "金价上涨");
        assert_eq!(model.request_count(), 3);

        // The transcript is kept across turns: system + 3 user + 2 replies.
        assert_eq!(model.requests.lock().unwrap()[2].len(), 6);

        let printed = String::from_utf8(output).unwrap();
        assert_eq!(printed.matches("Only Weibo").count(), 1);
        assert!(printed.contains("\"抖音\""));
    }

    #[tokio::test]
    async fn test_model_failure_is_printed_and_loop_continues() {
        let model = ScriptedModel::default();
        model.push_error(ModelError::Connect("connection refused".to_string()));

        let input = Cursor::new("金价上涨\n");
        let mut output = Vec::new();

        let spec = run_intake(&model, "sys", input, &mut output).await.unwrap();
        assert!(spec.is_none());

        let printed = String::from_utf8(output).unwrap();
        assert!(printed.contains("❌ Model call failed"));
    }

    #[tokio::test]
    async fn test_exit_command() {
        let model = ScriptedModel::default();
        let mut output = Vec::new();
        let spec = run_intake(&model, "sys", Cursor::new("\nexit\n"), &mut output)
            .await
            .unwrap();
        assert!(spec.is_none());
        assert_eq!(model.request_count(), 0);
    }
}
