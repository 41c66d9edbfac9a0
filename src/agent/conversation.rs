//! Conversational transcripts over a [`ChatModel`].
//!
//! - [`Conversation`]: a growing transcript with one system instruction,
//!   used by the intake dialogue.
//! - [`ask_once`]: a fresh single-turn context, used for every analysis batch
//!   and every summary so no history leaks between calls.

use crate::agent::client::{ChatMessage, ChatModel, ModelError};
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

static FENCED_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?\s*(\{.*\})\s*```").expect("valid fenced JSON regex")
});

/// A transcript that grows by one user and one assistant message per turn.
pub struct Conversation<'a, M: ChatModel + ?Sized> {
    model: &'a M,
    messages: Vec<ChatMessage>,
}

impl<'a, M: ChatModel + ?Sized> Conversation<'a, M> {
    pub fn new(model: &'a M, system_prompt: impl Into<String>) -> Self {
        Self {
            model,
            messages: vec![ChatMessage::system(system_prompt)],
        }
    }

    /// Send one user turn with the full transcript and return the reply.
    ///
    /// The user message stays in the transcript even if the call fails; the
    /// reply is only appended on success.
    pub async fn send(&mut self, user_text: &str) -> Result<String, ModelError> {
        self.messages.push(ChatMessage::user(user_text));
        debug!(turns = self.messages.len(), "sending conversation turn");

        let reply = self.model.chat(&self.messages).await?;
        self.messages.push(ChatMessage::assistant(reply.clone()));
        Ok(reply)
    }

    #[cfg(test)]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }
}

/// One request in a fresh context: system instruction plus a single user turn.
pub async fn ask_once<M: ChatModel + ?Sized>(
    model: &M,
    system_prompt: &str,
    user_text: &str,
) -> Result<String, ModelError> {
    let mut conversation = Conversation::new(model, system_prompt);
    conversation.send(user_text).await
}

/// Remove markdown code fences from a model reply.
///
/// A fenced JSON object anywhere in the reply wins; otherwise a reply wholly
/// wrapped in a fence loses its fence lines; otherwise it is only trimmed.
pub fn strip_code_fence(reply: &str) -> String {
    if let Some(caps) = FENCED_JSON.captures(reply) {
        if let Some(inner) = caps.get(1) {
            return inner.as_str().trim().to_string();
        }
    }

    let trimmed = reply.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        if let Some(body) = rest.strip_suffix("```") {
            // Drop the info string (e.g. "markdown") on the opening line.
            let body = match body.split_once('\n') {
                Some((first, remainder)) if !first.trim().contains(' ') => remainder,
                _ => body,
            };
            return body.trim().to_string();
        }
    }

    trimmed.to_string()
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedModel;
    use super::*;
    use crate::agent::client::Role;

    #[test]
    fn test_strip_fenced_json() {
        let reply = "好的，结果如下：\n```json\n{\"a\": 1}\n```\n希望有帮助";
        assert_eq!(strip_code_fence(reply), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_bare_fence() {
        assert_eq!(strip_code_fence("```\n{\"a\": [1]}\n```"), "{\"a\": [1]}");
        assert_eq!(
            strip_code_fence("```markdown\n## 总结\n内容\n```"),
            "## 总结\n内容"
        );
    }

    #[test]
    fn test_plain_reply_is_trimmed() {
        assert_eq!(strip_code_fence("  {\"a\": 1}\n"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("纯文本总结"), "纯文本总结");
    }

    #[tokio::test]
    async fn test_conversation_keeps_history() {
        let model = ScriptedModel::new(["one", "two"]);
        let mut conversation = Conversation::new(&model, "system");

        assert_eq!(conversation.send("first").await.unwrap(), "one");
        assert_eq!(conversation.send("second").await.unwrap(), "two");

        let requests = model.requests.lock().unwrap();
        assert_eq!(requests[0].len(), 2);
        assert_eq!(requests[1].len(), 4);
        assert_eq!(requests[1][0].role, Role::System);
        assert_eq!(requests[1][2], ChatMessage::assistant("one"));
        assert_eq!(conversation.messages().len(), 5);
    }

    #[tokio::test]
    async fn test_failed_turn_keeps_user_message_only() {
        let model = ScriptedModel::new(Vec::<String>::new());
        model.push_error(ModelError::Timeout(1));
        let mut conversation = Conversation::new(&model, "system");

        assert!(conversation.send("hello").await.is_err());
        assert_eq!(conversation.messages().len(), 2);
        assert_eq!(conversation.messages()[1].role, Role::User);
    }

    #[tokio::test]
    async fn test_ask_once_uses_fresh_context() {
        let model = ScriptedModel::new(["a", "b"]);
        ask_once(&model, "sys", "q1").await.unwrap();
        ask_once(&model, "sys", "q2").await.unwrap();

        let requests = model.requests.lock().unwrap();
        assert_eq!(requests[0].len(), 2);
        assert_eq!(requests[1].len(), 2);
        assert_eq!(requests[1][1].content, "q2");
    }
}
