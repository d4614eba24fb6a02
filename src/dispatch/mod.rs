//! Turns a transcript into speech.
//!
//! Built-in commands are answered locally with one priority line. Anything
//! else is a question: the chat answer is streamed, cut into sentences and
//! queued as it arrives, tagged with the generation of the interaction that
//! asked. Once that generation is no longer current the rest of the stream
//! is ignored.

pub mod commands;
pub mod context;
pub mod feedback;

pub use commands::{Command, SystemLoad, match_command, spoken_status, spoken_time};
pub use context::{ContentContext, ContentItem, StaticContent};
pub use feedback::{LogFeedback, RecordingFeedback, VisualFeedback};

use crate::chat::{ChatClient, ChatMessage, SentenceSegmenter};
use crate::defaults;
use crate::error::Result;
use crate::speech_queue::{SpeechSink, TtsJob};
use std::sync::Arc;

/// Where a transcript goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Builtin(Command),
    /// Text to send to the chat collaborator.
    Question(String),
}

/// How an interaction's dispatch ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Builtin { command: Command, reply: String },
    /// The whole stream was consumed.
    Answered { sentences: usize },
    /// A newer interaction took over before the stream ended.
    Superseded { sentences: usize },
    AnswerFailed,
    MissingApiKey,
}

pub struct Dispatcher {
    system_prompt: String,
    content: Option<Arc<dyn ContentContext>>,
    chat: Option<Arc<dyn ChatClient>>,
}

impl Dispatcher {
    /// `chat` is `None` when no API key is configured; questions then get a
    /// spoken configuration hint.
    pub fn new(
        system_prompt: impl Into<String>,
        content: Option<Arc<dyn ContentContext>>,
        chat: Option<Arc<dyn ChatClient>>,
    ) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            content,
            chat,
        }
    }

    /// Classify a transcript. "Explain" becomes a question about the
    /// displayed item when there is one.
    pub fn route(&self, text: &str) -> Route {
        match match_command(text) {
            Some(Command::Explain) => match self.current_item() {
                Some(item) => Route::Question(format!(
                    "Explain this Bible verse: {} - {}",
                    item.reference, item.text
                )),
                None => Route::Builtin(Command::Explain),
            },
            Some(command) => Route::Builtin(command),
            None => Route::Question(text.trim().to_string()),
        }
    }

    /// Perform the command's side effect and return the line to speak.
    pub fn execute(&self, command: Command) -> String {
        match command {
            Command::Help => defaults::HELP_TEXT.to_string(),
            Command::Explain if self.content.is_none() => defaults::CONTENT_UNAVAILABLE.to_string(),
            Command::Explain => defaults::NO_ITEM_TO_EXPLAIN.to_string(),
            Command::Next => self.navigate("Next verse", |content| content.advance()),
            Command::Previous => self.navigate("Previous verse", |content| content.retreat()),
            Command::CurrentItem => match &self.content {
                None => defaults::CONTENT_UNAVAILABLE.to_string(),
                Some(content) => content.current_item().map_or_else(
                    || defaults::NO_CURRENT_ITEM.to_string(),
                    |item| format!("{}: {}", item.reference, item.text),
                ),
            },
            Command::Time => spoken_time(&chrono::Local::now()),
            Command::Status => spoken_status(),
        }
    }

    fn navigate(&self, label: &str, step: impl FnOnce(&dyn ContentContext)) -> String {
        let Some(content) = &self.content else {
            return defaults::CONTENT_UNAVAILABLE.to_string();
        };
        step(content.as_ref());
        match content.current_item() {
            Some(item) => format!("{label}: {} - {}", item.reference, item.text),
            None => defaults::NO_CURRENT_ITEM.to_string(),
        }
    }

    /// Execute a built-in and queue its reply ahead of anything pending.
    pub fn run_builtin(
        &self,
        command: Command,
        speech: &dyn SpeechSink,
        generation: u64,
    ) -> Result<DispatchOutcome> {
        let reply = self.execute(command);
        tracing::info!(?command, reply = %reply, "built-in command");
        speech.enqueue_job(TtsJob::new(reply.clone(), true, generation))?;
        Ok(DispatchOutcome::Builtin { command, reply })
    }

    /// Configured prompt plus the displayed item, if any.
    pub fn system_prompt(&self) -> String {
        match self.current_item() {
            Some(item) => format!(
                "{}\n\nCurrent verse displayed: {} - {}\n\
                 If the user asks to explain this verse, refer to the verse above.",
                self.system_prompt, item.reference, item.text
            ),
            None => self.system_prompt.clone(),
        }
    }

    /// Stream an answer into `speech`, one job per sentence.
    ///
    /// `on_first_token` runs once, when the first non-empty delta arrives.
    /// Failures are spoken, never returned.
    pub fn answer(
        &self,
        question: &str,
        speech: &dyn SpeechSink,
        generation: u64,
        on_first_token: &mut dyn FnMut(),
    ) -> DispatchOutcome {
        let Some(chat) = &self.chat else {
            tracing::warn!("question asked without an API key");
            self.speak(speech, defaults::MISSING_API_KEY, generation);
            return DispatchOutcome::MissingApiKey;
        };

        let messages = [
            ChatMessage::system(self.system_prompt()),
            ChatMessage::user(question),
        ];
        let mut segmenter = SentenceSegmenter::new();
        let mut sentences = 0usize;
        let mut first_token = true;
        let mut superseded = false;

        tracing::info!(question = %question, generation, "asking chat collaborator");
        let result = chat.stream(&messages, &mut |delta| {
            if speech.generation() != generation {
                superseded = true;
                return false;
            }
            if first_token && !delta.trim().is_empty() {
                first_token = false;
                on_first_token();
            }
            if let Some(sentence) = segmenter.push(delta) {
                sentences += 1;
                self.speak_part(speech, sentence, generation);
            }
            true
        });

        if superseded {
            tracing::debug!(generation, sentences, "answer superseded");
            return DispatchOutcome::Superseded { sentences };
        }

        match result {
            Ok(()) => {
                if let Some(rest) = segmenter.finish() {
                    sentences += 1;
                    self.speak_part(speech, rest, generation);
                }
                tracing::debug!(generation, sentences, "answer complete");
                DispatchOutcome::Answered { sentences }
            }
            Err(e) => {
                tracing::error!(error = %e, "answer failed");
                self.speak(speech, defaults::ANSWER_APOLOGY, generation);
                DispatchOutcome::AnswerFailed
            }
        }
    }

    /// Route and fully handle a transcript on the calling thread.
    pub fn dispatch(&self, text: &str, speech: &dyn SpeechSink, generation: u64) -> Result<DispatchOutcome> {
        match self.route(text) {
            Route::Builtin(command) => self.run_builtin(command, speech, generation),
            Route::Question(question) => Ok(self.answer(&question, speech, generation, &mut || {})),
        }
    }

    fn current_item(&self) -> Option<ContentItem> {
        self.content.as_ref().and_then(|content| content.current_item())
    }

    fn speak(&self, speech: &dyn SpeechSink, text: &str, generation: u64) {
        self.speak_part(speech, text.to_string(), generation);
    }

    fn speak_part(&self, speech: &dyn SpeechSink, text: String, generation: u64) {
        if let Err(e) = speech.enqueue_job(TtsJob::new(text, false, generation)) {
            tracing::error!(error = %e, "failed to queue speech");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ScriptedChatClient;
    use crate::speech_queue::CollectorSpeech;

    fn content() -> Arc<StaticContent> {
        Arc::new(StaticContent::new(vec![
            ContentItem::new("John 3:16", "For God so loved the world"),
            ContentItem::new("Psalm 23:1", "The Lord is my shepherd"),
        ]))
    }

    fn dispatcher(chat: Option<ScriptedChatClient>) -> (Dispatcher, Arc<StaticContent>) {
        let content = content();
        let chat = chat.map(|c| Arc::new(c) as Arc<dyn ChatClient>);
        let dispatcher = Dispatcher::new(
            defaults::SYSTEM_PROMPT,
            Some(Arc::clone(&content) as Arc<dyn ContentContext>),
            chat,
        );
        (dispatcher, content)
    }

    #[test]
    fn test_next_advances_and_speaks_with_priority() {
        let (dispatcher, content) = dispatcher(None);
        let speech = CollectorSpeech::new();
        speech.enqueue_job(TtsJob::new("old backlog.", false, 0)).unwrap();

        let outcome = dispatcher.dispatch("Next verse", &speech, 0).unwrap();

        assert_eq!(content.position(), 1);
        let jobs = speech.jobs();
        assert_eq!(jobs.len(), 1);
        assert!(jobs[0].priority);
        assert_eq!(jobs[0].text, "Next verse: Psalm 23:1 - The Lord is my shepherd");
        assert!(matches!(outcome, DispatchOutcome::Builtin { command: Command::Next, .. }));
    }

    #[test]
    fn test_previous_and_current() {
        let (dispatcher, _) = dispatcher(None);
        assert_eq!(
            dispatcher.execute(Command::Previous),
            "Previous verse: Psalm 23:1 - The Lord is my shepherd"
        );
        assert_eq!(
            dispatcher.execute(Command::CurrentItem),
            "Psalm 23:1: The Lord is my shepherd"
        );
    }

    #[test]
    fn test_navigation_without_content() {
        let dispatcher = Dispatcher::new("prompt", None, None);
        assert_eq!(dispatcher.execute(Command::Next), defaults::CONTENT_UNAVAILABLE);
        assert_eq!(dispatcher.route("explain this verse"), Route::Builtin(Command::Explain));
        assert_eq!(dispatcher.execute(Command::Explain), defaults::CONTENT_UNAVAILABLE);
        assert_eq!(dispatcher.execute(Command::Previous), defaults::CONTENT_UNAVAILABLE);
        assert_eq!(dispatcher.execute(Command::CurrentItem), defaults::CONTENT_UNAVAILABLE);
    }

    #[test]
    fn test_explain_with_empty_content_has_nothing_to_explain() {
        let dispatcher = Dispatcher::new(
            "prompt",
            Some(Arc::new(StaticContent::default()) as Arc<dyn ContentContext>),
            None,
        );
        assert_eq!(dispatcher.route("explain this verse"), Route::Builtin(Command::Explain));
        assert_eq!(dispatcher.execute(Command::Explain), defaults::NO_ITEM_TO_EXPLAIN);
    }

    #[test]
    fn test_empty_content_has_no_current_item() {
        let dispatcher = Dispatcher::new(
            "prompt",
            Some(Arc::new(StaticContent::default()) as Arc<dyn ContentContext>),
            None,
        );
        assert_eq!(dispatcher.execute(Command::CurrentItem), defaults::NO_CURRENT_ITEM);
    }

    #[test]
    fn test_explain_routes_to_question_about_item() {
        let (dispatcher, _) = dispatcher(None);
        assert_eq!(
            dispatcher.route("please explain this verse"),
            Route::Question(
                "Explain this Bible verse: John 3:16 - For God so loved the world".to_string()
            )
        );
    }

    #[test]
    fn test_system_prompt_carries_current_item() {
        let (dispatcher, _) = dispatcher(None);
        let prompt = dispatcher.system_prompt();
        assert!(prompt.starts_with(defaults::SYSTEM_PROMPT));
        assert!(prompt.contains("Current verse displayed: John 3:16 - For God so loved the world"));
    }

    #[test]
    fn test_streamed_answer_queues_one_job_per_sentence() {
        let chat = ScriptedChatClient::new(&["Paul", " wrote it.", " Around 57", " AD.", " Amen!"]);
        let (dispatcher, _) = dispatcher(Some(chat.clone()));
        let speech = CollectorSpeech::new();
        let mut first_tokens = 0;

        let outcome = dispatcher.answer("Who wrote Romans?", &speech, 0, &mut || first_tokens += 1);

        assert_eq!(outcome, DispatchOutcome::Answered { sentences: 3 });
        assert_eq!(speech.texts(), vec!["Paul wrote it.", "Around 57 AD.", "Amen!"]);
        assert!(speech.jobs().iter().all(|job| !job.priority));
        assert_eq!(first_tokens, 1);

        let request = &chat.requests()[0];
        assert_eq!(request[0].role, "system");
        assert_eq!(request[1].content, "Who wrote Romans?");
    }

    #[test]
    fn test_unterminated_remainder_is_spoken() {
        let chat = ScriptedChatClient::new(&["Grace and", " peace"]);
        let (dispatcher, _) = dispatcher(Some(chat));
        let speech = CollectorSpeech::new();
        let outcome = dispatcher.answer("greeting", &speech, 0, &mut || {});
        assert_eq!(outcome, DispatchOutcome::Answered { sentences: 1 });
        assert_eq!(speech.texts(), vec!["Grace and peace"]);
    }

    #[test]
    fn test_chat_failure_speaks_one_apology() {
        let chat = ScriptedChatClient::new(&["partial"]).failing_after(1);
        let (dispatcher, _) = dispatcher(Some(chat));
        let speech = CollectorSpeech::new();
        let outcome = dispatcher.answer("question", &speech, 0, &mut || {});
        assert_eq!(outcome, DispatchOutcome::AnswerFailed);
        assert_eq!(speech.texts(), vec![defaults::ANSWER_APOLOGY]);
    }

    #[test]
    fn test_missing_api_key_hint() {
        let (dispatcher, _) = dispatcher(None);
        let speech = CollectorSpeech::new();
        let outcome = dispatcher.dispatch("Who was Moses?", &speech, 0).unwrap();
        assert_eq!(outcome, DispatchOutcome::MissingApiKey);
        assert_eq!(speech.texts(), vec![defaults::MISSING_API_KEY]);
    }

    #[test]
    fn test_stale_generation_stops_stream() {
        let chat = ScriptedChatClient::new(&["One.", " Two.", " Three."]);
        let (dispatcher, _) = dispatcher(Some(chat));
        let speech = CollectorSpeech::new();
        speech.advance_generation();

        let outcome = dispatcher.answer("question", &speech, 0, &mut || {});

        assert_eq!(outcome, DispatchOutcome::Superseded { sentences: 0 });
        assert!(speech.texts().is_empty());
    }

    #[test]
    fn test_help_is_priority() {
        let (dispatcher, _) = dispatcher(None);
        let speech = CollectorSpeech::new();
        dispatcher.dispatch("what can you do", &speech, 0).unwrap();
        let jobs = speech.jobs();
        assert_eq!(jobs[0].text, defaults::HELP_TEXT);
        assert!(jobs[0].priority);
    }
}
