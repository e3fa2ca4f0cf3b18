//! Local rule classifier.
//!
//! Deterministic, offline decomposition of an utterance into task
//! descriptors.  The utterance is lower-cased and split on the conjunctions
//! `and`, `also`, and `while`; every segment is then run through a fixed,
//! priority-ordered rule list where the first matching rule wins.
//!
//! The classifier never returns an empty list: when no segment yields a
//! task, a single `general` fallback descriptor is produced.

use std::sync::LazyLock;

use aho_corasick::AhoCorasick;
use async_trait::async_trait;
use tracing::debug;

use nexus_kernel::{GuiAction, TaskDescriptor, TaskKind};

use crate::error::Result;
use crate::provider::IntentProvider;

// ---------------------------------------------------------------------------
// Vocabulary
// ---------------------------------------------------------------------------

const CONJUNCTIONS: [&str; 3] = [" and ", " also ", " while "];

/// Tokens removed from a media request before it becomes a query.
const MEDIA_CONTROL_WORDS: [&str; 7] = ["play", "song", "music", "open", "chrome", "google", "youtube"];

/// Tokens dropped from the front of a cleaned media query.
const MEDIA_FILLER_WORDS: [&str; 6] = ["some", "a", "an", "the", "me", "my"];

/// Descriptive categories with no dedicated dispatcher branch, in rule order:
/// keyword, description, topic, simulated duration.
const CATEGORIES: [(&str, &str, &str, u64); 5] = [
    ("assignment", "Draft Assignment", "document", 3),
    ("email", "Check Emails", "email", 2),
    ("news", "Summarize News", "web", 4),
    ("presentation", "Draft Presentation", "presentation", 3),
    ("stock", "Monitor Stocks", "finance", 5),
];

const SEARCH_WORDS: [&str; 3] = ["search", "google", "find"];
const GREETING_WORDS: [&str; 5] = ["hi", "hello", "hey", "yo", "sup"];
const BROWSERS: [&str; 2] = ["chrome", "google"];

/// Delay used when a reminder gives no usable time.
pub const DEFAULT_REMINDER_DELAY_SECS: u64 = 5;

const SCREEN_SUMMARY_TEXT: &str =
    "Yo, I can't actually see your screen in offline mode, but I bet it looks great.";
const GREETING_TEXT: &str = "Yo! What's good? Ready to help you crush some tasks.";
const CHAT_TEXT: &str = "For sure. I'm listening.";

static CONJUNCTION_MATCHER: LazyLock<AhoCorasick> = LazyLock::new(|| {
    AhoCorasick::new(CONJUNCTIONS).expect("conjunction patterns are valid literals")
});

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

/// The offline rule classifier.  Stateless; cheap to construct.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClassifier;

impl LocalClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Decompose `utterance` into task descriptors, in segment order.
    pub fn classify(&self, utterance: &str) -> Vec<TaskDescriptor> {
        let lowered = utterance.to_lowercase();
        let mut tasks = Vec::new();

        for segment in split_segments(&lowered) {
            classify_segment(segment, &lowered, &mut tasks);
        }

        if tasks.is_empty() {
            tasks.push(fallback_descriptor());
        }

        debug!(count = tasks.len(), "local classification complete");
        tasks
    }
}

#[async_trait]
impl IntentProvider for LocalClassifier {
    fn name(&self) -> &str {
        "local"
    }

    async fn analyze(&self, utterance: &str, _image: Option<&[u8]>) -> Result<Vec<TaskDescriptor>> {
        Ok(self.classify(utterance))
    }
}

/// The descriptor emitted when nothing else matched.
pub fn fallback_descriptor() -> TaskDescriptor {
    TaskDescriptor::new("Process Request", TaskKind::general(None, 1))
}

/// Whether opening `app` should be skipped because the utterance as a whole
/// asks for media playback, which opens its own browser tab.
pub fn suppressed_by_play_intent(app: &str, utterance: &str) -> bool {
    BROWSERS.contains(&app) && utterance.to_lowercase().contains("play")
}

/// Split a lower-cased utterance on conjunctions; trimmed, empties dropped.
fn split_segments(lowered: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut start = 0;
    for m in CONJUNCTION_MATCHER.find_iter(lowered) {
        segments.push(&lowered[start..m.start()]);
        start = m.end();
    }
    segments.push(&lowered[start..]);

    segments
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// Run the rule list over one segment, appending whatever it yields.
fn classify_segment(segment: &str, utterance: &str, out: &mut Vec<TaskDescriptor>) {
    let words: Vec<&str> = segment.split_whitespace().collect();

    // 1. Media playback.  Falls through when nothing is left to play.
    if ["play", "song", "music"].iter().any(|w| segment.contains(w))
        && let Some(query) = media_query(&words)
    {
        out.push(TaskDescriptor::new(
            format!("Play {query}"),
            TaskKind::WebSearch {
                query: format!("{query} song"),
            },
        ));
        return;
    }

    // 2. Descriptive categories.
    if let Some(&(_, description, topic, duration)) =
        CATEGORIES.iter().find(|(keyword, ..)| segment.contains(keyword))
    {
        out.push(TaskDescriptor::new(description, TaskKind::general(Some(topic), duration)));
        return;
    }

    // 3. Notepad, optionally followed by text to type into it.
    if segment.contains("notepad") {
        out.push(gui("Open Notepad", GuiAction::Open { app: "notepad".into() }));
        if let Some((_, after)) = segment.rsplit_once("type") {
            push_type(collapse(after), out);
        }
        return;
    }

    // 4. Standalone typing.
    if segment.contains("type") && !segment.contains("open") {
        push_type(collapse(&segment.replace("type", "")), out);
        return;
    }

    // 5. Open an application.
    if segment.contains("open") {
        if let Some(app) = word_after(&words, "open")
            && !suppressed_by_play_intent(app, utterance)
        {
            out.push(gui(format!("Open {app}"), GuiAction::Open { app: app.into() }));
        }
        return;
    }

    // 6. Close, install, uninstall.
    if segment.contains("close") {
        if let Some(app) = word_after(&words, "close") {
            out.push(gui(format!("Close {app}"), GuiAction::Close { app: app.into() }));
        }
        return;
    }
    if segment.contains("install") {
        if words.contains(&"uninstall") {
            if let Some(app) = word_after(&words, "uninstall") {
                out.push(gui(format!("Uninstall {app}"), GuiAction::Uninstall { app: app.into() }));
            }
        } else if let Some(app) = word_after(&words, "install") {
            out.push(gui(format!("Install {app}"), GuiAction::Install { app: app.into() }));
        }
        return;
    }

    // 7. Reminders.
    if segment.contains("remind") {
        let (message, delay) = parse_reminder(segment);
        if !message.is_empty() {
            out.push(
                TaskDescriptor::new(
                    format!("Remind: {message}"),
                    TaskKind::Reminder { message },
                )
                .with_delay(delay),
            );
        }
        return;
    }

    // 8. Web search.
    if SEARCH_WORDS.iter().any(|w| segment.contains(w)) {
        let stripped = SEARCH_WORDS
            .iter()
            .fold(segment.to_string(), |acc, w| acc.replace(w, ""));
        let query = collapse(&stripped);
        if !query.is_empty() {
            out.push(TaskDescriptor::new(
                format!("Search: {query}"),
                TaskKind::WebSearch { query },
            ));
        }
        return;
    }

    // 9. Screen summary.
    if segment.contains("summarize") || segment.contains("screen") {
        out.push(respond("Summarize Screen", SCREEN_SUMMARY_TEXT));
        return;
    }

    // 10-12. Conversation.
    if is_greeting(segment, &words) {
        out.push(respond(format!("Greeting: {segment}"), GREETING_TEXT));
    } else if segment.contains('?') || segment.contains("what") || segment.contains("who") {
        out.push(respond(
            format!("Answer: {segment}"),
            format!(
                "Good question about '{segment}'. I don't know that one offline, but I'm listening."
            ),
        ));
    } else {
        out.push(respond(format!("Chat: {segment}"), CHAT_TEXT));
    }
}

// ---------------------------------------------------------------------------
// Extraction helpers
// ---------------------------------------------------------------------------

fn gui(description: impl Into<String>, action: GuiAction) -> TaskDescriptor {
    TaskDescriptor::new(description, TaskKind::GuiAutomation(action))
}

fn respond(description: impl Into<String>, text: impl Into<String>) -> TaskDescriptor {
    TaskDescriptor::new(description, TaskKind::Response { text: text.into() })
}

fn push_type(text: String, out: &mut Vec<TaskDescriptor>) {
    if !text.is_empty() {
        out.push(gui(format!("Type '{text}'"), GuiAction::Type { text }));
    }
}

/// Normalize internal whitespace and trim.
fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The token following the first occurrence of `keyword` as a whole word.
fn word_after<'a>(words: &[&'a str], keyword: &str) -> Option<&'a str> {
    let idx = words.iter().position(|w| *w == keyword)?;
    words.get(idx + 1).copied()
}

/// Strip control and leading filler words; `None` if nothing remains.
fn media_query(words: &[&str]) -> Option<String> {
    let remaining: Vec<&str> = words
        .iter()
        .copied()
        .filter(|w| !MEDIA_CONTROL_WORDS.contains(w))
        .skip_while(|w| MEDIA_FILLER_WORDS.contains(w))
        .collect();
    (!remaining.is_empty()).then(|| remaining.join(" "))
}

fn is_greeting(segment: &str, words: &[&str]) -> bool {
    segment.contains("how are you")
        || words.iter().any(|w| {
            let w = w.trim_matches(|c: char| !c.is_alphanumeric());
            GREETING_WORDS.contains(&w)
        })
}

/// Split a reminder segment into its message and delay in seconds.
///
/// When the last standalone `in` is followed by a number and a known unit,
/// the message is everything before it.  Otherwise the whole text is the
/// message and the default delay applies.
fn parse_reminder(segment: &str) -> (String, u64) {
    let rest = ["remind me to", "remind me", "remind"]
        .iter()
        .find(|prefix| segment.contains(*prefix))
        .map_or_else(|| segment.to_string(), |p| segment.replacen(p, "", 1));
    let words: Vec<&str> = rest.split_whitespace().collect();

    let timed = words.iter().rposition(|w| *w == "in").and_then(|idx| {
        let delay = parse_delay(words.get(idx + 1).copied(), words.get(idx + 2).copied())?;
        Some((words[..idx].join(" "), delay))
    });
    timed.unwrap_or_else(|| (words.join(" "), DEFAULT_REMINDER_DELAY_SECS))
}

fn parse_delay(amount: Option<&str>, unit: Option<&str>) -> Option<u64> {
    let amount: u64 = amount?.parse().ok()?;
    let unit = unit?;
    let multiplier = if unit.starts_with("sec") {
        1
    } else if unit.starts_with("min") {
        60
    } else if unit.starts_with("hour") || unit.starts_with("hr") {
        3600
    } else {
        return None;
    };
    amount.checked_mul(multiplier)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(input: &str) -> Vec<TaskDescriptor> {
        LocalClassifier::new().classify(input)
    }

    fn only(input: &str) -> TaskDescriptor {
        let mut tasks = classify(input);
        assert_eq!(tasks.len(), 1, "expected one task for {input:?}, got {tasks:?}");
        tasks.remove(0)
    }

    #[test]
    fn empty_input_yields_fallback() {
        for input in ["", "   ", "open", "close", "uninstall"] {
            let task = only(input);
            assert_eq!(task.description, "Process Request");
            assert_eq!(task.kind(), &TaskKind::general(None, 1));
        }
    }

    #[test]
    fn segments_split_on_conjunctions() {
        let tasks = classify("open notepad and check emails");
        assert_eq!(tasks.len(), 2);
        assert_eq!(
            tasks[0].kind(),
            &TaskKind::GuiAutomation(GuiAction::Open { app: "notepad".into() })
        );
        assert_eq!(tasks[1].description, "Check Emails");
        assert_eq!(tasks[1].kind(), &TaskKind::general(Some("email"), 2));
    }

    #[test]
    fn also_and_while_split_too() {
        let tasks = classify("check the news also monitor stocks while drafting my presentation");
        let descriptions: Vec<_> = tasks.iter().map(|t| t.description.as_str()).collect();
        assert_eq!(
            descriptions,
            vec!["Summarize News", "Monitor Stocks", "Draft Presentation"]
        );
    }

    #[test]
    fn reminder_with_seconds() {
        let task = only("remind me to call mom in 45 seconds");
        assert_eq!(task.description, "Remind: call mom");
        assert_eq!(task.kind(), &TaskKind::Reminder { message: "call mom".into() });
        assert_eq!(task.metadata.scheduled_delay_seconds, Some(45));
    }

    #[test]
    fn reminder_units() {
        assert_eq!(only("remind me to stretch in 2 minutes").metadata.scheduled_delay_seconds, Some(120));
        assert_eq!(only("remind me to sleep in 1 hour").metadata.scheduled_delay_seconds, Some(3600));
    }

    #[test]
    fn reminder_defaults_delay() {
        let task = only("remind me to drink water");
        assert_eq!(task.kind(), &TaskKind::Reminder { message: "drink water".into() });
        assert_eq!(task.metadata.scheduled_delay_seconds, Some(DEFAULT_REMINDER_DELAY_SECS));

        let task = only("remind me to log in in soon");
        assert_eq!(task.kind(), &TaskKind::Reminder { message: "log in in soon".into() });
        assert_eq!(task.metadata.scheduled_delay_seconds, Some(DEFAULT_REMINDER_DELAY_SECS));
    }

    #[test]
    fn reminder_without_a_delay_keeps_its_in() {
        let task = only("remind me to check in with bob");
        assert_eq!(task.description, "Remind: check in with bob");
        assert_eq!(task.kind(), &TaskKind::Reminder { message: "check in with bob".into() });
        assert_eq!(task.metadata.scheduled_delay_seconds, Some(DEFAULT_REMINDER_DELAY_SECS));

        let task = only("remind me to check in with bob in 20 seconds");
        assert_eq!(task.kind(), &TaskKind::Reminder { message: "check in with bob".into() });
        assert_eq!(task.metadata.scheduled_delay_seconds, Some(20));
    }

    #[test]
    fn reminder_keeps_in_inside_words() {
        let task = only("remind me to print invoices in 10 seconds");
        assert_eq!(task.kind(), &TaskKind::Reminder { message: "print invoices".into() });
        assert_eq!(task.metadata.scheduled_delay_seconds, Some(10));
    }

    #[test]
    fn play_suppresses_browser_open() {
        let tasks = classify("open chrome and play some jazz");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].description, "Play jazz");
        assert_eq!(tasks[0].kind(), &TaskKind::WebSearch { query: "jazz song".into() });
    }

    #[test]
    fn play_strips_control_words() {
        let task = only("play me the blinding lights song on youtube");
        assert_eq!(task.description, "Play blinding lights on");
        assert_eq!(task.kind(), &TaskKind::WebSearch { query: "blinding lights on song".into() });
    }

    #[test]
    fn bare_play_falls_through() {
        let task = only("play");
        assert_eq!(task.description, "Chat: play");
    }

    #[test]
    fn play_intent_carve_out() {
        assert!(suppressed_by_play_intent("chrome", "open chrome and play lofi"));
        assert!(suppressed_by_play_intent("google", "Open Google and PLAY lofi"));
        assert!(!suppressed_by_play_intent("chrome", "open chrome"));
        assert!(!suppressed_by_play_intent("spotify", "open spotify and play lofi"));
    }

    #[test]
    fn open_without_play_is_kept() {
        let task = only("open chrome");
        assert_eq!(task.kind(), &TaskKind::GuiAutomation(GuiAction::Open { app: "chrome".into() }));
        assert_eq!(task.description, "Open chrome");
    }

    #[test]
    fn notepad_with_typing() {
        let tasks = classify("open notepad then type hello world");
        assert_eq!(tasks.len(), 2);
        assert_eq!(
            tasks[1].kind(),
            &TaskKind::GuiAutomation(GuiAction::Type { text: "hello world".into() })
        );
        assert_eq!(tasks[1].description, "Type 'hello world'");
    }

    #[test]
    fn standalone_typing() {
        let task = only("type good morning");
        assert_eq!(
            task.kind(),
            &TaskKind::GuiAutomation(GuiAction::Type { text: "good morning".into() })
        );
    }

    #[test]
    fn close_install_uninstall() {
        assert_eq!(
            only("close spotify").kind(),
            &TaskKind::GuiAutomation(GuiAction::Close { app: "spotify".into() })
        );
        assert_eq!(
            only("install vlc").kind(),
            &TaskKind::GuiAutomation(GuiAction::Install { app: "vlc".into() })
        );
        let task = only("uninstall vlc");
        assert_eq!(task.kind(), &TaskKind::GuiAutomation(GuiAction::Uninstall { app: "vlc".into() }));
        assert_eq!(task.description, "Uninstall vlc");
    }

    #[test]
    fn search_strips_trigger_words() {
        let task = only("search rust async traits");
        assert_eq!(task.kind(), &TaskKind::WebSearch { query: "rust async traits".into() });
        assert_eq!(task.description, "Search: rust async traits");

        // Nothing left to search for.
        assert_eq!(only("find").description, "Process Request");
    }

    #[test]
    fn screen_summary_is_a_response() {
        let task = only("summarize my screen");
        assert_eq!(task.description, "Summarize Screen");
        assert!(matches!(task.kind(), TaskKind::Response { text } if !text.is_empty()));
    }

    #[test]
    fn conversation_rules() {
        assert_eq!(only("hey there").description, "Greeting: hey there");
        assert_eq!(only("how are you").description, "Greeting: how are you");
        assert_eq!(only("who won the game?").description, "Answer: who won the game?");
        assert_eq!(only("cool beans").description, "Chat: cool beans");
    }

    #[test]
    fn greeting_is_token_based() {
        // "this" contains "hi" but is not a greeting.
        assert_eq!(only("this is fine").description, "Chat: this is fine");
    }

    #[test]
    fn category_order_is_fixed() {
        // Both keywords present: the earlier category wins.
        assert_eq!(only("email my assignment").description, "Draft Assignment");
    }

    #[test]
    fn mixed_case_input() {
        let task = only("Install VLC");
        assert_eq!(task.kind(), &TaskKind::GuiAutomation(GuiAction::Install { app: "vlc".into() }));
    }

    #[tokio::test]
    async fn provider_never_fails() {
        let tasks = LocalClassifier::new().analyze("", None).await.unwrap();
        assert_eq!(tasks, vec![fallback_descriptor()]);
    }
}
