//! Long conversations stay inside the persona's context budget

use async_trait::async_trait;
use std::sync::Mutex;
use versemap::chat::{
    estimate_tokens, ChatBackend, ChatError, ChatMessage, Conversation, DeltaSink, Persona, Role,
    SseDecoder, SseEvent,
};

/// Answers every question with a long fixed reply and records what it was sent
struct VerboseBackend {
    sent: Mutex<Vec<Vec<ChatMessage>>>,
}

#[async_trait]
impl ChatBackend for VerboseBackend {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        on_delta: DeltaSink<'_>,
    ) -> Result<String, ChatError> {
        self.sent.lock().unwrap().push(messages.to_vec());
        let answer = "Selah. ".repeat(500);
        on_delta(&answer);
        Ok(answer)
    }

    fn name(&self) -> &str {
        "verbose"
    }
}

fn tokens(messages: &[ChatMessage]) -> usize {
    messages.iter().map(|m| estimate_tokens(&m.content)).sum()
}

#[tokio::test]
async fn test_long_conversation_is_trimmed() {
    let backend = VerboseBackend {
        sent: Mutex::new(Vec::new()),
    };
    let mut conversation = Conversation::new(Persona::Genius);

    for turn in 0..8 {
        let question = format!("Question {} about the Psalms. {}", turn, "Why? ".repeat(100));
        conversation
            .ask(&backend, &question, &mut |_: &str| {})
            .await
            .unwrap();
    }

    assert_eq!(conversation.history().len(), 16);

    let sent = backend.sent.lock().unwrap();
    assert_eq!(sent.len(), 8);
    for (turn, messages) in sent.iter().enumerate() {
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].content, Persona::Genius.system_prompt());

        let last = messages.last().unwrap();
        assert_eq!(last.role, Role::User);
        assert!(last.content.starts_with(&format!("Question {} ", turn)));

        // trimming drops whole question/answer pairs from the front
        assert_eq!(messages[1].role, Role::User);

        let history = &messages[1..];
        assert!(
            tokens(messages) <= Persona::Genius.context_limit() || history.len() <= 2,
            "turn {} sent {} tokens in {} messages",
            turn,
            tokens(messages),
            messages.len()
        );
    }

    // later turns no longer carry the first question
    assert!(sent[7]
        .iter()
        .all(|m| !m.content.starts_with("Question 0 ")));
}

#[tokio::test]
async fn test_clear_starts_over() {
    let backend = VerboseBackend {
        sent: Mutex::new(Vec::new()),
    };
    let mut conversation = Conversation::new(Persona::Max);
    conversation
        .ask(&backend, "What is a psalm?", &mut |_: &str| {})
        .await
        .unwrap();
    conversation.clear();
    conversation
        .ask(&backend, "Who wrote Psalm 90?", &mut |_: &str| {})
        .await
        .unwrap();

    let sent = backend.sent.lock().unwrap();
    assert_eq!(sent[1].len(), 2);
    assert_eq!(sent[1][1].content, "Who wrote Psalm 90?");
}

#[test]
fn test_stream_split_inside_multibyte_text() {
    let stream = concat!(
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"Blessed are the meek \u{2026} \"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"for they shall inherit\"}}]}\n\n",
        "data: [DONE]\n\n",
    )
    .as_bytes();

    // split every three bytes so the ellipsis is cut mid-character
    let mut decoder = SseDecoder::new();
    let mut events = Vec::new();
    for chunk in stream.chunks(3) {
        events.extend(decoder.push(chunk));
    }
    events.extend(decoder.finish());

    assert_eq!(
        events,
        vec![
            SseEvent::Delta("Blessed are the meek \u{2026} ".to_string()),
            SseEvent::Delta("for they shall inherit".to_string()),
            SseEvent::Done,
        ]
    );
}
