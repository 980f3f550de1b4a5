//! Memory etching and consolidation.
//!
//! Both operations are one-shot generation calls. Nothing is written back
//! until a full response arrives, so a failed attempt is safe to repeat; the
//! engine never repeats it on its own.

use crate::config::EngineConfig;
use crate::context::{Turn, TurnRole};
use crate::error::Result;
use crate::provider::{GenerationOptions, GenerationRequest, GenerationService};
use crate::types::{Character, Message, Persona, Role};

/// Format selected transcript messages as labeled lines for the summarizer.
/// Model lines carry the character's name, user lines the authoring
/// persona's.
pub fn transcript_excerpt(
    messages: &[&Message],
    character: &Character,
    personas: &[Persona],
) -> String {
    let mut lines = Vec::new();
    for message in messages {
        let label = match message.role {
            Role::User => crate::persona::resolve_persona(personas, message.persona_id.as_deref())
                .map(|p| p.name.clone())
                .unwrap_or_else(|| "User".to_string()),
            Role::Model => character.name.clone(),
            Role::System => continue,
        };
        lines.push(format!("{}: {}", label, message.selected_text()));
    }
    lines.join("\n")
}

fn etch_prompt(character: &Character, transcript: &str) -> String {
    format!(
        "Identify and summarize key narrative developments for {} to remember permanently. \
Focus on relationships, plot twists, and personal facts about the user. \
Format as bullet points.\n\nTranscript:\n{}",
        character.name, transcript
    )
}

fn consolidate_prompt(character: &Character) -> String {
    format!(
        "Please consolidate and reorganize the following character memory log into a concise, \
well-structured narrative record. Remove redundancies, combine similar points, and maintain \
key details about user relationships, secret plot twists, and personal facts. \
Maintain a high-quality roleplay tone.\n\nExisting Memory:\n{}",
        character.memory
    )
}

/// Append a new etched block to existing memory without disturbing it.
pub fn append_memory(existing: &str, addition: &str) -> String {
    let addition = addition.trim();
    if existing.trim().is_empty() {
        addition.to_string()
    } else {
        format!("{}\n{}", existing.trim_end(), addition)
    }
}

fn one_shot(prompt: String, temperature: f64) -> GenerationRequest {
    GenerationRequest {
        system_instruction: String::new(),
        turns: vec![Turn {
            role: TurnRole::User,
            text: prompt,
        }],
        options: GenerationOptions {
            temperature,
            thinking_budget: None,
            max_tokens: None,
        },
    }
}

/// Summarize selected messages into an addition and append it to the
/// character's memory. Returns the new memory text, or `None` when there was
/// nothing to etch (no selection, or the service produced nothing).
pub async fn etch(
    service: &dyn GenerationService,
    config: &EngineConfig,
    character: &Character,
    selected: &[&Message],
    personas: &[Persona],
) -> Result<Option<String>> {
    let transcript = transcript_excerpt(selected, character, personas);
    if transcript.trim().is_empty() {
        return Ok(None);
    }

    let request = one_shot(etch_prompt(character, &transcript), config.etch_temperature);
    let addition = service.generate(request).await?;
    if addition.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(append_memory(&character.memory, &addition)))
}

/// Rewrite the whole memory record into a denser equivalent. The only
/// replace-in-place operation in the engine; a no-op on empty memory, no
/// call issued.
pub async fn consolidate(
    service: &dyn GenerationService,
    config: &EngineConfig,
    character: &Character,
) -> Result<Option<String>> {
    if character.memory.trim().is_empty() {
        return Ok(None);
    }

    let request = one_shot(consolidate_prompt(character), config.consolidate_temperature);
    let rewritten = service.generate(request).await?;
    if rewritten.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(rewritten.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use crate::provider::TextStream;
    use crate::types::Maturity;

    struct ScriptedService {
        reply: String,
        calls: AtomicUsize,
        last_prompt: Mutex<Option<String>>,
    }

    impl ScriptedService {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.into(),
                calls: AtomicUsize::new(0),
                last_prompt: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl GenerationService for ScriptedService {
        async fn generate(&self, request: GenerationRequest) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_prompt.lock().unwrap() = request.turns.first().map(|t| t.text.clone());
            Ok(self.reply.clone())
        }

        async fn generate_stream(&self, _request: GenerationRequest) -> Result<TextStream> {
            unimplemented!("memory operations are one-shot")
        }
    }

    fn make_character(memory: &str) -> Character {
        Character {
            id: "c1".into(),
            name: "Mira".into(),
            tagline: String::new(),
            description: String::new(),
            system_instruction: String::new(),
            maturity_level: Maturity::Teen,
            memory: memory.into(),
            greeting: String::new(),
            created_at: 0,
            updated_at: 0,
        }
    }

    fn make_personas() -> Vec<Persona> {
        vec![Persona {
            id: "p1".into(),
            name: "User".into(),
            bio: String::new(),
            is_default: true,
            created_at: 0,
            updated_at: 0,
        }]
    }

    #[tokio::test]
    async fn etch_appends_without_replacing() {
        let service = ScriptedService::new("- the user admitted to being a spy");
        let character = make_character("- met at the docks");
        let personas = make_personas();
        let user = Message::user("I'm actually a spy.", "p1");
        let reply = Message::model("I suspected as much.");
        let selected = vec![&user, &reply];

        let updated = etch(&service, &EngineConfig::default(), &character, &selected, &personas)
            .await
            .unwrap()
            .expect("memory updated");

        assert!(updated.starts_with("- met at the docks"));
        assert!(updated.ends_with("- the user admitted to being a spy"));
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);

        let prompt = service.last_prompt.lock().unwrap().clone().unwrap();
        assert!(prompt.contains("User: I'm actually a spy."));
        assert!(prompt.contains("Mira: I suspected as much."));
    }

    #[tokio::test]
    async fn etch_with_empty_selection_issues_no_call() {
        let service = ScriptedService::new("ignored");
        let character = make_character("");
        let personas = make_personas();

        let result = etch(&service, &EngineConfig::default(), &character, &[], &personas)
            .await
            .unwrap();
        assert!(result.is_none());
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn consolidate_on_empty_memory_is_a_no_op() {
        let service = ScriptedService::new("ignored");
        let character = make_character("   ");

        let result = consolidate(&service, &EngineConfig::default(), &character)
            .await
            .unwrap();
        assert!(result.is_none());
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn consolidate_replaces_wholesale() {
        let service = ScriptedService::new("A tight narrative record.");
        let character = make_character("- fact one\n- fact one again\n- fact two");

        let result = consolidate(&service, &EngineConfig::default(), &character)
            .await
            .unwrap()
            .expect("rewritten");
        assert_eq!(result, "A tight narrative record.");
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn append_memory_handles_empty_base() {
        assert_eq!(append_memory("", "- new fact"), "- new fact");
        assert_eq!(append_memory("- old\n", "- new"), "- old\n- new");
    }
}
