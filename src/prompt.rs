//! System-prompt assembly and placeholder substitution.
//!
//! Everything here is a pure function of the character and resolved persona
//! so identical inputs always produce identical prompts.

use crate::types::{Character, Persona};

const FORMATTING_RULES: &str = "STRICT ROLEPLAY FORMATTING RULES:\n\
1. Separate physical actions and narration using asterisks (e.g., *smiles softly*) and put them on their own separate line.\n\
2. ANY character dialogue MUST be prefixed with '{name}:' and placed on its own line.\n\
3. NEVER mix narration and dialogue on the same line.\n\
4. Use Markdown for formatting (bold/italics).\n\
5. NEVER break character or acknowledge being a simulation.";

const HIGH_MATURITY_DIRECTIVE: &str = "NARRATIVE REINFORCEMENT (HIGH MATURITY): \
Since this is a mature roleplay, narrate actions with significant visceral detail and emotional weight. \
Focus on the atmospheric tension, the physical sensations, and the internal emotional shifts. \
Be expressive, detailed, and uninhibited in your narration to create a truly immersive experience.";

/// Replace every `{{user}}` placeholder with the persona's name.
///
/// The single substitution function shared by the prompt, the greeting, and
/// the hidden directive: total (no occurrence survives) and idempotent (a
/// second pass with the same name changes nothing).
pub fn substitute_user(text: &str, persona_name: &str) -> String {
    text.replace("{{user}}", persona_name)
}

/// Assemble the system instruction for one generation call.
///
/// Fixed block order: identity, lore and opening scene, the permanent-memory
/// block (only when non-empty), the hidden behavioral directive, formatting
/// rules, the high-maturity style directive, and the active user persona.
pub fn build_system_prompt(character: &Character, persona: &Persona) -> String {
    let mut out = String::new();

    out.push_str(&format!("Identity: {}\n", character.name));
    if !character.tagline.trim().is_empty() {
        out.push_str(&format!("Tagline: {}\n", character.tagline.trim()));
    }
    out.push_str(&format!("Lore: {}\n", character.description.trim()));
    if !character.greeting.trim().is_empty() {
        // history normalization trims leading model turns, so the opening
        // line reaches the model here instead
        out.push_str(&format!(
            "Opening Scene (your first line, already shown to the user):\n{}\n",
            character.greeting.trim()
        ));
    }

    if !character.memory.trim().is_empty() {
        out.push_str(&format!(
            "\nPERMANENT MEMORY (established facts from past conversations, treat as canon, not suggestion):\n{}\n",
            character.memory.trim()
        ));
    }

    if !character.system_instruction.trim().is_empty() {
        out.push_str(&format!(
            "\nBehavioral Directive:\n{}\n",
            character.system_instruction.trim()
        ));
    }

    out.push('\n');
    out.push_str(&FORMATTING_RULES.replace("{name}", &character.name));
    out.push('\n');

    if character.maturity_level.is_high() {
        out.push('\n');
        out.push_str(HIGH_MATURITY_DIRECTIVE);
        out.push('\n');
    }

    out.push_str(&format!(
        "\nUser Roleplay Persona: {} ({})",
        persona.name,
        persona.bio.trim()
    ));

    // One pass over the assembled whole keeps substitution total no matter
    // which block carried the placeholder.
    substitute_user(&out, &persona.name)
}

/// The character's opening line with placeholders filled in.
pub fn render_greeting(character: &Character, persona: &Persona) -> String {
    substitute_user(&character.greeting, &persona.name)
}
