//! Prompts for the remote oracle
//!
//! Placeholders are substituted with `str::replace` before sending.

use crate::oracle::ItemContent;

/// Summarization prompt
///
/// Placeholders: {persona}, {language}, {level}, {items}
pub const SUMMARY_PROMPT: &str = r#"You are {persona}. Below is a block of your own conversation history, oldest first.

Write a level {level} memory summary of this block in {language}:
- Write in the first person, as {persona} remembering the conversation
- Keep names, decisions, preferences and open questions
- Drop greetings, filler and repetition
- Stay well under the combined length of the input

History:
{items}

Respond with ONLY a JSON object in this exact format:
{"summary": "...", "quality_score": 0.8}

quality_score is your own 0.0-1.0 estimate of how faithful the summary is."#;

/// System prompt for response generation
///
/// Placeholder: {persona}
pub const RESPONSE_SYSTEM_PROMPT: &str = r#"You are {persona}. Stay in character and answer in your own voice. Use the remembered context when it is relevant; never mention that it was provided to you."#;

/// User prompt for response generation
///
/// Placeholders: {context}, {message}
pub const RESPONSE_PROMPT: &str = r#"What you remember of this conversation:
{context}

New message:
{message}"#;

/// Render items as tagged lines for the summary prompt
pub fn render_items(items: &[ItemContent]) -> String {
    items
        .iter()
        .map(|item| format!("[{}] {}", item.label, item.content))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn summary_prompt(items: &[ItemContent], persona: &str, language: &str) -> String {
    let level = items.iter().map(|i| i.level).max().unwrap_or(0) + 1;
    SUMMARY_PROMPT
        .replace("{persona}", persona)
        .replace("{language}", language)
        .replace("{level}", &level.to_string())
        .replace("{items}", &render_items(items))
}

pub fn response_prompts(context: &str, message: &str, persona: &str) -> (String, String) {
    let system = RESPONSE_SYSTEM_PROMPT.replace("{persona}", persona);
    let user = RESPONSE_PROMPT
        .replace("{context}", context)
        .replace("{message}", message);
    (system, user)
}
