//! Session Notes
//!
//! Turns a full session transcript into structured coaching notes with a
//! single JSON-mode model call, then seeds the memory store with the
//! summary and the top action items. Action steps are padded to at least
//! three and capped at seven.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::ai::{AiError, GenerateOptions, LlmClient};
use crate::memory::{MemoryKind, MemoryStore};

use super::assembler::{parse_action_items, parse_string_array, ActionItem};
use super::personas::{persona_for, Persona};

const MIN_ACTION_STEPS: usize = 3;
const MAX_ACTION_STEPS: usize = 7;

/// Generic steps used to backfill thin action lists.
const FALLBACK_ACTIONS: [&str; 3] = [
    "Review progress from previous session",
    "Set clear goals for next steps",
    "Schedule a follow-up coaching session",
];

/// Notes request for one session transcript.
#[derive(Debug, Clone, Deserialize)]
pub struct NotesRequest {
    pub user_id: i64,
    pub coach_id: i64,
    #[serde(default)]
    pub session_id: Option<String>,
    pub transcript: String,
}

/// One insight extracted from the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoachingInsight {
    pub category: String,
    pub insight: String,
    #[serde(default)]
    pub recommendation: Option<String>,
}

/// Structured coaching notes for one session.
#[derive(Debug, Clone, Serialize)]
pub struct NotesReport {
    pub summary: String,
    pub key_insights: Vec<CoachingInsight>,
    pub action_steps: Vec<ActionItem>,
    pub topics_covered: Vec<String>,
    pub follow_up_questions: Vec<String>,
    pub session_score: Option<u32>,
}

/// Notes generator over the generation client and the memory store.
pub struct NotesGenerator {
    llm: Arc<LlmClient>,
    memory: Arc<dyn MemoryStore>,
}

impl NotesGenerator {
    pub fn new(llm: Arc<LlmClient>, memory: Arc<dyn MemoryStore>) -> Self {
        Self { llm, memory }
    }

    /// Generate notes for a transcript. The model call is the primary path;
    /// the memory writes afterwards are best effort.
    pub async fn generate(&self, request: &NotesRequest) -> Result<NotesReport, AiError> {
        let persona = persona_for(request.coach_id);
        let prompt = build_notes_prompt(&persona, &request.transcript);
        let opts = GenerateOptions::default()
            .with_system_prompt(
                "You are an expert coaching notes analyzer. Return comprehensive, well-structured JSON.",
            )
            .with_max_tokens(2000);

        let result = self.llm.generate_json(&prompt, &opts).await?;

        let report = NotesReport {
            summary: result["summary"]
                .as_str()
                .unwrap_or("Session notes generated.")
                .to_string(),
            key_insights: parse_insights(&result["key_insights"]),
            action_steps: pad_action_steps(parse_action_items(&result["action_steps"])),
            topics_covered: parse_string_array(&result["topics_covered"]),
            follow_up_questions: parse_string_array(&result["follow_up_questions"]),
            session_score: result["session_score"].as_u64().map(|s| s as u32),
        };

        self.seed_memories(request, &persona, &report).await;

        Ok(report)
    }

    /// Store the summary as an insight and the top three action steps as
    /// action memories. Failures are logged and swallowed.
    async fn seed_memories(&self, request: &NotesRequest, persona: &Persona, report: &NotesReport) {
        if !report.summary.is_empty() {
            if let Err(e) = self
                .memory
                .store(
                    &format!("Session summary with {}: {}", persona.name, report.summary),
                    request.user_id,
                    request.coach_id,
                    MemoryKind::Insight,
                    request.session_id.as_deref(),
                )
                .await
            {
                warn!(user_id = request.user_id, error = %e, "notes summary memory write failed");
            }
        }

        for action in report.action_steps.iter().take(3) {
            if let Err(e) = self
                .memory
                .store(
                    &format!("Action item: {}", action.description),
                    request.user_id,
                    request.coach_id,
                    MemoryKind::Action,
                    request.session_id.as_deref(),
                )
                .await
            {
                warn!(user_id = request.user_id, error = %e, "action memory write failed");
            }
        }
    }
}

pub(crate) fn build_notes_prompt(persona: &Persona, transcript: &str) -> String {
    format!(
        "Analyze this coaching session transcript and generate comprehensive coaching notes.\n\n\
         Coach: {} ({})\n\n\
         Transcript:\n{}\n\n\
         Generate a JSON response with:\n\
         1. \"summary\": Executive summary of the session (2-3 sentences)\n\
         2. \"key_insights\": Array of insights, each with:\n\
            - \"category\": \"strength\", \"opportunity\", \"concern\", or \"achievement\"\n\
            - \"insight\": The insight itself\n\
            - \"recommendation\": Optional recommendation\n\
         3. \"action_steps\": Array of action items, each with:\n\
            - \"description\": Clear action description\n\
            - \"priority\": \"low\", \"medium\", \"high\", or \"urgent\"\n\
            - \"due_suggestion\": Suggested timeframe\n\
         4. \"topics_covered\": Array of main topics discussed\n\
         5. \"follow_up_questions\": Array of questions for the next session\n\
         6. \"session_score\": Engagement/productivity score from 1-100\n\n\
         Be thorough but concise. Focus on actionable insights.",
        persona.name, persona.specialty, transcript
    )
}

fn parse_insights(value: &Value) -> Vec<CoachingInsight> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let insight = item["insight"].as_str()?.trim();
            if insight.is_empty() {
                return None;
            }
            Some(CoachingInsight {
                category: item["category"].as_str().unwrap_or("insight").to_string(),
                insight: insight.to_string(),
                recommendation: item["recommendation"].as_str().map(str::to_string),
            })
        })
        .collect()
}

/// Backfill thin action lists to at least three entries and cap at seven.
pub(crate) fn pad_action_steps(mut steps: Vec<ActionItem>) -> Vec<ActionItem> {
    let mut fallbacks = FALLBACK_ACTIONS.iter();
    while steps.len() < MIN_ACTION_STEPS {
        match fallbacks.next() {
            Some(description) => steps.push(ActionItem {
                description: (*description).to_string(),
                priority: "medium".to_string(),
                due_suggestion: Some("Before the next session".to_string()),
            }),
            None => break,
        }
    }
    steps.truncate(MAX_ACTION_STEPS);
    steps
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(description: &str) -> ActionItem {
        ActionItem {
            description: description.to_string(),
            priority: "medium".to_string(),
            due_suggestion: None,
        }
    }

    #[test]
    fn test_padding_zero_inputs_reaches_three() {
        let padded = pad_action_steps(Vec::new());
        assert_eq!(padded.len(), 3);
        assert_eq!(padded[0].description, "Review progress from previous session");
        assert_eq!(padded[1].description, "Set clear goals for next steps");
        assert_eq!(padded[2].description, "Schedule a follow-up coaching session");
    }

    #[test]
    fn test_padding_one_input_reaches_three() {
        let padded = pad_action_steps(vec![action("Call two prospects")]);
        assert_eq!(padded.len(), 3);
        assert_eq!(padded[0].description, "Call two prospects");
    }

    #[test]
    fn test_padding_two_inputs_reaches_three() {
        let padded = pad_action_steps(vec![action("a"), action("b")]);
        assert_eq!(padded.len(), 3);
    }

    #[test]
    fn test_padding_three_inputs_unchanged() {
        let padded = pad_action_steps(vec![action("a"), action("b"), action("c")]);
        assert_eq!(padded.len(), 3);
        assert_eq!(padded[2].description, "c");
    }

    #[test]
    fn test_padding_eight_inputs_capped_at_seven() {
        let inputs: Vec<ActionItem> = (0..8).map(|n| action(&format!("step {n}"))).collect();
        let padded = pad_action_steps(inputs);
        assert_eq!(padded.len(), 7);
        assert_eq!(padded[6].description, "step 6");
    }

    #[test]
    fn test_parse_insights_drops_empty() {
        let value = serde_json::json!([
            {"category": "strength", "insight": "Clear vision", "recommendation": "Write it down"},
            {"category": "concern", "insight": ""},
            {"category": "concern"},
        ]);
        let insights = parse_insights(&value);
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].insight, "Clear vision");
    }

    #[test]
    fn test_notes_prompt_includes_persona_and_transcript() {
        let persona = persona_for(2);
        let prompt = build_notes_prompt(&persona, "User: hi\nCoach: hello");
        assert!(prompt.contains("Coach: Rob Mercer (Sales)"));
        assert!(prompt.contains("Transcript:\nUser: hi\nCoach: hello"));
        assert!(prompt.contains("\"session_score\""));
    }
}
