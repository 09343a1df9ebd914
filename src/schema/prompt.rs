//! Turns outstanding schema fields into an LLM extraction prompt.

use crate::schema::catalog::{field, field_summary, SCHEMA_CATALOG};
use crate::types::MetadataPromptStyle;

/// Builds the system/extraction prompt the Conversation Agent sends to the
/// LLM when it needs structured metadata pulled out of free-form user text.
/// `missing` is the list of catalog field names still outstanding.
#[must_use]
pub fn generate_llm_extraction_prompt(missing: &[&str], style: MetadataPromptStyle) -> String {
    if missing.is_empty() {
        return "All required metadata has been collected; do not ask for more fields."
            .to_string();
    }

    let targeted: Vec<&str> = match style {
        MetadataPromptStyle::AskOneAtATime => missing.iter().take(1).copied().collect(),
        MetadataPromptStyle::AskAll => missing.to_vec(),
    };

    let mut prompt = String::from(
        "Extract the following NWB/DANDI metadata fields from the user's message. \
         Return a JSON object mapping each field name to its extracted value, omitting \
         fields the user did not mention. Ask a natural follow-up question for any field \
         still missing afterward.\n\nFields:\n",
    );

    for name in &targeted {
        if let Some(summary) = field_summary(name) {
            prompt.push_str(&format!(
                "- {name} ({display_name}, {level:?}): {why_needed} Example: \"{example}\"\n",
                name = name,
                display_name = summary.display_name,
                level = summary.requirement_level,
                why_needed = summary.why_needed,
                example = summary.example,
            ));
            if let Some(def) = field(name) {
                if !def.normalization_rules.is_empty() {
                    let rules: Vec<String> = def
                        .normalization_rules
                        .iter()
                        .map(|(raw, canonical)| format!("\"{raw}\" -> \"{canonical}\""))
                        .collect();
                    prompt.push_str(&format!("  Normalize as: {}\n", rules.join(", ")));
                }
            }
        }
    }

    prompt.push_str(
        "\nRespond with exactly this JSON shape: {\"extracted_metadata\": {<field>: <value>, ...}, \
         \"needs_more_info\": <bool>, \"follow_up_message\": <string>, \"ready_to_proceed\": <bool>, \
         \"confidence\": <0-100>}.\n",
    );
    prompt.push_str(FEW_SHOT_EXAMPLES);

    prompt
}

/// Four worked examples covering minimal input, rich context, partial
/// info, and ambiguity (§4.1 op. 1's required few-shot coverage).
const FEW_SHOT_EXAMPLES: &str = r#"
Examples:

1. Minimal input.
User: "mouse"
Response: {"extracted_metadata": {"subject_species": "Mus musculus"}, "needs_more_info": true, "follow_up_message": "Got it — a mouse. Could you also tell me the subject ID, session description, and start time?", "ready_to_proceed": false, "confidence": 70}

2. Rich context.
User: "Dr Jane Doe recorded a 30-minute visual cortex session from mouse042 (a male C57BL/6 mouse, P60) at MIT on 2024-03-14 at 9:30am"
Response: {"extracted_metadata": {"experimenter": "Doe, Jane", "subject_id": "mouse042", "subject_species": "Mus musculus", "subject_sex": "M", "subject_age": "P60D", "institution": "Massachusetts Institute of Technology", "session_start_time": "2024-03-14T09:30:00Z", "session_description": "30-minute visual cortex recording"}, "needs_more_info": false, "follow_up_message": "That covers everything required — ready to convert whenever you are.", "ready_to_proceed": true, "confidence": 92}

3. Partial info.
User: "it's for the Smith lab, session ID is mouse042_session03"
Response: {"extracted_metadata": {"lab": "Smith Lab", "identifier": "mouse042_session03"}, "needs_more_info": true, "follow_up_message": "Thanks — I still need the subject ID, species, and session start time.", "ready_to_proceed": false, "confidence": 85}

4. Ambiguity.
User: "it was last week sometime, a rat I think"
Response: {"extracted_metadata": {"subject_species": "Rattus norvegicus"}, "needs_more_info": true, "follow_up_message": "Could you give me the exact session start date and time? \"Last week\" isn't precise enough for the file's timestamp.", "ready_to_proceed": false, "confidence": 40}
"#;

/// Human-readable summary line for every catalogued field, keyed by
/// requirement level. Used by the Conversation Agent's "what's left"
/// status responses (§6).
#[must_use]
pub fn field_overview() -> String {
    let mut lines = Vec::with_capacity(SCHEMA_CATALOG.len());
    for f in SCHEMA_CATALOG {
        lines.push(format!(
            "{} [{:?}] - {}",
            f.display_name, f.requirement_level, f.why_needed
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_missing_list_produces_closing_prompt() {
        let prompt = generate_llm_extraction_prompt(&[], MetadataPromptStyle::AskAll);
        assert!(prompt.contains("do not ask"));
    }

    #[test]
    fn ask_one_at_a_time_only_includes_first_field() {
        let missing = ["institution", "lab"];
        let prompt = generate_llm_extraction_prompt(&missing, MetadataPromptStyle::AskOneAtATime);
        assert!(prompt.contains("Institution"));
        assert!(!prompt.contains("Lab name"));
    }

    #[test]
    fn prompt_carries_all_four_few_shot_examples() {
        let prompt = generate_llm_extraction_prompt(&["institution"], MetadataPromptStyle::AskAll);
        assert!(prompt.contains("Minimal input"));
        assert!(prompt.contains("Rich context"));
        assert!(prompt.contains("Partial info"));
        assert!(prompt.contains("Ambiguity"));
    }

    #[test]
    fn prompt_surfaces_normalization_rules_for_fields_that_declare_them() {
        let prompt = generate_llm_extraction_prompt(&["subject_sex"], MetadataPromptStyle::AskAll);
        assert!(prompt.contains("\"male\" -> \"M\""));
    }

    #[test]
    fn ask_all_missing_includes_every_field() {
        let missing = ["institution", "lab"];
        let prompt = generate_llm_extraction_prompt(&missing, MetadataPromptStyle::AskAll);
        assert!(prompt.contains("Institution"));
        assert!(prompt.contains("Lab name"));
    }
}
