use serde::{Deserialize, Serialize};

/// A reusable prompt shaping how the summarization endpoint writes its
/// output. The instruction travels verbatim with the start request and with
/// every summarization call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryTemplate {
    pub id: String,
    pub name: String,
    pub instruction: String,
}

impl SummaryTemplate {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        instruction: impl Into<String>,
    ) -> Self {
        SummaryTemplate {
            id: id.into(),
            name: name.into(),
            instruction: instruction.into(),
        }
    }
}

/// The built-in template set. Template management UIs are out of scope, so
/// these ship compiled in.
pub fn default_templates() -> Vec<SummaryTemplate> {
    vec![
        SummaryTemplate::new(
            "study",
            "Study notes",
            "Turn the transcript into structured study notes. Group related \
             material under markdown headings, define key concepts when they \
             first appear, and keep worked examples next to the ideas they \
             illustrate. Close with a short list of takeaways.",
        ),
        SummaryTemplate::new(
            "summary",
            "Concise summary",
            "Write a concise summary of the transcript in a few paragraphs. \
             Capture the core argument and the main supporting points; leave \
             out asides, filler and repetition.",
        ),
        SummaryTemplate::new(
            "detail",
            "Detailed record",
            "Produce a detailed, faithful record of the transcript. Follow \
             the original order of the material, keep concrete figures, names \
             and claims intact, and mark clearly where the speaker is quoting \
             someone else.",
        ),
        SummaryTemplate::new(
            "qa",
            "Q&A extraction",
            "Extract the questions raised in the transcript together with the \
             answers given. Format each pair as a markdown heading for the \
             question followed by the answer. Note explicitly when a question \
             is left unanswered.",
        ),
        SummaryTemplate::new(
            "mindmap",
            "Mind map outline",
            "Reduce the transcript to a hierarchical outline suitable for a \
             mind map: a single root topic, main branches for the major \
             themes, and short leaf entries of at most a few words each. Use \
             nested markdown lists.",
        ),
    ]
}

/// Look up a built-in template by id.
pub fn find_template(id: &str) -> Option<SummaryTemplate> {
    default_templates().into_iter().find(|t| t.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_in_templates_have_unique_ids_and_instructions() {
        let templates = default_templates();
        assert!(!templates.is_empty());
        for template in &templates {
            assert!(!template.instruction.trim().is_empty(), "{}", template.id);
        }
        let mut ids: Vec<&str> = templates.iter().map(|t| t.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), templates.len(), "template ids must be unique");
    }

    #[test]
    fn find_template_matches_by_id() {
        assert_eq!(find_template("summary").map(|t| t.name), Some("Concise summary".to_string()));
        assert!(find_template("nope").is_none());
    }
}
