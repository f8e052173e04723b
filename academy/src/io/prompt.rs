//! Advisor prompt rendering.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::debug;

use crate::core::advisor::AdvisoryQuery;
use crate::io::generator::GenerationRequest;

const ADVISOR_TEMPLATE: &str = include_str!("prompts/advisor.md");

#[derive(Debug, Clone, Serialize)]
struct MissionContext {
    id: String,
    title: String,
    description: String,
}

/// Build the generation request for a free-text advisor query.
pub fn render_advisor_request(query: &AdvisoryQuery) -> Result<GenerationRequest> {
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.add_template("advisor", ADVISOR_TEMPLATE)
        .context("load advisor template")?;

    let knowledge = query.knowledge();
    let mission = query.mission.as_ref().map(|brief| MissionContext {
        id: brief.id.to_string(),
        title: brief.title.clone(),
        description: brief.description.clone(),
    });
    let mission_context = query
        .mission
        .as_ref()
        .map(|brief| format!("{}: {}", brief.id, brief.title))
        .unwrap_or_else(|| "base: Training Mode".to_string());

    let template = env.get_template("advisor")?;
    let rendered = template
        .render(context! {
            mission => mission,
            topic_title => knowledge.title,
            explanation => knowledge.simple_explanation,
            hint => knowledge.hint,
            question => query.question.trim(),
        })
        .context("render advisor prompt")?;

    let prompt = strip_section_markers(&rendered);
    debug!(
        bytes = prompt.len(),
        topic = query.ticket.topic.as_str(),
        "rendered advisor prompt"
    );
    Ok(GenerationRequest {
        prompt,
        mission_context,
    })
}

/// Drop `<!-- section:... -->` marker lines and collapse blank runs.
fn strip_section_markers(rendered: &str) -> String {
    let mut out = String::with_capacity(rendered.len());
    let mut blank_run = 0usize;
    for line in rendered.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("<!--") && trimmed.ends_with("-->") {
            continue;
        }
        if trimmed.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::advisor::{MissionBrief, QueryTicket};
    use crate::core::knowledge::Topic;
    use crate::core::types::MissionId;

    fn query(mission: Option<MissionBrief>, topic: Topic) -> AdvisoryQuery {
        AdvisoryQuery {
            ticket: QueryTicket {
                id: 1,
                epoch: 0,
                topic,
            },
            question: "  How do I stop the bugs?  ".to_string(),
            mission,
        }
    }

    #[test]
    fn prompt_includes_mission_knowledge_and_question() {
        let brief = MissionBrief {
            id: MissionId::Mitm,
            title: "Mission 2: The Interception".to_string(),
            description: "Stop the forged packets.".to_string(),
        };
        let request = render_advisor_request(&query(Some(brief), Topic::Mitm)).expect("render");

        assert!(request.prompt.contains("- ID: mitm"));
        assert!(request.prompt.contains("Stop the forged packets."));
        assert!(request.prompt.contains(Topic::Mitm.knowledge().hint));
        assert!(request.prompt.ends_with("How do I stop the bugs?"));
        assert!(!request.prompt.contains("section:"));
        assert_eq!(request.mission_context, "mitm: Mission 2: The Interception");
    }

    #[test]
    fn prompt_without_mission_mentions_base() {
        let request = render_advisor_request(&query(None, Topic::General)).expect("render");
        assert!(request.prompt.contains("The agent is at Base"));
        assert_eq!(request.mission_context, "base: Training Mode");
    }

    #[test]
    fn strip_section_markers_collapses_blank_lines() {
        let text = "a\n<!-- section:x -->\n\n\n\nb\n";
        assert_eq!(strip_section_markers(text), "a\n\nb");
    }
}
