//! Prompts sent to the reasoning service.
//!
//! Bump a version whenever its prompt or the target schema changes; the
//! version is part of the cache key, so stale results are recomputed.

use cutmirror_gateway::{ClipAssessment, StructuredOutput};
use cutmirror_models::{AdvisorHints, Blueprint, Critique, Edl, LibrarySummary};

pub const REFERENCE_PROMPT_VERSION: u32 = 3;
pub const CLIP_PROMPT_VERSION: u32 = 2;
pub const PLAN_PROMPT_VERSION: u32 = 2;
pub const REFLECTION_PROMPT_VERSION: u32 = 1;

/// Reference analysis, with detected scene cuts as anchor hints.
pub fn reference_prompt(duration: f64, scene_cuts: &[f64]) -> String {
    let cuts = if scene_cuts.is_empty() {
        "none detected".to_string()
    } else {
        scene_cuts.iter().map(|t| format!("{:.2}", t)).collect::<Vec<_>>().join(", ")
    };

    format!(
        r#"You are an expert film editor. Break the attached reference video into its editorial structure.

The video is {duration:.2} seconds long. Physical scene cuts were detected at: {cuts}.

For every segment give start/end in seconds, its energy (low, medium, high), motion,
vibe tags, arc stage (intro, build_up, peak, outro), hold type and a one-line reasoning.
Segments must be contiguous, ordered, start at 0 and end at {duration:.2}.
Also describe the editing style, emotional intent, narrative message and which content
categories the edit must have, should have and must avoid.

Return ONLY a single JSON object matching this schema:
{schema}"#,
        schema = Blueprint::schema_json(),
    )
}

pub fn clip_prompt(duration: f64) -> String {
    format!(
        r#"You are cataloguing raw footage for an editor. Classify the attached clip ({duration:.2} seconds).

Give its overall energy and motion, vibe tags, narrative roles, content categories,
visible subjects and a technical quality score between 0 and 1.
For each energy tier the clip can supply, give the single best moment as start/end
seconds inside the clip with a short reason.

Return ONLY a single JSON object matching this schema:
{schema}"#,
        schema = ClipAssessment::schema_json(),
    )
}

pub fn plan_prompt(blueprint: &Blueprint, library: &LibrarySummary) -> String {
    let blueprint_json = serde_json::to_string(blueprint).unwrap_or_default();
    let library_json = serde_json::to_string(library).unwrap_or_default();

    format!(
        r#"You are advising an automatic editor that will rebuild the structure below from a clip library.

REFERENCE STRUCTURE:
{blueprint_json}

CLIP LIBRARY:
{library_json}

For each arc stage list the clip ids that suit it best. Assess the library's strengths,
gaps and your confidence that it can reproduce the reference. Only suggest scoring
overrides when the library clearly needs them. Only use clip ids from the library.

Return ONLY a single JSON object matching this schema:
{schema}"#,
        schema = AdvisorHints::schema_json(),
    )
}

pub fn reflection_prompt(blueprint: &Blueprint, edl: &Edl) -> String {
    let blueprint_json = serde_json::to_string(blueprint).unwrap_or_default();
    let edl_json = serde_json::to_string(&edl.decisions).unwrap_or_default();

    format!(
        r#"The attached video was edited automatically to mirror a reference structure.

REFERENCE STRUCTURE:
{blueprint_json}

EDIT DECISIONS:
{edl_json}

Score how faithfully the edit reproduces the reference (0 to 1), how well cuts land on
the rhythm (0 to 1) and give concrete suggestions per segment index.

Return ONLY a single JSON object matching this schema:
{schema}"#,
        schema = Critique::schema_json(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_prompt_lists_scene_cuts() {
        let prompt = reference_prompt(6.5, &[2.0, 5.0]);
        assert!(prompt.contains("2.00, 5.00"));
        assert!(prompt.contains("\"segments\""));

        let prompt = reference_prompt(6.5, &[]);
        assert!(prompt.contains("none detected"));
    }

    #[test]
    fn test_plan_prompt_embeds_library() {
        let library = LibrarySummary { clips: Vec::new() };
        let prompt = plan_prompt(&Blueprint::linear_arc(8.0, &[]), &library);
        assert!(prompt.contains("CLIP LIBRARY"));
        assert!(prompt.contains("arc_stage_clips"));
    }
}
