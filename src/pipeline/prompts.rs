//! Step Prompt Templates
//!
//! Built-in prompts for the four pipeline steps, with placeholder
//! substitution and PromptVersion overrides. An active PromptVersion for
//! a step replaces the built-in template wholesale; placeholders are
//! substituted either way.
//!
//! Placeholders: `{target_spec}`, `{technical_assets}`,
//! `{existing_hypotheses}`, `{hypothesis_count}`, `{step2_output}`,
//! `{step3_output}`, `{step4_output}`; the regeneration prompt adds
//! `{missing_count}` and `{held_titles}`.

use crate::storage::Database;
use crate::types::{PipelineStep, Result, Run};

/// Step 2: deep-research prompt producing candidate hypotheses.
const RESEARCH_TEMPLATE: &str = "\
You are a technology-commercialization researcher. Using the attached \
target specification and technical assets documents, research the market \
and propose exactly {hypothesis_count} distinct business hypotheses that \
apply the described technology.

For each hypothesis state:
- title: a short name for the opportunity
- trade_off: the key trade-off the technology resolves
- mechanism: how the technology delivers the value
- competitive_moat: why incumbents cannot easily copy it

Do not repeat any of these existing hypotheses:
{existing_hypotheses}

TARGET SPECIFICATION:
{target_spec}

TECHNICAL ASSETS:
{technical_assets}";

/// Step 3: scientific plausibility scoring of the research output.
const SCIENTIFIC_EVALUATION_TEMPLATE: &str = "\
You are a scientific reviewer. Evaluate each hypothesis below for \
scientific plausibility given the technical assets. For each, assign a \
scientific score from 1 (implausible) to 5 (well grounded) with a short \
justification. Keep every hypothesis in your output, in order.

HYPOTHESES:
{step2_output}

TECHNICAL ASSETS:
{technical_assets}";

/// Step 4: strategic-fit audit against the target specification.
const STRATEGIC_AUDIT_TEMPLATE: &str = "\
You are a corporate strategy auditor. For each hypothesis below, assess \
strategic fit with the target specification: assign a strategic level \
(core / adjacent / transformational), a catch-up score from 1 (easily \
caught up) to 5 (durable lead), and a one-line rationale. Keep every \
hypothesis in your output, in order.

SCORED HYPOTHESES:
{step3_output}

TARGET SPECIFICATION:
{target_spec}";

/// Step 5: integration into the fixed tab-separated table.
///
/// The header names are a contract with the output materializer; change
/// them only together with `pipeline::table`.
const INTEGRATION_TEMPLATE: &str = "\
Integrate the evaluations below into one table. Output ONLY \
tab-separated text: a header row, then one row per hypothesis.

The header row must be exactly these nine column names separated by tabs:
title\tindustry\tfield\tsummary\tcustomer problem\tscientific score\tstrategic level\tcatch-up score\ttotal score

Compute total score as your weighted judgment of the scientific score \
and catch-up score. Use plain text in every cell; never use tabs inside \
a cell.

SCIENTIFIC EVALUATION:
{step3_output}

STRATEGIC AUDIT:
{step4_output}";

/// Follow-up prompt when the research pass came up short: asks for only
/// the missing hypotheses, excluding the ones already held.
const REGENERATION_TEMPLATE: &str = "\
You are a technology-commercialization researcher. An earlier research \
pass produced fewer business hypotheses than requested. Propose exactly \
{missing_count} additional distinct business hypotheses that apply the \
described technology.

For each hypothesis state:
- title: a short name for the opportunity
- trade_off: the key trade-off the technology resolves
- mechanism: how the technology delivers the value
- competitive_moat: why incumbents cannot easily copy it

Do not repeat any of these hypotheses already held:
{held_titles}

Do not repeat any of these existing hypotheses either:
{existing_hypotheses}

TARGET SPECIFICATION:
{target_spec}

TECHNICAL ASSETS:
{technical_assets}";

/// Values substituted into a step template.
#[derive(Debug, Default)]
pub struct PromptContext<'a> {
    pub target_spec: &'a str,
    pub technical_assets: &'a str,
    pub existing_hypotheses: &'a str,
    pub hypothesis_count: usize,
    pub step2_output: &'a str,
    pub step3_output: &'a str,
    pub step4_output: &'a str,
}

impl<'a> PromptContext<'a> {
    /// Build the context for a run, pulling prior step outputs from the
    /// persisted run row.
    pub fn for_run(
        run: &'a Run,
        target_spec: &'a str,
        technical_assets: &'a str,
        existing_hypotheses: &'a str,
    ) -> Self {
        Self {
            target_spec,
            technical_assets,
            existing_hypotheses,
            hypothesis_count: run.hypothesis_count,
            step2_output: run.step2_output.as_deref().unwrap_or(""),
            step3_output: run.step3_output.as_deref().unwrap_or(""),
            step4_output: run.step4_output.as_deref().unwrap_or(""),
        }
    }
}

/// The built-in template for a step.
pub fn builtin_template(step: PipelineStep) -> &'static str {
    match step {
        PipelineStep::Research => RESEARCH_TEMPLATE,
        PipelineStep::ScientificEvaluation => SCIENTIFIC_EVALUATION_TEMPLATE,
        PipelineStep::StrategicAudit => STRATEGIC_AUDIT_TEMPLATE,
        PipelineStep::Integration => INTEGRATION_TEMPLATE,
    }
}

/// Resolve the template for a step: the active PromptVersion if one
/// exists, otherwise the built-in.
pub fn resolve_template(db: &Database, step: PipelineStep) -> Result<String> {
    match db.active_prompt(step)? {
        Some(version) => Ok(version.content),
        None => Ok(builtin_template(step).to_string()),
    }
}

/// Build the single-regeneration prompt for a short research batch.
pub fn regeneration_prompt(missing: usize, held_titles: &[String], ctx: &PromptContext<'_>) -> String {
    let held = if held_titles.is_empty() {
        "(none)".to_string()
    } else {
        held_titles
            .iter()
            .enumerate()
            .map(|(i, t)| format!("{}. {}", i + 1, t))
            .collect::<Vec<_>>()
            .join("\n")
    };
    render(REGENERATION_TEMPLATE, ctx)
        .replace("{missing_count}", &missing.to_string())
        .replace("{held_titles}", &held)
}

/// Substitute placeholders into a template.
pub fn render(template: &str, ctx: &PromptContext<'_>) -> String {
    template
        .replace("{target_spec}", ctx.target_spec)
        .replace("{technical_assets}", ctx.technical_assets)
        .replace("{existing_hypotheses}", existing_or_none(ctx))
        .replace("{hypothesis_count}", &ctx.hypothesis_count.to_string())
        .replace("{step2_output}", ctx.step2_output)
        .replace("{step3_output}", ctx.step3_output)
        .replace("{step4_output}", ctx.step4_output)
}

fn existing_or_none<'a>(ctx: &'a PromptContext<'_>) -> &'a str {
    if ctx.existing_hypotheses.trim().is_empty() {
        "(none)"
    } else {
        ctx.existing_hypotheses
    }
}
