//! Entry points that send a prompt and a table to the query engine.
//!
//! `query_data` propagates engine failures to the caller. `ai_analysis` is
//! used where one failing chart must not stop the rest of a page, so it folds
//! failures into [`AnalysisOutcome::Failed`] instead.

use crate::columns::ColumnMapping;
use crate::context::{build_dynamic_context, build_static_prompt, ContextExtras};
use crate::error::Result;
use crate::llm::TabularQueryEngine;
use crate::prompts::{chart_prompt, full_analysis_context, full_analysis_prompt, ChartData};
use polars::prelude::DataFrame;
use tracing::{error, info, warn};

const FULL_ANALYSIS_PRE_PROMPT: &str = "Full grant data analysis";

/// Escapes the currency sign so markdown renderers don't treat it as math.
pub fn escape_currency(text: &str) -> String {
    text.replace('$', "\\$")
}

pub fn compose_query_prompt(pre_prompt: &str, dynamic_context: &str, query_text: &str) -> String {
    format!(
        "{}\n\nCurrent Context:\n{}\n\nUser Query: {}",
        pre_prompt, dynamic_context, query_text
    )
}

pub fn compose_analysis_prompt(pre_prompt: &str, dynamic_context: &str, query_text: &str) -> String {
    format!(
        "Static Context:\n{}\n\nDynamic Context:\n{}\n\nQuery: {}\n\n\
         Please provide a detailed analysis based on the given context and query.\n\
         Include relevant statistics and insights from the data.",
        pre_prompt, dynamic_context, query_text
    )
}

/// Ask the engine a question about `table`.
///
/// Returns `Ok(None)` when the engine produced nothing; engine errors
/// propagate unchanged.
pub async fn query_data(
    engine: &dyn TabularQueryEngine,
    table: &DataFrame,
    query_text: &str,
    pre_prompt: &str,
    dynamic_context: &str,
) -> Result<Option<String>> {
    let prompt = compose_query_prompt(pre_prompt, dynamic_context, query_text);
    info!("Querying engine over {} rows", table.height());

    match engine.query(table, &prompt).await? {
        Some(response) if !response.is_empty() => Ok(Some(escape_currency(&response))),
        _ => {
            warn!("No response generated from the query engine.");
            Ok(None)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisOutcome {
    Text(String),
    Empty,
    Failed(String),
    /// No credential was supplied for this session.
    Disabled,
    /// The chart's figures or prompts could not be built.
    Unavailable(String),
}

impl AnalysisOutcome {
    pub fn text(&self) -> Option<&str> {
        match self {
            AnalysisOutcome::Text(text) => Some(text),
            _ => None,
        }
    }

    /// What a view should show in place of the narrative.
    pub fn display(&self) -> String {
        match self {
            AnalysisOutcome::Text(text) => text.clone(),
            AnalysisOutcome::Empty => "No analysis was generated for this view.".to_string(),
            AnalysisOutcome::Failed(message) => format!("An error occurred during AI analysis: {}", message),
            AnalysisOutcome::Disabled => {
                "AI analysis is disabled. Provide an API key to enable it.".to_string()
            }
            AnalysisOutcome::Unavailable(message) => {
                format!("This chart could not be prepared: {}", message)
            }
        }
    }
}

pub async fn ai_analysis(
    engine: Option<&dyn TabularQueryEngine>,
    table: &DataFrame,
    query_text: &str,
    pre_prompt: &str,
    dynamic_context: &str,
) -> AnalysisOutcome {
    let Some(engine) = engine else {
        return AnalysisOutcome::Disabled;
    };

    let prompt = compose_analysis_prompt(pre_prompt, dynamic_context, query_text);
    match engine.query(table, &prompt).await {
        Ok(Some(response)) if !response.is_empty() => AnalysisOutcome::Text(escape_currency(&response)),
        Ok(_) => {
            warn!("No response generated from the query engine.");
            AnalysisOutcome::Empty
        }
        Err(e) => {
            error!("AI analysis failed: {}", e);
            AnalysisOutcome::Failed(e.to_string())
        }
    }
}

/// Static prompt, dynamic context and chart prompt for one chart, then
/// [`ai_analysis`]. Fails only when the prompts cannot be built.
pub async fn analyze_chart(
    engine: Option<&dyn TabularQueryEngine>,
    table: &DataFrame,
    chart: &ChartData,
    role: &str,
    project_theme: Option<&str>,
    interactions: &[String],
) -> Result<AnalysisOutcome> {
    let page = chart.page();
    let analysis_type = chart.analysis_type();

    let pre_prompt = build_static_prompt(
        table,
        chart.chart_type(),
        role,
        &page.additional_context(&analysis_type),
    )?;
    let mut extras = ContextExtras::default();
    if let Some(theme) = project_theme {
        extras = extras.with_project_theme(theme);
    }
    let extras = extras.with_analysis_type(analysis_type);
    let dynamic = build_dynamic_context(
        table,
        page.title(),
        chart.chart_type(),
        &chart.filters(),
        interactions,
        Some(&extras),
    )?;

    Ok(ai_analysis(engine, table, &chart_prompt(chart, project_theme), &pre_prompt, &dynamic).await)
}

/// Analyses each `(title, chart)` in order. A chart whose figures or prompts
/// fail becomes [`AnalysisOutcome::Unavailable`] and the rest still run.
pub async fn analyze_charts<'a, I>(
    engine: Option<&dyn TabularQueryEngine>,
    table: &DataFrame,
    charts: I,
    role: &str,
    project_theme: Option<&str>,
    interactions: &[String],
) -> Vec<(String, AnalysisOutcome)>
where
    I: IntoIterator<Item = (&'a str, Result<ChartData>)>,
{
    let mut results = Vec::new();
    for (title, chart) in charts {
        let outcome = match chart {
            Ok(chart) => {
                match analyze_chart(engine, table, &chart, role, project_theme, interactions).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        warn!("Skipping analysis of {}: {}", title, e);
                        AnalysisOutcome::Unavailable(e.to_string())
                    }
                }
            }
            Err(e) => {
                warn!("Could not derive {}: {}", title, e);
                AnalysisOutcome::Unavailable(e.to_string())
            }
        };
        results.push((title.to_string(), outcome));
    }
    results
}

/// Whole-dataset report for a project theme.
pub async fn full_analysis(
    engine: &dyn TabularQueryEngine,
    table: &DataFrame,
    mapping: &ColumnMapping,
    project_theme: &str,
) -> Result<Option<String>> {
    let context = full_analysis_context(table, mapping)?;
    let prompt = full_analysis_prompt(project_theme);
    query_data(engine, table, &prompt, FULL_ANALYSIS_PRE_PROMPT, &context).await
}
