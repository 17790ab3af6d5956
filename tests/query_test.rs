mod common;

use async_trait::async_trait;
use common::three_grants;
use grantscope::columns::{resolve, DEFAULT_COLUMNS};
use grantscope::error::{GrantScopeError, Result};
use grantscope::llm::TabularQueryEngine;
use grantscope::loader::load_grants_from_slice;
use grantscope::preprocess::preprocess;
use grantscope::prompts::ChartData;
use grantscope::query::{ai_analysis, analyze_charts, full_analysis, query_data, AnalysisOutcome};
use polars::prelude::*;
use std::sync::Mutex;

/// Replies with a fixed script and remembers the prompts it was sent.
struct ScriptedEngine {
    reply: std::result::Result<Option<String>, String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedEngine {
    fn replying(text: &str) -> Self {
        Self { reply: Ok(Some(text.to_string())), prompts: Mutex::new(Vec::new()) }
    }

    fn silent() -> Self {
        Self { reply: Ok(None), prompts: Mutex::new(Vec::new()) }
    }

    fn failing(message: &str) -> Self {
        Self { reply: Err(message.to_string()), prompts: Mutex::new(Vec::new()) }
    }

    fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl TabularQueryEngine for ScriptedEngine {
    async fn query(&self, _table: &DataFrame, prompt: &str) -> Result<Option<String>> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match &self.reply {
            Ok(reply) => Ok(reply.clone()),
            Err(message) => Err(GrantScopeError::Engine(message.clone())),
        }
    }
}

fn table() -> DataFrame {
    df!["Amount Usd" => [10.0]].unwrap()
}

#[tokio::test]
async fn test_query_data_escapes_currency_and_builds_prompt() {
    let engine = ScriptedEngine::replying("Total is $1,000 across $ signs");
    let answer = query_data(&engine, &table(), "How much?", "PRE", "CTX").await.unwrap();

    assert_eq!(answer.as_deref(), Some("Total is \\$1,000 across \\$ signs"));
    assert_eq!(engine.last_prompt(), "PRE\n\nCurrent Context:\nCTX\n\nUser Query: How much?");
}

#[tokio::test]
async fn test_query_data_empty_response_is_none() {
    let engine = ScriptedEngine::silent();
    assert_eq!(query_data(&engine, &table(), "q", "p", "c").await.unwrap(), None);

    let blank = ScriptedEngine::replying("");
    assert_eq!(query_data(&blank, &table(), "q", "p", "c").await.unwrap(), None);
}

#[tokio::test]
async fn test_query_data_propagates_engine_errors() {
    let engine = ScriptedEngine::failing("rate limited");
    let err = query_data(&engine, &table(), "q", "p", "c").await.unwrap_err();
    assert!(matches!(err, GrantScopeError::Engine(ref m) if m == "rate limited"));
}

#[tokio::test]
async fn test_ai_analysis_outcomes() {
    let ok = ScriptedEngine::replying("Grants cost $5");
    let outcome = ai_analysis(Some(&ok), &table(), "Explain", "STATIC", "DYNAMIC").await;
    assert_eq!(outcome, AnalysisOutcome::Text("Grants cost \\$5".to_string()));
    let prompt = ok.last_prompt();
    assert!(prompt.starts_with("Static Context:\nSTATIC\n\nDynamic Context:\nDYNAMIC\n\nQuery: Explain"));
    assert!(prompt.contains("Include relevant statistics and insights from the data."));

    let failing = ScriptedEngine::failing("timeout");
    let outcome = ai_analysis(Some(&failing), &table(), "Explain", "s", "d").await;
    assert!(matches!(outcome, AnalysisOutcome::Failed(ref m) if m.contains("timeout")));

    let silent = ScriptedEngine::silent();
    assert_eq!(ai_analysis(Some(&silent), &table(), "q", "s", "d").await, AnalysisOutcome::Empty);

    assert_eq!(ai_analysis(None, &table(), "q", "s", "d").await, AnalysisOutcome::Disabled);
}

#[tokio::test]
async fn test_full_analysis_sends_theme_and_stats() {
    let dataset = load_grants_from_slice(&three_grants()).unwrap();
    let analysis = preprocess(&dataset).unwrap().analysis;
    let mapping = resolve(&analysis, DEFAULT_COLUMNS).unwrap();

    let engine = ScriptedEngine::replying("Report");
    let report = full_analysis(&engine, &analysis, &mapping, "after-school arts").await.unwrap();
    assert_eq!(report.as_deref(), Some("Report"));

    let prompt = engine.last_prompt();
    assert!(prompt.starts_with("Full grant data analysis\n\nCurrent Context:\n"));
    assert!(prompt.contains("total_grants: 3"));
    assert!(prompt.contains("year_range: 2019 to 2021"));
    assert!(prompt.contains("after-school arts"));
}

#[tokio::test]
async fn test_failing_chart_does_not_stop_the_page() {
    let dataset = load_grants_from_slice(&three_grants()).unwrap();
    let analysis = preprocess(&dataset).unwrap().analysis;
    let mapping = resolve(&analysis, DEFAULT_COLUMNS).unwrap();
    let engine = ScriptedEngine::replying("Looks healthy");

    let charts = vec![
        ("top_funders_chart", ChartData::top_funders(&analysis, &mapping, 2)),
        (
            "funder_affinity_chart",
            ChartData::funder_affinity(&analysis, &mapping, "Funder A", "No Such Column"),
        ),
        ("network_graph", ChartData::network(&analysis, &mapping)),
    ];
    let results = analyze_charts(Some(&engine), &analysis, charts, "Grant Analyst/Writer", None, &[]).await;

    let titles: Vec<&str> = results.iter().map(|(title, _)| title.as_str()).collect();
    assert_eq!(titles, vec!["top_funders_chart", "funder_affinity_chart", "network_graph"]);
    assert_eq!(results[0].1, AnalysisOutcome::Text("Looks healthy".to_string()));
    assert!(matches!(results[1].1, AnalysisOutcome::Unavailable(_)));
    assert_eq!(results[2].1, AnalysisOutcome::Text("Looks healthy".to_string()));
    assert_eq!(engine.prompts.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_chart_on_table_without_prompt_columns_is_unavailable() {
    let engine = ScriptedEngine::replying("unused");
    let results = analyze_charts(
        Some(&engine),
        &table(),
        vec![("time_series_chart", Ok(ChartData::TimeSeries(vec![])))],
        "Grant Analyst/Writer",
        None,
        &[],
    )
    .await;

    assert!(matches!(results[0].1, AnalysisOutcome::Unavailable(ref m) if m.contains("Funder Name")));
    assert!(engine.prompts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_page_chart_prompt_reaches_engine() {
    let dataset = load_grants_from_slice(&three_grants()).unwrap();
    let grouped = preprocess(&dataset).unwrap().grouped;
    let mapping = resolve(&grouped, DEFAULT_COLUMNS).unwrap();
    let engine = ScriptedEngine::replying("ok");

    let chart = ChartData::factor_averages(&grouped, &mapping, "Funder Name");
    let results = analyze_charts(
        Some(&engine),
        &grouped,
        vec![("award_amount_chart", chart)],
        "Grant Analyst/Writer",
        Some("arts access"),
        &["asked about funders".to_string()],
    )
    .await;

    assert_eq!(results[0].1, AnalysisOutcome::Text("ok".to_string()));
    let prompt = engine.last_prompt();
    assert!(prompt.contains("the bar chart of award amount by Funder Name for general analysis of relationships"));
    assert!(prompt.contains("The user is currently on the General Analysis of Relationships page"));
    assert!(prompt.contains("selected_factor: Funder Name"));
    assert!(prompt.contains(
        "Query: Analyze the bar chart of award amount by Funder Name for the general analysis of relationships."
    ));
    assert!(prompt.contains("Consider the project theme: arts access"));
}
