use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use grantscope::columns::{
    resolve, resolve_column, ColumnMapping, DEFAULT_COLUMNS, GRANT_POPULATION_TRAN,
    GRANT_STRATEGY_TRAN, GRANT_SUBJECT_TRAN,
};
use grantscope::context::{build_dynamic_context, build_static_prompt, ContextExtras};
use grantscope::data_utils::{filter_eq, top_values};
use grantscope::export::{top_category_workbook, write_csv, write_workbook};
use grantscope::llm::TabularQueryEngine;
use grantscope::preprocess::AMOUNT_CLUSTERS;
use grantscope::prompts::{distribution_analysis_prompt, ChartData};
use grantscope::query::{ai_analysis, analyze_charts, full_analysis, query_data, AnalysisOutcome};
use grantscope::summary::{self, format_currency, format_large_number, AmountWindow, ALL_CLUSTERS};
use grantscope::{AppConfig, Session};
use polars::prelude::DataFrame;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "grantscope")]
#[command(about = "Explore philanthropic grant datasets with summaries, exports and AI analysis")]
struct Cli {
    /// OpenAI API key (or set OPENAI_API_KEY env var)
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Model name (or set OPENAI_MODEL env var)
    #[arg(long, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print summary metrics for a grants file
    Summary {
        file: PathBuf,
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// Write both tables and a top-category workbook as CSV
    Export {
        file: PathBuf,
        #[arg(short, long, default_value = "grantscope-export")]
        out: PathBuf,
        #[arg(long, default_value_t = 10)]
        top: usize,
        /// Column whose top values get their own sheets
        #[arg(long, default_value = GRANT_SUBJECT_TRAN)]
        category: String,
    },
    /// Ask a question about the dataset
    Ask {
        file: PathBuf,
        question: String,
        #[arg(long, default_value = "Data Summary")]
        chart: String,
        #[arg(long, default_value = "Grant Analyst/Writer")]
        role: String,
        #[arg(long)]
        theme: Option<String>,
        /// Column filter applied before asking, as COLUMN=VALUE
        #[arg(long = "filter", value_parser = parse_key_val)]
        filters: Vec<(String, String)>,
    },
    /// Run the per-chart AI analyses of the dashboard pages
    Analyze {
        file: PathBuf,
        #[arg(long)]
        theme: Option<String>,
        #[arg(long, default_value = "Grant Analyst/Writer")]
        role: String,
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// Generate a full analysis report for a project theme
    Report {
        file: PathBuf,
        #[arg(long)]
        theme: String,
    },
}

fn parse_key_val(raw: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("invalid filter '{}': expected COLUMN=VALUE", raw))?;
    Ok((key.trim().to_string(), value.trim().to_string()))
}

fn print_analyses(results: &[(String, AnalysisOutcome)]) {
    for (title, outcome) in results {
        println!("## {}\n\n{}\n", title, outcome.display());
    }
}

/// Page charts of the heatmap, scatter, treemap and relationships pages with
/// their default selections: the top subjects and populations, the full year
/// and amount range, every cluster, and the largest funder and block.
fn page_charts(
    grouped: &DataFrame,
    mapping: &ColumnMapping,
    top: usize,
) -> Vec<(&'static str, grantscope::Result<ChartData>)> {
    type Chart = grantscope::Result<ChartData>;

    let heatmap = || -> Chart {
        let (subject, population) = (mapping.get(GRANT_SUBJECT_TRAN)?, mapping.get(GRANT_POPULATION_TRAN)?);
        let subjects: Vec<String> = top_values(grouped, subject, top)?.into_iter().map(|(v, _)| v).collect();
        let populations: Vec<String> = top_values(grouped, population, top)?.into_iter().map(|(v, _)| v).collect();
        ChartData::heatmap(grouped, mapping, subject, &subjects, population, &populations)
    };
    let combinations = || -> Chart {
        let (subject, population) = (mapping.get(GRANT_SUBJECT_TRAN)?, mapping.get(GRANT_POPULATION_TRAN)?);
        ChartData::top_combinations(grouped, mapping, subject, population, top)
    };
    let amount_trend = || -> Chart {
        ChartData::amount_trend(grouped, mapping, AmountWindow::covering(grouped, mapping)?)
    };
    let density = || -> Chart {
        ChartData::cluster_density(grouped, mapping, AmountWindow::covering(grouped, mapping)?)
    };
    let over_time = || -> Chart {
        let window = AmountWindow::covering(grouped, mapping)?;
        ChartData::categories_over_time(grouped, mapping, window, mapping.get(GRANT_SUBJECT_TRAN)?)
    };
    let treemap = || -> Chart {
        ChartData::treemap(grouped, mapping, mapping.get(GRANT_SUBJECT_TRAN)?, ALL_CLUSTERS)
    };
    let block = || -> Chart {
        let subject = mapping.get(GRANT_SUBJECT_TRAN)?;
        let largest = summary::treemap_totals(grouped, mapping, subject, ALL_CLUSTERS)?
            .pop()
            .map(|total| total.category)
            .unwrap_or_default();
        ChartData::block(grouped, mapping, subject, &largest)
    };
    let averages = || -> Chart {
        ChartData::factor_averages(grouped, mapping, mapping.get(GRANT_STRATEGY_TRAN)?)
    };
    let affinity = || -> Chart {
        let funder = summary::top_funders(grouped, mapping, 1)?
            .into_iter()
            .next()
            .map(|total| total.category)
            .unwrap_or_default();
        ChartData::funder_affinity(grouped, mapping, &funder, mapping.get(GRANT_SUBJECT_TRAN)?)
    };

    vec![
        ("grant_amount_heatmap", heatmap()),
        ("top_combinations_chart", combinations()),
        ("grant_amount_scatter_plot", amount_trend()),
        ("cluster_density_chart", density()),
        ("categories_over_time_chart", over_time()),
        ("treemap", treemap()),
        ("treemap_block_insights", block()),
        ("award_amount_chart", averages()),
        ("funder_affinity_chart", affinity()),
    ]
}

/// Query, static prompt and dynamic context of the distribution page.
fn distribution_inputs(
    grouped: &DataFrame,
    mapping: &ColumnMapping,
    role: &str,
    clusters: &[String],
    theme: Option<&str>,
    history: &[String],
) -> grantscope::Result<(String, String, String)> {
    let pre_prompt = build_static_prompt(grouped, "Grant Amount Distribution", role, "amount clusters")?;
    let filters = vec![("Selected Clusters".to_string(), clusters.join(", "))];
    let mut extras = ContextExtras::default();
    if let Some(theme) = theme {
        extras = extras.with_project_theme(theme);
    }
    let dynamic = build_dynamic_context(
        grouped,
        "Grant Amount Distribution",
        "Cluster Comparison",
        &filters,
        history,
        Some(&extras),
    )?;
    let totals = summary::summary_metrics(grouped, mapping)?;
    let prompt = distribution_analysis_prompt(totals.total_grants, totals.total_amount, clusters);
    Ok((prompt, pre_prompt, dynamic))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("GRANTSCOPE_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    let mut config = AppConfig::from_env()?;
    if let Some(key) = cli.api_key {
        config.api_key = Some(key);
    }
    if let Some(model) = cli.model {
        config.model = model;
    }

    let mut session = Session::new(config.api_key.clone());
    let clusters: Vec<String> = AMOUNT_CLUSTERS
        .iter()
        .map(|(_, label)| label.to_string())
        .collect();

    match cli.command {
        Command::Summary { file, top } => {
            let tables = session.load_tables(Some(&file), None)?;
            let analysis = &tables.analysis;
            let mapping = resolve(analysis, DEFAULT_COLUMNS)?;

            let metrics = summary::summary_metrics(analysis, &mapping)?;
            println!("Total grants:      {}", metrics.total_grants);
            println!(
                "Total amount:      {} ({})",
                format_currency(metrics.total_amount),
                format_large_number(metrics.total_amount)
            );
            println!("Unique funders:    {}", metrics.unique_funders);
            println!("Unique recipients: {}", metrics.unique_recipients);

            println!("\nTop {} funders:", top);
            for funder in summary::top_funders(analysis, &mapping, top)? {
                println!("  {:<40} {}", funder.category, format_currency(funder.total_amount));
            }

            println!("\nFunder types:");
            for share in summary::funder_type_distribution(analysis, &mapping)? {
                println!("  {:<40} {:>6.2}%", share.funder_type, share.percentage);
            }

            println!("\nAmount clusters:");
            for stats in summary::cluster_statistics(&tables.grouped, &mapping, &clusters)? {
                println!(
                    "  {:<12} {:>8} grants  {}",
                    stats.cluster,
                    stats.grant_count,
                    format_currency(stats.total_amount)
                );
            }

            let words = summary::description_word_frequencies(analysis, &mapping, top)?;
            println!(
                "\nTop description words: {}",
                words
                    .iter()
                    .map(|(word, count)| format!("{} ({})", word, count))
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        Command::Export { file, out, top, category } => {
            let tables = session.load_tables(Some(&file), None)?;
            std::fs::create_dir_all(&out)
                .with_context(|| format!("creating {}", out.display()))?;

            for (name, table) in [("analysis.csv", &tables.analysis), ("grouped.csv", &tables.grouped)] {
                let path = out.join(name);
                let file = std::fs::File::create(&path)
                    .with_context(|| format!("creating {}", path.display()))?;
                write_csv(table, file)?;
                info!("Wrote {} rows to {}", table.height(), path.display());
            }

            let mapping = resolve(&tables.analysis, DEFAULT_COLUMNS)?;
            let category_column = resolve_column(&tables.analysis, &category)?;
            let workbook = top_category_workbook(&tables.analysis, &mapping, &category_column, top)?;
            let written = write_workbook(&out.join("top_categories"), &workbook)?;
            println!("Exported {} files to {}", written.len() + 2, out.display());
        }
        Command::Ask { file, question, chart, role, theme, filters } => {
            let tables = session.load_tables(Some(&file), None)?;
            let mut view = tables.analysis;
            for (key, value) in &filters {
                match resolve_column(&view, key) {
                    Ok(column) => view = filter_eq(&view, &column, value)?,
                    Err(e) => warn!("Filter {} is not a column, passing it as context only: {}", key, e),
                }
            }

            let engine = session
                .engine(&config)
                .ok_or_else(|| anyhow!("AI features are disabled: set OPENAI_API_KEY or pass --api-key"))?;

            if let Some(theme) = theme {
                session = session.with_project_theme(theme);
            }
            let mut extras = ContextExtras::default();
            if let Some(theme) = &session.project_theme {
                extras = extras.with_project_theme(theme.clone());
            }

            let pre_prompt = build_static_prompt(&view, &chart, &role, "the selected filters")?;
            let dynamic = build_dynamic_context(
                &view,
                "Ask",
                &chart,
                &filters,
                &session.interactions.entries(),
                Some(&extras),
            )?;

            match query_data(&engine, &view, &question, &pre_prompt, &dynamic).await? {
                Some(answer) => println!("{}", answer),
                None => println!("No response generated from the query engine."),
            }
        }
        Command::Analyze { file, theme, role, top } => {
            let tables = session.load_tables(Some(&file), None)?;
            let analysis = &tables.analysis;
            let grouped = &tables.grouped;
            let mapping = resolve(analysis, DEFAULT_COLUMNS)?;
            let engine = session.engine(&config);
            let engine = engine.as_ref().map(|e| e as &dyn TabularQueryEngine);
            let history = session.interactions.entries();

            let summary_charts = vec![
                ("data_summary_metrics", ChartData::summary(analysis, &mapping)),
                ("top_funders_chart", ChartData::top_funders(analysis, &mapping, top)),
                ("funder_type_pie_chart", ChartData::funder_types(analysis, &mapping)),
                ("subject_area_chart", ChartData::subject_areas(analysis, &mapping, top)),
                ("time_series_chart", ChartData::time_series(analysis, &mapping)),
                ("network_graph", ChartData::network(analysis, &mapping)),
            ];
            let results = analyze_charts(engine, analysis, summary_charts, &role, theme.as_deref(), &history).await;
            print_analyses(&results);

            let grouped_mapping = resolve(grouped, DEFAULT_COLUMNS)?;
            let results = analyze_charts(
                engine,
                grouped,
                page_charts(grouped, &grouped_mapping, top),
                &role,
                theme.as_deref(),
                &history,
            )
            .await;
            print_analyses(&results);

            let outcome = match distribution_inputs(grouped, &mapping, &role, &clusters, theme.as_deref(), &history) {
                Ok((prompt, pre_prompt, dynamic)) => {
                    ai_analysis(engine, grouped, &prompt, &pre_prompt, &dynamic).await
                }
                Err(e) => {
                    warn!("Could not prepare the distribution analysis: {}", e);
                    AnalysisOutcome::Unavailable(e.to_string())
                }
            };
            println!("## grant_amount_distribution\n\n{}", outcome.display());
        }
        Command::Report { file, theme } => {
            let tables = session.load_tables(Some(&file), None)?;
            let mapping = resolve(&tables.analysis, DEFAULT_COLUMNS)?;
            let engine = session
                .engine(&config)
                .ok_or_else(|| anyhow!("AI features are disabled: set OPENAI_API_KEY or pass --api-key"))?;

            match full_analysis(&engine, &tables.analysis, &mapping, &theme).await? {
                Some(report) => println!("{}", report),
                None => println!("No response generated from the query engine."),
            }
        }
    }

    Ok(())
}
