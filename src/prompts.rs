//! Analysis prompts for individual charts and the full-dataset report.

use crate::columns::ColumnMapping;
use crate::data_utils::filter_eq;
use crate::error::Result;
use crate::summary::{
    self, format_currency, AmountWindow, BlockInsights, CategoryTotal, CombinationTotal,
    FunderTypeShare, NetworkStats, SummaryMetrics, YearCategoryTotal, YearClusterCount, YearMean,
    YearTotal,
};
use itertools::Itertools;
use polars::prelude::DataFrame;

const GROUNDING_INSTRUCTION: &str = "
Provide insights, trends, and implications based ONLY on the data provided.
Do not give generic advice that isn't supported by the data.
If the project theme is provided, relate your analysis to the theme where relevant.";

/// Dashboard page a chart is analysed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisPage {
    DataSummary,
    Heatmap,
    ScatterPlot,
    Treemaps,
    Relationships,
}

impl AnalysisPage {
    pub fn title(&self) -> &'static str {
        match self {
            AnalysisPage::DataSummary => "Data Summary",
            AnalysisPage::Heatmap => "Grant Amount Heatmap",
            AnalysisPage::ScatterPlot => "Grant Amount Scatter Plot",
            AnalysisPage::Treemaps => "Treemaps Extended Analysis",
            AnalysisPage::Relationships => "General Analysis of Relationships",
        }
    }

    fn focus(&self) -> &'static str {
        match self {
            AnalysisPage::DataSummary => "data summary",
            AnalysisPage::Heatmap => "grant amount heatmap",
            AnalysisPage::ScatterPlot => "grant amounts over time",
            AnalysisPage::Treemaps => "treemaps extended analysis",
            AnalysisPage::Relationships => "general analysis of relationships",
        }
    }

    fn subject(&self) -> &'static str {
        match self {
            AnalysisPage::DataSummary => "the data summary",
            AnalysisPage::Heatmap => "the grant amount heatmap",
            AnalysisPage::ScatterPlot => "grant amounts over time",
            AnalysisPage::Treemaps => "the treemap visualization",
            AnalysisPage::Relationships => "the general analysis of relationships",
        }
    }

    /// What the static prompt says the chart visualizes.
    pub fn additional_context(&self, analysis_type: &str) -> String {
        format!("the {} for {}", analysis_type, self.focus())
    }

    pub fn query(&self, analysis_type: &str, project_theme: Option<&str>) -> String {
        let mut query = format!(
            "Analyze the {} for {}. Provide insights, trends, and implications.",
            analysis_type,
            self.subject()
        );
        if let Some(theme) = project_theme {
            query.push_str(&format!(" Consider the project theme: {}", theme));
        }
        query
    }
}

/// Key figures behind one chart.
#[derive(Debug, Clone, PartialEq)]
pub enum ChartData {
    SummaryMetrics(SummaryMetrics),
    TopFunders {
        top_n: usize,
        funders: Vec<CategoryTotal>,
        total_amount: f64,
    },
    FunderTypes(Vec<FunderTypeShare>),
    SubjectAreas {
        areas: Vec<CategoryTotal>,
        total_amount: f64,
    },
    TimeSeries(Vec<YearTotal>),
    NetworkGraph(NetworkStats),
    Heatmap {
        dimension1: String,
        dimension2: String,
        cells: Vec<CombinationTotal>,
    },
    TopCombinations {
        dimension1: String,
        dimension2: String,
        combinations: Vec<CombinationTotal>,
    },
    AmountTrend {
        window: AmountWindow,
        yearly: Vec<YearMean>,
    },
    ClusterDensity {
        window: AmountWindow,
        counts: Vec<YearClusterCount>,
    },
    CategoriesOverTime {
        window: AmountWindow,
        column: String,
        totals: Vec<YearCategoryTotal>,
    },
    Treemap {
        column: String,
        cluster: String,
        totals: Vec<CategoryTotal>,
    },
    Block {
        column: String,
        block: String,
        insights: BlockInsights,
    },
    FactorAverages {
        factor: String,
        averages: Vec<CategoryTotal>,
    },
    FunderAffinity {
        funder: String,
        factor: String,
        totals: Vec<CategoryTotal>,
    },
}

impl ChartData {
    pub fn summary(df: &DataFrame, mapping: &ColumnMapping) -> Result<Self> {
        Ok(ChartData::SummaryMetrics(summary::summary_metrics(df, mapping)?))
    }

    pub fn top_funders(df: &DataFrame, mapping: &ColumnMapping, top_n: usize) -> Result<Self> {
        Ok(ChartData::TopFunders {
            top_n,
            funders: summary::top_funders(df, mapping, top_n)?,
            total_amount: summary::summary_metrics(df, mapping)?.total_amount,
        })
    }

    pub fn funder_types(df: &DataFrame, mapping: &ColumnMapping) -> Result<Self> {
        Ok(ChartData::FunderTypes(summary::funder_type_distribution(df, mapping)?))
    }

    pub fn subject_areas(df: &DataFrame, mapping: &ColumnMapping, top_n: usize) -> Result<Self> {
        Ok(ChartData::SubjectAreas {
            areas: summary::top_subject_areas(df, mapping, top_n)?,
            total_amount: summary::summary_metrics(df, mapping)?.total_amount,
        })
    }

    pub fn time_series(df: &DataFrame, mapping: &ColumnMapping) -> Result<Self> {
        let unique = summary::unique_grants(df, mapping)?;
        Ok(ChartData::TimeSeries(summary::amount_by_year(&unique, mapping)?))
    }

    pub fn network(df: &DataFrame, mapping: &ColumnMapping) -> Result<Self> {
        Ok(ChartData::NetworkGraph(summary::network_statistics(df, mapping)?))
    }

    /// Heatmap cells for the selected values of two dimensions.
    pub fn heatmap(
        df: &DataFrame,
        mapping: &ColumnMapping,
        dimension1: &str,
        values1: &[String],
        dimension2: &str,
        values2: &[String],
    ) -> Result<Self> {
        let selected = summary::filter_dimensions(df, dimension1, values1, dimension2, values2)?;
        Ok(ChartData::Heatmap {
            dimension1: dimension1.to_string(),
            dimension2: dimension2.to_string(),
            cells: summary::top_combinations(&selected, mapping, dimension1, dimension2, usize::MAX)?,
        })
    }

    pub fn top_combinations(
        df: &DataFrame,
        mapping: &ColumnMapping,
        dimension1: &str,
        dimension2: &str,
        top_n: usize,
    ) -> Result<Self> {
        Ok(ChartData::TopCombinations {
            dimension1: dimension1.to_string(),
            dimension2: dimension2.to_string(),
            combinations: summary::top_combinations(df, mapping, dimension1, dimension2, top_n)?,
        })
    }

    pub fn amount_trend(df: &DataFrame, mapping: &ColumnMapping, window: AmountWindow) -> Result<Self> {
        let filtered = summary::filter_amount_window(df, mapping, &window)?;
        Ok(ChartData::AmountTrend {
            window,
            yearly: summary::yearly_mean_amount(&filtered, mapping)?,
        })
    }

    pub fn cluster_density(df: &DataFrame, mapping: &ColumnMapping, window: AmountWindow) -> Result<Self> {
        let filtered = summary::filter_amount_window(df, mapping, &window)?;
        Ok(ChartData::ClusterDensity {
            window,
            counts: summary::cluster_density(&filtered, mapping)?,
        })
    }

    pub fn categories_over_time(
        df: &DataFrame,
        mapping: &ColumnMapping,
        window: AmountWindow,
        column: &str,
    ) -> Result<Self> {
        let filtered = summary::filter_amount_window(df, mapping, &window)?;
        Ok(ChartData::CategoriesOverTime {
            window,
            column: column.to_string(),
            totals: summary::categories_over_time(&filtered, mapping, column)?,
        })
    }

    pub fn treemap(df: &DataFrame, mapping: &ColumnMapping, column: &str, cluster: &str) -> Result<Self> {
        Ok(ChartData::Treemap {
            column: column.to_string(),
            cluster: cluster.to_string(),
            totals: summary::treemap_totals(df, mapping, column, cluster)?,
        })
    }

    pub fn block(df: &DataFrame, mapping: &ColumnMapping, column: &str, block: &str) -> Result<Self> {
        let rows = filter_eq(df, column, block)?;
        Ok(ChartData::Block {
            column: column.to_string(),
            block: block.to_string(),
            insights: summary::block_insights(&rows, mapping)?,
        })
    }

    pub fn factor_averages(df: &DataFrame, mapping: &ColumnMapping, factor: &str) -> Result<Self> {
        Ok(ChartData::FactorAverages {
            factor: factor.to_string(),
            averages: summary::average_amount_by(df, mapping, factor)?,
        })
    }

    pub fn funder_affinity(
        df: &DataFrame,
        mapping: &ColumnMapping,
        funder: &str,
        factor: &str,
    ) -> Result<Self> {
        Ok(ChartData::FunderAffinity {
            funder: funder.to_string(),
            factor: factor.to_string(),
            totals: summary::funder_affinity(df, mapping, funder, factor)?,
        })
    }

    pub fn chart_type(&self) -> &'static str {
        match self {
            ChartData::SummaryMetrics(_) => "data_summary_metrics",
            ChartData::TopFunders { .. } => "top_funders_chart",
            ChartData::FunderTypes(_) => "funder_type_pie_chart",
            ChartData::SubjectAreas { .. } => "subject_area_chart",
            ChartData::TimeSeries(_) => "time_series_chart",
            ChartData::NetworkGraph(_) => "network_graph",
            ChartData::Heatmap { .. } => "grant_amount_heatmap",
            ChartData::TopCombinations { .. } => "top_combinations_chart",
            ChartData::AmountTrend { .. } => "grant_amount_scatter_plot",
            ChartData::ClusterDensity { .. } => "cluster_density_chart",
            ChartData::CategoriesOverTime { .. } => "categories_over_time_chart",
            ChartData::Treemap { .. } => "treemap",
            ChartData::Block { .. } => "treemap_block_insights",
            ChartData::FactorAverages { .. } => "award_amount_chart",
            ChartData::FunderAffinity { .. } => "funder_affinity_chart",
        }
    }

    pub fn page(&self) -> AnalysisPage {
        match self {
            ChartData::SummaryMetrics(_)
            | ChartData::TopFunders { .. }
            | ChartData::FunderTypes(_)
            | ChartData::SubjectAreas { .. }
            | ChartData::TimeSeries(_)
            | ChartData::NetworkGraph(_) => AnalysisPage::DataSummary,
            ChartData::Heatmap { .. } | ChartData::TopCombinations { .. } => AnalysisPage::Heatmap,
            ChartData::AmountTrend { .. }
            | ChartData::ClusterDensity { .. }
            | ChartData::CategoriesOverTime { .. } => AnalysisPage::ScatterPlot,
            ChartData::Treemap { .. } | ChartData::Block { .. } => AnalysisPage::Treemaps,
            ChartData::FactorAverages { .. } | ChartData::FunderAffinity { .. } => {
                AnalysisPage::Relationships
            }
        }
    }

    /// Name of the analysis as it appears in the query and the dynamic context.
    pub fn analysis_type(&self) -> String {
        match self {
            ChartData::Heatmap { .. } => "heatmap".to_string(),
            ChartData::TopCombinations { .. } => "top combinations chart".to_string(),
            ChartData::AmountTrend { .. } => "scatter plot".to_string(),
            ChartData::ClusterDensity { .. } => "cluster density trend".to_string(),
            ChartData::CategoriesOverTime { .. } => "categories over time".to_string(),
            ChartData::Treemap { .. } => "treemap visualization".to_string(),
            ChartData::Block { .. } => "selected block analysis".to_string(),
            ChartData::FactorAverages { factor, .. } => {
                format!("bar chart of award amount by {}", factor)
            }
            ChartData::FunderAffinity { funder, factor, .. } => {
                format!("funder affinity chart for {} and {}", funder, factor)
            }
            _ => self.chart_type().to_string(),
        }
    }

    /// View settings reported as filters in the dynamic context.
    pub fn filters(&self) -> Vec<(String, String)> {
        let pairs: Vec<(&str, String)> = match self {
            ChartData::Heatmap { dimension1, dimension2, .. }
            | ChartData::TopCombinations { dimension1, dimension2, .. } => vec![
                ("dimension1", dimension1.clone()),
                ("dimension2", dimension2.clone()),
            ],
            ChartData::AmountTrend { window, .. } | ChartData::ClusterDensity { window, .. } => {
                window_filters(window)
            }
            ChartData::CategoriesOverTime { window, column, .. } => {
                let mut pairs = window_filters(window);
                pairs.push(("color_by", column.clone()));
                pairs
            }
            ChartData::Treemap { column, cluster, .. } => vec![
                ("analyze_column", column.clone()),
                ("selected_label", cluster.clone()),
            ],
            ChartData::Block { column, block, .. } => vec![
                ("analyze_column", column.clone()),
                ("selected_block", block.clone()),
            ],
            ChartData::FactorAverages { factor, .. } => vec![
                ("selected_factor", factor.clone()),
                ("chart_type", "Bar Chart".to_string()),
            ],
            ChartData::FunderAffinity { funder, factor, .. } => vec![
                ("selected_funder", funder.clone()),
                ("selected_affinity_factor", factor.clone()),
            ],
            _ => Vec::new(),
        };
        pairs
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect()
    }
}

fn window_filters(window: &AmountWindow) -> Vec<(&'static str, String)> {
    vec![
        ("start_year", window.start_year.to_string()),
        ("end_year", window.end_year.to_string()),
        ("min_amount", window.min_amount.to_string()),
        ("max_amount", window.max_amount.to_string()),
    ]
}

pub fn chart_prompt(data: &ChartData, project_theme: Option<&str>) -> String {
    if data.page() != AnalysisPage::DataSummary {
        return page_prompt(data, project_theme);
    }

    let mut prompt = format!("Analyze the {} chart for grant data. ", data.chart_type());
    if let Some(theme) = project_theme {
        prompt.push_str(&format!("Consider the project theme: {}. ", theme));
    }

    let body = match data {
        ChartData::SummaryMetrics(metrics) => format!(
            "
Analyze the summary metrics for the grant data.
Focus on the following aspects:
1. The overall scale of grant-making represented by these metrics.
2. The diversity of the funding landscape as indicated by the number of unique funders and recipients.
3. The implications of these metrics for grant seekers.

Key data points to consider:
- Total grants: {}
- Total amount: {}
- Unique funders: {}
- Unique recipients: {}",
            metrics.total_grants,
            format_currency(metrics.total_amount),
            metrics.unique_funders,
            metrics.unique_recipients
        ),
        ChartData::TopFunders { top_n, funders, total_amount } => {
            let top_sum: f64 = funders.iter().map(|f| f.total_amount).sum();
            format!(
                "
Analyze the bar chart of top funders by total grant amount.
Focus on the following aspects:
1. The concentration of funding among the top funders.
2. Any notable differences between the top funders and those lower on the list.
3. Implications of this funding distribution for grant seekers.

Key data points to consider:
- Number of top funders shown: {}
- Top funder: {}
- Bottom funder in top {}: {}
- Percentage of total funding from top {} funders: {:.2}%",
                top_n,
                describe_total(funders.first()),
                top_n,
                describe_total(funders.last()),
                top_n,
                percentage(top_sum, *total_amount)
            )
        }
        ChartData::FunderTypes(shares) => {
            let largest = shares.first();
            let smallest = shares.last();
            format!(
                "
Analyze the pie chart showing the distribution of grants by funder type.
Focus on the following aspects:
1. The relative sizes of different funder types.
2. Any surprising or notable aspects of this distribution.
3. Implications of this distribution for grant seekers.

Key data points to consider:
- Total funder types: {}
- Largest funder type: {}
- Smallest funder type: {}",
                shares.len(),
                describe_share(largest),
                describe_share(smallest)
            )
        }
        ChartData::SubjectAreas { areas, total_amount } => {
            let top_sum: f64 = areas.iter().map(|a| a.total_amount).sum();
            format!(
                "
Analyze the bar chart of top grant subject areas by total amount.
Focus on the following aspects:
1. The most prominent subject areas and their relative funding levels.
2. Any notable patterns or surprises in the distribution of funding across subject areas.
3. How this distribution might align with or differ from current trends or needs in philanthropy.

Key data points to consider:
- Number of subject areas shown: {}
- Top subject area: {}
- Bottom subject area shown: {}
- Percentage of total funding in top {} areas: {:.2}%",
                areas.len(),
                describe_total(areas.first()),
                describe_total(areas.last()),
                areas.len(),
                percentage(top_sum, *total_amount)
            )
        }
        ChartData::TimeSeries(years) => {
            let lowest = years
                .iter()
                .min_by(|a, b| a.total_amount.partial_cmp(&b.total_amount).unwrap_or(std::cmp::Ordering::Equal));
            let highest = years
                .iter()
                .max_by(|a, b| a.total_amount.partial_cmp(&b.total_amount).unwrap_or(std::cmp::Ordering::Equal));
            format!(
                "
Analyze the line chart showing total grant amount over time.
Focus on the following aspects:
1. The overall trend in grant amounts over the time period.
2. Any notable spikes, dips, or changes in the trend.
3. Potential factors that might explain the observed trends.

Key data points to consider:
- Time range: {} to {}
- Lowest year: {}
- Highest year: {}
- Overall trend description: {}",
                years.first().map(|y| y.year.to_string()).unwrap_or_else(|| "N/A".into()),
                years.last().map(|y| y.year.to_string()).unwrap_or_else(|| "N/A".into()),
                describe_year(lowest),
                describe_year(highest),
                trend_description(years)
            )
        }
        ChartData::NetworkGraph(stats) => format!(
            "
Analyze the network graph of funders and recipients.
Focus on the following aspects:
1. The overall structure of the network and what it reveals about funder-recipient relationships.
2. Any notable clusters or isolated nodes in the network.
3. Implications of this network structure for grant seekers.

Key data points to consider:
- Total nodes (funders + recipients): {}
- Total connections: {}
- Most connected node: {} ({} connections)
- Number of isolated nodes: {}",
            stats.total_nodes,
            stats.total_connections,
            stats.most_connected_node.as_deref().unwrap_or("N/A"),
            stats.most_connected_node_connections,
            stats.isolated_nodes
        ),
        _ => String::new(),
    };

    prompt.push_str(&body);
    prompt.push_str(GROUNDING_INSTRUCTION);
    prompt
}

/// Page query followed by the figures behind the chart.
fn page_prompt(data: &ChartData, project_theme: Option<&str>) -> String {
    let points: Vec<String> = match data {
        ChartData::Heatmap { dimension1, dimension2, cells } => vec![
            format!("Dimensions: {} by {}", dimension1, dimension2),
            format!("Combinations with funding: {}", cells.len()),
            format!("Largest combination: {}", describe_combination(cells.first())),
            format!("Smallest combination: {}", describe_combination(cells.last())),
        ],
        ChartData::TopCombinations { dimension1, dimension2, combinations } => {
            let shown: f64 = combinations.iter().map(|c| c.total_amount).sum();
            vec![
                format!("Dimensions: {} by {}", dimension1, dimension2),
                format!("Combinations shown: {}", combinations.len()),
                format!("Top combination: {}", describe_combination(combinations.first())),
                format!("Combined amount of the combinations shown: {}", format_currency(shown)),
            ]
        }
        ChartData::AmountTrend { window, yearly } => {
            let highest = yearly
                .iter()
                .max_by(|a, b| a.mean_amount.partial_cmp(&b.mean_amount).unwrap_or(std::cmp::Ordering::Equal));
            let lowest = yearly
                .iter()
                .min_by(|a, b| a.mean_amount.partial_cmp(&b.mean_amount).unwrap_or(std::cmp::Ordering::Equal));
            vec![
                describe_window(window),
                format!("Years with grants: {}", yearly.len()),
                format!("Highest average year: {}", describe_year_mean(highest)),
                format!("Lowest average year: {}", describe_year_mean(lowest)),
            ]
        }
        ChartData::ClusterDensity { window, counts } => {
            let densest = counts.iter().fold(None, |best: Option<&YearClusterCount>, entry| match best {
                Some(best) if best.grant_count >= entry.grant_count => Some(best),
                _ => Some(entry),
            });
            vec![
                describe_window(window),
                format!("Year and cluster groups: {}", counts.len()),
                format!(
                    "Densest group: {}",
                    densest
                        .map(|d| format!("{} in {} ({} grants)", d.cluster, d.year, d.grant_count))
                        .unwrap_or_else(|| "N/A".to_string())
                ),
            ]
        }
        ChartData::CategoriesOverTime { window, column, totals } => {
            let largest = totals.iter().fold(None, |best: Option<&YearCategoryTotal>, entry| match best {
                Some(best) if best.total_amount >= entry.total_amount => Some(best),
                _ => Some(entry),
            });
            vec![
                describe_window(window),
                format!("Category column: {}", column),
                format!(
                    "Largest yearly category: {}",
                    largest
                        .map(|t| format!("{} in {} ({})", t.category, t.year, format_currency(t.total_amount)))
                        .unwrap_or_else(|| "N/A".to_string())
                ),
            ]
        }
        ChartData::Treemap { column, cluster, totals } => vec![
            format!("Variable: {}", column),
            format!("USD range: {}", cluster),
            format!("Categories: {}", totals.len()),
            format!("Largest category: {}", describe_total(totals.last())),
            format!("Smallest category: {}", describe_total(totals.first())),
        ],
        ChartData::Block { column, block, insights } => vec![
            format!("Block: {} = {}", column, block),
            format!("Total grants: {}", insights.total_grants),
            format!("Total USD: {}", format_currency(insights.total_amount)),
            format!("Average grant USD: {}", format_currency(insights.average_amount)),
            format!("Median grant USD: {}", format_currency(insights.median_amount)),
            format!("Grant years range: {}", insights.year_range_label()),
            format!("Top funders: {}", describe_totals(&insights.top_funders)),
            format!("Top recipients: {}", describe_totals(&insights.top_recipients)),
            format!(
                "Top subjects: {}",
                insights
                    .top_subjects
                    .iter()
                    .map(|(subject, count)| format!("{} ({})", subject, count))
                    .join(", ")
            ),
        ],
        ChartData::FactorAverages { factor, averages } => vec![
            format!("Factor: {}", factor),
            format!("Highest average award: {}", describe_total(averages.first())),
            format!("Lowest average award: {}", describe_total(averages.last())),
        ],
        ChartData::FunderAffinity { funder, factor, totals } => vec![
            format!("Funder: {}", funder),
            format!("Affinity factor: {}", factor),
            format!("Categories funded: {}", totals.len()),
            format!("Strongest affinity: {}", describe_total(totals.first())),
        ],
        _ => Vec::new(),
    };

    let mut prompt = data.page().query(&data.analysis_type(), project_theme);
    if !points.is_empty() {
        prompt.push_str("\n\nKey data points to consider:\n");
        prompt.push_str(&points.iter().map(|point| format!("- {}", point)).join("\n"));
    }
    prompt.push_str(GROUNDING_INSTRUCTION);
    prompt
}

pub fn distribution_analysis_prompt(total_grants: usize, total_amount: f64, selected_clusters: &[String]) -> String {
    format!(
        "Analyze the grant amount distribution for the following clusters: {}.

Consider the following points in your analysis:
1. The total number of grants ({}) and the total grant amount ({}).
2. The distribution of grants across the selected clusters.
3. Any notable patterns or trends in the distribution.
4. Potential implications of this distribution for grant seekers and funders.
5. Comparison of grant counts vs total amounts in each cluster.
6. Any outliers or unexpected findings in the data.

Provide a comprehensive analysis with specific insights and data-driven observations.",
        selected_clusters.join(", "),
        total_grants,
        format_currency(total_amount)
    )
}

pub fn full_analysis_prompt(project_theme: &str) -> String {
    format!(
        "Provide a comprehensive analysis of the grant dataset, considering the following project theme and objectives:

{}

Use the following structure and information:

1. Overview:
   - Summarize the key statistics of the dataset.
   - Discuss the scope of the data in terms of total grants, amounts, and time period.

2. Funding Landscape:
   - Analyze the distribution of grants across different funder types.
   - Discuss the concentration of funding (e.g., are there a few major funders or is it more distributed?).
   - Identify any trends in funding amounts over the years.

3. Grant Characteristics:
   - Examine the most common grant subjects, target populations, and strategies.
   - Discuss how grant amounts vary across these categories.
   - Identify any notable patterns or relationships between grant characteristics and funding amounts.

4. Temporal Analysis:
   - Analyze how grant-making has evolved over the covered time period.
   - Identify any significant changes or trends in funding priorities, amounts, or number of grants over time.

5. Key Players:
   - Discuss the top funders and recipients in terms of grant amounts and numbers.
   - Analyze any patterns in the relationships between top funders and recipients.

6. Relevance to Project Theme:
   - Highlight aspects of the data that are particularly relevant to the project theme and objectives.
   - Identify potential funding opportunities or strategies based on the data that align with the project goals.

7. Implications and Recommendations:
   - Based on the analysis, provide insights on the overall state of grant-making in this dataset.
   - Suggest areas that might benefit from further investigation, considering the project theme.
   - Offer specific, data-driven recommendations for grant seekers based on the observed patterns and trends.

Use the provided context and your analysis of the full dataset to support your points.
Focus on insights that can be derived from the data and are relevant to the user's project.
Avoid giving generic advice that isn't supported by the data provided.
Aim for a college-level analysis that is informative and insightful, but not overwhelmingly technical.",
        project_theme
    )
}

fn describe_total(entry: Option<&CategoryTotal>) -> String {
    entry
        .map(|e| format!("{} ({})", e.category, format_currency(e.total_amount)))
        .unwrap_or_else(|| "N/A".to_string())
}

fn describe_totals(entries: &[CategoryTotal]) -> String {
    if entries.is_empty() {
        return "N/A".to_string();
    }
    entries.iter().map(|e| describe_total(Some(e))).join(", ")
}

fn describe_combination(entry: Option<&CombinationTotal>) -> String {
    entry
        .map(|e| format!("{} / {} ({})", e.first, e.second, format_currency(e.total_amount)))
        .unwrap_or_else(|| "N/A".to_string())
}

fn describe_year_mean(entry: Option<&YearMean>) -> String {
    entry
        .map(|e| format!("{} ({})", e.year, format_currency(e.mean_amount)))
        .unwrap_or_else(|| "N/A".to_string())
}

fn describe_window(window: &AmountWindow) -> String {
    format!(
        "Years {} to {}, amounts {} to {}",
        window.start_year,
        window.end_year,
        format_currency(window.min_amount),
        format_currency(window.max_amount)
    )
}

fn describe_share(entry: Option<&FunderTypeShare>) -> String {
    entry
        .map(|e| format!("{} ({:.2}%)", e.funder_type, e.percentage))
        .unwrap_or_else(|| "N/A".to_string())
}

fn describe_year(entry: Option<&YearTotal>) -> String {
    entry
        .map(|e| format!("{} ({})", e.year, format_currency(e.total_amount)))
        .unwrap_or_else(|| "N/A".to_string())
}

fn percentage(part: f64, whole: f64) -> f64 {
    crate::data_utils::safe_divide(part, whole) * 100.0
}

/// Compares the first and last year's totals.
pub fn trend_description(years: &[YearTotal]) -> String {
    match (years.first(), years.last()) {
        (Some(first), Some(last)) if years.len() > 1 => {
            let change = percentage(last.total_amount - first.total_amount, first.total_amount);
            if last.total_amount > first.total_amount {
                format!("increasing ({:+.1}% from {} to {})", change, first.year, last.year)
            } else if last.total_amount < first.total_amount {
                format!("decreasing ({:+.1}% from {} to {})", change, first.year, last.year)
            } else {
                format!("flat between {} and {}", first.year, last.year)
            }
        }
        _ => "insufficient data for a trend".to_string(),
    }
}

/// Key statistics that accompany the full-dataset report.
pub fn full_analysis_context(df: &DataFrame, mapping: &ColumnMapping) -> Result<String> {
    use crate::columns::{AMOUNT_USD, GRANT_POPULATION_TRAN, GRANT_STRATEGY_TRAN, GRANT_SUBJECT_TRAN, YEAR_ISSUED};
    use crate::data_utils::{column_mean, column_median, i64_range, top_values};

    let metrics = summary::summary_metrics(df, mapping)?;
    let amount = mapping.get(AMOUNT_USD)?;
    let span = i64_range(df, mapping.get(YEAR_ISSUED)?)?;
    let top_funder = summary::top_funders(df, mapping, 1)?;

    let mut subject_population_strategy = Vec::new();
    for canonical in [GRANT_SUBJECT_TRAN, GRANT_POPULATION_TRAN, GRANT_STRATEGY_TRAN] {
        let top = top_values(df, mapping.get(canonical)?, 1)?;
        subject_population_strategy.push(top.into_iter().next().map(|(v, _)| v).unwrap_or_else(|| "N/A".into()));
    }

    let pairs = [
        ("total_grants", metrics.total_grants.to_string()),
        ("total_amount", format_currency(metrics.total_amount)),
        ("average_grant", format_currency(column_mean(df, amount)?.unwrap_or(0.0))),
        ("median_grant", format_currency(column_median(df, amount)?.unwrap_or(0.0))),
        ("unique_funders", metrics.unique_funders.to_string()),
        ("unique_recipients", metrics.unique_recipients.to_string()),
        (
            "year_range",
            span.map(|(min, max)| format!("{} to {}", min, max))
                .unwrap_or_else(|| "N/A".into()),
        ),
        ("top_funder", describe_total(top_funder.first())),
        ("top_subject", subject_population_strategy[0].clone()),
        ("top_population", subject_population_strategy[1].clone()),
        ("top_strategy", subject_population_strategy[2].clone()),
    ];

    Ok(pairs
        .iter()
        .map(|(key, value)| format!("{}: {}", key, value))
        .join("; "))
}
