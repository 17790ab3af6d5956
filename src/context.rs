//! Context builder
//!
//! Two string builders feed the query engine:
//! - the static page prompt, describing the dataset currently on screen
//! - the dynamic context, describing where the user is and what they just did
//!
//! Both are pure: everything they read is passed in, including the interaction
//! history, so they can be tested without a session or a model.

use crate::columns::{
    resolve, AMOUNT_USD, FUNDER_NAME, FUNDER_STATE, FUNDER_TYPE, GRANT_POPULATION_TRAN,
    GRANT_STRATEGY_TRAN, GRANT_SUBJECT_TRAN, RECIP_NAME, YEAR_ISSUED,
};
use crate::data_utils::{
    column_mean, column_median, column_sum, i64_range, n_unique, top_values, unique_in_order,
};
use crate::error::Result;
use crate::summary::format_currency;
use itertools::Itertools;
use polars::prelude::DataFrame;

/// Interactions included in the dynamic context, newest last.
pub const RECENT_INTERACTIONS: usize = 5;

const TOP_STATES: usize = 3;
const TOP_CATEGORIES: usize = 5;

/// Optional, typed extras folded into the dynamic context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextExtras {
    pub project_theme: Option<String>,
    pub analysis_type: Option<String>,
    /// Free-form pairs appended last, in order.
    pub additional: Vec<(String, String)>,
}

impl ContextExtras {
    pub fn with_project_theme(mut self, theme: impl Into<String>) -> Self {
        self.project_theme = Some(theme.into());
        self
    }

    pub fn with_analysis_type(mut self, analysis_type: impl Into<String>) -> Self {
        self.analysis_type = Some(analysis_type.into());
        self
    }

    pub fn with_pair(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.additional.push((key.into(), value.into()));
        self
    }
}

pub fn build_static_prompt(
    table: &DataFrame,
    selected_chart: &str,
    selected_role: &str,
    additional_context: &str,
) -> Result<String> {
    let mapping = resolve(
        table,
        &[
            FUNDER_NAME,
            RECIP_NAME,
            YEAR_ISSUED,
            FUNDER_STATE,
            AMOUNT_USD,
            GRANT_SUBJECT_TRAN,
            GRANT_POPULATION_TRAN,
            GRANT_STRATEGY_TRAN,
            FUNDER_TYPE,
        ],
    )?;

    let columns = table.get_column_names().join(", ");
    let data_types = table
        .get_columns()
        .iter()
        .map(|series| format!("{}: {}", series.name(), series.dtype()))
        .join(", ");

    let observations = format!(
        "The dataset contains {} records, with {} unique funders and {} unique recipients.",
        table.height(),
        n_unique(table, mapping.get(FUNDER_NAME)?)?,
        n_unique(table, mapping.get(RECIP_NAME)?)?
    );

    let date_info = format!(
        "The dataset covers grants issued from {}.",
        year_span(table, mapping.get(YEAR_ISSUED)?)?
    );

    let state_column = mapping.get(FUNDER_STATE)?;
    let top_states = top_values(table, state_column, TOP_STATES)?
        .into_iter()
        .map(|(state, _)| state)
        .join(", ");
    let geographical_info = format!(
        "The dataset covers grants from {} states in the USA. The top states by grant count are {}.",
        n_unique(table, state_column)?,
        top_states
    );

    let amount = mapping.get(AMOUNT_USD)?;
    let aggregated_stats = format!(
        "The total grant amount is {}, with an average grant amount of {} and a median grant amount of {}.",
        format_currency(column_sum(table, amount)?),
        format_currency(column_mean(table, amount)?.unwrap_or(0.0)),
        format_currency(column_median(table, amount)?.unwrap_or(0.0))
    );

    let subject_info = format!(
        "The top 5 grant subjects are: {}.",
        top_labels(table, mapping.get(GRANT_SUBJECT_TRAN)?)?
    );
    let population_info = format!(
        "The top 5 populations served are: {}.",
        top_labels(table, mapping.get(GRANT_POPULATION_TRAN)?)?
    );
    let strategy_info = format!(
        "The top 5 grant strategies are: {}.",
        top_labels(table, mapping.get(GRANT_STRATEGY_TRAN)?)?
    );

    let funder_type_info = format!(
        "The dataset includes the following funder types: {}.",
        unique_in_order(table, mapping.get(FUNDER_TYPE)?)?.join(", ")
    );

    let chart_description = format!(
        "The current chart is a {}, which visualizes the grant data based on {}.",
        selected_chart, additional_context
    );
    let role_description = format!(
        "The user is a {} who is exploring the grant data to gain insights and inform their work.",
        selected_role
    );

    let lines = [
        format!(
            "The Candid API provides comprehensive data on grants and funding in the USA. The current dataset contains the following columns: {}.",
            columns
        ),
        format!("Data types: {}.", data_types),
        format!(
            "You are an AI assistant helping a {} explore the grant data in the GrantScope application to gain insights and extract data useful to the grant application and writing process.",
            selected_role
        ),
        observations,
        date_info,
        geographical_info,
        aggregated_stats,
        subject_info,
        population_info,
        strategy_info,
        funder_type_info,
        chart_description,
        role_description,
        "The user can ask questions related to the current chart and the overall grant data to gain insights and explore the data further.".to_string(),
        "Please note that the data is limited to the information provided in the dataset, queries beyond the available columns are not answerable.".to_string(),
        "Respond in Markdown format only.".to_string(),
        "The user's prompt is:".to_string(),
    ];

    Ok(lines.join("\n"))
}

/// Segments, in order: location, dataset size and span, project theme,
/// analysis type, filters, recent interactions, additional pairs.
pub fn build_dynamic_context(
    table: &DataFrame,
    page_name: &str,
    chart_name: &str,
    selected_filters: &[(String, String)],
    interactions: &[String],
    extra: Option<&ContextExtras>,
) -> Result<String> {
    let year_column = crate::columns::resolve_column(table, YEAR_ISSUED)?;

    let mut context = format!(
        "The user is currently on the {} page, viewing the {} chart. ",
        page_name, chart_name
    );

    let span = i64_range(table, &year_column)?;
    context.push_str(&format!(
        "The dataset contains {} records from {} to {}. ",
        table.height(),
        span.map(|(min, _)| min.to_string()).unwrap_or_else(|| "N/A".to_string()),
        span.map(|(_, max)| max.to_string()).unwrap_or_else(|| "N/A".to_string())
    ));

    if let Some(extra) = extra {
        if let Some(theme) = &extra.project_theme {
            context.push_str(&format!("Project Theme: {}. ", theme));
        }
        if let Some(analysis_type) = &extra.analysis_type {
            context.push_str(&format!("Current Analysis: {}. ", analysis_type));
        }
    }

    if !selected_filters.is_empty() {
        context.push_str("The following filters are applied: ");
        context.push_str(
            &selected_filters
                .iter()
                .map(|(key, value)| format!("{}: {}", key, value))
                .join(", "),
        );
        context.push_str(". ");
    }

    if !interactions.is_empty() {
        let start = interactions.len().saturating_sub(RECENT_INTERACTIONS);
        context.push_str("Recent user interactions include: ");
        context.push_str(&interactions[start..].join(", "));
        context.push_str(". ");
    }

    if let Some(extra) = extra {
        for (key, value) in &extra.additional {
            context.push_str(&format!("{}: {}. ", key, value));
        }
    }

    Ok(context)
}

fn year_span(table: &DataFrame, column: &str) -> Result<String> {
    Ok(match i64_range(table, column)? {
        Some((min, max)) => format!("{} to {}", min, max),
        None => "N/A to N/A".to_string(),
    })
}

fn top_labels(table: &DataFrame, column: &str) -> Result<String> {
    Ok(top_values(table, column, TOP_CATEGORIES)?
        .into_iter()
        .map(|(label, _)| label)
        .join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    fn view() -> DataFrame {
        df![
            "Year Issued" => [2018i64, 2020, 2022],
            "Amount Usd" => [1000.0, 2000.0, 3000.0],
        ]
        .unwrap()
    }

    #[test]
    fn test_only_last_five_interactions() {
        let interactions: Vec<String> = (1..=6).map(|i| format!("q{}", i)).collect();
        let context = build_dynamic_context(&view(), "Data Summary", "Bar", &[], &interactions, None).unwrap();
        assert!(context.contains("Recent user interactions include: q2, q3, q4, q5, q6. "));
        assert!(!context.contains("q1"));
    }

    #[test]
    fn test_segment_order() {
        let filters = vec![
            ("Selected Clusters".to_string(), "0-50k, 1M+".to_string()),
            ("Top N".to_string(), "10".to_string()),
        ];
        let extras = ContextExtras::default()
            .with_project_theme("rural health")
            .with_analysis_type("Top Funders")
            .with_pair("Focus", "education");
        let context = build_dynamic_context(
            &view(),
            "Grant Amount Distribution",
            "Cluster Comparison",
            &filters,
            &["asked about clusters".to_string()],
            Some(&extras),
        )
        .unwrap();

        assert_eq!(
            context,
            "The user is currently on the Grant Amount Distribution page, viewing the Cluster Comparison chart. \
             The dataset contains 3 records from 2018 to 2022. \
             Project Theme: rural health. \
             Current Analysis: Top Funders. \
             The following filters are applied: Selected Clusters: 0-50k, 1M+, Top N: 10. \
             Recent user interactions include: asked about clusters. \
             Focus: education. "
        );
    }

    #[test]
    fn test_snake_case_year_column() {
        let df = df!["year_issued" => [2001i64, 2003]].unwrap();
        let context = build_dynamic_context(&df, "Page", "Chart", &[], &[], None).unwrap();
        assert!(context.contains("2 records from 2001 to 2003"));
    }

    #[test]
    fn test_missing_year_column_is_an_error() {
        let df = df!["Amount Usd" => [1.0]].unwrap();
        assert!(build_dynamic_context(&df, "Page", "Chart", &[], &[], None).is_err());
    }
}
