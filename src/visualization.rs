//! Chart selection from a result classification

use crate::classifier::Classification;
use crate::execution::Row;
use serde::{Deserialize, Serialize};

/// Most suggestions returned for one result
const MAX_SUGGESTIONS: usize = 2;
/// Largest result a pie chart stays readable for
const PIE_MAX_ROWS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Line,
    Bar,
    Pie,
    Scatter,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChartBindings {
    Axes { x_column: String, y_column: String },
    Slices { labels_column: String, values_column: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizationSuggestion {
    pub chart_type: ChartKind,
    #[serde(flatten)]
    pub bindings: ChartBindings,
    pub title: String,
    pub description: String,
    pub primary: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizationAdvice {
    pub should_visualize: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub suggestions: Vec<VisualizationSuggestion>,
    pub primary_suggestion: Option<VisualizationSuggestion>,
}

impl VisualizationAdvice {
    fn none(reason: impl Into<String>) -> Self {
        Self {
            should_visualize: false,
            reason: Some(reason.into()),
            suggestions: Vec::new(),
            primary_suggestion: None,
        }
    }
}

fn suggestion(chart_type: ChartKind, bindings: ChartBindings, title: &str, description: &str) -> VisualizationSuggestion {
    VisualizationSuggestion {
        chart_type,
        bindings,
        title: title.to_string(),
        description: description.to_string(),
        primary: false,
    }
}

pub struct VisualizationAdvisor;

impl VisualizationAdvisor {
    pub fn suggest(classification: &Classification, rows: &[Row]) -> VisualizationAdvice {
        if !classification.should_visualize || rows.is_empty() {
            return VisualizationAdvice::none("List query or empty result; no chart needed");
        }

        let numeric = &classification.numeric_columns;
        let categorical = &classification.categorical_columns;
        let dates = &classification.date_columns;
        let mut suggestions = Vec::new();

        if let (true, Some(x), Some(y)) = (classification.is_time_series, dates.first(), numeric.first()) {
            suggestions.push(suggestion(
                ChartKind::Line,
                ChartBindings::Axes { x_column: x.clone(), y_column: y.clone() },
                "Trend over time",
                "Shows how the value changes over time",
            ));
        }

        if let (Some(category), Some(value)) = (categorical.first(), numeric.first()) {
            suggestions.push(suggestion(
                ChartKind::Bar,
                ChartBindings::Axes { x_column: category.clone(), y_column: value.clone() },
                "Comparison by category",
                "Compares values across categories",
            ));
            if rows.len() <= PIE_MAX_ROWS {
                suggestions.push(suggestion(
                    ChartKind::Pie,
                    ChartBindings::Slices { labels_column: category.clone(), values_column: value.clone() },
                    "Share by category",
                    "Shows each category's share of the total",
                ));
            }
        }

        if let [first, second, ..] = numeric.as_slice() {
            suggestions.push(suggestion(
                ChartKind::Scatter,
                ChartBindings::Axes { x_column: first.clone(), y_column: second.clone() },
                "Correlation",
                "Relates two numeric measures",
            ));
        }

        suggestions.truncate(MAX_SUGGESTIONS);
        if let Some(first) = suggestions.first_mut() {
            first.primary = true;
        }

        VisualizationAdvice {
            should_visualize: true,
            reason: None,
            primary_suggestion: suggestions.first().cloned(),
            suggestions,
        }
    }
}
