//! Metadata completeness report
//!
//! Measures how much of the schema carries business comments. Comments are what
//! generation leans on to map business terms to columns, so this doubles as a
//! readiness indicator for natural-language querying.

use crate::schema::SchemaModel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const TABLE_COVERAGE_TARGET: f64 = 0.8;
const FIELD_COVERAGE_TARGET: f64 = 0.6;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableCoverage {
    pub table_comment: bool,
    /// Fraction of columns with a comment, 0..=1
    pub field_comment_coverage: f64,
    pub total_fields: usize,
    pub commented_fields: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageSummary {
    pub table_comment_coverage: f64,
    pub field_comment_coverage: f64,
    pub overall_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityLevel {
    Excellent,
    Good,
    Fair,
    NeedsImprovement,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataQuality {
    pub quality_level: QualityLevel,
    pub score: f64,
    pub advice: String,
    pub impact: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataCoverageReport {
    pub total_tables: usize,
    pub tables_with_comments: usize,
    pub tables_without_comments: Vec<String>,
    pub total_fields: usize,
    pub fields_with_comments: usize,
    pub metadata_coverage: BTreeMap<String, TableCoverage>,
    pub recommendations: Vec<String>,
    pub summary: CoverageSummary,
    pub quality: MetadataQuality,
}

impl MetadataCoverageReport {
    pub fn from_schema(schema: &SchemaModel) -> Self {
        let mut tables_with_comments = 0;
        let mut tables_without_comments = Vec::new();
        let mut total_fields = 0;
        let mut fields_with_comments = 0;
        let mut metadata_coverage = BTreeMap::new();

        for (name, table) in &schema.tables {
            if table.has_comment() {
                tables_with_comments += 1;
            } else {
                tables_without_comments.push(name.clone());
            }

            let commented = table.commented_columns();
            total_fields += table.columns.len();
            fields_with_comments += commented;

            metadata_coverage.insert(
                name.clone(),
                TableCoverage {
                    table_comment: table.has_comment(),
                    field_comment_coverage: ratio(commented, table.columns.len()),
                    total_fields: table.columns.len(),
                    commented_fields: commented,
                },
            );
        }

        let total_tables = schema.tables.len();
        let table_ratio = ratio(tables_with_comments, total_tables);
        let field_ratio = ratio(fields_with_comments, total_fields);

        let mut recommendations = Vec::new();
        if table_ratio < TABLE_COVERAGE_TARGET {
            recommendations.push(format!(
                "Add comments to {} tables",
                tables_without_comments.len()
            ));
        }
        if field_ratio < FIELD_COVERAGE_TARGET {
            recommendations.push(format!(
                "Add comments to {} fields",
                total_fields - fields_with_comments
            ));
        }

        let summary = CoverageSummary {
            table_comment_coverage: percent(table_ratio),
            field_comment_coverage: percent(field_ratio),
            overall_score: percent((table_ratio + field_ratio) / 2.0),
        };
        let quality = MetadataQuality::assess(summary.overall_score);

        Self {
            total_tables,
            tables_with_comments,
            tables_without_comments,
            total_fields,
            fields_with_comments,
            metadata_coverage,
            recommendations,
            summary,
            quality,
        }
    }
}

impl MetadataQuality {
    pub fn assess(score: f64) -> Self {
        let (quality_level, advice, impact) = if score >= 80.0 {
            (
                QualityLevel::Excellent,
                "Metadata quality is high; generated queries can rely on comments throughout.",
                "Comments let generation map business terms to the right tables and columns precisely.",
            )
        } else if score >= 60.0 {
            (
                QualityLevel::Good,
                "Metadata quality is good; fill in the remaining table and column comments.",
                "Most questions resolve correctly, though complex business terms may need extra context from the user.",
            )
        } else if score >= 40.0 {
            (
                QualityLevel::Fair,
                "Prioritise detailed comments on the core business tables.",
                "Some business terms may be mapped to the wrong columns; users should name fields explicitly.",
            )
        } else {
            (
                QualityLevel::NeedsImprovement,
                "Add business-meaning comments to every table and key column.",
                "Without comments, questions should name the exact tables and columns to get accurate SQL.",
            )
        };

        Self {
            quality_level,
            score,
            advice: advice.to_string(),
            impact: impact.to_string(),
        }
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

fn percent(ratio: f64) -> f64 {
    (ratio * 10_000.0).round() / 100.0
}
