//! Markdown rendering of the catalog

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use super::CatalogRow;
use crate::{isoformat_utc, Datasource, Entity};

const SAMPLE_ROWS: usize = 20;

/// Render the catalog report
///
/// Sections: datasources, countries with region counts, coverage status
/// counts and the first rows of the catalog.
pub fn render_catalog_markdown(
    countries: &[Entity],
    regions: &[Entity],
    datasources: &[Datasource],
    rows: &[CatalogRow],
    generated_at: DateTime<Utc>,
) -> String {
    let mut region_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for region in regions {
        *region_counts
            .entry(region.parent_country_id.as_deref().unwrap_or(""))
            .or_insert(0) += 1;
    }

    let mut lines: Vec<String> = Vec::new();
    lines.push("# IODA Entity Catalog (West Africa)".to_string());
    lines.push(String::new());
    lines.push(format!("- Generated at: `{}`", isoformat_utc(generated_at)));
    lines.push(format!("- Countries discovered (target set): `{}`", countries.len()));
    lines.push(format!("- Regions discovered (target set): `{}`", regions.len()));
    lines.push(format!("- Datasources discovered: `{}`", datasources.len()));
    lines.push(String::new());
    lines.push("## Datasources".to_string());
    lines.push(String::new());
    for ds in datasources {
        lines.push(format!(
            "- `{}`: {} (units: {})",
            ds.datasource,
            ds.name.as_deref().unwrap_or(""),
            ds.units.as_deref().unwrap_or("")
        ));
    }
    lines.push(String::new());
    lines.push("## Countries and Region Counts".to_string());
    lines.push(String::new());
    lines.push("| Country Code | Country Name | Regions |".to_string());
    lines.push("|---|---|---:|".to_string());
    for country in countries {
        lines.push(format!(
            "| {} | {} | {} |",
            country.code,
            country.name.as_deref().unwrap_or(""),
            region_counts.get(country.code.as_str()).copied().unwrap_or(0)
        ));
    }

    if !rows.is_empty() {
        let mut status_counts: BTreeMap<&str, usize> = BTreeMap::new();
        for row in rows {
            let status = row.coverage_status.map_or("null", |s| s.as_str());
            *status_counts.entry(status).or_insert(0) += 1;
        }
        let ok_rows = status_counts.get("ok").copied().unwrap_or(0);

        lines.push(String::new());
        lines.push("## Coverage Summary".to_string());
        lines.push(String::new());
        lines.push(format!("- Catalog rows (entity x metric): `{}`", rows.len()));
        lines.push(format!("- Coverage rows with status `ok`: `{ok_rows}`"));
        lines.push("- Coverage status counts:".to_string());
        for (status, count) in &status_counts {
            lines.push(format!("  - `{status}`: {count}"));
        }

        lines.push(String::new());
        lines.push(format!("### Sample Rows (first {SAMPLE_ROWS})"));
        lines.push(String::new());
        lines.push("| level | entity_id | entity_name | metric | min | max | status |".to_string());
        lines.push("|---|---|---|---|---|---|---|".to_string());
        for row in rows.iter().take(SAMPLE_ROWS) {
            lines.push(format!(
                "| {} | {} | {} | {} | {} | {} | {} |",
                row.level,
                row.entity_id,
                row.entity_name.as_deref().unwrap_or(""),
                row.metric,
                row.coverage_min_utc.as_deref().unwrap_or(""),
                row.coverage_max_utc.as_deref().unwrap_or(""),
                row.coverage_status.map_or("", |s| s.as_str())
            ));
        }
    }
    lines.push(String::new());
    lines.join("\n")
}
