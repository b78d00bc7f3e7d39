//! Answer synthesis
//!
//! Data answers are templated straight from the result rows, so the
//! narrative can never cite a value the rows do not contain.
//! Informational answers prefer the configured narrator and fall back
//! to built-in explanations when it is absent or failing.

use super::intent::{ClassifiedQuery, Parameter};
use super::TableData;
use crate::config::AnswerConfig;
use crate::narrate::Narrator;
use tracing::warn;

/// Answer an informational query, degrading to the template library on
/// any narrator fault
pub async fn informational(
    query: &str,
    narrator: Option<&dyn Narrator>,
    config: &AnswerConfig,
) -> String {
    if let Some(narrator) = narrator {
        let prompt = format!(
            "Answer in at most {} sentences, for an oceanographic data assistant: {}",
            config.max_sentences_informational, query
        );
        match narrator.narrate(&prompt).await {
            Ok(text) => return clamp_sentences(&text, config.max_sentences_informational),
            Err(e) => warn!("narrator unavailable, using template answer: {}", e),
        }
    }

    clamp_sentences(
        template_informational(&query.to_lowercase()),
        config.max_sentences_informational,
    )
}

/// Built-in explanations for common informational questions
fn template_informational(query_lower: &str) -> &'static str {
    if query_lower.contains("thermocline") {
        "The thermocline is the depth zone where temperature drops most rapidly, \
         separating warm surface waters from the cold deep ocean. Argo profiles \
         resolve it well because floats sample continuously on their way up. \
         Its depth varies by region and season."
    } else if query_lower.contains("salinity") {
        "Salinity measures the dissolved salt content of seawater, reported in \
         practical salinity units. Argo floats measure it with conductivity \
         sensors on every profile. Together with temperature it determines \
         seawater density and drives ocean circulation."
    } else if query_lower.contains("what data") || query_lower.contains("capabilit") {
        "This service indexes Argo float profiles with per-level temperature, \
         salinity, and pressure measurements. You can ask for a specific float, \
         a named region such as the Arabian Sea, a time window, or free-text \
         similarity over profile descriptions. Results come back as tables and \
         map points."
    } else {
        "Argo floats are autonomous drifting instruments that cycle between the \
         surface and about 2000 m depth roughly every ten days. On each ascent \
         they record a vertical profile of temperature, salinity, and pressure, \
         then transmit it by satellite. Thousands of floats together provide \
         global, year-round coverage of the ocean interior."
    }
}

/// Summarize result rows into a short narrative
pub fn summarize_table(
    classified: &ClassifiedQuery,
    table: &TableData,
    config: &AnswerConfig,
) -> String {
    if table.rows.is_empty() {
        let mut text = String::from("No data matched your query.");
        if let Some(region) = classified.entities.regions.first() {
            text.push_str(&format!(" The {} filter may be too narrow.", region));
        }
        text.push_str(" Try broadening the region, time window, or depth range.");
        return clamp_sentences(&text, config.max_sentences_data);
    }

    let binned = table.columns.iter().any(|c| c == "depth_range");
    let mut sentences: Vec<String> = Vec::new();

    let mut scope = format!(
        "Found {} {}",
        table.total_rows,
        if binned { "depth bins" } else { "matching rows" }
    );
    if let Some(region) = classified.entities.regions.first() {
        scope.push_str(&format!(" in the {}", region));
    }
    if let Some((start, end)) = &classified.entities.time_range {
        scope.push_str(&format!(
            " between {} and {}",
            &start[..10.min(start.len())],
            &end[..10.min(end.len())]
        ));
    }
    scope.push('.');
    sentences.push(scope);

    let parameters = if classified.entities.parameters.is_empty() {
        vec![Parameter::Temperature, Parameter::Salinity]
    } else {
        classified.entities.parameters.clone()
    };

    for parameter in &parameters {
        let column = parameter.column();
        let stats = if binned {
            column_stats(table, &format!("avg_{}", column))
        } else {
            column_stats(table, column)
        };
        if let Some(stats) = stats {
            sentences.push(format!(
                "{} ranges from {:.2} to {:.2} {} with a mean of {:.2}.",
                capitalize(column),
                stats.min,
                stats.max,
                parameter_unit(*parameter),
                stats.mean
            ));
        }
    }

    if let Some(floats) = unique_count(table, "float_id") {
        sentences.push(format!("The data comes from {} distinct floats.", floats));
    }

    if binned {
        if let (Some(first), Some(last)) = (
            text_value(&table.rows[0], "depth_range"),
            text_value(&table.rows[table.rows.len() - 1], "depth_range"),
        ) {
            sentences.push(format!(
                "The depth profile spans the {} bin down to the {} bin.",
                first, last
            ));
        }
    }

    clamp_sentences(&sentences.join(" "), config.max_sentences_data)
}

fn parameter_unit(parameter: Parameter) -> &'static str {
    match parameter {
        Parameter::Temperature => "°C",
        Parameter::Salinity => "PSU",
        Parameter::Pressure => "dbar",
    }
}

struct ColumnStats {
    min: f64,
    max: f64,
    mean: f64,
}

fn column_stats(table: &TableData, column: &str) -> Option<ColumnStats> {
    let values: Vec<f64> = table
        .rows
        .iter()
        .filter_map(|row| row.get(column).and_then(|v| v.as_f64()))
        .collect();

    if values.is_empty() {
        return None;
    }

    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    Some(ColumnStats { min, max, mean })
}

fn unique_count(table: &TableData, column: &str) -> Option<usize> {
    if !table.columns.iter().any(|c| c == column) {
        return None;
    }
    let mut seen: Vec<String> = table
        .rows
        .iter()
        .filter_map(|row| row.get(column).and_then(|v| v.as_str()).map(String::from))
        .collect();
    seen.sort();
    seen.dedup();
    if seen.is_empty() {
        None
    } else {
        Some(seen.len())
    }
}

fn text_value(row: &serde_json::Value, column: &str) -> Option<String> {
    row.get(column).and_then(|v| v.as_str()).map(String::from)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Trim prose to a sentence budget
fn clamp_sentences(text: &str, max: usize) -> String {
    let mut out = String::new();
    let mut count = 0usize;

    for chunk in text.split_inclusive(['.', '!', '?']) {
        out.push_str(chunk);
        if chunk.ends_with(['.', '!', '?']) {
            count += 1;
            if count >= max {
                break;
            }
        }
    }

    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narrate::stub::StubNarrator;
    use crate::query::intent::classify;
    use serde_json::json;

    fn config() -> AnswerConfig {
        AnswerConfig::default()
    }

    fn sentence_count(text: &str) -> usize {
        text.matches(['.', '!', '?']).count()
    }

    #[tokio::test]
    async fn test_informational_uses_narrator_when_available() {
        let narrator = StubNarrator::replying("Floats drift. They profile. They report.");
        let text = informational("What are Argo floats?", Some(&narrator), &config()).await;
        assert_eq!(text, "Floats drift. They profile. They report.");
    }

    #[tokio::test]
    async fn test_informational_degrades_to_template() {
        let narrator = StubNarrator::failing();
        let text = informational("What are Argo floats?", Some(&narrator), &config()).await;
        assert!(text.contains("Argo floats"));
        let n = sentence_count(&text);
        assert!((2..=4).contains(&n), "got {} sentences: {}", n, text);
    }

    #[tokio::test]
    async fn test_template_sentence_budget() {
        for query in [
            "What are Argo floats?",
            "what is a thermocline",
            "what data do you have",
        ] {
            let text = informational(query, None, &config()).await;
            let n = sentence_count(&text);
            assert!((2..=4).contains(&n), "'{}' gave {} sentences", query, n);
        }
    }

    #[test]
    fn test_empty_rows_suggest_broadening() {
        let classified = classify("temperature in the Arabian Sea");
        let table = TableData {
            columns: vec!["depth_range".to_string()],
            rows: vec![],
            total_rows: 0,
        };
        let text = summarize_table(&classified, &table, &config());
        assert!(text.contains("No data matched"));
        assert!(text.contains("Arabian Sea"));
        assert!(text.contains("broadening"));
    }

    #[test]
    fn test_binned_summary_cites_only_row_values() {
        let classified = classify("temperature in the Arabian Sea");
        let table = TableData {
            columns: vec![
                "depth_range".to_string(),
                "avg_temperature".to_string(),
                "min_temperature".to_string(),
                "max_temperature".to_string(),
                "measurement_count".to_string(),
            ],
            rows: vec![
                json!({"depth_range": "0-50m", "avg_temperature": 28.0, "min_temperature": 27.0, "max_temperature": 29.0, "measurement_count": 40}),
                json!({"depth_range": "50-100m", "avg_temperature": 24.0, "min_temperature": 23.0, "max_temperature": 25.0, "measurement_count": 38}),
            ],
            total_rows: 2,
        };

        let text = summarize_table(&classified, &table, &config());
        assert!(text.contains("2 depth bins"));
        assert!(text.contains("Arabian Sea"));
        assert!(text.contains("24.00") || text.contains("28.00"));
        assert!(text.contains("0-50m"));
        assert!(sentence_count(&text) <= config().max_sentences_data);
    }

    #[test]
    fn test_raw_summary_counts_floats() {
        let classified = classify("Get data from float 1902482");
        let table = TableData {
            columns: vec![
                "float_id".to_string(),
                "temperature".to_string(),
                "salinity".to_string(),
            ],
            rows: vec![
                json!({"float_id": "1902482", "temperature": 27.5, "salinity": 35.2}),
                json!({"float_id": "1902482", "temperature": 18.0, "salinity": 35.4}),
            ],
            total_rows: 2,
        };

        let text = summarize_table(&classified, &table, &config());
        assert!(text.contains("2 matching rows"));
        assert!(text.contains("1 distinct floats"));
    }
}
