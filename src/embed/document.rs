//! Deterministic embedding input for a profile
//!
//! The indexed text is a human-readable serialization of the profile's
//! metadata and a coarse description of its depth coverage, never the
//! raw measurements. Two ingestion runs over the same input produce the
//! same document, so re-embedding is reproducible.

use crate::parse::ParsedProfile;
use crate::regions;
use chrono::Datelike;

/// Render the embedding document for one profile
pub fn profile_document(profile: &ParsedProfile, measurement_count: usize) -> String {
    let mut doc = format!("Argo float {}", profile.float_id);

    if let Some(institution) = profile
        .institution
        .as_deref()
        .filter(|s| !s.is_empty() && *s != "unknown")
    {
        doc.push_str(&format!(" deployed by {}", institution));
    }

    if let Some(cycle) = profile.cycle_number {
        doc.push_str(&format!(" (cycle {})", cycle));
    }

    if let Some(dt) = profile.datetime {
        if let Some(season) = regions::season_for_month(dt.month()) {
            doc.push_str(&format!(" in {} {}", season, dt.year()));
        }
    }

    let region = match (profile.latitude, profile.longitude) {
        (Some(lat), Some(lon)) => Some(regions::classify(lat, lon)),
        _ => None,
    };
    if let Some(region) = region {
        doc.push_str(&format!(" in the {}", region));
    }

    if let (Some(lat), Some(lon)) = (profile.latitude, profile.longitude) {
        doc.push_str(&format!(" at coordinates {:.2}°N, {:.2}°E", lat, lon));
    }

    doc.push_str(&format!(
        ". This oceanographic profile collected {} measurements",
        measurement_count
    ));

    if let Some(desc) = depth_description(profile.max_pressure) {
        doc.push(' ');
        doc.push_str(&desc);
    }

    doc.push_str(". The deployment provides oceanographic data for climate monitoring and marine research");
    if let Some(region) = region {
        doc.push_str(&format!(" in the {} region", region));
    }
    doc.push('.');

    doc
}

fn depth_description(max_pressure: Option<f64>) -> Option<String> {
    let max_depth = max_pressure? as i64;
    let phrase = match max_depth {
        d if d < 100 => "focusing on surface waters",
        d if d < 500 => "capturing upper ocean structure",
        d if d < 1000 => "reaching intermediate waters",
        d if d < 2000 => "sampling deep ocean layers",
        _ => "providing full-depth ocean profiling",
    };
    Some(format!("down to {}m depth, {}", max_depth, phrase))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_profile() -> ParsedProfile {
        ParsedProfile {
            float_id: "1902482".to_string(),
            cycle_number: Some(12),
            datetime: chrono::Utc.with_ymd_and_hms(2025, 1, 15, 0, 0, 0).single(),
            latitude: Some(15.25),
            longitude: Some(65.5),
            max_pressure: Some(1450.0),
            institution: Some("INCOIS".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_document_mentions_metadata_not_measurements() {
        let doc = profile_document(&sample_profile(), 112);

        assert!(doc.starts_with("Argo float 1902482 deployed by INCOIS (cycle 12)"));
        assert!(doc.contains("winter 2025"));
        assert!(doc.contains("Arabian Sea"));
        assert!(doc.contains("coordinates 15.25°N, 65.50°E"));
        assert!(doc.contains("112 measurements"));
        assert!(doc.contains("down to 1450m depth, sampling deep ocean layers"));
    }

    #[test]
    fn test_document_is_deterministic() {
        let profile = sample_profile();
        assert_eq!(
            profile_document(&profile, 112),
            profile_document(&profile, 112)
        );
    }

    #[test]
    fn test_document_degrades_without_position() {
        let mut profile = sample_profile();
        profile.latitude = None;
        profile.longitude = None;
        profile.institution = None;
        profile.max_pressure = None;

        let doc = profile_document(&profile, 0);
        assert!(doc.contains("Argo float 1902482"));
        assert!(doc.contains("0 measurements"));
        assert!(!doc.contains("deployed by"));
        assert!(!doc.contains("coordinates"));
    }
}
