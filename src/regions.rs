//! Named ocean regions and coordinate classification
//!
//! The gazetteer maps region names to bounding boxes for spatial query
//! synthesis; the reverse mapping classifies a profile's coordinates
//! into a region name for vector metadata and embedding documents.

use crate::store::BoundingBox;

/// Gazetteer entry: canonical name, match keys, bounding box
pub struct Region {
    pub name: &'static str,
    keys: &'static [&'static str],
    pub bbox: BoundingBox,
}

/// Named regions in gazetteer priority order; more specific basins come
/// before the enclosing ocean
pub const REGIONS: &[Region] = &[
    Region {
        name: "Arabian Sea",
        keys: &["arabian sea", "arabian"],
        bbox: BoundingBox {
            lat_min: 0.0,
            lat_max: 30.0,
            lon_min: 50.0,
            lon_max: 80.0,
        },
    },
    Region {
        name: "Bay of Bengal",
        keys: &["bay of bengal", "bengal"],
        bbox: BoundingBox {
            lat_min: 0.0,
            lat_max: 30.0,
            lon_min: 80.0,
            lon_max: 100.0,
        },
    },
    Region {
        name: "Southern Indian Ocean",
        keys: &["southern indian ocean"],
        bbox: BoundingBox {
            lat_min: -40.0,
            lat_max: 0.0,
            lon_min: 20.0,
            lon_max: 120.0,
        },
    },
    Region {
        name: "Northern Indian Ocean",
        keys: &["northern indian ocean"],
        bbox: BoundingBox {
            lat_min: 0.0,
            lat_max: 30.0,
            lon_min: 20.0,
            lon_max: 120.0,
        },
    },
    Region {
        name: "Indian Ocean",
        keys: &["indian ocean"],
        bbox: BoundingBox::INDIAN_OCEAN,
    },
];

impl Region {
    /// Whether the query text mentions this region
    pub fn matches(&self, query_lower: &str) -> bool {
        self.keys.iter().any(|k| query_lower.contains(k))
    }
}

/// Look up a named region mentioned in a query string
pub fn find_region(query_lower: &str) -> Option<&'static Region> {
    REGIONS
        .iter()
        .find(|r| r.keys.iter().any(|k| query_lower.contains(k)))
}

/// Look up a region by its canonical name
pub fn region_by_name(name: &str) -> Option<&'static Region> {
    REGIONS.iter().find(|r| r.name.eq_ignore_ascii_case(name))
}

/// Classify coordinates into a region name. Basins take priority over
/// the ocean they belong to; everything else falls back to the
/// surrounding ocean.
pub fn classify(lat: f64, lon: f64) -> &'static str {
    if (20.0..=120.0).contains(&lon) {
        if (0.0..=30.0).contains(&lat) {
            if (50.0..=80.0).contains(&lon) {
                return "Arabian Sea";
            }
            if (80.0..=100.0).contains(&lon) {
                return "Bay of Bengal";
            }
            return "Northern Indian Ocean";
        }
        if (-40.0..0.0).contains(&lat) {
            return "Southern Indian Ocean";
        }
        if lat > 30.0 {
            return "Northern Indian Ocean";
        }
        return "Indian Ocean";
    }

    if lon > 120.0 || lon < -80.0 {
        return if lat > 0.0 {
            "North Pacific Ocean"
        } else {
            "South Pacific Ocean"
        };
    }

    if lat > 0.0 {
        "North Atlantic Ocean"
    } else {
        "South Atlantic Ocean"
    }
}

/// Northern Hemisphere season for a calendar month
pub fn season_for_month(month: u32) -> Option<&'static str> {
    match month {
        12 | 1 | 2 => Some("winter"),
        3..=5 => Some("spring"),
        6..=8 => Some("summer"),
        9..=11 => Some("autumn"),
        _ => None,
    }
}

/// Month span for a named season within a year, as half-open RFC 3339
/// bounds. Winter spans the year boundary and is anchored to its
/// December.
pub fn season_bounds(season: &str, year: i32) -> Option<(String, String)> {
    let (start, end) = match season {
        "winter" => (
            format!("{}-12-01T00:00:00+00:00", year),
            format!("{}-03-01T00:00:00+00:00", year + 1),
        ),
        "spring" => (
            format!("{}-03-01T00:00:00+00:00", year),
            format!("{}-06-01T00:00:00+00:00", year),
        ),
        "summer" => (
            format!("{}-06-01T00:00:00+00:00", year),
            format!("{}-09-01T00:00:00+00:00", year),
        ),
        "autumn" | "fall" => (
            format!("{}-09-01T00:00:00+00:00", year),
            format!("{}-12-01T00:00:00+00:00", year),
        ),
        _ => return None,
    };
    Some((start, end))
}

/// Depth band from maximum profile pressure (decibars approximate
/// meters)
pub fn depth_band(max_pressure: f64) -> &'static str {
    if max_pressure < 100.0 {
        "surface"
    } else if max_pressure < 500.0 {
        "shallow"
    } else if max_pressure < 1000.0 {
        "intermediate"
    } else {
        "deep"
    }
}
