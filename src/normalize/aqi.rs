//! Shared AQI classification table.
//!
//! Every provider's numeric index is classified with the same bands so map
//! legends stay comparable regardless of the data source.

use crate::models::IndexEntry;

/// One AQI band: values up to and including `upper` (after rounding).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AqiBand {
    pub upper: f64,
    pub level: &'static str,
    pub description: &'static str,
    pub advice: &'static str,
    pub color: &'static str,
}

pub const AQI_BANDS: [AqiBand; 6] = [
    AqiBand {
        upper: 50.0,
        level: "Good",
        description: "Bardzo dobra",
        advice: "Jakość powietrza jest bardzo dobra. \
                 Idealne warunki do aktywności na zewnątrz.",
        color: "#00E400",
    },
    AqiBand {
        upper: 100.0,
        level: "Moderate",
        description: "Dobra",
        advice: "Jakość powietrza jest akceptowalna. \
                 Osoby bardzo wrażliwe powinny ograniczyć długi wysiłek na zewnątrz.",
        color: "#FFFF00",
    },
    AqiBand {
        upper: 150.0,
        level: "Unhealthy for Sensitive Groups",
        description: "Umiarkowana",
        advice: "Osoby wrażliwe powinny ograniczyć aktywność na zewnątrz.",
        color: "#FF7E00",
    },
    AqiBand {
        upper: 200.0,
        level: "Unhealthy",
        description: "Zła",
        advice: "Ogranicz przebywanie na zewnątrz. Osoby wrażliwe powinny go unikać.",
        color: "#FF0000",
    },
    AqiBand {
        upper: 300.0,
        level: "Very Unhealthy",
        description: "Bardzo zła",
        advice: "Unikaj aktywności na zewnątrz.",
        color: "#8F3F97",
    },
    AqiBand {
        upper: f64::INFINITY,
        level: "Hazardous",
        description: "Niebezpieczna",
        advice: "Pozostań w pomieszczeniach i zamknij okna.",
        color: "#7E0023",
    },
];

/// Band for an AQI value; `None` for negative or non-finite input.
///
/// Values are rounded to the nearest integer first, so 50.4 is still "good".
pub fn classify(aqi: f64) -> Option<&'static AqiBand> {
    if !aqi.is_finite() || aqi < 0.0 {
        return None;
    }
    let rounded = aqi.round();
    AQI_BANDS.iter().find(|band| rounded <= band.upper)
}

/// Build a fully classified index entry.
pub fn index_entry(name: &str, aqi: f64) -> Option<IndexEntry> {
    classify(aqi).map(|band| IndexEntry {
        name: name.to_string(),
        value: Some(aqi),
        level: band.level.to_string(),
        description: band.description.to_string(),
        advice: band.advice.to_string(),
        color: band.color.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_edges() {
        let cases = [
            (0.0, "Bardzo dobra"),
            (42.0, "Bardzo dobra"),
            (50.0, "Bardzo dobra"),
            (50.4, "Bardzo dobra"),
            (51.0, "Dobra"),
            (100.0, "Dobra"),
            (101.0, "Umiarkowana"),
            (120.0, "Umiarkowana"),
            (150.0, "Umiarkowana"),
            (151.0, "Zła"),
            (200.0, "Zła"),
            (201.0, "Bardzo zła"),
            (300.0, "Bardzo zła"),
            (301.0, "Niebezpieczna"),
            (999.0, "Niebezpieczna"),
        ];
        for (aqi, expected) in cases {
            assert_eq!(classify(aqi).unwrap().description, expected, "aqi {aqi}");
        }
    }

    #[test]
    fn test_invalid_values_are_unclassified() {
        assert!(classify(-1.0).is_none());
        assert!(classify(f64::NAN).is_none());
        assert!(index_entry("AQI", f64::INFINITY).is_none());
    }

    #[test]
    fn test_index_entry_keeps_raw_value() {
        let entry = index_entry("AQI", 120.0).unwrap();
        assert_eq!(entry.value, Some(120.0));
        assert_eq!(entry.level, "Unhealthy for Sensitive Groups");
        assert_eq!(entry.color, "#FF7E00");
    }
}
