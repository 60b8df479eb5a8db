//! US EPA AQI breakpoints and unit conversion.
//!
//! AQICN reports individual pollutants as EPA sub-indices rather than
//! concentrations. These tables convert in both directions so every
//! canonical pollutant field holds µg/m³.
//!
//! Gas conversions assume 25 °C and 1 atm (molar volume 24.45 L).

/// Molar volume of an ideal gas at 25 °C, 1 atm, in litres.
const MOLAR_VOLUME: f64 = 24.45;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pollutant {
    Pm25,
    Pm10,
    O3,
    No2,
    So2,
    Co,
}

#[derive(Debug, Clone, Copy)]
struct Breakpoint {
    c_lo: f64,
    c_hi: f64,
    i_lo: f64,
    i_hi: f64,
}

const fn bp(c_lo: f64, c_hi: f64, i_lo: f64, i_hi: f64) -> Breakpoint {
    Breakpoint {
        c_lo,
        c_hi,
        i_lo,
        i_hi,
    }
}

// µg/m³, 24-hour
const PM25: [Breakpoint; 7] = [
    bp(0.0, 12.0, 0.0, 50.0),
    bp(12.1, 35.4, 51.0, 100.0),
    bp(35.5, 55.4, 101.0, 150.0),
    bp(55.5, 150.4, 151.0, 200.0),
    bp(150.5, 250.4, 201.0, 300.0),
    bp(250.5, 350.4, 301.0, 400.0),
    bp(350.5, 500.4, 401.0, 500.0),
];

// µg/m³, 24-hour
const PM10: [Breakpoint; 7] = [
    bp(0.0, 54.0, 0.0, 50.0),
    bp(55.0, 154.0, 51.0, 100.0),
    bp(155.0, 254.0, 101.0, 150.0),
    bp(255.0, 354.0, 151.0, 200.0),
    bp(355.0, 424.0, 201.0, 300.0),
    bp(425.0, 504.0, 301.0, 400.0),
    bp(505.0, 604.0, 401.0, 500.0),
];

// ppm, 8-hour up to 300, 1-hour above
const O3: [Breakpoint; 7] = [
    bp(0.0, 0.054, 0.0, 50.0),
    bp(0.055, 0.070, 51.0, 100.0),
    bp(0.071, 0.085, 101.0, 150.0),
    bp(0.086, 0.105, 151.0, 200.0),
    bp(0.106, 0.200, 201.0, 300.0),
    bp(0.405, 0.504, 301.0, 400.0),
    bp(0.505, 0.604, 401.0, 500.0),
];

// ppb, 1-hour
const NO2: [Breakpoint; 7] = [
    bp(0.0, 53.0, 0.0, 50.0),
    bp(54.0, 100.0, 51.0, 100.0),
    bp(101.0, 360.0, 101.0, 150.0),
    bp(361.0, 649.0, 151.0, 200.0),
    bp(650.0, 1249.0, 201.0, 300.0),
    bp(1250.0, 1649.0, 301.0, 400.0),
    bp(1650.0, 2049.0, 401.0, 500.0),
];

// ppb, 1-hour
const SO2: [Breakpoint; 7] = [
    bp(0.0, 35.0, 0.0, 50.0),
    bp(36.0, 75.0, 51.0, 100.0),
    bp(76.0, 185.0, 101.0, 150.0),
    bp(186.0, 304.0, 151.0, 200.0),
    bp(305.0, 604.0, 201.0, 300.0),
    bp(605.0, 804.0, 301.0, 400.0),
    bp(805.0, 1004.0, 401.0, 500.0),
];

// ppm, 8-hour
const CO: [Breakpoint; 7] = [
    bp(0.0, 4.4, 0.0, 50.0),
    bp(4.5, 9.4, 51.0, 100.0),
    bp(9.5, 12.4, 101.0, 150.0),
    bp(12.5, 15.4, 151.0, 200.0),
    bp(15.5, 30.4, 201.0, 300.0),
    bp(30.5, 40.4, 301.0, 400.0),
    bp(40.5, 50.4, 401.0, 500.0),
];

impl Pollutant {
    pub const ALL: [Pollutant; 6] = [
        Pollutant::Pm25,
        Pollutant::Pm10,
        Pollutant::O3,
        Pollutant::No2,
        Pollutant::So2,
        Pollutant::Co,
    ];

    fn table(self) -> &'static [Breakpoint] {
        match self {
            Pollutant::Pm25 => &PM25,
            Pollutant::Pm10 => &PM10,
            Pollutant::O3 => &O3,
            Pollutant::No2 => &NO2,
            Pollutant::So2 => &SO2,
            Pollutant::Co => &CO,
        }
    }

    /// µg/m³ per unit of the table's native concentration.
    fn ugm3_per_native(self) -> f64 {
        match self {
            Pollutant::Pm25 | Pollutant::Pm10 => 1.0,
            // ppm
            Pollutant::O3 => 1000.0 * 48.00 / MOLAR_VOLUME,
            Pollutant::Co => 1000.0 * 28.01 / MOLAR_VOLUME,
            // ppb
            Pollutant::No2 => 46.01 / MOLAR_VOLUME,
            Pollutant::So2 => 64.07 / MOLAR_VOLUME,
        }
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Concentration in µg/m³ for an EPA sub-index.
pub fn concentration_from_aqi(pollutant: Pollutant, aqi: f64) -> Option<f64> {
    if !aqi.is_finite() || aqi < 0.0 {
        return None;
    }
    let table = pollutant.table();
    let segment = table
        .iter()
        .find(|b| aqi <= b.i_hi)
        .or_else(|| table.last())?;

    let native = (aqi - segment.i_lo) * (segment.c_hi - segment.c_lo)
        / (segment.i_hi - segment.i_lo)
        + segment.c_lo;
    Some(round_to(native.max(0.0) * pollutant.ugm3_per_native(), 1))
}

/// EPA sub-index for a concentration in µg/m³.
pub fn aqi_from_concentration(pollutant: Pollutant, ugm3: f64) -> Option<f64> {
    if !ugm3.is_finite() || ugm3 < 0.0 {
        return None;
    }
    let native = ugm3 / pollutant.ugm3_per_native();
    let table = pollutant.table();
    let position = table
        .iter()
        .position(|b| native <= b.c_hi)
        .unwrap_or(table.len() - 1);
    let segment = table[position];

    let mut aqi = (segment.i_hi - segment.i_lo) / (segment.c_hi - segment.c_lo)
        * (native - segment.c_lo)
        + segment.i_lo;
    // Between two segments (the O3 8-hour/1-hour split): hold the lower ceiling
    if native < segment.c_lo && position > 0 {
        aqi = aqi.clamp(table[position - 1].i_hi, segment.i_lo);
    }
    Some(aqi.max(0.0).round())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pm25_breakpoints() {
        assert_eq!(concentration_from_aqi(Pollutant::Pm25, 0.0), Some(0.0));
        assert_eq!(concentration_from_aqi(Pollutant::Pm25, 50.0), Some(12.0));
        assert_eq!(concentration_from_aqi(Pollutant::Pm25, 100.0), Some(35.4));
        assert_eq!(aqi_from_concentration(Pollutant::Pm25, 35.4), Some(100.0));
    }

    #[test]
    fn test_pm10_midpoint() {
        // 51..100 maps 55..154 linearly
        let c = concentration_from_aqi(Pollutant::Pm10, 75.5).unwrap();
        assert!((c - 104.5).abs() < 0.1, "got {c}");
    }

    #[test]
    fn test_gas_conversion_to_micrograms() {
        // 53 ppb NO2 ≈ 99.7 µg/m³
        let c = concentration_from_aqi(Pollutant::No2, 50.0).unwrap();
        assert!((c - 99.7).abs() < 0.1, "got {c}");

        // 4.4 ppm CO ≈ 5040.7 µg/m³
        let c = concentration_from_aqi(Pollutant::Co, 50.0).unwrap();
        assert!((c - 5040.7).abs() < 0.5, "got {c}");
    }

    #[test]
    fn test_round_trip_is_close() {
        for pollutant in Pollutant::ALL {
            for aqi in [10.0, 42.0, 75.0, 120.0, 180.0, 250.0] {
                let c = concentration_from_aqi(pollutant, aqi).unwrap();
                let back = aqi_from_concentration(pollutant, c).unwrap();
                assert!(
                    (back - aqi).abs() <= 2.0,
                    "{pollutant:?}: {aqi} -> {c} -> {back}"
                );
            }
        }
    }

    #[test]
    fn test_invalid_inputs() {
        assert_eq!(concentration_from_aqi(Pollutant::O3, -5.0), None);
        assert_eq!(aqi_from_concentration(Pollutant::So2, f64::NAN), None);
    }

    #[test]
    fn test_o3_gap_holds_upper_8_hour_index() {
        let per_ppm = Pollutant::O3.ugm3_per_native();
        assert_eq!(aqi_from_concentration(Pollutant::O3, 0.200 * per_ppm), Some(300.0));
        assert_eq!(aqi_from_concentration(Pollutant::O3, 392.6), Some(300.0));
        assert_eq!(aqi_from_concentration(Pollutant::O3, 450.0), Some(300.0));
        assert_eq!(aqi_from_concentration(Pollutant::O3, 0.405 * per_ppm), Some(301.0));
    }

    #[test]
    fn test_aqi_never_decreases_with_concentration() {
        for pollutant in Pollutant::ALL {
            let top = pollutant.table().last().unwrap().c_hi * pollutant.ugm3_per_native();
            let mut previous = 0.0;
            for step in 0..=2000 {
                let ugm3 = top * f64::from(step) / 2000.0;
                let aqi = aqi_from_concentration(pollutant, ugm3).unwrap();
                assert!(aqi >= previous, "{pollutant:?}: {ugm3} -> {aqi} < {previous}");
                previous = aqi;
            }
        }
    }
}
