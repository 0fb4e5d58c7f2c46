//! Length, area and perimeter measurement with unit-aware labels.

use crate::feature::{Feature, props};
use crate::geometry::{Geometry, ring_area};
use kurbo::{Line, Point};
use serde::{Deserialize, Serialize};

/// Raw lengths above this switch AUTO to kilometres.
pub const AUTO_LENGTH_CUTOFF: f64 = 1_000.0;
/// Raw areas above this switch AUTO to square kilometres.
pub const AUTO_AREA_CUTOFF: f64 = 1_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LengthUnit {
    Meters,
    Kilometers,
    #[default]
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AreaUnit {
    SquareMeters,
    SquareKilometers,
    Hectare,
    #[default]
    Auto,
}

/// Number rendering rules for the active locale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumberFormat {
    pub decimal_separator: char,
    pub group_separator: char,
    /// Integer parts shorter than `3 + min_grouping_digits` stay ungrouped.
    pub min_grouping_digits: usize,
}

impl Default for NumberFormat {
    fn default() -> Self {
        Self {
            decimal_separator: '.',
            group_separator: ' ',
            min_grouping_digits: 2,
        }
    }
}

impl NumberFormat {
    /// Round to `precision` decimals and apply separators.
    pub fn format(&self, value: f64, precision: usize) -> String {
        let fixed = format!("{:.*}", precision, value.abs());
        let (int_part, frac_part) = match fixed.split_once('.') {
            Some((i, f)) => (i, Some(f)),
            None => (fixed.as_str(), None),
        };

        let mut out = String::new();
        if value < 0.0 && fixed.chars().any(|c| c.is_ascii_digit() && c != '0') {
            out.push('-');
        }
        if int_part.len() >= 3 + self.min_grouping_digits.max(1) {
            let lead = int_part.len() % 3;
            for (i, c) in int_part.chars().enumerate() {
                if i > 0 && (i + 3 - lead) % 3 == 0 {
                    out.push(self.group_separator);
                }
                out.push(c);
            }
        } else {
            out.push_str(int_part);
        }
        if let Some(frac) = frac_part {
            out.push(self.decimal_separator);
            out.push_str(frac);
        }
        out
    }
}

/// Measurement display settings. Mutated by the UI layer only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementSettings {
    pub length_unit: LengthUnit,
    pub area_unit: AreaUnit,
    pub show_text: bool,
    pub show_area: bool,
    pub show_length: bool,
    pub show_perimeter: bool,
    /// Decimal places.
    pub precision: usize,
    pub number_format: NumberFormat,
}

impl Default for MeasurementSettings {
    fn default() -> Self {
        Self {
            length_unit: LengthUnit::Auto,
            area_unit: AreaUnit::Auto,
            show_text: true,
            show_area: true,
            show_length: true,
            show_perimeter: false,
            precision: 1,
            number_format: NumberFormat::default(),
        }
    }
}

/// Raw measurements of a geometry, in map units.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Measurement {
    pub length: Option<f64>,
    pub area: Option<f64>,
    pub perimeter: Option<f64>,
}

impl Measurement {
    pub fn of(geometry: &Geometry) -> Self {
        match geometry {
            Geometry::Point(_) | Geometry::MultiPoint(_) => Self::default(),
            Geometry::LineString(coords) => Self {
                length: Some(path_length(coords)),
                ..Self::default()
            },
            Geometry::MultiLineString(lines) => Self {
                length: Some(lines.iter().map(|l| path_length(l)).sum()),
                ..Self::default()
            },
            Geometry::Polygon(rings) => Self {
                area: Some(polygon_area(rings)),
                perimeter: Some(outer_perimeter(rings)),
                ..Self::default()
            },
            Geometry::MultiPolygon(polygons) => Self {
                area: Some(polygons.iter().map(|rings| polygon_area(rings)).sum()),
                perimeter: Some(polygons.iter().map(|rings| outer_perimeter(rings)).sum()),
                ..Self::default()
            },
        }
    }
}

fn path_length(coords: &[Point]) -> f64 {
    coords.windows(2).map(|w| Line::new(w[0], w[1]).length()).sum()
}

fn outer_perimeter(rings: &[Vec<Point>]) -> f64 {
    rings.first().map(|outer| path_length(outer)).unwrap_or(0.0)
}

fn polygon_area(rings: &[Vec<Point>]) -> f64 {
    match rings.split_first() {
        Some((outer, holes)) => {
            let hole_area: f64 = holes.iter().map(|h| ring_area(h)).sum();
            (ring_area(outer) - hole_area).max(0.0)
        }
        None => 0.0,
    }
}

/// Format a length in metres per the settings.
pub fn format_length(meters: f64, settings: &MeasurementSettings) -> String {
    let fmt = &settings.number_format;
    let p = settings.precision;
    let km = match settings.length_unit {
        LengthUnit::Meters => false,
        LengthUnit::Kilometers => true,
        LengthUnit::Auto => meters > AUTO_LENGTH_CUTOFF,
    };
    if km {
        format!("{} km", fmt.format(meters / 1_000.0, p))
    } else {
        format!("{} m", fmt.format(meters, p))
    }
}

/// Format an area in square metres per the settings.
pub fn format_area(square_meters: f64, settings: &MeasurementSettings) -> String {
    let fmt = &settings.number_format;
    let p = settings.precision;
    match settings.area_unit {
        AreaUnit::SquareMeters => format!("{} m²", fmt.format(square_meters, p)),
        AreaUnit::SquareKilometers => format!("{} km²", fmt.format(square_meters / 1_000_000.0, p)),
        AreaUnit::Hectare => format!("{} ha", fmt.format(square_meters / 10_000.0, p)),
        AreaUnit::Auto if square_meters > AUTO_AREA_CUTOFF => {
            format!("{} km²", fmt.format(square_meters / 1_000_000.0, p))
        }
        AreaUnit::Auto => format!("{} m²", fmt.format(square_meters, p)),
    }
}

/// Label text for a geometry. Empty when nothing is to be shown.
pub fn measure_geometry(geometry: &Geometry, settings: &MeasurementSettings) -> String {
    if !settings.show_text {
        return String::new();
    }
    let m = Measurement::of(geometry);
    let mut label = String::new();

    if let Some(length) = m.length {
        if settings.show_length {
            label.push_str(&format_length(length, settings));
        }
    }
    if let Some(area) = m.area {
        if settings.show_area {
            if settings.show_perimeter {
                label.push_str("Area: ");
            }
            label.push_str(&format_area(area, settings));
        }
    }
    if let Some(perimeter) = m.perimeter {
        if settings.show_perimeter {
            label.push_str("\nOmkrets: ");
            label.push_str(&format_length(perimeter, settings));
        }
    }
    label
}

/// Label text for a feature; guides and geometry-less features get none.
pub fn measure(feature: &Feature, settings: &MeasurementSettings) -> String {
    match feature.geometry() {
        Some(geometry) if !feature.is_overlay() => measure_geometry(geometry, settings),
        _ => String::new(),
    }
}

/// Attach the measurement label as the feature's rendering-time text.
pub fn apply_measurement_label(feature: &mut Feature, settings: &MeasurementSettings) {
    let label = measure(feature, settings);
    if label.is_empty() {
        feature.properties.remove(props::MEASUREMENT_LABEL);
    } else {
        feature.set_property_silent(props::MEASUREMENT_LABEL, label);
    }
}
