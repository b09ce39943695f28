//! Parameter and level lookup tables.
//!
//! Translates GRIB2 numeric codes into the short names used by parameter
//! selectors (`TMP`, `DPT`, `WIND`) and into readable level descriptions.
//! [`Grib2Tables::ncep`] carries the codes that appear in NCEP analysis
//! products; callers can extend it for local tables.

use std::collections::HashMap;

/// Lookup key for parameter: (discipline, category, number)
pub type ParamKey = (u8, u8, u8);

/// Level description, either fixed text or a template with `{value}`.
#[derive(Debug, Clone)]
pub enum LevelDescription {
    Static(String),
    Template(String),
}

impl LevelDescription {
    pub fn format(&self, value: f64) -> String {
        match self {
            LevelDescription::Static(s) => s.clone(),
            LevelDescription::Template(t) => t.replace("{value}", &format_level_value(value)),
        }
    }
}

fn format_level_value(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Grib2Tables {
    parameters: HashMap<ParamKey, String>,
    levels: HashMap<u8, LevelDescription>,
}

impl Grib2Tables {
    /// Create empty tables
    pub fn new() -> Self {
        Self::default()
    }

    /// WMO and NCEP local codes found in surface analysis products.
    pub fn ncep() -> Self {
        let mut t = Self::new();

        for (key, name) in [
            ((0, 0, 0), "TMP"),
            ((0, 0, 6), "DPT"),
            ((0, 0, 4), "TMAX"),
            ((0, 0, 5), "TMIN"),
            ((0, 1, 0), "SPFH"),
            ((0, 1, 1), "RH"),
            ((0, 1, 8), "APCP"),
            ((0, 2, 0), "WDIR"),
            ((0, 2, 1), "WIND"),
            ((0, 2, 2), "UGRD"),
            ((0, 2, 3), "VGRD"),
            ((0, 2, 22), "GUST"),
            ((0, 3, 0), "PRES"),
            ((0, 3, 1), "PRMSL"),
            ((0, 3, 5), "HGT"),
            ((0, 6, 1), "TCDC"),
            ((0, 6, 13), "CEIL"),
            ((0, 19, 0), "VIS"),
            ((0, 19, 2), "TSTM"),
            ((0, 2, 192), "VWSH"),
            ((0, 6, 198), "CEIL"),
        ] {
            t.add_parameter(key.0, key.1, key.2, name.to_string());
        }

        t.add_level(1, LevelDescription::Static("surface".to_string()));
        t.add_level(2, LevelDescription::Static("cloud base".to_string()));
        t.add_level(3, LevelDescription::Static("cloud top".to_string()));
        t.add_level(10, LevelDescription::Static("entire atmosphere".to_string()));
        t.add_level(100, LevelDescription::Template("{value} Pa".to_string()));
        t.add_level(101, LevelDescription::Static("mean sea level".to_string()));
        t.add_level(102, LevelDescription::Template("{value} m above MSL".to_string()));
        t.add_level(103, LevelDescription::Template("{value} m above ground".to_string()));
        t.add_level(200, LevelDescription::Static("entire atmosphere".to_string()));
        t.add_level(215, LevelDescription::Static("cloud ceiling".to_string()));
        t
    }

    pub fn add_parameter(&mut self, discipline: u8, category: u8, number: u8, name: String) {
        self.parameters.insert((discipline, category, number), name);
    }

    pub fn add_level(&mut self, level_type: u8, description: LevelDescription) {
        self.levels.insert(level_type, description);
    }

    /// Parameter short name, or `P{discipline}_{category}_{number}` when unknown.
    pub fn get_parameter_name(&self, discipline: u8, category: u8, number: u8) -> String {
        self.parameters
            .get(&(discipline, category, number))
            .cloned()
            .unwrap_or_else(|| format!("P{}_{}_{}", discipline, category, number))
    }

    /// Level description, or `Level type {type} value {value}` when unknown.
    pub fn get_level_description(&self, level_type: u8, level_value: f64) -> String {
        match self.levels.get(&level_type) {
            Some(desc) => desc.format(level_value),
            None => format!(
                "Level type {} value {}",
                level_type,
                format_level_value(level_value)
            ),
        }
    }

    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty() && self.levels.is_empty()
    }
}
