use crate::pyramid::{Pyramid, PyramidOptions, render_pyramid};
use crate::table::PopulationTable;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use uuid::Uuid;

/// Maximum number of pyramids a session can generate in one batch.
pub const MAX_SELECTIONS: usize = 6;

/// Pyramids per row in the result grid.
pub const GRID_COLUMNS: usize = 3;

/// A user-chosen (country, year) pair designating one pyramid.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Selection {
    pub country: String,
    pub year: i32,
}

/// A pyramid produced by one generation batch, addressable by a slot-unique
/// id so two slots with the same (country, year) still download separately.
#[derive(Clone, Debug)]
pub struct GeneratedPyramid {
    pub id: Uuid,
    /// Zero-based position among the batch's selections.
    pub slot: usize,
    pub pyramid: Pyramid,
}

impl GeneratedPyramid {
    /// Download filename: country and year plus a slot-unique suffix.
    pub fn filename(&self) -> String {
        let country: String = self
            .pyramid
            .country
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        let id = self.id.simple().to_string();
        format!("pyramid_{}_{}_{}.png", country, self.pyramid.year, &id[..8])
    }
}

/// Invalid state transitions on a session.
#[derive(Debug, PartialEq)]
pub enum SessionError {
    TooManySelections(usize),
    TablesNotLoaded,
    /// A selection referenced a country or year not present in both tables.
    UnknownSelection(String),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::TooManySelections(n) => {
                write!(f, "{} selections requested, at most {} allowed", n, MAX_SELECTIONS)
            }
            SessionError::TablesNotLoaded => {
                write!(f, "both male and female tables must be loaded first")
            }
            SessionError::UnknownSelection(s) => {
                write!(f, "selection not offered by the loaded tables: {}", s)
            }
        }
    }
}

impl Error for SessionError {}

/// Outcome of one generation batch.
#[derive(Clone, Debug, Default, Serialize)]
pub struct GenerationReport {
    pub generated: usize,
    /// Per-slot warnings (missing data, render failures); never fatal.
    pub warnings: Vec<String>,
}

/// One user's working state: the two loaded tables, the pending selections
/// and the results of the last generation batch.
///
/// Selections are pure state updates; no resolution or rendering happens
/// until [`generate`](Self::generate) is called, and each call replaces the
/// previous result set wholesale.
#[derive(Debug, Default)]
pub struct Session {
    pub male: Option<PopulationTable>,
    pub female: Option<PopulationTable>,
    selections: Vec<Selection>,
    results: Vec<GeneratedPyramid>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the male table. A failed load never reaches this point, so
    /// a previously loaded table survives bad uploads.
    pub fn load_male(&mut self, table: PopulationTable) {
        info!("male table loaded: {} rows", table.len());
        self.male = Some(table);
    }

    /// Replaces the female table.
    pub fn load_female(&mut self, table: PopulationTable) {
        info!("female table loaded: {} rows", table.len());
        self.female = Some(table);
    }

    pub fn tables_loaded(&self) -> bool {
        self.male.is_some() && self.female.is_some()
    }

    /// Countries present in both tables, sorted. Empty until both tables
    /// are loaded.
    pub fn countries(&self) -> Vec<String> {
        match (&self.male, &self.female) {
            (Some(male), Some(female)) => {
                let female_set = female.countries();
                male.countries()
                    .into_iter()
                    .filter(|c| female_set.binary_search(c).is_ok())
                    .collect()
            }
            _ => Vec::new(),
        }
    }

    /// Years present in both tables, sorted ascending.
    pub fn years(&self) -> Vec<i32> {
        match (&self.male, &self.female) {
            (Some(male), Some(female)) => {
                let female_set = female.years();
                male.years()
                    .into_iter()
                    .filter(|y| female_set.binary_search(y).is_ok())
                    .collect()
            }
            _ => Vec::new(),
        }
    }

    pub fn selections(&self) -> &[Selection] {
        &self.selections
    }

    /// Replaces the pending selections. A pure state update: no resolution
    /// or rendering happens here. Selections must come from the closed
    /// choice offered by [`countries`](Self::countries) and
    /// [`years`](Self::years).
    pub fn set_selections(&mut self, selections: Vec<Selection>) -> Result<(), SessionError> {
        if selections.len() > MAX_SELECTIONS {
            return Err(SessionError::TooManySelections(selections.len()));
        }
        if !self.tables_loaded() {
            return Err(SessionError::TablesNotLoaded);
        }

        let countries = self.countries();
        let years = self.years();
        for selection in &selections {
            if countries.binary_search(&selection.country).is_err()
                || years.binary_search(&selection.year).is_err()
            {
                return Err(SessionError::UnknownSelection(format!(
                    "{} ({})",
                    selection.country, selection.year
                )));
            }
        }

        self.selections = selections;
        Ok(())
    }

    /// Runs the whole batch: resolves every selection against both tables
    /// and renders one pyramid per fully resolved pair. Replaces the
    /// previous result set. A selection missing from either table produces
    /// a warning and an empty slot; the other slots render normally.
    pub fn generate(&mut self, options: &PyramidOptions) -> Result<GenerationReport, SessionError> {
        let (male_table, female_table) = match (&self.male, &self.female) {
            (Some(m), Some(f)) => (m, f),
            _ => return Err(SessionError::TablesNotLoaded),
        };

        let mut results = Vec::new();
        let mut report = GenerationReport::default();

        for (slot, selection) in self.selections.iter().enumerate() {
            let country = selection.country.as_str();
            let year = selection.year;

            for (table, sex) in [(male_table, "male"), (female_table, "female")] {
                if table.match_count(country, year) > 1 {
                    warn!(
                        "duplicate {} rows for {} ({}); using the first",
                        sex, country, year
                    );
                }
            }

            let male = male_table.resolve(country, year);
            let female = female_table.resolve(country, year);

            let (male, female) = match (male, female) {
                (Some(m), Some(f)) => (m, f),
                (m, f) => {
                    let missing = match (m, f) {
                        (None, None) => "either table",
                        (None, _) => "the male table",
                        _ => "the female table",
                    };
                    let message =
                        format!("no data found for {} in {} ({})", country, year, missing);
                    warn!("{}", message);
                    report.warnings.push(message);
                    continue;
                }
            };

            match render_pyramid(male, female, country, year, options) {
                Ok(pyramid) => {
                    results.push(GeneratedPyramid {
                        id: Uuid::new_v4(),
                        slot,
                        pyramid,
                    });
                    report.generated += 1;
                }
                Err(e) => {
                    let message = format!("failed to render {} ({}): {}", country, year, e);
                    warn!("{}", message);
                    report.warnings.push(message);
                }
            }
        }

        info!(
            "generated {} of {} pyramids",
            report.generated,
            self.selections.len()
        );
        self.results = results;
        Ok(report)
    }

    pub fn results(&self) -> &[GeneratedPyramid] {
        &self.results
    }

    pub fn find_result(&self, id: Uuid) -> Option<&GeneratedPyramid> {
        self.results.iter().find(|r| r.id == id)
    }

    /// Results arranged for display: rows of at most [`GRID_COLUMNS`].
    pub fn grid(&self) -> Vec<&[GeneratedPyramid]> {
        self.results.chunks(GRID_COLUMNS).collect()
    }
}
