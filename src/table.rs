use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The 21 fixed UN five-year age bands, youngest first.
///
/// Every loaded table and every resolved series is ordered by this list,
/// regardless of the column order of the source file.
pub const AGE_BANDS: [&str; 21] = [
    "0-4", "5-9", "10-14", "15-19", "20-24", "25-29", "30-34", "35-39", "40-44", "45-49", "50-54",
    "55-59", "60-64", "65-69", "70-74", "75-79", "80-84", "85-89", "90-94", "95-99", "100+",
];

/// Number of age bands in a series.
pub const BAND_COUNT: usize = AGE_BANDS.len();

/// Header label of the country/region column in UN WPP exports.
pub const REGION_COLUMN: &str = "Region, subregion, country or area *";

/// Header label of the year column in UN WPP exports.
pub const YEAR_COLUMN: &str = "Year";

lazy_static! {
    static ref BAND_LABEL_REGEX: Regex = Regex::new(r"^(\d{1,3}-\d{1,3}|100\+)$").unwrap();
}

/// Returns true if a trimmed header label looks like an age-band column.
///
/// The loader uses this to warn about band-looking header labels that fail
/// the exact match against [`AGE_BANDS`], e.g. a differently bucketed
/// export; near-misses are never silently remapped.
pub fn is_band_label(label: &str) -> bool {
    BAND_LABEL_REGEX.is_match(label)
}

/// One data row of a population table: a (region, year) key plus one value
/// per age band, in [`AGE_BANDS`] order. Values are in thousands of persons.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PopulationRow {
    pub region: String,
    pub year: i32,
    pub bands: [f64; BAND_COUNT],
}

/// An in-memory population table for one sex, rows kept in original file
/// order. The (region, year) pair is expected unique per table but
/// duplicates are tolerated; see [`PopulationTable::resolve`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PopulationTable {
    pub rows: Vec<PopulationRow>,
    /// Non-numeric or empty age-band cells that were zero-filled on load.
    pub coerced_cells: usize,
    /// Data rows dropped on load because their year cell was not an integer.
    pub skipped_rows: usize,
}

impl PopulationTable {
    /// Resolves a (country, year) selection to its 21 band values.
    ///
    /// Matching is exact: the country string as stored (case-sensitive) and
    /// the integer year. Returns `None` when no row matches - an expected,
    /// non-fatal outcome the caller reports as a per-slot warning. When the
    /// source data contains duplicate (country, year) rows, the first row in
    /// original file order wins; use [`match_count`](Self::match_count) to
    /// surface a diagnostic for that case.
    ///
    /// Pure function of the table and its arguments: repeated calls on an
    /// unchanged table always return the same values.
    pub fn resolve(&self, country: &str, year: i32) -> Option<&[f64; BAND_COUNT]> {
        self.rows
            .iter()
            .find(|row| row.region == country && row.year == year)
            .map(|row| &row.bands)
    }

    /// Number of rows matching a (country, year) pair. Anything above 1
    /// means the source file carried duplicates.
    pub fn match_count(&self, country: &str, year: i32) -> usize {
        self.rows
            .iter()
            .filter(|row| row.region == country && row.year == year)
            .count()
    }

    /// Distinct region/country names, sorted.
    pub fn countries(&self) -> Vec<String> {
        let set: BTreeSet<&str> = self.rows.iter().map(|row| row.region.as_str()).collect();
        set.into_iter().map(str::to_owned).collect()
    }

    /// Distinct years, sorted ascending.
    pub fn years(&self) -> Vec<i32> {
        let set: BTreeSet<i32> = self.rows.iter().map(|row| row.year).collect();
        set.into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
