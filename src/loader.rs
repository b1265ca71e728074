use crate::table::{
    AGE_BANDS, BAND_COUNT, PopulationRow, PopulationTable, REGION_COLUMN, YEAR_COLUMN,
    is_band_label,
};
use calamine::{Data, Reader, Xlsx, open_workbook};
use log::{debug, info, warn};
use std::error::Error;
use std::fmt;
use std::fs;
use std::io::Cursor;
use std::path::Path;

/// Leading non-data rows before the header row in UN WPP exports.
pub const HEADER_SKIP_ROWS: usize = 16;

/// Failure to turn an uploaded file into a [`PopulationTable`].
///
/// Fatal to that file's load only: the caller keeps any previously loaded
/// table unless the new upload succeeds and replaces it.
#[derive(Debug)]
pub enum LoadError {
    /// Required columns absent from the header row, listed by label.
    MissingColumns(Vec<String>),
    /// The file has no header row at the expected offset.
    Empty,
    /// Underlying file error.
    Io(std::io::Error),
    /// Workbook could not be opened or its first sheet read.
    Sheet(String),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::MissingColumns(cols) => write!(
                f,
                "required columns missing from header row: {}",
                cols.join(", ")
            ),
            LoadError::Empty => write!(f, "no header row found at row {}", HEADER_SKIP_ROWS + 1),
            LoadError::Io(e) => write!(f, "i/o error: {}", e),
            LoadError::Sheet(msg) => write!(f, "workbook error: {}", msg),
        }
    }
}

impl Error for LoadError {}

impl From<std::io::Error> for LoadError {
    fn from(e: std::io::Error) -> Self {
        LoadError::Io(e)
    }
}

/// Column positions of the required fields within one file's header row.
struct ColumnIndexes {
    region: usize,
    year: usize,
    bands: [usize; BAND_COUNT],
}

/// Header labels that look like age bands but match none of the 21 exact
/// [`AGE_BANDS`] labels (e.g. "1-4" from a differently bucketed export).
/// Near-misses are never silently remapped, only warned about.
fn band_lookalikes(headers: &[String]) -> Vec<String> {
    headers
        .iter()
        .map(|h| h.trim())
        .filter(|h| is_band_label(h) && !AGE_BANDS.contains(h))
        .map(str::to_owned)
        .collect()
}

/// Locates the region, year and the 21 age-band columns by exact label
/// (after trimming). Column order in the file is irrelevant; values are
/// always emitted in [`AGE_BANDS`] order.
fn header_indexes(headers: &[String]) -> Result<ColumnIndexes, LoadError> {
    let lookalikes = band_lookalikes(headers);
    if !lookalikes.is_empty() {
        warn!(
            "header columns resemble age bands but do not match the fixed schema: {}",
            lookalikes.join(", ")
        );
    }

    let mut missing = Vec::new();

    let find = |label: &str| headers.iter().position(|h| h.trim() == label);

    let region = find(REGION_COLUMN);
    let year = find(YEAR_COLUMN);
    if region.is_none() {
        missing.push(REGION_COLUMN.to_string());
    }
    if year.is_none() {
        missing.push(YEAR_COLUMN.to_string());
    }

    let mut bands = [0usize; BAND_COUNT];
    for (i, label) in AGE_BANDS.iter().enumerate() {
        match find(label) {
            Some(idx) => bands[i] = idx,
            None => missing.push(label.to_string()),
        }
    }

    if !missing.is_empty() {
        return Err(LoadError::MissingColumns(missing));
    }

    Ok(ColumnIndexes {
        region: region.unwrap(),
        year: year.unwrap(),
        bands,
    })
}

fn numeric_cell(cell: &Data) -> Option<f64> {
    match cell {
        Data::Int(i) => Some(*i as f64),
        Data::Float(f) => Some(*f),
        Data::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Parses an integer year from text, also accepting integral float spellings
/// like "2020.0". Same contract on the XLSX and CSV paths.
fn year_str(s: &str) -> Option<i32> {
    let trimmed = s.trim();
    trimmed.parse::<i32>().ok().or_else(|| {
        trimmed
            .parse::<f64>()
            .ok()
            .filter(|f| f.fract() == 0.0)
            .map(|f| f as i32)
    })
}

fn year_cell(cell: &Data) -> Option<i32> {
    match cell {
        Data::Int(i) => Some(*i as i32),
        // Excel readers hand integer columns back as floats
        Data::Float(f) if f.fract() == 0.0 => Some(*f as i32),
        Data::String(s) => year_str(s),
        _ => None,
    }
}

/// Builds a [`PopulationTable`] from a calamine cell range.
///
/// Skips [`HEADER_SKIP_ROWS`] leading rows, reads the header, then one data
/// row per line. Non-numeric, empty or negative age-band cells are
/// zero-filled; non-numeric text and negative values are counted in
/// `coerced_cells`. Rows whose region is blank or whose year cell is not an
/// integer are dropped and counted in `skipped_rows`.
fn table_from_range(range: &calamine::Range<Data>) -> Result<PopulationTable, LoadError> {
    // The range starts at the first used cell, which may already be past
    // some of the leading junk rows.
    let start_row = range.start().map(|(r, _)| r as usize).unwrap_or(0);
    let skip = HEADER_SKIP_ROWS.saturating_sub(start_row);

    let mut rows_iter = range.rows().skip(skip);
    let header_row = rows_iter.next().ok_or(LoadError::Empty)?;
    let headers: Vec<String> = header_row.iter().map(|c| c.to_string()).collect();
    let indexes = header_indexes(&headers)?;

    let mut table = PopulationTable::default();

    for row in rows_iter {
        let region = match row.get(indexes.region) {
            Some(Data::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            _ => {
                table.skipped_rows += 1;
                continue;
            }
        };
        let year = match row.get(indexes.year).and_then(year_cell) {
            Some(y) => y,
            None => {
                table.skipped_rows += 1;
                continue;
            }
        };

        let mut bands = [0.0f64; BAND_COUNT];
        for (i, &col) in indexes.bands.iter().enumerate() {
            if let Some(cell) = row.get(col) {
                match numeric_cell(cell) {
                    Some(v) if v >= 0.0 => bands[i] = v,
                    // Band counts are non-negative; a negative cell is bad
                    // data, zero-filled like non-numeric text.
                    Some(_) => table.coerced_cells += 1,
                    None => {
                        if !matches!(cell, Data::Empty) {
                            table.coerced_cells += 1;
                        }
                    }
                }
            }
        }

        table.rows.push(PopulationRow {
            region,
            year,
            bands,
        });
    }

    debug!(
        "parsed {} rows ({} skipped, {} cells zero-filled)",
        table.rows.len(),
        table.skipped_rows,
        table.coerced_cells
    );

    Ok(table)
}

/// Loads a population table from an XLSX file on disk.
///
/// Reads the first worksheet only, per the UN WPP export layout.
pub fn from_excel(filepath: impl AsRef<Path>) -> Result<PopulationTable, LoadError> {
    let mut workbook: Xlsx<_> =
        open_workbook(filepath.as_ref()).map_err(|e: calamine::XlsxError| LoadError::Sheet(e.to_string()))?;
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| LoadError::Sheet("no sheets found in workbook".to_string()))?;
    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| LoadError::Sheet(e.to_string()))?;

    let table = table_from_range(&range)?;
    info!(
        "loaded {} rows from {}",
        table.rows.len(),
        filepath.as_ref().display()
    );
    Ok(table)
}

/// Loads a population table from in-memory XLSX bytes (browser upload).
pub fn from_excel_bytes(bytes: &[u8]) -> Result<PopulationTable, LoadError> {
    let mut workbook =
        Xlsx::new(Cursor::new(bytes)).map_err(|e| LoadError::Sheet(e.to_string()))?;
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| LoadError::Sheet("no sheets found in workbook".to_string()))?;
    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| LoadError::Sheet(e.to_string()))?;
    table_from_range(&range)
}

/// Loads a population table from CSV text with the same layout contract as
/// the XLSX path: 16 leading rows skipped, header row, then data rows.
pub fn from_csv_str(content: &str) -> Result<PopulationTable, LoadError> {
    let mut lines = content.lines().skip(HEADER_SKIP_ROWS);
    let header_line = lines.next().ok_or(LoadError::Empty)?;
    let headers = parse_csv_row(header_line);
    let indexes = header_indexes(&headers)?;

    let mut table = PopulationTable::default();

    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let fields = parse_csv_row(line);

        let region = match fields.get(indexes.region).map(|s| s.trim()) {
            Some(r) if !r.is_empty() => r.to_string(),
            _ => {
                table.skipped_rows += 1;
                continue;
            }
        };
        let year = match fields.get(indexes.year).and_then(|s| year_str(s)) {
            Some(y) => y,
            None => {
                table.skipped_rows += 1;
                continue;
            }
        };

        let mut bands = [0.0f64; BAND_COUNT];
        for (i, &col) in indexes.bands.iter().enumerate() {
            let raw = fields.get(col).map(|s| s.trim()).unwrap_or("");
            match raw.parse::<f64>() {
                Ok(v) if v >= 0.0 => bands[i] = v,
                Ok(_) => table.coerced_cells += 1,
                Err(_) => {
                    if !raw.is_empty() {
                        table.coerced_cells += 1;
                    }
                }
            }
        }

        table.rows.push(PopulationRow {
            region,
            year,
            bands,
        });
    }

    Ok(table)
}

/// Loads a population table from a CSV file on disk.
pub fn from_csv(filepath: impl AsRef<Path>) -> Result<PopulationTable, LoadError> {
    let content = fs::read_to_string(filepath)?;
    from_csv_str(&content)
}

/// Detects the format from the file extension and loads accordingly.
pub fn load_population_table(filepath: impl AsRef<Path>) -> Result<PopulationTable, LoadError> {
    let path = filepath.as_ref();
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase());

    match extension.as_deref() {
        Some("csv") => from_csv(path),
        Some("xlsx") | Some("xls") => from_excel(path),
        Some(ext) => Err(LoadError::Sheet(format!(
            "unsupported file extension: {}",
            ext
        ))),
        None => Err(LoadError::Sheet("file has no extension".to_string())),
    }
}

/// Detects the format of an in-memory upload from its filename and loads
/// accordingly.
pub fn load_population_bytes(filename: &str, bytes: &[u8]) -> Result<PopulationTable, LoadError> {
    let lower = filename.to_lowercase();
    if lower.ends_with(".csv") {
        from_csv_str(&String::from_utf8_lossy(bytes))
    } else {
        from_excel_bytes(bytes)
    }
}

// Parse a CSV row into a vector of strings, honoring quoted fields and
// doubled quotes.
fn parse_csv_row(line: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current_field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                if let Some(&next) = chars.peek() {
                    if next == '"' && in_quotes {
                        // Double quote inside quoted field - add a single quote
                        current_field.push('"');
                        chars.next();
                    } else {
                        in_quotes = !in_quotes;
                    }
                } else {
                    in_quotes = !in_quotes;
                }
            }
            ',' if !in_quotes => {
                result.push(current_field);
                current_field = String::new();
            }
            _ => current_field.push(c),
        }
    }

    result.push(current_field);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook;

    /// Writes a UN-WPP-shaped workbook: 16 filler rows, a header row, then
    /// the given data rows. `band_order` controls the band column order in
    /// the file so tests can verify output order never depends on it.
    fn write_fixture(path: &std::path::Path, band_order: &[&str], rows: &[(&str, i32, Vec<&str>)]) {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();

        for r in 0..HEADER_SKIP_ROWS as u32 {
            worksheet
                .write_string(r, 0, "World Population Prospects 2024")
                .unwrap();
        }

        let header = HEADER_SKIP_ROWS as u32;
        worksheet.write_string(header, 0, REGION_COLUMN).unwrap();
        worksheet.write_string(header, 1, "Notes").unwrap();
        worksheet.write_string(header, 2, YEAR_COLUMN).unwrap();
        for (i, label) in band_order.iter().enumerate() {
            worksheet
                .write_string(header, 3 + i as u16, *label)
                .unwrap();
        }

        for (r, (region, year, cells)) in rows.iter().enumerate() {
            let row = header + 1 + r as u32;
            if !region.is_empty() {
                worksheet.write_string(row, 0, *region).unwrap();
            }
            worksheet.write_number(row, 2, *year as f64).unwrap();
            for (c, cell) in cells.iter().enumerate() {
                let col = 3 + c as u16;
                match cell.parse::<f64>() {
                    Ok(v) => {
                        worksheet.write_number(row, col, v).unwrap();
                    }
                    Err(_) => {
                        if !cell.is_empty() {
                            worksheet.write_string(row, col, *cell).unwrap();
                        }
                    }
                }
            }
        }

        workbook.save(path).unwrap();
    }

    fn counting_cells() -> Vec<String> {
        (0..BAND_COUNT)
            .map(|i| format!("{}", (i + 1) * 10))
            .collect()
    }

    #[test]
    fn excel_load_maps_bands_in_fixed_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("male.xlsx");

        // Reverse the band columns in the file; output must stay in
        // AGE_BANDS order.
        let reversed: Vec<&str> = AGE_BANDS.iter().rev().copied().collect();
        let cells = counting_cells();
        let cell_refs: Vec<&str> = cells.iter().map(|s| s.as_str()).collect();
        write_fixture(&path, &reversed, &[("Testland", 2020, cell_refs)]);

        let table = from_excel(&path).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.coerced_cells, 0);

        let series = table.resolve("Testland", 2020).unwrap();
        // File column 0 was "100+" holding 10, so band index 20 must be 10.
        assert_eq!(series[20], 10.0);
        // File's last band column was "0-4" holding 210.
        assert_eq!(series[0], 210.0);
    }

    #[test]
    fn excel_load_zero_fills_and_counts_coerced_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("male.xlsx");

        let mut cells = counting_cells();
        cells[2] = "...".to_string(); // "10-14"
        cells[5] = String::new(); // "25-29": empty, zeroed but not coerced
        let cell_refs: Vec<&str> = cells.iter().map(|s| s.as_str()).collect();
        write_fixture(&path, &AGE_BANDS, &[("Testland", 2020, cell_refs)]);

        let table = from_excel(&path).unwrap();
        assert_eq!(table.coerced_cells, 1);

        let series = table.resolve("Testland", 2020).unwrap();
        assert_eq!(series[2], 0.0);
        assert_eq!(series[5], 0.0);
        assert_eq!(series[0], 10.0);
    }

    #[test]
    fn excel_load_rejects_missing_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.xlsx");

        // Drop the "0-4" column entirely.
        let partial: Vec<&str> = AGE_BANDS.iter().skip(1).copied().collect();
        write_fixture(&path, &partial, &[]);

        match from_excel(&path) {
            Err(LoadError::MissingColumns(cols)) => {
                assert_eq!(cols, vec!["0-4".to_string()]);
            }
            Err(other) => panic!("expected MissingColumns, got {}", other),
            Ok(_) => panic!("expected MissingColumns, got a table"),
        }
    }

    #[test]
    fn excel_load_skips_rows_without_region() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("male.xlsx");

        let cells = counting_cells();
        let cell_refs: Vec<&str> = cells.iter().map(|s| s.as_str()).collect();
        write_fixture(
            &path,
            &AGE_BANDS,
            &[("Testland", 2020, cell_refs.clone()), ("", 2021, cell_refs)],
        );

        let table = from_excel(&path).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.skipped_rows, 1);
    }

    fn csv_fixture(rows: &[String]) -> String {
        let mut out = String::new();
        for _ in 0..HEADER_SKIP_ROWS {
            out.push_str("World Population Prospects 2024\n");
        }
        out.push_str(&format!(
            "\"{}\",Notes,{},{}\n",
            REGION_COLUMN,
            YEAR_COLUMN,
            AGE_BANDS.join(",")
        ));
        for row in rows {
            out.push_str(row);
            out.push('\n');
        }
        out
    }

    #[test]
    fn csv_load_matches_excel_contract() {
        let values = counting_cells().join(",");
        let content = csv_fixture(&[
            format!("Testland,,2020,{}", values),
            format!("\"Land, with commas\",,2020,{}", values),
        ]);

        let table = from_csv_str(&content).unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.resolve("Land, with commas", 2020).is_some());

        let series = table.resolve("Testland", 2020).unwrap();
        assert_eq!(series[0], 10.0);
        assert_eq!(series[20], 210.0);
    }

    #[test]
    fn lookalike_band_headers_are_flagged_not_remapped() {
        let headers: Vec<String> = vec![
            "0-4".to_string(),
            "5-9 ".to_string(), // trims to an exact label, not a lookalike
            "1-4".to_string(),  // differently bucketed export
            YEAR_COLUMN.to_string(),
            "100+".to_string(),
        ];
        assert_eq!(band_lookalikes(&headers), vec!["1-4".to_string()]);
    }

    #[test]
    fn negative_band_cells_clamp_to_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("male.xlsx");

        let mut cells = counting_cells();
        cells[4] = "-7.5".to_string(); // "20-24"
        let cell_refs: Vec<&str> = cells.iter().map(|s| s.as_str()).collect();
        write_fixture(&path, &AGE_BANDS, &[("Testland", 2020, cell_refs)]);

        let table = from_excel(&path).unwrap();
        assert_eq!(table.coerced_cells, 1);

        let series = table.resolve("Testland", 2020).unwrap();
        assert_eq!(series[4], 0.0);
        assert!(series.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn csv_load_accepts_integral_float_years_and_clamps_negatives() {
        let mut values = counting_cells();
        values[3] = "-12".to_string(); // "15-19"
        let content = csv_fixture(&[
            format!("Testland,,2020.0,{}", values.join(",")),
            format!("Testland,,2021.5,{}", values.join(",")),
        ]);

        let table = from_csv_str(&content).unwrap();
        // The fractional year is still skipped; the integral float loads.
        assert_eq!(table.len(), 1);
        assert_eq!(table.skipped_rows, 1);
        assert_eq!(table.coerced_cells, 1);

        let series = table.resolve("Testland", 2020).unwrap();
        assert_eq!(series[3], 0.0);
        assert_eq!(series[0], 10.0);
    }

    #[test]
    fn csv_load_reports_missing_columns() {
        let mut content = String::new();
        for _ in 0..HEADER_SKIP_ROWS {
            content.push_str("junk\n");
        }
        content.push_str("Name,Year,0-4\n");

        match from_csv_str(&content) {
            Err(LoadError::MissingColumns(cols)) => {
                assert!(cols.contains(&REGION_COLUMN.to_string()));
                assert!(cols.contains(&"100+".to_string()));
            }
            _ => panic!("expected MissingColumns"),
        }
    }
}
