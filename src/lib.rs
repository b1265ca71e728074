/*!
# Population Pyramid Generator

A browser-based tool for turning UN World Population Prospects spreadsheets
into population pyramid charts, built in Rust.

## Overview

The user uploads two spreadsheet files - male and female population counts
by country, year and 5-year age band - picks up to six (country, year)
combinations, and gets one mirrored horizontal bar chart per selection,
with optional on-bar value labels and a per-band data table, downloadable
as PNG.

## Architecture

- **Table Loader** (`loader`): parses an uploaded XLSX or CSV file into an
  in-memory table. The UN export layout is fixed: 16 leading non-data rows,
  then a header row that must carry the region and year columns plus the 21
  age-band columns. Non-numeric age-band cells are zero-filled and counted.
- **Series Resolver** (`table`): given a table, a country and a year,
  extracts the 21 band values in fixed band order, or reports NotFound.
  Duplicate (country, year) rows resolve to the first row in file order.
- **Pyramid Renderer** (`pyramid`): turns a male/female series pair into a
  PNG chart (male left, female right, youngest band at the bottom) plus an
  optional male/female/total table.
- **Session Orchestrator** (`session`): owns the two tables and the pending
  selections. Selections are pure state updates; a single explicit generate
  call resolves and renders the whole batch and arranges the results in
  rows of three.
- **Web layer** (`app`, feature `web`): axum routes for uploads, option
  lists, selections, the generate trigger and per-pyramid PNG download.

## Error handling

A bad upload fails that file's load only (`LoadError`) and keeps any
previously loaded table. A selection missing from one table is a per-slot
warning, never a crash. Nothing here terminates the session.

## REST API Endpoints

- `POST /api/upload/{male|female}` - upload one spreadsheet
- `GET /api/options` - countries/years common to both tables
- `POST /api/selections` - store up to six (country, year) pairs
- `POST /api/generate` - render all selections in one batch
- `GET /api/pyramid/{id}` - download one generated chart as PNG
*/

pub mod app;
pub mod loader;
pub mod pyramid;
pub mod session;
pub mod table;

/// Re-export the core types for easier use
pub use loader::{LoadError, load_population_table};
pub use pyramid::{BandRow, Pyramid, PyramidOptions, render_pyramid};
pub use session::{GeneratedPyramid, GenerationReport, Selection, Session, SessionError};
pub use table::{AGE_BANDS, BAND_COUNT, PopulationRow, PopulationTable};
