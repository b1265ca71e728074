use pyramid::loader::load_population_table;
use pyramid::pyramid::PyramidOptions;
use pyramid::session::{Selection, Session};
use std::env;
use std::fs;

/// Headless renderer: loads the two spreadsheets, generates one pyramid per
/// (country, year) pair and writes the PNGs to the current directory.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 5 || (args.len() - 3) % 2 != 0 {
        eprintln!(
            "Usage: {} <male.xlsx|csv> <female.xlsx|csv> <country> <year> [<country> <year> ...]",
            args[0]
        );
        std::process::exit(2);
    }

    let mut session = Session::new();
    session.load_male(load_population_table(&args[1])?);
    session.load_female(load_population_table(&args[2])?);

    let mut selections = Vec::new();
    for pair in args[3..].chunks(2) {
        selections.push(Selection {
            country: pair[0].clone(),
            year: pair[1].parse()?,
        });
    }
    session.set_selections(selections)?;

    let report = session.generate(&PyramidOptions::default())?;
    for warning in &report.warnings {
        eprintln!("warning: {}", warning);
    }

    for result in session.results() {
        let filename = result.filename();
        fs::write(&filename, &result.pyramid.png)?;
        println!(
            "{} ({}): {} -> {} bytes",
            result.pyramid.country,
            result.pyramid.year,
            filename,
            result.pyramid.png.len()
        );
    }

    Ok(())
}
