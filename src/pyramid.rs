use crate::table::{AGE_BANDS, BAND_COUNT};
use image::ImageEncoder;
use plotters::prelude::*;
use serde::Serialize;
use std::error::Error;

/// Male bar fill.
const MALE_COLOR: RGBColor = RGBColor(52, 152, 219);
/// Female bar fill.
const FEMALE_COLOR: RGBColor = RGBColor(231, 76, 60);

/// Configuration options for pyramid rendering.
#[derive(Clone, Debug)]
pub struct PyramidOptions {
    /// Annotate each bar with its numeric value.
    pub show_value_labels: bool,

    /// Also produce a row-per-band numeric table (male/female/total).
    pub show_table: bool,

    /// Width of the chart in pixels.
    pub width: u32,

    /// Height of the chart in pixels.
    pub height: u32,
}

impl Default for PyramidOptions {
    fn default() -> Self {
        Self {
            show_value_labels: true,
            show_table: true,
            width: 800,
            height: 600,
        }
    }
}

/// One row of the optional data table, values in thousands.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct BandRow {
    pub age_group: &'static str,
    pub male: f64,
    pub female: f64,
    pub total: f64,
}

/// A rendered pyramid: the PNG image plus its summary numbers and the
/// optional per-band table.
#[derive(Clone, Debug)]
pub struct Pyramid {
    pub country: String,
    pub year: i32,
    pub png: Vec<u8>,
    pub table: Option<Vec<BandRow>>,
    pub total_male: f64,
    pub total_female: f64,
    pub total: f64,
}

/// Builds the row-per-band summary table for a pair of series.
pub fn data_table(male: &[f64; BAND_COUNT], female: &[f64; BAND_COUNT]) -> Vec<BandRow> {
    AGE_BANDS
        .iter()
        .enumerate()
        .map(|(i, label)| BandRow {
            age_group: label,
            male: male[i],
            female: female[i],
            total: male[i] + female[i],
        })
        .collect()
}

/// Renders a population pyramid for one (country, year) pair.
///
/// Layout is a mirrored horizontal bar chart: bands on the vertical axis
/// with the youngest at the bottom, male magnitude extending left, female
/// extending right, both from a shared zero baseline. Values are in
/// thousands of persons. All-zero series render as zero-length bars; the
/// axis extent falls back to a unit range so the chart never divides by a
/// zero maximum.
///
/// # Arguments
/// * `male` - male counts per band, in fixed band order
/// * `female` - female counts per band, in fixed band order
/// * `country` - originating country/region label
/// * `year` - originating year
/// * `options` - display options
///
/// # Returns
/// * A Result containing the rendered [`Pyramid`] or an error
pub fn render_pyramid(
    male: &[f64; BAND_COUNT],
    female: &[f64; BAND_COUNT],
    country: &str,
    year: i32,
    options: &PyramidOptions,
) -> Result<Pyramid, Box<dyn Error>> {
    let total_male: f64 = male.iter().sum();
    let total_female: f64 = female.iter().sum();

    let (width, height) = (options.width, options.height);
    let mut buffer = vec![0u8; (width * height * 3) as usize];

    {
        let root =
            BitMapBackend::with_buffer(&mut buffer, (width, height)).into_drawing_area();
        root.fill(&WHITE)?;

        let max_val = male
            .iter()
            .chain(female.iter())
            .fold(0.0f64, |acc, &v| acc.max(v));
        // Guard against an all-zero pair: keep a non-degenerate axis.
        let x_extent = if max_val > 0.0 { max_val * 1.15 } else { 1.0 };

        let mut chart = ChartBuilder::on(&root)
            .caption(
                format!("Population Pyramid: {} ({})", country, year),
                ("sans-serif", 24).into_font(),
            )
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(55)
            .build_cartesian_2d(-x_extent..x_extent, 0.0..BAND_COUNT as f64)?;

        chart
            .configure_mesh()
            .x_desc("Population (thousands)")
            .y_desc("Age Group")
            .y_labels(BAND_COUNT)
            .x_label_formatter(&|x| format!("{:.0}k", x.abs()))
            .y_label_formatter(&|y| {
                AGE_BANDS
                    .get(y.floor() as usize)
                    .map(|s| s.to_string())
                    .unwrap_or_default()
            })
            .draw()?;

        // Male bars extend left from the shared zero baseline.
        chart
            .draw_series(male.iter().enumerate().map(|(i, &v)| {
                Rectangle::new(
                    [(-v, i as f64 + 0.1), (0.0, i as f64 + 0.9)],
                    MALE_COLOR.filled(),
                )
            }))?
            .label("Male")
            .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], MALE_COLOR.filled()));

        // Female bars extend right.
        chart
            .draw_series(female.iter().enumerate().map(|(i, &v)| {
                Rectangle::new(
                    [(0.0, i as f64 + 0.1), (v, i as f64 + 0.9)],
                    FEMALE_COLOR.filled(),
                )
            }))?
            .label("Female")
            .legend(|(x, y)| {
                Rectangle::new([(x, y - 5), (x + 10, y + 5)], FEMALE_COLOR.filled())
            });

        // Zero baseline
        chart.draw_series(LineSeries::new(
            vec![(0.0, 0.0), (0.0, BAND_COUNT as f64)],
            &BLACK,
        ))?;

        if options.show_value_labels {
            let label_font = ("sans-serif", 11).into_font().color(&BLACK);
            chart.draw_series(male.iter().enumerate().filter(|(_, &v)| v > 0.0).map(
                |(i, &v)| {
                    Text::new(
                        format!("{:.1}k", v),
                        (-v / 2.0, i as f64 + 0.5),
                        label_font.clone(),
                    )
                },
            ))?;
            chart.draw_series(female.iter().enumerate().filter(|(_, &v)| v > 0.0).map(
                |(i, &v)| {
                    Text::new(
                        format!("{:.1}k", v),
                        (v / 2.0, i as f64 + 0.5),
                        label_font.clone(),
                    )
                },
            ))?;
        }

        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperRight)
            .background_style(WHITE.mix(0.9))
            .border_style(BLACK)
            .draw()?;

        // Summary annotation in the upper-left corner of the drawing area.
        root.draw(&Text::new(
            format!(
                "Total: {:.1}k  Male: {:.1}k  Female: {:.1}k",
                total_male + total_female,
                total_male,
                total_female
            ),
            (70, 45),
            ("sans-serif", 14).into_font(),
        ))?;

        root.present()?;
    }

    // Encode the RGB buffer to PNG in memory.
    let mut png = Vec::new();
    image::codecs::png::PngEncoder::new(&mut png).write_image(
        &buffer,
        width,
        height,
        image::ColorType::Rgb8,
    )?;

    let table = if options.show_table {
        Some(data_table(male, female))
    } else {
        None
    };

    Ok(Pyramid {
        country: country.to_string(),
        year,
        png,
        table,
        total_male,
        total_female,
        total: total_male + total_female,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(fill: f64) -> [f64; BAND_COUNT] {
        [fill; BAND_COUNT]
    }

    fn ramp() -> [f64; BAND_COUNT] {
        let mut out = [0.0; BAND_COUNT];
        for (i, v) in out.iter_mut().enumerate() {
            *v = (BAND_COUNT - i) as f64 * 100.0;
        }
        out
    }

    #[test]
    fn renders_png_with_totals() {
        let male = ramp();
        let female = ramp();
        let pyramid =
            render_pyramid(&male, &female, "Testland", 2020, &PyramidOptions::default()).unwrap();

        // PNG signature
        assert_eq!(&pyramid.png[..8], b"\x89PNG\r\n\x1a\n");
        let expected: f64 = male.iter().sum::<f64>() + female.iter().sum::<f64>();
        assert_eq!(pyramid.total, expected);
        assert_eq!(pyramid.country, "Testland");
        assert_eq!(pyramid.year, 2020);
    }

    #[test]
    fn all_zero_series_render_without_error() {
        let zeros = series(0.0);
        let options = PyramidOptions {
            show_value_labels: true,
            ..PyramidOptions::default()
        };
        let pyramid = render_pyramid(&zeros, &zeros, "Emptyland", 1990, &options).unwrap();
        assert_eq!(pyramid.total, 0.0);
        assert!(!pyramid.png.is_empty());
    }

    #[test]
    fn table_is_optional_and_totals_per_band() {
        let male = series(2.0);
        let female = series(3.0);

        let with_table = render_pyramid(
            &male,
            &female,
            "Testland",
            2020,
            &PyramidOptions::default(),
        )
        .unwrap();
        let rows = with_table.table.expect("table requested");
        assert_eq!(rows.len(), BAND_COUNT);
        assert_eq!(rows[0].age_group, "0-4");
        assert_eq!(rows[BAND_COUNT - 1].age_group, "100+");
        assert!(rows.iter().all(|r| r.total == 5.0));

        let options = PyramidOptions {
            show_table: false,
            ..PyramidOptions::default()
        };
        let without = render_pyramid(&male, &female, "Testland", 2020, &options).unwrap();
        assert!(without.table.is_none());
    }

    #[test]
    fn zero_filled_band_renders() {
        let mut male = series(5.0);
        male[2] = 0.0; // zero-filled "10-14" cell
        let female = series(5.0);
        let pyramid =
            render_pyramid(&male, &female, "Testland", 2020, &PyramidOptions::default()).unwrap();
        let rows = pyramid.table.unwrap();
        assert_eq!(rows[2].male, 0.0);
        assert_eq!(rows[2].total, 5.0);
    }
}
