//! `placeload template` command - Print an importable CSV template

use console::style;
use miette::{IntoDiagnostic, Result};
use std::io::Write;

use crate::core::PlaceField;

#[derive(clap::Args, Debug)]
pub struct TemplateArgs {
    /// Include the id column (rows with an id update existing places)
    #[arg(long)]
    pub with_id: bool,

    /// Print the header row only
    #[arg(long)]
    pub no_example: bool,
}

pub fn run(args: TemplateArgs) -> Result<()> {
    let stdout = std::io::stdout();
    write_template(stdout.lock(), args.with_id, !args.no_example)?;

    // Hint goes to stderr so redirected output stays a clean CSV
    eprintln!();
    eprintln!(
        "{} Template generated. Redirect to file: placeload template > places.csv",
        style("→").blue()
    );
    Ok(())
}

fn template_fields(with_id: bool) -> &'static [PlaceField] {
    if with_id {
        PlaceField::all()
    } else {
        PlaceField::content()
    }
}

fn example_value(field: PlaceField) -> &'static str {
    match field {
        PlaceField::Id => "",
        PlaceField::Name => "Cafe Central",
        PlaceField::Type => "cafe",
        PlaceField::Country => "Austria",
        PlaceField::City => "Vienna",
        PlaceField::Address => "Herrengasse 14",
        PlaceField::Description => "Historic coffee house, open since 1876",
        PlaceField::PriceRange => "$$",
        PlaceField::Website => "https://cafecentral.wien",
        PlaceField::ImageUrl => "",
        PlaceField::Latitude => "48.2104",
        PlaceField::Longitude => "16.3655",
        PlaceField::IsHiddenGem => "no",
        PlaceField::IsFeatured => "yes",
        PlaceField::InsiderTip => "Sit in the arcade room, not the front hall",
        PlaceField::MustTry => "Apple strudel",
    }
}

fn write_template<W: Write>(writer: W, with_id: bool, example: bool) -> Result<()> {
    let fields = template_fields(with_id);
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(fields.iter().map(|f| f.as_str()))
        .into_diagnostic()?;
    if example {
        out.write_record(fields.iter().map(|&f| example_value(f)))
            .into_diagnostic()?;
    }
    out.flush().into_diagnostic()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::mapper::auto_map;
    use crate::pipeline::parser::{parse, SourceFormat, TextEncoding};
    use crate::pipeline::validator::validate_row;

    fn render(with_id: bool, example: bool) -> String {
        let mut buf = Vec::new();
        write_template(&mut buf, with_id, example).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_header_matches_schema() {
        let out = render(false, false);
        let header = out.lines().next().unwrap();
        assert!(header.starts_with("name,type,country,city"));
        assert!(!header.contains("id,"));
        assert_eq!(out.lines().count(), 1);

        let with_id = render(true, false);
        assert!(with_id.starts_with("id,name,"));
    }

    #[test]
    fn test_example_row_is_valid() {
        let out = render(false, true);
        let table = parse(out.as_bytes(), SourceFormat::Csv, TextEncoding::Utf8).unwrap();
        assert_eq!(table.rows.len(), 1);

        let mapping = auto_map(&table.headers, PlaceField::all());
        assert_eq!(mapping.ignored_headers(&table.headers).len(), 0);
        let row = mapping.apply(&table.rows[0], 0);
        assert!(validate_row(&row).is_valid());
    }
}
