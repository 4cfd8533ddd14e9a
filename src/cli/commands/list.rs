//! `placeload list` command - Show stored places

use console::style;
use miette::{IntoDiagnostic, Result};
use serde_json::{Map, Value};
use std::io::Write;

use crate::cli::helpers;
use crate::cli::table;
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::{PlaceField, PlaceId, PlaceStore, Record};

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Only places in this city (case-insensitive)
    #[arg(long)]
    pub city: Option<String>,

    /// Only places of this type
    #[arg(long = "type", short = 't')]
    pub place_type: Option<String>,

    /// Search name and description (case-insensitive substring)
    #[arg(long, short = 's')]
    pub search: Option<String>,

    /// Limit the number of results
    #[arg(long, short = 'n')]
    pub limit: Option<usize>,

    /// Show only the count
    #[arg(long)]
    pub count: bool,
}

struct Filter {
    city: Option<String>,
    place_type: Option<String>,
    search: Option<String>,
}

impl Filter {
    fn from_args(args: &ListArgs) -> Self {
        Self {
            city: args.city.as_deref().map(str::to_lowercase),
            place_type: args.place_type.as_deref().map(str::to_lowercase),
            search: args.search.as_deref().map(str::to_lowercase),
        }
    }

    fn text(record: &Record, field: PlaceField) -> String {
        record
            .get(&field)
            .map(|v| v.to_cell().to_lowercase())
            .unwrap_or_default()
    }

    fn matches(&self, record: &Record) -> bool {
        if let Some(city) = &self.city {
            if Self::text(record, PlaceField::City) != *city {
                return false;
            }
        }
        if let Some(place_type) = &self.place_type {
            if Self::text(record, PlaceField::Type) != *place_type {
                return false;
            }
        }
        if let Some(needle) = &self.search {
            let hit = [PlaceField::Name, PlaceField::Description]
                .iter()
                .any(|&f| Self::text(record, f).contains(needle.as_str()));
            if !hit {
                return false;
            }
        }
        true
    }
}

pub fn run(args: ListArgs, global: &GlobalOpts) -> Result<()> {
    let workspace = helpers::open_workspace(global)?;
    let filter = Filter::from_args(&args);

    let rt = helpers::runtime()?;
    let records = rt.block_on(async {
        let store = helpers::open_store(&workspace)?;
        store.list().await.map_err(|e| miette::miette!("{}", e))
    })?;

    let mut places: Vec<(PlaceId, Record)> = records
        .into_iter()
        .filter(|(_, record)| filter.matches(record))
        .collect();
    if let Some(limit) = args.limit {
        places.truncate(limit);
    }

    if args.count {
        println!("{}", places.len());
        return Ok(());
    }

    match global.format {
        OutputFormat::Json => {
            let json: Vec<Value> = places.iter().map(|(id, r)| place_json(id, r)).collect();
            println!("{}", serde_json::to_string_pretty(&json).into_diagnostic()?);
        }
        OutputFormat::Csv => {
            let stdout = std::io::stdout();
            write_csv(stdout.lock(), &places)?;
        }
        OutputFormat::Auto | OutputFormat::Table => {
            if places.is_empty() {
                println!("No places found.");
                return Ok(());
            }
            println!("{}", table::places(&places));
            if !global.quiet {
                println!();
                println!("{} place(s) found", style(places.len()).cyan());
            }
        }
    }

    Ok(())
}

/// `{"id": ..., "name": ..., ...}` with canonical keys
fn place_json(id: &PlaceId, record: &Record) -> Value {
    let mut map = Map::new();
    map.insert(PlaceField::Id.as_str().to_string(), Value::String(id.to_string()));
    for (field, value) in record {
        if let Ok(v) = serde_json::to_value(value) {
            map.insert(field.as_str().to_string(), v);
        }
    }
    Value::Object(map)
}

fn write_csv<W: Write>(writer: W, places: &[(PlaceId, Record)]) -> Result<()> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(PlaceField::all().iter().map(|f| f.as_str()))
        .into_diagnostic()?;
    for (id, record) in places {
        let mut row = vec![id.to_string()];
        row.extend(
            PlaceField::content()
                .iter()
                .map(|f| record.get(f).map(|v| v.to_cell()).unwrap_or_default()),
        );
        out.write_record(&row).into_diagnostic()?;
    }
    out.flush().into_diagnostic()
}
