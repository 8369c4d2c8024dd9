use crate::catalog::{Catalog, Resource};
use crate::persist::{parse_object, to_json_line};
use bson::{Bson, Document as BsonDocument};
use std::io::Write;

use super::command::Command;
use super::util::parse_pairs;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum OutputMode {
    /// One compact JSON object per line.
    #[default]
    Ndjson,
    /// Indented JSON, one value per document.
    Pretty,
}

fn emit<W: Write>(out: &mut W, mode: OutputMode, body: BsonDocument) -> Result<(), Box<dyn std::error::Error>> {
    match mode {
        OutputMode::Ndjson => writeln!(out, "{}", to_json_line(body)?)?,
        OutputMode::Pretty => {
            writeln!(out, "{}", serde_json::to_string_pretty(&Bson::Document(body).into_relaxed_extjson())?)?;
        }
    }
    Ok(())
}

fn emit_all<W: Write>(out: &mut W, mode: OutputMode, docs: Vec<BsonDocument>) -> Result<(), Box<dyn std::error::Error>> {
    for d in docs {
        emit(out, mode, d)?;
    }
    Ok(())
}

/// Runs `cmd` against `catalog`, writing NDJSON to `out`.
///
/// # Errors
/// Catalog errors, malformed JSON bodies, or write failures.
pub fn run<W: Write>(catalog: &Catalog, cmd: Command, out: &mut W) -> Result<(), Box<dyn std::error::Error>> {
    run_with_format(catalog, cmd, OutputMode::Ndjson, out)
}

/// # Errors
/// See [`run`].
pub fn run_with_format<W: Write>(
    catalog: &Catalog,
    cmd: Command,
    mode: OutputMode,
    out: &mut W,
) -> Result<(), Box<dyn std::error::Error>> {
    log::debug!("cli command: {cmd:?}");
    match cmd {
        Command::List { resource, pairs, tour } => {
            let docs = catalog.list(resource, parse_pairs(&pairs), tour.as_ref())?;
            emit_all(out, mode, docs)
        }
        Command::Get { resource: Resource::Tours, id } => emit(out, mode, catalog.get_tour(&id)?),
        Command::Get { resource, id } => emit(out, mode, catalog.get(resource, &id)?),
        Command::TopCheap { pairs } => emit_all(out, mode, catalog.top_cheap(parse_pairs(&pairs))?),
        Command::Stats => emit_all(out, mode, catalog.tour_stats()?),
        Command::Import { resource, file } => {
            let n = catalog.import(resource, std::fs::File::open(&file)?)?;
            let mut report = BsonDocument::new();
            report.insert("collection", resource.as_str());
            report.insert("inserted", i64::try_from(n).unwrap_or(i64::MAX));
            emit(out, mode, report)
        }
        Command::TourCreate { json } => emit(out, mode, catalog.create_tour(parse_object(&json)?)?),
        Command::TourUpdate { id, json } => emit(out, mode, catalog.update_tour(&id, &parse_object(&json)?)?),
        Command::TourDelete { id } => {
            catalog.delete_tour(&id)?;
            emit(out, mode, deleted(&id))
        }
        Command::UserCreate { json } => emit(out, mode, catalog.create_user(parse_object(&json)?)?),
        Command::ReviewAdd { tour, user, json } => {
            emit(out, mode, catalog.create_review(tour.as_ref(), user.as_ref(), parse_object(&json)?)?)
        }
        Command::ReviewUpdate { id, json } => emit(out, mode, catalog.update_review(&id, &parse_object(&json)?)?),
        Command::ReviewDelete { id } => {
            catalog.delete_review(&id)?;
            emit(out, mode, deleted(&id))
        }
        Command::Recompute { tour } => {
            let s = catalog.recompute(&tour)?;
            let mut report = BsonDocument::new();
            report.insert("tour", tour.to_bson());
            report.insert("ratingsQuantity", s.quantity);
            report.insert("ratingsAverage", s.average);
            emit(out, mode, report)
        }
    }
}

fn deleted(id: &crate::types::DocumentId) -> BsonDocument {
    let mut d = BsonDocument::new();
    d.insert("deleted", id.to_bson());
    d
}
