//! NDJSON persistence: one `<collection>.ndjson` file per collection, one relaxed extended-JSON
//! object per line.

use bson::{Bson, Document as BsonDocument};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::collection::Collection;
use crate::document::Document;
use crate::errors::DbError;

pub const EXTENSION: &str = "ndjson";

#[must_use]
pub fn collection_file(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.{EXTENSION}"))
}

/// Writes every document of `col`, in insertion order.
///
/// # Errors
/// `Io` or `Json` from the writer.
pub fn write_ndjson<W: Write>(col: &Collection, writer: W) -> Result<usize, DbError> {
    let mut w = BufWriter::new(writer);
    let mut n = 0;
    for d in col.get_all_documents() {
        writeln!(w, "{}", to_json_line(d.data)?)?;
        n += 1;
    }
    w.flush()?;
    Ok(n)
}

/// Parses NDJSON bodies. Blank lines are skipped.
///
/// # Errors
/// `Io` naming the first line that is not a JSON object.
pub fn read_ndjson<R: Read>(reader: R) -> Result<Vec<BsonDocument>, DbError> {
    let mut out = Vec::new();
    for (i, line) in BufReader::new(reader).lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        out.push(parse_object(line).map_err(|e| DbError::Io(format!("line {}: {e}", i + 1)))?);
    }
    Ok(out)
}

/// Parses one relaxed extended-JSON object.
///
/// # Errors
/// `Json` for invalid JSON, `QueryError` for anything but an object.
pub fn parse_object(s: &str) -> Result<BsonDocument, DbError> {
    let v: serde_json::Value = serde_json::from_str(s)?;
    match Bson::try_from(v).map_err(|e| DbError::QueryError(e.to_string()))? {
        Bson::Document(d) => Ok(d),
        other => Err(DbError::QueryError(format!("expected a JSON object, got {other}"))),
    }
}

/// Renders a body as one line of relaxed extended JSON.
///
/// # Errors
/// `Json` when serialization fails.
pub fn to_json_line(body: BsonDocument) -> Result<String, DbError> {
    Ok(serde_json::to_string(&Bson::Document(body).into_relaxed_extjson())?)
}

/// Saves `col` to `<dir>/<name>.ndjson`, replacing the previous file.
///
/// # Errors
/// `Io` when the directory or file cannot be written.
pub fn save_collection(col: &Collection, dir: &Path) -> Result<usize, DbError> {
    let start = Instant::now();
    std::fs::create_dir_all(dir)?;
    let path = collection_file(dir, col.name());
    let tmp = path.with_extension(format!("{EXTENSION}.tmp"));
    let n = write_ndjson(col, File::create(&tmp)?)?;
    std::fs::rename(&tmp, &path)?;
    log::info!(target: crate::logger::METRICS_TARGET, "saved {n} documents of {} in {} ms", col.name(), start.elapsed().as_millis());
    Ok(n)
}

/// Restores `col` from `<dir>/<name>.ndjson`; a missing file loads nothing.
///
/// Stored values are passed through the schema's setters so numeric types come back as
/// declared; validators and hooks do not run.
///
/// # Errors
/// `Io` for unreadable or malformed lines, `Cast` for values that no longer fit the schema,
/// `InvalidDocumentId` for bodies without a usable `_id`.
pub fn load_collection(col: &Collection, dir: &Path) -> Result<usize, DbError> {
    let path = collection_file(dir, col.name());
    if !path.is_file() {
        log::debug!("no data file for {}", col.name());
        return Ok(0);
    }
    let bodies = read_ndjson(File::open(&path)?)?;
    let n = bodies.len();
    for mut body in bodies {
        if let Some(schema) = col.schema() {
            schema.apply_setters(&mut body)?;
        }
        col.restore(Document::from_stored(body)?);
    }
    log::info!("loaded {n} documents into {} from {}", col.name(), path.display());
    Ok(n)
}

/// Inserts NDJSON bodies through the normal create path (schema, indexes, hooks).
///
/// Stops at the first failing record; records before it stay inserted.
///
/// # Errors
/// Parse errors from [`read_ndjson`], or the insert error of the failing record.
pub fn import_ndjson<R: Read>(col: &Collection, reader: R) -> Result<usize, DbError> {
    let bodies = read_ndjson(reader)?;
    let mut inserted = 0;
    for (i, body) in bodies.into_iter().enumerate() {
        col.insert(body).inspect_err(|e| log::warn!("import into {} stopped at record {}: {e}", col.name(), i + 1))?;
        inserted += 1;
        if inserted % 1000 == 0 {
            log::info!("imported {inserted} records into {}", col.name());
        }
    }
    Ok(inserted)
}
