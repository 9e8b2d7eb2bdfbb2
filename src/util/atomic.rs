use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::Result;

/// Sibling temp path in the same directory, so the final rename never
/// crosses a filesystem boundary.
fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_owned());
    path.with_file_name(format!(".{}.tmp-{}", name, std::process::id()))
}

/// Serializes `value` as JSON to `path` atomically: write a temp file, fsync,
/// rename over the destination. Readers see either the old or the new file,
/// never a partial one.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T, pretty: bool) -> Result<()> {
    write_atomic(path, |writer| {
        if pretty {
            serde_json::to_writer_pretty(writer, value)?;
        } else {
            serde_json::to_writer(writer, value)?;
        }
        Ok(())
    })
}

/// Replaces `path` atomically with one compact JSON line per record. An empty
/// `records` leaves an empty file.
pub fn write_json_lines_atomic<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    write_atomic(path, |writer| {
        for record in records {
            serde_json::to_writer(&mut *writer, record)?;
            writer.write_all(b"\n")?;
        }
        Ok(())
    })
}

fn write_atomic<F>(path: &Path, fill: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp = temp_path_for(path);
    let result = (|| -> Result<()> {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        fill(&mut writer)?;
        writer.flush()?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(())
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

/// Appends one compact JSON record plus newline to `path`.
pub fn append_json_line<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');
    let mut file = fs::OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(&line)?;
    file.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn atomic_write_replaces_and_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/status.json");
        write_json_atomic(&path, &vec![1, 2], true).unwrap();
        write_json_atomic(&path, &vec![3], false).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "[3]");
        let names: Vec<_> = fs::read_dir(path.parent().unwrap()).unwrap().collect();
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn append_adds_one_line_per_record() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("metrics.jsonl");
        append_json_line(&path, &serde_json::json!({"epoch": 1})).unwrap();
        append_json_line(&path, &serde_json::json!({"epoch": 2})).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.ends_with("{\"epoch\":2}\n"));
    }

    #[test]
    fn json_lines_rewrite_replaces_previous_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("metrics.jsonl");
        for epoch in 1..=3 {
            append_json_line(&path, &serde_json::json!({ "epoch": epoch })).unwrap();
        }
        write_json_lines_atomic(&path, &[serde_json::json!({"epoch": 1})]).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"epoch\":1}\n");

        let none: [serde_json::Value; 0] = [];
        write_json_lines_atomic(&path, &none).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }
}
