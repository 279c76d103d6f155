//! NativeMetadata - std::fs による MetadataProvider

use std::fs;
use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::domain::FileStat;
use crate::ports::MetadataProvider;

#[derive(Debug, Clone, Copy, Default)]
pub struct NativeMetadata;

impl NativeMetadata {
    pub fn new() -> Self {
        Self
    }
}

impl MetadataProvider for NativeMetadata {
    fn stat(&self, path: &Path) -> io::Result<FileStat> {
        let meta = fs::metadata(path)?;
        let modified: DateTime<Utc> = meta.modified()?.into();
        Ok(FileStat {
            size: meta.len(),
            last_modified: modified,
        })
    }

    fn list_entries(&self, dir: &Path) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}
