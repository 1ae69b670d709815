//! File-name helpers for capture dumps.

use std::path::{Path, PathBuf};

use regex::Regex;

/// Find a free variant of `path` so existing captures are never
/// overwritten: "calls.json" becomes "calls(1).json", then "calls(2).json",
/// and so on until the name is unused.
pub fn unique_dump_path(path: &Path) -> PathBuf {
    let mut candidate = path.to_path_buf();
    while candidate.exists() {
        candidate = bump_index(&candidate);
    }
    candidate
}

fn bump_index(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let extension = path.extension().map(|e| e.to_string_lossy().to_string());

    let next_stem = match Regex::new(r"^(.*)\((\d+)\)$") {
        Ok(re) => match re.captures(&stem) {
            Some(captures) => {
                let base = &captures[1];
                let index = captures[2].parse::<u64>().unwrap_or(0) + 1;
                format!("{base}({index})")
            }
            None => format!("{stem}(1)"),
        },
        Err(_) => format!("{stem}(1)"),
    };

    let file_name = match extension {
        Some(ext) => format!("{next_stem}.{ext}"),
        None => next_stem,
    };
    path.with_file_name(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    #[test]
    fn free_path_is_returned_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calls.json");
        assert_eq!(unique_dump_path(&path), path);
    }

    #[test]
    fn existing_names_get_an_incrementing_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calls.json");
        File::create(&path).unwrap();
        assert_eq!(unique_dump_path(&path), dir.path().join("calls(1).json"));

        File::create(dir.path().join("calls(1).json")).unwrap();
        assert_eq!(unique_dump_path(&path), dir.path().join("calls(2).json"));
    }

    #[test]
    fn extensionless_names_work_too() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calls");
        File::create(&path).unwrap();
        assert_eq!(unique_dump_path(&path), dir.path().join("calls(1)"));
    }
}
