use std::path::{Path, PathBuf};

/// Clean a name by removing characters that are invalid on common
/// filesystems: `/`, `\`, `:`, `*`, `?`, `"`, `<`, `>`, `|`.
pub fn clean_filename(filename: &str) -> String {
    filename
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .collect()
}

/// Per-target store file: `<output>/<target>.db`.
pub fn db_path(output: &Path, target: &str) -> PathBuf {
    output.join(format!("{}.db", clean_filename(target)))
}

/// Per-target photo directory: `<output>/<target>-photos`.
pub fn photo_dir(output: &Path, target: &str) -> PathBuf {
    output.join(format!("{}-photos", clean_filename(target)))
}
