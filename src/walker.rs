use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// File extensions considered invoice documents when no glob is given.
const SUPPORTED_EXTENSIONS: &[&str] = &["md", "txt"];

/// Recursively discover invoice files under a directory.
///
/// Skips hidden files and directories (names starting with `.`). With a
/// glob pattern, relative paths matching the pattern are selected;
/// otherwise files with supported extensions (.md, .txt). Results are
/// sorted for deterministic batch order.
pub fn discover_invoice_files(
    root: &Path,
    pattern: Option<&str>,
) -> Result<Vec<PathBuf>> {
    let matcher = pattern
        .map(|p| {
            globset::Glob::new(p).map(|g| g.compile_matcher()).map_err(
                |e| Error::Config(format!("invalid glob pattern: {e}")),
            )
        })
        .transpose()?;

    let canonical_root = root.canonicalize()?;
    let mut results = Vec::new();
    walk_dir(&canonical_root, &canonical_root, matcher.as_ref(), &mut results)?;
    results.sort();
    Ok(results)
}

fn walk_dir(
    root: &Path,
    current: &Path,
    matcher: Option<&globset::GlobMatcher>,
    results: &mut Vec<PathBuf>,
) -> Result<()> {
    for entry in std::fs::read_dir(current)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let name = file_name.to_string_lossy();

        // Skip hidden files and directories.
        if name.starts_with('.') {
            continue;
        }

        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk_dir(root, &entry.path(), matcher, results)?;
        } else if file_type.is_file() {
            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(&path);
            let selected = match matcher {
                Some(matcher) => matcher.is_match(relative),
                None => has_supported_extension(&path),
            };
            if selected {
                results.push(path);
            }
        }
    }
    Ok(())
}

fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext))
}
