//! Utility functions for preparing work items.
//!
//! This module contains helpers for reading item lists and normalizing
//! user input into absolute URLs before a batch is submitted.

use crate::error::AggregatorError;
use std::fs;
use std::path::Path;

/// Validate a work item.
///
/// Only rejects what can never be fetched: blank input and input with
/// embedded whitespace. Scheme and syntax are checked by the fetcher.
pub fn validate_item(item: &str) -> Result<(), AggregatorError> {
    let item = item.trim();

    if item.is_empty() {
        return Err(AggregatorError::config("Item cannot be empty"));
    }

    if item.chars().any(char::is_whitespace) {
        return Err(AggregatorError::config(format!(
            "Item '{}' contains whitespace",
            item
        )));
    }

    Ok(())
}

/// Turn raw inputs into fetchable URLs.
///
/// - Blank inputs are dropped
/// - Inputs with a scheme (`scheme://...`) are kept as-is
/// - Bare hosts get `https://` prepended
///
/// Input order and duplicates are preserved; every occurrence is its own
/// work item.
pub fn normalize_items(inputs: &[String]) -> Vec<String> {
    inputs
        .iter()
        .map(|input| input.trim())
        .filter(|input| !input.is_empty())
        .map(|input| {
            if input.contains("://") {
                input.to_string()
            } else {
                format!("https://{}", input)
            }
        })
        .collect()
}

/// Parse an item list: one item per line.
///
/// Blank lines and lines starting with `#` are skipped. Inline comments
/// need whitespace before the `#`, so URL fragments survive.
pub fn parse_item_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(strip_comment)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

fn strip_comment(line: &str) -> &str {
    let line = line.trim();
    if line.starts_with('#') {
        return "";
    }

    let mut prev_is_space = false;
    for (idx, ch) in line.char_indices() {
        if ch == '#' && prev_is_space {
            return line[..idx].trim_end();
        }
        prev_is_space = ch.is_whitespace();
    }
    line
}

/// Read an item list from a file.
///
/// # Errors
///
/// Returns [`AggregatorError::FileError`] if the file cannot be read or
/// contains no items.
pub fn read_items_from_file<P: AsRef<Path>>(path: P) -> Result<Vec<String>, AggregatorError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        AggregatorError::file_error(path.to_string_lossy(), format!("Cannot read file: {}", e))
    })?;

    let items = parse_item_list(&content);
    if items.is_empty() {
        return Err(AggregatorError::file_error(
            path.to_string_lossy(),
            "No items found in file",
        ));
    }

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_validate_item() {
        assert!(validate_item("https://example.org").is_ok());
        assert!(validate_item("example.org").is_ok());
        assert!(validate_item("").is_err());
        assert!(validate_item("   ").is_err());
        assert!(validate_item("two words").is_err());
    }

    #[test]
    fn test_normalize_items() {
        let inputs = vec![
            "example.org".to_string(),
            "  http://plain.example  ".to_string(),
            "".to_string(),
            "https://secure.example/path".to_string(),
            "example.org".to_string(),
        ];
        let items = normalize_items(&inputs);
        assert_eq!(
            items,
            vec![
                "https://example.org",
                "http://plain.example",
                "https://secure.example/path",
                "https://example.org",
            ]
        );
    }

    #[test]
    fn test_parse_item_list_strips_comments() {
        let content = "\
# sources for the weekly digest
https://example.org

https://example.com/page#section   # anchored link
example.net # bare host
#https://disabled.example
";
        let items = parse_item_list(content);
        assert_eq!(
            items,
            vec![
                "https://example.org",
                "https://example.com/page#section",
                "example.net",
            ]
        );
    }

    #[test]
    fn test_read_items_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "https://example.org").unwrap();
        writeln!(file, "# comment").unwrap();
        writeln!(file, "example.com").unwrap();
        file.flush().unwrap();

        let items = read_items_from_file(file.path()).unwrap();
        assert_eq!(items, vec!["https://example.org", "example.com"]);
    }

    #[test]
    fn test_read_items_from_empty_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# only comments").unwrap();
        file.flush().unwrap();

        assert!(matches!(
            read_items_from_file(file.path()),
            Err(AggregatorError::FileError { .. })
        ));
        assert!(read_items_from_file("/no/such/list.txt").is_err());
    }
}
