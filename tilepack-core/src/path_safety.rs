//! Package-relative path handling.
//!
//! Upload paths are validated once when the file set is built. Manifest
//! references are resolved against the directory of the manifest that holds
//! them, using URL-style rules: query and fragment are dropped, `.` and `..`
//! collapse, segments are percent-decoded, a leading `/` restarts at the
//! package root. The base is already canonical and is never decoded again.

use percent_encoding::percent_decode_str;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("reference climbs above the package root")]
    EscapesRoot,
    #[error("segment {0:?} is not valid percent-encoded UTF-8")]
    InvalidEncoding(String),
    #[error("segment {0:?} decodes to a path separator")]
    EncodedSeparator(String),
    #[error("reference names no file")]
    Empty,
}

/// Normalize an uploaded file's relative path: backslashes become `/` and a
/// leading `./` is dropped. Absolute paths, empty segments and dot segments
/// are refused.
pub fn validate_upload_path(raw: &str) -> Result<String, &'static str> {
    let unified = raw.replace('\\', "/");
    let mut rel = unified.as_str();
    while let Some(rest) = rel.strip_prefix("./") {
        rel = rest;
    }
    if rel.is_empty() {
        return Err("empty path");
    }
    if rel.starts_with('/') {
        return Err("absolute paths are not allowed");
    }
    for seg in rel.split('/') {
        match seg {
            "" => return Err("empty path segment"),
            "." | ".." => return Err("dot segments are not allowed"),
            _ => {}
        }
    }
    Ok(rel.to_string())
}

/// Directory portion of a canonical path, including the trailing `/`.
/// Top-level files have an empty base.
pub fn base_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(i) => &path[..=i],
        None => "",
    }
}

const EXTERNAL_SCHEMES: [&str; 5] = ["http", "https", "data", "blob", "file"];

/// Absolute URLs with a web scheme point outside the package and are never
/// looked up in the file set. Other scheme-shaped names (`lod:0.b3dm`,
/// `c:/tiles/x.b3dm`) are treated as package paths.
pub fn is_external(reference: &str) -> bool {
    url::Url::parse(reference).is_ok_and(|u| EXTERNAL_SCHEMES.contains(&u.scheme()))
}

/// Resolve `reference` against `base` (a [`base_dir`] result) into the
/// canonical package-relative path it names.
pub fn resolve_reference(base: &str, reference: &str) -> Result<String, PathError> {
    let unified = reference.replace('\\', "/");
    let end = unified.find(|c: char| c == '?' || c == '#').unwrap_or(unified.len());
    let reference = &unified[..end];

    let mut segments: Vec<String> = Vec::new();
    let reference = match reference.strip_prefix('/') {
        Some(rooted) => rooted,
        None => {
            segments.extend(base.split('/').filter(|s| !s.is_empty()).map(str::to_string));
            reference
        }
    };

    for seg in reference.split('/') {
        let decoded = percent_decode_str(seg)
            .decode_utf8()
            .map_err(|_| PathError::InvalidEncoding(seg.to_string()))?;
        match decoded.as_ref() {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(PathError::EscapesRoot);
                }
            }
            s if s.contains('/') => return Err(PathError::EncodedSeparator(seg.to_string())),
            s => segments.push(s.to_string()),
        }
    }
    if segments.is_empty() {
        return Err(PathError::Empty);
    }
    Ok(segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::sibling_dir("a/b/", "../c/d.bin", "a/c/d.bin")]
    #[case::same_dir("root/", "data.bin", "root/data.bin")]
    #[case::dot_prefix("root/", "./child/tileset.json", "root/child/tileset.json")]
    #[case::percent_decoded("root/", "my%20tile.b3dm", "root/my tile.b3dm")]
    #[case::query_dropped("root/", "tile.b3dm?v=2#frag", "root/tile.b3dm")]
    #[case::rooted("root/child/", "/other/x.pnts", "other/x.pnts")]
    #[case::backslashes("root/", "child\\data.bin", "root/child/data.bin")]
    #[case::encoded_dots("a/b/", "%2E%2E/c.bin", "a/c.bin")]
    #[case::top_level("", "tileset.json", "tileset.json")]
    #[case::base_kept_verbatim("pkg/v%201/", "data.bin", "pkg/v%201/data.bin")]
    #[case::undecodable_base("pkg/a%FF/", "../b.bin", "pkg/b.bin")]
    #[case::scheme_shaped_name("pkg/", "lod:0.b3dm", "pkg/lod:0.b3dm")]
    fn resolves(#[case] base: &str, #[case] reference: &str, #[case] expected: &str) {
        assert_eq!(resolve_reference(base, reference).unwrap(), expected);
    }

    #[rstest]
    #[case::escape("a/", "../../x.bin", PathError::EscapesRoot)]
    #[case::only_dots("a/", "..", PathError::Empty)]
    #[case::encoded_slash("a/", "b%2Fc.bin", PathError::EncodedSeparator("b%2Fc.bin".into()))]
    #[case::bad_utf8("a/", "%FF.bin", PathError::InvalidEncoding("%FF.bin".into()))]
    fn rejects(#[case] base: &str, #[case] reference: &str, #[case] expected: PathError) {
        assert_eq!(resolve_reference(base, reference).unwrap_err(), expected);
    }

    #[test]
    fn base_dir_keeps_trailing_slash() {
        assert_eq!(base_dir("root/child/tileset.json"), "root/child/");
        assert_eq!(base_dir("tileset.json"), "");
    }

    #[test]
    fn external_references() {
        assert!(is_external("https://example.com/tiles/tileset.json"));
        assert!(is_external("data:application/octet-stream;base64,AAAA"));
        assert!(!is_external("child/tileset.json"));
        assert!(!is_external("../data.bin"));
        assert!(is_external("blob:tilepack/00000001-abcd"));
        assert!(!is_external("lod:0.b3dm"));
        assert!(!is_external("c:/tiles/0.b3dm"));
    }

    #[test]
    fn upload_paths() {
        assert_eq!(validate_upload_path("root\\a.bin").unwrap(), "root/a.bin");
        assert_eq!(validate_upload_path("./root/a.bin").unwrap(), "root/a.bin");
        assert!(validate_upload_path("/etc/passwd").is_err());
        assert!(validate_upload_path("root/../x").is_err());
        assert!(validate_upload_path("root//x").is_err());
        assert!(validate_upload_path("").is_err());
    }
}
