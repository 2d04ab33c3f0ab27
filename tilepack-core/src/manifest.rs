//! Tileset manifest documents.
//!
//! A manifest is kept as an untyped JSON tree so that every member we do not
//! touch survives rewriting unchanged and in document order. Only content
//! references are visited: `content.uri` (or the pre-1.0 `content.url`) and
//! every entry of a 1.1 `contents` array, on `root` and all its descendants.

use bytes::Bytes;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::convert::Infallible;

use crate::error::{Error, Result};

const REFERENCE_KEYS: [&str; 2] = ["uri", "url"];

/// Parse a manifest of any nesting depth. serde_json's recursion limit is
/// lifted and the stack grows on the heap as the tile tree deepens.
pub fn parse(path: &str, raw: &[u8]) -> Result<Value> {
    let malformed =
        |source: serde_json::Error| Error::MalformedManifest { path: path.to_string(), source };
    let mut de = serde_json::Deserializer::from_slice(raw);
    de.disable_recursion_limit();
    let doc = Value::deserialize(serde_stacker::Deserializer::new(&mut de)).map_err(malformed)?;
    de.end().map_err(malformed)?;
    Ok(doc)
}

pub fn serialize(path: &str, doc: &Value) -> Result<Bytes> {
    let out = serde_json::to_vec(doc)
        .map_err(|source| Error::SerializeManifest { path: path.to_string(), source })?;
    Ok(Bytes::from(out))
}

/// Walk the tile tree depth-first in document order and pass every
/// non-empty content reference to `rewrite`. `Ok(Some(new))` replaces the
/// reference, `Ok(None)` keeps it. The first error stops the walk.
///
/// Returns how many references were visited.
pub fn rewrite_references<E, F>(doc: &mut Value, rewrite: &mut F) -> Result<usize, E>
where
    F: FnMut(&str) -> Result<Option<String>, E>,
{
    let mut visited = 0;
    let Some(root) = doc.get_mut("root") else {
        return Ok(0);
    };
    let mut stack: Vec<&mut Value> = vec![root];
    while let Some(node) = stack.pop() {
        let Some(tile) = node.as_object_mut() else {
            continue;
        };
        if let Some(Value::Object(content)) = tile.get_mut("content") {
            visited += rewrite_content(content, rewrite)?;
        }
        if let Some(Value::Array(contents)) = tile.get_mut("contents") {
            for content in contents.iter_mut().filter_map(Value::as_object_mut) {
                visited += rewrite_content(content, rewrite)?;
            }
        }
        if let Some(Value::Array(children)) = tile.get_mut("children") {
            stack.extend(children.iter_mut().rev());
        }
    }
    Ok(visited)
}

fn rewrite_content<E, F>(content: &mut Map<String, Value>, rewrite: &mut F) -> Result<usize, E>
where
    F: FnMut(&str) -> Result<Option<String>, E>,
{
    let mut visited = 0;
    for key in REFERENCE_KEYS {
        if let Some(Value::String(reference)) = content.get_mut(key) {
            if reference.is_empty() {
                continue;
            }
            visited += 1;
            if let Some(replacement) = rewrite(reference.as_str())? {
                *reference = replacement;
            }
        }
    }
    Ok(visited)
}

/// All non-empty content references in document order.
pub fn references(doc: &Value) -> Vec<String> {
    let mut out = Vec::new();
    let mut doc = doc.clone();
    let _ = rewrite_references(&mut doc, &mut |r: &str| -> Result<Option<String>, Infallible> {
        out.push(r.to_string());
        Ok(None)
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn visits_nested_and_multi_content() {
        let doc = json!({
            "asset": { "version": "1.1" },
            "root": {
                "content": { "uri": "a.b3dm" },
                "children": [
                    { "content": { "url": "legacy.b3dm" },
                      "children": [ { "content": { "uri": "deep/tileset.json" } } ] },
                    { "contents": [ { "uri": "c1.glb" }, { "uri": "" }, { "uri": "c2.glb" } ] },
                    { "geometricError": 1.0 }
                ]
            }
        });
        assert_eq!(
            references(&doc),
            vec!["a.b3dm", "legacy.b3dm", "deep/tileset.json", "c1.glb", "c2.glb"]
        );
    }

    #[test]
    fn rewrite_preserves_other_members_in_order() {
        let raw = concat!(
            r#"{"asset":{"version":"1.0"},"geometricError":500,"root":{"refine":"ADD","#,
            r#""content":{"uri":"x.pnts","boundingVolume":{"sphere":[0,0,0,1]}}}}"#
        );
        let mut doc = parse("t/tileset.json", raw.as_bytes()).unwrap();
        let mut to_blob = |_: &str| -> Result<Option<String>, Infallible> {
            Ok(Some("blob:x/1".to_string()))
        };
        let n = rewrite_references(&mut doc, &mut to_blob).unwrap();
        assert_eq!(n, 1);
        let out = serialize("t/tileset.json", &doc).unwrap();
        assert_eq!(std::str::from_utf8(&out).unwrap(), raw.replace("x.pnts", "blob:x/1"));
    }

    #[test]
    fn missing_root_has_no_references() {
        let mut doc = json!({ "asset": { "version": "1.0" } });
        let n = rewrite_references(&mut doc, &mut |_: &str| -> Result<Option<String>, Infallible> {
            Ok(None)
        })
        .unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn parse_error_names_the_manifest() {
        let err = parse("pkg/broken.json", b"{ not json").unwrap_err();
        assert!(matches!(
            err,
            Error::MalformedManifest { ref path, .. } if path == "pkg/broken.json"
        ));
    }

    #[test]
    fn trailing_garbage_is_malformed() {
        assert!(parse("pkg/tileset.json", br#"{"root":{}} x"#).is_err());
    }

    #[test]
    fn deep_tile_trees_parse() {
        let depth = 2_000;
        let mut raw = String::from(r#"{"root":"#);
        for _ in 0..depth {
            raw.push_str(r#"{"children":["#);
        }
        raw.push_str(r#"{"content":{"uri":"leaf.bin"}}"#);
        raw.push_str(&"]}".repeat(depth));
        raw.push('}');
        let doc = parse("pkg/tileset.json", raw.as_bytes()).unwrap();
        assert_eq!(references(&doc), vec!["leaf.bin"]);
    }
}
