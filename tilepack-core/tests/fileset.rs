use tilepack_core::{locate_entry, Error, ResolverConfig, VirtualFileSet};

#[test]
fn duplicate_paths_are_rejected() {
    let err = VirtualFileSet::new(vec![
        ("pkg/a.bin", vec![1u8]),
        ("pkg/b.bin", vec![2u8]),
        ("pkg\\a.bin", vec![3u8]),
    ])
    .unwrap_err();
    assert!(matches!(err, Error::DuplicatePath(ref p) if p == "pkg/a.bin"));
}

#[test]
fn invalid_paths_are_rejected() {
    for bad in ["/abs/tileset.json", "pkg/../escape.bin", "pkg//x.bin", ""] {
        let err = VirtualFileSet::new(vec![(bad, vec![0u8])]).unwrap_err();
        assert!(matches!(err, Error::InvalidPath { .. }), "accepted {bad:?}");
    }
}

#[test]
fn lookup_and_sizes() {
    let set = VirtualFileSet::new(vec![
        ("pkg/tileset.json", b"{}".to_vec()),
        ("pkg/data/tile.b3dm", vec![0u8; 100]),
    ])
    .unwrap();
    assert_eq!(set.len(), 2);
    assert_eq!(set.total_bytes(), 102);
    let tile = set.get("pkg/data/tile.b3dm").unwrap();
    assert_eq!(tile.size(), 100);
    assert_eq!(tile.name(), "tile.b3dm");
    assert_eq!(tile.depth(), 3);
    assert!(set.get("pkg/data/other.b3dm").is_none());
}

#[test]
fn groups_by_top_folder() {
    let set = VirtualFileSet::new(vec![
        ("city/tileset.json", b"{}".to_vec()),
        ("city/tiles/0.b3dm", vec![0u8]),
        ("terrain/tileset.json", b"{}".to_vec()),
        ("stray.bin", vec![1u8]),
    ])
    .unwrap();
    let groups = set.group_by_top_folder("unknown_folder");
    let names: Vec<&str> = groups.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["city", "terrain", "unknown_folder"]);
    assert_eq!(groups["city"].len(), 2);
    assert!(groups["city"].get("city/tiles/0.b3dm").is_some());
    assert_eq!(groups["terrain"].len(), 1);
    assert!(groups["unknown_folder"].get("stray.bin").is_some());
}

#[test]
fn entry_is_shallowest_then_lexical() {
    let set = VirtualFileSet::new(vec![
        ("pkg/z/tileset.json", b"{}".to_vec()),
        ("pkg/b/tileset.json", b"{}".to_vec()),
        ("pkg/a/deeper/tileset.json", b"{}".to_vec()),
        ("pkg/a/other.json", b"{}".to_vec()),
    ])
    .unwrap();
    let cfg = ResolverConfig::default();
    assert_eq!(locate_entry(&set, &cfg).unwrap().rel_path, "pkg/b/tileset.json");

    let cfg = ResolverConfig { entry_suffix: ".json".into(), ..Default::default() };
    assert_eq!(locate_entry(&set, &cfg).unwrap().rel_path, "pkg/a/other.json");
}

#[test]
fn no_entry_candidates() {
    let set = VirtualFileSet::new(vec![("pkg/layer.json", b"{}".to_vec())]).unwrap();
    assert!(locate_entry(&set, &ResolverConfig::default()).is_none());
}
