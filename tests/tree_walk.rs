use std::sync::Arc;

use quarry::dircache::DirCache;
use quarry::{
    MemoryObjectDatabase, ObjectId, TreeFilter, TreeIter, TreeWalk, MODE_EXECUTABLE, MODE_FILE,
    MODE_TREE,
};

fn oid(n: u8) -> ObjectId {
    let mut raw = [0u8; 20];
    raw[19] = n;
    ObjectId::from_bytes(raw)
}

fn walk_over(odb: &Arc<MemoryObjectDatabase>, trees: &[ObjectId]) -> TreeWalk {
    let mut walk = TreeWalk::new(Arc::clone(odb) as Arc<dyn quarry::ObjectDatabase>);
    walk.reset_trees(trees).expect("trees exist");
    walk
}

fn collect_paths(walk: &mut TreeWalk) -> Vec<String> {
    let mut paths = Vec::new();
    while walk.next().expect("walk") {
        paths.push(walk.path_string());
    }
    paths
}

#[test]
fn empty_walk_has_no_entries() {
    let odb = Arc::new(MemoryObjectDatabase::new());
    let mut walk = TreeWalk::new(Arc::clone(&odb) as Arc<dyn quarry::ObjectDatabase>);
    walk.reset();
    assert_eq!(walk.tree_count(), 0);
    assert!(!walk.next().expect("walk"));
}

#[test]
fn single_tree_two_files() {
    let odb = Arc::new(MemoryObjectDatabase::new());
    odb.insert_tree(oid(10), &[(MODE_FILE, "a", oid(1)), (MODE_FILE, "b", oid(2))]);

    let mut walk = walk_over(&odb, &[oid(10)]);
    walk.set_recursive(true);

    assert!(walk.next().expect("walk"));
    assert_eq!(walk.path_string(), "a");
    assert_eq!(walk.object_id(0), oid(1));
    assert!(walk.next().expect("walk"));
    assert_eq!(walk.path_string(), "b");
    assert_eq!(walk.object_id(0), oid(2));
    assert!(!walk.next().expect("walk"));
}

#[test]
fn two_way_diff_reports_both_sides() {
    let odb = Arc::new(MemoryObjectDatabase::new());
    odb.insert_tree(oid(10), &[(MODE_FILE, "f", oid(1))]);
    odb.insert_tree(oid(11), &[(MODE_FILE, "f", oid(2)), (MODE_FILE, "g", oid(3))]);

    let mut walk = walk_over(&odb, &[oid(10), oid(11)]);
    walk.set_recursive(true);

    assert!(walk.next().expect("walk"));
    assert_eq!(walk.path_string(), "f");
    assert_eq!(walk.object_id(0), oid(1));
    assert_eq!(walk.object_id(1), oid(2));
    assert!(!walk.id_equal(0, 1));

    assert!(walk.next().expect("walk"));
    assert_eq!(walk.path_string(), "g");
    assert_eq!(walk.object_id(0), ObjectId::ZERO);
    assert_eq!(walk.object_id(1), oid(3));
    assert_eq!(walk.raw_mode(0), 0);
    assert!(!walk.id_equal(0, 1));

    assert!(!walk.next().expect("walk"));
}

#[test]
fn identical_trees_agree_everywhere() {
    let odb = Arc::new(MemoryObjectDatabase::new());
    odb.insert_tree(oid(10), &[(MODE_FILE, "f", oid(1))]);

    let mut walk = walk_over(&odb, &[oid(10), oid(10)]);
    assert!(walk.next().expect("walk"));
    assert!(walk.id_equal(0, 1));
    assert_eq!(walk.raw_mode(0), walk.raw_mode(1));
}

#[test]
fn recursive_walk_descends_into_subtrees() {
    let odb = Arc::new(MemoryObjectDatabase::new());
    odb.insert_tree(oid(20), &[(MODE_FILE, "x", oid(1))]);
    odb.insert_tree(oid(10), &[(MODE_TREE, "d", oid(20))]);

    let mut walk = walk_over(&odb, &[oid(10)]);
    walk.set_recursive(true);

    assert!(walk.next().expect("walk"));
    assert_eq!(walk.path_string(), "d/x");
    assert_eq!(walk.object_id(0), oid(1));
    assert!(!walk.is_subtree());
    assert!(!walk.next().expect("walk"));
}

#[test]
fn non_recursive_walk_requires_enter_subtree() {
    let odb = Arc::new(MemoryObjectDatabase::new());
    odb.insert_tree(oid(20), &[(MODE_FILE, "x", oid(1))]);
    odb.insert_tree(oid(10), &[(MODE_TREE, "d", oid(20))]);

    // Without entering, the subtree is the only entry.
    let mut walk = walk_over(&odb, &[oid(10)]);
    assert!(walk.next().expect("walk"));
    assert_eq!(walk.path_string(), "d");
    assert!(walk.is_subtree());
    assert!(!walk.next().expect("walk"));

    // Entering replaces the iterators and continues below.
    let mut walk = walk_over(&odb, &[oid(10)]);
    assert!(walk.next().expect("walk"));
    assert_eq!(walk.path_string(), "d");
    walk.enter_subtree().expect("enter");
    assert_eq!(walk.depth(), 1);
    assert!(walk.next().expect("walk"));
    assert_eq!(walk.path_string(), "d/x");
    assert!(!walk.next().expect("walk"));
}

#[test]
fn deep_nesting_round_trips_flat_paths() {
    let odb = Arc::new(MemoryObjectDatabase::new());
    odb.insert_tree(oid(30), &[(MODE_FILE, "deep", oid(1))]);
    odb.insert_tree(oid(20), &[(MODE_TREE, "c", oid(30)), (MODE_FILE, "mid", oid(2))]);
    odb.insert_tree(
        oid(10),
        &[(MODE_TREE, "b", oid(20)), (MODE_FILE, "a", oid(3))],
    );

    let mut walk = walk_over(&odb, &[oid(10)]);
    walk.set_recursive(true);
    assert_eq!(collect_paths(&mut walk), vec!["a", "b/c/deep", "b/mid"]);
}

#[test]
fn post_order_delivers_subtrees_after_children() {
    let odb = Arc::new(MemoryObjectDatabase::new());
    odb.insert_tree(oid(20), &[(MODE_FILE, "x", oid(1))]);
    odb.insert_tree(oid(10), &[(MODE_TREE, "d", oid(20)), (MODE_FILE, "e", oid(2))]);

    let mut walk = walk_over(&odb, &[oid(10)]);
    walk.set_recursive(true);
    walk.set_post_order(true);

    let mut seen = Vec::new();
    while walk.next().expect("walk") {
        seen.push((walk.path_string(), walk.is_post_children()));
    }
    assert_eq!(
        seen,
        vec![
            ("d/x".to_string(), false),
            ("d".to_string(), true),
            ("e".to_string(), false),
        ]
    );
}

#[test]
fn path_filter_prunes_and_stops() {
    let odb = Arc::new(MemoryObjectDatabase::new());
    odb.insert_tree(oid(20), &[(MODE_FILE, "x", oid(1)), (MODE_FILE, "y", oid(2))]);
    odb.insert_tree(
        oid(10),
        &[
            (MODE_FILE, "a", oid(3)),
            (MODE_TREE, "d", oid(20)),
            (MODE_FILE, "z", oid(4)),
        ],
    );

    let mut walk = walk_over(&odb, &[oid(10)]);
    walk.set_recursive(true);
    walk.set_filter(TreeFilter::path("d/x"));
    assert_eq!(collect_paths(&mut walk), vec!["d/x"]);
}

#[test]
fn path_group_filter_matches_several_prefixes() {
    let odb = Arc::new(MemoryObjectDatabase::new());
    odb.insert_tree(oid(20), &[(MODE_FILE, "x", oid(1))]);
    odb.insert_tree(
        oid(10),
        &[
            (MODE_FILE, "a", oid(2)),
            (MODE_TREE, "d", oid(20)),
            (MODE_FILE, "q", oid(3)),
        ],
    );

    let mut walk = walk_over(&odb, &[oid(10)]);
    walk.set_recursive(true);
    walk.set_filter(TreeFilter::path_group(["a", "d"]));
    assert_eq!(collect_paths(&mut walk), vec!["a", "d/x"]);
}

#[test]
fn any_diff_filter_suppresses_identical_entries() {
    let odb = Arc::new(MemoryObjectDatabase::new());
    odb.insert_tree(oid(10), &[(MODE_FILE, "f", oid(1)), (MODE_FILE, "g", oid(2))]);
    odb.insert_tree(oid(11), &[(MODE_FILE, "f", oid(1)), (MODE_FILE, "g", oid(9))]);

    let mut walk = walk_over(&odb, &[oid(10), oid(11)]);
    walk.set_recursive(true);
    walk.set_filter(TreeFilter::AnyDiff);
    assert_eq!(collect_paths(&mut walk), vec!["g"]);
}

#[test]
fn mode_change_is_a_difference() {
    let odb = Arc::new(MemoryObjectDatabase::new());
    odb.insert_tree(oid(10), &[(MODE_FILE, "f", oid(1))]);
    odb.insert_tree(oid(11), &[(MODE_EXECUTABLE, "f", oid(1))]);

    let mut walk = walk_over(&odb, &[oid(10), oid(11)]);
    walk.set_filter(TreeFilter::AnyDiff);
    assert_eq!(collect_paths(&mut walk), vec!["f"]);
}

#[test]
fn dircache_adapter_diffs_against_canonical_tree() {
    let odb = Arc::new(MemoryObjectDatabase::new());
    odb.insert_tree(oid(20), &[(MODE_FILE, "x", oid(1))]);
    odb.insert_tree(
        oid(10),
        &[(MODE_FILE, "a", oid(2)), (MODE_TREE, "d", oid(20))],
    );

    // The cache agrees on "a" but records a different blob for "d/x".
    let mut builder = DirCache::builder();
    builder.add("a", MODE_FILE, 0, oid(2)).expect("add");
    builder.add("d/x", MODE_FILE, 0, oid(7)).expect("add");
    let cache = Arc::new(builder.finish().expect("finish"));

    let mut walk = walk_over(&odb, &[oid(10)]);
    walk.add_iterator(TreeIter::dir_cache(cache).expect("adapter"))
        .expect("add iterator");
    walk.set_recursive(true);
    walk.set_filter(TreeFilter::AnyDiff);

    assert!(walk.next().expect("walk"));
    assert_eq!(walk.path_string(), "d/x");
    assert_eq!(walk.object_id(0), oid(1));
    assert_eq!(walk.object_id(1), oid(7));
    assert!(!walk.next().expect("walk"));
}

#[test]
fn name_and_mode_accessors() {
    let odb = Arc::new(MemoryObjectDatabase::new());
    odb.insert_tree(oid(20), &[(MODE_EXECUTABLE, "run.sh", oid(1))]);
    odb.insert_tree(oid(10), &[(MODE_TREE, "bin", oid(20))]);

    let mut walk = walk_over(&odb, &[oid(10)]);
    walk.set_recursive(true);
    assert!(walk.next().expect("walk"));
    assert_eq!(walk.path_string(), "bin/run.sh");
    assert_eq!(walk.name_string(), "run.sh");
    assert_eq!(walk.raw_mode(0), MODE_EXECUTABLE);
    assert_eq!(walk.file_mode(0), quarry::FileMode::ExecutableFile);
}
