use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use riv::branch;
use riv::checkout;
use riv::commit;
use riv::diff;
use riv::error::Error;
use riv::hash::{hash_to_hex, Hash};
use riv::index::Index;
use riv::merge::{self, MergeOutcome, MergeStrategy};
use riv::refs::Head;
use riv::remote;
use riv::repository::Repository;
use riv::reset::{self, ResetMode};
use riv::stage;
use riv::status;
use riv::tag;
use riv::unstage;

//
//
// Init
//
//

#[test]
fn test_init_creates_control_dir() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    Repository::init(root).unwrap();

    assert!(root.join(".riv").is_dir());
    assert!(root.join(".riv/objects").is_dir());
    assert!(root.join(".riv/refs/heads").is_dir());
    assert!(root.join(".riv/refs/tags").is_dir());
    assert!(root.join(".riv/config").is_file());

    let head = fs::read_to_string(root.join(".riv/HEAD")).unwrap();
    assert_eq!(head.trim(), "ref: refs/heads/main");
}

#[test]
fn test_init_twice_fails() {
    let (_dir, root) = setup();
    assert!(matches!(
        Repository::init(&root),
        Err(Error::RepositoryExists(_))
    ));
}

#[test]
fn test_open_without_repo_fails() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(
        Repository::open(dir.path()),
        Err(Error::RepositoryNotFound)
    ));
}

#[test]
fn test_head_resolves_to_none_before_first_commit() {
    let (_dir, root) = setup();
    let repo = open(&root);
    assert_eq!(repo.head_commit().unwrap(), None);
    match repo.head().unwrap() {
        Head::Symbolic { target, resolved } => {
            assert_eq!(target, "refs/heads/main");
            assert_eq!(resolved, None);
        }
        Head::Detached(_) => panic!("fresh HEAD should be symbolic"),
    }
}

//
//
// Objects
//
//

#[test]
fn test_blob_roundtrip_is_binary_safe() {
    let (_dir, root) = setup();
    let repo = open(&root);

    let data: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
    let hash = repo.write_blob(&data).unwrap();
    let back = repo.read_blob(&hash).unwrap();
    assert_eq!(&*back, data.as_slice());
}

#[test]
fn test_blob_write_is_idempotent() {
    let (_dir, root) = setup();
    let repo = open(&root);

    let h1 = repo.write_blob(b"same content").unwrap();
    let before = count_objects(&root);
    let h2 = repo.write_blob(b"same content").unwrap();
    assert_eq!(h1, h2);
    assert_eq!(count_objects(&root), before);
}

//
//
// Scenario: init + commit
//
//

#[test]
fn test_first_commit_writes_three_objects() {
    let (_dir, root) = setup();
    write_file(&root, "hello.txt", b"hi\n");
    stage_paths(&root, &["hello.txt"]);
    let hash = commit_all(&root, "first");

    // blob + tree + commit
    assert_eq!(count_objects(&root), 3);

    let repo = open(&root);
    assert_eq!(repo.read_ref("refs/heads/main").unwrap(), Some(hash));
    let head = fs::read_to_string(root.join(".riv/HEAD")).unwrap();
    assert_eq!(head.trim(), "ref: refs/heads/main");

    // The staged snapshot was flushed into a tree and cleared.
    let index = Index::load(&repo.control_dir()).unwrap();
    assert_eq!(index.count, 0);

    let commit = repo.read_commit(&hash).unwrap();
    assert!(commit.parents.is_empty());
    assert_eq!(&*commit.message, "first");
}

#[test]
fn test_second_commit_has_one_parent() {
    let (_dir, root) = setup();
    write_file(&root, "a.txt", b"one\n");
    stage_all(&root);
    let first = commit_all(&root, "one");

    write_file(&root, "a.txt", b"two\n");
    stage_all(&root);
    let second = commit_all(&root, "two");

    let repo = open(&root);
    let commit = repo.read_commit(&second).unwrap();
    assert_eq!(commit.parents.as_slice(), &[first]);
}

#[test]
fn test_empty_commit_is_rejected() {
    let (_dir, root) = setup();
    let repo = open(&root);
    match commit::commit(&repo, "nothing here") {
        Err(Error::InvalidArgument(msg)) => assert_eq!(msg, "nothing to commit"),
        other => panic!("expected nothing-to-commit, got {other:?}"),
    }

    // Also rejected when the staged content matches HEAD exactly.
    write_file(&root, "a.txt", b"hi\n");
    stage_all(&root);
    commit_all(&root, "first");
    stage_all(&root);
    let repo = open(&root);
    assert!(matches!(
        commit::commit(&repo, "again"),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn test_commit_roundtrip_preserves_fields() {
    let (_dir, root) = setup();
    write_file(&root, "x", b"x\n");
    stage_all(&root);
    let hash = commit_all(&root, "a message\nwith a body");

    let repo = open(&root);
    let commit = repo.read_commit(&hash).unwrap();
    assert_eq!(&*commit.message, "a message\nwith a body");
    assert!(commit.timestamp > 0);
    let tree = repo.flatten_tree(&commit.tree).unwrap();
    assert!(tree.contains_key("x"));
}

//
//
// Stage / Unstage
//
//

#[test]
fn test_stage_single_file() {
    let (_dir, root) = setup();
    write_file(&root, "hello.rs", b"fn hello() {}");
    stage_paths(&root, &["hello.rs"]);

    let repo = open(&root);
    let index = Index::load(&repo.control_dir()).unwrap();
    assert_eq!(index.count, 1);
    assert!(index.find("hello.rs").is_some());
    assert!(index.any_staged());
}

#[test]
fn test_stage_nested_files() {
    let (_dir, root) = setup();
    write_file(&root, "src/main.rs", b"fn main() {}");
    write_file(&root, "src/deep/lib.rs", b"pub fn foo() {}");
    write_file(&root, "README.md", b"# Hello");
    stage_all(&root);
    let hash = commit_all(&root, "tree shape");

    let repo = open(&root);
    let commit = repo.read_commit(&hash).unwrap();
    let flat = repo.flatten_tree(&commit.tree).unwrap();
    assert!(flat.contains_key("src/main.rs"));
    assert!(flat.contains_key("src/deep/lib.rs"));
    assert!(flat.contains_key("README.md"));
}

#[test]
fn test_stage_is_idempotent() {
    let (_dir, root) = setup();
    write_file(&root, "file.rs", b"content");
    stage_paths(&root, &["file.rs"]);
    let repo = open(&root);
    let h1 = {
        let index = Index::load(&repo.control_dir()).unwrap();
        index.hashes[index.find("file.rs").unwrap()]
    };

    stage_paths(&root, &["file.rs"]);
    stage_paths(&root, &["file.rs"]);

    let index = Index::load(&repo.control_dir()).unwrap();
    assert_eq!(index.count, 1);
    assert_eq!(index.hashes[index.find("file.rs").unwrap()], h1);
}

#[test]
fn test_stage_updated_file_changes_hash() {
    let (_dir, root) = setup();
    write_file(&root, "file.rs", b"v1");
    stage_paths(&root, &["file.rs"]);
    let repo = open(&root);
    let h1 = {
        let index = Index::load(&repo.control_dir()).unwrap();
        index.hashes[index.find("file.rs").unwrap()]
    };

    write_file(&root, "file.rs", b"v2");
    stage_paths(&root, &["file.rs"]);
    let index = Index::load(&repo.control_dir()).unwrap();
    assert_eq!(index.count, 1);
    assert_ne!(index.hashes[index.find("file.rs").unwrap()], h1);
}

#[test]
fn test_stage_drops_vanished_files() {
    let (_dir, root) = setup();
    write_file(&root, "a.rs", b"aaa");
    write_file(&root, "b.rs", b"bbb");
    stage_all(&root);

    fs::remove_file(root.join("b.rs")).unwrap();
    stage_all(&root);

    let repo = open(&root);
    let index = Index::load(&repo.control_dir()).unwrap();
    assert!(index.find("a.rs").is_some());
    assert!(index.find("b.rs").is_none());
}

#[test]
fn test_unstage_specific_file() {
    let (_dir, root) = setup();
    write_file(&root, "a.rs", b"aaa");
    write_file(&root, "b.rs", b"bbb");
    stage_all(&root);

    let repo = open(&root);
    let removed = unstage::unstage(&repo, &[PathBuf::from("a.rs")]).unwrap();
    assert_eq!(removed, 1);

    let index = Index::load(&repo.control_dir()).unwrap();
    assert!(index.find("a.rs").is_none());
    assert!(index.find("b.rs").is_some());
    assert!(root.join("a.rs").exists());
}

#[test]
fn test_unstage_all() {
    let (_dir, root) = setup();
    write_file(&root, "a.rs", b"aaa");
    write_file(&root, "b.rs", b"bbb");
    stage_all(&root);

    let repo = open(&root);
    unstage::unstage(&repo, &[]).unwrap();
    let index = Index::load(&repo.control_dir()).unwrap();
    assert_eq!(index.count, 0);
}

#[test]
fn test_stage_bytes_persists_blob_before_entry() {
    let (_dir, root) = setup();
    let repo = open(&root);
    let hash = stage::stage_bytes(&repo, "virtual.txt", b"bytes\n").unwrap();
    assert!(repo.storage.exists(&hash));

    let index = Index::load(&repo.control_dir()).unwrap();
    let i = index.find("virtual.txt").unwrap();
    assert_eq!(index.hashes[i], hash);
}

//
//
// Scenario: modify + status + diff
//
//

#[test]
fn test_modified_file_shows_unstaged() {
    let (_dir, root) = setup();
    write_file(&root, "hello.txt", b"hi\n");
    stage_paths(&root, &["hello.txt"]);
    commit_all(&root, "first");

    write_file(&root, "hello.txt", b"hi there\n");

    let repo = open(&root);
    let report = status::collect(&repo).unwrap();
    assert_eq!(report.unstaged_modified, vec!["hello.txt".to_string()]);
    assert!(report.staged_modified.is_empty());

    // Unified diff carries the one-line change plus the symmetric
    // trailing context line.
    let out = diff::unified("hi\n", "hi there\n", 0, false);
    assert!(out.contains("-hi\n"), "{out}");
    assert!(out.contains("+hi there\n"), "{out}");
}

#[test]
fn test_status_buckets() {
    let (_dir, root) = setup();
    write_file(&root, "keep.txt", b"keep\n");
    write_file(&root, "gone.txt", b"gone\n");
    stage_all(&root);
    commit_all(&root, "base");

    // staged new
    write_file(&root, "new.txt", b"new\n");
    stage_paths(&root, &["new.txt"]);
    // staged modified
    write_file(&root, "keep.txt", b"changed\n");
    stage_paths(&root, &["keep.txt"]);
    // staged deleted
    let repo = open(&root);
    unstage::unstage(&repo, &[PathBuf::from("gone.txt")]).unwrap();
    // untracked
    write_file(&root, "stray.txt", b"stray\n");

    let report = status::collect(&repo).unwrap();
    assert_eq!(report.branch.as_deref(), Some("main"));
    assert_eq!(report.staged_new, vec!["new.txt".to_string()]);
    assert_eq!(report.staged_modified, vec!["keep.txt".to_string()]);
    assert_eq!(report.staged_deleted, vec!["gone.txt".to_string()]);
    assert_eq!(
        report.untracked,
        vec!["gone.txt".to_string(), "stray.txt".to_string()]
    );
}

#[test]
fn test_deleted_workspace_file_shows_unstaged_deleted() {
    let (_dir, root) = setup();
    write_file(&root, "a.txt", b"a\n");
    stage_all(&root);
    commit_all(&root, "base");

    fs::remove_file(root.join("a.txt")).unwrap();
    let repo = open(&root);
    let report = status::collect(&repo).unwrap();
    assert_eq!(report.unstaged_deleted, vec!["a.txt".to_string()]);
}

#[test]
fn test_stat_fast_path_never_lies() {
    let (_dir, root) = setup();
    write_file(&root, "a.txt", b"stable\n");
    stage_all(&root);
    commit_all(&root, "base");

    // Same content, different mtime: the rehash proves it unchanged.
    touch_future(&root, "a.txt");
    let repo = open(&root);
    let report = status::collect(&repo).unwrap();
    assert!(report.unstaged_modified.is_empty());

    // Same length, different content: must be detected.
    write_file(&root, "a.txt", b"stAble\n");
    let report = status::collect(&repo).unwrap();
    assert_eq!(report.unstaged_modified, vec!["a.txt".to_string()]);
}

#[test]
fn test_ignored_files_stay_untracked() {
    let (_dir, root) = setup();
    fs::write(root.join(".rivignore"), ".riv/\nlogs/\n*.tmp\n").unwrap();
    write_file(&root, "logs/out.log", b"x");
    write_file(&root, "scratch.tmp", b"x");
    write_file(&root, "kept.txt", b"x");
    stage_all(&root);

    let repo = open(&root);
    let index = Index::load(&repo.control_dir()).unwrap();
    assert!(index.find("kept.txt").is_some());
    assert!(index.find("logs/out.log").is_none());
    assert!(index.find("scratch.tmp").is_none());

    let report = status::collect(&repo).unwrap();
    assert!(!report.untracked.contains(&"logs/out.log".to_string()));
    assert!(!report.untracked.contains(&"scratch.tmp".to_string()));
}

//
//
// Scenario: branch + fast-forward merge
//
//

#[test]
fn test_branch_and_fast_forward() {
    let (_dir, root) = setup();
    write_file(&root, "hello.txt", b"hi\n");
    stage_paths(&root, &["hello.txt"]);
    let base = commit_all(&root, "first");

    let repo = open(&root);
    branch::create(&repo, "feat", None).unwrap();
    checkout::checkout(&repo, "feat", false).unwrap();

    write_file(&root, "b.txt", b"b\n");
    stage_paths(&root, &["b.txt"]);
    let feat_tip = commit_all(&root, "add b");

    let repo = open(&root);
    checkout::checkout(&repo, "main", false).unwrap();
    assert!(!root.join("b.txt").exists());

    let outcome = merge::merge(&repo, "feat", MergeStrategy::Normal).unwrap();
    assert_eq!(outcome, MergeOutcome::FastForward(feat_tip));

    // Branch moved, no new commit, both files present.
    assert_eq!(repo.read_ref("refs/heads/main").unwrap(), Some(feat_tip));
    let history = commit::history(&repo, &feat_tip, 100).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].0, base);
    assert!(root.join("hello.txt").exists());
    assert_eq!(read_file(&root, "b.txt"), b"b\n");
}

#[test]
fn test_checkout_refuses_dirty_switch() {
    let (_dir, root) = setup();
    write_file(&root, "a.txt", b"v1\n");
    stage_all(&root);
    commit_all(&root, "one");

    let repo = open(&root);
    branch::create(&repo, "other", None).unwrap();

    write_file(&root, "a.txt", b"uncommitted\n");
    assert!(matches!(
        checkout::checkout(&repo, "other", false),
        Err(Error::DirtyWorkspace)
    ));

    // Forced switch discards the edit.
    checkout::checkout(&repo, "other", true).unwrap();
    assert_eq!(read_file(&root, "a.txt"), b"v1\n");
}

#[test]
fn test_branch_delete_safety() {
    let (_dir, root) = setup();
    write_file(&root, "a.txt", b"a\n");
    stage_all(&root);
    commit_all(&root, "base");

    let repo = open(&root);
    branch::create(&repo, "feat", None).unwrap();
    checkout::checkout(&repo, "feat", false).unwrap();
    write_file(&root, "f.txt", b"f\n");
    stage_paths(&root, &["f.txt"]);
    commit_all(&root, "feature work");

    let repo = open(&root);
    assert!(matches!(
        branch::delete(&repo, "feat", false),
        Err(Error::BranchInUse(_))
    ));

    checkout::checkout(&repo, "main", false).unwrap();

    // Unmerged tip: safe delete refuses, forced delete goes through.
    assert!(matches!(
        branch::delete(&repo, "feat", false),
        Err(Error::InvalidArgument(_))
    ));
    branch::delete(&repo, "feat", true).unwrap();
    assert!(!branch::branch_exists(&repo, "feat"));
}

#[test]
fn test_branch_rename_follows_head() {
    let (_dir, root) = setup();
    write_file(&root, "a.txt", b"a\n");
    stage_all(&root);
    commit_all(&root, "base");

    let repo = open(&root);
    branch::rename(&repo, "main", "trunk").unwrap();
    assert_eq!(repo.current_branch().unwrap().as_deref(), Some("trunk"));
    assert!(!branch::branch_exists(&repo, "main"));
}

#[test]
fn test_duplicate_branch_is_rejected() {
    let (_dir, root) = setup();
    write_file(&root, "a.txt", b"a\n");
    stage_all(&root);
    commit_all(&root, "base");

    let repo = open(&root);
    branch::create(&repo, "feat", None).unwrap();
    assert!(matches!(
        branch::create(&repo, "feat", None),
        Err(Error::RefExists(_))
    ));
}

//
//
// Scenario: conflicting three-way merge
//
//

#[test]
fn test_conflicting_merge_writes_markers() {
    let (_dir, root) = setup();
    write_file(&root, "hello.txt", b"hi\n");
    stage_paths(&root, &["hello.txt"]);
    commit_all(&root, "first");

    // Branch from the base, then diverge both sides.
    let repo = open(&root);
    branch::create(&repo, "feat", None).unwrap();

    write_file(&root, "hello.txt", b"main\n");
    stage_paths(&root, &["hello.txt"]);
    commit_all(&root, "main edit");

    let repo = open(&root);
    checkout::checkout(&repo, "feat", false).unwrap();
    write_file(&root, "hello.txt", b"feat\n");
    stage_paths(&root, &["hello.txt"]);
    let feat_tip = commit_all(&root, "feat edit");

    let repo = open(&root);
    checkout::checkout(&repo, "main", false).unwrap();

    match merge::merge(&repo, "feat", MergeStrategy::Normal) {
        Err(Error::MergeConflict(paths)) => {
            assert_eq!(paths, vec!["hello.txt".to_string()]);
        }
        other => panic!("expected a conflict, got {other:?}"),
    }

    assert_eq!(repo.merge_head().unwrap(), Some(feat_tip));
    assert_eq!(
        read_file(&root, "hello.txt"),
        b"<<<<<<< HEAD\nmain\n=======\nfeat\n>>>>>>> feat\n"
    );

    let report = status::collect(&repo).unwrap();
    assert!(report.merging);
    assert_eq!(report.conflicts, vec!["hello.txt".to_string()]);

    // Resolve, stage, commit: two parents, marker cleared.
    write_file(&root, "hello.txt", b"resolved\n");
    stage_paths(&root, &["hello.txt"]);
    let repo = open(&root);
    let merge_commit = commit::commit(&repo, "merge feat").unwrap();
    let commit = repo.read_commit(&merge_commit).unwrap();
    assert_eq!(commit.parents.len(), 2);
    assert_eq!(repo.merge_head().unwrap(), None);
}

#[test]
fn test_merge_of_disjoint_files_succeeds() {
    let (_dir, root) = setup();
    write_file(&root, "base.txt", b"base\n");
    stage_all(&root);
    commit_all(&root, "base");

    let repo = open(&root);
    branch::create(&repo, "feat", None).unwrap();

    write_file(&root, "main-only.txt", b"m\n");
    stage_paths(&root, &["main-only.txt"]);
    commit_all(&root, "main side");

    let repo = open(&root);
    checkout::checkout(&repo, "feat", false).unwrap();
    write_file(&root, "feat-only.txt", b"f\n");
    stage_paths(&root, &["feat-only.txt"]);
    commit_all(&root, "feat side");

    let repo = open(&root);
    checkout::checkout(&repo, "main", false).unwrap();
    let outcome = merge::merge(&repo, "feat", MergeStrategy::Normal).unwrap();

    let MergeOutcome::Merged(hash) = outcome else {
        panic!("expected a merge commit, got {outcome:?}");
    };
    let commit = repo.read_commit(&hash).unwrap();
    assert_eq!(commit.parents.len(), 2);
    assert_eq!(read_file(&root, "main-only.txt"), b"m\n");
    assert_eq!(read_file(&root, "feat-only.txt"), b"f\n");

    // Non-conflicting changes never produce markers.
    assert!(!read_file(&root, "feat-only.txt").starts_with(b"<<<<<<<"));
}

#[test]
fn test_merge_identical_change_is_not_a_conflict() {
    let (_dir, root) = setup();
    write_file(&root, "same.txt", b"old\n");
    stage_all(&root);
    commit_all(&root, "base");

    let repo = open(&root);
    branch::create(&repo, "feat", None).unwrap();

    write_file(&root, "same.txt", b"new\n");
    stage_paths(&root, &["same.txt"]);
    commit_all(&root, "main new");

    let repo = open(&root);
    checkout::checkout(&repo, "feat", false).unwrap();
    write_file(&root, "same.txt", b"new\n");
    stage_paths(&root, &["same.txt"]);
    commit_all(&root, "feat new");

    let repo = open(&root);
    checkout::checkout(&repo, "main", false).unwrap();
    let outcome = merge::merge(&repo, "feat", MergeStrategy::Normal).unwrap();
    assert!(matches!(outcome, MergeOutcome::Merged(_)));
    assert_eq!(read_file(&root, "same.txt"), b"new\n");
}

#[test]
fn test_merge_theirs_takes_source_side() {
    let (_dir, root) = setup();
    write_file(&root, "c.txt", b"base\n");
    stage_all(&root);
    commit_all(&root, "base");

    let repo = open(&root);
    branch::create(&repo, "feat", None).unwrap();

    write_file(&root, "c.txt", b"ours\n");
    stage_paths(&root, &["c.txt"]);
    commit_all(&root, "ours");

    let repo = open(&root);
    checkout::checkout(&repo, "feat", false).unwrap();
    write_file(&root, "c.txt", b"theirs\n");
    stage_paths(&root, &["c.txt"]);
    commit_all(&root, "theirs");

    let repo = open(&root);
    checkout::checkout(&repo, "main", false).unwrap();
    let outcome = merge::merge(&repo, "feat", MergeStrategy::Theirs).unwrap();
    assert!(matches!(outcome, MergeOutcome::Merged(_)));
    assert_eq!(read_file(&root, "c.txt"), b"theirs\n");
}

#[test]
fn test_merge_same_branch_is_noop() {
    let (_dir, root) = setup();
    write_file(&root, "a.txt", b"a\n");
    stage_all(&root);
    commit_all(&root, "base");

    let repo = open(&root);
    assert_eq!(
        merge::merge(&repo, "main", MergeStrategy::Normal).unwrap(),
        MergeOutcome::AlreadyUpToDate
    );
}

#[test]
fn test_merge_already_contained_branch_is_noop() {
    let (_dir, root) = setup();
    write_file(&root, "a.txt", b"a\n");
    stage_all(&root);
    commit_all(&root, "base");

    let repo = open(&root);
    branch::create(&repo, "old", None).unwrap();

    write_file(&root, "b.txt", b"b\n");
    stage_paths(&root, &["b.txt"]);
    commit_all(&root, "ahead");

    let repo = open(&root);
    assert_eq!(
        merge::merge(&repo, "old", MergeStrategy::Normal).unwrap(),
        MergeOutcome::AlreadyUpToDate
    );
}

//
//
// Scenario: detached HEAD
//
//

#[test]
fn test_detached_head_commit_moves_no_branch() {
    let (_dir, root) = setup();
    write_file(&root, "a.txt", b"a\n");
    stage_all(&root);
    let first = commit_all(&root, "first");

    let repo = open(&root);
    checkout::checkout(&repo, &hash_to_hex(&first), false).unwrap();

    let report = status::collect(&repo).unwrap();
    assert_eq!(report.branch, None);
    assert_eq!(repo.head().unwrap(), Head::Detached(first));

    write_file(&root, "a.txt", b"detached work\n");
    stage_paths(&root, &["a.txt"]);
    let repo = open(&root);
    let detached = commit::commit(&repo, "on no branch").unwrap();

    // The branch stays put; HEAD itself advanced.
    assert_eq!(repo.read_ref("refs/heads/main").unwrap(), Some(first));
    assert_eq!(repo.head().unwrap(), Head::Detached(detached));
}

//
//
// Scenario: index lock contention
//
//

#[test]
fn test_concurrent_stage_bytes_both_land() {
    let (_dir, root) = setup();
    let r1 = root.clone();
    let r2 = root.clone();

    let t1 = std::thread::spawn(move || {
        let repo = Repository::open(&r1).unwrap();
        stage::stage_bytes(&repo, "left.txt", b"left\n").unwrap();
    });
    let t2 = std::thread::spawn(move || {
        let repo = Repository::open(&r2).unwrap();
        stage::stage_bytes(&repo, "right.txt", b"right\n").unwrap();
    });
    t1.join().unwrap();
    t2.join().unwrap();

    let repo = open(&root);
    let index = Index::load(&repo.control_dir()).unwrap();
    assert!(index.find("left.txt").is_some());
    assert!(index.find("right.txt").is_some());
    assert!(!repo.control_dir().join("index.lock").exists());
}

//
//
// Tags
//
//

#[test]
fn test_lightweight_and_annotated_tags() {
    let (_dir, root) = setup();
    write_file(&root, "a.txt", b"a\n");
    stage_all(&root);
    let hash = commit_all(&root, "base");

    let repo = open(&root);
    tag::create(&repo, "v1", None, None).unwrap();
    assert_eq!(tag::peel(&repo, "v1").unwrap(), Some(hash));
    assert!(tag::read_record(&repo, "v1").unwrap().is_none());

    tag::create(&repo, "v2", None, Some("release two")).unwrap();
    assert_eq!(tag::peel(&repo, "v2").unwrap(), Some(hash));
    let record = tag::read_record(&repo, "v2").unwrap().unwrap();
    assert_eq!(record.object, hash_to_hex(&hash));
    assert_eq!(record.kind, "commit");
    assert_eq!(record.message, "release two");

    assert!(matches!(
        tag::create(&repo, "v1", None, None),
        Err(Error::RefExists(_))
    ));

    tag::delete(&repo, "v1").unwrap();
    assert_eq!(tag::peel(&repo, "v1").unwrap(), None);
    assert!(matches!(tag::delete(&repo, "v1"), Err(Error::RefMissing(_))));
}

#[test]
fn test_checkout_tag_detaches() {
    let (_dir, root) = setup();
    write_file(&root, "a.txt", b"a\n");
    stage_all(&root);
    let tagged = commit_all(&root, "base");

    let repo = open(&root);
    tag::create(&repo, "rel", None, Some("pin")).unwrap();

    write_file(&root, "a.txt", b"later\n");
    stage_all(&root);
    commit_all(&root, "later");

    let repo = open(&root);
    checkout::checkout(&repo, "rel", false).unwrap();
    assert_eq!(repo.head().unwrap(), Head::Detached(tagged));
    assert_eq!(read_file(&root, "a.txt"), b"a\n");
}

//
//
// Remotes
//
//

#[test]
fn test_remote_registry() {
    let (_dir, root) = setup();
    let repo = open(&root);

    remote::add(&repo, "origin", "ssh://host/repo").unwrap();
    remote::add(&repo, "backup", "/mnt/backup").unwrap();
    assert!(matches!(
        remote::add(&repo, "origin", "elsewhere"),
        Err(Error::InvalidArgument(_))
    ));

    let listed = remote::list(&repo).unwrap();
    assert_eq!(
        listed,
        vec![
            ("backup".to_string(), "/mnt/backup".to_string()),
            ("origin".to_string(), "ssh://host/repo".to_string()),
        ]
    );

    remote::remove(&repo, "backup").unwrap();
    assert!(matches!(
        remote::remove(&repo, "backup"),
        Err(Error::InvalidArgument(_))
    ));
    assert_eq!(remote::list(&repo).unwrap().len(), 1);
}

//
//
// Config
//
//

#[test]
fn test_config_persists_across_opens() {
    let (_dir, root) = setup();
    {
        let mut repo = open(&root);
        repo.config.set("user", "name", "Ada").unwrap();
        repo.config.set("user", "email", "ada@example.com").unwrap();
    }
    let repo = open(&root);
    assert_eq!(repo.config.get("user", "name"), Some("Ada"));
    assert_eq!(repo.config.author(), "Ada <ada@example.com>");
    assert!(repo
        .config
        .list()
        .contains(&("branch.default".to_string(), "main".to_string())));
}

//
//
// Reset
//
//

#[test]
fn test_reset_modes() {
    let (_dir, root) = setup();
    write_file(&root, "a.txt", b"v1\n");
    stage_all(&root);
    let c1 = commit_all(&root, "one");

    write_file(&root, "a.txt", b"v2\n");
    stage_all(&root);
    commit_all(&root, "two");

    // Soft: branch moves, index still holds v2 -> staged modification.
    let repo = open(&root);
    reset::reset(&repo, ResetMode::Soft, &hash_to_hex(&c1), false).unwrap();
    assert_eq!(repo.head_commit().unwrap(), Some(c1));
    let report = status::collect(&repo).unwrap();
    assert_eq!(report.staged_modified, vec!["a.txt".to_string()]);

    // Mixed: index matches c1, workspace still holds v2.
    reset::reset(&repo, ResetMode::Mixed, &hash_to_hex(&c1), false).unwrap();
    let report = status::collect(&repo).unwrap();
    assert!(report.staged_modified.is_empty());
    assert_eq!(report.unstaged_modified, vec!["a.txt".to_string()]);
    assert_eq!(read_file(&root, "a.txt"), b"v2\n");

    // Hard refuses while dirty, then rewrites the workspace when forced.
    assert!(matches!(
        reset::reset(&repo, ResetMode::Hard, &hash_to_hex(&c1), false),
        Err(Error::DirtyWorkspace)
    ));
    reset::reset(&repo, ResetMode::Hard, &hash_to_hex(&c1), true).unwrap();
    assert_eq!(read_file(&root, "a.txt"), b"v1\n");
    let report = status::collect(&repo).unwrap();
    assert!(report.is_clean());
}

//
//
// History and log
//
//

#[test]
fn test_history_is_first_parent_and_bounded() {
    let (_dir, root) = setup();
    let mut last = None;
    for i in 0..5 {
        write_file(&root, "n.txt", format!("{i}\n").as_bytes());
        stage_paths(&root, &["n.txt"]);
        last = Some(commit_all(&root, &format!("commit {i}")));
    }

    let repo = open(&root);
    let all = commit::history(&repo, &last.unwrap(), 100).unwrap();
    assert_eq!(all.len(), 5);
    assert_eq!(&*all[0].1.message, "commit 4");
    assert_eq!(&*all[4].1.message, "commit 0");

    let bounded = commit::history(&repo, &last.unwrap(), 2).unwrap();
    assert_eq!(bounded.len(), 2);
}

#[test]
fn test_diff_commits_classifies_paths() {
    let (_dir, root) = setup();
    write_file(&root, "kept.txt", b"same\n");
    write_file(&root, "edited.txt", b"old\n");
    write_file(&root, "removed.txt", b"bye\n");
    stage_all(&root);
    let c1 = commit_all(&root, "one");

    write_file(&root, "edited.txt", b"new\n");
    write_file(&root, "added.txt", b"hi\n");
    fs::remove_file(root.join("removed.txt")).unwrap();
    stage_all(&root);
    let c2 = commit_all(&root, "two");

    let repo = open(&root);
    let delta = commit::diff_commits(&repo, Some(&c1), &c2).unwrap();
    assert_eq!(delta.added, vec!["added.txt".to_string()]);
    assert_eq!(delta.modified, vec!["edited.txt".to_string()]);
    assert_eq!(delta.deleted, vec!["removed.txt".to_string()]);
}

#[test]
fn test_log_output_contains_commits() {
    let (_dir, root) = setup();
    write_file(&root, "a.txt", b"one\n");
    stage_all(&root);
    commit_all(&root, "first words");

    write_file(&root, "a.txt", b"two\n");
    stage_all(&root);
    commit_all(&root, "second words");

    let repo = open(&root);
    let mut out = Vec::new();
    riv::log::log(&repo, &mut out, 100, false).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("second words"));
    assert!(text.contains("first words"));
    assert!(text.matches("commit ").count() >= 2);

    let mut patched = Vec::new();
    riv::log::log(&repo, &mut patched, 1, true).unwrap();
    let text = String::from_utf8(patched).unwrap();
    assert!(text.contains("+two"), "{text}");
    assert!(text.contains("-one"), "{text}");
}

//
//
// Full end-to-end workflow
//
//

#[test]
fn test_full_dev_workflow() {
    let (_dir, root) = setup();

    // Initial commit.
    write_file(&root, "src/main.rs", b"fn main() {}\n");
    write_file(&root, "README.md", b"# Project\n");
    stage_all(&root);
    commit_all(&root, "initial commit");

    // Feature branch.
    let repo = open(&root);
    branch::create(&repo, "feature", None).unwrap();
    checkout::checkout(&repo, "feature", false).unwrap();

    write_file(&root, "src/feature.rs", b"pub fn feature() {}\n");
    stage_all(&root);
    commit_all(&root, "add feature");

    // Meanwhile main moves on.
    let repo = open(&root);
    checkout::checkout(&repo, "main", false).unwrap();
    assert!(!root.join("src/feature.rs").exists());
    write_file(&root, "README.md", b"# Project\n\nDocs.\n");
    stage_all(&root);
    commit_all(&root, "expand readme");

    // Merge the feature back: disjoint paths, true three-way merge.
    let repo = open(&root);
    let outcome = merge::merge(&repo, "feature", MergeStrategy::Normal).unwrap();
    assert!(matches!(outcome, MergeOutcome::Merged(_)));
    assert!(root.join("src/feature.rs").exists());
    assert_eq!(read_file(&root, "README.md"), b"# Project\n\nDocs.\n");

    // Tag the result and verify a clean tree.
    tag::create(&repo, "v0.1", None, Some("first cut")).unwrap();
    let report = status::collect(&repo).unwrap();
    assert!(report.is_clean(), "{report:?}");

    let head = repo.head_commit().unwrap().unwrap();
    let history = commit::history(&repo, &head, 100).unwrap();
    assert_eq!(history[0].1.parents.len(), 2);
}

//
//
// Helpers
//
//

fn setup() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let root = dir.path().to_path_buf();
    Repository::init(&root).unwrap();
    // Keep scenarios predictable: only explicitly created files below.
    fs::remove_file(root.join(".rivignore")).unwrap();
    fs::write(root.join(".rivignore"), ".riv/\n.rivignore\n").unwrap();
    (dir, root)
}

fn open(root: &Path) -> Repository {
    Repository::open(root).unwrap()
}

fn write_file(root: &Path, rel: &str, content: &[u8]) {
    use std::sync::atomic::{AtomicU64, Ordering};
    static MTIME_SEQ: AtomicU64 = AtomicU64::new(1);

    let abs = root.join(rel);
    if let Some(parent) = abs.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&abs, content).unwrap();
    // Force a distinct mtime second for every write so the stat fast
    // path always notices rewrites, even same-length ones.
    let bump = std::time::Duration::from_secs(MTIME_SEQ.fetch_add(1, Ordering::Relaxed));
    let mtime = std::time::SystemTime::now() + bump;
    filetime::set_file_mtime(&abs, filetime::FileTime::from_system_time(mtime)).unwrap();
}

fn touch_future(root: &Path, rel: &str) {
    let abs = root.join(rel);
    let future = std::time::SystemTime::now() + std::time::Duration::from_secs(2);
    filetime::set_file_mtime(&abs, filetime::FileTime::from_system_time(future)).unwrap();
}

#[track_caller]
fn read_file(root: &Path, rel: &str) -> Vec<u8> {
    fs::read(root.join(rel)).unwrap()
}

fn stage_all(root: &Path) {
    let repo = open(root);
    stage::stage(&repo, &[root.to_path_buf()]).unwrap();
}

fn stage_paths(root: &Path, rels: &[&str]) {
    let repo = open(root);
    let paths: Vec<PathBuf> = rels.iter().map(|r| root.join(r)).collect();
    stage::stage(&repo, &paths).unwrap();
}

fn commit_all(root: &Path, message: &str) -> Hash {
    let repo = open(root);
    commit::commit(&repo, message).unwrap()
}

fn count_objects(root: &Path) -> usize {
    fn walk(dir: &Path, count: &mut usize) {
        for entry in fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(&path, count);
            } else {
                *count += 1;
            }
        }
    }
    let mut count = 0;
    walk(&root.join(".riv/objects"), &mut count);
    count
}
