use std::convert::TryInto;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Barrier;
use std::thread;

use anyhow::Result;
use chrono::{DateTime, Local};
use maplit::hashmap;
use tempfile::TempDir;

use ocflkit::ocfl::{
    DigestAlgorithm, FileChangeType, LayoutExtensionName, LogicalPath, ObjectVersion, OcflConfig,
    OcflError, OcflOptions, OcflRepo, SpecVersion, StorageLayout, VersionInfo, VersionNum,
};

fn init_repo(temp: &TempDir) -> OcflRepo {
    let _ = env_logger::builder().is_test(true).try_init();

    OcflRepo::init_fs_repo(
        temp.path().join("repo"),
        temp.path().join("work"),
        StorageLayout::new(LayoutExtensionName::HashedNTuple),
    )
    .unwrap()
}

fn open_repo(temp: &TempDir) -> OcflRepo {
    OcflRepo::fs_repo(temp.path().join("repo"), temp.path().join("work")).unwrap()
}

fn source_tree(files: &[(&str, &str)]) -> TempDir {
    let source = TempDir::new().unwrap();

    for (path, content) in files {
        let full = source.path().join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, content).unwrap();
    }

    source
}

fn version_info(user: &str, message: &str) -> VersionInfo {
    VersionInfo::new()
        .with_user(Some(user.to_string()), None)
        .unwrap()
        .with_message(Some(message.to_string()))
}

fn logical(path: &str) -> LogicalPath {
    path.try_into().unwrap()
}

fn sha512(content: &str) -> String {
    DigestAlgorithm::Sha512
        .hash_hex(&mut content.as_bytes())
        .unwrap()
        .to_string()
}

fn object_storage_path(temp: &TempDir, repo: &OcflRepo, object_id: &str) -> PathBuf {
    let details = repo.describe_object(object_id).unwrap();
    temp.path().join("repo").join(details.object_root)
}

fn assert_work_dir_empty(temp: &TempDir) {
    let count = fs::read_dir(temp.path().join("work")).unwrap().count();
    assert_eq!(0, count, "expected the work dir to be empty");
}

fn state_digest(version: &ObjectVersion, path: &str) -> String {
    version
        .state
        .get(&logical(path))
        .unwrap_or_else(|| panic!("expected {} in state", path))
        .digest
        .to_string()
}

fn state_content_path(version: &ObjectVersion, path: &str) -> String {
    version
        .state
        .get(&logical(path))
        .unwrap_or_else(|| panic!("expected {} in state", path))
        .content_path
        .to_string()
}

#[test]
fn fresh_put_creates_v1() -> Result<()> {
    let temp = TempDir::new()?;
    let repo = init_repo(&temp);
    let source = source_tree(&[("a.txt", "hello"), ("b/c.txt", "world")]);

    let head = repo.put_object(
        "obj-1",
        None,
        source.path(),
        &version_info("alice", "init"),
        OcflOptions::new(),
    )?;

    assert_eq!(VersionNum::new(1), head);

    let details = repo.describe_object("obj-1")?;
    assert_eq!("obj-1", details.id);
    assert_eq!(VersionNum::new(1), details.head);
    assert_eq!(DigestAlgorithm::Sha512, details.digest_algorithm);

    let v1 = details.versions.get(&VersionNum::new(1)).unwrap();
    assert_eq!(Some("alice".to_string()), v1.user_name);
    assert_eq!(Some("init".to_string()), v1.message);

    let version = repo.describe_version("obj-1", None)?;
    let digests: std::collections::HashMap<LogicalPath, String> = version
        .state
        .iter()
        .map(|(path, details)| (path.clone(), details.digest.to_string()))
        .collect();
    assert_eq!(
        hashmap! {
            logical("a.txt") => sha512("hello"),
            logical("b/c.txt") => sha512("world"),
        },
        digests
    );
    assert_eq!("v1/content/a.txt", state_content_path(&version, "a.txt"));
    assert_eq!("v1/content/b/c.txt", state_content_path(&version, "b/c.txt"));

    let object_root = object_storage_path(&temp, &repo, "obj-1");
    assert!(object_root.join("0=ocfl_object_1.1").is_file());
    assert!(object_root.join("inventory.json").is_file());
    assert!(object_root.join("inventory.json.sha512").is_file());
    assert_eq!(
        "hello",
        fs::read_to_string(object_root.join("v1/content/a.txt"))?
    );

    assert_work_dir_empty(&temp);

    Ok(())
}

#[test]
fn update_dedups_content_across_versions() -> Result<()> {
    let temp = TempDir::new()?;
    let repo = init_repo(&temp);
    let source = source_tree(&[("a.txt", "hello"), ("b/c.txt", "world")]);

    repo.put_object(
        "obj-1",
        None,
        source.path(),
        &version_info("alice", "init"),
        OcflOptions::new(),
    )?;

    let head = repo.update_object("obj-1", None, &version_info("alice", "dup"), |updater| {
        updater.write_file(&mut "hello".as_bytes(), logical("dup/a.txt"), OcflOptions::new())
    })?;

    assert_eq!(VersionNum::new(2), head);

    let version = repo.describe_version("obj-1", None)?;
    assert_eq!(3, version.state.len());
    assert_eq!(sha512("hello"), state_digest(&version, "dup/a.txt"));
    // The duplicate resolves to the content staged in v1; no new content path exists
    assert_eq!("v1/content/a.txt", state_content_path(&version, "dup/a.txt"));

    let object_root = object_storage_path(&temp, &repo, "obj-1");
    assert!(object_root.join("v2").is_dir());
    assert!(!object_root.join("v2/content").exists());

    assert!(!repo.validate_object("obj-1", true)?.has_errors());
    assert_work_dir_empty(&temp);

    Ok(())
}

#[test]
fn remove_then_reinstate() -> Result<()> {
    let temp = TempDir::new()?;
    let repo = init_repo(&temp);
    let source = source_tree(&[("a.txt", "hello"), ("b/c.txt", "world")]);

    repo.put_object(
        "obj-1",
        None,
        source.path(),
        &version_info("alice", "init"),
        OcflOptions::new(),
    )?;

    repo.update_object("obj-1", None, &version_info("alice", "rm"), |updater| {
        updater.remove_file(&logical("a.txt"))
    })?;

    let version = repo.describe_version("obj-1", None)?;
    assert!(!version.state.contains_key(&logical("a.txt")));

    let head = repo.update_object("obj-1", None, &version_info("alice", "restore"), |updater| {
        updater.reinstate_file(
            VersionNum::new(1),
            &logical("a.txt"),
            logical("a.txt"),
            OcflOptions::new(),
        )
    })?;

    assert_eq!(VersionNum::new(3), head);

    let version = repo.describe_version("obj-1", None)?;
    assert_eq!(sha512("hello"), state_digest(&version, "a.txt"));
    assert_eq!("v1/content/a.txt", state_content_path(&version, "a.txt"));

    assert!(!repo.validate_object("obj-1", true)?.has_errors());

    Ok(())
}

#[test]
fn idempotent_put_allocates_no_new_content() -> Result<()> {
    let temp = TempDir::new()?;
    let repo = init_repo(&temp);
    let source = source_tree(&[("a.txt", "hello"), ("b/c.txt", "world")]);

    repo.put_object(
        "obj-1",
        None,
        source.path(),
        &version_info("alice", "one"),
        OcflOptions::new(),
    )?;
    let head = repo.put_object(
        "obj-1",
        None,
        source.path(),
        &version_info("alice", "two"),
        OcflOptions::new(),
    )?;

    assert_eq!(VersionNum::new(2), head);

    let v1 = repo.describe_version("obj-1", Some(VersionNum::new(1)))?;
    let v2 = repo.describe_version("obj-1", Some(VersionNum::new(2)))?;

    assert_eq!(v1.state.len(), v2.state.len());
    assert_eq!(
        state_content_path(&v1, "a.txt"),
        state_content_path(&v2, "a.txt")
    );

    let object_root = object_storage_path(&temp, &repo, "obj-1");
    assert!(!object_root.join("v2/content").exists());

    Ok(())
}

#[test]
fn put_replaces_state() -> Result<()> {
    let temp = TempDir::new()?;
    let repo = init_repo(&temp);

    let first = source_tree(&[("a.txt", "hello"), ("old.txt", "old")]);
    let second = source_tree(&[("a.txt", "hello"), ("new.txt", "new")]);

    repo.put_object(
        "obj-1",
        None,
        first.path(),
        &version_info("alice", "one"),
        OcflOptions::new(),
    )?;
    repo.put_object(
        "obj-1",
        None,
        second.path(),
        &version_info("alice", "two"),
        OcflOptions::new(),
    )?;

    let version = repo.describe_version("obj-1", None)?;
    assert_eq!(2, version.state.len());
    assert!(version.state.contains_key(&logical("a.txt")));
    assert!(version.state.contains_key(&logical("new.txt")));
    assert!(!version.state.contains_key(&logical("old.txt")));

    // The old content is still reachable through v1
    let v1 = repo.describe_version("obj-1", Some(VersionNum::new(1)))?;
    assert!(v1.state.contains_key(&logical("old.txt")));

    Ok(())
}

#[test]
fn move_source_consumes_files() -> Result<()> {
    let temp = TempDir::new()?;
    let repo = init_repo(&temp);
    let source = source_tree(&[("a.txt", "hello")]);

    repo.put_object(
        "obj-1",
        None,
        source.path(),
        &version_info("alice", "init"),
        OcflOptions::new().move_source(true),
    )?;

    assert!(!source.path().join("a.txt").exists());
    assert_eq!(
        sha512("hello"),
        state_digest(&repo.describe_version("obj-1", None)?, "a.txt")
    );

    Ok(())
}

#[test]
fn explicit_version_must_match_head() -> Result<()> {
    let temp = TempDir::new()?;
    let repo = init_repo(&temp);
    let source = source_tree(&[("a.txt", "hello")]);

    repo.put_object(
        "obj-1",
        None,
        source.path(),
        &version_info("alice", "one"),
        OcflOptions::new(),
    )?;
    repo.put_object(
        "obj-1",
        Some(VersionNum::new(1)),
        source.path(),
        &version_info("alice", "two"),
        OcflOptions::new(),
    )?;

    let err = repo
        .update_object(
            "obj-1",
            Some(VersionNum::new(1)),
            &version_info("alice", "stale"),
            |_updater| Ok(()),
        )
        .unwrap_err();

    assert!(matches!(err, OcflError::ObjectOutOfSync { .. }));
    assert_work_dir_empty(&temp);

    Ok(())
}

#[test]
fn concurrent_updates_resolve_optimistically() -> Result<()> {
    let temp = TempDir::new()?;
    let repo = init_repo(&temp);
    let source = source_tree(&[("a.txt", "hello")]);

    repo.put_object(
        "obj-2",
        None,
        source.path(),
        &version_info("alice", "init"),
        OcflOptions::new(),
    )?;

    let barrier = Barrier::new(2);

    let (first, second) = thread::scope(|s| {
        let one = s.spawn(|| {
            repo.update_object("obj-2", None, &version_info("alice", "x"), |updater| {
                barrier.wait();
                updater.write_file(&mut "x".as_bytes(), logical("x.txt"), OcflOptions::new())
            })
        });
        let two = s.spawn(|| {
            repo.update_object("obj-2", None, &version_info("bob", "y"), |updater| {
                barrier.wait();
                updater.write_file(&mut "y".as_bytes(), logical("y.txt"), OcflOptions::new())
            })
        });

        (one.join().unwrap(), two.join().unwrap())
    });

    let succeeded = [&first, &second].iter().filter(|r| r.is_ok()).count();
    assert_eq!(1, succeeded, "exactly one update should win");

    let loser = if first.is_ok() { second } else { first };
    assert!(matches!(
        loser.unwrap_err(),
        OcflError::ObjectOutOfSync { .. }
    ));

    let details = repo.describe_object("obj-2")?;
    assert_eq!(VersionNum::new(2), details.head);

    let version = repo.describe_version("obj-2", None)?;
    let has_x = version.state.contains_key(&logical("x.txt"));
    let has_y = version.state.contains_key(&logical("y.txt"));
    assert!(has_x ^ has_y, "only the winner's file should exist");

    assert!(!repo.validate_object("obj-2", true)?.has_errors());
    assert_work_dir_empty(&temp);

    Ok(())
}

#[test]
fn rollback_removes_later_versions() -> Result<()> {
    let temp = TempDir::new()?;
    let repo = init_repo(&temp);

    repo.put_object(
        "obj-1",
        None,
        source_tree(&[("a.txt", "one")]).path(),
        &version_info("alice", "v1"),
        OcflOptions::new(),
    )?;
    repo.update_object("obj-1", None, &version_info("alice", "v2"), |updater| {
        updater.write_file(&mut "two".as_bytes(), logical("b.txt"), OcflOptions::new())
    })?;
    repo.update_object("obj-1", None, &version_info("alice", "v3"), |updater| {
        updater.write_file(&mut "three".as_bytes(), logical("c.txt"), OcflOptions::new())
    })?;

    repo.rollback_to_version("obj-1", VersionNum::new(1))?;

    let details = repo.describe_object("obj-1")?;
    assert_eq!(VersionNum::new(1), details.head);
    assert_eq!(1, details.versions.len());

    let object_root = object_storage_path(&temp, &repo, "obj-1");
    assert!(object_root.join("v1").is_dir());
    assert!(!object_root.join("v2").exists());
    assert!(!object_root.join("v3").exists());

    assert!(!repo.validate_object("obj-1", true)?.has_errors());

    // Rolling back to the head is a no-op
    repo.rollback_to_version("obj-1", VersionNum::new(1))?;

    Ok(())
}

#[test]
fn mutable_head_objects_refuse_mutation() -> Result<()> {
    let temp = TempDir::new()?;
    let repo = init_repo(&temp);
    let source = source_tree(&[("a.txt", "hello")]);

    repo.put_object(
        "obj-1",
        None,
        source.path(),
        &version_info("alice", "init"),
        OcflOptions::new(),
    )?;
    repo.update_object("obj-1", None, &version_info("alice", "v2"), |updater| {
        updater.write_file(&mut "world".as_bytes(), logical("b.txt"), OcflOptions::new())
    })?;

    let object_root = object_storage_path(&temp, &repo, "obj-1");
    let head_dir = object_root.join("extensions/0004-mutable-head/head");
    fs::create_dir_all(&head_dir)?;
    fs::copy(
        object_root.join("inventory.json"),
        head_dir.join("inventory.json"),
    )?;
    fs::copy(
        object_root.join("inventory.json.sha512"),
        head_dir.join("inventory.json.sha512"),
    )?;

    let err = repo
        .put_object(
            "obj-1",
            None,
            source.path(),
            &version_info("alice", "again"),
            OcflOptions::new(),
        )
        .unwrap_err();
    assert!(matches!(err, OcflError::InvalidState(_)));

    let err = repo
        .update_object("obj-1", None, &version_info("alice", "again"), |_| Ok(()))
        .unwrap_err();
    assert!(matches!(err, OcflError::InvalidState(_)));

    let err = repo
        .rollback_to_version("obj-1", VersionNum::new(1))
        .unwrap_err();
    assert!(matches!(err, OcflError::InvalidState(_)));

    let err = repo.purge_object("obj-1").unwrap_err();
    assert!(matches!(err, OcflError::InvalidState(_)));

    // The refusals left the object untouched on disk
    assert!(object_root.join("v1").is_dir());
    assert!(object_root.join("v2").is_dir());

    assert_work_dir_empty(&temp);

    Ok(())
}

#[test]
fn failed_update_closure_cleans_staging() -> Result<()> {
    let temp = TempDir::new()?;
    let repo = init_repo(&temp);
    let source = source_tree(&[("a.txt", "hello")]);

    repo.put_object(
        "obj-1",
        None,
        source.path(),
        &version_info("alice", "init"),
        OcflOptions::new(),
    )?;

    let err = repo
        .update_object("obj-1", None, &version_info("alice", "boom"), |updater| {
            updater.write_file(&mut "data".as_bytes(), logical("b.txt"), OcflOptions::new())?;
            Err(OcflError::InvalidInput("caller aborted".to_string()))
        })
        .unwrap_err();

    assert!(matches!(err, OcflError::InvalidInput(_)));
    assert_eq!(VersionNum::new(1), repo.describe_object("obj-1")?.head);
    assert_work_dir_empty(&temp);

    Ok(())
}

#[test]
fn rename_and_overwrite_within_update() -> Result<()> {
    let temp = TempDir::new()?;
    let repo = init_repo(&temp);

    repo.put_object(
        "obj-1",
        None,
        source_tree(&[("a.txt", "hello"), ("b.txt", "world")]).path(),
        &version_info("alice", "init"),
        OcflOptions::new(),
    )?;

    // Renaming onto an occupied path requires the overwrite option
    let err = repo
        .update_object("obj-1", None, &version_info("alice", "mv"), |updater| {
            updater.rename_file(&logical("a.txt"), logical("b.txt"), OcflOptions::new())
        })
        .unwrap_err();
    assert!(matches!(err, OcflError::PathAlreadyExists(_)));

    repo.update_object("obj-1", None, &version_info("alice", "mv"), |updater| {
        updater.rename_file(
            &logical("a.txt"),
            logical("b.txt"),
            OcflOptions::new().overwrite(true),
        )
    })?;

    let version = repo.describe_version("obj-1", None)?;
    assert_eq!(1, version.state.len());
    assert_eq!(sha512("hello"), state_digest(&version, "b.txt"));

    Ok(())
}

#[test]
fn read_file_during_update() -> Result<()> {
    let temp = TempDir::new()?;
    let repo = init_repo(&temp);

    repo.put_object(
        "obj-1",
        None,
        source_tree(&[("a.txt", "hello")]).path(),
        &version_info("alice", "init"),
        OcflOptions::new(),
    )?;

    repo.update_object("obj-1", None, &version_info("alice", "read"), |updater| {
        // Previous-version content
        let mut old = String::new();
        updater.read_file(&logical("a.txt"))?.read_to_string(&mut old)?;
        assert_eq!("hello", old);

        updater.write_file(&mut "fresh".as_bytes(), logical("b.txt"), OcflOptions::new())?;

        // Content staged in this update
        let mut staged = String::new();
        updater
            .read_file(&logical("b.txt"))?
            .read_to_string(&mut staged)?;
        assert_eq!("fresh", staged);

        Ok(())
    })?;

    Ok(())
}

#[test]
fn replicate_version_as_head() -> Result<()> {
    let temp = TempDir::new()?;
    let repo = init_repo(&temp);

    repo.put_object(
        "obj-1",
        None,
        source_tree(&[("a.txt", "hello"), ("b.txt", "world")]).path(),
        &version_info("alice", "init"),
        OcflOptions::new(),
    )?;
    repo.update_object("obj-1", None, &version_info("alice", "rm"), |updater| {
        updater.remove_file(&logical("b.txt"))
    })?;

    let head = repo.replicate_version_as_head(
        "obj-1",
        Some(VersionNum::new(1)),
        &version_info("alice", "restore v1"),
    )?;

    assert_eq!(VersionNum::new(3), head);

    let v3 = repo.describe_version("obj-1", None)?;
    assert_eq!(2, v3.state.len());
    assert_eq!("v1/content/b.txt", state_content_path(&v3, "b.txt"));

    let object_root = object_storage_path(&temp, &repo, "obj-1");
    assert!(!object_root.join("v3/content").exists());

    assert!(!repo.validate_object("obj-1", true)?.has_errors());

    Ok(())
}

#[test]
fn export_and_import_object() -> Result<()> {
    let temp_a = TempDir::new()?;
    let repo_a = init_repo(&temp_a);

    repo_a.put_object(
        "obj-1",
        None,
        source_tree(&[("a.txt", "hello")]).path(),
        &version_info("alice", "init"),
        OcflOptions::new(),
    )?;

    let export = TempDir::new()?;
    let export_dir = export.path().join("obj-1");
    repo_a.export_object("obj-1", &export_dir, OcflOptions::new())?;

    let temp_b = TempDir::new()?;
    let repo_b = init_repo(&temp_b);

    let id = repo_b.import_object(&export_dir, OcflOptions::new())?;
    assert_eq!("obj-1", id);

    let version = repo_b.describe_version("obj-1", None)?;
    assert_eq!(sha512("hello"), state_digest(&version, "a.txt"));

    // Importing again collides
    let err = repo_b
        .import_object(&export_dir, OcflOptions::new())
        .unwrap_err();
    assert!(matches!(err, OcflError::AlreadyExists(_)));

    Ok(())
}

#[test]
fn import_version_appends_sequentially() -> Result<()> {
    let temp_a = TempDir::new()?;
    let repo_a = init_repo(&temp_a);

    repo_a.put_object(
        "obj-1",
        None,
        source_tree(&[("a.txt", "hello")]).path(),
        &version_info("alice", "v1"),
        OcflOptions::new(),
    )?;

    let export = TempDir::new()?;
    let export_dir = export.path().join("obj-1");
    repo_a.export_object("obj-1", &export_dir, OcflOptions::new())?;

    repo_a.update_object("obj-1", None, &version_info("alice", "v2"), |updater| {
        updater.write_file(&mut "world".as_bytes(), logical("b.txt"), OcflOptions::new())
    })?;

    let object_root_a = object_storage_path(&temp_a, &repo_a, "obj-1");

    let temp_b = TempDir::new()?;
    let repo_b = init_repo(&temp_b);
    repo_b.import_object(&export_dir, OcflOptions::new())?;

    // Copy v2 out of repo A and import it into repo B
    let staged = TempDir::new()?;
    let v2_copy = staged.path().join("v2");
    copy_dir(&object_root_a.join("v2"), &v2_copy)?;

    let (id, version) = repo_b.import_version(&v2_copy, OcflOptions::new())?;
    assert_eq!("obj-1", id);
    assert_eq!(VersionNum::new(2), version);

    let head = repo_b.describe_version("obj-1", None)?;
    assert_eq!(sha512("world"), state_digest(&head, "b.txt"));
    assert!(!repo_b.validate_object("obj-1", true)?.has_errors());

    Ok(())
}

#[test]
fn import_version_fixity_failure_names_path() -> Result<()> {
    let temp_a = TempDir::new()?;
    let repo_a = init_repo(&temp_a);

    repo_a.put_object(
        "obj-1",
        None,
        source_tree(&[("a.txt", "hello")]).path(),
        &version_info("alice", "v1"),
        OcflOptions::new(),
    )?;

    let export = TempDir::new()?;
    let export_dir = export.path().join("obj-1");
    repo_a.export_object("obj-1", &export_dir, OcflOptions::new())?;

    repo_a.update_object("obj-1", None, &version_info("alice", "v2"), |updater| {
        updater.write_file(&mut "world".as_bytes(), logical("b.txt"), OcflOptions::new())
    })?;

    let object_root_a = object_storage_path(&temp_a, &repo_a, "obj-1");

    let temp_b = TempDir::new()?;
    let repo_b = init_repo(&temp_b);
    repo_b.import_object(&export_dir, OcflOptions::new())?;

    let staged = TempDir::new()?;
    let v2_copy = staged.path().join("v2");
    copy_dir(&object_root_a.join("v2"), &v2_copy)?;
    fs::write(v2_copy.join("content/b.txt"), "tampered")?;

    let err = repo_b
        .import_version(&v2_copy, OcflOptions::new())
        .unwrap_err();

    match err {
        OcflError::Fixity { path, .. } => assert_eq!("v2/content/b.txt", path),
        other => panic!("expected a fixity error; found {:?}", other),
    }

    // The target object is untouched
    assert_eq!(VersionNum::new(1), repo_b.describe_object("obj-1")?.head);

    Ok(())
}

#[test]
fn export_version_materializes_logical_state() -> Result<()> {
    let temp = TempDir::new()?;
    let repo = init_repo(&temp);

    repo.put_object(
        "obj-1",
        None,
        source_tree(&[("a.txt", "hello"), ("b/c.txt", "world")]).path(),
        &version_info("alice", "init"),
        OcflOptions::new(),
    )?;
    repo.update_object("obj-1", None, &version_info("alice", "rm"), |updater| {
        updater.remove_file(&logical("a.txt"))
    })?;

    let out = TempDir::new()?;
    let out_dir = out.path().join("v1");

    let exported = repo.export_version("obj-1", Some(VersionNum::new(1)), &out_dir, OcflOptions::new())?;

    assert_eq!(VersionNum::new(1), exported);
    assert_eq!("hello", fs::read_to_string(out_dir.join("a.txt"))?);
    assert_eq!("world", fs::read_to_string(out_dir.join("b/c.txt"))?);

    Ok(())
}

#[test]
fn file_change_history_tracks_updates_and_removes() -> Result<()> {
    let temp = TempDir::new()?;
    let repo = init_repo(&temp);

    repo.put_object(
        "obj-1",
        None,
        source_tree(&[("a.txt", "one")]).path(),
        &version_info("alice", "v1"),
        OcflOptions::new(),
    )?;
    repo.update_object("obj-1", None, &version_info("alice", "v2"), |updater| {
        updater.write_file(
            &mut "two".as_bytes(),
            logical("a.txt"),
            OcflOptions::new().overwrite(true),
        )
    })?;
    repo.update_object("obj-1", None, &version_info("alice", "v3"), |updater| {
        updater.remove_file(&logical("a.txt"))
    })?;

    let changes = repo.file_change_history("obj-1", &logical("a.txt"))?;

    assert_eq!(3, changes.len());
    assert_eq!(FileChangeType::Update, changes[0].change_type);
    assert_eq!(VersionNum::new(1), changes[0].version_details.version_num);
    assert_eq!(FileChangeType::Update, changes[1].change_type);
    assert_eq!(FileChangeType::Remove, changes[2].change_type);
    assert!(changes[2].content_path.is_none());

    let err = repo
        .file_change_history("obj-1", &logical("never.txt"))
        .unwrap_err();
    assert!(matches!(err, OcflError::NotFound(_)));

    Ok(())
}

#[test]
fn object_streams_read_content() -> Result<()> {
    let temp = TempDir::new()?;
    let repo = init_repo(&temp);

    repo.put_object(
        "obj-1",
        None,
        source_tree(&[("a.txt", "hello"), ("b/c.txt", "world")]).path(),
        &version_info("alice", "init"),
        OcflOptions::new(),
    )?;

    let streams = repo.object_streams("obj-1", None)?;

    assert_eq!(2, streams.logical_paths().len());

    let mut content = String::new();
    streams
        .open(&logical("b/c.txt"))?
        .read_to_string(&mut content)?;
    assert_eq!("world", content);

    Ok(())
}

#[test]
fn list_object_ids_enumerates_repository() -> Result<()> {
    let temp = TempDir::new()?;
    let repo = init_repo(&temp);

    for id in ["obj-1", "obj-2", "obj-3"] {
        repo.put_object(
            id,
            None,
            source_tree(&[("a.txt", id)]).path(),
            &version_info("alice", "init"),
            OcflOptions::new(),
        )?;
    }

    let mut ids: Vec<String> = repo
        .list_object_ids()?
        .collect::<ocflkit::ocfl::Result<Vec<String>>>()?;
    ids.sort();

    assert_eq!(vec!["obj-1", "obj-2", "obj-3"], ids);

    Ok(())
}

#[test]
fn purge_object_removes_everything() -> Result<()> {
    let temp = TempDir::new()?;
    let repo = init_repo(&temp);

    repo.put_object(
        "obj-1",
        None,
        source_tree(&[("a.txt", "hello")]).path(),
        &version_info("alice", "init"),
        OcflOptions::new(),
    )?;

    let object_root = object_storage_path(&temp, &repo, "obj-1");
    repo.purge_object("obj-1")?;

    assert!(!object_root.exists());
    assert!(matches!(
        repo.describe_object("obj-1").unwrap_err(),
        OcflError::NotFound(_)
    ));

    // Purging a missing object is a no-op
    repo.purge_object("obj-1")?;

    Ok(())
}

#[test]
fn closed_repository_rejects_operations() -> Result<()> {
    let temp = TempDir::new()?;
    let repo = init_repo(&temp);

    repo.close();
    repo.close();

    let err = repo
        .put_object(
            "obj-1",
            None,
            source_tree(&[("a.txt", "x")]).path(),
            &version_info("alice", "init"),
            OcflOptions::new(),
        )
        .unwrap_err();

    assert!(matches!(err, OcflError::Closed));

    Ok(())
}

#[test]
fn injected_clock_stamps_versions() -> Result<()> {
    let temp = TempDir::new()?;
    let fixed: DateTime<Local> = DateTime::parse_from_rfc3339("2024-02-29T12:00:00+00:00")
        .unwrap()
        .with_timezone(&Local);

    let repo = OcflRepo::builder()
        .clock(move || fixed)
        .init_fs_repo(
            temp.path().join("repo"),
            temp.path().join("work"),
            StorageLayout::new(LayoutExtensionName::FlatDirect),
        )?;

    repo.put_object(
        "obj-1",
        None,
        source_tree(&[("a.txt", "hello")]).path(),
        &version_info("alice", "init"),
        OcflOptions::new(),
    )?;

    let details = repo.describe_object("obj-1")?;
    assert_eq!(fixed, details.versions.get(&VersionNum::new(1)).unwrap().created);

    Ok(())
}

#[test]
fn upgrade_object_on_write_when_configured() -> Result<()> {
    let temp = TempDir::new()?;

    let repo = OcflRepo::builder()
        .config(OcflConfig {
            spec_version: SpecVersion::Ocfl1_0,
            ..Default::default()
        })
        .init_fs_repo(
            temp.path().join("repo"),
            temp.path().join("work"),
            StorageLayout::new(LayoutExtensionName::FlatDirect),
        )?;

    repo.put_object(
        "obj-1",
        None,
        source_tree(&[("a.txt", "one")]).path(),
        &version_info("alice", "v1"),
        OcflOptions::new(),
    )?;

    assert_eq!(
        Some(SpecVersion::Ocfl1_0),
        repo.describe_object("obj-1")?.spec_version
    );

    let upgrading = OcflRepo::builder()
        .config(OcflConfig {
            spec_version: SpecVersion::Ocfl1_1,
            upgrade_objects_on_write: true,
            ..Default::default()
        })
        .fs_repo(temp.path().join("repo"), temp.path().join("work"))?;

    upgrading.update_object("obj-1", None, &version_info("alice", "v2"), |updater| {
        updater.write_file(&mut "two".as_bytes(), logical("b.txt"), OcflOptions::new())
    })?;

    let details = upgrading.describe_object("obj-1")?;
    assert_eq!(Some(SpecVersion::Ocfl1_1), details.spec_version);

    let object_root = temp.path().join("repo").join(&details.object_root);
    assert!(object_root.join("0=ocfl_object_1.1").is_file());
    assert!(!object_root.join("0=ocfl_object_1.0").exists());

    Ok(())
}

#[test]
fn reopened_repository_reads_existing_objects() -> Result<()> {
    let temp = TempDir::new()?;

    {
        let repo = init_repo(&temp);
        repo.put_object(
            "obj-1",
            None,
            source_tree(&[("a.txt", "hello")]).path(),
            &version_info("alice", "init"),
            OcflOptions::new(),
        )?;
    }

    let repo = open_repo(&temp);
    let version = repo.describe_version("obj-1", None)?;
    assert_eq!(sha512("hello"), state_digest(&version, "a.txt"));

    Ok(())
}

fn copy_dir(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst)?;

    for entry in walk(src)? {
        let relative = entry.strip_prefix(src)?.to_path_buf();
        let target = dst.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&entry, &target)?;
        }
    }

    Ok(())
}

fn walk(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    let mut stack = vec![dir.to_path_buf()];

    while let Some(current) = stack.pop() {
        for entry in fs::read_dir(&current)? {
            let entry = entry?;
            paths.push(entry.path());
            if entry.file_type()?.is_dir() {
                stack.push(entry.path());
            }
        }
    }

    Ok(paths)
}
