use std::path::PathBuf;

use omt_fs::{FsConfig, FsError, FsService};
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

fn service() -> FsService {
    FsService::new(FsConfig::default())
}

fn path_str(base: &tempfile::TempDir, name: &str) -> String {
    base.path().join(name).to_string_lossy().into_owned()
}

#[tokio::test]
async fn stat_missing_path_is_not_an_error() {
    let dir = tempdir().unwrap();
    let cancel = CancellationToken::new();

    let stat = service()
        .stat(&cancel, &path_str(&dir, "nope.txt"))
        .await
        .unwrap();
    assert!(!stat.exists);
    assert!(!stat.is_dir);
    assert_eq!(stat.size, 0);
    assert!(stat.modified.is_none());
}

#[tokio::test]
async fn write_then_read_round_trips() {
    let dir = tempdir().unwrap();
    let cancel = CancellationToken::new();
    let svc = service();
    let target = path_str(&dir, "notes.txt");

    let stat = svc
        .write_text(&cancel, &target, "hello".to_string())
        .await
        .unwrap();
    assert!(stat.exists);
    assert_eq!(stat.size, 5);
    assert!(stat.modified.is_some());

    let read = svc.read_text(&cancel, &target).await.unwrap();
    assert_eq!(read.content, "hello");
    assert_eq!(read.size, 5);
}

#[tokio::test]
async fn overwrite_replaces_contents_completely() {
    let dir = tempdir().unwrap();
    let cancel = CancellationToken::new();
    let svc = service();
    let target = path_str(&dir, "a.txt");

    svc.write_text(&cancel, &target, "hello".to_string()).await.unwrap();
    svc.write_text(&cancel, &target, "world!".to_string()).await.unwrap();

    let read = svc.read_text(&cancel, &target).await.unwrap();
    assert_eq!(read.content, "world!");
    assert_eq!(read.size, 6);
}

#[tokio::test]
async fn concurrent_writes_leave_one_complete_version() {
    let dir = tempdir().unwrap();
    let cancel = CancellationToken::new();
    let svc = std::sync::Arc::new(service());
    let target = path_str(&dir, "contested.txt");

    let first = "a".repeat(64 * 1024);
    let second = "b".repeat(64 * 1024);

    let (left, right) = tokio::join!(
        svc.write_text(&cancel, &target, first.clone()),
        svc.write_text(&cancel, &target, second.clone()),
    );
    left.unwrap();
    right.unwrap();

    let read = svc.read_text(&cancel, &target).await.unwrap();
    assert!(
        read.content == first || read.content == second,
        "file must hold exactly one writer's contents"
    );
}

#[tokio::test]
async fn write_rejects_oversize_content() {
    let dir = tempdir().unwrap();
    let cancel = CancellationToken::new();
    let svc = FsService::new(FsConfig {
        max_write_file_bytes: 8,
        ..FsConfig::default()
    });

    let err = svc
        .write_text(&cancel, &path_str(&dir, "big.txt"), "123456789".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, FsError::ContentTooLarge));
}

#[tokio::test]
async fn write_refuses_filesystem_root() {
    let cancel = CancellationToken::new();
    let err = service()
        .write_text(&cancel, "/", String::new())
        .await
        .unwrap_err();
    assert!(matches!(err, FsError::RefuseFilesystemRoot));
}

#[tokio::test]
async fn write_refuses_directory_target() {
    let dir = tempdir().unwrap();
    let cancel = CancellationToken::new();

    let err = service()
        .write_text(&cancel, &dir.path().to_string_lossy(), "x".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, FsError::PathIsDirectory));
}

#[cfg(unix)]
#[tokio::test]
async fn write_refuses_symlink_target() {
    let dir = tempdir().unwrap();
    let cancel = CancellationToken::new();
    let svc = service();

    let real = dir.path().join("real.txt");
    std::fs::write(&real, "original").unwrap();
    let link = dir.path().join("link.txt");
    std::os::unix::fs::symlink(&real, &link).unwrap();

    let err = svc
        .write_text(&cancel, &link.to_string_lossy(), "overwrite".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, FsError::UnsupportedFileType));
    assert_eq!(std::fs::read_to_string(&real).unwrap(), "original");
}

#[tokio::test]
async fn read_rejects_oversize_file() {
    let dir = tempdir().unwrap();
    let cancel = CancellationToken::new();
    let svc = FsService::new(FsConfig {
        max_read_file_bytes: 8,
        ..FsConfig::default()
    });

    let target = dir.path().join("big.txt");
    std::fs::write(&target, "123456789").unwrap();

    let err = svc
        .read_text(&cancel, &target.to_string_lossy())
        .await
        .unwrap_err();
    assert!(matches!(err, FsError::FileTooLarge));
}

#[tokio::test]
async fn read_rejects_nul_bytes() {
    let dir = tempdir().unwrap();
    let cancel = CancellationToken::new();

    let target = dir.path().join("blob.bin");
    std::fs::write(&target, b"abc\x00def").unwrap();

    let err = service()
        .read_text(&cancel, &target.to_string_lossy())
        .await
        .unwrap_err();
    assert!(matches!(err, FsError::BinaryFile));
}

#[tokio::test]
async fn read_rejects_missing_and_directory_paths() {
    let dir = tempdir().unwrap();
    let cancel = CancellationToken::new();
    let svc = service();

    let err = svc
        .read_text(&cancel, &path_str(&dir, "absent.txt"))
        .await
        .unwrap_err();
    assert!(matches!(err, FsError::PathNotFound));

    let err = svc
        .read_text(&cancel, &dir.path().to_string_lossy())
        .await
        .unwrap_err();
    assert!(matches!(err, FsError::PathIsDirectory));
}

#[tokio::test]
async fn create_directory_is_idempotent() {
    let dir = tempdir().unwrap();
    let cancel = CancellationToken::new();
    let svc = service();
    let target = path_str(&dir, "nested/tree");

    let first = svc.create(&cancel, &target, true).await.unwrap();
    assert!(first.is_dir);

    let second = svc.create(&cancel, &target, true).await.unwrap();
    assert!(second.exists);
}

#[tokio::test]
async fn create_file_is_exclusive() {
    let dir = tempdir().unwrap();
    let cancel = CancellationToken::new();
    let svc = service();
    let target = path_str(&dir, "once.txt");

    let stat = svc.create(&cancel, &target, false).await.unwrap();
    assert!(stat.exists);
    assert!(!stat.is_dir);

    let err = svc.create(&cancel, &target, false).await.unwrap_err();
    assert!(matches!(err, FsError::FileAlreadyExists));
}

#[tokio::test]
async fn delete_requires_recursive_for_directories() {
    let dir = tempdir().unwrap();
    let cancel = CancellationToken::new();
    let svc = service();

    let target = dir.path().join("sub");
    std::fs::create_dir(&target).unwrap();
    std::fs::write(target.join("inner.txt"), "x").unwrap();
    let target = target.to_string_lossy().into_owned();

    let err = svc.delete(&cancel, &target, false).await.unwrap_err();
    assert!(matches!(err, FsError::DirectoryNeedsRecursive));

    svc.delete(&cancel, &target, true).await.unwrap();
    assert!(!PathBuf::from(&target).exists());
}

#[tokio::test]
async fn delete_missing_path_is_not_found() {
    let dir = tempdir().unwrap();
    let cancel = CancellationToken::new();

    let err = service()
        .delete(&cancel, &path_str(&dir, "gone.txt"), false)
        .await
        .unwrap_err();
    assert!(matches!(err, FsError::PathNotFound));
}

#[cfg(unix)]
#[tokio::test]
async fn delete_removes_symlink_not_target() {
    let dir = tempdir().unwrap();
    let cancel = CancellationToken::new();

    let real = dir.path().join("kept.txt");
    std::fs::write(&real, "keep me").unwrap();
    let link = dir.path().join("link.txt");
    std::os::unix::fs::symlink(&real, &link).unwrap();

    service()
        .delete(&cancel, &link.to_string_lossy(), false)
        .await
        .unwrap();
    assert!(!link.exists());
    assert!(real.exists());
}

#[tokio::test]
async fn list_sorts_directories_first_then_by_lowercased_name() {
    let dir = tempdir().unwrap();
    let cancel = CancellationToken::new();

    std::fs::write(dir.path().join("Beta.txt"), "").unwrap();
    std::fs::write(dir.path().join("alpha.txt"), "not empty").unwrap();
    std::fs::create_dir(dir.path().join("zeta")).unwrap();
    std::fs::create_dir(dir.path().join("Arbor")).unwrap();

    let entries = service()
        .list(&cancel, &dir.path().to_string_lossy())
        .await
        .unwrap();

    let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["Arbor", "zeta", "alpha.txt", "Beta.txt"]);
    assert!(entries.iter().all(|e| e.size == 0));
    assert!(entries.iter().all(|e| e.path.is_absolute()));
}

#[tokio::test]
async fn list_truncates_at_entry_quota() {
    let dir = tempdir().unwrap();
    let cancel = CancellationToken::new();
    let svc = FsService::new(FsConfig {
        max_list_entries: 3,
        ..FsConfig::default()
    });

    for i in 0..5 {
        std::fs::write(dir.path().join(format!("f{i}.txt")), "").unwrap();
    }

    let entries = svc.list(&cancel, &dir.path().to_string_lossy()).await.unwrap();
    assert_eq!(entries.len(), 3);
}

#[tokio::test]
async fn list_rejects_files_and_missing_paths() {
    let dir = tempdir().unwrap();
    let cancel = CancellationToken::new();
    let svc = service();

    let file = dir.path().join("plain.txt");
    std::fs::write(&file, "").unwrap();

    let err = svc.list(&cancel, &file.to_string_lossy()).await.unwrap_err();
    assert!(matches!(err, FsError::PathNotDirectory));

    let err = svc
        .list(&cancel, &path_str(&dir, "missing"))
        .await
        .unwrap_err();
    assert!(matches!(err, FsError::PathNotFound));
}

#[tokio::test]
async fn workspace_open_mirrors_input_order_with_placeholders() {
    let dir = tempdir().unwrap();
    let cancel = CancellationToken::new();

    let present = dir.path().join("here.txt");
    std::fs::write(&present, "content").unwrap();
    let absent = path_str(&dir, "missing.txt");

    let stats = service()
        .workspace_open(
            &cancel,
            vec![present.to_string_lossy().into_owned(), absent.clone()],
        )
        .await
        .unwrap();

    assert_eq!(stats.len(), 2);
    assert!(stats[0].exists);
    assert_eq!(stats[0].size, 7);
    assert!(!stats[1].exists);
    assert_eq!(stats[1].path, PathBuf::from(&absent));
}

#[tokio::test]
async fn workspace_open_enforces_count_caps() {
    let cancel = CancellationToken::new();
    let svc = FsService::new(FsConfig {
        max_workspace_open_paths: 2,
        ..FsConfig::default()
    });

    let err = svc.workspace_open(&cancel, Vec::new()).await.unwrap_err();
    assert!(matches!(err, FsError::NoWorkspacePaths));

    let err = svc
        .workspace_open(
            &cancel,
            vec!["/a".to_string(), "/b".to_string(), "/c".to_string()],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FsError::TooManyWorkspacePaths));
}

#[tokio::test]
async fn cancellation_aborts_workspace_batch() {
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = service()
        .workspace_open(&cancel, vec!["/tmp".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, FsError::Canceled));
}
