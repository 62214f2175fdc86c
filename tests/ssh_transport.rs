#![cfg(unix)]

use anyhow::Result;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use fanout::checksum::{digest_file, ChecksumType, RemoteDigest};
use fanout::discovery::LocalIdentity;
use fanout::error::TransportError;
use fanout::exec::Executor;
use fanout::observer::NoopObserver;
use fanout::report::SyncOutcome;
use fanout::transport::{DirStatus, SshSettings, SshTransport, Target, Transport};
use fanout::{Distributor, SyncConfig};

fn fake_ssh() -> Result<PathBuf> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/fake-ssh");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
    Ok(path)
}

fn settings() -> Result<SshSettings> {
    settings_with(Duration::from_secs(10), Duration::from_secs(30))
}

fn settings_with(command_timeout: Duration, transfer_timeout: Duration) -> Result<SshSettings> {
    Ok(SshSettings {
        ssh_program: fake_ssh()?.display().to_string(),
        options: vec!["-o".into(), "BatchMode=yes".into()],
        command_timeout,
        transfer_timeout,
    })
}

fn two_file_source() -> Result<tempfile::TempDir> {
    let src = tempfile::tempdir()?;
    std::fs::write(src.path().join("a.txt"), "X")?;
    std::fs::create_dir_all(src.path().join("sub"))?;
    std::fs::write(src.path().join("sub/b.txt"), "Y")?;
    Ok(src)
}

fn run_with(settings: SshSettings, source: &Path, root: &str, node: &str) -> Result<fanout::report::RunReport> {
    let config = SyncConfig {
        hosts: vec![node.to_string()],
        log_file: None,
        ..Default::default()
    };
    let transport = Arc::new(SshTransport::new(Arc::new(Executor::new()?), settings));
    let distributor = Distributor::new(Arc::new(config), transport, Arc::new(NoopObserver));
    Ok(distributor.run(source, root, vec![node.to_string()], &LocalIdentity::default())?)
}

fn transport() -> Result<SshTransport> {
    Ok(SshTransport::new(Arc::new(Executor::new()?), settings()?))
}

fn path_str(p: &Path) -> String {
    p.display().to_string()
}

fn leftovers(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let name = entry?.file_name().to_string_lossy().into_owned();
        if name.ends_with(".part") {
            names.push(name);
        }
    }
    Ok(names)
}

#[test]
fn directory_check_and_create() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let t = transport()?;
    let dest = tmp.path().join("with space/nested");
    let target = Target::new("node1", "support", path_str(&dest));

    assert!(!t.dir_exists(&target, &target.root)?);
    assert_eq!(t.create_dir(&target, &target.root)?, DirStatus::Ensured);
    assert!(t.dir_exists(&target, &target.root)?);
    assert!(dest.is_dir());
    // mkdir -p is idempotent
    assert_eq!(t.ensure_dir(&target, &target.root)?, DirStatus::Existed);
    Ok(())
}

#[test]
fn put_then_digest_roundtrip() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let src = tmp.path().join("src.txt");
    std::fs::write(&src, "payload\n")?;
    let dest = tmp.path().join("dest dir");
    std::fs::create_dir_all(&dest)?;

    let t = transport()?;
    let target = Target::new("node1", "support", path_str(&dest));
    let remote = target.remote_path("it's here.txt");

    assert_eq!(
        t.remote_digest(&target, &remote, ChecksumType::Sha256)?,
        RemoteDigest::Absent
    );

    assert_eq!(t.put_file(&target, &src, &remote, true)?, 8);
    assert_eq!(std::fs::read_to_string(dest.join("it's here.txt"))?, "payload\n");
    assert!(leftovers(&dest)?.is_empty());

    let local = digest_file(&src, ChecksumType::Sha256)?;
    assert_eq!(
        t.remote_digest(&target, &remote, ChecksumType::Sha256)?,
        RemoteDigest::Present(local)
    );
    Ok(())
}

#[test]
fn non_atomic_put_overwrites_in_place() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let src = tmp.path().join("new.txt");
    std::fs::write(&src, "new")?;
    let dest = tmp.path().join("dest");
    std::fs::create_dir_all(&dest)?;
    std::fs::write(dest.join("f.txt"), "old contents")?;

    let t = transport()?;
    let target = Target::new("node1", "support", path_str(&dest));
    t.put_file(&target, &src, &target.remote_path("f.txt"), false)?;
    assert_eq!(std::fs::read_to_string(dest.join("f.txt"))?, "new");
    Ok(())
}

#[test]
fn put_into_missing_directory_fails_cleanly() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let src = tmp.path().join("a.txt");
    std::fs::write(&src, "X")?;

    let t = transport()?;
    let target = Target::new("node1", "support", path_str(&tmp.path().join("dest")));
    let err = t
        .put_file(&target, &src, &target.remote_path("sub/a.txt"), true)
        .unwrap_err();
    assert!(matches!(err, TransportError::Remote { code: 1, .. }));
    assert!(!tmp.path().join("dest").exists());
    Ok(())
}

#[test]
fn connection_failures_are_remote_errors() -> Result<()> {
    let t = transport()?;

    let refused = Target::new("unreachable", "support", "/tmp");
    match t.dir_exists(&refused, "/tmp") {
        Err(TransportError::Remote { code, stderr, .. }) => {
            assert_eq!(code, 255);
            assert!(stderr.contains("Connection refused"));
        }
        other => panic!("expected remote error, got {:?}", other),
    }

    let silent = Target::new("silent", "support", "/tmp");
    let err = t.create_dir(&silent, "/tmp/x").unwrap_err();
    assert!(err.to_string().contains("ssh connection failed"));
    Ok(())
}

#[test]
fn full_run_isolates_unreachable_node() -> Result<()> {
    let src = tempfile::tempdir()?;
    std::fs::write(src.path().join("a.txt"), "X")?;
    std::fs::create_dir_all(src.path().join("sub"))?;
    std::fs::write(src.path().join("sub/b.txt"), "Y")?;
    let dest = tempfile::tempdir()?;
    let root = path_str(&dest.path().join("deploy"));

    let config = SyncConfig {
        hosts: vec!["node1".into(), "unreachable".into()],
        log_file: None,
        ..Default::default()
    };
    let transport = Arc::new(SshTransport::new(Arc::new(Executor::new()?), settings()?));
    let distributor = Distributor::new(Arc::new(config), transport, Arc::new(NoopObserver));
    let report = distributor.run(
        src.path(),
        &root,
        vec!["node1".into(), "unreachable".into()],
        &LocalIdentity::default(),
    )?;

    let ok = &report.targets["node1"];
    assert_eq!(ok.outcome_of("a.txt"), Some(SyncOutcome::Copied));
    assert_eq!(ok.outcome_of("sub/b.txt"), Some(SyncOutcome::Copied));
    assert_eq!(std::fs::read_to_string(dest.path().join("deploy/sub/b.txt"))?, "Y");

    let down = &report.targets["unreachable"];
    assert_eq!(down.summary.failed_transfer, 2);
    assert_eq!(down.summary.copied + down.summary.updated + down.summary.skipped, 0);
    Ok(())
}

#[test]
fn directory_check_timeout_is_a_transport_error() -> Result<()> {
    let t = SshTransport::new(
        Arc::new(Executor::new()?),
        settings_with(Duration::from_secs(1), Duration::from_secs(1))?,
    );
    let target = Target::new("hang", "support", "/tmp");
    let started = std::time::Instant::now();
    let err = t.dir_exists(&target, "/tmp").unwrap_err();
    assert!(matches!(
        err,
        TransportError::Exec(fanout::error::ExecError::Timeout { .. })
    ));
    assert!(started.elapsed() < Duration::from_secs(10));
    Ok(())
}

#[test]
fn hanging_node_fails_every_file() -> Result<()> {
    let src = two_file_source()?;
    let report = run_with(
        settings_with(Duration::from_secs(1), Duration::from_secs(1))?,
        src.path(),
        "/tmp/fanout-never-created",
        "hang",
    )?;

    let hang = &report.targets["hang"];
    assert_eq!(hang.results.len(), 2);
    assert_eq!(hang.summary.skipped, 0);
    for result in &hang.results {
        assert_eq!(result.outcome, SyncOutcome::FailedTransfer);
        assert!(result.detail.as_deref().unwrap_or("").contains("timed out"));
    }
    Ok(())
}

#[test]
fn transfer_timeout_fails_the_file() -> Result<()> {
    let src = two_file_source()?;
    let dest = tempfile::tempdir()?;
    let root = path_str(&dest.path().join("deploy"));
    let report = run_with(
        settings_with(Duration::from_secs(10), Duration::from_secs(1))?,
        src.path(),
        &root,
        "slow",
    )?;

    let slow = &report.targets["slow"];
    assert_eq!(slow.summary.dirs_failed, 0);
    assert_eq!(slow.summary.failed_transfer, 2);
    assert_eq!(slow.summary.copied + slow.summary.skipped, 0);
    for result in &slow.results {
        assert!(result.detail.as_deref().unwrap_or("").contains("timed out"));
    }
    assert!(!dest.path().join("deploy/a.txt").exists());
    Ok(())
}
