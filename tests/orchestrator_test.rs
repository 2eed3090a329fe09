//! Integration tests for the build pipeline
//!
//! Drives [`BuildOrchestrator`] against real git repositories and, on unix,
//! a stand-in `make` placed on the toolchain path.

mod common;

use std::collections::BTreeMap;
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use common::{git, set_identity, TestProject};
use kbuild::core::builder::{BuildOrchestrator, BuildState, InstallOptions, Mode};
use kbuild::core::resolver::BuildConfig;
use kbuild::core::tree::PullState;
use kbuild::error::ProcessError;
use kbuild::infra::git::GitTree;
use kbuild::infra::process::{CommandRunner, Invocation};

#[derive(Clone, Default)]
struct RecordingRunner(Arc<Mutex<Vec<String>>>);

impl RecordingRunner {
    fn lines(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, invocation: &Invocation) -> impl Future<Output = Result<(), ProcessError>> + Send {
        self.0.lock().unwrap().push(invocation.command_line());
        std::future::ready(Ok(()))
    }
}

fn config(project: &TestProject) -> BuildConfig {
    BuildConfig {
        profile: "default".to_string(),
        srcdir: project.src(),
        buildpath: project.builds(),
        builddir: None,
        arch: "x86_64".to_string(),
        toolchain: None,
        cross_compile: None,
        jobs: 2,
        skip_pull: false,
        reconfigure: false,
        baseconfig: "defconfig".to_string(),
        configs: vec![],
        modules: vec![],
        env: BTreeMap::new(),
        install_wrapper: None,
    }
}

/// Source tree cloned from a bare upstream, so pulls have somewhere to come from
fn cloned_source(project: &TestProject) -> Option<PathBuf> {
    if which::which("git").is_err() {
        return None;
    }
    let seed = project.path().join("seed");
    fs::create_dir_all(&seed).unwrap();
    git(&seed, &["init", "-q", "-b", "master"]);
    set_identity(&seed);
    fs::write(seed.join("Makefile"), "all:\n").unwrap();
    git(&seed, &["add", "Makefile"]);
    git(&seed, &["commit", "-q", "-m", "initial"]);

    let upstream = project.path().join("upstream.git");
    git(
        &project.path(),
        &["clone", "-q", "--bare", seed.to_str().unwrap(), upstream.to_str().unwrap()],
    );
    git(
        &project.path(),
        &["clone", "-q", upstream.to_str().unwrap(), project.src().to_str().unwrap()],
    );

    git(&seed, &["remote", "add", "origin", upstream.to_str().unwrap()]);
    Some(seed)
}

fn push_new_commit(seed: &Path) {
    fs::write(seed.join("Kconfig"), "config X\n").unwrap();
    git(seed, &["add", "Kconfig"]);
    git(seed, &["commit", "-q", "-m", "second"]);
    git(seed, &["push", "-q", "origin", "master"]);
}

#[tokio::test]
async fn test_existing_configuration_goes_straight_to_build() {
    let project = TestProject::new();
    if !project.init_git_source() {
        return;
    }
    let build_dir = project.builds().join("linux.master.x86_64");
    fs::create_dir_all(&build_dir).unwrap();
    fs::write(build_dir.join(".config"), "CONFIG_X=y\n").unwrap();

    let mut cfg = config(&project);
    cfg.skip_pull = true;
    let runner = RecordingRunner::default();
    let tree = GitTree::new(&cfg.srcdir);
    let mut orch = BuildOrchestrator::new(cfg, runner.clone(), tree);

    let report = orch.run(&Mode::Build { args: vec![] }).await.unwrap();

    assert_eq!(report.build_dir, build_dir);
    assert_eq!(
        runner.lines(),
        vec![format!("make O={} -j2", build_dir.display())]
    );
    assert_eq!(
        report.states,
        vec![BuildState::DirReady, BuildState::TreeChecked, BuildState::Built]
    );
}

#[tokio::test]
async fn test_pulled_changes_trigger_clean_and_configure() {
    let project = TestProject::new();
    let Some(seed) = cloned_source(&project) else {
        return;
    };
    push_new_commit(&seed);

    let build_dir = project.builds().join("linux.master.x86_64");
    fs::create_dir_all(&build_dir).unwrap();
    fs::write(build_dir.join(".config"), "CONFIG_X=y\n").unwrap();

    let cfg = config(&project);
    let runner = RecordingRunner::default();
    let tree = GitTree::new(&cfg.srcdir);
    let mut orch = BuildOrchestrator::new(cfg, runner.clone(), tree);

    let report = orch.run(&Mode::Build { args: vec![] }).await.unwrap();

    assert_eq!(report.pull, PullState::Updated);
    let lines = runner.lines();
    assert!(lines[0].ends_with("distclean"), "{lines:?}");
    assert!(lines[1].ends_with("defconfig"), "{lines:?}");
    assert!(project.src().join("Kconfig").is_file());
    assert_eq!(
        git(&project.src(), &["rev-parse", "HEAD"]),
        git(&seed, &["rev-parse", "HEAD"])
    );
}

#[tokio::test]
async fn test_dirty_tree_is_built_as_is() {
    let project = TestProject::new();
    let Some(seed) = cloned_source(&project) else {
        return;
    };
    push_new_commit(&seed);
    fs::write(project.src().join("Makefile"), "all: local\n").unwrap();
    let before = git(&project.src(), &["rev-parse", "HEAD"]);

    let cfg = config(&project);
    let runner = RecordingRunner::default();
    let tree = GitTree::new(&cfg.srcdir);
    let mut orch = BuildOrchestrator::new(cfg, runner.clone(), tree);

    let report = orch.run(&Mode::Build { args: vec![] }).await.unwrap();

    assert_eq!(report.pull, PullState::Unchanged);
    assert_eq!(git(&project.src(), &["rev-parse", "HEAD"]), before);
    assert_eq!(
        fs::read_to_string(project.src().join("Makefile")).unwrap(),
        "all: local\n"
    );
    assert!(!runner.lines().iter().any(|l| l.ends_with("distclean")));
}

#[tokio::test]
async fn test_modules_only_install_runs_two_module_installs() {
    let project = TestProject::new();
    project.create_dir("linux");
    let mut cfg = config(&project);
    cfg.builddir = Some("scratch".to_string());
    cfg.install_wrapper = Some("sudo".to_string());
    cfg.modules = vec![project.path().join("mod-a"), project.path().join("mod-b")];
    let runner = RecordingRunner::default();
    let tree = GitTree::new(&cfg.srcdir);
    let mut orch = BuildOrchestrator::new(cfg, runner.clone(), tree);

    let options = InstallOptions {
        modules_only: true,
        ..Default::default()
    };
    orch.run(&Mode::Install(options)).await.unwrap();

    let lines = runner.lines();
    assert_eq!(lines.len(), 2);
    assert!(lines.iter().all(|l| l.starts_with("sudo make") && l.ends_with("modules_install")));
    assert!(!lines.iter().any(|l| l.ends_with(" install")));
}

#[cfg(unix)]
mod with_fake_make {
    use super::*;
    use kbuild::error::{KbuildError, Step};
    use kbuild::infra::process::ProcessRunner;
    use std::os::unix::fs::PermissionsExt;

    const FAKE_MAKE: &str = r#"#!/bin/sh
echo "$@" >> "$MAKE_LOG"
echo "make: $*"
if [ -n "$MAKE_FAIL_ON" ]; then
    case "$*" in *"$MAKE_FAIL_ON"*) echo "make: failing" 1>&2; exit 17 ;; esac
fi
exit 0
"#;

    fn fake_toolchain(project: &TestProject) -> PathBuf {
        let bin = project.path().join("toolchain/bin");
        fs::create_dir_all(&bin).unwrap();
        let make = bin.join("make");
        fs::write(&make, FAKE_MAKE).unwrap();
        fs::set_permissions(&make, fs::Permissions::from_mode(0o755)).unwrap();
        bin
    }

    fn fake_config(project: &TestProject, fail_on: Option<&str>) -> BuildConfig {
        let mut cfg = config(project);
        cfg.builddir = Some("scratch".to_string());
        cfg.toolchain = Some(fake_toolchain(project));
        cfg.env.insert(
            "MAKE_LOG".to_string(),
            project.path().join("make.log").display().to_string(),
        );
        if let Some(needle) = fail_on {
            cfg.env.insert("MAKE_FAIL_ON".to_string(), needle.to_string());
        }
        cfg
    }

    #[tokio::test]
    async fn test_real_processes_run_in_order() {
        let project = TestProject::new();
        project.create_dir("linux");
        let cfg = fake_config(&project, None);
        let tree = GitTree::new(&cfg.srcdir);
        let runner = ProcessRunner::with_sink(Box::new(std::io::sink()));
        let mut orch = BuildOrchestrator::new(cfg, runner, tree);

        // Not a git repository: the update fails and the build goes on
        let report = orch
            .run(&Mode::Build {
                args: vec!["bzImage".to_string()],
            })
            .await
            .unwrap();

        assert_eq!(report.pull, PullState::Unchanged);
        let log = fs::read_to_string(project.path().join("make.log")).unwrap();
        let bd = project.builds().join("scratch");
        assert_eq!(
            log.lines().collect::<Vec<_>>(),
            vec![
                format!("O={} defconfig", bd.display()),
                format!("O={} -j2 bzImage", bd.display()),
            ]
        );
    }

    #[tokio::test]
    async fn test_failing_step_reports_exit_code() {
        let project = TestProject::new();
        project.create_dir("linux");
        let cfg = fake_config(&project, Some("-j2"));
        let tree = GitTree::new(&cfg.srcdir);
        let runner = ProcessRunner::with_sink(Box::new(std::io::sink()));
        let mut orch = BuildOrchestrator::new(cfg, runner, tree);

        let err = orch.run(&Mode::Build { args: vec![] }).await.unwrap_err();

        assert!(matches!(err, KbuildError::Step { step: Step::Build, .. }));
        assert_eq!(err.exit_code(), Some(17));
        assert_eq!(orch.state(), BuildState::Configured);
    }
}
