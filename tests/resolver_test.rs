//! Integration tests for profile loading and configuration resolution

mod common;

use std::collections::BTreeMap;
use std::path::PathBuf;

use common::{TestProject, SAMPLE_STORE};
use kbuild::core::profile::ProfileStore;
use kbuild::core::resolver::{CliOverrides, ConfigResolver};
use kbuild::error::ConfigError;
use proptest::prelude::*;

fn resolver(project: &TestProject, vars: &[(&str, &str)]) -> ConfigResolver {
    let env: BTreeMap<String, String> = vars
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    ConfigResolver::new(env, project.path()).with_default_build_root(project.builds())
}

#[test]
fn test_default_profile_synthesized_from_store() {
    let project = TestProject::new();
    project.write_store(SAMPLE_STORE);
    let store = ProfileStore::load_from_path(&project.store()).unwrap();

    let config = resolver(&project, &[])
        .resolve(&CliOverrides::default(), &store)
        .unwrap();

    assert_eq!(config.profile, "default");
    // Common still applies
    assert_eq!(config.jobs, 2);
    assert_eq!(config.srcdir, project.path());
    assert_eq!(config.buildpath, project.builds());
}

#[test]
fn test_unknown_profile_reports_known_names() {
    let project = TestProject::new();
    project.write_store(SAMPLE_STORE);
    let store = ProfileStore::load_from_path(&project.store()).unwrap();
    let cli = CliOverrides {
        profile: Some("foo".to_string()),
        ..Default::default()
    };

    let err = resolver(&project, &[]).resolve(&cli, &store).unwrap_err();

    match err {
        ConfigError::ProfileNotFound { name, available } => {
            assert_eq!(name, "foo");
            assert_eq!(available, vec!["arm64", "x86"]);
        }
        other => panic!("Expected ProfileNotFound, got: {other:?}"),
    }
}

#[test]
fn test_named_profile_values() {
    let project = TestProject::new();
    project.write_store(SAMPLE_STORE);
    let store = ProfileStore::load_from_path(&project.store()).unwrap();

    let config = resolver(&project, &[("KBUILD_PROFILE", "arm64")])
        .resolve(&CliOverrides::default(), &store)
        .unwrap();

    assert_eq!(config.arch, "arm64");
    assert_eq!(config.cross_compile.as_deref(), Some("aarch64-linux-gnu-"));
    assert_eq!(config.baseconfig, "defconfig");
}

#[test]
fn test_relative_store_paths_resolve_against_cwd() {
    let project = TestProject::new();
    project.write_store(
        r"
Profiles:
  default:
    srcdir: src/linux
    buildpath: out
    modules: [drivers/foo]
",
    );
    let store = ProfileStore::load_from_path(&project.store()).unwrap();

    let config = resolver(&project, &[])
        .resolve(&CliOverrides::default(), &store)
        .unwrap();

    assert_eq!(config.srcdir, project.path().join("src/linux"));
    assert_eq!(config.buildpath, project.path().join("out"));
    assert_eq!(config.modules, vec![project.path().join("drivers/foo")]);
}

#[test]
fn test_env_jobs_overrides_profile() {
    let project = TestProject::new();
    project.write_store(SAMPLE_STORE);
    let store = ProfileStore::load_from_path(&project.store()).unwrap();

    let config = resolver(&project, &[("KBUILD_JOBS", "12")])
        .resolve(&CliOverrides::default(), &store)
        .unwrap();

    assert_eq!(config.jobs, 12);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Explicit directories win over environment and profile
    #[test]
    fn prop_explicit_srcdir_wins(cli in "[a-z]{1,8}", env in "[a-z]{1,8}", stored in "[a-z]{1,8}") {
        let project = TestProject::new();
        project.write_store(&format!("Profiles:\n  default:\n    srcdir: '{stored}'\n"));
        let store = ProfileStore::load_from_path(&project.store()).unwrap();
        let overrides = CliOverrides {
            srcdir: Some(cli.clone()),
            ..Default::default()
        };

        let resolver = resolver(&project, &[("KBUILD_SRCDIR", env.as_str())]);
        let config = resolver.resolve(&overrides, &store).unwrap();
        prop_assert_eq!(config.srcdir, project.path().join(&cli));

        let config = resolver.resolve(&CliOverrides::default(), &store).unwrap();
        prop_assert_eq!(config.srcdir, project.path().join(PathBuf::from(&env)));
    }
}
