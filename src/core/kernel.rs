//! Kernel build invocations
//!
//! Turns a resolved [`BuildConfig`] into the `make` invocations of each
//! pipeline step. Every invocation runs in the source tree and points the
//! kernel's out-of-tree build at the build directory with `O=`.
//!
//! # Install steps
//!
//! Install invocations run under a privilege wrapper (`sudo` by default).
//! Wrappers usually scrub the environment, so `ARCH` and friends are passed
//! as `make` variables on the command line instead.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::config::defaults::{CONFIG_ARTIFACT, MAKE, MERGE_CONFIG_SCRIPT};
use crate::core::resolver::BuildConfig;
use crate::infra::process::Invocation;

/// Where `install` puts its output instead of the running system
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallTarget {
    /// Root directory for `INSTALL_MOD_PATH`; `INSTALL_PATH` is `<root>/boot`
    pub root: Option<PathBuf>,
}

impl InstallTarget {
    fn make_vars(&self) -> Vec<String> {
        match &self.root {
            Some(root) => vec![
                format!("INSTALL_MOD_PATH={}", root.display()),
                format!("INSTALL_PATH={}", root.join("boot").display()),
            ],
            None => Vec::new(),
        }
    }
}

/// Invocation factory for one build directory
#[derive(Debug, Clone)]
pub struct KernelCommands {
    srcdir: PathBuf,
    build_dir: PathBuf,
    arch: String,
    cross_compile: Option<String>,
    jobs: usize,
    env: BTreeMap<String, String>,
    install_wrapper: Option<String>,
}

impl KernelCommands {
    pub fn new(config: &BuildConfig, build_dir: &Path) -> Self {
        Self {
            srcdir: config.srcdir.clone(),
            build_dir: build_dir.to_path_buf(),
            arch: config.arch.clone(),
            cross_compile: config.cross_compile.clone(),
            jobs: config.jobs,
            env: build_env(config, build_dir, std::env::var_os("PATH")),
            install_wrapper: config.install_wrapper.clone(),
        }
    }

    /// Environment overrides carried by every invocation
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    fn output_arg(&self) -> String {
        format!("O={}", self.build_dir.display())
    }

    fn make(&self) -> Invocation {
        Invocation::new(MAKE, &self.srcdir)
            .arg(self.output_arg())
            .envs(&self.env)
    }

    fn jobs_arg(&self) -> String {
        format!("-j{}", self.jobs)
    }

    /// `make distclean`
    pub fn clean(&self) -> Invocation {
        self.make().arg("distclean")
    }

    /// `make <baseconfig>`
    pub fn base_config(&self, baseconfig: &str) -> Invocation {
        self.make().arg(baseconfig)
    }

    /// Merge fragments into the existing `.config`; `None` without fragments
    pub fn merge_fragments(&self, fragments: &[PathBuf]) -> Option<Invocation> {
        if fragments.is_empty() {
            return None;
        }
        let script = self.srcdir.join(MERGE_CONFIG_SCRIPT);
        Some(
            Invocation::new(script.display().to_string(), &self.srcdir)
                .args(["-m", "-O"])
                .arg(self.build_dir.display().to_string())
                .arg(self.build_dir.join(CONFIG_ARTIFACT).display().to_string())
                .args(fragments.iter().map(|f| f.display().to_string()))
                .envs(&self.env),
        )
    }

    /// `make olddefconfig`, settling every symbol the merge left unset
    pub fn resolve_defaults(&self) -> Invocation {
        self.make().arg("olddefconfig")
    }

    /// Main build, with caller arguments appended verbatim
    pub fn build(&self, extra: &[String]) -> Invocation {
        self.make().arg(self.jobs_arg()).args(extra.iter().cloned())
    }

    /// Out-of-tree module build against this kernel
    pub fn build_module(&self, module: &Path) -> Invocation {
        self.make()
            .arg(self.jobs_arg())
            .arg(format!("M={}", module.display()))
            .arg("modules")
    }

    fn install_make(&self, target: &InstallTarget) -> Invocation {
        let mut words: Vec<String> = self
            .install_wrapper
            .as_deref()
            .map(|w| w.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();
        words.push(MAKE.to_string());
        words.push(self.output_arg());
        words.push(format!("ARCH={}", self.arch));
        if let Some(prefix) = &self.cross_compile {
            words.push(format!("CROSS_COMPILE={prefix}"));
        }
        words.extend(target.make_vars());

        let mut words = words.into_iter();
        let program = words.next().unwrap_or_else(|| MAKE.to_string());
        Invocation::new(program, &self.srcdir)
            .args(words)
            .envs(&self.env)
    }

    /// Install one out-of-tree module
    pub fn install_module(&self, module: &Path, target: &InstallTarget) -> Invocation {
        self.install_make(target)
            .arg(format!("M={}", module.display()))
            .arg("modules_install")
    }

    /// Install in-tree modules, then the kernel image
    pub fn install(&self, target: &InstallTarget) -> Invocation {
        self.install_make(target).args(["modules_install", "install"])
    }
}

/// Environment overrides for kernel invocations
///
/// User-supplied `env` entries are applied last and win over derived ones.
pub fn build_env(
    config: &BuildConfig,
    build_dir: &Path,
    current_path: Option<OsString>,
) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    env.insert("ARCH".to_string(), config.arch.clone());
    env.insert(
        "KBUILD_OUTPUT".to_string(),
        build_dir.display().to_string(),
    );
    if let Some(prefix) = &config.cross_compile {
        env.insert("CROSS_COMPILE".to_string(), prefix.clone());
    }
    if let Some(toolchain) = &config.toolchain {
        let rest = current_path.unwrap_or_default();
        let dirs = std::iter::once(toolchain.clone()).chain(std::env::split_paths(&rest));
        match std::env::join_paths(dirs) {
            Ok(path) => {
                env.insert("PATH".to_string(), path.to_string_lossy().into_owned());
            }
            Err(e) => warn!(
                toolchain = %toolchain.display(),
                error = %e,
                "cannot prepend toolchain to PATH"
            ),
        }
    }
    env.extend(config.env.iter().map(|(k, v)| (k.clone(), v.clone())));
    env
}

/// Map a machine name or target triple to the kernel's `ARCH` name
pub fn kernel_arch(target: &str) -> &str {
    let machine = target.split('-').next().unwrap_or(target);
    match machine {
        "x86_64" | "amd64" => "x86_64",
        "x86" | "i386" | "i486" | "i586" | "i686" => "i386",
        "aarch64" | "arm64" => "arm64",
        m if m == "arm" || m.starts_with("armv") => "arm",
        "riscv64" | "riscv32" | "riscv64gc" => "riscv",
        "powerpc" | "powerpc64" | "powerpc64le" | "ppc64le" => "powerpc",
        "s390x" => "s390",
        "loongarch64" => "loongarch",
        "mips" | "mipsel" | "mips64" | "mips64el" => "mips",
        other => other,
    }
}

/// Kernel `ARCH` of the machine running this process
pub fn host_kernel_arch() -> &'static str {
    kernel_arch(std::env::consts::ARCH)
}

/// Directory under `arch/` that holds an `ARCH`'s sources
pub fn source_arch(arch: &str) -> &str {
    match arch {
        "x86_64" | "i386" | "x86" => "x86",
        "sparc64" => "sparc",
        "parisc64" => "parisc",
        other => other,
    }
}

/// Boot image produced by the default build target
pub fn image_name(arch: &str) -> &'static str {
    match source_arch(arch) {
        "x86" => "bzImage",
        "arm" => "zImage",
        "arm64" | "riscv" => "Image",
        _ => "vmlinux",
    }
}
