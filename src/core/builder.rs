//! Build orchestration logic
//!
//! Drives one build through its states:
//!
//! ```text
//! Init -> DirReady -> TreeChecked -> [Cleaned] -> [Configured] -> Built
//! Init -> DirReady -> Installed
//! ```
//!
//! Steps run strictly one after another. A failed source update is logged
//! and the build goes on with the tree as it stands; any other failure stops
//! the pipeline at the current step. Completed steps are never rolled back.
//!
//! Running two builds against the same source tree at once is not
//! supported; nothing here locks the tree or the build directory.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::config::defaults::CONFIG_ARTIFACT;
use crate::core::kernel::{InstallTarget, KernelCommands};
use crate::core::layout::BuildLayout;
use crate::core::resolver::BuildConfig;
use crate::core::tree::{PullState, SourceTree, SourceTreeTracker};
use crate::error::{DirectoryError, KbuildError, Step};
use crate::infra::process::{CommandRunner, Invocation};

/// Pipeline position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildState {
    Init,
    DirReady,
    TreeChecked,
    Cleaned,
    Configured,
    Built,
    Installed,
}

/// Install flow switches
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallOptions {
    /// Install declared out-of-tree modules only, not the kernel
    pub modules_only: bool,
    pub target: InstallTarget,
}

/// What a run should do after setup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Update, clean and configure as needed, then build with extra `make` arguments
    Build { args: Vec<String> },
    /// Install what the build directory holds
    Install(InstallOptions),
}

/// Outcome of a successful run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub build_dir: PathBuf,
    pub pull: PullState,
    pub states: Vec<BuildState>,
}

/// Runs the build pipeline for one resolved configuration
#[derive(Debug)]
pub struct BuildOrchestrator<R, T> {
    config: BuildConfig,
    runner: R,
    tracker: SourceTreeTracker<T>,
    layout: BuildLayout,
    state: BuildState,
    history: Vec<BuildState>,
}

impl<R: CommandRunner, T: SourceTree> BuildOrchestrator<R, T> {
    /// Create an orchestrator in the `Init` state
    pub fn new(config: BuildConfig, runner: R, tree: T) -> Self {
        let layout = BuildLayout::new(&config);
        Self {
            config,
            runner,
            tracker: SourceTreeTracker::new(tree),
            layout,
            state: BuildState::Init,
            history: Vec::new(),
        }
    }

    pub fn state(&self) -> BuildState {
        self.state
    }

    pub fn layout(&self) -> &BuildLayout {
        &self.layout
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    fn advance(&mut self, next: BuildState) {
        info!(from = ?self.state, to = ?next, "build state");
        self.state = next;
        self.history.push(next);
    }

    async fn step(&self, step: Step, invocation: &Invocation) -> Result<(), KbuildError> {
        self.runner
            .run(invocation)
            .await
            .map_err(|source| KbuildError::Step { step, source })
    }

    /// Run the pipeline to completion or to the first fatal error
    pub async fn run(&mut self, mode: &Mode) -> Result<BuildReport, KbuildError> {
        let build_dir = self.setup()?;
        let commands = KernelCommands::new(&self.config, &build_dir);

        let pull = match mode {
            Mode::Build { args } => {
                let pull = self.check_tree();
                self.build(&commands, &build_dir, pull, args).await?;
                pull
            }
            Mode::Install(options) => {
                self.install(&commands, options).await?;
                PullState::Unchanged
            }
        };

        Ok(BuildReport {
            build_dir,
            pull,
            states: self.history.clone(),
        })
    }

    /// `Init -> DirReady`
    fn setup(&mut self) -> Result<PathBuf, KbuildError> {
        if !self.config.srcdir.is_dir() {
            return Err(DirectoryError::SourceMissing {
                path: self.config.srcdir.clone(),
            }
            .into());
        }
        let dir = self.layout.ensure(self.tracker.tree())?;
        info!(srcdir = %self.config.srcdir.display(), build_dir = %dir.display(), "build directory ready");
        self.advance(BuildState::DirReady);
        Ok(dir)
    }

    /// `DirReady -> TreeChecked`; update failures are not fatal
    fn check_tree(&mut self) -> PullState {
        let pull = match self.tracker.update(self.config.skip_pull) {
            Ok(pull) => pull,
            Err(e) => {
                warn!(error = %e, "source update failed; building the tree as it stands");
                PullState::Unchanged
            }
        };
        self.advance(BuildState::TreeChecked);
        pull
    }

    async fn build(
        &mut self,
        commands: &KernelCommands,
        build_dir: &Path,
        pull: PullState,
        args: &[String],
    ) -> Result<(), KbuildError> {
        let cleaned = pull == PullState::Updated;
        if cleaned {
            self.step(Step::Clean, &commands.clean()).await?;
            self.advance(BuildState::Cleaned);
        }

        let configured = build_dir.join(CONFIG_ARTIFACT).is_file();
        if cleaned || !configured || self.config.reconfigure {
            self.configure(commands).await?;
            self.advance(BuildState::Configured);
        } else {
            info!("existing configuration kept");
        }

        self.step(Step::Build, &commands.build(args)).await?;
        // Explicit targets replace the default build, modules included
        if args.is_empty() {
            for module in &self.config.modules {
                self.step(Step::BuildModule, &commands.build_module(module))
                    .await?;
            }
        }
        self.advance(BuildState::Built);
        Ok(())
    }

    async fn configure(&self, commands: &KernelCommands) -> Result<(), KbuildError> {
        self.step(Step::Configure, &commands.base_config(&self.config.baseconfig))
            .await?;
        if let Some(merge) = commands.merge_fragments(&self.config.configs) {
            self.step(Step::MergeConfig, &merge).await?;
            self.step(Step::ResolveConfig, &commands.resolve_defaults())
                .await?;
        }
        Ok(())
    }

    /// Modules first: the kernel install step runs depmod over what is
    /// already installed.
    async fn install(
        &mut self,
        commands: &KernelCommands,
        options: &InstallOptions,
    ) -> Result<(), KbuildError> {
        for module in &self.config.modules {
            self.step(
                Step::InstallModule,
                &commands.install_module(module, &options.target),
            )
            .await?;
        }
        if options.modules_only {
            info!("modules only; kernel install skipped");
        } else {
            self.step(Step::Install, &commands.install(&options.target))
                .await?;
        }
        self.advance(BuildState::Installed);
        Ok(())
    }
}
