//! Compiler wrappers
//!
//! A wrapper knows one compiler family's command line: which executables it
//! belongs to, which arguments affect the object file, how to run the
//! preprocessor, and where the outputs go. The orchestrator drives every
//! family through [`ProgramWrapper`] and never parses arguments itself.

mod dispatch;
mod gcc;
mod identity;
mod msvc;

pub use dispatch::{default_wrappers, select_wrapper, Selected};
pub use gcc::GccWrapper;
pub use identity::{is_file_identical_to, is_gcc_compatible, IDENTITY_TTL};
pub use msvc::MsvcWrapper;

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};

use objcache_store::fs_util::resolve_path;
use objcache_store::DataStore;

use crate::config::{Accuracy, Config};
use crate::exe_path::ExecutablePath;
use crate::sys::{self, RunResult};

/// Source file extensions every supported family compiles.
pub const SOURCE_EXTENSIONS: &[&str] = &["c", "cc", "cpp", "cxx", "c++"];

/// A captured command line, before any wrapper has looked at it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program token followed by its arguments.
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub cwd: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
    /// Key on source and header contents instead of preprocessed text.
    DirectMode,
    /// Materialize outputs with hard links.
    HardLinks,
}

/// A set of capabilities, either declared by a wrapper or active for one
/// invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities(BTreeSet<Capability>);

impl Capabilities {
    pub fn new(items: impl IntoIterator<Item = Capability>) -> Self {
        Self(items.into_iter().collect())
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Capabilities actually used under `config`.
    ///
    /// Direct mode is never used at strict accuracy.
    pub fn negotiate(&self, config: &Config) -> Capabilities {
        let mut active = BTreeSet::new();
        if self.contains(Capability::DirectMode)
            && config.direct_mode
            && config.accuracy < Accuracy::Strict
        {
            active.insert(Capability::DirectMode);
        }
        if self.contains(Capability::HardLinks) && config.hard_links {
            active.insert(Capability::HardLinks);
        }
        Capabilities(active)
    }
}

/// An output the compilation is expected to produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedFile {
    pub path: PathBuf,
    /// Absence after a successful compile is an error.
    pub required: bool,
}

/// Expected outputs by logical name (`object`, `coverage`, `dependency`).
pub type BuildFiles = BTreeMap<String, ExpectedFile>;

/// Output of a preprocessing run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preprocessed {
    pub text: Vec<u8>,
    implicit_inputs: Vec<PathBuf>,
}

impl Preprocessed {
    pub fn new(text: Vec<u8>, implicit_inputs: Vec<PathBuf>) -> Self {
        Self {
            text,
            implicit_inputs,
        }
    }

    /// Canonical, sorted paths of every header the compiler read.
    ///
    /// Empty unless direct mode was active.
    pub fn implicit_input_files(&self) -> &[PathBuf] {
        &self.implicit_inputs
    }
}

/// Everything a wrapper needs to know about one invocation.
#[derive(Debug, Clone)]
pub struct CompileContext {
    pub exe: ExecutablePath,
    /// Resolved arguments; the first is the program token.
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub cwd: PathBuf,
    pub active: Capabilities,
    pub accuracy: Accuracy,
    /// Directory for scoped temporary files.
    pub scratch_dir: PathBuf,
}

impl CompileContext {
    pub fn direct_mode(&self) -> bool {
        self.active.contains(Capability::DirectMode)
    }

    pub fn hard_links(&self) -> bool {
        self.active.contains(Capability::HardLinks)
    }

    /// Arguments after the program token.
    pub fn tail_args(&self) -> &[String] {
        self.args.get(1..).unwrap_or(&[])
    }

    /// File name of the program token, without its directory.
    pub fn program_name(&self) -> String {
        self.args
            .first()
            .and_then(|p| Path::new(p).file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// Resolve a path argument against the invocation directory.
    pub fn absolute(&self, path: &str) -> PathBuf {
        self.cwd.join(path)
    }
}

/// Errors raised while wrapping a compiler invocation
#[derive(Debug, thiserror::Error)]
pub enum WrapperError {
    #[error("unsupported invocation: {0}")]
    UnsupportedInvocation(String),

    #[error("{count} output files requested, expected exactly one")]
    MultipleOutputTokens { count: usize },

    #[error("preprocessor exited with code {}", .result.exit_code)]
    PreprocessFailure { result: RunResult },

    #[error("cannot identify compiler: {0}")]
    ProgramId(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl WrapperError {
    /// Fatal errors end the invocation; the rest fall back to running the
    /// command uncached.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            WrapperError::MultipleOutputTokens { .. } | WrapperError::PreprocessFailure { .. }
        )
    }
}

/// Whether preprocessed output may drop line markers.
///
/// Line information is kept when debug info is requested at strict accuracy,
/// or coverage at default accuracy or above.
pub fn suppress_line_info(debug: bool, coverage: bool, accuracy: Accuracy) -> bool {
    !((debug && accuracy >= Accuracy::Strict) || (coverage && accuracy >= Accuracy::Default))
}

/// Whether `arg` names a source file by its extension.
pub fn has_source_extension(arg: &str) -> bool {
    Path::new(arg)
        .extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            SOURCE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Canonicalize reported include paths, dropping duplicates.
pub(crate) fn canonical_includes<I>(cwd: &Path, paths: I) -> io::Result<Vec<PathBuf>>
where
    I: IntoIterator<Item = String>,
{
    let mut resolved = Vec::new();
    for path in paths {
        resolved.push(resolve_path(cwd, Path::new(&path))?);
    }
    resolved.sort();
    resolved.dedup();
    Ok(resolved)
}

/// One compiler family.
pub trait ProgramWrapper {
    /// Short family name, used in logs and memo keys.
    fn name(&self) -> &'static str;

    /// Whether `exe` belongs to this family, judged by its name.
    ///
    /// `memo` caches expensive identity checks between invocations.
    fn can_handle_command(&self, exe: &ExecutablePath, memo: Option<&DataStore>) -> bool;

    /// Expand response files (and any family-specific references).
    fn resolve_args(&self, invocation: &Invocation) -> Vec<String>;

    /// Capabilities this family supports.
    fn capabilities(&self) -> Capabilities;

    /// Reject invocations that are not a single-object compile.
    fn check_invocation_shape(&self, ctx: &CompileContext) -> Result<(), WrapperError>;

    /// Compiler identity, prefixed with the family's hash-format version.
    fn program_id(&self, ctx: &CompileContext) -> Result<String, WrapperError>;

    /// Arguments that can change the compiled output.
    fn relevant_arguments(&self, ctx: &CompileContext) -> Vec<String>;

    /// Environment variables that can change the compiled output.
    fn relevant_env_vars(&self, ctx: &CompileContext) -> BTreeMap<String, String>;

    /// Canonical paths of the source files being compiled.
    fn input_files(&self, ctx: &CompileContext) -> Result<Vec<PathBuf>, WrapperError>;

    fn preprocess_source(&self, ctx: &CompileContext) -> Result<Preprocessed, WrapperError>;

    fn build_files(&self, ctx: &CompileContext) -> Result<BuildFiles, WrapperError>;

    /// Run the real compilation.
    fn run_for_miss(&self, ctx: &CompileContext) -> Result<RunResult, WrapperError> {
        Ok(sys::run(&ctx.exe.real, ctx.tail_args(), &ctx.env, &ctx.cwd)?)
    }
}
