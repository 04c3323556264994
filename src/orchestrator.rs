//! The cache control loop.
//!
//! For one compiler invocation:
//! 1. Resolve the real compiler and pick a wrapper for it
//! 2. Without a wrapper (or with caching disabled), run the command as is
//! 3. Derive the cache key, via direct-mode manifests when possible,
//!    otherwise by preprocessing
//! 4. On a hit, materialize the stored outputs and replay the streams
//! 5. On a miss, compile for real and commit the outputs
//!
//! Store failures never fail the build: a failed read is a miss and a failed
//! write leaves the cache as it was.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use objcache_store::fs_util::file_info;
use objcache_store::{is_housekeeping_due, DataStore, EvictionPolicy, Housekeeper, LocalCache};

use crate::config::Config;
use crate::exe_path::{find_executable, ExeError, ExecutablePath};
use crate::hasher::CacheKey;
use crate::key::CacheKeyBuilder;
use crate::signal::{SignalState, EXIT_CODE_INTERRUPTED};
use crate::sys::{self, RunResult};
use crate::wrapper::{
    default_wrappers, select_wrapper, BuildFiles, CompileContext, Invocation, ProgramWrapper,
    Selected, WrapperError,
};
use crate::TOOL_NAME;

/// Scalar store namespace for memoized wrapper facts.
pub const MEMO_NAMESPACE: &str = "wrappers";

/// How an invocation was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    /// Outputs restored from the cache.
    Hit,
    /// Compiled for real; `committed` tells whether the outputs were stored.
    Miss { committed: bool },
    /// Ran without any cache involvement.
    PassThrough,
    /// The compiler or preprocessor reported an error.
    Failed,
    /// Interrupted by the user; nothing was stored.
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub kind: OutcomeKind,
    pub exit_code: i32,
}

impl Outcome {
    fn new(kind: OutcomeKind, exit_code: i32) -> Self {
        Self { kind, exit_code }
    }
}

/// Errors that end an invocation
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("no command given")]
    EmptyCommand,

    #[error(transparent)]
    ExecutableNotFound(#[from] ExeError),

    #[error("compiler succeeded but did not produce {}", display_paths(.missing))]
    IncompleteOutputs { missing: Vec<PathBuf> },

    #[error(transparent)]
    Wrapper(#[from] WrapperError),

    #[error("failed to run compiler: {0}")]
    Spawn(#[source] io::Error),

    #[error("failed to write compiler output: {0}")]
    Output(#[source] io::Error),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn forward(
    out: &mut dyn Write,
    err: &mut dyn Write,
    stdout: &[u8],
    stderr: &[u8],
) -> Result<(), OrchestratorError> {
    out.write_all(stdout)
        .and_then(|_| out.flush())
        .and_then(|_| err.write_all(stderr))
        .and_then(|_| err.flush())
        .map_err(OrchestratorError::Output)
}

/// Drives compiler invocations through the cache.
pub struct Orchestrator {
    config: Config,
    wrappers: Vec<Box<dyn ProgramWrapper>>,
    signals: Arc<SignalState>,
}

impl Orchestrator {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            wrappers: default_wrappers(),
            signals: Arc::new(SignalState::new()),
        }
    }

    /// Share interrupt state with an installed signal handler.
    pub fn with_signal_state(mut self, signals: Arc<SignalState>) -> Self {
        self.signals = signals;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Serve one invocation, writing the compiler's streams to `out` and
    /// `err`.
    pub fn run(
        &self,
        invocation: &Invocation,
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> Result<Outcome, OrchestratorError> {
        let program = invocation
            .args
            .first()
            .ok_or(OrchestratorError::EmptyCommand)?;
        let exe = find_executable(program, &invocation.env, &invocation.cwd, TOOL_NAME)?;

        if self.config.disable {
            return self.pass_through(&exe, invocation, out, err);
        }
        let cache = match LocalCache::open(&self.config.dir) {
            Ok(cache) => cache.with_compression(self.config.compress),
            Err(error) => {
                tracing::warn!(dir = %self.config.dir.display(), %error, "cache unavailable, running uncached");
                return self.pass_through(&exe, invocation, out, err);
            }
        };
        let memo = match cache.data_store(MEMO_NAMESPACE) {
            Ok(store) => Some(store),
            Err(error) => {
                tracing::debug!(%error, "memo store unavailable");
                None
            }
        };

        let Some(selected) = select_wrapper(
            &self.wrappers,
            &exe,
            invocation,
            &self.config,
            memo.as_ref(),
            &cache.tmp_dir(),
        ) else {
            tracing::debug!(program, "no wrapper for invocation, running uncached");
            return self.pass_through(&exe, invocation, out, err);
        };

        match self.cached_compile(&cache, memo.as_ref(), &selected, out, err) {
            Err(OrchestratorError::Wrapper(error)) if !error.is_fatal() => {
                tracing::debug!(%error, "cannot cache invocation, running uncached");
                self.pass_through(&exe, invocation, out, err)
            }
            other => other,
        }
    }

    fn pass_through(
        &self,
        exe: &ExecutablePath,
        invocation: &Invocation,
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> Result<Outcome, OrchestratorError> {
        let args = invocation.args.get(1..).unwrap_or(&[]);
        let result = sys::run(&exe.real, args, &invocation.env, &invocation.cwd)
            .map_err(OrchestratorError::Spawn)?;
        forward(out, err, &result.stdout, &result.stderr)?;
        Ok(Outcome::new(OutcomeKind::PassThrough, result.exit_code))
    }

    fn cached_compile(
        &self,
        cache: &LocalCache,
        memo: Option<&DataStore>,
        selected: &Selected<'_>,
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> Result<Outcome, OrchestratorError> {
        let wrapper = selected.wrapper;
        let ctx = &selected.ctx;

        let program_id = self.program_id(wrapper, ctx, memo)?;
        let args = wrapper.relevant_arguments(ctx);
        let env = wrapper.relevant_env_vars(ctx);
        let inputs = wrapper.input_files(ctx)?;
        let build_files = wrapper.build_files(ctx)?;
        let builder = CacheKeyBuilder::new(&program_id, &args, &env);

        let direct_key = if ctx.direct_mode() {
            let lookup = builder
                .clone()
                .direct_lookup(&inputs)
                .map_err(WrapperError::Io)?;
            if let Some(key) = find_in_manifests(cache, &builder, &lookup, &inputs) {
                if let Some(outcome) = self.try_hit(cache, &key, &build_files, ctx, out, err)? {
                    return Ok(outcome);
                }
            }
            Some(lookup)
        } else {
            None
        };

        let preprocessed = match wrapper.preprocess_source(ctx) {
            Ok(preprocessed) => preprocessed,
            Err(WrapperError::PreprocessFailure { result }) => {
                tracing::debug!(exit_code = result.exit_code, "preprocessor failed");
                forward(out, err, &result.stdout, &result.stderr)?;
                return Ok(Outcome::new(OutcomeKind::Failed, result.exit_code));
            }
            Err(error) => return Err(error.into()),
        };
        let key = if ctx.direct_mode() {
            builder
                .direct(&inputs, preprocessed.implicit_input_files())
                .map_err(WrapperError::Io)?
        } else {
            builder.preprocessed(&preprocessed.text)
        };

        if let Some(outcome) = self.try_hit(cache, &key, &build_files, ctx, out, err)? {
            return Ok(outcome);
        }
        cache.record_miss(key.as_str());
        tracing::debug!(%key, "cache miss");

        let result = wrapper.run_for_miss(ctx).map_err(|error| match error {
            WrapperError::Io(io) => OrchestratorError::Spawn(io),
            other => OrchestratorError::Wrapper(other),
        })?;
        forward(out, err, &result.stdout, &result.stderr)?;

        if self.signals.is_interrupted() {
            tracing::debug!(%key, "interrupted, not committing");
            return Ok(Outcome::new(OutcomeKind::Interrupted, EXIT_CODE_INTERRUPTED));
        }
        if !result.success() {
            return Ok(Outcome::new(OutcomeKind::Failed, result.exit_code));
        }

        let mut files = BTreeMap::new();
        let mut missing = Vec::new();
        for (name, expected) in &build_files {
            if expected.path.is_file() {
                files.insert(name.clone(), expected.path.clone());
            } else if expected.required {
                missing.push(expected.path.clone());
            }
        }
        if !missing.is_empty() {
            return Err(OrchestratorError::IncompleteOutputs { missing });
        }

        let exit_code = result.exit_code;
        let committed = !self.config.read_only
            && self.commit(cache, &key, &files, result, ctx.hard_links());
        if committed {
            if let Some(direct_key) = direct_key {
                if let Err(error) = cache
                    .manifests()
                    .record(direct_key.as_str(), preprocessed.implicit_input_files())
                {
                    tracing::warn!(%error, "failed to record direct-mode manifest");
                }
            }
            self.maybe_housekeep(cache);
        }
        Ok(Outcome::new(OutcomeKind::Miss { committed }, exit_code))
    }

    fn commit(
        &self,
        cache: &LocalCache,
        key: &CacheKey,
        files: &BTreeMap<String, PathBuf>,
        result: RunResult,
        hard_links: bool,
    ) -> bool {
        match cache.commit(key.as_str(), files, &result.into(), hard_links) {
            Ok(outcome) => {
                tracing::debug!(%key, ?outcome, "stored outputs");
                true
            }
            Err(error) => {
                tracing::warn!(%key, %error, "failed to store outputs");
                false
            }
        }
    }

    /// Restore the entry for `key`, if there is a usable one.
    fn try_hit(
        &self,
        cache: &LocalCache,
        key: &CacheKey,
        build_files: &BuildFiles,
        ctx: &CompileContext,
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> Result<Option<Outcome>, OrchestratorError> {
        let meta = match cache.lookup(key.as_str()) {
            Ok(Some(meta)) => meta,
            Ok(None) => return Ok(None),
            Err(error) => {
                tracing::warn!(%key, %error, "cache lookup failed, treating as miss");
                return Ok(None);
            }
        };

        let targets: BTreeMap<String, PathBuf> = build_files
            .iter()
            .filter(|(name, expected)| expected.required || meta.files.contains_key(*name))
            .map(|(name, expected)| (name.clone(), expected.path.clone()))
            .collect();

        match cache.fetch(key.as_str(), &targets, ctx.hard_links()) {
            Ok(Some(output)) => {
                forward(out, err, &output.stdout, &output.stderr)?;
                cache.record_hit(key.as_str());
                tracing::debug!(%key, "cache hit");
                Ok(Some(Outcome::new(OutcomeKind::Hit, output.exit_code)))
            }
            Ok(None) => Ok(None),
            Err(error) => {
                tracing::warn!(%key, %error, "failed to restore outputs, treating as miss");
                Ok(None)
            }
        }
    }

    /// Program id, memoized per executable path, size and modification time.
    fn program_id(
        &self,
        wrapper: &dyn ProgramWrapper,
        ctx: &CompileContext,
        memo: Option<&DataStore>,
    ) -> Result<String, WrapperError> {
        let memo_key = file_info(&ctx.exe.real).ok().flatten().map(|info| {
            let mtime = info
                .modified
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or(0);
            format!(
                "program_id_{}_{}_{}_{}",
                wrapper.name(),
                ctx.exe.real.display(),
                info.size,
                mtime
            )
        });

        if let (Some(store), Some(key)) = (memo, memo_key.as_deref()) {
            if let Ok(Some(id)) = store.get(key) {
                return Ok(id);
            }
        }
        let id = wrapper.program_id(ctx)?;
        if let (Some(store), Some(key)) = (memo, memo_key.as_deref()) {
            if let Err(error) = store.put(key, &id, None) {
                tracing::debug!(%error, "failed to memoize program id");
            }
        }
        Ok(id)
    }

    fn maybe_housekeep(&self, cache: &LocalCache) {
        if !is_housekeeping_due() {
            return;
        }
        let policy = EvictionPolicy::size_based(self.config.max_cache_size);
        match Housekeeper::new(cache, policy).run() {
            Ok(result) => tracing::debug!(
                evicted = result.evicted,
                orphans = result.orphans_removed,
                "housekeeping done"
            ),
            Err(error) => tracing::warn!(%error, "housekeeping failed"),
        }
    }
}

/// Full key of a direct-mode manifest whose headers are unchanged and whose
/// entry is present.
fn find_in_manifests(
    cache: &LocalCache,
    builder: &CacheKeyBuilder,
    lookup: &CacheKey,
    inputs: &[PathBuf],
) -> Option<CacheKey> {
    let manifests = match cache.manifests().load(lookup.as_str()) {
        Ok(manifests) => manifests,
        Err(error) => {
            tracing::debug!(%error, "manifests unreadable");
            return None;
        }
    };
    for manifest in manifests {
        match builder.clone().direct(inputs, &manifest.implicit_inputs) {
            Ok(key) if cache.has(key.as_str()) => {
                cache.manifests().touch(lookup.as_str(), manifest.slot);
                return Some(key);
            }
            Ok(_) => {}
            Err(error) => {
                tracing::debug!(slot = manifest.slot, %error, "manifest header unreadable");
            }
        }
    }
    None
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use tempfile::TempDir;

    /// A fake `gcc` that logs each run, copies the source into the object
    /// and prints a warning. Sources containing `PPFAIL` fail to preprocess
    /// with exit code 7.
    const FAKE_GCC: &str = r#"#!/bin/sh
echo "$@" >> "$FAKE_LOG"
for arg in "$@"; do
  if [ "$arg" = "--version" ]; then echo "fake gcc 1.0"; exit 0; fi
done
out=""; src=""; pre=0; prev=""
for arg in "$@"; do
  case "$prev" in -o) out="$arg";; esac
  case "$arg" in -E) pre=1;; *.c) src="$arg";; esac
  prev="$arg"
done
if [ "$pre" = 1 ]; then
  grep -q PPFAIL "$src" && { echo "error: PPFAIL in source" >&2; exit 7; }
  cat "$src" > "$out"; exit 0
fi
grep -q FAIL "$src" && { echo "error: FAIL found" >&2; exit 1; }
cp "$src" "$out"
echo "warning: fake" >&2
exit 0
"#;

    struct Fixture {
        root: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let root = TempDir::new().unwrap();
            let bin = root.path().join("bin");
            fs::create_dir_all(&bin).unwrap();
            let gcc = bin.join("gcc");
            fs::write(&gcc, FAKE_GCC).unwrap();
            fs::set_permissions(&gcc, fs::Permissions::from_mode(0o755)).unwrap();
            fs::create_dir_all(root.path().join("work")).unwrap();
            Self { root }
        }

        fn work(&self) -> PathBuf {
            self.root.path().join("work")
        }

        fn log(&self) -> PathBuf {
            self.root.path().join("gcc.log")
        }

        fn config(&self) -> Config {
            Config::with_defaults(self.root.path().join("cache"))
        }

        fn invocation(&self, args: &[&str]) -> Invocation {
            let mut env = BTreeMap::new();
            env.insert(
                "PATH".to_string(),
                format!("{}:/usr/bin:/bin", self.root.path().join("bin").display()),
            );
            env.insert("FAKE_LOG".to_string(), self.log().display().to_string());
            Invocation {
                args: args.iter().map(|s| s.to_string()).collect(),
                env,
                cwd: self.work(),
            }
        }

        fn compile_runs(&self) -> usize {
            fs::read_to_string(self.log())
                .unwrap_or_default()
                .lines()
                .filter(|line| line.contains("-c") && !line.contains("-E"))
                .count()
        }
    }

    /// Number of committed entries under the fixture's cache.
    fn entry_count(fx: &Fixture) -> usize {
        let Ok(shards) = fs::read_dir(fx.root.path().join("cache").join("c")) else {
            return 0;
        };
        shards
            .map(|shard| shard.unwrap().path())
            .filter(|shard| shard.is_dir())
            .flat_map(|shard| fs::read_dir(shard).unwrap())
            .filter(|entry| entry.as_ref().unwrap().path().is_dir())
            .count()
    }

    fn run(orchestrator: &Orchestrator, invocation: &Invocation) -> (Outcome, Vec<u8>) {
        let mut out = Vec::new();
        let mut err = Vec::new();
        let outcome = orchestrator.run(invocation, &mut out, &mut err).unwrap();
        (outcome, err)
    }

    fn write(path: &Path, contents: &str) {
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_miss_then_hit() {
        let fx = Fixture::new();
        write(&fx.work().join("a.c"), "int a;\n");
        let orchestrator = Orchestrator::new(fx.config());
        let inv = fx.invocation(&["gcc", "-c", "a.c", "-o", "a.o"]);

        let (first, err) = run(&orchestrator, &inv);
        assert_eq!(first.kind, OutcomeKind::Miss { committed: true });
        assert_eq!(first.exit_code, 0);
        assert_eq!(err, b"warning: fake\n");

        fs::remove_file(fx.work().join("a.o")).unwrap();
        let (second, err) = run(&orchestrator, &inv);
        assert_eq!(second.kind, OutcomeKind::Hit);
        assert_eq!(second.exit_code, 0);
        assert_eq!(err, b"warning: fake\n");
        assert_eq!(fs::read_to_string(fx.work().join("a.o")).unwrap(), "int a;\n");
        assert_eq!(fx.compile_runs(), 1);
    }

    #[test]
    fn test_compile_failure_is_not_cached() {
        let fx = Fixture::new();
        write(&fx.work().join("bad.c"), "FAIL\n");
        let orchestrator = Orchestrator::new(fx.config());
        let inv = fx.invocation(&["gcc", "-c", "bad.c", "-o", "bad.o"]);

        let (first, err) = run(&orchestrator, &inv);
        assert_eq!(first.kind, OutcomeKind::Failed);
        assert_eq!(first.exit_code, 1);
        assert_eq!(err, b"error: FAIL found\n");

        let (second, _) = run(&orchestrator, &inv);
        assert_eq!(second.kind, OutcomeKind::Failed);
        assert_eq!(fx.compile_runs(), 2);
    }

    #[test]
    fn test_missing_coverage_notes_is_an_error() {
        let fx = Fixture::new();
        write(&fx.work().join("a.c"), "int a;\n");
        let orchestrator = Orchestrator::new(fx.config());
        let inv = fx.invocation(&["gcc", "--coverage", "-c", "a.c", "-o", "a.o"]);

        let mut out = Vec::new();
        let mut err = Vec::new();
        let result = orchestrator.run(&inv, &mut out, &mut err);
        assert!(matches!(
            result,
            Err(OrchestratorError::IncompleteOutputs { ref missing })
                if missing.len() == 1 && missing[0].ends_with("a.gcno")
        ));
        assert_eq!(entry_count(&fx), 0);
    }

    #[test]
    fn test_preprocessor_failure_is_forwarded() {
        let fx = Fixture::new();
        write(&fx.work().join("pp.c"), "PPFAIL\n");
        let orchestrator = Orchestrator::new(fx.config());
        let inv = fx.invocation(&["gcc", "-c", "pp.c", "-o", "pp.o"]);

        let (outcome, err) = run(&orchestrator, &inv);
        assert_eq!(outcome, Outcome::new(OutcomeKind::Failed, 7));
        assert_eq!(err, b"error: PPFAIL in source\n");
        assert_eq!(fx.compile_runs(), 0);
        assert!(!fx.work().join("pp.o").exists());
        assert_eq!(entry_count(&fx), 0);
    }

    #[test]
    fn test_compressed_cache_round_trip() {
        let fx = Fixture::new();
        write(&fx.work().join("a.c"), "int compressed;\n");
        let mut config = fx.config();
        config.compress = objcache_store::Compression::All;
        config.hard_links = true;
        let orchestrator = Orchestrator::new(config);
        let inv = fx.invocation(&["gcc", "-c", "a.c", "-o", "a.o"]);

        assert_eq!(run(&orchestrator, &inv).0.kind, OutcomeKind::Miss { committed: true });
        fs::remove_file(fx.work().join("a.o")).unwrap();

        assert_eq!(run(&orchestrator, &inv).0.kind, OutcomeKind::Hit);
        assert_eq!(
            fs::read_to_string(fx.work().join("a.o")).unwrap(),
            "int compressed;\n"
        );
        assert_eq!(entry_count(&fx), 1);
    }

    #[test]
    fn test_unsupported_shape_passes_through() {
        let fx = Fixture::new();
        write(&fx.work().join("a.c"), "int a;\n");
        let orchestrator = Orchestrator::new(fx.config());

        let (outcome, _) = run(&orchestrator, &fx.invocation(&["gcc", "a.c", "-o", "a.out"]));
        assert_eq!(outcome.kind, OutcomeKind::PassThrough);
        assert_eq!(outcome.exit_code, 0);
    }

    #[test]
    fn test_disabled_passes_through() {
        let fx = Fixture::new();
        write(&fx.work().join("a.c"), "int a;\n");
        let mut config = fx.config();
        config.disable = true;
        let orchestrator = Orchestrator::new(config);

        let (outcome, _) = run(&orchestrator, &fx.invocation(&["gcc", "-c", "a.c", "-o", "a.o"]));
        assert_eq!(outcome.kind, OutcomeKind::PassThrough);
        assert!(!fx.root.path().join("cache").exists());
    }

    #[test]
    fn test_read_only_never_commits() {
        let fx = Fixture::new();
        write(&fx.work().join("a.c"), "int a;\n");
        let mut config = fx.config();
        config.read_only = true;
        let orchestrator = Orchestrator::new(config);
        let inv = fx.invocation(&["gcc", "-c", "a.c", "-o", "a.o"]);

        assert_eq!(run(&orchestrator, &inv).0.kind, OutcomeKind::Miss { committed: false });
        assert_eq!(run(&orchestrator, &inv).0.kind, OutcomeKind::Miss { committed: false });
    }

    #[test]
    fn test_direct_mode_hit_skips_preprocessor() {
        let fx = Fixture::new();
        write(&fx.work().join("a.c"), "int a;\n");
        let mut config = fx.config();
        config.direct_mode = true;
        let orchestrator = Orchestrator::new(config);
        let inv = fx.invocation(&["gcc", "-c", "a.c", "-o", "a.o"]);

        assert_eq!(run(&orchestrator, &inv).0.kind, OutcomeKind::Miss { committed: true });
        let preprocess_runs = |fx: &Fixture| {
            fs::read_to_string(fx.log())
                .unwrap()
                .lines()
                .filter(|l| l.contains("-E"))
                .count()
        };
        let before = preprocess_runs(&fx);

        assert_eq!(run(&orchestrator, &inv).0.kind, OutcomeKind::Hit);
        assert_eq!(preprocess_runs(&fx), before);
    }

    #[test]
    fn test_interrupt_skips_commit() {
        let fx = Fixture::new();
        write(&fx.work().join("a.c"), "int a;\n");
        let signals = Arc::new(SignalState::new());
        let orchestrator = Orchestrator::new(fx.config()).with_signal_state(Arc::clone(&signals));
        signals.handle_signal();

        let (outcome, _) = run(&orchestrator, &fx.invocation(&["gcc", "-c", "a.c", "-o", "a.o"]));
        assert_eq!(outcome.kind, OutcomeKind::Interrupted);
        assert_eq!(outcome.exit_code, EXIT_CODE_INTERRUPTED);
    }

    #[test]
    fn test_missing_compiler() {
        let fx = Fixture::new();
        let orchestrator = Orchestrator::new(fx.config());
        let mut out = Vec::new();
        let mut err = Vec::new();
        let result = orchestrator.run(
            &fx.invocation(&["no-such-cc", "-c", "a.c"]),
            &mut out,
            &mut err,
        );
        assert!(matches!(result, Err(OrchestratorError::ExecutableNotFound(_))));
        assert!(matches!(
            orchestrator.run(&fx.invocation(&[]), &mut out, &mut err),
            Err(OrchestratorError::EmptyCommand)
        ));
    }
}
