//! MSVC (`cl`) and `clang-cl` command lines.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use objcache_args::{expand_percent_vars, expand_response_files, QuotingStyle};
use objcache_store::fs_util::resolve_path;
use objcache_store::DataStore;

use super::{
    canonical_includes, has_source_extension, suppress_line_info, BuildFiles, Capabilities,
    Capability, CompileContext, ExpectedFile, Invocation, Preprocessed, ProgramWrapper,
    WrapperError,
};
use crate::config::Accuracy;
use crate::exe_path::ExecutablePath;
use crate::sys::{self, RunResult};

/// Hash-format version of MSVC-family program ids.
pub const HASH_VERSION: &str = "1";

/// Environment variables `cl` reads extra options from.
const OPTION_ENV_VARS: &[&str] = &["CL", "_CL_"];

/// Makes `cl` write diagnostics to an IDE pipe instead of the console.
const UNICODE_OUTPUT_VAR: &str = "VS_UNICODE_OUTPUT";

const INCLUDE_NOTE: &str = "Note: including file:";

/// An MSVC argument, split into option name and attached value.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Arg<'a> {
    /// `/name` or `-name`, without the switch character. `value` is set for
    /// options that took the following argument as their value.
    Option {
        raw: &'a str,
        name: &'a str,
        value: Option<&'a str>,
    },
    Source(&'a str),
    Other(&'a str),
}

/// Options that take the next argument when nothing is attached.
const VALUE_OPTIONS: &[&str] = &["F", "Fo", "Fo:", "I", "D", "U"];

fn is_switch(arg: &str) -> bool {
    if arg.starts_with('-') {
        return true;
    }
    // clang-cl on Unix: an existing absolute path is a file, not a switch.
    arg.starts_with('/') && !(Path::new(arg).is_absolute() && Path::new(arg).exists())
}

fn parse_args(args: &[String]) -> Vec<Arg<'_>> {
    let mut parsed = Vec::with_capacity(args.len());
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if !is_switch(arg) {
            if has_source_extension(arg) {
                parsed.push(Arg::Source(arg));
            } else {
                parsed.push(Arg::Other(arg));
            }
            continue;
        }
        let name = &arg[1..];
        let value = if VALUE_OPTIONS.contains(&name) {
            iter.next().map(String::as_str)
        } else {
            None
        };
        parsed.push(Arg::Option {
            raw: arg,
            name,
            value,
        });
    }
    parsed
}

/// Object path named by an `/Fo` option.
fn fo_value<'a>(name: &'a str, value: Option<&'a str>) -> Option<&'a str> {
    let attached = name.strip_prefix("Fo")?;
    let attached = attached.strip_prefix(':').unwrap_or(attached);
    if attached.is_empty() {
        value
    } else {
        Some(attached)
    }
}

/// Facts about a `cl` command line.
#[derive(Debug, Default)]
struct MsvcArgs<'a> {
    compile: bool,
    outputs: Vec<&'a str>,
    sources: Vec<&'a str>,
    debug: bool,
    unsupported: Option<&'a str>,
}

impl<'a> MsvcArgs<'a> {
    fn parse(args: &[Arg<'a>]) -> Self {
        let mut parsed = MsvcArgs::default();
        for arg in args {
            match arg {
                Arg::Source(path) => parsed.sources.push(*path),
                Arg::Option { raw, name, value } => match *name {
                    "c" => parsed.compile = true,
                    "Z7" => parsed.debug = true,
                    "Zi" | "ZI" | "E" | "EP" | "P" => {
                        parsed.unsupported.get_or_insert(*raw);
                    }
                    n if n.starts_with("Tc") || n.starts_with("Tp") => {
                        parsed.unsupported.get_or_insert(*raw);
                    }
                    n => parsed.outputs.extend(fo_value(n, *value)),
                },
                Arg::Other(_) => {}
            }
        }
        parsed
    }

    /// `/E` keeps `#line` markers, `/EP` drops them.
    ///
    /// `/Z7` embeds line numbers in the object, so it keeps markers
    /// wherever coverage would.
    fn preprocess_flag(&self, accuracy: Accuracy) -> &'static str {
        if suppress_line_info(self.debug, self.debug, accuracy) {
            "/EP"
        } else {
            "/E"
        }
    }
}

/// Environment for every `cl` run.
fn compiler_env(ctx: &CompileContext) -> BTreeMap<String, String> {
    let mut env = ctx.env.clone();
    env.retain(|name, _| !name.eq_ignore_ascii_case(UNICODE_OUTPUT_VAR));
    env
}

fn lookup_var<'a>(env: &'a BTreeMap<String, String>, name: &str) -> Option<&'a String> {
    env.get(name).or_else(|| {
        env.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    })
}

/// Quote `arg` so `CommandLineToArgvW` reads it back unchanged.
fn quote_windows_arg(arg: &str) -> String {
    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    let mut backslashes = 0;
    for c in arg.chars() {
        match c {
            '\\' => backslashes += 1,
            '"' => {
                quoted.extend(std::iter::repeat('\\').take(backslashes * 2 + 1));
                quoted.push('"');
                backslashes = 0;
            }
            _ => {
                quoted.extend(std::iter::repeat('\\').take(backslashes));
                quoted.push(c);
                backslashes = 0;
            }
        }
    }
    quoted.extend(std::iter::repeat('\\').take(backslashes * 2));
    quoted.push('"');
    quoted
}

/// Response file text for `args`: one argument per line, with a separate
/// `/D` kept on the same line as its definition.
#[cfg_attr(not(windows), allow(dead_code))]
fn synthetic_response_file(args: &[String]) -> String {
    let mut text = String::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        text.push_str(&quote_windows_arg(arg));
        if arg == "/D" || arg == "-D" {
            if let Some(value) = iter.next() {
                text.push(' ');
                text.push_str(&quote_windows_arg(value));
            }
        }
        text.push_str("\r\n");
    }
    text
}

/// UTF-16LE with a byte-order mark.
#[cfg_attr(not(windows), allow(dead_code))]
fn encode_utf16le(text: &str) -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xFE];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    bytes
}

/// Wrapper for `cl.exe` and `clang-cl`.
#[derive(Debug, Default, Clone)]
pub struct MsvcWrapper;

impl MsvcWrapper {
    pub fn new() -> Self {
        Self
    }

    #[cfg(windows)]
    fn run_with_response_file(&self, ctx: &CompileContext) -> Result<RunResult, WrapperError> {
        use objcache_store::fs_util::scoped_temp_path;

        let rsp = scoped_temp_path(&ctx.scratch_dir, "objcache-", ".rsp")?;
        std::fs::write(&rsp, encode_utf16le(&synthetic_response_file(ctx.tail_args())))?;
        let args = vec![format!("@{}", rsp.display())];
        Ok(sys::run(&ctx.exe.real, &args, &compiler_env(ctx), &ctx.cwd)?)
    }

    #[cfg(not(windows))]
    fn run_with_response_file(&self, ctx: &CompileContext) -> Result<RunResult, WrapperError> {
        Ok(sys::run(&ctx.exe.real, ctx.tail_args(), &compiler_env(ctx), &ctx.cwd)?)
    }
}

impl ProgramWrapper for MsvcWrapper {
    fn name(&self) -> &'static str {
        "msvc"
    }

    fn can_handle_command(&self, exe: &ExecutablePath, _memo: Option<&DataStore>) -> bool {
        exe.real_stem() == "cl" || exe.virtual_stem() == "clang-cl"
    }

    fn resolve_args(&self, invocation: &Invocation) -> Vec<String> {
        let expansion =
            expand_response_files(&invocation.args, QuotingStyle::Windows, &invocation.cwd);
        for issue in &expansion.issues {
            tracing::debug!(%issue, "response file kept literally");
        }
        expansion
            .args
            .iter()
            .map(|arg| expand_percent_vars(arg, |name| lookup_var(&invocation.env, name).cloned()))
            .collect()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::new([Capability::DirectMode, Capability::HardLinks])
    }

    fn check_invocation_shape(&self, ctx: &CompileContext) -> Result<(), WrapperError> {
        let args = parse_args(ctx.tail_args());
        let parsed = MsvcArgs::parse(&args);
        if let Some(option) = parsed.unsupported {
            return Err(WrapperError::UnsupportedInvocation(format!(
                "{} is not supported",
                option
            )));
        }
        if !parsed.compile {
            return Err(WrapperError::UnsupportedInvocation("no /c".to_string()));
        }
        if parsed.outputs.is_empty() {
            return Err(WrapperError::UnsupportedInvocation("no /Fo".to_string()));
        }
        if parsed.sources.len() != 1 {
            return Err(WrapperError::UnsupportedInvocation(format!(
                "{} source files, expected one",
                parsed.sources.len()
            )));
        }
        Ok(())
    }

    fn program_id(&self, ctx: &CompileContext) -> Result<String, WrapperError> {
        let result = sys::run(&ctx.exe.real, &[], &compiler_env(ctx), &ctx.cwd)?;
        let banner = result.stderr_lossy();
        if banner.trim().is_empty() {
            return Err(WrapperError::ProgramId(format!(
                "{} printed no version banner",
                ctx.exe.real.display()
            )));
        }
        Ok(format!("{}{}", HASH_VERSION, banner))
    }

    fn relevant_arguments(&self, ctx: &CompileContext) -> Vec<String> {
        let direct = ctx.direct_mode();
        let mut relevant = vec![ctx.program_name()];
        for arg in parse_args(ctx.tail_args()) {
            match arg {
                Arg::Source(_) => {}
                Arg::Other(other) => relevant.push(other.to_string()),
                Arg::Option { raw, name, value } => {
                    let keep = if name.starts_with('F') {
                        name == "F"
                    } else if name.starts_with('I') {
                        direct
                    } else if name.starts_with('D') || name.starts_with('U') {
                        direct
                    } else {
                        true
                    };
                    if keep {
                        relevant.push(raw.to_string());
                        relevant.extend(value.map(str::to_string));
                    }
                }
            }
        }
        relevant
    }

    fn relevant_env_vars(&self, ctx: &CompileContext) -> BTreeMap<String, String> {
        OPTION_ENV_VARS
            .iter()
            .filter_map(|name| {
                lookup_var(&ctx.env, name).map(|value| (name.to_string(), value.clone()))
            })
            .collect()
    }

    fn input_files(&self, ctx: &CompileContext) -> Result<Vec<PathBuf>, WrapperError> {
        let args = parse_args(ctx.tail_args());
        MsvcArgs::parse(&args)
            .sources
            .iter()
            .map(|source| Ok(resolve_path(&ctx.cwd, Path::new(source))?))
            .collect()
    }

    fn preprocess_source(&self, ctx: &CompileContext) -> Result<Preprocessed, WrapperError> {
        let args = parse_args(ctx.tail_args());
        let parsed = MsvcArgs::parse(&args);

        let mut pre_args = Vec::with_capacity(args.len() + 2);
        for arg in &args {
            match arg {
                Arg::Option { name, .. }
                    if matches!(*name, "c" | "C" | "E" | "EP" | "P") || name.starts_with("Fo") => {}
                Arg::Option { raw, value, .. } => {
                    pre_args.push(raw.to_string());
                    pre_args.extend(value.map(str::to_string));
                }
                Arg::Source(path) | Arg::Other(path) => pre_args.push(path.to_string()),
            }
        }
        pre_args.push(parsed.preprocess_flag(ctx.accuracy).to_string());
        if ctx.direct_mode() {
            pre_args.push("/showIncludes".to_string());
        }

        let result = sys::run(&ctx.exe.real, &pre_args, &compiler_env(ctx), &ctx.cwd)?;
        if !result.success() {
            return Err(WrapperError::PreprocessFailure { result });
        }

        let implicit = if ctx.direct_mode() {
            let diagnostics = result.stderr_lossy();
            let paths = diagnostics
                .lines()
                .filter_map(|line| line.split_once(INCLUDE_NOTE))
                .map(|(_, path)| path.trim().to_string())
                .filter(|path| !path.is_empty());
            canonical_includes(&ctx.cwd, paths)?
        } else {
            Vec::new()
        };
        Ok(Preprocessed::new(result.stdout, implicit))
    }

    fn build_files(&self, ctx: &CompileContext) -> Result<BuildFiles, WrapperError> {
        let args = parse_args(ctx.tail_args());
        let parsed = MsvcArgs::parse(&args);
        let output = match parsed.outputs.as_slice() {
            [] => return Err(WrapperError::UnsupportedInvocation("no /Fo".to_string())),
            [only] => *only,
            many => return Err(WrapperError::MultipleOutputTokens { count: many.len() }),
        };

        let object = if output.ends_with('\\') || output.ends_with('/') {
            let stem = parsed
                .sources
                .first()
                .and_then(|s| Path::new(s).file_stem())
                .map(|s| s.to_string_lossy().to_string())
                .ok_or_else(|| {
                    WrapperError::UnsupportedInvocation("/Fo directory without a source".into())
                })?;
            ctx.absolute(output).join(format!("{}.obj", stem))
        } else {
            let path = ctx.absolute(output);
            if path.extension().is_none() {
                path.with_extension("obj")
            } else {
                path
            }
        };

        let mut files = BuildFiles::new();
        files.insert(
            "object".to_string(),
            ExpectedFile {
                path: object,
                required: true,
            },
        );
        Ok(files)
    }

    fn run_for_miss(&self, ctx: &CompileContext) -> Result<RunResult, WrapperError> {
        self.run_with_response_file(ctx)
    }
}
