//! GCC and Clang command lines.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use objcache_args::{expand_response_files, QuotingStyle};
use objcache_store::fs_util::{resolve_path, scoped_temp_path};
use objcache_store::DataStore;
use regex_lite::Regex;

use super::identity::is_gcc_compatible;
use super::{
    canonical_includes, has_source_extension, suppress_line_info, BuildFiles, Capabilities,
    Capability, CompileContext, ExpectedFile, Invocation, Preprocessed, ProgramWrapper,
    WrapperError,
};
use crate::exe_path::ExecutablePath;
use crate::sys;

/// Hash-format version of GCC-family program ids.
pub const HASH_VERSION: &str = "3";

/// What a flag (and its value, if it takes one) is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Output,
    Dependency,
    IncludePath,
    Define,
    /// Affects the output and is always hashed.
    Keep,
}

/// Flags whose value is the following argument.
const PAIR_FLAGS: &[(&str, Role)] = &[
    ("-o", Role::Output),
    ("-MF", Role::Dependency),
    ("-MT", Role::Dependency),
    ("-MQ", Role::Dependency),
    ("-I", Role::IncludePath),
    ("-isystem", Role::IncludePath),
    ("-iquote", Role::IncludePath),
    ("-idirafter", Role::IncludePath),
    ("-isysroot", Role::IncludePath),
    ("--sysroot", Role::IncludePath),
    ("-D", Role::Define),
    ("-U", Role::Define),
    ("-include", Role::Keep),
    ("-imacros", Role::Keep),
    ("-x", Role::Keep),
    ("-Xpreprocessor", Role::Keep),
    ("-Xclang", Role::Keep),
    ("-arch", Role::Keep),
    ("-target", Role::Keep),
];

const JOINED_INCLUDE_PREFIXES: &[&str] =
    &["-isystem", "-iquote", "-idirafter", "-isysroot", "--sysroot="];

const DEBUG_PREFIXES: &[&str] = &["-ggdb", "-gdwarf", "-gstabs", "-gxcoff", "-gvms"];

const BINUTILS_WRAPPERS: &[&str] = &["gcc-ar", "gcc-nm", "gcc-ranlib"];

/// Flags that make the driver stop before writing an object file.
const NON_COMPILE_FLAGS: &[&str] = &["-E", "-S", "-M", "-MM", "-fsyntax-only", "-"];

fn pair_role(flag: &str) -> Option<Role> {
    PAIR_FLAGS
        .iter()
        .find(|(name, _)| *name == flag)
        .map(|(_, role)| *role)
}

fn joined_role(flag: &str) -> Option<Role> {
    if flag.starts_with("-I") || JOINED_INCLUDE_PREFIXES.iter().any(|p| flag.starts_with(p)) {
        Some(Role::IncludePath)
    } else if flag.starts_with("-M") {
        Some(Role::Dependency)
    } else if flag.starts_with("-D") || flag.starts_with("-U") {
        Some(Role::Define)
    } else {
        None
    }
}

/// One argument, together with its value when it takes one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Token<'a> {
    flag: &'a str,
    value: Option<&'a str>,
    role: Option<Role>,
}

impl Token<'_> {
    fn is_source(&self) -> bool {
        self.role.is_none() && !self.flag.starts_with('-') && has_source_extension(self.flag)
    }
}

fn tokenize(args: &[String]) -> Vec<Token<'_>> {
    let mut tokens = Vec::with_capacity(args.len());
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let token = match pair_role(arg) {
            Some(role) => Token {
                flag: arg,
                value: iter.next().map(String::as_str),
                role: Some(role),
            },
            None => Token {
                flag: arg,
                value: None,
                role: joined_role(arg),
            },
        };
        tokens.push(token);
    }
    tokens
}

fn is_debug_flag(flag: &str) -> bool {
    matches!(flag, "-g" | "-g1" | "-g2" | "-g3") || DEBUG_PREFIXES.iter().any(|p| flag.starts_with(p))
}

/// Facts about a GCC command line.
#[derive(Debug, Default)]
struct GccArgs<'a> {
    compile: bool,
    outputs: Vec<&'a str>,
    sources: Vec<&'a str>,
    dep_file: Option<&'a str>,
    dependency_generation: bool,
    debug: bool,
    /// Coverage instrumentation of any kind.
    coverage: bool,
    /// Coverage that writes a `.gcno` notes file at compile time.
    coverage_notes: bool,
    non_compile: Option<&'a str>,
}

impl<'a> GccArgs<'a> {
    fn parse(tokens: &[Token<'a>]) -> Self {
        let mut parsed = GccArgs::default();
        for token in tokens {
            match token.flag {
                "-c" => parsed.compile = true,
                "-o" => parsed.outputs.extend(token.value),
                "-MF" => parsed.dep_file = token.value,
                "-MD" | "-MMD" => parsed.dependency_generation = true,
                "--coverage" | "-ftest-coverage" => {
                    parsed.coverage = true;
                    parsed.coverage_notes = true;
                }
                "-fprofile-arcs" => parsed.coverage = true,
                flag if NON_COMPILE_FLAGS.contains(&flag) => {
                    parsed.non_compile.get_or_insert(flag);
                }
                flag if is_debug_flag(flag) => parsed.debug = true,
                _ if token.is_source() => parsed.sources.push(token.flag),
                _ => {}
            }
        }
        parsed
    }
}

fn clang_name_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^.*clang(\+\+|-cpp)?(-[1-9][0-9]*(\.[0-9]+)*)?(\.exe)?$").ok())
        .as_ref()
}

fn include_line_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\.+\s+(.*[^\s])\s*$").ok())
        .as_ref()
}

fn is_gcc_name(name: &str) -> bool {
    (name.contains("gcc") || name.contains("g++"))
        && !BINUTILS_WRAPPERS.iter().any(|tool| name.contains(tool))
}

fn is_clang_name(name: &str) -> bool {
    clang_name_regex().is_some_and(|re| re.is_match(name))
}

/// Header paths from `-H` output (`.`, `..`, ... followed by a path).
fn parse_include_lines(diagnostics: &str) -> Vec<String> {
    let Some(re) = include_line_regex() else {
        return Vec::new();
    };
    diagnostics
        .lines()
        .filter_map(|line| re.captures(line))
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Wrapper for `gcc`, `g++`, `clang`, `clang++` and compatible drivers.
#[derive(Debug, Default, Clone)]
pub struct GccWrapper;

impl GccWrapper {
    pub fn new() -> Self {
        Self
    }
}

impl ProgramWrapper for GccWrapper {
    fn name(&self) -> &'static str {
        "gcc"
    }

    fn can_handle_command(&self, exe: &ExecutablePath, memo: Option<&DataStore>) -> bool {
        // clang-cl takes MSVC-style arguments.
        if exe.virtual_stem() == "clang-cl" {
            return false;
        }
        let name = exe.real_name();
        if is_gcc_name(&name) || is_clang_name(&name) {
            return true;
        }
        matches!(exe.real_stem().as_str(), "cc" | "c++") && is_gcc_compatible(exe, memo)
    }

    fn resolve_args(&self, invocation: &Invocation) -> Vec<String> {
        let expansion =
            expand_response_files(&invocation.args, QuotingStyle::Posix, &invocation.cwd);
        for issue in &expansion.issues {
            tracing::debug!(%issue, "response file kept literally");
        }
        expansion.args
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::new([Capability::DirectMode, Capability::HardLinks])
    }

    fn check_invocation_shape(&self, ctx: &CompileContext) -> Result<(), WrapperError> {
        let tokens = tokenize(ctx.tail_args());
        let parsed = GccArgs::parse(&tokens);
        if let Some(flag) = parsed.non_compile {
            return Err(WrapperError::UnsupportedInvocation(format!(
                "{} does not produce an object file",
                flag
            )));
        }
        if !parsed.compile {
            return Err(WrapperError::UnsupportedInvocation("no -c".to_string()));
        }
        if parsed.outputs.is_empty() {
            return Err(WrapperError::UnsupportedInvocation("no -o".to_string()));
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
        let result = sys::run(&ctx.exe.real, &["--version".to_string()], &ctx.env, &ctx.cwd)?;
        if !result.success() {
            return Err(WrapperError::ProgramId(format!(
                "{} --version exited with code {}",
                ctx.exe.real.display(),
                result.exit_code
            )));
        }
        Ok(format!("{}{}", HASH_VERSION, result.stdout_lossy()))
    }

    fn relevant_arguments(&self, ctx: &CompileContext) -> Vec<String> {
        let tokens = tokenize(ctx.tail_args());
        let parsed = GccArgs::parse(&tokens);
        let direct = ctx.direct_mode();

        let mut relevant = vec![ctx.program_name()];
        for token in &tokens {
            let keep = match token.role {
                // The dependency file names the object, so both matter once
                // it is one of the cached outputs.
                Some(Role::Output) | Some(Role::Dependency) => parsed.dependency_generation,
                Some(Role::IncludePath) | Some(Role::Define) => direct,
                Some(Role::Keep) => true,
                None => !token.is_source(),
            };
            if keep {
                relevant.push(token.flag.to_string());
                relevant.extend(token.value.map(str::to_string));
            }
        }
        relevant
    }

    fn relevant_env_vars(&self, _ctx: &CompileContext) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    fn input_files(&self, ctx: &CompileContext) -> Result<Vec<PathBuf>, WrapperError> {
        let tokens = tokenize(ctx.tail_args());
        GccArgs::parse(&tokens)
            .sources
            .iter()
            .map(|source| Ok(resolve_path(&ctx.cwd, Path::new(source))?))
            .collect()
    }

    fn preprocess_source(&self, ctx: &CompileContext) -> Result<Preprocessed, WrapperError> {
        let tokens = tokenize(ctx.tail_args());
        let parsed = GccArgs::parse(&tokens);
        let output = scoped_temp_path(&ctx.scratch_dir, "objcache-", ".i")?;

        let mut args = Vec::with_capacity(tokens.len() + 5);
        for token in &tokens {
            if token.flag == "-c" || matches!(token.role, Some(Role::Output | Role::Dependency)) {
                continue;
            }
            args.push(token.flag.to_string());
            args.extend(token.value.map(str::to_string));
        }
        args.push("-E".to_string());
        if suppress_line_info(parsed.debug, parsed.coverage, ctx.accuracy) {
            args.push("-P".to_string());
        }
        args.push("-o".to_string());
        args.push(output.to_string_lossy().to_string());
        if ctx.direct_mode() {
            args.push("-H".to_string());
        }

        let result = sys::run(&ctx.exe.real, &args, &ctx.env, &ctx.cwd)?;
        if !result.success() {
            return Err(WrapperError::PreprocessFailure { result });
        }

        let text = fs::read(&output)?;
        let implicit = if ctx.direct_mode() {
            canonical_includes(&ctx.cwd, parse_include_lines(&result.stderr_lossy()))?
        } else {
            Vec::new()
        };
        Ok(Preprocessed::new(text, implicit))
    }

    fn build_files(&self, ctx: &CompileContext) -> Result<BuildFiles, WrapperError> {
        let tokens = tokenize(ctx.tail_args());
        let parsed = GccArgs::parse(&tokens);
        let object = match parsed.outputs.as_slice() {
            [] => return Err(WrapperError::UnsupportedInvocation("no -o".to_string())),
            [only] => ctx.absolute(only),
            many => return Err(WrapperError::MultipleOutputTokens { count: many.len() }),
        };

        let mut files = BuildFiles::new();
        if parsed.coverage_notes {
            files.insert(
                "coverage".to_string(),
                ExpectedFile {
                    path: object.with_extension("gcno"),
                    required: true,
                },
            );
        }
        if parsed.dependency_generation {
            let path = parsed
                .dep_file
                .map(|f| ctx.absolute(f))
                .unwrap_or_else(|| object.with_extension("d"));
            files.insert(
                "dependency".to_string(),
                ExpectedFile {
                    path,
                    required: true,
                },
            );
        }
        files.insert(
            "object".to_string(),
            ExpectedFile {
                path: object,
                required: true,
            },
        );
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Accuracy;
    use tempfile::TempDir;

    fn exe(real: &str, virtual_path: &str) -> ExecutablePath {
        ExecutablePath {
            real: PathBuf::from(real),
            virtual_path: PathBuf::from(virtual_path),
            invoked: virtual_path.to_string(),
        }
    }

    fn ctx(cwd: &Path, args: &[&str], direct: bool) -> CompileContext {
        let active = if direct {
            Capabilities::new([Capability::DirectMode])
        } else {
            Capabilities::default()
        };
        CompileContext {
            exe: exe("/usr/bin/gcc-12", "/usr/bin/gcc"),
            args: args.iter().map(|s| s.to_string()).collect(),
            env: BTreeMap::new(),
            cwd: cwd.to_path_buf(),
            active,
            accuracy: Accuracy::Default,
            scratch_dir: cwd.join("tmp"),
        }
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_recognizes_family_names() {
        let wrapper = GccWrapper::new();
        for name in [
            "/usr/bin/gcc",
            "/usr/bin/x86_64-linux-gnu-gcc-12",
            "/usr/bin/g++",
            "/usr/bin/clang",
            "/usr/bin/clang++-15",
            "/opt/llvm/bin/clang-17.0.1",
            "C:/llvm/bin/clang.exe",
        ] {
            assert!(wrapper.can_handle_command(&exe(name, name), None), "{}", name);
        }
    }

    #[test]
    fn test_rejects_lookalikes() {
        let wrapper = GccWrapper::new();
        for name in [
            "/usr/bin/gcc-ar",
            "/usr/bin/x86_64-linux-gnu-gcc-nm-12",
            "/usr/bin/gcc-ranlib",
            "/usr/bin/clang-tidy",
            "/usr/bin/clang-format",
            "/usr/bin/ld",
        ] {
            assert!(!wrapper.can_handle_command(&exe(name, name), None), "{}", name);
        }
        assert!(!wrapper.can_handle_command(&exe("/usr/bin/clang-15", "/usr/bin/clang-cl"), None));
    }

    #[test]
    fn test_generic_cc_requires_identity() {
        let dir = TempDir::new().unwrap();
        let cc = dir.path().join("cc");
        fs::write(&cc, b"not a known compiler").unwrap();
        let exe = ExecutablePath {
            real: cc.clone(),
            virtual_path: cc,
            invoked: "cc".to_string(),
        };
        assert!(!GccWrapper::new().can_handle_command(&exe, None));
    }

    #[test]
    fn test_pairs_are_not_flags() {
        let args = strings(&["-o", "-c", "a.c"]);
        let tokens = tokenize(&args);
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].value, Some("-c"));
        let parsed = GccArgs::parse(&tokens);
        assert!(!parsed.compile);
        assert_eq!(parsed.outputs, vec!["-c"]);
    }

    #[test]
    fn test_relevant_arguments_preprocess_mode() {
        let dir = TempDir::new().unwrap();
        let ctx = ctx(
            dir.path(),
            &[
                "/usr/local/bin/gcc", "-c", "-Ifoo", "-I", "bar", "-isystem", "/sys", "-DBAR=1",
                "-D", "BAZ", "--sysroot=/sdk", "-MD", "-MF", "a.d", "-O2", "-x", "c", "a.c",
                "-o", "a.o",
            ],
            false,
        );
        // -MD makes the dependency file an output, so -o and -M* stay.
        assert_eq!(
            GccWrapper::new().relevant_arguments(&ctx),
            strings(&["gcc", "-c", "-MD", "-MF", "a.d", "-O2", "-x", "c", "-o", "a.o"])
        );
    }

    #[test]
    fn test_relevant_arguments_ignore_include_paths() {
        let dir = TempDir::new().unwrap();
        let wrapper = GccWrapper::new();
        let a = ctx(dir.path(), &["gcc", "-c", "-Ifoo", "a.c", "-o", "a.o"], false);
        let b = ctx(dir.path(), &["gcc", "-c", "-Ibar", "a.c", "-o", "b.o"], false);
        assert_eq!(wrapper.relevant_arguments(&a), wrapper.relevant_arguments(&b));
        assert_eq!(wrapper.relevant_arguments(&a), strings(&["gcc", "-c"]));
    }

    #[test]
    fn test_relevant_arguments_direct_mode_keeps_defines() {
        let dir = TempDir::new().unwrap();
        let ctx = ctx(
            dir.path(),
            &["gcc", "-c", "-Ifoo", "-DBAR=1", "-U", "X", "a.c", "-o", "a.o"],
            true,
        );
        assert_eq!(
            GccWrapper::new().relevant_arguments(&ctx),
            strings(&["gcc", "-c", "-Ifoo", "-DBAR=1", "-U", "X"])
        );
    }

    #[test]
    fn test_shape() {
        let dir = TempDir::new().unwrap();
        let wrapper = GccWrapper::new();
        let ok = ctx(dir.path(), &["gcc", "-c", "a.c", "-o", "a.o"], false);
        assert!(wrapper.check_invocation_shape(&ok).is_ok());

        for args in [
            &["gcc", "a.c", "-o", "a"][..],
            &["gcc", "-c", "a.c"][..],
            &["gcc", "-c", "a.c", "b.c", "-o", "a.o"][..],
            &["gcc", "-E", "-c", "a.c", "-o", "a.i"][..],
        ] {
            let bad = ctx(dir.path(), args, false);
            assert!(matches!(
                wrapper.check_invocation_shape(&bad),
                Err(WrapperError::UnsupportedInvocation(_))
            ));
        }
    }

    #[test]
    fn test_build_files_with_coverage_and_deps() {
        let dir = TempDir::new().unwrap();
        let ctx = ctx(
            dir.path(),
            &["gcc", "-c", "--coverage", "-MMD", "src/a.c", "-o", "out/a.o"],
            false,
        );
        let files = GccWrapper::new().build_files(&ctx).unwrap();

        assert_eq!(files["object"].path, dir.path().join("out/a.o"));
        assert_eq!(files["coverage"].path, dir.path().join("out/a.gcno"));
        assert_eq!(files["dependency"].path, dir.path().join("out/a.d"));
        assert!(files.values().all(|f| f.required));
    }

    #[test]
    fn test_profile_arcs_alone_has_no_notes_file() {
        let dir = TempDir::new().unwrap();
        let ctx = ctx(dir.path(), &["gcc", "-c", "-fprofile-arcs", "a.c", "-o", "a.o"], false);
        let files = GccWrapper::new().build_files(&ctx).unwrap();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_multiple_outputs_rejected() {
        let dir = TempDir::new().unwrap();
        let ctx = ctx(dir.path(), &["gcc", "-c", "a.c", "-o", "a.o", "-o", "b.o"], false);
        assert!(matches!(
            GccWrapper::new().build_files(&ctx),
            Err(WrapperError::MultipleOutputTokens { count: 2 })
        ));
    }

    #[test]
    fn test_input_files_are_canonical() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/a.c"), "int a;\n").unwrap();
        let ctx = ctx(dir.path(), &["gcc", "-c", "src/../src/a.c", "-o", "a.o"], false);

        let inputs = GccWrapper::new().input_files(&ctx).unwrap();
        assert_eq!(inputs, vec![fs::canonicalize(dir.path().join("src/a.c")).unwrap()]);
    }

    #[test]
    fn test_parse_include_lines() {
        let stderr = "\
. /usr/include/stdio.h
.. /usr/include/bits/types.h
... dir with space/x.h
Multiple include guards may be useful for:
/usr/include/bits/types.h
a.c:3: warning: something
";
        assert_eq!(
            parse_include_lines(stderr),
            strings(&[
                "/usr/include/stdio.h",
                "/usr/include/bits/types.h",
                "dir with space/x.h"
            ])
        );
    }

    #[test]
    fn test_debug_flags() {
        assert!(is_debug_flag("-g"));
        assert!(is_debug_flag("-g3"));
        assert!(is_debug_flag("-gdwarf-4"));
        assert!(!is_debug_flag("-g0"));
        assert!(!is_debug_flag("-gsplit-dwarf"));
    }
}
