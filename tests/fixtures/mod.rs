//! Shared fixtures: a scratch tree with a fake `gcc` on `PATH`.
//!
//! The fake compiler understands just enough of the GCC command line for the
//! cache to drive it: `--version`, `-E` (copies the source) and `-c -o`
//! (copies the source into the object, warns on stderr). A source containing
//! `FAIL` makes it exit 1. Every run is appended to `gcc.log`.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::os::unix::fs::{symlink, PermissionsExt};
use std::path::{Path, PathBuf};

use tempfile::TempDir;

pub const FAKE_GCC: &str = r#"#!/bin/sh
echo "$@" >> "$FAKE_LOG"
for arg in "$@"; do
  case "$arg" in
    --version) echo "fake gcc 1.0"; exit 0;;
    @*) echo "fake gcc: cannot read response file ${arg#@}" >&2; exit 4;;
  esac
done
out=""; src=""; pre=0; prev=""
for arg in "$@"; do
  case "$prev" in -o) out="$arg";; esac
  case "$arg" in -E) pre=1;; *.c) src="$arg";; esac
  prev="$arg"
done
if [ "$pre" = 1 ]; then cat "$src" > "$out"; exit 0; fi
grep -q FAIL "$src" && { echo "error: FAIL found" >&2; exit 1; }
cp "$src" "$out"
echo "warning: fake" >&2
exit 0
"#;

pub struct Toolchain {
    pub root: TempDir,
}

impl Toolchain {
    pub fn new() -> Self {
        let root = TempDir::new().unwrap();
        let bin = root.path().join("bin");
        fs::create_dir_all(&bin).unwrap();
        let gcc = bin.join("gcc");
        fs::write(&gcc, FAKE_GCC).unwrap();
        fs::set_permissions(&gcc, fs::Permissions::from_mode(0o755)).unwrap();
        symlink(&gcc, bin.join("cc")).unwrap();
        fs::create_dir_all(root.path().join("work")).unwrap();
        Self { root }
    }

    pub fn bin(&self) -> PathBuf {
        self.root.path().join("bin")
    }

    pub fn work(&self) -> PathBuf {
        self.root.path().join("work")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.path().join("cache")
    }

    pub fn log(&self) -> PathBuf {
        self.root.path().join("gcc.log")
    }

    pub fn write_source(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.work().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    /// Environment with the fake toolchain first on `PATH`, plus `extra_path`
    /// entries in front of it.
    pub fn env(&self, extra_path: &[&Path]) -> BTreeMap<String, String> {
        let mut dirs: Vec<String> = extra_path.iter().map(|p| p.display().to_string()).collect();
        dirs.push(self.bin().display().to_string());
        dirs.push("/usr/bin:/bin".to_string());

        let mut env = BTreeMap::new();
        env.insert("PATH".to_string(), dirs.join(":"));
        env.insert("FAKE_LOG".to_string(), self.log().display().to_string());
        env.insert("HOME".to_string(), self.root.path().display().to_string());
        env.insert("OBJCACHE_DIR".to_string(), self.cache_dir().display().to_string());
        env
    }

    /// Number of real compilations (not preprocessing or version checks).
    pub fn compile_runs(&self) -> usize {
        fs::read_to_string(self.log())
            .unwrap_or_default()
            .lines()
            .filter(|line| line.contains("-c") && !line.contains("-E"))
            .count()
    }
}
