//! Fakes and fixtures shared by unit tests

use crate::cache::{LockMode, LockObserver};
use crate::environment::{ActivityLog, Revision};
use crate::error::{BuildwrightError, BuildwrightResult};
use crate::platform::Platform;
use crate::toolchain::{BinaryBuild, Compiler, DependencyResolver, GoPath, HeadDescription, VersionControl};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;
use walkdir::WalkDir;

/// Host entry file as it looks in a fresh checkout
pub const HOST_ENTRY: &str = r#"package caddymain

import (
	"flag"
	"fmt"

	"github.com/mholt/caddy"
	// This is where other plugins get plugged in (imported)
)

var (
	buildDate string
	gitTag    string
)

func Run() {
	flag.Parse()
	fmt.Println(caddy.AppName)
}
"#;

/// Write `contents` to `path`, creating parent directories
pub fn write_file(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}

/// Every entry below `root` keyed by relative path. Directories map to
/// `None`, files and symlinks to their bytes.
pub fn tree_listing(root: &Path) -> BTreeMap<String, Option<Vec<u8>>> {
    WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .map(|entry| {
            let entry = entry.unwrap();
            let relative = entry
                .path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .into_owned();
            let contents = if entry.file_type().is_dir() {
                None
            } else if entry.file_type().is_symlink() {
                Some(
                    std::fs::read_link(entry.path())
                        .unwrap()
                        .to_string_lossy()
                        .into_owned()
                        .into_bytes(),
                )
            } else {
                Some(std::fs::read(entry.path()).unwrap())
            };
            (relative, contents)
        })
        .collect()
}

fn first_root(gopath: &GoPath) -> PathBuf {
    gopath.roots()[0].clone()
}

fn fail_if(failures: &Mutex<HashMap<&'static str, String>>, op: &'static str, call: &str) -> BuildwrightResult<()> {
    match failures.lock().get(op) {
        Some(needle) if call.contains(needle.as_str()) => {
            Err(BuildwrightError::command_exec(call.to_string(), format!("{op} failed")))
        }
        _ => Ok(()),
    }
}

/// Resolver that fabricates checkouts instead of downloading them.
///
/// `ensure_present` creates `<root>/src/<module>` at revision `v1` if it is
/// missing. `update` rewrites it to `v2`, one file at a time, yielding
/// between writes so a reader racing it would see a torn tree.
#[derive(Default)]
pub struct FakeResolver {
    pub calls: Mutex<Vec<String>>,
    failures: Mutex<HashMap<&'static str, String>>,
    destroy_on_update: Mutex<bool>,
}

impl FakeResolver {
    /// Fail `op` ("ensure" or "update") whenever the call mentions `needle`
    pub fn fail(&self, op: &'static str, needle: &str) {
        self.failures.lock().insert(op, needle.to_string());
    }

    /// Make `update` delete the whole cache and then fail, leaving nothing
    /// for a restore to move aside
    pub fn destroy_on_update(&self) {
        *self.destroy_on_update.lock() = true;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

/// Files making up a fabricated checkout
pub const FAKE_MODULE_FILES: [&str; 3] = ["module.go", "dep.go", ".git/HEAD"];

#[async_trait]
impl DependencyResolver for FakeResolver {
    async fn ensure_present(
        &self,
        gopath: &GoPath,
        module: &str,
        whole_tree: bool,
        log: &ActivityLog,
    ) -> BuildwrightResult<()> {
        let call = format!("ensure {} {} {}", first_root(gopath).display(), module, whole_tree);
        log.record(call.clone());
        self.calls.lock().push(call.clone());
        fail_if(&self.failures, "ensure", &call)?;

        let dir = first_root(gopath).join("src").join(module);
        if gopath.roots().iter().any(|root| root.join("src").join(module).exists()) {
            return Ok(());
        }
        for file in FAKE_MODULE_FILES {
            write_file(&dir.join(file), "v1\n");
        }
        Ok(())
    }

    async fn update(
        &self,
        gopath: &GoPath,
        module: &str,
        whole_tree: bool,
        log: &ActivityLog,
    ) -> BuildwrightResult<()> {
        let call = format!("update {} {} {}", first_root(gopath).display(), module, whole_tree);
        log.record(call.clone());
        self.calls.lock().push(call.clone());
        if *self.destroy_on_update.lock() {
            std::fs::remove_dir_all(first_root(gopath)).unwrap();
            return Err(BuildwrightError::command_exec(call, "update wiped the cache"));
        }
        fail_if(&self.failures, "update", &call)?;

        let dir = first_root(gopath).join("src").join(module);
        for file in FAKE_MODULE_FILES {
            write_file(&dir.join(file), "v2\n");
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        write_file(&dir.join(".git/objects/v2/blob"), "v2\n");
        Ok(())
    }
}

/// Version control that records the requested revision in `.git/HEAD`
#[derive(Default)]
pub struct FakeVcs {
    pub calls: Mutex<Vec<String>>,
    failures: Mutex<HashMap<&'static str, String>>,
    head: Mutex<HeadDescription>,
}

impl FakeVcs {
    /// Fail `op` ("fetch", "checkout" or "describe") whenever the call mentions `needle`
    pub fn fail(&self, op: &'static str, needle: &str) {
        self.failures.lock().insert(op, needle.to_string());
    }

    pub fn set_head(&self, head: HeadDescription) {
        *self.head.lock() = head;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl VersionControl for FakeVcs {
    async fn fetch(&self, repo: &Path, log: &ActivityLog) -> BuildwrightResult<()> {
        let call = format!("fetch {}", repo.display());
        log.record(call.clone());
        self.calls.lock().push(call.clone());
        fail_if(&self.failures, "fetch", &call)
    }

    async fn checkout(&self, repo: &Path, revision: &Revision, log: &ActivityLog) -> BuildwrightResult<()> {
        let call = format!("checkout {} {}", repo.display(), revision);
        log.record(call.clone());
        self.calls.lock().push(call.clone());
        fail_if(&self.failures, "checkout", &call)?;
        write_file(&repo.join(".git/HEAD"), &format!("{}\n", revision));
        Ok(())
    }

    async fn describe_head(&self, repo: &Path, log: &ActivityLog) -> BuildwrightResult<HeadDescription> {
        let call = format!("describe {}", repo.display());
        log.record(call.clone());
        self.calls.lock().push(call.clone());
        fail_if(&self.failures, "describe", &call)?;
        Ok(self.head.lock().clone())
    }
}

/// Compiler whose every step passes unless told otherwise.
/// `build` writes a small file at the requested output path.
#[derive(Default)]
pub struct FakeCompiler {
    pub calls: Mutex<Vec<String>>,
    failures: Mutex<HashMap<&'static str, String>>,
    platforms: Mutex<Vec<Platform>>,
    entry_snapshots: Mutex<Vec<String>>,
    watch_entry: Mutex<Option<PathBuf>>,
}

impl FakeCompiler {
    pub fn with_platforms(platforms: Vec<Platform>) -> Self {
        let compiler = Self::default();
        *compiler.platforms.lock() = platforms;
        compiler
    }

    /// Fail `op` ("vet", "test", "compile" or "build") whenever the call mentions `needle`
    pub fn fail(&self, op: &'static str, needle: &str) {
        self.failures.lock().insert(op, needle.to_string());
    }

    /// Capture the contents of `entry` every time tests run
    pub fn watch_entry(&self, entry: PathBuf) {
        *self.watch_entry.lock() = Some(entry);
    }

    /// Entry file contents seen by each test run, in order
    pub fn entry_snapshots(&self) -> Vec<String> {
        self.entry_snapshots.lock().clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn record(&self, call: String, log: &ActivityLog) {
        log.record(call.clone());
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl Compiler for FakeCompiler {
    async fn vet(&self, _gopath: &GoPath, dir: &Path, log: &ActivityLog) -> BuildwrightResult<()> {
        let call = format!("vet {}", dir.display());
        self.record(call.clone(), log);
        fail_if(&self.failures, "vet", &call)
    }

    async fn test(&self, _gopath: &GoPath, dir: &Path, log: &ActivityLog) -> BuildwrightResult<()> {
        let call = format!("test {}", dir.display());
        self.record(call.clone(), log);
        let watched = self.watch_entry.lock().clone();
        if let Some(entry) = watched {
            if let Ok(contents) = std::fs::read_to_string(entry) {
                self.entry_snapshots.lock().push(contents);
            }
        }
        fail_if(&self.failures, "test", &call)
    }

    async fn compile_check(
        &self,
        _gopath: &GoPath,
        package: &str,
        platform: &Platform,
        log: &ActivityLog,
    ) -> BuildwrightResult<()> {
        let call = format!("compile {} {}", package, platform);
        self.record(call.clone(), log);
        fail_if(&self.failures, "compile", &call)
    }

    async fn build(&self, build: &BinaryBuild, log: &ActivityLog) -> BuildwrightResult<()> {
        let call = format!("build {} {}", build.platform, build.output.display());
        self.record(call.clone(), log);
        fail_if(&self.failures, "build", &call)?;
        std::fs::write(&build.output, format!("binary for {}\n{}\n", build.platform, build.ldflags))
            .map_err(|e| BuildwrightError::io("writing fake binary", e))
    }

    async fn list_platforms(&self) -> BuildwrightResult<Vec<Platform>> {
        Ok(self.platforms.lock().clone())
    }
}

#[derive(Default)]
struct Holders {
    readers: usize,
    writers: usize,
}

/// Records lock hold intervals and counts any overlap that breaks
/// reader/writer exclusion
#[derive(Default)]
pub struct RecordingObserver {
    holders: Mutex<HashMap<PathBuf, Holders>>,
    violations: Mutex<usize>,
    max_readers: Mutex<usize>,
    events: Mutex<Vec<(PathBuf, LockMode, bool)>>,
}

impl RecordingObserver {
    pub fn violations(&self) -> usize {
        *self.violations.lock()
    }

    pub fn max_readers(&self) -> usize {
        *self.max_readers.lock()
    }

    /// Readers and writers currently holding any lock
    pub fn active(&self) -> (usize, usize) {
        self.holders
            .lock()
            .values()
            .fold((0, 0), |(r, w), h| (r + h.readers, w + h.writers))
    }

    /// `(identity, mode, acquired)` in the order they happened
    pub fn events(&self) -> Vec<(PathBuf, LockMode, bool)> {
        self.events.lock().clone()
    }
}

impl LockObserver for RecordingObserver {
    fn acquired(&self, id: &Path, mode: LockMode) {
        let mut holders = self.holders.lock();
        let h = holders.entry(id.to_path_buf()).or_default();
        match mode {
            LockMode::Shared => {
                if h.writers > 0 {
                    *self.violations.lock() += 1;
                }
                h.readers += 1;
                let mut max = self.max_readers.lock();
                *max = (*max).max(h.readers);
            }
            LockMode::Exclusive => {
                if h.writers > 0 || h.readers > 0 {
                    *self.violations.lock() += 1;
                }
                h.writers += 1;
            }
        }
        self.events.lock().push((id.to_path_buf(), mode, true));
    }

    fn released(&self, id: &Path, mode: LockMode) {
        let mut holders = self.holders.lock();
        let h = holders.entry(id.to_path_buf()).or_default();
        match mode {
            LockMode::Shared => h.readers = h.readers.saturating_sub(1),
            LockMode::Exclusive => h.writers = h.writers.saturating_sub(1),
        }
        self.events.lock().push((id.to_path_buf(), mode, false));
    }
}
