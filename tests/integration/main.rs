//! Integration tests for Buildwright

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn buildwright() -> Command {
        cargo_bin_cmd!("buildwright")
    }

    /// Config pointing every directory into `dir` and the toolchain at a
    /// program that does not exist
    fn broken_toolchain_config(dir: &Path) -> PathBuf {
        let path = dir.join("config.toml");
        let root = dir.join("cache");
        let workspaces = dir.join("workspaces");
        std::fs::create_dir_all(&workspaces).unwrap();
        std::fs::write(
            &path,
            format!(
                "[cache]\nroot = {:?}\nworkspace_dir = {:?}\n\n[tools]\ngit = \"/nonexistent/git\"\ngo = \"/nonexistent/go\"\n",
                root.display().to_string(),
                workspaces.display().to_string()
            ),
        )
        .unwrap();
        path
    }

    #[test]
    fn help_displays() {
        buildwright()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("plugin-extended builds"))
            .stdout(predicate::str::contains("deploy-module"));
    }

    #[test]
    fn version_displays() {
        buildwright()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("buildwright"));
    }

    #[test]
    fn config_path_follows_flag() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bw.toml");
        buildwright()
            .args(["--config", path.to_str().unwrap(), "config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("bw.toml"));
    }

    #[test]
    fn config_path_follows_env() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("from-env.toml");
        buildwright()
            .env("BUILDWRIGHT_CONFIG", &path)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("from-env.toml"));
    }

    #[test]
    fn config_show_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.toml");
        buildwright()
            .args(["--config", path.to_str().unwrap(), "config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[host]"))
            .stdout(predicate::str::contains("github.com/mholt/caddy"))
            .stdout(predicate::str::contains("host_compatibility"));
    }

    #[test]
    fn config_init_writes_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = path.to_str().unwrap();

        buildwright()
            .args(["--config", config, "config", "init"])
            .assert()
            .success();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("[checks]"));

        buildwright()
            .args(["--config", config, "config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));
    }

    #[test]
    fn invalid_config_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[checks]\nmode = \"sometimes\"\n").unwrap();
        buildwright()
            .args(["--config", path.to_str().unwrap(), "config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn build_requires_target() {
        buildwright()
            .args(["build", "--arch", "amd64"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("--os"));
    }

    #[test]
    fn module_needs_version() {
        buildwright()
            .args(["check", "--module", "github.com/x/plugin"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("IDENTIFIER@VERSION"));
    }

    #[test]
    fn missing_toolchain_gets_hint() {
        let dir = TempDir::new().unwrap();
        let config = broken_toolchain_config(dir.path());
        buildwright()
            .args(["--config", config.to_str().unwrap(), "platforms"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Error:"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn json_failure_carries_message_and_log() {
        let dir = TempDir::new().unwrap();
        let config = broken_toolchain_config(dir.path());
        let output = dir.path().join("out");
        buildwright()
            .args([
                "--config",
                config.to_str().unwrap(),
                "build",
                "--os",
                "linux",
                "--arch",
                "amd64",
                "--output",
                output.to_str().unwrap(),
                "--format",
                "json",
            ])
            .assert()
            .failure()
            .stdout(predicate::str::contains("\"message\""))
            .stdout(predicate::str::contains("Opened environment"));

        // The request's workspace is gone
        let left = std::fs::read_dir(dir.path().join("workspaces")).unwrap().count();
        assert_eq!(left, 0);
    }
}
