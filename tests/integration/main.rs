//! Integration tests for flagcache

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::Path;
    use tempfile::TempDir;

    /// Command isolated from the user's config and store
    fn flagcache(dir: &Path) -> Command {
        let mut cmd = cargo_bin_cmd!("flagcache");
        cmd.env("FLAGCACHE_CONFIG", dir.join("config.toml"))
            .env("FLAGCACHE_STORE", dir.join("store"));
        cmd
    }

    fn seed_store(dir: &Path, record: serde_json::Value) {
        let store = dir.join("store");
        std::fs::create_dir_all(&store).unwrap();
        std::fs::write(
            store.join("flag_asset_cache.json"),
            serde_json::to_string(&record).unwrap(),
        )
        .unwrap();
    }

    #[test]
    fn help_displays() {
        let dir = TempDir::new().unwrap();
        flagcache(dir.path())
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("persistent asset cache"));
    }

    #[test]
    fn version_displays() {
        let dir = TempDir::new().unwrap();
        flagcache(dir.path())
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("flagcache"));
    }

    #[test]
    fn config_path() {
        let dir = TempDir::new().unwrap();
        flagcache(dir.path())
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let dir = TempDir::new().unwrap();
        flagcache(dir.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[cache]"))
            .stdout(predicate::str::contains("ttl_days = 14"));
    }

    #[test]
    fn config_init_writes_defaults_once() {
        let dir = TempDir::new().unwrap();
        flagcache(dir.path())
            .args(["config", "init"])
            .assert()
            .success();
        assert!(dir.path().join("config.toml").exists());

        flagcache(dir.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stderr(predicate::str::contains("already exists"));
    }

    #[test]
    fn invalid_config_reports_hint() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("config.toml"), "[cache]\nttl_days = \"soon\"\n").unwrap();

        flagcache(dir.path())
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn render_plain_text() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("notes.txt");
        std::fs::write(&input, "hello & welcome\nsecond line\n").unwrap();

        flagcache(dir.path())
            .arg("render")
            .arg(&input)
            .assert()
            .success()
            .stdout(predicate::str::contains("<p>hello &amp; welcome</p><p>second line</p>"))
            .stdout(predicate::str::contains("img.fc-flag, img.P-fc-flag"));
    }

    #[test]
    fn render_to_output_file() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("notes.txt");
        let output = dir.path().join("notes.html");
        std::fs::write(&input, "no flags here\n").unwrap();

        flagcache(dir.path())
            .arg("render")
            .arg(&input)
            .arg("--output")
            .arg(&output)
            .assert()
            .success();

        let html = std::fs::read_to_string(output).unwrap();
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<p>no flags here</p>"));
    }

    #[test]
    fn render_uses_persisted_assets() {
        let dir = TempDir::new().unwrap();
        seed_store(
            dir.path(),
            serde_json::json!({
                "1f1e6-1f1fa": {
                    "data": "data:image/svg+xml;base64,PHN2Zy8+",
                    "timestamp": chrono::Utc::now().timestamp_millis(),
                }
            }),
        );
        let input = dir.path().join("notes.txt");
        std::fs::write(&input, "G'day 🇦🇺\n").unwrap();

        flagcache(dir.path())
            .arg("render")
            .arg(&input)
            .assert()
            .success()
            .stdout(predicate::str::contains("class=\"P-fc-flag\""))
            .stdout(predicate::str::contains("src=\"data:image/svg+xml;base64,PHN2Zy8+\""));
    }

    #[test]
    fn render_missing_file() {
        let dir = TempDir::new().unwrap();
        flagcache(dir.path())
            .args(["render", "does-not-exist.txt"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Path not found"));
    }

    #[test]
    fn cache_list_empty() {
        let dir = TempDir::new().unwrap();
        flagcache(dir.path())
            .args(["cache", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No cached assets found."));
    }

    #[test]
    fn cache_list_json() {
        let dir = TempDir::new().unwrap();
        seed_store(
            dir.path(),
            serde_json::json!({
                "1f1ef-1f1f5": {
                    "data": "data:image/svg+xml;base64,PHN2Zy8+",
                    "timestamp": chrono::Utc::now().timestamp_millis(),
                }
            }),
        );

        flagcache(dir.path())
            .args(["cache", "list", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"key\": \"1f1ef-1f1f5\""));
    }

    #[test]
    fn cache_prune_drops_expired() {
        let dir = TempDir::new().unwrap();
        seed_store(
            dir.path(),
            serde_json::json!({
                "1f1ef-1f1f5": {
                    "data": "data:image/svg+xml;base64,PHN2Zy8+",
                    "timestamp": chrono::Utc::now().timestamp_millis(),
                },
                "1f1e6-1f1fa": {
                    "data": "data:image/svg+xml;base64,PHN2Zy8+",
                    "timestamp": 0,
                }
            }),
        );

        flagcache(dir.path())
            .args(["cache", "prune"])
            .assert()
            .success()
            .stdout(predicate::str::contains("1 fresh asset(s) kept"));

        let record =
            std::fs::read_to_string(dir.path().join("store").join("flag_asset_cache.json")).unwrap();
        assert!(record.contains("1f1ef-1f1f5"));
        assert!(!record.contains("1f1e6-1f1fa"));
    }
}
