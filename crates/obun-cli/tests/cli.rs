use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn obun() -> Command {
    Command::cargo_bin("obun").unwrap()
}

fn write(dir: &Path, name: &str, text: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, text).unwrap();
}

#[test]
fn test_directory_input_builds_index() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "index.obun",
        "0o ---\nartifact-name: app.py\n--- o0\nimport sys\n#:section lib/util.obun\nmain()\n",
    );
    write(tmp.path(), "lib/util.obun", "def main():\n    print('hi')\n");

    obun()
        .arg(tmp.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("Build complete!"));

    let artifact = fs::read_to_string(tmp.path().join("app.py")).unwrap();
    assert_eq!(artifact, "import sys\ndef main():\n    print('hi')\nmain()\n");
}

#[test]
fn test_defines_select_branches() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "index.obun",
        "#:if DEBUG\nlevel = 'debug'\n#:else\nlevel = 'info'\n#:endif\n",
    );

    obun().arg(tmp.path()).assert().success();
    assert_eq!(
        fs::read_to_string(tmp.path().join("dist.py")).unwrap(),
        "level = 'info'\n"
    );

    obun().arg(tmp.path()).args(["-D", "DEBUG"]).assert().success();
    assert_eq!(
        fs::read_to_string(tmp.path().join("dist.py")).unwrap(),
        "level = 'debug'\n"
    );
}

#[test]
fn test_output_override_and_shebang() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "main.obun",
        "0o ---\nshebang: /usr/bin/env python3\nartifact-name: ignored.py\nbuild-mode: prod\n--- o0\nprint(1)\n",
    );

    obun()
        .arg(tmp.path().join("main.obun"))
        .args(["-o", "out.py"])
        .assert()
        .success();

    assert!(!tmp.path().join("ignored.py").exists());
    let artifact = fs::read_to_string(tmp.path().join("out.py")).unwrap();
    assert_eq!(artifact.lines().next(), Some("#!/usr/bin/env python3"));

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(tmp.path().join("out.py"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o111, 0o111);
    }
}

#[test]
fn test_json_report() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "index.obun", "#:section a.obun\n");
    write(tmp.path(), "a.obun", "a = 1\n");

    let out = obun()
        .arg(tmp.path())
        .args(["--format", "json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let report: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(report["mode"], "prod");
    assert_eq!(report["fragments"].as_object().unwrap().len(), 2);
}

#[test]
fn test_cycle_fails_with_chain() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "index.obun", "#:section a.obun\n");
    write(tmp.path(), "a.obun", "#:section b.obun\n");
    write(tmp.path(), "b.obun", "#:section a.obun\n");

    obun()
        .arg(tmp.path())
        .assert()
        .code(65)
        .stderr(predicate::str::contains("Cyclic inclusion"))
        .stderr(predicate::str::contains("b.obun"));
}

#[test]
fn test_unmatched_endif_reports_location() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "index.obun", "x = 1\n#:endif\n");

    obun()
        .arg(tmp.path())
        .assert()
        .code(65)
        .stderr(predicate::str::contains("index.obun:2"));
}

#[test]
fn test_missing_entry() {
    let tmp = TempDir::new().unwrap();
    obun()
        .arg(tmp.path())
        .assert()
        .code(66)
        .stderr(predicate::str::contains("index.obun"));
}

#[test]
fn test_bad_build_mode_in_manifest() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "index.obun", "0o ---\nbuild-mode: fast\n--- o0\n");

    obun()
        .arg(tmp.path())
        .assert()
        .code(78)
        .stderr(predicate::str::contains("fast"));
}

#[cfg(unix)]
#[test]
fn test_run_mode_propagates_exit_code() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "index.obun",
        "0o ---\nshebang: /bin/sh\nartifact-name: app.sh\n--- o0\necho from-artifact\nexit 3\n",
    );

    obun()
        .arg(tmp.path())
        .args(["-B", "run"])
        .assert()
        .code(3)
        .stdout(predicate::str::contains("from-artifact"));
    assert!(tmp.path().join("app.sh").exists());
}
