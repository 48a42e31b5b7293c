//! Integration tests for core CLI contract behavior.

use {
    predicates::prelude::*,
    std::{fs, path::Path},
    tempfile::{TempDir, tempdir},
};

const PSR800: u8 = 0xEE;
const PRO18: u8 = 0xEC;

fn cli_cmd() -> assert_cmd::Command {
    assert_cmd::cargo::cargo_bin_cmd!("grefw")
}

/// A command isolated from the user's environment and config files.
fn isolated_cmd(dir: &Path) -> assert_cmd::Command {
    let mut cmd = cli_cmd();
    cmd.current_dir(dir)
        .env("HOME", dir)
        .env("XDG_CONFIG_HOME", dir)
        .env_remove("GREFW_PORT")
        .env_remove("GREFW_BAUD")
        .env_remove("GREFW_SCANNER")
        .env_remove("GREFW_FIRMWARE")
        .env_remove("GREFW_NON_INTERACTIVE");
    cmd
}

fn write_container(dir: &TempDir, name: &str, platform: u8, image_size: usize) -> std::path::PathBuf {
    let mut file = vec![platform, 0, 0, 0];
    file.extend_from_slice(
        &u32::try_from(image_size)
            .expect("size fits")
            .to_le_bytes(),
    );
    let mut image = vec![0u8; image_size];
    image[0x10] = platform;
    file.extend(image);

    let path = dir.path().join(name);
    fs::write(&path, file).expect("write container");
    path
}

#[test]
fn help_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("grefw"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn version_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("grefw"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn help_includes_usage_examples() {
    let mut cmd = cli_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"))
        .stdout(predicate::str::contains("Examples"));
}

#[test]
fn colors_disabled_when_not_tty() {
    let mut cmd = cli_cmd();
    let output = cmd
        .arg("--help")
        .assert()
        .success()
        .get_output()
        .clone();

    let stdout = String::from_utf8(output.stdout).expect("stdout should be utf-8");
    assert!(
        !stdout.contains("\x1b["),
        "Colors should be disabled in non-TTY mode"
    );
}

// ============================================================================
// Exit Code Tests
// ============================================================================

#[test]
fn exit_code_two_for_unknown_command() {
    let mut cmd = cli_cmd();
    cmd.arg("unknown-command-xyz")
        .assert()
        .failure()
        .code(2);
}

#[test]
fn exit_code_two_for_unknown_scanner_model() {
    let mut cmd = cli_cmd();
    cmd.args(["--scanner", "bc125at", "version"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("unknown scanner"));
}

#[test]
fn exit_code_one_for_missing_firmware_file() {
    let dir = tempdir().expect("tempdir should be created");
    let nonexistent = dir.path().join("does_not_exist.bin");

    isolated_cmd(dir.path())
        .arg("info")
        .arg(&nonexistent)
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn exit_code_one_for_truncated_container() {
    let dir = tempdir().expect("tempdir should be created");
    let path = write_container(&dir, "short.bin", PSR800, 600);
    let mut data = fs::read(&path).expect("read container");
    data.truncate(300);
    fs::write(&path, data).expect("truncate container");

    isolated_cmd(dir.path())
        .args(["info", "--json"])
        .arg(&path)
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::is_empty());
}

#[test]
fn update_without_port_is_usage_error() {
    let dir = tempdir().expect("tempdir should be created");
    let fw = write_container(&dir, "psr800.bin", PSR800, 600);

    isolated_cmd(dir.path())
        .args(["-s", "psr800", "update", "--yes"])
        .arg(&fw)
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("port"));
}

#[test]
fn update_without_scanner_is_usage_error() {
    let dir = tempdir().expect("tempdir should be created");
    let fw = write_container(&dir, "psr800.bin", PSR800, 600);

    isolated_cmd(dir.path())
        .args(["-p", "INVALID_PORT_NAME_XYZ", "update", "--yes"])
        .arg(&fw)
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("scanner"));
}

#[test]
fn update_rejects_firmware_for_another_model() {
    let dir = tempdir().expect("tempdir should be created");
    let fw = write_container(&dir, "pro18.bin", PRO18, 600);

    isolated_cmd(dir.path())
        .args(["-p", "INVALID_PORT_NAME_XYZ", "-s", "psr800", "update", "--yes"])
        .arg(&fw)
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Pro-18"));
}

#[test]
fn update_rejects_unaccepted_firmware_type() {
    let dir = tempdir().expect("tempdir should be created");
    let fw = write_container(&dir, "psr800.bin", PSR800, 600);

    isolated_cmd(dir.path())
        .args([
            "-p",
            "INVALID_PORT_NAME_XYZ",
            "-s",
            "pro107",
            "--firmware-type",
            "psr800",
            "update",
            "--yes",
        ])
        .arg(&fw)
        .assert()
        .failure()
        .code(2);
}

#[test]
fn non_interactive_update_requires_yes() {
    let dir = tempdir().expect("tempdir should be created");
    let fw = write_container(&dir, "psr800.bin", PSR800, 600);

    isolated_cmd(dir.path())
        .env("GREFW_NON_INTERACTIVE", "true")
        .args(["-p", "INVALID_PORT_NAME_XYZ", "-s", "psr800", "update"])
        .arg(&fw)
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("--yes"));
}

#[test]
fn update_with_bad_port_fails() {
    let dir = tempdir().expect("tempdir should be created");
    let fw = write_container(&dir, "psr800.bin", PSR800, 600);

    isolated_cmd(dir.path())
        .args(["-p", "INVALID_PORT_NAME_XYZ", "-s", "psr800", "update", "--yes"])
        .arg(&fw)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("INVALID_PORT_NAME_XYZ"));
}

#[test]
fn scanner_settings_come_from_local_config() {
    let dir = tempdir().expect("tempdir should be created");
    let fw = write_container(&dir, "psr800.bin", PSR800, 600);
    fs::write(
        dir.path().join("grefw.toml"),
        "[scanner]\nmodel = \"pro18\"\n",
    )
    .expect("write config");

    // The configured model is a Pro-18, so a PSR-800 image is refused.
    isolated_cmd(dir.path())
        .args(["-p", "INVALID_PORT_NAME_XYZ", "update", "--yes"])
        .arg(&fw)
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("PSR-800"));
}

#[test]
fn zero_comms_timeout_is_usage_error() {
    let dir = tempdir().expect("tempdir should be created");
    fs::write(dir.path().join("grefw.toml"), "[update]\ncomms_timeout_ms = 0\n")
        .expect("write config");

    isolated_cmd(dir.path())
        .args(["-p", "INVALID_PORT_NAME_XYZ", "-s", "psr800", "power"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("[update]"));
}

#[test]
fn invalid_config_file_is_a_warning() {
    let dir = tempdir().expect("tempdir should be created");
    let fw = write_container(&dir, "psr800.bin", PSR800, 600);
    fs::write(dir.path().join("grefw.toml"), "invalid toml [[[").expect("write config");

    isolated_cmd(dir.path())
        .arg("info")
        .arg(&fw)
        .assert()
        .success()
        .stderr(predicate::str::contains("TOML").or(predicate::str::contains("parse")));
}

// ============================================================================
// stdout/stderr Separation Tests
// ============================================================================

#[test]
fn info_command_with_valid_file_writes_to_stdout() {
    let dir = tempdir().expect("tempdir should be created");
    let fw = write_container(&dir, "psr800.bin", PSR800, 600);

    isolated_cmd(dir.path())
        .arg("info")
        .arg(&fw)
        .assert()
        .success()
        .stdout(predicate::str::contains("PSR-800"))
        .stdout(predicate::str::contains("600 bytes"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn info_json_output_is_valid_json() {
    let dir = tempdir().expect("tempdir should be created");
    let fw = write_container(&dir, "psr800.bin", PSR800, 600);

    let output = isolated_cmd(dir.path())
        .args(["info", "--json"])
        .arg(&fw)
        .assert()
        .success()
        .get_output()
        .clone();

    let stdout = String::from_utf8(output.stdout).expect("stdout should be utf-8");
    let parsed: serde_json::Value = serde_json::from_str(&stdout).expect("valid JSON");
    assert_eq!(parsed["ok"], true);
    assert_eq!(parsed["data"]["image_size"], 600);
    assert_eq!(parsed["data"]["packet_count"], 3);
    assert_eq!(parsed["data"]["platform_code"], u64::from(PSR800));
    assert!(output.stderr.is_empty());
}

#[test]
fn completions_command_writes_to_stdout() {
    let mut cmd = cli_cmd();
    cmd.args(["completions", "bash"])
        .assert()
        .success()
        .stderr(predicate::str::is_empty())
        .stdout(predicate::str::contains("_grefw()"));
}

#[test]
fn option_terminator_allows_dash_prefixed_operand() {
    let dir = tempdir().expect("tempdir should be created");
    let fw = write_container(&dir, "-psr800.bin", PSR800, 300);

    isolated_cmd(dir.path())
        .args(["info", "--", "-psr800.bin"])
        .assert()
        .success()
        .stdout(predicate::str::contains("PSR-800"));
    assert!(fw.exists());
}

#[test]
fn non_interactive_environment_variable_works() {
    let mut cmd = cli_cmd();
    cmd.env("GREFW_NON_INTERACTIVE", "true")
        .arg("--version")
        .assert()
        .success();
}

#[test]
fn protocol_debug_flag_is_recognized() {
    let mut cmd = cli_cmd();
    cmd.args(["--protocol-debug", "--version"])
        .assert()
        .success();
}
