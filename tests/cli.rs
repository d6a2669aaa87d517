use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

fn atcwatch() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("atcwatch"));
    // Never pick up a real deployment environment from the test host
    cmd.env_remove("GITHUB_REPO")
        .env_remove("GITHUB_TOKEN")
        .env_remove("GITHUB_BRANCH")
        .env_remove("GITHUB_DIR")
        .env_remove("ALLOWED_ORIGIN");
    cmd
}

#[test]
fn version_prints_crate_version() -> Result<(), Box<dyn std::error::Error>> {
    atcwatch()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
    Ok(())
}

#[test]
fn tick_without_repo_fails_fast() -> Result<(), Box<dyn std::error::Error>> {
    atcwatch()
        .arg("tick")
        .env("GITHUB_TOKEN", "tok")
        .assert()
        .failure()
        .stderr(predicate::str::contains("GITHUB_REPO"));
    Ok(())
}

#[test]
fn tick_without_token_fails_fast() -> Result<(), Box<dyn std::error::Error>> {
    atcwatch()
        .arg("tick")
        .env("GITHUB_REPO", "vatpac/roster-store")
        .assert()
        .failure()
        .stderr(predicate::str::contains("GITHUB_TOKEN"));
    Ok(())
}

#[test]
fn serve_with_malformed_repo_fails_fast() -> Result<(), Box<dyn std::error::Error>> {
    atcwatch()
        .arg("serve")
        .env("GITHUB_REPO", "not-owner-slash-name")
        .env("GITHUB_TOKEN", "tok")
        .assert()
        .failure()
        .stderr(predicate::str::contains("owner/name"));
    Ok(())
}

#[test]
fn unknown_subcommand_rejected() -> Result<(), Box<dyn std::error::Error>> {
    atcwatch().arg("frobnicate").assert().failure();
    Ok(())
}
