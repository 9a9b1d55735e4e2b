use anyhow::Result;
use assert_cmd::Command;
use serde_json::Value;
use tempfile::tempdir;

fn linkup() -> Result<Command> {
    let mut cmd = Command::cargo_bin("linkup")?;
    cmd.env_remove("DATABASE_URL").env("LINKUP_LOG", "off");
    Ok(cmd)
}

#[test]
fn help_lists_subcommands() -> Result<()> {
    let output = linkup()?.arg("--help").output()?;
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.contains("serve"), "{stdout}");
    assert!(stdout.contains("db"), "{stdout}");
    Ok(())
}

#[test]
fn db_migrate_then_status_json() -> Result<()> {
    let tmp = tempdir()?;
    let url = format!("sqlite://{}", tmp.path().join("cli.sqlite3").display());

    let output = linkup()?.env("DATABASE_URL", &url).args(["db", "migrate"]).output()?;
    assert!(
        output.status.success(),
        "stdout: {}\nstderr: {}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(String::from_utf8(output.stdout)?.trim(), "Applied 2 migration(s).");

    let output = linkup()?
        .args(["db", "migrate", "--database-url", &url])
        .output()?;
    assert!(output.status.success());
    assert_eq!(String::from_utf8(output.stdout)?.trim(), "Applied 0 migration(s).");

    let output = linkup()?
        .env("DATABASE_URL", &url)
        .args(["db", "status", "--json"])
        .output()?;
    assert!(output.status.success());
    let report: Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(report["applied"].as_array().map(Vec::len), Some(2));
    assert_eq!(report["applied"][0]["version"], "202510010900_initial.sql");
    assert!(report["pending"].as_array().is_some_and(Vec::is_empty));
    Ok(())
}

#[test]
fn status_on_a_fresh_database_lists_pending() -> Result<()> {
    let tmp = tempdir()?;
    let url = format!("sqlite://{}", tmp.path().join("fresh.sqlite3").display());

    let output = linkup()?.env("DATABASE_URL", &url).args(["db", "status"]).output()?;
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.contains("202510021200_commerce.sql"), "{stdout}");
    assert!(stdout.contains("pending"), "{stdout}");
    Ok(())
}

#[test]
fn bad_configuration_exits_non_zero() -> Result<()> {
    let output = linkup()?
        .env("PORT", "not-a-port")
        .args(["db", "status"])
        .output()?;
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr)?;
    assert!(stderr.contains("PORT"), "{stderr}");
    Ok(())
}
