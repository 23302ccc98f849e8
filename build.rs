use chrono::Utc;
use std::env;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

fn main() -> Result<(), Box<dyn Error>> {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR")?);
    let dest_path = Path::new(&env::var_os("OUT_DIR").ok_or("OUT_DIR not set")?).join("version.rs");

    let generated = format!(
        "pub const LAYOUT_VERSION: &str = \"{}\";\npub const BUILD_TIME: &str = \"{}\";\npub const GIT_HASH: &str = \"{}\";\n",
        layout_version(&manifest_dir.join("Cargo.toml"))?,
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
        git_hash().unwrap_or_else(|| "unknown".to_string()),
    );
    fs::write(&dest_path, generated)?;

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=Cargo.toml");
    println!("cargo:rerun-if-changed=.git/HEAD");
    Ok(())
}

/// `[package.metadata] layout_version`, the version stamped into new roots
fn layout_version(cargo_toml: &Path) -> Result<i64, Box<dyn Error>> {
    let manifest: toml::Table = fs::read_to_string(cargo_toml)?.parse()?;
    manifest
        .get("package")
        .and_then(|p| p.get("metadata"))
        .and_then(|m| m.get("layout_version"))
        .and_then(|v| v.as_integer())
        .ok_or_else(|| "package.metadata.layout_version missing from Cargo.toml".into())
}

fn git_hash() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout)
        .ok()
        .map(|s| s.trim().to_string())
}
