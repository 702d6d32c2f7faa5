use anyhow::Result;
use std::path::{Path, PathBuf};

/// Install directory used by `autodroid` for bundled tools (`~/.autodroid`)
pub fn install_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".autodroid"))
}

/// Locate a tool binary.
///
/// Lookup order: explicit override, `AUTODROID_<NAME>` environment variable,
/// the install directory, then the system `PATH`.
pub fn find_binary(name: &str, override_path: Option<&Path>) -> Result<PathBuf> {
    let mut checked_paths = Vec::new();

    if let Some(path) = override_path {
        checked_paths.push(format!("Override: {:?}", path));
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        // A bare program name given as override is looked up on PATH below
        if let Ok(found) = which::which(path) {
            return Ok(found);
        }
    }

    let env_key = format!("AUTODROID_{}", name.to_uppercase());
    if let Ok(value) = std::env::var(&env_key) {
        let path = PathBuf::from(value);
        checked_paths.push(format!("{}: {:?}", env_key, path));
        if path.exists() {
            return Ok(path);
        }
    }

    if let Some(dir) = install_dir() {
        for candidate in install_candidates(&dir, name) {
            checked_paths.push(format!("Install Dir: {:?}", candidate));
            if candidate.exists() {
                return Ok(candidate);
            }
        }
    }

    if let Ok(path) = which::which(exe_name(name)) {
        return Ok(path);
    }
    checked_paths.push(format!("PATH: {}", exe_name(name)));

    Err(anyhow::anyhow!(
        "Could not find binary '{}'. Checked paths:\n{}",
        name,
        checked_paths.join("\n")
    ))
}

fn exe_name(name: &str) -> String {
    if cfg!(windows) {
        format!("{}.exe", name)
    } else {
        name.to_string()
    }
}

fn install_candidates(dir: &Path, name: &str) -> Vec<PathBuf> {
    let exe = exe_name(name);
    match name {
        "adb" => vec![dir.join("platform-tools").join(&exe), dir.join(&exe)],
        _ => vec![dir.join("bin").join(&exe), dir.join(&exe)],
    }
}

/// Find the ADB binary
pub fn find_adb(override_path: Option<&Path>) -> Result<PathBuf> {
    find_binary("adb", override_path)
}

/// Find the frida CLI binary
pub fn find_frida(override_path: Option<&Path>) -> Result<PathBuf> {
    find_binary("frida", override_path)
}
