use crate::ConvertError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const INSTALL_DIR_NAME: &str = "ComfyUI";
pub const EMBEDDED_ROOT_NAME: &str = "python_embeded";
pub const SCRATCH_SUBDIR: &str = "temp";

const INTERPRETER_CANDIDATES: [&str; 3] = ["python.exe", "bin/python3", "bin/python"];
const MAX_PARENT_SEARCH: usize = 4;

/// Paths derived from the target runtime's launch path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetEnvironment {
    pub base_dir: PathBuf,
    pub install_dir: PathBuf,
    pub interpreter_path: Option<PathBuf>,
    pub embedded_root: Option<PathBuf>,
}

/// Resolves a launch path (a launcher script or the install directory) to
/// the target environment. A blank path yields `None`.
pub fn resolve_target_environment(launch_path: &str) -> Option<TargetEnvironment> {
    let launch_path = launch_path.trim();
    if launch_path.is_empty() {
        return None;
    }

    let absolute = absolutize(Path::new(launch_path));
    let base_dir = if absolute.is_dir() {
        absolute
    } else {
        absolute
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or(absolute)
    };

    let nested_install = base_dir.join(INSTALL_DIR_NAME);
    let install_dir = if nested_install.exists() {
        nested_install
    } else {
        base_dir.clone()
    };

    let (interpreter_path, embedded_root) = match find_embedded_interpreter(&base_dir) {
        Some((interpreter, root)) => (Some(interpreter), Some(root)),
        None => (None, None),
    };

    Some(TargetEnvironment {
        base_dir,
        install_dir,
        interpreter_path,
        embedded_root,
    })
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

fn find_embedded_interpreter(base_dir: &Path) -> Option<(PathBuf, PathBuf)> {
    base_dir
        .ancestors()
        .take(MAX_PARENT_SEARCH)
        .find_map(|dir| {
            let root = dir.join(EMBEDDED_ROOT_NAME);
            INTERPRETER_CANDIDATES
                .iter()
                .map(|candidate| root.join(candidate))
                .find(|interpreter| interpreter.is_file())
                .map(|interpreter| (interpreter, root.clone()))
        })
}

/// Ensures `<root>/temp` exists and returns it.
pub fn provision_scratch_dir(root: &Path) -> Result<PathBuf, ConvertError> {
    let dir = root.join(SCRATCH_SUBDIR);
    fs::create_dir_all(&dir).map_err(|error| {
        ConvertError::io(
            format!("failed to create scratch directory '{}'", dir.display()),
            error,
        )
    })?;
    Ok(dir)
}
