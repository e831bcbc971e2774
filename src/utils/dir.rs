use std::{env, io, path::PathBuf};

use anyhow::{Context, Result};

const APPLICATION_DIR_NAME: &str = "tabtally";

pub fn create_application_default_path() -> Result<PathBuf> {
    let path = {
        #[cfg(windows)]
        {
            let mut path = PathBuf::from(
                env::var("APPDATA").context("APPDATA should be present on Windows")?,
            );
            path.push(APPLICATION_DIR_NAME);
            path
        }
        #[cfg(not(windows))]
        {
            let mut path = env::var("XDG_STATE_HOME")
                .map(PathBuf::from)
                .or_else(|_| {
                    env::var("HOME").map(|home| {
                        let mut path = PathBuf::from(home);
                        path.push(".local/state");
                        path
                    })
                })
                .context("Couldn't find neither XDG_STATE_HOME nor HOME")?;
            path.push(APPLICATION_DIR_NAME);
            path
        }
    };

    create_dir(path)
}

/// Uses the explicitly passed directory if there is one, otherwise falls back to
/// [create_application_default_path].
pub fn resolve_application_path(dir: Option<PathBuf>) -> Result<PathBuf> {
    match dir {
        Some(dir) => create_dir(dir),
        None => create_application_default_path(),
    }
}

fn create_dir(path: PathBuf) -> Result<PathBuf> {
    match std::fs::create_dir_all(&path) {
        Ok(_) => Ok(path),
        Err(v) if v.kind() == io::ErrorKind::AlreadyExists => Ok(path),
        Err(v) => Err(v.into()),
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use tempfile::tempdir;

    use super::resolve_application_path;

    #[test]
    fn test_explicit_dir_is_created() -> Result<()> {
        let root = tempdir()?;
        let nested = root.path().join("a").join("b");

        let resolved = resolve_application_path(Some(nested.clone()))?;

        assert_eq!(resolved, nested);
        assert!(nested.is_dir());
        Ok(())
    }
}
