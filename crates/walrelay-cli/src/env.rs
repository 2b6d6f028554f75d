use std::path::PathBuf;

use anyhow::{Context, Result};

/// Load the closest .env file, searching from the current directory up to
/// the filesystem root. Returns the loaded path, or `None` if there is none.
pub fn load_dotenv_from_ancestors() -> Result<Option<PathBuf>> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;

    for dir in cwd.ancestors() {
        let env_path = dir.join(".env");
        if env_path.is_file() {
            dotenvy::from_path(&env_path)
                .with_context(|| format!("Failed to load .env from {}", env_path.display()))?;
            return Ok(Some(env_path));
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    #[serial]
    fn test_load_dotenv_from_parent_directory() {
        let parent_dir = TempDir::new().unwrap();
        let child_dir = parent_dir.path().join("subdir");
        fs::create_dir(&child_dir).unwrap();
        fs::write(parent_dir.path().join(".env"), "WALRELAY_TEST_PARENT=world").unwrap();

        let original_dir = std::env::current_dir().unwrap();
        std::env::set_current_dir(&child_dir).unwrap();
        std::env::remove_var("WALRELAY_TEST_PARENT");

        let loaded = load_dotenv_from_ancestors().unwrap();
        assert!(loaded.is_some());
        assert_eq!(std::env::var("WALRELAY_TEST_PARENT").unwrap(), "world");

        std::env::set_current_dir(original_dir).unwrap();
        std::env::remove_var("WALRELAY_TEST_PARENT");
    }

    #[test]
    #[serial]
    fn test_load_dotenv_prefers_closest_env_file() {
        let parent_dir = TempDir::new().unwrap();
        let child_dir = parent_dir.path().join("subdir");
        fs::create_dir(&child_dir).unwrap();
        fs::write(parent_dir.path().join(".env"), "WALRELAY_TEST_CLOSEST=parent").unwrap();
        fs::write(child_dir.join(".env"), "WALRELAY_TEST_CLOSEST=child").unwrap();

        let original_dir = std::env::current_dir().unwrap();
        std::env::set_current_dir(&child_dir).unwrap();
        std::env::remove_var("WALRELAY_TEST_CLOSEST");

        load_dotenv_from_ancestors().unwrap();
        assert_eq!(std::env::var("WALRELAY_TEST_CLOSEST").unwrap(), "child");

        std::env::set_current_dir(original_dir).unwrap();
        std::env::remove_var("WALRELAY_TEST_CLOSEST");
    }
}
