use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::syntax::ToolLocator;

/// Name of the project configuration file.
pub const CONFIG_FILE: &str = ".unref.toml";

/// Project configuration loaded from `.unref.toml`.
/// Decides which Go toolchain, if any, serves each source file.
#[derive(Debug, Default)]
pub struct Config {
    /// Modules with their own toolchain setting.
    modules: Vec<ModuleEntry>,
    /// Directory the configuration was loaded from.
    root: PathBuf,
    /// Toolchain home for files outside every module.
    sdk: Option<PathBuf>,
}

/// A module: a path prefix with its own toolchain, or explicitly none.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ModuleEntry {
    /// Path prefix relative to the project root.
    pub root: PathBuf,
    /// Toolchain home; absent means the module has no toolchain.
    #[serde(default)]
    pub sdk: Option<PathBuf>,
}

/// Raw TOML structure for `.unref.toml`.
#[derive(serde::Deserialize)]
struct UnrefTomlConfig {
    /// `[[module]]` tables.
    #[serde(default, rename = "module")]
    modules: Vec<ModuleEntry>,
    /// Default toolchain home.
    #[serde(default)]
    sdk: Option<PathBuf>,
}

impl Config {
    /// Load config from `.unref.toml` in the given root directory.
    /// Returns an empty config (no toolchain anywhere) if the file doesn't exist.
    /// Returns an error if the file exists but is malformed. Never silently
    /// falls back to defaults when the user wrote a config file.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if reading fails (other than not-found),
    /// or `Error::TomlDe` if the TOML is malformed.
    pub fn load(root: &Path) -> Result<Self, Error> {
        let path = root.join(CONFIG_FILE);
        let content = match std::fs::read_to_string(&path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self { root: root.to_path_buf(), ..Self::default() });
            },
            Err(e) => return Err(Error::Io(e)),
            Ok(c) => c,
        };
        return Self::parse(root, &content);
    }

    /// Modules in declaration order.
    pub fn modules(&self) -> &[ModuleEntry] {
        return &self.modules;
    }

    /// Parse config content as if loaded from `root`.
    ///
    /// # Errors
    ///
    /// Returns `Error::TomlDe` if the TOML is malformed.
    pub fn parse(root: &Path, content: &str) -> Result<Self, Error> {
        let raw: UnrefTomlConfig = toml::from_str(content)?;
        return Ok(Self {
            modules: raw.modules,
            root: root.to_path_buf(),
            sdk: raw.sdk,
        });
    }

    /// Toolchain home for files outside every module, as written.
    pub fn sdk(&self) -> Option<&Path> {
        return self.sdk.as_deref();
    }

    /// Module with the longest root that prefixes `file`.
    fn module_for(&self, file: &Path) -> Option<&ModuleEntry> {
        let relative = file.strip_prefix(&self.root).unwrap_or(file);
        return self
            .modules
            .iter()
            .filter(|m| return relative.starts_with(&m.root))
            .max_by_key(|m| return m.root.components().count());
    }
}

impl ToolLocator for Config {
    fn tool_home(&self, file: &Path) -> Option<PathBuf> {
        let home = match self.module_for(file) {
            None => self.sdk.as_ref(),
            Some(module) => module.sdk.as_ref(),
        }?;
        if home.is_absolute() {
            return Some(home.clone());
        }
        return Some(self.root.join(home));
    }
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc, reason = "test assertions")]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
sdk = "/usr/local/go"

[[module]]
root = "services"
sdk = "/opt/go1.21"

[[module]]
root = "services/legacy"

[[module]]
root = "tools"
sdk = "toolchains/go"
"#;

    fn config() -> Config {
        return Config::parse(Path::new("/work/project"), CONFIG).unwrap();
    }

    #[test]
    fn default_sdk_outside_modules() {
        let home = config().tool_home(Path::new("cmd/main.go"));
        assert_eq!(home, Some(PathBuf::from("/usr/local/go")));
    }

    #[test]
    fn module_sdk_wins() {
        let home = config().tool_home(Path::new("services/billing/api.go"));
        assert_eq!(home, Some(PathBuf::from("/opt/go1.21")));
    }

    #[test]
    fn longest_module_prefix_decides() {
        let home = config().tool_home(Path::new("services/legacy/old.go"));
        assert_eq!(home, None);
    }

    #[test]
    fn prefix_matches_whole_components() {
        let home = config().tool_home(Path::new("servicesx/main.go"));
        assert_eq!(home, Some(PathBuf::from("/usr/local/go")));
    }

    #[test]
    fn relative_sdk_is_anchored_at_project_root() {
        let home = config().tool_home(Path::new("/work/project/tools/gen.go"));
        assert_eq!(home, Some(PathBuf::from("/work/project/toolchains/go")));
    }

    #[test]
    fn missing_file_means_no_toolchain() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.tool_home(Path::new("main.go")), None);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "sdk = [").unwrap();
        assert!(matches!(Config::load(dir.path()), Err(Error::TomlDe(_))));
    }
}
