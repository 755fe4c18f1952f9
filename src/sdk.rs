//! `unref sdk`: inspect and edit the toolchain settings in `.unref.toml`.

use std::path::{Path, PathBuf};

use crate::config::{CONFIG_FILE, Config};
use crate::error;
use crate::syntax::{ToolLocator as _, go_executable};

// ── CLI commands ──────────────────────────────────────────────────────

/// Set the toolchain home, either the default or the one of a module.
///
/// # Errors
///
/// Returns `Error::ParseFailed` if the config can't be parsed,
/// or `Error::Io` if writing fails.
pub fn cmd_set(path: &str, module: Option<&str>) -> Result<(), error::Error> {
    let root = PathBuf::from(".");
    match module {
        None => {
            set_default_in_config(&root, path)?;
            println!("Default toolchain: {path}");
        },
        Some(module_root) => {
            set_module_in_config(&root, module_root, path)?;
            println!("Toolchain for {module_root}: {path}");
        },
    }
    return Ok(());
}

/// Print the toolchain serving `file`, or the whole toolchain table.
///
/// # Errors
///
/// Returns errors from config loading.
pub fn cmd_show(file: Option<&Path>) -> Result<(), error::Error> {
    let root = PathBuf::from(".");
    let config = Config::load(&root)?;

    if let Some(file) = file {
        match config.tool_home(file) {
            None => println!("{}: no toolchain", file.display()),
            Some(home) => println!("{}: {}", file.display(), go_executable(&home).display()),
        }
        return Ok(());
    }

    match config.sdk() {
        None => println!("default -> (none)"),
        Some(sdk) => println!("default -> {}", sdk.display()),
    }
    let mut modules: Vec<_> = config.modules().iter().collect();
    modules.sort_by(|a, b| return a.root.cmp(&b.root));
    for module in modules {
        match &module.sdk {
            None => println!("{} -> (none)", module.root.display()),
            Some(sdk) => println!("{} -> {}", module.root.display(), sdk.display()),
        }
    }
    return Ok(());
}

// ── Config file editing ───────────────────────────────────────────────

/// Parse `.unref.toml` into a format-preserving document.
/// Returns an empty document if the file doesn't exist.
///
/// # Errors
///
/// Returns `Error::Io` on read failure or `Error::ParseFailed` on parse failure.
fn read_config_doc(root: &Path) -> Result<(PathBuf, toml_edit::DocumentMut), error::Error> {
    let config_path = root.join(CONFIG_FILE);
    let content = match std::fs::read_to_string(&config_path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(error::Error::Io(e)),
        Ok(c) => c,
    };

    let doc: toml_edit::DocumentMut = content.parse().map_err(|e: toml_edit::TomlError| {
        return error::Error::ParseFailed {
            file: config_path.clone(),
            reason: e.to_string(),
        };
    })?;

    return Ok((config_path, doc));
}

/// Set the top-level `sdk` key.
///
/// # Errors
///
/// Returns `Error::ParseFailed` if the config can't be parsed,
/// or `Error::Io` if writing fails.
fn set_default_in_config(root: &Path, sdk: &str) -> Result<(), error::Error> {
    let (config_path, mut doc) = read_config_doc(root)?;
    doc["sdk"] = toml_edit::value(sdk);
    std::fs::write(&config_path, doc.to_string())?;
    return Ok(());
}

/// Set `sdk` on the `[[module]]` entry with the given root, adding the entry
/// if there is none yet.
///
/// # Errors
///
/// Returns `Error::ParseFailed` if the config can't be parsed or `module` is
/// not an array of tables, or `Error::Io` if writing fails.
fn set_module_in_config(root: &Path, module_root: &str, sdk: &str) -> Result<(), error::Error> {
    let (config_path, mut doc) = read_config_doc(root)?;

    if !doc.contains_key("module") {
        doc["module"] = toml_edit::Item::ArrayOfTables(toml_edit::ArrayOfTables::new());
    }
    let modules = doc
        .get_mut("module")
        .and_then(toml_edit::Item::as_array_of_tables_mut)
        .ok_or_else(|| {
            return error::Error::ParseFailed {
                file: config_path.clone(),
                reason: "`module` must be an array of tables ([[module]])".to_string(),
            };
        })?;

    let existing = modules
        .iter_mut()
        .find(|t| return t.get("root").and_then(toml_edit::Item::as_str) == Some(module_root));
    match existing {
        None => {
            let mut table = toml_edit::Table::new();
            table["root"] = toml_edit::value(module_root);
            table["sdk"] = toml_edit::value(sdk);
            modules.push(table);
        },
        Some(table) => table["sdk"] = toml_edit::value(sdk),
    }

    std::fs::write(&config_path, doc.to_string())?;
    return Ok(());
}
