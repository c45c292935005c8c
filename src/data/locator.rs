//! Root resolution and on-disk stream enumeration.
//!
//! Every path below a root follows
//! `<root>/<category>/<group>/<name>/<layout>/<mode>/…`; journal files are
//! named `<dest-hex8>.<page-id>.journal`.

use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::data::location::Location;
use crate::error::Result;
use crate::types::{Category, Layout, Mode};

/// Environment variable overriding the default root for every mode
const ENV_HOME: &str = "KF_HOME";

fn mode_env_and_subdir(mode: Mode) -> (&'static str, &'static str) {
    match mode {
        Mode::Live => ("KF_RUNTIME_DIR", "runtime"),
        Mode::Backtest => ("KF_BACKTEST_DIR", "backtest"),
        Mode::Data => ("KF_DATASET_DIR", "dataset"),
        Mode::Replay => ("KF_REPLAY_DIR", "replay"),
    }
}

fn default_root() -> PathBuf {
    if let Ok(home) = env::var(ENV_HOME) {
        return PathBuf::from(home);
    }

    #[cfg(target_os = "windows")]
    let base = PathBuf::from(env::var("APPDATA").unwrap_or_else(|_| ".".to_string()));

    #[cfg(target_os = "macos")]
    let base = PathBuf::from(env::var("HOME").unwrap_or_else(|_| ".".to_string()))
        .join("Library")
        .join("Application Support");

    #[cfg(all(unix, not(target_os = "macos")))]
    let base = PathBuf::from(env::var("HOME").unwrap_or_else(|_| ".".to_string())).join(".config");

    base.join("kungfu").join("home")
}

/// Root path plus path-resolution policy for a collection of journals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    root: PathBuf,
    dir_mode: Mode,
}

impl Locator {
    /// Locator over the live runtime root.
    pub fn new() -> Locator {
        Locator::with_mode(Mode::Live, &[])
    }

    /// Locator over the root of `mode`: the per-mode environment variable
    /// when set, else the platform default plus `<mode-subdir>/<tags…>`.
    pub fn with_mode(mode: Mode, tags: &[&str]) -> Locator {
        let (env_name, subdir) = mode_env_and_subdir(mode);
        let root = match env::var(env_name) {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => {
                let mut root = default_root().join(subdir);
                for tag in tags {
                    root.push(tag);
                }
                root
            }
        };
        Locator {
            root,
            dir_mode: mode,
        }
    }

    /// Locator pinned to an explicit root.
    pub fn with_root(root: impl Into<PathBuf>) -> Locator {
        Locator {
            root: root.into(),
            dir_mode: Mode::Live,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding `layout` data of `location`; created if absent.
    pub fn layout_dir(&self, location: &Location, layout: Layout) -> Result<PathBuf> {
        let dir = self
            .root
            .join(location.category.name())
            .join(&location.group)
            .join(&location.name)
            .join(layout.name())
            .join(location.mode.name());
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
            tracing::debug!("created layout dir {}", dir.display());
        }
        Ok(dir)
    }

    /// `<layout_dir>/<name>.<extension>` for `layout`.
    pub fn layout_file(&self, location: &Location, layout: Layout, name: &str) -> Result<PathBuf> {
        Ok(self
            .layout_dir(location, layout)?
            .join(format!("{}.{}", name, layout.extension())))
    }

    /// Page ids present for `(location, dest_id)`, ascending.
    pub fn list_page_id(&self, location: &Location, dest_id: u32) -> Result<Vec<u32>> {
        let dir = self.layout_dir(location, Layout::Journal)?;
        let stem = format!("{:08x}", dest_id);
        let mut result = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            if let Some(name) = file_name.to_str() {
                if let Some((dest, page_id)) = parse_journal_file_name(name) {
                    if dest == stem {
                        result.push(page_id);
                    }
                }
            }
        }
        result.sort_unstable();
        Ok(result)
    }

    /// Destination ids with at least one journal file under `location`,
    /// ascending.
    pub fn list_location_dest(&self, location: &Location) -> Result<Vec<u32>> {
        let dir = self.layout_dir(location, Layout::Journal)?;
        let mut set = BTreeSet::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            if let Some(name) = file_name.to_str() {
                if let Some((dest, _)) = parse_journal_file_name(name) {
                    if let Ok(dest_id) = u32::from_str_radix(dest, 16) {
                        set.insert(dest_id);
                    }
                }
            }
        }
        Ok(set.into_iter().collect())
    }

    /// Locations reconstructed from the directory tree. Each of the four
    /// patterns is matched against one path component; `"*"` matches any
    /// component (for category and mode, any component naming a known
    /// category/mode). Order follows filesystem traversal.
    pub fn list_locations(
        &self,
        category: &str,
        group: &str,
        name: &str,
        mode: &str,
    ) -> Result<Vec<Arc<Location>>> {
        let mut result = Vec::new();
        if !self.root.is_dir() {
            return Ok(result);
        }
        // reconstructed locations share one locator equal to this one
        let locator = Arc::new(self.clone());
        for (category_name, category_dir) in subdirs(&self.root)? {
            let parsed_category = match Category::from_name(&category_name) {
                Some(c) if component_matches(category, &category_name) => c,
                _ => continue,
            };
            for (group_name, group_dir) in subdirs(&category_dir)? {
                if !component_matches(group, &group_name) {
                    continue;
                }
                for (location_name, location_dir) in subdirs(&group_dir)? {
                    if !component_matches(name, &location_name) {
                        continue;
                    }
                    let journal_dir = location_dir.join(Layout::Journal.name());
                    if !journal_dir.is_dir() {
                        continue;
                    }
                    for (mode_name, _) in subdirs(&journal_dir)? {
                        let parsed_mode = match Mode::from_name(&mode_name) {
                            Some(m) if component_matches(mode, &mode_name) => m,
                            _ => continue,
                        };
                        result.push(Location::new(
                            parsed_mode,
                            parsed_category,
                            group_name.clone(),
                            location_name.clone(),
                            Arc::clone(&locator),
                        ));
                    }
                }
            }
        }
        Ok(result)
    }
}

impl Default for Locator {
    fn default() -> Self {
        Self::new()
    }
}

fn component_matches(pattern: &str, value: &str) -> bool {
    pattern == "*" || pattern == value
}

/// Split `<dest-hex8>.<page-id>.journal`; returns (hex stem, page id).
fn parse_journal_file_name(name: &str) -> Option<(&str, u32)> {
    let rest = name.strip_suffix(".journal")?;
    let (dest, page_id) = rest.split_once('.')?;
    if dest.len() != 8 || !dest.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let page_id = page_id.parse::<u32>().ok()?;
    Some((dest, page_id))
}

fn subdirs(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                out.push((name.to_string(), entry.path()));
            }
        }
    }
    Ok(out)
}
