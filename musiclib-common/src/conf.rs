//! Shell-style configuration file reader/writer
//!
//! `musiclib.conf` is `source`d by the maintenance scripts, so it must stay
//! shell-valid: `KEY=value` assignments, strings quoted, numbers and
//! booleans bare. The file is hand-edited too, which is why a rewrite
//! preserves comments, blank lines, and line order verbatim, updating only
//! the assignment values and appending keys that are new since load.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Config file name shared with the script suite
pub const CONFIG_FILE_NAME: &str = "musiclib.conf";

/// Environment override for the config directory
pub const CONFIG_DIR_ENV: &str = "MUSICLIB_CONFIG_DIR";

/// One `KEY=value` line, as parsed
#[derive(Debug, PartialEq, Eq)]
struct Assignment {
    key: String,
    value: String,
    /// Raw inline-comment tail (leading whitespace included), preserved on
    /// rewrite
    comment: Option<String>,
}

/// Shell config file held in memory
///
/// Keeps both the raw line sequence (for structure-preserving saves) and
/// the parsed key/value map (for typed access).
#[derive(Debug, Default)]
pub struct ShellConfig {
    file_path: PathBuf,
    raw_lines: Vec<String>,
    values: BTreeMap<String, String>,
}

impl ShellConfig {
    /// Locate the config file, matching the script suite's loader:
    /// 1. `$MUSICLIB_CONFIG_DIR/musiclib.conf` (env override)
    /// 2. XDG config dir, `musiclib/musiclib.conf`
    /// 3. `~/musiclib/config/musiclib.conf` (legacy)
    ///
    /// When none exists, the XDG path is returned as the would-be location
    /// so a first save can create it there.
    pub fn locate_config_file() -> PathBuf {
        if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
            if !dir.is_empty() {
                let path = PathBuf::from(dir).join(CONFIG_FILE_NAME);
                if path.exists() {
                    return path;
                }
            }
        }

        let xdg_path = dirs::config_dir()
            .map(|d| d.join("musiclib").join(CONFIG_FILE_NAME))
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
        if xdg_path.exists() {
            return xdg_path;
        }

        if let Some(home) = dirs::home_dir() {
            let legacy = home.join("musiclib").join("config").join(CONFIG_FILE_NAME);
            if legacy.exists() {
                return legacy;
            }
        }

        xdg_path
    }

    /// Load from the default location, or start empty (bound to the
    /// would-be location) when no config file exists yet
    pub fn load_or_default() -> Self {
        let path = Self::locate_config_file();
        Self::load(&path).unwrap_or_else(|_| Self {
            file_path: path,
            ..Self::default()
        })
    }

    /// Load from an explicit path
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;

        let mut config = Self {
            file_path: path.to_path_buf(),
            ..Self::default()
        };
        for line in text.lines() {
            config.raw_lines.push(line.to_string());
            if let Some(a) = parse_assignment(line) {
                config.values.insert(a.key, a.value);
            }
        }
        Ok(config)
    }

    /// Path this config was loaded from (or will be saved to)
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Save back to the loaded path, preserving structure
    pub fn save(&self) -> Result<()> {
        self.save_to(&self.file_path)
    }

    /// Save to an explicit path
    ///
    /// Assignment lines are rewritten with current values (inline comments
    /// preserved); comments, blanks, and unknown lines pass through
    /// verbatim; keys new since load are appended.
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(Error::Config("no config file path set".into()));
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut written: BTreeSet<String> = BTreeSet::new();
        let mut out = String::new();

        for raw in &self.raw_lines {
            match parse_assignment(raw) {
                Some(a) if self.values.contains_key(&a.key) => {
                    let value = &self.values[&a.key];
                    out.push_str(&a.key);
                    out.push('=');
                    out.push_str(&format_value(value));
                    if let Some(comment) = &a.comment {
                        out.push_str(comment);
                    }
                    out.push('\n');
                    written.insert(a.key);
                }
                _ => {
                    out.push_str(raw);
                    out.push('\n');
                }
            }
        }

        for (key, value) in &self.values {
            if !written.contains(key) {
                out.push_str(key);
                out.push('=');
                out.push_str(&format_value(value));
                out.push('\n');
            }
        }

        fs::write(path, out)?;
        Ok(())
    }

    /// Raw value for a key, if set
    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn string(&self, key: &str, default: &str) -> String {
        self.value(key).unwrap_or(default).to_string()
    }

    pub fn set_string(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }

    pub fn integer(&self, key: &str, default: i64) -> i64 {
        self.value(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    pub fn set_integer(&mut self, key: &str, value: i64) {
        self.values.insert(key.to_string(), value.to_string());
    }

    /// Boolean under shell conventions: `true`/`1`/`yes` and
    /// `false`/`0`/`no`, case-insensitive
    pub fn boolean(&self, key: &str, default: bool) -> bool {
        match self.value(key).map(str::to_ascii_lowercase).as_deref() {
            Some("true") | Some("1") | Some("yes") => true,
            Some("false") | Some("0") | Some("no") => false,
            _ => default,
        }
    }

    pub fn set_boolean(&mut self, key: &str, value: bool) {
        self.values
            .insert(key.to_string(), if value { "true" } else { "false" }.to_string());
    }

    /// Filesystem path value, with a leading `~/` expanded to the home
    /// directory (the scripts rely on shell tilde expansion)
    pub fn path_value(&self, key: &str) -> Option<PathBuf> {
        let raw = self.value(key)?;
        if raw.is_empty() {
            return None;
        }
        if let Some(rest) = raw.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return Some(home.join(rest));
            }
        }
        Some(PathBuf::from(raw))
    }

    pub fn set_path(&mut self, key: &str, value: &Path) {
        // Stored as a plain local path, what the shell scripts expect
        self.values
            .insert(key.to_string(), value.display().to_string());
    }

    /// All parsed key/value pairs
    pub fn all_values(&self) -> &BTreeMap<String, String> {
        &self.values
    }
}

/// Quote strings; leave integers and booleans bare
fn format_value(value: &str) -> String {
    let bare = value.parse::<i64>().is_ok() || value == "true" || value == "false";
    if bare {
        value.to_string()
    } else {
        format!("\"{value}\"")
    }
}

fn is_valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parse one line as `KEY=value`, `KEY="value"`, or `KEY='value'`
///
/// Returns None for blanks, comments, and anything that is not a valid
/// shell assignment.
fn parse_assignment(line: &str) -> Option<Assignment> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }

    let eq = trimmed.find('=')?;
    let key = &trimmed[..eq];
    if !is_valid_key(key) {
        return None;
    }
    let raw_value = &trimmed[eq + 1..];

    let (value, tail) = if let Some(rest) = raw_value.strip_prefix('"') {
        match rest.find('"') {
            Some(close) => (rest[..close].to_string(), &rest[close + 1..]),
            None => (rest.to_string(), ""), // unclosed quote - take as-is
        }
    } else if let Some(rest) = raw_value.strip_prefix('\'') {
        match rest.find('\'') {
            Some(close) => (rest[..close].to_string(), &rest[close + 1..]),
            None => (rest.to_string(), ""),
        }
    } else {
        // Unquoted value - an inline comment starts at whitespace + '#'
        match raw_value.find(" #") {
            Some(pos) => (raw_value[..pos].trim().to_string(), &raw_value[pos..]),
            None => (raw_value.trim().to_string(), ""),
        }
    };

    let comment = if tail.trim_start().starts_with('#') {
        Some(tail.to_string())
    } else {
        None
    };

    Some(Assignment {
        key: key.to_string(),
        value,
        comment,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn parsed(line: &str) -> Assignment {
        parse_assignment(line).expect("line should parse")
    }

    #[test]
    fn test_parse_quoted_and_bare_values() {
        assert_eq!(parsed("MUSIC_REPO=\"/mnt/music\"").value, "/mnt/music");
        assert_eq!(parsed("MUSIC_REPO='/mnt/music'").value, "/mnt/music");
        assert_eq!(parsed("BACKUP_COUNT=5").value, "5");
        assert_eq!(parsed("RSGAIN_INSTALLED=true").value, "true");
    }

    #[test]
    fn test_parse_skips_comments_and_blanks() {
        assert!(parse_assignment("# a comment").is_none());
        assert!(parse_assignment("   ").is_none());
        assert!(parse_assignment("").is_none());
    }

    #[test]
    fn test_parse_rejects_invalid_keys() {
        assert!(parse_assignment("3BAD=1").is_none());
        assert!(parse_assignment("BAD-KEY=1").is_none());
        assert!(parse_assignment("no equals sign here").is_none());
    }

    #[test]
    fn test_parse_inline_comment_after_unquoted_value() {
        let a = parsed("BACKUP_COUNT=5 # keep five backups");
        assert_eq!(a.value, "5");
        assert_eq!(a.comment.as_deref(), Some(" # keep five backups"));
    }

    #[test]
    fn test_parse_inline_comment_after_quoted_value() {
        let a = parsed("MUSIC_REPO=\"/mnt/music\"  # library root");
        assert_eq!(a.value, "/mnt/music");
        assert_eq!(a.comment.as_deref(), Some("  # library root"));
    }

    #[test]
    fn test_parse_unclosed_quote_taken_as_is() {
        assert_eq!(parsed("X=\"half open").value, "half open");
    }

    #[test]
    fn test_format_value_quoting_rules() {
        assert_eq!(format_value("/mnt/music"), "\"/mnt/music\"");
        assert_eq!(format_value("5"), "5");
        assert_eq!(format_value("-12"), "-12");
        assert_eq!(format_value("true"), "true");
        assert_eq!(format_value("false"), "false");
        // Floats are strings as far as shell quoting is concerned
        assert_eq!(format_value("1.5"), "\"1.5\"");
    }

    #[test]
    fn test_typed_accessors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(
            &path,
            "MUSIC_REPO=\"/mnt/music\"\nBACKUP_COUNT=5\nRSGAIN_INSTALLED=yes\nDRY=0\n",
        )
        .unwrap();

        let config = ShellConfig::load(&path).unwrap();
        assert_eq!(config.string("MUSIC_REPO", ""), "/mnt/music");
        assert_eq!(config.integer("BACKUP_COUNT", 0), 5);
        assert_eq!(config.integer("MISSING", 7), 7);
        assert!(config.boolean("RSGAIN_INSTALLED", false));
        assert!(!config.boolean("DRY", true));
        assert!(config.boolean("MISSING", true));
        assert_eq!(
            config.path_value("MUSIC_REPO").unwrap(),
            PathBuf::from("/mnt/music")
        );
        assert!(config.path_value("MISSING").is_none());
    }

    #[test]
    fn test_round_trip_preserves_structure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let original = "\
# MusicLib configuration
# Generated by musiclib_init_config.sh

MUSIC_REPO=\"/mnt/music\"  # library root
BACKUP_COUNT=5

# Mobile sync
AUDACIOUS_PLAYLISTS_DIR=\"/home/user/.config/audacious/playlists\"
";
        fs::write(&path, original).unwrap();

        let mut config = ShellConfig::load(&path).unwrap();
        config.set_integer("BACKUP_COUNT", 9);
        config.save().unwrap();

        let rewritten = fs::read_to_string(&path).unwrap();
        assert_eq!(
            rewritten,
            "\
# MusicLib configuration
# Generated by musiclib_init_config.sh

MUSIC_REPO=\"/mnt/music\"  # library root
BACKUP_COUNT=9

# Mobile sync
AUDACIOUS_PLAYLISTS_DIR=\"/home/user/.config/audacious/playlists\"
"
        );
    }

    #[test]
    fn test_new_keys_appended_on_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "MUSIC_REPO=\"/mnt/music\"\n").unwrap();

        let mut config = ShellConfig::load(&path).unwrap();
        config.set_boolean("RSGAIN_INSTALLED", true);
        config.set_string("NEW_DOWNLOAD_DIR", "/mnt/incoming");
        config.save().unwrap();

        let rewritten = fs::read_to_string(&path).unwrap();
        assert_eq!(
            rewritten,
            "MUSIC_REPO=\"/mnt/music\"\nNEW_DOWNLOAD_DIR=\"/mnt/incoming\"\nRSGAIN_INSTALLED=true\n"
        );
    }

    #[test]
    fn test_save_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deep").join(CONFIG_FILE_NAME);

        let mut config = ShellConfig::default();
        config.set_string("MUSIC_REPO", "/mnt/music");
        config.save_to(&path).unwrap();

        assert!(path.exists());
    }

    #[test]
    #[serial]
    fn test_locate_honors_env_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "MUSIC_REPO=\"/mnt/music\"\n").unwrap();

        std::env::set_var(CONFIG_DIR_ENV, dir.path());
        let located = ShellConfig::locate_config_file();
        std::env::remove_var(CONFIG_DIR_ENV);

        assert_eq!(located, path);
    }

    #[test]
    #[serial]
    fn test_locate_ignores_env_override_when_file_missing() {
        let dir = tempfile::tempdir().unwrap(); // empty - no conf inside

        std::env::set_var(CONFIG_DIR_ENV, dir.path());
        let located = ShellConfig::locate_config_file();
        std::env::remove_var(CONFIG_DIR_ENV);

        assert_ne!(located, dir.path().join(CONFIG_FILE_NAME));
    }
}
