//! Platform paths.
//!
//! The data directory holds the `kv` worker's store file. It is resolved from
//! the environment in this order:
//!
//! 1. `$THREADLET_DATA_DIR`
//! 2. `$XDG_DATA_HOME/threadlet`
//! 3. `~/.local/share/threadlet`
//! 4. `./.threadlet` when no home directory is known

use std::path::PathBuf;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "THREADLET_DATA_DIR";

/// Returns the default data directory.
#[must_use]
pub fn data_dir() -> PathBuf {
    resolve_data_dir(|name| std::env::var_os(name).filter(|value| !value.is_empty()).map(PathBuf::from))
}

fn resolve_data_dir(var: impl Fn(&str) -> Option<PathBuf>) -> PathBuf {
    if let Some(dir) = var(DATA_DIR_ENV) {
        return dir;
    }
    if let Some(xdg) = var("XDG_DATA_HOME") {
        return xdg.join("threadlet");
    }
    var("HOME").map_or_else(
        || PathBuf::from(".threadlet"),
        |home| home.join(".local").join("share").join("threadlet"),
    )
}

/// Expands a leading `~` to the user's home directory.
///
/// Paths without a leading tilde, or any path when `$HOME` is unset, are
/// returned unchanged.
///
/// # Examples
///
/// ```
/// use threadlet::infrastructure::expand_tilde;
///
/// assert_eq!(expand_tilde("/absolute/path"), std::path::PathBuf::from("/absolute/path"));
/// ```
#[must_use]
pub fn expand_tilde(path: &str) -> PathBuf {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    match (path, home) {
        ("~", Some(home)) => home,
        (path, Some(home)) if path.starts_with("~/") => home.join(&path[2..]),
        (path, _) => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn resolve(vars: &[(&str, &str)]) -> PathBuf {
        let vars: HashMap<String, PathBuf> =
            vars.iter().map(|(k, v)| ((*k).to_string(), PathBuf::from(v))).collect();
        resolve_data_dir(|name| vars.get(name).cloned())
    }

    #[test]
    fn explicit_override_wins() {
        let dir = resolve(&[(DATA_DIR_ENV, "/srv/threadlet"), ("XDG_DATA_HOME", "/xdg"), ("HOME", "/home/u")]);
        assert_eq!(dir, PathBuf::from("/srv/threadlet"));
    }

    #[test]
    fn falls_back_through_xdg_and_home() {
        assert_eq!(resolve(&[("XDG_DATA_HOME", "/xdg"), ("HOME", "/home/u")]), PathBuf::from("/xdg/threadlet"));
        assert_eq!(resolve(&[("HOME", "/home/u")]), PathBuf::from("/home/u/.local/share/threadlet"));
        assert_eq!(resolve(&[]), PathBuf::from(".threadlet"));
    }
}
