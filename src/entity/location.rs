//! Local/remote path classification and the per-host directory layout

use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

/// Where a source's files live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// A path on this machine
    Local { path: String },
    /// `[user@]host:path` as understood by rsync
    Remote {
        user: Option<String>,
        host: String,
        path: String,
    },
}

fn remote_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?:(?P<user>[^@:/\s]+)@)?(?P<host>[^@:/\s]+):(?P<path>.*)$")
            .expect("remote path pattern is valid")
    })
}

impl Location {
    /// Classify a source path. A host part never contains `/`, so
    /// `./odd:name` stays local.
    pub fn parse(raw: &str) -> Self {
        match remote_pattern().captures(raw) {
            Some(caps) => Location::Remote {
                user: caps.name("user").map(|m| m.as_str().to_string()),
                host: caps["host"].to_string(),
                path: caps["path"].to_string(),
            },
            None => Location::Local {
                path: raw.to_string(),
            },
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Location::Remote { .. })
    }

    /// Host directory name used under the target root
    pub fn host(&self) -> String {
        match self {
            Location::Local { .. } => local_hostname().to_string(),
            Location::Remote { host, .. } => host.clone(),
        }
    }

    /// The path part with any host prefix, leading `/` and `~/` removed
    pub fn relative_path(&self) -> PathBuf {
        let path = match self {
            Location::Local { path } => path,
            Location::Remote { path, .. } => path,
        };
        relative_component(path)
    }

    /// True when the relative path climbs out with a `..` component
    pub fn climbs_out(&self) -> bool {
        self.relative_path()
            .components()
            .any(|c| matches!(c, Component::ParentDir))
    }
}

fn relative_component(path: &str) -> PathBuf {
    let trimmed = path.strip_prefix("~").unwrap_or(path);
    PathBuf::from(trimmed.trim_start_matches('/'))
}

/// `target_root/host/<section>/<relative>`
pub fn host_section(target_root: &Path, host: &str, section: &str) -> PathBuf {
    target_root.join(host).join(section)
}

/// Hostname of this machine, read once
pub fn local_hostname() -> &'static str {
    static HOSTNAME: OnceLock<String> = OnceLock::new();
    HOSTNAME.get_or_init(|| {
        ["/etc/hostname", "/proc/sys/kernel/hostname"]
            .iter()
            .filter_map(|p| std::fs::read_to_string(p).ok())
            .map(|s| s.trim().to_string())
            .find(|s| !s.is_empty())
            .or_else(|| std::env::var("HOSTNAME").ok().filter(|s| !s.is_empty()))
            .unwrap_or_else(|| "localhost".to_string())
    })
}
