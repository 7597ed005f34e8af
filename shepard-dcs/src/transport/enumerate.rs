//! Candidate port enumeration.
//!
//! Only Unix-like hosts are enumerated. There the native port listing is
//! preferred, and when it is empty the device directory is scanned for files
//! matching a glob pattern. Windows and macOS yield nothing; ports on those
//! hosts have to be named in `serial.ports`. The caller decides whether an
//! empty list is fatal.

use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::CandidateAddress;
use crate::error::{Error, Result};
use crate::tracing::prelude::*;

/// Something that can list the platform's serial ports.
pub trait PortLister {
    fn list_ports(&self) -> Result<Vec<String>>;
}

impl PortLister for Vec<String> {
    fn list_ports(&self) -> Result<Vec<String>> {
        Ok(self.clone())
    }
}

/// Platform family, resolved once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Linux and the BSDs: device files under `/dev`.
    Unix,
    MacOs,
    Windows,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    pub fn from_os(os: &str) -> Self {
        match os {
            "linux" | "freebsd" | "openbsd" | "netbsd" | "dragonfly" => Platform::Unix,
            "macos" => Platform::MacOs,
            "windows" => Platform::Windows,
            _ => Platform::Other,
        }
    }

    fn is_enumerable(self) -> bool {
        matches!(self, Platform::Unix)
    }
}

/// A directory plus glob-style file name pattern, e.g. `/dev` + `tty*`.
#[derive(Debug, Clone)]
pub struct DeviceFilePattern {
    dir: PathBuf,
    name: Regex,
}

impl DeviceFilePattern {
    /// Build a pattern. `glob` supports `*` and `?`; everything else is
    /// literal.
    pub fn new(dir: impl Into<PathBuf>, glob: &str) -> Result<Self> {
        let mut re = String::with_capacity(glob.len() + 8);
        re.push('^');
        for c in glob.chars() {
            match c {
                '*' => re.push_str(".*"),
                '?' => re.push('.'),
                c => re.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
            }
        }
        re.push('$');

        let name = Regex::new(&re)
            .map_err(|e| Error::Config(format!("bad scan pattern {glob:?}: {e}")))?;
        Ok(Self {
            dir: dir.into(),
            name,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn matches(&self, file_name: &str) -> bool {
        self.name.is_match(file_name)
    }

    /// Matching paths in the directory, sorted. An unreadable directory
    /// yields nothing.
    pub fn scan(&self) -> Vec<String> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "Cannot scan device directory.");
                return Vec::new();
            }
        };

        let mut found: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_str().is_some_and(|n| self.matches(n)))
            .filter_map(|entry| entry.path().to_str().map(str::to_owned))
            .collect();
        found.sort();
        found
    }
}

/// Produce the ordered, deduplicated list of addresses to probe.
///
/// Never fails: an unavailable listing facility is logged and treated as an
/// empty list.
pub fn enumerate_candidates(
    platform: Platform,
    lister: &impl PortLister,
    fallback: &DeviceFilePattern,
) -> Vec<CandidateAddress> {
    if !platform.is_enumerable() {
        info!(?platform, "Port enumeration not supported on this platform.");
        return Vec::new();
    }

    let native = lister.list_ports().unwrap_or_else(|e| {
        warn!(error = %e, "Native port listing unavailable.");
        Vec::new()
    });

    let ports = if !native.is_empty() {
        debug!(count = native.len(), "Using native port listing.");
        native
    } else {
        debug!(dir = %fallback.dir().display(), "Native listing empty, scanning device files.");
        fallback.scan()
    };

    dedup_in_order(ports)
}

fn dedup_in_order(ports: Vec<String>) -> Vec<CandidateAddress> {
    let mut seen = HashSet::new();
    ports
        .into_iter()
        .filter(|p| seen.insert(p.clone()))
        .map(CandidateAddress::from)
        .collect()
}
