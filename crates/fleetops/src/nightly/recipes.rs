use regex::Regex;
use std::collections::BTreeSet;

const DOWNLOADED_MARKER: &str = "The following new items were downloaded";
const BUILT_MARKER: &str = "The following packages were built";
const FAILED_MARKER: &str = "The following recipes failed";

/// One recipe per line; blank lines and `#` comments are ignored and
/// duplicates are dropped keeping the first occurrence.
pub fn parse_recipe_list(raw: &str) -> Vec<String> {
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    let mut out = vec![];
    for line in raw.lines() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() || !seen.insert(line) {
            continue;
        }
        out.push(line.to_string());
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass {
    Noise,
    Error,
    Keep,
}

#[derive(Debug)]
pub struct LineFilter {
    noise: Vec<Regex>,
    errors: Vec<Regex>,
}

impl LineFilter {
    pub fn new(noise: &[String], errors: &[String]) -> Result<Self, regex::Error> {
        Ok(Self {
            noise: noise.iter().map(|p| Regex::new(p)).collect::<Result<_, _>>()?,
            errors: errors.iter().map(|p| Regex::new(p)).collect::<Result<_, _>>()?,
        })
    }

    /// Error patterns win over noise patterns.
    pub fn classify(&self, line: &str) -> LineClass {
        if self.errors.iter().any(|re| re.is_match(line)) {
            LineClass::Error
        } else if self.noise.iter().any(|re| re.is_match(line)) {
            LineClass::Noise
        } else {
            LineClass::Keep
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputMarkers {
    pub downloaded: bool,
    pub built: bool,
    pub failed: bool,
}

pub fn scan_markers(output: &str) -> OutputMarkers {
    let mut markers = OutputMarkers::default();
    for line in output.lines() {
        let line = line.trim_start();
        if line.starts_with(DOWNLOADED_MARKER) {
            markers.downloaded = true;
        } else if line.starts_with(BUILT_MARKER) {
            markers.built = true;
        } else if line.starts_with(FAILED_MARKER) {
            markers.failed = true;
        }
    }
    markers
}
