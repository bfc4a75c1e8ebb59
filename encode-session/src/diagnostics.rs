//! Decision statistics gathered while the engine runs (similar to a codec's
//! internal logging tables).

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// Transform-block split decisions.
pub const TB_SPLIT: &str = "tb-split";
/// Intra / predicted picture counts and scene cuts.
pub const FRAME_TYPES: &str = "frame-types";
/// Look-ahead window usage.
pub const LOOKAHEAD: &str = "lookahead";

/// Named counters grouped by section, owned by one session.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    sections: BTreeMap<String, BTreeMap<String, u64>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, section: &str, name: &str, n: u64) {
        let value = self
            .sections
            .entry(section.to_string())
            .or_default()
            .entry(name.to_string())
            .or_insert(0);
        *value = value.saturating_add(n);
    }

    pub fn increment(&mut self, section: &str, name: &str) {
        self.add(section, name, 1);
    }

    /// Keeps the largest value ever recorded for `name`.
    pub fn record_max(&mut self, section: &str, name: &str, value: u64) {
        let slot = self
            .sections
            .entry(section.to_string())
            .or_default()
            .entry(name.to_string())
            .or_insert(0);
        *slot = (*slot).max(value);
    }

    pub fn counter(&self, section: &str, name: &str) -> u64 {
        self.sections
            .get(section)
            .and_then(|s| s.get(name))
            .copied()
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Snapshot of one section, or of every section when `section` is `None`.
    /// Unknown sections yield an empty report.
    pub fn report(&self, section: Option<&str>) -> Report {
        let sections = self
            .sections
            .iter()
            .filter(|(name, _)| section.is_none_or(|wanted| wanted == name.as_str()))
            .map(|(name, counters)| SectionReport {
                name: name.clone(),
                counters: counters.clone(),
            })
            .collect();
        Report { sections }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SectionReport {
    pub name: String,
    pub counters: BTreeMap<String, u64>,
}

/// Read-only statistics snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Report {
    pub sections: Vec<SectionReport>,
}

impl Report {
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn section(&self, name: &str) -> Option<&SectionReport> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Pretty JSON; an unserializable report degrades to an empty string.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for s in &self.sections {
            let tag = s.name.to_uppercase();
            writeln!(f, "[{}]", tag)?;
            for (name, value) in &s.counters {
                writeln!(f, "{}={}", name, value)?;
            }
            if s.name == TB_SPLIT {
                let split = s.counters.get("split").copied().unwrap_or(0);
                let total = split + s.counters.get("no-split").copied().unwrap_or(0);
                if total > 0 {
                    writeln!(f, "split_ratio={:.3}", split as f64 / total as f64)?;
                }
            }
            writeln!(f, "[/{}]", tag)?;
        }
        Ok(())
    }
}
