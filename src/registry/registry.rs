use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::agent::error::EngineError;
use crate::snapshot::snapshot_model::{ElementRef, InteractiveElement};

/// Registry record for one element of the current snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub role: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub name_is_pattern: bool,
    /// Index among elements sharing `(role, name)`, in document order.
    pub nth: usize,
    pub version: u64,
}

impl RegistryEntry {
    /// `role name`, as fed to the safety gate and action signatures.
    pub fn describe(&self) -> String {
        if self.name.is_empty() {
            self.role.clone()
        } else {
            format!("{} {}", self.role, self.name)
        }
    }
}

/// What the page collaborator needs to re-locate an element lazily.
///
/// `name` is omitted for unlabelled elements: `{role, nth}` then addresses the
/// nth element of that role whose accessible name is empty. With `pattern`
/// set, `name` is a regular expression rather than the exact name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatorDescriptor {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub pattern: bool,
    pub nth: usize,
}

impl LocatorDescriptor {
    pub fn matches(&self, role: &str, name: &str) -> bool {
        self.role == role
            && match &self.name {
                Some(n) => n == name,
                None => name.is_empty(),
            }
    }
}

/// Versioned element registry for a single page.
///
/// Each page needs its own registry; refs never outlive the version they
/// were issued from.
#[derive(Debug, Default)]
pub struct ElementRegistry {
    entries: BTreeMap<usize, RegistryEntry>,
    version: u64,
    /// Every index below this was issued under some version.
    high_water: usize,
}

impl ElementRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_version(&self) -> u64 {
        self.version
    }

    /// Invalidate every previously issued ref.
    pub fn bump_version(&mut self) -> u64 {
        self.version += 1;
        debug!(version = self.version, "registry version bumped");
        self.version
    }

    /// Assign refs `elem-0..` in the order given, with `nth` per `(role, name)`.
    ///
    /// Replaces whatever the previous registration held.
    pub fn register(&mut self, elements: &[InteractiveElement]) -> BTreeMap<ElementRef, RegistryEntry> {
        let mut seen: HashMap<(&str, &str, bool), usize> = HashMap::new();
        self.entries.clear();

        for (i, el) in elements.iter().enumerate() {
            let counter = seen
                .entry((el.role.as_str(), el.name.as_str(), el.name_is_pattern))
                .or_insert(0);
            self.entries.insert(
                i,
                RegistryEntry {
                    role: el.role.clone(),
                    name: el.name.clone(),
                    name_is_pattern: el.name_is_pattern,
                    nth: *counter,
                    version: self.version,
                },
            );
            *counter += 1;
        }

        self.high_water = self.high_water.max(elements.len());
        debug!(
            version = self.version,
            count = elements.len(),
            "registered interactive elements"
        );

        self.entries
            .iter()
            .map(|(i, entry)| (ElementRef::pinned(*i, self.version), entry.clone()))
            .collect()
    }

    /// Entry for a ref, validated against the current version.
    pub fn entry(&self, element_ref: &ElementRef) -> Result<&RegistryEntry, EngineError> {
        if element_ref.index >= self.high_water {
            return Err(EngineError::UnknownRef(element_ref.to_string()));
        }

        let stale = |issued: u64| EngineError::StaleElement {
            element_ref: element_ref.to_string(),
            issued,
            current: self.version,
        };

        if let Some(pinned) = element_ref.version {
            if pinned != self.version {
                return Err(stale(pinned));
            }
        }

        match self.entries.get(&element_ref.index) {
            Some(entry) if entry.version == self.version => Ok(entry),
            Some(entry) => Err(stale(entry.version)),
            // Issued under an older, longer snapshot.
            None => Err(stale(element_ref.version.unwrap_or(self.version.saturating_sub(1)))),
        }
    }

    pub fn resolve(&self, element_ref: &ElementRef) -> Result<LocatorDescriptor, EngineError> {
        let entry = self.entry(element_ref)?;
        Ok(LocatorDescriptor {
            role: entry.role.clone(),
            name: (!entry.name.is_empty()).then(|| entry.name.clone()),
            pattern: entry.name_is_pattern && !entry.name.is_empty(),
            nth: entry.nth,
        })
    }

    /// Description of the element last registered under this index,
    /// regardless of staleness. Used for action signatures and reports.
    pub fn describe(&self, element_ref: &ElementRef) -> Option<String> {
        self.entries.get(&element_ref.index).map(RegistryEntry::describe)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
