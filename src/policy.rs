use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::fs;
use std::path::Path;
use once_cell::sync::Lazy;

// Compiled-in defaults; replaceable at startup with --policy-dir.
const DEFAULT_CATEGORIES: &str = include_str!("../policy/categories.toml");
const DEFAULT_ALIASES: &str = include_str!("../policy/aliases.toml");
const DEFAULT_EXCEPTIONS: &str = include_str!("../policy/exceptions.toml");

static DEFAULT_TABLE: Lazy<PolicyTable> = Lazy::new(|| {
    PolicyTable::from_toml(DEFAULT_CATEGORIES, DEFAULT_ALIASES, DEFAULT_EXCEPTIONS)
        .expect("built-in policy tables must parse")
});

/// Policy bucket determining a license's default compliance disposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LicenseCategory {
    /// Category A: compatible outright.
    Approved,
    /// Category B: compatible only when the project documents its use.
    Conditional,
    /// Category B with extra scrutiny; same pass/fail treatment as Conditional.
    ConditionalCaveat,
    /// Category X: incompatible, no remedy short of a named special exception.
    Prohibited,
}

impl LicenseCategory {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "approved" => Some(LicenseCategory::Approved),
            "conditional" => Some(LicenseCategory::Conditional),
            "conditional-with-caveat" => Some(LicenseCategory::ConditionalCaveat),
            "prohibited" => Some(LicenseCategory::Prohibited),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LicenseCategory::Approved => "Category A",
            LicenseCategory::Conditional => "Category B",
            LicenseCategory::ConditionalCaveat => "Category B (caveat)",
            LicenseCategory::Prohibited => "Category X",
        }
    }

    /// Conditional and its caveat variant share the documentation-gated path.
    pub fn is_conditional(&self) -> bool {
        matches!(self, LicenseCategory::Conditional | LicenseCategory::ConditionalCaveat)
    }
}

impl fmt::Display for LicenseCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Static license policy: category map, alias normalization map, and the
/// special-exception allow-list. Pure lookups over configuration loaded once
/// at startup; no lookup ever fails with an error.
pub struct PolicyTable {
    // Keyed by case-folded name; value keeps the original spelling for display.
    categories: HashMap<String, (String, LicenseCategory)>,
    aliases: HashMap<String, String>,
    exceptions: Vec<String>,
}

impl PolicyTable {
    /// The compiled-in default policy.
    pub fn default_table() -> &'static PolicyTable {
        &DEFAULT_TABLE
    }

    /// Load the three policy files from a directory.
    pub fn load_dir(dir: &Path) -> Result<PolicyTable, Box<dyn Error>> {
        let categories = fs::read_to_string(dir.join("categories.toml"))?;
        let aliases = fs::read_to_string(dir.join("aliases.toml"))?;
        let exceptions = fs::read_to_string(dir.join("exceptions.toml"))?;
        PolicyTable::from_toml(&categories, &aliases, &exceptions)
    }

    pub fn from_toml(
        categories: &str,
        aliases: &str,
        exceptions: &str
    ) -> Result<PolicyTable, Box<dyn Error>> {
        let raw_categories: HashMap<String, String> = toml::from_str(categories)?;
        let raw_aliases: HashMap<String, String> = toml::from_str(aliases)?;
        let raw_exceptions: HashMap<String, bool> = toml::from_str(exceptions)?;

        let mut category_map = HashMap::new();
        for (name, tag) in raw_categories {
            let category = LicenseCategory::from_tag(&tag).ok_or_else(|| {
                format!("unknown category tag '{}' for license '{}'", tag, name)
            })?;
            category_map.insert(name.to_lowercase(), (name, category));
        }

        let alias_map = raw_aliases
            .into_iter()
            .map(|(raw, canonical)| (raw.to_lowercase(), canonical))
            .collect();

        let mut exception_list: Vec<String> = raw_exceptions
            .into_iter()
            .filter(|(_, enabled)| *enabled)
            .map(|(name, _)| name)
            .collect();
        exception_list.sort();

        Ok(PolicyTable {
            categories: category_map,
            aliases: alias_map,
            exceptions: exception_list,
        })
    }

    /// Resolve a raw license name to its canonical form. Names without an
    /// alias entry come back trimmed but otherwise untouched.
    pub fn normalize(&self, license: &str) -> String {
        let trimmed = license.trim();
        match self.aliases.get(&trimmed.to_lowercase()) {
            Some(canonical) => canonical.clone(),
            None => trimmed.to_string(),
        }
    }

    /// Look up the category for a license name. Normalized lookup takes
    /// precedence, but a name the table recognizes verbatim never regresses
    /// to unknown. Absence of a match is `None`, never an error.
    pub fn category_of(&self, license: &str) -> Option<LicenseCategory> {
        let normalized = self.normalize(license);
        if let Some((_, category)) = self.categories.get(&normalized.to_lowercase()) {
            return Some(*category);
        }
        self.categories
            .get(&license.trim().to_lowercase())
            .map(|(_, category)| *category)
    }

    /// All license names in one category, in their original spelling.
    pub fn licenses_in_category(&self, category: LicenseCategory) -> Vec<&str> {
        let mut names: Vec<&str> = self.categories
            .values()
            .filter(|(_, c)| *c == category)
            .map(|(name, _)| name.as_str())
            .collect();
        names.sort();
        names
    }

    #[allow(dead_code)]
    pub fn is_special_exception(&self, dependency_name: &str) -> bool {
        self.special_exception_for(dependency_name).is_some()
    }

    /// The allow-list entry matching a dependency name (exact or prefix).
    pub fn special_exception_for(&self, dependency_name: &str) -> Option<&str> {
        self.exceptions
            .iter()
            .find(|entry| {
                dependency_name == entry.as_str() || dependency_name.starts_with(entry.as_str())
            })
            .map(|entry| entry.as_str())
    }
}

/// Weak-copyleft "Lesser" family test; the only prohibited licenses a
/// special exception can downgrade.
pub fn is_lesser_family(license: &str) -> bool {
    let lower = license.to_lowercase();
    lower.contains("lgpl") ||
        lower.contains("lesser general public") ||
        lower.contains("library general public")
}
