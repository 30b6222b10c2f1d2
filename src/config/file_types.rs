use hashlink::{LinkedHashMap, LinkedHashSet};
use serde::{Deserialize, Serialize};
use snafu::Snafu;

use crate::ext::PathExt;

type RawFileTypes = LinkedHashMap<String, Vec<String>>;

const DEFAULT_CATEGORIES: &[(&str, &[&str])] = &[
    ("Python", &[".py", ".pyi"]),
    ("Rust", &[".rs", ".toml"]),
    ("Web", &[".html", ".css", ".js", ".ts", ".tsx", ".jsx"]),
    ("C/C++", &[".c", ".h", ".cpp", ".hpp", ".cc"]),
    ("Java", &[".java", ".kt"]),
    ("Go", &[".go"]),
    ("Docs", &[".md", ".txt", ".rst"]),
    ("Config", &[".json", ".yaml", ".yml", ".ini", ".cfg"]),
    ("Shell", &[".sh", ".bash", ".zsh", ".ps1"]),
];

/// Normalizes a user supplied extension to the `.ext` form used for matching.
///
/// Returns `None` for entries that are empty after trimming.
pub fn normalize_extension(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_start_matches('*').trim_start_matches('.');
    if trimmed.is_empty() {
        return None;
    }
    Some(format!(".{}", trimmed.to_lowercase()))
}

/// Named groups of file extensions, in insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawFileTypes", into = "RawFileTypes")]
pub struct FileTypes {
    categories: LinkedHashMap<String, LinkedHashSet<String>>,
}

impl Default for FileTypes {
    fn default() -> Self {
        DEFAULT_CATEGORIES
            .iter()
            .map(|(name, extensions)| (name.to_string(), extensions.iter().copied()))
            .collect()
    }
}

impl<N, I, E> FromIterator<(N, I)> for FileTypes
where
    N: Into<String>,
    I: IntoIterator<Item = E>,
    E: AsRef<str>,
{
    fn from_iter<T: IntoIterator<Item = (N, I)>>(iter: T) -> Self {
        let mut types = FileTypes {
            categories: LinkedHashMap::new(),
        };
        for (name, extensions) in iter {
            types.add(name, extensions);
        }
        types
    }
}

impl From<RawFileTypes> for FileTypes {
    fn from(raw: RawFileTypes) -> Self {
        raw.into_iter().collect()
    }
}

impl From<FileTypes> for RawFileTypes {
    fn from(types: FileTypes) -> Self {
        types
            .categories
            .into_iter()
            .map(|(name, extensions)| (name, extensions.into_iter().collect()))
            .collect()
    }
}

impl FileTypes {
    pub fn categories(&self) -> impl Iterator<Item = (&str, &LinkedHashSet<String>)> {
        self.categories
            .iter()
            .map(|(name, extensions)| (name.as_str(), extensions))
    }

    pub fn get(&self, category: &str) -> Option<&LinkedHashSet<String>> {
        self.categories.get(category)
    }

    /// Adds extensions to a category, creating it when missing.
    pub fn add<E: AsRef<str>>(
        &mut self,
        category: impl Into<String>,
        extensions: impl IntoIterator<Item = E>,
    ) {
        let entry = self.categories.entry(category.into()).or_insert_with(LinkedHashSet::new);
        entry.extend(
            extensions
                .into_iter()
                .filter_map(|ext| normalize_extension(ext.as_ref())),
        );
    }

    pub fn remove(&mut self, category: &str) -> Option<LinkedHashSet<String>> {
        self.categories.remove(category)
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

/// Set of allowed extensions; an empty filter lets every file through.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionFilter {
    allowed: LinkedHashSet<String>,
}

impl ExtensionFilter {
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn new<E: AsRef<str>>(extensions: impl IntoIterator<Item = E>) -> Self {
        Self {
            allowed: extensions
                .into_iter()
                .filter_map(|ext| normalize_extension(ext.as_ref()))
                .collect(),
        }
    }

    /// Union of the extensions of the named categories plus extra extensions.
    pub fn from_categories<C, E>(
        types: &FileTypes,
        categories: impl IntoIterator<Item = C>,
        extra: impl IntoIterator<Item = E>,
    ) -> Result<Self, UnknownCategoryError>
    where
        C: AsRef<str>,
        E: AsRef<str>,
    {
        let mut filter = Self::new(extra);
        for category in categories {
            let category = category.as_ref();
            let extensions = types.get(category).ok_or_else(|| UnknownCategoryError {
                category: category.to_string(),
            })?;
            filter.allowed.extend(extensions.iter().cloned());
        }
        Ok(filter)
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }

    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        self.allowed.iter().map(String::as_str)
    }

    /// Tests the last extension of `path`; paths without one only pass an empty filter.
    pub fn matches(&self, path: &std::path::Path) -> bool {
        if self.allowed.is_empty() {
            return true;
        }
        path.extension_key()
            .is_some_and(|key| self.allowed.contains(&key))
    }
}

#[derive(Debug, Snafu)]
#[snafu(display("Unknown file type category '{category}'"))]
pub struct UnknownCategoryError {
    category: String,
}
