use std::path::Path;

/// Returns the last extension of `path` as a lowercase, dot-prefixed key.
///
/// Compound extensions only contribute their final part: `archive.tar.gz`
/// yields `.gz`. Dotfiles such as `.bashrc` have no extension.
pub fn extension_key(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
}

/// Name shown for a path in listings; roots have no file name and show in full.
pub fn display_name(path: &Path) -> String {
    match path.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => path.display().to_string(),
    }
}

pub trait PathExt {
    fn extension_key(&self) -> Option<String>;
    fn display_name(&self) -> String;
}

impl PathExt for Path {
    fn extension_key(&self) -> Option<String> {
        extension_key(self)
    }

    fn display_name(&self) -> String {
        display_name(self)
    }
}
