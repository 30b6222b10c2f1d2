use std::path::PathBuf;

use crate::cli::{Cli, Command};
use crate::filesystem::default_roots;

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub state_path: PathBuf,
    pub roots: Vec<PathBuf>,
    pub command: Command,
}

impl From<Cli> for RuntimeConfig {
    fn from(cli: Cli) -> Self {
        let roots = if cli.roots.is_empty() {
            default_roots()
        } else {
            cli.roots
        };
        Self {
            state_path: cli.state,
            roots,
            command: cli.command,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn roots_default_to_filesystem_roots() {
        let cli = Cli::try_parse_from(["mergeback", "types"]).expect("valid arguments");
        let config = RuntimeConfig::from(cli);
        assert_eq!(config.roots, default_roots());
    }

    #[test]
    fn explicit_roots_replace_defaults() {
        let cli = Cli::try_parse_from(["mergeback", "--root", "/a", "--root", "/b", "types"])
            .expect("valid arguments");
        let config = RuntimeConfig::from(cli);
        assert_eq!(config.roots, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
    }
}
