//! Conflict choice from flags or an interactive prompt.

use clap::ValueEnum;
use sbhub_sandbox::{ConflictChoice, ConflictResolver, FixedChoice};
use std::io::{self, BufRead, Write};
use std::path::Path;

/// `--on-conflict` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConflictArg {
    /// Prompt on the terminal
    Ask,
    /// Reuse the existing data
    Attach,
    /// Move the existing data aside and start empty
    Rename,
    /// Abort without changes
    Cancel,
}

impl ConflictArg {
    pub fn resolver(self) -> Box<dyn ConflictResolver> {
        match self {
            Self::Ask => Box::new(StdinPrompt),
            Self::Attach => Box::new(FixedChoice(ConflictChoice::Attach)),
            Self::Rename => Box::new(FixedChoice(ConflictChoice::Rename)),
            Self::Cancel => Box::new(FixedChoice(ConflictChoice::Cancel)),
        }
    }
}

/// Asks on stdin. End of input or a read error cancels.
pub struct StdinPrompt;

impl ConflictResolver for StdinPrompt {
    fn resolve(&self, name: &str, path: &Path) -> ConflictChoice {
        println!("Data for '{}' already exists at {}", name, path.display());
        print!("[A]ttach existing data, [R]ename it aside, or [C]ancel? [a/r/C] ");
        if io::stdout().flush().is_err() {
            return ConflictChoice::Cancel;
        }

        let mut input = String::new();
        match io::stdin().lock().read_line(&mut input) {
            Ok(0) | Err(_) => ConflictChoice::Cancel,
            Ok(_) => parse_choice(&input),
        }
    }
}

/// Map an answer to a choice; anything unrecognized cancels.
pub fn parse_choice(input: &str) -> ConflictChoice {
    match input.trim().to_lowercase().as_str() {
        "a" | "attach" => ConflictChoice::Attach,
        "r" | "rename" => ConflictChoice::Rename,
        _ => ConflictChoice::Cancel,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_choice() {
        assert_eq!(parse_choice("a\n"), ConflictChoice::Attach);
        assert_eq!(parse_choice(" Rename "), ConflictChoice::Rename);
        assert_eq!(parse_choice("\n"), ConflictChoice::Cancel);
        assert_eq!(parse_choice("yes"), ConflictChoice::Cancel);
    }

    #[test]
    fn test_fixed_resolvers() {
        let path = Path::new("/tmp/web");
        assert_eq!(
            ConflictArg::Rename.resolver().resolve("web", path),
            ConflictChoice::Rename
        );
        assert_eq!(
            ConflictArg::Cancel.resolver().resolve("web", path),
            ConflictChoice::Cancel
        );
    }
}
