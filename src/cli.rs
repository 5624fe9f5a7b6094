use clap::{ArgGroup, Parser};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "qpak")]
#[command(version)]
#[command(about = "Build, list, export and edit Quake PAK files", long_about = None)]
#[command(group(
    ArgGroup::new("mode")
        .required(true)
        .args(["list", "import", "export", "delete"])
))]
#[command(after_help = "Examples:\n  \
  qpak -i test.pak -d /windows/ogre -p sound   import a directory tree under 'sound'\n  \
  qpak -e pak0.pak -d out                      export everything into out/\n  \
  qpak -e pak0.pak -D maps/e1m1.bsp            export a single entry\n  \
  qpak -x pak0.pak -p progs                    delete the progs directory")]
pub struct Cli {
    /// PAK file to operate on
    #[arg(value_name = "PAKFILE")]
    pub file: PathBuf,

    /// List contents of the PAK file
    #[arg(short = 'l')]
    pub list: bool,

    /// Import into the PAK file (created if missing)
    #[arg(short = 'i')]
    pub import: bool,

    /// Export from the PAK file
    #[arg(short = 'e')]
    pub export: bool,

    /// Delete from the PAK file
    #[arg(short = 'x')]
    pub delete: bool,

    /// Directory to import from or export to (default: current directory)
    #[arg(short = 'd', value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Single file to import, or entry label to export/delete
    #[arg(short = 'D', value_name = "FILE")]
    pub entry: Option<String>,

    /// Directory inside the PAK file to work on
    #[arg(short = 'p', value_name = "PAKPATH")]
    pub pak_path: Option<String>,

    /// Increase verbosity (-vv for debug output)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode, no progress messages
    #[arg(short = 'q')]
    pub quiet: bool,
}

impl Cli {
    /// Directory argument, defaulting to the current directory
    pub fn directory(&self) -> PathBuf {
        self.directory
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Path inside the archive, without leading or trailing slashes
    pub fn pak_path(&self) -> &str {
        self.pak_path
            .as_deref()
            .map(|p| p.trim_matches('/'))
            .unwrap_or("")
    }

    /// Entry label without a leading slash
    pub fn entry_label(&self) -> Option<&str> {
        self.entry.as_deref().map(|e| e.trim_start_matches('/'))
    }

    /// Default log filter for the chosen verbosity
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_a_mode() {
        assert!(Cli::try_parse_from(["qpak", "a.pak"]).is_err());
        assert!(Cli::try_parse_from(["qpak", "-l", "-x", "a.pak"]).is_err());
    }

    #[test]
    fn normalizes_paths() {
        let cli =
            Cli::try_parse_from(["qpak", "-e", "a.pak", "-p", "/sound/", "-D", "/maps/x.bsp"])
                .unwrap();
        assert!(cli.export);
        assert_eq!(cli.pak_path(), "sound");
        assert_eq!(cli.entry_label(), Some("maps/x.bsp"));
        assert_eq!(cli.directory(), PathBuf::from("."));
    }

    #[test]
    fn verbosity_maps_to_level() {
        let cli = Cli::try_parse_from(["qpak", "-l", "a.pak", "-vv"]).unwrap();
        assert_eq!(cli.log_level(), "debug");
    }
}
