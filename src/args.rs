use std::path::PathBuf;

use clap::{Parser, Subcommand};
use hdlrun_config::{AltPathScope, ConfigSnapshot};

#[derive(Debug, Parser)]
#[command(name = "hdlrun")]
#[command(about = "Compile and simulate Verilog sources with Icarus Verilog")]
#[command(version)]
pub struct Cli {
    /// Configuration file (defaults to the nearest hdlrun.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Type the commands into an interactive shell instead of following them
    #[arg(long, global = true)]
    pub terminal: bool,

    /// Extra flags appended to every compile command
    #[arg(long, global = true, value_name = "FLAGS", allow_hyphen_values = true)]
    pub flags: Option<String>,

    /// Alternate toolchain location: an executable or the directory holding it
    #[arg(long, global = true, value_name = "PATH")]
    pub alt_path: Option<String>,

    /// Where the alternate path applies: none, single, bulk or all
    #[arg(long, global = true, value_name = "SCOPE")]
    pub alt_path_scope: Option<String>,

    /// Extension of the compiled artifact
    #[arg(long, global = true, value_name = "EXT")]
    pub out_ext: Option<String>,

    /// Keep previous output instead of clearing it
    #[arg(long, global = true)]
    pub no_clear: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Compile a source file and run the simulation
    Run {
        /// Verilog source to compile and simulate
        file: PathBuf,
    },
    /// Compile every supported source in a directory
    CompileAll {
        /// Directory to scan (non-recursive)
        #[arg(default_value = ".")]
        dir: PathBuf,
    },
    /// Print the resolved configuration as TOML
    Config,
}

impl Cli {
    /// Apply command-line overrides on top of the file configuration.
    pub fn apply_overrides(&self, config: &mut ConfigSnapshot) {
        if self.terminal {
            config.run_in_terminal = true;
        }
        if self.no_clear {
            config.clear_previous_output = false;
        }
        if let Some(flags) = &self.flags {
            config.extra_flags.clone_from(flags);
        }
        if let Some(alt_path) = &self.alt_path {
            config.alt_path.clone_from(alt_path);
        }
        if let Some(scope) = &self.alt_path_scope {
            config.alt_path_scope = AltPathScope::from(scope.as_str());
        }
        if let Some(ext) = &self.out_ext {
            config.output_extension.clone_from(ext);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn overrides_replace_file_values() {
        let cli = Cli::parse_from([
            "hdlrun",
            "--flags",
            "-g2012 -Wall",
            "--alt-path-scope",
            "single",
            "--no-clear",
            "run",
            "top.v",
        ]);
        let mut config = ConfigSnapshot::default();
        cli.apply_overrides(&mut config);

        assert_eq!(config.extra_flags, "-g2012 -Wall");
        assert_eq!(config.alt_path_scope, AltPathScope::SingleCompile);
        assert!(!config.clear_previous_output);
        assert!(!config.run_in_terminal);
    }

    #[test]
    fn compile_all_defaults_to_current_directory() {
        let cli = Cli::parse_from(["hdlrun", "compile-all"]);
        match cli.command {
            Commands::CompileAll { dir } => assert_eq!(dir, PathBuf::from(".")),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
