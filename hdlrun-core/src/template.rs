//! Command strings for the Icarus Verilog compiler and simulator.
//!
//! Everything here is pure string construction: nothing is spawned and the
//! file system is never consulted.

use std::path::Path;

use hdlrun_config::{AltPathScope, ConfigSnapshot};

/// Default compiler executable.
pub const COMPILER: &str = "iverilog";
/// Default simulator executable.
pub const SIMULATOR: &str = "vvp";
/// Directory (relative to the source file) that receives compiled artifacts.
pub const BUILD_DIR: &str = "build";

const KNOWN_TOOLS: [&str; 2] = [COMPILER, SIMULATOR];

/// Pick the executable for `tool`.
///
/// Without an applicable alternate path the bare tool name is returned so the
/// shell resolves it through `PATH`. An alternate path naming one of the
/// toolchain executables is used directly (or, when it names the other tool,
/// its sibling is used); anything else ending in `exe_suffix` is treated as an
/// executable, and the remaining cases are directories holding the tool.
pub fn select_executable(tool: &str, exe_suffix: &str, alt_path: Option<&str>, applies: bool) -> String {
    let Some(alt_path) = alt_path.filter(|_| applies) else {
        return tool.to_string();
    };

    let path = Path::new(alt_path);
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = strip_suffix_ignore_case(&file_name, exe_suffix);
    let executable = format!("{tool}{exe_suffix}");

    let resolved = if stem == tool {
        alt_path.to_string()
    } else if KNOWN_TOOLS.contains(&stem) {
        match path.parent() {
            Some(parent) => parent.join(&executable).display().to_string(),
            None => executable,
        }
    } else if !exe_suffix.is_empty() && stem.len() != file_name.len() {
        alt_path.to_string()
    } else {
        path.join(&executable).display().to_string()
    };

    format!("\"{resolved}\"")
}

fn strip_suffix_ignore_case<'a>(name: &'a str, suffix: &str) -> &'a str {
    if suffix.is_empty() || name.len() < suffix.len() {
        return name;
    }
    let split = name.len() - suffix.len();
    match (name.get(..split), name.get(split..)) {
        (Some(stem), Some(tail)) if tail.eq_ignore_ascii_case(suffix) => stem,
        _ => name,
    }
}

/// `<exe> -o "build/<base><out_ext>" "<base><source_ext>" <flags>`
pub fn build_compile_command(
    file_base_name: &str,
    source_ext: &str,
    out_ext: &str,
    flags: &str,
    alt_path: Option<&str>,
    scope: AltPathScope,
    bulk: bool,
) -> String {
    compile_command_with_suffix(
        file_base_name,
        source_ext,
        out_ext,
        flags,
        alt_path,
        scope,
        bulk,
        std::env::consts::EXE_SUFFIX,
    )
}

#[allow(clippy::too_many_arguments)]
fn compile_command_with_suffix(
    file_base_name: &str,
    source_ext: &str,
    out_ext: &str,
    flags: &str,
    alt_path: Option<&str>,
    scope: AltPathScope,
    bulk: bool,
    exe_suffix: &str,
) -> String {
    let exe = select_executable(COMPILER, exe_suffix, alt_path, scope.applies_to_compile(bulk));
    let mut command = format!(
        "{exe} -o \"{BUILD_DIR}/{file_base_name}{out_ext}\" \"{file_base_name}{source_ext}\""
    );
    let flags = flags.trim();
    if !flags.is_empty() {
        command.push(' ');
        command.push_str(flags);
    }
    command
}

/// `<exe> "<base><out_ext>"`, executed from inside the build directory.
pub fn build_run_command(
    file_base_name: &str,
    out_ext: &str,
    alt_path: Option<&str>,
    scope: AltPathScope,
) -> String {
    run_command_with_suffix(file_base_name, out_ext, alt_path, scope, std::env::consts::EXE_SUFFIX)
}

fn run_command_with_suffix(
    file_base_name: &str,
    out_ext: &str,
    alt_path: Option<&str>,
    scope: AltPathScope,
    exe_suffix: &str,
) -> String {
    let exe = select_executable(SIMULATOR, exe_suffix, alt_path, scope.applies_to_run());
    format!("{exe} \"{file_base_name}{out_ext}\"")
}

/// Command builder bound to one configuration snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    alt_path: Option<String>,
    scope: AltPathScope,
    output_extension: String,
    flags: String,
    exe_suffix: String,
}

impl CommandTemplate {
    pub fn new(config: &ConfigSnapshot) -> Self {
        Self {
            alt_path: config.alt_path().map(str::to_string),
            scope: config.alt_path_scope,
            output_extension: config.output_extension.clone(),
            flags: config.extra_flags.clone(),
            exe_suffix: std::env::consts::EXE_SUFFIX.to_string(),
        }
    }

    /// Override the platform executable suffix (`.exe` on Windows).
    pub fn with_exe_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.exe_suffix = suffix.into();
        self
    }

    pub fn output_extension(&self) -> &str {
        &self.output_extension
    }

    pub fn compile_command(&self, file_base_name: &str, source_ext: &str, bulk: bool) -> String {
        compile_command_with_suffix(
            file_base_name,
            source_ext,
            &self.output_extension,
            &self.flags,
            self.alt_path.as_deref(),
            self.scope,
            bulk,
            &self.exe_suffix,
        )
    }

    pub fn run_command(&self, file_base_name: &str) -> String {
        run_command_with_suffix(
            file_base_name,
            &self.output_extension,
            self.alt_path.as_deref(),
            self.scope,
            &self.exe_suffix,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn template(alt_path: &str, scope: AltPathScope, suffix: &str) -> CommandTemplate {
        let config = ConfigSnapshot {
            alt_path: alt_path.to_string(),
            alt_path_scope: scope,
            extra_flags: "-g2012".to_string(),
            ..ConfigSnapshot::default()
        };
        CommandTemplate::new(&config).with_exe_suffix(suffix)
    }

    #[test]
    fn compile_command_matches_documented_shape() {
        let command =
            build_compile_command("top", ".v", ".out", "-g2012", None, AltPathScope::None, false);
        assert_eq!(command, "iverilog -o \"build/top.out\" \"top.v\" -g2012");
    }

    #[test]
    fn run_command_matches_documented_shape() {
        let command = build_run_command("top", ".out", None, AltPathScope::None);
        assert_eq!(command, "vvp \"top.out\"");
    }

    #[test]
    fn empty_flags_leave_no_trailing_space() {
        let command = build_compile_command("alu", ".sv", ".out", "", None, AltPathScope::None, true);
        assert_eq!(command, "iverilog -o \"build/alu.out\" \"alu.sv\"");
    }

    #[test]
    fn single_compile_scope_only_affects_single_compiles() {
        let template = template("/opt/icarus/bin", AltPathScope::SingleCompile, "");

        assert_eq!(
            template.compile_command("top", ".v", false),
            "\"/opt/icarus/bin/iverilog\" -o \"build/top.out\" \"top.v\" -g2012"
        );
        assert_eq!(
            template.compile_command("top", ".v", true),
            "iverilog -o \"build/top.out\" \"top.v\" -g2012"
        );
        assert_eq!(template.run_command("top"), "vvp \"top.out\"");
    }

    #[test]
    fn bulk_scope_only_affects_bulk_compiles() {
        let template = template("/opt/icarus/bin", AltPathScope::BulkCompile, "");
        assert!(template.compile_command("top", ".v", true).starts_with("\"/opt/icarus/bin/iverilog\""));
        assert!(template.compile_command("top", ".v", false).starts_with("iverilog "));
        assert!(template.run_command("top").starts_with("vvp "));
    }

    #[test]
    fn all_scope_covers_the_simulator() {
        let template = template("/opt/icarus/bin", AltPathScope::All, "");
        assert_eq!(template.run_command("top"), "\"/opt/icarus/bin/vvp\" \"top.out\"");
    }

    #[test]
    fn unset_alt_path_is_ignored_even_with_scope() {
        let template = template("", AltPathScope::All, "");
        assert_eq!(template.run_command("top"), "vvp \"top.out\"");
    }

    #[test]
    fn direct_executable_with_suffix_is_used_verbatim() {
        let exe = select_executable(COMPILER, ".exe", Some("C:/tools/iverilog-custom.EXE"), true);
        assert_eq!(exe, "\"C:/tools/iverilog-custom.EXE\"");
    }

    #[test]
    fn directory_gets_tool_and_suffix_appended() {
        let exe = select_executable(SIMULATOR, ".exe", Some("/icarus/bin"), true);
        assert_eq!(exe, "\"/icarus/bin/vvp.exe\"");
    }

    #[test]
    fn direct_compiler_path_without_suffix() {
        let exe = select_executable(COMPILER, "", Some("/usr/local/bin/iverilog"), true);
        assert_eq!(exe, "\"/usr/local/bin/iverilog\"");
    }

    #[test]
    fn direct_compiler_path_resolves_simulator_sibling() {
        let exe = select_executable(SIMULATOR, "", Some("/usr/local/bin/iverilog"), true);
        assert_eq!(exe, "\"/usr/local/bin/vvp\"");
    }

    #[test]
    fn not_applicable_returns_bare_tool() {
        let exe = select_executable(COMPILER, "", Some("/usr/local/bin"), false);
        assert_eq!(exe, "iverilog");
    }
}
