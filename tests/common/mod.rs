#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};

/// Stand-in compiler. Behavior is picked by markers in the source:
/// `GIVEUP` prints the abort marker and exits 0, `BROKEN` writes to stderr
/// and exits 1, `SLOW` sleeps before compiling and records the sleeper's pid
/// in `<src>.pid`.
const FAKE_IVERILOG: &str = r#"#!/bin/sh
out=""
src=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift 2 ;;
    -*) shift ;;
    *) src="$1"; shift ;;
  esac
done
if grep -q GIVEUP "$src"; then
  echo "$src:1: syntax error"
  echo "I give up."
  exit 0
fi
if grep -q BROKEN "$src"; then
  echo "$src:1: error: broken module" 1>&2
  exit 1
fi
if grep -q SLOW "$src"; then
  sleep 30 &
  echo $! > "$src.pid"
  wait
fi
printf 'compiled %s\n' "$src" > "$out"
echo "ok $src"
"#;

/// Stand-in simulator: prints the artifact.
const FAKE_VVP: &str = r#"#!/bin/sh
if [ ! -f "$1" ]; then
  echo "$1: Unable to open input file." 1>&2
  exit 2
fi
cat "$1"
"#;

/// Write `iverilog` and `vvp` scripts into `dir/tools` and return that
/// directory.
#[cfg(unix)]
pub fn write_fake_toolchain(dir: &Path) -> Result<PathBuf> {
    use std::os::unix::fs::PermissionsExt;

    let tools = dir.join("tools");
    fs::create_dir_all(&tools)?;
    for (name, script) in [("iverilog", FAKE_IVERILOG), ("vvp", FAKE_VVP)] {
        let path = tools.join(name);
        fs::write(&path, script)?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
    }
    Ok(tools)
}

/// Replace the elapsed time in summary lines with `N`.
pub fn mask_elapsed(line: &str) -> String {
    match (line.find(" in "), line.rfind(" seconds")) {
        (Some(start), Some(end)) if start < end => {
            format!("{} in N seconds", line.get(..start).unwrap_or_default())
        }
        _ => line.to_string(),
    }
}

pub fn masked(lines: &[String]) -> Vec<String> {
    lines.iter().map(|line| mask_elapsed(line)).collect()
}

/// Wait for the pid written by a `SLOW` compile.
pub async fn wait_for_pid(path: &Path) -> Result<u32> {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(text) = fs::read_to_string(path)
                && let Ok(pid) = text.trim().parse()
            {
                return pid;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .with_context(|| format!("no pid written to {}", path.display()))
}

/// True while `pid` exists and is not a zombie.
#[cfg(target_os = "linux")]
pub fn process_is_running(pid: u32) -> bool {
    fs::read_to_string(format!("/proc/{pid}/stat"))
        .ok()
        .and_then(|stat| {
            let (_, rest) = stat.rsplit_once(')')?;
            rest.trim_start().chars().next()
        })
        .is_some_and(|state| state != 'Z')
}
