use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use thiserror::Error;
use tracing::debug;

/// Event categories requested from `jfr print`.
pub const DEFAULT_CATEGORIES: [&str; 6] = ["Java Application", "Threads", "GC", "Socket", "IO", "JVM"];

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to launch `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("`{program} {subcommand}` exited with {status}: {stderr}")]
    Failed {
        program: String,
        subcommand: &'static str,
        status: String,
        stderr: String,
    },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// The two external capabilities the event source relies on.
///
/// Implementations must be usable from several threads at once; segment
/// conversion may run on the rayon pool.
pub trait JfrTool: Send + Sync {
    /// Split `capture` into segments of at most `max_size_mb` inside
    /// `output_dir`, returning the segment paths in order.
    fn disassemble(&self, capture: &Path, output_dir: &Path, max_size_mb: u64) -> Result<Vec<PathBuf>, ToolError>;

    /// Write the JSON rendering of `segment`, limited to `categories`, to `dest`.
    fn print_json(&self, segment: &Path, categories: &[String], dest: &Path) -> Result<(), ToolError>;
}

/// The JDK `jfr` command-line tool.
#[derive(Debug, Clone)]
pub struct JfrCli {
    program: PathBuf,
}

impl Default for JfrCli {
    fn default() -> Self {
        JfrCli { program: PathBuf::from("jfr") }
    }
}

impl JfrCli {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        JfrCli { program: program.into() }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn run(&self, subcommand: &'static str, cmd: &mut Command) -> Result<Output, ToolError> {
        let program = self.program.display().to_string();
        debug!(%program, subcommand, "running jfr");
        let output = cmd.output().map_err(|source| ToolError::Spawn { program: program.clone(), source })?;
        if output.status.success() {
            return Ok(output);
        }
        Err(ToolError::Failed {
            program,
            subcommand,
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

impl JfrTool for JfrCli {
    fn disassemble(&self, capture: &Path, output_dir: &Path, max_size_mb: u64) -> Result<Vec<PathBuf>, ToolError> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("disassemble")
            .arg("--output")
            .arg(output_dir)
            .arg("--max-size")
            .arg(format!("{max_size_mb}m"))
            .arg(capture)
            .stdout(Stdio::null());
        self.run("disassemble", &mut cmd)?;
        Ok(collect_segments(output_dir)?)
    }

    fn print_json(&self, segment: &Path, categories: &[String], dest: &Path) -> Result<(), ToolError> {
        let out = File::create(dest)?;
        let mut cmd = Command::new(&self.program);
        cmd.arg("print")
            .arg("--json")
            .arg("--categories")
            .arg(categories.join(","))
            .arg(segment)
            .stdout(out);
        self.run("print", &mut cmd)?;
        Ok(())
    }
}

/// `*.jfr` files directly inside `dir`, sorted by path.
pub fn collect_segments(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_jfr = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("jfr"));
        if is_jfr && path.is_file() {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}
