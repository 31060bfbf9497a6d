//! Developer tasks for codex-factory, run as `cargo xtask <task>`.
//!
//! `smoke` needs a local Docker daemon; everything else only needs cargo.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use xshell::{cmd, Shell};

const BIN: &str = "codex-factory";

#[derive(Parser)]
#[command(name = "xtask", about = "Developer tasks for codex-factory")]
struct Cli {
    #[command(subcommand)]
    task: Task,
}

#[derive(Subcommand)]
enum Task {
    /// Build the binary
    Build {
        #[arg(long)]
        release: bool,
    },
    /// Run the workspace tests
    Test {
        #[arg(long)]
        release: bool,
    },
    /// rustfmt check and clippy with warnings denied
    Lint,
    /// Format the workspace
    Fmt {
        /// Fail instead of rewriting files
        #[arg(long)]
        check: bool,
    },
    /// Start a detached cluster on the local daemon, print its status and remove it
    Smoke {
        #[arg(default_value = "latest")]
        version: String,
        #[arg(long, default_value_t = 1)]
        hosts: u8,
    },
    /// cargo install from this checkout
    Install,
    /// Build the API docs
    Doc {
        #[arg(long)]
        open: bool,
    },
    /// Everything CI runs
    Ci,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let sh = Shell::new()?;
    sh.change_dir(workspace_root()?);

    match cli.task {
        Task::Build { release } => cargo(&sh, "build", &release_flag(release, &["--bin", BIN])),
        Task::Test { release } => cargo(&sh, "test", &release_flag(release, &["--workspace"])),
        Task::Lint => lint(&sh),
        Task::Fmt { check } => fmt(&sh, check),
        Task::Smoke { version, hosts } => smoke(&sh, &version, hosts),
        Task::Install => cargo(&sh, "install", &["--path", "."]),
        Task::Doc { open } => {
            let args: &[&str] = if open { &["--no-deps", "--open"] } else { &["--no-deps"] };
            cargo(&sh, "doc", args)
        }
        Task::Ci => ci(&sh),
    }
}

fn workspace_root() -> Result<PathBuf> {
    let output = std::process::Command::new(env!("CARGO"))
        .args(["locate-project", "--workspace", "--message-format=plain"])
        .output()
        .context("cargo locate-project")?;

    if !output.status.success() {
        bail!("cargo locate-project exited with {}", output.status);
    }

    let manifest = PathBuf::from(String::from_utf8(output.stdout)?.trim());
    manifest
        .parent()
        .map(PathBuf::from)
        .context("manifest path has no parent")
}

fn release_flag<'a>(release: bool, args: &[&'a str]) -> Vec<&'a str> {
    let mut all = args.to_vec();
    if release {
        all.push("--release");
    }
    all
}

fn cargo(sh: &Shell, subcommand: &str, args: &[&str]) -> Result<()> {
    eprintln!("==> cargo {} {}", subcommand, args.join(" "));
    cmd!(sh, "cargo {subcommand} {args...}")
        .run()
        .with_context(|| format!("cargo {} failed", subcommand))
}

fn fmt(sh: &Shell, check: bool) -> Result<()> {
    let args: &[&str] = if check { &["--all", "--", "--check"] } else { &["--all"] };
    cargo(sh, "fmt", args)
}

fn lint(sh: &Shell) -> Result<()> {
    fmt(sh, true)?;
    cargo(sh, "clippy", &["--workspace", "--all-targets", "--", "-D", "warnings"])
}

fn smoke(sh: &Shell, version: &str, hosts: u8) -> Result<()> {
    let hosts = hosts.to_string();
    let run = ["run", "--quiet", "--bin", BIN, "--"];

    let started = cmd!(sh, "cargo {run...} start {version} --detach --fresh --hosts {hosts}").run();
    if started.is_ok() {
        cmd!(sh, "cargo {run...} status").run()?;
    }

    // remove the cluster even when the start failed half way
    cmd!(sh, "cargo {run...} stop --rm").run()?;

    started.context("cluster did not come up")?;
    eprintln!("==> smoke run finished, cluster removed");
    Ok(())
}

fn ci(sh: &Shell) -> Result<()> {
    lint(sh)?;
    cargo(sh, "test", &["--workspace"])?;
    cargo(sh, "build", &["--release", "--bin", BIN])
}
