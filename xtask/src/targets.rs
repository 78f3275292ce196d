//! Build targets and their dependencies

use anyhow::{Context, Result};
use clap::ValueEnum;
use simple_exec::Command;
use std::time::Instant;
use tracing::info;

/// A unit of work runnable from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Target {
    /// Check formatting without changing files
    Format,
    /// Build the workspace in release mode
    Build,
    /// Run the tests against the release build
    Test,
    /// Package the library crate
    Pack,
    /// Format, test and pack
    Default,
}

impl Target {
    fn dependencies(self) -> &'static [Target] {
        match self {
            Target::Format | Target::Build => &[],
            Target::Test | Target::Pack => &[Target::Build],
            Target::Default => &[Target::Format, Target::Test, Target::Pack],
        }
    }

    /// The cargo invocation for this target, if it runs one
    fn cargo_args(self) -> Option<&'static [&'static str]> {
        match self {
            Target::Format => Some(&["fmt", "--all", "--", "--check"]),
            Target::Build => Some(&["build", "--workspace", "--release"]),
            Target::Test => Some(&["test", "--workspace", "--release"]),
            Target::Pack => Some(&["package", "--package", "simple-exec", "--allow-dirty"]),
            Target::Default => None,
        }
    }
}

/// Order the requested targets after their dependencies, each once
pub fn plan(requested: &[Target]) -> Vec<Target> {
    fn visit(target: Target, plan: &mut Vec<Target>) {
        if plan.contains(&target) {
            return;
        }
        for &dependency in target.dependencies() {
            visit(dependency, plan);
        }
        plan.push(target);
    }

    let mut plan = Vec::new();
    for &target in requested {
        visit(target, &mut plan);
    }
    plan
}

/// Run every target in `plan`, stopping at the first failure
pub async fn run(plan: &[Target], echo_prefix: &str) -> Result<()> {
    for &target in plan {
        let Some(args) = target.cargo_args() else {
            continue;
        };

        let start = Instant::now();
        info!(?target, "starting");
        Command::new("cargo")
            .args(args)
            .echo_prefix(echo_prefix)
            .run()
            .await
            .with_context(|| format!("target `{target:?}` failed"))?;
        info!(?target, elapsed = ?start.elapsed(), "finished");
    }
    Ok(())
}
