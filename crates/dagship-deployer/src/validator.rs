//! Pre-deploy checks run inside the built image.

use dagship_core::Error;
use dagship_core::engine::{ContainerHandler, EXIT_CODE_MARKER};
use dagship_core::version::compare_runtime_versions;
use std::cmp::Ordering;
use std::io::Write;
use tracing::{info, warn};

use crate::DeployError;

/// Oldest runtime whose images can run the DAG integrity check.
pub const PARSE_MIN_RUNTIME: &str = "4.1.0";

/// How a completed test run ended, read from its captured output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestOutcome {
    Passed,
    Failed { exit_code: i32 },
    /// No exit code line in the output.
    Unknown,
}

/// Classify test output by its last `exit code N` line.
pub fn classify_test_output(output: &str) -> TestOutcome {
    output
        .lines()
        .rev()
        .find_map(|line| line.trim().strip_prefix(EXIT_CODE_MARKER))
        .map(|code| match code.trim().parse::<i32>() {
            Ok(0) => TestOutcome::Passed,
            Ok(exit_code) => TestOutcome::Failed { exit_code },
            Err(_) => TestOutcome::Unknown,
        })
        .unwrap_or(TestOutcome::Unknown)
}

/// Run the DAG integrity check. Skipped for runtimes older than
/// `PARSE_MIN_RUNTIME`.
pub async fn check_parse(
    containers: &dyn ContainerHandler,
    image: &str,
    runtime_version: &str,
    out: &mut dyn Write,
) -> Result<(), DeployError> {
    if compare_runtime_versions(runtime_version, PARSE_MIN_RUNTIME) == Ordering::Less {
        warn!(runtime_version, "Runtime too old for DAG parse check, skipping");
        writeln!(
            out,
            "Skipping DAG parse: runtime {} is older than {}",
            runtime_version, PARSE_MIN_RUNTIME
        )?;
        return Ok(());
    }

    writeln!(out, "Testing image for DAG import errors...")?;
    match containers.parse(image).await {
        Ok(()) => {
            info!(image, "DAGs parsed");
            writeln!(out, "No DAG import errors found")?;
            Ok(())
        }
        Err(e) => {
            if let Error::ExecutionFailed(output) = &e {
                writeln!(out, "{}", output.trim_end())?;
            }
            Err(DeployError::DagsParseFailed(e))
        }
    }
}

/// Run the project's tests.
///
/// A run that fails to start propagates its error. A run that completes with
/// a non-zero status is `PytestFailed`, also when the engine reports it as an
/// execution failure carrying the output.
pub async fn check_pytest(
    containers: &dyn ContainerHandler,
    test_file: Option<&str>,
    image: &str,
    out: &mut dyn Write,
) -> Result<(), DeployError> {
    writeln!(out, "Running pytests...")?;

    let output = match containers.pytest(test_file, image).await {
        Ok(output) => output,
        Err(Error::ExecutionFailed(output))
            if matches!(classify_test_output(&output), TestOutcome::Failed { .. }) =>
        {
            output
        }
        Err(e) => return Err(DeployError::step("run pytests")(e)),
    };

    write!(out, "{}", output)?;
    match classify_test_output(&output) {
        TestOutcome::Passed => {
            info!(image, "Pytests passed");
            Ok(())
        }
        TestOutcome::Failed { exit_code } => {
            warn!(image, exit_code, "Pytests failed");
            Err(DeployError::PytestFailed)
        }
        TestOutcome::Unknown => {
            warn!(image, "Pytest output has no exit code, treating as passed");
            Ok(())
        }
    }
}
