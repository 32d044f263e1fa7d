//! Utility functions

use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::deploy::process::{CommandSpec, ExitKind, ProcessRunner};

/// Version information for the service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Get version information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Availability of one external tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolCheck {
    pub program: String,
    pub available: bool,
    pub detail: String,
}

/// Probe each program by running it with `probe_arg`. A program counts as
/// available when it can be spawned at all; many of these tools exit
/// non-zero on a version or usage probe.
pub async fn check_tools(
    runner: &dyn ProcessRunner,
    programs: &[(&str, &str)],
) -> Vec<ToolCheck> {
    let probes = programs.iter().map(|(program, probe_arg)| async move {
        let spec = CommandSpec::new(*program).arg(*probe_arg);
        match runner.run(&spec).await {
            Ok(output) => ToolCheck {
                program: program.to_string(),
                available: true,
                detail: first_line(&output.stdout, &output.stderr),
            },
            Err(failure) => match &failure.exit {
                ExitKind::SpawnFailed(reason) => ToolCheck {
                    program: program.to_string(),
                    available: false,
                    detail: reason.clone(),
                },
                _ => ToolCheck {
                    program: program.to_string(),
                    available: true,
                    detail: first_line(&failure.stdout, &failure.stderr),
                },
            },
        }
    });
    join_all(probes).await
}

fn first_line(stdout: &str, stderr: &str) -> String {
    stdout
        .lines()
        .chain(stderr.lines())
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or_default()
        .to_string()
}
