//! Native tool discovery.
//!
//! Backends that shell out declare a [`SystemTool`]; [`probe`] runs its
//! version command once and turns a missing binary into
//! [`ExtractError::MissingSystemDependency`] with install guidance for the
//! current host.

use std::fmt::{Display, Formatter};
use std::process::{Command, Stdio};

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::ExtractError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemTool {
    pub name: &'static str,
    pub programs: &'static [&'static str],
    pub version_args: &'static [&'static str],
    pub apt_package: &'static str,
    pub brew_package: &'static str,
    pub download_url: &'static str,
}

/// poppler's rasterizer, used for page previews.
pub const PDFTOPPM: SystemTool = SystemTool {
    name: "pdftoppm",
    programs: &["pdftoppm"],
    version_args: &["-v"],
    apt_package: "poppler-utils",
    brew_package: "poppler",
    download_url: "https://github.com/oschwartz10612/poppler-windows/releases",
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HostOs {
    Windows,
    MacOs,
    Linux,
}

impl HostOs {
    #[must_use]
    pub const fn current() -> Self {
        if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else {
            Self::Linux
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InstallGuidance {
    Command { argv: Vec<String> },
    ManualDownload { url: String },
}

impl Display for InstallGuidance {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Command { argv } => write!(f, "install it with `{}`", argv.join(" ")),
            Self::ManualDownload { url } => {
                write!(f, "download it from {url} and add its bin directory to PATH")
            }
        }
    }
}

#[must_use]
pub fn install_guidance(tool: &SystemTool, os: HostOs) -> InstallGuidance {
    let argv: &[&str] = match os {
        HostOs::Windows => {
            return InstallGuidance::ManualDownload {
                url: tool.download_url.to_string(),
            };
        }
        HostOs::MacOs => &["brew", "install", tool.brew_package],
        HostOs::Linux => &["sudo", "apt-get", "install", "-y", tool.apt_package],
    };
    InstallGuidance::Command {
        argv: argv.iter().map(|arg| (*arg).to_string()).collect(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolVersion {
    pub tool: String,
    pub program: String,
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Display for ToolVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}.{}.{}",
            self.program, self.major, self.minor, self.patch
        )
    }
}

/// Finds the first `major.minor[.patch]` in a version banner.
#[must_use]
pub fn parse_version(output: &str) -> Option<(u32, u32, u32)> {
    let re = Regex::new(r"(\d+)\.(\d+)(?:\.(\d+))?").ok()?;
    let caps = re.captures(output)?;
    let major = caps.get(1)?.as_str().parse().ok()?;
    let minor = caps.get(2)?.as_str().parse().ok()?;
    let patch = caps
        .get(3)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0);
    Some((major, minor, patch))
}

pub(crate) fn missing(tool: &SystemTool) -> ExtractError {
    ExtractError::MissingSystemDependency {
        tool: tool.name.to_string(),
        guidance: install_guidance(tool, HostOs::current()).to_string(),
    }
}

/// Runs the tool's version command and reports the first program that answers.
pub fn probe(tool: &SystemTool) -> Result<ToolVersion, ExtractError> {
    tool.programs
        .iter()
        .find_map(|program| probe_program(tool, program))
        .ok_or_else(|| missing(tool))
}

/// Asks one concrete `program` for its version banner.
pub fn probe_program(tool: &SystemTool, program: &str) -> Option<ToolVersion> {
    let output = match Command::new(program)
        .args(tool.version_args)
        .stdin(Stdio::null())
        .output()
    {
        Ok(output) => output,
        Err(error) => {
            debug!(program, %error, "version probe could not start");
            return None;
        }
    };

    // poppler prints its banner on stderr
    let banner = format!(
        "{}\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    let Some((major, minor, patch)) = parse_version(&banner) else {
        debug!(program, status = ?output.status, "version probe gave no version");
        return None;
    };
    let version = ToolVersion {
        tool: tool.name.to_string(),
        program: program.to_string(),
        major,
        minor,
        patch,
    };
    info!(%version, "found system dependency");
    Some(version)
}

/// Runs the install command for `tool` on hosts that have one.
///
/// Only the command-line `doctor --install` path calls this.
pub fn run_guided_install(tool: &SystemTool) -> Result<ToolVersion, ExtractError> {
    let guidance = install_guidance(tool, HostOs::current());
    let InstallGuidance::Command { argv } = &guidance else {
        return Err(missing(tool));
    };
    let Some((program, args)) = argv.split_first() else {
        return Err(missing(tool));
    };

    info!(command = %argv.join(" "), "installing system dependency");
    let status = Command::new(program).args(args).status()?;
    if !status.success() {
        return Err(ExtractError::MissingSystemDependency {
            tool: tool.name.to_string(),
            guidance: format!("`{}` exited with {status}", argv.join(" ")),
        });
    }
    probe(tool)
}
