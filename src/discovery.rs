//! Target discovery and local node detection

use std::collections::HashSet;
use std::net::IpAddr;
use std::time::Duration;

use crate::error::DiscoveryError;
use crate::exec::{CommandSpec, Executor};

/// Ask the inventory command for every node address.
///
/// Any failure is fatal: a partial node list would silently under-replicate.
pub fn discover_targets(
    exec: &Executor,
    command: &[String],
    timeout: Duration,
) -> Result<Vec<String>, DiscoveryError> {
    let spec = CommandSpec::from_argv(command, timeout).ok_or(DiscoveryError::EmptyCommand)?;
    let out = exec.run(&spec)?;
    if let Some(signal) = out.signal {
        return Err(DiscoveryError::Killed {
            program: spec.program().to_string(),
            signal,
        });
    }
    if !out.success() {
        return Err(DiscoveryError::NonZeroExit {
            program: spec.program().to_string(),
            code: out.code,
            stderr: out.stderr,
        });
    }
    Ok(parse_addresses(&out.stdout))
}

/// Split on whitespace, dropping duplicates but keeping first-seen order
pub fn parse_addresses(output: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    output
        .split_whitespace()
        .filter(|a| seen.insert(*a))
        .map(str::to_string)
        .collect()
}

/// The set of names and addresses that mean "this node"
#[derive(Debug, Clone, Default)]
pub struct LocalIdentity {
    addresses: HashSet<String>,
}

impl LocalIdentity {
    pub fn from_addresses<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            addresses: addresses.into_iter().map(Into::into).collect(),
        }
    }

    /// Collect this node's addresses from the local-address command, the
    /// hostname, and any configured extras. Detection failures only shrink
    /// the set; they never abort the run.
    pub fn detect(
        exec: &Executor,
        command: &[String],
        extra: &[String],
        timeout: Duration,
    ) -> (Self, Vec<String>) {
        let mut warnings = Vec::new();
        let mut identity = Self::from_addresses(extra.iter().cloned());

        if let Some(spec) = CommandSpec::from_argv(command, timeout) {
            match exec.run(&spec) {
                Ok(out) if out.success() => {
                    identity.addresses.extend(parse_addresses(&out.stdout));
                }
                Ok(out) => warnings.push(format!(
                    "Local address command `{}` exited with {}",
                    spec.display(),
                    out.exit_text()
                )),
                Err(e) => warnings.push(format!("Local address detection failed: {}", e)),
            }
        }

        if let Ok(name) = hostname::get() {
            if let Some(name) = name.to_str() {
                identity.addresses.insert(name.to_string());
            }
        }

        (identity, warnings)
    }

    pub fn is_local(&self, address: &str) -> bool {
        if self.addresses.contains(address) {
            return true;
        }
        match address.parse::<IpAddr>() {
            Ok(ip) => ip.is_loopback(),
            Err(_) => address.eq_ignore_ascii_case("localhost"),
        }
    }

    /// Split discovered addresses into (remote targets, local node entries)
    pub fn partition(&self, addresses: Vec<String>) -> (Vec<String>, Vec<String>) {
        addresses.into_iter().partition(|a| !self.is_local(a))
    }
}
