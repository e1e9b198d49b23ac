//! Error taxonomy for the controller.
//!
//! Policy outcomes that are expected, not exceptional, are discriminated
//! `Result` variants, not exceptions. Grounded on the style of
//! `worker::dto::VmError` and `ci_service::error::WorkerError`: a plain
//! enum, `Display`, and `std::error::Error`, no `anyhow` in the hot path.

use std::fmt;

/// Fatal at startup.
#[derive(Debug)]
pub enum StartupError {
    /// Empty profile table — nothing to manage.
    NoProfilesFound,
    /// `BROKER_URL` scheme was not `amqp`.
    IncompatibleBackend(String),
    /// The VM registry file/database could not be opened or created.
    RegistryOpen(String),
    /// The configuration file was missing or malformed.
    ConfigInvalid(String),
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartupError::NoProfilesFound => {
                write!(f, "no service profiles configured, nothing to manage")
            }
            StartupError::IncompatibleBackend(scheme) => {
                write!(f, "broker scheme {scheme:?} is not amqp")
            }
            StartupError::RegistryOpen(msg) => write!(f, "could not open VM registry: {msg}"),
            StartupError::ConfigInvalid(msg) => write!(f, "invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for StartupError {}

/// Outcome of attempting to spawn one VM for a profile.
#[derive(Debug)]
pub enum SpawnError {
    /// Profile is already at `max_vms`.
    InsufficientResources,
    /// Normalized name exceeded the DNS-label limit.
    VmNameTooLong(String),
    /// Cloud rejected the request for lack of quota.
    CloudOverLimit,
    /// Network/5xx talking to the cloud.
    CloudTransient(String),
    /// Could not durably record the VM before issuing the cloud call.
    RegistryWrite(String),
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpawnError::InsufficientResources => write!(f, "profile is at its VM budget"),
            SpawnError::VmNameTooLong(name) => write!(f, "VM name too long: {name}"),
            SpawnError::CloudOverLimit => write!(f, "cloud rejected spawn: over limit"),
            SpawnError::CloudTransient(msg) => write!(f, "transient cloud error: {msg}"),
            SpawnError::RegistryWrite(msg) => write!(f, "could not write VM registry: {msg}"),
        }
    }
}

impl std::error::Error for SpawnError {}

/// Outcome of attempting to tear down one VM for a profile.
#[derive(Debug)]
pub enum TeardownError {
    /// Taking one more down would drop consumer count below the floor.
    MinimumWorkersReached,
    /// No idle worker for this profile in the current snapshot.
    NoIdleWorkers,
    /// Idle workers exist but none are both cloud-live and registry-owned.
    NoTearDownTargets,
    /// Network/5xx talking to the cloud.
    CloudTransient(String),
}

impl fmt::Display for TeardownError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TeardownError::MinimumWorkersReached => {
                write!(f, "teardown would drop below the minimum idle worker floor")
            }
            TeardownError::NoIdleWorkers => write!(f, "no idle workers for this profile"),
            TeardownError::NoTearDownTargets => {
                write!(f, "idle workers exist but none match registry ∩ cloud")
            }
            TeardownError::CloudTransient(msg) => write!(f, "transient cloud error: {msg}"),
        }
    }
}

impl std::error::Error for TeardownError {}
