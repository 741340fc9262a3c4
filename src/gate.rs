//! Batch identification with cooperative pausing.
//!
//! Workers consult a shared [`PauseGate`] before starting each request. A
//! request already running is never interrupted; pausing only holds back
//! the ones not yet started.

use std::path::Path;
use std::sync::{Condvar, Mutex};

use log::debug;

use crate::Result;
use crate::identify::{FormatIdentifier, IdentificationRequest, IdentificationResultCollection};
use crate::source::FileSource;
use crate::sync::{lock_or_recover, wait_or_recover};

/// A shared pause flag that workers wait on at safe points.
///
/// # Example
///
/// ```rust
/// use formatsig::PauseGate;
///
/// let gate = PauseGate::new();
/// gate.pause();
/// assert!(gate.is_paused());
/// gate.resume();
/// gate.wait_if_paused(); // returns immediately
/// ```
#[derive(Debug, Default)]
pub struct PauseGate {
    paused: Mutex<bool>,
    resumed: Condvar,
}

impl PauseGate {
    /// Creates an open gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Holds back workers at their next safe point.
    pub fn pause(&self) {
        *lock_or_recover(&self.paused, "PauseGate") = true;
        debug!("Identification paused");
    }

    /// Releases every waiting worker.
    pub fn resume(&self) {
        *lock_or_recover(&self.paused, "PauseGate") = false;
        self.resumed.notify_all();
        debug!("Identification resumed");
    }

    /// Returns true while paused.
    pub fn is_paused(&self) -> bool {
        *lock_or_recover(&self.paused, "PauseGate")
    }

    /// Blocks the calling worker until the gate is open.
    pub fn wait_if_paused(&self) {
        let mut paused = lock_or_recover(&self.paused, "PauseGate");
        while *paused {
            paused = wait_or_recover(&self.resumed, paused, "PauseGate");
        }
    }
}

fn identify_path(identifier: &FormatIdentifier, path: &Path, gate: &PauseGate) -> Result<IdentificationResultCollection> {
    gate.wait_if_paused();
    let request = IdentificationRequest::new(FileSource::open(path)?);
    identifier.identify(&request)
}

/// Identifies every file in `paths`, returning results in input order.
///
/// Requests run on the Rayon pool. A file that cannot be read yields an
/// error in its slot without affecting the others.
#[cfg(feature = "parallel")]
pub fn identify_batch<P>(
    identifier: &FormatIdentifier,
    paths: &[P],
    gate: &PauseGate,
) -> Vec<Result<IdentificationResultCollection>>
where
    P: AsRef<Path> + Sync,
{
    use rayon::prelude::*;

    debug!("Identifying {} files in parallel", paths.len());
    paths
        .par_iter()
        .map(|path| identify_path(identifier, path.as_ref(), gate))
        .collect()
}

/// Identifies every file in `paths`, returning results in input order.
///
/// A file that cannot be read yields an error in its slot without
/// affecting the others.
#[cfg(not(feature = "parallel"))]
pub fn identify_batch<P>(
    identifier: &FormatIdentifier,
    paths: &[P],
    gate: &PauseGate,
) -> Vec<Result<IdentificationResultCollection>>
where
    P: AsRef<Path> + Sync,
{
    debug!("Identifying {} files", paths.len());
    paths
        .iter()
        .map(|path| identify_path(identifier, path.as_ref(), gate))
        .collect()
}
