//! Media surfaces that do not render anything
//!
//! Hosts implement [`MediaSurface`] over a real element. These two cover
//! headless use: the CLI simulator and tests.

use crate::types::{MediaCommand, MediaSurface};
use std::sync::{Arc, Mutex};
use tracing::trace;

/// Discards every command
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSurface;

impl MediaSurface for NullSurface {
    fn execute(&mut self, command: MediaCommand) {
        trace!(command = ?command, "Dropping media command");
    }
}

/// Records commands so the caller can inspect them later.
///
/// Clones share the same log.
#[derive(Debug, Default, Clone)]
pub struct RecordingSurface {
    commands: Arc<Mutex<Vec<MediaCommand>>>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything executed so far
    pub fn commands(&self) -> Vec<MediaCommand> {
        match self.commands.lock() {
            Ok(commands) => commands.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn clear(&self) {
        match self.commands.lock() {
            Ok(mut commands) => commands.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }

    /// Take and clear
    pub fn take(&self) -> Vec<MediaCommand> {
        match self.commands.lock() {
            Ok(mut commands) => std::mem::take(&mut *commands),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl MediaSurface for RecordingSurface {
    fn execute(&mut self, command: MediaCommand) {
        match self.commands.lock() {
            Ok(mut commands) => commands.push(command),
            Err(poisoned) => poisoned.into_inner().push(command),
        }
    }
}
