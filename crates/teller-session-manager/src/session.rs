//! Per-slot session state.

use crate::ChannelPaths;
use ledger_store::AccountNumber;
use std::fmt;
use tokio::net::unix::pipe;
use tokio::process::Child;
use tokio::task::JoinHandle;

/// Lifecycle of one slot: `Free -> Allocating -> Connected -> Draining -> Free`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Free,
    Allocating,
    Connected,
    Draining,
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Free => "free",
            Self::Allocating => "allocating",
            Self::Connected => "connected",
            Self::Draining => "draining",
        };
        f.write_str(name)
    }
}

/// A connected teller.
#[derive(Debug)]
pub(crate) struct Session {
    /// Launched host process. `None` once it has been reaped.
    pub child: Option<Child>,
    pub pid: Option<u32>,
    pub outbound: pipe::Sender,
    pub reader: JoinHandle<()>,
}

/// One fixed-capacity slot.
///
/// `generation` advances every time the slot returns to `Free`, so events
/// from a departed session can never touch its successor.
#[derive(Debug)]
pub(crate) struct Slot {
    pub index: usize,
    pub state: SlotState,
    pub generation: u64,
    pub account: Option<AccountNumber>,
    pub paths: ChannelPaths,
    pub allocation: Option<JoinHandle<()>>,
    pub session: Option<Session>,
}

impl Slot {
    pub fn new(index: usize, paths: ChannelPaths) -> Self {
        Self {
            index,
            state: SlotState::Free,
            generation: 0,
            account: None,
            paths,
            allocation: None,
            session: None,
        }
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    /// Return to `Free`. Callers tear down channels and processes first.
    pub fn release(&mut self) {
        self.state = SlotState::Free;
        self.generation += 1;
        self.account = None;
        self.allocation = None;
        self.session = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_release_bumps_generation() {
        let mut slot = Slot::new(0, ChannelPaths::for_slot(Path::new("/tmp"), "b", 0));
        slot.state = SlotState::Draining;
        slot.account = Some(AccountNumber(1001));

        slot.release();

        assert_eq!(slot.state, SlotState::Free);
        assert!(slot.account.is_none());
        assert!(!slot.is_current(0));
        assert!(slot.is_current(1));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SlotState::Allocating.to_string(), "allocating");
        assert_eq!(SlotState::Draining.to_string(), "draining");
    }
}
