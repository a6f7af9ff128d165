//! Teller session manager.
//!
//! Owns a fixed number of session slots. Each connected teller gets a pair of
//! named pipes (`<base>_<slot>_to_client`, `<base>_<slot>_from_client`) and a
//! launched client process. Inbound frames are decoded, handed to the
//! [`bank_operations::TellerService`], and answered on the outbound pipe.

mod channel;
mod error;
mod launcher;
mod manager;
mod session;

pub use channel::{open_outbound, ChannelPaths};
pub use error::{SessionError, SessionResult};
pub use launcher::{ClientLauncher, CommandLauncher, LaunchSpec};
pub use manager::{ConnectionRequest, ManagerConfig, SessionManager};
pub use session::SlotState;
