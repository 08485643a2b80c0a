//! Addresses, endpoints and result codes shared by the daemon and its peers.

/// Inbound: request an upload. One string argument, the absolute path.
pub const UPLOAD_START: &str = "/uploader/upload/start";
/// Outbound: an upload request was admitted. One string argument, the path.
pub const UPLOAD_STARTED: &str = "/uploader/upload/started";
/// Outbound: an upload finished. Arguments: result, path, optional message.
pub const UPLOAD_STOPPED: &str = "/uploader/upload/stopped";
/// Outbound: the access-point configurator applied (or failed to apply) its settings.
pub const AP_CONFIGURED: &str = "/ap_configurator/configure/configured";

/// A datagram consisting of exactly this byte stops the request daemon.
pub const SHUTDOWN_SENTINEL: u8 = b'q';

pub const DEFAULT_MANAGER_PORT: u16 = 8001;
pub const DEFAULT_DAEMON_PORT: u16 = 8100;
pub const DEFAULT_MANAGER_ADDR: &str = "127.0.0.1:8001";
pub const DEFAULT_DAEMON_ADDR: &str = "127.0.0.1:8100";

/// Largest inbound datagram the daemon reads.
pub const MAX_DATAGRAM_SIZE: usize = 1024;

/// Files larger than this are rejected before the storage backend is called.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 140_000_000;

/// Result code carried as the first argument of `stopped` notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    Success,
    Failure,
}

impl ResultCode {
    pub fn code(self) -> i32 {
        match self {
            ResultCode::Success => 0,
            ResultCode::Failure => -1,
        }
    }
}
