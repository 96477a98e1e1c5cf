//! Process exit codes, stable for scripting.

use pw_client::Error;

pub const OK: i32 = 0;
pub const NO_KEY: i32 = 1;
pub const INVALID_KEY: i32 = 2;
pub const CONNECTION: i32 = 3;
pub const FILE_UNSUPPORTED: i32 = 4;
pub const DEVICE_UNAVAILABLE: i32 = 5;
pub const NOTHING_TO_DO: i32 = 6;

/// Map a terminal error onto an exit code.  Everything that is not an
/// auth failure counts as a connection/service failure.
pub fn for_error(e: &Error) -> i32 {
    match e {
        Error::InvalidKey(_) => INVALID_KEY,
        _ => CONNECTION,
    }
}
