//! `sysexits.h`-style process exit codes, mapped from `CapcatError`
//! variants. The core never calls `std::process::exit`; only this
//! binary decides what a given failure is worth on the way out.

use capcat_core::{CapcatError, ErrorKind};

pub const OK: i32 = 0;
pub const USAGE: i32 = 64;
pub const DATA_ERR: i32 = 65;
pub const SOFTWARE: i32 = 70;
pub const TEMP_FAIL: i32 = 75;

pub fn for_error(error: &CapcatError) -> i32 {
    match error.kind() {
        ErrorKind::Validation => USAGE,
        ErrorKind::InvalidFeed | ErrorKind::ArticleDiscoveryFailed | ErrorKind::Parsing => DATA_ERR,
        ErrorKind::FileSystem => SOFTWARE,
        ErrorKind::Network | ErrorKind::Timeout | ErrorKind::CircuitOpen => TEMP_FAIL,
        ErrorKind::ContentFetch => TEMP_FAIL,
    }
}
