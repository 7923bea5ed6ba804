//! Open file budget of an engine
//!
//! Each user holds a websocket and shares a pool of HTTP connections with
//! the others, so the process needs a file descriptor per user plus a
//! quarter as many for the pool.

use crate::error::LoadTestError;

const CONN_FACTOR: usize = 4;

/// Maximum number of HTTP connections used by the given number of users
pub fn max_http_conns(max_users: usize) -> usize {
    max_users / CONN_FACTOR
}

/// File descriptors needed to run `max_users` users
pub fn required_file_descriptors(max_users: usize) -> usize {
    max_users + max_http_conns(max_users)
}

/// Check `max_users` against a hard open file limit
pub fn check_against_limit(max_users: usize, hard_limit: u64) -> Result<(), LoadTestError> {
    let required = required_file_descriptors(max_users);
    if required as u64 > hard_limit {
        return Err(LoadTestError::FileLimit {
            max_active_users: max_users,
            limit: hard_limit,
            suggested: (required + 1).next_power_of_two(),
        });
    }
    Ok(())
}

/// Check `max_users` against the process' hard `RLIMIT_NOFILE`
#[cfg(unix)]
pub fn check_file_limit(max_users: usize) -> Result<(), LoadTestError> {
    use nix::sys::resource::{getrlimit, Resource};

    let (_soft, hard) = getrlimit(Resource::RLIMIT_NOFILE)
        .map_err(|e| LoadTestError::ResourceLimit(e.to_string()))?;

    check_against_limit(max_users, hard as u64)
}

#[cfg(not(unix))]
pub fn check_file_limit(_max_users: usize) -> Result<(), LoadTestError> {
    Ok(())
}
