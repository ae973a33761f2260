//! Process resource limits.

use std::io;
use tracing::{debug, info};

/// Soft and hard `RLIMIT_CORE` values in bytes.
pub fn core_limit() -> io::Result<(u64, u64)> {
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: `limit` is a valid, writable rlimit.
    if unsafe { libc::getrlimit(libc::RLIMIT_CORE, &mut limit) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok((limit.rlim_cur as u64, limit.rlim_max as u64))
}

/// Raise the soft core-dump limit to the hard limit so a crash leaves a
/// core file. Returns the new soft limit.
pub fn raise_core_limit() -> io::Result<u64> {
    let (soft, hard) = core_limit()?;
    if soft == hard {
        debug!(limit = soft, "Core dump limit already at maximum");
        return Ok(soft);
    }

    let limit = libc::rlimit {
        rlim_cur: hard as libc::rlim_t,
        rlim_max: hard as libc::rlim_t,
    };
    // SAFETY: `limit` is a valid rlimit; raising soft up to hard needs no privilege.
    if unsafe { libc::setrlimit(libc::RLIMIT_CORE, &limit) } != 0 {
        return Err(io::Error::last_os_error());
    }

    info!(previous = soft, limit = hard, "Raised core dump limit");
    Ok(hard)
}
