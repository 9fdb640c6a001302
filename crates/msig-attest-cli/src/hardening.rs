//! Process hardening for runs that hold master private keys.

/// Disable core dumps so a crash never writes key material to disk.
///
/// Best-effort: returns `false` where the platform or sandbox refuses.
pub fn disable_core_dumps() -> bool {
    #[cfg(unix)]
    {
        let rlim = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        // SAFETY: setrlimit only reads the struct we pass
        let result = unsafe { libc::setrlimit(libc::RLIMIT_CORE, &rlim) };
        if result != 0 {
            log::warn!(
                "Failed to disable core dumps: {}",
                std::io::Error::last_os_error()
            );
            return false;
        }
        true
    }

    #[cfg(not(unix))]
    {
        log::warn!("Core dump prevention not supported on this platform");
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disable_core_dumps_is_repeatable() {
        // May be refused in sandboxes; must not panic either way
        let first = disable_core_dumps();
        let second = disable_core_dumps();
        assert_eq!(first, second);
    }
}
