//! Process liveness for session owners and waiting handlers.
//!
//! Operating systems reuse PIDs. A session whose driver exited might have its
//! pid handed to an unrelated process, so when the owner's start time was
//! recorded at creation we also compare it (±2 s) against the live process.

use std::cell::RefCell;

/// Answers "is this process still the one we recorded?" without its cooperation.
pub trait LivenessProbe {
    fn is_alive(&self, pid: u32, started: Option<u64>) -> bool;
}

/// Closures work as probes, which keeps test doubles to one line.
impl<F> LivenessProbe for F
where
    F: Fn(u32, Option<u64>) -> bool,
{
    fn is_alive(&self, pid: u32, started: Option<u64>) -> bool {
        self(pid, started)
    }
}

/// The real probe: `kill(pid, 0)` plus a start-time check via sysinfo.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessProbe;

impl LivenessProbe for ProcessProbe {
    fn is_alive(&self, pid: u32, started: Option<u64>) -> bool {
        if !is_pid_alive(pid) {
            return false;
        }
        let Some(expected) = started else {
            return true;
        };
        match process_start_time(pid) {
            Some(actual) => actual.abs_diff(expected) <= 2,
            // Exists but unreadable (other user); trust the kill probe.
            None => true,
        }
    }
}

thread_local! {
    static SYSTEM_CACHE: RefCell<Option<sysinfo::System>> = const { RefCell::new(None) };
}

pub fn is_pid_alive(pid: u32) -> bool {
    if pid == 0 || pid > i32::MAX as u32 {
        return false;
    }
    #[cfg(unix)]
    {
        // SAFETY: signal 0 performs the permission and existence checks only.
        if unsafe { libc::kill(pid as i32, 0) } == 0 {
            return true;
        }
        // EPERM: the process exists but belongs to someone else.
        std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }
    #[cfg(not(unix))]
    {
        false
    }
}

/// Start time of a process (Unix seconds), or `None` if it cannot be queried.
pub fn process_start_time(pid: u32) -> Option<u64> {
    use sysinfo::{Pid, ProcessRefreshKind, System};

    SYSTEM_CACHE.with(|cache| {
        let mut cache = cache.borrow_mut();
        let sys = cache.get_or_insert_with(System::new);

        let sysinfo_pid = Pid::from(pid as usize);
        if !sys.refresh_process_specifics(sysinfo_pid, ProcessRefreshKind::new()) {
            return None;
        }
        sys.process(sysinfo_pid).map(|process| process.start_time())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_process_is_alive() {
        let pid = std::process::id();
        assert!(is_pid_alive(pid));
        assert!(ProcessProbe.is_alive(pid, None));
    }

    #[test]
    fn current_process_matches_its_own_start_time() {
        let pid = std::process::id();
        let started = process_start_time(pid).unwrap();
        assert!(ProcessProbe.is_alive(pid, Some(started)));
        assert!(!ProcessProbe.is_alive(pid, Some(started + 3600)));
    }

    #[test]
    fn exited_child_is_dead() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        assert!(!is_pid_alive(pid));
    }

    #[test]
    fn pid_zero_is_never_alive() {
        assert!(!is_pid_alive(0));
    }

    #[test]
    fn closures_are_probes() {
        let probe = |pid: u32, _: Option<u64>| pid == 7;
        assert!(probe.is_alive(7, None));
        assert!(!probe.is_alive(8, None));
    }
}
