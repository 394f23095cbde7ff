//! Process groups, so that stopping a job also stops whatever its shell
//! started.
//!
//! Children are moved into a fresh session before `exec` (see
//! [`isolate_child`]), which makes the child pid the process group id. On
//! Windows there are no process groups to signal and only the leader is
//! terminated.

use std::io;

/// The process group led by a spawned shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessGroup(u32);

impl ProcessGroup {
    /// Group whose id equals the leader's pid.
    pub fn from_leader(pid: u32) -> Self {
        Self(pid)
    }

    pub fn id(self) -> u32 {
        self.0
    }

    /// SIGKILL every member. A group that is already gone is not an error.
    #[cfg(unix)]
    pub fn kill(self) -> io::Result<()> {
        let pgid = libc::pid_t::try_from(self.0)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
        if unsafe { libc::killpg(pgid, libc::SIGKILL) } == -1 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ESRCH) {
                return Err(err);
            }
        }
        Ok(())
    }

    #[cfg(windows)]
    pub fn kill(self) -> io::Result<()> {
        use winapi::um::handleapi::CloseHandle;
        use winapi::um::processthreadsapi::{OpenProcess, TerminateProcess};
        use winapi::um::winnt::PROCESS_TERMINATE;

        unsafe {
            let handle = OpenProcess(PROCESS_TERMINATE, 0, self.0);
            if handle.is_null() {
                // exited already
                return Ok(());
            }
            let terminated = TerminateProcess(handle, 1);
            let err = io::Error::last_os_error();
            CloseHandle(handle);
            if terminated == 0 { Err(err) } else { Ok(()) }
        }
    }

    /// Whether any member of the group is still alive.
    #[cfg(unix)]
    pub fn is_alive(self) -> bool {
        let Ok(pgid) = libc::pid_t::try_from(self.0) else {
            return false;
        };
        if unsafe { libc::killpg(pgid, 0) } == 0 {
            return true;
        }
        io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }
}

/// Runs in the child between `fork` and `exec`: start a new session (falling
/// back to a new process group when the child already leads one) and, on
/// Linux, ask for SIGTERM if `parent_pid` goes away.
#[cfg(unix)]
pub(crate) fn isolate_child(parent_pid: libc::pid_t) -> io::Result<()> {
    if unsafe { libc::setsid() } == -1 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EPERM) {
            return Err(err);
        }
        if unsafe { libc::setpgid(0, 0) } == -1 {
            return Err(io::Error::last_os_error());
        }
    }

    #[cfg(target_os = "linux")]
    {
        if unsafe { libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) } == -1 {
            return Err(io::Error::last_os_error());
        }
        // the parent may have exited before prctl took effect
        if unsafe { libc::getppid() } != parent_pid {
            unsafe {
                libc::raise(libc::SIGTERM);
            }
        }
    }
    #[cfg(not(target_os = "linux"))]
    let _ = parent_pid;

    Ok(())
}
