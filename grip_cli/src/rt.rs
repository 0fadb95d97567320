//! Real-time process setup for the control loop.
//!
//! Linux: memory locking, SCHED_FIFO and single-CPU affinity. macOS: memory
//! locking only. Every step is best-effort; a failure is a warning.

use crate::cli::{RtArgs, RtLock};
use std::sync::OnceLock;

static RT_ONCE: OnceLock<()> = OnceLock::new();

/// Apply `--rt` settings once per process.
pub fn apply(args: &RtArgs) {
    if !args.rt {
        return;
    }
    let lock = args.rt_lock.unwrap_or(RtLock::os_default());
    RT_ONCE.get_or_init(|| {
        match lock_memory(lock) {
            Ok(()) => tracing::info!(mode = ?lock, "rt: memory lock applied"),
            Err(e) => tracing::warn!(error = %e, "rt: mlockall failed"),
        }
        #[cfg(target_os = "linux")]
        {
            match linux::fifo_priority(args.rt_prio) {
                Ok(p) => tracing::info!(priority = p, "rt: SCHED_FIFO applied"),
                Err(e) => tracing::warn!(error = %e, "rt: SCHED_FIFO not applied"),
            }
            let cpu = args.rt_cpu.unwrap_or(0);
            match linux::pin_to_cpu(cpu) {
                Ok(()) => tracing::info!(cpu, "rt: affinity applied"),
                Err(e) => tracing::warn!(error = %e, "rt: affinity not applied"),
            }
        }
        #[cfg(not(target_os = "linux"))]
        {
            if args.rt_prio.is_some() || args.rt_cpu.is_some() {
                tracing::warn!("rt: SCHED_FIFO and affinity are Linux-only; ignored");
            }
        }
    });
}

#[cfg(unix)]
fn lock_memory(lock: RtLock) -> eyre::Result<()> {
    use libc::{MCL_CURRENT, MCL_FUTURE, mlockall};

    fn call(flags: libc::c_int) -> std::io::Result<()> {
        // SAFETY: mlockall takes only flags and touches no caller memory.
        if unsafe { mlockall(flags) } == 0 {
            Ok(())
        } else {
            Err(std::io::Error::last_os_error())
        }
    }

    let err = match lock {
        RtLock::None => return Ok(()),
        RtLock::Current => match call(MCL_CURRENT) {
            Ok(()) => return Ok(()),
            Err(e) => e,
        },
        RtLock::All => match call(MCL_CURRENT | MCL_FUTURE) {
            Ok(()) => return Ok(()),
            // Locking future pages is the part most likely to hit the ulimit.
            Err(e) if is_memlock_limit(&e) && call(MCL_CURRENT).is_ok() => {
                tracing::warn!(error = %e, "rt: mlockall(current|future) failed; locked current pages only");
                return Ok(());
            }
            Err(e) => e,
        },
    };

    let mut msg = format!("mlockall({lock:?}) failed: {err}");
    if is_memlock_limit(&err) {
        if let Some(limit) = memlock_limit() {
            msg.push_str(&format!("; {limit}"));
        }
        msg.push_str("; needs CAP_IPC_LOCK (or root) and a sufficient 'ulimit -l'");
    }
    Err(eyre::eyre!(msg))
}

#[cfg(not(unix))]
fn lock_memory(lock: RtLock) -> eyre::Result<()> {
    match lock {
        RtLock::None => Ok(()),
        _ => eyre::bail!("memory locking is not supported on this OS"),
    }
}

#[cfg(unix)]
fn is_memlock_limit(err: &std::io::Error) -> bool {
    matches!(err.raw_os_error(), Some(code) if code == libc::EPERM || code == libc::ENOMEM)
}

#[cfg(unix)]
fn memlock_limit() -> Option<String> {
    let mut rlim = std::mem::MaybeUninit::<libc::rlimit>::uninit();
    // SAFETY: getrlimit writes one rlimit into the pointer on success.
    if unsafe { libc::getrlimit(libc::RLIMIT_MEMLOCK, rlim.as_mut_ptr()) } != 0 {
        return None;
    }
    // SAFETY: initialised by the successful call above.
    let cur = unsafe { rlim.assume_init() }.rlim_cur;
    Some(if cur == libc::RLIM_INFINITY {
        "memlock limit: unlimited".to_string()
    } else {
        format!("memlock limit: {} KiB", cur / 1024)
    })
}

#[cfg(target_os = "linux")]
mod linux {
    /// Bits in a `cpu_set_t`.
    const MAX_CPUSET_BITS: usize = std::mem::size_of::<libc::cpu_set_t>() * 8;
    const CAP_SYS_NICE: u64 = 1 << 23;

    fn has_sys_nice() -> bool {
        let Ok(status) = std::fs::read_to_string("/proc/self/status") else {
            // Can't tell; let sched_setscheduler decide.
            return true;
        };
        status
            .lines()
            .filter(|l| l.starts_with("CapEff:"))
            .filter_map(|l| l.split_whitespace().nth(1))
            .filter_map(|hex| u64::from_str_radix(hex, 16).ok())
            .any(|caps| caps & CAP_SYS_NICE != 0)
    }

    /// Switch to SCHED_FIFO at `prio` (clamped to the system range). Returns the priority used.
    pub fn fifo_priority(prio: Option<i32>) -> eyre::Result<i32> {
        // SAFETY: geteuid has no preconditions.
        let euid = unsafe { libc::geteuid() };
        if euid != 0 && !has_sys_nice() {
            eyre::bail!(
                "needs CAP_SYS_NICE or root (euid {euid}); try 'sudo setcap cap_sys_nice=ep <path to grip>'"
            );
        }
        // SAFETY: plain queries on a valid policy constant.
        let (min, max) = unsafe {
            (
                libc::sched_get_priority_min(libc::SCHED_FIFO),
                libc::sched_get_priority_max(libc::SCHED_FIFO),
            )
        };
        let (min, max) = if min < 0 || max < 0 { (1, 99) } else { (min, max) };
        let value = prio.unwrap_or(max).clamp(min, max);
        let param = libc::sched_param {
            sched_priority: value,
        };
        // SAFETY: param outlives the call; pid 0 is this process.
        if unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) } != 0 {
            return Err(eyre::eyre!(std::io::Error::last_os_error()));
        }
        Ok(value)
    }

    /// Pin the process to `cpu` if the current affinity mask allows it.
    pub fn pin_to_cpu(cpu: usize) -> eyre::Result<()> {
        if cpu >= MAX_CPUSET_BITS {
            eyre::bail!("CPU {cpu} exceeds cpu_set_t capacity {MAX_CPUSET_BITS}");
        }
        // SAFETY: cpu_set_t is plain data; zeroed is a valid empty set.
        let mut allowed: libc::cpu_set_t = unsafe { std::mem::zeroed() };
        let size = std::mem::size_of::<libc::cpu_set_t>();
        // SAFETY: `allowed` is a properly sized, writable cpu_set_t.
        if unsafe { libc::sched_getaffinity(0, size, &mut allowed) } != 0 {
            return Err(eyre::eyre!(std::io::Error::last_os_error()));
        }
        // SAFETY: cpu < MAX_CPUSET_BITS was checked above.
        if !unsafe { libc::CPU_ISSET(cpu, &allowed) } {
            eyre::bail!("CPU {cpu} not permitted by the current affinity mask");
        }
        // SAFETY: as above.
        let mut desired: libc::cpu_set_t = unsafe { std::mem::zeroed() };
        // SAFETY: cpu is in range for the set.
        unsafe { libc::CPU_SET(cpu, &mut desired) };
        // SAFETY: `desired` is a valid cpu_set_t of `size` bytes.
        if unsafe { libc::sched_setaffinity(0, size, &desired) } != 0 {
            return Err(eyre::eyre!(std::io::Error::last_os_error()));
        }
        Ok(())
    }
}
