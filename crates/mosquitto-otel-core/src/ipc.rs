//! The privileged `msgctl(MSG_STAT)` query.

use crate::error::QueryError;
use crate::msgqueue::RawQueueStats;

/// `msgctl` command returning the stats of the queue at a kernel index.
pub const MSG_STAT: libc::c_int = 11;

/// Size of the buffer handed to the kernel. The 64-bit `msqid64_ds` ends
/// with a second reserved word beyond the decoded record, and the kernel
/// writes the whole structure.
pub const KERNEL_BUF_LEN: usize = 128;

#[cfg(target_os = "linux")]
const _: () = assert!(std::mem::size_of::<libc::msqid_ds>() <= KERNEL_BUF_LEN);

/// Anything that can produce a raw queue-stats record.
pub trait QueueStatsSource: Send + Sync {
    fn query(&self) -> Result<RawQueueStats, QueryError>;
}

/// Queries the kernel through `msgctl`.
#[derive(Debug, Clone, Copy)]
pub struct MsgctlSource {
    index: i32,
}

impl MsgctlSource {
    /// Query the queue at kernel table `index` (0 is the first queue).
    pub fn new(index: i32) -> Self {
        Self { index }
    }

    pub fn index(&self) -> i32 {
        self.index
    }
}

impl Default for MsgctlSource {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(target_os = "linux")]
#[repr(C, align(8))]
struct KernelBuf([u8; KERNEL_BUF_LEN]);

impl QueueStatsSource for MsgctlSource {
    #[cfg(target_os = "linux")]
    fn query(&self) -> Result<RawQueueStats, QueryError> {
        let mut buf = KernelBuf([0u8; KERNEL_BUF_LEN]);
        // SAFETY: `buf` is 8-aligned and at least `size_of::<msqid_ds>()`
        // bytes long (checked at compile time above), so the kernel write
        // stays in bounds. The buffer is only read back as bytes.
        let rc = unsafe {
            libc::msgctl(
                self.index,
                MSG_STAT,
                buf.0.as_mut_ptr().cast::<libc::msqid_ds>(),
            )
        };
        if rc < 0 {
            return Err(QueryError::Syscall {
                index: self.index,
                source: std::io::Error::last_os_error(),
            });
        }
        Ok(RawQueueStats::from_bytes(&buf.0)?)
    }

    #[cfg(not(target_os = "linux"))]
    fn query(&self) -> Result<RawQueueStats, QueryError> {
        Err(QueryError::Unsupported)
    }
}
