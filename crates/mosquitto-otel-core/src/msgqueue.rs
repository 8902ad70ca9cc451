//! System V message-queue statistics: wire codec and structured form.
//!
//! The kernel answers `msgctl(MSG_STAT)` with a `msqid64_ds` record. We never
//! overlay a Rust struct onto that memory. [`RawQueueStats`] is decoded and
//! encoded field by field at fixed byte offsets in host byte order:
//!
//! | Offset | Width | Field |
//! |-------:|------:|-------|
//! |      0 |     4 | `perm.key` |
//! |      4 |     4 | `perm.uid` |
//! |      8 |     4 | `perm.gid` |
//! |     12 |     4 | `perm.creator_uid` |
//! |     16 |     4 | `perm.creator_gid` |
//! |     20 |     2 | `perm.mode` |
//! |     22 |     2 | reserved |
//! |     24 |     2 | `perm.sequence` |
//! |     26 |     2 | reserved |
//! |     28 |     4 | alignment padding |
//! |     32 |    16 | two reserved 64-bit words |
//! |     48 |     8 | `send_time` |
//! |     56 |     8 | `receive_time` |
//! |     64 |     8 | `change_time` |
//! |     72 |     8 | `bytes_queued` |
//! |     80 |     8 | `messages_queued` |
//! |     88 |     8 | `max_bytes` |
//! |     96 |     4 | `last_sender_id` |
//! |    100 |     4 | `last_receiver_id` |
//! |    104 |     8 | reserved |
//!
//! Reserved and padding bytes are skipped on decode and written as zero on
//! encode.
//!
//! Raw timestamps are `__kernel_time_t` values: whole seconds since the Unix
//! epoch. A zero timestamp means the event never happened and decodes to
//! [`UNIX_EPOCH`].

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::error::DecodeError;

/// Length of the decoded record.
pub const RAW_LEN: usize = 112;

const OFF_KEY: usize = 0;
const OFF_UID: usize = 4;
const OFF_GID: usize = 8;
const OFF_CUID: usize = 12;
const OFF_CGID: usize = 16;
const OFF_MODE: usize = 20;
const OFF_SEQ: usize = 24;
const OFF_STIME: usize = 48;
const OFF_RTIME: usize = 56;
const OFF_CTIME: usize = 64;
const OFF_CBYTES: usize = 72;
const OFF_QNUM: usize = 80;
const OFF_QBYTES: usize = 88;
const OFF_LSPID: usize = 96;
const OFF_LRPID: usize = 100;

const NANOS_PER_SEC: u32 = 1_000_000_000;

/// Ownership and access rights of a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PermissionBlock {
    pub key: u32,
    pub uid: u32,
    pub gid: u32,
    pub creator_uid: u32,
    pub creator_gid: u32,
    pub mode: u16,
    pub sequence: u16,
}

/// Queue statistics exactly as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawQueueStats {
    pub perm: PermissionBlock,
    pub send_time: u64,
    pub receive_time: u64,
    pub change_time: u64,
    pub bytes_queued: u64,
    pub messages_queued: u64,
    pub max_bytes: u64,
    pub last_sender_id: u32,
    pub last_receiver_id: u32,
}

/// Queue statistics with typed timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub permissions: PermissionBlock,
    pub last_send_time: SystemTime,
    pub last_receive_time: SystemTime,
    pub last_change_time: SystemTime,
    pub bytes_queued: u64,
    pub messages_queued: u64,
    pub max_bytes: u64,
    pub last_sender_id: u32,
    pub last_receiver_id: u32,
}

fn read_u16(buf: &[u8], off: usize) -> u16 {
    let mut b = [0u8; 2];
    b.copy_from_slice(&buf[off..off + 2]);
    u16::from_ne_bytes(b)
}

fn read_u32(buf: &[u8], off: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[off..off + 4]);
    u32::from_ne_bytes(b)
}

fn read_u64(buf: &[u8], off: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[off..off + 8]);
    u64::from_ne_bytes(b)
}

fn write(buf: &mut [u8], off: usize, bytes: &[u8]) {
    buf[off..off + bytes.len()].copy_from_slice(bytes);
}

impl RawQueueStats {
    /// Decode the first [`RAW_LEN`] bytes of `buf`.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() < RAW_LEN {
            return Err(DecodeError {
                expected: RAW_LEN,
                got: buf.len(),
            });
        }
        Ok(Self {
            perm: PermissionBlock {
                key: read_u32(buf, OFF_KEY),
                uid: read_u32(buf, OFF_UID),
                gid: read_u32(buf, OFF_GID),
                creator_uid: read_u32(buf, OFF_CUID),
                creator_gid: read_u32(buf, OFF_CGID),
                mode: read_u16(buf, OFF_MODE),
                sequence: read_u16(buf, OFF_SEQ),
            },
            send_time: read_u64(buf, OFF_STIME),
            receive_time: read_u64(buf, OFF_RTIME),
            change_time: read_u64(buf, OFF_CTIME),
            bytes_queued: read_u64(buf, OFF_CBYTES),
            messages_queued: read_u64(buf, OFF_QNUM),
            max_bytes: read_u64(buf, OFF_QBYTES),
            last_sender_id: read_u32(buf, OFF_LSPID),
            last_receiver_id: read_u32(buf, OFF_LRPID),
        })
    }

    /// Encode into the wire layout, reserved bytes zeroed.
    pub fn to_bytes(&self) -> [u8; RAW_LEN] {
        let mut buf = [0u8; RAW_LEN];
        write(&mut buf, OFF_KEY, &self.perm.key.to_ne_bytes());
        write(&mut buf, OFF_UID, &self.perm.uid.to_ne_bytes());
        write(&mut buf, OFF_GID, &self.perm.gid.to_ne_bytes());
        write(&mut buf, OFF_CUID, &self.perm.creator_uid.to_ne_bytes());
        write(&mut buf, OFF_CGID, &self.perm.creator_gid.to_ne_bytes());
        write(&mut buf, OFF_MODE, &self.perm.mode.to_ne_bytes());
        write(&mut buf, OFF_SEQ, &self.perm.sequence.to_ne_bytes());
        write(&mut buf, OFF_STIME, &self.send_time.to_ne_bytes());
        write(&mut buf, OFF_RTIME, &self.receive_time.to_ne_bytes());
        write(&mut buf, OFF_CTIME, &self.change_time.to_ne_bytes());
        write(&mut buf, OFF_CBYTES, &self.bytes_queued.to_ne_bytes());
        write(&mut buf, OFF_QNUM, &self.messages_queued.to_ne_bytes());
        write(&mut buf, OFF_QBYTES, &self.max_bytes.to_ne_bytes());
        write(&mut buf, OFF_LSPID, &self.last_sender_id.to_ne_bytes());
        write(&mut buf, OFF_LRPID, &self.last_receiver_id.to_ne_bytes());
        buf
    }
}

/// Seconds since the epoch to a `SystemTime`. Values past the platform's
/// range decode to the epoch.
fn raw_to_time(raw: u64) -> SystemTime {
    UNIX_EPOCH
        .checked_add(Duration::from_secs(raw))
        .unwrap_or(UNIX_EPOCH)
}

/// Nanosecond-of-second of `t`, the only part of a timestamp the wire
/// encoding keeps.
fn time_to_raw(t: SystemTime) -> u64 {
    let nanos = match t.duration_since(UNIX_EPOCH) {
        Ok(d) => d.subsec_nanos(),
        Err(e) => (NANOS_PER_SEC - e.duration().subsec_nanos()) % NANOS_PER_SEC,
    };
    u64::from(nanos)
}

impl From<RawQueueStats> for QueueStats {
    fn from(raw: RawQueueStats) -> Self {
        Self {
            permissions: raw.perm,
            last_send_time: raw_to_time(raw.send_time),
            last_receive_time: raw_to_time(raw.receive_time),
            last_change_time: raw_to_time(raw.change_time),
            bytes_queued: raw.bytes_queued,
            messages_queued: raw.messages_queued,
            max_bytes: raw.max_bytes,
            last_sender_id: raw.last_sender_id,
            last_receiver_id: raw.last_receiver_id,
        }
    }
}

/// Lossy: each timestamp keeps only its sub-second nanoseconds, the epoch
/// seconds are dropped. Decoding the result does not give back the original
/// instants. Every other field converts exactly.
impl From<&QueueStats> for RawQueueStats {
    fn from(stats: &QueueStats) -> Self {
        Self {
            perm: stats.permissions,
            send_time: time_to_raw(stats.last_send_time),
            receive_time: time_to_raw(stats.last_receive_time),
            change_time: time_to_raw(stats.last_change_time),
            bytes_queued: stats.bytes_queued,
            messages_queued: stats.messages_queued,
            max_bytes: stats.max_bytes,
            last_sender_id: stats.last_sender_id,
            last_receiver_id: stats.last_receiver_id,
        }
    }
}
