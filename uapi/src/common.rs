// SPDX-FileCopyrightText: 2021 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use libc::{c_int, epoll_event, EPOLLIN, EPOLL_CLOEXEC, EPOLL_CTL_ADD};
use nix::errno::Errno;
use std::ffi::OsStr;
use std::fs::File;
use std::mem;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::{FromRawFd, IntoRawFd, RawFd};
use std::time::{Duration, Instant};

pub(crate) const IOCTL_MAGIC: u8 = 0xb4;

#[repr(u8)]
enum Ioctl {
    GetChipInfo = 1,
}

/// Information about a particular GPIO chip.
#[repr(C)]
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ChipInfo {
    /// The Linux kernel name of this GPIO chip.
    pub name: Name,

    /// A functional name for this GPIO chip, such as a product number.
    ///
    /// May be empty.
    pub label: Name,

    /// The number of GPIO lines on this chip.
    pub num_lines: u32,
}

/// Get the publicly available information for a chip.
///
/// * `cfd` - The fd of the open chip.
pub fn get_chip_info(cfd: RawFd) -> Result<ChipInfo> {
    let mut chip = ChipInfo::default();
    // SAFETY: returned struct contains raw byte arrays and ints that are safe to decode.
    match unsafe {
        libc::ioctl(
            cfd,
            nix::request_code_read!(IOCTL_MAGIC, Ioctl::GetChipInfo, mem::size_of::<ChipInfo>()),
            &mut chip,
        )
    } {
        0 => Ok(chip),
        _ => Err(Error::from_errno()),
    }
}

/// Read an event from a request or event group member into a buffer.
///
/// Returns the number of u64 words read.
///
/// * `fd` - The fd of the event source.
/// * `buf` - The buffer to read into, sized to a whole number of events.
pub fn read_event(fd: RawFd, buf: &mut [u64]) -> Result<usize> {
    // SAFETY: the buffer is owned and sized to the length passed to read.
    match unsafe {
        libc::read(
            fd,
            buf.as_mut_ptr() as *mut libc::c_void,
            mem::size_of_val(buf),
        )
    } {
        -1 => Err(Error::from_errno()),
        n => Ok(n as usize / 8),
    }
}

/// Close a file, reporting any error from the close.
///
/// Dropping a [`File`] also closes it, but silently discards any error.
pub fn close(f: File) -> Result<()> {
    let fd = f.into_raw_fd();
    // SAFETY: fd was owned by f and is not used again.
    match unsafe { libc::close(fd) } {
        0 => Ok(()),
        _ => Err(Error::from_errno()),
    }
}

/// Create an event group that can wait on a number of event sources at once.
///
/// The group is an epoll instance, so it consumes a file descriptor.
pub fn new_event_group() -> Result<File> {
    // SAFETY: the returned fd is owned by the returned File.
    match unsafe { libc::epoll_create1(EPOLL_CLOEXEC) } {
        -1 => Err(Error::from_errno()),
        gfd => Ok(unsafe { File::from_raw_fd(gfd) }),
    }
}

/// Add an event source to an event group.
///
/// * `gfd` - The fd of the group returned by [`new_event_group`].
/// * `fd` - The fd of the event source.
/// * `token` - The identifier returned by [`wait_event_group`] when the source is ready.
pub fn add_to_event_group(gfd: RawFd, fd: RawFd, token: u64) -> Result<()> {
    let mut ev = epoll_event {
        events: EPOLLIN as u32,
        u64: token,
    };
    // SAFETY: ev is only read by the kernel.
    match unsafe { libc::epoll_ctl(gfd, EPOLL_CTL_ADD, fd, &mut ev) } {
        0 => Ok(()),
        _ => Err(Error::from_errno()),
    }
}

/// Wait for any member of the event group to have an event available to read.
///
/// Returns the token of a ready member, or None if the timeout expired.
/// A timeout of None, or one too large to be represented as a deadline, waits indefinitely.
///
/// * `gfd` - The fd of the group returned by [`new_event_group`].
/// * `timeout` - The maximum time to wait.
pub fn wait_event_group(gfd: RawFd, timeout: Option<Duration>) -> Result<Option<u64>> {
    let deadline = timeout.and_then(|d| Instant::now().checked_add(d));
    loop {
        let ms = match deadline {
            None => -1,
            Some(deadline) => timeout_millis(deadline.saturating_duration_since(Instant::now())),
        };
        let mut ev = epoll_event { events: 0, u64: 0 };
        // SAFETY: ev is a single owned event and maxevents is 1.
        match unsafe { libc::epoll_wait(gfd, &mut ev, 1, ms) } {
            -1 => match Errno::last() {
                Errno::EINTR => continue,
                e => return Err(Error::Os(e)),
            },
            0 => return Ok(None),
            _ => return Ok(Some(ev.u64)),
        }
    }
}

// Rounds up, so a sub-millisecond timeout still waits.
fn timeout_millis(d: Duration) -> c_int {
    let ms = d.as_nanos().div_ceil(1_000_000);
    ms.min(c_int::MAX as u128) as c_int
}

/// The result returned by [`gpiotag_uapi`] functions.
///
/// [`gpiotag_uapi`]: crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by [`gpiotag_uapi`] functions.
///
/// [`gpiotag_uapi`]: crate
#[derive(Clone, Debug, thiserror::Error, Eq, PartialEq)]
pub enum Error {
    /// An error returned from an underlying system call.
    #[error(transparent)]
    Os(#[from] Errno),

    /// An error indicating insufficient data read for the expected object.
    #[error(transparent)]
    UnderRead(#[from] UnderReadError),

    /// An error validating an data structure retuned from the kernel
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl Error {
    /// Create an error from the current errno value.
    #[inline]
    pub fn from_errno() -> Error {
        Error::Os(Errno::last())
    }

    /// The OS error code, if the error originated from a system call.
    pub fn errno(&self) -> Option<Errno> {
        match self {
            Error::Os(e) => Some(*e),
            _ => None,
        }
    }
}

/// A failure to read sufficient bytes to construct an object.
//
// This should never happen - but is checked to be safe.
#[derive(Clone, Debug, thiserror::Error, Eq, PartialEq)]
#[error("Reading {obj} returned {found} bytes, expected {expected}.")]
pub struct UnderReadError {
    /// The struct that under read.
    pub obj: &'static str,
    /// The number of bytes expected.
    pub expected: usize,
    /// The number of bytes read.
    pub found: usize,
}

impl UnderReadError {
    /// Create an UnderReadError.
    pub(crate) fn new(obj: &'static str, expected: usize, found: usize) -> UnderReadError {
        UnderReadError {
            obj,
            expected,
            found,
        }
    }
}

/// A failure to validate a struct returned from a system call.
//
// Should only be seen if a kernel update adds an enum value we are unaware of.
#[derive(Clone, Debug, thiserror::Error, Eq, PartialEq)]
#[error("Kernel returned invalid {field}: {msg}")]
pub struct ValidationError {
    /// The field that failed to validate.
    pub field: String,
    /// The details of the validation failure.
    pub msg: String,
}

impl ValidationError {
    /// Create a ValidationError.
    pub fn new<S: Into<String>, T: Into<String>>(field: S, msg: T) -> ValidationError {
        ValidationError {
            field: field.into(),
            msg: msg.into(),
        }
    }
}

/// The maximum number of bytes stored in a Name.
pub const NAME_LEN_MAX: usize = 32;

/// A uAPI name string.
///
/// Names longer than [`NAME_LEN_MAX`] are truncated.
#[repr(C)]
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Name([u8; NAME_LEN_MAX]);

impl Name {
    /// Checks whether the Name is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0[0] == 0
    }

    /// The length of the contained name.
    #[inline]
    pub fn strlen(&self) -> usize {
        self.0.iter().position(|&x| x == 0).unwrap_or(self.0.len())
    }

    /// Convert the contained name to a OsString slice.
    pub fn as_os_str(&self) -> &OsStr {
        OsStr::from_bytes(&self.0[..self.strlen()])
    }

    /// Construct a Name from byte slice.
    ///
    /// May result in invalid UTF-8 if truncated in the middle of a multi-byte character.
    pub fn from_bytes(s: &[u8]) -> Name {
        let mut d: Name = Default::default();
        for (src, dst) in s.iter().zip(d.0.iter_mut()) {
            *dst = *src;
        }
        d
    }
}

impl From<&str> for Name {
    fn from(s: &str) -> Self {
        Name::from_bytes(s.as_bytes())
    }
}

/// An identifier for a line on a particular chip.
///
/// Valid offsets are in the range 0..`num_lines` as reported in the [`ChipInfo`].
pub type Offset = u32;

/// The maximum number of lines that may be requested in a single request.
pub const NUM_LINES_MAX: usize = 64;

/// A collection of line offsets.
///
/// Typically used to identify the lines belonging to a particular request.
#[repr(C)]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Offsets([Offset; NUM_LINES_MAX]);

impl Offsets {
    /// Create offsets from a slice.
    ///
    /// Offsets beyond [`NUM_LINES_MAX`] are ignored.
    pub fn from_slice(s: &[u32]) -> Self {
        let mut n: Offsets = Default::default();
        for (src, dst) in s.iter().zip(n.0.iter_mut()) {
            *dst = *src;
        }
        n
    }

    /// Get the indexed offset from the set.
    #[inline]
    pub fn get(&self, idx: usize) -> Offset {
        self.0[idx]
    }

    /// Set the indexed offset in the set.
    #[inline]
    pub fn set(&mut self, idx: usize, offset: Offset) {
        self.0[idx] = offset;
    }
}

impl Default for Offsets {
    fn default() -> Self {
        Offsets([0; NUM_LINES_MAX])
    }
}

/// The trigger identifier for a [`LineEdgeEvent`].
///
/// [`LineEdgeEvent`]: crate::v1::LineEdgeEvent
#[repr(u32)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LineEdgeEventKind {
    /// Indicates the line transitioned from *inactive* to *active*.
    RisingEdge = 1,

    /// Indicates the line transitioned from *active* to *inactive*.
    FallingEdge = 2,
}

impl TryFrom<u32> for LineEdgeEventKind {
    type Error = String;

    fn try_from(v: u32) -> std::result::Result<Self, Self::Error> {
        use LineEdgeEventKind::*;
        match v {
            x if x == RisingEdge as u32 => Ok(RisingEdge),
            x if x == FallingEdge as u32 => Ok(FallingEdge),
            _ => Err(format!("invalid value: {}", v)),
        }
    }
}
