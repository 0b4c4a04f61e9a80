// SPDX-FileCopyrightText: 2021 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A library for driving and monitoring GPIO lines on Linux platforms
//! using the GPIO character device, addressing lines by caller chosen tags
//! rather than raw line offsets.
//!
//! A [`Device`] is opened by path or index and provides chip and line introspection.
//!
//! Lines are requested from the [`Device`] as either:
//!  - a [`Handle`], for synchronous reading and writing of a set of lines, or
//!  - a [`Watcher`], for monitoring a set of lines for edge events.
//!
//! Both provide a [`Buffer`] that mirrors the state of their lines, which is
//! used to stage writes and receive reads.
//!
//! To toggle a pair of output lines:
//! ```no_run
//! # use gpiotag::Result;
//! use gpiotag::{Device, Handle, LineOptions, SessionOptions};
//!
//! # fn main() -> Result<()> {
//! let dev = Device::open("/dev/gpiochip0")?;
//! let mut opts = SessionOptions::default();
//! opts.as_output();
//! let handle = Handle::acquire(
//!     &dev,
//!     [
//!         (17, LineOptions::default().with_tag("led").with_initial_value(false).clone()),
//!         (27, LineOptions::default().with_tag("relay").clone()),
//!     ],
//!     &opts,
//! )?;
//! let mut buf = handle.buffer();
//! buf.toggle_all();
//! handle.write(&buf)?;
//! handle.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! [`Buffer`]: buffer::Buffer
//! [`Device`]: chip::Device
//! [`Handle`]: handle::Handle
//! [`Watcher`]: watcher::Watcher

use gpiotag_uapi as uapi;
use std::fmt;
use std::path::PathBuf;

pub use gpiotag_uapi::Errno;

/// The seam between the line abstractions and the kernel.
pub mod backend;

/// The in-memory mirror of line states.
pub mod buffer;

/// Types and functions specific to chips.
pub mod chip;

/// Synchronous multi-line read/write sessions.
pub mod handle;

/// Types specific to lines.
pub mod line;

/// Session and per-line configuration, and its translation to uAPI requests.
pub mod options;

/// A simulated backend for exercising the library without hardware.
pub mod sim;

/// The mapping between tags and the lines they identify.
pub mod tags;

/// Multi-line edge event sessions.
pub mod watcher;

pub use backend::{Backend, Cdev};
pub use buffer::Buffer;
pub use chip::{ChipId, Device};
pub use handle::Handle;
pub use line::{Direction, EdgeDetection, EdgeKind, Offset, Tag};
pub use options::{LineOptions, SessionOptions};
pub use watcher::{Event, Watcher};

/// Errors returned by [`gpiotag`] functions.
///
/// [`gpiotag`]: crate
#[derive(Clone, Debug, thiserror::Error, Eq, PartialEq)]
pub enum Error {
    /// An error returned when there is a problem with an argument.
    #[error("{0}")]
    InvalidArgument(String),

    /// The tag does not identify any line in the set.
    #[error("unknown tag: {0}")]
    UnknownTag(Tag),

    /// The path does not refer to a GPIO character device.
    #[error("\"{0}\" is not a GPIO character device.")]
    NotGpioChip(PathBuf),

    /// An error returned from an underlying os call that is not a uAPI call.
    #[error(transparent)]
    Os(#[from] Errno),

    /// An error returned from an underlying uAPI call.
    #[error("uAPI {0} returned: {1}")]
    Uapi(UapiCall, #[source] uapi::Error),

    /// The backend returned a response inconsistent with the request.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// The request for a particular line failed while building a multi-line session.
    #[error("line {offset} ({tag}): {source}")]
    Line {
        offset: Offset,
        tag: Tag,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// The category of the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidArgument(_) | Error::UnknownTag(_) => ErrorKind::InvalidArgument,
            Error::NotGpioChip(_) => ErrorKind::InappropriateDevice,
            Error::Os(e) => ErrorKind::from_errno(*e, Session::None),
            Error::Uapi(call, e) => match e.errno() {
                Some(errno) => ErrorKind::from_errno(errno, call.session()),
                None => ErrorKind::UnknownErrno,
            },
            Error::UnexpectedResponse(_) => ErrorKind::UnknownErrno,
            Error::Line { source, .. } => source.kind(),
        }
    }

    /// The OS error code underlying the error, if any.
    pub fn errno(&self) -> Option<Errno> {
        match self {
            Error::Os(e) => Some(*e),
            Error::Uapi(_, e) => e.errno(),
            Error::Line { source, .. } => source.errno(),
            _ => None,
        }
    }
}

/// The categories of error returned by [`gpiotag`] functions.
///
/// [`gpiotag`]: crate
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ErrorKind {
    /// The chip or file does not exist.
    NoSuchDevice,
    /// The caller lacks permission to access the chip.
    PermissionDenied,
    /// The file is not a GPIO character device.
    InappropriateDevice,
    /// The line is already requested by another user.
    AlreadyRequested,
    /// A bad line offset, conflicting configuration, or unknown tag.
    InvalidArgument,
    /// The handle descriptor has been closed.
    HandleClosed,
    /// The watcher descriptors have been closed.
    WatcherClosed,
    /// A system wide or per process descriptor limit has been reached.
    MaxWatchesExceeded,
    /// An OS error with no more specific mapping.
    UnknownErrno,
}

// The kind of session a uAPI call is made on behalf of.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Session {
    None,
    Handle,
    Watcher,
}

impl ErrorKind {
    fn from_errno(e: Errno, session: Session) -> ErrorKind {
        match e {
            Errno::ENOENT | Errno::ENODEV | Errno::ENXIO => ErrorKind::NoSuchDevice,
            Errno::EACCES | Errno::EPERM => ErrorKind::PermissionDenied,
            Errno::ENOTTY => ErrorKind::InappropriateDevice,
            Errno::EBUSY => ErrorKind::AlreadyRequested,
            Errno::EINVAL => ErrorKind::InvalidArgument,
            Errno::EBADF => match session {
                Session::Handle => ErrorKind::HandleClosed,
                Session::Watcher => ErrorKind::WatcherClosed,
                Session::None => ErrorKind::UnknownErrno,
            },
            Errno::EMFILE | Errno::ENFILE | Errno::ENOSPC => ErrorKind::MaxWatchesExceeded,
            _ => ErrorKind::UnknownErrno,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ErrorKind::NoSuchDevice => "no such device",
            ErrorKind::PermissionDenied => "permission denied",
            ErrorKind::InappropriateDevice => "not a GPIO chip",
            ErrorKind::AlreadyRequested => "line already requested",
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::HandleClosed => "handle closed",
            ErrorKind::WatcherClosed => "watcher closed",
            ErrorKind::MaxWatchesExceeded => "maximum watches exceeded",
            ErrorKind::UnknownErrno => "unknown errno",
        };
        write!(f, "{}", msg)
    }
}

/// Identifiers for the underlying uAPI calls.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UapiCall {
    AddToEventGroup,
    Close,
    GetChipInfo,
    GetEventValues,
    GetHandleValues,
    GetLineEvent,
    GetLineHandle,
    GetLineInfo,
    NewEventGroup,
    Open,
    ReadEvent,
    SetHandleValues,
    WaitEvent,
}

impl UapiCall {
    fn session(&self) -> Session {
        match self {
            UapiCall::GetHandleValues | UapiCall::SetHandleValues => Session::Handle,
            UapiCall::AddToEventGroup
            | UapiCall::GetEventValues
            | UapiCall::ReadEvent
            | UapiCall::WaitEvent => Session::Watcher,
            _ => Session::None,
        }
    }
}

impl fmt::Display for UapiCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UapiCall::AddToEventGroup => "add_to_event_group",
            UapiCall::Close => "close",
            UapiCall::GetChipInfo => "get_chip_info",
            UapiCall::GetEventValues => "get_line_values(event)",
            UapiCall::GetHandleValues => "get_line_values(handle)",
            UapiCall::GetLineEvent => "get_line_event",
            UapiCall::GetLineHandle => "get_line_handle",
            UapiCall::GetLineInfo => "get_line_info",
            UapiCall::NewEventGroup => "new_event_group",
            UapiCall::Open => "open",
            UapiCall::ReadEvent => "read_event",
            UapiCall::SetHandleValues => "set_line_values",
            UapiCall::WaitEvent => "wait_event",
        };
        write!(f, "{}", name)
    }
}

/// The result for [`gpiotag`] functions.
///
/// [`gpiotag`]: crate
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    mod error {
        use super::*;

        fn uapi(call: UapiCall, e: Errno) -> Error {
            Error::Uapi(call, uapi::Error::Os(e))
        }

        #[test]
        fn kind_from_errno() {
            use ErrorKind::*;
            let cases = [
                (UapiCall::Open, Errno::ENOENT, NoSuchDevice),
                (UapiCall::Open, Errno::ENODEV, NoSuchDevice),
                (UapiCall::Open, Errno::EACCES, PermissionDenied),
                (UapiCall::Open, Errno::EPERM, PermissionDenied),
                (UapiCall::GetChipInfo, Errno::ENOTTY, InappropriateDevice),
                (UapiCall::GetLineHandle, Errno::EBUSY, AlreadyRequested),
                (UapiCall::GetLineInfo, Errno::EINVAL, InvalidArgument),
                (UapiCall::GetLineEvent, Errno::EMFILE, MaxWatchesExceeded),
                (UapiCall::NewEventGroup, Errno::ENFILE, MaxWatchesExceeded),
                (UapiCall::AddToEventGroup, Errno::ENOSPC, MaxWatchesExceeded),
                (UapiCall::GetLineHandle, Errno::EIO, UnknownErrno),
            ];
            for (call, errno, kind) in cases {
                assert_eq!(uapi(call, errno).kind(), kind, "{} {}", call, errno);
            }
        }

        #[test]
        fn kind_closed() {
            assert_eq!(
                uapi(UapiCall::GetHandleValues, Errno::EBADF).kind(),
                ErrorKind::HandleClosed
            );
            assert_eq!(
                uapi(UapiCall::SetHandleValues, Errno::EBADF).kind(),
                ErrorKind::HandleClosed
            );
            assert_eq!(
                uapi(UapiCall::GetEventValues, Errno::EBADF).kind(),
                ErrorKind::WatcherClosed
            );
            assert_eq!(
                uapi(UapiCall::WaitEvent, Errno::EBADF).kind(),
                ErrorKind::WatcherClosed
            );
            assert_eq!(
                uapi(UapiCall::ReadEvent, Errno::EBADF).kind(),
                ErrorKind::WatcherClosed
            );
            assert_eq!(
                uapi(UapiCall::GetChipInfo, Errno::EBADF).kind(),
                ErrorKind::UnknownErrno
            );
        }

        #[test]
        fn kind_local() {
            assert_eq!(
                Error::UnknownTag(Tag::from("led")).kind(),
                ErrorKind::InvalidArgument
            );
            assert_eq!(
                Error::InvalidArgument("nope".into()).kind(),
                ErrorKind::InvalidArgument
            );
            assert_eq!(
                Error::NotGpioChip(PathBuf::from("/dev/null")).kind(),
                ErrorKind::InappropriateDevice
            );
            assert_eq!(Error::Os(Errno::ENOENT).kind(), ErrorKind::NoSuchDevice);
            let e = Error::Uapi(
                UapiCall::ReadEvent,
                uapi::Error::Validation(uapi::ValidationError::new("kind", "invalid value: 3")),
            );
            assert_eq!(e.kind(), ErrorKind::UnknownErrno);
            assert_eq!(e.errno(), None);
        }

        #[test]
        fn line() {
            let e = Error::Line {
                offset: 3,
                tag: Tag::from("button"),
                source: Box::new(uapi(UapiCall::GetLineEvent, Errno::EBUSY)),
            };
            assert_eq!(e.kind(), ErrorKind::AlreadyRequested);
            assert_eq!(e.errno(), Some(Errno::EBUSY));
            assert!(e.to_string().starts_with("line 3 (button): uAPI get_line_event"));
        }
    }
}
