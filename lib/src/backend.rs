// SPDX-FileCopyrightText: 2024 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::line::Offset;
use gpiotag_uapi::{self as uapi, v1, Errno, Result};
use std::fmt::Debug;
use std::fs::File;
use std::os::unix::prelude::AsRawFd;
use std::path::Path;
use std::time::Duration;

/// The primitives used to access a GPIO chip.
///
/// Each descriptor returned by a backend is owned by the caller and released
/// when dropped. Use [`close`] to release a descriptor and learn if the
/// release failed.
///
/// [`close`]: Backend::close
pub trait Backend: Clone + Debug {
    /// An open chip, line, or event group descriptor.
    type Fd: Debug;

    /// Open the chip at the path.
    fn open(&self, path: &Path) -> Result<Self::Fd>;

    /// Get the information for the chip.
    fn chip_info(&self, cfd: &Self::Fd) -> Result<v1::ChipInfo>;

    /// Get the information for a line on the chip.
    fn line_info(&self, cfd: &Self::Fd, offset: Offset) -> Result<v1::LineInfo>;

    /// Request a set of lines for reading and writing.
    fn request_handle(&self, cfd: &Self::Fd, hr: v1::HandleRequest) -> Result<Self::Fd>;

    /// Read the values of the lines of a handle or event descriptor.
    fn get_values(&self, lfd: &Self::Fd, vals: &mut v1::LineValues) -> Result<()>;

    /// Write the values of the lines of a handle descriptor.
    fn set_values(&self, lfd: &Self::Fd, vals: &v1::LineValues) -> Result<()>;

    /// Request a line with edge detection enabled.
    fn request_event(&self, cfd: &Self::Fd, er: v1::EventRequest) -> Result<Self::Fd>;

    /// Create an empty event group.
    fn new_event_group(&self) -> Result<Self::Fd>;

    /// Add an event descriptor to an event group, identified by its line offset.
    fn add_to_event_group(&self, gfd: &Self::Fd, efd: &Self::Fd, offset: Offset) -> Result<()>;

    /// Wait for a member of the event group to have an event available.
    ///
    /// Returns the offset of a member with an event available, or None if the
    /// timeout expired first. A timeout of None waits indefinitely.
    fn wait_event(&self, gfd: &Self::Fd, timeout: Option<Duration>) -> Result<Option<Offset>>;

    /// Read the next event from an event descriptor.
    fn read_event(&self, efd: &Self::Fd) -> Result<v1::LineEdgeEvent>;

    /// Release a descriptor.
    fn close(&self, fd: Self::Fd) -> Result<()>;
}

/// The GPIO character device, as provided by the Linux kernel.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Cdev;

impl Backend for Cdev {
    type Fd = File;

    fn open(&self, path: &Path) -> Result<File> {
        File::open(path)
            .map_err(|e| uapi::Error::Os(Errno::from_raw(e.raw_os_error().unwrap_or(0))))
    }

    fn chip_info(&self, cfd: &File) -> Result<v1::ChipInfo> {
        v1::get_chip_info(cfd.as_raw_fd())
    }

    fn line_info(&self, cfd: &File, offset: Offset) -> Result<v1::LineInfo> {
        v1::get_line_info(cfd.as_raw_fd(), offset)
    }

    fn request_handle(&self, cfd: &File, hr: v1::HandleRequest) -> Result<File> {
        v1::get_line_handle(cfd.as_raw_fd(), hr)
    }

    fn get_values(&self, lfd: &File, vals: &mut v1::LineValues) -> Result<()> {
        v1::get_line_values(lfd.as_raw_fd(), vals)
    }

    fn set_values(&self, lfd: &File, vals: &v1::LineValues) -> Result<()> {
        v1::set_line_values(lfd.as_raw_fd(), vals)
    }

    fn request_event(&self, cfd: &File, er: v1::EventRequest) -> Result<File> {
        v1::get_line_event(cfd.as_raw_fd(), er)
    }

    fn new_event_group(&self) -> Result<File> {
        uapi::new_event_group()
    }

    fn add_to_event_group(&self, gfd: &File, efd: &File, offset: Offset) -> Result<()> {
        uapi::add_to_event_group(gfd.as_raw_fd(), efd.as_raw_fd(), offset as u64)
    }

    fn wait_event(&self, gfd: &File, timeout: Option<Duration>) -> Result<Option<Offset>> {
        uapi::wait_event_group(gfd.as_raw_fd(), timeout).map(|t| t.map(|t| t as Offset))
    }

    fn read_event(&self, efd: &File) -> Result<v1::LineEdgeEvent> {
        let mut buf = [0_u64; v1::LINE_EDGE_EVENT_U64_SIZE];
        let n = uapi::read_event(efd.as_raw_fd(), &mut buf)?;
        v1::LineEdgeEvent::from_slice(&buf[0..n])
    }

    fn close(&self, fd: File) -> Result<()> {
        uapi::close(fd)
    }
}
