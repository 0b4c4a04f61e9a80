// SPDX-FileCopyrightText: 2021 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A thin but safe Rust layer around the Linux GPIO uAPI v1 and the epoll
//! based event groups used to wait on sets of line event files.

pub(crate) mod common;

pub use common::{
    add_to_event_group, close, new_event_group, read_event, wait_event_group, Error, Name,
    Result, UnderReadError, ValidationError, NAME_LEN_MAX, NUM_LINES_MAX,
};
pub use nix::errno::Errno;

/// This module implements GPIO ABI v1 which was released in Linux v4.8.
///
/// ABI v1 requests lines either as a handle, for reading and writing a set of lines,
/// or as an event request, for edge detection on a single line.
pub mod v1;
