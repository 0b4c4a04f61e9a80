// SPDX-FileCopyrightText: 2024 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::backend::{Backend, Cdev};
use crate::buffer::Buffer;
use crate::chip::Device;
use crate::line::{Direction, EdgeKind, Offset, Tag};
use crate::options::{consumer_name, LineOptions, SessionOptions};
use crate::tags::{self, TagMap};
use crate::{Error, Result, UapiCall};
use gpiotag_uapi::v1;
#[cfg(feature = "serde")]
use serde_derive::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// An edge event reported by a [`Watcher`].
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct Event {
    /// The tag of the line that triggered the event.
    pub tag: Tag,

    /// The offset of the line that triggered the event.
    pub offset: Offset,

    /// The edge that triggered the event.
    pub edge: EdgeKind,

    /// The best estimate of the time the event occurred, in nanoseconds.
    ///
    /// The clock is CLOCK_MONOTONIC.
    pub timestamp_ns: u64,
}

impl Event {
    /// The event timestamp as a [`Duration`] since the clock epoch.
    pub fn timestamp(&self) -> Duration {
        Duration::from_nanos(self.timestamp_ns)
    }
}

/// An active request of a set of lines for edge detection.
///
/// Each line is requested individually, and the lines are grouped for
/// waiting on events. If any line cannot be requested then any lines
/// already requested are released and the watcher is not returned.
///
/// # Event Queuing
///
/// Events are queued in the kernel per line, and are returned in the order
/// they were queued. Overflow of the kernel queue drops events, and is not
/// reported.
///
/// # Closing
///
/// Dropping the watcher releases the lines. Use [`close`] to learn if any
/// release failed.
///
/// [`close`]: Watcher::close
#[derive(Debug)]
pub struct Watcher<B: Backend = Cdev> {
    backend: B,
    // group precedes lines so it is dropped first
    group: B::Fd,
    // in slot order
    lines: Vec<B::Fd>,
    tags: Arc<TagMap>,
    consumer: String,
}

impl<B: Backend> Watcher<B> {
    /// Request a set of lines from the device for edge detection.
    ///
    /// The `lines` map each line offset to its options, and `opts` apply to
    /// all of the lines. The lines are always inputs.
    ///
    /// # Examples
    /// ```no_run
    /// # use gpiotag::{Device, EdgeDetection, LineOptions, SessionOptions, Watcher};
    /// # use std::time::Duration;
    /// # fn example() -> gpiotag::Result<()> {
    /// let dev = Device::open("/dev/gpiochip0")?;
    /// let w = Watcher::acquire(
    ///     &dev,
    ///     [
    ///         (22, LineOptions::tagged("button")),
    ///         (23, LineOptions::tagged("door").with_edge_detection(EdgeDetection::RisingEdge).clone()),
    ///     ],
    ///     &SessionOptions::default(),
    /// )?;
    /// while let Some(evt) = w.wait_for_event(Some(Duration::from_secs(1)))? {
    ///     println!("{} {:?}", evt.tag, evt.edge);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn acquire<I>(dev: &Device<B>, lines: I, opts: &SessionOptions) -> Result<Watcher<B>>
    where
        I: IntoIterator<Item = (Offset, LineOptions)>,
    {
        if opts.direction == Some(Direction::Output) {
            return Err(Error::InvalidArgument(
                "Watched lines must be inputs.".into(),
            ));
        }
        let (tm, line_opts) = tags::build(lines)?;
        for (slot, lo) in line_opts.iter().enumerate() {
            if lo.initial_value.is_some() {
                return Err(Error::InvalidArgument(format!(
                    "Initial value specified for line {}, which is not an output.",
                    tm.tag_at(slot)
                )));
            }
        }
        let consumer = opts.consumer();
        let mut handleflags = v1::HandleRequestFlags::from(opts);
        handleflags.insert(v1::HandleRequestFlags::INPUT);

        let backend = dev.backend().clone();
        let group = backend
            .new_event_group()
            .map_err(|e| Error::Uapi(UapiCall::NewEventGroup, e))?;
        let mut builder = Builder {
            backend: &backend,
            group,
            lines: Vec::with_capacity(tm.len()),
        };
        for (slot, lo) in line_opts.iter().enumerate() {
            let offset = tm.offsets()[slot];
            let er = v1::EventRequest {
                offset,
                handleflags,
                eventflags: lo.edge_detection.unwrap_or_default().into(),
                consumer: consumer_name(&consumer),
                ..Default::default()
            };
            if let Err(e) = builder.add(dev, er) {
                builder.rollback();
                return Err(Error::Line {
                    offset,
                    tag: tm.tag_at(slot).clone(),
                    source: Box::new(e),
                });
            }
        }
        let Builder { group, lines, .. } = builder;
        log::debug!(
            "{} watching lines {:?} on {}",
            consumer,
            tm.offsets(),
            dev.path().display()
        );
        Ok(Watcher {
            backend,
            group,
            lines,
            tags: Arc::new(tm),
            consumer,
        })
    }

    /// Create a buffer for the lines of the watcher.
    ///
    /// All lines in the buffer are initially inactive.
    pub fn buffer(&self) -> Buffer {
        Buffer::new(self.tags.clone())
    }

    /// Read the current value of one line into the buffer.
    ///
    /// Returns the value read. Queued events are not affected.
    pub fn poll<T: Into<Tag>>(&self, buf: &mut Buffer, tag: T) -> Result<bool> {
        buf.check_tags(&self.tags)?;
        let slot = self.tags.slot(&tag.into())?;
        let mut vals = v1::LineValues::default();
        self.backend
            .get_values(&self.lines[slot], &mut vals)
            .map_err(|e| Error::Uapi(UapiCall::GetEventValues, e))?;
        let value = vals.get(0) != 0;
        buf.set_slot(slot, value);
        Ok(value)
    }

    /// Wait for the next edge event on any of the lines.
    ///
    /// Returns None if the timeout expires first.
    /// A timeout of None, or one too large to be represented as a deadline, waits indefinitely.
    pub fn wait_for_event(&self, timeout: Option<Duration>) -> Result<Option<Event>> {
        let offset = match self
            .backend
            .wait_event(&self.group, timeout)
            .map_err(|e| Error::Uapi(UapiCall::WaitEvent, e))?
        {
            Some(offset) => offset,
            None => return Ok(None),
        };
        let slot = self.tags.slot_of_offset(offset).ok_or_else(|| {
            Error::UnexpectedResponse(format!("event reported for unwatched line {}", offset))
        })?;
        let le = self
            .backend
            .read_event(&self.lines[slot])
            .map_err(|e| Error::Uapi(UapiCall::ReadEvent, e))?;
        let evt = Event {
            tag: self.tags.tag_at(slot).clone(),
            offset,
            edge: le.kind.into(),
            timestamp_ns: le.timestamp_ns,
        };
        log::trace!("{:?}", evt);
        Ok(Some(evt))
    }

    /// Release the lines.
    ///
    /// All lines are released even if some fail, and the first failure is returned.
    pub fn close(self) -> Result<()> {
        log::debug!("{} releasing lines {:?}", self.consumer, self.tags.offsets());
        let mut res = self
            .backend
            .close(self.group)
            .map_err(|e| Error::Uapi(UapiCall::Close, e));
        for (slot, fd) in self.lines.into_iter().enumerate() {
            if let Err(e) = self.backend.close(fd) {
                let offset = self.tags.offsets()[slot];
                log::warn!("failed to release line {}: {}", offset, e);
                if res.is_ok() {
                    res = Err(Error::Line {
                        offset,
                        tag: self.tags.tag_at(slot).clone(),
                        source: Box::new(Error::Uapi(UapiCall::Close, e)),
                    });
                }
            }
        }
        res
    }

    /// The tag map for the lines.
    pub fn tags(&self) -> &TagMap {
        &self.tags
    }

    /// The offsets of the lines, in ascending order.
    pub fn offsets(&self) -> &[Offset] {
        self.tags.offsets()
    }

    /// The number of lines in the watcher.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// A watcher is never empty, but this keeps clippy happy.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// The tag of the line with the given offset.
    pub fn tag(&self, offset: Offset) -> Option<&Tag> {
        self.tags.tag(offset)
    }

    /// The offset of the line identified by the tag.
    pub fn offset<T: Into<Tag>>(&self, tag: T) -> Option<Offset> {
        self.tags.offset(&tag.into())
    }

    /// The consumer label applied to the lines.
    pub fn consumer(&self) -> &str {
        &self.consumer
    }
}

// The descriptors acquired so far while building a watcher.
struct Builder<'a, B: Backend> {
    backend: &'a B,
    group: B::Fd,
    lines: Vec<B::Fd>,
}

impl<B: Backend> Builder<'_, B> {
    fn add(&mut self, dev: &Device<B>, er: v1::EventRequest) -> Result<()> {
        let offset = er.offset;
        let fd = self
            .backend
            .request_event(dev.fd(), er)
            .map_err(|e| Error::Uapi(UapiCall::GetLineEvent, e))?;
        // keep fd before adding to the group so a failure to add still releases it
        self.lines.push(fd);
        let fd = &self.lines[self.lines.len() - 1];
        self.backend
            .add_to_event_group(&self.group, fd, offset)
            .map_err(|e| Error::Uapi(UapiCall::AddToEventGroup, e))
    }

    fn rollback(self) {
        if let Err(e) = self.backend.close(self.group) {
            log::warn!("failed to close event group: {}", e);
        }
        for fd in self.lines {
            if let Err(e) = self.backend.close(fd) {
                log::warn!("failed to release line: {}", e);
            }
        }
    }
}
