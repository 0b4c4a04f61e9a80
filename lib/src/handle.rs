// SPDX-FileCopyrightText: 2024 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::backend::{Backend, Cdev};
use crate::buffer::Buffer;
use crate::chip::Device;
use crate::line::{Direction, Offset, Tag};
use crate::options::{consumer_name, LineOptions, SessionOptions};
use crate::tags::{self, TagMap};
use crate::{Error, Result, UapiCall};
use gpiotag_uapi::v1;
use std::sync::Arc;

/// An active request of a set of lines for synchronous reading and writing.
///
/// The lines are requested with a single kernel request, so either all
/// of the lines are acquired or none are.
///
/// # Output Lifetime
///
/// The value of an output line is only guaranteed for the lifetime of the handle.
/// If the handle is dropped or closed then the output value becomes indeterminate.
///
/// # Writing Multiple Lines
///
/// All the lines are written with a single call, but whether the driver
/// applies the values at the same instant is hardware dependent and so
/// is not guaranteed.
///
/// # Reading Output Values
///
/// Reading back output values using [`read`] is dependent on driver and
/// hardware support and so cannot be guaranteed to work, though frequently it does.
///
/// [`read`]: Handle::read
#[derive(Debug)]
pub struct Handle<B: Backend = Cdev> {
    backend: B,
    fd: B::Fd,
    tags: Arc<TagMap>,
    consumer: String,
}

impl<B: Backend> Handle<B> {
    /// Request a set of lines from the device.
    ///
    /// The `lines` map each line offset to its options, and `opts` apply to
    /// all of the lines.
    ///
    /// # Examples
    /// ```no_run
    /// # use gpiotag::{Device, Handle, LineOptions, SessionOptions};
    /// # fn example() -> gpiotag::Result<()> {
    /// let dev = Device::open(0)?;
    /// let h = Handle::acquire(
    ///     &dev,
    ///     [(5, LineOptions::tagged("door")), (6, LineOptions::tagged("window"))],
    ///     SessionOptions::default().as_input(),
    /// )?;
    /// let mut buf = h.buffer();
    /// h.read(&mut buf)?;
    /// println!("door open: {}", buf.get("door")?);
    /// # Ok(())
    /// # }
    /// ```
    pub fn acquire<I>(dev: &Device<B>, lines: I, opts: &SessionOptions) -> Result<Handle<B>>
    where
        I: IntoIterator<Item = (Offset, LineOptions)>,
    {
        let (tm, line_opts) = tags::build(lines)?;
        let output = opts.direction == Some(Direction::Output);
        let mut bits = 0;
        for (slot, lo) in line_opts.iter().enumerate() {
            if lo.edge_detection.is_some() {
                return Err(Error::InvalidArgument(format!(
                    "Edge detection specified for line {}, which is not being watched.",
                    tm.tag_at(slot)
                )));
            }
            match lo.initial_value {
                Some(_) if !output => {
                    return Err(Error::InvalidArgument(format!(
                        "Initial value specified for line {}, which is not an output.",
                        tm.tag_at(slot)
                    )))
                }
                Some(true) => bits |= 1 << slot,
                _ => {}
            }
        }
        let consumer = opts.consumer();
        let hr = v1::HandleRequest {
            offsets: v1::Offsets::from_slice(tm.offsets()),
            flags: v1::HandleRequestFlags::from(opts),
            values: v1::LineValues::from_bits(bits, tm.len()),
            consumer: consumer_name(&consumer),
            num_lines: tm.len() as u32,
            ..Default::default()
        };
        let backend = dev.backend().clone();
        let fd = backend
            .request_handle(dev.fd(), hr)
            .map_err(|e| Error::Uapi(UapiCall::GetLineHandle, e))?;
        log::debug!(
            "{} acquired lines {:?} on {}",
            consumer,
            tm.offsets(),
            dev.path().display()
        );
        Ok(Handle {
            backend,
            fd,
            tags: Arc::new(tm),
            consumer,
        })
    }

    /// Create a buffer for the lines of the handle.
    ///
    /// All lines in the buffer are initially inactive.
    pub fn buffer(&self) -> Buffer {
        Buffer::new(self.tags.clone())
    }

    /// Read the values of all the lines into the buffer.
    pub fn read(&self, buf: &mut Buffer) -> Result<()> {
        buf.check_tags(&self.tags)?;
        let mut vals = v1::LineValues::default();
        self.backend
            .get_values(&self.fd, &mut vals)
            .map_err(|e| Error::Uapi(UapiCall::GetHandleValues, e))?;
        buf.set_bits(vals.to_bits(self.tags.len()));
        Ok(())
    }

    /// Write the values of all the lines from the buffer.
    ///
    /// The lines must have been requested as outputs.
    pub fn write(&self, buf: &Buffer) -> Result<()> {
        buf.check_tags(&self.tags)?;
        let vals = v1::LineValues::from_bits(buf.bits(), self.tags.len());
        self.backend
            .set_values(&self.fd, &vals)
            .map_err(|e| Error::Uapi(UapiCall::SetHandleValues, e))
    }

    /// Release the lines.
    pub fn close(self) -> Result<()> {
        log::debug!("{} releasing lines {:?}", self.consumer, self.tags.offsets());
        self.backend
            .close(self.fd)
            .map_err(|e| Error::Uapi(UapiCall::Close, e))
    }

    /// The tag map for the lines.
    pub fn tags(&self) -> &TagMap {
        &self.tags
    }

    /// The offsets of the lines, in ascending order.
    pub fn offsets(&self) -> &[Offset] {
        self.tags.offsets()
    }

    /// The number of lines in the handle.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// A handle is never empty, but this keeps clippy happy.
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{Level, SimCall, Simulator};
    use crate::ErrorKind;
    use gpiotag_uapi::Errno;

    fn device(sim: &Simulator) -> Device<Simulator> {
        Device::open_with(sim.clone(), sim.dev_path()).unwrap()
    }

    fn output() -> SessionOptions {
        let mut opts = SessionOptions::default();
        opts.as_output().with_consumer("handle-test");
        opts
    }

    mod acquire {
        use super::*;

        #[test]
        fn initial_values() {
            let sim = Simulator::new(8);
            let dev = device(&sim);
            let h = Handle::acquire(
                &dev,
                [
                    (6, LineOptions::tagged("b").with_initial_value(true).clone()),
                    (2, LineOptions::tagged("a").with_initial_value(false).clone()),
                    (4, LineOptions::default()),
                ],
                &output(),
            )
            .unwrap();
            assert_eq!(h.offsets(), &[2, 4, 6]);
            assert_eq!(h.len(), 3);
            assert_eq!(h.tag(6), Some(&Tag::from("b")));
            assert_eq!(h.offset(4), Some(4));
            assert_eq!(h.consumer(), "handle-test");
            assert_eq!(sim.get_level(2), Ok(Level::Low));
            assert_eq!(sim.get_level(4), Ok(Level::Low));
            assert_eq!(sim.get_level(6), Ok(Level::High));
            let li = dev.describe_line(6).unwrap();
            assert!(li.used);
            assert_eq!(li.direction, Direction::Output);
            assert_eq!(li.consumer.as_deref(), Some("handle-test"));
        }

        #[test]
        fn initial_value_on_input() {
            let sim = Simulator::new(8);
            let dev = device(&sim);
            let calls = sim.calls();
            let err = Handle::acquire(
                &dev,
                [(2, LineOptions::tagged("a").with_initial_value(true).clone())],
                SessionOptions::default().as_input(),
            )
            .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
            assert_eq!(sim.calls(), calls);
        }

        #[test]
        fn edge_detection() {
            let sim = Simulator::new(8);
            let dev = device(&sim);
            let err = Handle::acquire(
                &dev,
                [(
                    2,
                    LineOptions::default()
                        .with_edge_detection(crate::EdgeDetection::RisingEdge)
                        .clone(),
                )],
                &SessionOptions::default(),
            )
            .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        }

        #[test]
        fn busy() {
            let sim = Simulator::new(8);
            sim.hog(3, "kernel").unwrap();
            let dev = device(&sim);
            let fds = sim.open_fds();
            let err = Handle::acquire(
                &dev,
                [(2, LineOptions::default()), (3, LineOptions::default())],
                &output(),
            )
            .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::AlreadyRequested);
            assert_eq!(err.errno(), Some(Errno::EBUSY));
            assert_eq!(sim.open_fds(), fds);
            // nothing was reserved
            assert!(!dev.describe_line(2).unwrap().used);
        }

        #[test]
        fn bad_offset() {
            let sim = Simulator::new(8);
            let dev = device(&sim);
            let err = Handle::acquire(&dev, [(8, LineOptions::default())], &output())
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        }

        #[test]
        fn conflicting_flags() {
            let sim = Simulator::new(8);
            let dev = device(&sim);
            let err = Handle::acquire(
                &dev,
                [(1, LineOptions::default())],
                SessionOptions::default().as_input().as_open_drain(),
            )
            .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
            assert_eq!(err.errno(), Some(Errno::EINVAL));
        }
    }

    #[test]
    fn write_read() {
        let sim = Simulator::new(8);
        let dev = device(&sim);
        let h = Handle::acquire(
            &dev,
            [(1, LineOptions::tagged("x")), (5, LineOptions::tagged("y"))],
            &output(),
        )
        .unwrap();
        let mut buf = h.buffer();
        buf.set("y", true).unwrap();
        h.write(&buf).unwrap();
        assert_eq!(sim.get_level(1), Ok(Level::Low));
        assert_eq!(sim.get_level(5), Ok(Level::High));
        let mut buf2 = h.buffer();
        h.read(&mut buf2).unwrap();
        assert_eq!(buf2, buf);
    }

    #[test]
    fn active_low() {
        let sim = Simulator::new(8);
        let dev = device(&sim);
        let mut opts = output();
        opts.as_active_low();
        let h = Handle::acquire(&dev, [(1, LineOptions::tagged("x"))], &opts).unwrap();
        assert_eq!(sim.get_level(1), Ok(Level::High));
        let mut buf = h.buffer();
        buf.set("x", true).unwrap();
        h.write(&buf).unwrap();
        assert_eq!(sim.get_level(1), Ok(Level::Low));
    }

    #[test]
    fn read_input() {
        let sim = Simulator::new(8);
        sim.pullup(3).unwrap();
        let dev = device(&sim);
        let h = Handle::acquire(
            &dev,
            [(3, LineOptions::tagged("a")), (4, LineOptions::tagged("b"))],
            SessionOptions::default().as_input(),
        )
        .unwrap();
        let mut buf = h.buffer();
        buf.set("b", true).unwrap();
        h.read(&mut buf).unwrap();
        assert!(buf.get("a").unwrap());
        assert!(!buf.get("b").unwrap());
        let err = h.write(&buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    }

    #[test]
    fn foreign_buffer() {
        let sim = Simulator::new(8);
        let dev = device(&sim);
        let h = Handle::acquire(&dev, [(1, LineOptions::default())], &output()).unwrap();
        let mut buf = Buffer::new(TagMap::from_offsets(&[2]).unwrap());
        let calls = sim.calls();
        assert_eq!(h.read(&mut buf).unwrap_err().kind(), ErrorKind::InvalidArgument);
        assert_eq!(h.write(&buf).unwrap_err().kind(), ErrorKind::InvalidArgument);
        assert_eq!(sim.calls(), calls);

        // equivalent tag maps are interchangeable
        let buf = Buffer::new(TagMap::from_offsets(&[1]).unwrap());
        assert!(h.write(&buf).is_ok());
    }

    #[test]
    fn closed() {
        let sim = Simulator::new(8);
        let dev = device(&sim);
        let h = Handle::acquire(&dev, [(1, LineOptions::default())], &output()).unwrap();
        sim.inject_fault(SimCall::SetValues, 1, Errno::EBADF);
        let err = h.write(&h.buffer()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::HandleClosed);
        sim.inject_fault(SimCall::GetValues, 1, Errno::EBADF);
        let err = h.read(&mut h.buffer()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::HandleClosed);
    }

    #[test]
    fn close() {
        let sim = Simulator::new(8);
        let dev = device(&sim);
        let fds = sim.open_fds();
        let h = Handle::acquire(&dev, [(1, LineOptions::default())], &output()).unwrap();
        assert_eq!(sim.open_fds(), fds + 1);
        h.close().unwrap();
        assert_eq!(sim.open_fds(), fds);
        let h = Handle::acquire(&dev, [(1, LineOptions::default())], &output()).unwrap();
        drop(h);
        assert!(!dev.describe_line(1).unwrap().used);
    }
}
