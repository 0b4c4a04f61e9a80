// SPDX-FileCopyrightText: 2024 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! An in-process simulation of a GPIO chip, implementing the [`Backend`] primitives.
//!
//! The [`Simulator`] behaves like a single GPIO character device, enforcing
//! exclusive line ownership and applying active-low inversion, while providing
//! controls to pull input lines, inject events and faults, and inspect the
//! descriptors it has handed out.
//!
//! ```
//! # use gpiotag::sim::Simulator;
//! # use gpiotag::{Device, Handle, LineOptions, SessionOptions};
//! # fn main() -> gpiotag::Result<()> {
//! let sim = Simulator::new(8);
//! let dev = Device::open_with(sim.clone(), sim.dev_path())?;
//! let mut opts = SessionOptions::default();
//! opts.as_output();
//! let h = Handle::acquire(&dev, [(3, LineOptions::tagged("led"))], &opts)?;
//! let mut buf = h.buffer();
//! buf.set("led", true)?;
//! h.write(&buf)?;
//! assert!(sim.get_level(3)?.is_high());
//! # Ok(())
//! # }
//! ```

use crate::backend::Backend;
use crate::line::{EdgeKind, Offset};
use crate::{Error, Result};
use gpiotag_uapi::{self as uapi, v1, Errno, Name, NUM_LINES_MAX};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// The physical value of a line.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Level {
    /// The line is physically low.
    #[default]
    Low,

    /// The line is physically high.
    High,
}

impl Level {
    /// Check if the level is high.
    pub fn is_high(&self) -> bool {
        *self == Level::High
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }
}

/// Identifiers for the [`Backend`] calls, used to target injected faults.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SimCall {
    Open,
    ChipInfo,
    LineInfo,
    RequestHandle,
    GetValues,
    SetValues,
    RequestEvent,
    NewEventGroup,
    AddToEventGroup,
    WaitEvent,
    ReadEvent,
    Close,
}

/// A simulated GPIO chip.
///
/// Clones refer to the same chip.
#[derive(Clone)]
pub struct Simulator {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<State>,
    cond: Condvar,
    epoch: Instant,
}

#[derive(Debug)]
struct State {
    path: PathBuf,
    name: String,
    label: String,
    lines: Vec<SimLine>,
    fds: HashMap<u64, FdKind>,
    next_id: u64,
    next_seq: u64,
    calls: usize,
    faults: Vec<Fault>,
}

#[derive(Debug, Default)]
struct SimLine {
    name: Option<String>,
    pull: Level,
    hog: Option<String>,
    req: Option<LineReq>,
}

#[derive(Debug)]
struct LineReq {
    fd: u64,
    consumer: String,
    flags: v1::HandleRequestFlags,
    // physical level, for outputs
    driven: Option<bool>,
}

#[derive(Debug)]
enum FdKind {
    Chip,
    Handle {
        offsets: Vec<Offset>,
        active_low: bool,
        output: bool,
    },
    Event {
        offset: Offset,
        active_low: bool,
        edges: v1::EventRequestFlags,
        queue: VecDeque<(u64, v1::LineEdgeEvent)>,
    },
    Group {
        members: Vec<(u64, Offset)>,
    },
}

#[derive(Debug)]
struct Fault {
    call: SimCall,
    remaining: usize,
    errno: Errno,
}

/// A descriptor returned by the [`Simulator`].
///
/// The resources it refers to are released when it is dropped.
pub struct SimFd {
    id: u64,
    sim: Simulator,
}

impl fmt::Debug for SimFd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimFd").field("id", &self.id).finish()
    }
}

impl Drop for SimFd {
    fn drop(&mut self) {
        self.sim.release(self.id);
    }
}

impl fmt::Debug for Simulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.state();
        f.debug_struct("Simulator")
            .field("path", &s.path)
            .field("num_lines", &s.lines.len())
            .finish()
    }
}

impl Simulator {
    /// Create a simulated chip with the given number of lines, located at `/dev/gpiochip0`.
    pub fn new(num_lines: u32) -> Simulator {
        Self::at(num_lines, "/dev/gpiochip0")
    }

    /// Create a simulated chip with the given number of lines, located at the given path.
    pub fn at<P: Into<PathBuf>>(num_lines: u32, path: P) -> Simulator {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut lines = Vec::new();
        lines.resize_with(num_lines as usize, SimLine::default);
        Simulator {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    path,
                    name,
                    label: "gpiotag-sim".into(),
                    lines,
                    fds: HashMap::new(),
                    next_id: 0,
                    next_seq: 0,
                    calls: 0,
                    faults: Vec::new(),
                }),
                cond: Condvar::new(),
                epoch: Instant::now(),
            }),
        }
    }

    /// The path to the simulated chip.
    pub fn dev_path(&self) -> PathBuf {
        self.state().path.clone()
    }

    /// Set the label reported in the chip info.
    pub fn set_label<N: Into<String>>(&self, label: N) {
        self.state().label = label.into();
    }

    /// Set the name of a line.
    pub fn name<N: Into<String>>(&self, offset: Offset, name: N) -> Result<()> {
        self.state().line_mut(offset)?.name = Some(name.into());
        Ok(())
    }

    /// Mark a line as in use by another consumer.
    pub fn hog<N: Into<String>>(&self, offset: Offset, consumer: N) -> Result<()> {
        self.state().line_mut(offset)?.hog = Some(consumer.into());
        Ok(())
    }

    /// Release a line hogged by [`hog`](Simulator::hog).
    pub fn unhog(&self, offset: Offset) -> Result<()> {
        self.state().line_mut(offset)?.hog = None;
        Ok(())
    }

    /// Pull a line to simulate the line being externally driven.
    ///
    /// Generates an edge event on a watched line if the level changes
    /// and the edge matches the edge detection of the watch.
    pub fn set_pull(&self, offset: Offset, pull: Level) -> Result<()> {
        let mut s = self.state();
        let before = s.line(offset)?.level();
        s.line_mut(offset)?.pull = pull;
        let after = s.line(offset)?.level();
        if before != after {
            let timestamp_ns = self.now_ns();
            s.edge(offset, after, timestamp_ns);
            self.inner.cond.notify_all();
        }
        Ok(())
    }

    /// Pull a line up to simulate the line being externally driven high.
    pub fn pullup(&self, offset: Offset) -> Result<()> {
        self.set_pull(offset, Level::High)
    }

    /// Pull a line down to simulate the line being externally driven low.
    pub fn pulldown(&self, offset: Offset) -> Result<()> {
        self.set_pull(offset, Level::Low)
    }

    /// Toggle the pull on a line.
    pub fn toggle(&self, offset: Offset) -> Result<Level> {
        let value = match self.state().line(offset)?.pull {
            Level::High => Level::Low,
            Level::Low => Level::High,
        };
        self.set_pull(offset, value)?;
        Ok(value)
    }

    /// Get the current physical level of a line.
    ///
    /// For requested output lines this is the driven level, else it is the pull.
    pub fn get_level(&self, offset: Offset) -> Result<Level> {
        Ok(Level::from(self.state().line(offset)?.level()))
    }

    /// Queue a raw edge event on the watch of a line, regardless of its edge detection.
    ///
    /// Returns the number of watches the event was queued on, which is 0 if the line
    /// is not being watched.
    pub fn inject_event(&self, offset: Offset, kind: EdgeKind, timestamp_ns: u64) -> Result<usize> {
        let mut s = self.state();
        s.line(offset)?;
        let n = s.queue_event(offset, timestamp_ns, |_, _| Some(kind));
        self.inner.cond.notify_all();
        Ok(n)
    }

    /// Make the `nth` subsequent call of the given kind fail with the errno.
    ///
    /// An `nth` of 1 fails the next call.
    pub fn inject_fault(&self, call: SimCall, nth: usize, errno: Errno) {
        self.state().faults.push(Fault {
            call,
            remaining: nth.max(1),
            errno,
        });
    }

    /// The number of descriptors currently open on the simulator.
    pub fn open_fds(&self) -> usize {
        self.state().fds.len()
    }

    /// The number of backend calls made on the simulator.
    pub fn calls(&self) -> usize {
        self.state().calls
    }

    fn now_ns(&self) -> u64 {
        self.inner.epoch.elapsed().as_nanos() as u64
    }

    fn state(&self) -> MutexGuard<'_, State> {
        match self.inner.state.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        }
    }

    // Lock the state for a backend call, counting the call and applying any fault.
    fn enter(&self, call: SimCall) -> uapi::Result<MutexGuard<'_, State>> {
        let mut s = self.state();
        s.calls += 1;
        let mut triggered = None;
        s.faults.retain_mut(|f| {
            if f.call != call || triggered.is_some() {
                return true;
            }
            f.remaining -= 1;
            if f.remaining == 0 {
                triggered = Some(f.errno);
                return false;
            }
            true
        });
        match triggered {
            Some(errno) => Err(uapi::Error::Os(errno)),
            None => Ok(s),
        }
    }

    fn new_fd(&self, s: &mut State, kind: FdKind) -> SimFd {
        let id = s.next_id;
        s.next_id += 1;
        s.fds.insert(id, kind);
        SimFd {
            id,
            sim: self.clone(),
        }
    }

    fn release(&self, id: u64) {
        let mut s = self.state();
        s.fds.remove(&id);
        for line in s.lines.iter_mut() {
            if line.req.as_ref().is_some_and(|r| r.fd == id) {
                line.req = None;
            }
        }
        for kind in s.fds.values_mut() {
            if let FdKind::Group { members } = kind {
                members.retain(|(m, _)| *m != id);
            }
        }
        self.inner.cond.notify_all();
    }
}

impl SimLine {
    fn level(&self) -> bool {
        self.req
            .as_ref()
            .and_then(|r| r.driven)
            .unwrap_or(self.pull.is_high())
    }

    fn is_used(&self) -> bool {
        self.req.is_some() || self.hog.is_some()
    }
}

impl State {
    fn line(&self, offset: Offset) -> Result<&SimLine> {
        self.lines
            .get(offset as usize)
            .ok_or_else(|| Error::InvalidArgument(format!("offset {} out of range.", offset)))
    }

    fn line_mut(&mut self, offset: Offset) -> Result<&mut SimLine> {
        self.lines
            .get_mut(offset as usize)
            .ok_or_else(|| Error::InvalidArgument(format!("offset {} out of range.", offset)))
    }

    fn fd(&self, fd: &SimFd) -> uapi::Result<&FdKind> {
        self.fds.get(&fd.id).ok_or(uapi::Error::Os(Errno::EBADF))
    }

    fn check_chip(&self, cfd: &SimFd) -> uapi::Result<()> {
        match self.fd(cfd)? {
            FdKind::Chip => Ok(()),
            _ => Err(uapi::Error::Os(Errno::ENOTTY)),
        }
    }

    fn check_offset(&self, offset: Offset) -> uapi::Result<()> {
        if offset as usize >= self.lines.len() {
            return Err(uapi::Error::Os(Errno::EINVAL));
        }
        Ok(())
    }

    // Queue an edge on the watches of a line following a change of physical level.
    fn edge(&mut self, offset: Offset, level: bool, timestamp_ns: u64) {
        self.queue_event(offset, timestamp_ns, |active_low, edges| {
            let (kind, flag) = if level ^ active_low {
                (EdgeKind::Rising, v1::EventRequestFlags::RISING_EDGE)
            } else {
                (EdgeKind::Falling, v1::EventRequestFlags::FALLING_EDGE)
            };
            edges.contains(flag).then_some(kind)
        });
    }

    fn queue_event<F>(&mut self, offset: Offset, timestamp_ns: u64, detect: F) -> usize
    where
        F: Fn(bool, v1::EventRequestFlags) -> Option<EdgeKind>,
    {
        let mut n = 0;
        for kind in self.fds.values_mut() {
            if let FdKind::Event {
                offset: o,
                active_low,
                edges,
                queue,
            } = kind
            {
                if *o != offset {
                    continue;
                }
                if let Some(edge) = detect(*active_low, *edges) {
                    let le = v1::LineEdgeEvent {
                        timestamp_ns,
                        kind: edge.into(),
                    };
                    queue.push_back((self.next_seq, le));
                    self.next_seq += 1;
                    n += 1;
                }
            }
        }
        n
    }

    // The group member with the oldest queued event.
    fn ready(&self, members: &[(u64, Offset)]) -> Option<Offset> {
        members
            .iter()
            .filter_map(|(id, token)| match self.fds.get(id) {
                Some(FdKind::Event { queue, .. }) => queue.front().map(|(seq, _)| (*seq, *token)),
                _ => None,
            })
            .min_by_key(|(seq, _)| *seq)
            .map(|(_, token)| token)
    }
}

fn consumer_string(n: &Name) -> String {
    n.as_os_str().to_string_lossy().into_owned()
}

impl Backend for Simulator {
    type Fd = SimFd;

    fn open(&self, path: &Path) -> uapi::Result<SimFd> {
        let mut s = self.enter(SimCall::Open)?;
        if s.path != path {
            return Err(uapi::Error::Os(Errno::ENOENT));
        }
        Ok(self.new_fd(&mut s, FdKind::Chip))
    }

    fn chip_info(&self, cfd: &SimFd) -> uapi::Result<v1::ChipInfo> {
        let s = self.enter(SimCall::ChipInfo)?;
        s.check_chip(cfd)?;
        Ok(v1::ChipInfo {
            name: Name::from(s.name.as_str()),
            label: Name::from(s.label.as_str()),
            num_lines: s.lines.len() as u32,
        })
    }

    fn line_info(&self, cfd: &SimFd, offset: Offset) -> uapi::Result<v1::LineInfo> {
        let s = self.enter(SimCall::LineInfo)?;
        s.check_chip(cfd)?;
        s.check_offset(offset)?;
        let line = &s.lines[offset as usize];
        let mut flags = v1::LineInfoFlags::empty();
        let mut consumer = Name::default();
        if let Some(hog) = &line.hog {
            flags |= v1::LineInfoFlags::USED;
            consumer = Name::from(hog.as_str());
        }
        if let Some(req) = &line.req {
            flags |= v1::LineInfoFlags::USED;
            consumer = Name::from(req.consumer.as_str());
            let rf = req.flags;
            flags.set(v1::LineInfoFlags::OUTPUT, req.driven.is_some());
            flags.set(
                v1::LineInfoFlags::ACTIVE_LOW,
                rf.contains(v1::HandleRequestFlags::ACTIVE_LOW),
            );
            flags.set(
                v1::LineInfoFlags::OPEN_DRAIN,
                rf.contains(v1::HandleRequestFlags::OPEN_DRAIN),
            );
            flags.set(
                v1::LineInfoFlags::OPEN_SOURCE,
                rf.contains(v1::HandleRequestFlags::OPEN_SOURCE),
            );
            flags.set(
                v1::LineInfoFlags::BIAS_PULL_UP,
                rf.contains(v1::HandleRequestFlags::BIAS_PULL_UP),
            );
            flags.set(
                v1::LineInfoFlags::BIAS_PULL_DOWN,
                rf.contains(v1::HandleRequestFlags::BIAS_PULL_DOWN),
            );
            flags.set(
                v1::LineInfoFlags::BIAS_DISABLED,
                rf.contains(v1::HandleRequestFlags::BIAS_DISABLED),
            );
        }
        Ok(v1::LineInfo {
            offset,
            flags,
            name: line
                .name
                .as_deref()
                .map(Name::from)
                .unwrap_or_default(),
            consumer,
        })
    }

    fn request_handle(&self, cfd: &SimFd, hr: v1::HandleRequest) -> uapi::Result<SimFd> {
        use v1::HandleRequestFlags as F;

        let mut s = self.enter(SimCall::RequestHandle)?;
        s.check_chip(cfd)?;
        let num_lines = hr.num_lines as usize;
        if num_lines == 0 || num_lines > NUM_LINES_MAX {
            return Err(uapi::Error::Os(Errno::EINVAL));
        }
        let f = hr.flags;
        let output = f.contains(F::OUTPUT);
        if (output && f.contains(F::INPUT))
            || (!output && f.intersects(F::OPEN_DRAIN | F::OPEN_SOURCE))
            || f.contains(F::OPEN_DRAIN | F::OPEN_SOURCE)
        {
            return Err(uapi::Error::Os(Errno::EINVAL));
        }
        let offsets: Vec<Offset> = (0..num_lines).map(|i| hr.offsets.get(i)).collect();
        for (i, &offset) in offsets.iter().enumerate() {
            s.check_offset(offset)?;
            if s.lines[offset as usize].is_used() || offsets[..i].contains(&offset) {
                return Err(uapi::Error::Os(Errno::EBUSY));
            }
        }
        let active_low = f.contains(F::ACTIVE_LOW);
        let consumer = consumer_string(&hr.consumer);
        let fd = self.new_fd(
            &mut s,
            FdKind::Handle {
                offsets: offsets.clone(),
                active_low,
                output,
            },
        );
        for (i, &offset) in offsets.iter().enumerate() {
            let driven = output.then(|| (hr.values.get(i) != 0) ^ active_low);
            s.lines[offset as usize].req = Some(LineReq {
                fd: fd.id,
                consumer: consumer.clone(),
                flags: f,
                driven,
            });
        }
        Ok(fd)
    }

    fn get_values(&self, lfd: &SimFd, vals: &mut v1::LineValues) -> uapi::Result<()> {
        let s = self.enter(SimCall::GetValues)?;
        match s.fd(lfd)? {
            FdKind::Handle {
                offsets,
                active_low,
                ..
            } => {
                for (i, offset) in offsets.iter().enumerate() {
                    let v = s.lines[*offset as usize].level() ^ active_low;
                    vals.set(i, v as u8);
                }
                Ok(())
            }
            FdKind::Event {
                offset, active_low, ..
            } => {
                let v = s.lines[*offset as usize].level() ^ active_low;
                vals.set(0, v as u8);
                Ok(())
            }
            _ => Err(uapi::Error::Os(Errno::ENOTTY)),
        }
    }

    fn set_values(&self, lfd: &SimFd, vals: &v1::LineValues) -> uapi::Result<()> {
        let mut s = self.enter(SimCall::SetValues)?;
        let (offsets, active_low) = match s.fd(lfd)? {
            FdKind::Handle {
                output: false, ..
            } => return Err(uapi::Error::Os(Errno::EPERM)),
            FdKind::Handle {
                offsets,
                active_low,
                ..
            } => (offsets.clone(), *active_low),
            FdKind::Event { .. } => return Err(uapi::Error::Os(Errno::EINVAL)),
            _ => return Err(uapi::Error::Os(Errno::ENOTTY)),
        };
        for (i, offset) in offsets.iter().enumerate() {
            if let Some(req) = s.lines[*offset as usize].req.as_mut() {
                req.driven = Some((vals.get(i) != 0) ^ active_low);
            }
        }
        Ok(())
    }

    fn request_event(&self, cfd: &SimFd, er: v1::EventRequest) -> uapi::Result<SimFd> {
        use v1::HandleRequestFlags as F;

        let mut s = self.enter(SimCall::RequestEvent)?;
        s.check_chip(cfd)?;
        s.check_offset(er.offset)?;
        if er
            .handleflags
            .intersects(F::OUTPUT | F::OPEN_DRAIN | F::OPEN_SOURCE)
        {
            return Err(uapi::Error::Os(Errno::EINVAL));
        }
        if s.lines[er.offset as usize].is_used() {
            return Err(uapi::Error::Os(Errno::EBUSY));
        }
        let fd = self.new_fd(
            &mut s,
            FdKind::Event {
                offset: er.offset,
                active_low: er.handleflags.contains(F::ACTIVE_LOW),
                edges: er.eventflags,
                queue: VecDeque::new(),
            },
        );
        s.lines[er.offset as usize].req = Some(LineReq {
            fd: fd.id,
            consumer: consumer_string(&er.consumer),
            flags: er.handleflags,
            driven: None,
        });
        Ok(fd)
    }

    fn new_event_group(&self) -> uapi::Result<SimFd> {
        let mut s = self.enter(SimCall::NewEventGroup)?;
        Ok(self.new_fd(
            &mut s,
            FdKind::Group {
                members: Vec::new(),
            },
        ))
    }

    fn add_to_event_group(&self, gfd: &SimFd, efd: &SimFd, offset: Offset) -> uapi::Result<()> {
        let mut s = self.enter(SimCall::AddToEventGroup)?;
        match s.fd(efd)? {
            FdKind::Event { .. } => {}
            _ => return Err(uapi::Error::Os(Errno::EPERM)),
        }
        match s.fds.get_mut(&gfd.id) {
            Some(FdKind::Group { members }) => {
                if members.iter().any(|(id, _)| *id == efd.id) {
                    return Err(uapi::Error::Os(Errno::EEXIST));
                }
                members.push((efd.id, offset));
                Ok(())
            }
            Some(_) => Err(uapi::Error::Os(Errno::EINVAL)),
            None => Err(uapi::Error::Os(Errno::EBADF)),
        }
    }

    fn wait_event(&self, gfd: &SimFd, timeout: Option<Duration>) -> uapi::Result<Option<Offset>> {
        // an unrepresentable deadline waits indefinitely
        let deadline = timeout.and_then(|d| Instant::now().checked_add(d));
        let mut s = self.enter(SimCall::WaitEvent)?;
        loop {
            let members = match s.fds.get(&gfd.id) {
                Some(FdKind::Group { members }) => members,
                Some(_) => return Err(uapi::Error::Os(Errno::EINVAL)),
                None => return Err(uapi::Error::Os(Errno::EBADF)),
            };
            if let Some(token) = s.ready(members) {
                return Ok(Some(token));
            }
            s = match deadline {
                None => match self.inner.cond.wait(s) {
                    Ok(g) => g,
                    Err(p) => p.into_inner(),
                },
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(None);
                    }
                    match self.inner.cond.wait_timeout(s, deadline - now) {
                        Ok((g, _)) => g,
                        Err(p) => p.into_inner().0,
                    }
                }
            };
        }
    }

    // Does not block if the queue is empty.
    fn read_event(&self, efd: &SimFd) -> uapi::Result<v1::LineEdgeEvent> {
        let mut s = self.enter(SimCall::ReadEvent)?;
        match s.fds.get_mut(&efd.id) {
            Some(FdKind::Event { queue, .. }) => queue
                .pop_front()
                .map(|(_, le)| le)
                .ok_or(uapi::Error::Os(Errno::EAGAIN)),
            Some(_) => Err(uapi::Error::Os(Errno::EINVAL)),
            None => Err(uapi::Error::Os(Errno::EBADF)),
        }
    }

    // The descriptor is released even if the close reports an error.
    fn close(&self, fd: SimFd) -> uapi::Result<()> {
        let res = self.enter(SimCall::Close).map(|_| ());
        drop(fd);
        res
    }
}
