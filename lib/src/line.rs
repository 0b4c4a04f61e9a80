// SPDX-FileCopyrightText: 2021 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use gpiotag_uapi::{v1, Name};
#[cfg(feature = "serde")]
use serde_derive::{Deserialize, Serialize};
use std::fmt;

/// An identifier for a line on a particular chip.
///
/// Valid offsets are in the range 0..`num_lines` as reported in the chip [`Info`](super::chip::Info).
pub type Offset = u32;

/// A caller chosen identifier for a line.
///
/// Tags stand in for raw line offsets when addressing lines in a [`Buffer`],
/// and identify the line that triggered an [`Event`].
/// A line with no explicit tag is tagged with its offset.
///
/// [`Buffer`]: crate::buffer::Buffer
/// [`Event`]: crate::watcher::Event
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "camelCase")
)]
pub enum Tag {
    /// A numeric tag.
    Offset(u32),

    /// A symbolic tag.
    Name(String),
}

impl From<u32> for Tag {
    fn from(n: u32) -> Self {
        Tag::Offset(n)
    }
}

impl From<&str> for Tag {
    fn from(s: &str) -> Self {
        Tag::Name(s.to_string())
    }
}

impl From<String> for Tag {
    fn from(s: String) -> Self {
        Tag::Name(s)
    }
}

impl From<&Tag> for Tag {
    fn from(t: &Tag) -> Self {
        t.clone()
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tag::Offset(n) => write!(f, "{}", n),
            Tag::Name(s) => write!(f, "{}", s),
        }
    }
}

/// The publicly available information for a line.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct Info {
    /// The line offset on the GPIO chip.
    pub offset: Offset,

    /// The name of this GPIO line, such as the output pin of the line on
    /// the chip, a rail or a pin header name on a board, as specified by the
    /// GPIO chip.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub name: Option<String>,

    /// A functional name for the consumer of this GPIO line as set
    /// by whatever is using it.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub consumer: Option<String>,

    /// When true the line is used and not available for request.
    pub used: bool,

    /// The direction of the line.
    pub direction: Direction,

    /// When true the line active state corresponds to a physical low.
    pub active_low: bool,

    /// When true the line is an open drain output.
    pub open_drain: bool,

    /// When true the line is an open source output.
    pub open_source: bool,

    /// The bias state of the line, if known.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub bias: Option<Bias>,
}

fn name_to_option(n: &Name) -> Option<String> {
    if n.is_empty() {
        return None;
    }
    Some(n.as_os_str().to_string_lossy().into_owned())
}

impl From<&v1::LineInfo> for Info {
    fn from(li: &v1::LineInfo) -> Self {
        Info {
            offset: li.offset,
            name: name_to_option(&li.name),
            consumer: name_to_option(&li.consumer),
            used: li.flags.contains(v1::LineInfoFlags::USED),
            direction: Direction::from(li.flags),
            active_low: li.flags.contains(v1::LineInfoFlags::ACTIVE_LOW),
            open_drain: li.flags.contains(v1::LineInfoFlags::OPEN_DRAIN),
            open_source: li.flags.contains(v1::LineInfoFlags::OPEN_SOURCE),
            bias: Bias::try_from(li.flags).ok(),
        }
    }
}

/// The direction of a line.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "camelCase")
)]
pub enum Direction {
    /// The line is an input.
    #[default]
    Input,

    /// The line is an output.
    Output,
}

impl From<v1::LineInfoFlags> for Direction {
    fn from(flags: v1::LineInfoFlags) -> Self {
        if flags.contains(v1::LineInfoFlags::OUTPUT) {
            return Direction::Output;
        }
        Direction::Input
    }
}

/// The bias settings for a line.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "camelCase")
)]
pub enum Bias {
    /// The line has pull-up enabled.
    PullUp,

    /// The line has pull-down enabled.
    PullDown,

    /// The line has bias disabled and will float unless externally driven.
    Disabled,
}

impl TryFrom<v1::LineInfoFlags> for Bias {
    type Error = ();

    fn try_from(flags: v1::LineInfoFlags) -> Result<Self, Self::Error> {
        if flags.contains(v1::LineInfoFlags::BIAS_PULL_UP) {
            return Ok(Bias::PullUp);
        }
        if flags.contains(v1::LineInfoFlags::BIAS_PULL_DOWN) {
            return Ok(Bias::PullDown);
        }
        if flags.contains(v1::LineInfoFlags::BIAS_DISABLED) {
            return Ok(Bias::Disabled);
        }
        Err(())
    }
}

/// The edge detection options for a watched line.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "camelCase")
)]
pub enum EdgeDetection {
    /// Edge detection is only enabled on rising edges.
    ///
    /// A rising edge means a transition from an inactive state to an active state.
    RisingEdge,

    /// Edge detection is only enabled on falling edges.
    ///
    /// A falling edge means a transition from an active state to an inactive state.
    FallingEdge,

    /// Edge detection is enabled on both rising and falling edges.
    #[default]
    BothEdges,
}

/// The cause of an [`Event`](crate::watcher::Event).
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "camelCase")
)]
pub enum EdgeKind {
    /// Indicates the line transitioned from inactive to active.
    Rising = 1,

    /// Indicates the line transitioned from active to inactive.
    Falling = 2,
}

impl From<v1::LineEdgeEventKind> for EdgeKind {
    fn from(kind: v1::LineEdgeEventKind) -> Self {
        match kind {
            v1::LineEdgeEventKind::RisingEdge => EdgeKind::Rising,
            v1::LineEdgeEventKind::FallingEdge => EdgeKind::Falling,
        }
    }
}

impl From<EdgeKind> for v1::LineEdgeEventKind {
    fn from(kind: EdgeKind) -> Self {
        match kind {
            EdgeKind::Rising => v1::LineEdgeEventKind::RisingEdge,
            EdgeKind::Falling => v1::LineEdgeEventKind::FallingEdge,
        }
    }
}
