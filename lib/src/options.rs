// SPDX-FileCopyrightText: 2021 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::line::{Bias, Direction, EdgeDetection, Tag};
use gpiotag_uapi::{v1, Name};
#[cfg(feature = "serde")]
use serde_derive::{Deserialize, Serialize};

/// The configuration applied uniformly to all the lines of a [`Handle`] or [`Watcher`].
///
/// # Examples
/// ```
/// # use gpiotag::SessionOptions;
/// let mut opts = SessionOptions::default();
/// opts.as_output().as_open_drain().with_consumer("relays");
/// ```
///
/// [`Handle`]: crate::handle::Handle
/// [`Watcher`]: crate::watcher::Watcher
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct SessionOptions {
    /// The active low setting for the lines.
    pub active_low: bool,

    /// The direction setting for the lines.
    ///
    /// If None then the direction is left as is, which is chip dependent.
    pub direction: Option<Direction>,

    /// Drive output lines as open drain.
    pub open_drain: bool,

    /// Drive output lines as open source.
    pub open_source: bool,

    /// The bias setting for the lines.
    pub bias: Option<Bias>,

    /// The consumer label applied to the lines.
    ///
    /// If not specified, a label *"gpiotag-p**PID**"* is applied,
    /// where **PID** is the process id of the application.
    pub consumer: Option<String>,
}

impl SessionOptions {
    /// Set the lines to input.
    pub fn as_input(&mut self) -> &mut Self {
        self.direction = Some(Direction::Input);
        self
    }

    /// Set the lines to output.
    ///
    /// Initial values are set per line via [`LineOptions::with_initial_value`].
    pub fn as_output(&mut self) -> &mut Self {
        self.direction = Some(Direction::Output);
        self
    }

    /// Set the lines to active low.
    pub fn as_active_low(&mut self) -> &mut Self {
        self.active_low = true;
        self
    }

    /// Set the lines to open drain.
    ///
    /// Only applicable to output lines.
    pub fn as_open_drain(&mut self) -> &mut Self {
        self.open_drain = true;
        self
    }

    /// Set the lines to open source.
    ///
    /// Only applicable to output lines.
    pub fn as_open_source(&mut self) -> &mut Self {
        self.open_source = true;
        self
    }

    /// Set the bias for the lines.
    pub fn with_bias<B: Into<Option<Bias>>>(&mut self, bias: B) -> &mut Self {
        self.bias = bias.into();
        self
    }

    /// Set the consumer label for the lines.
    pub fn with_consumer<N: Into<String>>(&mut self, consumer: N) -> &mut Self {
        self.consumer = Some(consumer.into());
        self
    }

    /// The consumer label to be applied to the lines.
    pub fn consumer(&self) -> String {
        match &self.consumer {
            Some(c) => c.clone(),
            None => default_consumer(),
        }
    }
}

// Invalid combinations are left for the kernel to reject.
impl From<&SessionOptions> for v1::HandleRequestFlags {
    fn from(opts: &SessionOptions) -> v1::HandleRequestFlags {
        let mut flags = v1::HandleRequestFlags::default();
        match opts.direction {
            None => {}
            Some(Direction::Input) => flags.set(v1::HandleRequestFlags::INPUT, true),
            Some(Direction::Output) => flags.set(v1::HandleRequestFlags::OUTPUT, true),
        };
        flags.set(v1::HandleRequestFlags::ACTIVE_LOW, opts.active_low);
        flags.set(v1::HandleRequestFlags::OPEN_DRAIN, opts.open_drain);
        flags.set(v1::HandleRequestFlags::OPEN_SOURCE, opts.open_source);
        match opts.bias {
            None => {}
            Some(Bias::PullUp) => flags.set(v1::HandleRequestFlags::BIAS_PULL_UP, true),
            Some(Bias::PullDown) => flags.set(v1::HandleRequestFlags::BIAS_PULL_DOWN, true),
            Some(Bias::Disabled) => flags.set(v1::HandleRequestFlags::BIAS_DISABLED, true),
        };
        flags
    }
}

/// The configuration for an individual line.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct LineOptions {
    /// The tag used to address the line.
    ///
    /// Defaults to the line offset.
    pub tag: Option<Tag>,

    /// The initial logical value of an output line.
    ///
    /// Only valid for output lines. Defaults to inactive.
    pub initial_value: Option<bool>,

    /// The edges to report for a watched line.
    ///
    /// Only valid for watched lines. Defaults to both edges.
    pub edge_detection: Option<EdgeDetection>,
}

impl LineOptions {
    /// Create options for a line addressed by the given tag.
    pub fn tagged<T: Into<Tag>>(tag: T) -> Self {
        LineOptions {
            tag: Some(tag.into()),
            ..Default::default()
        }
    }

    /// Set the tag for the line.
    pub fn with_tag<T: Into<Tag>>(&mut self, tag: T) -> &mut Self {
        self.tag = Some(tag.into());
        self
    }

    /// Set the initial value for an output line.
    pub fn with_initial_value(&mut self, value: bool) -> &mut Self {
        self.initial_value = Some(value);
        self
    }

    /// Set the edges to be detected on a watched line.
    pub fn with_edge_detection(&mut self, edge: EdgeDetection) -> &mut Self {
        self.edge_detection = Some(edge);
        self
    }
}

impl From<EdgeDetection> for v1::EventRequestFlags {
    fn from(edge: EdgeDetection) -> v1::EventRequestFlags {
        match edge {
            EdgeDetection::RisingEdge => v1::EventRequestFlags::RISING_EDGE,
            EdgeDetection::FallingEdge => v1::EventRequestFlags::FALLING_EDGE,
            EdgeDetection::BothEdges => v1::EventRequestFlags::BOTH_EDGES,
        }
    }
}

pub(crate) fn consumer_name(consumer: &str) -> Name {
    Name::from(consumer)
}

fn default_consumer() -> String {
    format!("gpiotag-p{}", std::process::id())
}

#[cfg(test)]
mod tests {
    use super::*;

    mod session_options {
        use super::*;

        #[test]
        fn default() {
            let opts = SessionOptions::default();
            assert!(!opts.active_low);
            assert_eq!(opts.direction, None);
            assert!(!opts.open_drain);
            assert!(!opts.open_source);
            assert_eq!(opts.bias, None);
            assert_eq!(opts.consumer, None);
        }

        #[test]
        fn mutators() {
            let mut opts = SessionOptions::default();
            opts.as_output()
                .as_active_low()
                .as_open_source()
                .with_bias(Bias::PullUp)
                .with_consumer("banana");
            assert_eq!(opts.direction, Some(Direction::Output));
            assert!(opts.active_low);
            assert!(opts.open_source);
            assert_eq!(opts.bias, Some(Bias::PullUp));
            assert_eq!(opts.consumer.as_deref(), Some("banana"));
            opts.as_input().as_open_drain().with_bias(None);
            assert_eq!(opts.direction, Some(Direction::Input));
            assert!(opts.open_drain);
            assert_eq!(opts.bias, None);
        }

        #[test]
        fn consumer() {
            let mut opts = SessionOptions::default();
            assert_eq!(
                opts.consumer(),
                format!("gpiotag-p{}", std::process::id())
            );
            opts.with_consumer("spice_weasel");
            assert_eq!(opts.consumer(), "spice_weasel");
        }
    }

    mod handle_request_flags {
        use super::*;

        #[test]
        fn from_session_options() {
            let mut opts = SessionOptions::default();
            assert!(v1::HandleRequestFlags::from(&opts).is_empty());

            opts.as_input();
            assert_eq!(
                v1::HandleRequestFlags::from(&opts),
                v1::HandleRequestFlags::INPUT
            );

            opts.as_output().as_active_low().as_open_drain();
            assert_eq!(
                v1::HandleRequestFlags::from(&opts),
                v1::HandleRequestFlags::OUTPUT
                    | v1::HandleRequestFlags::ACTIVE_LOW
                    | v1::HandleRequestFlags::OPEN_DRAIN
            );

            let mut opts = SessionOptions::default();
            opts.as_open_source().with_bias(Bias::PullDown);
            assert_eq!(
                v1::HandleRequestFlags::from(&opts),
                v1::HandleRequestFlags::OPEN_SOURCE | v1::HandleRequestFlags::BIAS_PULL_DOWN
            );
        }

        #[test]
        fn passes_conflicts() {
            let mut opts = SessionOptions::default();
            opts.as_input().as_open_drain().as_open_source();
            assert_eq!(
                v1::HandleRequestFlags::from(&opts),
                v1::HandleRequestFlags::INPUT
                    | v1::HandleRequestFlags::OPEN_DRAIN
                    | v1::HandleRequestFlags::OPEN_SOURCE
            );
        }
    }

    mod line_options {
        use super::*;

        #[test]
        fn mutators() {
            let mut lo = LineOptions::default();
            assert_eq!(lo.tag, None);
            lo.with_tag("led")
                .with_initial_value(true)
                .with_edge_detection(EdgeDetection::FallingEdge);
            assert_eq!(lo.tag, Some(Tag::from("led")));
            assert_eq!(lo.initial_value, Some(true));
            assert_eq!(lo.edge_detection, Some(EdgeDetection::FallingEdge));
        }

        #[test]
        fn tagged() {
            assert_eq!(LineOptions::tagged("button").tag, Some(Tag::from("button")));
        }
    }

    mod event_request_flags {
        use super::*;

        #[test]
        fn from_edge_detection() {
            assert_eq!(
                v1::EventRequestFlags::from(EdgeDetection::RisingEdge),
                v1::EventRequestFlags::RISING_EDGE
            );
            assert_eq!(
                v1::EventRequestFlags::from(EdgeDetection::FallingEdge),
                v1::EventRequestFlags::FALLING_EDGE
            );
            assert_eq!(
                v1::EventRequestFlags::from(EdgeDetection::BothEdges),
                v1::EventRequestFlags::BOTH_EDGES
            );
        }
    }
}
