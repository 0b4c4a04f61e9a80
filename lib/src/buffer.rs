// SPDX-FileCopyrightText: 2024 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::line::Tag;
use crate::tags::TagMap;
use crate::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// The logical states of a set of lines.
///
/// A `Buffer` is an inert container. It performs no I/O itself, but is passed
/// to a [`Handle`] or [`Watcher`] to be written to, or read from, the hardware.
///
/// Lines are addressed by their tags, and states are logical, with `true` being
/// *active*. All lines start *inactive*.
///
/// A buffer may only be used with sessions whose tags map to the same offsets
/// as those it was created from.
///
/// # Examples
/// ```
/// # use gpiotag::{Buffer, LineOptions, tags::TagMap};
/// # fn main() -> gpiotag::Result<()> {
/// let tm = TagMap::from_lines([(17, LineOptions::tagged("a")), (27, LineOptions::tagged("b"))])?;
/// let mut buf = Buffer::new(tm);
/// buf.set("a", true)?.toggle("b")?;
/// assert!(buf.get("a")? && buf.get("b")?);
/// buf.clear_all();
/// assert!(!buf.get("a")?);
/// # Ok(())
/// # }
/// ```
///
/// [`Handle`]: crate::handle::Handle
/// [`Watcher`]: crate::watcher::Watcher
#[derive(Clone)]
pub struct Buffer {
    bits: u64,
    tags: Arc<TagMap>,
}

impl Buffer {
    /// Create a buffer for the lines in the tag map.
    pub fn new<T: Into<Arc<TagMap>>>(tags: T) -> Buffer {
        Buffer {
            bits: 0,
            tags: tags.into(),
        }
    }

    /// The tag map of the lines in the buffer.
    pub fn tag_map(&self) -> &TagMap {
        &self.tags
    }

    /// The number of lines in the buffer.
    #[inline]
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Check if the buffer contains no lines.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Check if the tag identifies a line in the buffer.
    pub fn contains<T: Into<Tag>>(&self, tag: T) -> bool {
        self.tags.contains(&tag.into())
    }

    /// Set all lines to inactive.
    pub fn clear_all(&mut self) -> &mut Self {
        self.bits = 0;
        self
    }

    /// Get the state of a line.
    pub fn get<T: Into<Tag>>(&self, tag: T) -> Result<bool> {
        let slot = self.tags.slot(&tag.into())?;
        Ok(self.get_slot(slot))
    }

    /// Get the states of all the lines.
    pub fn get_all(&self) -> HashMap<Tag, bool> {
        self.iter().map(|(t, v)| (t.clone(), v)).collect()
    }

    /// Get the states of a subset of the lines.
    ///
    /// Fails if any tag is unknown.
    pub fn get_many<I, T>(&self, tags: I) -> Result<HashMap<Tag, bool>>
    where
        I: IntoIterator<Item = T>,
        T: Into<Tag>,
    {
        tags.into_iter()
            .map(|t| {
                let tag = t.into();
                let slot = self.tags.slot(&tag)?;
                Ok((tag, self.get_slot(slot)))
            })
            .collect()
    }

    /// Set the state of a line.
    pub fn set<T: Into<Tag>>(&mut self, tag: T, value: bool) -> Result<&mut Self> {
        let slot = self.tags.slot(&tag.into())?;
        self.set_slot(slot, value);
        Ok(self)
    }

    /// Set the states of a number of lines.
    ///
    /// If any tag is unknown the buffer is left unchanged.
    pub fn set_many<I, T>(&mut self, values: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = (T, bool)>,
        T: Into<Tag>,
    {
        let mut bits = self.bits;
        for (t, v) in values {
            let slot = self.tags.slot(&t.into())?;
            bits = with_bit(bits, slot, v);
        }
        self.bits = bits;
        Ok(self)
    }

    /// Invert the state of a line.
    pub fn toggle<T: Into<Tag>>(&mut self, tag: T) -> Result<&mut Self> {
        let slot = self.tags.slot(&tag.into())?;
        self.bits ^= 1 << slot;
        Ok(self)
    }

    /// Invert the states of a number of lines.
    ///
    /// If any tag is unknown the buffer is left unchanged.
    pub fn toggle_many<I, T>(&mut self, tags: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<Tag>,
    {
        let mut mask = 0;
        for t in tags {
            let slot = self.tags.slot(&t.into())?;
            mask |= 1 << slot;
        }
        self.bits ^= mask;
        Ok(self)
    }

    /// Invert the states of all the lines.
    pub fn toggle_all(&mut self) -> &mut Self {
        self.bits ^= self.mask();
        self
    }

    /// Iterate over the tags and states of the lines, in offset order.
    pub fn iter(&self) -> impl Iterator<Item = (&Tag, bool)> + '_ {
        self.tags
            .tags()
            .iter()
            .enumerate()
            .map(|(slot, t)| (t, self.get_slot(slot)))
    }

    // Confirm the buffer was built for the same lines as the session.
    pub(crate) fn check_tags(&self, tags: &Arc<TagMap>) -> Result<()> {
        if Arc::ptr_eq(&self.tags, tags) || *self.tags == **tags {
            return Ok(());
        }
        Err(Error::InvalidArgument(
            "Buffer tags do not match the requested lines.".into(),
        ))
    }

    pub(crate) fn bits(&self) -> u64 {
        self.bits
    }

    pub(crate) fn set_bits(&mut self, bits: u64) {
        self.bits = bits & self.mask();
    }

    pub(crate) fn get_slot(&self, slot: usize) -> bool {
        (self.bits >> slot) & 1 == 1
    }

    pub(crate) fn set_slot(&mut self, slot: usize, value: bool) {
        self.bits = with_bit(self.bits, slot, value);
    }

    fn mask(&self) -> u64 {
        match self.tags.len() {
            0 => 0,
            n => u64::MAX >> (64 - n),
        }
    }
}

fn with_bit(bits: u64, slot: usize, value: bool) -> u64 {
    if value {
        bits | (1 << slot)
    } else {
        bits & !(1 << slot)
    }
}

impl PartialEq for Buffer {
    fn eq(&self, other: &Self) -> bool {
        self.bits == other.bits
            && (Arc::ptr_eq(&self.tags, &other.tags) || *self.tags == *other.tags)
    }
}

impl Eq for Buffer {}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::LineOptions;

    fn buffer() -> Buffer {
        Buffer::new(
            TagMap::from_lines([
                (17, LineOptions::tagged("a")),
                (27, LineOptions::tagged("b")),
                (4, LineOptions::default()),
            ])
            .unwrap(),
        )
    }

    fn unknown() -> Error {
        Error::UnknownTag(Tag::from("c"))
    }

    #[test]
    fn new() {
        let buf = buffer();
        assert_eq!(buf.len(), 3);
        assert!(!buf.is_empty());
        assert!(buf.contains("a"));
        assert!(buf.contains(4));
        assert!(!buf.contains("c"));
        for (_, v) in buf.iter() {
            assert!(!v);
        }
    }

    #[test]
    fn get() {
        let mut buf = buffer();
        assert_eq!(buf.get("a"), Ok(false));
        buf.set("a", true).unwrap();
        assert_eq!(buf.get("a"), Ok(true));
        assert_eq!(buf.get(4), Ok(false));
        assert_eq!(buf.get("c"), Err(unknown()));
    }

    #[test]
    fn get_all() {
        let mut buf = buffer();
        buf.set("b", true).unwrap();
        let all = buf.get_all();
        assert_eq!(all.len(), 3);
        assert_eq!(all[&Tag::from("a")], false);
        assert_eq!(all[&Tag::from("b")], true);
        assert_eq!(all[&Tag::from(4)], false);
    }

    #[test]
    fn get_many() {
        let mut buf = buffer();
        buf.set("b", true).unwrap();
        let some = buf.get_many(["b", "a"]).unwrap();
        assert_eq!(some.len(), 2);
        assert_eq!(some[&Tag::from("a")], false);
        assert_eq!(some[&Tag::from("b")], true);
        assert_eq!(buf.get_many(["b", "c"]), Err(unknown()));
    }

    #[test]
    fn clear_all() {
        let mut buf = buffer();
        buf.toggle_all().clear_all();
        assert!(buf.get_all().values().all(|v| !v));
    }

    #[test]
    fn set() {
        let mut buf = buffer();
        buf.set("a", true).unwrap().set("b", true).unwrap();
        assert_eq!(buf.bits(), 0b110);
        buf.set("a", false).unwrap();
        assert_eq!(buf.bits(), 0b100);
        assert_eq!(buf.set("c", true).unwrap_err(), unknown());
        assert_eq!(buf.bits(), 0b100);
    }

    #[test]
    fn set_many() {
        let mut buf = buffer();
        let m = HashMap::from([(Tag::from("a"), true), (Tag::from(4), true)]);
        buf.set_many(m.clone()).unwrap();
        assert_eq!(buf.get_many(m.keys().cloned()).unwrap(), m);
        assert_eq!(buf.get("b"), Ok(false));
    }

    #[test]
    fn set_many_unknown() {
        let mut buf = buffer();
        assert_eq!(
            buf.set_many([("a", true), ("c", true)]).unwrap_err(),
            unknown()
        );
        // nothing applied
        assert_eq!(buf.get("a"), Ok(false));
    }

    #[test]
    fn toggle() {
        let mut buf = buffer();
        buf.set("b", true).unwrap();
        let before = buf.clone();
        buf.toggle("b").unwrap();
        assert_eq!(buf.get("b"), Ok(false));
        buf.toggle("b").unwrap();
        assert_eq!(buf, before);
        assert_eq!(buf.toggle("c").unwrap_err(), unknown());
        assert_eq!(buf, before);
    }

    #[test]
    fn toggle_many() {
        let mut buf = buffer();
        buf.set("b", true).unwrap();
        buf.toggle_many(["a", "b"]).unwrap();
        assert_eq!(buf.get("a"), Ok(true));
        assert_eq!(buf.get("b"), Ok(false));
        assert_eq!(buf.get(4), Ok(false));
        assert_eq!(buf.toggle_many(["a", "c"]).unwrap_err(), unknown());
        assert_eq!(buf.get("a"), Ok(true));
    }

    #[test]
    fn toggle_all() {
        let mut buf = buffer();
        buf.set("a", true).unwrap();
        buf.toggle_all();
        assert_eq!(buf.bits(), 0b101);
        buf.toggle_all();
        assert_eq!(buf.bits(), 0b010);
    }

    #[test]
    fn toggle_all_full_width() {
        let offsets: Vec<u32> = (0..64).collect();
        let mut buf = Buffer::new(TagMap::from_offsets(&offsets).unwrap());
        buf.toggle_all();
        assert_eq!(buf.bits(), u64::MAX);
        assert_eq!(buf.get(63), Ok(true));
    }

    #[test]
    fn iter() {
        let mut buf = buffer();
        buf.set("b", true).unwrap();
        let v: Vec<(&Tag, bool)> = buf.iter().collect();
        assert_eq!(
            v,
            vec![
                (&Tag::from(4), false),
                (&Tag::from("a"), false),
                (&Tag::from("b"), true)
            ]
        );
    }

    #[test]
    fn set_bits_masked() {
        let mut buf = buffer();
        buf.set_bits(u64::MAX);
        assert_eq!(buf.bits(), 0b111);
    }

    #[test]
    fn check_tags() {
        let buf = buffer();
        let same = buffer();
        assert!(buf.check_tags(&buf.tags).is_ok());
        assert!(buf.check_tags(&same.tags).is_ok());
        let other = Arc::new(TagMap::from_offsets(&[17, 27]).unwrap());
        assert!(matches!(
            buf.check_tags(&other),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn debug() {
        let mut buf = buffer();
        buf.set("a", true).unwrap();
        assert_eq!(
            format!("{:?}", buf),
            "{Offset(4): false, Name(\"a\"): true, Name(\"b\"): false}"
        );
    }
}
