// SPDX-FileCopyrightText: 2024 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::line::{Offset, Tag};
use crate::options::LineOptions;
use crate::{Error, Result};
use gpiotag_uapi::NUM_LINES_MAX;
use nohash_hasher::IntMap;
use std::collections::HashMap;

/// The mapping between the tags and offsets of a set of lines.
///
/// Lines are held in offset order, and each line is assigned the slot
/// matching its position in that order.
/// The slot is the index of the line in the uAPI requests and in the
/// state of a [`Buffer`].
///
/// The map is immutable once built.
///
/// [`Buffer`]: crate::buffer::Buffer
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TagMap {
    offsets: Vec<Offset>,
    tags: Vec<Tag>,
    by_tag: HashMap<Tag, usize>,
    by_offset: IntMap<Offset, usize>,
}

impl TagMap {
    /// Build the map for a set of lines.
    ///
    /// Lines without an explicit tag are tagged with their offset.
    ///
    /// Fails if the set is empty, exceeds the maximum number of lines in a request,
    /// or contains a duplicate offset or tag.
    pub fn from_lines<I>(lines: I) -> Result<TagMap>
    where
        I: IntoIterator<Item = (Offset, LineOptions)>,
    {
        build(lines).map(|(tm, _)| tm)
    }

    /// Build the map for a set of lines identified only by offset.
    pub fn from_offsets(offsets: &[Offset]) -> Result<TagMap> {
        Self::from_lines(offsets.iter().map(|o| (*o, LineOptions::default())))
    }

    /// The number of lines in the set.
    #[inline]
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Check if the set is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// The offsets of the lines, in slot order.
    pub fn offsets(&self) -> &[Offset] {
        &self.offsets
    }

    /// The tags of the lines, in slot order.
    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    /// Check if the tag identifies a line in the set.
    pub fn contains(&self, tag: &Tag) -> bool {
        self.by_tag.contains_key(tag)
    }

    /// The offset of the line identified by the tag.
    pub fn offset(&self, tag: &Tag) -> Option<Offset> {
        self.by_tag.get(tag).map(|&slot| self.offsets[slot])
    }

    /// The tag of the line with the given offset.
    pub fn tag(&self, offset: Offset) -> Option<&Tag> {
        self.by_offset.get(&offset).map(|&slot| &self.tags[slot])
    }

    pub(crate) fn slot(&self, tag: &Tag) -> Result<usize> {
        self.by_tag
            .get(tag)
            .copied()
            .ok_or_else(|| Error::UnknownTag(tag.clone()))
    }

    pub(crate) fn slot_of_offset(&self, offset: Offset) -> Option<usize> {
        self.by_offset.get(&offset).copied()
    }

    pub(crate) fn tag_at(&self, slot: usize) -> &Tag {
        &self.tags[slot]
    }
}

// Builds the map and returns the line options in slot order.
pub(crate) fn build<I>(lines: I) -> Result<(TagMap, Vec<LineOptions>)>
where
    I: IntoIterator<Item = (Offset, LineOptions)>,
{
    let mut lines: Vec<(Offset, LineOptions)> = lines.into_iter().collect();
    if lines.is_empty() {
        return Err(Error::InvalidArgument("No lines specified.".into()));
    }
    if lines.len() > NUM_LINES_MAX {
        return Err(Error::InvalidArgument(format!(
            "{} lines specified, exceeding the maximum of {}.",
            lines.len(),
            NUM_LINES_MAX
        )));
    }
    lines.sort_unstable_by_key(|(offset, _)| *offset);

    let mut tm = TagMap::default();
    let mut opts = Vec::with_capacity(lines.len());
    for (slot, (offset, lo)) in lines.into_iter().enumerate() {
        let tag = lo.tag.clone().unwrap_or(Tag::Offset(offset));
        if tm.by_offset.insert(offset, slot).is_some() {
            return Err(Error::InvalidArgument(format!(
                "Offset {} specified more than once.",
                offset
            )));
        }
        if tm.by_tag.insert(tag.clone(), slot).is_some() {
            return Err(Error::InvalidArgument(format!(
                "Tag {} specified more than once.",
                tag
            )));
        }
        tm.offsets.push(offset);
        tm.tags.push(tag);
        opts.push(lo);
    }
    Ok((tm, opts))
}
