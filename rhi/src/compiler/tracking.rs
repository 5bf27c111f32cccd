//! Sub-resource ownership tracking.
//!
//! During compilation every attachment carries a tracker recording which use
//! last touched each of its sub-resources. Advancing the tracker with a new
//! use returns the previous owners together with the part of the new range
//! each of them covered, so barriers can be emitted per overlapping region
//! instead of per whole resource.
//!
//! Images are tracked per (mip, layer); buffers as sorted byte intervals.
//! Uses that cover the whole resource always yield a single region.

use crate::graph::{AttachmentKind, UseIndex};
use crate::types::{BufferRange, ImageSubresourceRange, SubresourceRange};

pub(crate) type Region = (Option<UseIndex>, SubresourceRange);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Segment {
    range: BufferRange,
    owner: Option<UseIndex>,
}

#[derive(Debug, Clone)]
pub(crate) enum SubresourceTracker {
    Image {
        array_layers: u32,
        mip_levels: u32,
        owners: Vec<Option<UseIndex>>,
    },
    Buffer {
        segments: Vec<Segment>,
    },
}

impl SubresourceTracker {
    pub(crate) fn new(kind: &AttachmentKind) -> Self {
        match kind {
            AttachmentKind::Image(desc) => {
                let mip_levels = desc.mip_level_count.max(1);
                let array_layers = desc.array_layer_count.max(1);
                Self::Image {
                    array_layers,
                    mip_levels,
                    owners: vec![None; (mip_levels * array_layers) as usize],
                }
            }
            AttachmentKind::Buffer(desc) => Self::Buffer {
                segments: vec![Segment {
                    range: BufferRange::whole(desc.size),
                    owner: None,
                }],
            },
        }
    }

    /// Make `owner` the last use of `range`, returning the previous owners.
    pub(crate) fn advance(&mut self, range: &SubresourceRange, owner: UseIndex) -> Vec<Region> {
        match (self, range) {
            (
                Self::Image {
                    array_layers,
                    owners,
                    ..
                },
                SubresourceRange::Image(range),
            ) => {
                let regions = image_regions(owners, *array_layers, range);
                for mip in range.base_mip_level..range.mip_end() {
                    for layer in range.base_array_layer..range.layer_end() {
                        owners[(mip * *array_layers + layer) as usize] = Some(owner);
                    }
                }
                regions
                    .into_iter()
                    .map(|(prev, range)| (prev, SubresourceRange::Image(range)))
                    .collect()
            }
            (Self::Buffer { segments }, SubresourceRange::Buffer(range)) => {
                advance_buffer(segments, range, owner)
            }
            _ => Vec::new(),
        }
    }

    /// Current owner of every part of the resource.
    pub(crate) fn regions(&self) -> Vec<Region> {
        match self {
            Self::Image {
                array_layers,
                mip_levels,
                owners,
            } => image_regions(
                owners,
                *array_layers,
                &ImageSubresourceRange::whole(*mip_levels, *array_layers),
            )
            .into_iter()
            .map(|(owner, range)| (owner, SubresourceRange::Image(range)))
            .collect(),
            Self::Buffer { segments } => segments
                .iter()
                .map(|segment| (segment.owner, SubresourceRange::Buffer(segment.range)))
                .collect(),
        }
    }
}

/// Group the owners of `range` into rectangles of (mips x layers).
///
/// Each mip is split into runs of layers with the same owner; a run extends
/// the rectangle of the previous mip when owner and layers match.
fn image_regions(
    owners: &[Option<UseIndex>],
    array_layers: u32,
    range: &ImageSubresourceRange,
) -> Vec<(Option<UseIndex>, ImageSubresourceRange)> {
    let owner_at = |mip: u32, layer: u32| owners[(mip * array_layers + layer) as usize];
    let mut regions: Vec<(Option<UseIndex>, ImageSubresourceRange)> = Vec::new();

    for mip in range.base_mip_level..range.mip_end() {
        let mut layer = range.base_array_layer;
        while layer < range.layer_end() {
            let owner = owner_at(mip, layer);
            let start = layer;
            while layer < range.layer_end() && owner_at(mip, layer) == owner {
                layer += 1;
            }
            let count = layer - start;

            let open = regions.iter_mut().find(|(prev, region)| {
                *prev == owner
                    && region.base_array_layer == start
                    && region.array_layer_count == count
                    && region.mip_end() == mip
            });
            match open {
                Some((_, region)) => region.mip_level_count += 1,
                None => regions.push((owner, ImageSubresourceRange::new(mip, 1, start, count))),
            }
        }
    }
    regions
}

fn advance_buffer(
    segments: &mut Vec<Segment>,
    range: &BufferRange,
    owner: UseIndex,
) -> Vec<Region> {
    let mut previous: Vec<Segment> = Vec::new();
    let mut next: Vec<Segment> = Vec::with_capacity(segments.len() + 2);

    for segment in segments.drain(..) {
        let Some(overlap) = segment.range.intersection(range) else {
            next.push(segment);
            continue;
        };
        if segment.range.offset < overlap.offset {
            next.push(Segment {
                range: BufferRange::new(segment.range.offset, overlap.offset - segment.range.offset),
                owner: segment.owner,
            });
        }
        push_merged(
            &mut previous,
            Segment {
                range: overlap,
                owner: segment.owner,
            },
        );
        push_merged(
            &mut next,
            Segment {
                range: overlap,
                owner: Some(owner),
            },
        );
        if segment.range.end() > overlap.end() {
            next.push(Segment {
                range: BufferRange::new(overlap.end(), segment.range.end() - overlap.end()),
                owner: segment.owner,
            });
        }
    }

    let mut merged = Vec::with_capacity(next.len());
    for segment in next {
        push_merged(&mut merged, segment);
    }
    *segments = merged;

    previous
        .into_iter()
        .map(|segment| (segment.owner, SubresourceRange::Buffer(segment.range)))
        .collect()
}

fn push_merged(segments: &mut Vec<Segment>, segment: Segment) {
    if let Some(last) = segments.last_mut()
        && last.owner == segment.owner
        && last.range.end() == segment.range.offset
    {
        last.range.size += segment.range.size;
        return;
    }
    segments.push(segment);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BufferDescriptor, BufferUsage, TextureDescriptor, TextureFormat, TextureUsage};

    fn image(mips: u32, layers: u32) -> SubresourceTracker {
        SubresourceTracker::new(&AttachmentKind::Image(
            TextureDescriptor::new_2d(64, 64, TextureFormat::Rgba8Unorm, TextureUsage::STORAGE_BINDING)
                .with_mip_levels(mips)
                .with_array_layers(layers),
        ))
    }

    fn buffer(size: u64) -> SubresourceTracker {
        SubresourceTracker::new(&AttachmentKind::Buffer(BufferDescriptor::new(
            size,
            BufferUsage::STORAGE,
        )))
    }

    #[test]
    fn test_whole_image_single_region() {
        let mut tracker = image(4, 2);
        let whole = SubresourceRange::Image(ImageSubresourceRange::whole(4, 2));

        assert_eq!(tracker.advance(&whole, UseIndex(0)), vec![(None, whole)]);
        assert_eq!(tracker.advance(&whole, UseIndex(1)), vec![(Some(UseIndex(0)), whole)]);
    }

    #[test]
    fn test_mip_chain_regions() {
        let mut tracker = image(3, 1);
        for mip in 0..3 {
            let range = SubresourceRange::Image(ImageSubresourceRange::mip(mip, 1));
            tracker.advance(&range, UseIndex(mip));
        }

        let whole = SubresourceRange::Image(ImageSubresourceRange::whole(3, 1));
        let regions = tracker.advance(&whole, UseIndex(10));
        assert_eq!(regions.len(), 3);
        assert_eq!(
            regions[1],
            (
                Some(UseIndex(1)),
                SubresourceRange::Image(ImageSubresourceRange::mip(1, 1))
            )
        );
    }

    #[test]
    fn test_layer_runs_merge_across_mips() {
        let mut tracker = image(2, 4);
        let lower = SubresourceRange::Image(ImageSubresourceRange::new(0, 2, 0, 2));
        tracker.advance(&lower, UseIndex(0));

        let regions = tracker.regions();
        assert_eq!(
            regions,
            vec![
                (Some(UseIndex(0)), lower),
                (None, SubresourceRange::Image(ImageSubresourceRange::new(0, 2, 2, 2))),
            ]
        );
    }

    #[test]
    fn test_buffer_split_and_merge() {
        let mut tracker = buffer(1024);
        let first = SubresourceRange::Buffer(BufferRange::new(0, 512));
        let second = SubresourceRange::Buffer(BufferRange::new(512, 512));

        assert_eq!(tracker.advance(&first, UseIndex(0)), vec![(None, first)]);
        assert_eq!(tracker.advance(&second, UseIndex(1)), vec![(None, second)]);

        let middle = SubresourceRange::Buffer(BufferRange::new(256, 512));
        assert_eq!(
            tracker.advance(&middle, UseIndex(2)),
            vec![
                (
                    Some(UseIndex(0)),
                    SubresourceRange::Buffer(BufferRange::new(256, 256))
                ),
                (
                    Some(UseIndex(1)),
                    SubresourceRange::Buffer(BufferRange::new(512, 256))
                ),
            ]
        );

        assert_eq!(tracker.regions().len(), 3);
        let whole = SubresourceRange::Buffer(BufferRange::whole(1024));
        assert_eq!(tracker.advance(&whole, UseIndex(3)).len(), 3);
        assert_eq!(tracker.regions(), vec![(Some(UseIndex(3)), whole)]);
    }

    #[test]
    fn test_disjoint_buffer_ranges_have_no_previous_owner() {
        let mut tracker = buffer(256);
        tracker.advance(&SubresourceRange::Buffer(BufferRange::new(0, 128)), UseIndex(0));
        let regions = tracker.advance(&SubresourceRange::Buffer(BufferRange::new(128, 128)), UseIndex(1));
        assert_eq!(regions, vec![(None, SubresourceRange::Buffer(BufferRange::new(128, 128)))]);
    }
}
