//! The order-0 page cache.
//!
//! A watermark-regulated free list of single pages sitting in front of a
//! buddy instance. Bursty order-0 traffic is served from the cache without
//! touching the free-lists; the buddy is only involved when the cache level
//! leaves the hysteresis band between the low and high watermarks.
//!
//! Pages obtained through [`BuddyInstance::cached_alloc`] must be returned
//! through [`BuddyInstance::cached_free`], never through
//! [`BuddyInstance::free`]; the two sides use different link fields on the
//! page descriptor.

use super::{
    buddy::{Block, BuddyInstance, Result},
    frame::FrameFlags,
    Error,
};

/// Cache level below which a refill from the buddy happens.
pub const LOW_WATERMARK: usize = 10;
/// Cache level above which pages drain back to the buddy.
pub const HIGH_WATERMARK: usize = 70;
/// Level the cache is brought to by a refill or a drain.
pub const MID_WATERMARK: usize = (LOW_WATERMARK + HIGH_WATERMARK) / 2;

impl<const MAX_ORDER: usize> BuddyInstance<MAX_ORDER> {
    /// Allocate a single page through the cache.
    ///
    /// When the cache has drained below [`LOW_WATERMARK`] it is refilled
    /// from the buddy up to [`MID_WATERMARK`] first. The refill is
    /// best-effort: if the buddy runs dry mid-way the cache serves what it
    /// has, and only an empty cache makes the allocation fail.
    pub fn cached_alloc(&mut self) -> Result<Block> {
        if self.cache.len() < LOW_WATERMARK {
            let missing = MID_WATERMARK - self.cache.len();
            self.cache_extend(missing);
        }

        let Some(idx) = self.cache.pop(&mut self.frames) else {
            log::debug!("`{}`: page cache and buddy both exhausted", self.name());
            return Err(Error::NoMemoryAvailable);
        };

        self.frames[idx as usize].clear_flag(FrameFlags::FREE);
        Ok(Block {
            index: idx,
            order: 0,
        })
    }

    /// Return a page allocated with [`cached_alloc`](Self::cached_alloc).
    ///
    /// When the cache level climbs above [`HIGH_WATERMARK`] the surplus
    /// above [`MID_WATERMARK`] drains back to the buddy.
    pub fn cached_free(&mut self, block: Block) -> Result<()> {
        let idx = block.index as usize;

        if idx >= self.frames.len() {
            log::error!("`{}`: page index {} out of range", self.name(), idx);
            return Err(Error::IndexOutOfRange);
        }
        if block.order != 0 {
            log::error!(
                "`{}`: only order-0 blocks go through the cache (got order {})",
                self.name(),
                block.order
            );
            return Err(Error::NotOrderZero);
        }

        let frame = &self.frames[idx];
        if frame.test_flag(FrameFlags::FREE) {
            log::error!("`{}`: page {} is already free", self.name(), idx);
            return Err(Error::DoubleFree);
        }
        if !frame.test_flag(FrameFlags::ROOT) || frame.order() != 0 {
            log::error!("`{}`: page {} was not a cache allocation", self.name(), idx);
            return Err(Error::NotRootPage);
        }

        self.frames[idx].set_flag(FrameFlags::FREE);
        self.cache.push(&mut self.frames, idx as u32);

        if self.cache.len() > HIGH_WATERMARK {
            let surplus = self.cache.len() - MID_WATERMARK;
            self.cache_shrink(surplus);
        }

        Ok(())
    }

    /// Pull up to `count` order-0 blocks out of the buddy into the cache.
    fn cache_extend(&mut self, count: usize) {
        for _ in 0..count {
            match self.alloc(0) {
                Ok(block) => {
                    let idx = block.index;
                    self.frames[idx as usize].set_flag(FrameFlags::FREE);
                    self.cache.push(&mut self.frames, idx);
                }
                Err(_) => {
                    log::debug!(
                        "`{}`: cache refill stopped early at {} pages",
                        self.name(),
                        self.cache.len()
                    );
                    break;
                }
            }
        }
    }

    /// Give `count` cached pages back to the buddy.
    fn cache_shrink(&mut self, count: usize) {
        for _ in 0..count {
            let Some(idx) = self.cache.pop(&mut self.frames) else {
                log::error!("`{}`: cache emptied mid-drain", self.name());
                break;
            };

            self.frames[idx as usize].clear_flag(FrameFlags::FREE);
            if let Err(err) = self.free(Block {
                index: idx,
                order: 0,
            }) {
                log::error!("`{}`: draining page {} failed: {}", self.name(), idx, err);
                break;
            }
        }
    }
}
