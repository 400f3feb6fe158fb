//! Physical memory management.
//!
//! The allocator is a buddy system ([`BuddyInstance`]) with a
//! watermark-driven order-0 page cache ([`cache`]) layered in front of it.
//! Each instance owns a flat table of page descriptors ([`frame`]) and is a
//! plain value; the kernel-wide zone lives behind [`init`] and the free
//! functions of this module, which take the interrupt-masked lock around
//! every operation.

pub(crate) mod frame;

pub mod buddy;
pub mod cache;

pub use buddy::{order_for_pages, Block, BuddyInstance, DEFAULT_MAX_ORDER};

use crate::sync::{IrqMutex, Once};
use crate::unit;
use core::fmt;
use displaydoc_lite::displaydoc;

/// The size of a single page frame in bytes.
///
/// This is also the size of an order-0 block.
pub const PAGE_SIZE: usize = 4 * unit::KIB;

displaydoc! {
    /// Any error that can happen while allocating or freeing pages.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Error {
        /// tried to create or serve a zero-page request
        ZeroPages,
        /// the zone does not fit the descriptor table
        RegionTooLarge,
        /// the zone size is not a multiple of the max-order block size
        UnalignedRegion,
        /// the requested order exceeds the maximum order
        OrderTooLarge,
        /// no free block of the requested order or higher exists
        NoMemoryAvailable,
        /// the page index lies outside the zone
        IndexOutOfRange,
        /// the block is already free
        DoubleFree,
        /// the page is not the root of a block
        NotRootPage,
        /// the recorded order does not match the handle
        OrderMismatch,
        /// only order-0 blocks pass through the page cache
        NotOrderZero,
        /// a free-list is inconsistent with the descriptor table
        ListCorrupted,
        /// the kernel-wide zone was not initialised
        Uninitialised,
        /// the kernel-wide zone was already initialised
        AlreadyInitialised,
    }
}

/// Coarse classification of an [`Error`], mirroring how callers react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// A caller handed us garbage; rejected before any state changed.
    InvalidArgument,
    /// Nothing left to hand out; the caller may retry or propagate `ENOMEM`.
    Exhaustion,
    /// The descriptor table contradicts itself; the heap is corrupted.
    Corruption,
}

impl Error {
    /// Classify this error per the recovery the caller can attempt.
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::ZeroPages
            | Error::RegionTooLarge
            | Error::UnalignedRegion
            | Error::OrderTooLarge
            | Error::NotOrderZero
            | Error::Uninitialised
            | Error::AlreadyInitialised => ErrorClass::InvalidArgument,
            Error::NoMemoryAvailable => ErrorClass::Exhaustion,
            Error::IndexOutOfRange
            | Error::DoubleFree
            | Error::NotRootPage
            | Error::OrderMismatch
            | Error::ListCorrupted => ErrorClass::Corruption,
        }
    }

    /// Whether this error indicates a corrupted descriptor table.
    pub fn is_corruption(&self) -> bool {
        self.class() == ErrorClass::Corruption
    }
}

/// Statistics of a single allocator instance.
#[derive(Debug, Clone)]
pub struct AllocStats {
    /// The name of the zone these statistics describe.
    pub name: &'static str,
    /// Total size of the zone in bytes.
    pub total: usize,
    /// Bytes sitting on the buddy free-lists.
    pub free: usize,
    /// Bytes parked in the order-0 page cache.
    pub cached: usize,
    /// Bytes currently handed out.
    pub allocated: usize,
}

impl fmt::Display for AllocStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.name)?;
        self.name.chars().try_for_each(|_| write!(f, "~"))?;
        writeln!(f, "\nAllocated: {}", unit::bytes(self.allocated))?;
        writeln!(f, "Cached: {}", unit::bytes(self.cached))?;
        writeln!(f, "Free: {}", unit::bytes(self.free))?;
        writeln!(f, "Total: {}", unit::bytes(self.total))?;
        self.name.chars().try_for_each(|_| write!(f, "~"))?;
        writeln!(f)?;
        Ok(())
    }
}

static ZONE: Once<IrqMutex<BuddyInstance>> = Once::new();

/// Initialise the kernel-wide memory zone.
///
/// Must be called exactly once during early boot, after the platform layer
/// is up.
pub fn init(name: &'static str, page_count: usize) -> buddy::Result<()> {
    if ZONE.is_completed() {
        log::error!("the kernel-wide zone is already initialised");
        return Err(Error::AlreadyInitialised);
    }

    let instance = BuddyInstance::new(name, page_count)?;
    log::info!(
        "initialised zone `{}` with {} of physical memory",
        name,
        unit::bytes(instance.total_space())
    );

    ZONE.call_once(|| IrqMutex::new(instance));
    Ok(())
}

fn zone() -> buddy::Result<&'static IrqMutex<BuddyInstance>> {
    ZONE.get().ok_or(Error::Uninitialised)
}

/// Allocate a block of `2^order` pages from the kernel-wide zone.
pub fn alloc(order: usize) -> buddy::Result<Block> {
    zone()?.lock().alloc(order)
}

/// Allocate enough contiguous pages to cover `count` pages.
pub fn alloc_pages(count: usize) -> buddy::Result<Block> {
    zone()?.lock().alloc_pages(count)
}

/// Return a block to the kernel-wide zone.
pub fn free(block: Block) -> buddy::Result<()> {
    zone()?.lock().free(block)
}

/// Allocate a single page through the page cache.
pub fn cached_alloc() -> buddy::Result<Block> {
    zone()?.lock().cached_alloc()
}

/// Return a page obtained from [`cached_alloc`].
pub fn cached_free(block: Block) -> buddy::Result<()> {
    zone()?.lock().cached_free(block)
}

/// Statistics of the kernel-wide zone.
pub fn stats() -> buddy::Result<AllocStats> {
    Ok(zone()?.lock().stats())
}
