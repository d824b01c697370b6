//! Staging of the initial memory layout.
//!
//! Ranges are page aligned `[start, end)` byte ranges. Contents shorter than
//! a range are zero padded.

use std::collections::BTreeMap;
use std::ops::Range;

use crate::error::MemoryBuilderError;
use crate::memory::{Memory, Page, PageAccess, PageNumber};
use crate::{MEMORY_SIZE, PAGE_SIZE, RESERVED_MEMORY};

/// Builder for [`Memory`].
#[derive(Debug, Clone, Default)]
pub struct MemoryBuilder {
    pages: BTreeMap<PageNumber, Page>,
}

impl MemoryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage `range` as read-only, filled with `contents`.
    pub fn set_readable_pages(
        self,
        range: Range<u64>,
        contents: &[u8],
    ) -> Result<Self, MemoryBuilderError> {
        self.stage(range, PageAccess::Read, contents)
    }

    /// Stage `range` as read-write, filled with `contents`.
    pub fn set_writeable_pages(
        self,
        range: Range<u64>,
        contents: &[u8],
    ) -> Result<Self, MemoryBuilderError> {
        self.stage(range, PageAccess::Write, contents)
    }

    /// Write `data` at `address` inside already staged pages.
    ///
    /// Access bits are ignored here, so read-only pages can be initialized
    /// with data that does not start at a page boundary.
    pub fn set_data(mut self, address: u64, data: &[u8]) -> Result<Self, MemoryBuilderError> {
        if data.is_empty() {
            return Ok(self);
        }
        let end = address
            .checked_add(data.len() as u64)
            .filter(|end| *end <= MEMORY_SIZE)
            .ok_or(MemoryBuilderError::UnconfiguredData { address })?;

        let page_size = PAGE_SIZE as u64;
        let first = (address / page_size) as PageNumber;
        let last = ((end - 1) / page_size) as PageNumber;
        if let Some(page) = (first..=last).find(|page| !self.pages.contains_key(page)) {
            return Err(MemoryBuilderError::UnconfiguredData {
                address: (page as u64 * page_size).max(address),
            });
        }

        let mut written = 0usize;
        while written < data.len() {
            let current = address + written as u64;
            let in_page = (current % page_size) as usize;
            let size = (PAGE_SIZE as usize - in_page).min(data.len() - written);
            if let Some(page) = self.pages.get_mut(&((current / page_size) as PageNumber)) {
                page.data[in_page..in_page + size].copy_from_slice(&data[written..written + size]);
            }
            written += size;
        }
        Ok(self)
    }

    /// Lock the layout and set up the growable heap `[heap_start, heap_end)`.
    ///
    /// An empty heap (`heap_start == heap_end`) disables `sbrk`.
    pub fn finalize(self, heap_start: u64, heap_end: u64) -> Result<Memory, MemoryBuilderError> {
        let invalid = |reason| MemoryBuilderError::InvalidHeap {
            start: heap_start,
            end: heap_end,
            reason,
        };

        if heap_start % PAGE_SIZE as u64 != 0 || heap_end % PAGE_SIZE as u64 != 0 {
            return Err(invalid("not page aligned"));
        }
        if heap_start > heap_end || heap_end > MEMORY_SIZE {
            return Err(invalid("inverted or beyond the address space"));
        }
        if heap_start < heap_end {
            if heap_start < RESERVED_MEMORY {
                return Err(invalid("overlaps the reserved region"));
            }
            let first = (heap_start / PAGE_SIZE as u64) as PageNumber;
            let last = (heap_end / PAGE_SIZE as u64) as PageNumber;
            if self.pages.range(first..last).next().is_some() {
                return Err(invalid("overlaps configured pages"));
            }
        }

        Ok(Memory::from_parts(self.pages, heap_start, heap_end))
    }

    fn stage(
        mut self,
        range: Range<u64>,
        access: PageAccess,
        contents: &[u8],
    ) -> Result<Self, MemoryBuilderError> {
        let Range { start, end } = range;
        if start >= end || end > MEMORY_SIZE {
            return Err(MemoryBuilderError::InvalidRange { start, end });
        }
        if start % PAGE_SIZE as u64 != 0 || end % PAGE_SIZE as u64 != 0 {
            return Err(MemoryBuilderError::NotPageAligned { start, end });
        }
        if start < RESERVED_MEMORY {
            return Err(MemoryBuilderError::ReservedRegion { start, end });
        }
        if contents.len() as u64 > end - start {
            return Err(MemoryBuilderError::ContentsTooLong {
                size: contents.len(),
                capacity: end - start,
            });
        }

        let first = (start / PAGE_SIZE as u64) as PageNumber;
        let last = (end / PAGE_SIZE as u64) as PageNumber;
        if let Some((page, _)) = self.pages.range(first..last).next() {
            return Err(MemoryBuilderError::PageAlreadyConfigured { page: *page });
        }

        let mut chunks = contents.chunks(PAGE_SIZE as usize);
        for page in first..last {
            let mut staged = Page::zeroed(access);
            if let Some(chunk) = chunks.next() {
                staged.data[..chunk.len()].copy_from_slice(chunk);
            }
            self.pages.insert(page, staged);
        }
        Ok(self)
    }
}
