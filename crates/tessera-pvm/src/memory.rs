//! Paged guest memory.
//!
//! The 2^32 byte address space is split into [`PAGE_SIZE`] pages. Only pages
//! configured through [`MemoryBuilder`](crate::MemoryBuilder) or grown with
//! [`Memory::sbrk`] are backed by storage; every other page is inaccessible.
//! Pages below [`RESERVED_NUMBER_OF_PAGES`] are never accessible, so null and
//! near-null pointers always fault.
//!
//! Every access is checked in two stages: first the whole range must fit in
//! [`MEMORY_SIZE`] (`OutOfBounds`), then every touched page must grant the
//! required access (`PageFault`). Nothing is written unless both checks pass.

use std::collections::BTreeMap;

use crate::error::MemoryError;
use crate::{MEMORY_SIZE, PAGE_SIZE, RESERVED_NUMBER_OF_PAGES};

/// Index of a page in the address space.
pub type PageNumber = u32;

/// Access granted by a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PageAccess {
    None,
    Read,
    Write,
}

impl PageAccess {
    /// Writeable pages are readable too.
    pub fn can_read(self) -> bool {
        matches!(self, PageAccess::Read | PageAccess::Write)
    }

    pub fn can_write(self) -> bool {
        matches!(self, PageAccess::Write)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Page {
    pub(crate) access: PageAccess,
    pub(crate) data: Box<[u8]>,
}

impl Page {
    pub(crate) fn zeroed(access: PageAccess) -> Self {
        Self {
            access,
            data: vec![0u8; PAGE_SIZE as usize].into_boxed_slice(),
        }
    }
}

/// Guest memory of one interpreter.
#[derive(Debug, Clone, Default)]
pub struct Memory {
    pages: BTreeMap<PageNumber, Page>,
    /// Current heap top, page aligned
    sbrk_index: u64,
    /// Heap ceiling (exclusive), page aligned
    heap_end: u64,
}

impl Memory {
    /// Memory with no accessible pages and no heap.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_parts(
        pages: BTreeMap<PageNumber, Page>,
        heap_start: u64,
        heap_end: u64,
    ) -> Self {
        Self {
            pages,
            sbrk_index: heap_start,
            heap_end,
        }
    }

    /// Copy `bytes` into memory starting at `address`.
    pub fn store_from(&mut self, address: u64, bytes: &[u8]) -> Result<(), MemoryError> {
        if bytes.is_empty() {
            return Ok(());
        }
        let (start, end) = check_bounds(address, bytes.len() as u64)?;
        self.check_access(start, end, PageAccess::Write)?;

        for (page, range, chunk) in page_chunks(start, bytes.len()) {
            if let Some(page) = self.pages.get_mut(&page) {
                page.data[range].copy_from_slice(&bytes[chunk]);
            }
        }
        Ok(())
    }

    /// Fill `dest` with memory starting at `address`.
    pub fn load_into(&self, dest: &mut [u8], address: u64) -> Result<(), MemoryError> {
        if dest.is_empty() {
            return Ok(());
        }
        let (start, end) = check_bounds(address, dest.len() as u64)?;
        self.check_access(start, end, PageAccess::Read)?;

        for (page, range, chunk) in page_chunks(start, dest.len()) {
            if let Some(page) = self.pages.get(&page) {
                dest[chunk].copy_from_slice(&page.data[range]);
            }
        }
        Ok(())
    }

    /// Whether `[address, address + length)` could be written.
    pub fn is_writeable(&self, address: u64, length: u64) -> bool {
        self.is_accessible(address, length, PageAccess::Write)
    }

    /// Whether `[address, address + length)` could be read.
    pub fn is_readable(&self, address: u64, length: u64) -> bool {
        self.is_accessible(address, length, PageAccess::Read)
    }

    fn is_accessible(&self, address: u64, length: u64, required: PageAccess) -> bool {
        if length == 0 {
            return true;
        }
        match check_bounds(address, length) {
            Ok((start, end)) => self.check_access(start, end, required).is_ok(),
            Err(_) => false,
        }
    }

    /// Grow the heap by `length` bytes rounded up to whole pages.
    ///
    /// Returns the previous heap top, or `None` if the heap would pass its
    /// ceiling. The new pages are zeroed and writeable.
    pub fn sbrk(&mut self, length: u32) -> Option<u64> {
        let previous = self.sbrk_index;
        if length == 0 {
            return Some(previous);
        }

        let new_top = align_to_page(previous + u64::from(length));
        if new_top > self.heap_end {
            return None;
        }

        let first = (previous / PAGE_SIZE as u64) as PageNumber;
        let last = (new_top / PAGE_SIZE as u64) as PageNumber;
        for page in first..last {
            self.pages
                .entry(page)
                .or_insert_with(|| Page::zeroed(PageAccess::Write));
        }
        self.sbrk_index = new_top;
        Some(previous)
    }

    /// Current heap top.
    pub fn sbrk_index(&self) -> u64 {
        self.sbrk_index
    }

    /// Heap ceiling.
    pub fn heap_end(&self) -> u64 {
        self.heap_end
    }

    /// Access granted by `page`.
    pub fn page_access(&self, page: PageNumber) -> PageAccess {
        if page < RESERVED_NUMBER_OF_PAGES {
            return PageAccess::None;
        }
        self.pages
            .get(&page)
            .map(|p| p.access)
            .unwrap_or(PageAccess::None)
    }

    /// Number of pages backed by storage.
    pub fn mapped_pages(&self) -> usize {
        self.pages.len()
    }

    /// Drop every page and the heap.
    pub fn reset(&mut self) {
        self.pages.clear();
        self.sbrk_index = 0;
        self.heap_end = 0;
    }

    fn check_access(&self, start: u32, end: u64, required: PageAccess) -> Result<(), MemoryError> {
        let first = start / PAGE_SIZE;
        let last = ((end - 1) / PAGE_SIZE as u64) as PageNumber;

        for page in first..=last {
            let access = self.page_access(page);
            let granted = match required {
                PageAccess::Write => access.can_write(),
                _ => access.can_read(),
            };
            if !granted {
                return Err(MemoryError::PageFault {
                    address: (page * PAGE_SIZE).max(start),
                });
            }
        }
        Ok(())
    }
}

/// Round `address` up to the next page boundary.
pub fn align_to_page(address: u64) -> u64 {
    let page = PAGE_SIZE as u64;
    address.div_ceil(page) * page
}

/// Validate a non-empty range against the address space.
fn check_bounds(address: u64, length: u64) -> Result<(u32, u64), MemoryError> {
    match address.checked_add(length) {
        Some(end) if end <= MEMORY_SIZE => Ok((address as u32, end)),
        _ => Err(MemoryError::OutOfBounds { address, length }),
    }
}

/// Split `[start, start + len)` into per-page pieces: the page, the range
/// inside the page and the matching range of the caller's buffer.
fn page_chunks(
    start: u32,
    len: usize,
) -> impl Iterator<Item = (PageNumber, std::ops::Range<usize>, std::ops::Range<usize>)> {
    let mut offset = 0usize;
    std::iter::from_fn(move || {
        if offset >= len {
            return None;
        }
        let address = start as u64 + offset as u64;
        let page = (address / PAGE_SIZE as u64) as PageNumber;
        let in_page = (address % PAGE_SIZE as u64) as usize;
        let size = (PAGE_SIZE as usize - in_page).min(len - offset);

        let item = (page, in_page..in_page + size, offset..offset + size);
        offset += size;
        Some(item)
    })
}
