//! Virtual memory walking over a page-table mirror

use core::ops::Range;

use cowfork_api::memory::interface::{first_page_of_pdx, pdx_of_page, PageTableMirror};
use cowfork_api::{PageNum, PteFlags, VirtAddr};

/// Half-open range of virtual page numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    /// First page
    pub start: PageNum,
    /// One past the last page
    pub end: PageNum,
}

impl PageRange {
    /// Creates a range of page numbers.
    pub const fn new(start: PageNum, end: PageNum) -> Self {
        Self { start, end }
    }

    /// Pages covering `[start, end)`; `start` rounds down, `end` rounds up.
    pub const fn from_addrs(start: VirtAddr, end: VirtAddr) -> Self {
        Self {
            start: start.page_number(),
            end: end.page_round_up().page_number(),
        }
    }

    /// The single page holding `va`.
    pub const fn single(va: VirtAddr) -> Self {
        let pn = va.page_number();
        Self { start: pn, end: pn + 1 }
    }

    /// Number of pages.
    pub const fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Whether the range holds no pages.
    pub const fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Whether page `pn` is in the range.
    pub const fn contains(&self, pn: PageNum) -> bool {
        self.start <= pn && pn < self.end
    }

    /// Address of the first page.
    pub const fn start_addr(&self) -> VirtAddr {
        VirtAddr::from_page(self.start)
    }

    /// Address one past the last page.
    pub const fn end_addr(&self) -> VirtAddr {
        VirtAddr::from_page(self.end)
    }

    /// The range as a std range.
    pub const fn pages(&self) -> Range<PageNum> {
        self.start..self.end
    }
}

/// Visit every present, user-accessible page in `range`.
///
/// Directory slots that are not present are skipped as a whole. The first
/// error returned by `visit` stops the walk. Returns the number of pages
/// visited.
pub fn walk_mapped<M, F, E>(mirror: &M, range: PageRange, mut visit: F) -> Result<usize, E>
where
    M: PageTableMirror + ?Sized,
    F: FnMut(PageNum, PteFlags) -> Result<(), E>,
{
    let mut visited = 0;
    let mut pn = range.start;
    while pn < range.end {
        let pdx = pdx_of_page(pn);
        let table_end = first_page_of_pdx(pdx + 1).min(range.end);
        if !mirror.pde_present(pdx) {
            pn = table_end;
            continue;
        }
        while pn < table_end {
            let pte = mirror.pte(pn);
            if pte.is_present() && pte.is_user() {
                visit(pn, pte)?;
                visited += 1;
            }
            pn += 1;
        }
    }
    log::trace!("walked pages {:#x}..{:#x}: {} mapped", range.start, range.end, visited);
    Ok(visited)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page_table::{PageTable, Pte};
    use cowfork_api::PhysAddr;

    #[test]
    fn test_walk_skips_absent_directories_and_kernel_pages() {
        let mut pt = PageTable::new();
        let frame = PhysAddr::new(0x1000);
        pt.insert(0x800, Pte { frame, flags: PteFlags::USER_RW });
        pt.insert(0x801, Pte { frame, flags: PteFlags::PRESENT | PteFlags::WRITABLE });
        pt.insert(0x2400, Pte { frame, flags: PteFlags::USER_READ });

        let mut seen = std::vec::Vec::new();
        let count = walk_mapped(&pt, PageRange::new(0, 0x3000), |pn, _| {
            seen.push(pn);
            Ok::<(), ()>(())
        })
        .expect("walk");
        assert_eq!(count, 2);
        assert_eq!(seen, [0x800, 0x2400]);
    }

    #[test]
    fn test_walk_stops_on_error() {
        let mut pt = PageTable::new();
        let frame = PhysAddr::new(0x1000);
        pt.insert(0x800, Pte { frame, flags: PteFlags::USER_RW });
        pt.insert(0x801, Pte { frame, flags: PteFlags::USER_RW });
        let result = walk_mapped(&pt, PageRange::new(0x800, 0x802), |pn, _| if pn == 0x800 { Err(pn) } else { Ok(()) });
        assert_eq!(result, Err(0x800));
    }

    #[test]
    fn test_range_helpers() {
        let range = PageRange::from_addrs(VirtAddr::new(0x0080_0010), VirtAddr::new(0x0080_2001));
        assert_eq!(range, PageRange::new(0x800, 0x803));
        assert_eq!(range.len(), 3);
        assert!(range.contains(0x802));
        assert!(!range.contains(0x803));
        assert_eq!(PageRange::single(VirtAddr::new(0x0080_0fff)).len(), 1);
        assert!(PageRange::new(5, 5).is_empty());
    }
}
