//! Page table management module
//!
//! One arena per environment, keyed by virtual page number. Directory slots
//! are derived from the entries: a slot is present while at least one page
//! in its 4MB span is mapped.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::ops::Range;

use cowfork_api::memory::interface::{pdx_of_page, PageTableMirror};
use cowfork_api::{PageNum, PhysAddr, PteFlags};

/// A page-table entry: which frame, under which permissions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pte {
    /// Backing frame
    pub frame: PhysAddr,
    /// Permission bits
    pub flags: PteFlags,
}

/// Page-table arena of one address space
#[derive(Debug, Default, Clone)]
pub struct PageTable {
    entries: BTreeMap<PageNum, Pte>,
    // directory slot -> number of mapped pages beneath it
    tables: BTreeMap<usize, usize>,
}

impl PageTable {
    /// Create an empty page table
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry for page `pn`
    pub fn lookup(&self, pn: PageNum) -> Option<Pte> {
        self.entries.get(&pn).copied()
    }

    /// Install `pte` at `pn`, returning the entry it replaced
    pub fn insert(&mut self, pn: PageNum, pte: Pte) -> Option<Pte> {
        let old = self.entries.insert(pn, pte);
        if old.is_none() {
            *self.tables.entry(pdx_of_page(pn)).or_insert(0) += 1;
        }
        old
    }

    /// Remove the entry at `pn`
    pub fn remove(&mut self, pn: PageNum) -> Option<Pte> {
        let old = self.entries.remove(&pn)?;
        let pdx = pdx_of_page(pn);
        if let Some(count) = self.tables.get_mut(&pdx) {
            *count -= 1;
            if *count == 0 {
                self.tables.remove(&pdx);
            }
        }
        Some(old)
    }

    /// Replace the permission bits of an existing entry
    pub fn set_flags(&mut self, pn: PageNum, flags: PteFlags) -> Option<Pte> {
        let pte = self.entries.get_mut(&pn)?;
        pte.flags = flags;
        Some(*pte)
    }

    /// Entries whose page number lies in `pages`
    pub fn range(&self, pages: Range<PageNum>) -> impl Iterator<Item = (PageNum, Pte)> + '_ {
        self.entries.range(pages).map(|(pn, pte)| (*pn, *pte))
    }

    /// All entries in page order
    pub fn iter(&self) -> impl Iterator<Item = (PageNum, Pte)> + '_ {
        self.entries.iter().map(|(pn, pte)| (*pn, *pte))
    }

    /// Remove every entry, returning the frames they referenced
    pub fn drain(&mut self) -> Vec<PhysAddr> {
        self.tables.clear();
        core::mem::take(&mut self.entries).into_values().map(|pte| pte.frame).collect()
    }

    /// Number of mapped pages
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is mapped
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PageTableMirror for PageTable {
    fn pde_present(&self, pdx: usize) -> bool {
        self.tables.contains_key(&pdx)
    }

    fn pte(&self, pn: PageNum) -> PteFlags {
        self.lookup(pn).map_or(PteFlags::empty(), |pte| pte.flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pte(frame: usize, flags: PteFlags) -> Pte {
        Pte {
            frame: PhysAddr::new(frame),
            flags,
        }
    }

    #[test]
    fn test_directory_tracks_entries() {
        let mut pt = PageTable::new();
        assert!(!pt.pde_present(2));
        pt.insert(0x800, pte(0x1000, PteFlags::USER_RW));
        pt.insert(0x801, pte(0x2000, PteFlags::USER_RW));
        assert!(pt.pde_present(2));
        pt.remove(0x800);
        assert!(pt.pde_present(2));
        pt.remove(0x801);
        assert!(!pt.pde_present(2));
        assert!(pt.is_empty());
    }

    #[test]
    fn test_replacing_entry_keeps_directory_count() {
        let mut pt = PageTable::new();
        pt.insert(0x800, pte(0x1000, PteFlags::USER_RW));
        let old = pt.insert(0x800, pte(0x1000, PteFlags::USER_COW));
        assert_eq!(old.map(|p| p.flags), Some(PteFlags::USER_RW));
        pt.remove(0x800);
        assert!(!pt.pde_present(2));
    }

    #[test]
    fn test_mirror_view() {
        let mut pt = PageTable::new();
        pt.insert(0x802, pte(0x3000, PteFlags::USER_COW));
        assert_eq!(pt.pte(0x802), PteFlags::USER_COW);
        assert_eq!(pt.pte(0x803), PteFlags::empty());
        assert_eq!(pt.set_flags(0x802, PteFlags::USER_READ).map(|p| p.frame), Some(PhysAddr::new(0x3000)));
        assert_eq!(pt.range(0x800..0x900).count(), 1);
        assert_eq!(pt.drain(), [PhysAddr::new(0x3000)]);
        assert!(!pt.pde_present(2));
    }
}
