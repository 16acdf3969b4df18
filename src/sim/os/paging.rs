use log::{debug, trace, warn};

use super::swap::{SwapKey, SwapRecord, SwapStore};
use crate::sim::error::{Error, Fault, Res};
use crate::sim::ram::{read_as_word, round_to_boundary, write_word, Ram};

#[derive(Debug, Clone)]
pub struct MemoryLayout {
    pub physical_memory: u32,
    pub virtual_memory: u32,
    pub page_size: u32,
    pub shared_region_size: u32,
    pub shared_regions: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharedMapping {
    pub pid: u32,
    pub addr_process: u32,
}

/// One page table entry. Entries are created once when the address space is
/// built and afterwards only reassigned or reset.
#[derive(Debug, Clone)]
pub struct Page {
    pub number: usize,
    pub addr_virtual: u32,
    /// Only meaningful while `valid`.
    pub addr_physical: u32,
    /// 0 means the page belongs to the OS.
    pub owner: u32,
    pub addr_process: u32,
    pub valid: bool,
    pub dirty: bool,
    pub page_faults: u32,
    pub access_count: u32,
    pub last_accessed: u64,
    /// Start address of the heap allocation this page is part of.
    pub heap_alloc: Option<u32>,
    /// Shared pages are never owned through `owner`, only through `shared_owners`.
    pub shared_region: u32,
    pub shared_owners: Vec<SharedMapping>,
}

impl Page {
    fn new(number: usize, addr_virtual: u32, resident: bool) -> Page {
        Page {
            number,
            addr_virtual,
            addr_physical: if resident { addr_virtual } else { 0 },
            owner: 0,
            addr_process: 0,
            valid: resident,
            dirty: false,
            page_faults: 0,
            access_count: 0,
            last_accessed: 0,
            heap_alloc: None,
            shared_region: 0,
            shared_owners: Vec::new(),
        }
    }

    fn swap_key(&self) -> SwapKey {
        SwapKey {
            page_number: self.number,
            addr_virtual: self.addr_virtual,
        }
    }
}

fn within(addr: u32, base: u32, page_size: u32) -> bool {
    addr >= base && addr - base < page_size
}

/// All memory accesses made by processes go through here.
pub struct AddressSpace {
    pages: Vec<Page>,
    free_frames: Vec<bool>,
    ram: Ram,
    swap: Box<dyn SwapStore>,
    page_size: u32,
    virtual_size: u32,
    shared_region_size: u32,
    tick: u64,
}

impl AddressSpace {
    pub fn new(layout: &MemoryLayout, mut swap: Box<dyn SwapStore>) -> Res<AddressSpace> {
        let page_size = layout.page_size;
        if page_size == 0 {
            return Err(Error::Config("page size must be non-zero".to_string()));
        }
        let round = |bytes: u32, what: &str| {
            round_to_boundary(bytes, page_size).ok_or_else(|| {
                Error::Config(format!("{} {} cannot be rounded to a page", what, bytes))
            })
        };
        let physical_size = round(layout.physical_memory, "physical memory")?;
        let virtual_size = round(layout.virtual_memory, "virtual memory")?;

        let num_pages = (virtual_size / page_size) as usize;
        let num_frames = (physical_size / page_size) as usize;
        let pages: Vec<Page> = (0..num_pages)
            .map(|i| {
                let addr = i as u32 * page_size;
                Page::new(i, addr, addr < physical_size)
            })
            .collect();
        let free_frames = (0..num_frames).map(|i| i >= num_pages).collect();

        swap.clear()?;

        let mut space = AddressSpace {
            pages,
            free_frames,
            ram: Ram::new(physical_size as usize),
            swap,
            page_size,
            virtual_size,
            shared_region_size: layout.shared_region_size,
            tick: 0,
        };
        space.carve_shared_regions(layout.shared_regions)?;
        Ok(space)
    }

    // Shared pages are reserved before any process exists, so each region is
    // a run of contiguous pages. Region ids count down from `regions` to 1.
    fn carve_shared_regions(&mut self, regions: u32) -> Res<()> {
        if regions == 0 || self.shared_region_size == 0 {
            return Ok(());
        }
        let per_region = self.bytes_to_pages(self.shared_region_size);
        let mut remaining = per_region.saturating_mul(regions);
        let mut region = regions;
        for page in self.pages.iter_mut() {
            if remaining == 0 {
                break;
            }
            if page.shared_region == 0 && page.owner == 0 {
                page.shared_region = region;
                remaining -= 1;
                if remaining % per_region == 0 {
                    region -= 1;
                }
            }
        }
        if remaining > 0 {
            return Err(Error::Config(format!(
                "{} shared regions of {} bytes do not fit in virtual memory",
                regions, self.shared_region_size
            )));
        }
        Ok(())
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn virtual_size(&self) -> u32 {
        self.virtual_size
    }

    pub fn physical_size(&self) -> u32 {
        self.ram.size() as u32
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn ram(&self) -> &Ram {
        &self.ram
    }

    pub fn free_frame_count(&self) -> usize {
        self.free_frames.iter().filter(|f| **f).count()
    }

    pub fn bytes_to_pages(&self, bytes: u32) -> u32 {
        bytes / self.page_size + u32::from(bytes % self.page_size > 0)
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn lookup(&self, pid: u32, addr: u32) -> Option<(usize, u32)> {
        for (idx, page) in self.pages.iter().enumerate() {
            if page.owner == pid && within(addr, page.addr_process, self.page_size) {
                return Some((idx, addr - page.addr_process));
            }
            if page.shared_region != 0 {
                for m in &page.shared_owners {
                    if m.pid == pid && within(addr, m.addr_process, self.page_size) {
                        return Some((idx, addr - m.addr_process));
                    }
                }
            }
        }
        None
    }

    /// Translate a process address into a physical one, faulting the page in
    /// if it is not resident.
    pub fn translate(&mut self, pid: u32, addr: u32, dirty: bool) -> Res<usize> {
        let (idx, offset) = self
            .lookup(pid, addr)
            .ok_or(Fault::Memory { pid, addr })?;
        self.resolve(idx)?;
        let tick = self.next_tick();
        let page = &mut self.pages[idx];
        page.dirty = dirty || page.dirty;
        page.access_count += 1;
        page.last_accessed = tick;
        Ok(page.addr_physical as usize + offset as usize)
    }

    // Make page `idx` resident: take a free frame if one exists, otherwise
    // evict the least recently used resident page and reuse its frame.
    fn resolve(&mut self, idx: usize) -> Res<()> {
        if self.pages[idx].valid {
            return Ok(());
        }
        let frame = match self.free_frames.iter().position(|free| *free) {
            Some(i) => {
                self.free_frames[i] = false;
                i as u32 * self.page_size
            }
            None => {
                let victim = self.select_victim(idx).ok_or(Error::OutOfMemory {
                    pid: self.pages[idx].owner,
                    bytes: self.page_size,
                })?;
                debug!(
                    "page fault on page {}: evicting page {}",
                    self.pages[idx].number, self.pages[victim].number
                );
                self.swap_out(victim)?;
                self.pages[victim].addr_physical
            }
        };
        self.pages[idx].addr_physical = frame;
        self.swap_in(idx)
    }

    pub fn select_victim(&self, exclude: usize) -> Option<usize> {
        self.pages
            .iter()
            .enumerate()
            .filter(|(i, p)| *i != exclude && p.valid)
            .min_by_key(|(_, p)| p.last_accessed)
            .map(|(i, _)| i)
    }

    /// Persist the page if it is dirty and mark it non-resident.
    pub fn swap_out(&mut self, idx: usize) -> Res<()> {
        let page = &self.pages[idx];
        if page.dirty {
            let record = SwapRecord {
                memory: self
                    .ram
                    .frame(page.addr_physical as usize, self.page_size as usize)
                    .to_vec(),
                access_count: page.access_count,
                last_accessed: page.last_accessed,
            };
            self.swap.store(page.swap_key(), record)?;
        }
        self.pages[idx].valid = false;
        Ok(())
    }

    /// Fill the page's freshly bound frame from its swap record, or with zeros
    /// when there is none.
    pub fn swap_in(&mut self, idx: usize) -> Res<()> {
        let key = self.pages[idx].swap_key();
        let frame = self.pages[idx].addr_physical as usize;
        let size = self.page_size as usize;
        match self.swap.take(key)? {
            Some(record) => {
                let n = record.memory.len().min(size);
                self.ram.load_frame(frame, &record.memory[..n]);
                self.ram.fill(frame + n, size - n, 0);
                let page = &mut self.pages[idx];
                page.access_count = record.access_count;
                page.last_accessed = record.last_accessed;
                // the record is gone, so this content must be written again on eviction
                page.dirty = true;
            }
            None => {
                self.ram.fill(frame, size, 0);
                self.pages[idx].dirty = false;
            }
        }
        trace!("page {} resident at frame {}", key.page_number, frame);
        let page = &mut self.pages[idx];
        page.valid = true;
        page.page_faults += 1;
        Ok(())
    }

    /// Return the page's frame to the free pool and forget everything about it.
    pub fn reset(&mut self, idx: usize) -> Res<()> {
        let tick = self.tick;
        let page = &mut self.pages[idx];
        if page.valid {
            let frame = (page.addr_physical / self.page_size) as usize;
            self.free_frames[frame] = true;
        }
        page.valid = false;
        page.dirty = false;
        page.addr_physical = 0;
        page.owner = 0;
        page.page_faults = 0;
        page.access_count = 0;
        page.last_accessed = tick;
        page.addr_process = 0;
        page.heap_alloc = None;
        let key = page.swap_key();
        self.swap.discard(key)?;
        Ok(())
    }

    /// First-fit assignment of free OS pages to a new process.
    pub fn map_process_memory(&mut self, bytes: u32, pid: u32) -> Res<()> {
        let needed = self.bytes_to_pages(bytes) as usize;
        let free: Vec<usize> = self
            .pages
            .iter()
            .enumerate()
            .filter(|(_, p)| p.owner == 0 && p.shared_region == 0)
            .map(|(i, _)| i)
            .take(needed)
            .collect();
        if free.len() < needed {
            return Err(Error::OutOfMemory {
                pid,
                bytes: ((needed - free.len()) as u32).saturating_mul(self.page_size),
            });
        }
        for (n, idx) in free.into_iter().enumerate() {
            let page = &mut self.pages[idx];
            page.owner = pid;
            page.addr_process = n as u32 * self.page_size;
        }
        Ok(())
    }

    /// Map shared region `region` right after the highest page `pid` can
    /// already see. Returns the process address the region starts at.
    pub fn map_shared_region(&mut self, region: u32, pid: u32) -> u32 {
        let existing = self
            .pages
            .iter()
            .filter(|p| region != 0 && p.shared_region == region)
            .flat_map(|p| p.shared_owners.iter())
            .filter(|m| m.pid == pid)
            .map(|m| m.addr_process)
            .min();
        if let Some(start) = existing {
            return start;
        }

        let mut top = 0;
        for page in &self.pages {
            if page.owner == pid {
                top = top.max(page.addr_process);
            }
            for m in page.shared_owners.iter().filter(|m| m.pid == pid) {
                top = top.max(m.addr_process);
            }
        }
        let start = top + self.page_size;
        if region == 0 {
            warn!("process {} asked for shared region 0, nothing mapped", pid);
            return start;
        }

        let mut needed = self.bytes_to_pages(self.shared_region_size);
        let mut addr = start;
        for page in self.pages.iter_mut().filter(|p| p.shared_region == region) {
            if needed == 0 {
                break;
            }
            page.shared_owners.push(SharedMapping {
                pid,
                addr_process: addr,
            });
            addr += self.page_size;
            needed -= 1;
        }
        start
    }

    /// Zero and reset every page owned by `pid` and drop it from all shared
    /// regions.
    pub fn release_process(&mut self, pid: u32) -> Res<()> {
        for idx in 0..self.pages.len() {
            if self.pages[idx].owner == pid {
                if self.pages[idx].valid {
                    let frame = self.pages[idx].addr_physical as usize;
                    self.ram.fill(frame, self.page_size as usize, 0);
                }
                self.reset(idx)?;
            }
            let page = &mut self.pages[idx];
            if page.shared_region != 0 {
                page.shared_owners.retain(|m| m.pid != pid);
            }
        }
        Ok(())
    }

    /// Indices of the pages owned by `pid` that fall inside `[start, end)`,
    /// in ascending address order.
    pub fn heap_pages_for(&self, pid: u32, start: u32, end: u32) -> Vec<usize> {
        let mut heap: Vec<usize> = self
            .pages
            .iter()
            .enumerate()
            .filter(|(_, p)| p.owner == pid && p.addr_process >= start && p.addr_process < end)
            .map(|(i, _)| i)
            .collect();
        heap.sort_by_key(|&i| self.pages[i].addr_process);
        heap
    }

    /// Find the first run of contiguous free heap pages that covers `bytes`
    /// and tag all of them with the run's start address.
    pub fn allocate_heap(&mut self, pid: u32, heap: &[usize], bytes: u32) -> Res<u32> {
        let needed = self.bytes_to_pages(bytes) as usize;
        if needed == 0 || needed > heap.len() {
            return Err(Fault::Heap { pid, bytes }.into());
        }
        let page_size = self.page_size;
        let pages = &self.pages;
        let run = heap
            .windows(needed)
            .find(|w| {
                w.iter().all(|&i| pages[i].heap_alloc.is_none())
                    && w.windows(2)
                        .all(|p| pages[p[1]].addr_process == pages[p[0]].addr_process + page_size)
            })
            .map(|w| w.to_vec());

        let Some(run) = run else {
            return Err(Fault::Heap { pid, bytes }.into());
        };
        let start = self.pages[run[0]].addr_process;
        for i in run {
            self.pages[i].heap_alloc = Some(start);
        }
        debug!("process {} allocated {} heap pages at {}", pid, needed, start);
        Ok(start)
    }

    /// Release the allocation that started at `start` and zero its bytes.
    /// Returns the number of pages freed.
    pub fn free_heap(&mut self, pid: u32, heap: &[usize], start: u32) -> Res<u32> {
        let mut count = 0;
        for &i in heap {
            if self.pages[i].heap_alloc == Some(start) {
                self.pages[i].heap_alloc = None;
                count += 1;
            }
        }
        self.set_memory(pid, start, count * self.page_size, 0)?;
        Ok(count)
    }

    pub fn page_faults_for(&self, pid: u32) -> u32 {
        self.pages
            .iter()
            .filter(|p| p.owner == pid)
            .map(|p| p.page_faults)
            .sum()
    }

    pub fn read_byte(&mut self, pid: u32, addr: u32) -> Res<u8> {
        let physical = self.translate(pid, addr, false)?;
        Ok(self.ram.read(physical))
    }

    pub fn write_byte(&mut self, pid: u32, addr: u32, value: u8) -> Res<()> {
        let physical = self.translate(pid, addr, true)?;
        self.ram.write(physical, value);
        Ok(())
    }

    pub fn read_bytes(&mut self, pid: u32, addr: u32, len: u32) -> Res<Vec<u8>> {
        (0..len)
            .map(|i| self.read_byte(pid, addr.wrapping_add(i)))
            .collect()
    }

    pub fn write_bytes(&mut self, pid: u32, addr: u32, bytes: &[u8]) -> Res<()> {
        for (i, b) in bytes.iter().enumerate() {
            self.write_byte(pid, addr.wrapping_add(i as u32), *b)?;
        }
        Ok(())
    }

    pub fn read_word(&mut self, pid: u32, addr: u32) -> Res<u32> {
        let bytes = self.read_bytes(pid, addr, 4)?;
        Ok(read_as_word(&bytes, 0))
    }

    pub fn write_word(&mut self, pid: u32, addr: u32, value: u32) -> Res<()> {
        let mut bytes = [0u8; 4];
        write_word(&mut bytes, 0, value);
        self.write_bytes(pid, addr, &bytes)
    }

    pub fn set_memory(&mut self, pid: u32, start: u32, len: u32, value: u8) -> Res<()> {
        for i in 0..len {
            self.write_byte(pid, start.wrapping_add(i), value)?;
        }
        Ok(())
    }
}
