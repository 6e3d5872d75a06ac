use color_eyre::eyre::bail;
use color_eyre::Result;
use std::ops::Range;

/// First-fit allocator over the descriptor indices of one heap. Freed ranges
/// are merged with their neighbours.
#[derive(Debug)]
pub struct HeapAllocator {
    capacity: u32,
    free: Vec<Range<u32>>,
}

impl HeapAllocator {
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            free: if capacity > 0 { vec![0..capacity] } else { Vec::new() },
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn num_free(&self) -> u32 {
        self.free.iter().map(|r| r.end - r.start).sum()
    }

    /// Offset of `count` contiguous descriptors
    pub fn allocate(&mut self, count: u32) -> Result<u32> {
        if count == 0 {
            bail!("zero sized descriptor range");
        }
        let Some(index) = self.free.iter().position(|r| r.end - r.start >= count) else {
            bail!(
                "descriptor heap exhausted: {count} requested, {} of {} free",
                self.num_free(),
                self.capacity
            );
        };
        let range = &mut self.free[index];
        let offset = range.start;
        range.start += count;
        if range.is_empty() {
            self.free.remove(index);
        }
        Ok(offset)
    }

    pub fn free(&mut self, offset: u32, count: u32) {
        let freed = offset..offset + count;
        if freed.end > self.capacity || self.free.iter().any(|r| r.start < freed.end && freed.start < r.end) {
            log::error!("Descriptor range {freed:?} freed twice or out of bounds");
            return;
        }

        let index = self.free.partition_point(|r| r.start < freed.start);
        self.free.insert(index, freed);
        if index + 1 < self.free.len() && self.free[index].end == self.free[index + 1].start {
            self.free[index].end = self.free.remove(index + 1).end;
        }
        if index > 0 && self.free[index - 1].end == self.free[index].start {
            self.free[index - 1].end = self.free.remove(index).end;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocations_are_first_fit() {
        let mut heap = HeapAllocator::new(16);
        assert_eq!(heap.allocate(4).unwrap(), 0);
        assert_eq!(heap.allocate(4).unwrap(), 4);
        heap.free(0, 4);
        assert_eq!(heap.allocate(2).unwrap(), 0);
        assert_eq!(heap.allocate(4).unwrap(), 8);
        assert_eq!(heap.num_free(), 6);
    }

    #[test]
    fn freed_neighbours_merge() {
        let mut heap = HeapAllocator::new(12);
        let a = heap.allocate(4).unwrap();
        let b = heap.allocate(4).unwrap();
        let c = heap.allocate(4).unwrap();
        heap.free(a, 4);
        heap.free(c, 4);
        heap.free(b, 4);
        assert_eq!(heap.allocate(12).unwrap(), 0);
    }

    #[test]
    fn exhaustion_is_an_error() {
        let mut heap = HeapAllocator::new(4);
        heap.allocate(3).unwrap();
        assert!(heap.allocate(2).is_err());
        assert!(heap.allocate(0).is_err());
    }

    #[test]
    fn double_free_is_ignored() {
        let mut heap = HeapAllocator::new(8);
        let a = heap.allocate(4).unwrap();
        heap.free(a, 4);
        heap.free(a, 4);
        assert_eq!(heap.num_free(), 8);
    }
}
