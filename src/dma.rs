//! Transfer buffer allocation, done once at setup.

use log::info;

use crate::error::{PlayerError, PlayerResult};

/// Allocator for buffers the display bus can read directly.
pub trait DmaAllocator {
    fn allocate(&mut self, size: usize) -> PlayerResult<Box<[u8]>>;
}

/// Plain heap buffers, for targets where any memory is DMA capable.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapAllocator;

impl DmaAllocator for HeapAllocator {
    fn allocate(&mut self, size: usize) -> PlayerResult<Box<[u8]>> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(size)
            .map_err(|_| PlayerError::OutOfMemory(size))?;
        buf.resize(size, 0u8);
        info!("allocated transfer buffer: {size} bytes");
        Ok(buf.into_boxed_slice())
    }
}

impl<A: DmaAllocator + ?Sized> DmaAllocator for &mut A {
    fn allocate(&mut self, size: usize) -> PlayerResult<Box<[u8]>> {
        (**self).allocate(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heap_buffers_are_zeroed() {
        let buf = HeapAllocator.allocate(96).unwrap();
        assert_eq!(buf.len(), 96);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn huge_request_fails_cleanly() {
        assert!(HeapAllocator.allocate(usize::MAX).is_err());
    }
}
