//! SDMA descriptor chains.
//!
//! The MSC can walk a linked list of descriptors in memory instead of being serviced through
//! the FIFOs. This module builds such chains. [super::Msc] does not use them yet: the DMA
//! enable bit is never set by the request path, and DMA interrupts are only acknowledged.
use jz4780::msc::DescriptorCommand;

/// Hardware descriptor. The layout is fixed by the controller.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
#[repr(C, align(16))]
pub struct SdmaDescriptor {
    /// Bus address of the next descriptor, 0 for the last one.
    pub next_desc: u32,
    pub data_addr: u32,
    pub len: u32,
    /// Raw [DescriptorCommand].
    pub cmd: u32,
}

static_assertions::const_assert_eq!(core::mem::size_of::<SdmaDescriptor>(), 16);

impl SdmaDescriptor {
    #[inline]
    pub fn command(&self) -> DescriptorCommand {
        DescriptorCommand::new_with_raw_value(self.cmd)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DmaError {
    #[error("no segments")]
    Empty,
    #[error("{0} segments do not fit into the chain")]
    TooManySegments(usize),
    #[error("segment {0} is not word aligned")]
    Misaligned(usize),
    #[error("segment {0} is empty")]
    EmptySegment(usize),
}

/// Chain of up to `N` descriptors.
#[derive(Debug)]
pub struct DescriptorChain<const N: usize> {
    descs: [SdmaDescriptor; N],
    used: usize,
}

impl<const N: usize> Default for DescriptorChain<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> DescriptorChain<N> {
    pub const fn new() -> Self {
        Self {
            descs: [SdmaDescriptor {
                next_desc: 0,
                data_addr: 0,
                len: 0,
                cmd: 0,
            }; N],
            used: 0,
        }
    }

    /// Fill the chain for the given `(bus address, length)` segments.
    ///
    /// `chain_addr` is the bus address of the chain storage itself, it is needed for the
    /// links between the descriptors. The last descriptor raises the DMA end interrupt.
    pub fn build(&mut self, chain_addr: u32, segments: &[(u32, u32)]) -> Result<(), DmaError> {
        if segments.is_empty() {
            return Err(DmaError::Empty);
        }
        if segments.len() > N {
            return Err(DmaError::TooManySegments(segments.len()));
        }
        for (i, (addr, len)) in segments.iter().enumerate() {
            if addr % 4 != 0 || len % 4 != 0 {
                return Err(DmaError::Misaligned(i));
            }
            if *len == 0 {
                return Err(DmaError::EmptySegment(i));
            }
        }
        let desc_size = core::mem::size_of::<SdmaDescriptor>() as u32;
        for (i, (addr, len)) in segments.iter().enumerate() {
            let last = i == segments.len() - 1;
            self.descs[i] = SdmaDescriptor {
                next_desc: if last {
                    0
                } else {
                    chain_addr + (i as u32 + 1) * desc_size
                },
                data_addr: *addr,
                len: *len,
                cmd: DescriptorCommand::new_with_raw_value(0)
                    .with_link(!last)
                    .with_end_irq(last)
                    .raw_value(),
            };
        }
        self.used = segments.len();
        Ok(())
    }

    pub fn descriptors(&self) -> &[SdmaDescriptor] {
        &self.descs[..self.used]
    }

    /// Total number of bytes described by the chain.
    pub fn total_len(&self) -> usize {
        self.descriptors().iter().map(|d| d.len as usize).sum()
    }
}
