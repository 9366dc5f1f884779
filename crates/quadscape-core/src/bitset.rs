use std::sync::atomic::{AtomicU8, Ordering};

/// Eight flags packed into one byte that can be flipped from any thread without a lock.
#[derive(Debug, Default)]
pub struct AtomicBitset8 {
    pub bits: AtomicU8,
}

impl AtomicBitset8 {
    #[inline]
    pub fn new(bits: u8) -> Self {
        Self {
            bits: AtomicU8::new(bits),
        }
    }

    #[inline]
    pub fn load(&self) -> u8 {
        self.bits.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn bit_is_set(&self, bit: u8) -> bool {
        self.load() & (1 << bit) != 0
    }

    #[inline]
    pub fn set_bit(&self, bit: u8) {
        self.bits.fetch_or(1 << bit, Ordering::SeqCst);
    }

    #[inline]
    pub fn unset_bit(&self, bit: u8) {
        self.bits.fetch_and(!(1 << bit), Ordering::SeqCst);
    }

    #[inline]
    pub fn assign_bit(&self, bit: u8, value: bool) {
        if value {
            self.set_bit(bit)
        } else {
            self.unset_bit(bit)
        }
    }

    /// Sets every bit in `mask`.
    #[inline]
    pub fn set_mask(&self, mask: u8) {
        self.bits.fetch_or(mask, Ordering::SeqCst);
    }

    /// Clears every bit in `mask`.
    #[inline]
    pub fn unset_mask(&self, mask: u8) {
        self.bits.fetch_and(!mask, Ordering::SeqCst);
    }

    /// Returns `true` if the bit was set before this call.
    #[inline]
    pub fn fetch_and_set_bit(&self, bit: u8) -> bool {
        self.bits.fetch_or(1 << bit, Ordering::SeqCst) & (1 << bit) != 0
    }

    /// Returns `true` if the bit was set before this call.
    #[inline]
    pub fn fetch_and_unset_bit(&self, bit: u8) -> bool {
        self.bits.fetch_and(!(1 << bit), Ordering::SeqCst) & (1 << bit) != 0
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn set_and_unset_bits() {
        let bits = AtomicBitset8::default();
        assert!(!bits.fetch_and_set_bit(3));
        assert!(bits.fetch_and_set_bit(3));
        assert!(bits.bit_is_set(3));

        bits.set_mask(0b1100_0000);
        assert_eq!(bits.load(), 0b1100_1000);

        assert!(bits.fetch_and_unset_bit(7));
        assert!(!bits.bit_is_set(7));
        bits.unset_mask(0xFF);
        assert_eq!(bits.load(), 0);
    }
}
