pub fn align_up(value: u64, alignment: u64) -> u64 {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

pub fn align_up_u32(value: u32, alignment: u32) -> u32 {
    align_up(value as u64, alignment as u64) as u32
}

/// Number of mips in a full chain down to 1x1
pub fn compute_num_mips(width: u64, height: u32) -> u32 {
    let high_bit = 63 - (width | height as u64 | 1).leading_zeros();
    high_bit + 1
}

/// Stable 64-bit FNV-1a, used for content hashes that must not depend on process seeds
#[derive(Debug, Clone, Copy)]
pub struct ContentHasher(u64);

impl Default for ContentHasher {
    fn default() -> Self {
        Self(0xcbf2_9ce4_8422_2325)
    }
}

impl std::hash::Hasher for ContentHasher {
    fn finish(&self) -> u64 {
        self.0
    }

    fn write(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.0 ^= *byte as u64;
            self.0 = self.0.wrapping_mul(0x0000_0100_0000_01b3);
        }
    }
}

pub fn content_hash<T: std::hash::Hash + ?Sized>(value: &T) -> u64 {
    use std::hash::Hasher;
    let mut hasher = ContentHasher::default();
    value.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_rounds_to_multiple() {
        for value in [1u64, 17, 255, 256, 257, 1000] {
            let aligned = align_up(value, 256);
            assert!(aligned >= value);
            assert_eq!(aligned % 256, 0);
            assert!(aligned - value < 256);
        }
        assert_eq!(align_up(0, 256), 0);
    }

    #[test]
    fn mip_chain_length() {
        assert_eq!(compute_num_mips(256, 256), 9);
        assert_eq!(compute_num_mips(1, 1), 1);
        assert_eq!(compute_num_mips(1920, 1080), 11);
        assert_eq!(compute_num_mips(4, 1024), 11);
    }

    #[test]
    fn content_hash_is_stable_across_calls() {
        assert_eq!(content_hash("shader.spirv"), content_hash("shader.spirv"));
        assert_ne!(content_hash(&[1u32, 2]), content_hash(&[2u32, 1]));
    }
}
