//! Fixed-size encoding of keys and values inside node pages.

/// A type with a fixed-size little-endian byte representation.
///
/// Keys additionally need `Ord`; ordering always happens on decoded values,
/// never on the encoded bytes.
pub trait FixedSize: Copy + std::fmt::Debug {
    /// Encoded size in bytes.
    const SIZE: usize;

    /// Encode into `out`, which is exactly `SIZE` bytes long.
    fn encode(&self, out: &mut [u8]);

    /// Decode from `bytes`, which is exactly `SIZE` bytes long.
    fn decode(bytes: &[u8]) -> Self;
}

macro_rules! impl_fixed_size_int {
    ($($t:ty),* $(,)?) => {
        $(
            impl FixedSize for $t {
                const SIZE: usize = std::mem::size_of::<$t>();

                fn encode(&self, out: &mut [u8]) {
                    out[..Self::SIZE].copy_from_slice(&self.to_le_bytes());
                }

                fn decode(bytes: &[u8]) -> Self {
                    let mut buf = [0u8; std::mem::size_of::<$t>()];
                    buf.copy_from_slice(&bytes[..Self::SIZE]);
                    Self::from_le_bytes(buf)
                }
            }
        )*
    };
}

impl_fixed_size_int!(u16, u32, u64, i32, i64);

impl<const N: usize> FixedSize for [u8; N] {
    const SIZE: usize = N;

    fn encode(&self, out: &mut [u8]) {
        out[..N].copy_from_slice(self);
    }

    fn decode(bytes: &[u8]) -> Self {
        let mut buf = [0u8; N];
        buf.copy_from_slice(&bytes[..N]);
        buf
    }
}
