pub mod comm;
pub mod config;
pub mod constants;
pub mod dynamic;
pub mod error;
pub mod grid;
pub mod materials;
pub mod medium;
pub mod photon;
pub mod radiation;
pub mod wavelength;

/// Seed of an independent random stream derived from a base seed.
///
/// Used to give every cell or photon packet its own generator, so that results
/// do not depend on how work is split over threads and processes.
pub(crate) fn stream_seed(seed: u64, stream: u64) -> u64 {
    let mut z = seed ^ stream.wrapping_mul(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
