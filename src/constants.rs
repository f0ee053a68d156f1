//! Algorithm identifier space and engine limits.
//!
//! Symmetric algorithm ids are opaque small integers in
//! `ALGORITHM_MIN..=ALGORITHM_MAX`. Asymmetric classes live in their own
//! namespace `0..=KALGORITHM_MAX`, see [`crate::AsymmetricKind`].

/// Symmetric algorithm identifier.
pub type AlgorithmId = u32;

/// Driver slot identifier.
pub type DriverId = u32;

pub const ALGORITHM_MIN: AlgorithmId = 1;

pub const DES_CBC: AlgorithmId = 1;
pub const TRIPLE_DES_CBC: AlgorithmId = 2;
pub const BLOWFISH_CBC: AlgorithmId = 3;
pub const CAST_CBC: AlgorithmId = 4;
pub const SKIPJACK_CBC: AlgorithmId = 5;
pub const MD5_HMAC: AlgorithmId = 6;
pub const SHA1_HMAC: AlgorithmId = 7;
pub const RIPEMD160_HMAC: AlgorithmId = 8;
pub const MD5_KPDK: AlgorithmId = 9;
pub const SHA1_KPDK: AlgorithmId = 10;
pub const AES_CBC: AlgorithmId = 11;
pub const ARC4: AlgorithmId = 12;
pub const MD5: AlgorithmId = 13;
pub const SHA1: AlgorithmId = 14;
pub const SHA2_256_HMAC: AlgorithmId = 15;
pub const NULL_HMAC: AlgorithmId = 16;
pub const NULL_CBC: AlgorithmId = 17;
pub const DEFLATE_COMP: AlgorithmId = 18;
pub const MD5_HMAC_96: AlgorithmId = 19;
pub const SHA1_HMAC_96: AlgorithmId = 20;
pub const RIPEMD160_HMAC_96: AlgorithmId = 21;
pub const GZIP_COMP: AlgorithmId = 22;
pub const DEFLATE_COMP_NOGROW: AlgorithmId = 23;
pub const SHA2_384_HMAC: AlgorithmId = 24;
pub const SHA2_512_HMAC: AlgorithmId = 25;
pub const CAMELLIA_CBC: AlgorithmId = 26;
pub const AES_CTR: AlgorithmId = 27;
pub const AES_XCBC_MAC_96: AlgorithmId = 28;
pub const AES_GCM_16: AlgorithmId = 29;
pub const AES_128_GMAC: AlgorithmId = 30;
pub const AES_192_GMAC: AlgorithmId = 31;
pub const AES_256_GMAC: AlgorithmId = 32;
pub const AES_GMAC: AlgorithmId = 33;

pub const ALGORITHM_MAX: AlgorithmId = 33;

/// Highest asymmetric algorithm class.
pub const KALGORITHM_MAX: u32 = 10;

/// Upper bound on input + output parameters of one asymmetric operation.
pub const MAX_ASYMMETRIC_PARAMS: usize = 8;

/// Default number of driver slots allocated up front.
pub(crate) const DEFAULT_DRIVER_SLOTS: usize = 4;

pub(crate) const DISPATCH_THREAD_NAME: &str = "ocf-dispatch";
pub(crate) const COMPLETION_THREAD_NAME: &str = "ocf-complete";

/// errno-style codes carried in [`crate::OpStatus::code`].
pub(crate) const EIO: i32 = 5;
pub(crate) const ENODEV: i32 = 19;
pub(crate) const EINVAL: i32 = 22;
pub(crate) const EAGAIN: i32 = 35;

#[inline]
pub fn is_valid_algorithm(alg: AlgorithmId) -> bool {
    (ALGORITHM_MIN..=ALGORITHM_MAX).contains(&alg)
}
