//! Hash helpers over one or more concatenated byte slices.
//!
//! The macros resolve the hasher through `$crate`, so downstream crates can
//! use them without depending on `sha1` / `sha2` themselves.

#[doc(hidden)]
pub mod __private {
    pub use sha1::Sha1;
    pub use sha2::{Digest, Sha256};
}

#[doc(hidden)]
#[macro_export]
macro_rules! __digest {
    ( $hasher:ident, $len:literal, $( $x:expr ),+ ) => {{
        use $crate::sha::__private::Digest as _;
        let mut h = $crate::sha::__private::$hasher::new();
        $( h.update($x); )+
        let out: [u8; $len] = h.finalize().into();
        out
    }};
}

/// SHA-1 of the concatenation of the arguments.
#[macro_export]
macro_rules! sha1 {
    ( $( $x:expr ),+ $(,)? ) => { $crate::__digest!(Sha1, 20, $( $x ),+) };
}

/// SHA-256 of the concatenation of the arguments.
#[macro_export]
macro_rules! sha256 {
    ( $( $x:expr ),+ $(,)? ) => { $crate::__digest!(Sha256, 32, $( $x ),+) };
}
