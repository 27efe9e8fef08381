#![doc = include_str!(concat!("../", env!("CARGO_PKG_README")))]

#[doc(inline)]
pub use kornia_ba as ba;

#[doc(inline)]
pub use kornia_lie as lie;

#[doc(inline)]
pub use kornia_linalg as linalg;
