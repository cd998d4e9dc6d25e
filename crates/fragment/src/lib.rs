//! URL fragment codec for shareable viewer deep links.
//!
//! The fragment is the part of the URL after `#`, shaped like
//! `#/datasource=S2&preset=CUSTOM&layers=B04,B03,B02&gain=1.2`.
//! Decoding is pure and total: any input, however malformed, yields a
//! [`DeepLinkRequest`], possibly with every field absent.

pub mod codec;
pub mod request;

pub use codec::*;
pub use request::*;
