//! This module contains the cell-level codec: the byte-range numeric kernels,
//! the temporal scale rules and the bidirectional `TypeCodec` that maps a raw
//! wire cell plus its declared type and scale onto a native value.

pub mod numeric;
pub mod raw;
pub mod temporal;
pub mod type_codec;

pub use raw::{RawCell, WireValue};
pub use type_codec::{decode, decode_default, encode, encode_bind_text};
