//! Generated connect-state messages.
//!
//! The decoders in this crate walk payloads with
//! [`WireReader`](crate::protocol::wire::WireReader) and never depend on
//! these types. They exist to encode test payloads with an independent
//! encoder, from the schema documented in `connect_state.proto`.

// Allow pedantic lints in generated code
#![allow(clippy::pedantic)]

include!(concat!(env!("OUT_DIR"), "/protos/mod.rs"));
