//! Core trait definitions

mod client;

pub use client::{split_io, ClientReader, ClientWriter, IoReader, IoWriter};
