//! Single-value Cells that are atomically published by one Writer and
//! concurrently observed by any number of Readers
//!
//! # SpmcAtom
//! The [`SpmcAtom`] carries plain [`Copy`] values in two internal Copies that
//! are swapped on every store. Loads detect torn reads through a pair of
//! version Stamps and retry. This is the cheapest Cell, but limited to
//! bitwise-copyable values.
//!
//! # Atom
//! The [`Atom`] carries values of any type in heap-allocated, reference
//! counted Nodes that are recycled through an internal Free-List. Readers pin
//! the current Node with a Hazard-Pointer while taking their reference, so a
//! Writer never has to wait for Readers and Readers never observe a freed
//! Node.

mod spmc;
pub use spmc::SpmcAtom;

mod atom;
pub use atom::{Atom, AtomReader, AtomWriter};
