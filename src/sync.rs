//! Re-export of the atomic types used by the Queues, so that the Queues can
//! be model-checked with loom by building with `RUSTFLAGS="--cfg loom"`

#[cfg(loom)]
pub(crate) use loom::sync::atomic;

#[cfg(not(loom))]
pub(crate) use std::sync::atomic;
