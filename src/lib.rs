#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs, unsafe_op_in_unsafe_fn)]
#![warn(rust_2018_idioms)]
//! This crate provides a set of Lock-Free and Wait-Free primitives for
//! connecting concurrent Producers, Consumers and Observers running on
//! multiple native Threads of a single Host.
//!
//! The building blocks are a safe memory reclamation scheme based on
//! Hazard-Pointers, two flavours of atomically published single-value Cells,
//! a family of bounded Queues, a Set with lock-free iteration and a
//! Client/Server connection fabric that binds endpoints into a shared-data
//! relationship with safe teardown from either side.
//!
//! # Feature-Flags
//! * `hazard_ptr`: Enables the Hazard-Pointer implementation
//! * `atoms`: Enables the single-value Cells
//! * `queues`: Enables all the Queues
//! * `set`: Enables the lock-free Set
//! * `ports`: Enables the Client/Server connection fabric
//! * `events`: Enables the Event/Signal substrate (Linux only)
//! * `streams`: Enables Stream-Producers/-Consumers built on the fabric
//! * `state`: Enables the State broadcast built on the fabric
//! * `notice`: Enables the Notice broadcast built on the fabric
//! * `full`: Enables all the Feature-Flags (default)

#[cfg(feature = "atoms")]
#[cfg_attr(docsrs, doc(cfg(feature = "atoms")))]
pub mod atoms;
#[cfg(feature = "events")]
#[cfg_attr(docsrs, doc(cfg(feature = "events")))]
pub mod events;
#[cfg(feature = "hazard_ptr")]
#[cfg_attr(docsrs, doc(cfg(feature = "hazard_ptr")))]
pub mod hazard_ptr;
#[cfg(feature = "notice")]
#[cfg_attr(docsrs, doc(cfg(feature = "notice")))]
pub mod notice;
#[cfg(feature = "ports")]
#[cfg_attr(docsrs, doc(cfg(feature = "ports")))]
pub mod ports;
#[cfg(feature = "queues")]
#[cfg_attr(docsrs, doc(cfg(feature = "queues")))]
pub mod queues;
#[cfg(feature = "set")]
#[cfg_attr(docsrs, doc(cfg(feature = "set")))]
pub mod set;
#[cfg(feature = "state")]
#[cfg_attr(docsrs, doc(cfg(feature = "state")))]
pub mod state;
#[cfg(feature = "streams")]
#[cfg_attr(docsrs, doc(cfg(feature = "streams")))]
pub mod streams;

#[cfg(feature = "queues")]
pub(crate) mod sync;
