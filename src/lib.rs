#![deny(
    missing_docs,
    clippy::missing_safety_doc,
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::broken_intra_doc_links,
    missing_copy_implementations,
    unused_doc_comments
)]
// Make docs.rs generate better docs
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Diagnostic reporting for checked pointers.
//!
//! ## Overview
//!
//! A checked pointer engine watches every pointer operation of a program
//! under test and detects misuse: dereferencing null or dangling pointers,
//! indexing past the end of an array, deleting the same block twice, and
//! leaking memory. This crate is the part that *tells someone about it*.
//!
//! The engine talks to a [`Listener`](listener::Listener). A listener
//! receives three kinds of notifications:
//!
//! - **Errors** ([`PointerError`](messages::PointerError)) are fatal. The
//!   listener reports them and then stops execution according to its
//!   [`Termination`](termination::Termination) policy.
//! - **Warnings** ([`PointerWarning`](messages::PointerWarning)) are reported
//!   and execution continues.
//! - The **leak report** at the end of a run lists the allocations that were
//!   never freed, each with the backtrace of the code that allocated it,
//!   followed by memory usage statistics.
//!
//! ## Backends
//!
//! [`PlainListener`](listener::plain::PlainListener) prints everything to
//! stdout or stderr:
//!
//! ```text
//! 2 memory leaks were detected:
//! --------
//! Leaked 24 bytes (Node) at address 0x55d0c1a2b2c0
//!   allocated in: make_list (list.cpp:12)
//!                 main (main.cpp:40)
//!
//! ```
//!
//! [`HarnessListener`](listener::harness::HarnessListener) reports errors and
//! warnings to a unit test framework through a
//! [`TestHost`](listener::harness::TestHost), lets the framework exclude
//! allocations from leak checking, and can summarize the run in a
//! statistics file.
//!
//! Both are configured from the engine's key/value
//! [`Options`](options::Options) and are normally built by a
//! [`ListenerFactory`](listener::ListenerFactory):
//!
//! ```
//! use std::sync::Arc;
//!
//! use dereferee::{
//!     listener::{ListenerFactory, plain::PlainFactory},
//!     options::Options,
//!     testing::ScriptedPlatform,
//! };
//!
//! let options = Options::from_pairs([("use.stderr", "true"), ("output.prefix", "| ")]);
//! let listener = PlainFactory::new().create_listener(&options, Arc::new(ScriptedPlatform::new()));
//! # drop(listener);
//! ```
//!
//! ## Platform services
//!
//! Listeners never unwind the stack or read debug information themselves.
//! They ask a [`Platform`](backtrace::Platform) to capture and resolve
//! backtraces. The `dereferee-backtrace` crate provides one built on the
//! native unwinder.

pub mod backtrace;
pub mod global;
pub mod listener;
pub mod messages;
pub mod model;
pub mod options;
pub mod output;
pub mod report;
pub mod termination;
pub mod testing;

pub use self::{
    listener::{Listener, ListenerFactory},
    messages::{ErrorCode, PointerError, PointerWarning, WarningCode},
    model::{Address, AllocationInfo, UsageStats, UserTag},
    options::Options,
    report::{LeakSummary, drive_leak_report},
    termination::Termination,
};
