//! Purpose: Native OS abstraction layer loaded by the host runtime.
//! Exports: `core` (stat/xattr/sysctl primitives, sleep inhibition, monitors) and `abi` (C bridge).
//! Role: Shared-library backend; the host calls `abi`, Rust consumers and tests use `core`.
//! Invariants: Event enum values and error kind codes are a fixed contract with the host.
//! Invariants: Platform divergence stays inside `core`; callers never see platform layout.

#[cfg(not(unix))]
compile_error!("sysbridge targets UNIX-like platforms; the host ships a separate Windows backend");

pub mod abi;
pub mod core;
