#![forbid(unsafe_code)]

//! No public surface of its own — a harness crate whose `tests/` sweep
//! the algebraic laws of the opinion and compliance operators
//! (commutativity, associativity, idempotence, monotonicity, boundary
//! limits) with `proptest`-generated inputs.
