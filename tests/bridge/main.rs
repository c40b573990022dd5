//! Bridge integration tests over the in-memory broker.

mod support;
mod consume;
mod lifecycle;
mod publish;
