//! RUM telemetry workspace - end-to-end tests of the scope tree and the upload
//! pipeline running together.
//!
//! This is a virtual package that provides workspace-level integration tests.
//! The functionality lives in the `rum-telemetry` workspace member.
