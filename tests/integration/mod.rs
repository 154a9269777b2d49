//! Integration Tests Module
//!
//! End-to-end pipeline runs against temporary directories, exercised
//! fully offline: the retriever credential is absent, so every run
//! takes the cached-fallback path while the approval gate and
//! join-admission engine do real work.

// Full pipeline runs (fallback retriever, ledger, admission, exports)
mod pipeline_test;
