// Gateway file to expose integration tests from the integration/ subdirectory
// This file allows Rust's test runner to discover tests in subdirectories

// Re-export the integration test modules
// Each test file in integration/ needs to be included here
#[path = "integration/test_store_persistence.rs"]
mod test_store_persistence;

#[path = "integration/test_related_flow.rs"]
mod test_related_flow;

#[path = "integration/test_fastembed_backend.rs"]
mod test_fastembed_backend;
