//! Integration Tests Module
//!
//! End-to-end tests of the task loop against a scripted model provider and
//! host, plus resuming tasks saved on disk.

// Scripted provider, recording host and controller wiring
mod support;

// Completion, tools, mistakes, provider failures, abort and truncation
mod task_loop_test;

// Resume reconstruction through the controller
mod resume_test;

// Checkpoint warnings and controller disposal
mod checkpoint_test;
