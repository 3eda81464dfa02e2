//! Ledger performance test harness
//!
//! Drives a distributed-ledger client library with concurrent write (add)
//! and read (get) workloads and reports throughput and latency.

pub mod cleanup;
pub mod config;
pub mod ledger;
pub mod metrics;
pub mod partition;
pub mod report;
pub mod request_info;
pub mod request_log;
pub mod requests;
pub mod runner;
pub mod tester;
pub mod util;
pub mod worker;
