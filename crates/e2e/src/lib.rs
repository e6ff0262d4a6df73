//! Custody E2E Test Framework
//!
//! Rust-controlled browser tests for the custody platform's admin console
//! and user application:
//! - Drives Playwright through a small Node driver speaking JSON lines
//! - Parses declarative YAML test specs and builds scenarios from page objects
//! - Generates TOTP codes for 2FA flows with `custody-otp`
//! - Seeds database state (verified emails, test balances) through `psql`
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    E2E Test Runner (Rust)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestRunner                                                 │
//! │    ├── order_projects() -> setup before dependents          │
//! │    ├── SpecExecutor::execute(spec) -> Vec<StepResult>       │
//! │    │     └── Session                                        │
//! │    │           ├── PlaywrightHandle (node driver.js)        │
//! │    │           ├── Vars (${name} interpolation)             │
//! │    │           ├── TotpGenerator (custody-otp)              │
//! │    │           └── Fixtures (docker exec psql)              │
//! │    └── write_results() -> test-results.json                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestSpec (YAML or scenarios::all)                          │
//! │    ├── name, suite, tags, app, retries, vars                │
//! │    └── steps: navigate, click, fill, assert, capture,       │
//! │              fill_totp, if_visible, switch_context, ...     │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod deployment;
pub mod error;
pub mod fixtures;
pub mod pages;
pub mod playwright;
pub mod runner;
pub mod scenarios;
pub mod session;
pub mod spec;
pub mod vars;

pub use config::E2eConfig;
pub use error::{E2eError, E2eResult};
pub use runner::{Project, TestRunner};
pub use spec::{Locator, TestSpec, TestStep};
