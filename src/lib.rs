// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![forbid(unsafe_code)]               // Unsafe code is forbidden
#![warn(missing_docs)]                // All public items must be documented
#![warn(dead_code)]                   // Unused code is reported
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![warn(unused_imports)]              // Unused imports are reported
#![warn(unused_variables)]            // Unused variables are reported
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::panic))]

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Pattern Provisioner
//!
//! Provisions declarative design patterns onto a Kubernetes cluster.
//!
//! ## Overview
//!
//! A pattern is a list of components, each a loosely typed description of a
//! Kubernetes resource. The provisioner:
//!
//! - Converts components into canonical resources
//! - Validates them with server-side dry runs
//! - Applies or deletes them with server-side apply
//! - Runs components concurrently, in dependency order, collecting results
//!   and per-component errors
//!
//! ## Architecture
//!
//! A request flows through a **stage chain**:
//!
//! 1. **Validate**: static checks of the pattern
//! 2. **Dry run** (optional): the API server judges every component
//! 3. **Provision**: a planner orders the components and an action provider
//!    applies each of them
//!
//! ## Modules
//!
//! - [`config`]: Provisioner configuration and pattern files
//! - [`kube`]: Resource builder, dry run, and deploy against the API server
//! - [`planner`]: Plan capability and the dependency planner
//! - [`provider`]: Host registry and action providers
//! - [`stages`]: Stage chain and the built-in stages
//! - [`engine`]: Provisioning façade and reports
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! name: shop
//! components:
//!   - displayName: db
//!     component: { kind: StatefulSet, version: apps/v1 }
//!     configuration:
//!       namespace: shop
//!   - displayName: web
//!     component: { kind: Deployment, version: apps/v1 }
//!     dependsOn: [db]
//!     configuration:
//!       namespace: shop
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod kube;
pub mod planner;
pub mod provider;
pub mod stages;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigParser, ConfigValidator, PatternFile, ProvisionerConfig};
pub use engine::{Operation, ProvisionReport, Provisioner};
pub use error::{ProvisionError, Result};
pub use kube::{ClusterClient, K8sResource, KubeClient};
pub use planner::{DependencyPlanner, Plan, Planner};
pub use provider::{ActionProvider, ClusterActionProvider, Registry, StaticRegistry};
pub use stages::{Chain, Stage, StageData};
