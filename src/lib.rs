//! Representation-driven acceptance-test harness for declarative
//! infrastructure providers.
//!
//! Tests describe a resource once as a [`RepresentationMap`], derive variants
//! with the [`compose`] helpers, render them to configuration text with
//! [`generate`], and drive a create/update/import/destroy lifecycle through a
//! [`ResourceTest`] against an [`ApplyEngine`]. Leaked resources are cleaned
//! up by the [`sweeper`] registry; network traffic can be recorded and
//! replayed with [`vcr`].

#![forbid(unsafe_code)]

pub mod check;
pub mod cloud;
pub mod compose;
pub mod config;
pub mod directive;
pub mod driver;
pub mod engine;
pub mod error;
pub mod generate;
pub mod logging;
pub mod representation;
pub mod state;
pub mod sweeper;
pub mod vcr;
pub mod wait;

pub use check::{
    Check, IdTracker, check_no_resource_attr, check_resource_attr, check_resource_attr_pair,
    check_resource_attr_set, check_resource_exists, compose_aggregate_checks, compose_checks,
};
pub use cloud::{CloudClient, ResourceSummary, check_destroyed};
pub use compose::{
    copy_multiple_with_new_properties, copy_multiple_with_removed_properties,
    copy_with_new_properties, copy_with_removed_nested_properties, copy_with_removed_properties,
    updated_copy,
};
pub use config::{EnvSettings, HarnessConfig};
pub use directive::Directive;
pub use driver::{Lifecycle, ResourceTest, TestReport, TestStep};
pub use engine::ApplyEngine;
pub use error::{Error, Result};
pub use generate::{
    generate_data_source_from_representation_map, generate_resource_from_representation_map,
    generate_variable,
};
pub use representation::{
    ConfigValue, Phase, Representation, RepresentationKind, RepresentationMap, Selector,
};
pub use state::{ResourceState, State};
pub use sweeper::{SweepContext, Sweeper, SweeperRegistry, sweep_resources};
pub use vcr::{ScenarioGuard, VcrMode, VcrRecorder};
pub use wait::wait_till_condition;
