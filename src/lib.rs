// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # rolewarden
//!
//! Tiered role resolution and report-driven demotion for matchmaking
//! communities.
//!
//! ## Architecture
//!
//! - **Role graph** (`graph`): immutable, validated tier hierarchy built from a catalog
//! - **Grant resolution** (`resolve`): pure planner keeping one tier per track
//! - **Report ledger** (`ledger`): append-only reports over DashMap or redb
//! - **Trial log** (`trials`): passed trials with their host and team
//! - **Demotion** (`degrade`): three-strike threshold and one-tier demotion plans
//! - **Execution** (`executor`): applies plans through a membership authority
//! - **Facade** (`warden`): read, plan, apply, announce under a per-participant lock
//!
//! ## Library usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use rolewarden::config::WardenConfig;
//! use rolewarden::marker::{MarkerKey, ParticipantId};
//! use rolewarden::membership::InMemoryMembership;
//! use rolewarden::notify::{GrantSource, TracingNotifier};
//! use rolewarden::warden::Warden;
//!
//! let member = ParticipantId::new(1234);
//! let members = Arc::new(InMemoryMembership::new().with(member, &[MarkerKey::DuoMaster]));
//! let warden = Warden::new(WardenConfig::default(), members, Arc::new(TracingNotifier)).unwrap();
//!
//! let outcome = warden
//!     .grant(
//!         member,
//!         MarkerKey::ThreeSevenMaster,
//!         GrantSource::TrialPass { host: ParticipantId::new(1) },
//!     )
//!     .unwrap();
//! assert_eq!(outcome.also, Some(MarkerKey::Master));
//! ```

pub mod config;
pub mod degrade;
pub mod dpm;
pub mod error;
pub mod executor;
pub mod graph;
pub mod ledger;
pub mod marker;
pub mod membership;
pub mod notify;
pub mod plan;
pub mod resolve;
pub mod trials;
pub mod warden;
