//! Roster Entities - Cached Directory Records
//!
//! Typed access to people, groups, committees and services stored in the
//! directory. Every lookup goes through a per-kind identity cache, so two
//! lookups of the same key share one instance while anything still holds
//! it. Each instance fetches its attributes on first use, unless a bulk
//! [`Roster::preload`] already filled them.
//!
//! ```ignore
//! let roster = Roster::connect(&DirectoryConfig::load()?)?;
//! let alice = Person::find(&roster, "alice");
//! let mail = alice.mail().await?;
//!
//! // One search instead of one per committee.
//! let committees = roster.preload::<Committee>(&["member"], &[]).await?;
//! ```

mod auth;
pub mod committee;
pub mod entity;
pub mod group;
mod membership;
pub mod person;
mod roster;
pub mod service;

pub use committee::Committee;
pub use entity::{parse_generalized_time, DirectoryEntity, Record};
pub use group::Group;
pub use membership::Members;
pub use person::Person;
pub use roster::{EntityCaches, Roster};
pub use service::Service;
