//! Roster Cache - Identity Cache and Lazy Attribute Store
//!
//! Two cooperating pieces keep directory round-trips down:
//!
//! - [`IdentityMap`] hands out one shared instance per key for as long as
//!   any caller still holds it. Entries are weak; once the last `Arc` is
//!   dropped the instance is gone and the next lookup builds a fresh one.
//!   Freshness is therefore bounded by how long callers hold references,
//!   not by a timer.
//! - [`LazyAttributes`] is the per-entity attribute map. It starts empty,
//!   runs its loader at most once on first access, and can be filled
//!   directly by a bulk preload so the loader never runs at all.
//!
//! [`WeakSlot`] covers the smaller case of a single lazily fetched value
//! (a member list) that should be dropped with its last user.
//!
//! # Example
//!
//! ```ignore
//! let people: IdentityMap<Person> = IdentityMap::new(EntityKind::Person);
//! let a = people.find_or_create("alice", || Person::new("alice", &ctx));
//! let b = people.find_or_create("alice", || unreachable!());
//! assert!(Arc::ptr_eq(&a, &b));
//! ```

pub mod identity;
pub mod lazy;
pub mod stats;
pub mod weak_slot;

pub use identity::IdentityMap;
pub use lazy::{LazyAttributes, LoadPhase, Loader};
pub use stats::CacheStats;
pub use weak_slot::WeakSlot;
