//! Actor-based scheduling engine
//!
//! This module implements the scheduler as a small set of actors. Each actor
//! runs as an independent async task and is controlled through a Tokio mpsc
//! command channel; replies come back on oneshot channels.
//!
//! ## Architecture Overview
//!
//! ```text
//!                  +------------------+
//!                  |  MonitorService  |  create / delete
//!                  +--------+---------+
//!                           | register / unregister
//!                  +--------v---------+
//!                  | JobRegistryActor |  one entry per dedup key
//!                  +--------+---------+
//!                           | spawns / cancels
//!           +---------------+---------------+
//!           |                               |
//!   +-------v--------+              +-------v--------+
//!   | ProbeJobActor  |              | ProbeJobActor  |
//!   | (url A @ 60s)  |              | (url B @ 30s)  |
//!   +-------+--------+              +-------+--------+
//!           | probe once                    |
//!   +-------v--------+                      |
//!   | FanoutRecorder | <--------------------+
//!   +-------+--------+
//!           | one check (+ incident change) per member monitor
//!   +-------v--------+
//!   | StorageBackend |
//!   +----------------+
//! ```
//!
//! ## Actor Types
//!
//! - **JobRegistryActor**: Serializes registrations and owns the key → job map
//! - **ProbeJobActor**: Fires on its key's interval and fans the result out
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: Each actor has an mpsc command channel for control messages
//! 2. **Request/Response**: oneshot channels for outcomes and reports
//! 3. **Shared store**: Group membership is read from storage, never cached

pub mod job;
pub mod messages;
pub mod registry;
