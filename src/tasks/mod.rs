//! Background Tasks Module
//!
//! Contains background tasks owned by a cache instance.
//!
//! # Tasks
//! - Expiration sweep: removes expired cache entries at the configured interval

mod sweeper;

pub(crate) use sweeper::{spawn_sweep_task, SweepTask};
