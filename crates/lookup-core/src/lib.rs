// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod config;
pub mod debounce;
pub mod field;
pub mod graph;
pub mod ids;
pub mod modal;
pub mod model;
pub mod registry;
pub mod request;
pub mod state;

pub use config::*;
pub use debounce::*;
pub use field::*;
pub use graph::*;
pub use ids::*;
pub use modal::*;
pub use model::*;
pub use registry::*;
pub use request::*;
pub use state::*;
