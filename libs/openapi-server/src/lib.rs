//! Wire models for the vmcanvas HTTP API

pub mod models;
