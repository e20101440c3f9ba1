//! BackdropFE: put text behind the subject of a photo.
//!
//! The GUI (`src/main.rs`) and the headless CLI both drive a [`project::Project`],
//! which owns the edit state, the decoded images and the background jobs.

#![allow(clippy::too_many_arguments)]

pub mod assets;
pub mod cache;
pub mod canvas;
pub mod cli;
pub mod compositor;
pub mod io;
pub mod logger;
pub mod ops;
pub mod project;
pub mod state;
