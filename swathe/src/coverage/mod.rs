//! Coverage tracking.
//!
//! Ground treated by an applying section is recorded as triangles. The map
//! keeps an overlap count per triangle so double-applied area can be reported.
//!
//! # Module Structure
//!
//! ```text
//! coverage/
//! ├── mod.rs       # This file - module exports
//! ├── triangle.rs  # CoverageTriangle: area, containment, intersection
//! ├── grid.rs      # Spatial hash for candidate lookups
//! ├── service.rs   # CoverageMapService + OverlapStatistics
//! └── trail.rs     # Section boundaries -> triangles
//! ```

mod grid;
mod service;
mod trail;
mod triangle;

pub use grid::{SpatialGrid, DEFAULT_CELL_SIZE};
pub use service::{
    CoverageMapService, CoverageUpdated, OverlapStatistics, MAX_CELLS_PER_TRIANGLE,
};
pub use trail::{CoverageTrailBuilder, DEFAULT_MAX_STEP, DEFAULT_MIN_STEP};
pub use triangle::{CoverageTriangle, DEGENERATE_AREA};
