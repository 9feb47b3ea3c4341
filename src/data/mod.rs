/// Data layer: core types, loading, reprojection, filtering and export.
///
/// Architecture:
/// ```text
///  .geojson (any supported CRS)
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → Dataset
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  project  │  reproject into the shared CRS
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  named predicates → one Subset each
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  export   │  Subset → <stem>.geojson (atomic)
///   └──────────┘
/// ```

pub mod export;
pub mod filter;
pub mod loader;
pub mod model;
pub mod predicate;
pub mod project;
