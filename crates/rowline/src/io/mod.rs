pub mod geojson;
pub mod memory;
pub mod raster;

pub use self::geojson::{GeoJsonSink, load_boundary};
pub use memory::MemorySink;
pub use raster::{bands_from_image, load_raster, parse_world_file};
