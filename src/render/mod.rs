pub mod chart;
pub mod dashboard;
pub mod ops;
pub mod raster;
pub mod text;
