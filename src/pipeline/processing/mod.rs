// Pipeline processing: identifier normalization, cross-matching and merging

pub mod catalog;
pub mod conflation;
pub mod normalize;
