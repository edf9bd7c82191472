// Pipeline processing: extraction, normalization, inference, assembly and validation

pub mod normalize;
pub mod parser;
pub mod preacher;
pub mod quality_gate;
pub mod schema;
pub mod transcript;
