pub mod currency;
pub mod local;
pub mod normalize;
pub mod plan;
pub mod record;
pub mod scoring;
