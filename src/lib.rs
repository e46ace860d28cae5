pub mod analyzer;
pub mod attendance;
pub mod camera;
pub mod config;
pub mod dataset;
pub mod detector;
pub mod encoder;
pub mod font;
pub mod gallery;
pub mod output;
pub mod overlay;
pub mod pipeline;
pub mod recognizer;
pub mod report;
pub mod trainer;
pub mod ttf;
pub mod types;
