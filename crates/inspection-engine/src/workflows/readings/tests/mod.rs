mod common;

mod classifier;
mod status;
