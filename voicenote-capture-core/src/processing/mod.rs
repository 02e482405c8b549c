pub mod level_meter;
pub mod mixing;
pub mod sample_queue;
