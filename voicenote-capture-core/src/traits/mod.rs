pub mod device_access;
pub mod encoder;
pub mod observer;
pub mod source_stream;
