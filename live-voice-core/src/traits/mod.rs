pub mod input_device;
pub mod output_device;
pub mod session_delegate;
pub mod transport;
