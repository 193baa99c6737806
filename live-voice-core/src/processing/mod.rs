pub mod block_buffer;
pub mod frame_codec;
pub mod playout_timeline;
pub mod resampler;
