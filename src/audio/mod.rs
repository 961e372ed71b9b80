pub mod pcm;
pub mod silence;
pub mod wav;

pub use pcm::{decode_le_i16, encode_le_i16};
pub use silence::delete_silence;
pub use wav::{read_pcm16, write_pcm16, PcmClip};
