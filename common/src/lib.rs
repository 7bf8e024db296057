pub mod constants;

/// Native machine word of the emulated RV32 hart.
pub type Word = u32;
pub type SWord = i32;
pub type VAddr = u32;

/// Returns the little-endian byte image of `words`.
pub fn words_to_bytes(words: &[Word]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}
