use std::collections::HashMap;

use crate::types::SpecialTokens;

pub const PAD_ID: u32 = 0;
pub const GO_ID: u32 = 1;
pub const EOS_ID: u32 = 2;
pub const MASK_ID: u32 = 3;
pub const FIRST_CHAR_ID: u32 = 4;

/// Character vocabulary with four reserved ids ahead of the characters.
#[derive(Debug, Clone)]
pub struct Vocab {
    chars: Vec<char>,
    char_to_id: HashMap<char, u32>,
}

impl Vocab {
    /// Builds the vocabulary from a character string. Duplicate characters keep
    /// their first id.
    pub fn new(chars: &str) -> Self {
        let mut ordered = Vec::new();
        let mut char_to_id = HashMap::new();
        for c in chars.chars() {
            if char_to_id.contains_key(&c) {
                continue;
            }
            char_to_id.insert(c, FIRST_CHAR_ID + ordered.len() as u32);
            ordered.push(c);
        }
        Self {
            chars: ordered,
            char_to_id,
        }
    }

    pub fn len(&self) -> usize {
        self.chars.len() + FIRST_CHAR_ID as usize
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn special_tokens(&self) -> SpecialTokens {
        SpecialTokens {
            sos: GO_ID,
            eos: EOS_ID,
        }
    }

    pub fn is_char(&self, id: u32) -> bool {
        id >= FIRST_CHAR_ID && ((id - FIRST_CHAR_ID) as usize) < self.chars.len()
    }

    /// Encodes `text` as `[GO, chars.., EOS]`, skipping characters outside the vocabulary.
    pub fn encode(&self, text: &str) -> Vec<u32> {
        let mut ids = Vec::with_capacity(text.chars().count() + 2);
        ids.push(GO_ID);
        ids.extend(text.chars().filter_map(|c| self.char_to_id.get(&c).copied()));
        ids.push(EOS_ID);
        ids
    }

    /// Decodes ids to text. A leading GO is skipped, decoding stops at the first
    /// EOS, and remaining special or out-of-range ids contribute nothing.
    pub fn decode(&self, ids: &[u32]) -> String {
        let start = usize::from(ids.first() == Some(&GO_ID));
        let end = ids
            .iter()
            .position(|&id| id == EOS_ID)
            .unwrap_or(ids.len())
            .max(start);
        ids[start..end]
            .iter()
            .filter(|&&id| self.is_char(id))
            .map(|&id| self.chars[(id - FIRST_CHAR_ID) as usize])
            .collect()
    }
}
