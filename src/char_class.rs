use once_cell::sync::Lazy;

/// Punctuation and symbols that always form a phrase of their own.
///
/// Covers ASCII punctuation, full-width forms and the common Japanese marks.
/// The prolonged sound mark `ー` is deliberately absent: it belongs to kana
/// runs.
pub const PUNCTUATION: &str = "!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~\
、。，．・：；？！゛゜´｀¨＾￣＿ヽヾゝゞ〃仝々〆〇―‐／＼～∥｜…‥‘’“”（）〔〕［］｛｝〈〉《》「」『』【】＋－±×÷＝≠＜＞　";

/// Coarse script class of a reading character, used to synthesize
/// pseudo-words for runs that no dictionary covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharClass {
    Hiragana,
    Katakana,
    Digit,
    Latin,
    Punctuation,
    Other,
}

/// Dense membership set over the Basic Multilingual Plane.
///
/// * **ASCII fast path**: `U+0000..=U+007F` in a single [`u128`] mask.
/// * **BMP table**: one bit per code point in `[u64; 1024]` (8 KiB).
/// * **Astral** characters are never members.
#[derive(Copy, Clone)]
pub struct CharClassSet {
    ascii_mask: u128,
    bmp_bits: [u64; 1024],
}

impl CharClassSet {
    /// Builds a set from every character of `members`.
    pub fn from_chars(members: &str) -> Self {
        let mut ascii: u128 = 0;
        let mut bmp = [0u64; 1024];
        for ch in members.chars() {
            let u = ch as u32;
            if u <= 0x7F {
                ascii |= 1u128 << u;
            }
            if u <= 0xFFFF {
                bmp[(u >> 6) as usize] |= 1u64 << (u & 63);
            }
        }
        CharClassSet {
            ascii_mask: ascii,
            bmp_bits: bmp,
        }
    }

    #[inline]
    pub fn contains(&self, c: char) -> bool {
        let u = c as u32;
        if u <= 0x7F {
            return ((self.ascii_mask >> u) & 1) == 1;
        }
        if u <= 0xFFFF {
            return ((self.bmp_bits[(u >> 6) as usize] >> (u & 63)) & 1) == 1;
        }
        false
    }
}

pub static PUNCTUATION_SET: Lazy<CharClassSet> = Lazy::new(|| CharClassSet::from_chars(PUNCTUATION));

#[inline]
pub fn is_punctuation(c: char) -> bool {
    PUNCTUATION_SET.contains(c)
}

#[inline]
pub fn is_hiragana(c: char) -> bool {
    ('\u{3041}'..='\u{309F}').contains(&c) && !matches!(c, '゛' | '゜' | 'ゝ' | 'ゞ')
}

#[inline]
pub fn is_katakana(c: char) -> bool {
    ('\u{30A1}'..='\u{30FA}').contains(&c) || c == 'ー' || ('\u{FF66}'..='\u{FF9F}').contains(&c)
}

#[inline]
pub fn is_digit(c: char) -> bool {
    c.is_ascii_digit() || ('０'..='９').contains(&c)
}

#[inline]
pub fn is_latin(c: char) -> bool {
    c.is_ascii_alphabetic() || ('Ａ'..='Ｚ').contains(&c) || ('ａ'..='ｚ').contains(&c)
}

/// Classifies one character. Punctuation wins over every other class.
pub fn classify(c: char) -> CharClass {
    if is_punctuation(c) {
        CharClass::Punctuation
    } else if is_digit(c) {
        CharClass::Digit
    } else if is_latin(c) {
        CharClass::Latin
    } else if is_katakana(c) {
        CharClass::Katakana
    } else if is_hiragana(c) {
        CharClass::Hiragana
    } else {
        CharClass::Other
    }
}

/// Length of the run of characters sharing `class` at the start of `text`.
pub fn run_length(text: &[char], class: CharClass) -> usize {
    text.iter().take_while(|&&c| classify(c) == class).count()
}
