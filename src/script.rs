//! Script conversion collaborator.
//!
//! The engine needs a handful of deterministic conversions to materialize
//! candidates that no dictionary provides: the reading itself in katakana,
//! digit runs in full width, and so on. Hosts with richer tables plug their
//! own implementation in through [`ScriptCodec`].

/// Conversions over character buffers. Characters a conversion does not
/// cover are passed through unchanged.
pub trait ScriptCodec {
    fn to_katakana(&self, text: &[char]) -> Vec<char>;
    fn to_hiragana(&self, text: &[char]) -> Vec<char>;
    fn to_zenkaku(&self, text: &[char]) -> Vec<char>;
    fn to_hankaku(&self, text: &[char]) -> Vec<char>;
    /// Renders a run of digits as kanji numerals (`１２` → `十二`).
    fn to_numeral_text(&self, text: &[char]) -> Vec<char>;
}

/// Offset-based default codec; needs no tables.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardScript;

const KANA_OFFSET: u32 = 0x60;

fn digit_value(c: char) -> Option<u32> {
    match c {
        '0'..='9' => Some(c as u32 - '0' as u32),
        '０'..='９' => Some(c as u32 - '０' as u32),
        _ => None,
    }
}

const KANJI_DIGITS: [char; 10] = ['〇', '一', '二', '三', '四', '五', '六', '七', '八', '九'];

impl ScriptCodec for StandardScript {
    fn to_katakana(&self, text: &[char]) -> Vec<char> {
        text.iter()
            .map(|&c| match c {
                'ぁ'..='ゖ' | 'ゝ' | 'ゞ' => char::from_u32(c as u32 + KANA_OFFSET).unwrap_or(c),
                _ => c,
            })
            .collect()
    }

    fn to_hiragana(&self, text: &[char]) -> Vec<char> {
        text.iter()
            .map(|&c| match c {
                'ァ'..='ヶ' | 'ヽ' | 'ヾ' => char::from_u32(c as u32 - KANA_OFFSET).unwrap_or(c),
                _ => c,
            })
            .collect()
    }

    fn to_zenkaku(&self, text: &[char]) -> Vec<char> {
        text.iter()
            .map(|&c| match c {
                ' ' => '　',
                '!'..='~' => char::from_u32(c as u32 + 0xFEE0).unwrap_or(c),
                _ => c,
            })
            .collect()
    }

    fn to_hankaku(&self, text: &[char]) -> Vec<char> {
        text.iter()
            .map(|&c| match c {
                '　' => ' ',
                '！'..='～' => char::from_u32(c as u32 - 0xFEE0).unwrap_or(c),
                _ => c,
            })
            .collect()
    }

    fn to_numeral_text(&self, text: &[char]) -> Vec<char> {
        let digits: Option<Vec<u32>> = text.iter().map(|&c| digit_value(c)).collect();
        let Some(digits) = digits else {
            return text.to_vec();
        };
        // Positional notation for long runs, unit notation up to 4 digits.
        if digits.len() > 4 {
            return digits.iter().map(|&d| KANJI_DIGITS[d as usize]).collect();
        }
        const UNITS: [Option<char>; 4] = [None, Some('十'), Some('百'), Some('千')];
        let mut out = Vec::new();
        let n = digits.len();
        for (i, &d) in digits.iter().enumerate() {
            let place = n - 1 - i;
            if d == 0 {
                continue;
            }
            if d != 1 || place == 0 {
                out.push(KANJI_DIGITS[d as usize]);
            }
            if let Some(unit) = UNITS[place] {
                out.push(unit);
            }
        }
        if out.is_empty() {
            out.push('〇');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(t: &str) -> Vec<char> {
        t.chars().collect()
    }

    #[test]
    fn kana_round_trip() {
        let codec = StandardScript;
        assert_eq!(codec.to_katakana(&s("きょうはー")), s("キョウハー"));
        assert_eq!(codec.to_hiragana(&s("キョウハ")), s("きょうは"));
    }

    #[test]
    fn width_conversion() {
        let codec = StandardScript;
        assert_eq!(codec.to_zenkaku(&s("a1 ")), s("ａ１　"));
        assert_eq!(codec.to_hankaku(&s("ａ１　")), s("a1 "));
    }

    #[test]
    fn numerals() {
        let codec = StandardScript;
        assert_eq!(codec.to_numeral_text(&s("12")), s("十二"));
        assert_eq!(codec.to_numeral_text(&s("２０５")), s("二百五"));
        assert_eq!(codec.to_numeral_text(&s("1000")), s("千"));
        assert_eq!(codec.to_numeral_text(&s("0")), s("〇"));
        assert_eq!(codec.to_numeral_text(&s("123456")), s("一二三四五六"));
        assert_eq!(codec.to_numeral_text(&s("1a")), s("1a"));
    }
}
