/// Returns `true` for characters of the Han, Kana and Hangul scripts, plus
/// the CJK iteration and prolonged-sound marks.
pub fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{3005}'..='\u{3007}'       // 々 〆 〇
        | '\u{3040}'..='\u{309F}'     // Hiragana
        | '\u{30A0}'..='\u{30FF}'     // Katakana, incl. ー
        | '\u{31F0}'..='\u{31FF}'     // Katakana phonetic extensions
        | '\u{1100}'..='\u{11FF}'     // Hangul Jamo
        | '\u{3400}'..='\u{4DBF}'     // CJK extension A
        | '\u{4E00}'..='\u{9FFF}'     // CJK unified ideographs
        | '\u{AC00}'..='\u{D7AF}'     // Hangul syllables
        | '\u{F900}'..='\u{FAFF}'     // CJK compatibility ideographs
        | '\u{FF66}'..='\u{FF9F}'     // Halfwidth Katakana
        | '\u{20000}'..='\u{2FA1F}'   // CJK extensions B..F + compat supplement
    )
}

/// `true` for characters that belong to a token: CJK-script characters and
/// any other alphanumeric character.
fn is_token_char(c: char) -> bool {
    is_cjk(c) || c.is_alphanumeric()
}

/// Split text into normalized tokens.
///
/// A token is a maximal run of CJK-script and alphanumeric characters;
/// punctuation and whitespace separate tokens. A switch between scripts does
/// not, so mixed runs stay whole (`"Rust言語"` → `["rust言語"]`). ASCII letters
/// are lower-cased, order and duplicates are preserved. Empty input yields an
/// empty sequence.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !is_token_char(c))
        .filter(|run| !run.is_empty())
        .map(str::to_ascii_lowercase)
        .collect()
}
