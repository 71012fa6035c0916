use std::ops::Range;

use tantivy::tokenizer::{Token, TokenStream, Tokenizer};

/// Name the forward tokenizer is registered under
pub const FORWARD_TOKENIZER: &str = "forward";

/// Longest prefix (in chars) emitted per word. Longer query words are cut to
/// the same length so they still hit the stored prefix.
pub const MAX_PREFIX_CHARS: usize = 32;

/// Forward (prefix-growing) tokenizer.
///
/// Each Latin/alphanumeric word is lowercased and emitted as every prefix from
/// length 1 upward, so partial terms match. CJK characters are single-char words,
/// which keeps CJK text searchable without a dictionary.
#[derive(Clone, Default)]
pub struct ForwardTokenizer;

impl Tokenizer for ForwardTokenizer {
    type TokenStream<'a> = ForwardTokenStream;

    fn token_stream<'a>(&'a mut self, text: &'a str) -> Self::TokenStream<'a> {
        let mut tokens = Vec::new();

        for range in split_words(text) {
            let word = text[range.clone()].to_lowercase();
            for (n, (byte_idx, ch)) in word.char_indices().enumerate() {
                if n >= MAX_PREFIX_CHARS {
                    break;
                }
                tokens.push(TokenData {
                    text: word[..byte_idx + ch.len_utf8()].to_string(),
                    offset_from: range.start,
                    offset_to: range.end,
                });
            }
        }

        ForwardTokenStream {
            tokens,
            index: 0,
            token: Token::default(),
        }
    }
}

/// Lowercased, deduplicated query terms in first-seen order
pub fn query_terms(text: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for range in split_words(text) {
        let term: String = text[range]
            .to_lowercase()
            .chars()
            .take(MAX_PREFIX_CHARS)
            .collect();
        if !terms.contains(&term) {
            terms.push(term);
        }
    }
    terms
}

/// Byte ranges of words: alphanumeric runs, with every CJK char on its own
fn split_words(text: &str) -> Vec<Range<usize>> {
    let mut words = Vec::new();
    let mut start: Option<usize> = None;

    for (i, ch) in text.char_indices() {
        if is_cjk_char(ch) {
            if let Some(s) = start.take() {
                words.push(s..i);
            }
            words.push(i..i + ch.len_utf8());
        } else if ch.is_alphanumeric() {
            if start.is_none() {
                start = Some(i);
            }
        } else if let Some(s) = start.take() {
            words.push(s..i);
        }
    }
    if let Some(s) = start {
        words.push(s..text.len());
    }
    words
}

fn is_cjk_char(c: char) -> bool {
    let cp = c as u32;
    // CJK Unified Ideographs
    (0x4E00..=0x9FFF).contains(&cp)
    // Hangul Syllables
    || (0xAC00..=0xD7AF).contains(&cp)
    // Hangul Jamo
    || (0x1100..=0x11FF).contains(&cp)
    // Hangul Compatibility Jamo
    || (0x3130..=0x318F).contains(&cp)
    // Katakana
    || (0x30A0..=0x30FF).contains(&cp)
    // Hiragana
    || (0x3040..=0x309F).contains(&cp)
    // CJK Extension A
    || (0x3400..=0x4DBF).contains(&cp)
    // CJK Extension B
    || (0x20000..=0x2A6DF).contains(&cp)
}

struct TokenData {
    text: String,
    offset_from: usize,
    offset_to: usize,
}

pub struct ForwardTokenStream {
    tokens: Vec<TokenData>,
    index: usize,
    token: Token,
}

impl TokenStream for ForwardTokenStream {
    fn advance(&mut self) -> bool {
        if self.index < self.tokens.len() {
            let data = &self.tokens[self.index];
            self.token = Token {
                offset_from: data.offset_from,
                offset_to: data.offset_to,
                position: self.index,
                text: data.text.clone(),
                position_length: 1,
            };
            self.index += 1;
            true
        } else {
            false
        }
    }

    fn token(&self) -> &Token {
        &self.token
    }

    fn token_mut(&mut self) -> &mut Token {
        &mut self.token
    }
}
