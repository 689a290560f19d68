use once_cell::sync::Lazy;
use regex::Regex;

/// A sentence with its trailing punctuation and whitespace
static SENTENCE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[^.!?]*(?:[.!?]+\s*|$)").unwrap()
});

/// Split text into chunks of at most `max_chars` characters.
///
/// Breaks at sentence boundaries first, then at word boundaries, and only
/// cuts inside a word when a single word is longer than the limit.
pub fn split_for_limit(text: &str, max_chars: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    let max_chars = max_chars.max(1);
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for sentence in SENTENCE_REGEX.find_iter(text).map(|m| m.as_str()) {
        if fits(&current, sentence, max_chars) {
            current.push_str(sentence);
            continue;
        }
        flush(&mut chunks, &mut current);

        if sentence.trim().chars().count() <= max_chars {
            current.push_str(sentence);
        } else {
            split_words(sentence, max_chars, &mut chunks, &mut current);
        }
    }
    flush(&mut chunks, &mut current);
    chunks
}

fn split_words(sentence: &str, max_chars: usize, chunks: &mut Vec<String>, current: &mut String) {
    for word in sentence.split_whitespace() {
        let word_len = word.chars().count();
        let sep = if current.is_empty() { 0 } else { 1 };

        if current.chars().count() + sep + word_len <= max_chars {
            if sep == 1 {
                current.push(' ');
            }
            current.push_str(word);
            continue;
        }
        flush(chunks, current);

        if word_len <= max_chars {
            current.push_str(word);
        } else {
            let chars: Vec<char> = word.chars().collect();
            for piece in chars.chunks(max_chars) {
                chunks.push(piece.iter().collect());
            }
        }
    }
}

fn fits(current: &str, next: &str, max_chars: usize) -> bool {
    current.chars().count() + next.trim_end().chars().count() <= max_chars
}

fn flush(chunks: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
    current.clear();
}
