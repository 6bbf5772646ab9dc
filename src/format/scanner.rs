use std::borrow::Cow;

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Normal,
    SingleQuoted,
    DoubleQuoted,
    Backticked,
    LineComment,
    BlockComment(u32),
}

/// A placeholder found outside quotes and comments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Placeholder<'a> {
    /// `?`
    Value,
    /// `??`
    Identifier,
    /// `:name`
    Named(&'a str),
}

fn is_line_comment_start(bytes: &[u8], idx: usize) -> bool {
    bytes.get(idx) == Some(&b'-') && bytes.get(idx + 1) == Some(&b'-')
}

fn is_block_comment_start(bytes: &[u8], idx: usize) -> bool {
    bytes.get(idx) == Some(&b'/') && bytes.get(idx + 1) == Some(&b'*')
}

fn is_block_comment_end(bytes: &[u8], idx: usize) -> bool {
    bytes.get(idx) == Some(&b'*') && bytes.get(idx + 1) == Some(&b'/')
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn scan_word(bytes: &[u8], start: usize) -> usize {
    let mut idx = start;
    while idx < bytes.len() && is_word_byte(bytes[idx]) {
        idx += 1;
    }
    idx
}

/// Walk `sql`, offering each placeholder to `replace`. A `None` answer leaves the
/// placeholder text in place. Returns a borrowed `Cow` when nothing was replaced.
///
/// `backslash_escapes` makes `\` escape the next character inside quoted text.
pub(super) fn rewrite<'a, F>(sql: &'a str, backslash_escapes: bool, mut replace: F) -> Cow<'a, str>
where
    F: FnMut(Placeholder<'_>) -> Option<String>,
{
    let bytes = sql.as_bytes();
    let mut out: Option<String> = None;
    let mut copied_to = 0;
    let mut state = State::Normal;
    let mut idx = 0;

    while idx < bytes.len() {
        let b = bytes[idx];
        match state {
            State::Normal => {
                let found = match b {
                    b'\'' => {
                        state = State::SingleQuoted;
                        None
                    }
                    b'"' => {
                        state = State::DoubleQuoted;
                        None
                    }
                    b'`' => {
                        state = State::Backticked;
                        None
                    }
                    _ if is_line_comment_start(bytes, idx) => {
                        state = State::LineComment;
                        idx += 1;
                        None
                    }
                    _ if is_block_comment_start(bytes, idx) => {
                        state = State::BlockComment(1);
                        idx += 1;
                        None
                    }
                    b'?' if bytes.get(idx + 1) == Some(&b'?') => {
                        Some((Placeholder::Identifier, idx + 2))
                    }
                    b'?' => Some((Placeholder::Value, idx + 1)),
                    // `::` is a cast, never a placeholder
                    b':' if bytes.get(idx + 1) == Some(&b':') => {
                        idx += 1;
                        None
                    }
                    b':' if bytes.get(idx + 1).copied().is_some_and(is_word_byte) => {
                        let end = scan_word(bytes, idx + 1);
                        Some((Placeholder::Named(&sql[idx + 1..end]), end))
                    }
                    _ => None,
                };

                if let Some((placeholder, end)) = found {
                    if let Some(text) = replace(placeholder) {
                        let buf = out.get_or_insert_with(|| String::with_capacity(sql.len() + 16));
                        buf.push_str(&sql[copied_to..idx]);
                        buf.push_str(&text);
                        copied_to = end;
                    }
                    idx = end;
                    continue;
                }
            }
            State::SingleQuoted | State::DoubleQuoted | State::Backticked => {
                let quote = match state {
                    State::SingleQuoted => b'\'',
                    State::DoubleQuoted => b'"',
                    _ => b'`',
                };
                if backslash_escapes && b == b'\\' && quote != b'`' {
                    idx += 1; // skip escaped char
                } else if b == quote {
                    if bytes.get(idx + 1) == Some(&quote) {
                        idx += 1; // doubled quote
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment(depth) => {
                if is_block_comment_start(bytes, idx) {
                    state = State::BlockComment(depth + 1);
                    idx += 1;
                } else if is_block_comment_end(bytes, idx) {
                    state = if depth == 1 {
                        State::Normal
                    } else {
                        State::BlockComment(depth - 1)
                    };
                    idx += 1;
                }
            }
        }
        idx += 1;
    }

    match out {
        Some(mut buf) => {
            buf.push_str(&sql[copied_to..]);
            Cow::Owned(buf)
        }
        None => Cow::Borrowed(sql),
    }
}
